//! # mail-rules CLI Entry Point
//!
//! Assembles subcommands and dispatches to the library pipeline.

use clap::{Parser, Subcommand};
use mail_rules_lib::config::AppConfig;
use mail_rules_lib::AppError;
use std::path::PathBuf;

/// Rule-based Gmail processing.
///
/// Fetches messages into a local database, loads rules from JSON, and applies
/// the actions of every matching rule.
#[derive(Parser, Debug)]
#[command(name = "mail-rules", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drop and recreate the database tables.
    InitDb,
    /// Fetch recent messages from Gmail into the database.
    Fetch {
        /// Number of messages to list.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        max_results: Option<u32>,
    },
    /// Load the rules file into the database.
    LoadRules {
        #[arg(long)]
        rules_file: Option<PathBuf>,
    },
    /// Remove a stored rule by id.
    DeleteRule {
        id: i64,
    },
    /// Apply stored rules to every stored email.
    Process {
        /// Rules file used when the database holds no rules.
        #[arg(long)]
        rules_file: Option<PathBuf>,
    },
}

fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = AppConfig::from_env()?;

    match cli.command {
        Commands::InitDb => mail_rules_lib::init_db(&config),
        Commands::Fetch { max_results } => {
            if let Some(max) = max_results {
                config.fetch_max_results = max;
            }
            mail_rules_lib::fetch_emails(&config).map(|_| ())
        }
        Commands::LoadRules { rules_file } => {
            if let Some(path) = rules_file {
                config.rules_file = path;
            }
            mail_rules_lib::load_rules(&config).map(|_| ())
        }
        Commands::DeleteRule { id } => mail_rules_lib::delete_rule(&config, id).map(|_| ()),
        Commands::Process { rules_file } => {
            if let Some(path) = rules_file {
                config.rules_file = path;
            }
            mail_rules_lib::process_emails(&config).map(|_| ())
        }
    }
}

fn main() {
    // Load .env file if present
    dotenvy::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
