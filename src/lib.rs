//! # Mail Rules
//!
//! Classifies stored emails against user-defined rules and applies the
//! matching actions (mark read/unread, label) through the Gmail API.

pub mod config;
pub mod db;
pub mod gmail;
pub mod rules;

use config::{AppConfig, ConfigError};
use db::{Database, DbError, DbResult, Email};
use gmail::{GmailClient, GmailError};
use rules::{ActionType, LoaderError, MailActions, MatchResult, Rule, RuleEngine, RuleLoader};
use serde::{Deserialize, Serialize};

/// Errors that abort a command
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Gmail error: {0}")]
    Gmail(#[from] GmailError),

    #[error(transparent)]
    Rules(#[from] LoaderError),
}

/// Totals for one `fetch` run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSummary {
    pub listed: usize,
    pub stored: usize,
    pub already_stored: usize,
    pub failed: usize,
}

/// Totals for one `process` run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub emails_processed: usize,
    pub rules_matched: usize,
    pub actions_executed: usize,
    pub actions_failed: usize,
}

/// Drop and recreate every table
pub fn init_db(config: &AppConfig) -> Result<(), AppError> {
    let db = Database::new(&config.database_path)?;
    db.reset()?;
    log::info!("Database initialized at {}", config.database_path.display());
    Ok(())
}

/// Fetch the newest messages from Gmail into the database
pub fn fetch_emails(config: &AppConfig) -> Result<FetchSummary, AppError> {
    let db = Database::new(&config.database_path)?;
    let client = GmailClient::new(config.gmail_api_base.as_str(), config.access_token()?)?;
    fetch_into(&client, &db, config.fetch_max_results)
}

/// Store every listed message not yet in the database. A message that fails
/// to fetch or convert is skipped.
pub fn fetch_into(client: &GmailClient, db: &Database, max_results: u32) -> Result<FetchSummary, AppError> {
    let messages = client.list_messages(max_results)?;
    log::info!("Found {} messages in Gmail", messages.len());

    let mut summary = FetchSummary {
        listed: messages.len(),
        ..Default::default()
    };

    for message in messages {
        if db.email_exists(&message.id)? {
            summary.already_stored += 1;
            continue;
        }

        let new_email = match client.get_message(&message.id).and_then(|m| m.to_new_email()) {
            Ok(email) => email,
            Err(e) => {
                log::warn!("Failed to fetch message {}: {}", message.id, e);
                summary.failed += 1;
                continue;
            }
        };

        if db.insert_email(&new_email)?.is_some() {
            summary.stored += 1;
        } else {
            summary.already_stored += 1;
        }
    }

    log::info!(
        "Fetch complete: stored={}, already stored={}, failed={}",
        summary.stored,
        summary.already_stored,
        summary.failed
    );
    Ok(summary)
}

/// Load the rules file into the database
pub fn load_rules(config: &AppConfig) -> Result<Vec<Rule>, AppError> {
    let db = Database::new(&config.database_path)?;
    let rules = RuleLoader::new(&config.rules_file).save_rules_to_db(&db)?;
    log::info!("Loaded {} rules", rules.len());
    Ok(rules)
}

/// Remove a stored rule, returning what was removed
pub fn delete_rule(config: &AppConfig, id: i64) -> Result<Rule, AppError> {
    let db = Database::new(&config.database_path)?;
    let rule = db.get_rule(id)?;
    db.delete_rule(id)?;
    log::info!("Deleted rule '{}' (ID: {})", rule.name, rule.id);
    Ok(rule)
}

/// Run every rule over every stored email against Gmail
pub fn process_emails(config: &AppConfig) -> Result<ProcessSummary, AppError> {
    let db = Database::new(&config.database_path)?;
    let rules = RuleLoader::new(&config.rules_file).rules_from_db_or_file(&db)?;

    if rules.is_empty() {
        log::warn!(
            "No rules found. Please create rules in {}",
            config.rules_file.display()
        );
        return Ok(ProcessSummary::default());
    }
    log::info!("Loaded {} rules", rules.len());

    let client = GmailClient::new(config.gmail_api_base.as_str(), config.access_token()?)?;
    let engine = RuleEngine::new(client);
    Ok(process_stored_emails(&db, &rules, &engine)?)
}

/// Run `rules` over every stored email, in storage order
pub fn process_stored_emails<A: MailActions>(
    db: &Database,
    rules: &[Rule],
    engine: &RuleEngine<A>,
) -> DbResult<ProcessSummary> {
    let emails = db.get_emails()?;
    log::info!("Processing {} emails", emails.len());

    let mut summary = ProcessSummary::default();

    for email in &emails {
        summary.emails_processed += 1;

        let results = engine.process_email(email, rules);
        if results.is_empty() {
            continue;
        }

        log::info!("Email {} matched rules:", email.gmail_id);
        for result in &results {
            summary.rules_matched += 1;
            log::info!("  Rule: {}", result.rule_name);

            for action in &result.actions {
                summary.actions_executed += 1;
                if !action.success {
                    summary.actions_failed += 1;
                }
                let status = if action.success { "successful" } else { "failed" };
                log::info!("    Action: {} - {}", action.action_type, status);
            }
        }

        mirror_results(db, email, &results)?;
    }

    log::info!(
        "Processing complete: processed={}, matched={}, actions={}, failed={}",
        summary.emails_processed,
        summary.rules_matched,
        summary.actions_executed,
        summary.actions_failed
    );
    Ok(summary)
}

/// Reflect successful actions on the stored copy of the email
fn mirror_results(db: &Database, email: &Email, results: &[MatchResult]) -> DbResult<()> {
    let successful = results
        .iter()
        .flat_map(|r| r.actions.iter())
        .filter(|a| a.success);

    for action in successful {
        match (&action.action_type, action.value.as_deref()) {
            (ActionType::MarkAsRead, _) => db.update_email_read_state(&email.gmail_id, true)?,
            (ActionType::MarkAsUnread, _) => db.update_email_read_state(&email.gmail_id, false)?,
            (ActionType::MoveTo, Some(label)) => db.update_email_label(&email.gmail_id, label)?,
            _ => {}
        }
    }

    Ok(())
}
