//! Runtime configuration, read from the environment (and `.env`)

use crate::gmail::client::DEFAULT_API_BASE;
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_DATABASE_PATH: &str = "mail_rules.db";
pub const DEFAULT_RULES_FILE: &str = "config/rules.json";
pub const DEFAULT_FETCH_MAX_RESULTS: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub rules_file: PathBuf,
    pub gmail_api_base: Url,
    /// Obtained out of band; only `fetch` and `process` need it
    pub gmail_access_token: Option<String>,
    pub fetch_max_results: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            rules_file: PathBuf::from(DEFAULT_RULES_FILE),
            gmail_api_base: Url::parse(DEFAULT_API_BASE).expect("default API base is a valid URL"),
            gmail_access_token: None,
            fetch_max_results: DEFAULT_FETCH_MAX_RESULTS,
        }
    }
}

impl AppConfig {
    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        } else if let Some(url) = get("DATABASE_URL") {
            config.database_path = PathBuf::from(url.trim_start_matches("sqlite:///"));
        }

        if let Some(path) = get("RULES_FILE") {
            config.rules_file = PathBuf::from(path);
        }

        if let Some(base) = get("GMAIL_API_BASE") {
            config.gmail_api_base = Url::parse(&base).map_err(|e| ConfigError::Invalid {
                key: "GMAIL_API_BASE",
                reason: e.to_string(),
            })?;
        }

        config.gmail_access_token = get("GMAIL_ACCESS_TOKEN");

        if let Some(max) = get("FETCH_MAX_RESULTS") {
            config.fetch_max_results = max
                .trim()
                .parse()
                .ok()
                .filter(|n: &u32| *n > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    key: "FETCH_MAX_RESULTS",
                    reason: format!("'{}' is not a positive integer", max),
                })?;
        }

        Ok(config)
    }

    pub fn access_token(&self) -> Result<&str, ConfigError> {
        self.gmail_access_token
            .as_deref()
            .ok_or(ConfigError::Missing("GMAIL_ACCESS_TOKEN"))
    }
}
