//! Database module for Mail Rules
//!
//! Provides SQLite storage for fetched emails and rule definitions.

use crate::rules::{MatchLogic, NewRule, Rule};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

// Connection pooling
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

const EMAIL_COLUMNS: &str = r#"
    id, gmail_id, thread_id, from_address, to_address, subject, message,
    received_date, is_read, label
"#;

const RULE_COLUMNS: &str = r#"
    id, name, predicate, priority, conditions, actions, created_at, updated_at
"#;

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database manager for SQLite access through a connection pool
#[derive(Clone)]
pub struct Database {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl Database {
    /// Open (or create) the database file and apply the schema
    pub fn new(db_path: impl AsRef<Path>) -> DbResult<Self> {
        let manager = SqliteConnectionManager::file(db_path.as_ref())
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));

        let pool = Pool::builder()
            .max_size(4)
            .connection_timeout(std::time::Duration::from_secs(10))
            .build(manager)?;

        let conn = pool.get()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;
        Self::init_schema(&conn)?;
        drop(conn);

        log::debug!("Opened database at {}", db_path.as_ref().display());

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> DbResult<Self> {
        // Every in-memory connection is its own database, so the pool holds exactly one.
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;

        let conn = pool.get()?;
        Self::init_schema(&conn)?;
        drop(conn);

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Get a connection from the pool
    #[inline]
    pub fn get_conn(&self) -> DbResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn init_schema(conn: &Connection) -> DbResult<()> {
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    /// Drop every table and recreate an empty schema
    pub fn reset(&self) -> DbResult<()> {
        let conn = self.get_conn()?;
        log::info!("Resetting database schema");
        conn.execute_batch(
            r#"
            DROP TRIGGER IF EXISTS emails_updated_at;
            DROP TABLE IF EXISTS rules;
            DROP TABLE IF EXISTS emails;
        "#,
        )?;
        Self::init_schema(&conn)
    }

    // =========================================================================
    // EMAILS
    // =========================================================================

    /// Insert a fetched email. Returns `None` when the provider id is already stored.
    pub fn insert_email(&self, email: &NewEmail) -> DbResult<Option<i64>> {
        let conn = self.get_conn()?;

        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO emails (
                gmail_id, thread_id, from_address, to_address, subject, message,
                received_date, is_read, label
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                email.gmail_id,
                email.thread_id,
                email.from_address,
                email.to_address,
                email.subject,
                email.message,
                email.received_date,
                email.is_read,
                email.label,
            ],
        )?;

        if inserted == 0 {
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    pub fn email_exists(&self, gmail_id: &str) -> DbResult<bool> {
        let conn = self.get_conn()?;
        let exists = conn.query_row(
            "SELECT COUNT(*) > 0 FROM emails WHERE gmail_id = ?1",
            [gmail_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Get every stored email, oldest insert first
    pub fn get_emails(&self) -> DbResult<Vec<Email>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM emails ORDER BY id ASC", EMAIL_COLUMNS))?;

        let emails = stmt
            .query_map([], Email::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(emails)
    }

    pub fn get_email_by_gmail_id(&self, gmail_id: &str) -> DbResult<Email> {
        let conn = self.get_conn()?;
        conn.query_row(
            &format!("SELECT {} FROM emails WHERE gmail_id = ?1", EMAIL_COLUMNS),
            [gmail_id],
            Email::from_row,
        )
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("email {}", gmail_id)))
    }

    pub fn update_email_read_state(&self, gmail_id: &str, is_read: bool) -> DbResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE emails SET is_read = ?1 WHERE gmail_id = ?2",
            params![is_read, gmail_id],
        )?;
        Ok(())
    }

    pub fn update_email_label(&self, gmail_id: &str, label: &str) -> DbResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE emails SET label = ?1 WHERE gmail_id = ?2",
            params![label, gmail_id],
        )?;
        Ok(())
    }

    // =========================================================================
    // RULES
    // =========================================================================

    /// Insert a rule, or replace the definition of the rule with the same name.
    /// Returns the rule id.
    pub fn upsert_rule(&self, rule: &NewRule) -> DbResult<i64> {
        let conn = self.get_conn()?;

        let conditions_json = serde_json::to_string(&rule.conditions)
            .map_err(|e| DbError::Serialization(e.to_string()))?;
        let actions_json = serde_json::to_string(&rule.actions)
            .map_err(|e| DbError::Serialization(e.to_string()))?;

        conn.execute(
            r#"
            INSERT INTO rules (name, predicate, priority, conditions, actions)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(name) DO UPDATE SET
                predicate = excluded.predicate,
                priority = excluded.priority,
                conditions = excluded.conditions,
                actions = excluded.actions,
                updated_at = datetime('now')
            "#,
            params![
                rule.name,
                rule.match_logic.as_str(),
                rule.priority,
                conditions_json,
                actions_json,
            ],
        )?;

        let id = conn.query_row("SELECT id FROM rules WHERE name = ?1", [&rule.name], |row| {
            row.get(0)
        })?;
        Ok(id)
    }

    /// Get all rules in insertion order
    pub fn get_rules(&self) -> DbResult<Vec<Rule>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM rules ORDER BY id ASC", RULE_COLUMNS))?;

        let rules = stmt
            .query_map([], rule_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rules)
    }

    pub fn get_rule(&self, id: i64) -> DbResult<Rule> {
        let conn = self.get_conn()?;
        conn.query_row(
            &format!("SELECT {} FROM rules WHERE id = ?1", RULE_COLUMNS),
            [id],
            rule_from_row,
        )
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("rule {}", id)))
    }

    pub fn delete_rule(&self, id: i64) -> DbResult<()> {
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM rules WHERE id = ?1", [id])?;
        Ok(())
    }
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let json: String = row.get(idx)?;
    serde_json::from_str(&json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn rule_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Rule> {
    let predicate: String = row.get(2)?;

    Ok(Rule {
        id: row.get(0)?,
        name: row.get(1)?,
        match_logic: MatchLogic::from(predicate),
        priority: row.get(3)?,
        conditions: json_column(row, 4)?,
        actions: json_column(row, 5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Email as fetched from the provider, before it has a local id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEmail {
    pub gmail_id: String,
    pub thread_id: String,
    pub from_address: String,
    pub to_address: String,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub received_date: DateTime<Utc>,
    pub is_read: bool,
    pub label: Option<String>,
}

/// Stored email; the record rules are evaluated against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    pub id: i64,
    pub gmail_id: String,
    pub thread_id: String,
    pub from_address: String,
    pub to_address: String,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub received_date: DateTime<Utc>,
    pub is_read: bool,
    pub label: Option<String>,
}

impl Email {
    /// Create Email from database row
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Email {
            id: row.get(0)?,
            gmail_id: row.get(1)?,
            thread_id: row.get(2)?,
            from_address: row.get(3)?,
            to_address: row.get(4)?,
            subject: row.get(5)?,
            message: row.get(6)?,
            received_date: row.get(7)?,
            is_read: row.get(8)?,
            label: row.get(9)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{ConditionField, RuleAction, RuleCondition};
    use chrono::TimeZone;

    fn new_email(gmail_id: &str) -> NewEmail {
        NewEmail {
            gmail_id: gmail_id.to_string(),
            thread_id: format!("thread-{}", gmail_id),
            from_address: "test@example.com".to_string(),
            to_address: "user@example.com".to_string(),
            subject: Some("Test Newsletter".to_string()),
            message: None,
            received_date: Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap(),
            is_read: false,
            label: None,
        }
    }

    fn new_rule(name: &str) -> NewRule {
        NewRule {
            name: name.to_string(),
            match_logic: MatchLogic::All,
            priority: 10,
            conditions: vec![RuleCondition::new("from", "contains", "example.com")],
            actions: vec![RuleAction::mark_as_read()],
        }
    }

    #[test]
    fn test_email_insert_and_read_back() {
        let db = Database::in_memory().expect("Failed to create in-memory database");

        let id = db.insert_email(&new_email("abc")).expect("Failed to insert email");
        assert!(id.is_some());
        assert!(db.email_exists("abc").unwrap());
        assert!(!db.email_exists("missing").unwrap());

        let email = db.get_email_by_gmail_id("abc").expect("Failed to get email");
        assert_eq!(email.thread_id, "thread-abc");
        assert_eq!(email.subject.as_deref(), Some("Test Newsletter"));
        assert_eq!(email.message, None);
        assert_eq!(
            email.received_date,
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_duplicate_email_is_ignored() {
        let db = Database::in_memory().expect("Failed to create database");

        assert!(db.insert_email(&new_email("abc")).unwrap().is_some());
        assert!(db.insert_email(&new_email("abc")).unwrap().is_none());
        assert_eq!(db.get_emails().unwrap().len(), 1);
    }

    #[test]
    fn test_email_updates() {
        let db = Database::in_memory().expect("Failed to create database");
        db.insert_email(&new_email("abc")).unwrap();

        db.update_email_read_state("abc", true).unwrap();
        db.update_email_label("abc", "Newsletters").unwrap();

        let email = db.get_email_by_gmail_id("abc").unwrap();
        assert!(email.is_read);
        assert_eq!(email.label.as_deref(), Some("Newsletters"));
    }

    #[test]
    fn test_missing_email_is_not_found() {
        let db = Database::in_memory().expect("Failed to create database");
        assert!(matches!(
            db.get_email_by_gmail_id("nope"),
            Err(DbError::NotFound(_))
        ));
    }

    #[test]
    fn test_rule_crud() {
        let db = Database::in_memory().expect("Failed to create database");

        let id = db.upsert_rule(&new_rule("Test Rule")).expect("Failed to add rule");
        assert!(id > 0);

        let rule = db.get_rule(id).expect("Failed to get rule");
        assert_eq!(rule.name, "Test Rule");
        assert_eq!(rule.priority, 10);
        assert_eq!(rule.conditions.len(), 1);
        assert_eq!(rule.conditions[0].field, ConditionField::From);
        assert_eq!(rule.actions, vec![RuleAction::mark_as_read()]);

        // Same name replaces the definition
        let updated = NewRule {
            match_logic: MatchLogic::Any,
            priority: 20,
            conditions: vec![
                RuleCondition::new("subject", "contains", "a"),
                RuleCondition::new("received_date", "greater_than", "2 days"),
            ],
            actions: vec![],
            ..new_rule("Test Rule")
        };
        assert_eq!(db.upsert_rule(&updated).unwrap(), id);

        let rules = db.get_rules().expect("Failed to get rules");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].match_logic, MatchLogic::Any);
        assert_eq!(rules[0].priority, 20);
        assert_eq!(rules[0].conditions, updated.conditions);
        assert!(rules[0].actions.is_empty());

        db.delete_rule(id).expect("Failed to delete rule");
        assert!(db.get_rules().unwrap().is_empty());
        assert!(matches!(db.get_rule(id), Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_unknown_predicate_round_trips() {
        let db = Database::in_memory().expect("Failed to create database");
        let rule = NewRule {
            match_logic: MatchLogic::from("most"),
            ..new_rule("Odd")
        };
        let id = db.upsert_rule(&rule).unwrap();
        assert_eq!(
            db.get_rule(id).unwrap().match_logic,
            MatchLogic::Unknown("most".to_string())
        );
    }

    #[test]
    fn test_reset_clears_everything() {
        let db = Database::in_memory().expect("Failed to create database");
        db.insert_email(&new_email("abc")).unwrap();
        db.upsert_rule(&new_rule("Test Rule")).unwrap();

        db.reset().expect("Failed to reset database");

        assert!(db.get_emails().unwrap().is_empty());
        assert!(db.get_rules().unwrap().is_empty());
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("mail.db");

        {
            let db = Database::new(&path).expect("Failed to create database");
            db.insert_email(&new_email("abc")).unwrap();
        }

        let db = Database::new(&path).expect("Failed to reopen database");
        assert!(db.email_exists("abc").unwrap());
    }
}
