//! Rule definitions loaded from a JSON file into storage

use super::{MatchLogic, NewRule, Rule, RuleAction, RuleCondition};
use crate::db::{Database, DbError};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Failed to read rules file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid rules file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

pub type LoaderResult<T> = Result<T, LoaderError>;

/// Top level of the rules file: `{"rules": [...]}`
///
/// Entries stay untyped so one malformed rule cannot reject the whole file.
#[derive(Debug, Default, Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<Value>,
}

/// Loads rules from a JSON file
pub struct RuleLoader {
    rules_file: PathBuf,
}

impl RuleLoader {
    pub fn new(rules_file: impl Into<PathBuf>) -> Self {
        Self {
            rules_file: rules_file.into(),
        }
    }

    /// Parse the rules file, skipping entries that lack required keys.
    /// A missing file yields no rules.
    pub fn read_rules(&self) -> LoaderResult<Vec<NewRule>> {
        if !self.rules_file.exists() {
            log::error!("Rule file not found at {}", self.rules_file.display());
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.rules_file)?;
        Ok(parse_rules(&content)?)
    }

    /// Store every rule from the file, then return them as saved
    pub fn save_rules_to_db(&self, db: &Database) -> LoaderResult<Vec<Rule>> {
        let new_rules = self.read_rules()?;

        let mut ids = Vec::with_capacity(new_rules.len());
        for rule in &new_rules {
            ids.push(db.upsert_rule(rule)?);
        }
        log::info!(
            "Saved {} rules from {}",
            ids.len(),
            self.rules_file.display()
        );

        let rules = db
            .get_rules()?
            .into_iter()
            .filter(|r| ids.contains(&r.id))
            .collect();
        Ok(rules)
    }

    /// Stored rules, falling back to the file when storage holds none
    pub fn rules_from_db_or_file(&self, db: &Database) -> LoaderResult<Vec<Rule>> {
        let rules = db.get_rules()?;
        if !rules.is_empty() {
            return Ok(rules);
        }

        log::info!("No rules found in database. Loading from JSON file...");
        self.save_rules_to_db(db)
    }
}

fn parse_rules(content: &str) -> serde_json::Result<Vec<NewRule>> {
    let file: RulesFile = serde_json::from_str(content)?;
    Ok(file.rules.into_iter().filter_map(into_new_rule).collect())
}

/// Scalars are taken as text; `false` reads as "false"
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Absent or null means empty; anything but an array is malformed
fn entry_list<'a>(entry: &'a Map<String, Value>, key: &str) -> Option<&'a [Value]> {
    match entry.get(key) {
        None | Some(Value::Null) => Some(&[][..]),
        Some(Value::Array(items)) => Some(items.as_slice()),
        Some(_) => None,
    }
}

fn priority(value: Option<&Value>) -> Option<i32> {
    match value {
        None | Some(Value::Null) => Some(0),
        Some(Value::Number(n)) => n.as_i64().and_then(|p| i32::try_from(p).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    }
}

fn into_condition(value: &Value, rule: &str) -> Option<RuleCondition> {
    let Value::Object(c) = value else {
        log::warn!("Skipping malformed condition for rule '{}'", rule);
        return None;
    };

    let field = scalar_text(c.get("field")).filter(|f| !f.is_empty());
    let predicate = scalar_text(c.get("predicate")).filter(|p| !p.is_empty());
    match (field, predicate, scalar_text(c.get("value"))) {
        (Some(field), Some(predicate), Some(value)) => {
            Some(RuleCondition::new(field.as_str(), predicate.as_str(), &value))
        }
        _ => {
            log::warn!("Skipping malformed condition for rule '{}'", rule);
            None
        }
    }
}

fn into_action(value: &Value, rule: &str) -> Option<RuleAction> {
    let kind = match value {
        Value::Object(a) => scalar_text(a.get("type")).filter(|k| !k.is_empty()),
        _ => None,
    };

    match kind {
        Some(kind) => Some(RuleAction {
            action: kind.into(),
            value: scalar_text(value.get("value")),
        }),
        None => {
            log::warn!("Skipping malformed action for rule '{}'", rule);
            None
        }
    }
}

fn into_new_rule(entry: Value) -> Option<NewRule> {
    let Value::Object(entry) = entry else {
        log::warn!("Skipping rule that is not an object");
        return None;
    };

    let Some(name) = scalar_text(entry.get("name")).filter(|n| !n.is_empty()) else {
        log::warn!("Skipping rule without a name");
        return None;
    };

    let Some(priority) = priority(entry.get("priority")) else {
        log::warn!("Skipping rule '{}': priority is not an integer", name);
        return None;
    };

    let (Some(conditions), Some(actions)) =
        (entry_list(&entry, "conditions"), entry_list(&entry, "actions"))
    else {
        log::warn!("Skipping rule '{}': conditions and actions must be lists", name);
        return None;
    };

    let match_logic = scalar_text(entry.get("predicate"))
        .map(MatchLogic::from)
        .unwrap_or_default();

    Some(NewRule {
        match_logic,
        priority,
        conditions: conditions
            .iter()
            .filter_map(|c| into_condition(c, &name))
            .collect(),
        actions: actions.iter().filter_map(|a| into_action(a, &name)).collect(),
        name,
    })
}
