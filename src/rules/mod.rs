//! Email rules
//!
//! Conditions, actions, and the engine that runs matched rules against a mail provider.

pub mod actions;
pub mod conditions;
pub mod engine;
pub mod loader;

pub use actions::{ActionResult, ActionType, MailActions, RuleAction};
pub use conditions::{
    ConditionEvaluator, ConditionField, ConditionOperator, ConditionValue, RuleCondition, TimeUnit,
};
pub use engine::{MatchResult, RuleEngine};
pub use loader::{LoaderError, RuleLoader};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rule stored in database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub name: String,
    pub match_logic: MatchLogic,
    /// Kept for reference only; rules run in list order
    pub priority: i32,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
    pub created_at: String,
    pub updated_at: String,
}

/// New rule for insertion or update by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRule {
    pub name: String,
    pub match_logic: MatchLogic,
    pub priority: i32,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
}

/// How a rule combines its conditions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MatchLogic {
    All, // AND - all conditions must match
    Any, // OR - any condition must match
    /// Never matches
    Unknown(String),
}

impl MatchLogic {
    pub fn as_str(&self) -> &str {
        match self {
            MatchLogic::All => "all",
            MatchLogic::Any => "any",
            MatchLogic::Unknown(s) => s,
        }
    }
}

impl Default for MatchLogic {
    fn default() -> Self {
        MatchLogic::All
    }
}

impl From<&str> for MatchLogic {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "all" => MatchLogic::All,
            "any" => MatchLogic::Any,
            _ => MatchLogic::Unknown(s.to_string()),
        }
    }
}

impl From<String> for MatchLogic {
    fn from(s: String) -> Self {
        MatchLogic::from(s.as_str())
    }
}

impl From<MatchLogic> for String {
    fn from(logic: MatchLogic) -> Self {
        logic.as_str().to_string()
    }
}

impl fmt::Display for MatchLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
