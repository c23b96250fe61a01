//! Rule actions and the mail provider seam they run against

use serde::{Deserialize, Serialize};
use std::fmt;

/// Action to perform when a rule matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub action: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Types of actions that can be performed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    /// Remove the unread flag
    MarkAsRead,
    /// Set the unread flag
    MarkAsUnread,
    /// Apply a label, creating it when needed
    MoveTo,
    /// Unrecognized action; executes as a failed no-op
    Unknown(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::MarkAsRead => "mark_as_read",
            ActionType::MarkAsUnread => "mark_as_unread",
            ActionType::MoveTo => "move_to",
            ActionType::Unknown(s) => s,
        }
    }
}

impl From<&str> for ActionType {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "mark_as_read" => ActionType::MarkAsRead,
            "mark_as_unread" => ActionType::MarkAsUnread,
            "move_to" => ActionType::MoveTo,
            _ => ActionType::Unknown(s.to_string()),
        }
    }
}

impl From<String> for ActionType {
    fn from(s: String) -> Self {
        ActionType::from(s.as_str())
    }
}

impl From<ActionType> for String {
    fn from(action: ActionType) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RuleAction {
    /// Create a mark as read action
    pub fn mark_as_read() -> Self {
        Self {
            action: ActionType::MarkAsRead,
            value: None,
        }
    }

    /// Create a mark as unread action
    pub fn mark_as_unread() -> Self {
        Self {
            action: ActionType::MarkAsUnread,
            value: None,
        }
    }

    /// Create a move to label action
    pub fn move_to(label: impl Into<String>) -> Self {
        Self {
            action: ActionType::MoveTo,
            value: Some(label.into()),
        }
    }
}

/// Outcome of one executed action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_type: ActionType,
    pub value: Option<String>,
    pub success: bool,
}

/// Operations a mail provider must offer to run rule actions.
///
/// Every call is keyed by the provider's message id. `Ok(false)` and `Err`
/// are both recorded as a failed action; neither stops processing.
pub trait MailActions {
    type Error: fmt::Display;

    fn mark_read(&self, message_id: &str) -> Result<bool, Self::Error>;

    fn mark_unread(&self, message_id: &str) -> Result<bool, Self::Error>;

    /// Attach `label` to the message; the provider looks the label up or creates it
    fn set_label(&self, message_id: &str, label: &str) -> Result<bool, Self::Error>;
}

impl<T: MailActions + ?Sized> MailActions for &T {
    type Error = T::Error;

    fn mark_read(&self, message_id: &str) -> Result<bool, Self::Error> {
        (**self).mark_read(message_id)
    }

    fn mark_unread(&self, message_id: &str) -> Result<bool, Self::Error> {
        (**self).mark_unread(message_id)
    }

    fn set_label(&self, message_id: &str, label: &str) -> Result<bool, Self::Error> {
        (**self).set_label(message_id, label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_json_uses_type_key() {
        let json = serde_json::to_value(RuleAction::move_to("Newsletters")).unwrap();
        assert_eq!(json["type"], "move_to");
        assert_eq!(json["value"], "Newsletters");

        let json = serde_json::to_value(RuleAction::mark_as_read()).unwrap();
        assert!(json.get("value").is_none());
    }

    #[test]
    fn test_unknown_action_type_survives_parsing() {
        let action: RuleAction = serde_json::from_str(r#"{"type": "archive"}"#).unwrap();
        assert_eq!(action.action, ActionType::Unknown("archive".to_string()));
        assert_eq!(action.value, None);
    }
}
