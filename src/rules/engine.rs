//! Rule engine - matches rules against emails and runs their actions

use super::{
    ActionResult, ActionType, ConditionEvaluator, MailActions, MatchLogic, Rule, RuleAction,
    RuleCondition,
};
use crate::db::Email;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Actions run for one matched rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub rule_name: String,
    pub actions: Vec<ActionResult>,
}

/// Rule engine that applies rules to emails through a mail provider
pub struct RuleEngine<A> {
    client: A,
    evaluator: ConditionEvaluator,
}

impl<A: MailActions> RuleEngine<A> {
    /// Create a new rule engine running actions through `client`
    pub fn new(client: A) -> Self {
        Self {
            client,
            evaluator: ConditionEvaluator::new(),
        }
    }

    pub fn client(&self) -> &A {
        &self.client
    }

    /// Test a single condition against an email
    pub fn evaluate_condition(&self, email: &Email, condition: &RuleCondition) -> bool {
        self.evaluator.evaluate(email, condition)
    }

    /// Test if a rule matches an email
    pub fn evaluate_rule(&self, email: &Email, rule: &Rule) -> bool {
        self.evaluate_rule_at(email, rule, Utc::now())
    }

    /// Test if a rule matches an email, with `now` as the reference for relative dates
    pub fn evaluate_rule_at(&self, email: &Email, rule: &Rule, now: DateTime<Utc>) -> bool {
        if rule.conditions.is_empty() {
            return false;
        }

        let mut conditions = rule.conditions.iter();
        match &rule.match_logic {
            MatchLogic::All => conditions.all(|c| self.evaluator.evaluate_at(email, c, now)),
            MatchLogic::Any => conditions.any(|c| self.evaluator.evaluate_at(email, c, now)),
            MatchLogic::Unknown(logic) => {
                log::warn!("Rule '{}' has unknown predicate '{}'", rule.name, logic);
                false
            }
        }
    }

    /// Execute a single action on an email, reporting whether it succeeded
    pub fn execute_action(&self, email: &Email, action: &RuleAction) -> bool {
        let id = email.gmail_id.as_str();
        let outcome = match &action.action {
            ActionType::MarkAsRead => self.client.mark_read(id),
            ActionType::MarkAsUnread => self.client.mark_unread(id),
            ActionType::MoveTo => match action.value.as_deref() {
                Some(label) => self.client.set_label(id, label),
                None => {
                    log::warn!("move_to action without a label for email {}", id);
                    return false;
                }
            },
            ActionType::Unknown(kind) => {
                log::warn!("Unknown action type '{}' for email {}", kind, id);
                return false;
            }
        };

        match outcome {
            Ok(success) => success,
            Err(e) => {
                log::error!("Error executing action {} on email {}: {}", action.action, id, e);
                false
            }
        }
    }

    /// Run every rule against an email, in list order
    pub fn process_email(&self, email: &Email, rules: &[Rule]) -> Vec<MatchResult> {
        self.process_email_at(email, rules, Utc::now())
    }

    pub fn process_email_at(
        &self,
        email: &Email,
        rules: &[Rule],
        now: DateTime<Utc>,
    ) -> Vec<MatchResult> {
        let mut results = Vec::new();

        for rule in rules {
            if !self.evaluate_rule_at(email, rule, now) {
                continue;
            }

            log::info!(
                "Rule '{}' (ID: {}) matched email {}",
                rule.name,
                rule.id,
                email.gmail_id
            );

            let actions = rule
                .actions
                .iter()
                .map(|action| ActionResult {
                    action_type: action.action.clone(),
                    value: action.value.clone(),
                    success: self.execute_action(email, action),
                })
                .collect();

            results.push(MatchResult {
                rule_name: rule.name.clone(),
                actions,
            });
        }

        results
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::cell::RefCell;

    /// Records every call and answers from a script
    #[derive(Default)]
    pub(crate) struct RecordingClient {
        pub calls: RefCell<Vec<String>>,
        pub fail_mark_read: bool,
        pub error_on_label: bool,
    }

    impl MailActions for RecordingClient {
        type Error = String;

        fn mark_read(&self, message_id: &str) -> Result<bool, String> {
            self.calls.borrow_mut().push(format!("mark_read:{}", message_id));
            Ok(!self.fail_mark_read)
        }

        fn mark_unread(&self, message_id: &str) -> Result<bool, String> {
            self.calls.borrow_mut().push(format!("mark_unread:{}", message_id));
            Ok(true)
        }

        fn set_label(&self, message_id: &str, label: &str) -> Result<bool, String> {
            self.calls
                .borrow_mut()
                .push(format!("set_label:{}:{}", message_id, label));
            if self.error_on_label {
                Err("label service unavailable".to_string())
            } else {
                Ok(true)
            }
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    pub(crate) fn sample_email() -> Email {
        Email {
            id: 1,
            gmail_id: "test123".to_string(),
            thread_id: "thread123".to_string(),
            from_address: "test@example.com".to_string(),
            to_address: "user@example.com".to_string(),
            subject: Some("Test Newsletter".to_string()),
            message: Some("This is a test newsletter".to_string()),
            received_date: now(),
            is_read: false,
            label: None,
        }
    }

    pub(crate) fn sample_rule() -> Rule {
        Rule {
            id: 1,
            name: "Test Rule".to_string(),
            match_logic: MatchLogic::All,
            priority: 0,
            conditions: vec![
                RuleCondition::new("subject", "contains", "newsletter"),
                RuleCondition::new("from", "contains", "example.com"),
            ],
            actions: vec![RuleAction::mark_as_read(), RuleAction::move_to("Newsletters")],
            created_at: "2024-01-01".to_string(),
            updated_at: "2024-01-01".to_string(),
        }
    }

    #[test]
    fn test_rule_matching_all_conditions() {
        let engine = RuleEngine::new(RecordingClient::default());
        let mut email = sample_email();
        let rule = sample_rule();

        assert!(engine.evaluate_rule(&email, &rule));

        email.subject = Some("Test Email".to_string());
        assert!(!engine.evaluate_rule(&email, &rule));
    }

    #[test]
    fn test_rule_matching_any_condition() {
        let engine = RuleEngine::new(RecordingClient::default());
        let mut email = sample_email();
        let rule = Rule {
            name: "Any Rule".to_string(),
            match_logic: MatchLogic::Any,
            conditions: vec![
                RuleCondition::new("subject", "contains", "newsletter"),
                RuleCondition::new("subject", "contains", "nonexistent"),
            ],
            ..sample_rule()
        };

        assert!(engine.evaluate_rule(&email, &rule));

        email.subject = Some("Test Email".to_string());
        assert!(!engine.evaluate_rule(&email, &rule));
    }

    #[test]
    fn test_empty_conditions_never_match() {
        let engine = RuleEngine::new(RecordingClient::default());
        let email = sample_email();

        for logic in [MatchLogic::All, MatchLogic::Any] {
            let rule = Rule {
                match_logic: logic,
                conditions: vec![],
                ..sample_rule()
            };
            assert!(!engine.evaluate_rule(&email, &rule));
            assert!(engine.process_email(&email, &[rule]).is_empty());
        }
    }

    #[test]
    fn test_unknown_match_logic_fails_closed() {
        let engine = RuleEngine::new(RecordingClient::default());
        let rule = Rule {
            match_logic: MatchLogic::from("most"),
            ..sample_rule()
        };
        assert!(!engine.evaluate_rule(&sample_email(), &rule));
    }

    #[test]
    fn test_date_rule_uses_reference_time() {
        let engine = RuleEngine::new(RecordingClient::default());
        let mut email = sample_email();
        let rule = Rule {
            conditions: vec![RuleCondition::new("received_date", "less_than", "7 days")],
            ..sample_rule()
        };

        assert!(engine.evaluate_rule_at(&email, &rule, now()));
        email.received_date = now() - Duration::days(10);
        assert!(!engine.evaluate_rule_at(&email, &rule, now()));
    }

    #[test]
    fn test_process_email_runs_actions_in_order() {
        let engine = RuleEngine::new(RecordingClient::default());
        let results = engine.process_email(&sample_email(), &[sample_rule()]);

        assert_eq!(
            results,
            vec![MatchResult {
                rule_name: "Test Rule".to_string(),
                actions: vec![
                    ActionResult {
                        action_type: ActionType::MarkAsRead,
                        value: None,
                        success: true,
                    },
                    ActionResult {
                        action_type: ActionType::MoveTo,
                        value: Some("Newsletters".to_string()),
                        success: true,
                    },
                ],
            }]
        );
        assert_eq!(
            *engine.client().calls.borrow(),
            vec!["mark_read:test123", "set_label:test123:Newsletters"]
        );
    }

    #[test]
    fn test_process_email_without_match() {
        let engine = RuleEngine::new(RecordingClient::default());
        let mut email = sample_email();
        email.subject = Some("Test Email".to_string());

        assert!(engine.process_email(&email, &[sample_rule()]).is_empty());
        assert!(engine.client().calls.borrow().is_empty());
    }

    #[test]
    fn test_action_failures_are_isolated() {
        let client = RecordingClient {
            fail_mark_read: true,
            error_on_label: true,
            ..Default::default()
        };
        let engine = RuleEngine::new(client);
        let second = Rule {
            id: 2,
            name: "Second Rule".to_string(),
            actions: vec![
                RuleAction {
                    action: ActionType::from("archive"),
                    value: None,
                },
                RuleAction::mark_as_unread(),
            ],
            ..sample_rule()
        };

        let results = engine.process_email(&sample_email(), &[sample_rule(), second]);

        assert_eq!(results.len(), 2);
        let outcomes: Vec<Vec<bool>> = results
            .iter()
            .map(|r| r.actions.iter().map(|a| a.success).collect())
            .collect();
        assert_eq!(outcomes, vec![vec![false, false], vec![false, true]]);
        assert_eq!(
            *engine.client().calls.borrow(),
            vec![
                "mark_read:test123",
                "set_label:test123:Newsletters",
                "mark_unread:test123"
            ]
        );
    }

    #[test]
    fn test_move_to_without_label_fails() {
        let engine = RuleEngine::new(RecordingClient::default());
        let action = RuleAction {
            action: ActionType::MoveTo,
            value: None,
        };

        assert!(!engine.execute_action(&sample_email(), &action));
        assert!(engine.client().calls.borrow().is_empty());
    }

    #[test]
    fn test_rules_keep_list_order_regardless_of_priority() {
        let engine = RuleEngine::new(RecordingClient::default());
        let low = Rule {
            id: 1,
            name: "Low".to_string(),
            priority: 1,
            ..sample_rule()
        };
        let high = Rule {
            id: 2,
            name: "High".to_string(),
            priority: 100,
            ..sample_rule()
        };

        let names: Vec<String> = engine
            .process_email(&sample_email(), &[low, high])
            .into_iter()
            .map(|r| r.rule_name)
            .collect();
        assert_eq!(names, vec!["Low", "High"]);
    }

    #[test]
    fn test_engine_accepts_borrowed_client() {
        let client = RecordingClient::default();
        let engine = RuleEngine::new(&client);
        engine.process_email(&sample_email(), &[sample_rule()]);
        assert_eq!(client.calls.borrow().len(), 2);
    }
}
