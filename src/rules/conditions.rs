//! Rule condition types and evaluation logic

use crate::db::Email;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// Months are a fixed 30-day approximation, not calendar months.
const DAYS_PER_MONTH: i64 = 30;

/// Condition to match against an email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawCondition", into = "RawCondition")]
pub struct RuleCondition {
    pub field: ConditionField,
    pub operator: ConditionOperator,
    pub value: ConditionValue,
    /// Text the condition was built from; written back when stored
    source: RawCondition,
}

/// Stored form of a condition: everything is text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RawCondition {
    field: String,
    predicate: String,
    value: String,
}

impl From<RawCondition> for RuleCondition {
    fn from(raw: RawCondition) -> Self {
        RuleCondition::new(raw.field.as_str(), raw.predicate.as_str(), &raw.value)
    }
}

impl From<RuleCondition> for RawCondition {
    fn from(condition: RuleCondition) -> Self {
        condition.source
    }
}

impl RuleCondition {
    /// Build a condition, resolving the comparison value against the field
    pub fn new(field: &str, operator: &str, value: &str) -> Self {
        let source = RawCondition {
            field: field.to_string(),
            predicate: operator.to_string(),
            value: value.to_string(),
        };
        let field = ConditionField::from(field);

        Self {
            value: ConditionValue::resolve(&field, value),
            operator: ConditionOperator::from(operator),
            field,
            source,
        }
    }
}

/// Email fields that can be tested
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConditionField {
    From,
    To,
    Subject,
    Message,
    ReceivedDate,
    IsRead,
    /// Selector with no matching email attribute; never matches
    Unknown(String),
}

impl ConditionField {
    pub fn as_str(&self) -> &str {
        match self {
            ConditionField::From => "from",
            ConditionField::To => "to",
            ConditionField::Subject => "subject",
            ConditionField::Message => "message",
            ConditionField::ReceivedDate => "received_date",
            ConditionField::IsRead => "is_read",
            ConditionField::Unknown(s) => s,
        }
    }

    pub fn is_time(&self) -> bool {
        matches!(self, ConditionField::ReceivedDate)
    }
}

impl From<&str> for ConditionField {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "from" | "from_address" | "sender" => ConditionField::From,
            "to" | "to_address" | "recipient" => ConditionField::To,
            "subject" => ConditionField::Subject,
            "message" | "body" => ConditionField::Message,
            "received_date" | "received" => ConditionField::ReceivedDate,
            "is_read" | "read" => ConditionField::IsRead,
            _ => ConditionField::Unknown(s.to_string()),
        }
    }
}

impl fmt::Display for ConditionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison predicates for conditions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConditionOperator {
    Contains,
    NotContains,
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    Unknown(String),
}

impl ConditionOperator {
    pub fn as_str(&self) -> &str {
        match self {
            ConditionOperator::Contains => "contains",
            ConditionOperator::NotContains => "not_contains",
            ConditionOperator::Equals => "equals",
            ConditionOperator::NotEquals => "not_equals",
            ConditionOperator::LessThan => "less_than",
            ConditionOperator::GreaterThan => "greater_than",
            ConditionOperator::Unknown(s) => s,
        }
    }
}

impl From<&str> for ConditionOperator {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "contains" => ConditionOperator::Contains,
            "not_contains" => ConditionOperator::NotContains,
            "equals" => ConditionOperator::Equals,
            "not_equals" => ConditionOperator::NotEquals,
            "less_than" => ConditionOperator::LessThan,
            "greater_than" => ConditionOperator::GreaterThan,
            _ => ConditionOperator::Unknown(s.to_string()),
        }
    }
}

/// Unit of a relative time offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Days,
    Months,
}

impl TimeUnit {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "days" => Some(TimeUnit::Days),
            "months" => Some(TimeUnit::Months),
            _ => None,
        }
    }
}

/// Comparison value, resolved once when the condition is built
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionValue {
    Text(String),
    /// `"<amount> days"` or `"<amount> months"` before now
    Relative { amount: i64, unit: TimeUnit },
    Absolute(DateTime<Utc>),
    /// Time value that is neither relative nor a timestamp
    Unparseable(String),
}

impl ConditionValue {
    pub fn resolve(field: &ConditionField, raw: &str) -> Self {
        if !field.is_time() {
            return ConditionValue::Text(raw.to_string());
        }

        if let Some((amount, unit)) = parse_relative(raw) {
            return ConditionValue::Relative { amount, unit };
        }

        match parse_timestamp(raw.trim()) {
            Some(ts) => ConditionValue::Absolute(ts),
            None => ConditionValue::Unparseable(raw.to_string()),
        }
    }

    /// Point in time the email date is compared against
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ConditionValue::Relative { amount, unit } => {
                let days = match unit {
                    TimeUnit::Days => *amount,
                    TimeUnit::Months => amount.checked_mul(DAYS_PER_MONTH)?,
                };
                now.checked_sub_signed(Duration::try_days(days)?)
            }
            ConditionValue::Absolute(ts) => Some(*ts),
            ConditionValue::Text(_) | ConditionValue::Unparseable(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ConditionValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionValue::Text(s) | ConditionValue::Unparseable(s) => f.write_str(s),
            ConditionValue::Relative { amount, unit } => match unit {
                TimeUnit::Days => write!(f, "{} days", amount),
                TimeUnit::Months => write!(f, "{} months", amount),
            },
            ConditionValue::Absolute(ts) => f.write_str(&ts.to_rfc3339()),
        }
    }
}

fn parse_relative(raw: &str) -> Option<(i64, TimeUnit)> {
    let mut tokens = raw.split_whitespace();
    let (amount, unit) = (tokens.next()?, tokens.next()?);
    if tokens.next().is_some() {
        return None;
    }
    Some((amount.parse().ok()?, TimeUnit::parse(unit)?))
}

/// ISO-8601 timestamp; naive forms are taken as UTC
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Email attribute as seen by a condition
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Text(Cow<'a, str>),
    Timestamp(DateTime<Utc>),
}

/// Reads one attribute off an email
pub type FieldAccessor = for<'a> fn(&'a Email) -> FieldValue<'a>;

fn from_address(email: &Email) -> FieldValue<'_> {
    FieldValue::Text(Cow::Borrowed(&email.from_address))
}

fn to_address(email: &Email) -> FieldValue<'_> {
    FieldValue::Text(Cow::Borrowed(&email.to_address))
}

fn subject(email: &Email) -> FieldValue<'_> {
    FieldValue::Text(Cow::Borrowed(email.subject.as_deref().unwrap_or("")))
}

fn message(email: &Email) -> FieldValue<'_> {
    FieldValue::Text(Cow::Borrowed(email.message.as_deref().unwrap_or("")))
}

fn received_date(email: &Email) -> FieldValue<'_> {
    FieldValue::Timestamp(email.received_date)
}

fn is_read(email: &Email) -> FieldValue<'_> {
    FieldValue::Text(Cow::Owned(email.is_read.to_string()))
}

/// Decides whether a single condition holds for an email.
///
/// The field table is built once here and only read afterwards.
pub struct ConditionEvaluator {
    accessors: HashMap<ConditionField, FieldAccessor>,
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        let accessors: HashMap<ConditionField, FieldAccessor> = HashMap::from([
            (ConditionField::From, from_address as FieldAccessor),
            (ConditionField::To, to_address as FieldAccessor),
            (ConditionField::Subject, subject as FieldAccessor),
            (ConditionField::Message, message as FieldAccessor),
            (ConditionField::ReceivedDate, received_date as FieldAccessor),
            (ConditionField::IsRead, is_read as FieldAccessor),
        ]);

        Self { accessors }
    }

    /// Test a condition against an email at the current time
    pub fn evaluate(&self, email: &Email, condition: &RuleCondition) -> bool {
        self.evaluate_at(email, condition, Utc::now())
    }

    /// Test a condition against an email, with `now` as the reference for relative dates
    pub fn evaluate_at(&self, email: &Email, condition: &RuleCondition, now: DateTime<Utc>) -> bool {
        let Some(accessor) = self.accessors.get(&condition.field) else {
            log::warn!("Unknown condition field '{}'", condition.field);
            return false;
        };

        match accessor(email) {
            FieldValue::Timestamp(received) => {
                compare_time(received, &condition.operator, &condition.value, now)
            }
            FieldValue::Text(text) => compare_text(&text, &condition.operator, &condition.value),
        }
    }
}

// `less_than "7 days"` means younger than seven days: received after the cutoff.
fn compare_time(
    received: DateTime<Utc>,
    operator: &ConditionOperator,
    value: &ConditionValue,
    now: DateTime<Utc>,
) -> bool {
    let Some(cutoff) = value.cutoff(now) else {
        return false;
    };

    match operator {
        ConditionOperator::LessThan => received > cutoff,
        ConditionOperator::GreaterThan => received < cutoff,
        _ => false,
    }
}

fn compare_text(field_value: &str, operator: &ConditionOperator, value: &ConditionValue) -> bool {
    let Some(value) = value.as_text() else {
        return false;
    };
    let field_value = field_value.to_lowercase();
    let value = value.to_lowercase();

    match operator {
        ConditionOperator::Contains => field_value.contains(&value),
        ConditionOperator::NotContains => !field_value.contains(&value),
        ConditionOperator::Equals => field_value == value,
        ConditionOperator::NotEquals => field_value != value,
        _ => false,
    }
}
