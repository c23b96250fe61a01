//! Gmail API payloads and conversion into stored emails

use super::{GmailError, GmailResult};
use crate::db::NewEmail;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Gmail encodes bodies as base64url, with or without padding
const BODY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub const UNREAD_LABEL: &str = "UNREAD";

/// Entry of `messages.list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
}

/// User label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LabelList {
    #[serde(default)]
    pub labels: Vec<Label>,
}

/// Full message from `messages.get`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    pub thread_id: String,
    pub label_ids: Option<Vec<String>>,
    /// Milliseconds since the epoch, as a string
    pub internal_date: Option<String>,
    pub payload: Option<MessagePart>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    pub body: Option<MessageBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageBody {
    pub data: Option<String>,
}

impl GmailMessage {
    /// First header with this name, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// The first `text/plain` part, or the body of a single-part message
    pub fn plain_text_body(&self) -> GmailResult<Option<String>> {
        let Some(payload) = self.payload.as_ref() else {
            return Ok(None);
        };

        let data = if payload.parts.is_empty() {
            payload.body.as_ref().and_then(|b| b.data.as_deref())
        } else {
            payload
                .parts
                .iter()
                .find(|p| p.mime_type == "text/plain")
                .and_then(|p| p.body.as_ref())
                .and_then(|b| b.data.as_deref())
        };

        data.map(decode_body).transpose()
    }

    pub fn received_at(&self) -> GmailResult<DateTime<Utc>> {
        let raw = self
            .internal_date
            .as_deref()
            .ok_or_else(|| GmailError::InvalidResponse(format!("message {} has no internalDate", self.id)))?;
        let millis: i64 = raw
            .parse()
            .map_err(|_| GmailError::InvalidResponse(format!("bad internalDate '{}'", raw)))?;

        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| GmailError::InvalidResponse(format!("internalDate out of range: {}", millis)))
    }

    /// A message without label information counts as unread
    pub fn is_read(&self) -> bool {
        match &self.label_ids {
            Some(labels) => !labels.iter().any(|l| l == UNREAD_LABEL),
            None => false,
        }
    }

    /// Convert into a record ready for storage
    pub fn to_new_email(&self) -> GmailResult<NewEmail> {
        Ok(NewEmail {
            gmail_id: self.id.clone(),
            thread_id: self.thread_id.clone(),
            from_address: self.header("From").unwrap_or_default().to_string(),
            to_address: self.header("To").unwrap_or_default().to_string(),
            subject: Some(self.header("Subject").unwrap_or_default().to_string()),
            message: self.plain_text_body()?,
            received_date: self.received_at()?,
            is_read: self.is_read(),
            label: None,
        })
    }
}

fn decode_body(data: &str) -> GmailResult<String> {
    let bytes = BODY_ENGINE
        .decode(data)
        .map_err(|e| GmailError::Decode(e.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
