//! Gmail API Client - blocking HTTP calls against the Gmail REST API
//!
//! Covers what rule processing needs:
//! - message listing and fetch
//! - read/unread flags
//! - label lookup, creation, and assignment

use super::message::{LabelList, MessageList, UNREAD_LABEL};
use super::{GmailError, GmailMessage, GmailResult, Label, MessageRef};
use crate::rules::MailActions;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyRequest<'a> {
    add_label_ids: &'a [&'a str],
    remove_label_ids: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct CreateLabelRequest<'a> {
    name: &'a str,
}

/// Gmail API client authenticated with a bearer token
pub struct GmailClient {
    client: Client,
    base_url: String,
    access_token: String,
}

impl GmailClient {
    /// Create new API client
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> GmailResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// List the newest messages in the mailbox
    pub fn list_messages(&self, max_results: u32) -> GmailResult<Vec<MessageRef>> {
        let response = self
            .client
            .get(self.url("messages"))
            .bearer_auth(&self.access_token)
            .query(&[("maxResults", max_results)])
            .send()?;

        let list: MessageList = handle_response(response)?;
        Ok(list.messages)
    }

    /// Get a full message by id
    pub fn get_message(&self, message_id: &str) -> GmailResult<GmailMessage> {
        let response = self
            .client
            .get(self.url(&format!("messages/{}", message_id)))
            .bearer_auth(&self.access_token)
            .query(&[("format", "full")])
            .send()?;

        handle_response(response)
    }

    /// Add and remove label ids on a message
    pub fn modify_labels(&self, message_id: &str, add: &[&str], remove: &[&str]) -> GmailResult<()> {
        let response = self
            .client
            .post(self.url(&format!("messages/{}/modify", message_id)))
            .bearer_auth(&self.access_token)
            .json(&ModifyRequest {
                add_label_ids: add,
                remove_label_ids: remove,
            })
            .send()?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(handle_error(response))
        }
    }

    pub fn list_labels(&self) -> GmailResult<Vec<Label>> {
        let response = self
            .client
            .get(self.url("labels"))
            .bearer_auth(&self.access_token)
            .send()?;

        let list: LabelList = handle_response(response)?;
        Ok(list.labels)
    }

    pub fn create_label(&self, name: &str) -> GmailResult<Label> {
        let response = self
            .client
            .post(self.url("labels"))
            .bearer_auth(&self.access_token)
            .json(&CreateLabelRequest { name })
            .send()?;

        handle_response(response)
    }

    /// Id of the label named `name` (case-insensitive), created when missing
    pub fn find_or_create_label(&self, name: &str) -> GmailResult<String> {
        let existing = self
            .list_labels()?
            .into_iter()
            .find(|l| l.name.to_lowercase() == name.to_lowercase());

        match existing {
            Some(label) => Ok(label.id),
            None => {
                log::info!("Creating label '{}'", name);
                Ok(self.create_label(name)?.id)
            }
        }
    }
}

impl MailActions for GmailClient {
    type Error = GmailError;

    fn mark_read(&self, message_id: &str) -> GmailResult<bool> {
        self.modify_labels(message_id, &[], &[UNREAD_LABEL])?;
        Ok(true)
    }

    fn mark_unread(&self, message_id: &str) -> GmailResult<bool> {
        self.modify_labels(message_id, &[UNREAD_LABEL], &[])?;
        Ok(true)
    }

    fn set_label(&self, message_id: &str, label: &str) -> GmailResult<bool> {
        let label_id = self.find_or_create_label(label)?;
        self.modify_labels(message_id, &[label_id.as_str()], &[])?;
        Ok(true)
    }
}

/// Parse a successful response body, or map the failure status
fn handle_response<T: serde::de::DeserializeOwned>(response: Response) -> GmailResult<T> {
    if response.status().is_success() {
        response
            .json::<T>()
            .map_err(|e| GmailError::InvalidResponse(e.to_string()))
    } else {
        Err(handle_error(response))
    }
}

/// Convert error response to GmailError
fn handle_error(response: Response) -> GmailError {
    let status = response.status();

    match status {
        StatusCode::UNAUTHORIZED => GmailError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => GmailError::RateLimited,
        _ => {
            let message = response
                .text()
                .unwrap_or_else(|_| "Unknown error".to_string());
            GmailError::Api {
                status: status.as_u16(),
                message,
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
