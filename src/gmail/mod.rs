//! # Mail Rules - Gmail Module
//!
//! REST client for the Gmail API: message listing and fetch for ingestion,
//! and the label operations rule actions run against.

pub mod client;
pub mod message;

pub use client::GmailClient;
pub use message::{GmailMessage, Label, MessageRef};

/// Result type alias for Gmail operations
pub type GmailResult<T> = Result<T, GmailError>;

/// Unified error type for Gmail operations
#[derive(Debug, thiserror::Error)]
pub enum GmailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unauthorized - access token missing or expired")]
    Unauthorized,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Gmail API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),
}
