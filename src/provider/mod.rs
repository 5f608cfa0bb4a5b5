//! Mail and calendar provider facade.
//!
//! The provider never caches a client per user: every call receives the
//! credential it should act with.

mod google;

pub use google::{CALENDAR_API_BASE, GMAIL_API_BASE, GoogleProvider};

use async_trait::async_trait;
use thiserror::Error;

use crate::token::Credential;
use crate::types::Attendee;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider rejected credentials")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited")]
    RateLimited,

    #[error("provider returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Rate limits, server errors and transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited | Self::Transport(_) => true,
            Self::Status { code, .. } => *code >= 500,
            Self::Unauthorized | Self::NotFound(_) | Self::Decode(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    pub id: String,
    pub thread_id: Option<String>,
}

/// A fetched message with its headers undecoded and bodies base64-decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDetail {
    pub id: String,
    pub thread_id: Option<String>,
    pub label_ids: Vec<String>,
    pub snippet: String,
    /// Epoch milliseconds, as the provider reports it.
    pub internal_date_ms: Option<i64>,
    pub headers: Vec<(String, String)>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
}

impl MessageDetail {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Plain-text body, converting HTML when that is all the message has.
    pub fn body_text(&self) -> Option<String> {
        if let Some(text) = self.text_body.as_ref().filter(|t| !t.trim().is_empty()) {
            return Some(text.clone());
        }
        let html = self.html_body.as_ref()?;
        let text = html2text::config::plain()
            .string_from_read(html.as_bytes(), 120)
            .unwrap_or_default();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    pub id: String,
    pub calendar_id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    /// Epoch seconds; all-day events start at midnight UTC.
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub location: Option<String>,
    pub attendees: Vec<Attendee>,
    pub status: Option<String>,
    pub html_link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelChange {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Ids of messages received after `since` (epoch seconds), at most `max`.
    async fn list_messages_since(
        &self,
        cred: &Credential,
        since: i64,
        max: u32,
    ) -> Result<Vec<MessageSummary>, ProviderError>;

    async fn get_message(&self, cred: &Credential, id: &str)
    -> Result<MessageDetail, ProviderError>;

    /// Events on the primary calendar overlapping `[start, end)` (epoch seconds).
    async fn list_events(
        &self,
        cred: &Credential,
        start: i64,
        end: i64,
    ) -> Result<Vec<ProviderEvent>, ProviderError>;

    async fn modify_message(
        &self,
        cred: &Credential,
        id: &str,
        change: &LabelChange,
    ) -> Result<(), ProviderError>;

    async fn trash_message(&self, cred: &Credential, id: &str) -> Result<(), ProviderError>;

    async fn delete_message(&self, cred: &Credential, id: &str) -> Result<(), ProviderError>;
}
