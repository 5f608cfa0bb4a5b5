//! Domain records shared by the sync, suggestion and action components.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a stored enum column holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailStatus {
    Active,
    Archived,
    Trashed,
    Deleted,
}

string_enum!(MailStatus, "mail status", {
    Active => "active",
    Archived => "archived",
    Trashed => "trashed",
    Deleted => "deleted",
});

impl MailStatus {
    /// Whether an action moving mail to `target` can still apply. Deleted mail
    /// is gone, and a status already reached needs no second call.
    pub fn can_move_to(&self, target: MailStatus) -> bool {
        *self != Self::Deleted && *self != target
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

string_enum!(EventStatus, "event status", {
    Confirmed => "confirmed",
    Tentative => "tentative",
    Cancelled => "cancelled",
});

impl EventStatus {
    /// Map a provider status onto the local three-state enum.
    /// Unrecognized or absent values become `Confirmed`.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("tentative") => Self::Tentative,
            Some("cancelled") | Some("canceled") => Self::Cancelled,
            _ => Self::Confirmed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    Archive,
    Trash,
    DeletePermanently,
}

string_enum!(SuggestedAction, "suggested action", {
    Archive => "archive",
    Trash => "trash",
    DeletePermanently => "delete_permanently",
});

impl SuggestedAction {
    /// Mail status reached once the action succeeds remotely.
    pub fn resulting_status(&self) -> MailStatus {
        match self {
            Self::Archive => MailStatus::Archived,
            Self::Trash => MailStatus::Trashed,
            Self::DeletePermanently => MailStatus::Deleted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
}

string_enum!(SuggestionStatus, "suggestion status", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Executed => "executed",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Sync watermark (epoch seconds).
    pub last_synced_at: Option<i64>,
}

/// Mail record as produced by normalization, before it has a local id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMailRecord {
    pub provider_message_id: String,
    pub thread_id: Option<String>,
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub snippet: String,
    pub internal_date: i64,
    pub is_read: bool,
    pub labels: Vec<String>,
    pub status: MailStatus,
    pub raw_body_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailRecord {
    pub id: i64,
    pub user_id: String,
    pub provider_message_id: Option<String>,
    pub thread_id: Option<String>,
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub snippet: String,
    pub internal_date: i64,
    pub is_read: bool,
    pub labels: Vec<String>,
    pub status: MailStatus,
    pub raw_body_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub email: String,
    #[serde(default)]
    pub response_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCalendarEvent {
    pub provider_event_id: String,
    pub calendar_id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub location: Option<String>,
    pub attendees: Vec<Attendee>,
    pub status: EventStatus,
    pub html_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEventRecord {
    pub id: i64,
    pub user_id: String,
    pub provider_event_id: String,
    pub calendar_id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub location: Option<String>,
    pub attendees: Vec<Attendee>,
    pub status: EventStatus,
    pub html_link: Option<String>,
}

/// Suggestion produced by rule evaluation, before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSuggestion {
    pub email_id: i64,
    pub provider_message_id: String,
    pub from: String,
    pub subject: String,
    pub snippet: String,
    pub reason: String,
    pub suggested_action: SuggestedAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupSuggestion {
    pub id: String,
    pub user_id: String,
    pub email_id: i64,
    pub provider_message_id: String,
    pub from: String,
    pub subject: String,
    pub snippet: String,
    pub reason: String,
    pub suggested_action: SuggestedAction,
    pub status: SuggestionStatus,
}

/// Deterministic suggestion identity: one row per email per user.
pub fn suggestion_id(user_id: &str, email_id: i64) -> String {
    format!("{}:{}", user_id, email_id)
}
