//! Per-item failure records returned inside batch reports.
//!
//! Batch operations (sync, suggestion generation) never abort on a single bad
//! item. Each failure is captured here so callers can decide whether to alert.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Remote fetch failed (network, provider status).
    Fetch,
    /// Provider payload could not be normalized.
    Parse,
    /// Local write failed.
    Store,
    /// Classification service failed or returned garbage.
    Classify,
    /// Item exceeded its time budget and was abandoned before writing.
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetch => "fetch",
            Self::Parse => "parse",
            Self::Store => "store",
            Self::Classify => "classify",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    /// Provider id (message/event) or local email id the failure belongs to.
    pub item_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl ItemError {
    pub fn new(item_id: impl Into<String>, kind: ErrorKind, message: impl fmt::Display) -> Self {
        Self {
            item_id: item_id.into(),
            kind,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.item_id, self.kind, self.message)
    }
}
