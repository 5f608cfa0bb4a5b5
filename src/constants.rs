//! Engine-wide constants for tuning and configuration
//!
//! Centralizes magic numbers to make them discoverable. Most of these are
//! defaults that `config.rs` exposes as overridable settings.

/// Provider name stored on linked accounts for Google (Gmail + Calendar).
pub const PROVIDER_GOOGLE: &str = "google";

/// Lookback window for a user that has never been synced.
pub const INITIAL_SYNC_LOOKBACK_DAYS: i64 = 30;

/// Maximum messages fetched per sync pass.
/// Bounds per-pass latency and memory; a long gap takes several passes to catch up.
pub const SYNC_PAGE_SIZE: u32 = 50;

/// Concurrent `get_message` calls within one user's sync pass.
pub const MESSAGE_FETCH_CONCURRENCY: usize = 5;

/// Users synced in parallel by `sync_all`.
pub const USER_SYNC_CONCURRENCY: usize = 4;

/// Upper bound on the network phase of one user's sync pass.
pub const USER_SYNC_TIMEOUT_SECS: u64 = 120;

/// Seconds before expiry at which an access token is treated as expired.
pub const TOKEN_EXPIRY_SKEW_SECS: i64 = 60;

/// Idle time after which a per-key lock is dropped from the registry.
pub const LOCK_IDLE_SECS: u64 = 600;

/// Candidate emails considered per suggestion run.
/// Bounds classification-service cost.
pub const SUGGESTION_CANDIDATE_LIMIT: u32 = 10;

/// Only mail received within this many days is considered for suggestions.
pub const SUGGESTION_LOOKBACK_DAYS: i64 = 30;

/// Snippets shorter than this trigger a body fetch for classification context.
pub const SHORT_SNIPPET_CHARS: usize = 50;

/// Maximum body excerpt sent to the classification service.
pub const BODY_EXCERPT_CHARS: usize = 1000;

/// Upper bound on evaluating one suggestion candidate.
pub const RECORD_TIMEOUT_SECS: u64 = 30;

/// Candidates evaluated in parallel.
pub const SUGGESTION_CONCURRENCY: usize = 3;

/// HTTP request timeout for provider and classification calls.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default poll cadence of the bundled scheduler loop.
pub const POLL_INTERVAL_SECS: u64 = 300;

/// Preference keys read by the suggestion engine.
pub const PREF_UNWANTED_SENDERS: &str = "unwanted_senders";
pub const PREF_AUTO_CLEAN_AGE_DAYS: &str = "auto_clean_age_days";

/// Gmail system labels the engine cares about.
pub const LABEL_INBOX: &str = "INBOX";
pub const LABEL_UNREAD: &str = "UNREAD";
pub const LABEL_TRASH: &str = "TRASH";

/// Longest response body kept in provider error messages.
pub const REDACTED_BODY_MAX_LEN: usize = 200;
