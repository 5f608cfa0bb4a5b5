//! SQLite persistence for users, accounts, mail, events and suggestions.
//!
//! This module is split into:
//! - `mod.rs` - Store struct, connection pool, delegation
//! - `schema.rs` - Database schema initialization
//! - `codec.rs` - Encode/decode of list-valued columns
//! - `users.rs` - Users and the sync watermark
//! - `accounts.rs` - Linked accounts (already-encrypted token columns)
//! - `mail.rs` - Mail record upserts, candidate selection, status transitions
//! - `events.rs` - Calendar event upserts
//! - `suggestions.rs` - Cleanup suggestion upserts and decisions
//! - `preferences.rs` - Free-form per-user key/value preferences
//! - `action_log.rs` - Append-only audit log
//!
//! Every write keyed by a natural identity is an upsert, so re-running a sync
//! or a suggestion pass never duplicates rows.

mod accounts;
mod action_log;
pub mod codec;
mod events;
mod mail;
mod preferences;
mod schema;
mod suggestions;
mod users;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub use accounts::{AccountRow, NewAccount, TokenColumns};
pub use action_log::{ActionLogEntry, ActionOutcome};

#[cfg(test)]
pub(crate) use mail::tests::sample_mail;

use crate::types::{
    CalendarEventRecord, CleanupSuggestion, MailRecord, MailStatus, NewCalendarEvent,
    NewMailRecord, NewSuggestion, SuggestionStatus, UnknownVariant, User,
};

/// Connection pool size - allows concurrent reads and writes.
/// Sized for parallel per-user sync plus concurrent suggestion runs.
const POOL_SIZE: u32 = 16;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(#[from] UnknownVariant),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of applying a successful remote action locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionApplied {
    pub mail_updated: bool,
    pub suggestion_executed: bool,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Get a reference to the connection pool (for tests and advanced usage).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", path.display());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(POOL_SIZE)
            .connect_with(options)
            .await?;

        schema::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn open_in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // A single connection: every pooled connection would get its own memory DB.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        schema::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    //
    // Users and watermark
    //

    pub async fn upsert_user(&self, user_id: &str, email: &str) -> StoreResult<()> {
        users::upsert_user(&self.pool, user_id, email).await
    }

    pub async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        users::get_user(&self.pool, user_id).await
    }

    pub async fn list_users(&self) -> StoreResult<Vec<User>> {
        users::list_users(&self.pool).await
    }

    pub async fn delete_user(&self, user_id: &str) -> StoreResult<bool> {
        users::delete_user(&self.pool, user_id).await
    }

    /// Move the watermark forward to `synced_at`; never moves it backwards.
    pub async fn advance_watermark(&self, user_id: &str, synced_at: i64) -> StoreResult<i64> {
        users::advance_watermark(&self.pool, user_id, synced_at).await
    }

    //
    // Accounts (token columns are ciphertext at this layer)
    //

    pub async fn link_account(&self, account: &NewAccount) -> StoreResult<i64> {
        accounts::link_account(&self.pool, account).await
    }

    pub async fn get_account(&self, account_id: i64) -> StoreResult<Option<AccountRow>> {
        accounts::get_account(&self.pool, account_id).await
    }

    pub async fn find_linked_account(
        &self,
        user_id: &str,
        provider: &str,
    ) -> StoreResult<Option<AccountRow>> {
        accounts::find_linked_account(&self.pool, user_id, provider).await
    }

    pub async fn update_account_tokens(
        &self,
        account_id: i64,
        columns: &TokenColumns,
    ) -> StoreResult<bool> {
        accounts::update_tokens(&self.pool, account_id, columns).await
    }

    pub async fn clear_account_tokens(&self, account_id: i64) -> StoreResult<()> {
        accounts::clear_tokens(&self.pool, account_id).await
    }

    //
    // Mail
    //

    /// Insert or merge a mail record, returning its local id.
    pub async fn upsert_mail(&self, user_id: &str, record: &NewMailRecord) -> StoreResult<i64> {
        mail::upsert_mail(&self.pool, user_id, record).await
    }

    pub async fn get_mail(&self, user_id: &str, email_id: i64) -> StoreResult<Option<MailRecord>> {
        mail::get_mail(&self.pool, user_id, email_id).await
    }

    pub async fn get_mail_by_provider_id(
        &self,
        user_id: &str,
        provider_message_id: &str,
    ) -> StoreResult<Option<MailRecord>> {
        mail::get_mail_by_provider_id(&self.pool, user_id, provider_message_id).await
    }

    /// Active mail since `since` without a pending suggestion, newest first.
    pub async fn suggestion_candidates(
        &self,
        user_id: &str,
        since: i64,
        limit: u32,
    ) -> StoreResult<Vec<MailRecord>> {
        mail::suggestion_candidates(&self.pool, user_id, since, limit).await
    }

    pub async fn count_mail(&self, user_id: &str) -> StoreResult<usize> {
        mail::count_mail(&self.pool, user_id).await
    }

    /// Record a successful remote action: mail status plus suggestion CAS, atomically.
    pub async fn apply_action_result(
        &self,
        user_id: &str,
        email_id: i64,
        status: MailStatus,
    ) -> StoreResult<ActionApplied> {
        mail::apply_action_result(&self.pool, user_id, email_id, status).await
    }

    //
    // Calendar events
    //

    pub async fn upsert_event(&self, user_id: &str, event: &NewCalendarEvent) -> StoreResult<i64> {
        events::upsert_event(&self.pool, user_id, event).await
    }

    pub async fn get_event_by_provider_id(
        &self,
        user_id: &str,
        provider_event_id: &str,
    ) -> StoreResult<Option<CalendarEventRecord>> {
        events::get_event_by_provider_id(&self.pool, user_id, provider_event_id).await
    }

    pub async fn count_events(&self, user_id: &str) -> StoreResult<usize> {
        events::count_events(&self.pool, user_id).await
    }

    //
    // Suggestions
    //

    /// Insert or refresh the pending suggestion for an email.
    /// Returns `None` when the email already has a decided (non-pending) suggestion.
    pub async fn upsert_suggestion(
        &self,
        user_id: &str,
        suggestion: &NewSuggestion,
    ) -> StoreResult<Option<CleanupSuggestion>> {
        suggestions::upsert_suggestion(&self.pool, user_id, suggestion).await
    }

    pub async fn get_suggestion(
        &self,
        user_id: &str,
        email_id: i64,
    ) -> StoreResult<Option<CleanupSuggestion>> {
        suggestions::get_suggestion(&self.pool, user_id, email_id).await
    }

    pub async fn list_pending_suggestions(
        &self,
        user_id: &str,
    ) -> StoreResult<Vec<CleanupSuggestion>> {
        suggestions::list_pending(&self.pool, user_id).await
    }

    /// Record a decision on an open suggestion. Returns false if none was open.
    pub async fn decide_suggestion(
        &self,
        user_id: &str,
        email_id: i64,
        status: SuggestionStatus,
    ) -> StoreResult<bool> {
        suggestions::decide(&self.pool, user_id, email_id, status).await
    }

    pub async fn count_suggestions_for_email(
        &self,
        user_id: &str,
        email_id: i64,
    ) -> StoreResult<usize> {
        suggestions::count_for_email(&self.pool, user_id, email_id).await
    }

    //
    // Preferences
    //

    pub async fn set_preference(&self, user_id: &str, key: &str, value: &str) -> StoreResult<()> {
        preferences::set_preference(&self.pool, user_id, key, value).await
    }

    pub async fn get_preferences(&self, user_id: &str) -> StoreResult<HashMap<String, String>> {
        preferences::get_preferences(&self.pool, user_id).await
    }

    //
    // Action log
    //

    pub async fn append_action_log(&self, entry: &ActionLogEntry) -> StoreResult<()> {
        action_log::append(&self.pool, entry).await
    }

    pub async fn list_action_log(&self, user_id: &str) -> StoreResult<Vec<ActionLogEntry>> {
        action_log::list_for_user(&self.pool, user_id).await
    }
}
