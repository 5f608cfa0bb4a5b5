//! One sync pass per user: fetch a bounded window of mail and events, upsert,
//! then move the watermark.
//!
//! The pass has two phases. The network phase (listing and fetching) runs
//! under the per-user timeout and writes nothing. The write phase upserts
//! whatever was fetched and finally advances `last_synced_at`, so an abandoned
//! pass leaves no partial state behind.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::normalize::{normalize_event, normalize_message};
use crate::constants::{
    INITIAL_SYNC_LOOKBACK_DAYS, MESSAGE_FETCH_CONCURRENCY, SYNC_PAGE_SIZE,
    USER_SYNC_CONCURRENCY, USER_SYNC_TIMEOUT_SECS,
};
use crate::error::{ErrorKind, ItemError};
use crate::provider::{MailProvider, MessageDetail, ProviderError, ProviderEvent};
use crate::store::{Store, StoreError};
use crate::token::{Credential, TokenError, TokenManager};

const SECS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub page_size: u32,
    pub fetch_concurrency: usize,
    pub initial_lookback_days: i64,
    pub user_timeout: Duration,
    pub user_concurrency: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: SYNC_PAGE_SIZE,
            fetch_concurrency: MESSAGE_FETCH_CONCURRENCY,
            initial_lookback_days: INITIAL_SYNC_LOOKBACK_DAYS,
            user_timeout: Duration::from_secs(USER_SYNC_TIMEOUT_SECS),
            user_concurrency: USER_SYNC_CONCURRENCY,
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("unknown user {0}")]
    UnknownUser(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("sync for {user_id} timed out after {secs}s")]
    Timeout { user_id: String, secs: u64 },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub user_id: String,
    /// Messages successfully upserted this pass.
    pub messages_fetched: usize,
    pub events_fetched: usize,
    pub errors: Vec<ItemError>,
    pub window_start: i64,
    /// Watermark after the pass.
    pub watermark: Option<i64>,
}

#[derive(Debug)]
pub struct SyncOutcome {
    pub user_id: String,
    pub result: Result<SyncReport, SyncError>,
}

/// Everything the network phase produced, before any write.
struct Fetched {
    messages: Vec<Result<MessageDetail, ItemError>>,
    /// Set when the message listing itself failed.
    listing_error: Option<ItemError>,
    events: Result<Vec<ProviderEvent>, ItemError>,
}

#[derive(Clone)]
pub struct SyncEngine {
    store: Store,
    tokens: TokenManager,
    provider: Arc<dyn MailProvider>,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        store: Store,
        tokens: TokenManager,
        provider: Arc<dyn MailProvider>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            tokens,
            provider,
            settings,
        }
    }

    pub async fn sync_user(&self, user_id: &str) -> Result<SyncReport, SyncError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| SyncError::UnknownUser(user_id.to_string()))?;

        let pass_started = chrono::Utc::now().timestamp();
        let window_start = user
            .last_synced_at
            .unwrap_or(pass_started - self.settings.initial_lookback_days * SECS_PER_DAY);

        let cred = self.tokens.get_live_credential(user_id).await?;

        tracing::debug!(user_id, window_start, "Starting sync pass");

        let fetched = tokio::time::timeout(
            self.settings.user_timeout,
            self.fetch(&cred, window_start, pass_started),
        )
        .await
        .map_err(|_| {
            tracing::warn!(user_id, "Sync pass timed out, nothing written");
            SyncError::Timeout {
                user_id: user_id.to_string(),
                secs: self.settings.user_timeout.as_secs(),
            }
        })?;

        let mut report = SyncReport {
            user_id: user_id.to_string(),
            messages_fetched: 0,
            events_fetched: 0,
            errors: Vec::new(),
            window_start,
            watermark: user.last_synced_at,
        };

        let listing_failed = fetched.listing_error.is_some();
        report.errors.extend(fetched.listing_error);

        for message in fetched.messages {
            match self.store_message(user_id, message).await {
                Ok(()) => report.messages_fetched += 1,
                Err(e) => report.errors.push(e),
            }
        }

        match fetched.events {
            Ok(events) => {
                for event in events {
                    let event_id = event.id.clone();
                    match self.store.upsert_event(user_id, &normalize_event(event)).await {
                        Ok(_) => report.events_fetched += 1,
                        Err(e) => report
                            .errors
                            .push(ItemError::new(event_id, ErrorKind::Store, e)),
                    }
                }
            }
            Err(e) => report.errors.push(e),
        }

        for error in &report.errors {
            tracing::warn!(user_id, item = %error.item_id, kind = %error.kind, "{}", error.message);
        }

        // Nothing in the window was seen, so the next pass must retry it
        if listing_failed {
            tracing::warn!(user_id, "Message listing failed, watermark held");
        } else {
            report.watermark = Some(self.store.advance_watermark(user_id, pass_started).await?);
        }

        tracing::info!(
            user_id,
            messages = report.messages_fetched,
            events = report.events_fetched,
            errors = report.errors.len(),
            "Sync pass complete"
        );
        Ok(report)
    }

    /// Sync every known user; one user's failure never stops the others.
    pub async fn sync_all(&self) -> Result<Vec<SyncOutcome>, StoreError> {
        let users = self.store.list_users().await?;

        let outcomes = stream::iter(users)
            .map(|user| async move {
                let result = self.sync_user(&user.id).await;
                if let Err(e) = &result {
                    tracing::warn!(user_id = %user.id, error = %e, "User sync failed");
                }
                SyncOutcome {
                    user_id: user.id,
                    result,
                }
            })
            .buffer_unordered(self.settings.user_concurrency.max(1))
            .collect()
            .await;

        Ok(outcomes)
    }

    async fn fetch(&self, cred: &Credential, window_start: i64, pass_started: i64) -> Fetched {
        let ((messages, listing_error), events) = tokio::join!(
            self.fetch_messages(cred, window_start),
            self.provider.list_events(cred, window_start, pass_started),
        );

        Fetched {
            messages,
            listing_error,
            events: events.map_err(|e| ItemError::new("events", fetch_kind(&e), e)),
        }
    }

    async fn fetch_messages(
        &self,
        cred: &Credential,
        window_start: i64,
    ) -> (Vec<Result<MessageDetail, ItemError>>, Option<ItemError>) {
        let summaries = match self
            .provider
            .list_messages_since(cred, window_start, self.settings.page_size)
            .await
        {
            Ok(summaries) => summaries,
            Err(e) => {
                return (
                    Vec::new(),
                    Some(ItemError::new("messages", fetch_kind(&e), e)),
                );
            }
        };

        let details = stream::iter(summaries)
            .map(|summary| async move {
                self.provider
                    .get_message(cred, &summary.id)
                    .await
                    .map_err(|e| ItemError::new(summary.id.clone(), fetch_kind(&e), e))
            })
            .buffer_unordered(self.settings.fetch_concurrency.max(1))
            .collect()
            .await;

        (details, None)
    }

    async fn store_message(
        &self,
        user_id: &str,
        fetched: Result<MessageDetail, ItemError>,
    ) -> Result<(), ItemError> {
        let detail = fetched?;
        let record = normalize_message(&detail)
            .map_err(|e| ItemError::new(detail.id.clone(), ErrorKind::Parse, e))?;
        self.store
            .upsert_mail(user_id, &record)
            .await
            .map(|_| ())
            .map_err(|e| ItemError::new(detail.id, ErrorKind::Store, e))
    }
}

fn fetch_kind(error: &ProviderError) -> ErrorKind {
    match error {
        ProviderError::Decode(_) => ErrorKind::Parse,
        _ => ErrorKind::Fetch,
    }
}
