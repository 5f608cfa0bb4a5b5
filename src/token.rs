//! Live credentials for a user's linked provider account.
//!
//! Refresh is single-flight per account: concurrent callers that find an
//! expiring token queue on the account's lock, and every caller re-reads the
//! account once it holds the lock so a refresh finished by someone else is reused.

use std::sync::Arc;
use thiserror::Error;

use crate::constants::TOKEN_EXPIRY_SKEW_SECS;
use crate::credentials::{CredentialError, CredentialStore, StoredAccount, TokenUpdate};
use crate::crypto::CryptoError;
use crate::locks::KeyedLocks;
use crate::oauth2::{RefreshError, TokenRefresher};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("user {0} has no linked account")]
    NoLinkedAccount(String),

    /// The refresh token was revoked; tokens have been cleared.
    #[error("account {account_id} must be re-authorized")]
    ReauthRequired { account_id: i64 },

    #[error("token refresh failed: {0}")]
    Refresh(#[source] RefreshError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<CredentialError> for TokenError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Storage(e) => Self::Storage(e),
            CredentialError::Crypto(e) => Self::Crypto(e),
        }
    }
}

/// Plaintext tokens for one provider call. Never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub account_id: i64,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<i64>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("account_id", &self.account_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl Credential {
    fn from_account(account: StoredAccount) -> Option<Self> {
        Some(Self {
            account_id: account.id,
            access_token: account.access_token?,
            refresh_token: account.refresh_token?,
            expires_at: account.expires_at,
        })
    }

    /// Unknown expiry counts as expired.
    pub fn is_live(&self, now: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at - TOKEN_EXPIRY_SKEW_SECS > now)
    }
}

#[derive(Clone)]
pub struct TokenManager {
    credentials: CredentialStore,
    refresher: Arc<dyn TokenRefresher>,
    provider: String,
    refresh_locks: KeyedLocks<i64>,
}

impl TokenManager {
    pub fn new(
        credentials: CredentialStore,
        refresher: Arc<dyn TokenRefresher>,
        provider: &str,
    ) -> Self {
        Self {
            credentials,
            refresher,
            provider: provider.to_string(),
            refresh_locks: KeyedLocks::new(),
        }
    }

    pub async fn get_live_credential(&self, user_id: &str) -> Result<Credential, TokenError> {
        let account = self
            .credentials
            .find(user_id, &self.provider)
            .await?
            .and_then(Credential::from_account)
            .ok_or_else(|| TokenError::NoLinkedAccount(user_id.to_string()))?;

        if account.is_live(now()) {
            return Ok(account);
        }

        let account_id = account.account_id;
        let _guard = self.refresh_locks.lock(account_id).await;

        // Someone else may have refreshed (or cleared) while we waited
        let no_account = || TokenError::NoLinkedAccount(user_id.to_string());
        let stored = self.credentials.get(account_id).await?.ok_or_else(no_account)?;
        let scopes = stored.scopes.clone();
        let current = Credential::from_account(stored).ok_or_else(no_account)?;
        if current.is_live(now()) {
            tracing::debug!(user_id, account_id, "Reusing token refreshed by another caller");
            return Ok(current);
        }

        self.refresh(user_id, current, scopes.as_deref()).await
    }

    async fn refresh(
        &self,
        user_id: &str,
        current: Credential,
        stored_scopes: Option<&str>,
    ) -> Result<Credential, TokenError> {
        let account_id = current.account_id;
        tracing::debug!(user_id, account_id, "Refreshing access token");

        let grant = match self.refresher.refresh(&current.refresh_token).await {
            Ok(grant) => grant,
            Err(RefreshError::InvalidGrant(reason)) => {
                tracing::warn!(user_id, account_id, %reason, "Refresh token revoked, clearing tokens");
                self.credentials.clear(account_id).await?;
                return Err(TokenError::ReauthRequired { account_id });
            }
            Err(e) => {
                tracing::warn!(user_id, account_id, error = %e, "Token refresh failed");
                return Err(TokenError::Refresh(e));
            }
        };

        let expires_at = grant.expires_in.map(|secs| now() + secs);
        let update = TokenUpdate {
            access_token: (grant.access_token != current.access_token)
                .then(|| grant.access_token.clone()),
            refresh_token: grant
                .refresh_token
                .clone()
                .filter(|token| *token != current.refresh_token),
            expires_at: expires_at.filter(|at| Some(*at) != current.expires_at),
            scopes: grant
                .scope
                .clone()
                .filter(|scope| Some(scope.as_str()) != stored_scopes),
        };
        if !update.is_empty() {
            self.credentials.update(account_id, &update).await?;
        }

        Ok(Credential {
            account_id,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.unwrap_or(current.refresh_token),
            expires_at: expires_at.or(current.expires_at),
        })
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
