//! Encrypted token storage on top of the account table.
//!
//! Plaintext tokens exist only in memory; every value written to the
//! `accounts` table passes through [`TokenCipher`] first.

use thiserror::Error;

use crate::crypto::{CryptoError, TokenCipher};
use crate::store::{AccountRow, NewAccount, Store, StoreError, TokenColumns};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Decrypted view of a linked account.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredAccount {
    pub id: i64,
    pub user_id: String,
    pub provider: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub scopes: Option<String>,
}

impl std::fmt::Debug for StoredAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredAccount")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("provider", &self.provider)
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Plaintext tokens for a new or relinked account.
#[derive(Debug, Clone, Default)]
pub struct LinkRequest {
    pub user_id: String,
    pub provider: String,
    pub provider_account_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub scopes: Option<String>,
}

/// Plaintext token changes. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUpdate {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub scopes: Option<String>,
}

impl TokenUpdate {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none()
            && self.refresh_token.is_none()
            && self.expires_at.is_none()
            && self.scopes.is_none()
    }
}

#[derive(Clone)]
pub struct CredentialStore {
    store: Store,
    cipher: TokenCipher,
}

impl CredentialStore {
    pub fn new(store: Store, cipher: TokenCipher) -> Self {
        Self { store, cipher }
    }

    pub async fn link(&self, request: &LinkRequest) -> Result<i64, CredentialError> {
        let account = NewAccount {
            user_id: request.user_id.clone(),
            provider: request.provider.clone(),
            provider_account_id: request.provider_account_id.clone(),
            access_token: Some(self.cipher.encrypt(&request.access_token)?),
            refresh_token: self.seal(request.refresh_token.as_deref())?,
            expires_at: request.expires_at,
            scopes: request.scopes.clone(),
        };
        Ok(self.store.link_account(&account).await?)
    }

    pub async fn find(
        &self,
        user_id: &str,
        provider: &str,
    ) -> Result<Option<StoredAccount>, CredentialError> {
        match self.store.find_linked_account(user_id, provider).await? {
            Some(row) => Ok(Some(self.open(row)?)),
            None => Ok(None),
        }
    }

    pub async fn get(&self, account_id: i64) -> Result<Option<StoredAccount>, CredentialError> {
        match self.store.get_account(account_id).await? {
            Some(row) => Ok(Some(self.open(row)?)),
            None => Ok(None),
        }
    }

    /// Persist changed token fields in a single row write.
    pub async fn update(&self, account_id: i64, update: &TokenUpdate) -> Result<bool, CredentialError> {
        if update.is_empty() {
            return Ok(false);
        }
        let columns = TokenColumns {
            access_token: self.seal(update.access_token.as_deref())?,
            refresh_token: self.seal(update.refresh_token.as_deref())?,
            expires_at: update.expires_at,
            scopes: update.scopes.clone(),
        };
        Ok(self.store.update_account_tokens(account_id, &columns).await?)
    }

    pub async fn clear(&self, account_id: i64) -> Result<(), CredentialError> {
        Ok(self.store.clear_account_tokens(account_id).await?)
    }

    fn seal(&self, value: Option<&str>) -> Result<Option<String>, CryptoError> {
        value.map(|v| self.cipher.encrypt(v)).transpose()
    }

    fn open(&self, row: AccountRow) -> Result<StoredAccount, CryptoError> {
        let unseal = |value: Option<String>| -> Result<Option<String>, CryptoError> {
            value.map(|v| self.cipher.decrypt(&v)).transpose()
        };
        Ok(StoredAccount {
            id: row.id,
            user_id: row.user_id,
            provider: row.provider,
            access_token: unseal(row.access_token)?,
            refresh_token: unseal(row.refresh_token)?,
            expires_at: row.expires_at,
            scopes: row.scopes,
        })
    }
}
