//! Linked provider accounts.
//!
//! Token columns hold ciphertext produced by the credential store; this layer
//! never sees plaintext tokens.

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::StoreResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRow {
    pub id: i64,
    pub user_id: String,
    pub provider: String,
    pub provider_account_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub scopes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub user_id: String,
    pub provider: String,
    pub provider_account_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub scopes: Option<String>,
}

/// Partial token update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenColumns {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub scopes: Option<String>,
}

impl TokenColumns {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none()
            && self.refresh_token.is_none()
            && self.expires_at.is_none()
            && self.scopes.is_none()
    }
}

const ACCOUNT_COLUMNS: &str = "id, user_id, provider, provider_account_id, access_token, \
                               refresh_token, expires_at, scopes";

fn row_to_account(row: SqliteRow) -> AccountRow {
    AccountRow {
        id: row.get("id"),
        user_id: row.get("user_id"),
        provider: row.get("provider"),
        provider_account_id: row.get("provider_account_id"),
        access_token: row.get("access_token"),
        refresh_token: row.get("refresh_token"),
        expires_at: row.get("expires_at"),
        scopes: row.get("scopes"),
    }
}

/// Link (or relink) an account. A relink without a refresh token keeps the stored one.
pub async fn link_account(pool: &SqlitePool, account: &NewAccount) -> StoreResult<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO accounts
            (user_id, provider, provider_account_id, access_token, refresh_token, expires_at, scopes)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(provider, provider_account_id) DO UPDATE SET
            user_id = excluded.user_id,
            access_token = COALESCE(excluded.access_token, accounts.access_token),
            refresh_token = COALESCE(excluded.refresh_token, accounts.refresh_token),
            expires_at = COALESCE(excluded.expires_at, accounts.expires_at),
            scopes = COALESCE(excluded.scopes, accounts.scopes),
            updated_at = unixepoch()
        RETURNING id
        "#,
    )
    .bind(&account.user_id)
    .bind(&account.provider)
    .bind(&account.provider_account_id)
    .bind(&account.access_token)
    .bind(&account.refresh_token)
    .bind(account.expires_at)
    .bind(&account.scopes)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn get_account(pool: &SqlitePool, account_id: i64) -> StoreResult<Option<AccountRow>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM accounts WHERE id = ?",
        ACCOUNT_COLUMNS
    ))
    .bind(account_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(row_to_account))
}

/// Most recently updated account of `provider` that still holds both tokens.
pub async fn find_linked_account(
    pool: &SqlitePool,
    user_id: &str,
    provider: &str,
) -> StoreResult<Option<AccountRow>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM accounts WHERE user_id = ? AND provider = ? \
         AND access_token IS NOT NULL AND refresh_token IS NOT NULL \
         ORDER BY updated_at DESC, id DESC LIMIT 1",
        ACCOUNT_COLUMNS
    ))
    .bind(user_id)
    .bind(provider)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(row_to_account))
}

/// Write only the columns that are set. Returns false when nothing was written.
pub async fn update_tokens(
    pool: &SqlitePool,
    account_id: i64,
    columns: &TokenColumns,
) -> StoreResult<bool> {
    if columns.is_empty() {
        return Ok(false);
    }

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE accounts SET ");
    let mut set = query.separated(", ");
    if let Some(access_token) = &columns.access_token {
        set.push("access_token = ").push_bind_unseparated(access_token);
    }
    if let Some(refresh_token) = &columns.refresh_token {
        set.push("refresh_token = ").push_bind_unseparated(refresh_token);
    }
    if let Some(expires_at) = columns.expires_at {
        set.push("expires_at = ").push_bind_unseparated(expires_at);
    }
    if let Some(scopes) = &columns.scopes {
        set.push("scopes = ").push_bind_unseparated(scopes);
    }
    set.push("updated_at = unixepoch()");
    query.push(" WHERE id = ").push_bind(account_id);

    let result = query.build().execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

/// Drop all token material, forcing the user to re-authorize.
pub async fn clear_tokens(pool: &SqlitePool, account_id: i64) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE accounts
        SET access_token = NULL, refresh_token = NULL, expires_at = NULL, updated_at = unixepoch()
        WHERE id = ?
        "#,
    )
    .bind(account_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::Store;
    use super::*;

    async fn store_with_user() -> Store {
        let store = Store::open_in_memory().await.unwrap();
        store.upsert_user("u1", "u1@example.com").await.unwrap();
        store
    }

    fn account() -> NewAccount {
        NewAccount {
            user_id: "u1".to_string(),
            provider: "google".to_string(),
            provider_account_id: "g-1".to_string(),
            access_token: Some("enc-access".to_string()),
            refresh_token: Some("enc-refresh".to_string()),
            expires_at: Some(1_000),
            scopes: Some("mail calendar".to_string()),
        }
    }

    #[tokio::test]
    async fn test_relink_keeps_refresh_token() {
        let store = store_with_user().await;
        let id = store.link_account(&account()).await.unwrap();

        let relinked = NewAccount {
            access_token: Some("enc-access-2".to_string()),
            refresh_token: None,
            ..account()
        };
        assert_eq!(store.link_account(&relinked).await.unwrap(), id);

        let row = store.get_account(id).await.unwrap().unwrap();
        assert_eq!(row.access_token.as_deref(), Some("enc-access-2"));
        assert_eq!(row.refresh_token.as_deref(), Some("enc-refresh"));
    }

    #[tokio::test]
    async fn test_update_only_changed_columns() {
        let store = store_with_user().await;
        let id = store.link_account(&account()).await.unwrap();

        let changed = TokenColumns {
            access_token: Some("enc-access-new".to_string()),
            expires_at: Some(5_000),
            ..Default::default()
        };
        assert!(store.update_account_tokens(id, &changed).await.unwrap());
        assert!(
            !store
                .update_account_tokens(id, &TokenColumns::default())
                .await
                .unwrap()
        );

        let row = store.get_account(id).await.unwrap().unwrap();
        assert_eq!(row.access_token.as_deref(), Some("enc-access-new"));
        assert_eq!(row.refresh_token.as_deref(), Some("enc-refresh"));
        assert_eq!(row.expires_at, Some(5_000));
        assert_eq!(row.scopes.as_deref(), Some("mail calendar"));
    }

    #[tokio::test]
    async fn test_clear_and_find() {
        let store = store_with_user().await;
        let id = store.link_account(&account()).await.unwrap();

        let found = store
            .find_linked_account("u1", "google")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert!(store.find_linked_account("u1", "other").await.unwrap().is_none());

        store.clear_account_tokens(id).await.unwrap();
        let row = store.get_account(id).await.unwrap().unwrap();
        assert!(row.access_token.is_none());
        assert!(row.refresh_token.is_none());
        assert!(row.expires_at.is_none());
        assert!(store.find_linked_account("u1", "google").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleared_account_does_not_shadow_linked_one() {
        let store = store_with_user().await;
        let valid = store
            .link_account(&NewAccount {
                provider_account_id: "g-valid".to_string(),
                ..account()
            })
            .await
            .unwrap();
        let revoked = store
            .link_account(&NewAccount {
                provider_account_id: "g-revoked".to_string(),
                ..account()
            })
            .await
            .unwrap();
        store.clear_account_tokens(revoked).await.unwrap();

        let found = store
            .find_linked_account("u1", "google")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, valid);
    }
}
