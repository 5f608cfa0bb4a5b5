//! Users and the per-user sync watermark.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::StoreResult;
use crate::types::User;

fn row_to_user(row: SqliteRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        last_synced_at: row.get("last_synced_at"),
    }
}

pub async fn upsert_user(pool: &SqlitePool, user_id: &str, email: &str) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO users (id, email) VALUES (?, ?)
        ON CONFLICT(id) DO UPDATE SET email = excluded.email
        "#,
    )
    .bind(user_id)
    .bind(email)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_user(pool: &SqlitePool, user_id: &str) -> StoreResult<Option<User>> {
    let row = sqlx::query("SELECT id, email, last_synced_at FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(row_to_user))
}

pub async fn list_users(pool: &SqlitePool) -> StoreResult<Vec<User>> {
    let rows = sqlx::query("SELECT id, email, last_synced_at FROM users ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(row_to_user).collect())
}

pub async fn delete_user(pool: &SqlitePool, user_id: &str) -> StoreResult<bool> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Returns the resulting watermark, which is never lower than the previous one.
pub async fn advance_watermark(
    pool: &SqlitePool,
    user_id: &str,
    synced_at: i64,
) -> StoreResult<i64> {
    let watermark: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE users
        SET last_synced_at = MAX(COALESCE(last_synced_at, 0), ?)
        WHERE id = ?
        RETURNING last_synced_at
        "#,
    )
    .bind(synced_at)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(watermark.unwrap_or(synced_at))
}

#[cfg(test)]
mod tests {
    use super::super::Store;

    #[tokio::test]
    async fn test_upsert_user_updates_email() {
        let store = Store::open_in_memory().await.unwrap();
        store.upsert_user("u1", "old@example.com").await.unwrap();
        store.upsert_user("u1", "new@example.com").await.unwrap();

        let user = store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.email, "new@example.com");
        assert_eq!(user.last_synced_at, None);
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_watermark_never_moves_backwards() {
        let store = Store::open_in_memory().await.unwrap();
        store.upsert_user("u1", "u1@example.com").await.unwrap();

        assert_eq!(store.advance_watermark("u1", 1_000).await.unwrap(), 1_000);
        assert_eq!(store.advance_watermark("u1", 500).await.unwrap(), 1_000);
        assert_eq!(store.advance_watermark("u1", 2_000).await.unwrap(), 2_000);

        let user = store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.last_synced_at, Some(2_000));
    }

    #[tokio::test]
    async fn test_delete_user() {
        let store = Store::open_in_memory().await.unwrap();
        store.upsert_user("u1", "u1@example.com").await.unwrap();
        assert!(store.delete_user("u1").await.unwrap());
        assert!(!store.delete_user("u1").await.unwrap());
        assert!(store.get_user("u1").await.unwrap().is_none());
    }
}
