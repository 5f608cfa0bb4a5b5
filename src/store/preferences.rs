//! Free-form per-user preferences.

use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use super::StoreResult;

pub async fn set_preference(
    pool: &SqlitePool,
    user_id: &str,
    key: &str,
    value: &str,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO preferences (user_id, key, value) VALUES (?, ?, ?)
        ON CONFLICT(user_id, key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(user_id)
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_preferences(
    pool: &SqlitePool,
    user_id: &str,
) -> StoreResult<HashMap<String, String>> {
    let rows = sqlx::query("SELECT key, value FROM preferences WHERE user_id = ?")
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| (row.get("key"), row.get("value")))
        .collect())
}
