//! Cleanup suggestion persistence.
//!
//! The row id is derived from `(user_id, email_id)`, so the upsert conflict
//! target is the primary key and an email holds at most one suggestion row.
//! Only rows still `pending` are refreshed; decided rows are left alone.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::StoreResult;
use crate::types::{CleanupSuggestion, NewSuggestion, SuggestionStatus, suggestion_id};

const SUGGESTION_COLUMNS: &str = "id, user_id, email_id, provider_message_id, from_addr, \
                                  subject, snippet, reason, suggested_action, status";

fn row_to_suggestion(row: SqliteRow) -> StoreResult<CleanupSuggestion> {
    let action: String = row.get("suggested_action");
    let status: String = row.get("status");
    Ok(CleanupSuggestion {
        id: row.get("id"),
        user_id: row.get("user_id"),
        email_id: row.get("email_id"),
        provider_message_id: row.get("provider_message_id"),
        from: row.get("from_addr"),
        subject: row.get("subject"),
        snippet: row.get("snippet"),
        reason: row.get("reason"),
        suggested_action: action.parse()?,
        status: status.parse()?,
    })
}

pub async fn upsert_suggestion(
    pool: &SqlitePool,
    user_id: &str,
    suggestion: &NewSuggestion,
) -> StoreResult<Option<CleanupSuggestion>> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO cleanup_suggestions
            (id, user_id, email_id, provider_message_id, from_addr, subject, snippet,
             reason, suggested_action, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            provider_message_id = excluded.provider_message_id,
            from_addr = excluded.from_addr,
            subject = excluded.subject,
            snippet = excluded.snippet,
            reason = excluded.reason,
            suggested_action = excluded.suggested_action,
            updated_at = unixepoch()
        WHERE cleanup_suggestions.status = excluded.status
        RETURNING {}
        "#,
        SUGGESTION_COLUMNS
    ))
    .bind(suggestion_id(user_id, suggestion.email_id))
    .bind(user_id)
    .bind(suggestion.email_id)
    .bind(&suggestion.provider_message_id)
    .bind(&suggestion.from)
    .bind(&suggestion.subject)
    .bind(&suggestion.snippet)
    .bind(&suggestion.reason)
    .bind(suggestion.suggested_action.as_str())
    .bind(SuggestionStatus::Pending.as_str())
    .fetch_optional(pool)
    .await?;
    row.map(row_to_suggestion).transpose()
}

pub async fn get_suggestion(
    pool: &SqlitePool,
    user_id: &str,
    email_id: i64,
) -> StoreResult<Option<CleanupSuggestion>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM cleanup_suggestions WHERE id = ?",
        SUGGESTION_COLUMNS
    ))
    .bind(suggestion_id(user_id, email_id))
    .fetch_optional(pool)
    .await?;
    row.map(row_to_suggestion).transpose()
}

pub async fn list_pending(pool: &SqlitePool, user_id: &str) -> StoreResult<Vec<CleanupSuggestion>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM cleanup_suggestions WHERE user_id = ? AND status = ? \
         ORDER BY created_at DESC, email_id DESC",
        SUGGESTION_COLUMNS
    ))
    .bind(user_id)
    .bind(SuggestionStatus::Pending.as_str())
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(row_to_suggestion).collect()
}

/// Record a user decision on an open (pending or approved) suggestion.
pub async fn decide(
    pool: &SqlitePool,
    user_id: &str,
    email_id: i64,
    status: SuggestionStatus,
) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE cleanup_suggestions
        SET status = ?, updated_at = unixepoch()
        WHERE id = ? AND status IN (?, ?) AND status != ?
        "#,
    )
    .bind(status.as_str())
    .bind(suggestion_id(user_id, email_id))
    .bind(SuggestionStatus::Pending.as_str())
    .bind(SuggestionStatus::Approved.as_str())
    .bind(status.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_for_email(pool: &SqlitePool, user_id: &str, email_id: i64) -> StoreResult<usize> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM cleanup_suggestions WHERE user_id = ? AND email_id = ?",
    )
    .bind(user_id)
    .bind(email_id)
    .fetch_one(pool)
    .await?;
    Ok(count as usize)
}

#[cfg(test)]
mod tests {
    use super::super::Store;
    use super::super::mail::tests::sample_mail;
    use crate::types::{NewSuggestion, SuggestedAction, SuggestionStatus};

    async fn store_with_mail() -> (Store, i64) {
        let store = Store::open_in_memory().await.unwrap();
        store.upsert_user("u1", "u1@example.com").await.unwrap();
        let id = store.upsert_mail("u1", &sample_mail("m1", 1_000)).await.unwrap();
        (store, id)
    }

    fn suggestion(email_id: i64, action: SuggestedAction, reason: &str) -> NewSuggestion {
        NewSuggestion {
            email_id,
            provider_message_id: "m1".to_string(),
            from: "Deals <newsletter@shop.com>".to_string(),
            subject: "Weekly deals".to_string(),
            snippet: "Save 20% this week".to_string(),
            reason: reason.to_string(),
            suggested_action: action,
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_one_pending_row() {
        let (store, id) = store_with_mail().await;

        let first = store
            .upsert_suggestion("u1", &suggestion(id, SuggestedAction::Archive, "first"))
            .await
            .unwrap()
            .unwrap();
        let second = store
            .upsert_suggestion("u1", &suggestion(id, SuggestedAction::Trash, "second"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.reason, "second");
        assert_eq!(second.suggested_action, SuggestedAction::Trash);
        assert_eq!(store.count_suggestions_for_email("u1", id).await.unwrap(), 1);
        assert_eq!(store.list_pending_suggestions("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_decided_rows_are_not_reset() {
        let (store, id) = store_with_mail().await;
        store
            .upsert_suggestion("u1", &suggestion(id, SuggestedAction::Archive, "first"))
            .await
            .unwrap();
        assert!(
            store
                .decide_suggestion("u1", id, SuggestionStatus::Rejected)
                .await
                .unwrap()
        );

        let refreshed = store
            .upsert_suggestion("u1", &suggestion(id, SuggestedAction::Trash, "again"))
            .await
            .unwrap();
        assert!(refreshed.is_none());

        let stored = store.get_suggestion("u1", id).await.unwrap().unwrap();
        assert_eq!(stored.status, SuggestionStatus::Rejected);
        assert_eq!(stored.reason, "first");
        assert!(store.list_pending_suggestions("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decide_transitions() {
        let (store, id) = store_with_mail().await;
        assert!(
            !store
                .decide_suggestion("u1", id, SuggestionStatus::Approved)
                .await
                .unwrap()
        );

        store
            .upsert_suggestion("u1", &suggestion(id, SuggestedAction::Archive, "r"))
            .await
            .unwrap();
        assert!(
            store
                .decide_suggestion("u1", id, SuggestionStatus::Approved)
                .await
                .unwrap()
        );
        assert!(
            !store
                .decide_suggestion("u1", id, SuggestionStatus::Approved)
                .await
                .unwrap()
        );
        assert!(
            store
                .decide_suggestion("u1", id, SuggestionStatus::Rejected)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_deleting_mail_removes_suggestion() {
        let (store, id) = store_with_mail().await;
        store
            .upsert_suggestion("u1", &suggestion(id, SuggestedAction::Archive, "r"))
            .await
            .unwrap();
        sqlx::query("DELETE FROM mail WHERE id = ?")
            .bind(id)
            .execute(store.pool())
            .await
            .unwrap();
        assert_eq!(store.count_suggestions_for_email("u1", id).await.unwrap(), 0);
    }
}
