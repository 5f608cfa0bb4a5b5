//! Mail record persistence.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::codec::{decode_strings, encode_list};
use super::{ActionApplied, StoreResult};
use crate::types::{MailRecord, MailStatus, NewMailRecord, SuggestionStatus};

const MAIL_COLUMNS: &str = "m.id, m.user_id, m.provider_message_id, m.thread_id, m.from_addr, \
                            m.to_addrs, m.cc_addrs, m.bcc_addrs, m.subject, m.snippet, \
                            m.internal_date, m.is_read, m.labels, m.status, m.raw_body_hash";

fn row_to_mail(row: SqliteRow) -> StoreResult<MailRecord> {
    let status: String = row.get("status");
    Ok(MailRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        provider_message_id: row.get("provider_message_id"),
        thread_id: row.get("thread_id"),
        from: row.get("from_addr"),
        to: decode_strings(row.get::<Option<String>, _>("to_addrs").as_deref()),
        cc: decode_strings(row.get::<Option<String>, _>("cc_addrs").as_deref()),
        bcc: decode_strings(row.get::<Option<String>, _>("bcc_addrs").as_deref()),
        subject: row.get("subject"),
        snippet: row.get("snippet"),
        internal_date: row.get("internal_date"),
        is_read: row.get("is_read"),
        labels: decode_strings(row.get::<Option<String>, _>("labels").as_deref()),
        status: status.parse()?,
        raw_body_hash: row.get("raw_body_hash"),
    })
}

/// Upsert by `(user_id, provider_message_id)`; identity columns are never overwritten.
pub async fn upsert_mail(
    pool: &SqlitePool,
    user_id: &str,
    record: &NewMailRecord,
) -> StoreResult<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO mail
            (user_id, provider_message_id, thread_id, from_addr, to_addrs, cc_addrs, bcc_addrs,
             subject, snippet, internal_date, is_read, labels, status, raw_body_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, provider_message_id) DO UPDATE SET
            from_addr = excluded.from_addr,
            to_addrs = excluded.to_addrs,
            cc_addrs = excluded.cc_addrs,
            bcc_addrs = excluded.bcc_addrs,
            subject = excluded.subject,
            snippet = excluded.snippet,
            internal_date = excluded.internal_date,
            is_read = excluded.is_read,
            labels = excluded.labels,
            status = excluded.status,
            raw_body_hash = COALESCE(excluded.raw_body_hash, mail.raw_body_hash)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(&record.provider_message_id)
    .bind(&record.thread_id)
    .bind(&record.from)
    .bind(encode_list(&record.to))
    .bind(encode_list(&record.cc))
    .bind(encode_list(&record.bcc))
    .bind(&record.subject)
    .bind(&record.snippet)
    .bind(record.internal_date)
    .bind(record.is_read)
    .bind(encode_list(&record.labels))
    .bind(record.status.as_str())
    .bind(&record.raw_body_hash)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn get_mail(
    pool: &SqlitePool,
    user_id: &str,
    email_id: i64,
) -> StoreResult<Option<MailRecord>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM mail m WHERE m.user_id = ? AND m.id = ?",
        MAIL_COLUMNS
    ))
    .bind(user_id)
    .bind(email_id)
    .fetch_optional(pool)
    .await?;
    row.map(row_to_mail).transpose()
}

pub async fn get_mail_by_provider_id(
    pool: &SqlitePool,
    user_id: &str,
    provider_message_id: &str,
) -> StoreResult<Option<MailRecord>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM mail m WHERE m.user_id = ? AND m.provider_message_id = ?",
        MAIL_COLUMNS
    ))
    .bind(user_id)
    .bind(provider_message_id)
    .fetch_optional(pool)
    .await?;
    row.map(row_to_mail).transpose()
}

/// Active mail received at or after `since`, excluding mail with a pending suggestion.
pub async fn suggestion_candidates(
    pool: &SqlitePool,
    user_id: &str,
    since: i64,
    limit: u32,
) -> StoreResult<Vec<MailRecord>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {}
        FROM mail m
        LEFT JOIN cleanup_suggestions s
            ON s.user_id = m.user_id AND s.email_id = m.id AND s.status = ?
        WHERE m.user_id = ? AND m.status = ? AND m.internal_date >= ? AND s.id IS NULL
        ORDER BY m.internal_date DESC, m.id DESC
        LIMIT ?
        "#,
        MAIL_COLUMNS
    ))
    .bind(SuggestionStatus::Pending.as_str())
    .bind(user_id)
    .bind(MailStatus::Active.as_str())
    .bind(since)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(row_to_mail).collect()
}

pub async fn count_mail(pool: &SqlitePool, user_id: &str) -> StoreResult<usize> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mail WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(count as usize)
}

/// Set the mail status and execute its open suggestion in one transaction.
pub async fn apply_action_result(
    pool: &SqlitePool,
    user_id: &str,
    email_id: i64,
    status: MailStatus,
) -> StoreResult<ActionApplied> {
    let mut tx = pool.begin().await?;

    let mail = sqlx::query("UPDATE mail SET status = ? WHERE user_id = ? AND id = ?")
        .bind(status.as_str())
        .bind(user_id)
        .bind(email_id)
        .execute(&mut *tx)
        .await?;

    let suggestion = sqlx::query(
        r#"
        UPDATE cleanup_suggestions
        SET status = ?, updated_at = unixepoch()
        WHERE user_id = ? AND email_id = ? AND status IN (?, ?)
        "#,
    )
    .bind(SuggestionStatus::Executed.as_str())
    .bind(user_id)
    .bind(email_id)
    .bind(SuggestionStatus::Pending.as_str())
    .bind(SuggestionStatus::Approved.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(ActionApplied {
        mail_updated: mail.rows_affected() > 0,
        suggestion_executed: suggestion.rows_affected() > 0,
    })
}
