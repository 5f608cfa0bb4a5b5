//! Calendar event persistence.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::StoreResult;
use super::codec::{decode_attendees, encode_list};
use crate::types::{CalendarEventRecord, NewCalendarEvent};

fn row_to_event(row: SqliteRow) -> StoreResult<CalendarEventRecord> {
    let status: String = row.get("status");
    Ok(CalendarEventRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        provider_event_id: row.get("provider_event_id"),
        calendar_id: row.get("calendar_id"),
        summary: row.get("summary"),
        description: row.get("description"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        location: row.get("location"),
        attendees: decode_attendees(row.get::<Option<String>, _>("attendees").as_deref()),
        status: status.parse()?,
        html_link: row.get("html_link"),
    })
}

pub async fn upsert_event(
    pool: &SqlitePool,
    user_id: &str,
    event: &NewCalendarEvent,
) -> StoreResult<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO calendar_events
            (user_id, provider_event_id, calendar_id, summary, description, start_time,
             end_time, location, attendees, status, html_link)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, provider_event_id) DO UPDATE SET
            summary = excluded.summary,
            description = excluded.description,
            start_time = excluded.start_time,
            end_time = excluded.end_time,
            location = excluded.location,
            attendees = excluded.attendees,
            status = excluded.status,
            html_link = excluded.html_link
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(&event.provider_event_id)
    .bind(&event.calendar_id)
    .bind(&event.summary)
    .bind(&event.description)
    .bind(event.start_time)
    .bind(event.end_time)
    .bind(&event.location)
    .bind(encode_list(&event.attendees))
    .bind(event.status.as_str())
    .bind(&event.html_link)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn get_event_by_provider_id(
    pool: &SqlitePool,
    user_id: &str,
    provider_event_id: &str,
) -> StoreResult<Option<CalendarEventRecord>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, provider_event_id, calendar_id, summary, description, start_time,
               end_time, location, attendees, status, html_link
        FROM calendar_events
        WHERE user_id = ? AND provider_event_id = ?
        "#,
    )
    .bind(user_id)
    .bind(provider_event_id)
    .fetch_optional(pool)
    .await?;
    row.map(row_to_event).transpose()
}

pub async fn count_events(pool: &SqlitePool, user_id: &str) -> StoreResult<usize> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM calendar_events WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    Ok(count as usize)
}
