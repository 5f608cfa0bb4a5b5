//! Database schema initialization.

use sqlx::SqlitePool;

/// Initialize database schema with all tables and indexes.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            last_synced_at INTEGER,
            created_at INTEGER NOT NULL DEFAULT (unixepoch())
        );

        -- Linked provider accounts; tokens are encrypted by the credential store
        CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            provider TEXT NOT NULL,
            provider_account_id TEXT NOT NULL,
            access_token TEXT,
            refresh_token TEXT,
            expires_at INTEGER,
            scopes TEXT,
            updated_at INTEGER NOT NULL DEFAULT (unixepoch()),
            UNIQUE (provider, provider_account_id)
        );

        CREATE INDEX IF NOT EXISTS idx_accounts_user ON accounts(user_id, provider);
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        -- Mail records; list columns hold JSON arrays (see store::codec)
        CREATE TABLE IF NOT EXISTS mail (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            provider_message_id TEXT,
            thread_id TEXT,
            from_addr TEXT NOT NULL DEFAULT '',
            to_addrs TEXT NOT NULL DEFAULT '[]',
            cc_addrs TEXT NOT NULL DEFAULT '[]',
            bcc_addrs TEXT NOT NULL DEFAULT '[]',
            subject TEXT NOT NULL DEFAULT '',
            snippet TEXT NOT NULL DEFAULT '',
            internal_date INTEGER NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0,
            labels TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'active',
            raw_body_hash TEXT,
            UNIQUE (user_id, provider_message_id)
        );

        CREATE INDEX IF NOT EXISTS idx_mail_user_status_date
            ON mail(user_id, status, internal_date DESC);

        CREATE TABLE IF NOT EXISTS calendar_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            provider_event_id TEXT NOT NULL,
            calendar_id TEXT NOT NULL,
            summary TEXT,
            description TEXT,
            start_time INTEGER,
            end_time INTEGER,
            location TEXT,
            attendees TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'confirmed',
            html_link TEXT,
            UNIQUE (user_id, provider_event_id)
        );

        CREATE INDEX IF NOT EXISTS idx_events_user_start ON calendar_events(user_id, start_time);
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        -- One suggestion row per email: the primary key is derived from
        -- (user_id, email_id), so upserts on it keep a single row per email
        CREATE TABLE IF NOT EXISTS cleanup_suggestions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            email_id INTEGER NOT NULL REFERENCES mail(id) ON DELETE CASCADE,
            provider_message_id TEXT NOT NULL,
            from_addr TEXT NOT NULL DEFAULT '',
            subject TEXT NOT NULL DEFAULT '',
            snippet TEXT NOT NULL DEFAULT '',
            reason TEXT NOT NULL,
            suggested_action TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at INTEGER NOT NULL DEFAULT (unixepoch()),
            updated_at INTEGER NOT NULL DEFAULT (unixepoch())
        );

        CREATE INDEX IF NOT EXISTS idx_suggestions_email
            ON cleanup_suggestions(user_id, email_id, status);

        CREATE TABLE IF NOT EXISTS preferences (
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (user_id, key)
        );

        -- Append-only audit of executed (or attempted) actions
        CREATE TABLE IF NOT EXISTS action_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            action TEXT NOT NULL,
            target TEXT NOT NULL,
            outcome TEXT NOT NULL,
            detail TEXT,
            created_at INTEGER NOT NULL DEFAULT (unixepoch())
        );

        CREATE INDEX IF NOT EXISTS idx_action_log_user ON action_log(user_id, created_at);

        INSERT OR IGNORE INTO schema_version (version) VALUES (1);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
