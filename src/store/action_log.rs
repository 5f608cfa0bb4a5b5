//! Append-only audit log of executed actions.

use sqlx::{Row, SqlitePool};

use super::StoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Success,
    Failure,
}

impl ActionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    fn parse(raw: &str) -> Self {
        if raw == "success" {
            Self::Success
        } else {
            Self::Failure
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLogEntry {
    pub user_id: String,
    pub action: String,
    /// Local email id the action targeted.
    pub target: String,
    pub outcome: ActionOutcome,
    pub detail: Option<String>,
}

pub async fn append(pool: &SqlitePool, entry: &ActionLogEntry) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO action_log (user_id, action, target, outcome, detail) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&entry.user_id)
    .bind(&entry.action)
    .bind(&entry.target)
    .bind(entry.outcome.as_str())
    .bind(&entry.detail)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_for_user(pool: &SqlitePool, user_id: &str) -> StoreResult<Vec<ActionLogEntry>> {
    let rows = sqlx::query(
        "SELECT user_id, action, target, outcome, detail FROM action_log \
         WHERE user_id = ? ORDER BY id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|row| ActionLogEntry {
            user_id: row.get("user_id"),
            action: row.get("action"),
            target: row.get("target"),
            outcome: ActionOutcome::parse(&row.get::<String, _>("outcome")),
            detail: row.get("detail"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::super::Store;
    use super::*;

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = Store::open_in_memory().await.unwrap();
        for (target, outcome) in [("1", ActionOutcome::Success), ("2", ActionOutcome::Failure)] {
            store
                .append_action_log(&ActionLogEntry {
                    user_id: "u1".to_string(),
                    action: "archive".to_string(),
                    target: target.to_string(),
                    outcome,
                    detail: None,
                })
                .await
                .unwrap();
        }

        let entries = store.list_action_log("u1").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].target, "1");
        assert_eq!(entries[1].outcome, ActionOutcome::Failure);
    }
}
