//! Remote mutation first, local state second.
//!
//! A provider failure leaves the local store untouched. Executions for the
//! same email are serialized and the suggestion moves to `executed` only via
//! compare-and-swap, so a repeated execute never reaches the provider twice.

use std::sync::Arc;
use thiserror::Error;

use crate::constants::LABEL_INBOX;
use crate::locks::KeyedLocks;
use crate::provider::{LabelChange, MailProvider, ProviderError};
use crate::store::{ActionLogEntry, ActionOutcome, Store, StoreError};
use crate::token::{TokenError, TokenManager};
use crate::types::{SuggestedAction, SuggestionStatus};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("email {email_id} not found for user {user_id}")]
    NotFound { user_id: String, email_id: i64 },

    #[error("email {0} has already been handled")]
    AlreadyExecuted(i64),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("provider rejected action: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Clone)]
pub struct ActionExecutor {
    store: Store,
    tokens: TokenManager,
    provider: Arc<dyn MailProvider>,
    locks: KeyedLocks<(String, i64)>,
}

impl ActionExecutor {
    pub fn new(store: Store, tokens: TokenManager, provider: Arc<dyn MailProvider>) -> Self {
        Self {
            store,
            tokens,
            provider,
            locks: KeyedLocks::new(),
        }
    }

    /// Apply `action` to the user's email. Every attempt is audited.
    pub async fn execute(
        &self,
        user_id: &str,
        email_id: i64,
        action: SuggestedAction,
    ) -> Result<bool, ActionError> {
        let _guard = self.locks.lock((user_id.to_string(), email_id)).await;

        let result = self.run(user_id, email_id, action).await;
        self.audit(user_id, email_id, action, &result).await;
        result
    }

    async fn run(
        &self,
        user_id: &str,
        email_id: i64,
        action: SuggestedAction,
    ) -> Result<bool, ActionError> {
        let not_found = || ActionError::NotFound {
            user_id: user_id.to_string(),
            email_id,
        };

        let record = self
            .store
            .get_mail(user_id, email_id)
            .await?
            .ok_or_else(not_found)?;
        let provider_message_id = record.provider_message_id.ok_or_else(not_found)?;

        if !record.status.can_move_to(action.resulting_status()) {
            return Err(ActionError::AlreadyExecuted(email_id));
        }
        if let Some(suggestion) = self.store.get_suggestion(user_id, email_id).await?
            && matches!(
                suggestion.status,
                SuggestionStatus::Executed | SuggestionStatus::Rejected
            )
        {
            return Err(ActionError::AlreadyExecuted(email_id));
        }

        let cred = self.tokens.get_live_credential(user_id).await?;

        match action {
            SuggestedAction::Archive => {
                let change = LabelChange {
                    add: Vec::new(),
                    remove: vec![LABEL_INBOX.to_string()],
                };
                self.provider
                    .modify_message(&cred, &provider_message_id, &change)
                    .await?
            }
            SuggestedAction::Trash => {
                self.provider
                    .trash_message(&cred, &provider_message_id)
                    .await?
            }
            SuggestedAction::DeletePermanently => {
                self.provider
                    .delete_message(&cred, &provider_message_id)
                    .await?
            }
        }

        let applied = self
            .store
            .apply_action_result(user_id, email_id, action.resulting_status())
            .await?;

        tracing::debug!(
            user_id,
            email_id,
            provider_message_id = %provider_message_id,
            suggestion_executed = applied.suggestion_executed,
            "Action applied"
        );
        Ok(true)
    }

    async fn audit(
        &self,
        user_id: &str,
        email_id: i64,
        action: SuggestedAction,
        result: &Result<bool, ActionError>,
    ) {
        let (outcome, detail) = match result {
            Ok(_) => (ActionOutcome::Success, None),
            Err(e) => (ActionOutcome::Failure, Some(e.to_string())),
        };

        tracing::info!(
            target: "audit",
            user_id,
            action = action.as_str(),
            email_id,
            outcome = outcome.as_str(),
            detail = detail.as_deref().unwrap_or(""),
            "Cleanup action"
        );

        let entry = ActionLogEntry {
            user_id: user_id.to_string(),
            action: action.as_str().to_string(),
            target: email_id.to_string(),
            outcome,
            detail,
        };
        if let Err(e) = self.store.append_action_log(&entry).await {
            tracing::error!(user_id, email_id, error = %e, "Failed to write audit record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sample_mail;
    use crate::testing::{FakeProvider, Harness, Mutation};
    use crate::types::{MailStatus, NewSuggestion};

    async fn seed(h: &Harness, with_suggestion: bool) -> i64 {
        let email_id = h
            .store
            .upsert_mail("u1", &sample_mail("m1", chrono::Utc::now().timestamp()))
            .await
            .unwrap();
        if with_suggestion {
            h.store
                .upsert_suggestion(
                    "u1",
                    &NewSuggestion {
                        email_id,
                        provider_message_id: "m1".to_string(),
                        from: "Deals <newsletter@shop.com>".to_string(),
                        subject: "Weekly deals".to_string(),
                        snippet: "Save 20% this week".to_string(),
                        reason: "AI classified as Newsletter".to_string(),
                        suggested_action: SuggestedAction::Archive,
                    },
                )
                .await
                .unwrap();
        }
        email_id
    }

    #[tokio::test]
    async fn test_archive_removes_inbox_and_marks_executed() {
        let h = Harness::new(FakeProvider::new()).await;
        let email_id = seed(&h, true).await;

        let ok = h
            .actions()
            .execute("u1", email_id, SuggestedAction::Archive)
            .await
            .unwrap();
        assert!(ok);

        assert_eq!(
            h.provider.mutations(),
            vec![Mutation::Modify {
                id: "m1".to_string(),
                remove: vec!["INBOX".to_string()],
            }]
        );
        let mail = h.store.get_mail("u1", email_id).await.unwrap().unwrap();
        assert_eq!(mail.status, MailStatus::Archived);
        let suggestion = h.store.get_suggestion("u1", email_id).await.unwrap().unwrap();
        assert_eq!(suggestion.status, SuggestionStatus::Executed);

        let log = h.store.list_action_log("u1").await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].outcome, ActionOutcome::Success);
        assert_eq!(log[0].target, email_id.to_string());
    }

    #[tokio::test]
    async fn test_second_execute_never_reaches_provider() {
        let h = Harness::new(FakeProvider::new()).await;
        let email_id = seed(&h, true).await;
        let actions = h.actions();

        actions
            .execute("u1", email_id, SuggestedAction::Trash)
            .await
            .unwrap();
        let err = actions
            .execute("u1", email_id, SuggestedAction::Trash)
            .await
            .unwrap_err();

        assert!(matches!(err, ActionError::AlreadyExecuted(id) if id == email_id));
        assert_eq!(h.provider.mutations().len(), 1);
        assert_eq!(h.store.list_action_log("u1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_archived_mail_can_be_trashed_then_deleted() {
        let h = Harness::new(FakeProvider::new()).await;
        let mut archived = sample_mail("m1", chrono::Utc::now().timestamp());
        archived.labels = vec!["CATEGORY_UPDATES".to_string()];
        archived.status = MailStatus::Archived;
        let email_id = h.store.upsert_mail("u1", &archived).await.unwrap();
        let actions = h.actions();

        actions
            .execute("u1", email_id, SuggestedAction::Trash)
            .await
            .unwrap();
        actions
            .execute("u1", email_id, SuggestedAction::DeletePermanently)
            .await
            .unwrap();

        assert_eq!(
            h.provider.mutations(),
            vec![
                Mutation::Trash("m1".to_string()),
                Mutation::Delete("m1".to_string())
            ]
        );
        let mail = h.store.get_mail("u1", email_id).await.unwrap().unwrap();
        assert_eq!(mail.status, MailStatus::Deleted);

        let err = actions
            .execute("u1", email_id, SuggestedAction::Archive)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::AlreadyExecuted(_)));
        assert_eq!(h.provider.mutations().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_executes_call_provider_once() {
        let h = Harness::new(FakeProvider::new()).await;
        let email_id = seed(&h, true).await;
        let actions = h.actions();

        let (a, b) = tokio::join!(
            actions.execute("u1", email_id, SuggestedAction::Archive),
            actions.execute("u1", email_id, SuggestedAction::Archive),
        );

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(h.provider.mutations().len(), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_local_state() {
        let h = Harness::new(FakeProvider::new().failing_mutations()).await;
        let email_id = seed(&h, true).await;

        let err = h
            .actions()
            .execute("u1", email_id, SuggestedAction::DeletePermanently)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Provider(_)));

        let mail = h.store.get_mail("u1", email_id).await.unwrap().unwrap();
        assert_eq!(mail.status, MailStatus::Active);
        let suggestion = h.store.get_suggestion("u1", email_id).await.unwrap().unwrap();
        assert_eq!(suggestion.status, SuggestionStatus::Pending);

        let log = h.store.list_action_log("u1").await.unwrap();
        assert_eq!(log[0].outcome, ActionOutcome::Failure);
        assert!(log[0].detail.is_some());
    }

    #[tokio::test]
    async fn test_other_users_email_is_not_found() {
        let h = Harness::new(FakeProvider::new()).await;
        let email_id = seed(&h, false).await;
        h.store.upsert_user("u2", "u2@example.com").await.unwrap();

        let err = h
            .actions()
            .execute("u2", email_id, SuggestedAction::Trash)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::NotFound { .. }));
        assert!(h.provider.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_suggestion_blocks_execution() {
        let h = Harness::new(FakeProvider::new()).await;
        let email_id = seed(&h, true).await;
        h.store
            .decide_suggestion("u1", email_id, SuggestionStatus::Rejected)
            .await
            .unwrap();

        let err = h
            .actions()
            .execute("u1", email_id, SuggestedAction::Archive)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::AlreadyExecuted(_)));
        assert!(h.provider.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_execute_without_suggestion_updates_mail() {
        let h = Harness::new(FakeProvider::new()).await;
        let email_id = seed(&h, false).await;

        h.actions()
            .execute("u1", email_id, SuggestedAction::Trash)
            .await
            .unwrap();
        assert_eq!(h.provider.mutations(), vec![Mutation::Trash("m1".to_string())]);
        let mail = h.store.get_mail("u1", email_id).await.unwrap().unwrap();
        assert_eq!(mail.status, MailStatus::Trashed);
    }

    #[tokio::test]
    async fn test_token_failure_is_audited() {
        let h = Harness::new(FakeProvider::new()).await;
        let email_id = seed(&h, true).await;
        h.expire_token().await;
        h.refresher.set_revoked();

        let err = h
            .actions()
            .execute("u1", email_id, SuggestedAction::Archive)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Token(TokenError::ReauthRequired { .. })));
        assert!(h.provider.mutations().is_empty());
        assert_eq!(
            h.store.list_action_log("u1").await.unwrap()[0].outcome,
            ActionOutcome::Failure
        );
    }
}
