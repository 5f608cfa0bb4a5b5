//! Cleanup suggestion generation over recently synced mail.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::rules::{RuleMatch, Rules};
use crate::ai::{ClassificationInput, Classifier};
use crate::constants::{
    BODY_EXCERPT_CHARS, RECORD_TIMEOUT_SECS, SHORT_SNIPPET_CHARS, SUGGESTION_CANDIDATE_LIMIT,
    SUGGESTION_CONCURRENCY, SUGGESTION_LOOKBACK_DAYS,
};
use crate::error::{ErrorKind, ItemError};
use crate::provider::MailProvider;
use crate::store::{Store, StoreError};
use crate::token::TokenManager;
use crate::types::{CleanupSuggestion, MailRecord, NewSuggestion, SuggestedAction};

const SECS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct SuggestSettings {
    pub candidate_limit: u32,
    pub lookback_days: i64,
    pub short_snippet_chars: usize,
    pub body_excerpt_chars: usize,
    pub record_timeout: Duration,
    pub concurrency: usize,
}

impl Default for SuggestSettings {
    fn default() -> Self {
        Self {
            candidate_limit: SUGGESTION_CANDIDATE_LIMIT,
            lookback_days: SUGGESTION_LOOKBACK_DAYS,
            short_snippet_chars: SHORT_SNIPPET_CHARS,
            body_excerpt_chars: BODY_EXCERPT_CHARS,
            record_timeout: Duration::from_secs(RECORD_TIMEOUT_SECS),
            concurrency: SUGGESTION_CONCURRENCY,
        }
    }
}

#[derive(Debug, Error)]
pub enum SuggestError {
    #[error("unknown user {0}")]
    UnknownUser(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    /// Suggestions created or refreshed this run.
    pub suggestions: Vec<CleanupSuggestion>,
    pub errors: Vec<ItemError>,
}

#[derive(Debug)]
pub struct GenerationOutcome {
    pub user_id: String,
    pub result: Result<GenerationReport, SuggestError>,
}

#[derive(Clone)]
pub struct SuggestEngine {
    store: Store,
    tokens: TokenManager,
    provider: Arc<dyn MailProvider>,
    /// `None` disables the AI fallback; only deterministic rules run.
    classifier: Option<Arc<dyn Classifier>>,
    settings: SuggestSettings,
}

impl SuggestEngine {
    pub fn new(
        store: Store,
        tokens: TokenManager,
        provider: Arc<dyn MailProvider>,
        classifier: Option<Arc<dyn Classifier>>,
        settings: SuggestSettings,
    ) -> Self {
        Self {
            store,
            tokens,
            provider,
            classifier,
            settings,
        }
    }

    pub async fn generate_suggestions(
        &self,
        user_id: &str,
    ) -> Result<GenerationReport, SuggestError> {
        if self.store.get_user(user_id).await?.is_none() {
            return Err(SuggestError::UnknownUser(user_id.to_string()));
        }

        let prefs = self.store.get_preferences(user_id).await?;
        let rules = Rules::from_preferences(user_id, &prefs);

        let now = chrono::Utc::now().timestamp();
        let since = now - self.settings.lookback_days * SECS_PER_DAY;
        let candidates = self
            .store
            .suggestion_candidates(user_id, since, self.settings.candidate_limit)
            .await?;

        tracing::debug!(user_id, candidates = candidates.len(), "Evaluating suggestion candidates");

        let rules = &rules;
        let results: Vec<Result<Option<CleanupSuggestion>, ItemError>> = stream::iter(candidates)
            .map(|record| async move { self.process(user_id, rules, record, now).await })
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut report = GenerationReport::default();
        for result in results {
            match result {
                Ok(Some(suggestion)) => report.suggestions.push(suggestion),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(user_id, email_id = %e.item_id, kind = %e.kind, "{}", e.message);
                    report.errors.push(e);
                }
            }
        }
        tracing::info!(
            user_id,
            suggestions = report.suggestions.len(),
            errors = report.errors.len(),
            "Suggestion run complete"
        );
        Ok(report)
    }

    /// Run generation for every user; one user's failure never stops the others.
    pub async fn generate_all(&self) -> Result<Vec<GenerationOutcome>, StoreError> {
        let users = self.store.list_users().await?;

        let outcomes = stream::iter(users)
            .map(|user| async move {
                let result = self.generate_suggestions(&user.id).await;
                if let Err(e) = &result {
                    tracing::warn!(user_id = %user.id, error = %e, "Suggestion run failed");
                }
                GenerationOutcome {
                    user_id: user.id,
                    result,
                }
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        Ok(outcomes)
    }

    /// Evaluate under the record timeout, then persist.
    async fn process(
        &self,
        user_id: &str,
        rules: &Rules,
        record: MailRecord,
        now: i64,
    ) -> Result<Option<CleanupSuggestion>, ItemError> {
        let email_id = record.id;
        let Some(provider_message_id) = record.provider_message_id.clone() else {
            tracing::debug!(user_id, email_id, "Skipping record without provider id");
            return Ok(None);
        };

        let decision = tokio::time::timeout(
            self.settings.record_timeout,
            self.evaluate(user_id, rules, &record, &provider_message_id, now),
        )
        .await
        .map_err(|_| {
            ItemError::new(
                email_id.to_string(),
                ErrorKind::Timeout,
                format!(
                    "evaluation exceeded {}s",
                    self.settings.record_timeout.as_secs()
                ),
            )
        })??;

        let Some(RuleMatch { action, reason }) = decision else {
            return Ok(None);
        };

        let suggestion = NewSuggestion {
            email_id,
            provider_message_id,
            from: record.from,
            subject: record.subject,
            snippet: record.snippet,
            reason,
            suggested_action: action,
        };

        self.store
            .upsert_suggestion(user_id, &suggestion)
            .await
            .map_err(|e| ItemError::new(email_id.to_string(), ErrorKind::Store, e))
    }

    /// Rules in order, first match wins. Only the classifier can fail.
    async fn evaluate(
        &self,
        user_id: &str,
        rules: &Rules,
        record: &MailRecord,
        provider_message_id: &str,
        now: i64,
    ) -> Result<Option<RuleMatch>, ItemError> {
        if let Some(hit) = rules.evaluate(record, now) {
            return Ok(Some(hit));
        }

        let Some(classifier) = &self.classifier else {
            return Ok(None);
        };

        let body_excerpt = if record.snippet.chars().count() < self.settings.short_snippet_chars {
            self.body_excerpt(user_id, provider_message_id).await
        } else {
            None
        };

        let input = ClassificationInput {
            from: record.from.clone(),
            subject: record.subject.clone(),
            snippet: record.snippet.clone(),
            body_excerpt,
        };

        let category = classifier
            .classify(&input)
            .await
            .map_err(|e| ItemError::new(record.id.to_string(), ErrorKind::Classify, e))?;

        Ok(category.is_cleanup().then(|| RuleMatch {
            action: SuggestedAction::Archive,
            reason: format!("AI classified as {}", category),
        }))
    }

    /// Best effort; any failure means classifying without a body.
    async fn body_excerpt(&self, user_id: &str, provider_message_id: &str) -> Option<String> {
        let cred = match self.tokens.get_live_credential(user_id).await {
            Ok(cred) => cred,
            Err(e) => {
                tracing::debug!(user_id, error = %e, "No credential for body fetch");
                return None;
            }
        };

        match self.provider.get_message(&cred, provider_message_id).await {
            Ok(detail) => detail.body_text().map(|body| {
                body.chars()
                    .take(self.settings.body_excerpt_chars)
                    .collect()
            }),
            Err(e) => {
                tracing::debug!(user_id, provider_message_id, error = %e, "Body fetch failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::Category;
    use crate::constants::{PREF_AUTO_CLEAN_AGE_DAYS, PREF_UNWANTED_SENDERS};
    use crate::store::sample_mail;
    use crate::testing::{FakeClassifier, FakeProvider, Harness, message};
    use crate::types::SuggestionStatus;

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    async fn seed(h: &Harness, provider_id: &str, from: &str, age_secs: i64) -> i64 {
        let mut record = sample_mail(provider_id, now() - age_secs);
        record.from = from.to_string();
        h.store.upsert_mail("u1", &record).await.unwrap()
    }

    #[tokio::test]
    async fn test_unwanted_sender_suggests_trash() {
        let h = Harness::new(FakeProvider::new()).await;
        h.store
            .set_preference("u1", PREF_UNWANTED_SENDERS, r#"["newsletter@shop.com"]"#)
            .await
            .unwrap();
        let email_id = seed(&h, "m1", "Deals <newsletter@shop.com>", 3600).await;

        let report = h.suggest(None).generate_suggestions("u1").await.unwrap();

        assert_eq!(report.suggestions.len(), 1);
        let s = &report.suggestions[0];
        assert_eq!(s.email_id, email_id);
        assert_eq!(s.suggested_action, SuggestedAction::Trash);
        assert_eq!(s.reason, "Sender matches unwanted list: newsletter@shop.com");
        assert_eq!(s.status, SuggestionStatus::Pending);
    }

    #[tokio::test]
    async fn test_rules_short_circuit_the_classifier() {
        let h = Harness::new(FakeProvider::new()).await;
        h.store
            .set_preference("u1", PREF_AUTO_CLEAN_AGE_DAYS, "7")
            .await
            .unwrap();
        seed(&h, "m1", "a@x.com", 10 * SECS_PER_DAY).await;
        let classifier = Arc::new(FakeClassifier::answering(Category::Personal));

        let report = h
            .suggest(Some(classifier.clone()))
            .generate_suggestions("u1")
            .await
            .unwrap();

        assert_eq!(report.suggestions[0].suggested_action, SuggestedAction::Archive);
        assert_eq!(report.suggestions[0].reason, "Older than 7 days");
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_ai_cleanup_label_suggests_archive() {
        let h = Harness::new(FakeProvider::new()).await;
        seed(&h, "m1", "news@site.com", 60).await;
        let classifier = Arc::new(FakeClassifier::answering(Category::Newsletter));

        let report = h
            .suggest(Some(classifier))
            .generate_suggestions("u1")
            .await
            .unwrap();

        assert_eq!(report.suggestions.len(), 1);
        assert_eq!(report.suggestions[0].suggested_action, SuggestedAction::Archive);
        assert_eq!(report.suggestions[0].reason, "AI classified as Newsletter");
    }

    #[tokio::test]
    async fn test_ai_keep_label_makes_no_suggestion() {
        let h = Harness::new(FakeProvider::new()).await;
        seed(&h, "m1", "boss@work.com", 60).await;
        let classifier = Arc::new(FakeClassifier::answering(Category::WorkRelated));

        let report = h
            .suggest(Some(classifier))
            .generate_suggestions("u1")
            .await
            .unwrap();
        assert!(report.suggestions.is_empty());
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_short_snippet_fetches_body_excerpt() {
        let mut detail = message("m1", "news@site.com", "Hi", now() - 60);
        detail.text_body = Some("x".repeat(5000));
        let h = Harness::new(FakeProvider::new().with_message(detail)).await;
        let email_id = seed(&h, "m1", "news@site.com", 60).await;
        sqlx::query("UPDATE mail SET snippet = 'short' WHERE id = ?")
            .bind(email_id)
            .execute(h.store.pool())
            .await
            .unwrap();
        let classifier = Arc::new(FakeClassifier::answering(Category::Promotional));

        h.suggest(Some(classifier.clone()))
            .generate_suggestions("u1")
            .await
            .unwrap();

        let inputs = classifier.inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].body_excerpt.as_ref().unwrap().len(), 1000);
    }

    #[tokio::test]
    async fn test_body_fetch_failure_degrades_to_no_excerpt() {
        let h = Harness::new(FakeProvider::new()).await;
        let email_id = seed(&h, "missing", "news@site.com", 60).await;
        sqlx::query("UPDATE mail SET snippet = '' WHERE id = ?")
            .bind(email_id)
            .execute(h.store.pool())
            .await
            .unwrap();
        let classifier = Arc::new(FakeClassifier::answering(Category::Spam));

        let report = h
            .suggest(Some(classifier.clone()))
            .generate_suggestions("u1")
            .await
            .unwrap();

        assert_eq!(report.suggestions.len(), 1);
        assert_eq!(classifier.inputs()[0].body_excerpt, None);
    }

    #[tokio::test]
    async fn test_classifier_failure_is_per_record() {
        let h = Harness::new(FakeProvider::new()).await;
        h.store
            .set_preference("u1", PREF_UNWANTED_SENDERS, r#"["spam.com"]"#)
            .await
            .unwrap();
        seed(&h, "m1", "a@x.com", 60).await;
        seed(&h, "m2", "bulk@spam.com", 120).await;

        let report = h
            .suggest(Some(Arc::new(FakeClassifier::failing())))
            .generate_suggestions("u1")
            .await
            .unwrap();

        assert_eq!(report.suggestions.len(), 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, ErrorKind::Classify);
    }

    #[tokio::test]
    async fn test_slow_classifier_times_out_without_writing() {
        let h = Harness::new(FakeProvider::new()).await;
        let email_id = seed(&h, "m1", "news@site.com", 60).await;
        let classifier = Arc::new(
            FakeClassifier::answering(Category::Newsletter).with_delay(Duration::from_millis(200)),
        );
        let mut engine = h.suggest(Some(classifier));
        engine.settings.record_timeout = Duration::from_millis(20);

        let report = engine.generate_suggestions("u1").await.unwrap();

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, ErrorKind::Timeout);
        assert!(h.store.get_suggestion("u1", email_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_candidates_exclude_old_and_pending() {
        let h = Harness::new(FakeProvider::new()).await;
        h.store
            .set_preference("u1", PREF_UNWANTED_SENDERS, r#"["shop.com"]"#)
            .await
            .unwrap();
        seed(&h, "m-old", "x@shop.com", 40 * SECS_PER_DAY).await;
        seed(&h, "m-new", "x@shop.com", 60).await;
        let engine = h.suggest(None);

        let first = engine.generate_suggestions("u1").await.unwrap();
        assert_eq!(first.suggestions.len(), 1);
        assert_eq!(first.suggestions[0].provider_message_id, "m-new");

        // The pending suggestion removes m-new from the next candidate set
        let second = engine.generate_suggestions("u1").await.unwrap();
        assert!(second.suggestions.is_empty());
        assert_eq!(
            h.store
                .count_suggestions_for_email("u1", first.suggestions[0].email_id)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_rejected_suggestion_is_not_revived() {
        let h = Harness::new(FakeProvider::new()).await;
        h.store
            .set_preference("u1", PREF_UNWANTED_SENDERS, r#"["shop.com"]"#)
            .await
            .unwrap();
        let email_id = seed(&h, "m1", "x@shop.com", 60).await;
        let engine = h.suggest(None);

        engine.generate_suggestions("u1").await.unwrap();
        h.store
            .decide_suggestion("u1", email_id, SuggestionStatus::Rejected)
            .await
            .unwrap();

        let again = engine.generate_suggestions("u1").await.unwrap();
        assert!(again.suggestions.is_empty());
        let stored = h.store.get_suggestion("u1", email_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SuggestionStatus::Rejected);
    }

    #[tokio::test]
    async fn test_candidate_limit() {
        let h = Harness::new(FakeProvider::new()).await;
        h.store
            .set_preference("u1", PREF_UNWANTED_SENDERS, r#"["shop.com"]"#)
            .await
            .unwrap();
        for i in 0..15 {
            seed(&h, &format!("m{i}"), "x@shop.com", 60 + i).await;
        }

        let report = h.suggest(None).generate_suggestions("u1").await.unwrap();
        assert_eq!(report.suggestions.len(), 10);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let h = Harness::new(FakeProvider::new()).await;
        assert!(matches!(
            h.suggest(None).generate_suggestions("ghost").await,
            Err(SuggestError::UnknownUser(_))
        ));
    }
}
