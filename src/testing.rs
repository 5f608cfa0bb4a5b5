//! In-memory fakes for the provider, token endpoint and classifier.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::actions::ActionExecutor;
use crate::ai::{Category, ClassificationInput, Classifier, ClassifyError};
use crate::constants::PROVIDER_GOOGLE;
use crate::credentials::{CredentialStore, LinkRequest};
use crate::crypto::{KEY_SIZE, TokenCipher};
use crate::oauth2::{RefreshError, TokenGrant, TokenRefresher};
use crate::provider::{
    LabelChange, MailProvider, MessageDetail, MessageSummary, ProviderError, ProviderEvent,
};
use crate::store::Store;
use crate::suggest::{SuggestEngine, SuggestSettings};
use crate::sync::{SyncEngine, SyncSettings};
use crate::token::{Credential, TokenManager};

//
// Token endpoint
//

#[derive(Clone)]
enum RefreshMode {
    Grant(TokenGrant),
    Revoked,
    Failing,
}

pub struct FakeRefresher {
    mode: Mutex<RefreshMode>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeRefresher {
    fn with_mode(mode: RefreshMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn granting(grant: TokenGrant) -> Self {
        Self::with_mode(RefreshMode::Grant(grant))
    }

    /// Every refresh fails with `invalid_grant`.
    pub fn revoked() -> Self {
        Self::with_mode(RefreshMode::Revoked)
    }

    /// Every refresh fails with a transport error.
    pub fn failing() -> Self {
        Self::with_mode(RefreshMode::Failing)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_revoked(&self) {
        *self.mode.lock().unwrap() = RefreshMode::Revoked;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for FakeRefresher {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mode = self.mode.lock().unwrap().clone();
        match mode {
            RefreshMode::Grant(grant) => Ok(grant),
            RefreshMode::Revoked => Err(RefreshError::InvalidGrant("Token has been revoked".into())),
            RefreshMode::Failing => Err(RefreshError::Transport("connection reset".into())),
        }
    }
}

//
// Provider
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Modify { id: String, remove: Vec<String> },
    Trash(String),
    Delete(String),
}

#[derive(Default)]
pub struct FakeProvider {
    messages: Vec<MessageDetail>,
    broken: HashSet<String>,
    events: Vec<ProviderEvent>,
    fail_events: bool,
    fail_listing: bool,
    fail_mutations: bool,
    list_delay: Option<Duration>,
    list_calls: AtomicUsize,
    mutations: Mutex<Vec<Mutation>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, detail: MessageDetail) -> Self {
        self.messages.push(detail);
        self
    }

    /// Listed, but fetching it fails.
    pub fn with_broken_message(mut self, id: &str) -> Self {
        if !self.messages.iter().any(|m| m.id == id) {
            self.messages
                .push(message(id, "broken@example.com", "Broken", chrono::Utc::now().timestamp()));
        }
        self.broken.insert(id.to_string());
        self
    }

    pub fn with_event(mut self, id: &str, status: Option<&str>) -> Self {
        let start = chrono::Utc::now().timestamp() - 600;
        self.events.push(ProviderEvent {
            id: id.to_string(),
            calendar_id: "primary".to_string(),
            summary: Some(format!("Event {}", id)),
            description: None,
            start: Some(start),
            end: Some(start + 1800),
            location: None,
            attendees: Vec::new(),
            status: status.map(String::from),
            html_link: None,
        });
        self
    }

    pub fn failing_events(mut self) -> Self {
        self.fail_events = true;
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn failing_mutations(mut self) -> Self {
        self.fail_mutations = true;
        self
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.lock().unwrap().clone()
    }

    fn mutate(&self, mutation: Mutation) -> Result<(), ProviderError> {
        if self.fail_mutations {
            return Err(server_error());
        }
        self.mutations.lock().unwrap().push(mutation);
        Ok(())
    }
}

fn server_error() -> ProviderError {
    ProviderError::Status {
        code: 500,
        body: "backend error".to_string(),
    }
}

#[async_trait]
impl MailProvider for FakeProvider {
    async fn list_messages_since(
        &self,
        _cred: &Credential,
        since: i64,
        max: u32,
    ) -> Result<Vec<MessageSummary>, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_listing {
            return Err(server_error());
        }

        let mut matching: Vec<&MessageDetail> = self
            .messages
            .iter()
            .filter(|m| m.internal_date_ms.is_none_or(|ms| ms / 1000 > since))
            .collect();
        matching.sort_by(|a, b| b.internal_date_ms.cmp(&a.internal_date_ms));

        Ok(matching
            .into_iter()
            .take(max as usize)
            .map(|m| MessageSummary {
                id: m.id.clone(),
                thread_id: m.thread_id.clone(),
            })
            .collect())
    }

    async fn get_message(&self, _cred: &Credential, id: &str) -> Result<MessageDetail, ProviderError> {
        if self.broken.contains(id) {
            return Err(server_error());
        }
        self.messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    async fn list_events(
        &self,
        _cred: &Credential,
        _start: i64,
        _end: i64,
    ) -> Result<Vec<ProviderEvent>, ProviderError> {
        if self.fail_events {
            return Err(server_error());
        }
        Ok(self.events.clone())
    }

    async fn modify_message(
        &self,
        _cred: &Credential,
        id: &str,
        change: &LabelChange,
    ) -> Result<(), ProviderError> {
        self.mutate(Mutation::Modify {
            id: id.to_string(),
            remove: change.remove.clone(),
        })
    }

    async fn trash_message(&self, _cred: &Credential, id: &str) -> Result<(), ProviderError> {
        self.mutate(Mutation::Trash(id.to_string()))
    }

    async fn delete_message(&self, _cred: &Credential, id: &str) -> Result<(), ProviderError> {
        self.mutate(Mutation::Delete(id.to_string()))
    }
}

/// An inbox message as the provider would return it.
pub fn message(id: &str, from: &str, subject: &str, internal_date_secs: i64) -> MessageDetail {
    MessageDetail {
        id: id.to_string(),
        thread_id: Some(format!("t-{}", id)),
        label_ids: vec!["INBOX".to_string(), "UNREAD".to_string()],
        snippet: format!("{} - a short preview of the message body", subject),
        internal_date_ms: Some(internal_date_secs * 1000),
        headers: vec![
            ("From".to_string(), from.to_string()),
            ("To".to_string(), "me@example.com".to_string()),
            ("Subject".to_string(), subject.to_string()),
        ],
        text_body: Some(format!("Body of {}", subject)),
        html_body: None,
    }
}

//
// Classifier
//

pub struct FakeClassifier {
    answer: Option<Category>,
    delay: Duration,
    inputs: Mutex<Vec<ClassificationInput>>,
}

impl FakeClassifier {
    pub fn answering(category: Category) -> Self {
        Self {
            answer: Some(category),
            delay: Duration::ZERO,
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            delay: Duration::ZERO,
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }

    pub fn inputs(&self) -> Vec<ClassificationInput> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for FakeClassifier {
    async fn classify(&self, input: &ClassificationInput) -> Result<Category, ClassifyError> {
        self.inputs.lock().unwrap().push(input.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.answer.ok_or_else(|| ClassifyError::Status {
            code: 503,
            body: "overloaded".to_string(),
        })
    }
}

//
// Wiring
//

/// User "u1" with a live Google account, wired to the given provider.
pub struct Harness {
    pub store: Store,
    pub tokens: TokenManager,
    pub sync: SyncEngine,
    pub provider: Arc<FakeProvider>,
    pub refresher: Arc<FakeRefresher>,
}

impl Harness {
    pub async fn new(provider: FakeProvider) -> Self {
        let store = Store::open_in_memory().await.unwrap();
        store.upsert_user("u1", "u1@example.com").await.unwrap();

        let credentials =
            CredentialStore::new(store.clone(), TokenCipher::new(&[3u8; KEY_SIZE]).unwrap());
        credentials
            .link(&LinkRequest {
                user_id: "u1".to_string(),
                provider: PROVIDER_GOOGLE.to_string(),
                provider_account_id: "g-u1".to_string(),
                access_token: "access-1".to_string(),
                refresh_token: Some("refresh-1".to_string()),
                expires_at: Some(chrono::Utc::now().timestamp() + 3600),
                scopes: None,
            })
            .await
            .unwrap();

        let refresher = Arc::new(FakeRefresher::granting(TokenGrant {
            access_token: "access-2".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
            scope: None,
        }));
        let provider = Arc::new(provider);
        let tokens = TokenManager::new(credentials, refresher.clone(), PROVIDER_GOOGLE);
        let sync = SyncEngine::new(
            store.clone(),
            tokens.clone(),
            provider.clone(),
            SyncSettings::default(),
        );

        Self {
            store,
            tokens,
            sync,
            provider,
            refresher,
        }
    }

    /// Push u1's token past expiry so the next call must refresh.
    pub async fn expire_token(&self) {
        sqlx::query("UPDATE accounts SET expires_at = ? WHERE user_id = 'u1'")
            .bind(chrono::Utc::now().timestamp() - 10)
            .execute(self.store.pool())
            .await
            .unwrap();
    }

    pub fn suggest(&self, classifier: Option<Arc<dyn Classifier>>) -> SuggestEngine {
        SuggestEngine::new(
            self.store.clone(),
            self.tokens.clone(),
            self.provider.clone(),
            classifier,
            SuggestSettings::default(),
        )
    }

    pub fn actions(&self) -> ActionExecutor {
        ActionExecutor::new(self.store.clone(), self.tokens.clone(), self.provider.clone())
    }
}
