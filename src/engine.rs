//! The invocation surface: one handle over sync, suggestions and actions.
//!
//! Scheduling is the caller's concern. The bundled binary drives
//! [`Engine::poll_all`] and [`Engine::generate_all`] on an interval, and any
//! other front end can call the on-demand operations directly.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::actions::{ActionError, ActionExecutor};
use crate::ai::{Classifier, ClassifierClient, OpenRouterClient};
use crate::config::Config;
use crate::constants::PROVIDER_GOOGLE;
use crate::credentials::{CredentialError, CredentialStore, LinkRequest};
use crate::oauth2::{OAuthClient, TokenRefresher};
use crate::provider::{GoogleProvider, MailProvider};
use crate::retry::RetryConfig;
use crate::store::{Store, StoreError};
use crate::suggest::{GenerationOutcome, GenerationReport, SuggestEngine, SuggestError, SuggestSettings};
use crate::sync::{SyncEngine, SyncError, SyncOutcome, SyncReport, SyncSettings};
use crate::token::TokenManager;
use crate::types::{CleanupSuggestion, SuggestedAction, SuggestionStatus};

/// Collaborators the engine is assembled from.
pub struct Components {
    pub store: Store,
    pub credentials: CredentialStore,
    pub refresher: Arc<dyn TokenRefresher>,
    pub provider: Arc<dyn MailProvider>,
    pub classifier: Option<Arc<dyn Classifier>>,
    pub sync: SyncSettings,
    pub suggestions: SuggestSettings,
    pub suggestions_enabled: bool,
}

#[derive(Clone)]
pub struct Engine {
    store: Store,
    credentials: CredentialStore,
    sync: SyncEngine,
    suggest: SuggestEngine,
    actions: ActionExecutor,
    suggestions_enabled: bool,
}

impl Engine {
    pub fn new(parts: Components) -> Self {
        let tokens = TokenManager::new(parts.credentials.clone(), parts.refresher, PROVIDER_GOOGLE);

        Self {
            sync: SyncEngine::new(
                parts.store.clone(),
                tokens.clone(),
                parts.provider.clone(),
                parts.sync,
            ),
            suggest: SuggestEngine::new(
                parts.store.clone(),
                tokens.clone(),
                parts.provider.clone(),
                parts.classifier,
                parts.suggestions,
            ),
            actions: ActionExecutor::new(parts.store.clone(), tokens, parts.provider),
            store: parts.store,
            credentials: parts.credentials,
            suggestions_enabled: parts.suggestions_enabled,
        }
    }

    /// Open the database and build the production clients.
    /// Expects a config that already passed [`Config::validate`].
    pub async fn from_config(config: &Config) -> Result<Self> {
        let db_path = config.database_path()?;
        let store = Store::open(&db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

        let credentials = CredentialStore::new(store.clone(), config.cipher()?);

        let client_id = config
            .oauth
            .client_id
            .as_deref()
            .context("OAuth client id is not configured")?;
        let refresher = OAuthClient::new(
            client_id,
            config.oauth.client_secret.as_deref(),
            &config.oauth.token_url,
            config.provider.request_timeout(),
        )
        .context("Failed to build OAuth client")?;

        let provider = GoogleProvider::new(
            &config.provider.gmail_api_base,
            &config.provider.calendar_api_base,
            config.provider.request_timeout(),
            config.provider.retry(),
        )
        .context("Failed to build provider client")?;

        let classifier: Option<Arc<dyn Classifier>> = match config.ai.api_key.as_deref() {
            Some(api_key) if config.ai.is_enabled() => {
                let client = OpenRouterClient::new(
                    api_key,
                    &config.ai.model,
                    &config.ai.base_url,
                    config.provider.request_timeout(),
                )
                .context("Failed to build classification client")?;
                Some(Arc::new(
                    ClassifierClient::new(client, RetryConfig::default())
                        .with_max_tokens(config.ai.max_tokens),
                ))
            }
            _ => {
                tracing::info!("AI classification disabled; only rule-based suggestions");
                None
            }
        };

        Ok(Self::new(Components {
            store,
            credentials,
            refresher: Arc::new(refresher),
            provider: Arc::new(provider),
            classifier,
            sync: config.sync_settings(),
            suggestions: config.suggest_settings(),
            suggestions_enabled: config.suggestions.enabled,
        }))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn sync_user_on_demand(&self, user_id: &str) -> Result<SyncReport, SyncError> {
        self.sync.sync_user(user_id).await
    }

    pub async fn poll_all(&self) -> Result<Vec<SyncOutcome>, StoreError> {
        self.sync.sync_all().await
    }

    pub async fn generate_suggestions(
        &self,
        user_id: &str,
    ) -> Result<GenerationReport, SuggestError> {
        if !self.suggestions_enabled {
            return Ok(GenerationReport::default());
        }
        self.suggest.generate_suggestions(user_id).await
    }

    pub async fn generate_all(&self) -> Result<Vec<GenerationOutcome>, StoreError> {
        if !self.suggestions_enabled {
            return Ok(Vec::new());
        }
        self.suggest.generate_all().await
    }

    pub async fn list_pending_suggestions(
        &self,
        user_id: &str,
    ) -> Result<Vec<CleanupSuggestion>, StoreError> {
        self.store.list_pending_suggestions(user_id).await
    }

    pub async fn execute_suggestion(
        &self,
        user_id: &str,
        email_id: i64,
        action: SuggestedAction,
    ) -> Result<bool, ActionError> {
        self.actions.execute(user_id, email_id, action).await
    }

    /// Returns false if the suggestion was not open.
    pub async fn approve_suggestion(&self, user_id: &str, email_id: i64) -> Result<bool, StoreError> {
        self.store
            .decide_suggestion(user_id, email_id, SuggestionStatus::Approved)
            .await
    }

    /// Returns false if the suggestion was not open.
    pub async fn reject_suggestion(&self, user_id: &str, email_id: i64) -> Result<bool, StoreError> {
        let rejected = self
            .store
            .decide_suggestion(user_id, email_id, SuggestionStatus::Rejected)
            .await?;
        if rejected {
            tracing::info!(user_id, email_id, "Suggestion rejected");
        }
        Ok(rejected)
    }

    pub async fn register_user(&self, user_id: &str, email: &str) -> Result<(), StoreError> {
        self.store.upsert_user(user_id, email).await
    }

    /// Store tokens obtained from an external OAuth handshake.
    pub async fn link_account(&self, request: &LinkRequest) -> Result<i64, CredentialError> {
        let account_id = self.credentials.link(request).await?;
        tracing::info!(user_id = %request.user_id, account_id, provider = %request.provider, "Account linked");
        Ok(account_id)
    }

    pub async fn set_preference(&self, user_id: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.store.set_preference(user_id, key, value).await
    }
}
