use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ai::OPENROUTER_BASE_URL;
use crate::constants::{
    BODY_EXCERPT_CHARS, INITIAL_SYNC_LOOKBACK_DAYS, MESSAGE_FETCH_CONCURRENCY, POLL_INTERVAL_SECS,
    RECORD_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS, SHORT_SNIPPET_CHARS, SUGGESTION_CANDIDATE_LIMIT,
    SUGGESTION_CONCURRENCY, SUGGESTION_LOOKBACK_DAYS, SYNC_PAGE_SIZE, USER_SYNC_CONCURRENCY,
    USER_SYNC_TIMEOUT_SECS,
};
use crate::crypto::TokenCipher;
use crate::oauth2::GOOGLE_TOKEN_URL;
use crate::provider::{CALENDAR_API_BASE, GMAIL_API_BASE};
use crate::retry::RetryConfig;
use crate::suggest::SuggestSettings;
use crate::sync::SyncSettings;

pub const ENV_CONFIG_PATH: &str = "MAILSWEEP_CONFIG";
pub const ENV_OAUTH_CLIENT_ID: &str = "MAILSWEEP_OAUTH_CLIENT_ID";
pub const ENV_OAUTH_CLIENT_SECRET: &str = "MAILSWEEP_OAUTH_CLIENT_SECRET";
pub const ENV_AI_API_KEY: &str = "MAILSWEEP_AI_API_KEY";
pub const ENV_ENCRYPTION_KEY: &str = "MAILSWEEP_ENCRYPTION_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub suggestions: SuggestionsConfig,
    /// Classification service (OpenRouter)
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file; defaults to `<data_dir>/mailsweep/mailsweep.db`
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            token_url: default_token_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_gmail_api_base")]
    pub gmail_api_base: String,
    #[serde(default = "default_calendar_api_base")]
    pub calendar_api_base: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Messages fetched per sync pass
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    /// Retries for 429 and 5xx responses
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            gmail_api_base: default_gmail_api_base(),
            calendar_api_base: default_calendar_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
            page_size: default_page_size(),
            fetch_concurrency: default_fetch_concurrency(),
            max_retries: default_max_retries(),
        }
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            ..RetryConfig::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_initial_lookback_days")]
    pub initial_lookback_days: i64,
    #[serde(default = "default_user_timeout_secs")]
    pub user_timeout_secs: u64,
    #[serde(default = "default_user_concurrency")]
    pub user_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            initial_lookback_days: default_initial_lookback_days(),
            user_timeout_secs: default_user_timeout_secs(),
            user_concurrency: default_user_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: u32,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    #[serde(default = "default_short_snippet_chars")]
    pub short_snippet_chars: usize,
    #[serde(default = "default_body_excerpt_chars")]
    pub body_excerpt_chars: usize,
    #[serde(default = "default_record_timeout_secs")]
    pub record_timeout_secs: u64,
    #[serde(default = "default_suggestion_concurrency")]
    pub concurrency: usize,
}

impl Default for SuggestionsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            candidate_limit: default_candidate_limit(),
            lookback_days: default_lookback_days(),
            short_snippet_chars: default_short_snippet_chars(),
            body_excerpt_chars: default_body_excerpt_chars(),
            record_timeout_secs: default_record_timeout_secs(),
            concurrency: default_suggestion_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Disable to run only the deterministic rules
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// OpenRouter API key (required while AI is enabled)
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_ai_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            model: default_ai_model(),
            max_tokens: default_ai_max_tokens(),
            base_url: default_ai_base_url(),
        }
    }
}

impl AiConfig {
    /// Check if classification is enabled and configured
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Base64-encoded 32-byte key for token encryption at rest
    #[serde(default)]
    pub encryption_key: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_token_url() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

fn default_gmail_api_base() -> String {
    GMAIL_API_BASE.to_string()
}

fn default_calendar_api_base() -> String {
    CALENDAR_API_BASE.to_string()
}

fn default_request_timeout_secs() -> u64 {
    REQUEST_TIMEOUT_SECS
}

fn default_page_size() -> u32 {
    SYNC_PAGE_SIZE
}

fn default_fetch_concurrency() -> usize {
    MESSAGE_FETCH_CONCURRENCY
}

fn default_max_retries() -> u32 {
    3
}

fn default_interval_secs() -> u64 {
    POLL_INTERVAL_SECS
}

fn default_initial_lookback_days() -> i64 {
    INITIAL_SYNC_LOOKBACK_DAYS
}

fn default_user_timeout_secs() -> u64 {
    USER_SYNC_TIMEOUT_SECS
}

fn default_user_concurrency() -> usize {
    USER_SYNC_CONCURRENCY
}

fn default_candidate_limit() -> u32 {
    SUGGESTION_CANDIDATE_LIMIT
}

fn default_lookback_days() -> i64 {
    SUGGESTION_LOOKBACK_DAYS
}

fn default_short_snippet_chars() -> usize {
    SHORT_SNIPPET_CHARS
}

fn default_body_excerpt_chars() -> usize {
    BODY_EXCERPT_CHARS
}

fn default_record_timeout_secs() -> u64 {
    RECORD_TIMEOUT_SECS
}

fn default_suggestion_concurrency() -> usize {
    SUGGESTION_CONCURRENCY
}

fn default_ai_model() -> String {
    "anthropic/claude-3-haiku".to_string()
}

fn default_ai_max_tokens() -> u32 {
    10
}

fn default_ai_base_url() -> String {
    OPENROUTER_BASE_URL.to_string()
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("mailsweep");
        Ok(dir)
    }

    /// `MAILSWEEP_CONFIG` if set, else `<config_dir>/mailsweep/config.toml`
    pub fn config_path() -> Result<PathBuf> {
        match std::env::var_os(ENV_CONFIG_PATH) {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(Self::config_dir()?.join("config.toml")),
        }
    }

    pub fn data_dir() -> Result<PathBuf> {
        let dir = dirs::data_local_dir()
            .context("Could not find data directory")?
            .join("mailsweep");
        Ok(dir)
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("mailsweep.db")),
        }
    }

    /// Load the config file (defaults when absent), then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Overlay secrets from the environment. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_OAUTH_CLIENT_ID) {
            self.oauth.client_id = Some(v);
        }
        if let Some(v) = get(ENV_OAUTH_CLIENT_SECRET) {
            self.oauth.client_secret = Some(v);
        }
        if let Some(v) = get(ENV_AI_API_KEY) {
            self.ai.api_key = Some(v);
        }
        if let Some(v) = get(ENV_ENCRYPTION_KEY) {
            self.security.encryption_key = Some(v);
        }
    }

    /// Startup checks: these are the only fatal configuration errors.
    pub fn validate(&self) -> Result<()> {
        if self
            .oauth
            .client_id
            .as_deref()
            .is_none_or(|id| id.trim().is_empty())
        {
            anyhow::bail!(
                "OAuth client id is not configured; set [oauth] client_id or {}",
                ENV_OAUTH_CLIENT_ID
            );
        }

        self.cipher()?;

        if self.suggestions.enabled && self.ai.enabled && !self.ai.is_enabled() {
            anyhow::bail!(
                "Classification API key is not configured; set [ai] api_key or {}, \
                 or disable AI with [ai] enabled = false",
                ENV_AI_API_KEY
            );
        }

        if self.provider.page_size == 0 {
            anyhow::bail!("[provider] page_size must be at least 1");
        }

        Ok(())
    }

    pub fn cipher(&self) -> Result<TokenCipher> {
        let key = self.security.encryption_key.as_deref().with_context(|| {
            format!(
                "Encryption key is not configured; set [security] encryption_key or {}",
                ENV_ENCRYPTION_KEY
            )
        })?;
        TokenCipher::from_base64(key.trim()).context("Invalid encryption key")
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            page_size: self.provider.page_size,
            fetch_concurrency: self.provider.fetch_concurrency,
            initial_lookback_days: self.sync.initial_lookback_days,
            user_timeout: Duration::from_secs(self.sync.user_timeout_secs),
            user_concurrency: self.sync.user_concurrency,
        }
    }

    pub fn suggest_settings(&self) -> SuggestSettings {
        SuggestSettings {
            candidate_limit: self.suggestions.candidate_limit,
            lookback_days: self.suggestions.lookback_days,
            short_snippet_chars: self.suggestions.short_snippet_chars,
            body_excerpt_chars: self.suggestions.body_excerpt_chars,
            record_timeout: Duration::from_secs(self.suggestions.record_timeout_secs),
            concurrency: self.suggestions.concurrency,
        }
    }
}
