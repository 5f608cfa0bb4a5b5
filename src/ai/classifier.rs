use async_trait::async_trait;
use std::fmt;

use super::ClassifyError;
use super::client::OpenRouterClient;
use super::prompts::{CLASSIFY_MAX_TOKENS, CLASSIFY_SYSTEM, classification_request};
use crate::retry::{RetryConfig, with_retry_if};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Newsletter,
    Promotional,
    SocialNotification,
    Spam,
    Personal,
    WorkRelated,
    Transactional,
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Self::Newsletter,
        Self::Promotional,
        Self::SocialNotification,
        Self::Spam,
        Self::Personal,
        Self::WorkRelated,
        Self::Transactional,
        Self::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Newsletter => "Newsletter",
            Self::Promotional => "Promotional",
            Self::SocialNotification => "Social Notification",
            Self::Spam => "Spam",
            Self::Personal => "Personal",
            Self::WorkRelated => "Work-Related",
            Self::Transactional => "Transactional",
            Self::Other => "Other",
        }
    }

    /// Categories that produce an archive suggestion.
    pub fn is_cleanup(&self) -> bool {
        matches!(
            self,
            Self::Newsletter | Self::Promotional | Self::SocialNotification | Self::Spam
        )
    }

    /// Interpret a model response. Anything that isn't exactly one known
    /// label (ignoring case, quotes and trailing punctuation) is `Other`.
    pub fn parse_response(raw: &str) -> Self {
        let cleaned = raw
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '*')
            .trim_end_matches(['.', '!'])
            .trim();

        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(cleaned))
            .unwrap_or(Self::Other)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationInput {
    pub from: String,
    pub subject: String,
    pub snippet: String,
    pub body_excerpt: Option<String>,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, input: &ClassificationInput) -> Result<Category, ClassifyError>;
}

/// OpenRouter-backed classifier with retry on transient failures.
#[derive(Debug, Clone)]
pub struct ClassifierClient {
    client: OpenRouterClient,
    retry: RetryConfig,
    max_tokens: u32,
}

impl ClassifierClient {
    pub fn new(client: OpenRouterClient, retry: RetryConfig) -> Self {
        Self {
            client,
            retry,
            max_tokens: CLASSIFY_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens.max(1);
        self
    }
}

#[async_trait]
impl Classifier for ClassifierClient {
    async fn classify(&self, input: &ClassificationInput) -> Result<Category, ClassifyError> {
        let request = classification_request(
            &input.from,
            &input.subject,
            &input.snippet,
            input.body_excerpt.as_deref(),
        );

        let response = with_retry_if(&self.retry, ClassifyError::is_retryable, || {
            self.client
                .complete(CLASSIFY_SYSTEM, &request, self.max_tokens)
        })
        .await?;

        let category = Category::parse_response(&response);
        tracing::debug!(category = %category, "Classified email");
        Ok(category)
    }
}
