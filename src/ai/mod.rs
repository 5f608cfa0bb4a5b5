//! Email classification through a chat-completion model.
//!
//! The suggestion engine only sees the [`Classifier`] trait; the OpenRouter
//! client is the production implementation.

mod classifier;
mod client;
mod prompts;

pub use classifier::{Category, ClassificationInput, Classifier, ClassifierClient};
pub use client::{OPENROUTER_BASE_URL, OpenRouterClient};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classification request timed out")]
    Timeout,

    #[error("classification service returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("classification transport error: {0}")]
    Transport(String),

    #[error("could not decode classification response: {0}")]
    Decode(String),
}

impl ClassifyError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Status { code, .. } => *code == 429 || *code >= 500,
            Self::Decode(_) => false,
        }
    }
}
