//! OAuth2 refresh-token grant against Google's token endpoint.
//!
//! The authorization handshake that yields the first tokens happens outside
//! this crate; here we only trade a refresh token for a fresh access token.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Tokens returned by a successful refresh grant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present only when the provider rotates the refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Error)]
pub enum RefreshError {
    /// The refresh token was revoked or expired; only re-authorization helps.
    #[error("refresh token rejected: {0}")]
    InvalidGrant(String),

    #[error("token endpoint returned {status}: {error}")]
    Rejected { status: u16, error: String },

    #[error("token request failed: {0}")]
    Transport(String),

    #[error("invalid token response: {0}")]
    Decode(String),
}

/// Error response from Google
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshError>;
}

pub struct OAuthClient {
    client_id: String,
    client_secret: Option<String>,
    token_url: String,
    http_client: reqwest::Client,
}

impl OAuthClient {
    pub fn new(
        client_id: &str,
        client_secret: Option<&str>,
        token_url: &str,
        timeout: Duration,
    ) -> Result<Self, RefreshError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        Ok(Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.map(|s| s.to_string()),
            token_url: token_url.to_string(),
            http_client,
        })
    }
}

#[async_trait]
impl TokenRefresher for OAuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshError> {
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        if let Some(secret) = self.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| RefreshError::Decode(e.to_string()))
    }
}

fn classify_failure(status: u16, body: &str) -> RefreshError {
    let error = serde_json::from_str::<ErrorResponse>(body).unwrap_or(ErrorResponse {
        error: "unknown_error".to_string(),
        error_description: None,
    });

    if error.error == "invalid_grant" {
        return RefreshError::InvalidGrant(error.error_description.unwrap_or(error.error));
    }
    RefreshError::Rejected {
        status,
        error: error.error,
    }
}
