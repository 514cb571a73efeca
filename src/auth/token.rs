//! Per-user access tokens
//!
//! [`TokenExchange`] implements the OAuth 2.0 token-exchange grant: the
//! service application's client id and secret plus a user identity yield a
//! short-lived token for that user's disk. Failures are fatal for the user
//! and are never retried.

use crate::error::{OrgDiskError, Result};
use async_trait::async_trait;
use clap::ValueEnum;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Default OAuth token endpoint
pub const DEFAULT_OAUTH_URL: &str = "https://oauth.yandex.ru/token";

const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

/// Access token for a single user
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token string
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token value
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Which user attribute is presented as the subject token
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    /// User's email address
    #[default]
    Email,
    /// User's numeric id
    Uid,
}

impl SubjectKind {
    /// Token type URN sent with the exchange request
    pub fn token_type(&self) -> &'static str {
        match self {
            Self::Email => "urn:yandex:params:oauth:token-type:email",
            Self::Uid => "urn:yandex:params:oauth:token-type:uid",
        }
    }
}

/// Source of per-user access tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Obtain a token for `identity` (email or uid, per provider setup)
    async fn token_for(&self, identity: &str) -> Result<AccessToken>;
}

/// A single pre-issued token, handed out for any identity
#[derive(Debug, Clone)]
pub struct StaticToken(AccessToken);

impl StaticToken {
    /// Create from a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(AccessToken::new(token))
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token_for(&self, _identity: &str) -> Result<AccessToken> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    fn into_token(self, identity: &str) -> Result<AccessToken> {
        if let Some(error) = self.error {
            let description = self.error_description.unwrap_or_default();
            return Err(OrgDiskError::auth(identity, format!("{}: {}", error, description)));
        }

        self.access_token
            .filter(|t| !t.is_empty())
            .map(AccessToken::new)
            .ok_or_else(|| OrgDiskError::auth(identity, "response carried no access_token"))
    }
}

/// OAuth token exchange against the organization's service application
pub struct TokenExchange {
    http: Client,
    endpoint: String,
    client_id: String,
    client_secret: String,
    subject_kind: SubjectKind,
}

impl TokenExchange {
    /// Create a token exchange for the given service application
    pub fn new(
        http: Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        subject_kind: SubjectKind,
    ) -> Self {
        Self {
            http,
            endpoint: DEFAULT_OAUTH_URL.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            subject_kind,
        }
    }

    /// Override the token endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn form<'a>(&'a self, identity: &'a str) -> [(&'static str, &'a str); 5] {
        [
            ("grant_type", TOKEN_EXCHANGE_GRANT),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("subject_token", identity),
            ("subject_token_type", self.subject_kind.token_type()),
        ]
    }
}

#[async_trait]
impl TokenProvider for TokenExchange {
    async fn token_for(&self, identity: &str) -> Result<AccessToken> {
        debug!("Requesting service token for {}", identity);

        let response = self
            .http
            .post(&self.endpoint)
            .form(&self.form(identity))
            .send()
            .await
            .map_err(|e| OrgDiskError::auth(identity, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OrgDiskError::auth(identity, e.to_string()))?;

        match serde_json::from_str::<TokenResponse>(&body) {
            Ok(parsed) if status.is_success() || parsed.error.is_some() => parsed.into_token(identity),
            _ => Err(OrgDiskError::auth(
                identity,
                format!("token endpoint returned {}: {}", status, body.trim()),
            )),
        }
    }
}
