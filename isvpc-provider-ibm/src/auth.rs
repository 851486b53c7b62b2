//! IAM authentication
//!
//! Exchanges an API key for a bearer token at the IAM token endpoint and caches
//! it until shortly before it expires.

use std::time::Duration;

use isvpc_core::{Error, Result};
use log::debug;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

const APIKEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Tokens are refreshed this long before IAM says they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Lifetime in seconds
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Debug, Clone)]
enum Credential {
    ApiKey(String),
    Token(String),
}

/// Source of bearer tokens for VPC API calls
#[derive(Debug)]
pub struct Authenticator {
    http: reqwest::Client,
    iam_endpoint: String,
    credential: Credential,
    cached: Mutex<Option<CachedToken>>,
}

impl Authenticator {
    /// Exchange `api_key` at `iam_endpoint` on demand
    pub fn api_key(http: reqwest::Client, iam_endpoint: &str, api_key: impl Into<String>) -> Self {
        Self {
            http,
            iam_endpoint: iam_endpoint.trim_end_matches('/').to_string(),
            credential: Credential::ApiKey(api_key.into()),
            cached: Mutex::new(None),
        }
    }

    /// Use a token obtained elsewhere
    pub fn static_token(token: impl Into<String>) -> Self {
        let token = token.into();
        let token = token
            .strip_prefix("Bearer ")
            .map(str::to_string)
            .unwrap_or(token);
        Self {
            http: reqwest::Client::new(),
            iam_endpoint: String::new(),
            credential: Credential::Token(token),
            cached: Mutex::new(None),
        }
    }

    /// Current bearer token (without the `Bearer ` prefix)
    pub async fn token(&self) -> Result<String> {
        let api_key = match &self.credential {
            Credential::Token(token) => return Ok(token.clone()),
            Credential::ApiKey(key) => key,
        };

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let token = self.exchange(api_key).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn exchange(&self, api_key: &str) -> Result<CachedToken> {
        let url = format!("{}/identity/token", self.iam_endpoint);
        debug!("Requesting IAM token from {}", url);

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("grant_type", APIKEY_GRANT_TYPE), ("apikey", api_key)])
            .send()
            .await
            .map_err(|e| Error::transport(format!("IAM token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Authentication {
                status: status.as_u16(),
                message: format!("IAM token request returned {}: {}", status, body),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::decode(format!("Invalid IAM token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
        Ok(CachedToken {
            value: token.access_token,
            refresh_at: Instant::now() + lifetime,
        })
    }
}
