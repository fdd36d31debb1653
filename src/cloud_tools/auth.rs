//! IBM Cloud Authentication
//!
//! Authenticators produce bearer tokens for VPC API calls. The IAM
//! authenticator exchanges an API key for an access token and caches it.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default IAM token endpoint
pub const DEFAULT_IAM_URL: &str = "https://iam.cloud.ibm.com/identity/token";

/// Grant type for API key exchange
const APIKEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if IAM doesn't tell us (IAM tokens live for an hour)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Source of bearer tokens for API requests.
///
/// Implementations are expected to refresh themselves; callers ask for a
/// token right before every request.
pub trait Authenticator: Send + Sync {
    fn token(&self) -> BoxFuture<'_, Result<String>>;
}

/// A fixed bearer token supplied by the caller
#[derive(Clone)]
pub struct BearerTokenAuthenticator {
    token: String,
}

impl BearerTokenAuthenticator {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl Authenticator for BearerTokenAuthenticator {
    fn token(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move { Ok(self.token.clone()) })
    }
}

#[derive(Deserialize)]
struct IamTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// IAM API key authenticator with token caching
#[derive(Clone)]
pub struct IamAuthenticator {
    apikey: String,
    url: String,
    http: Client,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl IamAuthenticator {
    /// Create an authenticator against the public IAM endpoint
    pub fn new(apikey: &str) -> Result<Self> {
        Self::with_url(apikey, DEFAULT_IAM_URL)
    }

    /// Create an authenticator against a specific IAM token endpoint
    pub fn with_url(apikey: &str, url: &str) -> Result<Self> {
        if apikey.trim().is_empty() {
            return Err(anyhow::anyhow!("IBM Cloud API key is empty"));
        }

        let http = Client::builder()
            .user_agent(concat!("ibmvpc/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            apikey: apikey.to_string(),
            url: url.to_string(),
            http,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Get an access token, exchanging the API key when the cache is stale
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached IAM token expired, fetching new token");
            }
        }

        let response = self
            .http
            .post(&self.url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", APIKEY_GRANT_TYPE),
                ("apikey", self.apikey.as_str()),
            ])
            .send()
            .await
            .context("Failed to send IAM token request")?;

        let status = response.status();
        if !status.is_success() {
            // Security: the body may echo request details, don't log it
            tracing::error!("IAM token request failed: {}", status);
            return Err(anyhow::anyhow!("IAM token request failed: {}", status));
        }

        let body: IamTokenResponse = response
            .json()
            .await
            .context("Failed to parse IAM token response")?;

        let ttl = body
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);
        let expires_at = Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_BUFFER);

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: body.access_token.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New IAM token cached, expires in ~{} minutes",
            ttl.saturating_sub(TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(body.access_token)
    }

    /// Drop the cached token and fetch a new one
    pub async fn refresh_token(&self) -> Result<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }

        self.get_token().await
    }
}

impl Authenticator for IamAuthenticator {
    fn token(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.get_token())
    }
}
