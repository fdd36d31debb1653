//! IBM Cloud tools context
//!
//! The [`CloudTools`] context is the credential source handed to region
//! clients. Clients ask it for the current authenticator on every call, so a
//! rotated credential is picked up without rebuilding anything.
//!
//! - [`auth`] - IAM API key and static bearer token authenticators

pub mod auth;

use anyhow::{Context, Result};
use auth::{Authenticator, BearerTokenAuthenticator, IamAuthenticator};
use std::sync::{Arc, RwLock};

/// Environment variable holding the IBM Cloud API key
pub const APIKEY_ENV: &str = "IBMCLOUD_API_KEY";

/// Environment variable overriding the IAM token endpoint
pub const IAM_URL_ENV: &str = "IBMCLOUD_IAM_URL";

/// Shared credential provider
#[derive(Clone)]
pub struct CloudTools {
    authenticator: Arc<RwLock<Arc<dyn Authenticator>>>,
}

impl CloudTools {
    /// Wrap an existing authenticator
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            authenticator: Arc::new(RwLock::new(authenticator)),
        }
    }

    /// Build an IAM-backed context from an API key
    pub fn from_apikey(apikey: &str) -> Result<Self> {
        let auth = match std::env::var(IAM_URL_ENV) {
            Ok(url) => IamAuthenticator::with_url(apikey, &url)?,
            Err(_) => IamAuthenticator::new(apikey)?,
        };
        Ok(Self::new(Arc::new(auth)))
    }

    /// Build a context from `IBMCLOUD_API_KEY`
    pub fn from_env() -> Result<Self> {
        let apikey = std::env::var(APIKEY_ENV)
            .with_context(|| format!("{} is not set", APIKEY_ENV))?;
        Self::from_apikey(&apikey)
    }

    /// Build a context around a fixed bearer token
    pub fn from_bearer_token(token: &str) -> Self {
        Self::new(Arc::new(BearerTokenAuthenticator::new(token)))
    }

    /// Current authenticator
    pub fn authenticator(&self) -> Arc<dyn Authenticator> {
        match self.authenticator.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Swap in a new authenticator (credential rotation)
    pub fn set_authenticator(&self, authenticator: Arc<dyn Authenticator>) {
        match self.authenticator.write() {
            Ok(mut guard) => *guard = authenticator,
            Err(poisoned) => *poisoned.into_inner() = authenticator,
        }
        tracing::debug!("Authenticator replaced");
    }
}
