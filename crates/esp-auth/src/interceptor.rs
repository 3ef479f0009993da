//! Outbound gRPC authentication interceptor.
//!
//! Attaches credentials to every outbound call:
//! - `x-api-key: <api key>` when an API key is configured
//! - `authorization: Bearer <token>` when a service account is configured,
//!   using the shared [`TokenCache`]
//!
//! With neither configured the call passes through untouched.
//!
//! # Security
//!
//! - The bearer token is obtained before any header is written; if signing
//!   fails the call is aborted with UNAUTHENTICATED and nothing is attached
//! - There is no unauthenticated fallback
//! - Header values are marked sensitive so they are not printed by `http`
//!   debug output

use crate::config::AuthConfig;
use crate::errors::AuthError;
use crate::token_cache::TokenCache;
use common::secret::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::{service::Interceptor, Request, Status};
use tracing::instrument;

/// Metadata key carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Metadata key carrying the bearer token (gRPC metadata keys are lowercase).
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Credential-attaching interceptor for outbound calls.
///
/// Cheap to clone; clones share one token cache, so a channel cloned across
/// tasks signs once per expiry.
#[derive(Clone)]
pub struct AuthInterceptor {
    api_key: Option<AsciiMetadataValue>,
    token_cache: Option<Arc<TokenCache>>,
}

impl AuthInterceptor {
    /// Build an interceptor from a configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the API key is empty or not visible
    /// ASCII.
    pub fn new(config: AuthConfig) -> Result<Self, AuthError> {
        let api_key = config.api_key.as_ref().map(api_key_value).transpose()?;
        let token_cache = config
            .service_auth
            .map(|service_auth| Arc::new(TokenCache::new(service_auth)));

        tracing::debug!(
            target: "esp_auth.interceptor",
            api_key = api_key.is_some(),
            service_auth = token_cache.is_some(),
            "Auth interceptor created"
        );

        Ok(Self {
            api_key,
            token_cache,
        })
    }

    /// Whether any credential will be attached.
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() || self.token_cache.is_some()
    }

    /// Shared token cache, when a service account is configured.
    pub fn token_cache(&self) -> Option<&Arc<TokenCache>> {
        self.token_cache.as_ref()
    }

    /// Attach the configured credentials to `metadata`.
    ///
    /// Only `x-api-key` and `authorization` are written; existing values for
    /// those keys are replaced.
    ///
    /// # Errors
    ///
    /// Propagates token signing errors. On error `metadata` is unchanged.
    pub fn apply(&self, metadata: &mut MetadataMap) -> Result<(), AuthError> {
        let bearer = match &self.token_cache {
            Some(cache) => Some(bearer_value(&cache.get_or_refresh()?)?),
            None => None,
        };

        if let Some(api_key) = &self.api_key {
            metadata.insert(API_KEY_HEADER, api_key.clone());
        }
        if let Some(bearer) = bearer {
            metadata.insert(AUTHORIZATION_HEADER, bearer);
        }

        Ok(())
    }

    /// Drop the cached bearer token so the next call signs a fresh one.
    ///
    /// No-op without a service account.
    pub fn invalidate_cached_token(&self) {
        if let Some(cache) = &self.token_cache {
            cache.invalidate();
        }
    }
}

impl Interceptor for AuthInterceptor {
    #[instrument(skip_all, name = "esp_auth.interceptor")]
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        self.apply(request.metadata_mut())?;
        Ok(request)
    }
}

impl fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthInterceptor")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("token_cache", &self.token_cache)
            .finish()
    }
}

fn api_key_value(api_key: &SecretString) -> Result<AsciiMetadataValue, AuthError> {
    let key = api_key.expose_secret();
    if key.is_empty() {
        return Err(AuthError::Config("API key must not be empty".to_string()));
    }

    let mut value = AsciiMetadataValue::try_from(key)
        .map_err(|_| AuthError::Config("API key must be visible ASCII".to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

fn bearer_value(token: &SecretString) -> Result<AsciiMetadataValue, AuthError> {
    let mut value = AsciiMetadataValue::try_from(format!("Bearer {}", token.expose_secret()))
        .map_err(|_| AuthError::Signing("signed token is not a valid header value".to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}
