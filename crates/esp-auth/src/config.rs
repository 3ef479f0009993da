//! Auth configuration.
//!
//! [`AuthConfig`] selects which credentials the interceptor attaches: a static
//! API key, a service account that signs its own tokens, both, or neither.
//! It is built programmatically or loaded from environment variables; secret
//! values are redacted in Debug output.

use crate::credentials::ServiceAccountKey;
use crate::errors::AuthError;
use crate::signer::MAX_TOKEN_LIFETIME_SECS;
use crate::token_cache::DEFAULT_REFRESH_MARGIN;
use common::secret::SecretString;
use jsonwebtoken::EncodingKey;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

/// Keyset endpoint Google publishes service-account certificates under.
pub const GOOGLE_X509_KEYSET_PREFIX: &str = "https://www.googleapis.com/robot/v1/metadata/x509/";

/// Keyset URI for a Google service account.
#[must_use]
pub fn default_jwks_uri(client_email: &str) -> String {
    format!("{GOOGLE_X509_KEYSET_PREFIX}{client_email}")
}

/// Settings for self-signed service-account tokens.
///
/// Invariant: `refresh_margin < max_token_lifetime_secs <= MAX_TOKEN_LIFETIME_SECS`.
#[derive(Clone)]
pub struct ServiceAuthConfig {
    identity: ServiceAccountKey,
    audience: String,
    jwks_uri: String,
    max_token_lifetime_secs: i64,
    refresh_margin: Duration,
    issuer: Option<String>,
}

impl ServiceAuthConfig {
    /// Create a configuration with default lifetime (3600 s) and refresh
    /// margin (60 s).
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `audience` is empty
    /// - `Config` if the key id is empty or the private key is not a usable
    ///   RSA PEM key
    pub fn new(identity: ServiceAccountKey, audience: impl Into<String>) -> Result<Self, AuthError> {
        let audience = audience.into();
        if audience.trim().is_empty() {
            return Err(AuthError::InvalidArgument(
                "audience (service name) must not be empty".to_string(),
            ));
        }

        if identity.private_key_id().is_empty() {
            return Err(AuthError::Config(
                "service account private_key_id must not be empty".to_string(),
            ));
        }

        EncodingKey::from_rsa_pem(identity.private_key_pem()).map_err(|e| {
            tracing::warn!(
                target: "esp_auth.config",
                key_id = %identity.private_key_id(),
                error = %e,
                "Service account private key rejected"
            );
            AuthError::Config(format!("service account private key is not a usable RSA key: {e}"))
        })?;

        let jwks_uri = default_jwks_uri(identity.client_email());
        Ok(Self {
            identity,
            audience,
            jwks_uri,
            max_token_lifetime_secs: MAX_TOKEN_LIFETIME_SECS,
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            issuer: None,
        })
    }

    /// Set the token lifetime in seconds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` unless `refresh_margin < secs <= 3600`.
    pub fn with_max_token_lifetime(mut self, secs: i64) -> Result<Self, AuthError> {
        if secs <= 0 || secs > MAX_TOKEN_LIFETIME_SECS {
            return Err(AuthError::InvalidArgument(format!(
                "token lifetime must be between 1 and {MAX_TOKEN_LIFETIME_SECS} seconds, got {secs}"
            )));
        }
        if secs <= duration_secs(self.refresh_margin) {
            return Err(AuthError::InvalidArgument(format!(
                "token lifetime ({secs}s) must exceed the refresh margin ({}s)",
                self.refresh_margin.as_secs()
            )));
        }
        self.max_token_lifetime_secs = secs;
        Ok(self)
    }

    /// Set the minimum remaining validity below which a cached token is
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the margin is not shorter than the
    /// current token lifetime.
    pub fn with_refresh_margin(mut self, margin: Duration) -> Result<Self, AuthError> {
        if duration_secs(margin) >= self.max_token_lifetime_secs {
            return Err(AuthError::InvalidArgument(format!(
                "refresh margin ({}s) must be shorter than the token lifetime ({}s)",
                margin.as_secs(),
                self.max_token_lifetime_secs
            )));
        }
        self.refresh_margin = margin;
        Ok(self)
    }

    /// Override the `iss` claim (defaults to the account email).
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Override the keyset URI verifiers should use for this identity.
    #[must_use]
    pub fn with_jwks_uri(mut self, jwks_uri: impl Into<String>) -> Self {
        self.jwks_uri = jwks_uri.into();
        self
    }

    #[cfg(test)]
    pub(crate) fn with_identity_unchecked(mut self, identity: ServiceAccountKey) -> Self {
        self.identity = identity;
        self
    }

    pub fn identity(&self) -> &ServiceAccountKey {
        &self.identity
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    pub fn max_token_lifetime_secs(&self) -> i64 {
        self.max_token_lifetime_secs
    }

    pub fn refresh_margin(&self) -> Duration {
        self.refresh_margin
    }

    /// Explicit issuer override, if any.
    pub fn issuer_override(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// Effective `iss` claim.
    pub fn issuer(&self) -> &str {
        self.issuer
            .as_deref()
            .unwrap_or_else(|| self.identity.client_email())
    }
}

impl fmt::Debug for ServiceAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAuthConfig")
            .field("identity", &self.identity)
            .field("audience", &self.audience)
            .field("jwks_uri", &self.jwks_uri)
            .field("max_token_lifetime_secs", &self.max_token_lifetime_secs)
            .field("refresh_margin", &self.refresh_margin)
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// Credentials attached to outbound calls.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// Static API key sent as `x-api-key`.
    pub api_key: Option<SecretString>,

    /// Service account used to sign `authorization: Bearer` tokens.
    pub service_auth: Option<ServiceAuthConfig>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("service_auth", &self.service_auth)
            .finish()
    }
}

impl AuthConfig {
    /// Configuration with no credentials.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    #[must_use]
    pub fn with_service_auth(mut self, service_auth: ServiceAuthConfig) -> Self {
        self.service_auth = Some(service_auth);
        self
    }

    /// True when neither credential is configured.
    pub fn is_empty(&self) -> bool {
        self.api_key.is_none() && self.service_auth.is_none()
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`AuthConfig::from_vars`].
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a map of variables (for testing).
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `ESP_API_KEY` | static API key |
    /// | `ESP_SERVICE_ACCOUNT_FILE` | service-account JSON path |
    /// | `ESP_SERVICE_NAME` | audience, required with a service account |
    /// | `ESP_MAX_TOKEN_LIFETIME_SECONDS` | token lifetime (default 3600) |
    /// | `ESP_TOKEN_REFRESH_MARGIN_SECONDS` | refresh margin (default 60) |
    /// | `ESP_JWKS_URI` | keyset URI override |
    ///
    /// # Errors
    ///
    /// Returns `Config` for missing or unparseable values and
    /// `InvalidArgument` for out-of-range lifetime or margin.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, AuthError> {
        let api_key = match vars.get("ESP_API_KEY") {
            Some(value) if value.is_empty() => {
                return Err(AuthError::Config("ESP_API_KEY must not be empty".to_string()));
            }
            Some(value) => Some(SecretString::from(value.clone())),
            None => None,
        };

        let service_auth = match vars.get("ESP_SERVICE_ACCOUNT_FILE") {
            Some(path) => Some(service_auth_from_vars(path, vars)?),
            None => None,
        };

        let config = Self {
            api_key,
            service_auth,
        };

        tracing::debug!(
            target: "esp_auth.config",
            api_key = config.api_key.is_some(),
            service_auth = config.service_auth.is_some(),
            "Loaded auth configuration"
        );
        Ok(config)
    }
}

fn service_auth_from_vars(
    path: &str,
    vars: &HashMap<String, String>,
) -> Result<ServiceAuthConfig, AuthError> {
    let audience = vars.get("ESP_SERVICE_NAME").ok_or_else(|| {
        AuthError::Config(
            "ESP_SERVICE_NAME is required when ESP_SERVICE_ACCOUNT_FILE is set".to_string(),
        )
    })?;

    let identity = ServiceAccountKey::from_file(path)?;
    let mut config = ServiceAuthConfig::new(identity, audience.clone())?;

    // Margin first, so a short lifetime is checked against the configured margin.
    if let Some(value) = vars.get("ESP_TOKEN_REFRESH_MARGIN_SECONDS") {
        let secs: u64 = value.parse().map_err(|e| {
            AuthError::Config(format!(
                "ESP_TOKEN_REFRESH_MARGIN_SECONDS must be a non-negative integer, got '{value}': {e}"
            ))
        })?;
        config = config.with_refresh_margin(Duration::from_secs(secs))?;
    }

    if let Some(value) = vars.get("ESP_MAX_TOKEN_LIFETIME_SECONDS") {
        let secs: i64 = value.parse().map_err(|e| {
            AuthError::Config(format!(
                "ESP_MAX_TOKEN_LIFETIME_SECONDS must be an integer, got '{value}': {e}"
            ))
        })?;
        config = config.with_max_token_lifetime(secs)?;
    }

    if let Some(uri) = vars.get("ESP_JWKS_URI") {
        config = config.with_jwks_uri(uri.clone());
    }

    Ok(config)
}

/// Seconds of a duration as `i64`, rounded up and saturating.
///
/// Token timestamps are whole seconds; rounding up keeps a fractional margin
/// from being under-enforced.
pub(crate) fn duration_secs(duration: Duration) -> i64 {
    let secs = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);
    if duration.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    }
}
