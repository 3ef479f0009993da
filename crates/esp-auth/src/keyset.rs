//! Verification keysets.
//!
//! A keyset maps key ids (`kid`) to RS256 public keys. Two document formats
//! are accepted:
//!
//! - Google's x509 map: `{"<kid>": "-----BEGIN CERTIFICATE-----..."}`
//! - A JWKS: `{"keys": [{"kid": "...", "kty": "RSA", "n": "...", "e": "..."}]}`
//!
//! [`HttpKeysetClient`] fetches and caches a keyset with a TTL;
//! [`StaticKeyset`] holds keys supplied in memory.
//!
//! # Security
//!
//! - Keys are cached to avoid a fetch per verification
//! - The cache is refreshed on TTL expiry to pick up key rotations
//! - Entries that are not RSA keys are skipped, never trusted

use crate::errors::{AuthError, VerificationError};
use crate::observability::metrics;
use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::instrument;
use x509_parser::pem::parse_x509_pem;
use x509_parser::public_key::PublicKey;

/// Default cache TTL in seconds (5 minutes).
const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Default HTTP request timeout for keyset fetches.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of verification keys.
#[async_trait]
pub trait KeysetProvider: Send + Sync {
    /// Look up the key for `kid`.
    ///
    /// # Errors
    ///
    /// - `KeyNotFound` if the keyset has no such key
    /// - `KeysetUnavailable` if the keyset cannot be obtained
    async fn key(&self, kid: &str) -> Result<DecodingKey, VerificationError>;
}

/// JSON Web Key entry. Only RSA signing keys are used.
#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    #[serde(default)]
    kty: Option<String>,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

/// Either keyset layout.
#[derive(Deserialize)]
#[serde(untagged)]
enum KeysetDocument {
    Jwks { keys: Vec<Jwk> },
    X509(HashMap<String, String>),
}

/// Parse a keyset document into decoding keys by `kid`.
///
/// Entries that are not usable RSA keys are skipped with a warning.
///
/// # Errors
///
/// Returns `KeysetUnavailable` if the body is not one of the two layouts.
pub fn parse_keyset(body: &[u8]) -> Result<HashMap<String, DecodingKey>, VerificationError> {
    let document: KeysetDocument = serde_json::from_slice(body).map_err(|e| {
        tracing::error!(target: "esp_auth.keyset", error = %e, "Failed to parse keyset document");
        VerificationError::KeysetUnavailable("keyset document is not a JWKS or x509 map".to_string())
    })?;

    let keys = match document {
        KeysetDocument::Jwks { keys } => keys
            .into_iter()
            .filter_map(|jwk| match jwk_to_key(&jwk) {
                Ok(key) => Some((jwk.kid, key)),
                Err(reason) => {
                    tracing::warn!(target: "esp_auth.keyset", kid = %jwk.kid, reason = %reason, "Skipping JWK");
                    None
                }
            })
            .collect(),
        KeysetDocument::X509(certs) => certs
            .into_iter()
            .filter_map(|(kid, pem)| match certificate_to_key(&pem) {
                Ok(key) => Some((kid, key)),
                Err(reason) => {
                    tracing::warn!(target: "esp_auth.keyset", kid = %kid, reason = %reason, "Skipping certificate");
                    None
                }
            })
            .collect(),
    };

    Ok(keys)
}

fn jwk_to_key(jwk: &Jwk) -> Result<DecodingKey, String> {
    let kty = jwk.kty.as_deref().unwrap_or("RSA");
    if kty != "RSA" {
        return Err(format!("unsupported key type {kty}"));
    }
    if let Some(alg) = &jwk.alg {
        if alg != "RS256" {
            return Err(format!("unsupported algorithm {alg}"));
        }
    }

    let (Some(n), Some(e)) = (&jwk.n, &jwk.e) else {
        return Err("missing RSA modulus or exponent".to_string());
    };

    DecodingKey::from_rsa_components(n, e).map_err(|e| format!("invalid RSA components: {e}"))
}

/// Extract the RSA public key from a PEM X.509 certificate.
fn certificate_to_key(pem: &str) -> Result<DecodingKey, String> {
    let (_, pem) =
        parse_x509_pem(pem.as_bytes()).map_err(|e| format!("invalid certificate PEM: {e}"))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| format!("invalid X.509 certificate: {e}"))?;

    let spki = cert.public_key();
    match spki.parsed() {
        Ok(PublicKey::RSA(_)) => {}
        Ok(_) => return Err("certificate key is not RSA".to_string()),
        Err(e) => return Err(format!("invalid certificate public key: {e}")),
    }

    // subjectPublicKey of an RSA SPKI is the PKCS#1 RSAPublicKey
    Ok(DecodingKey::from_rsa_der(&spki.subject_public_key.data))
}

// =============================================================================
// HTTP keyset client
// =============================================================================

/// Cached keyset with expiry time.
struct CachedKeyset {
    keys: HashMap<String, DecodingKey>,
    expires_at: Instant,
}

/// Keyset fetched over HTTP(S) and cached with a TTL.
pub struct HttpKeysetClient {
    jwks_uri: String,
    http_client: reqwest::Client,
    cache: Arc<RwLock<Option<CachedKeyset>>>,
    cache_ttl: Duration,
}

impl HttpKeysetClient {
    /// Create a client with the default 5 minute TTL.
    pub fn new(jwks_uri: impl Into<String>) -> Self {
        Self::with_ttl(jwks_uri, Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS))
    }

    /// Create a client with a custom cache TTL.
    pub fn with_ttl(jwks_uri: impl Into<String>, cache_ttl: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "esp_auth.keyset", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_uri: jwks_uri.into(),
            http_client,
            cache: Arc::new(RwLock::new(None)),
            cache_ttl,
        }
    }

    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Fetch the keyset now, replacing the cache.
    ///
    /// # Errors
    ///
    /// Returns `KeysetUnavailable` if the fetch or parse fails; the previous
    /// cache entry is kept in that case.
    #[instrument(skip_all, fields(uri = %self.jwks_uri))]
    pub async fn refresh(&self) -> Result<(), VerificationError> {
        tracing::debug!(target: "esp_auth.keyset", "Fetching keyset");

        let result = self.fetch().await;
        metrics::record_keyset_fetch(if result.is_ok() { "success" } else { "error" });
        let keys = result?;

        tracing::info!(
            target: "esp_auth.keyset",
            key_count = keys.len(),
            "Keyset cache refreshed"
        );

        let mut cache = self.cache.write().await;
        *cache = Some(CachedKeyset {
            keys,
            expires_at: Instant::now() + self.cache_ttl,
        });
        Ok(())
    }

    async fn fetch(&self) -> Result<HashMap<String, DecodingKey>, VerificationError> {
        let response = self
            .http_client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "esp_auth.keyset", error = %e, "Failed to fetch keyset");
                VerificationError::KeysetUnavailable("keyset endpoint unreachable".to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "esp_auth.keyset",
                status = %response.status(),
                "Keyset endpoint returned error"
            );
            return Err(VerificationError::KeysetUnavailable(format!(
                "keyset endpoint returned {}",
                response.status()
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            tracing::error!(target: "esp_auth.keyset", error = %e, "Failed to read keyset body");
            VerificationError::KeysetUnavailable("keyset response body unreadable".to_string())
        })?;

        parse_keyset(&body)
    }

    /// Clear the cache so the next lookup fetches.
    pub async fn clear_cache(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }
}

#[async_trait]
impl KeysetProvider for HttpKeysetClient {
    #[instrument(skip_all, fields(kid = %kid))]
    async fn key(&self, kid: &str) -> Result<DecodingKey, VerificationError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.expires_at > Instant::now() {
                    if let Some(key) = cached.keys.get(kid) {
                        tracing::debug!(target: "esp_auth.keyset", kid = %kid, "Keyset cache hit");
                        return Ok(key.clone());
                    }
                    // Fresh cache without the key: do not refetch
                    tracing::debug!(target: "esp_auth.keyset", kid = %kid, "Key not found in keyset cache");
                    return Err(VerificationError::KeyNotFound {
                        kid: kid.to_string(),
                    });
                }
            }
        }

        self.refresh().await?;

        let cache = self.cache.read().await;
        if let Some(key) = cache.as_ref().and_then(|cached| cached.keys.get(kid)) {
            return Ok(key.clone());
        }

        tracing::warn!(target: "esp_auth.keyset", kid = %kid, "Key not found in keyset after refresh");
        Err(VerificationError::KeyNotFound {
            kid: kid.to_string(),
        })
    }
}

impl fmt::Debug for HttpKeysetClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpKeysetClient")
            .field("jwks_uri", &self.jwks_uri)
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Static keyset
// =============================================================================

/// In-memory keyset.
#[derive(Clone, Default)]
pub struct StaticKeyset {
    keys: HashMap<String, DecodingKey>,
}

impl StaticKeyset {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a keyset document (x509 map or JWKS).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the document cannot be parsed.
    pub fn from_document(body: &[u8]) -> Result<Self, AuthError> {
        let keys =
            parse_keyset(body).map_err(|e| AuthError::Config(format!("invalid keyset: {e}")))?;
        Ok(Self { keys })
    }

    /// Add the key of a PEM X.509 certificate.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the certificate is invalid or not RSA.
    pub fn with_certificate(mut self, kid: impl Into<String>, pem: &str) -> Result<Self, AuthError> {
        let key = certificate_to_key(pem).map_err(AuthError::Config)?;
        self.keys.insert(kid.into(), key);
        Ok(self)
    }

    /// Add an RSA public key in PEM (SPKI or PKCS#1).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the PEM is not an RSA public key.
    pub fn with_public_key_pem(
        mut self,
        kid: impl Into<String>,
        pem: &str,
    ) -> Result<Self, AuthError> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::Config(format!("invalid RSA public key: {e}")))?;
        self.keys.insert(kid.into(), key);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[async_trait]
impl KeysetProvider for StaticKeyset {
    async fn key(&self, kid: &str) -> Result<DecodingKey, VerificationError> {
        self.keys
            .get(kid)
            .cloned()
            .ok_or_else(|| VerificationError::KeyNotFound {
                kid: kid.to_string(),
            })
    }
}

impl fmt::Debug for StaticKeyset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kids: Vec<&String> = self.keys.keys().collect();
        kids.sort();
        f.debug_struct("StaticKeyset").field("kids", &kids).finish()
    }
}
