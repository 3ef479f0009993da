//! Service-account token verification.
//!
//! Validates a token presented by a peer against an expected issuer and
//! audience, using public keys from a [`KeysetProvider`].
//!
//! # Security Checks
//!
//! 1. Size check and structure (three segments, header `kid`) before any
//!    key lookup
//! 2. Key lookup by `kid`
//! 3. RS256 signature; no other algorithm is accepted
//! 4. `iss` must equal the expected issuer
//! 5. `aud` must equal the expected audience
//! 6. `iat - skew <= now <= exp + skew`
//!
//! Every failure keeps its reason (see [`VerificationError`]).

use crate::config::{default_jwks_uri, ServiceAuthConfig};
use crate::errors::{AuthError, VerificationError};
use crate::keyset::{HttpKeysetClient, KeysetProvider};
use crate::observability::metrics;
use chrono::Utc;
use common::jwt::{
    extract_kid, validate_time_window_at, ServiceAccountClaims, DEFAULT_CLOCK_SKEW,
    MAX_CLOCK_SKEW,
};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Verifier for tokens issued by one service account to one audience.
#[derive(Clone)]
pub struct TokenVerifier {
    keyset: Arc<dyn KeysetProvider>,
    expected_issuer: String,
    expected_audience: String,
    clock_skew: Duration,
}

impl TokenVerifier {
    /// Verifier using Google's published certificates for `expected_issuer`.
    pub fn new(expected_issuer: impl Into<String>, expected_audience: impl Into<String>) -> Self {
        let expected_issuer = expected_issuer.into();
        let keyset = Arc::new(HttpKeysetClient::new(default_jwks_uri(&expected_issuer)));
        Self::with_keyset(expected_issuer, expected_audience, keyset)
    }

    /// Verifier with an explicit key source.
    pub fn with_keyset(
        expected_issuer: impl Into<String>,
        expected_audience: impl Into<String>,
        keyset: Arc<dyn KeysetProvider>,
    ) -> Self {
        Self {
            keyset,
            expected_issuer: expected_issuer.into(),
            expected_audience: expected_audience.into(),
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }

    /// Verifier for tokens signed with `config`: its effective issuer,
    /// audience and keyset URI.
    ///
    /// The expected issuer is the account email, or the issuer override when
    /// one is set.
    pub fn for_service(config: &ServiceAuthConfig) -> Self {
        Self::with_keyset(
            config.issuer(),
            config.audience(),
            Arc::new(HttpKeysetClient::new(config.jwks_uri())),
        )
    }

    /// Set the clock skew tolerance for `iat`/`exp`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `skew` exceeds 10 minutes.
    pub fn with_clock_skew(mut self, skew: Duration) -> Result<Self, AuthError> {
        if skew > MAX_CLOCK_SKEW {
            return Err(AuthError::InvalidArgument(format!(
                "clock skew must not exceed {} seconds, got {}",
                MAX_CLOCK_SKEW.as_secs(),
                skew.as_secs()
            )));
        }
        self.clock_skew = skew;
        Ok(self)
    }

    pub fn expected_issuer(&self) -> &str {
        &self.expected_issuer
    }

    pub fn expected_audience(&self) -> &str {
        &self.expected_audience
    }

    /// Verify `token` and return its claims.
    ///
    /// # Errors
    ///
    /// Returns the first failed check as a [`VerificationError`].
    #[instrument(skip_all)]
    pub async fn verify(&self, token: &str) -> Result<ServiceAccountClaims, VerificationError> {
        self.verify_at(token, Utc::now().timestamp()).await
    }

    /// Deterministic variant of [`TokenVerifier::verify`] with an explicit
    /// `now`.
    pub(crate) async fn verify_at(
        &self,
        token: &str,
        now: i64,
    ) -> Result<ServiceAccountClaims, VerificationError> {
        match self.check(token, now).await {
            Ok(claims) => {
                metrics::record_token_verification("success", "none");
                tracing::debug!(target: "esp_auth.verifier", "Token verified");
                Ok(claims)
            }
            Err(e) => {
                metrics::record_token_verification("error", e.reason());
                tracing::debug!(
                    target: "esp_auth.verifier",
                    reason = e.reason(),
                    error = %e,
                    "Token rejected"
                );
                Err(e)
            }
        }
    }

    async fn check(&self, token: &str, now: i64) -> Result<ServiceAccountClaims, VerificationError> {
        let kid = extract_kid(token)?;
        let key = self.keyset.key(&kid).await?;
        let claims = verify_signature(token, &key)?;

        if claims.iss != self.expected_issuer {
            return Err(VerificationError::IssuerMismatch {
                expected: self.expected_issuer.clone(),
                actual: claims.iss,
            });
        }

        if claims.aud != self.expected_audience {
            return Err(VerificationError::AudienceMismatch {
                expected: self.expected_audience.clone(),
                actual: claims.aud,
            });
        }

        validate_time_window_at(claims.iat, claims.exp, self.clock_skew, now)?;

        Ok(claims)
    }
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("expected_issuer", &self.expected_issuer)
            .field("expected_audience", &self.expected_audience)
            .field("clock_skew", &self.clock_skew)
            .finish_non_exhaustive()
    }
}

/// Check the RS256 signature and decode the claims.
///
/// Time and audience checks are done by the caller so each failure keeps its
/// own reason.
fn verify_signature(
    token: &str,
    key: &DecodingKey,
) -> Result<ServiceAccountClaims, VerificationError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    decode::<ServiceAccountClaims>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => {
                VerificationError::MalformedToken(format!("token could not be decoded: {e}"))
            }
            _ => VerificationError::SignatureMismatch,
        })
}
