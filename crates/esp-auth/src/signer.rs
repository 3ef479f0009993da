//! Signed token generator.
//!
//! Produces self-signed RS256 service-account tokens: header
//! `{alg: RS256, typ: JWT, kid}`, claims `{iss, sub, aud, iat, exp}`.
//! CPU-bound only; no I/O.

use crate::credentials::ServiceAccountKey;
use crate::errors::AuthError;
use crate::observability::metrics;
use chrono::Utc;
use common::jwt::ServiceAccountClaims;
use common::secret::SecretString;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use std::fmt;
use std::time::Instant;
use tracing::instrument;

/// Longest lifetime a service-account token may be issued with (one hour).
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 3600;

/// A signed token and its expiry.
///
/// Replaced wholesale on refresh, never edited.
#[derive(Clone)]
pub struct SignedToken {
    token: SecretString,
    expires_at: i64,
}

impl SignedToken {
    /// Serialized token (compact JWS).
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    /// `exp` claim (Unix epoch seconds).
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Seconds of validity left at `now`; negative once expired.
    pub fn remaining_at(&self, now: i64) -> i64 {
        self.expires_at - now
    }
}

impl fmt::Debug for SignedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Sign a token for `identity` addressed to `audience`, valid for
/// `lifetime_secs` from now.
///
/// `iss` is `issuer` when given, otherwise the account email; `sub` is always
/// the account email.
///
/// # Errors
///
/// - `InvalidArgument` if `lifetime_secs` is not in `1..=3600` or the audience
///   is empty
/// - `Signing` if the key id is empty or the private key is absent, malformed,
///   or not RSA
pub fn sign_service_token(
    identity: &ServiceAccountKey,
    audience: &str,
    issuer: Option<&str>,
    lifetime_secs: i64,
) -> Result<SignedToken, AuthError> {
    sign_service_token_at(
        identity,
        audience,
        issuer,
        lifetime_secs,
        Utc::now().timestamp(),
    )
}

/// Deterministic variant of [`sign_service_token`] with an explicit `now`.
#[instrument(skip_all)]
pub(crate) fn sign_service_token_at(
    identity: &ServiceAccountKey,
    audience: &str,
    issuer: Option<&str>,
    lifetime_secs: i64,
    now: i64,
) -> Result<SignedToken, AuthError> {
    if lifetime_secs <= 0 || lifetime_secs > MAX_TOKEN_LIFETIME_SECS {
        return Err(AuthError::InvalidArgument(format!(
            "token lifetime must be between 1 and {MAX_TOKEN_LIFETIME_SECS} seconds, got {lifetime_secs}"
        )));
    }

    if audience.is_empty() {
        return Err(AuthError::InvalidArgument(
            "audience must not be empty".to_string(),
        ));
    }

    if identity.private_key_id().is_empty() {
        return Err(AuthError::Signing("private key id is empty".to_string()));
    }

    let start = Instant::now();

    let encoding_key = EncodingKey::from_rsa_pem(identity.private_key_pem())
        .map_err(|e| AuthError::Signing(format!("invalid RSA private key: {e}")))?;

    let claims = ServiceAccountClaims {
        iss: issuer.unwrap_or(identity.client_email()).to_string(),
        sub: identity.client_email().to_string(),
        aud: audience.to_string(),
        iat: now,
        exp: now + lifetime_secs,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.typ = Some("JWT".to_string());
    header.kid = Some(identity.private_key_id().to_string());

    let token = encode(&header, &claims, &encoding_key)
        .map_err(|e| AuthError::Signing(format!("JWT signing operation failed: {e}")))?;

    metrics::record_token_signing(start.elapsed());
    tracing::debug!(
        target: "esp_auth.signer",
        key_id = %identity.private_key_id(),
        audience = %audience,
        expires_at = claims.exp,
        "Signed service account token"
    );

    Ok(SignedToken {
        token: SecretString::from(token),
        expires_at: claims.exp,
    })
}
