//! JWT utilities shared by the ESP auth crates.
//!
//! This module provides the structural pieces of service-account token
//! handling that do not need key material:
//! - Size limit checked before any parsing
//! - Key ID extraction from the JWT header
//! - Unverified claim inspection (diagnostics and tests only)
//! - The `ServiceAccountClaims` claim set
//! - Validity-window checks with clock skew tolerance
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Nothing here verifies a signature; [`peek_claims`] output must never be
//!   used for an authorization decision
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{extract_kid, validate_time_window, DEFAULT_CLOCK_SKEW};
//!
//! // Find the verification key
//! let kid = extract_kid(token)?;
//!
//! // After signature verification, check iat/exp
//! validate_time_window(claims.iat, claims.exp, DEFAULT_CLOCK_SKEW)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// A service-account token with an RS256 signature is roughly 700-900 bytes.
/// Anything larger than this is rejected before base64 decoding.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default clock skew tolerance for `iat`/`exp` checks.
///
/// Zero: a token is valid exactly within `[iat, exp]`.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(0);

/// Maximum allowed clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during structural JWT validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("token exceeds {MAX_JWT_SIZE_BYTES} bytes")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("token is not a well-formed JWT")]
    MalformedToken,

    /// Token is missing required `kid` header.
    #[error("token header has no key id")]
    MissingKid,

    /// Token `iat` claim is later than now (plus skew).
    #[error("token is not yet valid (iat {iat}, now {now})")]
    NotYetValid {
        /// Issued-at of the token.
        iat: i64,
        /// Time of the check.
        now: i64,
    },

    /// Token `exp` claim is earlier than now (minus skew).
    #[error("token expired (exp {exp}, now {now})")]
    Expired {
        /// Expiration of the token.
        exp: i64,
        /// Time of the check.
        now: i64,
    },
}

// =============================================================================
// Claims Types
// =============================================================================

/// Claim set of a self-signed service-account token.
///
/// - `iss`: issuer, the service account email unless overridden
/// - `sub`: subject, always the service account email
/// - `aud`: audience, the target service name
/// - `iat`: issued-at (Unix epoch seconds)
/// - `exp`: expiration (Unix epoch seconds)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountClaims {
    /// Issuer.
    pub iss: String,

    /// Subject (service account email).
    pub sub: String,

    /// Audience (service name).
    pub aud: String,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,
}

impl ServiceAccountClaims {
    /// Lifetime the token was issued with, in seconds.
    #[must_use]
    pub fn lifetime_secs(&self) -> i64 {
        self.exp - self.iat
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Split a compact JWS into its three segments, enforcing the size limit.
fn segments(token: &str) -> Result<(&str, &str, &str), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok((header, payload, signature)),
        _ => {
            tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
            Err(JwtValidationError::MalformedToken)
        }
    }
}

/// Decode one base64url segment as JSON.
fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, JwtValidationError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT segment base64");
        JwtValidationError::MalformedToken
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT segment JSON");
        JwtValidationError::MalformedToken
    })
}

/// Extract the `kid` (key ID) from a JWT header without verifying the signature.
///
/// The `kid` selects the certificate in the issuer's keyset. The token MUST
/// still be verified against that key afterwards.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Wrong structure, bad base64, or invalid JSON
/// - `MissingKid` - Header has no `kid`, or `kid` is empty or not a string
pub fn extract_kid(token: &str) -> Result<String, JwtValidationError> {
    let (header_part, _, _) = segments(token)?;
    let header: serde_json::Value = decode_segment(header_part)?;

    header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingKid)
}

/// Decode the claim set of a token WITHOUT verifying its signature.
///
/// Meant for diagnostics (logging an expiry, asserting on a freshly signed
/// token in tests). Never authorize on the result.
///
/// # Errors
///
/// Returns `TokenTooLarge` or `MalformedToken` when the token cannot be decoded
/// into [`ServiceAccountClaims`].
pub fn peek_claims(token: &str) -> Result<ServiceAccountClaims, JwtValidationError> {
    let (_, payload_part, _) = segments(token)?;
    decode_segment(payload_part)
}

/// Check that now lies within `[iat - skew, exp + skew]`.
///
/// # Errors
///
/// Returns `NotYetValid` if `iat` is in the future beyond the skew, and
/// `Expired` if `exp` is in the past beyond the skew. `iat` is checked first.
pub fn validate_time_window(
    iat: i64,
    exp: i64,
    clock_skew: Duration,
) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_time_window_at(iat, exp, clock_skew, now)
}

/// Deterministic validity-window check against an explicit `now` timestamp.
///
/// Prefer [`validate_time_window`] in production code.
///
/// # Errors
///
/// Same as [`validate_time_window`].
pub fn validate_time_window_at(
    iat: i64,
    exp: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Claims come from the token, so every sum saturates
    let skew = i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX);

    if iat > now.saturating_add(skew) {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            clock_skew_secs = skew,
            "Token rejected: iat in the future"
        );
        return Err(JwtValidationError::NotYetValid { iat, now });
    }

    if now > exp.saturating_add(skew) {
        tracing::debug!(
            target: "common.jwt",
            exp = exp,
            now = now,
            clock_skew_secs = skew,
            "Token rejected: expired"
        );
        return Err(JwtValidationError::Expired { exp, now });
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn token_with(header: &str, payload: &str) -> String {
        format!(
            "{}.{}.c2lnbmF0dXJl",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    // -------------------------------------------------------------------------
    // extract_kid Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_extract_kid_valid_token() {
        let token = token_with(r#"{"alg":"RS256","typ":"JWT","kid":"32e56a607af1"}"#, "{}");

        assert_eq!(extract_kid(&token).unwrap(), "32e56a607af1");
    }

    #[test]
    fn test_extract_kid_missing_kid() {
        let token = token_with(r#"{"alg":"RS256","typ":"JWT"}"#, "{}");

        assert_eq!(extract_kid(&token), Err(JwtValidationError::MissingKid));
    }

    #[test]
    fn test_extract_kid_empty_kid() {
        let token = token_with(r#"{"alg":"RS256","kid":""}"#, "{}");

        assert_eq!(extract_kid(&token), Err(JwtValidationError::MissingKid));
    }

    #[test]
    fn test_extract_kid_non_string_kid() {
        let token = token_with(r#"{"alg":"RS256","kid":12345}"#, "{}");

        assert_eq!(extract_kid(&token), Err(JwtValidationError::MissingKid));
    }

    #[test]
    fn test_extract_kid_wrong_segment_count() {
        assert_eq!(extract_kid(""), Err(JwtValidationError::MalformedToken));
        assert_eq!(extract_kid("single"), Err(JwtValidationError::MalformedToken));
        assert_eq!(extract_kid("only.two"), Err(JwtValidationError::MalformedToken));
        assert_eq!(
            extract_kid("one.two.three.four"),
            Err(JwtValidationError::MalformedToken)
        );
    }

    #[test]
    fn test_extract_kid_invalid_base64() {
        assert_eq!(
            extract_kid("!!!invalid!!!.payload.signature"),
            Err(JwtValidationError::MalformedToken)
        );
    }

    #[test]
    fn test_extract_kid_invalid_json() {
        let token = format!("{}.e30.sig", URL_SAFE_NO_PAD.encode("not-json"));

        assert_eq!(extract_kid(&token), Err(JwtValidationError::MalformedToken));
    }

    #[test]
    fn test_extract_kid_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);

        assert_eq!(extract_kid(&oversized), Err(JwtValidationError::TokenTooLarge));
    }

    #[test]
    fn test_extract_kid_at_size_limit() {
        let header_b64 = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","kid":"key"}"#);
        let remaining = MAX_JWT_SIZE_BYTES - header_b64.len() - 2;
        let token = format!("{header_b64}.{}.", "a".repeat(remaining));
        assert_eq!(token.len(), MAX_JWT_SIZE_BYTES);

        assert_eq!(extract_kid(&token).unwrap(), "key");
    }

    // -------------------------------------------------------------------------
    // peek_claims Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_peek_claims_reads_payload() {
        let token = token_with(
            r#"{"alg":"RS256","kid":"k"}"#,
            r#"{"iss":"svc@x.iam","sub":"svc@x.iam","aud":"bookstore.example.com","iat":1000,"exp":1120}"#,
        );

        let claims = peek_claims(&token).unwrap();

        assert_eq!(claims.iss, "svc@x.iam");
        assert_eq!(claims.sub, "svc@x.iam");
        assert_eq!(claims.aud, "bookstore.example.com");
        assert_eq!(claims.lifetime_secs(), 120);
    }

    #[test]
    fn test_peek_claims_missing_field_is_malformed() {
        let token = token_with(r#"{"alg":"RS256"}"#, r#"{"iss":"a","sub":"a","iat":1,"exp":2}"#);

        assert_eq!(peek_claims(&token), Err(JwtValidationError::MalformedToken));
    }

    #[test]
    fn test_claims_serialization_field_names() {
        let claims = ServiceAccountClaims {
            iss: "svc@x.iam".to_string(),
            sub: "svc@x.iam".to_string(),
            aud: "bookstore.example.com".to_string(),
            iat: 1_733_801_365,
            exp: 1_733_801_485,
        };

        let json = serde_json::to_value(&claims).unwrap();

        assert_eq!(json["iss"], "svc@x.iam");
        assert_eq!(json["aud"], "bookstore.example.com");
        assert_eq!(json["iat"], 1_733_801_365);
        assert_eq!(json["exp"], 1_733_801_485);
    }

    // -------------------------------------------------------------------------
    // validate_time_window Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_time_window_inside() {
        let now = 1_700_000_000_i64;
        assert!(validate_time_window_at(now - 10, now + 10, DEFAULT_CLOCK_SKEW, now).is_ok());
    }

    #[test]
    fn test_time_window_boundaries_inclusive() {
        let now = 1_700_000_000_i64;
        assert!(validate_time_window_at(now, now + 10, DEFAULT_CLOCK_SKEW, now).is_ok());
        assert!(validate_time_window_at(now - 10, now, DEFAULT_CLOCK_SKEW, now).is_ok());
    }

    #[test]
    fn test_time_window_not_yet_valid() {
        let now = 1_700_000_000_i64;
        assert_eq!(
            validate_time_window_at(now + 1, now + 100, DEFAULT_CLOCK_SKEW, now),
            Err(JwtValidationError::NotYetValid { iat: now + 1, now })
        );
    }

    #[test]
    fn test_time_window_expired() {
        let now = 1_700_000_000_i64;
        assert_eq!(
            validate_time_window_at(now - 100, now - 1, DEFAULT_CLOCK_SKEW, now),
            Err(JwtValidationError::Expired { exp: now - 1, now })
        );
    }

    #[test]
    fn test_time_window_skew_widens_window() {
        let now = 1_700_000_000_i64;
        let skew = Duration::from_secs(30);

        assert!(validate_time_window_at(now + 30, now + 100, skew, now).is_ok());
        assert!(validate_time_window_at(now - 100, now - 30, skew, now).is_ok());
        assert!(validate_time_window_at(now + 31, now + 100, skew, now).is_err());
        assert!(validate_time_window_at(now - 100, now - 31, skew, now).is_err());
    }

    #[test]
    fn test_time_window_extreme_claims_do_not_overflow() {
        let now = 1_700_000_000;
        let skew = Duration::from_secs(30);

        assert!(validate_time_window_at(now - 10, i64::MAX, skew, now).is_ok());
        assert!(matches!(
            validate_time_window_at(i64::MAX, i64::MAX, skew, now),
            Err(JwtValidationError::NotYetValid { .. })
        ));
        assert!(matches!(
            validate_time_window_at(i64::MIN, i64::MIN, skew, now),
            Err(JwtValidationError::Expired { .. })
        ));
    }

    #[test]
    fn test_time_window_huge_skew_saturates() {
        let now = 1_700_000_000;

        assert!(validate_time_window_at(now + 100, now - 100, Duration::MAX, now).is_ok());
    }

    #[test]
    fn test_time_window_wall_clock() {
        let now = chrono::Utc::now().timestamp();
        assert!(validate_time_window(now - 5, now + 3600, DEFAULT_CLOCK_SKEW).is_ok());
        assert!(validate_time_window(now - 7200, now - 3600, DEFAULT_CLOCK_SKEW).is_err());
    }

    #[test]
    fn test_error_messages_are_distinct() {
        let not_yet = JwtValidationError::NotYetValid { iat: 2, now: 1 }.to_string();
        let expired = JwtValidationError::Expired { exp: 1, now: 2 }.to_string();

        assert!(not_yet.contains("not yet valid"));
        assert!(expired.contains("expired"));
    }
}
