//! ESP auth error types.
//!
//! `AuthError` covers construction, signing and transport failures.
//! `VerificationError` keeps every token-rejection reason distinct so callers
//! can tell a rotated keyset from a forged or stale token.
//!
//! Errors surfaced to a remote peer as `tonic::Status` carry generic messages;
//! the detailed cause is logged locally.

use common::jwt::JwtValidationError;
use thiserror::Error;
use tonic::Status;

/// ESP auth error type.
///
/// Maps to gRPC status codes when a call is aborted:
/// - Config, Signing, InvalidArgument: UNAUTHENTICATED (no credential could be attached)
/// - Verification: UNAUTHENTICATED
/// - Transport: UNAVAILABLE
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or invalid credential material or settings at construction.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Private key unusable at sign time.
    #[error("Signing error: {0}")]
    Signing(String),

    /// Lifetime, margin or audience out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Token verification failed.
    #[error("Token verification failed: {0}")]
    Verification(#[from] VerificationError),

    /// Channel could not be built.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl AuthError {
    /// Bounded label for metrics and logs.
    pub fn error_type(&self) -> &'static str {
        match self {
            AuthError::Config(_) => "config",
            AuthError::Signing(_) => "signing",
            AuthError::InvalidArgument(_) => "invalid_argument",
            AuthError::Verification(_) => "verification",
            AuthError::Transport(_) => "transport",
        }
    }
}

impl From<AuthError> for Status {
    fn from(err: AuthError) -> Self {
        match &err {
            AuthError::Config(_) | AuthError::Signing(_) | AuthError::InvalidArgument(_) => {
                tracing::warn!(
                    target: "esp_auth.interceptor",
                    error = %err,
                    "Failed to attach credentials to outbound call"
                );
                Status::unauthenticated("Failed to obtain call credentials")
            }
            AuthError::Verification(reason) => {
                tracing::debug!(
                    target: "esp_auth.verifier",
                    reason = reason.reason(),
                    "Token rejected"
                );
                Status::unauthenticated("The access token is invalid or expired")
            }
            AuthError::Transport(_) => {
                tracing::warn!(target: "esp_auth.channel", error = %err, "Transport unavailable");
                Status::unavailable("Service temporarily unavailable")
            }
        }
    }
}

/// Reason a token was rejected by the verifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// Oversized, not three segments, bad encoding, or no `kid`.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The keyset has no key with the token's `kid`.
    #[error("no verification key for kid '{kid}'")]
    KeyNotFound {
        /// Key id from the token header.
        kid: String,
    },

    /// The keyset could not be fetched or parsed.
    #[error("keyset unavailable: {0}")]
    KeysetUnavailable(String),

    /// RS256 signature does not match the selected key.
    #[error("signature does not match")]
    SignatureMismatch,

    /// `iss` differs from the expected issuer.
    #[error("issuer mismatch (expected '{expected}', got '{actual}')")]
    IssuerMismatch {
        /// Expected issuer.
        expected: String,
        /// Issuer carried by the token.
        actual: String,
    },

    /// `aud` differs from the expected audience.
    #[error("audience mismatch (expected '{expected}', got '{actual}')")]
    AudienceMismatch {
        /// Expected audience.
        expected: String,
        /// Audience carried by the token.
        actual: String,
    },

    /// `exp` is in the past.
    #[error("token expired (exp {exp}, now {now})")]
    Expired {
        /// Expiration of the token.
        exp: i64,
        /// Time of the check.
        now: i64,
    },

    /// `iat` is in the future.
    #[error("token not yet valid (iat {iat}, now {now})")]
    NotYetValid {
        /// Issued-at of the token.
        iat: i64,
        /// Time of the check.
        now: i64,
    },
}

impl VerificationError {
    /// Stable label for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            VerificationError::MalformedToken(_) => "malformed_token",
            VerificationError::KeyNotFound { .. } => "key_not_found",
            VerificationError::KeysetUnavailable(_) => "keyset_unavailable",
            VerificationError::SignatureMismatch => "signature_mismatch",
            VerificationError::IssuerMismatch { .. } => "issuer_mismatch",
            VerificationError::AudienceMismatch { .. } => "audience_mismatch",
            VerificationError::Expired { .. } => "expired",
            VerificationError::NotYetValid { .. } => "not_yet_valid",
        }
    }

    /// Whether re-fetching the keyset could change the outcome.
    pub fn is_key_related(&self) -> bool {
        matches!(
            self,
            VerificationError::KeyNotFound { .. } | VerificationError::KeysetUnavailable(_)
        )
    }
}

impl From<JwtValidationError> for VerificationError {
    fn from(err: JwtValidationError) -> Self {
        match err {
            JwtValidationError::NotYetValid { iat, now } => {
                VerificationError::NotYetValid { iat, now }
            }
            JwtValidationError::Expired { exp, now } => VerificationError::Expired { exp, now },
            JwtValidationError::TokenTooLarge
            | JwtValidationError::MalformedToken
            | JwtValidationError::MissingKid => VerificationError::MalformedToken(err.to_string()),
        }
    }
}
