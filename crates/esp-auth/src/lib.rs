//! Credential attachment for outbound gRPC calls to ESP-fronted services.
//!
//! Every outbound call gets an `x-api-key` and/or an
//! `authorization: Bearer <token>` header, where the token is a short-lived
//! RS256 JWT self-signed with a Google service-account key. Tokens are cached
//! and re-signed only when they come within the refresh margin of expiry.
//!
//! # Modules
//!
//! - [`credentials`]: service-account key loading
//! - [`config`]: interceptor configuration, programmatic or from env vars
//! - [`signer`]: signed token generator
//! - [`token_cache`]: single-slot cache with refresh margin
//! - [`interceptor`]: `tonic` interceptor attaching the headers
//! - [`channel`]: TLS channel construction wrapped in the interceptor
//! - [`keyset`]: public keys by `kid` (x509 map or JWKS)
//! - [`verifier`]: token verification against issuer, audience and keyset
//!
//! # Example
//!
//! ```rust,ignore
//! use esp_auth::{AuthConfig, AuthInterceptor, ServiceAccountKey, ServiceAuthConfig};
//!
//! let key = ServiceAccountKey::from_file("service-account.json")?;
//! let config = AuthConfig::new()
//!     .with_api_key("k1")
//!     .with_service_auth(ServiceAuthConfig::new(key, "bookstore.example.com")?);
//!
//! let channel = esp_auth::channel::connect(
//!     &esp_auth::channel::ChannelOptions::new("bookstore.example.com:443"),
//!     AuthInterceptor::new(config)?,
//! )
//! .await?;
//! ```

pub mod channel;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod interceptor;
pub mod keyset;
pub mod observability;
pub mod signer;
pub mod token_cache;
pub mod verifier;

pub use config::{AuthConfig, ServiceAuthConfig};
pub use credentials::ServiceAccountKey;
pub use errors::{AuthError, VerificationError};
pub use interceptor::AuthInterceptor;
pub use keyset::{HttpKeysetClient, KeysetProvider, StaticKeyset};
pub use signer::{sign_service_token, SignedToken, MAX_TOKEN_LIFETIME_SECS};
pub use token_cache::{TokenCache, DEFAULT_REFRESH_MARGIN};
pub use verifier::TokenVerifier;

pub use common::jwt::ServiceAccountClaims;
