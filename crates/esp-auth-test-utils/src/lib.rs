//! Test utilities for the ESP auth crates.
//!
//! - [`crypto_fixtures`]: fixed RSA/EC keys, certificates and service-account documents
//! - [`token_builders`]: fluent builder for arbitrary (including invalid) signed tokens
//! - [`keyset_server`]: `wiremock` server publishing x509 or JWKS keysets

pub mod crypto_fixtures;
pub mod keyset_server;
pub mod token_builders;

pub use crypto_fixtures::*;
pub use keyset_server::*;
pub use token_builders::*;
