//! Builder patterns for test token construction
//!
//! Produces RS256 tokens with arbitrary claims so verification failures
//! (wrong issuer, wrong audience, expired, future `iat`, unknown `kid`,
//! wrong key) can be exercised without going through the production signer.

use crate::crypto_fixtures::{
    PRIMARY_KEY_ID, PRIMARY_PRIVATE_KEY_PEM, TEST_AUDIENCE, TEST_CLIENT_EMAIL,
};
use chrono::Utc;
use common::jwt::ServiceAccountClaims;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

/// Builder for signed test tokens
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .with_audience("other.example.com")
///     .expires_in(-10)
///     .build();
/// ```
pub struct TestTokenBuilder {
    claims: ServiceAccountClaims,
    kid: Option<String>,
    private_key_pem: String,
}

impl TestTokenBuilder {
    /// Defaults: primary key, [`TEST_CLIENT_EMAIL`] as issuer and subject,
    /// [`TEST_AUDIENCE`], issued now, valid for one hour.
    pub fn new() -> Self {
        let now = Utc::now().timestamp();
        Self {
            claims: ServiceAccountClaims {
                iss: TEST_CLIENT_EMAIL.to_string(),
                sub: TEST_CLIENT_EMAIL.to_string(),
                aud: TEST_AUDIENCE.to_string(),
                iat: now,
                exp: now + 3600,
            },
            kid: Some(PRIMARY_KEY_ID.to_string()),
            private_key_pem: PRIMARY_PRIVATE_KEY_PEM.to_string(),
        }
    }

    /// Set the issuer
    pub fn with_issuer(mut self, iss: &str) -> Self {
        self.claims.iss = iss.to_string();
        self
    }

    /// Set the subject
    pub fn with_subject(mut self, sub: &str) -> Self {
        self.claims.sub = sub.to_string();
        self
    }

    /// Set the audience
    pub fn with_audience(mut self, aud: &str) -> Self {
        self.claims.aud = aud.to_string();
        self
    }

    /// Set issued-at relative to now (negative is in the past)
    pub fn issued_in(mut self, seconds: i64) -> Self {
        self.claims.iat = Utc::now().timestamp() + seconds;
        self
    }

    /// Set expiration relative to now (negative is in the past)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.claims.exp = Utc::now().timestamp() + seconds;
        self
    }

    /// Set absolute `iat` and `exp`
    pub fn valid_between(mut self, iat: i64, exp: i64) -> Self {
        self.claims.iat = iat;
        self.claims.exp = exp;
        self
    }

    /// Set the header `kid`
    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = Some(kid.to_string());
        self
    }

    /// Omit the header `kid`
    pub fn without_kid(mut self) -> Self {
        self.kid = None;
        self
    }

    /// Sign with a different private key (PEM)
    pub fn signed_with(mut self, private_key_pem: &str) -> Self {
        self.private_key_pem = private_key_pem.to_string();
        self
    }

    /// Claims the token will carry
    pub fn claims(&self) -> &ServiceAccountClaims {
        &self.claims
    }

    /// Sign and serialize the token
    pub fn build(self) -> String {
        let key = EncodingKey::from_rsa_pem(self.private_key_pem.as_bytes())
            .expect("test private key must be RSA PEM");
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.kid;
        encode(&header, &self.claims, &key).expect("sign test token")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
