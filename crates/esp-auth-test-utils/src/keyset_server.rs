//! Mock keyset endpoint
//!
//! Wraps a `wiremock::MockServer` that publishes verification keys either as
//! a Google-style x509 map (`{kid: certificate_pem}`) or as a JWKS document.

use crate::crypto_fixtures::{
    primary_modulus_b64url, PRIMARY_CERT_PEM, PRIMARY_KEY_ID, RSA_EXPONENT_B64URL,
    SECONDARY_CERT_PEM, SECONDARY_KEY_ID,
};
use serde_json::{json, Map, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the keyset is served from.
pub const KEYSET_PATH: &str = "/robot/v1/metadata/x509/svc@x.iam";

/// Running mock keyset endpoint.
pub struct MockKeysetServer {
    server: MockServer,
}

impl MockKeysetServer {
    /// Start a server with nothing mounted.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Full URI of the keyset endpoint.
    pub fn keyset_uri(&self) -> String {
        format!("{}{}", self.server.uri(), KEYSET_PATH)
    }

    /// Mount an x509 map of `(kid, certificate_pem)` pairs.
    pub async fn mount_x509(&self, certs: &[(&str, &str)]) {
        let mut map = Map::new();
        for (kid, pem) in certs {
            map.insert((*kid).to_string(), Value::String((*pem).to_string()));
        }
        self.mount_body(Value::Object(map)).await;
    }

    /// Mount the primary and secondary fixture certificates.
    pub async fn mount_fixture_certs(&self) {
        self.mount_x509(&[
            (PRIMARY_KEY_ID, PRIMARY_CERT_PEM),
            (SECONDARY_KEY_ID, SECONDARY_CERT_PEM),
        ])
        .await;
    }

    /// Mount a JWKS containing only the primary key.
    pub async fn mount_primary_jwks(&self) {
        self.mount_body(json!({
            "keys": [{
                "kty": "RSA",
                "kid": PRIMARY_KEY_ID,
                "alg": "RS256",
                "use": "sig",
                "n": primary_modulus_b64url(),
                "e": RSA_EXPONENT_B64URL,
            }]
        }))
        .await;
    }

    /// Mount an arbitrary JSON body with status 200.
    pub async fn mount_body(&self, body: Value) {
        Mock::given(method("GET"))
            .and(path(KEYSET_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mount an error status.
    pub async fn mount_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(KEYSET_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Number of requests the server has received.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    /// Underlying server, for custom mocks.
    pub fn server(&self) -> &MockServer {
        &self.server
    }
}
