//! Deterministic cryptographic fixtures for testing
//!
//! Fixed 2048-bit RSA keypairs (PKCS#8, as Google writes them into
//! service-account files), matching self-signed certificates, and an EC key
//! for unsupported-key-type cases. Everything is compiled in with
//! `include_str!` so tests never generate keys at runtime.

use std::io::Write;

/// Service account email used across tests.
pub const TEST_CLIENT_EMAIL: &str = "svc@x.iam";

/// Audience used across tests.
pub const TEST_AUDIENCE: &str = "bookstore.example.com";

/// Key id of the primary keypair.
pub const PRIMARY_KEY_ID: &str = "32e56a607af17c444eb588230dc8b0fcf6b76536";

/// Key id of the secondary keypair.
pub const SECONDARY_KEY_ID: &str = "9b1f0c8e55d2a7436e01f3c2b7a9d84e6f50c1a2";

/// Primary RSA private key (PKCS#8 PEM).
pub const PRIMARY_PRIVATE_KEY_PEM: &str = include_str!("../fixtures/primary_key.pem");

/// Primary RSA public key (SPKI PEM).
pub const PRIMARY_PUBLIC_KEY_PEM: &str = include_str!("../fixtures/primary_public.pem");

/// Self-signed X.509 certificate for the primary key.
pub const PRIMARY_CERT_PEM: &str = include_str!("../fixtures/primary_cert.pem");

/// Secondary RSA private key (PKCS#8 PEM).
pub const SECONDARY_PRIVATE_KEY_PEM: &str = include_str!("../fixtures/secondary_key.pem");

/// Secondary RSA public key (SPKI PEM).
pub const SECONDARY_PUBLIC_KEY_PEM: &str = include_str!("../fixtures/secondary_public.pem");

/// Self-signed X.509 certificate for the secondary key.
pub const SECONDARY_CERT_PEM: &str = include_str!("../fixtures/secondary_cert.pem");

/// P-256 EC private key (PKCS#8 PEM); not usable for RS256.
pub const EC_PRIVATE_KEY_PEM: &str = include_str!("../fixtures/ec_p256_key.pem");

/// RSA public exponent 65537, base64url.
pub const RSA_EXPONENT_B64URL: &str = "AQAB";

const PRIMARY_MODULUS_B64URL: &str = include_str!("../fixtures/primary_modulus.b64url");

/// Modulus of the primary key, base64url without padding (JWK `n`).
pub fn primary_modulus_b64url() -> &'static str {
    PRIMARY_MODULUS_B64URL.trim()
}

/// Build a Google-style service-account JSON document.
///
/// Includes the fields Google emits that the loader must ignore.
pub fn service_account_json(client_email: &str, key_id: &str, private_key_pem: &str) -> String {
    serde_json::json!({
        "type": "service_account",
        "project_id": "experimental-229809",
        "private_key_id": key_id,
        "private_key": private_key_pem,
        "client_email": client_email,
        "client_id": "108642135792468013579",
        "auth_uri": "https://accounts.google.com/o/oauth2/auth",
        "token_uri": "https://oauth2.googleapis.com/token",
    })
    .to_string()
}

/// Service-account JSON for the primary key and [`TEST_CLIENT_EMAIL`].
pub fn primary_service_account_json() -> String {
    service_account_json(TEST_CLIENT_EMAIL, PRIMARY_KEY_ID, PRIMARY_PRIVATE_KEY_PEM)
}

/// Write `contents` to a temporary file that lives as long as the handle.
pub fn write_temp_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file
}
