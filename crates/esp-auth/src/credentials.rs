//! Service account credentials.
//!
//! A [`ServiceAccountKey`] is the identity a token is signed for: the account
//! email, the id of the key pair, and the PEM private key. It is usually loaded
//! from the JSON file Google issues for a service account.

use crate::errors::AuthError;
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Account type Google writes into service-account key files.
const SERVICE_ACCOUNT_TYPE: &str = "service_account";

/// Service account identity and signing key.
///
/// Immutable after construction. The private key is redacted in Debug output.
#[derive(Clone)]
pub struct ServiceAccountKey {
    client_email: String,
    private_key_id: String,
    private_key: SecretString,
}

/// On-disk layout of a service-account key file. Other fields are ignored.
#[derive(Deserialize)]
struct ServiceAccountFile {
    #[serde(rename = "type", default)]
    account_type: Option<String>,
    client_email: String,
    private_key_id: String,
    private_key: SecretString,
}

impl ServiceAccountKey {
    /// Create a key from its parts.
    ///
    /// Key material is not inspected here; an unusable key surfaces as a
    /// configuration error when a `ServiceAuthConfig` is built, or as a
    /// signing error if it is signed with directly.
    #[must_use]
    pub fn new(
        client_email: impl Into<String>,
        private_key_id: impl Into<String>,
        private_key: SecretString,
    ) -> Self {
        Self {
            client_email: client_email.into(),
            private_key_id: private_key_id.into(),
            private_key,
        }
    }

    /// Parse a Google service-account JSON document.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the document is not JSON, lacks
    /// `client_email`, `private_key_id` or `private_key`, has an empty
    /// `client_email`, or declares a `type` other than `service_account`.
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let file: ServiceAccountFile = serde_json::from_str(json).map_err(|e| {
            tracing::debug!(target: "esp_auth.credentials", error = %e, "Invalid service account JSON");
            AuthError::Config(format!("invalid service account JSON: {e}"))
        })?;

        if let Some(account_type) = &file.account_type {
            if account_type != SERVICE_ACCOUNT_TYPE {
                return Err(AuthError::Config(format!(
                    "expected credentials of type '{SERVICE_ACCOUNT_TYPE}', got '{account_type}'"
                )));
            }
        }

        if file.client_email.trim().is_empty() {
            return Err(AuthError::Config(
                "service account client_email must not be empty".to_string(),
            ));
        }

        Ok(Self {
            client_email: file.client_email,
            private_key_id: file.private_key_id,
            private_key: file.private_key,
        })
    }

    /// Read and parse a service-account JSON file.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            tracing::warn!(
                target: "esp_auth.credentials",
                path = %path.display(),
                error = %e,
                "Failed to read service account file"
            );
            AuthError::Config(format!(
                "cannot read service account file {}: {e}",
                path.display()
            ))
        })?;

        let key = Self::from_json(&contents)?;
        tracing::debug!(
            target: "esp_auth.credentials",
            key_id = %key.private_key_id,
            "Loaded service account key"
        );
        Ok(key)
    }

    /// Service account email; default issuer and the token subject.
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// Id of the key pair; written to the token header as `kid`.
    pub fn private_key_id(&self) -> &str {
        &self.private_key_id
    }

    /// PEM private key (PKCS#1 or PKCS#8).
    pub fn private_key(&self) -> &SecretString {
        &self.private_key
    }

    pub(crate) fn private_key_pem(&self) -> &[u8] {
        self.private_key.expose_secret().as_bytes()
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use esp_auth_test_utils::{
        primary_service_account_json, write_temp_file, PRIMARY_KEY_ID, PRIMARY_PRIVATE_KEY_PEM,
        TEST_CLIENT_EMAIL,
    };

    #[test]
    fn test_from_json_reads_google_key_file() {
        let key = ServiceAccountKey::from_json(&primary_service_account_json()).unwrap();

        assert_eq!(key.client_email(), TEST_CLIENT_EMAIL);
        assert_eq!(key.private_key_id(), PRIMARY_KEY_ID);
        assert_eq!(key.private_key().expose_secret(), PRIMARY_PRIVATE_KEY_PEM);
    }

    #[test]
    fn test_from_json_without_type_field() {
        let json = serde_json::json!({
            "client_email": "svc@x.iam",
            "private_key_id": "kid-1",
            "private_key": "pem",
        })
        .to_string();

        let key = ServiceAccountKey::from_json(&json).unwrap();
        assert_eq!(key.private_key_id(), "kid-1");
    }

    #[test]
    fn test_from_json_rejects_other_credential_types() {
        let json = serde_json::json!({
            "type": "authorized_user",
            "client_email": "svc@x.iam",
            "private_key_id": "kid-1",
            "private_key": "pem",
        })
        .to_string();

        let err = ServiceAccountKey::from_json(&json).unwrap_err();
        assert!(matches!(err, AuthError::Config(msg) if msg.contains("authorized_user")));
    }

    #[test]
    fn test_from_json_missing_fields() {
        let json = serde_json::json!({ "client_email": "svc@x.iam" }).to_string();
        assert!(matches!(
            ServiceAccountKey::from_json(&json),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn test_from_json_empty_email() {
        let json = serde_json::json!({
            "client_email": "  ",
            "private_key_id": "kid-1",
            "private_key": "pem",
        })
        .to_string();

        assert!(matches!(
            ServiceAccountKey::from_json(&json),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn test_from_json_not_json() {
        assert!(matches!(
            ServiceAccountKey::from_json("not json"),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let file = write_temp_file(&primary_service_account_json());

        let key = ServiceAccountKey::from_file(file.path()).unwrap();
        assert_eq!(key.client_email(), TEST_CLIENT_EMAIL);
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServiceAccountKey::from_file(dir.path().join("absent.json")).unwrap_err();

        assert!(matches!(err, AuthError::Config(msg) if msg.contains("absent.json")));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let key = ServiceAccountKey::from_json(&primary_service_account_json()).unwrap();
        let debug = format!("{key:?}");

        assert!(debug.contains(TEST_CLIENT_EMAIL));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("BEGIN PRIVATE KEY"));
    }
}
