//! Interceptor integration tests.
//!
//! Drives the public API the way a client does: credentials from a key file
//! or environment variables, then `Interceptor::call` per outbound request.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use common::jwt::{extract_kid, peek_claims};
use common::secret::SecretString;
use esp_auth::interceptor::{API_KEY_HEADER, AUTHORIZATION_HEADER};
use esp_auth::{
    sign_service_token, AuthConfig, AuthError, AuthInterceptor, ServiceAccountKey,
    ServiceAuthConfig,
};
use esp_auth_test_utils::{
    primary_service_account_json, write_temp_file, EC_PRIVATE_KEY_PEM, PRIMARY_KEY_ID,
    PRIMARY_PRIVATE_KEY_PEM, TEST_AUDIENCE, TEST_CLIENT_EMAIL,
};
use std::collections::HashMap;
use std::time::Duration;
use tonic::service::Interceptor;
use tonic::Request;

fn primary_key() -> ServiceAccountKey {
    ServiceAccountKey::from_json(&primary_service_account_json()).unwrap()
}

fn bearer_token(request: &Request<()>) -> String {
    request
        .metadata()
        .get(AUTHORIZATION_HEADER)
        .expect("authorization header present")
        .to_str()
        .unwrap()
        .strip_prefix("Bearer ")
        .expect("Bearer scheme")
        .to_string()
}

#[test]
fn test_bookstore_service_account_scenario() {
    let key_file = write_temp_file(&primary_service_account_json());
    let vars = HashMap::from([
        (
            "ESP_SERVICE_ACCOUNT_FILE".to_string(),
            key_file.path().display().to_string(),
        ),
        ("ESP_SERVICE_NAME".to_string(), "bookstore.example.com".to_string()),
        ("ESP_MAX_TOKEN_LIFETIME_SECONDS".to_string(), "120".to_string()),
    ]);
    let mut interceptor = AuthInterceptor::new(AuthConfig::from_vars(&vars).unwrap()).unwrap();

    let request = interceptor.call(Request::new(())).unwrap();
    let token = bearer_token(&request);
    let claims = peek_claims(&token).unwrap();

    assert_eq!(claims.iss, "svc@x.iam");
    assert_eq!(claims.sub, "svc@x.iam");
    assert_eq!(claims.aud, "bookstore.example.com");
    assert_eq!(claims.exp - claims.iat, 120);
    assert_eq!(extract_kid(&token).unwrap(), PRIMARY_KEY_ID);
    assert!(request.metadata().get(API_KEY_HEADER).is_none());
}

#[test]
fn test_api_key_only_scenario() {
    let vars = HashMap::from([("ESP_API_KEY".to_string(), "k1".to_string())]);
    let mut interceptor = AuthInterceptor::new(AuthConfig::from_vars(&vars).unwrap()).unwrap();

    let request = interceptor.call(Request::new(())).unwrap();

    assert_eq!(request.metadata().get(API_KEY_HEADER).unwrap(), "k1");
    assert!(request.metadata().get(AUTHORIZATION_HEADER).is_none());
}

#[test]
fn test_no_credentials_pass_through() {
    let mut interceptor = AuthInterceptor::new(AuthConfig::from_vars(&HashMap::new()).unwrap())
        .unwrap();

    let request = interceptor.call(Request::new(())).unwrap();

    assert!(request.metadata().is_empty());
}

#[test]
fn test_successive_calls_reuse_token() {
    let config = AuthConfig::new()
        .with_api_key("k1")
        .with_service_auth(ServiceAuthConfig::new(primary_key(), TEST_AUDIENCE).unwrap());
    let mut interceptor = AuthInterceptor::new(config).unwrap();

    let first = bearer_token(&interceptor.call(Request::new(())).unwrap());
    let second = bearer_token(&interceptor.call(Request::new(())).unwrap());

    assert_eq!(first, second);
}

#[test]
fn test_invalidate_clears_cached_token() {
    let config = AuthConfig::new()
        .with_service_auth(ServiceAuthConfig::new(primary_key(), TEST_AUDIENCE).unwrap());
    let mut interceptor = AuthInterceptor::new(config).unwrap();
    interceptor.call(Request::new(())).unwrap();

    let cache = interceptor.token_cache().unwrap().clone();
    assert!(cache.cached_expiry().is_some());

    interceptor.invalidate_cached_token();
    assert!(cache.cached_expiry().is_none());

    interceptor.call(Request::new(())).unwrap();
    assert!(cache.cached_expiry().is_some());
}

#[test]
fn test_zero_lifetime_rejected() {
    let config = ServiceAuthConfig::new(primary_key(), TEST_AUDIENCE).unwrap();
    assert!(matches!(
        config.with_max_token_lifetime(0),
        Err(AuthError::InvalidArgument(_))
    ));

    assert!(matches!(
        sign_service_token(&primary_key(), TEST_AUDIENCE, None, 0),
        Err(AuthError::InvalidArgument(_))
    ));
}

#[test]
fn test_unusable_key_fails_at_construction_and_signing() {
    let ec_key = ServiceAccountKey::new(
        TEST_CLIENT_EMAIL,
        PRIMARY_KEY_ID,
        SecretString::from(EC_PRIVATE_KEY_PEM),
    );

    assert!(matches!(
        ServiceAuthConfig::new(ec_key.clone(), TEST_AUDIENCE),
        Err(AuthError::Config(_))
    ));
    assert!(matches!(
        sign_service_token(&ec_key, TEST_AUDIENCE, None, 120),
        Err(AuthError::Signing(_))
    ));
}

#[test]
fn test_issuer_override_and_margin() {
    let identity = ServiceAccountKey::new(
        TEST_CLIENT_EMAIL,
        PRIMARY_KEY_ID,
        SecretString::from(PRIMARY_PRIVATE_KEY_PEM),
    );
    let service_auth = ServiceAuthConfig::new(identity, TEST_AUDIENCE)
        .unwrap()
        .with_refresh_margin(Duration::from_secs(10))
        .unwrap()
        .with_max_token_lifetime(30)
        .unwrap()
        .with_issuer("issuer@x.iam");
    let mut interceptor =
        AuthInterceptor::new(AuthConfig::new().with_service_auth(service_auth)).unwrap();

    let claims = peek_claims(&bearer_token(&interceptor.call(Request::new(())).unwrap())).unwrap();

    assert_eq!(claims.iss, "issuer@x.iam");
    assert_eq!(claims.sub, TEST_CLIENT_EMAIL);
    assert_eq!(claims.exp - claims.iat, 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_share_single_token() {
    let config = AuthConfig::new()
        .with_service_auth(ServiceAuthConfig::new(primary_key(), TEST_AUDIENCE).unwrap());
    let interceptor = AuthInterceptor::new(config).unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let mut interceptor = interceptor.clone();
            tokio::spawn(async move { bearer_token(&interceptor.call(Request::new(())).unwrap()) })
        })
        .collect();

    let mut tokens = Vec::new();
    for handle in handles {
        tokens.push(handle.await.unwrap());
    }

    let first = tokens.first().unwrap();
    assert!(tokens.iter().all(|t| t == first));
    assert!(peek_claims(first).unwrap().exp > chrono::Utc::now().timestamp() + 60);
}
