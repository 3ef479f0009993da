//! Metrics definitions for ESP auth.
//!
//! All metrics follow Prometheus naming conventions:
//! - `esp_auth_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `status`: 2 values (success, error)
//! - `reason`: bounded by `VerificationError::reason` plus `none`
//!
//! No exporter is installed here; the embedding binary chooses one.

use metrics::{counter, histogram};
use std::time::Duration;

/// Record the time spent signing one token.
///
/// Metric: `esp_auth_token_signing_duration_seconds`
pub fn record_token_signing(duration: Duration) {
    histogram!("esp_auth_token_signing_duration_seconds").record(duration.as_secs_f64());
}

/// Record a token cache refresh attempt.
///
/// Metric: `esp_auth_token_refresh_total`
/// Labels: `status`
pub fn record_token_refresh(status: &'static str) {
    counter!("esp_auth_token_refresh_total", "status" => status).increment(1);
}

/// Record a call served from the token cache.
///
/// Metric: `esp_auth_token_cache_hits_total`
pub fn record_token_cache_hit() {
    counter!("esp_auth_token_cache_hits_total").increment(1);
}

/// Record a token verification outcome.
///
/// Metric: `esp_auth_token_verifications_total`
/// Labels: `status`, `reason` (`none` on success)
pub fn record_token_verification(status: &'static str, reason: &'static str) {
    counter!("esp_auth_token_verifications_total",
        "status" => status,
        "reason" => reason
    )
    .increment(1);
}

/// Record a keyset fetch.
///
/// Metric: `esp_auth_keyset_fetch_total`
/// Labels: `status`
pub fn record_keyset_fetch(status: &'static str) {
    counter!("esp_auth_keyset_fetch_total", "status" => status).increment(1);
}
