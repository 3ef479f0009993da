//! Token cache with refresh margin.
//!
//! Holds at most one signed token for a [`ServiceAuthConfig`] and re-signs on
//! demand when the slot is empty or the cached token is too close to expiry.
//!
//! # Refresh rule
//!
//! A cached token is reused only while `expires_at - now > refresh_margin`.
//! At exactly the margin it counts as expired, so a caller never receives a
//! token with `refresh_margin` or less of remaining validity.
//!
//! # Concurrency
//!
//! The refresh decision, the signing and the replacement all happen under one
//! mutex: concurrent callers that observe the same stale token produce a
//! single refresh. There is no background task; refresh is purely
//! demand-driven.

use crate::config::{duration_secs, ServiceAuthConfig};
use crate::errors::AuthError;
use crate::observability::metrics;
use crate::signer::{sign_service_token_at, SignedToken};
use chrono::Utc;
use common::secret::SecretString;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::instrument;

/// Default refresh margin (60 seconds before expiration).
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Single-slot cache of signed tokens for one service account configuration.
pub struct TokenCache {
    config: ServiceAuthConfig,
    slot: Mutex<Option<SignedToken>>,
}

impl TokenCache {
    /// Create an empty cache; the first call signs.
    #[must_use]
    pub fn new(config: ServiceAuthConfig) -> Self {
        Self {
            config,
            slot: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServiceAuthConfig {
        &self.config
    }

    /// Return a token with more than the refresh margin of validity left,
    /// signing a new one if needed.
    ///
    /// # Errors
    ///
    /// Propagates signing errors. The slot is left untouched on failure, so a
    /// failed refresh never caches anything.
    #[instrument(skip_all)]
    pub fn get_or_refresh(&self) -> Result<SecretString, AuthError> {
        self.get_or_refresh_with(|| Utc::now().timestamp())
    }

    /// Deterministic variant of [`TokenCache::get_or_refresh`] with an
    /// explicit `now`.
    #[cfg(test)]
    pub(crate) fn get_or_refresh_at(&self, now: i64) -> Result<SecretString, AuthError> {
        self.get_or_refresh_with(|| now)
    }

    /// `clock` is read only once the slot is locked, so a caller that waited
    /// on the lock judges freshness and signs `iat` with the current time.
    fn get_or_refresh_with(
        &self,
        clock: impl FnOnce() -> i64,
    ) -> Result<SecretString, AuthError> {
        let margin = duration_secs(self.config.refresh_margin());

        // The slot is only ever replaced wholesale, so a poisoned lock still
        // holds a consistent value.
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let now = clock();

        if let Some(cached) = slot.as_ref() {
            if cached.remaining_at(now) > margin {
                metrics::record_token_cache_hit();
                tracing::trace!(
                    target: "esp_auth.token_cache",
                    expires_at = cached.expires_at(),
                    "Token cache hit"
                );
                return Ok(cached.token().clone());
            }
            tracing::debug!(
                target: "esp_auth.token_cache",
                expires_at = cached.expires_at(),
                now = now,
                refresh_margin_secs = margin,
                "Cached token within refresh margin"
            );
        }

        let signed = sign_service_token_at(
            self.config.identity(),
            self.config.audience(),
            self.config.issuer_override(),
            self.config.max_token_lifetime_secs(),
            now,
        )
        .map_err(|e| {
            metrics::record_token_refresh("error");
            tracing::warn!(
                target: "esp_auth.token_cache",
                key_id = %self.config.identity().private_key_id(),
                error = %e,
                "Token refresh failed"
            );
            e
        })?;

        metrics::record_token_refresh("success");
        tracing::info!(
            target: "esp_auth.token_cache",
            key_id = %self.config.identity().private_key_id(),
            audience = %self.config.audience(),
            expires_at = signed.expires_at(),
            "Service account token refreshed"
        );

        let token = signed.token().clone();
        *slot = Some(signed);
        Ok(token)
    }

    /// Drop the cached token so the next call re-signs.
    ///
    /// Used after the server answers `UNAUTHENTICATED`; retrying is up to the
    /// caller.
    pub fn invalidate(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.take().is_some() {
            tracing::debug!(target: "esp_auth.token_cache", "Cached token invalidated");
        }
    }

    /// Expiry of the cached token, if any.
    pub fn cached_expiry(&self) -> Option<i64> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(SignedToken::expires_at)
    }
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("config", &self.config)
            .field("cached_expiry", &self.cached_expiry())
            .finish()
    }
}
