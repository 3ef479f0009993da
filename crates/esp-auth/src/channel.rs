//! Authenticated gRPC channel construction.
//!
//! Builds a `tonic` channel wrapped in an [`AuthInterceptor`]. TLS is used
//! unless the caller asks for an insecure channel AND no credentials are
//! configured; credentials are never sent in plaintext. An optional PEM CA
//! bundle replaces the WebPKI roots.

use crate::errors::AuthError;
use crate::interceptor::AuthInterceptor;
use std::time::Duration;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};

/// Default connection timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Channel that attaches credentials to every call.
pub type AuthenticatedChannel = InterceptedService<Channel, AuthInterceptor>;

/// Options for [`connect`] and [`connect_lazy`].
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// `host:port`, or a full `http://` / `https://` URI.
    pub target: String,

    /// Allow a plaintext channel when no credentials are configured.
    pub insecure: bool,

    /// PEM CA bundle; WebPKI roots when `None`.
    pub ca_certificate_pem: Option<String>,

    /// TLS server name override.
    pub domain_name: Option<String>,

    pub connect_timeout: Duration,

    /// Per-request timeout; none by default.
    pub request_timeout: Option<Duration>,
}

impl ChannelOptions {
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            insecure: false,
            ca_certificate_pem: None,
            domain_name: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: None,
        }
    }

    #[must_use]
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    #[must_use]
    pub fn with_ca_certificate(mut self, pem: impl Into<String>) -> Self {
        self.ca_certificate_pem = Some(pem.into());
        self
    }

    #[must_use]
    pub fn with_domain_name(mut self, domain_name: impl Into<String>) -> Self {
        self.domain_name = Some(domain_name.into());
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

/// Connect and wrap the channel in `interceptor`.
///
/// # Errors
///
/// Returns `AuthError::Transport` if the target is invalid, TLS cannot be
/// configured, credentials would be sent over plaintext, or the connection
/// fails.
pub async fn connect(
    options: &ChannelOptions,
    interceptor: AuthInterceptor,
) -> Result<AuthenticatedChannel, AuthError> {
    let endpoint = endpoint(options, &interceptor)?;
    let channel = endpoint.connect().await.map_err(|e| {
        tracing::warn!(target: "esp_auth.channel", target_uri = %endpoint.uri(), error = %e, "Failed to connect");
        AuthError::Transport(format!("failed to connect to {}: {e}", endpoint.uri()))
    })?;

    tracing::debug!(target: "esp_auth.channel", target_uri = %endpoint.uri(), "Channel connected");
    Ok(InterceptedService::new(channel, interceptor))
}

/// Build a channel that connects on first use.
///
/// Must be called within a Tokio runtime.
///
/// # Errors
///
/// Same as [`connect`], except connection failures surface per call.
pub fn connect_lazy(
    options: &ChannelOptions,
    interceptor: AuthInterceptor,
) -> Result<AuthenticatedChannel, AuthError> {
    let channel = endpoint(options, &interceptor)?.connect_lazy();
    Ok(InterceptedService::new(channel, interceptor))
}

/// Configure the endpoint: scheme, TLS and timeouts.
fn endpoint(options: &ChannelOptions, interceptor: &AuthInterceptor) -> Result<Endpoint, AuthError> {
    let require_tls = !options.insecure || interceptor.has_credentials();
    let uri = resolve_uri(&options.target, require_tls)?;
    let use_tls = uri.starts_with("https://");

    let mut endpoint = Endpoint::from_shared(uri.clone())
        .map_err(|e| AuthError::Transport(format!("invalid target '{}': {e}", options.target)))?
        .connect_timeout(options.connect_timeout);

    if let Some(timeout) = options.request_timeout {
        endpoint = endpoint.timeout(timeout);
    }

    if use_tls {
        let mut tls = match &options.ca_certificate_pem {
            Some(pem) => ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem)),
            None => ClientTlsConfig::new().with_webpki_roots(),
        };
        if let Some(domain_name) = &options.domain_name {
            tls = tls.domain_name(domain_name.clone());
        }
        endpoint = endpoint
            .tls_config(tls)
            .map_err(|e| AuthError::Transport(format!("TLS configuration failed: {e}")))?;
    }

    tracing::debug!(
        target: "esp_auth.channel",
        target_uri = %uri,
        tls = use_tls,
        credentials = interceptor.has_credentials(),
        "Channel endpoint configured"
    );
    Ok(endpoint)
}

/// Add a scheme to a bare `host:port` and reject plaintext when TLS is
/// required.
fn resolve_uri(target: &str, require_tls: bool) -> Result<String, AuthError> {
    if target.trim().is_empty() {
        return Err(AuthError::Transport("target must not be empty".to_string()));
    }

    if target.starts_with("https://") {
        return Ok(target.to_string());
    }

    if target.starts_with("http://") {
        if require_tls {
            return Err(AuthError::Transport(
                "plaintext target not allowed: channel requires TLS".to_string(),
            ));
        }
        return Ok(target.to_string());
    }

    let scheme = if require_tls { "https" } else { "http" };
    Ok(format!("{scheme}://{target}"))
}
