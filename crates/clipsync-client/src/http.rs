//! reqwest client construction and response checking

use std::time::Duration;

use clipsync_core::config::ServerConfig;

use crate::error::{TransportError, TransportResult};

/// Connection settings derived from `[server]`.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub base_url: String,
    /// Applied to clipboard requests only; file transfers can take arbitrarily long.
    pub request_timeout: Option<Duration>,
}

/// Build the HTTP client for a companion server.
///
/// Fails when no host is configured, or when `enforce_tls` is set and the
/// server uses plain http.
pub fn build_http_client(server: &ServerConfig) -> TransportResult<(reqwest::Client, Endpoint)> {
    let base_url = server.base_url()?;
    let request_timeout = (server.timeout_secs > 0).then(|| Duration::from_secs(server.timeout_secs));

    let mut builder = reqwest::Client::builder().user_agent(concat!(
        "clipsync/",
        env!("CARGO_PKG_VERSION")
    ));
    if let Some(timeout) = request_timeout {
        builder = builder.connect_timeout(timeout);
    }
    let client = builder.build()?;

    tracing::debug!(%base_url, ?request_timeout, "http client ready");
    Ok((
        client,
        Endpoint {
            base_url,
            request_timeout,
        },
    ))
}

/// Pass 2xx responses through; turn anything else into `TransportError::Status`.
pub async fn check_response(resp: reqwest::Response) -> TransportResult<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    tracing::debug!(%status, "companion server rejected request");
    Err(TransportError::Status {
        status,
        body: body.trim().to_string(),
    })
}
