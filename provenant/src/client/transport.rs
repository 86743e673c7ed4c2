//! Transport seam between the resilient client and the network.
//!
//! Failure classification happens exactly once, here and in the client's
//! status handling. Everything above works with [`RemoteErrorKind`] values.

use crate::errors::RemoteErrorKind;
use async_trait::async_trait;
use std::time::Duration;

/// One outbound request against a logical endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRequest {
    /// Logical endpoint name, resolved to a URL by the transport.
    pub endpoint: String,
    /// Query parameters.
    pub params: Vec<(String, String)>,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// A response that reached us, success or not.
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed JSON body; `Null` when the body was absent or not JSON.
    pub body: serde_json::Value,
    /// Server-specified wait from a `Retry-After` header.
    pub retry_after: Option<Duration>,
}

impl RemoteResponse {
    /// Returns true for 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes requests against a remote registry.
///
/// Implementations return `Err` only for failures that never produced a
/// response (timeout, connect). Status-code failures come back as a
/// [`RemoteResponse`] so the client can classify them alongside the
/// `Retry-After` hint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes one request.
    async fn execute(&self, request: RemoteRequest) -> Result<RemoteResponse, RemoteErrorKind>;
}

/// Reqwest-backed transport resolving logical endpoints to base URLs.
#[cfg(feature = "http")]
pub struct HttpTransport {
    client: reqwest::Client,
    base_urls: std::collections::HashMap<String, String>,
}

#[cfg(feature = "http")]
impl HttpTransport {
    /// Creates a transport with a default reqwest client.
    pub fn new(
        base_urls: std::collections::HashMap<String, String>,
    ) -> Result<Self, crate::errors::ConfigError> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            crate::errors::ConfigError::Invalid {
                field: "http_client".to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self::with_client(client, base_urls))
    }

    /// Creates a transport around an existing reqwest client.
    #[must_use]
    pub fn with_client(
        client: reqwest::Client,
        base_urls: std::collections::HashMap<String, String>,
    ) -> Self {
        Self { client, base_urls }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: RemoteRequest) -> Result<RemoteResponse, RemoteErrorKind> {
        let base = self.base_urls.get(&request.endpoint).ok_or_else(|| {
            RemoteErrorKind::Transport(format!(
                "no base url configured for endpoint '{}'",
                request.endpoint
            ))
        })?;

        let response = self
            .client
            .get(base)
            .query(&request.params)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RemoteErrorKind::Timeout
                } else {
                    RemoteErrorKind::Transport(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .json::<serde_json::Value>()
            .await
            .unwrap_or(serde_json::Value::Null);

        Ok(RemoteResponse {
            status,
            body,
            retry_after,
        })
    }
}
