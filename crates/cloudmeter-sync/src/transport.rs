//! HTTP transport for the cloud API
//!
//! The client only needs "POST a form to a path, give me status and body",
//! so that is all [`Transport`] exposes. [`ReqwestTransport`] is the real
//! implementation; tests substitute a scripted one.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONNECTION};
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Request timeout used when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection-level failure; no HTTP response was received
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timed out")]
    Timeout,
}

/// Status line and body of an HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            reason: String::new(),
            body: body.into(),
        }
    }

    /// Only a plain 200 counts as success
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `form` url-encoded to `path` (relative, without leading slash)
    async fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<HttpResponse, TransportError>;
}

/// HTTPS transport built on reqwest
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Create a transport for `server` with the given request timeout
    pub fn new(server: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: format!("https://{}", Self::normalize_server(server)),
        })
    }

    /// Strip the decorations the cloud UI shows around the server name
    ///
    /// "Server: https://shelly-13-eu.shelly.cloud" -> "shelly-13-eu.shelly.cloud"
    pub fn normalize_server(server: &str) -> String {
        server
            .replace("https://", "")
            .replace("Server: ", "")
            .trim()
            .trim_end_matches('/')
            .to_string()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for a relative API path
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<HttpResponse, TransportError> {
        let url = self.url_for(path);
        trace!(url = %url, fields = form.len(), "Sending form POST");

        let response = self
            .client
            .post(&url)
            .header(CONNECTION, HeaderValue::from_static("close"))
            .form(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or_default().to_string();
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(HttpResponse {
            status: status.as_u16(),
            reason,
            body,
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(e.to_string())
    }
}
