//! Rate-limited cloud request client
//!
//! Every request goes through the shared [`Pacer`] and carries the auth key.
//! A non-200 answer is reissued up to `max_retries` more times, each attempt
//! paced like any other request. Connection-level failures and undecodable
//! bodies are not retried here; the next poll cycle is the retry.

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::pacer::Pacer;
use crate::transport::{Transport, TransportError};

/// Extra attempts after the first non-200 response
pub const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("HTTP {status} {reason}: {body}")]
    Status {
        status: u16,
        reason: String,
        body: String,
    },
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("response has no {0}")]
    MissingData(&'static str),
}

/// Authenticated, paced client for the cloud API
pub struct CloudClient {
    transport: Arc<dyn Transport>,
    pacer: Arc<Pacer>,
    auth_key: String,
    max_retries: u32,
}

impl CloudClient {
    pub fn new(transport: Arc<dyn Transport>, pacer: Arc<Pacer>, auth_key: impl Into<String>) -> Self {
        Self {
            transport,
            pacer,
            auth_key: auth_key.into(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Override the number of extra attempts on non-200 responses
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn pacer(&self) -> &Arc<Pacer> {
        &self.pacer
    }

    /// POST `params` to `path` and decode the JSON body
    pub async fn try_post(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, ClientError> {
        let mut form: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        form.push(("auth_key".to_string(), self.auth_key.clone()));

        let mut attempt = 0;
        loop {
            self.pacer.wait().await;
            debug!(path = %path, attempt = attempt, "POST to cloud");

            let response = self.transport.post_form(path, &form).await?;
            if response.is_ok() {
                return Ok(serde_json::from_str(&response.body)?);
            }

            if attempt >= self.max_retries {
                return Err(ClientError::Status {
                    status: response.status,
                    reason: response.reason,
                    body: response.body,
                });
            }

            debug!(
                path = %path,
                attempt = attempt,
                status = response.status,
                "Cloud returned non-success status, retrying"
            );
            attempt += 1;
        }
    }

    /// Like [`try_post`](Self::try_post), but failures are logged and yield `None`
    pub async fn post(&self, path: &str, params: &[(&str, &str)]) -> Option<Value> {
        match self.try_post(path, params).await {
            Ok(body) => Some(body),
            Err(ClientError::Status {
                status,
                reason,
                body,
            }) => {
                warn!(
                    path = %path,
                    status = status,
                    reason = %reason,
                    body = %body,
                    "Error receiving JSON from cloud"
                );
                None
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Error connecting to cloud");
                None
            }
        }
    }
}
