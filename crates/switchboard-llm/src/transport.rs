//! HTTP transport between providers and upstream APIs
//!
//! Providers only describe requests; a [`Transport`] sends them. The client
//! holds one per provider so tests can script upstream behavior without a
//! network.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use http::StatusCode;
use http::header::{ACCEPT, HeaderValue};
use serde_json::Value;
use switchboard_config::ProviderConfig;

use crate::error::LlmError;
use crate::provider::HttpRequest;

/// Raw SSE `data` payloads, in arrival order
pub type RawEventStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Delay before the first retry; later retries wait proportionally longer
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Sends prepared provider requests
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and decode the JSON response body
    async fn send(&self, request: HttpRequest) -> Result<Value, LlmError>;

    /// Send a request and yield the `data` field of each SSE event
    async fn stream(&self, request: HttpRequest) -> Result<RawEventStream, LlmError>;
}

/// `reqwest`-backed transport with bounded retries on transient failures
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Option<Duration>,
    max_retries: u32,
}

impl ReqwestTransport {
    /// Create a transport
    ///
    /// `timeout` bounds each non-streaming call; streams are bounded only by
    /// the connect timeout.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Internal` if the HTTP client cannot be built
    pub fn new(timeout: Option<Duration>, max_retries: u32) -> Result<Self, LlmError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.connect_timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| LlmError::Internal(anyhow::anyhow!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout,
            max_retries,
        })
    }

    /// Create a transport using a provider's timeout and retry settings
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Internal` if the HTTP client cannot be built
    pub fn from_config(config: &ProviderConfig) -> Result<Self, LlmError> {
        Self::new(config.timeout, config.max_retries)
    }

    /// POST the request, retrying connection failures, 429, and 5xx
    async fn execute(&self, request: &HttpRequest) -> Result<reqwest::Response, LlmError> {
        let mut attempt: u32 = 0;

        loop {
            let mut builder = self
                .client
                .post(request.url.clone())
                .headers(request.headers.clone())
                .json(&request.body);

            if request.stream {
                builder = builder.header(ACCEPT, HeaderValue::from_static("text/event-stream"));
            } else if let Some(timeout) = self.timeout {
                builder = builder.timeout(timeout);
            }

            let outcome = builder.send().await;

            let transient = match &outcome {
                Ok(response) => {
                    response.status().is_server_error() || response.status() == StatusCode::TOO_MANY_REQUESTS
                }
                Err(e) => e.is_connect() || e.is_timeout(),
            };

            if transient && attempt < self.max_retries {
                attempt += 1;
                tracing::warn!(
                    url = %request.url,
                    attempt,
                    max_retries = self.max_retries,
                    "transient upstream failure, retrying"
                );
                tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
                continue;
            }

            let response = outcome.map_err(|e| {
                tracing::error!(url = %request.url, error = %e, "upstream request failed");
                LlmError::Upstream(e.to_string())
            })?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(url = %request.url, status = %status, "upstream returned error");
                return Err(LlmError::Upstream(format!("provider returned {status}: {body}")));
            }

            return Ok(response);
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<Value, LlmError> {
        let response = self.execute(&request).await?;

        response
            .json()
            .await
            .map_err(|e| LlmError::Upstream(format!("failed to parse response: {e}")))
    }

    async fn stream(&self, request: HttpRequest) -> Result<RawEventStream, LlmError> {
        let response = self.execute(&request).await?;

        let events = response.bytes_stream().eventsource().map(|result| match result {
            Ok(event) => Ok(event.data),
            Err(e) => Err(LlmError::Streaming(e.to_string())),
        });

        Ok(Box::pin(events))
    }
}
