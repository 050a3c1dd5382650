//! The network seam: fetching one task's document.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::trace;

use crate::error::{CrawlError, TransportError};
use crate::request::FetchTask;

/// Performs the actual network call for a task.
///
/// Implementations report every fault as a [`TransportError`]; a transport
/// never aborts the crawl.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn fetch(&self, task: &FetchTask) -> Result<Bytes, TransportError>;
}

/// HTTP transport backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CrawlError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, task: &FetchTask) -> Result<Bytes, TransportError> {
        let mut request = self.client.get(task.url.clone());
        for (name, value) in &task.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        trace!("Response from {}: {}", task.url, status);
        if !status.is_success() {
            return Err(TransportError::status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("unexpected status"),
            ));
        }

        response.bytes().await.map_err(transport_error)
    }
}

fn transport_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::timeout(err.to_string())
    } else if let Some(status) = err.status() {
        TransportError::status(status.as_u16(), err.to_string())
    } else {
        TransportError::connection(err.to_string())
    }
}
