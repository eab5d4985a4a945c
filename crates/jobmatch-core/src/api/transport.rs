//! The network seam underneath `ApiClient`.
//!
//! `Transport` sends an already-built (and already-intercepted) request and
//! hands back the status and body. `HttpTransport` is the production
//! implementation on top of a pooled `reqwest::Client`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Request, StatusCode};

use super::ApiError;

/// Status and body of a completed exchange, before any interpretation.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request. Failing to reach the API is an `Err`; every status
    /// the API answers with, including error statuses, is an `Ok`.
    async fn execute(&self, request: Request) -> Result<RawResponse, ApiError>;
}

/// Transport backed by reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// `timeout` of `None` imposes no client-side limit.
    pub fn new(timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self { client })
    }

    /// Underlying client, used to build requests that share its defaults.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: Request) -> Result<RawResponse, ApiError> {
        let response = self.client.execute(request).await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }
}
