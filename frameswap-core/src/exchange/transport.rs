//! HTTP transport for frame submissions.
//!
//! One [`ExchangeRequest`] is POSTed per exchange. The caller (the
//! controller) is solely responsible for never having two submissions in
//! flight; the transport itself does not queue or retry.
//!
//! ## Request
//!
//! ```text
//! POST http://{host}:{port}/{path}[?width=W&height=H]
//! Content-Type: application/json | application/octet-stream
//!
//! <WirePayload body>
//! ```
//!
//! The query is only appended for binary payloads, which carry no
//! self-description.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;

use crate::error::{ExchangeError, TransportError};
use crate::exchange::codec::WirePayload;

// ── ExchangeRequest ──────────────────────────────────────────────

/// Everything needed to submit one frame.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    /// Target URL including any query parameters.
    pub url: Url,
    pub content_type: &'static str,
    pub payload: WirePayload,
}

impl ExchangeRequest {
    /// Build a request against a resolved endpoint URL.
    pub fn new(endpoint: &str, payload: WirePayload) -> Result<Self, ExchangeError> {
        let mut url = Url::parse(endpoint)
            .map_err(|e| ExchangeError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        if let Some(pairs) = payload.query_pairs() {
            let mut query = url.query_pairs_mut();
            for (key, value) in &pairs {
                query.append_pair(key, value);
            }
        }

        Ok(Self {
            url,
            content_type: payload.encoding.content_type(),
            payload,
        })
    }
}

// ── TransportReply ───────────────────────────────────────────────

/// A 2xx response body and its declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReply {
    pub content_type: Option<String>,
    pub body: Bytes,
}

// ── Transport ────────────────────────────────────────────────────

/// Submits a request and resolves with the response body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(&self, request: ExchangeRequest) -> Result<TransportReply, TransportError>;
}

// ── HttpTransport ────────────────────────────────────────────────

/// [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport without a request deadline.
    ///
    /// A hung request keeps the pipeline waiting until the peer closes the
    /// connection; use [`with_timeout`](Self::with_timeout) to bound it.
    pub fn new() -> Result<Self, TransportError> {
        Self::build(None)
    }

    /// Create a transport whose requests fail with
    /// [`TransportError::Connection`] after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        Self::build(Some(timeout))
    }

    fn build(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Connection(format!("http client init: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, request: ExchangeRequest) -> Result<TransportReply, TransportError> {
        let response = self
            .client
            .post(request.url)
            .header(CONTENT_TYPE, request.content_type)
            .body(request.payload.body)
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Protocol {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await?;

        Ok(TransportReply { content_type, body })
    }
}

// ── Tests ────────────────────────────────────────────────────────
