//! Domain-specific error types for the frame-exchange pipeline.
//!
//! All fallible operations return `Result<T, ExchangeError>`.
//! Invalid input never panics; every error is typed and recoverable.

use thiserror::Error;

use crate::exchange::types::ChannelLayout;

/// The canonical error type for the frame-exchange pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    // ── Frame Errors ─────────────────────────────────────────────
    /// A scalar frame's buffer length disagrees with its dimensions.
    #[error("invalid frame {width}x{height}: expected {expected} texels, got {actual}")]
    InvalidFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// The captured frame is not in the expected single-channel layout.
    #[error("channel layout mismatch: expected {expected}, got {actual}")]
    FormatMismatch {
        expected: ChannelLayout,
        actual: ChannelLayout,
    },

    // ── Configuration Errors ─────────────────────────────────────
    /// The configured source layout does not carry one scalar per texel.
    #[error("expected layout {0} is not single-channel")]
    UnsupportedLayout(ChannelLayout),

    /// Host/port/path could not be turned into a usable URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    // ── Transport Errors ─────────────────────────────────────────
    /// No response could be obtained from the remote service.
    #[error("connection error: {0}")]
    Connection(String),

    /// The remote service answered with a non-2xx status.
    #[error("protocol error: HTTP {status}")]
    Protocol { status: u16 },

    // ── Reply Errors ─────────────────────────────────────────────
    /// The reply did not conform to the `{"image": "<base64>"}` contract.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    // ── Internal Errors ──────────────────────────────────────────
    /// The exchange state machine was driven through an illegal edge.
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),
}

impl ExchangeError {
    /// Errors that stop the pipeline and are surfaced to the caller.
    ///
    /// Everything else is contained within a single tick: logged, counted,
    /// and the frame dropped.
    pub fn is_escalated(&self) -> bool {
        matches!(
            self,
            ExchangeError::InvalidFrame { .. }
                | ExchangeError::InvalidEndpoint(_)
                | ExchangeError::UnsupportedLayout(_)
        )
    }
}

// ── TransportError ────────────────────────────────────────────────

/// Failure of a single HTTP submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The host was unreachable, the connection dropped, or the body
    /// could not be read.
    #[error("connection error: {0}")]
    Connection(String),

    /// Non-2xx status code.
    #[error("protocol error: HTTP {status}")]
    Protocol { status: u16 },
}

// ── Convenient From implementations ──────────────────────────────

impl From<TransportError> for ExchangeError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Connection(msg) => ExchangeError::Connection(msg),
            TransportError::Protocol { status } => ExchangeError::Protocol { status },
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => TransportError::Protocol {
                status: status.as_u16(),
            },
            None => TransportError::Connection(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(e: serde_json::Error) -> Self {
        ExchangeError::MalformedResponse(e.to_string())
    }
}

impl From<base64::DecodeError> for ExchangeError {
    fn from(e: base64::DecodeError) -> Self {
        ExchangeError::MalformedResponse(format!("invalid base64: {e}"))
    }
}

impl From<image::ImageError> for ExchangeError {
    fn from(e: image::ImageError) -> Self {
        ExchangeError::MalformedResponse(format!("undecodable image: {e}"))
    }
}
