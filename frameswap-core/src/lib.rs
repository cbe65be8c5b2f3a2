//! # frameswap-core
//!
//! Frame-exchange library: sends a locally produced scalar field to a
//! remote HTTP compute service and displays the image it returns.
//!
//! This crate contains:
//! - **Types**: `ScalarFrame`, `ChannelLayout`, `SourceFrame`, `ImageBuffer`
//! - **Codec**: `FrameCodec` for JSON / raw little-endian `f32` request bodies
//!   and base64 PNG/JPEG reply decoding
//! - **Transport**: `Transport` trait and `HttpTransport` on top of `reqwest`
//! - **Compositor**: `FrameCompositor` owning the lazily allocated `OutputTarget`
//! - **Controller**: `ExchangeController`, the single-in-flight tick loop
//! - **State**: `ExchangePhase` with validated transitions
//! - **Error**: `ExchangeError` / `TransportError`, `thiserror`-based

pub mod error;
pub mod exchange;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use error::{ExchangeError, TransportError};
pub use exchange::{
    Capture, ChannelLayout, Completion, EndpointConfig, ExchangeController, ExchangeSettings,
    ExchangeStats, FrameCodec, FrameCompositor, FrameSource, HttpTransport, ImageBuffer,
    OutputSink, OutputTarget, ScalarFrame, SourceFrame, TickReport, Transport, WireEncoding,
};
pub use state::ExchangePhase;
