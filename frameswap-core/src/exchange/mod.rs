//! # Frame exchange pipeline
//!
//! Ships a scalar field to a remote compute service over HTTP and
//! composites the image it sends back into a shared output target.
//!
//! ## Architecture
//!
//! ```text
//!  FrameSource                                  remote service
//!      │ current_source_frame()                       ▲
//!      ▼                                              │ POST
//!  FrameCodec::encode ──► ExchangeRequest ──► Transport::submit
//!                                                     │
//!  OutputSink ◄── FrameCompositor ◄── decode_reply ◄──┘ {"image": base64}
//! ```
//!
//! [`ExchangeController`] sequences the stages and never lets more than one
//! request be outstanding.
//!
//! ## Sub-modules
//!
//! | Module       | Purpose                                               |
//! |--------------|-------------------------------------------------------|
//! | `types`      | Scalar frames, channel layouts, decoded RGBA images   |
//! | `codec`      | JSON / binary request encoding, reply decoding        |
//! | `endpoint`   | Host/port/path normalisation into a URL               |
//! | `transport`  | `Transport` trait and the reqwest-backed HTTP client  |
//! | `compositor` | Lazily (re)allocated output target                    |
//! | `host`       | Frame source and output sink interfaces               |
//! | `throughput` | Rolling throughput / RTT statistics                   |
//! | `controller` | Single-in-flight exchange state machine               |

pub mod codec;
pub mod compositor;
pub mod controller;
pub mod endpoint;
pub mod host;
pub mod throughput;
pub mod transport;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────

pub use codec::{FrameCodec, WireEncoding, WirePayload};
pub use compositor::{FrameCompositor, HeapAllocator, OutputTarget, Surface, SurfaceAllocator};
pub use controller::{Capture, Completion, ExchangeController, ExchangeSettings, TickReport};
pub use endpoint::{EndpointConfig, resolve};
pub use host::{FrameSource, OutputSink};
pub use throughput::{ExchangeStats, ThroughputEstimator};
pub use transport::{ExchangeRequest, HttpTransport, Transport, TransportReply};
pub use types::{ChannelLayout, ImageBuffer, ScalarFrame, SourceFrame};
