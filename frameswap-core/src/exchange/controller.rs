//! Exchange controller.
//!
//! Drives the pipeline one [`tick`](ExchangeController::tick) at a time:
//!
//! 1. If the outstanding request's reply has landed, decode it, composite
//!    it into the [`OutputTarget`] and publish it (or log and drop it).
//! 2. If the pipeline is running and nothing is outstanding, capture the
//!    current source frame, encode it and spawn its submission.
//!
//! The submission runs as a Tokio task and hands its result back through a
//! `oneshot` channel. The result is only consumed inside `tick`, so the
//! controller is the single mutator of the output target and its own state.
//! At most one request exists at any time, including one abandoned by
//! [`stop`](ExchangeController::stop) that has not come back yet.
//!
//! No deadline is applied here. A hung request keeps the controller in
//! `AwaitingReply` until the transport gives up; bound it with
//! [`HttpTransport::with_timeout`](crate::exchange::transport::HttpTransport::with_timeout).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{ExchangeError, TransportError};
use crate::exchange::codec::{FrameCodec, WireEncoding};
use crate::exchange::compositor::{FrameCompositor, OutputTarget};
use crate::exchange::endpoint::EndpointConfig;
use crate::exchange::host::{FrameSource, OutputSink};
use crate::exchange::throughput::{ExchangeStats, ThroughputEstimator};
use crate::exchange::transport::{ExchangeRequest, Transport, TransportReply};
use crate::exchange::types::ChannelLayout;
use crate::state::ExchangePhase;

type SubmitResult = Result<TransportReply, TransportError>;

// ── ExchangeSettings ─────────────────────────────────────────────

/// Controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    /// Request body encoding.
    pub encoding: WireEncoding,
    /// The only source layout accepted for capture.
    pub expected_layout: ChannelLayout,
    /// Name the output target is published under.
    pub output_name: String,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            encoding: WireEncoding::Json,
            expected_layout: ChannelLayout::R16Float,
            output_name: "server_surface".into(),
        }
    }
}

// ── TickReport ───────────────────────────────────────────────────

/// What happened to the outstanding exchange during a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The reply was composited and published.
    Applied { sequence: u64, width: u32, height: u32 },
    /// Transport or decode failure; the frame was dropped.
    Dropped { sequence: u64, error: ExchangeError },
    /// The reply belonged to a stopped pipeline and was thrown away.
    Discarded { sequence: u64 },
}

/// What the capture half of a tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum Capture {
    /// A request was spawned.
    Submitted { sequence: u64, bytes: usize },
    /// The source had no frame to offer.
    NoFrame,
    /// The source frame was rejected (layout mismatch).
    Skipped(ExchangeError),
}

/// Per-tick summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub completion: Option<Completion>,
    pub capture: Option<Capture>,
}

impl TickReport {
    /// `true` if the tick neither consumed a reply nor attempted a capture.
    pub fn is_quiet(&self) -> bool {
        self.completion.is_none() && self.capture.is_none()
    }
}

// ── PendingExchange ──────────────────────────────────────────────

/// The single outstanding submission.
struct PendingExchange {
    sequence: u64,
    rx: oneshot::Receiver<SubmitResult>,
    /// Result pulled off `rx` but not yet consumed by a tick.
    result: Option<SubmitResult>,
    handle: JoinHandle<()>,
    /// Set by `stop`; the reply is drained and dropped.
    discarded: bool,
}

impl PendingExchange {
    fn spawn(transport: Arc<dyn Transport>, request: ExchangeRequest, sequence: u64) -> Self {
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let result = transport.submit(request).await;
            let _ = tx.send(result);
        });
        Self {
            sequence,
            rx,
            result: None,
            handle,
            discarded: false,
        }
    }

    /// Pull the result if it has arrived. Returns `true` once available.
    fn poll(&mut self) -> bool {
        if self.result.is_none() {
            match self.rx.try_recv() {
                Ok(result) => self.result = Some(result),
                Err(oneshot::error::TryRecvError::Empty) => {}
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.result = Some(Err(task_lost()));
                }
            }
        }
        self.result.is_some()
    }
}

impl Drop for PendingExchange {
    fn drop(&mut self) {
        // Releases the connection if the request is still running.
        self.handle.abort();
    }
}

fn task_lost() -> TransportError {
    TransportError::Connection("submission task ended without a reply".into())
}

// ── ExchangeController ───────────────────────────────────────────

/// Single-in-flight frame exchange state machine.
pub struct ExchangeController {
    settings: ExchangeSettings,
    codec: FrameCodec,
    transport: Arc<dyn Transport>,
    compositor: FrameCompositor,
    phase: ExchangePhase,
    running: bool,
    /// Resolved URL used for submissions.
    endpoint: Option<String>,
    /// Resolved URL to switch to at the next capture.
    next_endpoint: Option<String>,
    pending: Option<PendingExchange>,
    next_sequence: u64,
    throughput: ThroughputEstimator,
    stats: ExchangeStats,
    stats_tx: watch::Sender<ExchangeStats>,
    stats_rx: watch::Receiver<ExchangeStats>,
}

impl ExchangeController {
    /// Create a stopped controller with a heap-backed output target.
    pub fn new(transport: Arc<dyn Transport>, settings: ExchangeSettings) -> Self {
        Self::with_compositor(transport, FrameCompositor::new(), settings)
    }

    /// Create a stopped controller compositing through `compositor`.
    pub fn with_compositor(
        transport: Arc<dyn Transport>,
        compositor: FrameCompositor,
        settings: ExchangeSettings,
    ) -> Self {
        let (stats_tx, stats_rx) = watch::channel(ExchangeStats::default());
        Self {
            codec: FrameCodec::new(settings.encoding),
            settings,
            transport,
            compositor,
            phase: ExchangePhase::default(),
            running: false,
            endpoint: None,
            next_endpoint: None,
            pending: None,
            next_sequence: 0,
            throughput: ThroughputEstimator::new(),
            stats: ExchangeStats::default(),
            stats_tx,
            stats_rx,
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn settings(&self) -> &ExchangeSettings {
        &self.settings
    }

    pub fn phase(&self) -> &ExchangePhase {
        &self.phase
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The resolved URL submissions currently go to.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn target(&self) -> &OutputTarget {
        self.compositor.target()
    }

    pub fn stats(&self) -> &ExchangeStats {
        &self.stats
    }

    /// Obtain a `watch::Receiver` for exchange statistics.
    pub fn stats_receiver(&self) -> watch::Receiver<ExchangeStats> {
        self.stats_rx.clone()
    }

    /// Whether a request is in flight, including one abandoned by `stop`.
    pub fn has_outstanding(&self) -> bool {
        self.pending.is_some()
    }

    /// The next tick will capture and submit.
    pub fn ready_for_new_frame(&self) -> bool {
        self.running
            && self.phase.is_idle()
            && self.pending.is_none()
            && (self.endpoint.is_some() || self.next_endpoint.is_some())
    }

    /// A reply has arrived and will be applied on the next tick.
    pub fn frame_received(&self) -> bool {
        matches!(self.phase, ExchangePhase::Applying { .. })
            || self
                .pending
                .as_ref()
                .is_some_and(|p| !p.discarded && p.result.is_some())
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Resolve `endpoint` and start exchanging frames.
    ///
    /// Fails and stays stopped if the endpoint does not resolve
    /// ([`ExchangeError::InvalidEndpoint`]) or the expected layout is not a
    /// single-channel one ([`ExchangeError::UnsupportedLayout`]).
    pub fn start(&mut self, endpoint: &EndpointConfig) -> Result<(), ExchangeError> {
        if !self.settings.expected_layout.is_scalar() {
            let e = ExchangeError::UnsupportedLayout(self.settings.expected_layout);
            error!(error = %e, "cannot start exchange");
            return Err(e);
        }
        let url = endpoint.resolve().inspect_err(|e| {
            error!(error = %e, "cannot start exchange");
        })?;
        info!(%url, encoding = %self.settings.encoding, "exchange started");
        self.endpoint = Some(url);
        self.next_endpoint = None;
        self.running = true;
        Ok(())
    }

    /// Resolve a new endpoint and switch to it at the next capture.
    ///
    /// An outstanding request keeps its original URL.
    pub fn set_endpoint(&mut self, endpoint: &EndpointConfig) -> Result<(), ExchangeError> {
        let url = endpoint.resolve().inspect_err(|e| {
            warn!(error = %e, "endpoint change rejected");
        })?;
        self.next_endpoint = Some(url);
        Ok(())
    }

    /// Stop the pipeline and release the output target.
    ///
    /// An outstanding request is left to finish; its reply is dropped when
    /// it arrives. No new request is issued until it has.
    pub fn stop(&mut self, sink: &mut dyn OutputSink) {
        let was_running = self.running;
        self.running = false;
        self.phase.force_idle();
        if let Some(pending) = self.pending.as_mut() {
            pending.discarded = true;
        }
        if self.compositor.target().is_allocated() {
            self.compositor.release();
            sink.clear_output(&self.settings.output_name);
        }
        if was_running {
            info!(outstanding = self.pending.is_some(), "exchange stopped");
        }
        self.publish_stats();
    }

    /// Wait until the outstanding reply has arrived, without consuming it.
    ///
    /// Never completes when nothing is outstanding, so it can sit in a
    /// `tokio::select!` beside a tick interval. Cancel-safe.
    pub async fn reply_ready(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            return std::future::pending().await;
        };
        if pending.result.is_none() {
            let result = (&mut pending.rx).await.unwrap_or_else(|_| Err(task_lost()));
            pending.result = Some(result);
        }
    }

    // ── Tick ─────────────────────────────────────────────────────

    /// Advance the pipeline by one step.
    ///
    /// Per-exchange failures are reported in the returned [`TickReport`].
    /// Only escalated errors ([`ExchangeError::is_escalated`]) are returned
    /// as `Err`, after stopping the pipeline.
    ///
    /// # Panics
    ///
    /// Submitting spawns a Tokio task, so this must be called from within a
    /// Tokio runtime.
    pub fn tick(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn OutputSink,
    ) -> Result<TickReport, ExchangeError> {
        let mut report = TickReport {
            completion: self.poll_completion(sink)?,
            capture: None,
        };

        if self.ready_for_new_frame() {
            report.capture = Some(self.capture_and_submit(source, sink)?);
        }

        if !report.is_quiet() {
            self.publish_stats();
        }
        Ok(report)
    }

    fn poll_completion(
        &mut self,
        sink: &mut dyn OutputSink,
    ) -> Result<Option<Completion>, ExchangeError> {
        let arrived = self.pending.as_mut().is_some_and(PendingExchange::poll);
        if !arrived {
            return Ok(None);
        }
        let Some(mut pending) = self.pending.take() else {
            return Ok(None);
        };
        let Some(result) = pending.result.take() else {
            return Ok(None);
        };
        let sequence = pending.sequence;

        if pending.discarded || !self.running {
            let decoded = result.map_err(ExchangeError::from).and_then(|reply| {
                FrameCodec::decode_reply(&reply.body, reply.content_type.as_deref())
            });
            debug!(sequence, ok = decoded.is_ok(), "discarding reply of stopped exchange");
            self.stats.discarded += 1;
            return Ok(Some(Completion::Discarded { sequence }));
        }

        if let Some(rtt) = self.phase.waiting_duration() {
            self.throughput.record_round_trip(rtt);
        }
        self.phase.reply_received(sequence)?;

        let decoded = result.map_err(ExchangeError::from).and_then(|reply| {
            FrameCodec::decode_reply(&reply.body, reply.content_type.as_deref())
        });
        let applied = decoded.and_then(|image| {
            let dimensions = (image.width, image.height);
            let target = self.compositor.apply(image)?;
            sink.set_output(&self.settings.output_name, target);
            Ok(dimensions)
        });

        match applied {
            Ok((width, height)) => {
                self.phase.applied()?;
                self.stats.applied += 1;
                debug!(sequence, width, height, "frame applied");
                Ok(Some(Completion::Applied {
                    sequence,
                    width,
                    height,
                }))
            }
            Err(error) => {
                warn!(sequence, %error, "dropping frame");
                self.phase.abandon()?;
                self.stats.dropped += 1;
                Ok(Some(Completion::Dropped { sequence, error }))
            }
        }
    }

    fn capture_and_submit(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn OutputSink,
    ) -> Result<Capture, ExchangeError> {
        if let Some(url) = self.next_endpoint.take() {
            info!(%url, "endpoint updated");
            self.endpoint = Some(url);
        }
        let Some(endpoint) = self.endpoint.clone() else {
            return Ok(Capture::NoFrame);
        };

        self.phase.begin_capture()?;

        let Some(captured) = source.current_source_frame() else {
            self.phase.abandon()?;
            return Ok(Capture::NoFrame);
        };

        if captured.layout != self.settings.expected_layout {
            let error = ExchangeError::FormatMismatch {
                expected: self.settings.expected_layout,
                actual: captured.layout,
            };
            warn!(%error, "skipping capture");
            self.phase.abandon()?;
            self.stats.skipped += 1;
            return Ok(Capture::Skipped(error));
        }

        let request = match self
            .codec
            .encode(&captured.frame)
            .and_then(|payload| ExchangeRequest::new(&endpoint, payload))
        {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "cannot build exchange request; stopping");
                self.stop(sink);
                return Err(e);
            }
        };

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let bytes = request.payload.len();

        self.pending = Some(PendingExchange::spawn(
            Arc::clone(&self.transport),
            request,
            sequence,
        ));
        self.phase.submitted(sequence)?;

        self.stats.submitted += 1;
        self.stats.bytes_sent += bytes as u64;
        self.throughput.record_submit(bytes as u64);
        debug!(sequence, bytes, encoding = %self.settings.encoding, "frame submitted");

        Ok(Capture::Submitted { sequence, bytes })
    }

    fn publish_stats(&mut self) {
        self.stats.throughput_bps = self.throughput.bytes_per_second();
        self.stats.smoothed_rtt = self.throughput.smoothed_rtt();
        let _ = self.stats_tx.send(self.stats.clone());
    }
}

// ── Tests ────────────────────────────────────────────────────────
