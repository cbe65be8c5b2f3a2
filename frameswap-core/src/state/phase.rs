//! Exchange phase state machine.
//!
//! Provides an `ExchangePhase` enum that models one capture → submit →
//! reply → apply cycle, with validated transitions that return `Result`
//! instead of panicking.

use std::time::{Duration, Instant};

use crate::error::ExchangeError;

// ── ExchangePhase ────────────────────────────────────────────────

/// The current phase of the exchange pipeline.
///
/// ```text
///   Idle ──► Capturing ──► AwaitingReply ──► Applying
///    ▲           │                │              │
///    └───────────┴────────────────┴──────────────┘
///        (mismatch)       (drop / stop)     (applied)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExchangePhase {
    /// No capture or request in progress.
    #[default]
    Idle,

    /// Pulling and encoding the current source frame.
    Capturing,

    /// A request has been submitted and its reply is pending.
    AwaitingReply {
        /// Sequence number of the outstanding exchange.
        sequence: u64,
        /// When the request was submitted.
        since: Instant,
    },

    /// A reply has arrived and is being decoded and composited.
    Applying {
        /// Sequence number of the exchange being applied.
        sequence: u64,
    },
}

impl std::fmt::Display for ExchangePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Capturing => write!(f, "Capturing"),
            Self::AwaitingReply { .. } => write!(f, "AwaitingReply"),
            Self::Applying { .. } => write!(f, "Applying"),
        }
    }
}

impl ExchangePhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_awaiting_reply(&self) -> bool {
        matches!(self, Self::AwaitingReply { .. })
    }

    /// How long the outstanding request has been in flight.
    ///
    /// Returns `None` for any other phase.
    pub fn waiting_duration(&self) -> Option<Duration> {
        match self {
            Self::AwaitingReply { since, .. } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Capturing`.
    ///
    /// Valid from: `Idle`.
    pub fn begin_capture(&mut self) -> Result<(), ExchangeError> {
        match self {
            Self::Idle => {
                *self = Self::Capturing;
                Ok(())
            }
            _ => Err(ExchangeError::InvalidTransition(
                "cannot capture: not in Idle state",
            )),
        }
    }

    /// Transition to `AwaitingReply`.
    ///
    /// Valid from: `Capturing`.
    pub fn submitted(&mut self, sequence: u64) -> Result<(), ExchangeError> {
        match self {
            Self::Capturing => {
                *self = Self::AwaitingReply {
                    sequence,
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(ExchangeError::InvalidTransition(
                "cannot submit: not in Capturing state",
            )),
        }
    }

    /// Transition to `Applying` for the matching outstanding exchange.
    ///
    /// Valid from: `AwaitingReply` with the same `sequence`.
    pub fn reply_received(&mut self, sequence: u64) -> Result<(), ExchangeError> {
        match self {
            Self::AwaitingReply { sequence: s, .. } if *s == sequence => {
                *self = Self::Applying { sequence };
                Ok(())
            }
            _ => Err(ExchangeError::InvalidTransition(
                "cannot receive: no matching request outstanding",
            )),
        }
    }

    /// Transition back to `Idle` after a successful apply.
    ///
    /// Valid from: `Applying`.
    pub fn applied(&mut self) -> Result<(), ExchangeError> {
        match self {
            Self::Applying { .. } => {
                *self = Self::Idle;
                Ok(())
            }
            _ => Err(ExchangeError::InvalidTransition(
                "cannot finish apply: not in Applying state",
            )),
        }
    }

    /// Abandon the current exchange and return to `Idle`.
    ///
    /// Valid from: `Capturing` (skip), `Applying` (failed decode).
    pub fn abandon(&mut self) -> Result<(), ExchangeError> {
        match self {
            Self::Capturing | Self::Applying { .. } => {
                *self = Self::Idle;
                Ok(())
            }
            _ => Err(ExchangeError::InvalidTransition(
                "cannot abandon: no exchange in progress",
            )),
        }
    }

    /// Force-reset to `Idle` regardless of current state.
    ///
    /// Used by stop and on unrecoverable errors.
    pub fn force_idle(&mut self) {
        *self = Self::Idle;
    }
}

// ── Tests ────────────────────────────────────────────────────────
