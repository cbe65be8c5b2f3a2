//! Shared types for the exchange pipeline.
//!
//! These are the in-memory frame representations passed between pipeline
//! stages. The encoded network form lives in [`crate::exchange::codec`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ExchangeError;

// ── ChannelLayout ────────────────────────────────────────────────

/// Per-texel layout declared by the frame producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelLayout {
    /// One 16-bit float channel (half-precision height/depth field).
    R16Float,
    /// One 32-bit float channel.
    R32Float,
    /// Two 32-bit float channels.
    Rg32Float,
    /// Four 32-bit float channels.
    Rgba32Float,
    /// Four 8-bit unsigned normalised channels.
    Rgba8,
}

impl ChannelLayout {
    /// Number of channels per texel.
    pub const fn channels(self) -> usize {
        match self {
            ChannelLayout::R16Float | ChannelLayout::R32Float => 1,
            ChannelLayout::Rg32Float => 2,
            ChannelLayout::Rgba32Float | ChannelLayout::Rgba8 => 4,
        }
    }

    /// Whether this layout carries exactly one scalar per texel.
    pub const fn is_scalar(self) -> bool {
        self.channels() == 1
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelLayout::R16Float => "r16_float",
            ChannelLayout::R32Float => "r32_float",
            ChannelLayout::Rg32Float => "rg32_float",
            ChannelLayout::Rgba32Float => "rgba32_float",
            ChannelLayout::Rgba8 => "rgba8",
        };
        f.write_str(name)
    }
}

// ── ScalarFrame ──────────────────────────────────────────────────

/// A single-channel floating-point 2-D field in row-major order.
///
/// `data.len()` must equal `width * height`. Use [`ScalarFrame::new`] to
/// construct a checked frame; [`ScalarFrame::validate`] re-checks frames
/// assembled field by field.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarFrame {
    /// Frame width in texels.
    pub width: u32,
    /// Frame height in texels.
    pub height: u32,
    /// Row-major texel values.
    pub data: Vec<f32>,
}

impl ScalarFrame {
    /// Build a frame, rejecting zero dimensions and length mismatches.
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self, ExchangeError> {
        let frame = Self {
            width,
            height,
            data,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Number of texels implied by the dimensions.
    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Check the buffer-length invariant.
    pub fn validate(&self) -> Result<(), ExchangeError> {
        let expected = self.texel_count();
        if self.width == 0 || self.height == 0 || self.data.len() != expected {
            return Err(ExchangeError::InvalidFrame {
                width: self.width,
                height: self.height,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

// ── SourceFrame ──────────────────────────────────────────────────

/// A captured frame together with the layout its producer declared.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFrame {
    pub layout: ChannelLayout,
    pub frame: ScalarFrame,
}

// ── ImageBuffer ──────────────────────────────────────────────────

/// Decoded RGBA8 raster received from the remote service.
///
/// Consumed exactly once by the compositor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA rows, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
}

impl ImageBuffer {
    /// Bytes per RGBA texel.
    pub const BYTES_PER_TEXEL: usize = 4;

    /// Size of the raster in bytes implied by the dimensions.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * Self::BYTES_PER_TEXEL
    }
}
