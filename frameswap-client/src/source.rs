//! Synthetic frame source.

use frameswap_core::{ChannelLayout, FrameSource, ScalarFrame, SourceFrame};

/// Radial ripple height field that advances one step per capture.
pub struct RippleSource {
    width: u32,
    height: u32,
    layout: ChannelLayout,
    step: u64,
}

impl RippleSource {
    pub fn new(width: u32, height: u32, layout: ChannelLayout) -> Self {
        Self {
            width,
            height,
            layout,
            step: 0,
        }
    }

    fn render(&self) -> Vec<f32> {
        let cx = self.width as f32 / 2.0;
        let cy = self.height as f32 / 2.0;
        let phase = self.step as f32 * 0.2;
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let r = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
                data.push((r * 0.3 - phase).sin());
            }
        }
        data
    }
}

impl FrameSource for RippleSource {
    fn current_source_frame(&mut self) -> Option<SourceFrame> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let data = self.render();
        self.step += 1;
        let frame = ScalarFrame::new(self.width, self.height, data).ok()?;
        Some(SourceFrame {
            layout: self.layout,
            frame,
        })
    }
}
