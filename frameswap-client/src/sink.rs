//! Output sink that logs what would be displayed.

use frameswap_core::{OutputSink, OutputTarget};
use tracing::{debug, info};

/// What the sink currently has bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub width: u32,
    pub height: u32,
    pub generation: u64,
}

/// Records the latest published target and logs resizes.
#[derive(Debug, Default)]
pub struct LoggingSink {
    bound: Option<Binding>,
    published: u64,
}

impl LoggingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current binding, if any.
    pub fn bound(&self) -> Option<Binding> {
        self.bound
    }

    /// Total publications.
    pub fn published(&self) -> u64 {
        self.published
    }
}

impl OutputSink for LoggingSink {
    fn set_output(&mut self, name: &str, target: &OutputTarget) {
        let Some((width, height)) = target.dimensions() else {
            return;
        };
        let binding = Binding {
            width,
            height,
            generation: target.generation(),
        };
        let resized = self
            .bound
            .is_none_or(|b| (b.width, b.height) != (width, height));
        if resized {
            info!(name, width, height, "output bound");
        } else {
            debug!(name, generation = binding.generation, "output updated");
        }
        self.bound = Some(binding);
        self.published += 1;
    }

    fn clear_output(&mut self, name: &str) {
        if self.bound.take().is_some() {
            info!(name, "output cleared");
        }
    }
}
