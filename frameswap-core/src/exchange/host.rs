//! Interfaces to the graphics collaborator that produces source frames and
//! displays the composited result.

use crate::exchange::compositor::OutputTarget;
use crate::exchange::types::SourceFrame;

/// Produces the frame to submit on each capture.
pub trait FrameSource {
    /// The current frame, or `None` if the producer has nothing yet.
    fn current_source_frame(&mut self) -> Option<SourceFrame>;
}

/// Receives the composited output.
pub trait OutputSink {
    /// Bind `target` under `name`. Called only after a complete copy.
    fn set_output(&mut self, name: &str, target: &OutputTarget);

    /// Unbind `name`; the target behind it has been released.
    fn clear_output(&mut self, name: &str);
}
