//! The presentation-surface boundary.

use flujo_core::{PixelFormat, Result, TimedSample};

/// The external component that displays finished frames.
///
/// The renderer hands it the scheduler's output; pacing (deciding when to
/// pull the next due sample) is the surface driver's responsibility.
pub trait PresentationSurface: Send + Sync {
    /// Whether the surface can display frames in `format`.
    fn is_format_supported(&self, format: PixelFormat) -> bool;

    /// Prepares the surface for a stream in `format`.
    fn start(&self, format: PixelFormat) -> Result<()>;

    /// Displays one frame.
    fn present(&self, frame: &TimedSample) -> Result<()>;

    /// Releases the surface's stream resources.
    fn stop(&self);
}
