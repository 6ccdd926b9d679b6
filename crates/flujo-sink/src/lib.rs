//! Presentation side of the flujo media pipeline bridge.
//!
//! This crate provides:
//!
//! - **The sample scheduler**: [`SampleScheduler`], a thread-safe bounded
//!   FIFO of timestamped samples with running/paused/stopped states, an
//!   orthogonal flushing flag, backpressure for producers, and end-of-stream
//!   signalling
//! - **The surface boundary**: [`PresentationSurface`], the external
//!   component that displays finished frames
//! - **The renderer filter**: [`VideoRendererFilter`], whose input pin
//!   validates formats against the surface and feeds the scheduler
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flujo_sink::{SampleScheduler, VideoRendererFilter};
//!
//! let renderer = VideoRendererFilter::new(my_surface);
//! // Wire renderer.input_pin() to the decoder's output, run the graph,
//! // then drive presentation from a timer:
//! loop {
//!     renderer.present_due()?;
//!     std::thread::sleep(std::time::Duration::from_millis(5));
//! }
//! ```

mod renderer;
mod scheduler;
mod surface;

pub use renderer::{RendererInputPin, VideoRendererFilter};
pub use scheduler::{SampleScheduler, SchedulerState};
pub use surface::PresentationSurface;
