//! Async byte-range IO for the flujo media pipeline bridge.
//!
//! This crate provides:
//!
//! - **Byte-stream providers**: the [`ByteStream`] boundary trait plus
//!   [`FileByteStream`] and [`MemoryByteStream`] implementations
//! - **The serialization point**: [`EventLoop`], a task queue drained by one
//!   host-owned thread that performs all stream I/O
//! - **The async reader**: [`AsyncReader`], a queue of outstanding,
//!   cancellable byte-range reads with FIFO completion, zero-filled short
//!   reads, and a flush protocol that can never strand a waiter
//! - **The source filter**: [`AsyncSourceFilter`], wiring the reader behind
//!   an output pin that negotiates raw byte-stream media types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flujo_core::ByteRangeReader;
//! use flujo_io::{AsyncSourceFilter, EventLoop, FileByteStream};
//!
//! let event_loop = std::sync::Arc::new(EventLoop::new());
//! let source = AsyncSourceFilter::new(
//!     Box::new(FileByteStream::open("movie.avi")?),
//!     event_loop.handle(),
//! );
//! let runner = event_loop.clone();
//! std::thread::spawn(move || runner.run());
//!
//! let reader = source.reader();
//! reader.request(vec![0; 4096], 0, 4096, 1)?;
//! let first_chunk = reader.wait_for_next(std::time::Duration::from_secs(1))?;
//! ```

mod byte_stream;
mod event_loop;
mod reader;
mod source;

pub use byte_stream::{
    ByteStream, FileByteStream, MemoryByteStream, MemoryStreamHandle, ReadyCallback,
};
pub use event_loop::{EventLoop, LoopHandle};
pub use reader::AsyncReader;
pub use source::{AsyncSourceFilter, SourceOutputPin};
