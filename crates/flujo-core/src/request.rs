//! The pull-mode async byte-range reading contract.
//!
//! A source pin that can serve byte ranges asynchronously exposes this role
//! through [`CapabilityId::ByteReader`](crate::CapabilityId::ByteReader).
//! Downstream consumers queue requests naming a byte range, then collect
//! completions in FIFO submission order.

use std::time::Duration;

use crate::error::Result;

/// How a byte-range request ended.
///
/// Short reads and flush retirements are soft conditions, not errors: the
/// consumer always gets its buffer back, zero-filled past whatever data was
/// actually available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Every requested byte was read from the stream.
    Complete,
    /// Only a prefix was available; the remainder of the buffer is zeroed.
    Partial {
        /// Number of valid bytes at the start of the buffer.
        valid_len: usize,
    },
    /// The requested offset lies beyond the stream's total length; the
    /// buffer is fully zeroed. Not an error.
    EndOfStream,
    /// Retired by a flush before any data was read. Maps to the wrong-state
    /// retirement status; never reported as a hard failure.
    Cancelled,
}

/// A serviced request, handed back to the consumer.
#[derive(Debug)]
pub struct CompletedRequest {
    /// The caller's correlation tag, unchanged.
    pub tag: u64,
    /// Byte offset the request named.
    pub position: u64,
    /// The caller's buffer, filled with stream data and/or zeros.
    pub buffer: Vec<u8>,
    /// Soft result of the read.
    pub outcome: ReadOutcome,
}

/// Total and currently available stream length, in bytes.
///
/// For an in-progress download `available <= total`; the reader guarantees
/// `available` never shrinks between observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLength {
    /// Total length of the stream, as far as it is known.
    pub total: u64,
    /// Bytes readable right now.
    pub available: u64,
}

/// Pull-mode async byte-range reading service.
pub trait ByteRangeReader: Send + Sync {
    /// Queues a read of `length` bytes at `position` into `buffer`.
    ///
    /// The buffer is caller-owned and transferred, never copied; it comes
    /// back through [`wait_for_next`](Self::wait_for_next). Fails with
    /// [`WrongState`](crate::PipelineError::WrongState) while flushing, in
    /// which case the buffer is discarded.
    fn request(&self, buffer: Vec<u8>, position: u64, length: usize, tag: u64) -> Result<()>;

    /// Blocks until a serviced request is ready, a flush begins
    /// ([`WrongState`](crate::PipelineError::WrongState)), or the timeout
    /// expires ([`Timeout`](crate::PipelineError::Timeout)).
    fn wait_for_next(&self, timeout: Duration) -> Result<CompletedRequest>;

    /// Reads synchronously at `position`, blocking the calling thread.
    ///
    /// All synchronous reads funnel through the same serialization point as
    /// queued requests, regardless of the calling thread.
    fn sync_read(&self, position: u64, buffer: &mut [u8]) -> Result<ReadOutcome>;

    /// Retires every pending request with a cancelled status and wakes all
    /// waiters before returning.
    fn begin_flush(&self);

    /// Leaves the flushing state; requests issued afterwards are serviced
    /// normally again.
    fn end_flush(&self);

    /// Most recently observed total/available stream length.
    fn length(&self) -> StreamLength;
}
