//! Media samples: the refcounted payload unit flowing between pins.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::media_type::MediaType;

/// One buffer's worth of stream data plus its presentation metadata.
///
/// Samples are checked out of a [`SampleAllocator`](crate::SampleAllocator)
/// exclusively, filled by the producer, then shared downstream as
/// `Arc<MediaSample>`. Dropping the last reference returns the payload buffer
/// to the allocator pool it came from, if that pool is still committed.
#[derive(Debug, Default)]
pub struct MediaSample {
    /// Payload bytes. Capacity comes from the allocator; `len` is the valid
    /// prefix written by the producer.
    pub data: Vec<u8>,
    /// Presentation timestamp relative to the graph start time.
    pub presentation_time: Option<Duration>,
    /// Set on the first sample after a seek or flush.
    pub discontinuity: bool,
    /// Present only when the stream's format changed with this sample; the
    /// receiving pin re-validates it before accepting the sample.
    pub media_type: Option<MediaType>,
    pub(crate) pool: Option<Weak<Mutex<PoolShared>>>,
}

impl MediaSample {
    /// A free-standing sample not tied to any allocator.
    pub fn standalone(data: Vec<u8>) -> Self {
        Self {
            data,
            presentation_time: None,
            discontinuity: false,
            media_type: None,
            pool: None,
        }
    }

    /// A free-standing sample stamped with a presentation time.
    pub fn timed(data: Vec<u8>, presentation_time: Duration) -> Self {
        Self {
            data,
            presentation_time: Some(presentation_time),
            discontinuity: false,
            media_type: None,
            pool: None,
        }
    }
}

impl Drop for MediaSample {
    fn drop(&mut self) {
        let Some(pool) = self.pool.take().and_then(|weak| weak.upgrade()) else {
            return;
        };
        let mut shared = pool.lock();
        if shared.committed {
            let mut buffer = std::mem::take(&mut self.data);
            buffer.clear();
            shared.free.push(buffer);
            shared.outstanding = shared.outstanding.saturating_sub(1);
        }
    }
}

/// Shared state of a [`PoolAllocator`](crate::PoolAllocator).
///
/// Lives in `sample.rs` so the sample's drop path can reach it without a
/// dependency cycle between the modules.
#[derive(Debug, Default)]
pub(crate) struct PoolShared {
    pub(crate) free: Vec<Vec<u8>>,
    pub(crate) outstanding: usize,
    pub(crate) committed: bool,
    pub(crate) buffer_count: usize,
    pub(crate) buffer_size: usize,
}

/// A sample queued for presentation, tagged with its timestamp.
///
/// The end-of-stream sentinel carries no sample: `sample` is `None` and
/// `end_of_stream` is set.
#[derive(Debug, Clone)]
pub struct TimedSample {
    /// Presentation timestamp relative to the graph start time.
    pub presentation_time: Option<Duration>,
    /// The queued sample; `None` only for the end-of-stream sentinel.
    pub sample: Option<Arc<MediaSample>>,
    /// True when this entry marks the end of the stream.
    pub end_of_stream: bool,
}

impl TimedSample {
    /// Wraps a sample for scheduling, lifting its presentation time.
    pub fn from_sample(sample: Arc<MediaSample>) -> Self {
        Self {
            presentation_time: sample.presentation_time,
            sample: Some(sample),
            end_of_stream: false,
        }
    }

    /// The end-of-stream sentinel.
    pub fn end_of_stream() -> Self {
        Self {
            presentation_time: None,
            sample: None,
            end_of_stream: true,
        }
    }
}
