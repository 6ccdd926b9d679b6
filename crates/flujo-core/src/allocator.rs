//! Sample buffer allocation for pin connections.
//!
//! Each connection negotiates one allocator: the output pin asks its peer for
//! requirements, falls back to [`PoolAllocator`] when the peer declares none,
//! and commits the allocator before the first sample is requested. Allocators
//! are never shared raw across unrelated connections.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{PipelineError, Result};
use crate::sample::{MediaSample, PoolShared};

/// Negotiated buffer pool dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorProperties {
    /// Number of buffers the pool holds.
    pub buffer_count: usize,
    /// Size of each buffer in bytes.
    pub buffer_size: usize,
    /// Required start-address alignment; must be a power of two.
    pub alignment: usize,
}

impl Default for AllocatorProperties {
    fn default() -> Self {
        Self {
            buffer_count: 4,
            buffer_size: 64 * 1024,
            alignment: 1,
        }
    }
}

/// The component that owns and recycles sample buffers for one connection.
pub trait SampleAllocator: Send + Sync {
    /// Currently effective pool dimensions.
    fn properties(&self) -> AllocatorProperties;

    /// Requests new pool dimensions; returns the dimensions actually granted.
    ///
    /// Fails with [`PipelineError::WrongState`] while the pool is committed.
    fn set_properties(&self, requested: AllocatorProperties) -> Result<AllocatorProperties>;

    /// Activates the pool. Buffers become checkoutable.
    fn commit(&self) -> Result<()>;

    /// Deactivates the pool and releases its free buffers. Outstanding
    /// samples are not recalled; their buffers are discarded on return.
    fn decommit(&self) -> Result<()>;

    /// Checks out one sample with an empty payload of pool capacity.
    ///
    /// Fails with [`PipelineError::WrongState`] when decommitted and
    /// [`PipelineError::OutOfMemory`] when every buffer is outstanding.
    fn acquire(&self) -> Result<MediaSample>;
}

/// Default recycling allocator backed by a fixed set of `Vec<u8>` buffers.
///
/// Returned samples carry a weak link back to the pool; dropping the last
/// `Arc<MediaSample>` reference puts the buffer back on the free list.
#[derive(Debug)]
pub struct PoolAllocator {
    shared: Arc<Mutex<PoolShared>>,
    alignment: usize,
}

impl PoolAllocator {
    /// Creates a pool with the given dimensions, decommitted.
    pub fn new(properties: AllocatorProperties) -> Result<Self> {
        if properties.buffer_count == 0 || properties.buffer_size == 0 {
            return Err(PipelineError::InvalidArgument(
                "allocator needs at least one buffer of nonzero size",
            ));
        }
        if !properties.alignment.is_power_of_two() {
            return Err(PipelineError::InvalidArgument(
                "alignment must be a power of two",
            ));
        }
        Ok(Self {
            shared: Arc::new(Mutex::new(PoolShared {
                free: Vec::new(),
                outstanding: 0,
                committed: false,
                buffer_count: properties.buffer_count,
                buffer_size: align_up(properties.buffer_size, properties.alignment),
            })),
            alignment: properties.alignment,
        })
    }

    /// A pool with default dimensions, for the negotiation fallback path.
    pub fn with_defaults() -> Self {
        Self::new(AllocatorProperties::default()).expect("default properties are valid")
    }
}

impl SampleAllocator for PoolAllocator {
    fn properties(&self) -> AllocatorProperties {
        let shared = self.shared.lock();
        AllocatorProperties {
            buffer_count: shared.buffer_count,
            buffer_size: shared.buffer_size,
            alignment: self.alignment,
        }
    }

    fn set_properties(&self, requested: AllocatorProperties) -> Result<AllocatorProperties> {
        if requested.buffer_count == 0 || requested.buffer_size == 0 {
            return Err(PipelineError::InvalidArgument(
                "allocator needs at least one buffer of nonzero size",
            ));
        }
        if !requested.alignment.is_power_of_two() {
            return Err(PipelineError::InvalidArgument(
                "alignment must be a power of two",
            ));
        }
        let mut shared = self.shared.lock();
        if shared.committed {
            return Err(PipelineError::WrongState);
        }
        shared.buffer_count = requested.buffer_count;
        shared.buffer_size = align_up(requested.buffer_size, requested.alignment);
        Ok(AllocatorProperties {
            buffer_count: shared.buffer_count,
            buffer_size: shared.buffer_size,
            alignment: requested.alignment,
        })
    }

    fn commit(&self) -> Result<()> {
        let mut shared = self.shared.lock();
        if shared.committed {
            return Ok(());
        }
        shared.committed = true;
        let count = shared.buffer_count;
        let size = shared.buffer_size;
        shared.free = (0..count).map(|_| Vec::with_capacity(size)).collect();
        tracing::debug!(buffers = count, bytes = size, "allocator committed");
        Ok(())
    }

    fn decommit(&self) -> Result<()> {
        let mut shared = self.shared.lock();
        shared.committed = false;
        shared.free.clear();
        tracing::debug!(outstanding = shared.outstanding, "allocator decommitted");
        Ok(())
    }

    fn acquire(&self) -> Result<MediaSample> {
        let mut shared = self.shared.lock();
        if !shared.committed {
            return Err(PipelineError::WrongState);
        }
        let Some(buffer) = shared.free.pop() else {
            return Err(PipelineError::OutOfMemory);
        };
        shared.outstanding += 1;
        Ok(MediaSample {
            data: buffer,
            presentation_time: None,
            discontinuity: false,
            media_type: None,
            pool: Some(Arc::downgrade(&self.shared)),
        })
    }
}

fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}
