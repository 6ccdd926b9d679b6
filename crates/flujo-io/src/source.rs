//! The async IO source filter: one output pin exposing byte-range reads.
//!
//! The filter adapts a [`ByteStream`] into a graph node. Its output pin
//! negotiates a raw byte-stream media type with the downstream demuxer and
//! exposes the [`ByteRangeReader`] capability through which that demuxer
//! pulls ranges.

use std::sync::{Arc, Weak};

use flujo_core::{
    AllocatorProperties, ByteRangeReader, Capability, CapabilityId, Filter, FilterCore, MajorKind,
    MediaObject, MediaType, OutputPinBase, Pin, PinBase, PinDirection, PipelineError, Result,
    SampleAllocator, SubKind,
};

use crate::byte_stream::ByteStream;
use crate::event_loop::LoopHandle;
use crate::reader::AsyncReader;

/// A source node feeding a filter graph from a seekable byte stream.
pub struct AsyncSourceFilter {
    me: Weak<Self>,
    core: Arc<FilterCore>,
    pin: Arc<SourceOutputPin>,
    reader: Arc<AsyncReader>,
}

impl AsyncSourceFilter {
    /// Wraps `stream` in a source filter whose reads are serviced on the
    /// loop behind `loop_handle`.
    pub fn new(stream: Box<dyn ByteStream>, loop_handle: LoopHandle) -> Arc<Self> {
        let core = FilterCore::new("async-source");
        let reader = AsyncReader::new(stream, loop_handle);
        let pin = SourceOutputPin::new(Arc::downgrade(&core), reader.clone());
        core.install_pins(vec![pin.clone() as Arc<dyn Pin>])
            .expect("pins installed once");
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            core,
            pin,
            reader,
        })
    }

    /// The filter's single output pin.
    pub fn output_pin(&self) -> Arc<dyn Pin> {
        self.pin.clone()
    }

    /// Direct access to the byte-range reading service.
    pub fn reader(&self) -> Arc<AsyncReader> {
        self.reader.clone()
    }
}

impl MediaObject for AsyncSourceFilter {
    fn query_capability(&self, id: CapabilityId) -> Result<Capability> {
        let me = self.me.upgrade().ok_or(PipelineError::NoSuchInterface)?;
        match id {
            CapabilityId::Identity => Ok(Capability::Identity(me)),
            CapabilityId::Filter => Ok(Capability::Filter(me)),
            CapabilityId::ByteReader => Ok(Capability::ByteReader(self.reader.clone())),
            _ => Err(PipelineError::NoSuchInterface),
        }
    }
}

impl Filter for AsyncSourceFilter {
    fn core(&self) -> &FilterCore {
        &self.core
    }

    fn on_stop(&self) -> Result<()> {
        // Returning to Stopped cancels whatever the downstream consumer left
        // outstanding, then re-arms the reader for the next start.
        self.reader.begin_flush();
        self.reader.end_flush();
        Ok(())
    }
}

/// The source filter's output pin.
///
/// Offers raw byte-stream types in container-probing order; the negotiated
/// allocator carries demuxer-sized buffers downstream.
pub struct SourceOutputPin {
    me: Weak<Self>,
    base: PinBase,
    output: OutputPinBase,
    reader: Arc<AsyncReader>,
}

impl SourceOutputPin {
    fn new(owner: Weak<FilterCore>, reader: Arc<AsyncReader>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            base: PinBase::new("out", PinDirection::Output, owner),
            output: OutputPinBase::new(),
            reader,
        })
    }

    /// The allocator negotiated for the current connection, if any.
    pub fn allocator(&self) -> Option<Arc<dyn SampleAllocator>> {
        self.output.allocator()
    }
}

impl MediaObject for SourceOutputPin {
    fn query_capability(&self, id: CapabilityId) -> Result<Capability> {
        match id {
            CapabilityId::Identity => Ok(Capability::Identity(self.self_arc())),
            CapabilityId::Pin => Ok(Capability::Pin(self.self_arc())),
            CapabilityId::ByteReader => Ok(Capability::ByteReader(self.reader.clone())),
            _ => Err(PipelineError::NoSuchInterface),
        }
    }
}

impl Pin for SourceOutputPin {
    fn base(&self) -> &PinBase {
        &self.base
    }

    fn self_arc(&self) -> Arc<dyn Pin> {
        self.me.upgrade().expect("pin alive")
    }

    fn is_media_type_supported(&self, candidate: &MediaType) -> bool {
        candidate.major == MajorKind::Stream
    }

    fn supported_types(&self) -> Vec<MediaType> {
        vec![
            MediaType::stream(SubKind::Avi),
            MediaType::stream(SubKind::Wave),
            MediaType::stream(SubKind::Mpeg),
        ]
    }

    fn complete_connection(&self, peer: &Arc<dyn Pin>, _media_type: &MediaType) -> Result<()> {
        self.output.complete_connection(peer)
    }

    fn connection_ended(&self) {
        self.output.connection_ended();
    }

    fn set_active(&self, active: bool) -> Result<()> {
        self.output.set_active(active)
    }

    fn allocator_requirements(&self) -> Option<AllocatorProperties> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_stream::MemoryByteStream;
    use crate::event_loop::EventLoop;

    #[test]
    fn source_exposes_reader_capability_through_its_pin() {
        let event_loop = EventLoop::new();
        let stream = MemoryByteStream::new(vec![0; 16]);
        let source = AsyncSourceFilter::new(Box::new(stream), event_loop.handle());

        let pin = source.output_pin();
        let reader = pin
            .query_capability(CapabilityId::ByteReader)
            .and_then(Capability::into_byte_reader)
            .unwrap();
        assert_eq!(reader.length().total, 16);
    }

    #[test]
    fn source_pin_accepts_only_byte_streams() {
        let event_loop = EventLoop::new();
        let stream = MemoryByteStream::new(Vec::new());
        let source = AsyncSourceFilter::new(Box::new(stream), event_loop.handle());

        let pin = source.output_pin();
        assert!(pin.query_accept(&MediaType::stream(SubKind::Mpeg)));
        assert!(!pin.query_accept(&MediaType::video(flujo_core::PixelFormat::Rgb32)));
    }
}
