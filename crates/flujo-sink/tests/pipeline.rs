//! End-to-end pipeline test: byte stream -> source filter -> decoder ->
//! renderer -> presentation surface.
//!
//! The decoder here is a stand-in that frames the raw byte stream into
//! fixed-size "pictures", but it exercises the real wiring: capability
//! lookup of the byte-range reader, allocator-backed sample production, pin
//! negotiation on both connections, and clock-gated presentation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use flujo_core::{
    ByteRangeReader, Capability, CapabilityId, Filter, FilterCore, InputPinBase, MajorKind,
    MediaObject, MediaSample, MediaType, OutputPinBase, Pin, PinBase, PinDirection, PipelineError,
    PixelFormat, ReceiveDisposition, ReferenceClock, Result, SampleAllocator,
};
use flujo_io::{AsyncSourceFilter, EventLoop, MemoryByteStream};
use flujo_sink::{PresentationSurface, VideoRendererFilter};

const FRAME_BYTES: usize = 64;
const FRAME_INTERVAL: Duration = Duration::from_millis(10);

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(97) + 13) as u8).collect()
}

// ---------------------------------------------------------------------------
// A minimal pass-through decoder filter
// ---------------------------------------------------------------------------

struct DecoderFilter {
    me: Weak<Self>,
    core: Arc<FilterCore>,
    input: Arc<DecoderInputPin>,
    output: Arc<DecoderOutputPin>,
}

impl DecoderFilter {
    fn new() -> Arc<Self> {
        let core = FilterCore::new("test-decoder");
        let input = DecoderInputPin::new(Arc::downgrade(&core));
        let output = DecoderOutputPin::new(Arc::downgrade(&core));
        core.install_pins(vec![
            input.clone() as Arc<dyn Pin>,
            output.clone() as Arc<dyn Pin>,
        ])
        .unwrap();
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            core,
            input,
            output,
        })
    }

    /// Pulls `frames` fixed-size chunks through the upstream reader and
    /// pushes them downstream as timestamped video samples.
    fn decode(&self, frames: usize) -> Result<()> {
        let upstream = self.input.base().peer().ok_or(PipelineError::NotConnected)?;
        let reader = upstream
            .query_capability(CapabilityId::ByteReader)
            .and_then(Capability::into_byte_reader)?;
        let downstream = self.output.base().peer().ok_or(PipelineError::NotConnected)?;
        let allocator = self
            .output
            .output
            .allocator()
            .ok_or(PipelineError::NoAllocator)?;

        for index in 0..frames {
            reader.request(
                vec![0; FRAME_BYTES],
                (index * FRAME_BYTES) as u64,
                FRAME_BYTES,
                index as u64,
            )?;
        }
        for index in 0..frames {
            let completed = reader.wait_for_next(Duration::from_secs(5))?;
            let mut sample = allocator.acquire()?;
            sample.data.extend_from_slice(&completed.buffer[..FRAME_BYTES]);
            sample.presentation_time = Some(FRAME_INTERVAL * index as u32);
            downstream.receive(Arc::new(sample))?;
        }
        downstream.end_of_stream()?;
        Ok(())
    }
}

impl MediaObject for DecoderFilter {
    fn query_capability(&self, id: CapabilityId) -> Result<Capability> {
        let me = self.me.upgrade().ok_or(PipelineError::NoSuchInterface)?;
        match id {
            CapabilityId::Identity => Ok(Capability::Identity(me)),
            CapabilityId::Filter => Ok(Capability::Filter(me)),
            _ => Err(PipelineError::NoSuchInterface),
        }
    }
}

impl Filter for DecoderFilter {
    fn core(&self) -> &FilterCore {
        &self.core
    }
}

struct DecoderInputPin {
    me: Weak<Self>,
    base: PinBase,
    input: InputPinBase,
}

impl DecoderInputPin {
    fn new(owner: Weak<FilterCore>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            base: PinBase::new("in", PinDirection::Input, owner),
            input: InputPinBase::new(),
        })
    }
}

impl MediaObject for DecoderInputPin {
    fn query_capability(&self, id: CapabilityId) -> Result<Capability> {
        match id {
            CapabilityId::Identity => Ok(Capability::Identity(self.self_arc())),
            CapabilityId::Pin => Ok(Capability::Pin(self.self_arc())),
            _ => Err(PipelineError::NoSuchInterface),
        }
    }
}

impl Pin for DecoderInputPin {
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
        Vec::new()
    }

    fn notify_allocator(
        &self,
        allocator: &Arc<dyn SampleAllocator>,
        _properties: flujo_core::AllocatorProperties,
    ) -> Result<()> {
        self.input.set_allocator(allocator.clone());
        Ok(())
    }

    fn connection_ended(&self) {
        self.input.connection_ended();
    }
}

struct DecoderOutputPin {
    me: Weak<Self>,
    base: PinBase,
    output: OutputPinBase,
}

impl DecoderOutputPin {
    fn new(owner: Weak<FilterCore>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            base: PinBase::new("out", PinDirection::Output, owner),
            output: OutputPinBase::new(),
        })
    }

    fn receive(&self, sample: Arc<MediaSample>) -> Result<ReceiveDisposition> {
        let peer = self.base.peer().ok_or(PipelineError::NotConnected)?;
        peer.receive(sample)
    }

    fn end_of_stream(&self) -> Result<()> {
        let peer = self.base.peer().ok_or(PipelineError::NotConnected)?;
        peer.end_of_stream()
    }
}

impl MediaObject for DecoderOutputPin {
    fn query_capability(&self, id: CapabilityId) -> Result<Capability> {
        match id {
            CapabilityId::Identity => Ok(Capability::Identity(self.self_arc())),
            CapabilityId::Pin => Ok(Capability::Pin(self.self_arc())),
            _ => Err(PipelineError::NoSuchInterface),
        }
    }
}

impl Pin for DecoderOutputPin {
    fn base(&self) -> &PinBase {
        &self.base
    }

    fn self_arc(&self) -> Arc<dyn Pin> {
        self.me.upgrade().expect("pin alive")
    }

    fn is_media_type_supported(&self, candidate: &MediaType) -> bool {
        candidate.pixel_format() == Some(PixelFormat::Yuv420p)
    }

    fn supported_types(&self) -> Vec<MediaType> {
        vec![MediaType::video(PixelFormat::Yuv420p)]
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
}

// ---------------------------------------------------------------------------
// Surface and clock
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CollectingSurface {
    frames: Mutex<Vec<Vec<u8>>>,
    started: AtomicUsize,
}

impl PresentationSurface for CollectingSurface {
    fn is_format_supported(&self, format: PixelFormat) -> bool {
        format == PixelFormat::Yuv420p
    }

    fn start(&self, _format: PixelFormat) -> Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn present(&self, frame: &flujo_core::TimedSample) -> Result<()> {
        let sample = frame.sample.as_ref().expect("data sample");
        self.frames.lock().push(sample.data.clone());
        Ok(())
    }

    fn stop(&self) {}
}

struct FrozenClock;

impl ReferenceClock for FrozenClock {
    fn now(&self) -> Duration {
        // Far enough ahead that every queued sample is due immediately.
        Duration::from_secs(60)
    }
}

// ---------------------------------------------------------------------------
// The scenario
// ---------------------------------------------------------------------------

#[test]
fn bytes_flow_from_stream_to_surface() {
    let event_loop = Arc::new(EventLoop::new());
    let runner = event_loop.clone();
    let loop_thread = thread::spawn(move || runner.run());

    let frames = 5usize;
    let data = pattern(frames * FRAME_BYTES);
    let stream = MemoryByteStream::new(data.clone());

    let source = AsyncSourceFilter::new(Box::new(stream), event_loop.handle());
    let decoder = DecoderFilter::new();
    let surface = Arc::new(CollectingSurface::default());
    let renderer = VideoRendererFilter::with_capacity(surface.clone(), frames + 1);
    renderer.set_sync_source(Some(Arc::new(FrozenClock)));

    // Wire the graph while everything is stopped.
    source
        .output_pin()
        .connect(&(decoder.input.clone() as Arc<dyn Pin>), None)
        .unwrap();
    decoder.output.connect(&renderer.input_pin(), None).unwrap();

    // Start the graph: renderer first, downstream-to-upstream.
    renderer.run(Duration::ZERO).unwrap();
    decoder.run(Duration::ZERO).unwrap();
    source.run(Duration::ZERO).unwrap();

    decoder.decode(frames).unwrap();

    let mut presented = 0;
    while renderer.present_due().unwrap() {
        presented += 1;
    }
    assert_eq!(presented, frames);

    let collected = surface.frames.lock();
    assert_eq!(collected.len(), frames);
    for (index, frame) in collected.iter().enumerate() {
        assert_eq!(frame.as_slice(), &data[index * FRAME_BYTES..(index + 1) * FRAME_BYTES]);
    }
    drop(collected);
    assert_eq!(surface.started.load(Ordering::SeqCst), 1);

    // Tear down: stop each filter, then disconnect.
    source.stop().unwrap();
    decoder.stop().unwrap();
    renderer.stop().unwrap();
    source.output_pin().disconnect().unwrap();
    decoder.output.disconnect().unwrap();

    event_loop.quit();
    loop_thread.join().unwrap();
}
