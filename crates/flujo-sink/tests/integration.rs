//! Integration tests for the sample scheduler and renderer filter.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use flujo_core::{
    Capability, CapabilityId, EventSink, Filter, FilterEvent, GraphHost, MediaObject, MediaSample,
    MediaType, OutputPinBase, Pin, PinBase, PinDirection, PipelineError, PixelFormat,
    ReceiveDisposition, ReferenceClock, Result,
};
use flujo_sink::{PresentationSurface, SampleScheduler, VideoRendererFilter};

// ---------------------------------------------------------------------------
// Test scaffolding
// ---------------------------------------------------------------------------

fn sample(pts_ms: u64) -> Arc<MediaSample> {
    Arc::new(MediaSample::timed(
        vec![0; 16],
        Duration::from_millis(pts_ms),
    ))
}

/// A surface that records calls and supports a fixed format set.
#[derive(Default)]
struct RecordingSurface {
    started: Mutex<Vec<PixelFormat>>,
    presented: Mutex<Vec<Option<Duration>>>,
    stopped: AtomicUsize,
}

impl PresentationSurface for RecordingSurface {
    fn is_format_supported(&self, format: PixelFormat) -> bool {
        matches!(format, PixelFormat::Yuv420p | PixelFormat::Rgb32)
    }

    fn start(&self, format: PixelFormat) -> Result<()> {
        self.started.lock().push(format);
        Ok(())
    }

    fn present(&self, frame: &flujo_core::TimedSample) -> Result<()> {
        self.presented.lock().push(frame.presentation_time);
        Ok(())
    }

    fn stop(&self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

/// A clock whose reading is set explicitly by the test.
#[derive(Default)]
struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }
}

impl ReferenceClock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.now_ms.load(Ordering::SeqCst))
    }
}

/// Minimal upstream output pin for connecting to the renderer.
struct TestOutputPin {
    me: Weak<Self>,
    base: PinBase,
    output: OutputPinBase,
    types: Vec<MediaType>,
}

impl TestOutputPin {
    fn detached(types: Vec<MediaType>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            base: PinBase::new("out", PinDirection::Output, Weak::new()),
            output: OutputPinBase::new(),
            types,
        })
    }
}

impl MediaObject for TestOutputPin {
    fn query_capability(&self, id: CapabilityId) -> Result<Capability> {
        match id {
            CapabilityId::Identity => Ok(Capability::Identity(self.self_arc())),
            CapabilityId::Pin => Ok(Capability::Pin(self.self_arc())),
            _ => Err(PipelineError::NoSuchInterface),
        }
    }
}

impl Pin for TestOutputPin {
    fn base(&self) -> &PinBase {
        &self.base
    }

    fn self_arc(&self) -> Arc<dyn Pin> {
        self.me.upgrade().expect("pin alive")
    }

    fn is_media_type_supported(&self, candidate: &MediaType) -> bool {
        self.types.contains(candidate)
    }

    fn supported_types(&self) -> Vec<MediaType> {
        self.types.clone()
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

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<FilterEvent>>,
}

impl EventSink for RecordingSink {
    fn notify(&self, event: FilterEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

struct TestGraph {
    me: Weak<Self>,
    sink: Arc<RecordingSink>,
}

impl TestGraph {
    fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            sink: Arc::new(RecordingSink::default()),
        })
    }
}

impl MediaObject for TestGraph {
    fn query_capability(&self, id: CapabilityId) -> Result<Capability> {
        match id {
            CapabilityId::Identity => {
                Ok(Capability::Identity(self.me.upgrade().expect("graph alive")))
            }
            CapabilityId::EventSink => Ok(Capability::EventSink(self.sink.clone())),
            _ => Err(PipelineError::NoSuchInterface),
        }
    }
}

impl GraphHost for TestGraph {}

// ---------------------------------------------------------------------------
// Scheduler backpressure
// ---------------------------------------------------------------------------

#[test]
fn schedule_blocks_at_capacity_until_a_take() {
    let scheduler = Arc::new(SampleScheduler::new(2));
    scheduler.run(Duration::ZERO);

    scheduler.schedule(sample(0)).unwrap();
    scheduler.schedule(sample(1)).unwrap();

    let producer_scheduler = scheduler.clone();
    let producer = thread::spawn(move || producer_scheduler.schedule(sample(2)));

    // The third offer must still be parked after a generous delay.
    thread::sleep(Duration::from_millis(80));
    assert!(!producer.is_finished());
    assert_eq!(scheduler.len(), 2);

    // One consuming take releases exactly one slot.
    let head = scheduler.take_sample().unwrap();
    assert_eq!(head.presentation_time, Some(Duration::from_millis(0)));
    producer.join().unwrap().unwrap();

    let times: Vec<_> = std::iter::from_fn(|| scheduler.take_sample())
        .map(|entry| entry.presentation_time.unwrap().as_millis() as u64)
        .collect();
    assert_eq!(times, vec![1, 2]);
}

#[test]
fn flush_returns_cancelled_status_to_blocked_producers() {
    let scheduler = Arc::new(SampleScheduler::new(1));
    scheduler.run(Duration::ZERO);
    scheduler.schedule(sample(0)).unwrap();

    let producer_scheduler = scheduler.clone();
    let producer = thread::spawn(move || producer_scheduler.schedule(sample(1)));
    thread::sleep(Duration::from_millis(50));
    assert!(!producer.is_finished());

    scheduler.set_flushing(true);
    assert_eq!(producer.join().unwrap().unwrap_err(), PipelineError::WrongState);
    assert!(scheduler.is_empty());
}

#[test]
fn flush_drops_queued_references_even_with_producers_waiting() {
    let scheduler = Arc::new(SampleScheduler::new(1));
    scheduler.run(Duration::ZERO);

    let held = sample(0);
    scheduler.schedule(held.clone()).unwrap();
    assert_eq!(Arc::strong_count(&held), 2);

    let producer_scheduler = scheduler.clone();
    let blocked = sample(1);
    let blocked_clone = blocked.clone();
    let producer = thread::spawn(move || producer_scheduler.schedule(blocked_clone));
    thread::sleep(Duration::from_millis(50));

    scheduler.set_flushing(true);
    producer.join().unwrap().unwrap_err();

    // Neither the queued nor the rejected sample is retained.
    assert_eq!(Arc::strong_count(&held), 1);
    assert_eq!(Arc::strong_count(&blocked), 1);
}

#[test]
fn stop_wakes_blocked_producers_with_rejection() {
    let scheduler = Arc::new(SampleScheduler::new(1));
    scheduler.run(Duration::ZERO);
    scheduler.schedule(sample(0)).unwrap();

    let producer_scheduler = scheduler.clone();
    let producer = thread::spawn(move || producer_scheduler.schedule(sample(1)));
    thread::sleep(Duration::from_millis(50));

    scheduler.stop();
    assert_eq!(producer.join().unwrap().unwrap_err(), PipelineError::WrongState);
}

// ---------------------------------------------------------------------------
// Renderer end-to-end
// ---------------------------------------------------------------------------

fn connected_renderer() -> (
    Arc<VideoRendererFilter>,
    Arc<TestOutputPin>,
    Arc<RecordingSurface>,
) {
    let surface = Arc::new(RecordingSurface::default());
    let renderer = VideoRendererFilter::with_capacity(surface.clone(), 4);
    let upstream = TestOutputPin::detached(vec![
        MediaType::video(PixelFormat::Yuv420p),
        MediaType::video(PixelFormat::Rgb24),
    ]);
    upstream
        .connect(&renderer.input_pin(), None)
        .expect("negotiation succeeds");
    (renderer, upstream, surface)
}

#[test]
fn negotiation_lands_on_a_surface_supported_format() {
    let (renderer, upstream, _surface) = connected_renderer();
    // Rgb24 is refused by the surface, so the common type is Yuv420p.
    assert_eq!(
        upstream.base().media_type(),
        Some(MediaType::video(PixelFormat::Yuv420p))
    );
    assert_eq!(
        renderer.input_pin().base().media_type(),
        Some(MediaType::video(PixelFormat::Yuv420p))
    );
}

#[test]
fn pause_starts_the_surface_with_the_negotiated_format() {
    let (renderer, _upstream, surface) = connected_renderer();

    renderer.pause().unwrap();
    assert_eq!(surface.started.lock().as_slice(), &[PixelFormat::Yuv420p]);

    renderer.stop().unwrap();
    assert_eq!(surface.stopped.load(Ordering::SeqCst), 1);
}

#[test]
fn samples_are_presented_in_order_when_due() {
    let (renderer, _upstream, surface) = connected_renderer();
    let clock = Arc::new(ManualClock::default());
    renderer.set_sync_source(Some(clock.clone()));

    renderer.pause().unwrap();
    let pin = renderer.input_pin();
    for pts in [10, 20, 30] {
        assert_eq!(
            pin.receive(sample(pts)).unwrap(),
            ReceiveDisposition::Delivered
        );
    }

    renderer.run(Duration::ZERO).unwrap();

    // Nothing is due before its timestamp.
    clock.set(5);
    assert!(!renderer.present_due().unwrap());

    clock.set(20);
    assert!(renderer.present_due().unwrap());
    assert!(renderer.present_due().unwrap());
    assert!(!renderer.present_due().unwrap());

    clock.set(35);
    assert!(renderer.present_due().unwrap());

    let presented: Vec<_> = surface
        .presented
        .lock()
        .iter()
        .map(|pts| pts.unwrap().as_millis() as u64)
        .collect();
    assert_eq!(presented, vec![10, 20, 30]);
}

#[test]
fn end_of_stream_reaches_the_event_sink_not_the_surface() {
    let (renderer, _upstream, surface) = connected_renderer();
    let graph = TestGraph::new();
    let host: Arc<dyn GraphHost> = graph.clone();
    renderer.join_graph(Some(&host));

    let clock = Arc::new(ManualClock::default());
    renderer.set_sync_source(Some(clock.clone()));
    renderer.pause().unwrap();

    let pin = renderer.input_pin();
    pin.receive(sample(10)).unwrap();
    pin.end_of_stream().unwrap();

    renderer.run(Duration::ZERO).unwrap();
    clock.set(50);
    assert!(renderer.present_due().unwrap());
    assert!(!renderer.present_due().unwrap());

    assert_eq!(surface.presented.lock().len(), 1);
    assert_eq!(graph.sink.events.lock().as_slice(), &[FilterEvent::EndOfStream]);
}

#[test]
fn receive_is_rejected_until_the_renderer_leaves_stopped() {
    let (renderer, _upstream, _surface) = connected_renderer();
    let pin = renderer.input_pin();

    assert_eq!(pin.receive(sample(0)).unwrap_err(), PipelineError::WrongState);
    renderer.pause().unwrap();
    assert_eq!(pin.receive(sample(0)).unwrap(), ReceiveDisposition::Delivered);
}

#[test]
fn pin_flush_discards_queued_samples_and_ignores_receives() {
    let (renderer, _upstream, _surface) = connected_renderer();
    renderer.pause().unwrap();
    let pin = renderer.input_pin();

    pin.receive(sample(0)).unwrap();
    assert_eq!(renderer.scheduler().len(), 1);

    pin.begin_flush().unwrap();
    assert!(renderer.scheduler().is_empty());
    assert_eq!(pin.receive(sample(1)).unwrap(), ReceiveDisposition::Ignored);

    pin.end_flush().unwrap();
    assert_eq!(pin.receive(sample(2)).unwrap(), ReceiveDisposition::Delivered);
}

#[test]
fn mid_stream_format_change_rejection_aborts_the_stream() {
    let (renderer, _upstream, _surface) = connected_renderer();
    let graph = TestGraph::new();
    let host: Arc<dyn GraphHost> = graph.clone();
    renderer.join_graph(Some(&host));
    renderer.pause().unwrap();

    let pin = renderer.input_pin();
    let mut changed = MediaSample::timed(vec![0; 16], Duration::from_millis(5));
    changed.media_type = Some(MediaType::video(PixelFormat::Rgb565));

    assert_eq!(
        pin.receive(Arc::new(changed)).unwrap_err(),
        PipelineError::TypeNotAccepted
    );
    // The abort queued a local end-of-stream and notified the graph.
    assert!(renderer.scheduler().take_sample().unwrap().end_of_stream);
    assert_eq!(
        graph.sink.events.lock().as_slice(),
        &[FilterEvent::ErrorAbort(PipelineError::TypeNotAccepted)]
    );
    // And latched the pin.
    assert_eq!(
        pin.receive(sample(1)).unwrap_err(),
        PipelineError::RuntimeError
    );
}
