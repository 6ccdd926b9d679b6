//! The video renderer filter: input pin, scheduler, and surface glue.
//!
//! Received samples are validated by the input pin, queued on the
//! [`SampleScheduler`], and released to the [`PresentationSurface`] when
//! their presentation time arrives. Lifecycle transitions map onto the
//! scheduler: pause gates release, run starts the clock-relative stage, stop
//! flushes and rejects further samples.

use std::sync::{Arc, Weak};
use std::time::Duration;

use flujo_core::{
    Capability, CapabilityId, Filter, FilterCore, FilterEvent, InputPinBase, MediaObject,
    MediaSample, MediaType, Pin, PinBase, PinDirection, PipelineError, PixelFormat,
    ReceiveDisposition, ReferenceClock, Result, SampleAllocator, SystemClock,
};

use crate::scheduler::SampleScheduler;
use crate::surface::PresentationSurface;

/// Pixel formats offered during negotiation, in preference order.
const PREFERRED_FORMATS: [PixelFormat; 4] = [
    PixelFormat::Rgb32,
    PixelFormat::Yuv420p,
    PixelFormat::Uyvy,
    PixelFormat::Rgb24,
];

/// A renderer node pacing decoded video onto a presentation surface.
pub struct VideoRendererFilter {
    me: Weak<Self>,
    core: Arc<FilterCore>,
    pin: Arc<RendererInputPin>,
    scheduler: Arc<SampleScheduler>,
    surface: Arc<dyn PresentationSurface>,
}

impl VideoRendererFilter {
    /// A renderer over `surface` with the default queue bound and a system
    /// reference clock.
    pub fn new(surface: Arc<dyn PresentationSurface>) -> Arc<Self> {
        Self::with_capacity(surface, SampleScheduler::DEFAULT_CAPACITY)
    }

    /// A renderer over `surface` bounded to `capacity` queued samples.
    pub fn with_capacity(surface: Arc<dyn PresentationSurface>, capacity: usize) -> Arc<Self> {
        let core = FilterCore::new("video-renderer");
        let scheduler = Arc::new(SampleScheduler::new(capacity));
        scheduler.set_clock(Some(Arc::new(SystemClock::new())));
        let pin = RendererInputPin::new(Arc::downgrade(&core), scheduler.clone(), surface.clone());
        core.install_pins(vec![pin.clone() as Arc<dyn Pin>])
            .expect("pins installed once");
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            core,
            pin,
            scheduler,
            surface,
        })
    }

    /// The filter's single input pin.
    pub fn input_pin(&self) -> Arc<dyn Pin> {
        self.pin.clone()
    }

    /// The sample queue the surface driver consumes from.
    pub fn scheduler(&self) -> Arc<SampleScheduler> {
        self.scheduler.clone()
    }

    /// Swaps the reference clock used for pacing.
    pub fn set_sync_source(&self, clock: Option<Arc<dyn ReferenceClock>>) {
        self.scheduler.set_clock(clock);
    }

    /// Presents the head sample if its time has come.
    ///
    /// Returns `Ok(true)` when a frame was handed to the surface. A dequeued
    /// end-of-stream sentinel is relayed to the graph's event sink instead of
    /// the surface.
    pub fn present_due(&self) -> Result<bool> {
        let Some(now) = self.scheduler.stream_time() else {
            return Ok(false);
        };
        let Some(entry) = self.scheduler.take_due(now) else {
            return Ok(false);
        };
        if entry.end_of_stream {
            if let Err(err) = self.core.notify_event(FilterEvent::EndOfStream) {
                tracing::debug!(%err, "end-of-stream notification not delivered");
            }
            return Ok(false);
        }
        self.surface.present(&entry)?;
        Ok(true)
    }
}

impl MediaObject for VideoRendererFilter {
    fn query_capability(&self, id: CapabilityId) -> Result<Capability> {
        let me = self.me.upgrade().ok_or(PipelineError::NoSuchInterface)?;
        match id {
            CapabilityId::Identity => Ok(Capability::Identity(me)),
            CapabilityId::Filter => Ok(Capability::Filter(me)),
            CapabilityId::Clock => match self.scheduler.clock() {
                Some(clock) => Ok(Capability::Clock(clock)),
                None => Err(PipelineError::NoSuchInterface),
            },
            _ => Err(PipelineError::NoSuchInterface),
        }
    }
}

impl Filter for VideoRendererFilter {
    fn core(&self) -> &FilterCore {
        &self.core
    }

    fn on_pause(&self) -> Result<()> {
        self.scheduler.pause();
        Ok(())
    }

    fn on_run(&self, start_time: Duration) -> Result<()> {
        self.scheduler.run(start_time);
        Ok(())
    }

    fn on_stop(&self) -> Result<()> {
        // Drop whatever is queued, wake blocked producers, then gate offers.
        self.scheduler.set_flushing(true);
        self.scheduler.set_flushing(false);
        self.scheduler.stop();
        Ok(())
    }
}

/// The renderer's input pin: validates formats against the surface and
/// forwards accepted samples to the scheduler.
pub struct RendererInputPin {
    me: Weak<Self>,
    base: PinBase,
    input: InputPinBase,
    scheduler: Arc<SampleScheduler>,
    surface: Arc<dyn PresentationSurface>,
}

impl RendererInputPin {
    fn new(
        owner: Weak<FilterCore>,
        scheduler: Arc<SampleScheduler>,
        surface: Arc<dyn PresentationSurface>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            base: PinBase::new("in", PinDirection::Input, owner),
            input: InputPinBase::new(),
            scheduler,
            surface,
        })
    }
}

impl MediaObject for RendererInputPin {
    fn query_capability(&self, id: CapabilityId) -> Result<Capability> {
        match id {
            CapabilityId::Identity => Ok(Capability::Identity(self.self_arc())),
            CapabilityId::Pin => Ok(Capability::Pin(self.self_arc())),
            _ => Err(PipelineError::NoSuchInterface),
        }
    }
}

impl Pin for RendererInputPin {
    fn base(&self) -> &PinBase {
        &self.base
    }

    fn self_arc(&self) -> Arc<dyn Pin> {
        self.me.upgrade().expect("pin alive")
    }

    fn is_media_type_supported(&self, candidate: &MediaType) -> bool {
        candidate
            .pixel_format()
            .is_some_and(|format| self.surface.is_format_supported(format))
    }

    fn supported_types(&self) -> Vec<MediaType> {
        PREFERRED_FORMATS
            .into_iter()
            .filter(|format| self.surface.is_format_supported(*format))
            .map(MediaType::video)
            .collect()
    }

    fn connection_ended(&self) {
        self.input.connection_ended();
    }

    fn set_active(&self, active: bool) -> Result<()> {
        if active {
            let format = self
                .base
                .media_type()
                .and_then(|ty| ty.pixel_format())
                .ok_or(PipelineError::NotConnected)?;
            self.surface.start(format)
        } else {
            self.surface.stop();
            Ok(())
        }
    }

    fn notify_allocator(
        &self,
        allocator: &Arc<dyn SampleAllocator>,
        _properties: flujo_core::AllocatorProperties,
    ) -> Result<()> {
        self.input.set_allocator(allocator.clone());
        Ok(())
    }

    fn receive(&self, sample: Arc<MediaSample>) -> Result<ReceiveDisposition> {
        let gate = self.input.gate_receive(self, &sample, || {
            if let Err(err) = self.scheduler.schedule_end_of_stream() {
                tracing::debug!(%err, "abort end-of-stream not queued");
            }
        })?;
        if gate == ReceiveDisposition::Ignored {
            return Ok(gate);
        }
        self.scheduler.schedule(sample)?;
        Ok(ReceiveDisposition::Delivered)
    }

    fn end_of_stream(&self) -> Result<()> {
        self.scheduler.schedule_end_of_stream()
    }

    fn begin_flush(&self) -> Result<()> {
        self.input.set_flushing(true);
        self.scheduler.set_flushing(true);
        Ok(())
    }

    fn end_flush(&self) -> Result<()> {
        self.scheduler.set_flushing(false);
        self.input.set_flushing(false);
        Ok(())
    }
}
