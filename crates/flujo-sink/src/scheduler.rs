//! The presentation-side sample queue: thread-safe, bounded, clock-gated.
//!
//! The scheduler is a FIFO of [`TimedSample`]s plus a state gate, not a
//! timer: deciding *when* to pull is the presentation surface's job. A full
//! queue blocks producers (bounded backpressure) until a consumer pops or a
//! flush begins; flushing releases every held sample reference and wakes
//! every blocked producer with a clean cancelled status.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use flujo_core::{MediaSample, PipelineError, ReferenceClock, Result, TimedSample};


/// Lifecycle state of the scheduler, mirroring the filter lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Offers are rejected.
    Stopped,
    /// Samples queue up but none are due.
    Paused,
    /// Samples are released against the reference clock.
    Running,
}

struct SchedulerInner {
    state: SchedulerState,
    flushing: bool,
    queue: VecDeque<TimedSample>,
    capacity: usize,
    start_time: Option<Duration>,
    clock: Option<Arc<dyn ReferenceClock>>,
}

/// Clock-relative release queue for decoded samples.
pub struct SampleScheduler {
    inner: Mutex<SchedulerInner>,
    space: Condvar,
}

impl SampleScheduler {
    /// Default bound on outstanding samples.
    pub const DEFAULT_CAPACITY: usize = 8;

    /// A stopped scheduler bounded to `capacity` outstanding samples
    /// (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(SchedulerInner {
                state: SchedulerState::Stopped,
                flushing: false,
                queue: VecDeque::with_capacity(capacity.max(1)),
                capacity: capacity.max(1),
                start_time: None,
                clock: None,
            }),
            space: Condvar::new(),
        }
    }

    /// A scheduler with the default capacity.
    pub fn with_default_capacity() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.inner.lock().state
    }

    /// Records the graph start time and transitions to `Running`.
    pub fn run(&self, start_time: Duration) {
        let mut inner = self.inner.lock();
        inner.state = SchedulerState::Running;
        inner.start_time = Some(start_time);
        tracing::debug!(?start_time, "scheduler running");
    }

    /// Transitions to `Paused`; queued samples stay queued.
    pub fn pause(&self) {
        self.inner.lock().state = SchedulerState::Paused;
    }

    /// Transitions to `Stopped`; newly offered samples are rejected. Blocked
    /// producers wake and observe the rejection.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.state = SchedulerState::Stopped;
        inner.start_time = None;
        drop(inner);
        self.space.notify_all();
        tracing::debug!("scheduler stopped");
    }

    /// Swaps the reference clock. Does not re-time already-queued samples.
    pub fn set_clock(&self, clock: Option<Arc<dyn ReferenceClock>>) {
        self.inner.lock().clock = clock;
    }

    /// The active reference clock.
    pub fn clock(&self) -> Option<Arc<dyn ReferenceClock>> {
        self.inner.lock().clock.clone()
    }

    /// Stream-relative time: the clock's now minus the recorded start time.
    /// `None` unless running with a clock.
    pub fn stream_time(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        if inner.state != SchedulerState::Running {
            return None;
        }
        let clock = inner.clock.as_ref()?;
        let start = inner.start_time?;
        Some(clock.now().saturating_sub(start))
    }

    /// Appends a sample, blocking while the queue is at capacity.
    ///
    /// The wait is released by a consuming [`take_sample`](Self::take_sample)
    /// or by a flush/stop, in which case the offer is rejected with
    /// `WrongState` (the clean cancelled status) rather than left hanging.
    pub fn schedule(&self, sample: Arc<MediaSample>) -> Result<()> {
        self.enqueue(TimedSample::from_sample(sample))
    }

    /// Appends the end-of-stream sentinel; consumers see it as "stream
    /// ended", never as a data sample.
    pub fn schedule_end_of_stream(&self) -> Result<()> {
        self.enqueue(TimedSample::end_of_stream())
    }

    fn enqueue(&self, entry: TimedSample) -> Result<()> {
        let mut inner = self.inner.lock();
        loop {
            if inner.flushing || inner.state == SchedulerState::Stopped {
                return Err(PipelineError::WrongState);
            }
            if inner.queue.len() < inner.capacity {
                break;
            }
            self.space.wait(&mut inner);
        }
        inner.queue.push_back(entry);
        Ok(())
    }

    /// Pops the queue head, transferring its sample reference to the caller.
    /// `None` means nothing is ready.
    pub fn take_sample(&self) -> Option<TimedSample> {
        let mut inner = self.inner.lock();
        let entry = inner.queue.pop_front();
        drop(inner);
        if entry.is_some() {
            self.space.notify_one();
        }
        entry
    }

    /// Pops the head only when it is due at stream time `now`: end-of-stream
    /// sentinels and untimed samples are always due; timed samples wait for
    /// their presentation timestamp.
    pub fn take_due(&self, now: Duration) -> Option<TimedSample> {
        let mut inner = self.inner.lock();
        let due = match inner.queue.front() {
            Some(head) => head.end_of_stream || head.presentation_time.is_none_or(|ts| ts <= now),
            None => return None,
        };
        let entry = due.then(|| inner.queue.pop_front()).flatten();
        drop(inner);
        if entry.is_some() {
            self.space.notify_one();
        }
        entry
    }

    /// Enters or leaves the flushing state.
    ///
    /// Entering discards the queue (releasing every held sample reference),
    /// wakes all blocked producers, and rejects offers until the flag is
    /// cleared.
    pub fn set_flushing(&self, flushing: bool) {
        let mut inner = self.inner.lock();
        inner.flushing = flushing;
        if flushing {
            let discarded = inner.queue.len();
            inner.queue.clear();
            drop(inner);
            self.space.notify_all();
            tracing::debug!(discarded, "scheduler flushed");
        }
    }

    /// True while a flush is in effect.
    pub fn is_flushing(&self) -> bool {
        self.inner.lock().flushing
    }

    /// Number of queued samples.
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// True when no samples are queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    /// The configured bound on outstanding samples.
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }
}

impl Default for SampleScheduler {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_scheduler(capacity: usize) -> SampleScheduler {
        let scheduler = SampleScheduler::new(capacity);
        scheduler.run(Duration::ZERO);
        scheduler
    }

    fn sample(pts_ms: u64) -> Arc<MediaSample> {
        Arc::new(MediaSample::timed(
            vec![0; 4],
            Duration::from_millis(pts_ms),
        ))
    }

    #[test]
    fn rejects_offers_while_stopped() {
        let scheduler = SampleScheduler::new(4);
        assert_eq!(
            scheduler.schedule(sample(0)).unwrap_err(),
            PipelineError::WrongState
        );
    }

    #[test]
    fn samples_come_back_in_fifo_order() {
        let scheduler = running_scheduler(8);
        for pts in [30, 10, 20] {
            scheduler.schedule(sample(pts)).unwrap();
        }
        let times: Vec<_> = std::iter::from_fn(|| scheduler.take_sample())
            .map(|entry| entry.presentation_time.unwrap().as_millis() as u64)
            .collect();
        assert_eq!(times, vec![30, 10, 20]);
    }

    #[test]
    fn eos_sentinel_is_reported_as_stream_end() {
        let scheduler = running_scheduler(4);
        scheduler.schedule(sample(1)).unwrap();
        scheduler.schedule_end_of_stream().unwrap();

        assert!(!scheduler.take_sample().unwrap().end_of_stream);
        let tail = scheduler.take_sample().unwrap();
        assert!(tail.end_of_stream);
        assert!(tail.sample.is_none());
        assert!(scheduler.take_sample().is_none());
    }

    #[test]
    fn take_due_gates_on_presentation_time() {
        let scheduler = running_scheduler(4);
        scheduler.schedule(sample(100)).unwrap();

        assert!(scheduler.take_due(Duration::from_millis(50)).is_none());
        let due = scheduler.take_due(Duration::from_millis(100)).unwrap();
        assert_eq!(due.presentation_time, Some(Duration::from_millis(100)));
    }

    #[test]
    fn flush_releases_every_sample_reference() {
        let scheduler = running_scheduler(4);
        let held = sample(5);
        scheduler.schedule(held.clone()).unwrap();
        assert_eq!(Arc::strong_count(&held), 2);

        scheduler.set_flushing(true);
        assert_eq!(Arc::strong_count(&held), 1);
        assert_eq!(
            scheduler.schedule(held.clone()).unwrap_err(),
            PipelineError::WrongState
        );

        scheduler.set_flushing(false);
        scheduler.schedule(held).unwrap();
    }

    #[test]
    fn clock_swap_does_not_retime_queued_samples() {
        let scheduler = running_scheduler(4);
        scheduler.schedule(sample(40)).unwrap();
        scheduler.set_clock(Some(Arc::new(flujo_core::SystemClock::new())));
        let head = scheduler.take_sample().unwrap();
        assert_eq!(head.presentation_time, Some(Duration::from_millis(40)));
    }
}
