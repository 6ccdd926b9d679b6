//! Base filter: a graph node aggregating pins and a lifecycle state machine.
//!
//! Concrete filters embed a [`FilterCore`] (the shared node state) and
//! implement [`Filter`], overriding the transition hooks they care about.
//! The three transition entry points and `state()` are serialized under the
//! core's one mutex; the pin list is structurally fixed once installed.

use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::capability::{CapabilityId, MediaObject};
use crate::error::{PipelineError, Result};
use crate::events::{EventSink, FilterEvent, GraphHost};
use crate::pin::Pin;

/// Lifecycle state of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// Not streaming; connections may be made or broken.
    Stopped,
    /// Resources active, presentation gated.
    Paused,
    /// Streaming against the reference clock.
    Running,
}

struct FilterInner {
    state: FilterState,
    graph: Option<Weak<dyn GraphHost>>,
    sink: Option<Arc<dyn EventSink>>,
    start_time: Option<Duration>,
}

/// Shared state of one graph node: name, lifecycle, pins, and the event-sink
/// link toward the owning graph.
///
/// The filter owns its pins; pins refer back through a [`Weak`] handle, so a
/// pin kept alive past its filter (by a connected peer) degrades to
/// stopped-filter behavior instead of dangling.
pub struct FilterCore {
    name: String,
    inner: Mutex<FilterInner>,
    pins: OnceLock<Vec<Arc<dyn Pin>>>,
}

impl FilterCore {
    /// Creates a node core with no pins, stopped, outside any graph.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            inner: Mutex::new(FilterInner {
                state: FilterState::Stopped,
                graph: None,
                sink: None,
                start_time: None,
            }),
            pins: OnceLock::new(),
        })
    }

    /// Installs the node's pins. Allowed exactly once; the pin list is
    /// structurally fixed afterwards.
    pub fn install_pins(&self, pins: Vec<Arc<dyn Pin>>) -> Result<()> {
        self.pins
            .set(pins)
            .map_err(|_| PipelineError::WrongState)
    }

    /// The filter's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> FilterState {
        self.inner.lock().state
    }

    /// The graph start time recorded by the latest run transition.
    pub fn start_time(&self) -> Option<Duration> {
        self.inner.lock().start_time
    }

    /// The node's pins, in construction order. Empty until installed.
    pub fn pins(&self) -> &[Arc<dyn Pin>] {
        self.pins.get().map_or(&[], Vec::as_slice)
    }

    /// Finds a pin by name.
    pub fn find_pin(&self, name: &str) -> Option<Arc<dyn Pin>> {
        self.pins()
            .iter()
            .find(|pin| pin.base().name() == name)
            .cloned()
    }

    /// The graph this filter currently belongs to, if it is still alive.
    pub fn graph(&self) -> Option<Arc<dyn GraphHost>> {
        self.inner.lock().graph.as_ref().and_then(Weak::upgrade)
    }

    /// Joins (or leaves, with `None`) a graph, re-querying the new graph for
    /// its event-sink capability.
    pub fn join_graph(&self, graph: Option<&Arc<dyn GraphHost>>) {
        let sink = graph.and_then(|g| {
            g.query_capability(CapabilityId::EventSink)
                .and_then(crate::capability::Capability::into_event_sink)
                .ok()
        });
        let mut inner = self.inner.lock();
        inner.graph = graph.map(Arc::downgrade);
        inner.sink = sink;
    }

    /// Relays an event toward the owning graph.
    ///
    /// A filter outside any graph reports [`PipelineError::NotImplemented`];
    /// callers treat that as a benign no-op.
    pub fn notify_event(&self, event: FilterEvent) -> Result<()> {
        let sink = self.inner.lock().sink.clone();
        match sink {
            Some(sink) => sink.notify(event),
            None => Err(PipelineError::NotImplemented),
        }
    }
}

/// A graph node: lifecycle transitions plus pin enumeration.
///
/// The transitions are provided; implementors supply the core and override
/// the `on_*` hooks to react to state changes. Hooks run after the state has
/// flipped, outside the transition mutex, and must not re-enter `pause()`/
/// `run()`/`stop()` on the same filter.
pub trait Filter: MediaObject {
    /// The embedded node core.
    fn core(&self) -> &FilterCore;

    // --- Hooks ---

    /// Called after the node enters `Paused`.
    fn on_pause(&self) -> Result<()> {
        Ok(())
    }

    /// Called after the node enters `Running`.
    fn on_run(&self, start_time: Duration) -> Result<()> {
        let _ = start_time;
        Ok(())
    }

    /// Called after the node returns to `Stopped`.
    fn on_stop(&self) -> Result<()> {
        Ok(())
    }

    // --- Provided node operations ---

    /// The filter's name.
    fn name(&self) -> &str {
        self.core().name()
    }

    /// Current lifecycle state.
    fn state(&self) -> FilterState {
        self.core().state()
    }

    /// Transition to `Paused`.
    ///
    /// Entering from `Stopped` activates every connected pin before the
    /// state flips; an activation failure aborts the transition.
    fn pause(&self) -> Result<()> {
        let core = self.core();
        let mut inner = core.inner.lock();
        match inner.state {
            FilterState::Paused => return Ok(()),
            FilterState::Stopped => activate_connected_pins(core)?,
            FilterState::Running => {}
        }
        inner.state = FilterState::Paused;
        tracing::debug!(filter = core.name(), "paused");
        drop(inner);
        self.on_pause()
    }

    /// Transition to `Running`, performing an implicit pause first when
    /// currently `Stopped`.
    fn run(&self, start_time: Duration) -> Result<()> {
        let core = self.core();
        let mut inner = core.inner.lock();
        if inner.state == FilterState::Stopped {
            activate_connected_pins(core)?;
            inner.state = FilterState::Paused;
            drop(inner);
            self.on_pause()?;
            inner = core.inner.lock();
        }
        if inner.state == FilterState::Running {
            return Ok(());
        }
        inner.state = FilterState::Running;
        inner.start_time = Some(start_time);
        tracing::debug!(filter = core.name(), ?start_time, "running");
        drop(inner);
        self.on_run(start_time)
    }

    /// Transition to `Stopped` from any state.
    ///
    /// Every connected pin gets a deactivation attempt; the first failure is
    /// remembered and returned, but never short-circuits the rest.
    fn stop(&self) -> Result<()> {
        let core = self.core();
        let mut inner = core.inner.lock();
        if inner.state == FilterState::Stopped {
            return Ok(());
        }
        let mut first_err = None;
        for pin in core.pins() {
            if pin.base().peer().is_none() {
                continue;
            }
            if let Err(err) = pin.set_active(false) {
                tracing::warn!(pin = pin.base().name(), %err, "pin deactivation failed");
                first_err.get_or_insert(err);
            }
        }
        inner.state = FilterState::Stopped;
        inner.start_time = None;
        tracing::debug!(filter = core.name(), "stopped");
        drop(inner);
        let hook = self.on_stop();
        match first_err {
            Some(err) => Err(err),
            None => hook,
        }
    }

    /// The node's pins, in construction order.
    fn pins(&self) -> Vec<Arc<dyn Pin>> {
        self.core().pins().to_vec()
    }

    /// Finds a pin by name.
    fn find_pin(&self, name: &str) -> Option<Arc<dyn Pin>> {
        self.core().find_pin(name)
    }

    /// Joins or leaves a graph; refreshes the cached event sink.
    fn join_graph(&self, graph: Option<&Arc<dyn GraphHost>>) {
        self.core().join_graph(graph);
    }
}

/// Activates every connected pin; fails fast on the first error, leaving the
/// state untouched.
fn activate_connected_pins(core: &FilterCore) -> Result<()> {
    for pin in core.pins() {
        if pin.base().peer().is_none() {
            continue;
        }
        pin.set_active(true)?;
    }
    Ok(())
}
