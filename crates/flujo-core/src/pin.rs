//! Pins: directional connection endpoints and the negotiation protocol.
//!
//! A pin is one endpoint of a graph-node connection. The connection handshake
//! lives here as provided methods on the [`Pin`] trait: concrete pins supply
//! the type predicate, preferred-type list, and a handful of hooks, and
//! inherit the full protocol (two-pass type fallback, allocator negotiation
//! on the output side, rollback, and the disconnect round-trip).
//!
//! Ownership follows the graph model used across the workspace: the filter
//! owns its pins; a pin's back-reference to its filter is a [`Weak`] handle,
//! and the peer link established by a connection is a plain `Arc` released at
//! disconnect.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::allocator::{AllocatorProperties, PoolAllocator, SampleAllocator};
use crate::capability::MediaObject;
use crate::error::{PipelineError, Result};
use crate::filter::{FilterCore, FilterState};
use crate::media_type::MediaType;
use crate::sample::MediaSample;

/// Which way samples flow through a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    /// The pin receives samples from its peer.
    Input,
    /// The pin pushes samples to its peer.
    Output,
}

/// Connection-scoped state, populated at connect time and cleared at
/// disconnect.
#[derive(Default)]
struct PinConnection {
    peer: Option<Arc<dyn Pin>>,
    media_type: Option<MediaType>,
}

/// State every pin embeds: identity, owner back-reference, and the current
/// connection under its own mutex.
pub struct PinBase {
    name: String,
    direction: PinDirection,
    owner: Weak<FilterCore>,
    conn: Mutex<PinConnection>,
}

impl PinBase {
    /// Creates the embedded pin state.
    ///
    /// `owner` is the filter that owns this pin; pass a dangling [`Weak`]
    /// only in tests that exercise a pin without a filter.
    pub fn new(name: impl Into<String>, direction: PinDirection, owner: Weak<FilterCore>) -> Self {
        Self {
            name: name.into(),
            direction,
            owner,
            conn: Mutex::new(PinConnection::default()),
        }
    }

    /// The pin's name, unique within its filter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pin's direction.
    pub fn direction(&self) -> PinDirection {
        self.direction
    }

    /// The owning filter, if it is still alive.
    pub fn owner(&self) -> Option<Arc<FilterCore>> {
        self.owner.upgrade()
    }

    /// The owning filter's lifecycle state. A pin whose filter is gone
    /// behaves like a stopped filter's pin.
    pub fn filter_state(&self) -> FilterState {
        self.owner
            .upgrade()
            .map_or(FilterState::Stopped, |filter| filter.state())
    }

    /// The connected peer, if any.
    pub fn peer(&self) -> Option<Arc<dyn Pin>> {
        self.conn.lock().peer.clone()
    }

    /// The negotiated media type, if connected.
    pub fn media_type(&self) -> Option<MediaType> {
        self.conn.lock().media_type.clone()
    }

    fn store_connection(&self, peer: Arc<dyn Pin>, media_type: MediaType) {
        let mut conn = self.conn.lock();
        conn.peer = Some(peer);
        conn.media_type = Some(media_type);
    }

    fn take_connection(&self) -> Option<(Arc<dyn Pin>, Option<MediaType>)> {
        let mut conn = self.conn.lock();
        let peer = conn.peer.take()?;
        Some((peer, conn.media_type.take()))
    }
}

/// A typed, directional connection endpoint of a graph node.
///
/// The protocol methods (`connect`, `receive_connection`, `disconnect`,
/// `clear_connection`) are provided; implementors override only the hooks.
/// Locking discipline: protocol methods never hold the connection mutex
/// while calling the peer or a hook, and hooks must not call back into the
/// owning filter's transition API.
pub trait Pin: MediaObject {
    /// The embedded pin state.
    fn base(&self) -> &PinBase;

    /// An owned handle to this pin, for handing to peers.
    fn self_arc(&self) -> Arc<dyn Pin>;

    /// Pure predicate: would this pin accept `candidate` for a connection?
    /// Never mutates state.
    fn is_media_type_supported(&self, candidate: &MediaType) -> bool;

    /// Preferred media types in negotiation order.
    fn supported_types(&self) -> Vec<MediaType>;

    // --- Hooks ---

    /// Called once a candidate type has round-tripped, before the connection
    /// is recorded. Output pins negotiate their allocator here.
    fn complete_connection(&self, peer: &Arc<dyn Pin>, media_type: &MediaType) -> Result<()> {
        let _ = (peer, media_type);
        Ok(())
    }

    /// Called after the connection-scoped state has been cleared.
    fn connection_ended(&self) {}

    /// Activates or deactivates the pin for streaming. Driven by the owning
    /// filter's lifecycle transitions.
    fn set_active(&self, active: bool) -> Result<()> {
        let _ = active;
        Ok(())
    }

    /// Buffer requirements this pin wants the connection allocator to meet,
    /// or `None` to accept the connecting pin's default.
    fn allocator_requirements(&self) -> Option<AllocatorProperties> {
        None
    }

    /// Informs an input pin of the allocator negotiated for the connection.
    fn notify_allocator(
        &self,
        allocator: &Arc<dyn SampleAllocator>,
        properties: AllocatorProperties,
    ) -> Result<()> {
        let _ = (allocator, properties);
        Ok(())
    }

    /// Delivers one sample to an input pin.
    fn receive(&self, sample: Arc<MediaSample>) -> Result<ReceiveDisposition> {
        let _ = sample;
        Err(PipelineError::NotImplemented)
    }

    /// Signals that no further samples will arrive on this connection.
    fn end_of_stream(&self) -> Result<()> {
        Err(PipelineError::NotImplemented)
    }

    /// Starts a flush on an input pin: in-flight samples are discarded and
    /// `receive` reports `Ignored` until the flush ends.
    fn begin_flush(&self) -> Result<()> {
        Err(PipelineError::NotImplemented)
    }

    /// Ends a flush on an input pin.
    fn end_flush(&self) -> Result<()> {
        Err(PipelineError::NotImplemented)
    }

    /// Whether a call to [`receive`](Self::receive) may block the caller.
    ///
    /// Computed by asking this filter's output pins whether *their* connected
    /// peers may block; "may block" is assumed only when there are no output
    /// pins to delegate to.
    fn receive_can_block(&self) -> bool {
        let Some(filter) = self.base().owner() else {
            return true;
        };
        let pins = filter.pins();
        let outputs: Vec<_> = pins
            .iter()
            .filter(|pin| pin.base().direction() == PinDirection::Output)
            .collect();
        if outputs.is_empty() {
            return true;
        }
        outputs.iter().any(|pin| {
            pin.base()
                .peer()
                .is_some_and(|peer| peer.receive_can_block())
        })
    }

    // --- Provided protocol ---

    /// Initiates a connection to `peer`, negotiating a media type and (for
    /// output pins) an allocator.
    ///
    /// Legal only while the owning filter is stopped. With a fully specified
    /// `proposed` type exactly one negotiation is attempted; otherwise the
    /// peer's preferred types are tried in order, then this pin's own, with a
    /// partially specified `proposed` acting as a filter template. The most
    /// specific error seen is returned when every candidate fails.
    fn connect(&self, peer: &Arc<dyn Pin>, proposed: Option<&MediaType>) -> Result<()> {
        if self.base().filter_state() != FilterState::Stopped {
            return Err(PipelineError::WrongState);
        }
        if self.base().peer().is_some() {
            return Err(PipelineError::AlreadyConnected);
        }
        if peer.base().direction() == self.base().direction() {
            return Err(PipelineError::InvalidDirection);
        }

        let this = self.self_arc();
        if let Some(exact) = proposed.filter(|ty| !ty.is_partially_specified()) {
            return negotiate_one(&this, peer, exact);
        }

        let mut best: Option<PipelineError> = None;
        let mut candidates = peer.supported_types();
        candidates.extend(self.supported_types());
        for candidate in &candidates {
            if candidate.is_partially_specified() {
                continue;
            }
            if let Some(template) = proposed
                && !template.matches(candidate)
            {
                continue;
            }
            match negotiate_one(&this, peer, candidate) {
                Ok(()) => {
                    tracing::debug!(pin = self.base().name(), ty = %candidate, "pin connected");
                    return Ok(());
                }
                Err(err) => {
                    best = Some(match best {
                        Some(prev) => prev.prefer(err),
                        None => err,
                    });
                }
            }
        }
        let err = best.unwrap_or(PipelineError::TypeNotAccepted);
        tracing::debug!(pin = self.base().name(), %err, "pin connection failed");
        Err(err)
    }

    /// The callee-side half of the handshake.
    ///
    /// Runs the same state checks as [`connect`](Self::connect), asks this
    /// pin whether it accepts `media_type`, and records the connection. On
    /// any failure the pin ends in its pre-call state.
    fn receive_connection(&self, connector: &Arc<dyn Pin>, media_type: &MediaType) -> Result<()> {
        if media_type.is_partially_specified() {
            return Err(PipelineError::InvalidArgument(
                "connection type must be fully specified",
            ));
        }
        if self.base().filter_state() != FilterState::Stopped {
            return Err(PipelineError::WrongState);
        }
        if self.base().peer().is_some() {
            return Err(PipelineError::AlreadyConnected);
        }
        if connector.base().direction() == self.base().direction() {
            return Err(PipelineError::InvalidDirection);
        }
        if !self.is_media_type_supported(media_type) {
            return Err(PipelineError::TypeNotAccepted);
        }

        self.base()
            .store_connection(connector.clone(), media_type.clone());
        if let Err(err) = self.complete_connection(connector, media_type) {
            self.base().take_connection();
            return Err(err);
        }
        Ok(())
    }

    /// Tears down the connection on both ends.
    ///
    /// Returns `Ok(false)` when already disconnected. The peer is released
    /// first; if the peer refuses, nothing is released locally.
    fn disconnect(&self) -> Result<bool> {
        let Some(peer) = self.base().peer() else {
            return Ok(false);
        };
        if self.base().filter_state() != FilterState::Stopped {
            return Err(PipelineError::WrongState);
        }
        peer.clear_connection()?;
        self.clear_connection()?;
        Ok(true)
    }

    /// Releases this end's connection state only.
    ///
    /// Used by the peer during [`disconnect`](Self::disconnect) and as the
    /// rollback step when allocator negotiation fails mid-connect.
    fn clear_connection(&self) -> Result<()> {
        if self.base().filter_state() != FilterState::Stopped {
            return Err(PipelineError::WrongState);
        }
        if self.base().take_connection().is_some() {
            self.connection_ended();
        }
        Ok(())
    }

    /// Pure predicate used by graph-level type probing; never mutates state.
    fn query_accept(&self, candidate: &MediaType) -> bool {
        self.is_media_type_supported(candidate)
    }

    /// A restartable cursor over this pin's preferred types, snapshot now.
    fn enumerate_media_types(&self) -> MediaTypeEnumerator {
        MediaTypeEnumerator::new(self.self_arc())
    }
}

/// One negotiation attempt: round-trip to the peer, run the local completion
/// hook, and record the connection. Rolls the peer back if completion fails.
fn negotiate_one(this: &Arc<dyn Pin>, peer: &Arc<dyn Pin>, candidate: &MediaType) -> Result<()> {
    if !this.is_media_type_supported(candidate) {
        return Err(PipelineError::TypeNotAccepted);
    }
    peer.receive_connection(this, candidate)?;
    if let Err(err) = this.complete_connection(peer, candidate) {
        if let Err(rollback) = peer.clear_connection() {
            tracing::warn!(%rollback, "peer rollback failed after negotiation error");
        }
        return Err(err);
    }
    this.base()
        .store_connection(peer.clone(), candidate.clone());
    Ok(())
}

/// What an input pin did with a delivered sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveDisposition {
    /// The sample was accepted and passed downstream.
    Delivered,
    /// The sample was dropped because a flush is in progress. Not an error.
    Ignored,
}

/// Restartable, finite cursor over a pin's preferred media types.
///
/// The sequence is a snapshot taken at construction (or at the latest
/// [`reset`](Self::reset)); advancing past the end returns a short batch
/// rather than failing. Cloning yields an independent cursor over the same
/// snapshot.
#[derive(Clone)]
pub struct MediaTypeEnumerator {
    source: Arc<dyn Pin>,
    snapshot: Vec<MediaType>,
    cursor: usize,
}

impl MediaTypeEnumerator {
    /// Snapshots `source`'s preferred types and positions the cursor at the
    /// start.
    pub fn new(source: Arc<dyn Pin>) -> Self {
        let snapshot = source.supported_types();
        Self {
            source,
            snapshot,
            cursor: 0,
        }
    }

    /// Returns up to `max` types, advancing the cursor. A short (possibly
    /// empty) batch means the snapshot is exhausted.
    pub fn next(&mut self, max: usize) -> Vec<MediaType> {
        let end = (self.cursor + max).min(self.snapshot.len());
        let batch = self.snapshot[self.cursor..end].to_vec();
        self.cursor = end;
        batch
    }

    /// Advances the cursor without producing values. Returns `false` when the
    /// skip ran past the end of the snapshot.
    pub fn skip(&mut self, count: usize) -> bool {
        let target = self.cursor + count;
        self.cursor = target.min(self.snapshot.len());
        target <= self.snapshot.len()
    }

    /// Re-snapshots the source pin's types and rewinds.
    pub fn reset(&mut self) {
        self.snapshot = self.source.supported_types();
        self.cursor = 0;
    }

    /// Number of types remaining in the current snapshot.
    pub fn remaining(&self) -> usize {
        self.snapshot.len() - self.cursor
    }
}

/// Allocator-lifecycle state shared by output pins.
///
/// Embed next to a [`PinBase`]; forward the `complete_connection`,
/// `connection_ended`, and `set_active` hooks here.
#[derive(Default)]
pub struct OutputPinBase {
    allocator: Mutex<Option<Arc<dyn SampleAllocator>>>,
}

impl OutputPinBase {
    /// Creates the embedded state with no allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// The allocator negotiated for the current connection.
    pub fn allocator(&self) -> Option<Arc<dyn SampleAllocator>> {
        self.allocator.lock().clone()
    }

    /// Negotiates the connection allocator with the input `peer`.
    ///
    /// Asks the peer for its requirements, falls back to a default pool when
    /// it declares none, and notifies the peer of the result. Any failure
    /// maps to [`PipelineError::NoTransport`]: the type was compatible but
    /// the connection has no viable transport.
    pub fn complete_connection(&self, peer: &Arc<dyn Pin>) -> Result<()> {
        let properties = peer.allocator_requirements().unwrap_or_default();
        let allocator =
            PoolAllocator::new(properties).map_err(|_| PipelineError::NoTransport)?;
        let granted = allocator.properties();
        let allocator: Arc<dyn SampleAllocator> = Arc::new(allocator);
        peer.notify_allocator(&allocator, granted)
            .map_err(|_| PipelineError::NoTransport)?;
        *self.allocator.lock() = Some(allocator);
        Ok(())
    }

    /// Decommits and releases the allocator at disconnect.
    pub fn connection_ended(&self) {
        if let Some(allocator) = self.allocator.lock().take()
            && let Err(err) = allocator.decommit()
        {
            tracing::warn!(%err, "allocator decommit failed on disconnect");
        }
    }

    /// Maps pin activation onto allocator commit/decommit.
    pub fn set_active(&self, active: bool) -> Result<()> {
        let allocator = self.allocator.lock().clone();
        match (active, allocator) {
            (true, Some(allocator)) => allocator.commit(),
            (true, None) => Err(PipelineError::NoAllocator),
            (false, Some(allocator)) => allocator.decommit(),
            (false, None) => Ok(()),
        }
    }
}

/// Receive-path state shared by input pins.
///
/// Embed next to a [`PinBase`]; call [`gate_receive`](Self::gate_receive)
/// at the top of the concrete pin's `receive`.
#[derive(Default)]
pub struct InputPinBase {
    state: Mutex<InputPinState>,
    allocator: Mutex<Option<Arc<dyn SampleAllocator>>>,
}

#[derive(Default)]
struct InputPinState {
    flushing: bool,
    error_latched: bool,
}

impl InputPinBase {
    /// Creates the embedded state: not flushing, no latched error.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the allocator the output side negotiated.
    pub fn set_allocator(&self, allocator: Arc<dyn SampleAllocator>) {
        *self.allocator.lock() = Some(allocator);
    }

    /// The connection allocator, if the output side has notified one.
    pub fn allocator(&self) -> Option<Arc<dyn SampleAllocator>> {
        self.allocator.lock().clone()
    }

    /// Enters or leaves the flushing state for this pin.
    pub fn set_flushing(&self, flushing: bool) {
        self.state.lock().flushing = flushing;
    }

    /// True once a fatal type mismatch has latched this pin.
    pub fn is_error_latched(&self) -> bool {
        self.state.lock().error_latched
    }

    /// Clears connection-scoped receive state at disconnect.
    pub fn connection_ended(&self) {
        let mut state = self.state.lock();
        state.flushing = false;
        state.error_latched = false;
        drop(state);
        *self.allocator.lock() = None;
    }

    /// Runs the receive contract for one sample.
    ///
    /// Fails with `WrongState` while the owning filter is stopped and with
    /// `RuntimeError` once the error state has latched; reports `Ignored`
    /// during a flush. A sample carrying a changed media type is re-validated
    /// against the pin's predicate: a rejected type latches the error state,
    /// invokes `on_abort` (the pin's local end-of-stream), notifies the
    /// filter's event sink with a fatal abort code, and fails the call.
    pub fn gate_receive(
        &self,
        pin: &dyn Pin,
        sample: &MediaSample,
        on_abort: impl FnOnce(),
    ) -> Result<ReceiveDisposition> {
        if pin.base().filter_state() == FilterState::Stopped {
            return Err(PipelineError::WrongState);
        }
        {
            let state = self.state.lock();
            if state.error_latched {
                return Err(PipelineError::RuntimeError);
            }
            if state.flushing {
                return Ok(ReceiveDisposition::Ignored);
            }
        }
        if let Some(changed) = &sample.media_type
            && !pin.is_media_type_supported(changed)
        {
            self.state.lock().error_latched = true;
            tracing::error!(pin = pin.base().name(), ty = %changed, "mid-stream type rejected");
            on_abort();
            if let Some(filter) = pin.base().owner()
                && let Err(err) =
                    filter.notify_event(crate::events::FilterEvent::ErrorAbort(
                        PipelineError::TypeNotAccepted,
                    ))
            {
                tracing::debug!(%err, "abort notification not delivered");
            }
            return Err(PipelineError::TypeNotAccepted);
        }
        Ok(ReceiveDisposition::Delivered)
    }
}
