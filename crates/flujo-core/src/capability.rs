//! Capability dispatch: one object, several role interfaces.
//!
//! Graph objects expose their roles through a tagged capability query rather
//! than downcasting. Asking for a [`CapabilityId`] the object supports yields
//! an owned, typed view (the returned `Arc` keeps the object alive); unknown
//! ids fail with [`PipelineError::NoSuchInterface`] and never widen access.
//! Every object answers the [`Identity`](CapabilityId::Identity) id.

use std::sync::Arc;

use crate::clock::ReferenceClock;
use crate::error::{PipelineError, Result};
use crate::events::EventSink;
use crate::filter::Filter;
use crate::pin::Pin;
use crate::request::ByteRangeReader;

/// Tags naming the role interfaces an object may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CapabilityId {
    /// The base object view; supported by every object.
    Identity,
    /// A connection endpoint of a graph node.
    Pin,
    /// A graph node with a lifecycle state.
    Filter,
    /// Receiver for lifecycle/error notifications.
    EventSink,
    /// Pull-mode async byte-range reading service.
    ByteReader,
    /// A monotonic time base.
    Clock,
}

/// A typed view of an object, returned by a successful capability query.
#[non_exhaustive]
pub enum Capability {
    /// The base object view.
    Identity(Arc<dyn MediaObject>),
    /// The pin role.
    Pin(Arc<dyn Pin>),
    /// The filter role.
    Filter(Arc<dyn Filter>),
    /// The event-sink role.
    EventSink(Arc<dyn EventSink>),
    /// The async byte-range reader role.
    ByteReader(Arc<dyn ByteRangeReader>),
    /// The reference-clock role.
    Clock(Arc<dyn ReferenceClock>),
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let role = match self {
            Self::Identity(_) => "Identity",
            Self::Pin(_) => "Pin",
            Self::Filter(_) => "Filter",
            Self::EventSink(_) => "EventSink",
            Self::ByteReader(_) => "ByteReader",
            Self::Clock(_) => "Clock",
        };
        f.debug_tuple("Capability").field(&role).finish()
    }
}

impl Capability {
    /// Unwraps the event-sink view, failing if the query returned another role.
    pub fn into_event_sink(self) -> Result<Arc<dyn EventSink>> {
        match self {
            Self::EventSink(sink) => Ok(sink),
            _ => Err(PipelineError::NoSuchInterface),
        }
    }

    /// Unwraps the byte-reader view, failing if the query returned another role.
    pub fn into_byte_reader(self) -> Result<Arc<dyn ByteRangeReader>> {
        match self {
            Self::ByteReader(reader) => Ok(reader),
            _ => Err(PipelineError::NoSuchInterface),
        }
    }
}

/// Base trait of every graph object.
///
/// Implementations answer [`CapabilityId::Identity`] with themselves and each
/// role id they genuinely implement; everything else is
/// [`PipelineError::NoSuchInterface`].
pub trait MediaObject: Send + Sync {
    /// Looks up a typed role view by capability id.
    fn query_capability(&self, id: CapabilityId) -> Result<Capability>;
}
