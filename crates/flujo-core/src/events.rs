//! Lifecycle and error notifications toward the owning graph.

use crate::capability::MediaObject;
use crate::error::{PipelineError, Result};

/// Notifications a filter raises toward the graph host.
///
/// This channel is the only externally observable failure signal of the
/// pipeline core; there is no user-facing surface at this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FilterEvent {
    /// Fatal condition; the graph is expected to tear the pipeline down.
    ErrorAbort(PipelineError),
    /// A filter has seen the end of its stream.
    EndOfStream,
    /// Progressive-download progress, in percent of the total length.
    BufferingProgress(u8),
}

/// Receiver for [`FilterEvent`] notifications.
///
/// Queried from the graph host by capability id whenever a filter joins a
/// graph; a filter with no graph has no sink and silently drops events.
pub trait EventSink: Send + Sync {
    /// Delivers one event. Failures are logged by the caller, never escalated.
    fn notify(&self, event: FilterEvent) -> Result<()>;
}

/// The host that owns the filter graph.
///
/// External collaborator: it instantiates filters, wires pins together, and
/// drives the lifecycle. The core only ever queries it for capabilities
/// (notably [`CapabilityId::EventSink`](crate::CapabilityId::EventSink)).
pub trait GraphHost: MediaObject {}
