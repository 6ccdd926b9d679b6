//! Error types for pipeline operations.
//!
//! One taxonomy covers every component in the workspace: connection
//! negotiation, filter lifecycle transitions, async reads, and sample
//! scheduling all report failures through [`PipelineError`]. Soft conditions
//! (short reads, flush retirements) are deliberately *not* errors; they are
//! reported through [`crate::ReadOutcome`] instead.

/// Convenience result type using [`PipelineError`] as the error variant.
pub type Result<T> = core::result::Result<T, PipelineError>;

/// Errors that can occur across the pipeline bridge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// An argument was null-equivalent, out of range, or otherwise garbled.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The operation is illegal in the component's current lifecycle state.
    ///
    /// Also used as the retirement status for requests cancelled by a flush:
    /// a flushed wait or a rejected offer reports `WrongState`, never
    /// [`RuntimeError`](Self::RuntimeError).
    #[error("operation illegal in the current state")]
    WrongState,

    /// The pin already has a peer.
    #[error("pin is already connected")]
    AlreadyConnected,

    /// The pin has no peer.
    #[error("pin is not connected")]
    NotConnected,

    /// Both endpoints report the same direction.
    #[error("pins have the same direction")]
    InvalidDirection,

    /// The negotiation predicate rejected the candidate media type.
    #[error("media type not accepted")]
    TypeNotAccepted,

    /// The media type was acceptable but no viable allocator/transport was
    /// found for the connection.
    #[error("no viable transport for the connection")]
    NoTransport,

    /// Activation was requested on an output pin that never obtained an
    /// allocator.
    #[error("no allocator for the connection")]
    NoAllocator,

    /// A bounded wait expired before the condition was met.
    #[error("timed out")]
    Timeout,

    /// Buffer or sample allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    /// A latched fatal condition; the pipeline must be torn down.
    #[error("fatal runtime error")]
    RuntimeError,

    /// The capability or operation is deliberately unsupported.
    #[error("not implemented")]
    NotImplemented,

    /// The object does not expose the queried capability.
    #[error("no such interface")]
    NoSuchInterface,
}

impl PipelineError {
    /// Negotiation keeps the most specific error seen across fallback
    /// attempts: `NoTransport` over `TypeNotAccepted` over everything else.
    pub(crate) fn specificity(&self) -> u8 {
        match self {
            Self::NoTransport => 2,
            Self::TypeNotAccepted => 1,
            _ => 0,
        }
    }

    /// Returns the more specific of two negotiation failures.
    pub(crate) fn prefer(self, other: Self) -> Self {
        if other.specificity() > self.specificity() {
            other
        } else {
            self
        }
    }
}
