//! Flujo Core - graph-object model for the media pipeline bridge
//!
//! This crate provides the foundational building blocks shared by every node
//! of a pull-mode, clock-synchronized streaming filter graph.
//!
//! # Core Abstractions
//!
//! ## Capability Dispatch
//!
//! - [`MediaObject`] - Base trait: typed role lookup by [`CapabilityId`]
//! - [`Capability`] - Owned, typed view of one role of an object
//!
//! ## Stream Shape
//!
//! - [`MediaType`] - Value type describing a stream (major kind, subtype,
//!   owned format blob), with wildcard-aware matching for negotiation
//! - [`PixelFormat`] - Presentation pixel layouts
//!
//! ## Connection Endpoints
//!
//! - [`Pin`] - The negotiation protocol as provided trait methods
//! - [`OutputPinBase`] / [`InputPinBase`] - Embeddable allocator-lifecycle
//!   and receive-contract state for the two pin specializations
//! - [`MediaTypeEnumerator`] - Restartable snapshot cursor over preferred types
//!
//! ## Graph Nodes
//!
//! - [`Filter`] / [`FilterCore`] - Lifecycle state machine
//!   (`Stopped`/`Paused`/`Running`) forwarding activation to connected pins
//! - [`EventSink`] / [`FilterEvent`] - The notification channel toward the
//!   owning graph, the core's only externally observable failure signal
//!
//! ## Buffers and Time
//!
//! - [`SampleAllocator`] / [`PoolAllocator`] - Per-connection recycling
//!   buffer pools with commit/decommit lifecycle
//! - [`MediaSample`] / [`TimedSample`] - The refcounted payload units
//! - [`ReferenceClock`] / [`SystemClock`] - Monotonic pacing time base
//! - [`ByteRangeReader`] - The pull-mode async read contract implemented by
//!   source pins
//!
//! # Design Principles
//!
//! - **Explicit ownership**: filters own pins; peers and graphs are weak or
//!   released-on-disconnect handles, never ambient pointers
//! - **One mutex + condvar pair per component**: no lock-free paths
//! - **Flush is not an error**: cancellations report a clean wrong-state
//!   status, reserved error codes mean real failures

pub mod allocator;
pub mod capability;
pub mod clock;
pub mod error;
pub mod events;
pub mod filter;
pub mod media_type;
pub mod pin;
pub mod request;
pub mod sample;

pub use allocator::{AllocatorProperties, PoolAllocator, SampleAllocator};
pub use capability::{Capability, CapabilityId, MediaObject};
pub use clock::{ReferenceClock, SystemClock};
pub use error::{PipelineError, Result};
pub use events::{EventSink, FilterEvent, GraphHost};
pub use filter::{Filter, FilterCore, FilterState};
pub use media_type::{MajorKind, MediaType, PixelFormat, SubKind};
pub use pin::{
    InputPinBase, MediaTypeEnumerator, OutputPinBase, Pin, PinBase, PinDirection,
    ReceiveDisposition,
};
pub use request::{ByteRangeReader, CompletedRequest, ReadOutcome, StreamLength};
pub use sample::{MediaSample, TimedSample};
