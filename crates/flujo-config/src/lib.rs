//! Configuration for the flujo media pipeline bridge.
//!
//! This crate provides [`PipelineSettings`], a TOML-backed description of the
//! tunable parts of the pipeline: source request sizing, per-connection
//! allocator dimensions, and the sink's queue bound.
//!
//! # Example
//!
//! ```rust,no_run
//! use flujo_config::PipelineSettings;
//!
//! let settings = PipelineSettings::load("pipeline.toml").unwrap();
//! let allocator_properties: flujo_core::AllocatorProperties =
//!     settings.allocator.clone().into();
//! ```

mod error;
mod settings;

pub use error::ConfigError;
pub use settings::{AllocatorSettings, PipelineSettings, SinkSettings, SourceSettings};
