//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! batch scoring and interpretation.

mod pipeline;

pub use pipeline::{Assessment, InferencePipeline, ThresholdedModel};
