//! Ports layer: Trait definitions for external collaborators.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the inference logic and the trained models it depends on.

mod classifier;
mod model_repository;

pub use classifier::Classifier;
pub use model_repository::{ModelBundle, ModelRepository};
