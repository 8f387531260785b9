//! Adapters layer: Concrete implementations of ports.
//!
//! - `models`: JSON-exported classifiers
//! - `artifacts`: signed model artifact directory
//! - `sanitize`: PII filtering for logs

pub mod artifacts;
pub mod models;
pub mod sanitize;

pub use artifacts::{ArtifactError, FileModelRepository};
pub use models::JsonClassifier;
