//! # Urisense
//!
//! Ensemble inference for urinary tract infection risk.
//!
//! Two independently trained classifiers score each patient record; their
//! probabilities are combined into an ensemble probability, an agreement
//! flag and a confidence score, which are then mapped to a final call and a
//! clinical recommendation.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Feature contract, scaler, ensemble and interpretation logic
//! - `ports`: Trait definitions for classifiers and artifact loading
//! - `adapters`: JSON classifiers, signed artifact directory, log sanitizing
//! - `application`: The inference pipeline orchestrating domain and ports
//! - `config`: Environment-driven runtime settings

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use application::{Assessment, InferencePipeline};
pub use domain::{EnsembleResult, Interpretation, RawRecord};

/// Result type for Urisense operations
pub type Result<T> = std::result::Result<T, UrisenseError>;

/// Main error type for Urisense
#[derive(Debug, thiserror::Error)]
pub enum UrisenseError {
    #[error("record {index}: {source}")]
    InvalidRecord {
        index: usize,
        #[source]
        source: domain::ContractError,
    },

    #[error(transparent)]
    Configuration(#[from] domain::ConfigurationError),

    #[error("model artifacts failed to load: {0}")]
    ModelLoad(Box<dyn std::error::Error + Send + Sync>),

    #[error("classifier `{model}` returned invalid probability {value}")]
    InvalidProbability { model: String, value: f64 },

    #[error("scoring worker failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
