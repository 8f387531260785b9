//! Domain layer: Core inference types and logic.
//!
//! Pure Rust types with no I/O. Everything here is a deterministic function
//! of its inputs and the fitted parameters passed in.

pub mod ensemble;
pub mod features;
pub mod interpretation;
pub mod scaler;

pub use ensemble::{combine, DecisionThresholds, EnsembleResult, ModelScore};
pub use features::{
    encode, ContractError, EncodedRecord, FeatureVector, Gender, RawRecord, RawValue,
    FEATURE_ORDER, NUMERIC_FEATURES, NUM_FEATURES,
};
pub use interpretation::{
    interpret, interpret_batch, Agreement, ConfidenceTier, Interpretation, Recommendation,
};
pub use scaler::{ConfigurationError, ScalerParams, StandardScaler};
