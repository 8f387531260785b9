//! Model repository port: loads every artifact inference depends on.

use std::sync::Arc;

use super::Classifier;
use crate::domain::{DecisionThresholds, StandardScaler};

/// Everything a pipeline needs, loaded together.
///
/// A bundle is either complete or not produced at all.
#[derive(Clone)]
pub struct ModelBundle {
    pub rf: Arc<dyn Classifier>,
    pub xgb: Arc<dyn Classifier>,
    pub scaler: StandardScaler,
    pub thresholds: DecisionThresholds,
}

impl std::fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBundle")
            .field("rf", &self.rf.name())
            .field("xgb", &self.xgb.name())
            .field("scaler", &self.scaler)
            .field("thresholds", &self.thresholds)
            .finish()
    }
}

/// Trait for loading model artifacts.
pub trait ModelRepository: Send + Sync {
    /// Error type for load failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load and validate the full bundle.
    ///
    /// # Errors
    /// Returns an error if any artifact is missing, corrupt or inconsistent.
    fn load_bundle(&self) -> Result<ModelBundle, Self::Error>;
}
