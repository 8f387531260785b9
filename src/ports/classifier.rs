//! Classifier port: the only capability the ensemble needs from a model.

use crate::domain::FeatureVector;

/// A fitted binary classifier.
///
/// Implementations are opaque to the pipeline; it never inspects how the
/// probability is produced. They are shared read-only across threads once
/// loaded.
pub trait Classifier: Send + Sync {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &str;

    /// Probability of the positive class for a scaled feature vector.
    ///
    /// Expected to lie in [0, 1]. The pipeline rejects anything else.
    fn predict_probability(&self, features: &FeatureVector) -> f64;
}
