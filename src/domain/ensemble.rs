//! Two-model ensemble scoring.
//!
//! Each classifier is first thresholded at its own training-time cut-off.
//! The ensemble probability is the plain mean of both probabilities, and the
//! confidence score rewards agreement between the two decisions while capping
//! it at 0.5 when they disagree.

use serde::{Deserialize, Serialize};

use super::scaler::ConfigurationError;

/// Per-classifier decision thresholds (`thresholds.json`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionThresholds {
    /// Threshold for the random forest classifier.
    pub rf_threshold: f64,
    /// Threshold for the gradient boosted classifier.
    pub xgb_threshold: f64,
}

impl DecisionThresholds {
    /// # Errors
    /// Returns `ConfigurationError` unless both thresholds lie in [0, 1].
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, t) in [("rf_threshold", self.rf_threshold), ("xgb_threshold", self.xgb_threshold)] {
            if !(0.0..=1.0).contains(&t) {
                return Err(ConfigurationError(format!(
                    "{name} must be within [0, 1] (got {t})"
                )));
            }
        }
        Ok(())
    }
}

/// One classifier's output for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    pub model: String,
    pub probability: f64,
    pub threshold: f64,
    /// 1 if `probability >= threshold`, else 0.
    pub decision: u8,
}

impl ModelScore {
    #[must_use]
    pub fn new(model: impl Into<String>, probability: f64, threshold: f64) -> Self {
        Self {
            model: model.into(),
            probability,
            threshold,
            decision: u8::from(probability >= threshold),
        }
    }
}

/// Combined output of both classifiers for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleResult {
    pub rf: ModelScore,
    pub xgb: ModelScore,
    /// Arithmetic mean of both probabilities.
    pub probability: f64,
    /// Both thresholded decisions are equal.
    pub agreement: bool,
    pub confidence: f64,
}

/// Combine two model scores.
#[must_use]
pub fn combine(rf: ModelScore, xgb: ModelScore) -> EnsembleResult {
    let probability = (rf.probability + xgb.probability) / 2.0;
    let agreement = rf.decision == xgb.decision;
    let distance = probability.max(1.0 - probability);
    let confidence = if agreement {
        distance
    } else {
        probability.min(1.0 - probability)
    };

    EnsembleResult {
        rf,
        xgb,
        probability,
        agreement,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(rf: f64, rf_t: f64, xgb: f64, xgb_t: f64) -> EnsembleResult {
        combine(ModelScore::new("rf", rf, rf_t), ModelScore::new("xgb", xgb, xgb_t))
    }

    #[test]
    fn test_both_confident_positive() {
        let r = pair(0.9, 0.5, 0.9, 0.5);
        assert_eq!(r.rf.decision, 1);
        assert_eq!(r.xgb.decision, 1);
        assert!(r.agreement);
        assert!((r.probability - 0.9).abs() < 1e-12);
        assert!((r.confidence - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_disagreement_uses_own_thresholds() {
        let r = pair(0.7, 0.6, 0.3, 0.5);
        assert_eq!(r.rf.decision, 1);
        assert_eq!(r.xgb.decision, 0);
        assert!(!r.agreement);
        assert!((r.probability - 0.5).abs() < 1e-12);
        assert!((r.confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert_eq!(ModelScore::new("rf", 0.42, 0.42).decision, 1);
        assert_eq!(ModelScore::new("rf", 0.4199, 0.42).decision, 0);
    }

    #[test]
    fn test_agreement_on_negative() {
        let r = pair(0.1, 0.5, 0.3, 0.5);
        assert!(r.agreement);
        assert!((r.probability - 0.2).abs() < 1e-12);
        assert!((r.confidence - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_mean_and_confidence_bounds_over_grid() {
        let steps: Vec<f64> = (0..=20).map(|i| f64::from(i) / 20.0).collect();
        for &a in &steps {
            for &b in &steps {
                for &(ta, tb) in &[(0.5, 0.5), (0.3, 0.7), (0.65, 0.2)] {
                    let r = pair(a, ta, b, tb);
                    assert!((r.probability - (a + b) / 2.0).abs() < 1e-12);
                    if r.agreement {
                        if (r.probability - 0.5).abs() > 1e-12 {
                            assert!(r.confidence >= 0.5, "agree {a} {b}");
                        }
                    } else {
                        assert!(r.confidence <= 0.5, "disagree {a} {b}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_threshold_validation() {
        assert!(DecisionThresholds { rf_threshold: 0.4, xgb_threshold: 0.6 }.validate().is_ok());
        assert!(DecisionThresholds { rf_threshold: 1.2, xgb_threshold: 0.6 }.validate().is_err());
        assert!(DecisionThresholds { rf_threshold: 0.4, xgb_threshold: f64::NAN }.validate().is_err());
    }
}
