//! Clinical interpretation of ensemble output.
//!
//! Turns the ensemble probability and confidence score into a final call,
//! a confidence tier and a recommendation.

use serde::{Deserialize, Serialize};

use super::ensemble::EnsembleResult;

/// Fixed cut-off for the final call on the ensemble probability.
pub const DECISION_CUTOFF: f64 = 0.5;

/// Lower bound (inclusive) of the high confidence tier.
pub const HIGH_CONFIDENCE: f64 = 0.8;

/// Lower bound (inclusive) of the medium confidence tier.
pub const MEDIUM_CONFIDENCE: f64 = 0.6;

/// Discretized confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    /// Confidence of at least 0.8
    High,
    /// Confidence in [0.6, 0.8)
    Medium,
    /// Confidence below 0.6, always the case on disagreement
    Low,
}

impl ConfidenceTier {
    #[must_use]
    pub fn from_score(confidence: f64) -> Self {
        if confidence >= HIGH_CONFIDENCE {
            Self::High
        } else if confidence >= MEDIUM_CONFIDENCE {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

/// Whether both classifiers reached the same thresholded decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Agreement {
    /// Both thresholded decisions match
    Agree,
    /// The classifiers reached opposite decisions
    Disagree,
}

impl Agreement {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Agree => "Models agree",
            Self::Disagree => "Models disagree",
        }
    }
}

/// Recommended follow-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Positive call, high confidence
    ImmediateEvaluation,
    /// Positive call, medium confidence
    #[serde(rename = "evaluate_within_24_hours")]
    EvaluateWithin24Hours,
    /// Positive call, low confidence
    MonitorSymptoms,
    /// Negative call, high confidence
    LowProbability,
    /// Negative call, medium or low confidence
    NotRuledOut,
}

impl Recommendation {
    /// Decision table over the final call and the confidence tier.
    #[must_use]
    pub fn select(final_prediction: u8, tier: ConfidenceTier) -> Self {
        match (final_prediction, tier) {
            (1, ConfidenceTier::High) => Self::ImmediateEvaluation,
            (1, ConfidenceTier::Medium) => Self::EvaluateWithin24Hours,
            (1, ConfidenceTier::Low) => Self::MonitorSymptoms,
            (_, ConfidenceTier::High) => Self::LowProbability,
            (_, _) => Self::NotRuledOut,
        }
    }

    #[must_use]
    pub fn text(&self) -> &'static str {
        match self {
            Self::ImmediateEvaluation => {
                "High likelihood of UTI: immediate clinical evaluation recommended"
            }
            Self::EvaluateWithin24Hours => {
                "Likely UTI: clinical evaluation recommended within 24 hours"
            }
            Self::MonitorSymptoms => {
                "Possible UTI: monitor symptoms and seek evaluation if symptoms persist"
            }
            Self::LowProbability => "Low probability of UTI: monitor for symptom changes",
            Self::NotRuledOut => {
                "UTI unlikely but not ruled out: monitor and seek evaluation if symptoms worsen"
            }
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.text())
    }
}

/// Interpretation of one ensemble result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    /// 1 = UTI likely, 0 = UTI unlikely.
    pub final_prediction: u8,
    pub confidence_tier: ConfidenceTier,
    pub agreement: Agreement,
    /// Ensemble probability.
    pub probability: f64,
    pub confidence: f64,
    pub recommendation: Recommendation,
}

impl Interpretation {
    #[must_use]
    pub fn agreement_label(&self) -> &'static str {
        self.agreement.label()
    }

    #[must_use]
    pub fn recommendation_text(&self) -> &'static str {
        self.recommendation.text()
    }
}

#[must_use]
pub fn interpret(result: &EnsembleResult) -> Interpretation {
    let final_prediction = u8::from(result.probability >= DECISION_CUTOFF);
    let confidence_tier = ConfidenceTier::from_score(result.confidence);
    let agreement = if result.agreement {
        Agreement::Agree
    } else {
        Agreement::Disagree
    };

    Interpretation {
        final_prediction,
        confidence_tier,
        agreement,
        probability: result.probability,
        confidence: result.confidence,
        recommendation: Recommendation::select(final_prediction, confidence_tier),
    }
}

/// One interpretation per result, in input order.
#[must_use]
pub fn interpret_batch(results: &[EnsembleResult]) -> Vec<Interpretation> {
    results.iter().map(interpret).collect()
}
