//! Inference pipeline: Orchestrates ensemble scoring.
//!
//! This service coordinates:
//! - Feature contract validation of the whole batch
//! - Numeric standardization
//! - Scoring by both thresholded classifiers
//! - Ensemble combination and interpretation
//!
//! The pipeline only exists once a complete [`ModelBundle`] has been loaded,
//! and holds it read-only afterwards, so it can be shared across threads.

use std::num::NonZeroUsize;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{
    combine, encode, interpret_batch, EnsembleResult, FeatureVector, Interpretation, ModelScore,
    RawRecord, StandardScaler,
};
use crate::ports::{Classifier, ModelBundle, ModelRepository};
use crate::UrisenseError;

/// A classifier paired with its fixed decision threshold.
#[derive(Clone)]
pub struct ThresholdedModel {
    classifier: Arc<dyn Classifier>,
    threshold: f64,
}

impl ThresholdedModel {
    #[must_use]
    pub fn new(classifier: Arc<dyn Classifier>, threshold: f64) -> Self {
        Self {
            classifier,
            threshold,
        }
    }

    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score one vector.
    ///
    /// # Errors
    /// Returns `InvalidProbability` if the classifier leaves [0, 1].
    pub fn score(&self, features: &FeatureVector) -> Result<ModelScore, UrisenseError> {
        let name = self.classifier.name();
        let probability = self.classifier.predict_probability(features);
        if !(0.0..=1.0).contains(&probability) {
            return Err(UrisenseError::InvalidProbability {
                model: name.to_string(),
                value: probability,
            });
        }
        Ok(ModelScore::new(name, probability, self.threshold))
    }
}

impl std::fmt::Debug for ThresholdedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThresholdedModel")
            .field("classifier", &self.classifier.name())
            .field("threshold", &self.threshold)
            .finish()
    }
}

/// Scoring and interpretation of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub ensemble: EnsembleResult,
    pub interpretation: Interpretation,
}

/// Batch inference over the two-classifier ensemble.
#[derive(Debug, Clone)]
pub struct InferencePipeline {
    rf: ThresholdedModel,
    xgb: ThresholdedModel,
    scaler: StandardScaler,
}

impl InferencePipeline {
    /// Build a pipeline from a complete bundle.
    ///
    /// # Errors
    /// Returns `Configuration` if the thresholds are out of range.
    pub fn new(bundle: ModelBundle) -> Result<Self, UrisenseError> {
        bundle.thresholds.validate()?;
        Ok(Self {
            rf: ThresholdedModel::new(bundle.rf, bundle.thresholds.rf_threshold),
            xgb: ThresholdedModel::new(bundle.xgb, bundle.thresholds.xgb_threshold),
            scaler: bundle.scaler,
        })
    }

    /// Load every artifact from `repository` and build the pipeline.
    ///
    /// # Errors
    /// Returns `ModelLoad` if the repository fails; no pipeline is built.
    pub fn load<R: ModelRepository>(repository: &R) -> Result<Self, UrisenseError> {
        let bundle = repository
            .load_bundle()
            .map_err(|e| UrisenseError::ModelLoad(Box::new(e)))?;
        Self::new(bundle)
    }

    /// Validate and encode every record, then scale.
    ///
    /// Nothing is scaled until every record has passed the contract.
    ///
    /// # Errors
    /// Returns `InvalidRecord` for the first failing record.
    pub fn prepare(&self, records: &[RawRecord]) -> Result<Vec<FeatureVector>, UrisenseError> {
        let encoded = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                encode(record).map_err(|source| UrisenseError::InvalidRecord { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(encoded
            .into_iter()
            .map(|e| self.scaler.transform(e))
            .collect())
    }

    /// Score one prepared vector with both classifiers.
    ///
    /// # Errors
    /// Returns `InvalidProbability` if either classifier misbehaves.
    pub fn score(&self, features: &FeatureVector) -> Result<EnsembleResult, UrisenseError> {
        let rf = self.rf.score(features)?;
        let xgb = self.xgb.score(features)?;
        Ok(combine(rf, xgb))
    }

    /// Batch scoring. Output `i` belongs to input `i`.
    ///
    /// # Errors
    /// Fails without partial results on any invalid record or model output.
    pub fn predict(&self, records: &[RawRecord]) -> Result<Vec<EnsembleResult>, UrisenseError> {
        let vectors = self.prepare(records)?;
        let results = vectors
            .iter()
            .map(|v| self.score(v))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Scored {} records", results.len());
        Ok(results)
    }

    /// Same results as [`predict`](Self::predict), scored on up to `workers`
    /// threads in contiguous chunks.
    ///
    /// # Errors
    /// Same as `predict`. With several failing chunks, the earliest chunk's
    /// error is returned.
    pub fn predict_parallel(
        &self,
        records: &[RawRecord],
        workers: NonZeroUsize,
    ) -> Result<Vec<EnsembleResult>, UrisenseError> {
        let vectors = self.prepare(records)?;
        let workers = workers.get().min(vectors.len().max(1));
        if workers == 1 {
            return vectors.iter().map(|v| self.score(v)).collect();
        }

        let chunk_size = vectors.len().div_ceil(workers);
        let chunks: Vec<Result<Vec<EnsembleResult>, UrisenseError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = vectors
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || chunk.iter().map(|v| self.score(v)).collect::<Result<Vec<_>, _>>())
                })
                .collect();

            handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        Err(UrisenseError::Worker("scoring thread panicked".to_string()))
                    })
                })
                .collect()
        });

        let mut results = Vec::with_capacity(vectors.len());
        for chunk in chunks {
            results.extend(chunk?);
        }

        tracing::debug!("Scored {} records on {} threads", results.len(), workers);
        Ok(results)
    }

    /// Interpret a batch of results, one interpretation per result.
    #[must_use]
    pub fn interpret(&self, results: &[EnsembleResult]) -> Vec<Interpretation> {
        interpret_batch(results)
    }

    /// Predict and interpret in one step, carrying record ids through.
    ///
    /// # Errors
    /// Same as `predict`.
    pub fn assess(
        &self,
        records: &[RawRecord],
        workers: NonZeroUsize,
    ) -> Result<Vec<Assessment>, UrisenseError> {
        let results = self.predict_parallel(records, workers)?;
        let interpretations = interpret_batch(&results);

        let assessments: Vec<Assessment> = records
            .iter()
            .zip(results)
            .zip(interpretations)
            .map(|((record, ensemble), interpretation)| Assessment {
                id: record.id.clone(),
                ensemble,
                interpretation,
            })
            .collect();

        let positives = assessments
            .iter()
            .filter(|a| a.interpretation.final_prediction == 1)
            .count();
        tracing::info!(
            "Assessment complete: records={}, positive={}, disagreements={}",
            assessments.len(),
            positives,
            assessments.iter().filter(|a| !a.ensemble.agreement).count()
        );

        Ok(assessments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::artifacts::FileModelRepository;
    use crate::domain::features::tests::sample_record;
    use crate::domain::{
        ConfidenceTier, ContractError, DecisionThresholds, Recommendation, RawValue,
    };
    use std::path::Path;

    /// Returns a fixed probability regardless of input.
    struct Fixed(&'static str, f64);

    impl Classifier for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn predict_probability(&self, _features: &FeatureVector) -> f64 {
            self.1
        }
    }

    /// Probability driven by the scaled white cell count.
    struct WbcDriven;

    impl Classifier for WbcDriven {
        fn name(&self) -> &str {
            "wbc"
        }

        fn predict_probability(&self, features: &FeatureVector) -> f64 {
            let z = features.get(2).unwrap_or(0.0);
            1.0 / (1.0 + (-z).exp())
        }
    }

    fn identity_scaler() -> StandardScaler {
        StandardScaler::new([0.0; 4], [1.0; 4]).expect("identity")
    }

    fn pipeline(rf: f64, rf_t: f64, xgb: f64, xgb_t: f64) -> InferencePipeline {
        InferencePipeline::new(ModelBundle {
            rf: Arc::new(Fixed("rf", rf)),
            xgb: Arc::new(Fixed("xgb", xgb)),
            scaler: identity_scaler(),
            thresholds: DecisionThresholds {
                rf_threshold: rf_t,
                xgb_threshold: xgb_t,
            },
        })
        .expect("valid bundle")
    }

    fn workers(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).expect("non-zero")
    }

    #[test]
    fn test_confident_positive_scenario() {
        let p = pipeline(0.9, 0.5, 0.9, 0.5);
        let results = p.predict(&[sample_record()]).expect("predict");
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!((r.rf.decision, r.xgb.decision), (1, 1));
        assert!(r.agreement);
        assert!((r.probability - 0.9).abs() < 1e-12);
        assert!((r.confidence - 0.9).abs() < 1e-12);

        let i = &p.interpret(&results)[0];
        assert_eq!(i.final_prediction, 1);
        assert_eq!(i.confidence_tier, ConfidenceTier::High);
        assert_eq!(i.recommendation, Recommendation::ImmediateEvaluation);
    }

    #[test]
    fn test_disagreement_scenario() {
        let p = pipeline(0.7, 0.6, 0.3, 0.5);
        let results = p.predict(&[sample_record()]).expect("predict");
        let r = &results[0];
        assert!(!r.agreement);
        assert!((r.probability - 0.5).abs() < 1e-12);
        assert!((r.confidence - 0.5).abs() < 1e-12);
        assert_eq!(p.interpret(&results)[0].final_prediction, 1);
    }

    #[test]
    fn test_missing_feature_fails_whole_batch() {
        let p = pipeline(0.9, 0.5, 0.9, 0.5);
        let mut bad = sample_record();
        bad.remove("wbc");
        let err = p
            .predict(&[sample_record(), bad, sample_record()])
            .expect_err("record 1 invalid");
        match err {
            UrisenseError::InvalidRecord { index, source } => {
                assert_eq!(index, 1);
                assert_eq!(source, ContractError::MissingFeatures(vec!["wbc".into()]));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unrecognized_gender_fails() {
        let p = pipeline(0.9, 0.5, 0.9, 0.5);
        let err = p
            .predict(&[sample_record().with("gender", "X")])
            .expect_err("unknown gender");
        assert!(err.to_string().contains("\"X\""));
        assert!(matches!(
            err,
            UrisenseError::InvalidRecord {
                source: ContractError::UnrecognizedCategory { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_out_of_range_probability_rejected() {
        let p = pipeline(1.2, 0.5, 0.9, 0.5);
        let err = p.predict(&[sample_record()]).expect_err("bad model");
        assert!(matches!(err, UrisenseError::InvalidProbability { ref model, .. } if model == "rf"));

        let p = pipeline(f64::NAN, 0.5, 0.9, 0.5);
        assert!(p.predict(&[sample_record()]).is_err());
    }

    #[test]
    fn test_invalid_threshold_rejected_at_build() {
        let result = InferencePipeline::new(ModelBundle {
            rf: Arc::new(Fixed("rf", 0.5)),
            xgb: Arc::new(Fixed("xgb", 0.5)),
            scaler: identity_scaler(),
            thresholds: DecisionThresholds {
                rf_threshold: -0.1,
                xgb_threshold: 0.5,
            },
        });
        assert!(matches!(result, Err(UrisenseError::Configuration(_))));
    }

    #[test]
    fn test_predict_is_idempotent() {
        let p = pipeline(0.62, 0.55, 0.41, 0.45);
        let records = [sample_record()];
        assert_eq!(p.predict(&records).expect("first"), p.predict(&records).expect("second"));
    }

    fn varied_batch(n: usize) -> Vec<RawRecord> {
        (0..n)
            .map(|i| {
                sample_record()
                    .with("wbc", RawValue::Number(i as f64 - 10.0))
                    .with_id(format!("r{i}"))
            })
            .collect()
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let p = InferencePipeline::new(ModelBundle {
            rf: Arc::new(WbcDriven),
            xgb: Arc::new(Fixed("xgb", 0.4)),
            scaler: identity_scaler(),
            thresholds: DecisionThresholds {
                rf_threshold: 0.5,
                xgb_threshold: 0.5,
            },
        })
        .expect("valid");

        let records = varied_batch(23);
        let sequential = p.predict(&records).expect("sequential");
        for n in [1, 2, 4, 8, 64] {
            assert_eq!(p.predict_parallel(&records, workers(n)).expect("parallel"), sequential);
        }
        assert!(p.predict_parallel(&[], workers(4)).expect("empty").is_empty());
    }

    #[test]
    fn test_assess_keeps_ids_and_order() {
        let p = InferencePipeline::new(ModelBundle {
            rf: Arc::new(WbcDriven),
            xgb: Arc::new(WbcDriven),
            scaler: identity_scaler(),
            thresholds: DecisionThresholds {
                rf_threshold: 0.5,
                xgb_threshold: 0.5,
            },
        })
        .expect("valid");

        let records = varied_batch(5);
        let out = p.assess(&records, workers(3)).expect("assess");
        assert_eq!(out.len(), 5);
        for (i, a) in out.iter().enumerate() {
            assert_eq!(a.id.as_deref(), Some(format!("r{i}").as_str()));
        }
        // wbc -10 saturates the sigmoid towards 0
        assert_eq!(out[0].interpretation.final_prediction, 0);
        assert_eq!(out[0].interpretation.recommendation, Recommendation::LowProbability);
    }

    #[test]
    #[cfg(debug_assertions)]
    fn test_bundled_models_score_sample() {
        let repo = FileModelRepository::new(Path::new("models")).allow_unsigned(true);
        let p = InferencePipeline::load(&repo).expect("bundled models load");

        let negative = sample_record()
            .with("wbc", 2.0)
            .with("nitrites", 0)
            .with("leukocyte_esterase", 0)
            .with("bacteria", 0)
            .with("painful_urination", 0)
            .with("frequent_urination", 0)
            .with("cloudy_urine", 0)
            .with("urgent_urination", 0);

        let results = p.predict(&[sample_record(), negative]).expect("predict");
        for r in &results {
            assert!((0.0..=1.0).contains(&r.probability));
            assert!((0.0..=1.0).contains(&r.confidence));
        }
        assert!(results[0].probability > results[1].probability);
        assert_eq!(p.interpret(&results)[0].final_prediction, 1);
        assert_eq!(p.interpret(&results)[1].final_prediction, 0);
    }

    #[test]
    fn test_load_failure_builds_nothing() {
        let repo = FileModelRepository::new(Path::new("does-not-exist")).allow_unsigned(true);
        assert!(matches!(InferencePipeline::load(&repo), Err(UrisenseError::ModelLoad(_))));
    }
}
