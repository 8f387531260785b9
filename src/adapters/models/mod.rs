//! Exported classifier artifacts.
//!
//! Classifiers are trained offline and exported as JSON. Three model families
//! are supported, selected by the `kind` tag:
//!
//! - `logistic`: linear model, `sigmoid(w . x + b)`
//! - `random_forest`: averaged decision trees whose leaves hold the
//!   positive-class probability; splits go left when `x <= threshold`
//! - `gradient_boosting`: summed regression trees on the logit scale plus a
//!   base margin; splits go left when `x < threshold`
//!
//! Every artifact declares its `feature_names`, which must equal the
//! canonical feature order. Trees are checked at load time so that
//! evaluation can never index out of bounds or loop.

use serde::{Deserialize, Serialize};

use crate::domain::{FeatureVector, FEATURE_ORDER, NUM_FEATURES};
use crate::ports::Classifier;

/// Error type for classifier artifacts that fail validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid classifier artifact: {0}")]
pub struct ModelFormatError(pub String);

/// A single flattened tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// A decision tree stored as a flat node array, root at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

/// Which way a split compares its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitRule {
    LessOrEqual,
    LessThan,
}

impl DecisionTree {
    fn validate(&self, tree: usize) -> Result<(), ModelFormatError> {
        if self.nodes.is_empty() {
            return Err(ModelFormatError(format!("tree {tree} has no nodes")));
        }
        let n = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= NUM_FEATURES {
                        return Err(ModelFormatError(format!(
                            "tree {tree} node {i}: feature index {feature} out of range"
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(ModelFormatError(format!(
                            "tree {tree} node {i}: threshold is not finite"
                        )));
                    }
                    // Children must come after their parent: guarantees termination.
                    for child in [*left, *right] {
                        if child <= i || child >= n {
                            return Err(ModelFormatError(format!(
                                "tree {tree} node {i}: child index {child} invalid"
                            )));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(ModelFormatError(format!(
                            "tree {tree} node {i}: leaf value is not finite"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn leaf_value(&self, x: &FeatureVector, rule: SplitRule) -> f64 {
        let values = x.as_slice();
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = values[*feature];
                    let go_left = match rule {
                        SplitRule::LessOrEqual => v <= *threshold,
                        SplitRule::LessThan => v < *threshold,
                    };
                    idx = if go_left { *left } else { *right };
                }
            }
        }
    }
}

/// Serialized classifier, tagged by model family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportedClassifier {
    Logistic {
        feature_names: Vec<String>,
        coefficients: Vec<f64>,
        intercept: f64,
    },
    RandomForest {
        feature_names: Vec<String>,
        trees: Vec<DecisionTree>,
    },
    GradientBoosting {
        feature_names: Vec<String>,
        #[serde(default)]
        base_margin: f64,
        trees: Vec<DecisionTree>,
    },
}

impl ExportedClassifier {
    fn feature_names(&self) -> &[String] {
        match self {
            Self::Logistic { feature_names, .. }
            | Self::RandomForest { feature_names, .. }
            | Self::GradientBoosting { feature_names, .. } => feature_names,
        }
    }

    /// Check the artifact against the feature contract and its own shape.
    ///
    /// # Errors
    /// Returns `ModelFormatError` describing the first problem found.
    pub fn validate(&self) -> Result<(), ModelFormatError> {
        let names = self.feature_names();
        if names.iter().map(String::as_str).ne(FEATURE_ORDER.iter().copied()) {
            return Err(ModelFormatError(format!(
                "feature_names do not match the expected {NUM_FEATURES}-column order"
            )));
        }

        match self {
            Self::Logistic {
                coefficients,
                intercept,
                ..
            } => {
                if coefficients.len() != NUM_FEATURES {
                    return Err(ModelFormatError(format!(
                        "expected {NUM_FEATURES} coefficients, got {}",
                        coefficients.len()
                    )));
                }
                if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
                    return Err(ModelFormatError("non-finite linear parameter".into()));
                }
            }
            Self::RandomForest { trees, .. } => {
                if trees.is_empty() {
                    return Err(ModelFormatError("random forest has no trees".into()));
                }
                for (t, tree) in trees.iter().enumerate() {
                    tree.validate(t)?;
                    let bad_leaf = tree.nodes.iter().any(|n| {
                        matches!(n, TreeNode::Leaf { value } if !(0.0..=1.0).contains(value))
                    });
                    if bad_leaf {
                        return Err(ModelFormatError(format!(
                            "tree {t}: random forest leaves must be probabilities"
                        )));
                    }
                }
            }
            Self::GradientBoosting {
                base_margin, trees, ..
            } => {
                if trees.is_empty() {
                    return Err(ModelFormatError("gradient boosting has no trees".into()));
                }
                if !base_margin.is_finite() {
                    return Err(ModelFormatError("base_margin is not finite".into()));
                }
                for (t, tree) in trees.iter().enumerate() {
                    tree.validate(t)?;
                }
            }
        }
        Ok(())
    }

    fn family(&self) -> &'static str {
        match self {
            Self::Logistic { .. } => "logistic",
            Self::RandomForest { .. } => "random_forest",
            Self::GradientBoosting { .. } => "gradient_boosting",
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// A validated classifier artifact, ready to score.
#[derive(Debug, Clone)]
pub struct JsonClassifier {
    name: String,
    model: ExportedClassifier,
}

impl JsonClassifier {
    /// # Errors
    /// Returns `ModelFormatError` if the artifact does not validate.
    pub fn new(name: impl Into<String>, model: ExportedClassifier) -> Result<Self, ModelFormatError> {
        model.validate()?;
        let name = name.into();
        tracing::debug!("Classifier `{}` ready ({})", name, model.family());
        Ok(Self { name, model })
    }

    /// Parse and validate a JSON artifact.
    ///
    /// # Errors
    /// Returns `ModelFormatError` on malformed JSON or a failed validation.
    pub fn from_json(name: impl Into<String>, json: &[u8]) -> Result<Self, ModelFormatError> {
        let model: ExportedClassifier = serde_json::from_slice(json)
            .map_err(|e| ModelFormatError(format!("malformed JSON: {e}")))?;
        Self::new(name, model)
    }

    #[must_use]
    pub fn model(&self) -> &ExportedClassifier {
        &self.model
    }
}

impl Classifier for JsonClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict_probability(&self, features: &FeatureVector) -> f64 {
        match &self.model {
            ExportedClassifier::Logistic {
                coefficients,
                intercept,
                ..
            } => {
                let z = coefficients
                    .iter()
                    .zip(features.as_slice())
                    .fold(*intercept, |acc, (w, x)| acc + w * x);
                sigmoid(z)
            }
            ExportedClassifier::RandomForest { trees, .. } => {
                let total: f64 = trees
                    .iter()
                    .map(|t| t.leaf_value(features, SplitRule::LessOrEqual))
                    .sum();
                total / trees.len() as f64
            }
            ExportedClassifier::GradientBoosting {
                base_margin, trees, ..
            } => {
                let margin = trees
                    .iter()
                    .map(|t| t.leaf_value(features, SplitRule::LessThan))
                    .fold(*base_margin, |acc, v| acc + v);
                sigmoid(margin)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{encode, StandardScaler};
    use crate::domain::features::tests::sample_record;

    fn names() -> Vec<String> {
        FEATURE_ORDER.iter().map(|s| (*s).to_string()).collect()
    }

    fn vector() -> FeatureVector {
        let scaler = StandardScaler::new([0.0; 4], [1.0; 4]).expect("identity");
        scaler.transform(encode(&sample_record()).expect("valid"))
    }

    /// Splits on nitrites (index 12) at 1.0: exactly on the threshold.
    fn stump(left: f64, right: f64) -> DecisionTree {
        DecisionTree {
            nodes: vec![
                TreeNode::Split {
                    feature: 12,
                    threshold: 1.0,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: left },
                TreeNode::Leaf { value: right },
            ],
        }
    }

    #[test]
    fn test_logistic_probability() {
        let mut coefficients = vec![0.0; NUM_FEATURES];
        coefficients[12] = 2.0;
        let clf = JsonClassifier::new(
            "lr",
            ExportedClassifier::Logistic {
                feature_names: names(),
                coefficients,
                intercept: -2.0,
            },
        )
        .expect("valid");
        // nitrites = 1 => z = 0
        assert!((clf.predict_probability(&vector()) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_random_forest_split_is_inclusive() {
        let clf = JsonClassifier::new(
            "rf",
            ExportedClassifier::RandomForest {
                feature_names: names(),
                trees: vec![stump(0.8, 0.1), stump(0.6, 0.0)],
            },
        )
        .expect("valid");
        assert!((clf.predict_probability(&vector()) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_gradient_boosting_split_is_strict() {
        let clf = JsonClassifier::new(
            "xgb",
            ExportedClassifier::GradientBoosting {
                feature_names: names(),
                base_margin: 0.5,
                trees: vec![stump(-3.0, 1.0), stump(-3.0, -0.5)],
            },
        )
        .expect("valid");
        // Both trees go right: 0.5 + 1.0 - 0.5 = 1.0
        let expected = 1.0 / (1.0 + (-1.0f64).exp());
        assert!((clf.predict_probability(&vector()) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_cyclic_tree() {
        let tree = DecisionTree {
            nodes: vec![
                TreeNode::Split {
                    feature: 0,
                    threshold: 0.0,
                    left: 1,
                    right: 0,
                },
                TreeNode::Leaf { value: 0.5 },
            ],
        };
        let err = JsonClassifier::new(
            "rf",
            ExportedClassifier::RandomForest {
                feature_names: names(),
                trees: vec![tree],
            },
        )
        .expect_err("cycle");
        assert!(err.to_string().contains("child index"));
    }

    #[test]
    fn test_rejects_wrong_feature_order() {
        let mut feature_names = names();
        feature_names.swap(0, 1);
        let result = JsonClassifier::new(
            "lr",
            ExportedClassifier::Logistic {
                feature_names,
                coefficients: vec![0.0; NUM_FEATURES],
                intercept: 0.0,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_non_probability_forest_leaf() {
        let result = JsonClassifier::new(
            "rf",
            ExportedClassifier::RandomForest {
                feature_names: names(),
                trees: vec![stump(1.5, 0.0)],
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_from_json() {
        let json = serde_json::json!({
            "kind": "gradient_boosting",
            "feature_names": names(),
            "trees": [
                { "nodes": [
                    { "feature": 2, "threshold": 0.0, "left": 1, "right": 2 },
                    { "value": -1.0 },
                    { "value": 1.0 }
                ]}
            ]
        });
        let bytes = serde_json::to_vec(&json).expect("serialize");
        let clf = JsonClassifier::from_json("xgb", &bytes).expect("valid");
        assert_eq!(clf.name(), "xgb");
        // wbc = 25 > 0 => right leaf, margin 1.0
        assert!(clf.predict_probability(&vector()) > 0.5);

        assert!(JsonClassifier::from_json("xgb", b"{\"kind\":\"svm\"}").is_err());
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert!(sigmoid(-800.0) >= 0.0);
        assert!(sigmoid(800.0) <= 1.0);
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-15);
    }
}
