//! Standard-score scaler for the continuous columns.
//!
//! The parameters are fitted offline and only ever read here.

use serde::{Deserialize, Serialize};

use super::features::{EncodedRecord, FeatureVector, NUMERIC_FEATURES, NUM_NUMERIC};

/// Error type for model configuration that cannot be used for inference.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigurationError(pub String);

/// Serialized scaler parameters (`scaler.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalerParams {
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    pub mean: Vec<f64>,
    /// Per-feature standard deviation.
    #[serde(alias = "std")]
    pub scale: Vec<f64>,
}

/// Pre-fitted `(x - mean) / std` transform over the 4 numeric columns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardScaler {
    mean: [f64; NUM_NUMERIC],
    std: [f64; NUM_NUMERIC],
}

impl StandardScaler {
    /// Build a scaler from fitted parameters.
    ///
    /// # Errors
    /// Returns `ConfigurationError` if any std is zero or any parameter is
    /// not finite.
    pub fn new(mean: [f64; NUM_NUMERIC], std: [f64; NUM_NUMERIC]) -> Result<Self, ConfigurationError> {
        for (i, name) in NUMERIC_FEATURES.iter().enumerate() {
            if !mean[i].is_finite() {
                return Err(ConfigurationError(format!(
                    "scaler mean for `{name}` is not finite ({})",
                    mean[i]
                )));
            }
            if !std[i].is_finite() || std[i] == 0.0 {
                return Err(ConfigurationError(format!(
                    "scaler std for `{name}` must be finite and non-zero (got {})",
                    std[i]
                )));
            }
        }
        Ok(Self { mean, std })
    }

    /// # Errors
    /// Returns `ConfigurationError` on a shape or name mismatch, or any of
    /// the conditions checked by [`StandardScaler::new`].
    pub fn from_params(params: &ScalerParams) -> Result<Self, ConfigurationError> {
        if let Some(names) = &params.feature_names {
            if names.iter().map(String::as_str).ne(NUMERIC_FEATURES.iter().copied()) {
                return Err(ConfigurationError(format!(
                    "scaler feature_names {names:?} do not match {NUMERIC_FEATURES:?}"
                )));
            }
        }
        let mean: [f64; NUM_NUMERIC] = params.mean.as_slice().try_into().map_err(|_| {
            ConfigurationError(format!(
                "scaler mean has {} entries, expected {NUM_NUMERIC}",
                params.mean.len()
            ))
        })?;
        let std: [f64; NUM_NUMERIC] = params.scale.as_slice().try_into().map_err(|_| {
            ConfigurationError(format!(
                "scaler scale has {} entries, expected {NUM_NUMERIC}",
                params.scale.len()
            ))
        })?;
        Self::new(mean, std)
    }

    #[must_use]
    pub fn mean(&self) -> &[f64; NUM_NUMERIC] {
        &self.mean
    }

    #[must_use]
    pub fn std(&self) -> &[f64; NUM_NUMERIC] {
        &self.std
    }

    /// Standardize the numeric columns; the 14 others pass through.
    #[must_use]
    pub fn transform(&self, record: EncodedRecord) -> FeatureVector {
        let mut values = record.into_values();
        for i in 0..NUM_NUMERIC {
            values[i] = (values[i] - self.mean[i]) / self.std[i];
        }
        FeatureVector::from_scaled(values)
    }
}
