//! Feature contract for the UTI classifiers.
//!
//! Both classifiers and the scaler were fitted on the same 18 columns in a
//! fixed order. Everything that reaches a model goes through [`encode`], which
//! checks that every column is present, coerces the binary flags and maps the
//! gender category before the numeric columns are standardized.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Total number of model input columns.
pub const NUM_FEATURES: usize = 18;

/// Number of leading continuous columns handled by the scaler.
pub const NUM_NUMERIC: usize = 4;

/// Column position of the gender category in [`FEATURE_ORDER`].
pub const GENDER_INDEX: usize = 14;

/// Canonical column order used for both the scaler and the classifiers.
pub const FEATURE_ORDER: [&str; NUM_FEATURES] = [
    "age",
    "urine_ph",
    "wbc",
    "rbc",
    "frequent_urination",
    "painful_urination",
    "lower_abdominal_pain",
    "cloudy_urine",
    "blood_in_urine",
    "fever",
    "urgent_urination",
    "foul_smelling_urine",
    "nitrites",
    "leukocyte_esterase",
    "gender",
    "diabetes",
    "hypertension",
    "bacteria",
];

/// Continuous columns, in scaler order.
pub const NUMERIC_FEATURES: [&str; NUM_NUMERIC] = ["age", "urine_ph", "wbc", "rbc"];

/// Error type for input records that do not satisfy the feature contract.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContractError {
    /// Required columns absent or null, in canonical order.
    #[error("missing required features: {}", .0.join(", "))]
    MissingFeatures(Vec<String>),

    /// Categorical value outside the training-time table.
    #[error("unrecognized value {value:?} for categorical feature `{feature}`")]
    UnrecognizedCategory { feature: String, value: String },

    /// Value that cannot be coerced to the column's type.
    #[error("invalid value {value:?} for feature `{feature}`")]
    InvalidValue { feature: String, value: String },
}

/// A single raw cell, as received from the caller.
///
/// Deserializes from any JSON value. `null` is treated as an absent value;
/// objects and arrays are kept as `Other` and never encode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl RawValue {
    /// Numeric view of the value, if it has one.
    fn as_f64(&self) -> Option<f64> {
        let v = match self {
            Self::Null => return None,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
            Self::Other(_) => return None,
        };
        v.is_finite().then_some(v)
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Other(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for RawValue {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Raw patient record: feature name to value, plus an optional caller id.
///
/// Columns that are not part of the contract are carried but ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Caller-side identifier, echoed back in assessments. Never scored.
    #[serde(
        default,
        deserialize_with = "deserialize_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,

    #[serde(flatten)]
    pub values: BTreeMap<String, RawValue>,
}

/// Accepts string or numeric ids; numbers are kept in their JSON spelling.
fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "id must be a string or a number, got {other}"
        ))),
    }
}

impl RawRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, feature: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.insert(feature, value);
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn insert(&mut self, feature: impl Into<String>, value: impl Into<RawValue>) {
        self.values.insert(feature.into(), value.into());
    }

    pub fn remove(&mut self, feature: &str) -> Option<RawValue> {
        self.values.remove(feature)
    }

    #[must_use]
    pub fn get(&self, feature: &str) -> Option<&RawValue> {
        self.values.get(feature)
    }

    /// Required features that are absent (or null), in canonical order.
    #[must_use]
    pub fn missing_features(&self) -> Vec<String> {
        FEATURE_ORDER
            .iter()
            .filter(|name| matches!(self.values.get(**name), None | Some(RawValue::Null)))
            .map(|name| (*name).to_string())
            .collect()
    }
}

/// Patient gender, encoded with the fixed training table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Gender {
    /// Parse the training-time category label. Only `M` and `F` are known.
    ///
    /// # Errors
    /// Returns `UnrecognizedCategory` for any other value.
    pub fn parse(value: &RawValue) -> Result<Self, ContractError> {
        match value {
            RawValue::Text(s) if s.trim() == "M" => Ok(Self::Male),
            RawValue::Text(s) if s.trim() == "F" => Ok(Self::Female),
            other => Err(ContractError::UnrecognizedCategory {
                feature: "gender".to_string(),
                value: other.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn code(self) -> f64 {
        match self {
            Self::Male => 0.0,
            Self::Female => 1.0,
        }
    }
}

/// A record that satisfied the contract: 18 columns in canonical order,
/// binary and categorical columns encoded, numeric columns not yet scaled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodedRecord([f64; NUM_FEATURES]);

impl EncodedRecord {
    #[must_use]
    pub fn values(&self) -> &[f64; NUM_FEATURES] {
        &self.0
    }

    #[must_use]
    pub fn numeric(&self) -> [f64; NUM_NUMERIC] {
        let mut out = [0.0; NUM_NUMERIC];
        out.copy_from_slice(&self.0[..NUM_NUMERIC]);
        out
    }

    pub(crate) fn into_values(self) -> [f64; NUM_FEATURES] {
        self.0
    }
}

/// Final model input. Only the scaler produces these.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; NUM_FEATURES]);

impl FeatureVector {
    pub(crate) fn from_scaled(values: [f64; NUM_FEATURES]) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        NUM_FEATURES
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

fn encode_numeric(feature: &str, value: &RawValue) -> Result<f64, ContractError> {
    value.as_f64().ok_or_else(|| ContractError::InvalidValue {
        feature: feature.to_string(),
        value: value.to_string(),
    })
}

/// Truncate toward zero; anything other than 0 or 1 afterwards is rejected.
fn encode_flag(feature: &str, value: &RawValue) -> Result<f64, ContractError> {
    let invalid = || ContractError::InvalidValue {
        feature: feature.to_string(),
        value: value.to_string(),
    };
    let truncated = value.as_f64().ok_or_else(invalid)?.trunc();
    if truncated == 0.0 || truncated == 1.0 {
        // -0.0 collapses to 0.0 here
        Ok(truncated.abs())
    } else {
        Err(invalid())
    }
}

/// Validate and encode a single record.
///
/// Presence of every required feature is checked before any value is
/// converted, so a record missing columns never reports a value error.
///
/// # Errors
/// Returns the first [`ContractError`] found.
pub fn encode(record: &RawRecord) -> Result<EncodedRecord, ContractError> {
    let missing = record.missing_features();
    if !missing.is_empty() {
        return Err(ContractError::MissingFeatures(missing));
    }

    let mut out = [0.0; NUM_FEATURES];
    for (i, name) in FEATURE_ORDER.iter().enumerate() {
        let value = &record.values[*name];
        out[i] = if i < NUM_NUMERIC {
            encode_numeric(name, value)?
        } else if i == GENDER_INDEX {
            Gender::parse(value)?.code()
        } else {
            encode_flag(name, value)?
        };
    }

    Ok(EncodedRecord(out))
}
