//! File-based model repository.
//!
//! Loads the four inference artifacts from a directory:
//!
//! | file | contents |
//! |---|---|
//! | `rf_model.json` | random forest classifier |
//! | `xgb_model.json` | gradient boosted classifier |
//! | `scaler.json` | numeric feature mean/std |
//! | `thresholds.json` | per-classifier decision thresholds |
//!
//! # Security
//!
//! - `manifest.json` binds every artifact by SHA-256 hash
//! - `model.sig` is an Ed25519 signature over the exact manifest bytes
//! - Unsigned directories load only in debug builds, and only when explicitly
//!   allowed (`URISENSE_ALLOW_UNSIGNED_MODELS=true` or
//!   [`FileModelRepository::allow_unsigned`])
//!
//! Loading is all-or-nothing: any failure aborts before a bundle exists.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::adapters::models::{JsonClassifier, ModelFormatError};
use crate::config::parse_bool_env;
use crate::domain::{ConfigurationError, DecisionThresholds, ScalerParams, StandardScaler};
use crate::ports::{ModelBundle, ModelRepository};

pub const RF_MODEL_FILE: &str = "rf_model.json";
pub const XGB_MODEL_FILE: &str = "xgb_model.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const THRESHOLDS_FILE: &str = "thresholds.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const SIGNATURE_FILE: &str = "model.sig";

/// Every file a complete bundle is made of.
pub const ARTIFACT_FILES: [&str; 4] = [RF_MODEL_FILE, XGB_MODEL_FILE, SCALER_FILE, THRESHOLDS_FILE];

/// Environment variable to allow loading unsigned artifacts (debug builds only).
pub const ALLOW_UNSIGNED_MODELS_ENV: &str = "URISENSE_ALLOW_UNSIGNED_MODELS";
const PUBKEY_FILE_ENV: &str = "URISENSE_MODEL_PUBKEY_B64_FILE";
const PUBKEY_ENV: &str = "URISENSE_MODEL_PUBKEY_B64";
const MAX_AGE_ENV: &str = "URISENSE_MODEL_MAX_AGE_SECS";

/// Allowed clock skew for `created_at`, in seconds.
const MAX_FUTURE_SKEW_SECS: i64 = 300;

/// Error type for artifact loading.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {file}: {message}")]
    Parse { file: String, message: String },

    #[error("signature verification failed: {0}")]
    Signature(String),

    #[error("invalid manifest: {0}")]
    Manifest(String),

    #[error("{file}: {source}")]
    Model {
        file: String,
        #[source]
        source: ModelFormatError,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Signed manifest binding artifact files to their hashes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<u64>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce_b64: Option<String>,
    /// File name to lowercase SHA-256 hex.
    pub files: BTreeMap<String, String>,
}

pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

// Constant-time compare for ASCII hex digests.
fn constant_time_eq_str(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

/// Decode a base64 Ed25519 public key.
///
/// # Errors
/// Returns `ArtifactError::Signature` if the key is malformed.
pub fn verifying_key_from_b64(b64: &str) -> Result<VerifyingKey, ArtifactError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|_| ArtifactError::Signature("public key is not valid base64".into()))?;
    let bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| ArtifactError::Signature("public key must be 32 bytes".into()))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|_| ArtifactError::Signature("invalid Ed25519 public key".into()))
}

fn verifying_key_from_env() -> Result<Option<VerifyingKey>, ArtifactError> {
    if let Ok(path) = std::env::var(PUBKEY_FILE_ENV) {
        let path = PathBuf::from(path.trim());
        let b64 = fs::read_to_string(&path).map_err(|source| ArtifactError::Io { path, source })?;
        return verifying_key_from_b64(&b64).map(Some);
    }
    if let Ok(b64) = std::env::var(PUBKEY_ENV) {
        return verifying_key_from_b64(&b64).map(Some);
    }
    Ok(None)
}

fn validate_nonce_b64(nonce_b64: &str) -> Result<(), ArtifactError> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(nonce_b64.trim())
        .map_err(|e| ArtifactError::Manifest(format!("invalid nonce base64: {e}")))?;
    if raw.len() != 16 {
        return Err(ArtifactError::Manifest(
            "nonce must decode to exactly 16 bytes".into(),
        ));
    }
    Ok(())
}

/// Model repository backed by a local directory.
#[derive(Debug, Clone)]
pub struct FileModelRepository {
    dir: PathBuf,
    verifying_key: Option<VerifyingKey>,
    allow_unsigned: bool,
}

impl FileModelRepository {
    /// Repository over `dir`. The verifying key is taken from the
    /// environment at load time unless one is set explicitly.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            verifying_key: None,
            allow_unsigned: parse_bool_env(ALLOW_UNSIGNED_MODELS_ENV),
        }
    }

    #[must_use]
    pub fn with_verifying_key(mut self, key: VerifyingKey) -> Self {
        self.verifying_key = Some(key);
        self
    }

    /// Permit directories without a signature. Ignored in release builds.
    #[must_use]
    pub fn allow_unsigned(mut self, allow: bool) -> Self {
        self.allow_unsigned = allow;
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read(&self, file: &str) -> Result<Vec<u8>, ArtifactError> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Err(ArtifactError::Missing(path));
        }
        fs::read(&path).map_err(|source| ArtifactError::Io { path, source })
    }

    fn parse<T: serde::de::DeserializeOwned>(file: &str, bytes: &[u8]) -> Result<T, ArtifactError> {
        serde_json::from_slice(bytes).map_err(|e| ArtifactError::Parse {
            file: file.to_string(),
            message: e.to_string(),
        })
    }

    /// Verify `manifest.json` against `model.sig` and return the manifest.
    ///
    /// Returns `Ok(None)` only when the directory is unsigned and unsigned
    /// loading is permitted.
    fn verify_manifest(&self) -> Result<Option<ModelManifest>, ArtifactError> {
        let sig_path = self.dir.join(SIGNATURE_FILE);
        let manifest_path = self.dir.join(MANIFEST_FILE);

        if !sig_path.exists() || !manifest_path.exists() {
            if cfg!(debug_assertions) && self.allow_unsigned {
                tracing::warn!(
                    "Loading UNSIGNED model artifacts from {:?}. Only allowed in debug builds.",
                    self.dir
                );
                return Ok(None);
            }
            tracing::error!("Model signature not found in {:?}", self.dir);
            return Err(ArtifactError::Signature(format!(
                "{SIGNATURE_FILE} and {MANIFEST_FILE} are required"
            )));
        }

        let key = match &self.verifying_key {
            Some(key) => *key,
            None => verifying_key_from_env()?.ok_or_else(|| {
                ArtifactError::Signature(format!(
                    "no verifying key configured (set {PUBKEY_FILE_ENV} or {PUBKEY_ENV})"
                ))
            })?,
        };

        let sig_bytes = self.read(SIGNATURE_FILE)?;
        let sig_bytes: [u8; 64] = sig_bytes
            .as_slice()
            .try_into()
            .map_err(|_| ArtifactError::Signature("signature must be 64 bytes".into()))?;
        let signature = Signature::from_bytes(&sig_bytes);

        let manifest_bytes = self.read(MANIFEST_FILE)?;
        key.verify(&manifest_bytes, &signature)
            .map_err(|_| ArtifactError::Signature("manifest signature does not verify".into()))?;

        let manifest: ModelManifest = Self::parse(MANIFEST_FILE, &manifest_bytes)?;
        if manifest.version != 1 {
            return Err(ArtifactError::Manifest(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }
        if let Some(nonce) = &manifest.nonce_b64 {
            validate_nonce_b64(nonce)?;
        }

        let now = unix_now();
        if manifest.created_at > now + MAX_FUTURE_SKEW_SECS {
            return Err(ArtifactError::Manifest("created_at is in the future".into()));
        }
        if let Some(max_age) = std::env::var(MAX_AGE_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|v| *v > 0)
        {
            if now.saturating_sub(manifest.created_at) > max_age {
                return Err(ArtifactError::Manifest(
                    "manifest is older than the allowed max age".into(),
                ));
            }
        }

        for file in ARTIFACT_FILES {
            if !manifest.files.contains_key(file) {
                return Err(ArtifactError::Manifest(format!("{file} is not bound by the manifest")));
            }
        }

        tracing::info!(
            "Model manifest verified (serial={:?}, files={})",
            manifest.serial,
            manifest.files.len()
        );
        Ok(Some(manifest))
    }

    /// Read an artifact, checking its hash when a manifest is in force.
    fn read_bound(&self, file: &str, manifest: Option<&ModelManifest>) -> Result<Vec<u8>, ArtifactError> {
        let bytes = self.read(file)?;
        if let Some(manifest) = manifest {
            let expected = manifest
                .files
                .get(file)
                .ok_or_else(|| ArtifactError::Manifest(format!("{file} is not bound by the manifest")))?;
            let actual = sha256_hex(&bytes);
            if !constant_time_eq_str(&actual, &expected.to_ascii_lowercase()) {
                return Err(ArtifactError::Signature(format!("hash mismatch for {file}")));
            }
        }
        Ok(bytes)
    }

    fn load_classifier(
        &self,
        name: &str,
        file: &str,
        manifest: Option<&ModelManifest>,
    ) -> Result<JsonClassifier, ArtifactError> {
        let bytes = self.read_bound(file, manifest)?;
        JsonClassifier::from_json(name, &bytes).map_err(|source| ArtifactError::Model {
            file: file.to_string(),
            source,
        })
    }
}

impl ModelRepository for FileModelRepository {
    type Error = ArtifactError;

    fn load_bundle(&self) -> Result<ModelBundle, ArtifactError> {
        tracing::info!("Loading model artifacts from {:?}", self.dir);
        let manifest = self.verify_manifest()?;
        let manifest = manifest.as_ref();

        let rf = self.load_classifier("rf", RF_MODEL_FILE, manifest)?;
        let xgb = self.load_classifier("xgb", XGB_MODEL_FILE, manifest)?;

        let scaler_params: ScalerParams =
            Self::parse(SCALER_FILE, &self.read_bound(SCALER_FILE, manifest)?)?;
        let scaler = StandardScaler::from_params(&scaler_params)?;

        let thresholds: DecisionThresholds =
            Self::parse(THRESHOLDS_FILE, &self.read_bound(THRESHOLDS_FILE, manifest)?)?;
        thresholds.validate()?;

        tracing::info!(
            "Loaded classifiers (rf_threshold={:.4}, xgb_threshold={:.4})",
            thresholds.rf_threshold,
            thresholds.xgb_threshold
        );

        Ok(ModelBundle {
            rf: Arc::new(rf),
            xgb: Arc::new(xgb),
            scaler,
            thresholds,
        })
    }
}
