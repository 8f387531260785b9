//! Signs a model artifact directory.
//!
//! Writes `manifest.json` (SHA-256 of every artifact) and `model.sig`
//! (Ed25519 signature over the manifest bytes) next to the artifacts.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin sign_model -- <model_dir> [--serial <n>]
//! ```
//!
//! The signing seed is read from `URISENSE_MODEL_SIGNING_KEY_B64_FILE`, or
//! in debug builds from `URISENSE_MODEL_SIGNING_KEY_B64`.

use std::env;
use std::fs;
use std::path::PathBuf;

use base64::engine::general_purpose;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use urisense::adapters::artifacts::{
    sha256_hex, ModelManifest, ARTIFACT_FILES, MANIFEST_FILE, SIGNATURE_FILE,
};

const KEY_FILE_ENV: &str = "URISENSE_MODEL_SIGNING_KEY_B64_FILE";
const KEY_ENV: &str = "URISENSE_MODEL_SIGNING_KEY_B64";

#[derive(Zeroize, ZeroizeOnDrop)]
struct Seed([u8; 32]);

fn read_seed_b64() -> Result<Zeroizing<String>, String> {
    if let Ok(path) = env::var(KEY_FILE_ENV) {
        let content = Zeroizing::new(
            fs::read_to_string(path.trim())
                .map_err(|e| format!("Failed reading signing key file: {e}"))?,
        );
        return Ok(Zeroizing::new(content.trim().to_string()));
    }

    // Dev-only fallback.
    if cfg!(debug_assertions) {
        if let Ok(v) = env::var(KEY_ENV) {
            return Ok(Zeroizing::new(v.trim().to_string()));
        }
    }

    Err(format!(
        "Missing signing key. Set {KEY_FILE_ENV} (or {KEY_ENV} in debug builds)."
    ))
}

fn read_seed() -> Result<Seed, String> {
    let b64 = read_seed_b64()?;
    if b64.is_empty() {
        return Err("Empty signing key".to_string());
    }
    let raw = Zeroizing::new(
        general_purpose::STANDARD
            .decode(b64.as_bytes())
            .map_err(|e| format!("Invalid base64 in signing key: {e}"))?,
    );
    let bytes: [u8; 32] = raw.as_slice().try_into().map_err(|_| {
        format!("Signing seed must be 32 bytes after decoding (got {})", raw.len())
    })?;
    Ok(Seed(bytes))
}

fn parse_args() -> Result<(PathBuf, Option<u64>), String> {
    let usage = || "Usage: sign_model <model_dir> [--serial <u64>]".to_string();
    let mut args = env::args().skip(1);
    let mut dir = None;
    let mut serial = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--serial" => {
                let v = args.next().ok_or_else(usage)?;
                serial = Some(v.trim().parse::<u64>().map_err(|_| "--serial must be a u64".to_string())?);
            }
            "-h" | "--help" => return Err(usage()),
            _ if dir.is_none() => dir = Some(PathBuf::from(arg)),
            _ => return Err(usage()),
        }
    }

    Ok((dir.ok_or_else(usage)?, serial))
}

fn main() -> Result<(), String> {
    let (dir, serial) = parse_args()?;

    let mut files = std::collections::BTreeMap::new();
    for name in ARTIFACT_FILES {
        let path = dir.join(name);
        let bytes = fs::read(&path).map_err(|e| format!("Failed to read {path:?}: {e}"))?;
        files.insert(name.to_string(), sha256_hex(&bytes));
    }

    let created_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    let mut nonce = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let manifest = ModelManifest {
        version: 1,
        serial: Some(serial.unwrap_or(created_at.max(1) as u64)),
        created_at,
        nonce_b64: Some(general_purpose::STANDARD.encode(nonce)),
        files,
    };
    let manifest_bytes = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| format!("Failed to serialize manifest: {e}"))?;

    let seed = read_seed()?;
    let signing_key = SigningKey::from_bytes(&seed.0);
    let signature: Signature = signing_key.sign(&manifest_bytes);

    let manifest_path = dir.join(MANIFEST_FILE);
    fs::write(&manifest_path, &manifest_bytes)
        .map_err(|e| format!("Failed to write {manifest_path:?}: {e}"))?;
    let sig_path = dir.join(SIGNATURE_FILE);
    fs::write(&sig_path, signature.to_bytes())
        .map_err(|e| format!("Failed to write {sig_path:?}: {e}"))?;

    println!("Signed manifest: {manifest_path:?}");
    println!("Wrote signature: {sig_path:?}");
    println!(
        "URISENSE_MODEL_PUBKEY_B64={}",
        general_purpose::STANDARD.encode(signing_key.verifying_key().as_bytes())
    );

    Ok(())
}
