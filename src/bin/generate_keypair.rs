//! Ed25519 keypair generation for model artifact signing.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin generate_keypair -- --out-seed <path> [--out-pub <path>] [--force]
//! ```
//!
//! The base64 seed is written with 0600 permissions on Unix. The base64
//! public key (for `URISENSE_MODEL_PUBKEY_B64_FILE`) is optional. Only
//! non-secret material is printed.

use std::fs::OpenOptions;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose;
use base64::Engine;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

const USAGE: &str = "Usage: generate_keypair --out-seed <path> [--out-pub <path>] [--force]";

struct Args {
    out_seed: PathBuf,
    out_pub: Option<PathBuf>,
    force: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let mut out_seed = None;
    let mut out_pub = None;
    let mut force = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out-seed" => out_seed = Some(PathBuf::from(args.next().ok_or(USAGE)?)),
            "--out-pub" => out_pub = Some(PathBuf::from(args.next().ok_or(USAGE)?)),
            "--force" => force = true,
            _ => return Err(USAGE.to_string()),
        }
    }

    Ok(Args {
        out_seed: out_seed.ok_or(USAGE)?,
        out_pub,
        force,
    })
}

fn write_file(path: &Path, contents: &[u8], mode: u32, force: bool) -> Result<(), String> {
    if path.exists() && !force {
        return Err(format!("Refusing to overwrite existing file {path:?}. Use --force."));
    }
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = opts
        .open(path)
        .map_err(|e| format!("Failed to open {path:?}: {e}"))?;
    file.write_all(contents)
        .and_then(|()| file.write_all(b"\n"))
        .map_err(|e| format!("Failed to write {path:?}: {e}"))
}

fn main() -> Result<(), String> {
    let args = parse_args()?;

    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    let verifying_key = SigningKey::from_bytes(&seed).verifying_key();
    let seed_b64 = Zeroizing::new(general_purpose::STANDARD.encode(seed));
    seed.zeroize();

    write_file(&args.out_seed, seed_b64.as_bytes(), 0o600, args.force)?;
    println!("Wrote signing seed (base64) to {:?}", args.out_seed);

    let pub_b64 = general_purpose::STANDARD.encode(verifying_key.as_bytes());
    if let Some(out_pub) = &args.out_pub {
        write_file(out_pub, pub_b64.as_bytes(), 0o644, args.force)?;
        println!("Wrote public key (base64) to {out_pub:?}");
    }
    println!("URISENSE_MODEL_PUBKEY_B64={pub_b64}");

    Ok(())
}
