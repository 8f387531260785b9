//! Runtime settings read from the environment.
//!
//! Every setting has a default; CLI flags override what is read here.
//!
//! | variable | default |
//! |---|---|
//! | `URISENSE_MODEL_DIR` | `models` |
//! | `URISENSE_WORKERS` | `1` |
//! | `URISENSE_LOG_MODE` | `stderr` (`file` to log to `URISENSE_LOG_FILE`) |
//! | `URISENSE_LOG_FILE` | `urisense.log` |

use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Parse a boolean flag from the environment. Unset or unrecognized is false.
#[must_use]
pub fn parse_bool_env(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

/// Where log output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Standard error, keeping stdout free for reports.
    Stderr,
    File,
}

impl LogMode {
    fn parse(value: &str) -> Self {
        match value.trim() {
            "file" => Self::File,
            _ => Self::Stderr,
        }
    }
}

/// Process-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub model_dir: PathBuf,
    pub workers: NonZeroUsize,
    pub log_mode: LogMode,
    pub log_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            workers: NonZeroUsize::MIN,
            log_mode: LogMode::Stderr,
            log_file: PathBuf::from("urisense.log"),
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            model_dir: lookup("URISENSE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            workers: lookup("URISENSE_WORKERS")
                .and_then(|v| v.trim().parse::<NonZeroUsize>().ok())
                .unwrap_or(defaults.workers),
            log_mode: lookup("URISENSE_LOG_MODE")
                .map(|v| LogMode::parse(&v))
                .unwrap_or(defaults.log_mode),
            log_file: lookup("URISENSE_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_file),
        }
    }
}
