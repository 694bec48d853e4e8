//! File logging
//!
//! The terminal belongs to the surface, so tracing output goes to
//! `{state_dir}/overspill.log`. Filter with `OVERSPILL_LOG` (default `info`).

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "OVERSPILL_LOG";

pub fn log_path(state_dir: &Path) -> PathBuf {
    state_dir.join("overspill.log")
}

/// Install the global subscriber. Returns the log file path.
pub fn init(state_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(state_dir)
        .with_context(|| format!("Failed to create {}", state_dir.display()))?;

    let path = log_path(state_dir);
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests, repeated commands) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(log_file))
        .try_init();

    Ok(path)
}
