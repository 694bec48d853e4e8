//! Configuration management with XDG paths
//!
//! ~/.config/overspill/config.json - backend URLs, debounce (0600)
//! ~/.local/state/overspill/       - log file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_NAME: &str = "overspill";

pub const API_URL_ENV: &str = "OVERSPILL_API_URL";
pub const PRINT_URL_ENV: &str = "OVERSPILL_PRINT_URL";

/// Get config directory (~/.config/overspill/)
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .context("Could not determine config directory")?;
    Ok(base.join(APP_NAME))
}

/// Get state directory (~/.local/state/overspill/)
pub fn state_dir() -> Result<PathBuf> {
    let base = dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
        .context("Could not determine state directory")?;
    Ok(base.join(APP_NAME))
}

/// Get config file path
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.json"))
}

/// Ensure all directories exist
pub fn ensure_dirs() -> Result<()> {
    fs::create_dir_all(config_dir()?)?;
    fs::create_dir_all(state_dir()?)?;
    Ok(())
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Generation backend base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Label print server base URL
    #[serde(default = "default_print_url")]
    pub print_url: String,

    /// Overflow restart debounce
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_api_url() -> String { "http://localhost:7860".to_string() }
fn default_print_url() -> String { "http://localhost:5001".to_string() }
fn default_debounce_ms() -> u64 { 100 }

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            print_url: default_print_url(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Config {
    /// Load config from disk, or return defaults
    pub fn load() -> Result<Self> {
        ensure_dirs()?;
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Save config to disk with owner-only permissions
    pub fn save(&self) -> Result<()> {
        ensure_dirs()?;
        self.save_to(&config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, &content)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    /// Environment variables take precedence over the file
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(url) = non_empty_env(API_URL_ENV) {
            self.api_url = url;
        }
        if let Some(url) = non_empty_env(PRINT_URL_ENV) {
            self.print_url = url;
        }
        self
    }

    /// Apply `config set <key> <value>`
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "url" | "api_url" | "api-url" => self.api_url = value.to_string(),
            "print-url" | "print_url" => self.print_url = value.to_string(),
            "debounce" | "debounce_ms" => {
                self.debounce_ms = value
                    .parse()
                    .with_context(|| format!("Invalid debounce (ms): {}", value))?;
            }
            _ => anyhow::bail!("Unknown config key: {}. Valid keys: url, print-url, debounce", key),
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
