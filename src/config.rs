//! User configuration, read from `config.json` in the application data
//! directory. Every section falls back to defaults so a partial file only has
//! to name what it changes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

/// Folder name used beneath the user's home directory for application data.
const DATA_DIR_NAME: &str = ".choir-projector";
/// Configuration file name stored inside the application data directory.
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file to use instead of the default one in the data directory.
    pub database: Option<PathBuf>,
    /// Folder holding notation files referenced by `notes_file`.
    pub notes_dir: Option<PathBuf>,
    /// Default `env_logger` filter when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Command that opens a new terminal window. The executable running the
    /// display is appended after these arguments. Placeholders: `{left}`,
    /// `{top}`, `{width}`, `{height}`, `{cols}`, `{rows}`.
    pub launcher: Vec<String>,
    /// Approximate pixel size of one terminal cell, for geometry conversion.
    pub cell_width: u32,
    pub cell_height: u32,
    /// Interval of the display liveness poll.
    pub poll_interval_ms: u64,
    /// A launched display that has not connected after this long is treated
    /// as closed.
    pub connect_timeout_ms: u64,
    pub screen: ScreenConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: None,
            notes_dir: None,
            log_filter: "info".to_string(),
            launcher: [
                "xterm",
                "-T",
                "Projection",
                "-geometry",
                "{cols}x{rows}+{left}+{top}",
                "-e",
            ]
            .iter()
            .map(|arg| arg.to_string())
            .collect(),
            cell_width: 9,
            cell_height: 18,
            poll_interval_ms: 500,
            connect_timeout_ms: 15_000,
            screen: ScreenConfig::default(),
        }
    }
}

/// What the host reports about its primary display when screens cannot be
/// enumerated directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// The display area spans a second, adjacent screen.
    pub extended: bool,
}

impl Config {
    /// Load `config.json` from the data directory, or defaults when absent.
    pub fn load() -> Result<Self> {
        Self::load_from(&data_dir()?.join(CONFIG_FILE_NAME))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("invalid configuration")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Database location: the configured override or the data directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("songs.sqlite")),
        }
    }
}

/// Resolve the application data directory inside the user's home.
pub fn data_dir() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new().ok_or_else(|| anyhow!("could not locate home directory"))?;
    Ok(base_dirs.home_dir().join(DATA_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::parse(r#"{ "poll_interval_ms": 250, "screen": { "extended": true } }"#)
            .unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert!(config.screen.extended);
        assert_eq!(config.screen.width, None);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.launcher.first().map(String::as_str), Some("xterm"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(Config::parse("{ not json").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.poll_interval_ms, 500);
    }
}
