use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, anyhow};

use crate::dispatch::PipelineFlags;
use crate::state::DiffMode;

pub const SERVER_URL_ENV: &str = "LEXDRAFT_SERVER_URL";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub server_url: String,
    pub stream_path: String,
    pub chat_path: String,
    pub history_path: String,
    pub diff_mode: DiffMode,
    pub highlight_changes: bool,
    pub tool_banners: bool,
    pub tool_result_linger_ms: u64,
    /// Send prior messages with every request. Servers that keep no
    /// per-session memory lose all context after the first turn without it.
    pub send_history: bool,
    pub export_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            server_url: "http://localhost:5000".to_string(),
            stream_path: "/stream".to_string(),
            chat_path: "/chat".to_string(),
            history_path: "/history".to_string(),
            diff_mode: DiffMode::Structured,
            highlight_changes: true,
            tool_banners: true,
            tool_result_linger_ms: 2000,
            send_history: true,
            export_dir: None,
        }
    }

    /// Load from the user config dir, falling back to defaults, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        let mut config = Self::load_from(&config_path)?;
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            config.server_url = url;
        }
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn flags(&self) -> PipelineFlags {
        PipelineFlags {
            diff_mode: self.diff_mode,
            highlight_changes: self.highlight_changes,
            tool_banners: self.tool_banners,
            tool_result_linger: Duration::from_millis(self.tool_result_linger_ms),
        }
    }

    /// Where exported HTML pages are written.
    pub fn export_dir(&self) -> PathBuf {
        self.export_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("lexdraft"))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("none.json")).unwrap();
        assert_eq!(config, Config::new());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"diff_mode": "line", "tool_result_linger_ms": 0}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.diff_mode, DiffMode::Line);
        assert_eq!(config.server_url, "http://localhost:5000");
        assert!(config.flags().tool_result_linger.is_zero());
        assert!(config.send_history);
    }

    #[test]
    fn test_history_can_be_turned_off() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"send_history": false}"#).unwrap();

        assert!(!Config::load_from(&path).unwrap().send_history);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::new();
        config.send_history = false;
        config.export_dir = Some(dir.path().to_path_buf());
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }
}
