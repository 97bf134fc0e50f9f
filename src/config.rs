use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_DIR_NAME: &str = "report-stream";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub report_path: String,
    /// Applies to connection setup only; the stream itself has no deadline.
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            report_path: "/generate-report".to_string(),
            connect_timeout_secs: 10,
            user_agent: format!("report-stream/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Defaults, then `config.toml` from the user config dir if present, then
    /// `REPORT_STREAM_*` environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match config_file_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("REPORT_STREAM_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("REPORT_STREAM_PATH") {
            self.report_path = v;
        }
        if let Some(v) = lookup("REPORT_STREAM_CONNECT_TIMEOUT_SECS") {
            match v.parse::<u64>() {
                Ok(parsed) => self.connect_timeout_secs = parsed,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid connect timeout"),
            }
        }
    }

    pub fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self.report_path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// `<config dir>/report-stream`, if the platform has a config dir.
pub fn app_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME))
}

pub fn config_file_path() -> Option<PathBuf> {
    app_dir().map(|dir| dir.join("config.toml"))
}
