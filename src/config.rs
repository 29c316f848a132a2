use crate::server::daemon::DaemonConfig;
use crate::server::DEFAULT_ADDRESS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_NAME: &str = "census";
const CONFIG_FILE: &str = "config.json";

/// Environment variable that points at an alternative config file
pub const CONFIG_ENV: &str = "CENSUS_CONFIG";

/// Application configuration stored in the user's config directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the daemon listens on
    #[serde(default = "default_address")]
    pub address: String,

    /// Concurrent connections the daemon handles, 0 for unlimited
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Per-connection read/write timeout, 0 to disable
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Accept stop requests from non-loopback TCP clients
    #[serde(default)]
    pub allow_remote_stop: bool,

    /// Directory names skipped by every query
    #[serde(default)]
    pub default_ignore: Vec<String>,
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_max_connections() -> usize {
    64
}

fn default_connection_timeout_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            max_connections: default_max_connections(),
            connection_timeout_secs: default_connection_timeout_secs(),
            allow_remote_stop: false,
            default_ignore: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load from `$CENSUS_CONFIG` or the config directory, or return defaults
    /// if no file exists
    pub fn load() -> Result<Self> {
        match get_config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn connection_timeout(&self) -> Option<Duration> {
        (self.connection_timeout_secs > 0).then(|| Duration::from_secs(self.connection_timeout_secs))
    }

    pub fn daemon_config(&self) -> DaemonConfig {
        DaemonConfig {
            max_connections: self.max_connections,
            connection_timeout: self.connection_timeout(),
            allow_remote_stop: self.allow_remote_stop,
            default_ignore: self.default_ignore.clone(),
        }
    }
}

/// Get the path to the config file
pub fn get_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILE))
}

/// Read ignore names from a file: one per line, blank lines and `#`
/// comments skipped
pub fn read_ignore_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read ignore file {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}
