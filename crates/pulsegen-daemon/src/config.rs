//! Daemon configuration file.
//!
//! ```toml
//! listen = "127.0.0.1:8765"
//! heartbeat_timeout_secs = 90
//! sweep_interval_secs = 15
//!
//! [theme]
//! name = "Midnight"
//! css_path = "themes/midnight.css"
//! js_path = "themes/midnight.js"
//! ```

use anyhow::{Context, Result, bail};
use pulsegen_core::ThemePayload;
use pulsegen_manager::ManagerConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub listen: SocketAddr,
    pub heartbeat_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    /// Theme deployed to every page that reports ready.
    pub theme: Option<ThemeConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: ([127, 0, 0, 1], 8765).into(),
            heartbeat_timeout_secs: 90,
            sweep_interval_secs: 15,
            theme: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeConfig {
    pub name: String,
    pub css_path: Option<PathBuf>,
    pub js_path: Option<PathBuf>,
}

impl DaemonConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file does not exist; using defaults");
            return Ok(Self::default());
        }

        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: DaemonConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config TOML at: {}", path.display()))?;

        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_timeout_secs == 0 {
            bail!("heartbeat_timeout_secs must be greater than zero");
        }
        if self.sweep_interval_secs == 0 {
            bail!("sweep_interval_secs must be greater than zero");
        }
        if let Some(theme) = &self.theme
            && theme.name.trim().is_empty()
        {
            bail!("theme name cannot be empty");
        }
        Ok(())
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_secs),
            ..ManagerConfig::default()
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl ThemeConfig {
    /// Read the stylesheet and script into a payload.
    pub async fn load_payload(&self) -> Result<ThemePayload> {
        let css = read_optional(self.css_path.as_deref()).await?;
        let js = read_optional(self.js_path.as_deref()).await?;
        Ok(ThemePayload::new(self.name.clone(), css, js))
    }
}

async fn read_optional(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read theme file: {}", path.display())),
        None => Ok(String::new()),
    }
}
