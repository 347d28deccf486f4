use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::stanza::{DEFAULT_LOCK_PATH, Stanza};

/// Settings for the bridge itself, read from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Executable to launch, looked up on `PATH` when not absolute.
    #[serde(default = "default_binary")]
    pub binary: String,

    #[serde(default)]
    pub lock_path: Option<String>,

    /// Start every invocation from the parent's environment.
    #[serde(default = "default_inherit_env")]
    pub inherit_env: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub stanza: Option<Stanza>,
}

fn default_binary() -> String {
    "pgbackrest".to_string()
}
fn default_inherit_env() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            lock_path: None,
            inherit_env: default_inherit_env(),
            log_level: default_log_level(),
            stanza: None,
        }
    }
}

impl BridgeConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No {} found, using default bridge settings.", path.display());
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("can't read {}", path.display()))?;
        let config: BridgeConfig = toml::from_str(&content)
            .with_context(|| format!("can't parse {}", path.display()))?;

        info!(
            "Loaded bridge config: binary={}, stanza={}, inherit_env={}",
            config.binary,
            config.stanza.as_ref().map(|s| s.name.as_str()).unwrap_or("<none>"),
            config.inherit_env
        );
        Ok(config)
    }

    pub fn lock_path(&self) -> &str {
        self.lock_path.as_deref().unwrap_or(DEFAULT_LOCK_PATH)
    }

    /// Base environment derived from the configured stanza, empty without one.
    pub fn base_env(&self) -> Vec<String> {
        self.stanza
            .as_ref()
            .map(|s| s.to_env(Some(self.lock_path())))
            .unwrap_or_default()
    }
}
