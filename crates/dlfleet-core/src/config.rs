use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Coordinator settings (`[coordinator]` in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Address the HTTP API binds to.
    pub listen_addr: String,
    /// Maximum heartbeat age for an agent to be listed as available.
    pub liveness_window_secs: u64,
    /// Consumer group for the progress channel.
    pub progress_group: String,
    /// Consumer group for the heartbeat channel.
    pub heartbeat_group: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            liveness_window_secs: 120,
            progress_group: "dispatcher-progress".to_string(),
            heartbeat_group: "dispatcher-agents".to_string(),
        }
    }
}

impl CoordinatorConfig {
    pub fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness_window_secs)
    }
}

/// Download agent settings (`[agent]` in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Consumer group shared by all agents on the queue channel.
    pub queue_group: String,
    /// Minimum spacing between periodic progress events, in milliseconds.
    pub progress_interval_ms: u64,
    pub heartbeat_interval_secs: u64,
    /// Overall timeout for one transfer (large payloads need hours).
    pub transfer_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Receive buffer size in bytes.
    pub buffer_size: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            queue_group: "download-agents".to_string(),
            progress_interval_ms: 200,
            heartbeat_interval_secs: 30,
            transfer_timeout_secs: 2 * 60 * 60,
            connect_timeout_secs: 30,
            buffer_size: 81920,
        }
    }
}

impl AgentConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// Global configuration loaded from `~/.config/dlfleet/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dlfleet")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<FleetConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = FleetConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

pub fn load_from_path(path: &Path) -> Result<FleetConfig> {
    let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FleetConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = FleetConfig::default();
        assert_eq!(cfg.coordinator.liveness_window(), Duration::from_secs(120));
        assert_eq!(cfg.coordinator.progress_group, "dispatcher-progress");
        assert_eq!(cfg.agent.progress_interval_ms, 200);
        assert_eq!(cfg.agent.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(cfg.agent.queue_group, "download-agents");
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = FleetConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: FleetConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let toml = r#"
            [agent]
            progress_interval_ms = 500
            heartbeat_interval_secs = 10
        "#;
        let cfg: FleetConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.agent.progress_interval_ms, 500);
        assert_eq!(cfg.agent.heartbeat_interval_secs, 10);
        assert_eq!(cfg.agent.buffer_size, 81920);
        assert_eq!(cfg.coordinator, CoordinatorConfig::default());
    }

    #[test]
    fn empty_file_is_default() {
        let cfg: FleetConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, FleetConfig::default());
    }

    #[test]
    fn load_from_path_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[coordinator]\nlisten_addr = 5\n").unwrap();
        let err = load_from_path(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("parse"));

        fs::write(&path, "[coordinator]\nlisten_addr = \"0.0.0.0:9000\"\n").unwrap();
        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.coordinator.listen_addr, "0.0.0.0:9000");
    }
}
