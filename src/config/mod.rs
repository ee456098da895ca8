pub mod env;
pub use env::{apply_env_overrides, apply_overrides_from};

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

// Re-export existing config types
pub use crate::thermal::{SchedulePolicy, TickConfig};

/// Default config file path (overridden by BLOCKHEAT_CONFIG)
pub const DEFAULT_CONFIG_PATH: &str = "blockheat.toml";

/// Complete blockheat configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockheatConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub tick: TickConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

/// Listening socket configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

/// Block store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path (":memory:" for a throwaway store)
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "blockheat.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Subscriber broadcast configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    /// Buffered full-state updates per subscriber before it lags
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &Path) -> Result<BlockheatConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: BlockheatConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Load configuration from `path` if it exists, else defaults; then apply
/// environment overrides
pub fn load_or_default(path: &Path) -> Result<BlockheatConfig> {
    let mut config = if path.exists() {
        load_config(path)?
    } else {
        BlockheatConfig::default()
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = BlockheatConfig::default();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.server.listen_addr(), "0.0.0.0:3001");
        assert_eq!(config.store.path, "blockheat.db");
        assert_eq!(config.tick.interval_ms, 1000);
        assert_eq!(config.tick.policy, SchedulePolicy::FixedDelay);
        assert_eq!(config.broadcast.channel_capacity, 64);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            bind_addr = "127.0.0.1"
            port = 8080

            [store]
            path = "/tmp/blocks.db"

            [tick]
            interval_ms = 250
            policy = "overlapping"

            [broadcast]
            channel_capacity = 8
        "#;

        let config: BlockheatConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.listen_addr(), "127.0.0.1:8080");
        assert_eq!(config.store.path, "/tmp/blocks.db");
        assert_eq!(config.tick.interval_ms, 250);
        assert_eq!(config.tick.policy, SchedulePolicy::Overlapping);
        assert_eq!(config.broadcast.channel_capacity, 8);
    }

    #[test]
    fn test_partial_config() {
        // Missing sections and fields use defaults
        let toml = r#"
            [tick]
            policy = "fixed_rate"
        "#;

        let config: BlockheatConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.tick.policy, SchedulePolicy::FixedRate);
        assert_eq!(config.tick.interval_ms, 1000);
        assert_eq!(config.server.port, 3001);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let toml = r#"
            [tick]
            policy = "whenever"
        "#;
        assert!(toml::from_str::<BlockheatConfig>(toml).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 4000").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.port, 4000);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.tick.interval_ms, TickConfig::default().interval_ms);
    }

    #[test]
    fn test_zero_interval_clamped() {
        let tick = TickConfig {
            interval_ms: 0,
            policy: SchedulePolicy::FixedDelay,
        };
        assert_eq!(tick.period().as_millis(), 1);
    }
}
