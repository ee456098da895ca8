use super::BlockheatConfig;
use tracing::warn;

pub const ENV_PORT: &str = "BLOCKHEAT_PORT";
pub const ENV_DB_PATH: &str = "BLOCKHEAT_DB_PATH";
pub const ENV_TICK_INTERVAL_MS: &str = "BLOCKHEAT_TICK_INTERVAL_MS";

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut BlockheatConfig) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply overrides from `lookup`, ignoring values that fail to parse.
pub fn apply_overrides_from<F>(config: &mut BlockheatConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup(ENV_PORT) {
        match v.parse::<u16>() {
            Ok(port) => config.server.port = port,
            Err(_) => warn!(var = ENV_PORT, value = %v, "Ignoring invalid override"),
        }
    }
    if let Some(v) = lookup(ENV_DB_PATH) {
        if !v.is_empty() {
            config.store.path = v;
        }
    }
    if let Some(v) = lookup(ENV_TICK_INTERVAL_MS) {
        match v.parse::<u64>() {
            Ok(ms) => config.tick.interval_ms = ms,
            Err(_) => warn!(var = ENV_TICK_INTERVAL_MS, value = %v, "Ignoring invalid override"),
        }
    }
}
