use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use replaystream_core::StreamConfig;
use std::path::PathBuf;

/// Prefix of environment overrides, e.g. `REPLAYSTREAM_PIPE__CHUNK_SIZE`
pub const ENV_PREFIX: &str = "REPLAYSTREAM_";

/// Configuration manager that handles XDG-compliant paths and layered configuration
pub struct ConfigManager {
    config_path: PathBuf,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    /// Create a new ConfigManager with default XDG-compliant paths
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a ConfigManager reading a specific file
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    fn default_config_path() -> PathBuf {
        #[cfg(not(target_os = "windows"))]
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg_config).join("replaystream/config.toml");
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("replaystream")
            .join("config.toml")
    }

    /// Load configuration with layered priority: ENV > File > Defaults
    pub fn load(&self) -> Result<StreamConfig> {
        let mut figment = Figment::new();

        // Layer 1: Defaults
        figment = figment.merge(Serialized::defaults(StreamConfig::default()));

        // Layer 2: Config file (if exists)
        if self.config_path.exists() {
            log::debug!("Loading configuration from {}", self.config_path.display());
            figment = figment.merge(Toml::file(&self.config_path));
        }

        // Layer 3: Environment variables
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: StreamConfig = figment.extract().context("Failed to load configuration")?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Get a configuration value by key (dot notation)
    pub fn get(&self, key: &str) -> Result<String> {
        let value = toml::Value::try_from(self.load()?)?;

        let mut current = &value;
        for part in key.split('.') {
            match current {
                toml::Value::Table(table) => {
                    current = table
                        .get(part)
                        .ok_or_else(|| anyhow::anyhow!("Key '{}' not found", key))?;
                }
                _ => anyhow::bail!("Invalid key path: {}", key),
            }
        }

        match current {
            toml::Value::String(s) => Ok(s.clone()),
            toml::Value::Integer(i) => Ok(i.to_string()),
            toml::Value::Float(f) => Ok(f.to_string()),
            toml::Value::Boolean(b) => Ok(b.to_string()),
            _ => anyhow::bail!("Value at '{}' is not a simple type", key),
        }
    }
}

/// Render a configuration as TOML
pub fn to_toml(config: &StreamConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to render configuration as TOML")
}

/// Render a configuration as JSON
pub fn to_json(config: &StreamConfig) -> Result<String> {
    serde_json::to_string_pretty(config).context("Failed to render configuration as JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("absent.toml"));
        let config = manager.load().unwrap();
        assert_eq!(config.pipe, replaystream_core::PipeConfig::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[replay]\nthreshold = 1024\n\n[marker]\nstart = \"<<\"\nstop = \">>\"\n",
        )
        .unwrap();

        let manager = ConfigManager::with_path(path);
        let config = manager.load().unwrap();
        assert_eq!(config.replay.threshold, Some(1024));
        assert_eq!(config.marker.start, "<<");
        assert_eq!(manager.get("marker.stop").unwrap(), ">>");
        assert_eq!(manager.get("replay.threshold").unwrap(), "1024");
    }

    #[test]
    fn test_invalid_file_value_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[pipe]\nchunk_size = 0\n").unwrap();

        assert!(ConfigManager::with_path(path).load().is_err());
    }

    #[test]
    fn test_unknown_key() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("absent.toml"));
        assert!(manager.get("pipe.nope").is_err());
    }

    #[test]
    fn test_renderers() {
        let config = StreamConfig::default();
        assert!(to_toml(&config).unwrap().contains("[pipe]"));
        assert!(to_json(&config).unwrap().contains("\"chunk_size\""));
    }
}
