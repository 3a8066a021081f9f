//! Bridge configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// How to launch the daemon
    #[serde(default)]
    pub daemon: DaemonCommand,
    #[serde(default)]
    pub bridge: BridgeSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonCommand {
    /// Daemon executable (looked up in PATH unless it contains a slash)
    #[serde(default = "DaemonCommand::default_program")]
    pub program: String,
    /// Extra arguments passed to the daemon
    #[serde(default)]
    pub args: Vec<String>,
    /// Launch with SIGINT/SIGTERM blocked; `tourboxd` unblocks them once its
    /// handlers are installed, so an early `stop` is never fatal. Disable for
    /// programs that do not unblock them.
    #[serde(default = "DaemonCommand::default_defer_interrupts")]
    pub defer_interrupts: bool,
}

impl Default for DaemonCommand {
    fn default() -> Self {
        Self {
            program: Self::default_program(),
            args: Vec::new(),
            defer_interrupts: Self::default_defer_interrupts(),
        }
    }
}

impl DaemonCommand {
    fn default_program() -> String {
        "tourboxd".to_string()
    }

    fn default_defer_interrupts() -> bool {
        true
    }

    /// Program with `~` expanded
    pub fn program_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.program).as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    #[serde(default = "BridgeSettings::default_log_level")]
    pub log_level: String,
    /// Host tick interval for the monitor loop
    #[serde(default = "BridgeSettings::default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            tick_ms: Self::default_tick_ms(),
        }
    }
}

impl BridgeSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_tick_ms() -> u64 {
        10
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl BridgeConfig {
    /// Config that launches `program` with `args`
    pub fn for_program<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            daemon: DaemonCommand {
                program: program.into(),
                args: args.into_iter().map(Into::into).collect(),
                defer_interrupts: DaemonCommand::default_defer_interrupts(),
            },
            bridge: BridgeSettings::default(),
        }
    }

    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/tourbox/bridge.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: BridgeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("tourbox").join("bridge.toml")
        } else {
            PathBuf::from(".config/tourbox/bridge.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.bridge.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.bridge.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.daemon.program.trim().is_empty() {
            return Err(anyhow!("Daemon program must not be empty"));
        }

        if self.bridge.tick_ms == 0 {
            return Err(anyhow!("tick_ms must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.daemon.program, "tourboxd");
        assert!(config.daemon.args.is_empty());
        assert!(config.daemon.defer_interrupts);
        assert_eq!(config.bridge.tick(), Duration::from_millis(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let mut config = BridgeConfig::default();
        config.bridge.log_level = "chatty".to_string();
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::for_program("  ", Vec::<String>::new());
        assert!(config.validate().is_err());
        config.daemon.program = "/usr/local/bin/tourboxd".to_string();
        assert!(config.validate().is_ok());

        config.bridge.tick_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: BridgeConfig = toml::from_str("").unwrap();
        assert_eq!(config.daemon.program, "tourboxd");
        assert_eq!(config.bridge.log_level, "info");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bridge.toml");

        let config = BridgeConfig::for_program("tourboxd", ["--tty", "/dev/ttyACM0"]);
        config.save(&path).unwrap();

        let loaded = BridgeConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.daemon.args, vec!["--tty", "/dev/ttyACM0"]);
    }
}
