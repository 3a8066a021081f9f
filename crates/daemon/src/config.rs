//! Daemon configuration management

use crate::device::ReconnectPolicy;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub daemon: DaemonSettings,
    pub device: DeviceSettings,
    /// Reconnect backoff
    #[serde(default)]
    pub reconnect: ReconnectSettings,
    /// Replay source options
    #[serde(default)]
    pub replay: ReplaySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSettings {
    #[serde(default = "DaemonSettings::default_log_level")]
    pub log_level: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

impl DaemonSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

/// Where reports come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Usb,
    Tty,
    Replay,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Usb => write!(f, "usb"),
            SourceKind::Tty => write!(f, "tty"),
            SourceKind::Replay => write!(f, "replay"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(default)]
    pub source: SourceKind,
    /// USB device filter (VID:PID, `*` matches any)
    #[serde(default = "DeviceSettings::default_usb_filter")]
    pub usb_filter: String,
    /// Serial device node for the tty source
    #[serde(default = "DeviceSettings::default_tty_path")]
    pub tty_path: String,
    /// Write the init handshake after opening
    #[serde(default = "DeviceSettings::default_send_init")]
    pub send_init: bool,
    /// Read timeout; bounds shutdown latency
    #[serde(default = "DeviceSettings::default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            usb_filter: Self::default_usb_filter(),
            tty_path: Self::default_tty_path(),
            send_init: Self::default_send_init(),
            read_timeout_ms: Self::default_read_timeout_ms(),
        }
    }
}

impl DeviceSettings {
    fn default_usb_filter() -> String {
        "0xc251:0x2005".to_string()
    }

    fn default_tty_path() -> String {
        "/dev/ttyACM0".to_string()
    }

    fn default_send_init() -> bool {
        true
    }

    fn default_read_timeout_ms() -> u64 {
        100
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSettings {
    #[serde(default = "ReconnectSettings::default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "ReconnectSettings::default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Consecutive failures before giving up (0 = retry forever)
    #[serde(default = "ReconnectSettings::default_max_attempts")]
    pub max_attempts: u32,
    /// Random spread applied to each delay (0.0 - 1.0)
    #[serde(default = "ReconnectSettings::default_jitter")]
    pub jitter: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_backoff_ms: Self::default_initial_backoff_ms(),
            max_backoff_ms: Self::default_max_backoff_ms(),
            max_attempts: Self::default_max_attempts(),
            jitter: Self::default_jitter(),
        }
    }
}

impl ReconnectSettings {
    fn default_initial_backoff_ms() -> u64 {
        500
    }

    fn default_max_backoff_ms() -> u64 {
        10_000
    }

    fn default_max_attempts() -> u32 {
        10
    }

    fn default_jitter() -> f64 {
        0.1
    }

    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial: Duration::from_millis(self.initial_backoff_ms),
            max: Duration::from_millis(self.max_backoff_ms),
            max_attempts: self.max_attempts,
            jitter: self.jitter,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplaySettings {
    /// Report file (hex bytes, one report per line)
    #[serde(default)]
    pub path: Option<String>,
    /// Delay between reports
    #[serde(default)]
    pub pace_ms: u64,
    /// Keep running after the last report instead of exiting
    #[serde(default)]
    pub hold_open: bool,
}

impl DaemonConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/tourbox/daemon.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: DaemonConfig = toml::from_str(&content)
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
            config_dir.join("tourbox").join("daemon.toml")
        } else {
            PathBuf::from(".config/tourbox/daemon.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.daemon.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.daemon.log_level,
                valid_levels.join(", ")
            ));
        }

        self.usb_filter()?;

        if self.device.read_timeout_ms == 0 {
            return Err(anyhow!("read_timeout_ms must be greater than 0"));
        }

        let reconnect = &self.reconnect;
        if reconnect.initial_backoff_ms == 0 {
            return Err(anyhow!("initial_backoff_ms must be greater than 0"));
        }
        if reconnect.max_backoff_ms < reconnect.initial_backoff_ms {
            return Err(anyhow!(
                "max_backoff_ms ({}) must not be smaller than initial_backoff_ms ({})",
                reconnect.max_backoff_ms,
                reconnect.initial_backoff_ms
            ));
        }
        if !(0.0..=1.0).contains(&reconnect.jitter) {
            return Err(anyhow!(
                "Invalid jitter {}, must be between 0.0 and 1.0",
                reconnect.jitter
            ));
        }

        if self.device.source == SourceKind::Replay && self.replay.path.is_none() {
            return Err(anyhow!("Replay source selected but replay.path is not set"));
        }

        Ok(())
    }

    pub fn usb_filter(&self) -> Result<DeviceFilter> {
        self.device.usb_filter.parse()
    }

    /// Tty path with `~` expanded
    pub fn tty_path(&self) -> PathBuf {
        expand_path(&self.device.tty_path)
    }

    /// Replay path with `~` expanded
    pub fn replay_path(&self) -> Option<PathBuf> {
        self.replay.path.as_deref().map(expand_path)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.device.read_timeout_ms)
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// USB device filter (`0xVID:0xPID`, either side may be `*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFilter {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

impl DeviceFilter {
    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id.is_none_or(|v| v == vendor_id)
            && self.product_id.is_none_or(|p| p == product_id)
    }

    /// Parse a hex ID (VID or PID)
    fn parse_hex_id(id: &str, name: &str) -> Result<Option<u16>> {
        if id == "*" {
            return Ok(None);
        }

        let Some(hex_part) = id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) else {
            return Err(anyhow!(
                "Invalid {} '{}', must start with '0x' (e.g., '0x1234')",
                name,
                id
            ));
        };

        if hex_part.is_empty() || hex_part.len() > 4 {
            return Err(anyhow!(
                "Invalid {} '{}', hex part must be 1-4 digits",
                name,
                id
            ));
        }

        u16::from_str_radix(hex_part, 16)
            .map(Some)
            .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))
    }
}

impl FromStr for DeviceFilter {
    type Err = anyhow::Error;

    fn from_str(filter: &str) -> Result<Self> {
        let parts: Vec<&str> = filter.split(':').collect();
        if parts.len() != 2 {
            return Err(anyhow!(
                "Invalid filter format '{}', expected VID:PID (e.g., '0x1234:0x5678' or '0x1234:*')",
                filter
            ));
        }

        Ok(Self {
            vendor_id: Self::parse_hex_id(parts[0], "VID")?,
            product_id: Self::parse_hex_id(parts[1], "PID")?,
        })
    }
}

impl fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.vendor_id {
            Some(vid) => write!(f, "{vid:#06x}:")?,
            None => write!(f, "*:")?,
        }
        match self.product_id {
            Some(pid) => write!(f, "{pid:#06x}"),
            None => write!(f, "*"),
        }
    }
}
