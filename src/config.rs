//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field has a default, so an empty or missing file gives
//! a working gateway talking to a bridge on `localhost:7878`.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GatewayError, Result};

/// Environment variable that switches to mock mode when set to `mock`
pub const MODE_ENV: &str = "MODE";

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG";

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub channels: ChannelFrequencies,
    #[serde(default)]
    pub port: PortConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

/// Where readings come from.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BridgeMode {
    /// Poll the instrument bridge over HTTP
    #[default]
    Live,
    /// Generate random readings in-process
    Mock,
}

/// Instrument bridge configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BridgeConfig {
    #[serde(default = "default_bridge_url")]
    pub base_url: String,

    #[serde(default = "default_bridge_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub mode: BridgeMode,
}

/// Channel history configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    /// Buffer length that triggers a spill
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,

    /// Readings moved to the log per spill
    #[serde(default = "default_spill_size")]
    pub spill_size: usize,

    /// Directory holding the in-progress log files
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,

    /// Directory receiving finalized log files
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
}

/// Polling frequency per channel, in readings per second
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelFrequencies {
    #[serde(default = "default_altimeter_hz")]
    pub altimeter: f64,

    #[serde(default = "default_gps_hz")]
    pub gps: f64,

    #[serde(default = "default_pitot_hz")]
    pub pitot: f64,

    #[serde(default = "default_tachometer_hz")]
    pub tachometer: f64,

    #[serde(default = "default_servo_hz")]
    pub servo: f64,
}

/// Serial port supervision configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PortConfig {
    #[serde(default = "default_health_check_interval_s")]
    pub health_check_interval_s: u64,
}

/// Log upload configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Object store endpoint; logs are archived locally when unset
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Base of returned download links (defaults to the endpoint)
    #[serde(default)]
    pub public_base_url: Option<String>,

    #[serde(default = "default_upload_timeout_s")]
    pub upload_timeout_s: u64,

    #[serde(default = "default_local_archive_dir")]
    pub local_archive_dir: PathBuf,
}

/// Diagnostic logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily-rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

// Default value functions
fn default_bind() -> String { "0.0.0.0:8080".to_string() }

fn default_bridge_url() -> String { crate::bridge::DEFAULT_BRIDGE_URL.to_string() }
fn default_bridge_timeout_ms() -> u64 { 2000 }

fn default_high_water_mark() -> usize { crate::telemetry::channel::DEFAULT_HIGH_WATER_MARK }
fn default_spill_size() -> usize { crate::telemetry::channel::DEFAULT_SPILL_SIZE }
fn default_spool_dir() -> PathBuf { PathBuf::from("logs/spool") }
fn default_archive_dir() -> PathBuf { PathBuf::from("logs") }

fn default_altimeter_hz() -> f64 { 2.0 }
fn default_gps_hz() -> f64 { 1.0 }
fn default_pitot_hz() -> f64 { 2.0 }
fn default_tachometer_hz() -> f64 { 1.0 }
fn default_servo_hz() -> f64 { 2.0 }

fn default_health_check_interval_s() -> u64 { 10 }

fn default_bucket() -> String { crate::storage::DEFAULT_BUCKET.to_string() }
fn default_upload_timeout_s() -> u64 { 50 }
fn default_local_archive_dir() -> PathBuf { PathBuf::from("archive") }

fn default_log_level() -> String { "info".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_bridge_url(),
            timeout_ms: default_bridge_timeout_ms(),
            mode: BridgeMode::default(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            high_water_mark: default_high_water_mark(),
            spill_size: default_spill_size(),
            spool_dir: default_spool_dir(),
            archive_dir: default_archive_dir(),
        }
    }
}

impl Default for ChannelFrequencies {
    fn default() -> Self {
        Self {
            altimeter: default_altimeter_hz(),
            gps: default_gps_hz(),
            pitot: default_pitot_hz(),
            tachometer: default_tachometer_hz(),
            servo: default_servo_hz(),
        }
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            health_check_interval_s: default_health_check_interval_s(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            endpoint: None,
            public_base_url: None,
            upload_timeout_s: default_upload_timeout_s(),
            local_archive_dir: default_local_archive_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}

impl BridgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl PortConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_s)
    }
}

impl StorageConfig {
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_s)
    }
}

impl ChannelFrequencies {
    /// `(channel name, frequency)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [
            ("altimeter", self.altimeter),
            ("gps", self.gps),
            ("pitot", self.pitot),
            ("tachometer", self.tachometer),
            ("servo", self.servo),
        ]
        .into_iter()
    }
}

fn invalid(msg: impl std::fmt::Display) -> GatewayError {
    GatewayError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use telemetry_gateway::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns `Config` if parsing or validation fails
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies the `MODE` environment value; `mock` forces mock mode.
    pub fn apply_mode_override(&mut self, mode: Option<&str>) {
        if mode.map(|m| m.eq_ignore_ascii_case("mock")).unwrap_or(false) {
            self.bridge.mode = BridgeMode::Mock;
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Server
        if self.server.bind.parse::<SocketAddr>().is_err() {
            return Err(invalid(format!(
                "server bind '{}' is not a valid socket address",
                self.server.bind
            )));
        }

        // Bridge
        if !(self.bridge.base_url.starts_with("http://") || self.bridge.base_url.starts_with("https://")) {
            return Err(invalid("bridge base_url must start with http:// or https://"));
        }

        if self.bridge.timeout_ms == 0 || self.bridge.timeout_ms > 60000 {
            return Err(invalid("bridge timeout_ms must be between 1 and 60000"));
        }

        // History
        if self.history.high_water_mark == 0 {
            return Err(invalid("history high_water_mark must be greater than 0"));
        }

        if self.history.spill_size == 0 || self.history.spill_size > self.history.high_water_mark {
            return Err(invalid("history spill_size must be between 1 and high_water_mark"));
        }

        if self.history.spool_dir.as_os_str().is_empty() || self.history.archive_dir.as_os_str().is_empty() {
            return Err(invalid("history spool_dir and archive_dir cannot be empty"));
        }

        // Channel frequencies
        for (name, hz) in self.channels.iter() {
            if !hz.is_finite() || hz <= 0.0 || hz > 1000.0 {
                return Err(invalid(format!(
                    "{} frequency must be greater than 0 and at most 1000 Hz",
                    name
                )));
            }
        }

        // Port supervision
        if self.port.health_check_interval_s == 0 || self.port.health_check_interval_s > 3600 {
            return Err(invalid("health_check_interval_s must be between 1 and 3600"));
        }

        // Storage
        if self.storage.bucket.is_empty() || self.storage.bucket.contains('/') {
            return Err(invalid("storage bucket must be a non-empty name without '/'"));
        }

        if let Some(endpoint) = &self.storage.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(invalid("storage endpoint must start with http:// or https://"));
            }
        }

        if self.storage.upload_timeout_s == 0 {
            return Err(invalid("upload_timeout_s must be greater than 0"));
        }

        // Logging
        if self.logging.level.trim().is_empty() {
            return Err(invalid("logging level cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.bridge.base_url, "http://localhost:7878");
        assert_eq!(config.bridge.mode, BridgeMode::Live);
        assert_eq!(config.history.high_water_mark, 20);
        assert_eq!(config.history.spill_size, 10);
        assert_eq!(config.port.health_check_interval(), Duration::from_secs(10));
        assert_eq!(config.storage.bucket, "25_logs");
        assert_eq!(config.storage.upload_timeout(), Duration::from_secs(50));
    }

    #[test]
    fn test_default_frequencies() {
        let hz: Vec<_> = ChannelFrequencies::default().iter().collect();
        assert_eq!(
            hz,
            vec![
                ("altimeter", 2.0),
                ("gps", 1.0),
                ("pitot", 2.0),
                ("tachometer", 1.0),
                ("servo", 2.0)
            ]
        );
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.history.high_water_mark, 20);
        assert_eq!(config.channels.servo, 2.0);
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[server]
bind = "127.0.0.1:9000"

[bridge]
base_url = "http://10.0.0.2:7878"
mode = "mock"

[history]
high_water_mark = 40
spill_size = 20

[channels]
gps = 5.0

[storage]
endpoint = "https://storage.example.com"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.bridge.mode, BridgeMode::Mock);
        assert_eq!(config.history.spill_size, 20);
        assert_eq!(config.channels.gps, 5.0);
        assert_eq!(config.channels.altimeter, 2.0);
        assert_eq!(config.storage.endpoint.as_deref(), Some("https://storage.example.com"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Config::load("/nonexistent/gateway.toml").unwrap_err();
        assert!(matches!(err, GatewayError::Io(_)));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(Config::parse("[bridge]\nmode = \"replay\"\n").is_err());
    }

    #[test]
    fn test_mode_override() {
        let mut config = Config::default();
        config.apply_mode_override(None);
        assert_eq!(config.bridge.mode, BridgeMode::Live);
        config.apply_mode_override(Some("live"));
        assert_eq!(config.bridge.mode, BridgeMode::Live);
        config.apply_mode_override(Some("mock"));
        assert_eq!(config.bridge.mode, BridgeMode::Mock);
    }

    #[test]
    fn test_spill_larger_than_high_water_mark() {
        let mut config = Config::default();
        config.history.spill_size = 21;
        assert!(config.validate().is_err());

        config.history.spill_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_high_water_mark() {
        let mut config = Config::default();
        config.history.high_water_mark = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_frequency() {
        let mut config = Config::default();
        config.channels.pitot = 0.0;
        assert!(config.validate().is_err());

        config.channels.pitot = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_bind() {
        let mut config = Config::default();
        config.server.bind = "localhost".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_bridge_url() {
        let mut config = Config::default();
        config.bridge.base_url = "localhost:7878".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bridge_timeout_bounds() {
        let mut config = Config::default();
        config.bridge.timeout_ms = 0;
        assert!(config.validate().is_err());
        config.bridge.timeout_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_health_check_interval_bounds() {
        let mut config = Config::default();
        config.port.health_check_interval_s = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_bucket() {
        let mut config = Config::default();
        config.storage.bucket = "a/b".to_string();
        assert!(config.validate().is_err());
        config.storage.bucket = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_storage_endpoint() {
        let mut config = Config::default();
        config.storage.endpoint = Some("storage.example.com".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_error_kind() {
        let err = Config::parse("[history]\nhigh_water_mark = 0\n").unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("high_water_mark"));
    }
}
