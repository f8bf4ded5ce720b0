//! Configuration for the USSD router.
//!
//! Loaded from `~/.ussd-router/config.json` when present, otherwise defaults
//! apply. Environment variables override individual fields.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

/// Route reserved for the liveness probe.
pub const HEALTH_PATH: &str = "/health";

/// Get the configuration directory.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".ussd-router"),
        |dirs| dirs.home_dir().join(".ussd-router"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Engine wiring
    #[serde(default)]
    pub router: RouterConfig,

    /// Session store eviction
    #[serde(default)]
    pub session: ExpiryConfig,

    /// Screen-state cache eviction
    #[serde(default)]
    pub state: ExpiryConfig,

    /// Canned replies used by the dispatcher
    #[serde(default)]
    pub messages: MessagesConfig,

    /// Logging
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("USSD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("USSD_PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid USSD_PORT"),
            }
        }
        if let Some(level) = lookup("USSD_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(adapter) = lookup("USSD_ADAPTER") {
            self.router.adapter = adapter;
        }
        if let Some(dir) = lookup("USSD_TEMPLATES_DIR") {
            self.router.templates_dir = Some(PathBuf::from(dir));
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.router.adapter.trim().is_empty() {
            return Err(Error::Config("router.adapter cannot be blank".into()));
        }
        self.session.validate("session")?;
        self.state.validate("state")?;
        if !self.server.path.starts_with('/') {
            return Err(Error::Config(format!(
                "server.path must start with '/', got `{}`",
                self.server.path
            )));
        }
        if self.server.path == HEALTH_PATH {
            return Err(Error::Config(format!("server.path cannot be {HEALTH_PATH}")));
        }
        Ok(())
    }
}

// ============================================================================
// Sections
// ============================================================================

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Route the carrier callback is mounted on
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
        }
    }
}

/// Engine wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Name of the protocol adapter in the adapter registry
    #[serde(default = "default_adapter")]
    pub adapter: String,

    /// Directory scanned for `.tmpl` / `.hbs` templates
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,

    /// Log every dispatch decision at info level
    #[serde(default)]
    pub debug: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            adapter: default_adapter(),
            templates_dir: None,
            debug: false,
        }
    }
}

/// Probe interval and time-to-live for one of the expiring maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryConfig {
    /// Seconds between eviction sweeps
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Seconds an entry may live before a sweep removes it
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
}

impl ExpiryConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    fn validate(&self, section: &str) -> crate::Result<()> {
        if self.probe_interval_secs == 0 {
            return Err(Error::Config(format!(
                "{section}.probe_interval_secs must be greater than zero"
            )));
        }
        if self.ttl_secs == 0 {
            return Err(Error::Config(format!("{section}.ttl_secs must be greater than zero")));
        }
        Ok(())
    }
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval(),
            ttl_secs: default_ttl(),
        }
    }
}

/// Replies the dispatcher sends on its own behalf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    /// Sent by the default not-found handler
    #[serde(default = "default_invalid_option")]
    pub invalid_option: String,

    /// Sent when the adapter rejects the request
    #[serde(default = "default_session_closed")]
    pub session_closed: String,

    /// Sent when a handler panics or a template cannot be rendered
    #[serde(default = "default_internal_error")]
    pub internal_error: String,

    /// Sent when a handler returns without writing a reply
    #[serde(default = "default_no_response")]
    pub no_response: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            invalid_option: default_invalid_option(),
            session_closed: default_session_closed(),
            internal_error: default_internal_error(),
            no_response: default_no_response(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    4460
}
fn default_path() -> String {
    "/ussd".into()
}
fn default_adapter() -> String {
    "africastalking".into()
}
fn default_probe_interval() -> u64 {
    30
}
fn default_ttl() -> u64 {
    120
}
fn default_invalid_option() -> String {
    "Invalid option".into()
}
fn default_session_closed() -> String {
    "Session closed".into()
}
fn default_internal_error() -> String {
    "Session terminated due to internal error".into()
}
fn default_no_response() -> String {
    "Unexpected end of session".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 4460);
        assert_eq!(config.server.path, "/ussd");
        assert_eq!(config.router.adapter, "africastalking");
        assert_eq!(config.session.probe_interval(), Duration::from_secs(30));
        assert_eq!(config.state.ttl(), Duration::from_secs(120));
        assert_eq!(config.messages.invalid_option, "Invalid option");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "session": { "ttl_secs": 300 }, "router": { "debug": true } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.session.ttl_secs, 300);
        assert_eq!(config.session.probe_interval_secs, 30);
        assert_eq!(config.state, ExpiryConfig::default());
        assert!(config.router.debug);
        assert_eq!(config.router.adapter, "africastalking");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "server": {{ "port": 9000 }}, "observability": {{ "level": "debug" }} }}"#)
            .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_load_from_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("USSD_PORT", "8081"),
            ("USSD_ADAPTER", "custom"),
            ("USSD_TEMPLATES_DIR", "/srv/templates"),
        ]);
        let mut config = Config::default();
        config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 8081);
        assert_eq!(config.router.adapter, "custom");
        assert_eq!(config.router.templates_dir, Some(PathBuf::from("/srv/templates")));
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_invalid_port_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides_from(|key| (key == "USSD_PORT").then(|| "eighty".to_string()));
        assert_eq!(config.server.port, 4460);
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = Config::default();
        config.state.ttl_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("state.ttl_secs"));
    }

    #[test]
    fn test_validate_rejects_blank_adapter() {
        let mut config = Config::default();
        config.router.adapter = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_health_path() {
        let mut config = Config::default();
        config.server.path = HEALTH_PATH.into();
        assert!(config.validate().is_err());

        config.server.path = "ussd".into();
        assert!(config.validate().is_err());
    }
}
