use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DispatcherError, Result};

/// Deployment environment; selects the log format and default level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Human-readable logs at debug level
    #[default]
    Local,
    /// JSON logs at debug level
    Dev,
    /// JSON logs at info level
    Prod,
}

impl Environment {
    pub fn default_log_level(&self) -> &'static str {
        match self {
            Environment::Local | Environment::Dev => "debug",
            Environment::Prod => "info",
        }
    }

    pub fn json_logs(&self) -> bool {
        !matches!(self, Environment::Local)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Local => write!(f, "local"),
            Environment::Dev => write!(f, "dev"),
            Environment::Prod => write!(f, "prod"),
        }
    }
}

/// HTTP ingress settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpServerConfig {
    pub address: SocketAddr,
    /// Upper bound on handling a single request
    pub timeout_ms: u64,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            timeout_ms: 4000,
        }
    }
}

/// Remote device service (gRPC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Endpoint URI, e.g. "http://127.0.0.1:50051"
    pub address: String,
    /// Deadline for each probe or dispatch call, and for each dispatch tick
    pub timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:50051".to_string(),
            timeout_ms: 1000,
        }
    }
}

/// Bounded queue and admission policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleBufferConfig {
    /// Number of queue slots
    pub max_size: u32,
    /// Acknowledge every pending overflow entry on each read, not only the
    /// one returned
    pub acknowledge_all_on_read: bool,
    /// Queue an item whose direct dispatch failed instead of rejecting it
    pub fallback_on_dispatch_failure: bool,
}

impl Default for CycleBufferConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            acknowledge_all_on_read: true,
            fallback_on_dispatch_failure: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub interval_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

/// Snapshot file location. Without a path the store is in-memory only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
}

/// Outbound event endpoint. Without one, events are only logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub env: Environment,
    pub http_server: HttpServerConfig,
    pub device: DeviceConfig,
    pub cycle_buffer: CycleBufferConfig,
    pub dispatch: DispatchConfig,
    pub storage: StorageConfig,
    pub telemetry: SinkConfig,
    pub report: SinkConfig,
}

impl DispatcherConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| DispatcherError::Config(e.to_string()))
    }

    /// Read and parse a TOML configuration file.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            DispatcherError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cycle_buffer.max_size == 0 {
            return Err(DispatcherError::Config(
                "cycle_buffer.max_size must be at least 1".to_string(),
            ));
        }
        if self.dispatch.interval_ms == 0 {
            return Err(DispatcherError::Config(
                "dispatch.interval_ms must be positive".to_string(),
            ));
        }
        if self.device.timeout_ms == 0 || self.http_server.timeout_ms == 0 {
            return Err(DispatcherError::Config(
                "timeouts must be positive".to_string(),
            ));
        }
        if self.device.address.trim().is_empty() {
            return Err(DispatcherError::Config(
                "device.address must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device.timeout_ms)
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.http_server.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatcher_config_default() {
        let cfg = DispatcherConfig::default();
        assert_eq!(cfg.env, Environment::Local);
        assert_eq!(cfg.http_server.address.to_string(), "0.0.0.0:8080");
        assert_eq!(cfg.device.address, "http://127.0.0.1:50051");
        assert_eq!(cfg.device_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.dispatch_interval(), Duration::from_secs(1));
        assert_eq!(cfg.cycle_buffer.max_size, 10);
        assert!(cfg.cycle_buffer.acknowledge_all_on_read);
        assert!(!cfg.cycle_buffer.fallback_on_dispatch_failure);
        assert!(cfg.storage.path.is_none());
        assert!(cfg.telemetry.endpoint.is_none());
        assert!(cfg.report.endpoint.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = DispatcherConfig::from_toml_str(
            r#"
            env = "prod"

            [cycle_buffer]
            max_size = 3

            [telemetry]
            endpoint = "http://collector:9000/events"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.env, Environment::Prod);
        assert_eq!(cfg.cycle_buffer.max_size, 3);
        assert!(cfg.cycle_buffer.acknowledge_all_on_read);
        assert_eq!(
            cfg.telemetry.endpoint.as_deref(),
            Some("http://collector:9000/events")
        );
        assert_eq!(cfg.dispatch.interval_ms, 1000);
    }

    #[test]
    fn full_toml() {
        let cfg = DispatcherConfig::from_toml_str(
            r#"
            env = "dev"

            [http_server]
            address = "127.0.0.1:9090"
            timeout_ms = 2500

            [device]
            address = "http://devices:7000"
            timeout_ms = 500

            [cycle_buffer]
            max_size = 64
            acknowledge_all_on_read = false
            fallback_on_dispatch_failure = true

            [dispatch]
            interval_ms = 250

            [storage]
            path = "/var/lib/dispatcher/queue.json"

            [report]
            endpoint = "http://users:8081/test"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.http_server.address.port(), 9090);
        assert_eq!(cfg.request_timeout(), Duration::from_millis(2500));
        assert_eq!(cfg.device.address, "http://devices:7000");
        assert_eq!(cfg.device_timeout(), Duration::from_millis(500));
        assert!(!cfg.cycle_buffer.acknowledge_all_on_read);
        assert!(cfg.cycle_buffer.fallback_on_dispatch_failure);
        assert_eq!(cfg.dispatch_interval(), Duration::from_millis(250));
        assert_eq!(
            cfg.storage.path,
            Some(PathBuf::from("/var/lib/dispatcher/queue.json"))
        );
        assert_eq!(cfg.report.endpoint.as_deref(), Some("http://users:8081/test"));
    }

    #[test]
    fn unknown_env_is_rejected() {
        let err = DispatcherConfig::from_toml_str(r#"env = "staging""#).unwrap_err();
        assert!(matches!(err, DispatcherError::Config(_)));
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut cfg = DispatcherConfig::default();
        cfg.cycle_buffer.max_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_intervals() {
        let mut cfg = DispatcherConfig::default();
        cfg.dispatch.interval_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = DispatcherConfig::default();
        cfg.device.timeout_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn environment_log_settings() {
        assert_eq!(Environment::Local.default_log_level(), "debug");
        assert!(!Environment::Local.json_logs());
        assert_eq!(Environment::Dev.default_log_level(), "debug");
        assert!(Environment::Dev.json_logs());
        assert_eq!(Environment::Prod.default_log_level(), "info");
        assert!(Environment::Prod.json_logs());
    }
}
