//! Configuration loading and representation.
//!
//! The configuration is a TOML document; every field has a default so that an
//! empty (or missing) file yields a runnable development setup.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use companyhub_events::{Backpressure, QueueConfig};

pub const DEFAULT_EVENT_KEY_TEMPLATE: &str = "company.{{.Company}}.event.{{.EventType}}";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("render config: {0}")]
    Render(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub external_api: ExternalApiConfig,
    pub postgresql: PostgresqlConfig,
    pub kafka: KafkaConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`; `RUST_LOG` takes precedence.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalApiConfig {
    /// `ip:port` for the combined gRPC + REST listener.
    pub bind: String,
    pub tls_cert: String,
    pub tls_key: String,
    /// Name the loopback gateway expects on the server certificate.
    pub tls_server_name: String,
    pub jwt_secret: String,
    /// Empty disables CORS headers.
    pub cors_allow_origin: String,
    /// Directory served for `/api` docs and the static fallback.
    pub static_dir: String,
}

impl Default for ExternalApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            tls_cert: String::new(),
            tls_key: String::new(),
            tls_server_name: "localhost".to_string(),
            jwt_secret: String::new(),
            cors_allow_origin: String::new(),
            static_dir: "static".to_string(),
        }
    }
}

impl ExternalApiConfig {
    pub fn tls_enabled(&self) -> bool {
        !self.tls_cert.is_empty() && !self.tls_key.is_empty()
    }

    pub fn cors_origin(&self) -> Option<&str> {
        (!self.cors_allow_origin.is_empty()).then_some(self.cors_allow_origin.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresqlConfig {
    /// Empty selects the in-memory stores.
    pub dsn: String,
    pub automigrate: bool,
    pub max_open_connections: u32,
}

impl Default for PostgresqlConfig {
    fn default() -> Self {
        Self {
            dsn: "postgres://localhost/app?sslmode=disable".to_string(),
            automigrate: true,
            max_open_connections: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Empty disables publishing.
    pub brokers: Vec<String>,
    pub topic: String,
    pub event_key_template: String,
    pub tls: bool,
    pub username: String,
    pub password: String,
    /// `PLAIN` or `SCRAM`; only used when credentials are set.
    pub mechanism: String,
    /// `SHA256` or `SHA512`; only used with `SCRAM`.
    pub algorithm: String,
    pub queue_capacity: usize,
    pub backpressure: Backpressure,
    pub max_in_flight: usize,
    pub drain_timeout_secs: u64,
    pub message_timeout_secs: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        let queue = QueueConfig::default();
        Self {
            brokers: Vec::new(),
            topic: "companies".to_string(),
            event_key_template: DEFAULT_EVENT_KEY_TEMPLATE.to_string(),
            tls: false,
            username: String::new(),
            password: String::new(),
            mechanism: "PLAIN".to_string(),
            algorithm: "SHA512".to_string(),
            queue_capacity: queue.capacity,
            backpressure: queue.backpressure,
            max_in_flight: queue.max_in_flight,
            drain_timeout_secs: 10,
            message_timeout_secs: 30,
        }
    }
}

impl KafkaConfig {
    pub fn queue(&self) -> QueueConfig {
        QueueConfig {
            capacity: self.queue_capacity,
            backpressure: self.backpressure,
            max_in_flight: self.max_in_flight,
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_secs(self.message_timeout_secs)
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load from `path`, or use defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
