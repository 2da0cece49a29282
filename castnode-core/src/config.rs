use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Serve the segment push endpoints. When disabled the node only
    /// exposes status.
    pub http_ingest: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8935,
            http_ingest: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Maximum gap between activity refreshes before a stream is reaped,
    /// in milliseconds.
    pub push_timeout_ms: u64,
    /// Maximum concurrent live streams.
    pub max_sessions: usize,
    /// Auth webhook URL; empty disables stream authentication.
    pub auth_webhook_url: String,
    /// Either a path to a JSON profile file or a comma-separated list of
    /// preset names. Empty selects the built-in default profile.
    pub transcoding_options: String,
    /// Orchestrator endpoints for segment dispatch.
    pub orchestrators: Vec<String>,
    /// Node identity used in recording layouts; defaults to the hostname.
    pub node_id: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            push_timeout_ms: 60_000,
            max_sessions: 10,
            auth_webhook_url: String::new(),
            transcoding_options: String::new(),
            orchestrators: Vec::new(),
            node_id: String::new(),
        }
    }
}

impl IngestConfig {
    #[must_use]
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Object store backend: "memory" or "file".
    pub backend: String,
    /// Base directory for the file backend.
    pub root: String,
    /// Recording store backend: "", "memory" or "file". Empty disables
    /// recording.
    pub record_backend: String,
    pub record_root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            root: "./castnode-data".to_string(),
            record_backend: String::new(),
            record_root: "./castnode-recordings".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" for development, "json" for production.
    pub format: String,
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, config::FileFormat::Yaml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("CASTNODE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Fail fast on misconfigurations.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.server.port == 0 {
            errors.push("server.port must be non-zero".to_string());
        }
        if self.ingest.push_timeout_ms < 10 {
            errors.push("ingest.push_timeout_ms must be at least 10".to_string());
        }
        if self.ingest.max_sessions == 0 {
            errors.push("ingest.max_sessions must be at least 1".to_string());
        }
        if !matches!(self.storage.backend.as_str(), "memory" | "file") {
            errors.push(format!(
                "storage.backend must be memory or file, got {}",
                self.storage.backend
            ));
        }
        if !matches!(self.storage.record_backend.as_str(), "" | "memory" | "file") {
            errors.push(format!(
                "storage.record_backend must be empty, memory or file, got {}",
                self.storage.record_backend
            ));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            errors.push(format!(
                "logging.format must be pretty or json, got {}",
                self.logging.format
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
