//! Gateway configuration
//!
//! Every setting is a command line flag with an environment variable fallback.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use searchbus_backend::{InMemoryBackend, SearchBackend};
use thiserror::Error;

pub const DEFAULT_ADDRESS: &str = "realtime/search";
pub const DEFAULT_TEMPLATE_DIR: &str = "elasticsearch/templates";
pub const DEFAULT_TEMPLATE_SUFFIX: &str = ".yaml";
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_ELASTICSEARCH_URL: &str = "http://localhost:9200";
pub const DEFAULT_ELASTICSEARCH_TIMEOUT_SECS: u64 = 30;

/// Configuration errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("unsupported backend '{0}', expected one of: memory, elasticsearch")]
    UnsupportedBackend(String),

    #[error("backend '{0}' is not compiled into this build")]
    BackendUnavailable(&'static str),

    #[error("failed to create backend: {0}")]
    Backend(String),
}

/// Search engine the gateway talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Elasticsearch,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Elasticsearch => "elasticsearch",
        }
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(BackendKind::Memory),
            "elasticsearch" | "es" => Ok(BackendKind::Elasticsearch),
            _ => Err(ConfigError::UnsupportedBackend(value.to_string())),
        }
    }
}

/// Message-driven gateway for search engine operations
#[derive(Debug, Clone, Parser)]
#[command(name = "searchbus-gateway", version, about)]
pub struct GatewayArgs {
    /// Bus address the dispatcher registers on
    #[arg(long, env = "SEARCHBUS_ADDRESS", default_value = DEFAULT_ADDRESS)]
    pub address: String,

    /// Directory holding index template definitions
    #[arg(long, env = "SEARCHBUS_TEMPLATE_DIR", default_value = DEFAULT_TEMPLATE_DIR)]
    pub template_dir: PathBuf,

    /// File name suffix of template definitions
    #[arg(long, env = "SEARCHBUS_TEMPLATE_SUFFIX", default_value = DEFAULT_TEMPLATE_SUFFIX)]
    pub template_suffix: String,

    /// Fail bootstrap when a template already exists
    #[arg(long, env = "SEARCHBUS_TEMPLATE_CREATE_ONLY")]
    pub create_only: bool,

    /// Reply timeout for bootstrap template registration, in milliseconds
    #[arg(long, env = "SEARCHBUS_REPLY_TIMEOUT_MS", default_value_t = DEFAULT_REPLY_TIMEOUT_MS)]
    pub reply_timeout_ms: u64,

    /// Reply timeout for WebSocket requests, in milliseconds
    #[arg(
        long,
        env = "SEARCHBUS_REQUEST_TIMEOUT_MS",
        default_value_t = DEFAULT_REQUEST_TIMEOUT_MS
    )]
    pub request_timeout_ms: u64,

    /// HTTP listen address
    #[arg(long, env = "SEARCHBUS_BIND_ADDR", default_value = DEFAULT_BIND_ADDR)]
    pub bind: SocketAddr,

    /// Search backend: memory or elasticsearch
    #[arg(long, env = "SEARCHBUS_BACKEND", default_value = "memory")]
    pub backend: BackendKind,

    /// Elasticsearch base URL
    #[arg(long, env = "ELASTICSEARCH_URL", default_value = DEFAULT_ELASTICSEARCH_URL)]
    pub elasticsearch_url: String,

    /// Elasticsearch request timeout, in seconds
    #[arg(
        long,
        env = "ELASTICSEARCH_TIMEOUT_SECS",
        default_value_t = DEFAULT_ELASTICSEARCH_TIMEOUT_SECS
    )]
    pub elasticsearch_timeout_secs: u64,

    /// Emit logs as JSON
    #[arg(long, env = "SEARCHBUS_LOG_JSON")]
    pub log_json: bool,
}

impl GatewayArgs {
    /// Convert parsed flags into a validated configuration.
    pub fn into_config(self) -> Result<GatewayConfig, ConfigError> {
        let config = GatewayConfig {
            address: self.address,
            template_dir: self.template_dir,
            template_suffix: self.template_suffix,
            template_create_only: self.create_only,
            reply_timeout: Duration::from_millis(self.reply_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            bind_addr: self.bind,
            backend: self.backend,
            elasticsearch_url: self.elasticsearch_url,
            elasticsearch_timeout_secs: self.elasticsearch_timeout_secs,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Gateway settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Bus address the dispatcher is registered on
    pub address: String,
    /// Directory scanned for template definition files
    pub template_dir: PathBuf,
    /// File name suffix of template definition files
    pub template_suffix: String,
    /// Register templates with `create: true`
    pub template_create_only: bool,
    /// Reply timeout for each bootstrap template registration
    pub reply_timeout: Duration,
    /// Reply timeout for each WebSocket request
    pub request_timeout: Duration,
    pub bind_addr: SocketAddr,
    pub backend: BackendKind,
    pub elasticsearch_url: String,
    pub elasticsearch_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            template_dir: PathBuf::from(DEFAULT_TEMPLATE_DIR),
            template_suffix: DEFAULT_TEMPLATE_SUFFIX.to_string(),
            template_create_only: false,
            reply_timeout: Duration::from_millis(DEFAULT_REPLY_TIMEOUT_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            backend: BackendKind::Memory,
            elasticsearch_url: DEFAULT_ELASTICSEARCH_URL.to_string(),
            elasticsearch_timeout_secs: DEFAULT_ELASTICSEARCH_TIMEOUT_SECS,
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::Empty("address"));
        }
        if self.template_suffix.is_empty() {
            return Err(ConfigError::Empty("template suffix"));
        }
        if self.reply_timeout.is_zero() {
            return Err(ConfigError::Zero("reply timeout"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Zero("request timeout"));
        }
        if self.backend == BackendKind::Elasticsearch && self.elasticsearch_timeout_secs == 0 {
            return Err(ConfigError::Zero("elasticsearch timeout"));
        }
        Ok(())
    }

    /// Build the configured search backend
    pub fn create_backend(&self) -> Result<Arc<dyn SearchBackend>, ConfigError> {
        match self.backend {
            BackendKind::Memory => Ok(Arc::new(InMemoryBackend::new())),
            #[cfg(feature = "elasticsearch")]
            BackendKind::Elasticsearch => {
                use searchbus_backend::{ElasticsearchBackend, ElasticsearchConfig};

                let config = ElasticsearchConfig::new(&self.elasticsearch_url)
                    .with_timeout(self.elasticsearch_timeout_secs);
                let backend = ElasticsearchBackend::new(config)
                    .map_err(|err| ConfigError::Backend(err.to_string()))?;
                Ok(Arc::new(backend))
            }
            #[cfg(not(feature = "elasticsearch"))]
            BackendKind::Elasticsearch => Err(ConfigError::BackendUnavailable(
                BackendKind::Elasticsearch.as_str(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(flags: &[&str]) -> Result<GatewayConfig, ConfigError> {
        let mut argv = vec!["searchbus-gateway"];
        argv.extend_from_slice(flags);
        GatewayArgs::try_parse_from(argv).unwrap().into_config()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = parse(&[]).unwrap();
        assert_eq!(config, GatewayConfig::default());
        assert_eq!(config.address, "realtime/search");
        assert_eq!(config.template_dir, PathBuf::from("elasticsearch/templates"));
        assert_eq!(config.template_suffix, ".yaml");
        assert_eq!(config.reply_timeout, Duration::from_millis(500));
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
    }

    #[test]
    fn reads_flags() {
        let config = parse(&[
            "--address",
            "custom/search",
            "--create-only",
            "--reply-timeout-ms",
            "250",
            "--bind",
            "127.0.0.1:9000",
            "--backend",
            "Elasticsearch",
            "--elasticsearch-url",
            "http://es:9200",
        ])
        .unwrap();

        assert_eq!(config.address, "custom/search");
        assert!(config.template_create_only);
        assert_eq!(config.reply_timeout, Duration::from_millis(250));
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.backend, BackendKind::Elasticsearch);
        assert_eq!(config.elasticsearch_url, "http://es:9200");
    }

    #[test]
    fn every_setting_has_an_env_fallback() {
        let command = GatewayArgs::command();
        let env = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .and_then(|name| name.to_str())
                .map(str::to_string)
        };

        assert_eq!(env("address").as_deref(), Some("SEARCHBUS_ADDRESS"));
        assert_eq!(env("template_dir").as_deref(), Some("SEARCHBUS_TEMPLATE_DIR"));
        assert_eq!(env("template_suffix").as_deref(), Some("SEARCHBUS_TEMPLATE_SUFFIX"));
        assert_eq!(env("create_only").as_deref(), Some("SEARCHBUS_TEMPLATE_CREATE_ONLY"));
        assert_eq!(env("reply_timeout_ms").as_deref(), Some("SEARCHBUS_REPLY_TIMEOUT_MS"));
        assert_eq!(env("request_timeout_ms").as_deref(), Some("SEARCHBUS_REQUEST_TIMEOUT_MS"));
        assert_eq!(env("bind").as_deref(), Some("SEARCHBUS_BIND_ADDR"));
        assert_eq!(env("backend").as_deref(), Some("SEARCHBUS_BACKEND"));
        assert_eq!(env("elasticsearch_url").as_deref(), Some("ELASTICSEARCH_URL"));
        assert_eq!(
            env("elasticsearch_timeout_secs").as_deref(),
            Some("ELASTICSEARCH_TIMEOUT_SECS")
        );
    }

    #[test]
    fn rejects_invalid_values() {
        let argv = ["searchbus-gateway", "--reply-timeout-ms", "soon"];
        assert!(GatewayArgs::try_parse_from(argv).is_err());

        let argv = ["searchbus-gateway", "--backend", "solr"];
        let err = GatewayArgs::try_parse_from(argv).unwrap_err();
        assert!(err
            .to_string()
            .contains("unsupported backend 'solr', expected one of: memory, elasticsearch"));

        assert_eq!(
            parse(&["--reply-timeout-ms", "0"]).unwrap_err(),
            ConfigError::Zero("reply timeout")
        );
        assert_eq!(parse(&["--address", " "]).unwrap_err(), ConfigError::Empty("address"));
    }

    #[test]
    fn memory_backend_is_created() {
        let backend = GatewayConfig::default().create_backend().unwrap();
        assert_eq!(backend.name(), "memory");
    }
}
