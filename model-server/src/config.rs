//! Configuration for the model server.

use std::path::Path;

use config::builder::DefaultState;
use config::{Config as ConfigLoader, ConfigBuilder, Environment, File};
use serde::{Deserialize, Deserializer};

use crate::error::StartupError;

/// Main configuration structure for the model server.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub actors: ActorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Model catalog. Entries with `autoload` form the initial collection;
    /// every entry can be loaded later through the repository extension.
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// Primary listener, serves the full route table.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Secondary listener, serves the v2 surface only.
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,
    #[serde(default)]
    pub enable_secondary: bool,
    /// Runtime worker threads shared by every listener.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Log one latency entry per local model call.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub enable_latency_logging: bool,
    #[serde(default = "default_max_body")]
    pub max_request_body_bytes: usize,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            grpc_port: default_grpc_port(),
            enable_secondary: false,
            workers: default_workers(),
            enable_latency_logging: false,
            max_request_body_bytes: default_max_body(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

/// Remote actor runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ActorsConfig {
    /// Administrative endpoint of the actor runtime, distinct from the serving ports.
    #[serde(default = "default_host")]
    pub admin_host: String,
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
    /// Upper bound on a single remote invocation.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

impl Default for ActorsConfig {
    fn default() -> Self {
        Self {
            admin_host: default_host(),
            admin_port: default_admin_port(),
            mailbox_capacity: default_mailbox_capacity(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Built-in model implementations available to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Echoes instances back as predictions.
    Identity,
    /// Sums each numeric instance row.
    Sum,
}

/// Where a catalog model runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// In the serving process, called directly.
    #[default]
    Local,
    /// Behind an actor handle of the remote runtime.
    Remote,
}

/// One model catalog entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub kind: ModelKind,
    #[serde(default)]
    pub backend: Placement,
    #[serde(default = "default_true")]
    pub autoload: bool,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_grpc_port() -> u16 {
    8081
}
fn default_workers() -> usize {
    1
}
fn default_max_body() -> usize {
    100 * 1024 * 1024
}
fn default_shutdown_grace() -> u64 {
    30
}
fn default_admin_port() -> u16 {
    9071
}
fn default_mailbox_capacity() -> usize {
    64
}
fn default_call_timeout() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

/// Parse a boolean flag. Only `true` and `false` are accepted, ignoring case.
pub fn parse_flag(value: &str) -> Result<bool, StartupError> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(StartupError::Configuration(format!(
            "invalid boolean value '{}', expected true or false",
            value
        )))
    }
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(value),
        Flag::Text(text) => parse_flag(&text).map_err(serde::de::Error::custom),
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (MODEL_SERVER__SECTION__KEY format)
    /// 2. config.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, StartupError> {
        let loader = Self::builder()?
            .add_source(File::with_name("config").required(false))
            .add_source(Self::environment())
            .build()?;

        let config: Self = loader.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file, still honouring environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, StartupError> {
        let loader = Self::builder()?
            .add_source(File::from(path))
            .add_source(Self::environment())
            .build()?;

        let config: Self = loader.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn builder() -> Result<ConfigBuilder<DefaultState>, StartupError> {
        Ok(ConfigLoader::builder()
            .set_default("server.host", default_host())?
            .set_default("server.http_port", default_http_port() as i64)?
            .set_default("actors.admin_port", default_admin_port() as i64)?
            .set_default("logging.level", default_log_level())?)
    }

    fn environment() -> Environment {
        Environment::with_prefix("MODEL_SERVER")
            .separator("__")
            .try_parsing(true)
    }

    /// Reject settings that can never produce a working server.
    pub fn validate(&self) -> Result<(), StartupError> {
        if self.server.workers == 0 {
            return Err(StartupError::Configuration(
                "server.workers must be at least 1".to_string(),
            ));
        }
        if self.server.enable_secondary && self.server.grpc_port == self.server.http_port {
            return Err(StartupError::Configuration(format!(
                "secondary listener port {} collides with the primary port",
                self.server.grpc_port
            )));
        }
        if let Some(entry) = self.models.iter().find(|m| m.name.trim().is_empty()) {
            return Err(StartupError::Configuration(format!(
                "model entry of kind {:?} has an empty name",
                entry.kind
            )));
        }
        Ok(())
    }
}
