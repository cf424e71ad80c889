use config::{self, File};
use log::{debug, warn};
use serde::Deserialize;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AgentError, Result};

/// Environment variable prefix, e.g. `ROUTERPULSE__INFLUX__TOKEN`
pub const ENV_PREFIX: &str = "ROUTERPULSE";

/// Default registry query
pub const DEFAULT_REGISTRY_QUERY: &str =
    "SELECT ip_address FROM routers WHERE ip_address IS NOT NULL AND ip_address <> ''";

/// Database connection configuration for the device registry
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Database host
    pub host: String,
    /// Database port
    #[serde(default = "default_database_port")]
    pub port: u16,
    /// Database name
    pub name: String,
    /// Database username
    pub username: String,
    /// Database password
    #[serde(default)]
    pub password: String,
    /// SSL mode
    #[serde(default)]
    pub ssl_mode: SslMode,
    /// CA certificate path
    #[serde(default)]
    pub ca_cert: Option<String>,
    /// Client certificate path
    #[serde(default)]
    pub client_cert: Option<String>,
    /// Client key path
    #[serde(default)]
    pub client_key: Option<String>,
    /// Query returning one address per row in its first column
    #[serde(default = "default_registry_query")]
    pub query: String,
}

fn default_database_port() -> u16 {
    5432
}

fn default_registry_query() -> String {
    DEFAULT_REGISTRY_QUERY.to_string()
}

/// SSL mode for database connections
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// Disable SSL
    #[default]
    Disable,
    /// Allow SSL
    Allow,
    /// Prefer SSL
    Prefer,
    /// Require SSL
    Require,
    /// Verify CA
    VerifyCa,
    /// Verify full
    VerifyFull,
}

/// InfluxDB v2 write endpoint
#[derive(Debug, Deserialize, Clone)]
pub struct InfluxConfig {
    /// Base URL, e.g. `http://localhost:8086`
    #[serde(default)]
    pub url: String,
    /// API token
    #[serde(default)]
    pub token: String,
    /// Organisation
    #[serde(default)]
    pub org: String,
    /// Bucket
    #[serde(default)]
    pub bucket: String,
    /// HTTP timeout in seconds
    #[serde(default = "default_influx_timeout")]
    pub timeout: u64,
    /// Maximum lines per write request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            org: String::new(),
            bucket: String::new(),
            timeout: default_influx_timeout(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_influx_timeout() -> u64 {
    10
}

fn default_batch_size() -> usize {
    5000
}

/// Scheme used to reach the device REST interface
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Https,
    Http,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Https => "https",
            Scheme::Http => "http",
        }
    }
}

/// Device credentials and per-device deadlines
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    /// Login name
    #[serde(default)]
    pub username: String,
    /// Password
    #[serde(default)]
    pub password: String,
    /// Port of the device's management interface
    #[serde(default = "default_device_port")]
    pub port: u16,
    /// http or https
    #[serde(default)]
    pub scheme: Scheme,
    /// Accept self-signed device certificates
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Per-command timeout in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,
    /// Additional read-only commands issued after the base set
    #[serde(default)]
    pub extra_commands: Vec<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            port: default_device_port(),
            scheme: Scheme::default(),
            accept_invalid_certs: true,
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
            extra_commands: Vec::new(),
        }
    }
}

impl DeviceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout)
    }
}

fn default_device_port() -> u16 {
    443
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    10
}

/// How devices are scheduled within one cycle
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CollectionMode {
    /// One task per device, bounded by `max_concurrent_devices`
    #[default]
    Parallel,
    /// One device at a time
    Sequential,
}

/// What happens to fields no classification table mentions
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFieldPolicy {
    /// Written with a type guessed from the value
    #[default]
    Infer,
    /// Silently dropped
    Drop,
}

/// Collection cycle behaviour
#[derive(Debug, Deserialize, Clone)]
pub struct CollectionConfig {
    #[serde(default)]
    pub mode: CollectionMode,
    #[serde(default = "default_max_concurrent_devices")]
    pub max_concurrent_devices: usize,
    #[serde(default)]
    pub unknown_fields: UnknownFieldPolicy,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            mode: CollectionMode::default(),
            max_concurrent_devices: default_max_concurrent_devices(),
            unknown_fields: UnknownFieldPolicy::default(),
        }
    }
}

fn default_max_concurrent_devices() -> usize {
    32
}

/// Agent configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// Time-series sink
    #[serde(default)]
    pub influx: InfluxConfig,
    /// Device credentials and deadlines
    #[serde(default)]
    pub device: DeviceConfig,
    /// Cycle behaviour
    #[serde(default)]
    pub collector: CollectionConfig,
    /// Device registry; when absent only `static_hosts` is polled
    #[serde(default)]
    pub registry: Option<DatabaseConfig>,
    /// Static device list, also the fallback when the registry is down
    #[serde(default)]
    pub static_hosts: Vec<String>,
    /// Collection interval in seconds
    #[serde(default = "default_collection_interval")]
    pub collection_interval: u64,
    /// Logging level
    #[serde(default)]
    pub log_level: LogLevel,
    /// Optional file receiving log output
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// Default collection interval
fn default_collection_interval() -> u64 {
    60
}

impl AgentConfig {
    /// Load from the optional file, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigBuilder::new();
        if let Some(path) = path {
            builder = builder.add_file(path);
        }
        let config: AgentConfig = builder.add_env(ENV_PREFIX).build()?;
        config.validate()?;
        Ok(config)
    }

    /// Collection interval as a duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.collection_interval)
    }

    /// Check that every required value is present
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        if self.influx.url.trim().is_empty() {
            missing.push("influx.url");
        }
        if self.influx.token.trim().is_empty() {
            missing.push("influx.token");
        }
        if self.influx.org.trim().is_empty() {
            missing.push("influx.org");
        }
        if self.influx.bucket.trim().is_empty() {
            missing.push("influx.bucket");
        }
        if self.device.username.trim().is_empty() {
            missing.push("device.username");
        }

        if !missing.is_empty() {
            return Err(AgentError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        if self.registry.is_none() && self.static_hosts.iter().all(|h| h.trim().is_empty()) {
            return Err(AgentError::Config(
                "either [registry] or static_hosts must be configured".to_string(),
            ));
        }

        if self.collection_interval == 0 {
            return Err(AgentError::Config(
                "collection_interval must be greater than zero".to_string(),
            ));
        }
        if self.device.connect_timeout == 0 || self.device.command_timeout == 0 {
            return Err(AgentError::Config(
                "device timeouts must be greater than zero".to_string(),
            ));
        }
        if self.influx.batch_size == 0 {
            return Err(AgentError::Config(
                "influx.batch_size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Logging level
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

/// Source of configuration
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// File path; the format follows the extension
    File(PathBuf),
    /// Environment variables with a prefix
    Environment(String),
    /// TOML string
    Toml(String),
}

/// Pick the file format from the path's extension
fn file_format(path: &Path) -> Result<config::FileFormat> {
    let extension = match path.extension() {
        Some(ext) => ext.to_string_lossy().to_lowercase(),
        None => {
            return Err(AgentError::Config(format!(
                "Configuration file has no extension: {}",
                path.display()
            )));
        }
    };

    match extension.as_str() {
        "toml" => Ok(config::FileFormat::Toml),
        "json" => Ok(config::FileFormat::Json),
        "yaml" | "yml" => Ok(config::FileFormat::Yaml),
        format => Err(AgentError::Config(format!(
            "Unsupported config format: {}",
            format
        ))),
    }
}

/// Load configuration from the given sources, later sources winning
pub fn load_config<T>(sources: Vec<ConfigSource>) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    let mut builder = config::Config::builder();

    for source in sources {
        match source {
            ConfigSource::File(path) => {
                if !path.exists() {
                    return Err(AgentError::Config(format!(
                        "Configuration file not found: {}",
                        path.display()
                    )));
                }

                let format = file_format(&path)?;
                debug!("Loading configuration from file: {}", path.display());
                builder = builder.add_source(File::from(path).format(format));
            }
            ConfigSource::Environment(prefix) => {
                debug!("Loading configuration from environment with prefix: {}", prefix);
                builder = builder.add_source(
                    config::Environment::with_prefix(&prefix)
                        .separator("__")
                        .list_separator(",")
                        .with_list_parse_key("static_hosts")
                        .with_list_parse_key("device.extra_commands")
                        .try_parsing(true),
                );
            }
            ConfigSource::Toml(toml_str) => {
                debug!("Loading configuration from TOML string");
                builder =
                    builder.add_source(File::from_str(&toml_str, config::FileFormat::Toml));
            }
        }
    }

    let config = builder
        .build()
        .map_err(|e| AgentError::Config(format!("Failed to build configuration: {}", e)))?;

    let result = config
        .try_deserialize()
        .map_err(|e| AgentError::Config(format!("Failed to deserialize configuration: {}", e)))?;

    Ok(result)
}

/// Configuration builder
pub struct ConfigBuilder<T: for<'de> Deserialize<'de>> {
    sources: Vec<ConfigSource>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: for<'de> Deserialize<'de> + Debug> ConfigBuilder<T> {
    /// Create a new config builder
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Add a file source
    pub fn add_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources
            .push(ConfigSource::File(path.as_ref().to_path_buf()));
        self
    }

    /// Add environment variables
    pub fn add_env(mut self, prefix: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Environment(prefix.into()));
        self
    }

    /// Add TOML string
    pub fn add_toml(mut self, toml: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Toml(toml.into()));
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<T> {
        if self.sources.is_empty() {
            warn!("No configuration sources given, using defaults only");
        }
        load_config::<T>(self.sources)
    }
}

impl<T: for<'de> Deserialize<'de> + Debug> Default for ConfigBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    const MINIMAL: &str = r#"
        static_hosts = ["10.0.0.1", "10.0.0.2"]

        [influx]
        url = "http://localhost:8086"
        token = "secret"
        org = "acme"
        bucket = "routers"

        [device]
        username = "monitor"
        password = "pw"
    "#;

    #[test]
    fn test_load_from_toml_file() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "{}", MINIMAL).unwrap();

        let config: AgentConfig = ConfigBuilder::new().add_file(file.path()).build().unwrap();
        config.validate().unwrap();

        assert_eq!(config.static_hosts, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(config.influx.bucket, "routers");
        assert_eq!(config.collection_interval, 60);
        assert_eq!(config.device.port, 443);
        assert_eq!(config.device.command_timeout(), Duration::from_secs(10));
        assert_eq!(config.collector.mode, CollectionMode::Parallel);
        assert_eq!(config.collector.unknown_fields, UnknownFieldPolicy::Infer);
        assert!(config.registry.is_none());
    }

    #[test]
    fn test_registry_section() {
        let toml_str = format!(
            "{}\n{}",
            MINIMAL,
            r#"
            [registry]
            host = "db"
            name = "inventory"
            username = "agent"
            ssl_mode = "verify-ca"
            "#
        );

        let config: AgentConfig = ConfigBuilder::new().add_toml(toml_str).build().unwrap();
        let registry = config.registry.unwrap();

        assert_eq!(registry.port, 5432);
        assert_eq!(registry.ssl_mode, SslMode::VerifyCa);
        assert_eq!(registry.query, DEFAULT_REGISTRY_QUERY);
    }

    #[test]
    fn test_later_sources_override() {
        let config: AgentConfig = ConfigBuilder::new()
            .add_toml(MINIMAL)
            .add_toml("collection_interval = 30\n[collector]\nmode = \"sequential\"")
            .build()
            .unwrap();

        assert_eq!(config.collection_interval, 30);
        assert_eq!(config.collector.mode, CollectionMode::Sequential);
        assert_eq!(config.influx.org, "acme");
    }

    #[test]
    fn test_missing_required_values() {
        let config: AgentConfig = ConfigBuilder::new()
            .add_toml("static_hosts = [\"10.0.0.1\"]")
            .build()
            .unwrap();

        match config.validate() {
            Err(AgentError::Config(msg)) => {
                assert!(msg.contains("influx.url"));
                assert!(msg.contains("influx.token"));
                assert!(msg.contains("device.username"));
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_needs_registry_or_static_hosts() {
        let toml_str = MINIMAL.replace("static_hosts = [\"10.0.0.1\", \"10.0.0.2\"]", "");
        let config: AgentConfig = ConfigBuilder::new().add_toml(toml_str).build().unwrap();

        assert!(matches!(config.validate(), Err(AgentError::Config(_))));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result: Result<AgentConfig> = ConfigBuilder::new()
            .add_file("/nonexistent/routerpulse.toml")
            .build();

        assert!(matches!(result, Err(AgentError::Config(_))));
    }
}
