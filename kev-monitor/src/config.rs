//! Configuration for the key-event monitor.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use kev_client::{ConnectionConfig, DEFAULT_PATTERN};
use kev_common::{Endpoint, EndpointError};
use serde::Deserialize;

/// Command-line arguments for the monitor
#[derive(Parser, Debug, Default)]
#[command(name = "kev-monitor")]
#[command(version)]
#[command(about = "Prints keyspace notifications, optionally with the key's value", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Store endpoint: host:port, tcp://host:port, unix:/path or /path
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// Channel pattern to subscribe to
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Do not look up the current value of each key
    #[arg(long)]
    pub no_lookup: bool,

    /// Output format for events
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// How events are written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    #[serde(default)]
    pub connection: ConnectionSection,
    #[serde(default)]
    pub subscription: SubscriptionSection,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Where and how to connect
#[derive(Debug, Deserialize, Default)]
pub struct ConnectionSection {
    #[serde(default)]
    pub endpoint: Endpoint,
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionSection {
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Enrich events with the key's current value
    #[serde(default = "default_lookup_values")]
    pub lookup_values: bool,
}

impl Default for SubscriptionSection {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            lookup_values: default_lookup_values(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct OutputSection {
    #[serde(default)]
    pub format: OutputFormat,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

fn default_lookup_values() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: Endpoint,
    pub connection: ConnectionConfig,
    pub pattern: String,
    pub lookup_values: bool,
    pub format: OutputFormat,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(CliArgs::parse())
    }

    /// Merge CLI args over the TOML file they point at, if any.
    pub fn resolve(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents =
                std::fs::read_to_string(config_path).map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
                path: config_path.clone(),
                source,
            })?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    fn merge(cli: CliArgs, file: TomlConfig) -> Result<Self, ConfigError> {
        let endpoint = match cli.endpoint {
            Some(raw) => raw.parse().map_err(|e| ConfigError::Endpoint(raw, e))?,
            None => file.connection.endpoint,
        };

        Ok(Config {
            endpoint,
            connection: ConnectionConfig {
                connect_timeout: file.connection.connect_timeout_ms.map(Duration::from_millis),
                read_timeout: file.connection.read_timeout_ms.map(Duration::from_millis),
                write_timeout: file.connection.write_timeout_ms.map(Duration::from_millis),
            },
            pattern: cli.pattern.unwrap_or(file.subscription.pattern),
            lookup_values: !cli.no_lookup && file.subscription.lookup_values,
            format: cli.format.unwrap_or(file.output.format),
            log_level: cli.log_level.unwrap_or(file.logging.level),
        })
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid endpoint '{0}': {1}")]
    Endpoint(String, EndpointError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::merge(CliArgs::default(), TomlConfig::default()).unwrap();
        assert_eq!(config.endpoint, Endpoint::tcp("127.0.0.1", 6379));
        assert_eq!(config.pattern, "__keyevent@*:*");
        assert!(config.lookup_values);
        assert_eq!(config.format, OutputFormat::Text);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.connection, ConnectionConfig::default());
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [connection]
            endpoint = "unix:/var/run/redis/redis.sock"
            connect_timeout_ms = 500
            read_timeout_ms = 30000

            [subscription]
            pattern = "__keyevent@0__:expired"
            lookup_values = false

            [output]
            format = "json"

            [logging]
            level = "debug"
        "#;

        let file: TomlConfig = toml::from_str(toml_str).unwrap();
        let config = Config::merge(CliArgs::default(), file).unwrap();
        assert_eq!(config.endpoint, Endpoint::unix("/var/run/redis/redis.sock"));
        assert_eq!(config.connection.connect_timeout, Some(Duration::from_millis(500)));
        assert_eq!(config.connection.read_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.connection.write_timeout, None);
        assert_eq!(config.pattern, "__keyevent@0__:expired");
        assert!(!config.lookup_values);
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_cli_overrides_file() {
        let file: TomlConfig = toml::from_str(
            r#"
            [connection]
            endpoint = "10.0.0.5:6379"
            [logging]
            level = "warn"
        "#,
        )
        .unwrap();
        let cli = CliArgs {
            endpoint: Some("/tmp/redis.sock".to_string()),
            pattern: Some("__keyspace@*:*".to_string()),
            no_lookup: true,
            format: Some(OutputFormat::Json),
            log_level: Some("trace".to_string()),
            ..CliArgs::default()
        };

        let config = Config::merge(cli, file).unwrap();
        assert_eq!(config.endpoint, Endpoint::unix("/tmp/redis.sock"));
        assert_eq!(config.pattern, "__keyspace@*:*");
        assert!(!config.lookup_values);
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_bad_endpoint_in_file_is_rejected() {
        let result: Result<TomlConfig, _> = toml::from_str(
            r#"
            [connection]
            endpoint = "localhost"
        "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_endpoint_on_cli_is_rejected() {
        let cli = CliArgs {
            endpoint: Some("localhost:notaport".to_string()),
            ..CliArgs::default()
        };
        assert!(matches!(
            Config::merge(cli, TomlConfig::default()),
            Err(ConfigError::Endpoint(..))
        ));
    }
}
