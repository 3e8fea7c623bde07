use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use regex::RegexBuilder;
use tracing::trace;

use crate::Target;
use crate::actors::FlushFailurePolicy;
use crate::pipeline::{DEFAULT_FLUSH_PERIOD, PipelineSettings};
use crate::storage::TableNames;

/// Default per-request timeout in seconds
const DEFAULT_TIMEOUT_SECS: f64 = 3.0;

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database file
    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },

    /// PostgreSQL server, connection parameters default to the environment
    Postgres {
        #[serde(default = "crate::util::get_db_host")]
        host: String,
        #[serde(default = "crate::util::get_db_port")]
        port: u16,
        #[serde(default = "crate::util::get_db_user")]
        user: String,
        #[serde(default = "crate::util::get_db_password")]
        password: String,
        #[serde(default = "crate::util::get_db_name")]
        database: String,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./monitoring.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub targets: Vec<TargetConfig>,

    /// Default per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: f64,

    #[serde(default)]
    pub flush: FlushConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub tables: TableNames,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TargetConfig {
    pub url: String,

    /// Polling interval in seconds
    pub interval: f64,

    /// Regular expression searched in the response body
    pub pattern: Option<String>,

    /// Overrides the global timeout for this target
    pub timeout: Option<f64>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct FlushConfig {
    /// Seconds between two flushes of the result stream
    #[serde(default = "default_flush_interval")]
    pub result_interval: f64,

    /// Seconds between two flushes of the error stream
    #[serde(default = "default_flush_interval")]
    pub error_interval: f64,

    #[serde(default)]
    pub on_failure: FlushFailurePolicy,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            result_interval: default_flush_interval(),
            error_interval: default_flush_interval(),
            on_failure: FlushFailurePolicy::default(),
        }
    }
}

fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_flush_interval() -> f64 {
    DEFAULT_FLUSH_PERIOD.as_secs_f64()
}

/// Invalid configuration values, reported at startup
#[derive(Debug)]
pub enum ConfigError {
    NoTargets,
    InvalidUrl { url: String, reason: String },
    InvalidPattern { url: String, source: regex::Error },
    InvalidSeconds { field: String, value: f64 },
    InvalidTables(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoTargets => write!(f, "no targets configured"),
            ConfigError::InvalidUrl { url, reason } => write!(f, "invalid url '{url}': {reason}"),
            ConfigError::InvalidPattern { url, source } => {
                write!(f, "invalid pattern for '{url}': {source}")
            }
            ConfigError::InvalidSeconds { field, value } => {
                write!(f, "{field} must be a positive number of seconds, got {value}")
            }
            ConfigError::InvalidTables(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPattern { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn seconds(field: impl Into<String>, value: f64) -> Result<Duration, ConfigError> {
    if value > 0.0 {
        if let Ok(duration) = Duration::try_from_secs_f64(value) {
            return Ok(duration);
        }
    }

    Err(ConfigError::InvalidSeconds {
        field: field.into(),
        value,
    })
}

impl TargetConfig {
    /// Validate this entry and compile its pattern
    ///
    /// Patterns are compiled so that `.` also matches newlines.
    pub fn resolve(&self, default_timeout: Duration) -> Result<Target, ConfigError> {
        let parsed = reqwest::Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: self.url.clone(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let interval = seconds(format!("interval of '{}'", self.url), self.interval)?;

        let timeout = match self.timeout {
            Some(value) => seconds(format!("timeout of '{}'", self.url), value)?,
            None => default_timeout,
        };

        let pattern = self
            .pattern
            .as_deref()
            .map(|source| {
                RegexBuilder::new(source)
                    .dot_matches_new_line(true)
                    .build()
                    .map_err(|source| ConfigError::InvalidPattern {
                        url: self.url.clone(),
                        source,
                    })
            })
            .transpose()?;

        Ok(Target {
            url: self.url.clone(),
            interval,
            timeout,
            pattern,
        })
    }
}

/// Configuration with every value validated and converted
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub targets: Vec<Target>,
    pub timeout: Duration,
    pub settings: PipelineSettings,
    pub storage: StorageConfig,
    pub tables: TableNames,
}

impl Config {
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }

        let timeout = seconds("timeout", self.timeout)?;

        let targets = self
            .targets
            .iter()
            .map(|target| target.resolve(timeout))
            .collect::<Result<Vec<_>, _>>()?;

        let settings = PipelineSettings {
            result_flush_period: seconds("flush.result_interval", self.flush.result_interval)?,
            error_flush_period: seconds("flush.error_interval", self.flush.error_interval)?,
            failure_policy: self.flush.on_failure,
        };

        self.tables
            .validate()
            .map_err(|e| ConfigError::InvalidTables(e.to_string()))?;

        Ok(ResolvedConfig {
            targets,
            timeout,
            settings,
            storage: self.storage.clone(),
            tables: self.tables.clone(),
        })
    }
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content)
}
