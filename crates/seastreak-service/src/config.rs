//! Service configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::Time;
use time::macros::format_description;

use seastreak_core::{DriverOptions, RunOptions, UnresolvedDatePolicy};

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Daily schedule.
    pub schedule: ScheduleConfig,
    /// Fleet run tuning.
    pub run: RunConfig,
    /// Land-proximity oracle.
    pub oracle: OracleConfig,
    /// Security settings.
    pub security: SecurityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// # Example
    ///
    /// ```
    /// use seastreak_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.schedule.validate());
        errors.extend(self.run.validate());
        errors.extend(self.oracle.validate());
        errors.extend(self.security.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new(
                "server.bind",
                "bind address cannot be empty",
            ));
            return errors;
        }

        match self.bind.rsplit_once(':') {
            None => errors.push(ValidationError::new(
                "server.bind",
                format!(
                    "invalid bind address '{}': expected format 'host:port'",
                    self.bind
                ),
            )),
            Some((_, port)) => match port.parse::<u16>() {
                Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                Err(_) => errors.push(ValidationError::new(
                    "server.bind",
                    format!("invalid port '{}': must be a number 1-65535", port),
                )),
                Ok(_) => {}
            },
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: seastreak_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }

        errors
    }
}

/// Daily schedule configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Run the check automatically once a day.
    pub enabled: bool,
    /// UTC time of day to run, as `HH:MM`.
    pub run_at: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            run_at: "02:00".to_string(),
        }
    }
}

impl ScheduleConfig {
    /// Parse `run_at` into a time of day.
    pub fn run_at_time(&self) -> Option<Time> {
        Time::parse(&self.run_at, format_description!("[hour]:[minute]")).ok()
    }

    /// Validate schedule configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.run_at_time().is_none() {
            errors.push(ValidationError::new(
                "schedule.run_at",
                format!(
                    "invalid time '{}': expected 24-hour 'HH:MM' in UTC",
                    self.run_at
                ),
            ));
        }

        errors
    }
}

/// Minimum per-call timeout in seconds.
pub const MIN_CALL_TIMEOUT: u64 = 1;
/// Maximum per-call timeout in seconds (10 minutes).
pub const MAX_CALL_TIMEOUT: u64 = 600;
/// Maximum devices processed at once.
pub const MAX_CONCURRENT_DEVICES: usize = 64;

/// Fleet run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Devices processed at the same time.
    pub max_concurrent_devices: usize,
    /// Upper bound on each store or oracle call in seconds.
    pub call_timeout_secs: u64,
    /// What happens to later dates after an unresolved one.
    pub unresolved_date_policy: UnresolvedDatePolicy,
    /// Days of history a never-evaluated device starts with.
    pub initial_backlog_days: i64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrent_devices: 4,
            call_timeout_secs: 30,
            unresolved_date_policy: UnresolvedDatePolicy::Halt,
            initial_backlog_days: seastreak_types::INITIAL_BACKLOG_DAYS,
        }
    }
}

impl RunConfig {
    /// Per-call timeout.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Options for the per-device driver.
    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            call_timeout: self.call_timeout(),
            unresolved_date_policy: self.unresolved_date_policy,
            initial_backlog_days: self.initial_backlog_days,
        }
    }

    /// Options for the fleet controller.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            max_concurrent_devices: self.max_concurrent_devices,
            call_timeout: self.call_timeout(),
        }
    }

    /// Validate run configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.max_concurrent_devices == 0 || self.max_concurrent_devices > MAX_CONCURRENT_DEVICES
        {
            errors.push(ValidationError::new(
                "run.max_concurrent_devices",
                format!(
                    "{} is out of range (1-{})",
                    self.max_concurrent_devices, MAX_CONCURRENT_DEVICES
                ),
            ));
        }

        if !(MIN_CALL_TIMEOUT..=MAX_CALL_TIMEOUT).contains(&self.call_timeout_secs) {
            errors.push(ValidationError::new(
                "run.call_timeout_secs",
                format!(
                    "{} is out of range ({}-{} seconds)",
                    self.call_timeout_secs, MIN_CALL_TIMEOUT, MAX_CALL_TIMEOUT
                ),
            ));
        }

        if !(1..=366).contains(&self.initial_backlog_days) {
            errors.push(ValidationError::new(
                "run.initial_backlog_days",
                format!("{} is out of range (1-366)", self.initial_backlog_days),
            ));
        }

        errors
    }
}

/// Land-proximity oracle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Endpoint that counts a device-day's positions near land.
    pub url: String,
    /// Bearer token sent with each query.
    pub api_key: Option<String>,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:54321/rest/v1/rpc/count_positions_near_land".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl OracleConfig {
    /// Validate oracle configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = reqwest::Url::parse(&self.url) {
            errors.push(ValidationError::new(
                "oracle.url",
                format!("invalid url '{}': {}", self.url, e),
            ));
        }

        if !(MIN_CALL_TIMEOUT..=MAX_CALL_TIMEOUT).contains(&self.timeout_secs) {
            errors.push(ValidationError::new(
                "oracle.timeout_secs",
                format!(
                    "{} is out of range ({}-{} seconds)",
                    self.timeout_secs, MIN_CALL_TIMEOUT, MAX_CALL_TIMEOUT
                ),
            ));
        }

        errors
    }
}

/// Minimum API key length.
pub const MIN_API_KEY_LENGTH: usize = 16;

/// Security configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Require `X-API-Key` on every request except `/api/health`.
    pub api_key_enabled: bool,
    /// The expected API key.
    pub api_key: Option<String>,
}

impl SecurityConfig {
    /// Validate security configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.api_key_enabled {
            match &self.api_key {
                None => errors.push(ValidationError::new(
                    "security.api_key",
                    "api key must be set when api_key_enabled is true",
                )),
                Some(key) if key.len() < MIN_API_KEY_LENGTH => {
                    errors.push(ValidationError::new(
                        "security.api_key",
                        format!(
                            "api key is too short (minimum {} characters)",
                            MIN_API_KEY_LENGTH
                        ),
                    ))
                }
                Some(_) => {}
            }
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `run.call_timeout_secs`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("seastreak")
        .join("server.toml")
}
