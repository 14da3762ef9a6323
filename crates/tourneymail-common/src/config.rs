//! Configuration for TourneyMail

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `TOURNEYMAIL__SMTP__HOST`
const ENV_PREFIX: &str = "TOURNEYMAIL";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Organization configuration
    #[serde(default)]
    pub organization: OrganizationConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Outbound SMTP configuration
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Delivery configuration
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Organization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationConfig {
    /// Display name used in summaries and the sender name
    #[serde(default = "default_organization_name")]
    pub name: String,

    /// UTC offset of the organization calendar, e.g. "+02:00".
    /// When absent the host's local time zone is used.
    ///
    /// The offset is fixed and does not follow daylight saving changes:
    /// an organization observing DST must update it at each switch, or
    /// leave it unset and run the host in the organization's time zone.
    pub utc_offset: Option<String>,
}

impl Default for OrganizationConfig {
    fn default() -> Self {
        Self {
            name: default_organization_name(),
            utc_offset: None,
        }
    }
}

impl OrganizationConfig {
    /// Parse the configured UTC offset
    pub fn offset(&self) -> crate::Result<Option<FixedOffset>> {
        match self.utc_offset.as_deref() {
            None => Ok(None),
            Some(raw) => raw.parse::<FixedOffset>().map(Some).map_err(|e| {
                crate::Error::Config(format!("Invalid organization.utc_offset '{}': {}", raw, e))
            }),
        }
    }
}

fn default_organization_name() -> String {
    "TourneyMail".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database backend: "postgres" or "memory"
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Database URL (for postgres)
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_db_backend(),
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_db_backend() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Outbound SMTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Send through SMTP; when false messages are only logged
    #[serde(default = "default_smtp_enabled")]
    pub enabled: bool,

    /// Relay host
    #[serde(default = "default_smtp_host")]
    pub host: String,

    /// Relay port
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Username for relay authentication
    pub username: Option<String>,

    /// Password for relay authentication
    pub password: Option<String>,

    /// Connection security: "tls", "starttls" or "none"
    #[serde(default = "default_smtp_tls")]
    pub tls: String,

    /// Sender address
    #[serde(default = "default_from_address")]
    pub from_address: String,

    /// Sender display name
    pub from_name: Option<String>,

    /// Per-send timeout in seconds
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            enabled: default_smtp_enabled(),
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            tls: default_smtp_tls(),
            from_address: default_from_address(),
            from_name: None,
            timeout_secs: default_smtp_timeout(),
        }
    }
}

fn default_smtp_enabled() -> bool {
    true
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_tls() -> String {
    "starttls".to_string()
}

fn default_from_address() -> String {
    "noreply@localhost.localdomain".to_string()
}

fn default_smtp_timeout() -> u64 {
    30
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Run the periodic poller
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,

    /// Interval between ticks in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Delay between consecutive sends of one batch, in milliseconds
    #[serde(default = "default_send_delay")]
    pub send_delay_ms: u64,

    /// How long a claimed item stays reserved before another tick may retry it
    #[serde(default = "default_lease")]
    pub lease_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            poll_interval_secs: default_poll_interval(),
            send_delay_ms: default_send_delay(),
            lease_secs: default_lease(),
        }
    }
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    60
}

fn default_send_delay() -> u64 {
    1500
}

fn default_lease() -> u64 {
    2 * 60 * 60
}

/// Delivery configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Address receiving a summary after each real batch
    pub supervisor_address: Option<String>,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind address
    #[serde(default = "default_api_bind")]
    pub bind: String,

    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_api_bind(),
            port: default_api_port(),
        }
    }
}

fn default_api_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from the first default file found, overlaid with
    /// `TOURNEYMAIL__SECTION__KEY` environment variables
    pub fn load() -> crate::Result<Self> {
        let paths = [
            PathBuf::from("./tourneymail.toml"),
            PathBuf::from("./config.toml"),
            PathBuf::from("/etc/tourneymail/config.toml"),
        ];

        let mut builder = config::Config::builder();
        if let Some(path) = paths.iter().find(|p| p.exists()) {
            tracing::debug!(path = %path.display(), "Using configuration file");
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))
    }

    /// Check cross-field constraints the type system cannot express
    pub fn validate(&self) -> crate::Result<()> {
        self.organization.offset()?;

        match self.database.backend.as_str() {
            "postgres" if self.database.url.is_none() => {
                return Err(crate::Error::Config(
                    "database.url is required for the postgres backend".to_string(),
                ));
            }
            "postgres" | "memory" => {}
            other => {
                return Err(crate::Error::Config(format!(
                    "Unsupported database backend: {}",
                    other
                )));
            }
        }

        if !matches!(self.smtp.tls.as_str(), "tls" | "starttls" | "none") {
            return Err(crate::Error::Config(format!(
                "Unsupported smtp.tls mode: {}",
                self.smtp.tls
            )));
        }

        if self.scheduler.poll_interval_secs == 0 {
            return Err(crate::Error::Config(
                "scheduler.poll_interval_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
