use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::workflows::review::journal::{DEFAULT_HISTORY_CAPACITY, DEFAULT_LOG_CAPACITY};
use crate::workflows::review::settings::{SettingsError, VerificationSettings};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub review: ReviewConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            review: ReviewConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Initial orchestrator settings plus the sizes of its in-memory buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewConfig {
    pub settings: VerificationSettings,
    pub log_capacity: usize,
    pub history_capacity: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            settings: VerificationSettings::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl ReviewConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = VerificationSettings::default();
        let settings = VerificationSettings {
            schedule: env::var("REVIEW_SCHEDULE")
                .map(|value| value.trim().to_string())
                .unwrap_or(defaults.schedule),
            concurrency: number("REVIEW_CONCURRENCY", defaults.concurrency)?,
            retry_attempts: number("REVIEW_RETRY_ATTEMPTS", defaults.retry_attempts)?,
            retry_delay_ms: number("REVIEW_RETRY_DELAY_MS", defaults.retry_delay_ms)?,
            item_delay_ms: number("REVIEW_ITEM_DELAY_MS", defaults.item_delay_ms)?,
            subject_delay_ms: number("REVIEW_SUBJECT_DELAY_MS", defaults.subject_delay_ms)?,
            skip_already_verified: flag("REVIEW_SKIP_VERIFIED", defaults.skip_already_verified)?,
            auto_start: flag("REVIEW_AUTO_START", defaults.auto_start)?,
        };
        settings.validate().map_err(ConfigError::Review)?;

        Ok(Self {
            settings,
            log_capacity: number("REVIEW_LOG_CAPACITY", DEFAULT_LOG_CAPACITY)?,
            history_capacity: number("REVIEW_HISTORY_CAPACITY", DEFAULT_HISTORY_CAPACITY)?,
        })
    }
}

fn number<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

fn flag(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { key }),
        },
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
    InvalidFlag { key: &'static str },
    Review(SettingsError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a non-negative integer")
            }
            ConfigError::InvalidFlag { key } => write!(f, "{key} must be true or false"),
            ConfigError::Review(err) => write!(f, "invalid review settings: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::Review(err) => Some(err),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidFlag { .. } => None,
        }
    }
}
