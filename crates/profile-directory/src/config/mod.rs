use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::workflows::pipeline::tiers::FallbackMode;

const PLACEHOLDER_MARKERS: &[&str] = &["your-", "placeholder", "changeme", "example.com"];

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

    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub notifications: NotificationConfig,
    pub admin: AdminConfig,
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
        let log_format = match optional_var("APP_LOG_FORMAT") {
            Some(raw) => LogFormat::parse(&raw).ok_or(ConfigError::InvalidValue {
                key: "APP_LOG_FORMAT",
                value: raw,
            })?,
            None => LogFormat::Compact,
        };

        let database_url = optional_var("DATABASE_URL");
        let data_dir = optional_var("DIRECTORY_DATA_DIR").map(PathBuf::from);
        let fallback = match optional_var("STORAGE_FALLBACK") {
            Some(raw) => FallbackMode::parse(&raw).ok_or(ConfigError::InvalidValue {
                key: "STORAGE_FALLBACK",
                value: raw,
            })?,
            None => {
                let primary_configured = database_url
                    .as_deref()
                    .map(is_configured_descriptor)
                    .unwrap_or(false);
                if environment.is_production() && primary_configured {
                    FallbackMode::FailHard
                } else {
                    FallbackMode::Degrade
                }
            }
        };
        let expected_listings = parse_optional::<usize>("DIRECTORY_EXPECTED_LISTINGS")?;

        let notifications = NotificationConfig {
            endpoint: optional_var("EMAIL_ENDPOINT"),
            api_key: optional_var("EMAIL_API_KEY"),
            sender: optional_var("EMAIL_SENDER")
                .unwrap_or_else(|| "directory@localhost".to_string()),
            admin_email: optional_var("ADMIN_EMAIL"),
            timeout_ms: parse_optional::<u64>("EMAIL_TIMEOUT_MS")?.unwrap_or(5_000),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            storage: StorageConfig {
                database_url,
                data_dir,
                fallback,
                expected_listings,
            },
            notifications,
            admin: AdminConfig {
                shared_secret: optional_var("ADMIN_SECRET"),
            },
        })
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match optional_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(None),
    }
}

/// Returns `false` for blank descriptors and the stock values shipped in `.env` templates.
pub fn is_configured_descriptor(raw: &str) -> bool {
    let value = raw.trim().to_ascii_lowercase();
    !value.is_empty()
        && !PLACEHOLDER_MARKERS
            .iter()
            .any(|marker| value.contains(marker))
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

/// Output shape for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Where listing and submission data lives, and how hard the service tries to keep serving
/// when the primary store goes away.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub database_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub fallback: FallbackMode,
    pub expected_listings: Option<usize>,
}

impl StorageConfig {
    /// Connection descriptor for the primary store, ignoring template placeholders.
    pub fn primary_url(&self) -> Option<&str> {
        self.database_url
            .as_deref()
            .filter(|url| is_configured_descriptor(url))
    }
}

/// Outbound email collaborator settings.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub sender: String,
    pub admin_email: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub shared_secret: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "{key} has an unsupported value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidValue { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    /// Serializes tests that touch process environment variables.
    pub(crate) fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_LOG_FORMAT",
            "DATABASE_URL",
            "DIRECTORY_DATA_DIR",
            "STORAGE_FALLBACK",
            "DIRECTORY_EXPECTED_LISTINGS",
            "EMAIL_ENDPOINT",
            "EMAIL_API_KEY",
            "EMAIL_SENDER",
            "EMAIL_TIMEOUT_MS",
            "ADMIN_EMAIL",
            "ADMIN_SECRET",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.telemetry.format, LogFormat::Compact);
        assert_eq!(config.storage.fallback, FallbackMode::Degrade);
        assert!(config.storage.primary_url().is_none());
        assert_eq!(config.notifications.timeout_ms, 5_000);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn placeholder_database_url_counts_as_unconfigured() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DATABASE_URL", "sqlite://your-project.db");
        let config = AppConfig::load().expect("config loads");
        assert!(config.storage.primary_url().is_none());
        assert!(is_configured_descriptor("sqlite://directory.db"));
    }

    #[test]
    fn production_with_primary_defaults_to_fail_hard() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "production");
        env::set_var("DATABASE_URL", "sqlite://directory.db");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.storage.fallback, FallbackMode::FailHard);

        env::set_var("STORAGE_FALLBACK", "degrade");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.storage.fallback, FallbackMode::Degrade);
    }

    #[test]
    fn rejects_unknown_fallback_mode() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("STORAGE_FALLBACK", "sometimes");
        match AppConfig::load() {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "STORAGE_FALLBACK"),
            other => panic!("expected invalid value error, got {other:?}"),
        }
        reset_env();
    }
}
