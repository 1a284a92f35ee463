use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use url::Url;

const DEVELOPMENT_SIGNING_KEY: &str = "praevon-development-signing-key";
/// Longest validity window a capability URL may carry: seven days.
pub const MAX_URL_TTL_MINUTES: i64 = 7 * 24 * 60;

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
    pub storage: StorageConfig,
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
        let log_format = LogFormat::from_str(
            &env::var("APP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
        );

        let storage = StorageConfig::from_env(environment, port)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            storage,
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Object storage endpoint and capability URL signing settings.
#[derive(Clone)]
pub struct StorageConfig {
    pub base_url: Url,
    pub container: String,
    pub signing_key: Vec<u8>,
    pub url_ttl_minutes: i64,
}

impl StorageConfig {
    fn from_env(environment: AppEnvironment, port: u16) -> Result<Self, ConfigError> {
        let raw_base = env::var("STORAGE_BASE_URL")
            .unwrap_or_else(|_| format!("http://127.0.0.1:{port}/blob"));
        let base_url = Url::parse(&raw_base).map_err(|source| ConfigError::InvalidStorageUrl {
            value: raw_base.clone(),
            source,
        })?;
        if base_url.cannot_be_a_base() || base_url.query().is_some() {
            return Err(ConfigError::UnsupportedStorageUrl(raw_base));
        }

        let container = env::var("STORAGE_CONTAINER").unwrap_or_else(|_| "documents".to_string());
        if container.is_empty() || container.contains('/') {
            return Err(ConfigError::InvalidContainer(container));
        }

        let signing_key = match env::var("STORAGE_SIGNING_KEY") {
            Ok(key) if !key.is_empty() => key.into_bytes(),
            _ if environment == AppEnvironment::Production => {
                return Err(ConfigError::MissingSigningKey)
            }
            _ => DEVELOPMENT_SIGNING_KEY.as_bytes().to_vec(),
        };

        let url_ttl_minutes = env::var("STORAGE_URL_TTL_MINUTES")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<i64>()
            .ok()
            .filter(|minutes| (1..=MAX_URL_TTL_MINUTES).contains(minutes))
            .filter(|minutes| chrono::Duration::try_minutes(*minutes).is_some())
            .ok_or(ConfigError::InvalidUrlTtl)?;

        Ok(Self {
            base_url,
            container,
            signing_key,
            url_ttl_minutes,
        })
    }

    /// Validity window for issued URLs, clamped to `1..=MAX_URL_TTL_MINUTES`.
    pub fn url_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.url_ttl_minutes.clamp(1, MAX_URL_TTL_MINUTES))
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("base_url", &self.base_url.as_str())
            .field("container", &self.container)
            .field("signing_key", &"<redacted>")
            .field("url_ttl_minutes", &self.url_ttl_minutes)
            .finish()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidStorageUrl {
        value: String,
        source: url::ParseError,
    },
    UnsupportedStorageUrl(String),
    InvalidContainer(String),
    MissingSigningKey,
    InvalidUrlTtl,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidStorageUrl { value, .. } => {
                write!(f, "STORAGE_BASE_URL '{value}' is not an absolute URL")
            }
            ConfigError::UnsupportedStorageUrl(value) => {
                write!(f, "STORAGE_BASE_URL '{value}' must be a hierarchical URL without a query")
            }
            ConfigError::InvalidContainer(value) => {
                write!(f, "STORAGE_CONTAINER '{value}' must be a single path segment")
            }
            ConfigError::MissingSigningKey => {
                write!(f, "STORAGE_SIGNING_KEY is required in production")
            }
            ConfigError::InvalidUrlTtl => {
                write!(
                    f,
                    "STORAGE_URL_TTL_MINUTES must be an integer between 1 and {MAX_URL_TTL_MINUTES}"
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidStorageUrl { source, .. } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::UnsupportedStorageUrl(_)
            | ConfigError::InvalidContainer(_)
            | ConfigError::MissingSigningKey
            | ConfigError::InvalidUrlTtl => None,
        }
    }
}
