use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Which `EventStore` implementation backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redb,
    Memory,
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Fallbacks for the Lambda runtime, where only `/tmp` is writable.
pub const LAMBDA_DEFAULTS: &[(&str, &str)] = &[
    ("EVENTS_DB_PATH", "/tmp/events.redb"),
    ("EVENTS_LOG_FORMAT", "json"),
];

/// Server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub store: StoreBackend,
    pub db_path: PathBuf,
    pub allowed_origins: Vec<String>,
    pub strict_fields: bool,
    pub request_timeout: Duration,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from environment variables, using `defaults` for
    /// unset or blank variables before the built-in defaults.
    pub fn from_env_with_defaults(defaults: &[(&str, &str)]) -> Result<Self, ConfigError> {
        Self::from_lookup_with_defaults(|key| std::env::var(key).ok(), defaults)
    }

    pub fn from_lookup_with_defaults(
        lookup: impl Fn(&str) -> Option<String>,
        defaults: &[(&str, &str)],
    ) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| {
                    defaults
                        .iter()
                        .find(|(name, _)| *name == key)
                        .map(|(_, value)| value.to_string())
                })
        })
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_addr = var("EVENTS_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("EVENTS_LISTEN_ADDR", "must be a valid socket address")
            })?;

        let store = match var("EVENTS_STORE").as_deref().map(str::to_ascii_lowercase) {
            None => StoreBackend::Redb,
            Some(s) if s == "redb" => StoreBackend::Redb,
            Some(s) if s == "memory" => StoreBackend::Memory,
            Some(_) => {
                return Err(ConfigError::Invalid(
                    "EVENTS_STORE",
                    "expected \"redb\" or \"memory\"",
                ))
            }
        };

        let db_path = var("EVENTS_DB_PATH")
            .unwrap_or_else(|| "./events.redb".to_string())
            .into();

        let allowed_origins = var("EVENTS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();

        let strict_fields = match var("EVENTS_STRICT_FIELDS") {
            None => false,
            Some(v) => parse_bool(&v).ok_or(ConfigError::Invalid(
                "EVENTS_STRICT_FIELDS",
                "expected true or false",
            ))?,
        };

        let request_timeout_secs: u64 = var("EVENTS_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("EVENTS_REQUEST_TIMEOUT_SECS", "must be a whole number")
            })?;
        if request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "EVENTS_REQUEST_TIMEOUT_SECS",
                "must be greater than zero",
            ));
        }

        let log_format = match var("EVENTS_LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            None => LogFormat::Text,
            Some(s) if s == "text" => LogFormat::Text,
            Some(s) if s == "json" => LogFormat::Json,
            Some(_) => {
                return Err(ConfigError::Invalid(
                    "EVENTS_LOG_FORMAT",
                    "expected \"text\" or \"json\"",
                ))
            }
        };

        Ok(Config {
            listen_addr,
            store,
            db_path,
            allowed_origins,
            strict_fields,
            request_timeout: Duration::from_secs(request_timeout_secs),
            log_format,
        })
    }

    /// A configuration with an in-memory store, for tests.
    pub fn for_testing() -> Self {
        Config {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            store: StoreBackend::Memory,
            db_path: PathBuf::from("/tmp/events-test.redb"),
            allowed_origins: vec!["*".to_string()],
            strict_fields: false,
            request_timeout: Duration::from_secs(30),
            log_format: LogFormat::Text,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid(&'static str, &'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid(var, msg) => write!(f, "Invalid value for {}: {}", var, msg),
        }
    }
}

impl std::error::Error for ConfigError {}
