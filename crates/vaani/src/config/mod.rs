use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

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
    pub worker: WorkerConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("VAANI_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("VAANI_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("VAANI_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("VAANI_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let poll_interval_secs = env::var("VAANI_POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidPollInterval)?;

        let claim_batch = env::var("VAANI_CLAIM_BATCH")
            .unwrap_or_else(|_| "16".to_string())
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidClaimBatch)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            worker: WorkerConfig {
                poll_interval: Duration::from_secs(poll_interval_secs),
                claim_batch,
            },
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

/// Knobs for the delivery worker loop driving the scheduler.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub claim_batch: usize,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidPollInterval,
    InvalidClaimBatch,
    InvalidHost { source: std::net::AddrParseError },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "VAANI_PORT must be a valid u16"),
            ConfigError::InvalidPollInterval => {
                write!(f, "VAANI_POLL_INTERVAL_SECS must be a positive integer")
            }
            ConfigError::InvalidClaimBatch => {
                write!(f, "VAANI_CLAIM_BATCH must be a positive integer")
            }
            ConfigError::InvalidHost { .. } => {
                write!(f, "VAANI_HOST must parse to an IPv4 or IPv6 address")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort
            | ConfigError::InvalidPollInterval
            | ConfigError::InvalidClaimBatch => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
