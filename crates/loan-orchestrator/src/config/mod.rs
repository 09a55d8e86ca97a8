use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

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
    pub letters: LetterConfig,
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

        let letter_dir = env::var("APP_LETTER_DIR").unwrap_or_else(|_| "generated".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            letters: LetterConfig {
                output_dir: letter_dir,
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

/// Where generated sanction letters are written.
#[derive(Debug, Clone)]
pub struct LetterConfig {
    pub output_dir: String,
}

/// Business thresholds driving underwriting and sanctioning.
///
/// Amounts are in a single currency-agnostic unit. The values mirror the
/// lending policy in force; nothing else in the codebase hard-codes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Loans at or below this amount sanction without human review.
    pub auto_approval_limit: f64,
    /// Scores below this reject regardless of amount.
    pub minimum_credit_score: u16,
    /// Amounts up to this multiple of the pre-approved limit may still
    /// qualify with salary verification.
    pub limit_stretch_multiplier: f64,
    /// Maximum EMI as a fraction of monthly income; the boundary is inclusive.
    pub max_emi_income_ratio: f64,
    /// Used when the credit bureau is unreachable or the customer is unknown.
    pub fallback_credit_score: u16,
    /// Used when the offer mart is unreachable or the customer is unknown.
    pub fallback_preapproved_limit: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            auto_approval_limit: 50_000.0,
            minimum_credit_score: 700,
            limit_stretch_multiplier: 2.0,
            max_emi_income_ratio: 0.5,
            fallback_credit_score: 650,
            fallback_preapproved_limit: 100_000,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
