use chrono::Datelike;
use rust_decimal::Decimal;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use crate::workflows::estimates::rules::rate_in_range;
use crate::workflows::estimates::PlanningSettings;

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
    pub planning: PlanningSettings,
    pub data: DataConfig,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            planning: load_planning()?,
            data: load_data()?,
        })
    }
}

fn load_planning() -> Result<PlanningSettings, ConfigError> {
    let default_rate = match env::var("APP_DEFAULT_INCREASE") {
        Ok(raw) => {
            let rate = Decimal::from_str(raw.trim())
                .map_err(|_| ConfigError::InvalidDefaultIncrease { value: raw.clone() })?;
            if !rate_in_range(rate) {
                return Err(ConfigError::InvalidDefaultIncrease { value: raw });
            }
            rate
        }
        Err(_) => PlanningSettings::DEFAULT_RATE,
    };

    let current_year = match env::var("APP_CURRENT_YEAR") {
        Ok(raw) => raw
            .trim()
            .parse::<i32>()
            .map_err(|_| ConfigError::InvalidCurrentYear)?,
        Err(_) => chrono::Utc::now().year(),
    };

    let horizon_years = match env::var("APP_HORIZON_YEARS") {
        Ok(raw) => raw
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidHorizonYears)?,
        Err(_) => PlanningSettings::DEFAULT_HORIZON_YEARS,
    };

    let planning = PlanningSettings {
        default_rate,
        current_year,
        horizon_years,
    };
    if planning.last_projected_year().is_none() {
        return Err(ConfigError::InvalidHorizonYears);
    }
    Ok(planning)
}

fn load_data() -> Result<DataConfig, ConfigError> {
    let path = |key: &str| {
        env::var(key)
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from)
    };

    let data = DataConfig {
        reference_path: path("APP_REFERENCE_PATH"),
        actuals_path: path("APP_ACTUALS_PATH"),
        base_scenario_path: path("APP_BASE_SCENARIO_PATH"),
        base_scenario_name: env::var("APP_BASE_SCENARIO_NAME")
            .unwrap_or_else(|_| DataConfig::DEFAULT_BASE_SCENARIO_NAME.to_string()),
        base_version_name: env::var("APP_BASE_VERSION_NAME")
            .unwrap_or_else(|_| DataConfig::DEFAULT_BASE_VERSION_NAME.to_string()),
    };

    let needs_reference = data.actuals_path.is_some() || data.base_scenario_path.is_some();
    if needs_reference && data.reference_path.is_none() {
        return Err(ConfigError::MissingReferencePath);
    }
    Ok(data)
}

/// Planning data files loaded into the store when the service starts.
#[derive(Debug, Clone)]
pub struct DataConfig {
    /// JSON reference tables (courses, levels, fee groups, periods).
    pub reference_path: Option<PathBuf>,
    /// Actuals export, possibly holding several named snapshots.
    pub actuals_path: Option<PathBuf>,
    /// Scenario data export imported as the base scenario.
    pub base_scenario_path: Option<PathBuf>,
    pub base_scenario_name: String,
    pub base_version_name: String,
}

impl DataConfig {
    pub const DEFAULT_BASE_SCENARIO_NAME: &'static str = "Base";
    pub const DEFAULT_BASE_VERSION_NAME: &'static str = "published";
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            reference_path: None,
            actuals_path: None,
            base_scenario_path: None,
            base_scenario_name: Self::DEFAULT_BASE_SCENARIO_NAME.to_string(),
            base_version_name: Self::DEFAULT_BASE_VERSION_NAME.to_string(),
        }
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
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Full,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" | "verbose" => Self::Full,
            _ => Self::Compact,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidDefaultIncrease { value: String },
    InvalidCurrentYear,
    InvalidHorizonYears,
    MissingReferencePath,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidDefaultIncrease { value } => write!(
                f,
                "APP_DEFAULT_INCREASE must be a decimal rate between -1 and 10, got '{value}'"
            ),
            ConfigError::InvalidCurrentYear => write!(f, "APP_CURRENT_YEAR must be a year"),
            ConfigError::InvalidHorizonYears => write!(
                f,
                "APP_HORIZON_YEARS must be a non-negative integer that keeps the last projected year in range"
            ),
            ConfigError::MissingReferencePath => write!(
                f,
                "APP_REFERENCE_PATH is required when APP_ACTUALS_PATH or APP_BASE_SCENARIO_PATH is set"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidDefaultIncrease { .. }
            | ConfigError::InvalidCurrentYear
            | ConfigError::InvalidHorizonYears
            | ConfigError::MissingReferencePath => None,
        }
    }
}
