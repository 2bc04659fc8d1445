use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
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
    pub database: DatabaseConfig,
    pub sources: SourcesConfig,
    pub scheduler: SchedulerConfig,
    pub analytics: AnalyticsConfig,
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

        let database_path = env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./housing_portal.db"));

        let rate_limit_ms = parse_env_u64("SOURCE_RATE_LIMIT_MS", 500)?;

        let sources = SourcesConfig {
            ine_base_url: env::var("INE_BASE_URL")
                .unwrap_or_else(|_| "https://servicios.ine.es/wstempus/js/ES".to_string()),
            catastro_base_url: env::var("CATASTRO_BASE_URL").unwrap_or_else(|_| {
                "https://ovc.catastro.meh.es/OVCServCatastro/OVCWCFLibres".to_string()
            }),
            idealista_base_url: env::var("IDEALISTA_BASE_URL")
                .unwrap_or_else(|_| "https://api.idealista.com/3.5".to_string()),
            idealista_api_key: env::var("IDEALISTA_API_KEY").ok().filter(|v| !v.is_empty()),
            idealista_secret: env::var("IDEALISTA_SECRET").ok().filter(|v| !v.is_empty()),
            rate_limit: Duration::from_millis(rate_limit_ms),
            index_quarters: parse_env_u64("SOURCE_INDEX_QUARTERS", 24)? as usize,
            mortgage_months: parse_env_u64("SOURCE_MORTGAGE_MONTHS", 36)? as usize,
        };

        let scheduler = SchedulerConfig {
            enabled: env::var("SCHEDULER_ENABLED")
                .map(|v| v.trim().eq_ignore_ascii_case("true") || v.trim() == "1")
                .unwrap_or(true),
            refresh_interval: Duration::from_secs(parse_env_u64(
                "SCHEDULER_REFRESH_SECS",
                24 * 60 * 60,
            )?),
            forecast_interval: Duration::from_secs(parse_env_u64(
                "SCHEDULER_FORECAST_SECS",
                7 * 24 * 60 * 60,
            )?),
        };

        let analytics = AnalyticsConfig {
            avg_household_income_eur: parse_env_f64("ANALYTICS_AVG_INCOME_EUR", 35_000.0)?,
            mortgage_ltv: parse_env_f64("ANALYTICS_MORTGAGE_LTV", 0.80)?,
            mortgage_term_years: parse_env_u64("ANALYTICS_MORTGAGE_TERM_YEARS", 25)? as u32,
            reference_interest_rate: parse_env_f64("ANALYTICS_REFERENCE_RATE", 0.035)?,
            typical_home_m2: parse_env_f64("ANALYTICS_TYPICAL_HOME_M2", 80.0)?,
            housing_cost_income_share: parse_env_f64("ANALYTICS_INCOME_SHARE", 0.30)?,
            savings_rate: parse_env_f64("ANALYTICS_SAVINGS_RATE", 0.20)?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            database: DatabaseConfig { path: database_path },
            sources,
            scheduler,
            analytics,
        })
    }
}

fn parse_env_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

fn parse_env_f64(key: &'static str, default: f64) -> Result<f64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<f64>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
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

/// Location of the SQLite store.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Upstream endpoints, credentials, and the fetch window the pipeline asks
/// each adapter for.
#[derive(Debug, Clone)]
pub struct SourcesConfig {
    pub ine_base_url: String,
    pub catastro_base_url: String,
    pub idealista_base_url: String,
    pub idealista_api_key: Option<String>,
    pub idealista_secret: Option<String>,
    /// Minimum delay between successive requests to the same source.
    pub rate_limit: Duration,
    pub index_quarters: usize,
    pub mortgage_months: usize,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            ine_base_url: "https://servicios.ine.es/wstempus/js/ES".to_string(),
            catastro_base_url: "https://ovc.catastro.meh.es/OVCServCatastro/OVCWCFLibres"
                .to_string(),
            idealista_base_url: "https://api.idealista.com/3.5".to_string(),
            idealista_api_key: None,
            idealista_secret: None,
            rate_limit: Duration::from_millis(500),
            index_quarters: 24,
            mortgage_months: 36,
        }
    }
}

/// Cadence of the in-process background jobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub refresh_interval: Duration,
    pub forecast_interval: Duration,
}

/// Baseline constants for the affordability computations. These are policy
/// inputs, not derived values.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub avg_household_income_eur: f64,
    pub mortgage_ltv: f64,
    pub mortgage_term_years: u32,
    pub reference_interest_rate: f64,
    pub typical_home_m2: f64,
    pub housing_cost_income_share: f64,
    pub savings_rate: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            avg_household_income_eur: 35_000.0,
            mortgage_ltv: 0.80,
            mortgage_term_years: 25,
            reference_interest_rate: 0.035,
            typical_home_m2: 80.0,
            housing_cost_income_share: 0.30,
            savings_rate: 0.20,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a valid number")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidNumber { .. } => None,
        }
    }
}
