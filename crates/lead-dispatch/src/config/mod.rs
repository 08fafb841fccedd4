use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::allocation::{
    AllocationConfig, AllocationConfigError, AllocationStrategy, EvaluationPeriod,
    ValidatedConfig, DEFAULT_DECISION_BUDGET,
};

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
    pub dispatch: DispatchSettings,
}

impl AppConfig {
    /// Load from the process environment after applying any `.env` file.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment =
            AppEnvironment::from_str(&lookup("APP_ENV").unwrap_or_else(|| "development".into()));

        let host = lookup("APP_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = lookup("APP_PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = lookup("APP_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let log_format = parse_or(&lookup, "APP_LOG_FORMAT", LogFormat::Compact)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            dispatch: DispatchSettings::from_lookup(&lookup)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(default),
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Allocation policy plus the runtime knobs that sit beside it.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub allocation: ValidatedConfig,
    pub decision_budget: Duration,
    pub default_strategy: AllocationStrategy,
}

impl DispatchSettings {
    fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AllocationConfig::default();
        let mut allocation = defaults.clone();

        allocation.enabled = parse_or(lookup, "ALLOCATION_ENABLED", defaults.enabled)?;
        allocation.max_lead_share_percentage = parse_or(
            lookup,
            "ALLOCATION_MAX_LEAD_SHARE",
            defaults.max_lead_share_percentage,
        )?;
        allocation.evaluation_period = parse_or::<_, EvaluationPeriod>(
            lookup,
            "ALLOCATION_EVALUATION_PERIOD",
            defaults.evaluation_period,
        )?;
        allocation.rebalance_threshold = parse_or(
            lookup,
            "ALLOCATION_REBALANCE_THRESHOLD",
            defaults.rebalance_threshold,
        )?;

        let saturation = &mut allocation.saturation_protection;
        saturation.enabled = parse_or(
            lookup,
            "ALLOCATION_SATURATION_ENABLED",
            defaults.saturation_protection.enabled,
        )?;
        saturation.max_capacity_utilization = parse_or(
            lookup,
            "ALLOCATION_MAX_UTILIZATION",
            defaults.saturation_protection.max_capacity_utilization,
        )?;
        saturation.cooldown_minutes = parse_or(
            lookup,
            "ALLOCATION_COOLDOWN_MINUTES",
            defaults.saturation_protection.cooldown_minutes,
        )?;

        let weights = &mut allocation.weights;
        weights.fairness = parse_or(
            lookup,
            "ALLOCATION_FAIRNESS_WEIGHT",
            defaults.weights.fairness,
        )?;
        weights.performance = parse_or(
            lookup,
            "ALLOCATION_PERFORMANCE_WEIGHT",
            defaults.weights.performance,
        )?;
        weights.proximity = parse_or(
            lookup,
            "ALLOCATION_PROXIMITY_WEIGHT",
            defaults.weights.proximity,
        )?;

        let budget_ms = parse_or(
            lookup,
            "ALLOCATION_BUDGET_MS",
            DEFAULT_DECISION_BUDGET.as_millis() as u64,
        )?;
        let default_strategy = parse_or(
            lookup,
            "ALLOCATION_DEFAULT_STRATEGY",
            AllocationStrategy::WeightedRandom,
        )?;

        Ok(Self {
            allocation: allocation.validate()?,
            decision_budget: Duration::from_millis(budget_ms),
            default_strategy,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str, value: String },
    Allocation(AllocationConfigError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "{key} has an unusable value '{value}'")
            }
            ConfigError::Allocation(err) => write!(f, "invalid allocation policy: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidValue { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::Allocation(err) => Some(err),
        }
    }
}

impl From<AllocationConfigError> for ConfigError {
    fn from(err: AllocationConfigError) -> Self {
        ConfigError::Allocation(err)
    }
}
