use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::membership::{ExchangeConfig, ProgramSettings, DEFAULT_MAX_ATTEMPTS};

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
    pub rewards: RewardsConfig,
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
            rewards: RewardsConfig::from_env()?,
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
}

/// Loyalty program knobs read from `REWARDS_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardsConfig {
    pub ledger_max_attempts: u32,
    pub utc_offset_minutes: i32,
    pub exchange_enabled: bool,
    pub exchange_rate: i64,
    pub exchange_minimum: i64,
    /// Coins per cycle day; days left out pay the built-in defaults.
    pub checkin_schedule: BTreeMap<u8, i64>,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        let exchange = ExchangeConfig::default();
        Self {
            ledger_max_attempts: DEFAULT_MAX_ATTEMPTS,
            utc_offset_minutes: 0,
            exchange_enabled: exchange.enabled,
            exchange_rate: exchange.coins_per_point,
            exchange_minimum: exchange.minimum_coins,
            checkin_schedule: BTreeMap::new(),
        }
    }
}

/// One day either side of UTC, exclusive.
const MAX_OFFSET_MINUTES: i32 = 24 * 60;

impl RewardsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let ledger_max_attempts =
            read_var("REWARDS_LEDGER_MAX_ATTEMPTS", defaults.ledger_max_attempts)?;
        if ledger_max_attempts < 1 {
            return Err(ConfigError::OutOfRange {
                key: "REWARDS_LEDGER_MAX_ATTEMPTS",
                constraint: "at least 1",
            });
        }

        let utc_offset_minutes =
            read_var("REWARDS_UTC_OFFSET_MINUTES", defaults.utc_offset_minutes)?;
        if utc_offset_minutes.abs() >= MAX_OFFSET_MINUTES {
            return Err(ConfigError::OutOfRange {
                key: "REWARDS_UTC_OFFSET_MINUTES",
                constraint: "strictly between -1440 and 1440",
            });
        }

        let exchange_enabled = match env::var("REWARDS_EXCHANGE_ENABLED") {
            Ok(value) => parse_flag(&value).ok_or(ConfigError::InvalidValue {
                key: "REWARDS_EXCHANGE_ENABLED",
                value,
            })?,
            Err(_) => defaults.exchange_enabled,
        };

        let exchange_rate = read_var("REWARDS_EXCHANGE_RATE", defaults.exchange_rate)?;
        if exchange_rate < 1 {
            return Err(ConfigError::OutOfRange {
                key: "REWARDS_EXCHANGE_RATE",
                constraint: "at least 1",
            });
        }

        let exchange_minimum =
            read_var("REWARDS_EXCHANGE_MINIMUM", defaults.exchange_minimum)?;
        if exchange_minimum < 0 {
            return Err(ConfigError::OutOfRange {
                key: "REWARDS_EXCHANGE_MINIMUM",
                constraint: "zero or more",
            });
        }

        let checkin_schedule = match env::var("REWARDS_CHECKIN_SCHEDULE") {
            Ok(value) if !value.trim().is_empty() => parse_checkin_schedule(&value)?,
            _ => defaults.checkin_schedule,
        };

        Ok(Self {
            ledger_max_attempts,
            utc_offset_minutes,
            exchange_enabled,
            exchange_rate,
            exchange_minimum,
            checkin_schedule,
        })
    }

    pub fn program_settings(&self) -> ProgramSettings {
        ProgramSettings {
            ledger_max_attempts: self.ledger_max_attempts,
            utc_offset_minutes: self.utc_offset_minutes,
        }
    }

    /// Initial exchange configuration seeded into a fresh store.
    pub fn exchange_config(&self) -> ExchangeConfig {
        ExchangeConfig {
            version: 1,
            coins_per_point: self.exchange_rate,
            minimum_coins: self.exchange_minimum,
            enabled: self.exchange_enabled,
        }
    }
}

fn read_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(default),
    }
}

/// Parses `day=coins` pairs such as `1=5,2=5,7=50`.
fn parse_checkin_schedule(value: &str) -> Result<BTreeMap<u8, i64>, ConfigError> {
    const KEY: &str = "REWARDS_CHECKIN_SCHEDULE";
    let invalid = || ConfigError::InvalidValue {
        key: KEY,
        value: value.to_string(),
    };

    let mut schedule = BTreeMap::new();
    for pair in value.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let (day, coins) = pair.split_once('=').ok_or_else(invalid)?;
        let day = day.trim().parse::<u8>().map_err(|_| invalid())?;
        let coins = coins.trim().parse::<i64>().map_err(|_| invalid())?;
        if !(1..=7).contains(&day) {
            return Err(ConfigError::OutOfRange {
                key: KEY,
                constraint: "keyed by cycle days 1 to 7",
            });
        }
        if coins < 1 {
            return Err(ConfigError::OutOfRange {
                key: KEY,
                constraint: "paying at least 1 coin per day",
            });
        }
        if schedule.insert(day, coins).is_some() {
            return Err(invalid());
        }
    }
    Ok(schedule)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str, value: String },
    OutOfRange { key: &'static str, constraint: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "{key} has an unparseable value '{value}'")
            }
            ConfigError::OutOfRange { key, constraint } => {
                write!(f, "{key} must be {constraint}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidValue { .. }
            | ConfigError::OutOfRange { .. } => None,
        }
    }
}
