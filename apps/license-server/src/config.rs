use chrono::TimeDelta;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;
const DEFAULT_HEARTBEAT_WINDOW_SECS: i64 = 60;
const DEFAULT_ACCESS_LOG_CAPACITY: usize = 1000;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name}={value:?} is invalid: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// `None` runs on in-memory stores.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub store_timeout: Duration,
    pub legacy_admin_secret: Option<String>,
    pub creator_password: Option<String>,
    pub heartbeat_window: TimeDelta,
    pub access_log_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any name -> value source. Blank values count
    /// as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = parse(
            "BIND_ADDR",
            get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        )?;
        let database_max_connections: u32 =
            parse_or("DATABASE_MAX_CONNECTIONS", get("DATABASE_MAX_CONNECTIONS"), DEFAULT_MAX_CONNECTIONS)?;
        let store_timeout_ms: u64 =
            parse_or("STORE_TIMEOUT_MS", get("STORE_TIMEOUT_MS"), DEFAULT_STORE_TIMEOUT_MS)?;
        let heartbeat_window_secs: i64 = parse_or(
            "HEARTBEAT_WINDOW_SECS",
            get("HEARTBEAT_WINDOW_SECS"),
            DEFAULT_HEARTBEAT_WINDOW_SECS,
        )?;
        let access_log_capacity: usize = parse_or(
            "ACCESS_LOG_CAPACITY",
            get("ACCESS_LOG_CAPACITY"),
            DEFAULT_ACCESS_LOG_CAPACITY,
        )?;

        positive("DATABASE_MAX_CONNECTIONS", database_max_connections)?;
        positive("STORE_TIMEOUT_MS", store_timeout_ms)?;
        positive("HEARTBEAT_WINDOW_SECS", heartbeat_window_secs)?;
        positive("ACCESS_LOG_CAPACITY", access_log_capacity)?;
        let heartbeat_window =
            TimeDelta::try_seconds(heartbeat_window_secs).ok_or_else(|| ConfigError::Invalid {
                name: "HEARTBEAT_WINDOW_SECS",
                value: heartbeat_window_secs.to_string(),
                reason: "out of range".into(),
            })?;

        Ok(Self {
            bind_addr,
            database_url: get("DATABASE_URL"),
            database_max_connections,
            store_timeout: Duration::from_millis(store_timeout_ms),
            legacy_admin_secret: get("LEGACY_ADMIN_SECRET"),
            creator_password: get("CREATOR_PASSWORD"),
            heartbeat_window,
            access_log_capacity,
        })
    }
}

fn parse<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
        value,
    })
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value.map_or(Ok(default), |v| parse(name, v))
}

fn positive<T>(name: &'static str, value: T) -> Result<(), ConfigError>
where
    T: PartialOrd + Default + Display,
{
    if value > T::default() {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: "must be greater than zero".into(),
        })
    }
}
