//! Configuration module for PulseWatch.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Anything malformed or unsafe stops the process at startup.

use crate::probe::{HealthyStatusRange, ProbeConfig};

use reqwest::{Method, Url};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Smallest probe interval the scheduler accepts. Protects the target from
/// excessive load.
pub const MIN_INTERVAL: Duration = Duration::from_secs(300);

pub const DEFAULT_USER_AGENT: &str = "PulseWatch/1.0 (+ethical monitoring)";

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("probe interval of {interval:?} is below the minimum of {floor:?}")]
    IntervalBelowFloor { interval: Duration, floor: Duration },
    #[error("invalid target URL: {0}")]
    InvalidUrl(String),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("invalid healthy status range: {0:?} (expected e.g. \"200-399\")")]
    InvalidStatusRange(String),
    #[error("invalid value {value:?} for {var}")]
    InvalidValue { var: &'static str, value: String },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// What to probe and how often.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub target_url: String,
    pub method: Method,
    pub interval: Duration,
    pub timeout: Duration,
    pub healthy: HealthyStatusRange,
    pub manual_cooldown: Duration,
    pub user_agent: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            method: Method::GET,
            interval: MIN_INTERVAL,
            timeout: Duration::from_secs(10),
            healthy: HealthyStatusRange::default(),
            manual_cooldown: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl MonitorConfig {
    /// Check the ethical interval floor and the probe parameters.
    ///
    /// Returns the probe configuration the executor should run with.
    pub fn validate(&self) -> Result<ProbeConfig, ConfigError> {
        if self.interval < MIN_INTERVAL {
            return Err(ConfigError::IntervalBelowFloor {
                interval: self.interval,
                floor: MIN_INTERVAL,
            });
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout("must be greater than zero".to_string()));
        }
        if self.timeout >= self.interval {
            return Err(ConfigError::InvalidTimeout(format!(
                "{:?} must be shorter than the probe interval {:?}",
                self.timeout, self.interval
            )));
        }

        let url = Url::parse(&self.target_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{:?}: {}", self.target_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(format!(
                "{:?}: only http and https URLs with a host are supported",
                self.target_url
            )));
        }

        Ok(ProbeConfig {
            method: self.method.clone(),
            healthy: self.healthy,
            user_agent: self.user_agent.clone(),
            ..ProbeConfig::new(url, self.timeout)
        })
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address for the status API (default: 127.0.0.1)
    pub http_host: String,
    /// HTTP port for the status API (default: 5000)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "data/pulsewatch.db")
    pub db_path: String,
    /// Results older than this many days are trimmed; 0 keeps everything.
    pub retention_days: u32,
    pub monitor: MonitorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_host: "127.0.0.1".to_string(),
            http_port: 5000,
            db_path: "data/pulsewatch.db".to_string(),
            retention_days: 30,
            monitor: MonitorConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PULSEWATCH_HTTP_HOST`: bind address (default: 127.0.0.1)
    /// - `PULSEWATCH_HTTP_PORT`: HTTP port (default: 5000)
    /// - `PULSEWATCH_DB_PATH`: database file path (default: "data/pulsewatch.db")
    /// - `PULSEWATCH_RETENTION_DAYS`: retention in days, 0 disables (default: 30)
    /// - `PULSEWATCH_TARGET_URL`: URL to monitor (required)
    /// - `PULSEWATCH_METHOD`: `GET` or `HEAD` (default: GET)
    /// - `PULSEWATCH_INTERVAL_SECS`: probe interval, at least 300 (default: 300)
    /// - `PULSEWATCH_TIMEOUT_SECS`: probe timeout (default: 10)
    /// - `PULSEWATCH_HEALTHY_STATUS`: healthy status range (default: "200-399")
    /// - `PULSEWATCH_MANUAL_COOLDOWN_SECS`: manual trigger cooldown (default: 30)
    /// - `PULSEWATCH_USER_AGENT`: User-Agent header for probes
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(host) = lookup("PULSEWATCH_HTTP_HOST") {
            cfg.http_host = host;
        }
        if let Some(port) = parse_var::<u16, _>(&lookup, "PULSEWATCH_HTTP_PORT")? {
            cfg.http_port = port;
        }
        if let Some(db_path) = lookup("PULSEWATCH_DB_PATH") {
            cfg.db_path = db_path;
        }
        if let Some(days) = parse_var::<u32, _>(&lookup, "PULSEWATCH_RETENTION_DAYS")? {
            cfg.retention_days = days;
        }

        let monitor = &mut cfg.monitor;
        if let Some(url) = lookup("PULSEWATCH_TARGET_URL") {
            monitor.target_url = url.trim().to_string();
        }
        if let Some(method) = lookup("PULSEWATCH_METHOD") {
            monitor.method = match method.trim().to_ascii_uppercase().as_str() {
                "GET" => Method::GET,
                "HEAD" => Method::HEAD,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "PULSEWATCH_METHOD",
                        value: method,
                    })
                }
            };
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "PULSEWATCH_INTERVAL_SECS")? {
            monitor.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<f64, _>(&lookup, "PULSEWATCH_TIMEOUT_SECS")? {
            monitor.timeout = Duration::try_from_secs_f64(secs)
                .map_err(|_| ConfigError::InvalidTimeout(format!("{secs} seconds")))?;
        }
        if let Some(range) = lookup("PULSEWATCH_HEALTHY_STATUS") {
            monitor.healthy = range.parse()?;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "PULSEWATCH_MANUAL_COOLDOWN_SECS")? {
            monitor.manual_cooldown = Duration::from_secs(secs);
        }
        if let Some(agent) = lookup("PULSEWATCH_USER_AGENT") {
            monitor.user_agent = agent;
        }

        Ok(cfg)
    }

    /// Retention window, or `None` when retention is disabled.
    pub fn retention(&self) -> Option<chrono::Duration> {
        (self.retention_days > 0).then(|| chrono::Duration::days(i64::from(self.retention_days)))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(ConfigError::InvalidValue { var, value }),
        },
    }
}
