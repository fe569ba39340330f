//! Probe module for target monitoring.
//!
//! A probe is one bounded HTTP request. Every failure mode is folded into the
//! returned [`ProbeResult`]; probing never returns an error to the caller.

mod http;

pub use http::*;

use crate::config::ConfigError;
use crate::db::ProbeResult;

use reqwest::{Method, Url};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Inclusive range of HTTP status codes that count as healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthyStatusRange {
    pub min: u16,
    pub max: u16,
}

impl Default for HealthyStatusRange {
    fn default() -> Self {
        Self { min: 200, max: 399 }
    }
}

impl HealthyStatusRange {
    pub fn contains(&self, status: u16) -> bool {
        (self.min..=self.max).contains(&status)
    }
}

impl FromStr for HealthyStatusRange {
    type Err = ConfigError;

    /// Accepts `"200-399"` or a single code such as `"200"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidStatusRange(s.to_string());
        let parse_code = |part: &str| -> Result<u16, ConfigError> {
            let code: u16 = part.trim().parse().map_err(|_| invalid())?;
            if (100..=599).contains(&code) {
                Ok(code)
            } else {
                Err(invalid())
            }
        };

        let (min, max) = match s.split_once('-') {
            Some((lo, hi)) => (parse_code(lo)?, parse_code(hi)?),
            None => {
                let code = parse_code(s)?;
                (code, code)
            }
        };
        if min > max {
            return Err(invalid());
        }
        Ok(Self { min, max })
    }
}

impl fmt::Display for HealthyStatusRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub url: Url,
    pub method: Method,
    pub timeout: Duration,
    pub healthy: HealthyStatusRange,
    pub user_agent: String,
}

impl ProbeConfig {
    pub fn new(url: Url, timeout: Duration) -> Self {
        Self {
            url,
            method: Method::GET,
            timeout,
            healthy: HealthyStatusRange::default(),
            user_agent: crate::config::DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Stateless executor that reuses one HTTP client across probes.
#[derive(Debug, Clone)]
pub struct Prober {
    client: reqwest::Client,
    config: ProbeConfig,
}

impl Prober {
    pub fn new(config: ProbeConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Run exactly one probe against the configured target. No retries.
    pub async fn probe(&self) -> ProbeResult {
        run_http_probe(&self.client, &self.config).await
    }
}
