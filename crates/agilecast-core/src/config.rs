//! Runtime configuration with environment overrides.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::retry::RetryConfig;
use crate::Region;

/// Settings shared by the repository, cache and session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgileConfig {
    /// Root of the tariff REST API.
    pub base_url: String,
    /// Agile product code; the tariff code is derived per region.
    pub product_code: String,
    pub request_timeout_ms: u64,
    pub max_attempts: u32,
    /// Linear backoff unit: the n-th retry waits `n * retry_base_delay_ms`.
    pub retry_base_delay_ms: u64,
    pub cache_ttl_secs: u64,
    /// Entries older than this are swept regardless of TTL.
    pub sweep_age_secs: u64,
    /// Prefix of every store key written by the rate cache.
    pub cache_namespace: String,
    pub auto_refresh_secs: u64,
    pub default_region: Region,
}

impl Default for AgileConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://api.octopus.energy/v1"),
            product_code: String::from("AGILE-24-10-01"),
            request_timeout_ms: 10_000,
            max_attempts: 3,
            retry_base_delay_ms: 1_000,
            cache_ttl_secs: 60 * 60,
            sweep_age_secs: 7 * 24 * 60 * 60,
            cache_namespace: String::from("agilecast_rates"),
            auto_refresh_secs: 30 * 60,
            default_region: Region::C,
        }
    }
}

impl AgileConfig {
    /// Defaults overridden by `AGILECAST_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each known variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = non_empty(lookup("AGILECAST_BASE_URL")) {
            config.base_url = value.trim_end_matches('/').to_owned();
        }
        if let Some(value) = non_empty(lookup("AGILECAST_PRODUCT")) {
            config.product_code = value;
        }
        if let Some(value) = non_empty(lookup("AGILECAST_REGION")) {
            config.default_region = parse_var("AGILECAST_REGION", &value)?;
        }
        if let Some(value) = non_empty(lookup("AGILECAST_CACHE_TTL_SECS")) {
            config.cache_ttl_secs = parse_var("AGILECAST_CACHE_TTL_SECS", &value)?;
        }
        if let Some(value) = non_empty(lookup("AGILECAST_MAX_ATTEMPTS")) {
            config.max_attempts = parse_var("AGILECAST_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = non_empty(lookup("AGILECAST_AUTO_REFRESH_SECS")) {
            config.auto_refresh_secs = parse_var("AGILECAST_AUTO_REFRESH_SECS", &value)?;
        }

        Ok(config)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::linear(
            Duration::from_millis(self.retry_base_delay_ms),
            self.max_attempts,
        )
    }

    pub fn cache_ttl(&self) -> time::Duration {
        time::Duration::seconds(saturating_i64(self.cache_ttl_secs))
    }

    pub fn sweep_age(&self) -> time::Duration {
        time::Duration::seconds(saturating_i64(self.sweep_age_secs))
    }

    pub fn auto_refresh_period(&self) -> Duration {
        Duration::from_secs(self.auto_refresh_secs.max(1))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_var<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: value.to_owned(),
    })
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
