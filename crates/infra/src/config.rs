//! Process configuration, read from environment variables.

use std::time::Duration;

use thiserror::Error;

use vevurn_sales::BusinessClock;

use crate::engine::EngineConfig;

const DEV_JWT_SECRET: &str = "dev-secret";
const DEV_CALLBACK_TOKEN: &str = "dev-callback-token";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be set")]
    Missing { key: &'static str },

    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosConfig {
    pub bind_addr: String,
    pub jwt_secret: String,
    /// Shared secret the mobile-money provider sends in `X-Callback-Token`.
    pub callback_token: String,
    pub use_persistent_stores: bool,
    /// Required when `use_persistent_stores` is set.
    pub database_url: Option<String>,
    pub redis_url: String,
    pub vat_rate_bps: u32,
    pub business_utc_offset_minutes: i32,
    pub checkout_max_attempts: u32,
    pub checkout_retry_backoff: Duration,
    pub mobile_money_ttl: Duration,
    pub currency: String,
}

impl PosConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });
        let callback_token = get("MOBILE_MONEY_CALLBACK_TOKEN").unwrap_or_else(|| {
            tracing::warn!("MOBILE_MONEY_CALLBACK_TOKEN not set; using insecure dev default");
            DEV_CALLBACK_TOKEN.to_string()
        });

        let use_persistent_stores = parse_or(get("USE_PERSISTENT_STORES"), "USE_PERSISTENT_STORES", false)?;
        let database_url = get("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing { key: "DATABASE_URL" });
        }

        let vat_rate_bps: u32 = parse_or(get("VAT_RATE_BPS"), "VAT_RATE_BPS", 1_800)?;
        if vat_rate_bps > 10_000 {
            return Err(ConfigError::Invalid {
                key: "VAT_RATE_BPS",
                value: vat_rate_bps.to_string(),
                reason: "must be at most 10000".to_string(),
            });
        }

        let business_utc_offset_minutes: i32 =
            parse_or(get("BUSINESS_UTC_OFFSET_MINUTES"), "BUSINESS_UTC_OFFSET_MINUTES", 120)?;
        if business_utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::Invalid {
                key: "BUSINESS_UTC_OFFSET_MINUTES",
                value: business_utc_offset_minutes.to_string(),
                reason: "must be less than a day".to_string(),
            });
        }

        let checkout_max_attempts: u32 = parse_or(get("CHECKOUT_MAX_ATTEMPTS"), "CHECKOUT_MAX_ATTEMPTS", 3)?;
        if checkout_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "CHECKOUT_MAX_ATTEMPTS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let backoff_ms: u64 = parse_or(get("CHECKOUT_RETRY_BACKOFF_MS"), "CHECKOUT_RETRY_BACKOFF_MS", 25)?;
        let ttl_secs: u64 = parse_or(get("MOBILE_MONEY_TTL_SECS"), "MOBILE_MONEY_TTL_SECS", 300)?;

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            jwt_secret,
            callback_token,
            use_persistent_stores,
            database_url,
            redis_url: get("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string()),
            vat_rate_bps,
            business_utc_offset_minutes,
            checkout_max_attempts,
            checkout_retry_backoff: Duration::from_millis(backoff_ms),
            mobile_money_ttl: Duration::from_secs(ttl_secs),
            currency: get("CURRENCY").unwrap_or_else(|| "RWF".to_string()).to_uppercase(),
        })
    }

    pub fn business_clock(&self) -> Result<BusinessClock, ConfigError> {
        BusinessClock::from_offset_minutes(self.business_utc_offset_minutes).map_err(|e| {
            ConfigError::Invalid {
                key: "BUSINESS_UTC_OFFSET_MINUTES",
                value: self.business_utc_offset_minutes.to_string(),
                reason: e.to_string(),
            }
        })
    }

    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let mobile_money_ttl = chrono::Duration::from_std(self.mobile_money_ttl).map_err(|e| {
            ConfigError::Invalid {
                key: "MOBILE_MONEY_TTL_SECS",
                value: self.mobile_money_ttl.as_secs().to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(EngineConfig {
            vat_rate_bps: self.vat_rate_bps,
            clock: self.business_clock()?,
            max_attempts: self.checkout_max_attempts,
            retry_backoff: self.checkout_retry_backoff,
            mobile_money_ttl,
            currency: self.currency.clone(),
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}
