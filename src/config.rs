//! Configuration for reporting and recording
//!
//! Both configs load from environment variables (12-factor style) or from a
//! TOML document, and are checked by `validate()` before use.
//!
//! ## Report (`StatConfig`)
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | DIST_STAT_KEY_PREFIX | dist_stat | Bucket key prefix |
//! | DIST_STAT_PERIOD_START | 1970-01-01 00:00:00 | Anchor of the first bucket |
//! | DIST_STAT_PERIOD_SECS | 3600 | Bucket length in seconds |
//! | DIST_STAT_LINE_LIMIT | 40 | Initial positions per experiment |
//! | DIST_STAT_REDIS_URL | redis://127.0.0.1:6379/0 | Counter store |
//!
//! ## Recorder (`RecorderConfig`)
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | DIST_STAT_KEY_TTL_SECS | 0 | Expiry applied to bucket keys, 0 disables |
//! | DIST_STAT_FLUSH_MS | 1000 | Flush interval |

use crate::error::StatError;
use crate::stats::{BucketSelector, DEFAULT_LINE_LIMIT};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_KEY_PREFIX: &str = "dist_stat";
const DEFAULT_PERIOD: Duration = Duration::from_secs(3600);
const DEFAULT_FLUSH_PERIOD: Duration = Duration::from_secs(1);
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";

/// Accepted layouts for timestamps given on the command line or in env vars
const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y%m%d%H%M%S"];

/// Reporting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatConfig {
    /// Prefix of every bucket key
    pub key_prefix: String,
    /// Anchor of the bucket grid
    pub period_start: NaiveDateTime,
    /// Bucket length
    #[serde(with = "duration_secs")]
    pub period: Duration,
    /// Initial number of positions per experiment
    pub line_limit: usize,
    /// Counter store address
    pub redis_url: String,
}

impl Default for StatConfig {
    fn default() -> Self {
        StatConfig {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            period_start: unix_epoch(),
            period: DEFAULT_PERIOD,
            line_limit: DEFAULT_LINE_LIMIT,
            redis_url: DEFAULT_REDIS_URL.to_string(),
        }
    }
}

impl StatConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, StatError> {
        let defaults = StatConfig::default();
        let config = StatConfig {
            key_prefix: env_or("DIST_STAT_KEY_PREFIX", defaults.key_prefix),
            period_start: match std::env::var("DIST_STAT_PERIOD_START") {
                Ok(raw) => parse_timestamp(&raw)?,
                Err(_) => defaults.period_start,
            },
            period: match std::env::var("DIST_STAT_PERIOD_SECS") {
                Ok(raw) => Duration::from_secs(parse_env_number("DIST_STAT_PERIOD_SECS", &raw)?),
                Err(_) => defaults.period,
            },
            line_limit: match std::env::var("DIST_STAT_LINE_LIMIT") {
                Ok(raw) => parse_env_number("DIST_STAT_LINE_LIMIT", &raw)? as usize,
                Err(_) => defaults.line_limit,
            },
            redis_url: env_or("DIST_STAT_REDIS_URL", defaults.redis_url),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self, StatError> {
        let config: StatConfig = toml::from_str(s)
            .map_err(|e| StatError::invalid_config(format!("bad TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StatError> {
        if self.key_prefix.is_empty() {
            return Err(StatError::invalid_config("key_prefix is empty"));
        }
        if self.period.is_zero() {
            return Err(StatError::invalid_config("period is 0"));
        }
        if self.line_limit == 0 {
            return Err(StatError::invalid_config("line_limit must be positive"));
        }
        Ok(())
    }

    /// Bucket selector described by this configuration
    pub fn selector(&self) -> Result<BucketSelector, StatError> {
        BucketSelector::new(
            self.key_prefix.clone(),
            self.period_start,
            to_time_delta(self.period)?,
        )
    }
}

/// Counter recorder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Prefix of every bucket key
    pub key_prefix: String,
    /// Anchor of the bucket grid
    pub period_start: NaiveDateTime,
    /// Bucket length, a whole number of seconds
    #[serde(with = "duration_secs")]
    pub period: Duration,
    /// Expiry applied to a bucket key after each flush, zero disables
    #[serde(with = "duration_secs")]
    pub key_ttl: Duration,
    /// Interval between flushes
    #[serde(with = "duration_millis")]
    pub flush_period: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        RecorderConfig {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            period_start: unix_epoch(),
            period: DEFAULT_PERIOD,
            key_ttl: Duration::ZERO,
            flush_period: DEFAULT_FLUSH_PERIOD,
        }
    }
}

impl RecorderConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, StatError> {
        let defaults = RecorderConfig::default();
        let config = RecorderConfig {
            key_prefix: env_or("DIST_STAT_KEY_PREFIX", defaults.key_prefix),
            period_start: match std::env::var("DIST_STAT_PERIOD_START") {
                Ok(raw) => parse_timestamp(&raw)?,
                Err(_) => defaults.period_start,
            },
            period: match std::env::var("DIST_STAT_PERIOD_SECS") {
                Ok(raw) => Duration::from_secs(parse_env_number("DIST_STAT_PERIOD_SECS", &raw)?),
                Err(_) => defaults.period,
            },
            key_ttl: match std::env::var("DIST_STAT_KEY_TTL_SECS") {
                Ok(raw) => Duration::from_secs(parse_env_number("DIST_STAT_KEY_TTL_SECS", &raw)?),
                Err(_) => defaults.key_ttl,
            },
            flush_period: match std::env::var("DIST_STAT_FLUSH_MS") {
                Ok(raw) => Duration::from_millis(parse_env_number("DIST_STAT_FLUSH_MS", &raw)?),
                Err(_) => defaults.flush_period,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self, StatError> {
        let config: RecorderConfig = toml::from_str(s)
            .map_err(|e| StatError::invalid_config(format!("bad TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StatError> {
        if self.key_prefix.is_empty() {
            return Err(StatError::invalid_config("key_prefix is empty"));
        }
        if self.period.is_zero() {
            return Err(StatError::invalid_config("period is 0"));
        }
        if self.period.subsec_nanos() != 0 {
            return Err(StatError::invalid_config(
                "period is not an integer multiple of one second",
            ));
        }
        if self.flush_period.is_zero() {
            return Err(StatError::invalid_config("flush_period is 0"));
        }
        Ok(())
    }

    pub fn selector(&self) -> Result<BucketSelector, StatError> {
        BucketSelector::new(
            self.key_prefix.clone(),
            self.period_start,
            to_time_delta(self.period)?,
        )
    }

    pub fn key_ttl(&self) -> Option<Duration> {
        (!self.key_ttl.is_zero()).then_some(self.key_ttl)
    }
}

/// Parse a wall-clock timestamp in any of the accepted layouts
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, StatError> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| StatError::invalid_config(format!("unrecognised timestamp '{}'", raw)))
}

fn to_time_delta(period: Duration) -> Result<TimeDelta, StatError> {
    TimeDelta::from_std(period)
        .map_err(|_| StatError::invalid_config(format!("period {:?} is out of range", period)))
}

fn unix_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn parse_env_number(name: &str, raw: &str) -> Result<u64, StatError> {
    raw.trim()
        .parse()
        .map_err(|_| StatError::invalid_config(format!("{} must be a non-negative integer, got '{}'", name, raw)))
}

/// Serde helper for Duration as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde helper for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StatConfig::default();
        assert_eq!(config.key_prefix, "dist_stat");
        assert_eq!(config.period, Duration::from_secs(3600));
        assert_eq!(config.line_limit, 40);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stat_config_from_toml() {
        let config = StatConfig::from_toml_str(
            r#"
            key_prefix = "test"
            period_start = "2023-01-01T00:00:00"
            period = 1800
            line_limit = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.key_prefix, "test");
        assert_eq!(config.period, Duration::from_secs(1800));
        assert_eq!(config.line_limit, 10);
        assert_eq!(config.period_start, parse_timestamp("20230101000000").unwrap());
        // Unset fields keep their defaults
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn test_stat_config_rejects_zero_period() {
        assert!(StatConfig::from_toml_str("period = 0").is_err());
        assert!(StatConfig::from_toml_str("line_limit = 0").is_err());
        assert!(StatConfig::from_toml_str("key_prefix = \"\"").is_err());
    }

    #[test]
    fn test_stat_config_serialization_roundtrip() {
        let config = StatConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: StatConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_recorder_config_validation() {
        let mut config = RecorderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.key_ttl(), None);

        config.period = Duration::from_millis(1500);
        assert!(config.validate().is_err());

        config.period = Duration::from_secs(60);
        config.flush_period = Duration::ZERO;
        assert!(config.validate().is_err());

        config.flush_period = Duration::from_millis(200);
        config.key_ttl = Duration::from_secs(7200);
        assert!(config.validate().is_ok());
        assert_eq!(config.key_ttl(), Some(Duration::from_secs(7200)));
    }

    #[test]
    fn test_recorder_config_from_toml() {
        let config = RecorderConfig::from_toml_str(
            r#"
            key_prefix = "exp"
            period = 3600
            key_ttl = 86400
            flush_period = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.flush_period, Duration::from_millis(250));
        assert_eq!(config.key_ttl(), Some(Duration::from_secs(86400)));
    }

    #[test]
    fn test_parse_timestamp_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 7, 29)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-07-29 08:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-07-29T08:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("20240729083000").unwrap(), expected);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_selector_from_config() {
        let config = StatConfig {
            key_prefix: "test".to_string(),
            ..StatConfig::default()
        };
        let selector = config.selector().unwrap();
        assert_eq!(
            selector.bucket_key(parse_timestamp("2024-07-29 08:30:00").unwrap()),
            "test:20240729080000"
        );
    }
}
