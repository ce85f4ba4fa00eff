//! Configuration management for the bookclub service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Unlike a missing variable, a present but malformed one is an error.

use bookclub_core::UpdatePolicy;
use bookclub_core::validation::parse_time;
use chrono::{FixedOffset, NaiveTime};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while reading configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was set to a value that cannot be used
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        /// Environment variable name
        var: &'static str,
        /// Raw value found
        value: String,
        /// What was expected
        reason: &'static str,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Daily sweep schedule
    pub sweep: SweepConfig,
    /// Calendar settings
    pub clock: ClockConfig,
    /// Study rules and seed data
    pub study: StudyConfig,
    /// Logging and metrics
    pub server: ServerConfig,
}

/// Sweep scheduling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    /// Time of day the sweep fires, in the clock's offset (`SWEEP_AT`, default `00:00`)
    pub at: NaiveTime,
    /// Also sweep once at startup (`SWEEP_RUN_ON_START`, default `false`)
    pub run_on_start: bool,
}

/// Calendar settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockConfig {
    /// Offset used for "today" and for `SWEEP_AT` (`CLOCK_UTC_OFFSET_MINUTES`, default `0`)
    pub offset: FixedOffset,
}

/// Study rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyConfig {
    /// Which states may be edited (`STUDY_UPDATE_POLICY`, default `open-only`)
    pub update_policy: UpdatePolicy,
    /// Populate the in-memory backend on startup (`SEED_DEMO_DATA`, default `true`)
    pub seed_demo_data: bool,
}

/// Logging and metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    pub log_level: String,
    /// Install the Prometheus recorder (`METRICS_ENABLED`, default `true`)
    pub metrics_enabled: bool,
    /// Address reported for the metrics endpoint (`METRICS_ADDR`, default `0.0.0.0:9090`)
    pub metrics_addr: SocketAddr,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a variable is set but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let offset_minutes: i32 = parse_or(&lookup, "CLOCK_UTC_OFFSET_MINUTES", 0)?;

        Ok(Self {
            sweep: SweepConfig {
                at: time_or(&lookup, "SWEEP_AT", NaiveTime::MIN)?,
                run_on_start: flag_or(&lookup, "SWEEP_RUN_ON_START", false)?,
            },
            clock: ClockConfig {
                offset: offset_from_minutes(offset_minutes)?,
            },
            study: StudyConfig {
                update_policy: policy_or(&lookup, "STUDY_UPDATE_POLICY", UpdatePolicy::OpenOnly)?,
                seed_demo_data: flag_or(&lookup, "SEED_DEMO_DATA", true)?,
            },
            server: ServerConfig {
                log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                metrics_enabled: flag_or(&lookup, "METRICS_ENABLED", true)?,
                metrics_addr: parse_or(
                    &lookup,
                    "METRICS_ADDR",
                    SocketAddr::from(([0, 0, 0, 0], 9090)),
                )?,
            },
        })
    }
}

fn invalid(var: &'static str, value: String, reason: &'static str) -> ConfigError {
    ConfigError::Invalid { var, value, reason }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| invalid(var, raw, "cannot be parsed")),
    }
}

fn flag_or(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, raw, "expected true or false")),
    }
}

fn time_or(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: NaiveTime,
) -> Result<NaiveTime, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => parse_time(&raw).map_err(|_| invalid(var, raw, "expected HH:MM")),
    }
}

fn policy_or(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: UpdatePolicy,
) -> Result<UpdatePolicy, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    match raw.trim() {
        "open-only" => Ok(UpdatePolicy::OpenOnly),
        "any-state" => Ok(UpdatePolicy::AnyState),
        _ => Err(invalid(var, raw, "expected open-only or any-state")),
    }
}

fn offset_from_minutes(minutes: i32) -> Result<FixedOffset, ConfigError> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| {
            invalid(
                "CLOCK_UTC_OFFSET_MINUTES",
                minutes.to_string(),
                "must lie strictly between -1440 and 1440",
            )
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.sweep.at, NaiveTime::MIN);
        assert!(!config.sweep.run_on_start);
        assert_eq!(config.clock.offset, FixedOffset::east_opt(0).unwrap());
        assert_eq!(config.study.update_policy, UpdatePolicy::OpenOnly);
        assert!(config.study.seed_demo_data);
        assert_eq!(config.server.log_level, "info");
        assert!(config.server.metrics_enabled);
        assert_eq!(config.server.metrics_addr.port(), 9090);
    }

    #[test]
    fn overrides() {
        let config = load(&[
            ("SWEEP_AT", "04:30"),
            ("SWEEP_RUN_ON_START", "yes"),
            ("CLOCK_UTC_OFFSET_MINUTES", "540"),
            ("STUDY_UPDATE_POLICY", "any-state"),
            ("METRICS_ENABLED", "false"),
            ("METRICS_ADDR", "127.0.0.1:9100"),
            ("LOG_LEVEL", "debug"),
        ])
        .unwrap();

        assert_eq!(config.sweep.at, NaiveTime::from_hms_opt(4, 30, 0).unwrap());
        assert!(config.sweep.run_on_start);
        assert_eq!(config.clock.offset.local_minus_utc(), 9 * 3600);
        assert_eq!(config.study.update_policy, UpdatePolicy::AnyState);
        assert!(!config.server.metrics_enabled);
        assert_eq!(config.server.metrics_addr.port(), 9100);
        assert_eq!(config.server.log_level, "debug");
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = load(&[("SWEEP_AT", "25:00")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "SWEEP_AT", .. }));

        let err = load(&[("SWEEP_AT", "4:30")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "SWEEP_AT", .. }));

        let err = load(&[("STUDY_UPDATE_POLICY", "sometimes")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "STUDY_UPDATE_POLICY", .. }));

        let err = load(&[("SEED_DEMO_DATA", "maybe")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "SEED_DEMO_DATA=\"maybe\" is invalid: expected true or false"
        );

        let err = load(&[("CLOCK_UTC_OFFSET_MINUTES", "1440")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "CLOCK_UTC_OFFSET_MINUTES", .. }));
    }
}
