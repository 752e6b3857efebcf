//! Configuration management module
//!
//! Loads environment-based configuration with defaults for every setting.

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid value for environment variable {var}")]
    ParseError { var: &'static str },

    #[error("Environment variable {var} must be between {min} and {max}")]
    OutOfRange {
        var: &'static str,
        min: i64,
        max: i64,
    },
}

/// Upper bound for `DATA_RETENTION_DAYS`
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Server configuration settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Background job loop settings
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSettings {
    pub enabled: bool,
    /// Seconds between job cycles
    pub tick_secs: u64,
}

/// Synthetic data seeding on startup
#[derive(Debug, Clone, Deserialize)]
pub struct DemoSettings {
    pub enabled: bool,
    pub stations: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionSettings {
    /// Samples older than this are purged by the scheduler
    pub days: i64,
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub scheduler: SchedulerSettings,
    pub demo: DemoSettings,
    pub retention: RetentionSettings,
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            server: ServerSettings {
                host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
                port: parsed(&lookup, "SERVER_PORT", 8080)?,
            },
            scheduler: SchedulerSettings {
                enabled: parsed(&lookup, "SCHEDULER_ENABLED", true)?,
                tick_secs: parsed(&lookup, "SCHEDULER_TICK_SECS", 3600)?,
            },
            demo: DemoSettings {
                enabled: parsed(&lookup, "DEMO_DATA", false)?,
                stations: parsed(&lookup, "DEMO_STATIONS", 5)?,
            },
            retention: RetentionSettings {
                days: bounded(
                    parsed(&lookup, "DATA_RETENTION_DAYS", 1825)?,
                    "DATA_RETENTION_DAYS",
                    1,
                    MAX_RETENTION_DAYS,
                )?,
            },
        })
    }
}

fn parsed<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, SettingsError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SettingsError::ParseError { var }),
        None => Ok(default),
    }
}

fn bounded(value: i64, var: &'static str, min: i64, max: i64) -> Result<i64, SettingsError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(SettingsError::OutOfRange { var, min, max })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, SettingsError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_default_settings() {
        let settings = settings(&[]).unwrap();

        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert!(settings.scheduler.enabled);
        assert_eq!(settings.scheduler.tick_secs, 3600);
        assert!(!settings.demo.enabled);
        assert_eq!(settings.demo.stations, 5);
        assert_eq!(settings.retention.days, 1825);
    }

    #[test]
    fn test_custom_settings() {
        let settings = settings(&[
            ("SERVER_PORT", "3000"),
            ("SCHEDULER_ENABLED", "false"),
            ("DEMO_DATA", "true"),
            ("DEMO_STATIONS", "12"),
        ])
        .unwrap();

        assert_eq!(settings.server.port, 3000);
        assert!(!settings.scheduler.enabled);
        assert!(settings.demo.enabled);
        assert_eq!(settings.demo.stations, 12);
    }

    #[test]
    fn test_parse_error_names_variable() {
        let err = settings(&[("SCHEDULER_TICK_SECS", "hourly")]).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::ParseError {
                var: "SCHEDULER_TICK_SECS"
            }
        ));
        assert_eq!(
            err.to_string(),
            "Invalid value for environment variable SCHEDULER_TICK_SECS"
        );
    }

    #[test]
    fn test_retention_out_of_range() {
        for days in ["0", "-3", "9000000000000"] {
            let err = settings(&[("DATA_RETENTION_DAYS", days)]).unwrap_err();
            assert!(matches!(
                err,
                SettingsError::OutOfRange {
                    var: "DATA_RETENTION_DAYS",
                    ..
                }
            ));
        }

        let settings = settings(&[("DATA_RETENTION_DAYS", "36500")]).unwrap();
        assert_eq!(settings.retention.days, MAX_RETENTION_DAYS);
    }
}
