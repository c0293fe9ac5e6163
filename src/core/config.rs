//! # Configuration
//!
//! Environment-driven settings for the reminder engine. `.env` files are
//! loaded by the binary before `Config::from_env` runs.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Added REMINDER_CATCHUP_MINUTES lateness window
//! - 1.0.0: Initial release with database, Twilio and cadence settings

use anyhow::{anyhow, Context, Result};
use std::time::Duration;

const DEFAULT_TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Longest allowed gap between ticks; `timeOfDay` has minute resolution.
pub const MAX_TICK_SECONDS: u64 = 60;

/// Credentials for the Twilio SMS gateway
#[derive(Debug, Clone)]
pub struct TwilioSettings {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub log_level: String,
    /// `None` means reminders are only logged, never sent
    pub twilio: Option<TwilioSettings>,
    pub tick_interval: Duration,
    pub delivery_timeout: Duration,
    pub catchup_minutes: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_path = get("DATABASE_PATH").unwrap_or_else(|| "medalert.db".to_string());
        let log_level = get("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let twilio = match (
            get("TWILIO_ACCOUNT_SID"),
            get("TWILIO_AUTH_TOKEN"),
            get("TWILIO_PHONE_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioSettings {
                account_sid,
                auth_token,
                from_number,
                api_base: get("TWILIO_API_BASE")
                    .unwrap_or_else(|| DEFAULT_TWILIO_API_BASE.to_string()),
            }),
            (None, None, None) => None,
            _ => {
                return Err(anyhow!(
                    "TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and TWILIO_PHONE_NUMBER must be set together"
                ))
            }
        };

        let tick_seconds = parse_number(get("REMINDER_TICK_SECONDS"), "REMINDER_TICK_SECONDS", 60)?;
        if tick_seconds == 0 || tick_seconds > MAX_TICK_SECONDS {
            return Err(anyhow!(
                "REMINDER_TICK_SECONDS must be between 1 and {MAX_TICK_SECONDS}, got {tick_seconds}"
            ));
        }

        let timeout_seconds =
            parse_number(get("DELIVERY_TIMEOUT_SECONDS"), "DELIVERY_TIMEOUT_SECONDS", 10)?;
        if timeout_seconds == 0 {
            return Err(anyhow!("DELIVERY_TIMEOUT_SECONDS must be greater than zero"));
        }

        let catchup_minutes =
            parse_number(get("REMINDER_CATCHUP_MINUTES"), "REMINDER_CATCHUP_MINUTES", 0)?;
        if catchup_minutes > 59 {
            return Err(anyhow!(
                "REMINDER_CATCHUP_MINUTES must be at most 59, got {catchup_minutes}"
            ));
        }

        Ok(Config {
            database_path,
            log_level,
            twilio,
            tick_interval: Duration::from_secs(tick_seconds),
            delivery_timeout: Duration::from_secs(timeout_seconds),
            catchup_minutes: catchup_minutes as u32,
        })
    }
}

fn parse_number(value: Option<String>, key: &str, default: u64) -> Result<u64> {
    match value {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{key} must be a non-negative integer, got '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database_path, "medalert.db");
        assert_eq!(config.log_level, "info");
        assert!(config.twilio.is_none());
        assert_eq!(config.tick_interval, Duration::from_secs(60));
        assert_eq!(config.delivery_timeout, Duration::from_secs(10));
        assert_eq!(config.catchup_minutes, 0);
    }

    #[test]
    fn test_twilio_requires_all_credentials() {
        let err = config_from(&[("TWILIO_ACCOUNT_SID", "AC123")]).unwrap_err();
        assert!(err.to_string().contains("must be set together"));

        let config = config_from(&[
            ("TWILIO_ACCOUNT_SID", "AC123"),
            ("TWILIO_AUTH_TOKEN", "secret"),
            ("TWILIO_PHONE_NUMBER", "+15005550006"),
        ])
        .unwrap();
        let twilio = config.twilio.unwrap();
        assert_eq!(twilio.account_sid, "AC123");
        assert_eq!(twilio.api_base, DEFAULT_TWILIO_API_BASE);
    }

    #[test]
    fn test_tick_interval_bounds() {
        assert!(config_from(&[("REMINDER_TICK_SECONDS", "0")]).is_err());
        assert!(config_from(&[("REMINDER_TICK_SECONDS", "61")]).is_err());
        assert!(config_from(&[("REMINDER_TICK_SECONDS", "abc")]).is_err());

        let config = config_from(&[("REMINDER_TICK_SECONDS", "30")]).unwrap();
        assert_eq!(config.tick_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_catchup_and_timeout_validation() {
        assert!(config_from(&[("REMINDER_CATCHUP_MINUTES", "60")]).is_err());
        assert!(config_from(&[("DELIVERY_TIMEOUT_SECONDS", "0")]).is_err());

        let config = config_from(&[
            ("REMINDER_CATCHUP_MINUTES", "15"),
            ("DELIVERY_TIMEOUT_SECONDS", "5"),
        ])
        .unwrap();
        assert_eq!(config.catchup_minutes, 15);
        assert_eq!(config.delivery_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = config_from(&[("DATABASE_PATH", "  "), ("LOG_LEVEL", "")]).unwrap();
        assert_eq!(config.database_path, "medalert.db");
        assert_eq!(config.log_level, "info");
    }
}
