//! Configuration types.
//!
//! Everything is read from environment variables. Each section has a
//! `from_lookup` constructor that takes the variable source as a closure so
//! tests can feed a map instead of mutating the process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;

use crate::channels::email::EmailConfig;
use crate::error::ConfigError;
use crate::llm::LlmConfig;
use crate::store::StoreConfig;

/// Variable source: name → value.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Lookup backed by the process environment.
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read a required variable.
pub fn required(lookup: Lookup<'_>, key: &str) -> Result<String, ConfigError> {
    lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Parse an optional variable, falling back to `default` only when unset.
pub fn parse_or<T>(lookup: Lookup<'_>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}

/// Split a comma-separated variable into trimmed, non-empty items.
pub fn list_or(lookup: Lookup<'_>, key: &str, default: &[&str]) -> Vec<String> {
    match lookup(key) {
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}

/// Which bank alerts to select and how far back to look.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Alert sender addresses (or `@domain` patterns).
    pub senders: Vec<String>,
    /// Terms matched against message text; any one suffices.
    pub terms: Vec<String>,
    /// Recency window.
    pub window: Duration,
    /// Maximum number of messages per run.
    pub max_messages: usize,
}

impl SelectorConfig {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let window_hours: u64 = parse_or(lookup, "ALERT_WINDOW_HOURS", 1)?;
        if window_hours == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ALERT_WINDOW_HOURS".into(),
                message: "must be at least 1".into(),
            });
        }
        // The window start must be a representable timestamp.
        let window = window_hours
            .checked_mul(3600)
            .map(Duration::from_secs)
            .filter(|w| {
                chrono::Duration::from_std(*w)
                    .ok()
                    .and_then(|w| Utc::now().checked_sub_signed(w))
                    .is_some()
            })
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "ALERT_WINDOW_HOURS".into(),
                message: format!("{window_hours} hours is out of range"),
            })?;
        Ok(Self {
            senders: list_or(lookup, "ALERT_SENDERS", &["alerts@hdfcbank.net"]),
            terms: list_or(lookup, "ALERT_TERMS", &["debited"]),
            window,
            max_messages: parse_or(lookup, "ALERT_MAX_MESSAGES", 50)?,
        })
    }
}

/// When runs fire.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Six-field cron expression (seconds first).
    pub cron: String,
    /// Run one batch and exit.
    pub run_once: bool,
}

impl ScheduleConfig {
    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        let cron = lookup("INGEST_SCHEDULE").unwrap_or_else(|| "0 0 * * * *".to_string());
        crate::scheduler::next_fire(&cron).map_err(|e| ConfigError::InvalidValue {
            key: "INGEST_SCHEDULE".into(),
            message: e.to_string(),
        })?;
        let run_once = matches!(
            lookup("INGEST_RUN_ONCE").as_deref().map(str::trim),
            Some("1") | Some("true") | Some("yes")
        );
        Ok(Self { cron, run_once })
    }
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub email: EmailConfig,
    pub selector: SelectorConfig,
    pub llm: LlmConfig,
    pub store: StoreConfig,
    pub schedule: ScheduleConfig,
    /// Directory for a daily rolling log file, if any.
    pub log_dir: Option<PathBuf>,
}

impl IngestConfig {
    /// Build from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            email: EmailConfig::from_lookup(lookup)?,
            selector: SelectorConfig::from_lookup(lookup)?,
            llm: LlmConfig::from_lookup(lookup)?,
            store: StoreConfig::from_lookup(lookup)?,
            schedule: ScheduleConfig::from_lookup(lookup)?,
            log_dir: lookup("INGEST_LOG_DIR").map(PathBuf::from),
        })
    }
}
