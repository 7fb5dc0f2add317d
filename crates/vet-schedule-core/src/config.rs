//! Scheduling configuration.
//!
//! Values are plain data handed to the [`Scheduler`](crate::schedule::Scheduler).
//! [`ScheduleConfig::from_env`] reads overrides from the process environment
//! (and a `.env` file, when present).

use std::collections::HashMap;

use chrono::NaiveTime;
use thiserror::Error;

pub const ENV_WORKING_HOURS_START: &str = "VET_WORKING_HOURS_START";
pub const ENV_WORKING_HOURS_END: &str = "VET_WORKING_HOURS_END";
pub const ENV_LUNCH_BREAK_START: &str = "VET_LUNCH_BREAK_START";
pub const ENV_LUNCH_BREAK_END: &str = "VET_LUNCH_BREAK_END";
pub const ENV_SLOT_DURATION_MINUTES: &str = "VET_SLOT_DURATION_MINUTES";
pub const ENV_BUFFER_TIME_MINUTES: &str = "VET_BUFFER_TIME_MINUTES";
pub const ENV_MAX_APPOINTMENTS_PER_DAY: &str = "VET_MAX_APPOINTMENTS_PER_DAY";
pub const ENV_MINIMUM_NOTICE_HOURS: &str = "VET_MINIMUM_NOTICE_HOURS";
pub const ENV_TYPE_LIMITS: &str = "VET_TYPE_LIMITS";

/// Key used for the fallback entry in a type-limit mapping.
pub const DEFAULT_LIMIT_KEY: &str = "default";

/// Configuration errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: expected a time like 09:00, got {value:?}")]
    InvalidTime { key: String, value: String },

    #[error("{key}: expected a non-negative integer, got {value:?}")]
    InvalidNumber { key: String, value: String },

    #[error("Invalid type limit entry: {0:?}")]
    InvalidTypeLimit(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Per-type daily capacity, keyed by lowercase type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeLimits {
    default: u32,
    overrides: HashMap<String, u32>,
}

impl Default for TypeLimits {
    fn default() -> Self {
        let mut limits = Self::with_default(20);
        limits.set("vaccination", 40);
        limits.set("check-up", 30);
        limits.set("grooming", 20);
        limits
    }
}

impl TypeLimits {
    /// Limits with no overrides.
    pub fn with_default(default: u32) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Parse `name=limit` pairs separated by commas. A `default` key sets the fallback.
    pub fn parse(spec: &str) -> ConfigResult<Self> {
        let mut limits = Self::with_default(Self::default().default);

        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, value) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidTypeLimit(entry.to_string()))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(ConfigError::InvalidTypeLimit(entry.to_string()));
            }
            let limit: u32 = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidTypeLimit(entry.to_string()))?;
            limits.set(name, limit);
        }

        Ok(limits)
    }

    /// Set the limit for a type name (or the fallback, for `default`).
    pub fn set(&mut self, name: &str, limit: u32) {
        let key = name.trim().to_lowercase();
        if key == DEFAULT_LIMIT_KEY {
            self.default = limit;
        } else {
            self.overrides.insert(key, limit);
        }
    }

    /// Limit for a type name, case-insensitive, falling back to the default.
    pub fn limit_for(&self, name: &str) -> u32 {
        self.overrides
            .get(&name.trim().to_lowercase())
            .copied()
            .unwrap_or(self.default)
    }

    pub fn default_limit(&self) -> u32 {
        self.default
    }
}

/// Clinic scheduling rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub working_hours_start: NaiveTime,
    pub working_hours_end: NaiveTime,
    pub lunch_break_start: NaiveTime,
    pub lunch_break_end: NaiveTime,
    pub slot_duration_minutes: u32,
    pub buffer_time_minutes: u32,
    /// Overall cap used by the slot listing, independent of per-type limits
    pub max_appointments_per_day: u32,
    pub minimum_notice_hours: u32,
    pub type_limits: TypeLimits,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            working_hours_start: hm(9, 0),
            working_hours_end: hm(16, 30),
            lunch_break_start: hm(12, 0),
            lunch_break_end: hm(13, 0),
            slot_duration_minutes: 30,
            buffer_time_minutes: 15,
            max_appointments_per_day: 50,
            minimum_notice_hours: 2,
            type_limits: TypeLimits::default(),
        }
    }
}

impl ScheduleConfig {
    /// Load from the environment, reading `.env` first if one exists.
    pub fn from_env() -> ConfigResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from defaults overridden by whatever `lookup` returns.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup(ENV_WORKING_HOURS_START) {
            config.working_hours_start = parse_time(ENV_WORKING_HOURS_START, &v)?;
        }
        if let Some(v) = lookup(ENV_WORKING_HOURS_END) {
            config.working_hours_end = parse_time(ENV_WORKING_HOURS_END, &v)?;
        }
        if let Some(v) = lookup(ENV_LUNCH_BREAK_START) {
            config.lunch_break_start = parse_time(ENV_LUNCH_BREAK_START, &v)?;
        }
        if let Some(v) = lookup(ENV_LUNCH_BREAK_END) {
            config.lunch_break_end = parse_time(ENV_LUNCH_BREAK_END, &v)?;
        }
        if let Some(v) = lookup(ENV_SLOT_DURATION_MINUTES) {
            config.slot_duration_minutes = parse_number(ENV_SLOT_DURATION_MINUTES, &v)?;
        }
        if let Some(v) = lookup(ENV_BUFFER_TIME_MINUTES) {
            config.buffer_time_minutes = parse_number(ENV_BUFFER_TIME_MINUTES, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_APPOINTMENTS_PER_DAY) {
            config.max_appointments_per_day = parse_number(ENV_MAX_APPOINTMENTS_PER_DAY, &v)?;
        }
        if let Some(v) = lookup(ENV_MINIMUM_NOTICE_HOURS) {
            config.minimum_notice_hours = parse_number(ENV_MINIMUM_NOTICE_HOURS, &v)?;
        }
        if let Some(v) = lookup(ENV_TYPE_LIMITS) {
            config.type_limits = TypeLimits::parse(&v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a sensible schedule.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.slot_duration_minutes == 0 {
            return Err(ConfigError::Invalid(
                "slot duration must be at least one minute".into(),
            ));
        }
        if self.working_hours_start >= self.working_hours_end {
            return Err(ConfigError::Invalid(format!(
                "working hours start {} is not before end {}",
                self.working_hours_start, self.working_hours_end
            )));
        }
        if self.lunch_break_start > self.lunch_break_end {
            return Err(ConfigError::Invalid(format!(
                "lunch break start {} is after end {}",
                self.lunch_break_start, self.lunch_break_end
            )));
        }
        Ok(())
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

fn parse_time(key: &str, value: &str) -> ConfigResult<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| ConfigError::InvalidTime {
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn parse_number(key: &str, value: &str) -> ConfigResult<u32> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}
