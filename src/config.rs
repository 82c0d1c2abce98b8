//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::queue::AccessLevel;

/// Scheduler and admission configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Bound on pending jobs in the high-performance lane.
    pub high_capacity: usize,
    /// Bound on pending jobs in the low-performance lane.
    pub low_capacity: usize,
    /// How often an idle dispatch loop checks for work.
    pub poll_interval: Duration,
    /// Wall-clock limit on a single dispatched job.
    pub job_timeout: Duration,
    /// How long a hardware status probe result is reused.
    pub status_cache_ttl: Duration,
    /// Upper bound on a single hardware status probe.
    pub probe_timeout: Duration,
    /// Minimum access level for the high-performance lane.
    pub high_lane_min_access: AccessLevel,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            high_capacity: 10,
            low_capacity: 20,
            poll_interval: Duration::from_millis(100),
            job_timeout: Duration::from_secs(240), // 4 minutes
            status_cache_ttl: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            high_lane_min_access: AccessLevel::Member,
        }
    }
}

impl QueueConfig {
    /// Read `GENQ_*` variables, falling back to defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            high_capacity: parse_var(&lookup, "GENQ_HIGH_CAPACITY")?
                .unwrap_or(defaults.high_capacity),
            low_capacity: parse_var(&lookup, "GENQ_LOW_CAPACITY")?
                .unwrap_or(defaults.low_capacity),
            poll_interval: parse_var(&lookup, "GENQ_POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            job_timeout: parse_var(&lookup, "GENQ_JOB_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_timeout),
            status_cache_ttl: parse_var(&lookup, "GENQ_STATUS_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.status_cache_ttl),
            probe_timeout: parse_var(&lookup, "GENQ_PROBE_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.probe_timeout),
            high_lane_min_access: parse_var(&lookup, "GENQ_HIGH_LANE_MIN_ACCESS")?
                .unwrap_or(defaults.high_lane_min_access),
        };
        config.validate()?;
        Ok(config)
    }

    /// Per-request bound for HTTP probes. Kept below `probe_timeout` so a hung
    /// backend reads as unreachable before the policy's outer timeout fires.
    pub fn probe_request_timeout(&self) -> Duration {
        self.probe_timeout * 3 / 4
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.high_capacity == 0 {
            return Err(invalid("GENQ_HIGH_CAPACITY", "capacity must be at least 1"));
        }
        if self.low_capacity == 0 {
            return Err(invalid("GENQ_LOW_CAPACITY", "capacity must be at least 1"));
        }
        if self.poll_interval.is_zero() {
            return Err(invalid("GENQ_POLL_INTERVAL_MS", "must be greater than 0"));
        }
        if self.job_timeout.is_zero() {
            return Err(invalid("GENQ_JOB_TIMEOUT_SECS", "must be greater than 0"));
        }
        if self.probe_request_timeout().is_zero() {
            return Err(invalid("GENQ_PROBE_TIMEOUT_MS", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Where the backing services live and who the local operator is.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Health URL of the high-performance backend.
    pub high_url: Option<String>,
    /// Health URL of the low-performance backend.
    pub low_url: Option<String>,
    /// Reports whether a foreground process holds the high-performance GPU.
    pub foreground_url: Option<String>,
    /// JSON workflow catalogue.
    pub workflows_path: Option<PathBuf>,
    /// Access level of the CLI operator.
    pub cli_access: AccessLevel,
    /// Whether the CLI operator may skip the queue.
    pub cli_skip_queue: bool,
    /// How long the simulated executor holds a lane.
    pub simulated_job_time: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            high_url: None,
            low_url: None,
            foreground_url: None,
            workflows_path: None,
            cli_access: AccessLevel::Member,
            cli_skip_queue: false,
            simulated_job_time: Duration::from_secs(5),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Ok(Self {
            high_url: non_empty("GENQ_HIGH_URL"),
            low_url: non_empty("GENQ_LOW_URL"),
            foreground_url: non_empty("GENQ_FOREGROUND_URL"),
            workflows_path: non_empty("GENQ_WORKFLOWS_PATH").map(PathBuf::from),
            cli_access: parse_var(&lookup, "GENQ_CLI_ACCESS")?.unwrap_or(defaults.cli_access),
            cli_skip_queue: parse_var(&lookup, "GENQ_CLI_SKIP_QUEUE")?
                .unwrap_or(defaults.cli_skip_queue),
            simulated_job_time: parse_var(&lookup, "GENQ_SIMULATED_JOB_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.simulated_job_time),
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| invalid(key, &e.to_string())),
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
