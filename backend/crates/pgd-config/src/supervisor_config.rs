use crate::{ConfigError, ConfigErrorResult};

use std::time::Duration;

use serde::Deserialize;

pub const MIN_STARTUP_TIMEOUT_SECS: u64 = 1;
pub const MAX_STARTUP_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 30;

pub const MIN_SHUTDOWN_GRACE_SECS: u64 = 1;
pub const MAX_SHUTDOWN_GRACE_SECS: u64 = 300;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

pub const MIN_FORCE_KILL_TIMEOUT_SECS: u64 = 1;
pub const MAX_FORCE_KILL_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_FORCE_KILL_TIMEOUT_SECS: u64 = 5;

pub const MIN_JOB_DRAIN_TIMEOUT_SECS: u64 = 1;
pub const MAX_JOB_DRAIN_TIMEOUT_SECS: u64 = 86_400;
pub const DEFAULT_JOB_DRAIN_TIMEOUT_SECS: u64 = 300;

pub const MIN_READINESS_POLL_MS: u64 = 10;
pub const MAX_READINESS_POLL_MS: u64 = 5_000;
pub const DEFAULT_READINESS_POLL_MS: u64 = 100;

pub const MIN_OUTPUT_TAIL_LINES: usize = 1;
pub const MAX_OUTPUT_TAIL_LINES: usize = 1_000;
pub const DEFAULT_OUTPUT_TAIL_LINES: usize = 20;

pub const MIN_JOB_HISTORY_LIMIT: usize = 1;
pub const MAX_JOB_HISTORY_LIMIT: usize = 100_000;
pub const DEFAULT_JOB_HISTORY_LIMIT: usize = 256;

/// Timing policy for server lifecycle and maintenance jobs.
///
/// Every wait the supervisor performs is bounded by one of these values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// How long a freshly spawned server may take to accept connections
    pub startup_timeout_secs: u64,
    /// Grace period between the polite stop signal and the forced kill
    pub shutdown_grace_secs: u64,
    /// How long to wait for exit after a forced kill
    pub force_kill_timeout_secs: u64,
    /// How long a stop waits for a running job before cancelling it
    pub job_drain_timeout_secs: u64,
    /// Interval between readiness probes
    pub readiness_poll_interval_ms: u64,
    /// Number of stderr lines retained per process for diagnostics
    pub output_tail_lines: usize,
    /// Number of finished jobs whose terminal state stays queryable
    pub job_history_limit: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
            force_kill_timeout_secs: DEFAULT_FORCE_KILL_TIMEOUT_SECS,
            job_drain_timeout_secs: DEFAULT_JOB_DRAIN_TIMEOUT_SECS,
            readiness_poll_interval_ms: DEFAULT_READINESS_POLL_MS,
            output_tail_lines: DEFAULT_OUTPUT_TAIL_LINES,
            job_history_limit: DEFAULT_JOB_HISTORY_LIMIT,
        }
    }
}

impl SupervisorConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn force_kill_timeout(&self) -> Duration {
        Duration::from_secs(self.force_kill_timeout_secs)
    }

    pub fn job_drain_timeout(&self) -> Duration {
        Duration::from_secs(self.job_drain_timeout_secs)
    }

    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_interval_ms)
    }

    pub fn validate(&self) -> ConfigErrorResult<()> {
        Self::check_range(
            "supervisor.startup_timeout_secs",
            self.startup_timeout_secs,
            MIN_STARTUP_TIMEOUT_SECS,
            MAX_STARTUP_TIMEOUT_SECS,
        )?;
        Self::check_range(
            "supervisor.shutdown_grace_secs",
            self.shutdown_grace_secs,
            MIN_SHUTDOWN_GRACE_SECS,
            MAX_SHUTDOWN_GRACE_SECS,
        )?;
        Self::check_range(
            "supervisor.force_kill_timeout_secs",
            self.force_kill_timeout_secs,
            MIN_FORCE_KILL_TIMEOUT_SECS,
            MAX_FORCE_KILL_TIMEOUT_SECS,
        )?;
        Self::check_range(
            "supervisor.job_drain_timeout_secs",
            self.job_drain_timeout_secs,
            MIN_JOB_DRAIN_TIMEOUT_SECS,
            MAX_JOB_DRAIN_TIMEOUT_SECS,
        )?;
        Self::check_range(
            "supervisor.readiness_poll_interval_ms",
            self.readiness_poll_interval_ms,
            MIN_READINESS_POLL_MS,
            MAX_READINESS_POLL_MS,
        )?;
        Self::check_range(
            "supervisor.output_tail_lines",
            self.output_tail_lines,
            MIN_OUTPUT_TAIL_LINES,
            MAX_OUTPUT_TAIL_LINES,
        )?;
        Self::check_range(
            "supervisor.job_history_limit",
            self.job_history_limit,
            MIN_JOB_HISTORY_LIMIT,
            MAX_JOB_HISTORY_LIMIT,
        )?;

        // A poll interval longer than the whole startup window never probes twice
        if self.readiness_poll_interval() > self.startup_timeout() {
            return Err(ConfigError::supervisor(format!(
                "supervisor.readiness_poll_interval_ms ({}) exceeds startup timeout ({}s)",
                self.readiness_poll_interval_ms, self.startup_timeout_secs
            )));
        }

        Ok(())
    }

    fn check_range<T>(field: &str, value: T, min: T, max: T) -> ConfigErrorResult<()>
    where
        T: PartialOrd + std::fmt::Display,
    {
        if value < min || value > max {
            return Err(ConfigError::supervisor(format!(
                "{field} must be {min}-{max}, got {value}"
            )));
        }

        Ok(())
    }
}
