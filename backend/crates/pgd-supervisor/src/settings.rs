use crate::process::{StopSignal, TerminationPolicy};

use std::time::Duration;

use pgd_config::SupervisorConfig;

/// Runtime policy values shared by every server in a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Deadline for a freshly spawned server to accept connections
    pub startup_timeout: Duration,
    pub readiness_poll_interval: Duration,
    /// Escalation for cancelled tools; servers use [`Self::server_termination`]
    pub termination: TerminationPolicy,
    /// How long a stop waits for the running job before cancelling it
    pub job_drain_timeout: Duration,
    pub output_tail_lines: usize,
    pub job_history_limit: usize,
}

impl SupervisorSettings {
    /// Same timeouts as `termination`, but with a fast-shutdown interrupt so
    /// open client sessions do not hold the stop until the forced kill.
    pub fn server_termination(&self) -> TerminationPolicy {
        self.termination.with_signal(StopSignal::Interrupt)
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from(&SupervisorConfig::default())
    }
}

impl From<&SupervisorConfig> for SupervisorSettings {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            startup_timeout: config.startup_timeout(),
            readiness_poll_interval: config.readiness_poll_interval(),
            termination: TerminationPolicy::from(config),
            job_drain_timeout: config.job_drain_timeout(),
            output_tail_lines: config.output_tail_lines,
            job_history_limit: config.job_history_limit,
        }
    }
}
