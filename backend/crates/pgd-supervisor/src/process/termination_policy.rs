use std::time::Duration;

const DEFAULT_GRACE_SECS: u64 = 10;
const DEFAULT_FORCE_KILL_TIMEOUT_SECS: u64 = 5;

/// Signal sent in the graceful phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopSignal {
    /// SIGTERM. The postmaster reads this as a smart shutdown that waits for
    /// every client to disconnect, so it is only the default for tools.
    #[default]
    Terminate,
    /// SIGINT. The postmaster's fast shutdown: clients are disconnected and
    /// the server exits cleanly.
    Interrupt,
}

/// Two-phase shutdown: polite signal, then a forced kill after `grace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationPolicy {
    /// Time allowed between the graceful signal and the forced kill
    pub grace: Duration,
    /// Time allowed for the process to disappear after the forced kill
    pub force_timeout: Duration,
    pub signal: StopSignal,
}

impl TerminationPolicy {
    pub fn with_signal(mut self, signal: StopSignal) -> Self {
        self.signal = signal;
        self
    }
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(DEFAULT_GRACE_SECS),
            force_timeout: Duration::from_secs(DEFAULT_FORCE_KILL_TIMEOUT_SECS),
            signal: StopSignal::default(),
        }
    }
}

impl From<&pgd_config::SupervisorConfig> for TerminationPolicy {
    fn from(config: &pgd_config::SupervisorConfig) -> Self {
        Self {
            grace: config.shutdown_grace(),
            force_timeout: config.force_kill_timeout(),
            signal: StopSignal::default(),
        }
    }
}
