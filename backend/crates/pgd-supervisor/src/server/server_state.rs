use std::fmt;

use serde::Serialize;

/// Lifecycle state of a supervised server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServerState {
    /// No process
    #[default]
    Stopped,
    /// Spawned, waiting for the port to accept connections
    Starting,
    /// Accepting connections
    Running,
    /// Draining jobs before the process is terminated
    Stopping,
    /// Exited without being asked to
    Crashed { exit_code: Option<i32> },
}

impl ServerState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Crashed { .. } => "crashed",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// No live process: a start is allowed.
    pub fn is_down(&self) -> bool {
        matches!(self, Self::Stopped | Self::Crashed { .. })
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crashed {
                exit_code: Some(code),
            } => write!(f, "crashed (exit code {code})"),
            other => f.write_str(other.label()),
        }
    }
}
