use crate::ActionResult;
use crate::job::JobId;
use crate::server::ServerState;

/// Notification published by a [`crate::ServerRegistry`].
///
/// Delivered over a broadcast channel; slow subscribers miss events rather
/// than stall the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    StateChanged {
        server: String,
        state: ServerState,
    },
    JobQueued {
        job_id: JobId,
        server: String,
    },
    JobStarted {
        job_id: JobId,
        server: String,
    },
    JobFinished {
        job_id: JobId,
        server: String,
        result: ActionResult,
    },
    /// A restore or drop succeeded; any cached database list is stale.
    DatabasesChanged {
        server: String,
    },
}

impl SupervisorEvent {
    pub fn server(&self) -> &str {
        match self {
            Self::StateChanged { server, .. }
            | Self::JobQueued { server, .. }
            | Self::JobStarted { server, .. }
            | Self::JobFinished { server, .. }
            | Self::DatabasesChanged { server } => server,
        }
    }
}
