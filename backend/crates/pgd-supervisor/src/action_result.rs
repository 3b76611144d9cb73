//! Uniform outcome of every asynchronous start, stop and job request.

use crate::job::JobId;
use crate::server::ServerState;

use std::path::PathBuf;

use thiserror::Error;

/// Outcome delivered exactly once per start/stop request or job.
pub type ActionResult = std::result::Result<(), ActionError>;

/// Failure side of [`ActionResult`].
///
/// Clone + Eq so results can be fanned out through the event stream and
/// compared in tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("Failed to spawn {}: {message}", program.display())]
    Spawn { program: PathBuf, message: String },

    #[error("{operation} did not complete within {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Process {pid:?} did not exit after a forced kill")]
    TimeoutOnForceKill { pid: Option<u32> },

    #[error("Process exited unexpectedly with exit code {code:?}")]
    ProcessExited { code: Option<i32> },

    #[error("Port {port} on {host} is already in use; server '{server}' was not started")]
    PortInUse {
        server: String,
        host: String,
        port: u16,
    },

    #[error("Server '{server}' is already starting")]
    AlreadyStarting { server: String },

    #[error("Server '{server}' cannot do that while {state}: {message}")]
    InvalidState {
        server: String,
        state: ServerState,
        message: String,
    },

    #[error("Server '{server}' is not running")]
    ServerNotRunning { server: String },

    #[error("{tool} failed with exit code {exit_code:?}: {stderr_tail}")]
    ToolError {
        tool: String,
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    #[error("Cancelled")]
    Cancelled,

    #[error("Unknown server '{server}'")]
    UnknownServer { server: String },

    #[error("Unknown or already finished job {job_id}")]
    UnknownJob { job_id: JobId },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
}

/// Copyable discriminant of [`ActionError`] for callers that branch on kind only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Spawn,
    Timeout,
    TimeoutOnForceKill,
    ProcessExited,
    PortInUse,
    AlreadyStarting,
    InvalidState,
    ServerNotRunning,
    ToolError,
    Cancelled,
    UnknownServer,
    UnknownJob,
    InvalidRequest,
}

impl ActionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Spawn { .. } => ErrorKind::Spawn,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::TimeoutOnForceKill { .. } => ErrorKind::TimeoutOnForceKill,
            Self::ProcessExited { .. } => ErrorKind::ProcessExited,
            Self::PortInUse { .. } => ErrorKind::PortInUse,
            Self::AlreadyStarting { .. } => ErrorKind::AlreadyStarting,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::ServerNotRunning { .. } => ErrorKind::ServerNotRunning,
            Self::ToolError { .. } => ErrorKind::ToolError,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::UnknownServer { .. } => ErrorKind::UnknownServer,
            Self::UnknownJob { .. } => ErrorKind::UnknownJob,
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
        }
    }

    /// Exit code reported by the failing process, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ProcessExited { code } => *code,
            Self::ToolError { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    pub fn recovery_hint(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => {
                "The server or tool executable could not be launched. \
                   Check that the binary directory exists and is executable."
            }
            Self::Timeout { .. } => {
                "The operation took too long. \
                   Check the server log for startup or shutdown problems."
            }
            Self::TimeoutOnForceKill { .. } => {
                "The process ignored a forced kill. \
                   It may be stuck in the kernel; check it with your system tools."
            }
            Self::ProcessExited { .. } => {
                "The server exited before it was ready. \
                   Check the data directory and the server log."
            }
            Self::PortInUse { .. } => {
                "Another process is listening on the server's port. \
                   Stop it or configure a different port."
            }
            Self::AlreadyStarting { .. } => "The server is already starting. Wait for it to finish.",
            Self::InvalidState { .. } => "The server is not in a state that allows this action.",
            Self::ServerNotRunning { .. } => "Start the server before running maintenance tasks.",
            Self::ToolError { .. } => "The database tool reported an error. See the message above.",
            Self::Cancelled => "The operation was cancelled.",
            Self::UnknownServer { .. } | Self::UnknownJob { .. } => {
                "The selection is out of date. Refresh and try again."
            }
            Self::InvalidRequest { .. } => "Check the database name and file path.",
        }
    }
}
