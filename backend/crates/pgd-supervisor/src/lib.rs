//! Supervision of local database servers and the maintenance jobs run
//! against them.
//!
//! A [`ServerRegistry`] owns every server. Starting a server spawns it as a
//! child process and waits until its port accepts connections; stopping it
//! escalates from a graceful signal to a kill. Dump, restore and drop jobs
//! are queued per server and run one at a time, each resolving its
//! [`JobTicket`] with exactly one [`ActionResult`].

mod action_result;
mod error;
mod job;
mod logging;
mod process;
mod server;
mod settings;

#[cfg(test)]
mod tests;

pub use action_result::{ActionError, ActionResult, ErrorKind};
pub use error::{SupervisorError, SupervisorResult};
pub use job::{JobId, JobKind, JobState, JobTicket, RestorePolicy, default_dump_file_name};
pub use logging::{current_log_path, setup_logging};
pub use process::{
    OutputTail, ProcessHandle, ProcessSpec, ProcessStatus, ReadinessProbe, StopSignal, TcpProbe,
    TerminationPolicy,
};
pub use server::{ServerDefinition, ServerRegistry, ServerState, ServerStatus, SupervisorEvent};
pub use settings::SupervisorSettings;
