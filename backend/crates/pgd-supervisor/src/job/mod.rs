mod command;
mod job_id;
mod job_kind;
mod job_state;
mod queue;
mod runner;
mod ticket;
mod tracker;

pub use command::default_dump_file_name;
pub use job_id::JobId;
pub use job_kind::{JobKind, RestorePolicy};
pub use job_state::JobState;
pub use ticket::JobTicket;

pub(crate) use command::plan;
pub(crate) use queue::{CancelOutcome, JobQueue, QueuedJob};
pub(crate) use runner::drain;
pub(crate) use ticket::{Completion, ticket};
pub(crate) use tracker::JobTracker;
