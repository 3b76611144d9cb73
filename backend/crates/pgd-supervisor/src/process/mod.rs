mod handle;
mod output;
mod process_spec;
mod process_status;
mod readiness;
mod termination_policy;

pub use handle::ProcessHandle;
pub use output::OutputTail;
pub use process_spec::ProcessSpec;
pub use process_status::ProcessStatus;
pub use readiness::{ReadinessProbe, TcpProbe};
pub use termination_policy::{StopSignal, TerminationPolicy};
