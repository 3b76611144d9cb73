
use crate::job::{JobId, JobKind, JobTicket, QueuedJob, ticket};

/// Queue entry with no steps, plus the caller's ticket for it.
pub(crate) fn queued_job(kind: JobKind) -> (QueuedJob, JobTicket) {
    let (ticket, completion) = ticket(JobId::new());
    let job = QueuedJob {
        kind,
        steps: Vec::new(),
        completion,
    };
    (job, ticket)
}
