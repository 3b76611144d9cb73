use crate::job::JobId;
use crate::{ActionError, ActionResult};

use tokio::sync::oneshot;

/// Caller's side of a submitted job: its id plus the single terminal result.
#[derive(Debug)]
pub struct JobTicket {
    id: JobId,
    outcome: oneshot::Receiver<ActionResult>,
}

impl JobTicket {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Wait for the job to reach a terminal state.
    pub async fn outcome(self) -> ActionResult {
        // A dropped completion means the job was discarded with its runtime.
        self.outcome.await.unwrap_or(Err(ActionError::Cancelled))
    }

    /// Non-blocking check; `None` while the job is still pending.
    pub fn try_outcome(&mut self) -> Option<ActionResult> {
        match self.outcome.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ActionError::Cancelled)),
        }
    }
}

/// Producer side of a [`JobTicket`]. Consumed on resolve, so a job can only
/// ever deliver one result.
#[derive(Debug)]
pub(crate) struct Completion {
    id: JobId,
    tx: oneshot::Sender<ActionResult>,
}

impl Completion {
    pub(crate) fn id(&self) -> JobId {
        self.id
    }

    pub(crate) fn resolve(self, result: ActionResult) {
        // The caller may have dropped its ticket; the result is still recorded elsewhere.
        let _ = self.tx.send(result);
    }
}

pub(crate) fn ticket(id: JobId) -> (JobTicket, Completion) {
    let (tx, outcome) = oneshot::channel();
    (JobTicket { id, outcome }, Completion { id, tx })
}
