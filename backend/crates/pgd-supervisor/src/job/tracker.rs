//! Registry-wide job bookkeeping: which server owns a job, its state, and
//! the single point where a job reaches its terminal state.

use crate::job::{Completion, JobId, JobState};
use crate::server::SupervisorEvent;
use crate::ActionResult;

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug)]
struct ActiveJob {
    server: String,
    state: JobState,
}

#[derive(Debug, Default)]
struct TrackerInner {
    active: HashMap<JobId, ActiveJob>,
    /// Terminal states, oldest first
    history: VecDeque<(JobId, JobState)>,
}

#[derive(Debug)]
pub(crate) struct JobTracker {
    inner: Mutex<TrackerInner>,
    history_limit: usize,
    events: broadcast::Sender<SupervisorEvent>,
}

impl JobTracker {
    pub(crate) fn new(history_limit: usize, events: broadcast::Sender<SupervisorEvent>) -> Self {
        Self {
            inner: Mutex::new(TrackerInner::default()),
            history_limit: history_limit.max(1),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn queued(&self, job_id: JobId, server: &str) {
        self.lock().active.insert(
            job_id,
            ActiveJob {
                server: server.to_string(),
                state: JobState::Queued,
            },
        );
        info!(server, %job_id, "Job queued");
        let _ = self.events.send(SupervisorEvent::JobQueued {
            job_id,
            server: server.to_string(),
        });
    }

    pub(crate) fn started(&self, job_id: JobId, server: &str) {
        if let Some(job) = self.lock().active.get_mut(&job_id) {
            job.state = JobState::Running;
        }
        info!(server, %job_id, "Job started");
        let _ = self.events.send(SupervisorEvent::JobStarted {
            job_id,
            server: server.to_string(),
        });
    }

    /// Record the terminal state, publish it, and resolve the caller's ticket.
    pub(crate) fn finish(&self, server: &str, completion: Completion, result: ActionResult) {
        let job_id = completion.id();
        let state = JobState::from_result(&result);

        {
            let mut inner = self.lock();
            inner.active.remove(&job_id);
            inner.history.push_back((job_id, state));
            while inner.history.len() > self.history_limit {
                inner.history.pop_front();
            }
        }

        match &result {
            Ok(()) => info!(server, %job_id, "Job succeeded"),
            Err(e) => warn!(server, %job_id, state = %state, "Job did not succeed: {e}"),
        }

        let _ = self.events.send(SupervisorEvent::JobFinished {
            job_id,
            server: server.to_string(),
            result: result.clone(),
        });
        completion.resolve(result);
    }

    /// Owning server of a job that has not reached a terminal state.
    pub(crate) fn server_of(&self, job_id: JobId) -> Option<String> {
        self.lock().active.get(&job_id).map(|job| job.server.clone())
    }

    pub(crate) fn state(&self, job_id: JobId) -> Option<JobState> {
        let inner = self.lock();
        inner.active.get(&job_id).map(|job| job.state).or_else(|| {
            inner
                .history
                .iter()
                .rev()
                .find(|(id, _)| *id == job_id)
                .map(|(_, state)| *state)
        })
    }
}
