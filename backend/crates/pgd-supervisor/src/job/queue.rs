//! Per-server FIFO of jobs with a single running slot.

use crate::job::{Completion, JobId, JobKind};
use crate::process::ProcessSpec;

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

/// A validated job waiting for its turn.
#[derive(Debug)]
pub(crate) struct QueuedJob {
    pub(crate) kind: JobKind,
    pub(crate) steps: Vec<ProcessSpec>,
    pub(crate) completion: Completion,
}

impl QueuedJob {
    pub(crate) fn id(&self) -> JobId {
        self.completion.id()
    }
}

#[derive(Debug)]
pub(crate) enum CancelOutcome {
    /// Removed before it started; the caller resolves it.
    Removed(QueuedJob),
    /// Running; its runner has been asked to stop.
    Signalled,
    NotFound,
}

#[derive(Debug)]
struct RunningJob {
    id: JobId,
    cancel: watch::Sender<bool>,
}

#[derive(Debug, Default)]
struct QueueInner {
    pending: VecDeque<QueuedJob>,
    running: Option<RunningJob>,
    /// A drain task exists and will observe anything pushed.
    draining: bool,
}

/// Jobs for one server.
///
/// At most one job is taken at a time: `next` fills the running slot and the
/// drain task must `finish_current` before taking another.
#[derive(Debug)]
pub(crate) struct JobQueue {
    inner: Mutex<QueueInner>,
    current: watch::Sender<Option<JobId>>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            inner: Mutex::new(QueueInner::default()),
            current,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `job`. Returns true when the caller must spawn a drain task.
    pub(crate) fn push(&self, job: QueuedJob) -> bool {
        let mut inner = self.lock();
        inner.pending.push_back(job);
        if inner.draining {
            false
        } else {
            inner.draining = true;
            true
        }
    }

    /// Take the oldest job into the running slot.
    ///
    /// Returns `None` and releases the drain claim when the queue is empty.
    pub(crate) fn next(&self) -> Option<(QueuedJob, watch::Receiver<bool>)> {
        let mut inner = self.lock();
        debug_assert!(inner.running.is_none(), "job taken while another runs");

        let Some(job) = inner.pending.pop_front() else {
            inner.draining = false;
            return None;
        };

        let (cancel, cancel_rx) = watch::channel(false);
        let id = job.id();
        inner.running = Some(RunningJob { id, cancel });
        self.current.send_replace(Some(id));
        Some((job, cancel_rx))
    }

    /// Clear the running slot after its job resolved.
    pub(crate) fn finish_current(&self) {
        let mut inner = self.lock();
        inner.running = None;
        self.current.send_replace(None);
    }

    pub(crate) fn cancel(&self, id: JobId) -> CancelOutcome {
        let mut inner = self.lock();

        if let Some(index) = inner.pending.iter().position(|job| job.id() == id) {
            return match inner.pending.remove(index) {
                Some(job) => CancelOutcome::Removed(job),
                None => CancelOutcome::NotFound,
            };
        }

        match &inner.running {
            Some(running) if running.id == id => {
                running.cancel.send_replace(true);
                CancelOutcome::Signalled
            }
            _ => CancelOutcome::NotFound,
        }
    }

    /// Ask the running job, if any, to stop. Returns its id.
    pub(crate) fn cancel_running(&self) -> Option<JobId> {
        let inner = self.lock();
        inner.running.as_ref().map(|running| {
            running.cancel.send_replace(true);
            running.id
        })
    }

    /// Remove every job that has not started yet.
    pub(crate) fn take_pending(&self) -> Vec<QueuedJob> {
        self.lock().pending.drain(..).collect()
    }

    pub(crate) fn current(&self) -> Option<JobId> {
        *self.current.borrow()
    }

    pub(crate) fn subscribe_current(&self) -> watch::Receiver<Option<JobId>> {
        self.current.subscribe()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub(crate) fn pending_ids(&self) -> Vec<JobId> {
        self.lock().pending.iter().map(QueuedJob::id).collect()
    }
}
