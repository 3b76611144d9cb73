//! One registered server: its state machine, its process and its job queue.

use crate::job::JobQueue;
use crate::process::{ProcessHandle, ProcessStatus, ReadinessProbe, TcpProbe};
use crate::server::{ServerDefinition, ServerState, ServerStatus, SupervisorEvent};
use crate::settings::SupervisorSettings;
use crate::{ActionError, ActionResult};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, Weak};

use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub(crate) struct ManagedServer {
    definition: ServerDefinition,
    state_tx: watch::Sender<ServerState>,
    /// Holding this lock is what makes a start or stop exclusive.
    process: Mutex<Option<ProcessHandle>>,
    /// Bumped on every successful start so a late crash report for an
    /// earlier process cannot mark its successor as crashed.
    epoch: AtomicU64,
    crash_watcher: std::sync::Mutex<Option<JoinHandle<()>>>,
    queue: JobQueue,
    events: broadcast::Sender<SupervisorEvent>,
}

impl ManagedServer {
    pub(crate) fn new(
        definition: ServerDefinition,
        events: broadcast::Sender<SupervisorEvent>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ServerState::Stopped);
        Self {
            definition,
            state_tx,
            process: Mutex::new(None),
            epoch: AtomicU64::new(0),
            crash_watcher: std::sync::Mutex::new(None),
            queue: JobQueue::new(),
            events,
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.definition.name()
    }

    pub(crate) fn definition(&self) -> &ServerDefinition {
        &self.definition
    }

    pub(crate) fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub(crate) fn state(&self) -> ServerState {
        *self.state_tx.borrow()
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.state_tx.subscribe()
    }

    /// Suspend until the server is Stopped or Crashed.
    pub(crate) async fn wait_until_down(&self) -> ServerState {
        let mut state_rx = self.state_tx.subscribe();
        match state_rx.wait_for(ServerState::is_down).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    pub(crate) fn publish(&self, event: SupervisorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: ServerState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            info!(server = self.name(), from = %previous, to = %state, "Server state changed");
            self.publish_state(state);
        }
    }

    fn publish_state(&self, state: ServerState) {
        self.publish(SupervisorEvent::StateChanged {
            server: self.name().to_string(),
            state,
        });
    }

    /// Atomically move to `to` if `allowed` accepts the current state.
    /// Returns the state that was observed.
    fn transition(
        &self,
        allowed: impl Fn(&ServerState) -> bool,
        to: ServerState,
    ) -> Result<ServerState, ServerState> {
        let mut observed = ServerState::Stopped;
        let claimed = self.state_tx.send_if_modified(|state| {
            observed = *state;
            if allowed(&*state) {
                *state = to;
                true
            } else {
                false
            }
        });

        if claimed {
            info!(server = self.name(), from = %observed, to = %to, "Server state changed");
            self.publish_state(to);
            Ok(observed)
        } else {
            Err(observed)
        }
    }

    pub(crate) async fn start(self: &Arc<Self>, settings: &SupervisorSettings) -> ActionResult {
        match self.transition(ServerState::is_down, ServerState::Starting) {
            Ok(_) => {}
            Err(ServerState::Running) => return Ok(()),
            Err(ServerState::Starting) => {
                return Err(ActionError::AlreadyStarting {
                    server: self.name().to_string(),
                });
            }
            Err(state) => return Err(self.invalid_state(state, "a stop is in progress")),
        }

        let mut slot = self.process.lock().await;

        // Left behind by a crash
        if let Some(dead) = slot.take()
            && let Err(e) = dead.terminate(false, &settings.termination).await
        {
            warn!(server = self.name(), "Previous process did not go away: {e}");
        }

        // The readiness probe cannot tell our listener from someone else's.
        let probe = TcpProbe::new(self.definition.host(), self.definition.port());
        if probe.is_ready().await {
            error!(
                server = self.name(),
                port = self.definition.port(),
                "Port already accepts connections, not starting"
            );
            self.set_state(ServerState::Stopped);
            return Err(ActionError::PortInUse {
                server: self.name().to_string(),
                host: self.definition.host().to_string(),
                port: self.definition.port(),
            });
        }

        let spec = self.definition.server_spec();
        info!(server = self.name(), port = self.definition.port(), "Starting server");

        let handle = match ProcessHandle::spawn(spec, settings.output_tail_lines) {
            Ok(handle) => handle,
            Err(e) => {
                error!(server = self.name(), "Failed to spawn server: {e}");
                self.set_state(ServerState::Stopped);
                return Err(e);
            }
        };

        if let Err(e) = handle
            .wait_for_ready(
                &probe,
                settings.startup_timeout,
                settings.readiness_poll_interval,
            )
            .await
        {
            error!(server = self.name(), pid = handle.pid(), "Server did not become ready: {e}");
            if let Err(kill_err) = handle.terminate(true, &settings.server_termination()).await {
                warn!(server = self.name(), "Failed to stop unready server: {kill_err}");
            }
            self.set_state(ServerState::Stopped);
            return Err(e);
        }

        let exit_rx = handle.subscribe();
        let pid = handle.pid();
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *slot = Some(handle);
        self.set_state(ServerState::Running);
        *self.crash_watcher() = Some(self.watch_for_crash(exit_rx, pid, epoch));
        drop(slot);

        info!(server = self.name(), pid, "Server is accepting connections");
        Ok(())
    }

    pub(crate) async fn stop(&self, settings: &SupervisorSettings) -> ActionResult {
        match self.state() {
            ServerState::Stopped => {
                return Err(self.invalid_state(ServerState::Stopped, "the server is not running"));
            }
            ServerState::Stopping => {
                return Err(self.invalid_state(ServerState::Stopping, "a stop is already in progress"));
            }
            _ => {}
        }

        // Waits out an in-flight start.
        let mut slot = self.process.lock().await;

        match self.transition(ServerState::is_running, ServerState::Stopping) {
            Ok(_) => {}
            Err(ServerState::Crashed { exit_code }) => {
                info!(server = self.name(), exit_code, "Clearing crashed server");
                slot.take();
                self.crash_watcher().take();
                self.set_state(ServerState::Stopped);
                return Ok(());
            }
            Err(state) => return Err(self.invalid_state(state, "the server is not running")),
        }

        self.drain_running_job(settings).await;

        let result = match slot.take() {
            Some(handle) => {
                info!(server = self.name(), pid = handle.pid(), "Stopping server");
                handle.terminate(true, &settings.server_termination()).await
            }
            None => Ok(()),
        };

        // The exit has been seen, so the watcher is about to return.
        let watcher = self.crash_watcher().take();
        if let Some(watcher) = watcher {
            if result.is_ok() {
                let _ = watcher.await;
            } else {
                watcher.abort();
            }
        }

        self.set_state(ServerState::Stopped);
        result
    }

    /// Let the running job finish, cancelling it once the drain timeout passes.
    async fn drain_running_job(&self, settings: &SupervisorSettings) {
        let mut current = self.queue.subscribe_current();
        let Some(job_id) = *current.borrow() else {
            return;
        };

        info!(server = self.name(), %job_id, "Waiting for running job before stopping");
        if tokio::time::timeout(settings.job_drain_timeout, current.wait_for(Option::is_none))
            .await
            .is_ok()
        {
            return;
        }

        warn!(
            server = self.name(),
            %job_id,
            "Job still running after {:?}, cancelling",
            settings.job_drain_timeout
        );
        self.queue.cancel_running();

        let bound = settings.termination.grace + settings.termination.force_timeout;
        if tokio::time::timeout(bound, current.wait_for(Option::is_none))
            .await
            .is_err()
        {
            warn!(server = self.name(), %job_id, "Job did not acknowledge cancellation");
        }
    }

    fn watch_for_crash(
        self: &Arc<Self>,
        mut exit_rx: watch::Receiver<ProcessStatus>,
        pid: Option<u32>,
        epoch: u64,
    ) -> JoinHandle<()> {
        let server: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let status = match exit_rx.wait_for(ProcessStatus::has_exited).await {
                Ok(status) => *status,
                Err(_) => ProcessStatus::Exited { code: None },
            };
            if let Some(server) = server.upgrade() {
                server.mark_crashed(status.exit_code(), pid, epoch);
            }
        })
    }

    fn crash_watcher(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.crash_watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an exit nobody asked for. Exits during a stop are expected.
    fn mark_crashed(&self, exit_code: Option<i32>, pid: Option<u32>, epoch: u64) {
        let crashed = ServerState::Crashed { exit_code };
        let current = |state: &ServerState| {
            state.is_running() && self.epoch.load(Ordering::SeqCst) == epoch
        };
        if self.transition(current, crashed).is_err() {
            return;
        }

        error!(server = self.name(), pid, exit_code, "Server exited unexpectedly");

        // Start/stop own the slot while they run; they clear it themselves.
        if let Ok(mut slot) = self.process.try_lock()
            && slot.as_ref().is_some_and(|handle| handle.pid() == pid)
        {
            slot.take();
        }
    }

    pub(crate) fn status(&self) -> ServerStatus {
        let state = self.state();
        let (pid, started_at, monitor_live) = match self.process.try_lock() {
            Ok(slot) => match slot.as_ref() {
                Some(handle) if handle.is_alive() => {
                    (handle.pid(), Some(handle.started_at()), true)
                }
                Some(handle) => (None, None, !handle.is_monitor_finished()),
                None => (None, None, false),
            },
            // A start or stop is in flight.
            Err(_) => (None, None, true),
        };
        let watcher_live = self
            .crash_watcher()
            .as_ref()
            .is_some_and(|watcher| !watcher.is_finished());

        ServerStatus {
            name: self.name().to_string(),
            state: state.label().to_string(),
            host: self.definition.host().to_string(),
            port: self.definition.port(),
            pid,
            started_at,
            exit_code: match state {
                ServerState::Crashed { exit_code } => exit_code,
                _ => None,
            },
            supervised: monitor_live || watcher_live,
            running_job: self.queue.current(),
            queued_jobs: self.queue.pending_len(),
        }
    }

    fn invalid_state(&self, state: ServerState, message: &str) -> ActionError {
        ActionError::InvalidState {
            server: self.name().to_string(),
            state,
            message: message.to_string(),
        }
    }
}
