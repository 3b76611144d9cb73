//! The set of supervised servers and the public control surface.

use crate::error::{SupervisorError, SupervisorResult};
use crate::job::{self, CancelOutcome, JobId, JobKind, JobState, JobTicket, JobTracker, QueuedJob};
use crate::server::{ManagedServer, ServerDefinition, ServerState, ServerStatus, SupervisorEvent};
use crate::settings::SupervisorSettings;
use crate::{ActionError, ActionResult};

use std::collections::HashMap;
use std::panic::Location;
use std::sync::{Arc, PoisonError, RwLock};

use error_location::ErrorLocation;
use pgd_config::Config;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tracing::{info, warn};

const EVENT_CAPACITY: usize = 256;

struct RegistryInner {
    settings: SupervisorSettings,
    servers: RwLock<HashMap<String, Arc<ManagedServer>>>,
    jobs: Arc<JobTracker>,
    events: broadcast::Sender<SupervisorEvent>,
}

/// Explicitly constructed owner of every managed server.
///
/// Cheap to clone; clones share the same servers.
#[derive(Clone)]
pub struct ServerRegistry {
    inner: Arc<RegistryInner>,
}

impl ServerRegistry {
    pub fn new(settings: SupervisorSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let jobs = Arc::new(JobTracker::new(settings.job_history_limit, events.clone()));
        Self {
            inner: Arc::new(RegistryInner {
                settings,
                servers: RwLock::new(HashMap::new()),
                jobs,
                events,
            }),
        }
    }

    /// Validate `config` and register every server it lists.
    pub fn from_config(config: &Config) -> SupervisorResult<Self> {
        config.validate()?;

        let registry = Self::new(SupervisorSettings::from(&config.supervisor));
        for entry in &config.servers {
            registry.register(ServerDefinition::from_entry(entry, &config.tools))?;
        }

        info!(servers = config.servers.len(), "Server registry ready");
        Ok(registry)
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.inner.settings
    }

    #[track_caller]
    pub fn register(&self, definition: ServerDefinition) -> SupervisorResult<()> {
        let mut servers = self
            .inner
            .servers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let name = definition.name().to_string();
        if servers.contains_key(&name) {
            return Err(SupervisorError::DuplicateServer {
                name,
                location: ErrorLocation::from(Location::caller()),
            });
        }

        info!(server = %name, port = definition.port(), "Registered server");
        let server = ManagedServer::new(definition, self.inner.events.clone());
        servers.insert(name, Arc::new(server));
        Ok(())
    }

    /// Forget a server. Only allowed while it has no process.
    pub fn deregister(&self, name: &str) -> ActionResult {
        let mut servers = self
            .inner
            .servers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let server = servers.get(name).ok_or_else(|| unknown_server(name))?;
        let state = server.state();
        if !state.is_down() {
            return Err(ActionError::InvalidState {
                server: name.to_string(),
                state,
                message: String::from("stop the server before removing it"),
            });
        }

        if let Some(server) = servers.remove(name) {
            for job in server.queue().take_pending() {
                self.inner.jobs.finish(
                    name,
                    job.completion,
                    Err(ActionError::UnknownServer {
                        server: name.to_string(),
                    }),
                );
            }
        }
        info!(server = name, "Deregistered server");
        Ok(())
    }

    /// Registered names, sorted.
    pub fn server_names(&self) -> Vec<String> {
        let servers = self
            .inner
            .servers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = servers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn definition(&self, name: &str) -> Option<ServerDefinition> {
        self.server(name).map(|server| server.definition().clone())
    }

    fn server(&self, name: &str) -> Option<Arc<ManagedServer>> {
        self.inner
            .servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Start `name` and wait until it accepts connections.
    pub async fn start(&self, name: &str) -> ActionResult {
        let server = self.server(name).ok_or_else(|| unknown_server(name))?;
        server.start(&self.inner.settings).await
    }

    /// Stop `name`, letting a running job finish first.
    pub async fn stop(&self, name: &str) -> ActionResult {
        let server = self.server(name).ok_or_else(|| unknown_server(name))?;
        server.stop(&self.inner.settings).await
    }

    /// Current state; `None` for an unknown server.
    pub fn status(&self, name: &str) -> Option<ServerState> {
        self.server(name).map(|server| server.state())
    }

    pub fn status_snapshot(&self, name: &str) -> Option<ServerStatus> {
        self.server(name).map(|server| server.status())
    }

    pub fn subscribe_state(&self, name: &str) -> Option<watch::Receiver<ServerState>> {
        self.server(name).map(|server| server.subscribe_state())
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.inner.events.subscribe()
    }

    /// Queue a job and return immediately.
    ///
    /// The ticket always resolves exactly once. Requests that cannot run
    /// (unknown server, bad parameters, server not running) resolve before
    /// this returns, without spawning anything.
    pub fn submit_job(&self, name: &str, kind: JobKind) -> JobTicket {
        let job_id = JobId::new();
        let (ticket, completion) = job::ticket(job_id);
        let jobs = &self.inner.jobs;

        let Some(server) = self.server(name) else {
            jobs.finish(name, completion, Err(unknown_server(name)));
            return ticket;
        };

        let steps = match job::plan(server.definition(), &kind) {
            Ok(steps) => steps,
            Err(e) => {
                jobs.finish(name, completion, Err(e));
                return ticket;
            }
        };

        if !server.state().is_running() {
            jobs.finish(
                name,
                completion,
                Err(ActionError::ServerNotRunning {
                    server: name.to_string(),
                }),
            );
            return ticket;
        }

        jobs.queued(job_id, name);
        let needs_drain = server.queue().push(QueuedJob {
            kind,
            steps,
            completion,
        });
        if needs_drain {
            tokio::spawn(job::drain(
                Arc::clone(&server),
                Arc::clone(jobs),
                self.inner.settings.clone(),
            ));
        }

        ticket
    }

    /// Cancel a queued job (resolved immediately) or a running one (its tool
    /// is terminated and the ticket resolves once it is gone).
    pub fn cancel_job(&self, job_id: JobId) -> ActionResult {
        let unknown = || ActionError::UnknownJob { job_id };

        let name = self.inner.jobs.server_of(job_id).ok_or_else(unknown)?;
        let server = self.server(&name).ok_or_else(unknown)?;

        match server.queue().cancel(job_id) {
            CancelOutcome::Removed(job) => {
                info!(server = %name, %job_id, "Cancelled queued job");
                self.inner
                    .jobs
                    .finish(&name, job.completion, Err(ActionError::Cancelled));
                Ok(())
            }
            CancelOutcome::Signalled => {
                info!(server = %name, %job_id, "Cancellation requested for running job");
                Ok(())
            }
            CancelOutcome::NotFound => Err(unknown()),
        }
    }

    /// Known state of a job; terminal states are kept for a bounded history.
    pub fn job_state(&self, job_id: JobId) -> Option<JobState> {
        self.inner.jobs.state(job_id)
    }

    /// Jobs waiting behind the running one on `name`, oldest first.
    pub fn queued_jobs(&self, name: &str) -> Vec<JobId> {
        self.server(name)
            .map(|server| server.queue().pending_ids())
            .unwrap_or_default()
    }

    /// Stop every server that has or had a process. Used on application exit.
    pub async fn shutdown(&self) -> Vec<(String, ActionResult)> {
        let servers: Vec<Arc<ManagedServer>> = self
            .inner
            .servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|server| server.state() != ServerState::Stopped)
            .cloned()
            .collect();

        info!(count = servers.len(), "Shutting down servers");

        let mut tasks = JoinSet::new();
        for server in servers {
            let settings = self.inner.settings.clone();
            tasks.spawn(async move {
                let result = match server.stop(&settings).await {
                    // Someone else is already stopping it; wait for that stop.
                    Err(ActionError::InvalidState {
                        state: ServerState::Stopping,
                        ..
                    }) => {
                        info!(server = server.name(), "Stop already in progress, waiting");
                        server.wait_until_down().await;
                        Ok(())
                    }
                    other => other,
                };
                (server.name().to_string(), result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, result)) => {
                    if let Err(e) = &result {
                        warn!(server = %name, "Shutdown did not complete cleanly: {e}");
                    }
                    results.push((name, result));
                }
                Err(e) => warn!("Shutdown task failed: {e}"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }
}

impl std::fmt::Debug for ServerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRegistry")
            .field("servers", &self.server_names())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

fn unknown_server(name: &str) -> ActionError {
    ActionError::UnknownServer {
        server: name.to_string(),
    }
}
