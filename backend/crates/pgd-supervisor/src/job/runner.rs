//! Executes queued jobs one at a time against their server.

use crate::job::{JobTracker, QueuedJob};
use crate::process::{ProcessHandle, ProcessSpec, ProcessStatus};
use crate::server::{ManagedServer, ServerState, SupervisorEvent};
use crate::settings::SupervisorSettings;
use crate::{ActionError, ActionResult};

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Drain `server`'s queue until it is empty.
///
/// Spawned by whoever pushed onto an idle queue; exits once `next` releases
/// the drain claim.
pub(crate) async fn drain(
    server: Arc<ManagedServer>,
    tracker: Arc<JobTracker>,
    settings: SupervisorSettings,
) {
    while let Some((job, cancel)) = server.queue().next() {
        let job_id = job.id();
        tracker.started(job_id, server.name());

        let QueuedJob {
            kind,
            steps,
            completion,
        } = job;
        let result = run(&server, &settings, steps, cancel).await;

        server.queue().finish_current();

        if result.is_ok() && kind.changes_databases() {
            debug!(server = server.name(), %job_id, "{} changed the database list", kind.label());
            server.publish(SupervisorEvent::DatabasesChanged {
                server: server.name().to_string(),
            });
        }

        tracker.finish(server.name(), completion, result);
    }
}

/// Run every step of one job, stopping at the first failure.
async fn run(
    server: &ManagedServer,
    settings: &SupervisorSettings,
    steps: Vec<ProcessSpec>,
    mut cancel: watch::Receiver<bool>,
) -> ActionResult {
    if server.state() != ServerState::Running {
        return Err(ActionError::ServerNotRunning {
            server: server.name().to_string(),
        });
    }

    for (index, spec) in steps.into_iter().enumerate() {
        if *cancel.borrow() {
            return Err(ActionError::Cancelled);
        }
        // A later step must not start against a server that died meanwhile.
        let state = server.state();
        if index > 0 && state.is_down() {
            return Err(server_went_down(server, spec.label(), None, String::new(), state));
        }
        run_step(server, settings, spec, &mut cancel).await?;
    }
    Ok(())
}

async fn run_step(
    server: &ManagedServer,
    settings: &SupervisorSettings,
    spec: ProcessSpec,
    cancel: &mut watch::Receiver<bool>,
) -> ActionResult {
    let tool = spec.label();
    let handle = ProcessHandle::spawn(spec, settings.output_tail_lines)?;
    let mut server_state = server.subscribe_state();

    tokio::select! {
        biased;

        status = handle.wait_exit() => tool_outcome(&tool, status, &handle),

        true = cancellation(cancel) => {
            // The tool may have finished in the same instant.
            if handle.status().is_success() {
                return Ok(());
            }
            info!(server = server.name(), pid = handle.pid(), "Cancelling {tool}");
            handle.terminate(true, &settings.termination).await?;
            if handle.status().is_success() {
                Ok(())
            } else {
                Err(ActionError::Cancelled)
            }
        }

        Some(state) = server_down(&mut server_state) => {
            warn!(server = server.name(), state = %state, "Server went down while {tool} was running");
            if let Err(e) = handle.terminate(true, &settings.termination).await {
                warn!(server = server.name(), "Failed to stop {tool}: {e}");
            }
            Err(server_went_down(server, tool, handle.exit_code(), handle.stderr_tail(), state))
        }
    }
}

fn server_went_down(
    server: &ManagedServer,
    tool: String,
    exit_code: Option<i32>,
    tail: String,
    state: ServerState,
) -> ActionError {
    let reason = format!("server {} is {state}", server.name());
    ActionError::ToolError {
        tool,
        exit_code,
        stderr_tail: if tail.is_empty() {
            reason
        } else {
            format!("{reason}\n{tail}")
        },
    }
}

fn tool_outcome(tool: &str, status: ProcessStatus, handle: &ProcessHandle) -> ActionResult {
    if status.is_success() {
        debug!(pid = handle.pid(), "{tool} finished");
        return Ok(());
    }
    Err(ActionError::ToolError {
        tool: tool.to_string(),
        exit_code: status.exit_code(),
        stderr_tail: handle.stderr_tail(),
    })
}

/// Resolves true once cancellation is requested; false if it never can be.
async fn cancellation(cancel: &mut watch::Receiver<bool>) -> bool {
    cancel.wait_for(|requested| *requested).await.is_ok()
}

async fn server_down(state: &mut watch::Receiver<ServerState>) -> Option<ServerState> {
    state.wait_for(ServerState::is_down).await.ok().map(|state| *state)
}
