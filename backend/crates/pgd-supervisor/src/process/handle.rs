//! One supervised OS process and the background task that watches it.

use crate::process::output::pump_lines;
use crate::process::{
    OutputTail, ProcessSpec, ProcessStatus, ReadinessProbe, StopSignal, TerminationPolicy,
};
use crate::{ActionError, ActionResult};

use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Upper bound on waiting for output pipes after the process itself exited.
/// A grandchild that inherited the pipes can keep them open indefinitely.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Owns one spawned process.
///
/// A monitor task owns the `Child`, reaps it, and publishes the exit through a
/// watch channel, so `is_alive` is a cheap read and never a syscall.
/// Dropping a live handle kills the process.
pub struct ProcessHandle {
    spec: ProcessSpec,
    label: String,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    status_rx: watch::Receiver<ProcessStatus>,
    kill_tx: mpsc::Sender<()>,
    stderr_tail: OutputTail,
    monitor: JoinHandle<()>,
}

impl ProcessHandle {
    /// Spawn the process and its monitor. Must be called inside a tokio runtime.
    pub fn spawn(spec: ProcessSpec, tail_lines: usize) -> Result<Self, ActionError> {
        let label = spec.label();

        let mut cmd = spec.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| ActionError::Spawn {
            program: spec.program().to_path_buf(),
            message: e.to_string(),
        })?;

        let pid = child.id();
        info!(pid, command = %spec.command_line(), "Spawned {label}");

        let stderr_tail = OutputTail::new(tail_lines);
        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump_lines(stdout, label.clone(), "stdout", None)));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump_lines(
                stderr,
                label.clone(),
                "stderr",
                Some(stderr_tail.clone()),
            )));
        }

        let (status_tx, status_rx) = watch::channel(ProcessStatus::Running);
        let (kill_tx, kill_rx) = mpsc::channel(1);
        let monitor = tokio::spawn(monitor(child, kill_rx, status_tx, pumps, label.clone(), pid));

        Ok(Self {
            spec,
            label,
            pid,
            started_at: Utc::now(),
            status_rx,
            kill_tx,
            stderr_tail,
            monitor,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Latest monitored status.
    pub fn status(&self) -> ProcessStatus {
        *self.status_rx.borrow()
    }

    pub fn is_alive(&self) -> bool {
        !self.status().has_exited()
    }

    /// Exit code once the process has exited; `None` while running or if killed by signal.
    pub fn exit_code(&self) -> Option<i32> {
        self.status().exit_code()
    }

    /// Receiver that observes the exit transition.
    pub fn subscribe(&self) -> watch::Receiver<ProcessStatus> {
        self.status_rx.clone()
    }

    /// Most recent stderr lines, newline-joined.
    pub fn stderr_tail(&self) -> String {
        self.stderr_tail.joined()
    }

    /// True once the monitor task has finished (process reaped, pipes drained).
    pub fn is_monitor_finished(&self) -> bool {
        self.monitor.is_finished()
    }

    /// Suspend until the process exits.
    pub async fn wait_exit(&self) -> ProcessStatus {
        let mut rx = self.status_rx.clone();
        match rx.wait_for(ProcessStatus::has_exited).await {
            Ok(status) => *status,
            // Monitor vanished without publishing; the runtime is going away.
            Err(_) => ProcessStatus::Exited { code: None },
        }
    }

    /// Wait for exit at most `timeout`; `None` if still running afterwards.
    pub async fn wait_exit_timeout(&self, timeout: Duration) -> Option<ProcessStatus> {
        tokio::time::timeout(timeout, self.wait_exit()).await.ok()
    }

    /// Wait until `probe` passes, the process exits, or `timeout` elapses.
    pub async fn wait_for_ready(
        &self,
        probe: &dyn ReadinessProbe,
        timeout: Duration,
        poll_interval: Duration,
    ) -> ActionResult {
        let deadline = Instant::now() + timeout;
        let mut status_rx = self.status_rx.clone();

        loop {
            if let ProcessStatus::Exited { code } = *status_rx.borrow_and_update() {
                return Err(ActionError::ProcessExited { code });
            }

            if probe.is_ready().await {
                // The probe may have raced with an exit; the status wins.
                if let ProcessStatus::Exited { code } = self.status() {
                    return Err(ActionError::ProcessExited { code });
                }
                debug!(pid = self.pid, probe = %probe.describe(), "Readiness probe passed");
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ActionError::Timeout {
                    operation: format!("{} readiness on {}", self.label, probe.describe()),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }

            let wake = std::cmp::min(deadline, now + poll_interval);
            tokio::select! {
                _ = tokio::time::sleep_until(wake) => {}
                changed = status_rx.changed() => {
                    if changed.is_err() && !self.status().has_exited() {
                        // Monitor gone without an exit record: treat as exited.
                        return Err(ActionError::ProcessExited { code: None });
                    }
                }
            }
        }
    }

    /// Stop the process, escalating from graceful to forceful.
    ///
    /// Returns `Ok` once the exit has been observed. Already-exited processes
    /// succeed immediately.
    pub async fn terminate(&self, graceful: bool, policy: &TerminationPolicy) -> ActionResult {
        if !self.is_alive() {
            return Ok(());
        }

        if graceful && self.send_graceful_signal(policy.signal) {
            if self.wait_exit_timeout(policy.grace).await.is_some() {
                info!(pid = self.pid, "{} exited after graceful stop", self.label);
                return Ok(());
            }
            warn!(
                pid = self.pid,
                "{} did not exit within {:?}, killing",
                self.label,
                policy.grace
            );
        }

        self.force_kill();

        match self.wait_exit_timeout(policy.force_timeout).await {
            Some(status) => {
                info!(pid = self.pid, exit_code = ?status.exit_code(), "{} killed", self.label);
                Ok(())
            }
            None => Err(ActionError::TimeoutOnForceKill { pid: self.pid }),
        }
    }

    /// Ask the monitor to SIGKILL the child. Non-blocking.
    pub fn force_kill(&self) {
        // A full channel already carries a pending kill request.
        let _ = self.kill_tx.try_send(());
    }

    #[cfg(unix)]
    fn send_graceful_signal(&self, signal: StopSignal) -> bool {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Some(pid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return false;
        };

        let signal = match signal {
            StopSignal::Terminate => Signal::SIGTERM,
            StopSignal::Interrupt => Signal::SIGINT,
        };

        let name = signal.as_str();
        debug!(pid, "Sending {name} to {}", self.label);
        match kill(Pid::from_raw(pid), signal) {
            Ok(()) => true,
            Err(e) => {
                warn!(pid, "Failed to send {name} to {}: {e}", self.label);
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn send_graceful_signal(&self, _signal: StopSignal) -> bool {
        // No portable polite stop; fall straight through to the kill.
        false
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            warn!(pid = self.pid, "Dropping live {} handle, killing process", self.label);
            self.force_kill();
        }
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("label", &self.label)
            .field("pid", &self.pid)
            .field("started_at", &self.started_at)
            .field("status", &self.status())
            .finish()
    }
}

/// Reap the child, honouring kill requests, then publish the exit.
async fn monitor(
    mut child: Child,
    mut kill_rx: mpsc::Receiver<()>,
    status_tx: watch::Sender<ProcessStatus>,
    pumps: Vec<JoinHandle<()>>,
    label: String,
    pid: Option<u32>,
) {
    let mut kill_open = true;

    let waited = loop {
        tokio::select! {
            status = child.wait() => break status,
            request = kill_rx.recv(), if kill_open => match request {
                Some(()) => {
                    if let Err(e) = child.start_kill() {
                        warn!(pid, "Failed to kill {label}: {e}");
                    }
                }
                // Handle dropped; the Drop impl already queued a kill if needed.
                None => kill_open = false,
            },
        }
    };

    let code = match waited {
        Ok(status) => status.code(),
        Err(e) => {
            warn!(pid, "Failed to reap {label}: {e}");
            None
        }
    };

    for pump in pumps {
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, pump).await.is_err() {
            debug!(pid, "Output of {label} still open after exit, detaching reader");
        }
    }

    debug!(pid, exit_code = ?code, "{label} exited");
    let _ = status_tx.send(ProcessStatus::Exited { code });
}
