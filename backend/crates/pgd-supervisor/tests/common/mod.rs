#![allow(dead_code)]

use pgd_supervisor::{
    JobId, ServerDefinition, ServerRegistry, ServerState, SupervisorEvent, SupervisorSettings,
    TerminationPolicy,
};

use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast;

pub const SERVER: &str = "pg1";
pub const WAIT: Duration = Duration::from_secs(10);

/// Stands in for `postgres`: fails fast when the data directory holds an
/// `exit_early` marker, otherwise writes `postmaster.pid` and runs until
/// signalled, recording the signal in `stop_signal`.
const FAKE_SERVER: &str = r#"#!/bin/sh
data="$2"
if [ -f "$data/exit_early" ]; then
    echo "FATAL: could not open data directory" >&2
    exit 3
fi
trap 'echo INT > "$data/stop_signal"; rm -f "$data/postmaster.pid"; exit 0' INT
trap 'echo TERM > "$data/stop_signal"; rm -f "$data/postmaster.pid"; exit 0' TERM
echo $$ > "$data/postmaster.pid"
while :; do sleep 0.1; done
"#;

/// Stands in for every client tool. Records start/end in `jobs.log`, honours
/// `<tool>.delay` and `<tool>.fail` control files, and writes `-f` targets.
const FAKE_TOOL: &str = r#"#!/bin/sh
tool=$(basename "$0")
dir=$(dirname "$0")
out=""
db=""
while [ $# -gt 0 ]; do
    case "$1" in
        -f) out="$2"; shift 2 ;;
        -d) db="$2"; shift 2 ;;
        -h|-p|-F) shift 2 ;;
        --*) shift ;;
        *) [ -z "$db" ] && db="$1"; shift ;;
    esac
done
echo "start $tool $db" >> "$dir/jobs.log"
if [ -f "$dir/$tool.delay" ]; then
    sleep "$(cat "$dir/$tool.delay")" </dev/null >/dev/null 2>&1
fi
if [ -f "$dir/$tool.fail" ]; then
    echo "$tool: error: $(cat "$dir/$tool.fail")" >&2
    echo "end $tool $db" >> "$dir/jobs.log"
    exit 1
fi
if [ -n "$out" ]; then
    echo "archive of $db" > "$out"
fi
echo "end $tool $db" >> "$dir/jobs.log"
"#;

const TOOLS: [&str; 5] = ["pg_dump", "pg_restore", "createdb", "dropdb", "psql"];

/// Short policy values so failing paths resolve quickly.
pub fn test_settings() -> SupervisorSettings {
    SupervisorSettings {
        startup_timeout: Duration::from_secs(5),
        readiness_poll_interval: Duration::from_millis(50),
        termination: TerminationPolicy {
            grace: Duration::from_secs(2),
            force_timeout: Duration::from_secs(2),
            ..TerminationPolicy::default()
        },
        job_drain_timeout: Duration::from_secs(10),
        output_tail_lines: 20,
        job_history_limit: 64,
    }
}

/// Listens on a port exactly while the fake server named in `postmaster.pid`
/// is alive, the way a real postmaster owns its socket.
struct PortOwner {
    listening: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PortOwner {
    fn spawn(data_dir: PathBuf, port: u16) -> Self {
        let listening = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        let thread = {
            let listening = Arc::clone(&listening);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let pid_file = data_dir.join("postmaster.pid");
                let mut listener: Option<TcpListener> = None;
                while !done.load(Ordering::SeqCst) {
                    let alive = std::fs::read_to_string(&pid_file)
                        .ok()
                        .and_then(|pid| pid.trim().parse::<u32>().ok())
                        .is_some_and(process_exists);
                    if alive && listener.is_none() {
                        listener = TcpListener::bind(("127.0.0.1", port)).ok();
                    } else if !alive {
                        listener = None;
                    }
                    listening.store(listener.is_some(), Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                }
            })
        };
        Self {
            listening,
            done,
            thread: Some(thread),
        }
    }
}

impl Drop for PortOwner {
    fn drop(&mut self) {
        self.done.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// A registry with one server backed by fake executables in a temp dir.
pub struct Fixture {
    pub temp: TempDir,
    pub bin_dir: PathBuf,
    pub data_dir: PathBuf,
    pub port: u16,
    port_owners: Vec<PortOwner>,
    pub registry: ServerRegistry,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(test_settings(), true)
    }

    pub fn with_settings(settings: SupervisorSettings) -> Self {
        Self::build(settings, true)
    }

    /// Nothing ever listens on the server's port, so readiness never passes.
    pub fn unreachable(settings: SupervisorSettings) -> Self {
        Self::build(settings, false)
    }

    fn build(settings: SupervisorSettings, listening: bool) -> Self {
        let temp = TempDir::new().unwrap();
        let bin_dir = temp.path().join("bin");
        let data_dir = temp.path().join("data");
        std::fs::create_dir_all(&bin_dir).unwrap();
        std::fs::create_dir_all(&data_dir).unwrap();

        write_script(&bin_dir.join("postgres"), FAKE_SERVER);
        for tool in TOOLS {
            write_script(&bin_dir.join(tool), FAKE_TOOL);
        }

        let port = free_port();
        let port_owners = if listening {
            vec![PortOwner::spawn(data_dir.clone(), port)]
        } else {
            Vec::new()
        };

        let registry = ServerRegistry::new(settings);
        registry
            .register(ServerDefinition::new(SERVER, &bin_dir, &data_dir, port))
            .unwrap();

        Self {
            temp,
            bin_dir,
            data_dir,
            port,
            port_owners,
            registry,
        }
    }

    /// Register another server sharing the fake tools (and `jobs.log`), with
    /// its own data directory and port. Returns its data directory.
    pub fn add_server(&mut self, name: &str) -> PathBuf {
        let data_dir = self.temp.path().join(format!("data-{name}"));
        std::fs::create_dir_all(&data_dir).unwrap();
        let port = free_port();
        self.port_owners
            .push(PortOwner::spawn(data_dir.clone(), port));
        self.registry
            .register(ServerDefinition::new(name, &self.bin_dir, &data_dir, port))
            .unwrap();
        data_dir
    }

    /// Wait until the first server's port has been released again.
    pub async fn wait_for_port_release(&self) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while self
            .port_owners
            .first()
            .is_some_and(|owner| owner.listening.load(Ordering::SeqCst))
        {
            assert!(
                tokio::time::Instant::now() < deadline,
                "port {} never released",
                self.port
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Signal the fake server recorded when it was last stopped.
    pub fn stop_signal(&self) -> Option<String> {
        std::fs::read_to_string(self.data_dir.join("stop_signal"))
            .ok()
            .map(|signal| signal.trim().to_string())
    }

    pub fn set_delay(&self, tool: &str, secs: f32) {
        std::fs::write(self.bin_dir.join(format!("{tool}.delay")), secs.to_string()).unwrap();
    }

    pub fn set_failure(&self, tool: &str, message: &str) {
        std::fs::write(self.bin_dir.join(format!("{tool}.fail")), message).unwrap();
    }

    pub fn jobs_log(&self) -> Vec<String> {
        std::fs::read_to_string(self.bin_dir.join("jobs.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Poll `jobs.log` until `line` appears.
    pub async fn wait_for_log_line(&self, line: &str) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while !self.jobs_log().iter().any(|l| l == line) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "'{line}' never appeared in jobs.log: {:?}",
                self.jobs_log()
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub fn server_pid(&self) -> u32 {
        self.registry
            .status_snapshot(SERVER)
            .and_then(|status| status.pid)
            .expect("server should have a live process")
    }

    pub async fn wait_for_state(&self, wanted: impl Fn(&ServerState) -> bool) -> ServerState {
        let mut rx = self.registry.subscribe_state(SERVER).unwrap();
        let state = tokio::time::timeout(WAIT, rx.wait_for(|state| wanted(state)))
            .await
            .expect("timed out waiting for server state")
            .expect("state channel closed");
        *state
    }
}

/// A port nothing listens on right now.
fn free_port() -> u16 {
    let probe = TcpListener::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap().port()
}

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Wait until `job_id` has been taken off the queue.
pub async fn wait_for_job_start(events: &mut broadcast::Receiver<SupervisorEvent>, job_id: JobId) {
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(SupervisorEvent::JobStarted { job_id: id, .. }) if id == job_id => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("job never started");
}

/// True while a process with `pid` exists (zombies included).
pub fn process_exists(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), None).is_ok()
}

pub fn kill_hard(pid: u32) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();
}
