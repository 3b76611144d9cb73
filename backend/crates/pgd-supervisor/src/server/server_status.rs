use crate::job::JobId;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time view of one server, ready for a UI or a status command.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub state: String,
    pub host: String,
    pub port: u16,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    /// True while a background task still watches this server's process
    pub supervised: bool,
    pub running_job: Option<JobId>,
    pub queued_jobs: usize,
}
