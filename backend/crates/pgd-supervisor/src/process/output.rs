use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

/// Bounded ring of the most recent output lines of one stream.
#[derive(Debug, Clone)]
pub struct OutputTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Tail joined with newlines, as carried by `ActionError::ToolError`.
    pub fn joined(&self) -> String {
        self.lines().join("\n")
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Stream one pipe line by line into the log, optionally keeping a tail.
///
/// Returns when the pipe reaches EOF or fails to read.
pub(crate) async fn pump_lines<R>(
    reader: R,
    label: String,
    stream: &'static str,
    tail: Option<OutputTail>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                debug!(
                    target: "pgd_supervisor::process::output",
                    process = %label,
                    stream,
                    "{line}"
                );
                if let Some(tail) = &tail {
                    tail.push(line);
                }
            }
            Err(e) => {
                debug!(process = %label, stream, "Stopped reading output: {e}");
                break;
            }
        }
    }
}
