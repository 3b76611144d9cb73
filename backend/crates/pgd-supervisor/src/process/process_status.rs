/// Latest state observed by a process monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    /// Exit code is `None` when the process was terminated by a signal
    Exited { code: Option<i32> },
}

impl ProcessStatus {
    pub fn has_exited(&self) -> bool {
        matches!(self, Self::Exited { .. })
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Running => None,
            Self::Exited { code } => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited { code: Some(0) })
    }
}
