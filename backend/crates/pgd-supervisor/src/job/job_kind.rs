use std::path::{Path, PathBuf};

/// What a restore does when the target database name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestorePolicy {
    /// Create the database first; an existing name fails the job.
    #[default]
    CreateNew,
    /// Restore into the existing database, dropping objects it replaces.
    Overwrite,
}

/// One maintenance operation against a database on a running server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    /// Export `database` to `path` in the custom archive format
    Dump { database: String, path: PathBuf },
    /// Import the archive at `path` into `database`
    Restore {
        database: String,
        path: PathBuf,
        policy: RestorePolicy,
    },
    /// Destroy `database`. There is no undo.
    Drop { database: String },
}

impl JobKind {
    pub fn dump(database: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::Dump {
            database: database.into(),
            path: path.into(),
        }
    }

    pub fn restore(
        database: impl Into<String>,
        path: impl Into<PathBuf>,
        policy: RestorePolicy,
    ) -> Self {
        Self::Restore {
            database: database.into(),
            path: path.into(),
            policy,
        }
    }

    pub fn drop_database(database: impl Into<String>) -> Self {
        Self::Drop {
            database: database.into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Dump { .. } => "dump",
            Self::Restore { .. } => "restore",
            Self::Drop { .. } => "drop",
        }
    }

    pub fn database(&self) -> &str {
        match self {
            Self::Dump { database, .. }
            | Self::Restore { database, .. }
            | Self::Drop { database } => database,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Dump { path, .. } | Self::Restore { path, .. } => Some(path),
            Self::Drop { .. } => None,
        }
    }

    /// True when success alters the set of databases on the server.
    pub fn changes_databases(&self) -> bool {
        matches!(self, Self::Restore { .. } | Self::Drop { .. })
    }
}
