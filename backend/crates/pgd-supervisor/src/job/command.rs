//! External tool invocations for each job kind.

use crate::job::{JobKind, RestorePolicy};
use crate::process::ProcessSpec;
use crate::server::ServerDefinition;
use crate::ActionError;

use std::path::Path;

const DUMP_FILE_EXTENSION: &str = "pg_dump";

/// File name offered for a new dump of `database`.
pub fn default_dump_file_name(database: &str) -> String {
    format!("{database}.{DUMP_FILE_EXTENSION}")
}

/// Validate `kind` and build the ordered steps that carry it out.
///
/// Nothing is spawned here; every error is an `InvalidRequest`.
pub(crate) fn plan(
    definition: &ServerDefinition,
    kind: &JobKind,
) -> Result<Vec<ProcessSpec>, ActionError> {
    validate_database_name(kind.database())?;
    let tools = definition.tools();

    let steps = match kind {
        JobKind::Dump { database, path } => {
            validate_dump_target(path)?;
            vec![
                connect(definition, &tools.dump)
                    .args(["-F", "c", "-f"])
                    .arg(path)
                    .arg(database),
            ]
        }
        JobKind::Restore {
            database,
            path,
            policy,
        } => {
            if !path.is_file() {
                return Err(invalid(format!(
                    "restore source {} does not exist",
                    path.display()
                )));
            }
            match policy {
                RestorePolicy::CreateNew => vec![
                    connect(definition, &tools.create_database).arg(database),
                    connect(definition, &tools.restore)
                        .arg("-d")
                        .arg(database)
                        .arg(path),
                ],
                RestorePolicy::Overwrite => vec![
                    connect(definition, &tools.restore)
                        .args(["--clean", "--if-exists", "-d"])
                        .arg(database)
                        .arg(path),
                ],
            }
        }
        JobKind::Drop { database } => {
            vec![connect(definition, &tools.drop_database).arg(database)]
        }
    };

    Ok(steps)
}

/// `<bin_dir>/<tool> -h <host> -p <port>`
fn connect(definition: &ServerDefinition, tool: &str) -> ProcessSpec {
    ProcessSpec::new(definition.tool_path(tool))
        .arg("-h")
        .arg(definition.host())
        .arg("-p")
        .arg(definition.port().to_string())
}

fn validate_database_name(database: &str) -> Result<(), ActionError> {
    if database.trim().is_empty() {
        return Err(invalid("database name cannot be empty"));
    }
    // Would be parsed as an option by every tool
    if database.starts_with('-') {
        return Err(invalid(format!(
            "database name '{database}' cannot start with '-'"
        )));
    }
    if database.contains('\0') {
        return Err(invalid("database name cannot contain NUL"));
    }
    Ok(())
}

fn validate_dump_target(path: &Path) -> Result<(), ActionError> {
    if path.as_os_str().is_empty() {
        return Err(invalid("dump destination cannot be empty"));
    }
    if path.is_dir() {
        return Err(invalid(format!(
            "dump destination {} is a directory",
            path.display()
        )));
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.is_dir()
    {
        return Err(invalid(format!(
            "dump directory {} does not exist",
            parent.display()
        )));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> ActionError {
    ActionError::InvalidRequest {
        message: message.into(),
    }
}
