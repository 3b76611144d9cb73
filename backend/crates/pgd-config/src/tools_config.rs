use crate::{
    ConfigError, ConfigErrorResult, DEFAULT_CREATE_DATABASE_TOOL, DEFAULT_DROP_DATABASE_TOOL,
    DEFAULT_DUMP_TOOL, DEFAULT_PSQL_TOOL, DEFAULT_RESTORE_TOOL, DEFAULT_SERVER_TOOL,
};

use serde::Deserialize;

/// Executable names looked up inside each server's `bin_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub server: String,
    pub dump: String,
    pub restore: String,
    pub create_database: String,
    pub drop_database: String,
    pub psql: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            server: String::from(DEFAULT_SERVER_TOOL),
            dump: String::from(DEFAULT_DUMP_TOOL),
            restore: String::from(DEFAULT_RESTORE_TOOL),
            create_database: String::from(DEFAULT_CREATE_DATABASE_TOOL),
            drop_database: String::from(DEFAULT_DROP_DATABASE_TOOL),
            psql: String::from(DEFAULT_PSQL_TOOL),
        }
    }
}

impl ToolsConfig {
    pub fn validate(&self) -> ConfigErrorResult<()> {
        let entries = [
            ("tools.server", &self.server),
            ("tools.dump", &self.dump),
            ("tools.restore", &self.restore),
            ("tools.create_database", &self.create_database),
            ("tools.drop_database", &self.drop_database),
            ("tools.psql", &self.psql),
        ];

        for (field, name) in entries {
            if name.trim().is_empty() {
                return Err(ConfigError::tools(format!("{field} cannot be empty")));
            }
            // Tools resolve inside bin_dir, so only bare file names make sense
            if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
                return Err(ConfigError::tools(format!(
                    "{field} must be a bare executable name, got '{name}'"
                )));
            }
        }

        Ok(())
    }
}
