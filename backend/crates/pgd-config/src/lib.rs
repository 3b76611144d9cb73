mod config;
mod error;
mod log_level;
mod logging_config;
mod server_entry;
mod supervisor_config;
mod tools_config;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use error::{ConfigError, ConfigErrorResult};
pub use log_level::LogLevel;
pub use logging_config::LoggingConfig;
pub use server_entry::ServerEntry;
pub use supervisor_config::SupervisorConfig;
pub use tools_config::ToolsConfig;

const CONFIG_DIR_ENV: &str = "PGD_CONFIG_DIR";
const CONFIG_DIR_NAME: &str = "pgdesk";
const CONFIG_FILENAME: &str = "config.toml";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5432;
const MIN_PORT: u16 = 1024;

const DEFAULT_LOG_LEVEL_STRING: &str = "info";
const DEFAULT_LOG_LEVEL: log::LevelFilter = log::LevelFilter::Info;
const DEFAULT_LOG_DIRECTORY: &str = "logs";

const DEFAULT_SERVER_TOOL: &str = "postgres";
const DEFAULT_DUMP_TOOL: &str = "pg_dump";
const DEFAULT_RESTORE_TOOL: &str = "pg_restore";
const DEFAULT_CREATE_DATABASE_TOOL: &str = "createdb";
const DEFAULT_DROP_DATABASE_TOOL: &str = "dropdb";
const DEFAULT_PSQL_TOOL: &str = "psql";
