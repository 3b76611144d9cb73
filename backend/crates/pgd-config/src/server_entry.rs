use crate::{ConfigError, ConfigErrorResult, DEFAULT_HOST, DEFAULT_PORT, MIN_PORT};

use std::path::PathBuf;

use serde::Deserialize;

/// One `[[servers]]` table: a database server the supervisor may manage.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    /// Directory holding the server executable and its client tools
    pub bin_dir: PathBuf,
    /// Cluster data directory passed to the server with `-D`
    pub data_dir: PathBuf,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_host() -> String {
    String::from(DEFAULT_HOST)
}

impl ServerEntry {
    pub fn new(
        name: impl Into<String>,
        bin_dir: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            bin_dir: bin_dir.into(),
            data_dir: data_dir.into(),
            port,
            host: default_host(),
        }
    }

    pub fn validate(&self) -> ConfigErrorResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::server("servers.name cannot be empty"));
        }

        if self.port < MIN_PORT {
            return Err(ConfigError::server(format!(
                "servers.port for '{}' must be >= {}, got {}",
                self.name, MIN_PORT, self.port
            )));
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::server(format!(
                "servers.host for '{}' cannot be empty",
                self.name
            )));
        }

        if self.bin_dir.as_os_str().is_empty() {
            return Err(ConfigError::server(format!(
                "servers.bin_dir for '{}' cannot be empty",
                self.name
            )));
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::server(format!(
                "servers.data_dir for '{}' cannot be empty",
                self.name
            )));
        }

        Ok(())
    }
}
