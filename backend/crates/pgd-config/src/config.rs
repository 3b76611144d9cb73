use crate::{
    CONFIG_DIR_ENV, CONFIG_DIR_NAME, CONFIG_FILENAME, ConfigError, ConfigErrorResult,
    LoggingConfig, ServerEntry, SupervisorConfig, ToolsConfig,
};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub supervisor: SupervisorConfig,
    pub tools: ToolsConfig,
    pub logging: LoggingConfig,
    pub servers: Vec<ServerEntry>,
}

impl Config {
    /// Load config from the config directory.
    ///
    /// Loading order:
    /// 1. Check for PGD_CONFIG_DIR env var, else use <platform config dir>/pgdesk/
    /// 2. Auto-create config directory if it doesn't exist
    /// 3. Load config.toml if it exists, else use defaults
    /// 4. Apply PGD_* environment variable overrides
    ///
    /// Does NOT validate - call validate() after load().
    pub fn load() -> ConfigErrorResult<Self> {
        let config_dir = Self::config_dir()?;

        if !config_dir.exists() {
            std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::Io {
                path: config_dir.clone(),
                source: e,
            })?;
        }

        let config_path = config_dir.join(CONFIG_FILENAME);

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Load and parse a specific TOML file. No environment overrides.
    pub fn load_from(path: &Path) -> ConfigErrorResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::Toml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the config directory.
    /// Priority: PGD_CONFIG_DIR env var > <platform config dir>/pgdesk/
    pub fn config_dir() -> ConfigErrorResult<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }

        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME))
            .ok_or(ConfigError::NoHomeDir)
    }

    /// Validate all configuration.
    /// Call after load() to catch all errors at startup.
    pub fn validate(&self) -> ConfigErrorResult<()> {
        self.supervisor.validate()?;
        self.tools.validate()?;
        self.logging.validate()?;

        let mut names = HashSet::new();
        for server in &self.servers {
            server.validate()?;
            if !names.insert(server.name.as_str()) {
                return Err(ConfigError::server(format!(
                    "duplicate server name '{}'",
                    server.name
                )));
            }
        }

        Ok(())
    }

    /// Absolute log directory: relative `logging.dir` is resolved against the config dir.
    pub fn log_dir(&self) -> ConfigErrorResult<PathBuf> {
        let dir = Path::new(&self.logging.dir);
        if dir.is_absolute() {
            return Ok(dir.to_path_buf());
        }
        Ok(Self::config_dir()?.join(dir))
    }

    pub fn server(&self, name: &str) -> Option<&ServerEntry> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Log configuration summary.
    pub fn log_summary(&self) {
        info!("Configuration loaded:");
        info!(
            "  supervisor: startup={}s, grace={}s, force_kill={}s, drain={}s, poll={}ms",
            self.supervisor.startup_timeout_secs,
            self.supervisor.shutdown_grace_secs,
            self.supervisor.force_kill_timeout_secs,
            self.supervisor.job_drain_timeout_secs,
            self.supervisor.readiness_poll_interval_ms
        );
        info!(
            "  output: tail={} lines, job history={}",
            self.supervisor.output_tail_lines, self.supervisor.job_history_limit
        );
        info!(
            "  tools: server={}, dump={}, restore={}, createdb={}, dropdb={}",
            self.tools.server,
            self.tools.dump,
            self.tools.restore,
            self.tools.create_database,
            self.tools.drop_database
        );
        info!("  logging: {} ({})", *self.logging.level, self.logging.dir);

        for server in &self.servers {
            info!(
                "  server '{}': {}:{} data={} bin={}",
                server.name,
                server.host,
                server.port,
                server.data_dir.display(),
                server.bin_dir.display()
            );
        }
    }

    fn apply_env_overrides(&mut self) {
        // Supervisor
        Self::apply_env_parse(
            "PGD_STARTUP_TIMEOUT_SECS",
            &mut self.supervisor.startup_timeout_secs,
        );
        Self::apply_env_parse(
            "PGD_SHUTDOWN_GRACE_SECS",
            &mut self.supervisor.shutdown_grace_secs,
        );
        Self::apply_env_parse(
            "PGD_FORCE_KILL_TIMEOUT_SECS",
            &mut self.supervisor.force_kill_timeout_secs,
        );
        Self::apply_env_parse(
            "PGD_JOB_DRAIN_TIMEOUT_SECS",
            &mut self.supervisor.job_drain_timeout_secs,
        );
        Self::apply_env_parse(
            "PGD_READINESS_POLL_MS",
            &mut self.supervisor.readiness_poll_interval_ms,
        );
        Self::apply_env_parse(
            "PGD_OUTPUT_TAIL_LINES",
            &mut self.supervisor.output_tail_lines,
        );

        // Logging
        Self::apply_env_parse("PGD_LOG_LEVEL", &mut self.logging.level);
        Self::apply_env_string("PGD_LOG_DIR", &mut self.logging.dir);
    }

    /// Helper: Apply environment variable override for String values
    fn apply_env_string(var_name: &str, target: &mut String) {
        if let Ok(val) = std::env::var(var_name) {
            *target = val;
        }
    }

    /// Helper: Apply environment variable override for parseable values
    fn apply_env_parse<T: std::str::FromStr>(var_name: &str, target: &mut T) {
        if let Ok(val) = std::env::var(var_name)
            && let Ok(parsed) = val.parse()
        {
            *target = parsed;
        }
    }
}
