use crate::process::ProcessSpec;

use std::path::{Path, PathBuf};

use pgd_config::{ServerEntry, ToolsConfig};

/// Static description of a server: where it lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDefinition {
    name: String,
    bin_dir: PathBuf,
    data_dir: PathBuf,
    host: String,
    port: u16,
    tools: ToolsConfig,
}

impl ServerDefinition {
    pub fn new(
        name: impl Into<String>,
        bin_dir: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        port: u16,
    ) -> Self {
        let entry = ServerEntry::new(name, bin_dir, data_dir, port);
        Self::from_entry(&entry, &ToolsConfig::default())
    }

    pub fn from_entry(entry: &ServerEntry, tools: &ToolsConfig) -> Self {
        Self {
            name: entry.name.clone(),
            bin_dir: entry.bin_dir.clone(),
            data_dir: entry.data_dir.clone(),
            host: entry.host.clone(),
            port: entry.port,
            tools: tools.clone(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_tools(mut self, tools: ToolsConfig) -> Self {
        self.tools = tools;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn tools(&self) -> &ToolsConfig {
        &self.tools
    }

    pub fn tool_path(&self, tool: &str) -> PathBuf {
        self.bin_dir.join(tool)
    }

    /// The server itself, run in the foreground so its exit is observable.
    pub fn server_spec(&self) -> ProcessSpec {
        ProcessSpec::new(self.tool_path(&self.tools.server))
            .arg("-D")
            .arg(&self.data_dir)
            .arg("-p")
            .arg(self.port.to_string())
    }

    /// Shell command that opens an interactive session on `database`.
    ///
    /// Meant to be pasted into a terminal, so the binary path is always
    /// single-quoted and the database name is quoted when it needs to be.
    pub fn psql_command_line(&self, database: &str) -> String {
        let psql = self.tool_path(&self.tools.psql);
        let database = if is_shell_safe(database) {
            database.to_string()
        } else {
            shell_quote(database)
        };
        format!(
            "{} -p{} -d {}",
            shell_quote(&psql.to_string_lossy()),
            self.port,
            database
        )
    }
}

impl From<&ServerEntry> for ServerDefinition {
    fn from(entry: &ServerEntry) -> Self {
        Self::from_entry(entry, &ToolsConfig::default())
    }
}

fn is_shell_safe(word: &str) -> bool {
    !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// `'...'` with embedded quotes written as `'\''`.
fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}
