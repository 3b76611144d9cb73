use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 500;

/// Condition that must hold before a spawned server counts as ready.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// One bounded check. Must not block longer than its own timeout.
    async fn is_ready(&self) -> bool;

    /// Human-readable target, used in timeout errors.
    fn describe(&self) -> String;
}

/// Ready once a TCP connection to `host:port` succeeds.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl ReadinessProbe for TcpProbe {
    async fn is_ready(&self) -> bool {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        matches!(
            tokio::time::timeout(self.connect_timeout, connect).await,
            Ok(Ok(_))
        )
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
