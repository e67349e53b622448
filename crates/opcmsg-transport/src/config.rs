use std::time::Duration;

use opcmsg_frame::DEFAULT_MAX_BODY;

/// Default listening port for the server role.
pub const DEFAULT_SERVER_PORT: u16 = 4223;

/// Default receive timeout, also the readiness loop's wait granularity.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// Default bound on waiting for the readiness loop to come up.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for [`MessageServer`](crate::MessageServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind. Default: `0.0.0.0`.
    pub host: String,
    /// Port to bind; `0` picks an ephemeral port. Default: 4223.
    pub port: u16,
    /// Upper bound on a single readiness wait. Default: 500 ms.
    pub recv_timeout: Duration,
    /// How long `start()` waits for the loop to report running. Default: 2 s.
    pub startup_timeout: Duration,
    /// Largest accepted message body. Default: 16 MiB.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_SERVER_PORT,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            max_body_size: DEFAULT_MAX_BODY,
        }
    }
}

impl ServerConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_max_body_size(mut self, max: usize) -> Self {
        self.max_body_size = max;
        self
    }

    /// `host:port` as passed to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 4223);
        assert_eq!(cfg.recv_timeout, Duration::from_millis(500));
        assert_eq!(cfg.bind_addr(), "0.0.0.0:4223");
    }

    #[test]
    fn builder_overrides() {
        let cfg = ServerConfig::default()
            .with_host("127.0.0.1")
            .with_port(0)
            .with_recv_timeout(Duration::from_millis(50));
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
        assert_eq!(cfg.recv_timeout, Duration::from_millis(50));
    }
}
