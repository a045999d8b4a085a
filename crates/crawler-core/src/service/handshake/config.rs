use std::time::Duration;

/// Handshake client configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// TCP dial deadline
    pub dial_timeout: Duration,
    /// Deadline for the encryption handshake and the hello exchange
    pub handshake_timeout: Duration,
    /// Deadline for each of the status and progress exchanges
    pub status_timeout: Duration,
    /// Deadline for the best-effort disconnect notification
    pub close_timeout: Duration,
    /// Name sent in our hello message
    pub client_name: String,
    /// Listen port advertised in our hello message (0 if not listening)
    pub listen_port: u16,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(15),
            status_timeout: Duration::from_secs(15),
            close_timeout: Duration::from_secs(1),
            client_name: String::from("node-crawler"),
            listen_port: 0,
        }
    }
}

impl HandshakeConfig {
    /// Create config for testing with shorter timeouts.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn for_testing() -> Self {
        Self {
            dial_timeout: Duration::from_millis(500),
            handshake_timeout: Duration::from_millis(500),
            status_timeout: Duration::from_millis(500),
            close_timeout: Duration::from_millis(100),
            client_name: String::from("crawler-test"),
            listen_port: 0,
        }
    }
}
