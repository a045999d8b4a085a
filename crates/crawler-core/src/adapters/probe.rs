//! TCP reachability probe used as the record refresh for static sources.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

use crate::domain::{AddressRecord, ResolveError};
use crate::ports::RecordResolver;

/// Treats a node as answering its record request when its TCP port
/// accepts a connection; the record itself is returned unchanged.
#[derive(Debug, Clone)]
pub struct ProbeResolver {
    connect_timeout: Duration,
}

impl ProbeResolver {
    /// Probe with the given connect deadline.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for ProbeResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl RecordResolver for ProbeResolver {
    async fn request_record(&self, record: &AddressRecord) -> Result<AddressRecord, ResolveError> {
        if record.tcp_port == 0 {
            return Err(ResolveError::Unsupported);
        }

        let addr = record.tcp_addr();
        match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => {
                trace!(%addr, "Probe connected");
                Ok(record.clone())
            }
            Ok(Err(e)) => Err(ResolveError::Unreachable(format!("{addr}: {e}"))),
            Err(_) => Err(ResolveError::Timeout),
        }
    }
}
