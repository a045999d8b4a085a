//! Length-prefixed message channel over plain TCP.
//!
//! Frame layout: a 4-byte big-endian body length, then the body. The body
//! is the RLP-encoded message code followed by the payload, which is
//! snappy-compressed once compression has been enabled.
//!
//! The opening exchange swaps 64-byte identity keys: the dialer writes its
//! session key first, the listener answers with its node key, and the
//! dialer checks it against the record it dialed. There is no encryption;
//! this stands in for an authenticated transport on local networks and in
//! tests.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::domain::{AddressRecord, PublicKey};
use crate::ports::{ChannelError, ChannelFactory, ConnectTimeouts, SecureChannel};
use crate::protocol::SessionKey;

/// Largest accepted frame body, compressed or not (16 MiB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Message channel to one peer.
pub struct TcpChannel {
    stream: TcpStream,
    snappy: bool,
    remote: PublicKey,
}

impl TcpChannel {
    /// Dial side of the identity exchange.
    pub async fn connect(
        mut stream: TcpStream,
        local: PublicKey,
        expected: PublicKey,
    ) -> Result<Self, ChannelError> {
        stream.write_all(local.as_bytes()).await?;
        let remote = read_identity(&mut stream).await?;
        if remote != expected {
            return Err(ChannelError::Handshake(format!(
                "remote identity {} does not match dialed record",
                remote.to_hex()
            )));
        }
        Ok(Self {
            stream,
            snappy: false,
            remote,
        })
    }

    /// Listener side of the identity exchange.
    pub async fn accept(mut stream: TcpStream, local: PublicKey) -> Result<Self, ChannelError> {
        let remote = read_identity(&mut stream).await?;
        stream.write_all(local.as_bytes()).await?;
        Ok(Self {
            stream,
            snappy: false,
            remote,
        })
    }

    /// Identity presented by the other side
    pub fn remote(&self) -> &PublicKey {
        &self.remote
    }

    fn encode_body(&self, code: u64, payload: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let mut body = rlp::encode(&code).to_vec();
        if self.snappy {
            let compressed = snap::raw::Encoder::new()
                .compress_vec(payload)
                .map_err(|e| ChannelError::Compression(e.to_string()))?;
            body.extend_from_slice(&compressed);
        } else {
            body.extend_from_slice(payload);
        }
        Ok(body)
    }

    fn decode_body(&self, body: &[u8]) -> Result<(u64, Vec<u8>), ChannelError> {
        let info = rlp::Rlp::new(body).payload_info().map_err(invalid_data)?;
        let code_len = info.header_len + info.value_len;
        if code_len > body.len() {
            return Err(invalid_data("truncated message code"));
        }
        let code: u64 = rlp::Rlp::new(&body[..code_len]).as_val().map_err(invalid_data)?;
        let payload = &body[code_len..];

        if !self.snappy {
            return Ok((code, payload.to_vec()));
        }
        let len = snap::raw::decompress_len(payload)
            .map_err(|e| ChannelError::Compression(e.to_string()))?;
        if len > MAX_FRAME_SIZE {
            return Err(ChannelError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }
        let decompressed = snap::raw::Decoder::new()
            .decompress_vec(payload)
            .map_err(|e| ChannelError::Compression(e.to_string()))?;
        Ok((code, decompressed))
    }
}

#[async_trait]
impl SecureChannel for TcpChannel {
    async fn write_msg(&mut self, code: u64, payload: &[u8]) -> Result<(), ChannelError> {
        let body = self.encode_body(code, payload)?;
        if body.len() > MAX_FRAME_SIZE {
            return Err(ChannelError::FrameTooLarge {
                size: body.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let len = u32::try_from(body.len()).map_err(|_| ChannelError::FrameTooLarge {
            size: body.len(),
            max: MAX_FRAME_SIZE,
        })?;
        self.stream.write_all(&len.to_be_bytes()).await?;
        self.stream.write_all(&body).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_msg(&mut self) -> Result<(u64, Vec<u8>), ChannelError> {
        let mut header = [0u8; 4];
        read_exact(&mut self.stream, &mut header).await?;
        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(ChannelError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut body = vec![0u8; len];
        read_exact(&mut self.stream, &mut body).await?;
        self.decode_body(&body)
    }

    fn set_snappy(&mut self, enabled: bool) {
        self.snappy = enabled;
    }

    async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

/// Dials [`TcpChannel`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpChannelFactory;

impl TcpChannelFactory {
    /// Create a factory.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelFactory for TcpChannelFactory {
    async fn connect(
        &self,
        record: &AddressRecord,
        key: &SessionKey,
        timeouts: ConnectTimeouts,
    ) -> Result<Box<dyn SecureChannel>, ChannelError> {
        let addr = record.tcp_addr();
        let stream = timeout(timeouts.dial, TcpStream::connect(addr))
            .await
            .map_err(|_| ChannelError::Timeout)?
            .map_err(|e| ChannelError::Dial(format!("{addr}: {e}")))?;
        stream.set_nodelay(true)?;
        let channel = timeout(
            timeouts.handshake,
            TcpChannel::connect(stream, key.public_key(), record.public_key),
        )
        .await
        .map_err(|_| ChannelError::Timeout)??;
        Ok(Box::new(channel))
    }
}

async fn read_identity(stream: &mut TcpStream) -> Result<PublicKey, ChannelError> {
    let mut key = [0u8; 64];
    read_exact(stream, &mut key).await?;
    Ok(PublicKey::new(key))
}

// EOF before a full frame means the peer hung up.
async fn read_exact(stream: &mut TcpStream, buf: &mut [u8]) -> Result<(), ChannelError> {
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ChannelError::Closed),
        Err(e) => Err(ChannelError::Io(e)),
    }
}

fn invalid_data(e: impl ToString) -> ChannelError {
    ChannelError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        e.to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair() -> (TcpChannel, TcpChannel) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_key = PublicKey::new([2; 64]);

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            TcpChannel::accept(stream, server_key).await.unwrap()
        });
        let stream = TcpStream::connect(addr).await.unwrap();
        let client = TcpChannel::connect(stream, PublicKey::new([1; 64]), server_key)
            .await
            .unwrap();
        (client, server.await.unwrap())
    }

    #[tokio::test]
    async fn test_identity_exchange() {
        let (client, server) = pair().await;

        assert_eq!(client.remote(), &PublicKey::new([2; 64]));
        assert_eq!(server.remote(), &PublicKey::new([1; 64]));
    }

    #[tokio::test]
    async fn test_plain_and_snappy_messages() {
        let (mut client, mut server) = pair().await;

        client.write_msg(0x10, b"status").await.unwrap();
        assert_eq!(server.read_msg().await.unwrap(), (0x10, b"status".to_vec()));

        client.set_snappy(true);
        server.set_snappy(true);
        let payload = vec![7u8; 4096];
        server.write_msg(0x11, &payload).await.unwrap();
        assert_eq!(client.read_msg().await.unwrap(), (0x11, payload));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_key = PublicKey::new([2; 64]);
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut id = [0u8; 64];
            stream.read_exact(&mut id).await.unwrap();
            stream.write_all(server_key.as_bytes()).await.unwrap();
            stream.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut client = TcpChannel::connect(stream, PublicKey::new([1; 64]), server_key)
            .await
            .unwrap();

        assert!(matches!(
            client.read_msg().await,
            Err(ChannelError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_wrong_identity_fails_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ = TcpChannel::accept(stream, PublicKey::new([9; 64])).await;
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let result = TcpChannel::connect(stream, PublicKey::new([1; 64]), PublicKey::new([2; 64])).await;

        assert!(matches!(result, Err(ChannelError::Handshake(_))));
    }

    #[tokio::test]
    async fn test_stalled_identity_exchange_hits_handshake_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            drop(stream);
        });
        let record = AddressRecord::new(1, PublicKey::new([2; 64]), addr.ip(), addr.port());
        let timeouts = ConnectTimeouts {
            dial: std::time::Duration::from_secs(10),
            handshake: std::time::Duration::from_millis(200),
        };

        let started = std::time::Instant::now();
        let result = TcpChannelFactory::new()
            .connect(&record, &SessionKey::generate(), timeouts)
            .await;

        assert!(matches!(result, Err(ChannelError::Timeout)));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        silent.abort();
    }

    #[tokio::test]
    async fn test_peer_hangup_reads_as_closed() {
        let (mut client, server) = pair().await;
        drop(server);

        assert!(matches!(client.read_msg().await, Err(ChannelError::Closed)));
    }
}
