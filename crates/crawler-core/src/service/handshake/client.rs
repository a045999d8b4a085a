//! Handshake state machine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::debug;

use super::config::HandshakeConfig;
use super::error::{HandshakeError, HandshakeStep};
use crate::domain::{AddressRecord, ChainIdentity, ClientInfo};
use crate::ports::{ChannelError, ChannelFactory, ConnectTimeouts, InfoFetcher, SecureChannel};
use crate::protocol::{
    codes, negotiate, DisconnectReason, Hello, Message, Progress, SessionKey, Status,
    BASE_PROTOCOL_VERSION, SNAPPY_PROTOCOL_VERSION,
};

/// Extracts client metadata from peers over a secure channel.
///
/// The chain identity is immutable and shared. Unless a fixed identity is
/// configured, a fresh session key is generated for every dial.
pub struct HandshakeClient {
    chain: Arc<ChainIdentity>,
    factory: Arc<dyn ChannelFactory>,
    config: HandshakeConfig,
    identity: Option<SessionKey>,
}

impl HandshakeClient {
    /// Create a client presenting `chain` and dialing through `factory`.
    pub fn new(
        chain: Arc<ChainIdentity>,
        factory: Arc<dyn ChannelFactory>,
        config: HandshakeConfig,
    ) -> Self {
        Self {
            chain,
            factory,
            config,
            identity: None,
        }
    }

    /// Present `key` on every dial instead of a random one.
    pub fn with_identity(mut self, key: SessionKey) -> Self {
        self.identity = Some(key);
        self
    }

    /// Chain identity presented to peers
    pub fn chain(&self) -> &ChainIdentity {
        &self.chain
    }

    /// Run the full handshake against `record`.
    ///
    /// A peer without a mutual application protocol still yields `Ok`, with
    /// only the hello fields filled in. The channel is always closed with a
    /// best-effort "client quitting" notification.
    pub async fn get_client_info(&self, record: &AddressRecord) -> Result<ClientInfo, HandshakeError> {
        let key = match &self.identity {
            Some(key) => key.clone(),
            None => SessionKey::generate(),
        };
        let timeouts = ConnectTimeouts {
            dial: self.config.dial_timeout,
            handshake: self.config.handshake_timeout,
        };
        let backstop = timeouts.dial + timeouts.handshake;

        let mut channel = match timeout(backstop, self.factory.connect(record, &key, timeouts)).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(ChannelError::Timeout)) | Err(_) => {
                return Err(HandshakeError::Timeout {
                    step: HandshakeStep::Dial,
                })
            }
            Ok(Err(source)) => {
                return Err(HandshakeError::Channel {
                    step: HandshakeStep::Dial,
                    source,
                })
            }
        };

        let result = self.exchange_all(channel.as_mut(), &key).await;
        self.disconnect(channel.as_mut()).await;
        result
    }

    async fn exchange_all(
        &self,
        channel: &mut dyn SecureChannel,
        key: &SessionKey,
    ) -> Result<ClientInfo, HandshakeError> {
        let mut info = ClientInfo::default();

        let Some(version) = self.hello(channel, key, &mut info).await? else {
            debug!(client = %info.client_type, "No mutual application protocol");
            return Ok(info);
        };

        self.status(channel, version, &mut info).await?;
        self.progress(channel).await?;
        Ok(info)
    }

    /// Hello step; returns the negotiated application protocol version.
    async fn hello(
        &self,
        channel: &mut dyn SecureChannel,
        key: &SessionKey,
        info: &mut ClientInfo,
    ) -> Result<Option<u32>, HandshakeError> {
        let step = HandshakeStep::Hello;
        let ours = Message::Hello(Hello {
            version: BASE_PROTOCOL_VERSION,
            name: self.config.client_name.clone(),
            capabilities: self.chain.capabilities(),
            listen_port: u64::from(self.config.listen_port),
            id: key.public_key(),
        });

        match self
            .round_trip(channel, step, self.config.handshake_timeout, &ours)
            .await?
        {
            Message::Hello(peer) => {
                if peer.version >= SNAPPY_PROTOCOL_VERSION {
                    channel.set_snappy(true);
                }
                info.client_type = peer.name;
                info.software_version = peer.version;
                info.capabilities = peer.capabilities;

                Ok(negotiate(
                    &self.chain.capabilities(),
                    &info.capabilities,
                    &self.chain.protocol_name,
                ))
            }
            other => Err(Self::unexpected(step, other)),
        }
    }

    /// Status step: genesis, then network id, then protocol version must match.
    async fn status(
        &self,
        channel: &mut dyn SecureChannel,
        version: u32,
        info: &mut ClientInfo,
    ) -> Result<(), HandshakeError> {
        let step = HandshakeStep::Status;
        let ours = Message::Status(Status {
            protocol_version: version,
            network_id: self.chain.network_id,
            genesis: self.chain.genesis_hash,
        });

        match self
            .round_trip(channel, step, self.config.status_timeout, &ours)
            .await?
        {
            Message::Status(peer) => {
                if peer.genesis != self.chain.genesis_hash {
                    return Err(HandshakeError::GenesisMismatch {
                        got: peer.genesis,
                        expected: self.chain.genesis_hash,
                    });
                }
                if peer.network_id != self.chain.network_id {
                    return Err(HandshakeError::NetworkMismatch {
                        got: peer.network_id,
                        expected: self.chain.network_id,
                    });
                }
                if peer.protocol_version != version {
                    return Err(HandshakeError::VersionMismatch {
                        got: peer.protocol_version,
                        expected: version,
                    });
                }
                info.network_id = peer.network_id;
                Ok(())
            }
            other => Err(Self::unexpected(step, other)),
        }
    }

    /// Progress step. The peer's progress is decoded but not interpreted.
    async fn progress(&self, channel: &mut dyn SecureChannel) -> Result<(), HandshakeError> {
        let step = HandshakeStep::Progress;
        let progress = self.chain.progress;
        let ours = Message::Progress(Progress {
            epoch: progress.epoch,
            last_block: progress.last_block,
            checkpoint: progress.checkpoint,
        });

        match self
            .round_trip(channel, step, self.config.status_timeout, &ours)
            .await?
        {
            Message::Progress(_) => Ok(()),
            other => Err(Self::unexpected(step, other)),
        }
    }

    /// Send `msg` and read the reply within `deadline`, answering pings.
    async fn round_trip(
        &self,
        channel: &mut dyn SecureChannel,
        step: HandshakeStep,
        deadline: Duration,
        msg: &Message,
    ) -> Result<Message, HandshakeError> {
        let exchange = async {
            channel
                .write_msg(msg.code(), &msg.encode())
                .await
                .map_err(|source| HandshakeError::Channel { step, source })?;

            loop {
                let (code, payload) = channel
                    .read_msg()
                    .await
                    .map_err(|source| HandshakeError::Channel { step, source })?;
                let reply = Message::decode(code, &payload)
                    .map_err(|source| HandshakeError::Malformed { step, source })?;

                if reply == Message::Ping {
                    let pong = Message::Pong;
                    channel
                        .write_msg(pong.code(), &pong.encode())
                        .await
                        .map_err(|source| HandshakeError::Channel { step, source })?;
                    continue;
                }
                return Ok(reply);
            }
        };

        timeout(deadline, exchange)
            .await
            .map_err(|_| HandshakeError::Timeout { step })?
    }

    fn unexpected(step: HandshakeStep, msg: Message) -> HandshakeError {
        match msg {
            Message::Disconnect(reason) => HandshakeError::Disconnected { step, reason },
            other => HandshakeError::UnexpectedMessage {
                step,
                code: other.code(),
            },
        }
    }

    async fn disconnect(&self, channel: &mut dyn SecureChannel) {
        let quit = Message::Disconnect(DisconnectReason::ClientQuitting);
        let _ = timeout(
            self.config.close_timeout,
            channel.write_msg(codes::DISCONNECT, &quit.encode()),
        )
        .await;
        channel.close().await;
    }
}

#[async_trait]
impl InfoFetcher for HandshakeClient {
    async fn fetch_client_info(&self, record: &AddressRecord) -> Result<ClientInfo, HandshakeError> {
        self.get_client_info(record).await
    }
}
