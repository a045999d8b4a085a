//! In-process fake peers speaking the framed TCP protocol.

#![allow(dead_code)]

use std::net::SocketAddr;

use crawler_core::adapters::TcpChannel;
use crawler_core::protocol::{DisconnectReason, Hello, Message, Progress, Status};
use crawler_core::{AddressRecord, Capability, ChainIdentity, PublicKey, SecureChannel};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// How the fake peer answers a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerBehavior {
    /// Complete hello, status and progress
    Honest,
    /// Reject the hello with "too many peers"
    Full,
    /// Answer status with another genesis hash
    ForeignChain,
}

/// A listening fake peer.
pub struct FakePeer {
    pub record: AddressRecord,
    pub task: JoinHandle<()>,
}

pub const PEER_CLIENT: &str = "go-opera/v1.1.2-rc.6-825a85c9-1689192286/linux-amd64/go1.20.4";

/// Start a fake peer with identity bytes `byte`.
pub async fn spawn_peer(byte: u8, chain: ChainIdentity, behavior: PeerBehavior) -> FakePeer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let key = PublicKey::new([byte; 64]);
    let record = AddressRecord::new(1, key, addr.ip(), addr.port());

    let task = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let chain = chain.clone();
            tokio::spawn(async move {
                // Reachability probes connect and hang up before the exchange.
                let Ok(channel) = TcpChannel::accept(stream, key).await else {
                    return;
                };
                serve(channel, key, &chain, behavior).await;
            });
        }
    });

    FakePeer { record, task }
}

async fn serve(mut channel: TcpChannel, key: PublicKey, chain: &ChainIdentity, behavior: PeerBehavior) {
    let Some(Message::Hello(theirs)) = read(&mut channel).await else {
        return;
    };

    if behavior == PeerBehavior::Full {
        send(&mut channel, Message::Disconnect(DisconnectReason::TooManyPeers)).await;
        return;
    }

    let caps: Vec<Capability> = chain.capabilities();
    send(
        &mut channel,
        Message::Hello(Hello {
            version: 5,
            name: PEER_CLIENT.to_string(),
            capabilities: caps,
            listen_port: 5050,
            id: key,
        }),
    )
    .await;
    if theirs.version >= 5 {
        channel.set_snappy(true);
    }

    let Some(Message::Status(status)) = read(&mut channel).await else {
        return;
    };
    let genesis = match behavior {
        PeerBehavior::ForeignChain => [0x11; 32],
        _ => chain.genesis_hash,
    };
    send(
        &mut channel,
        Message::Status(Status {
            protocol_version: status.protocol_version,
            network_id: chain.network_id,
            genesis,
        }),
    )
    .await;

    let Some(Message::Progress(_)) = read(&mut channel).await else {
        return;
    };
    send(
        &mut channel,
        Message::Progress(Progress {
            epoch: 9,
            last_block: 900,
            checkpoint: [0x22; 32],
        }),
    )
    .await;

    // Wait for the crawler's disconnect.
    let _ = read(&mut channel).await;
}

async fn read(channel: &mut TcpChannel) -> Option<Message> {
    let (code, payload) = channel.read_msg().await.ok()?;
    Message::decode(code, &payload).ok()
}

async fn send(channel: &mut TcpChannel, msg: Message) {
    let _ = channel.write_msg(msg.code(), &msg.encode()).await;
}
