//! Tests for the handshake state machine

use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::ports::ConnectTimeouts;
use crate::domain::{Capability, ChainIdentity, PublicKey};
use crate::protocol::{codes, DisconnectReason, Hello, Message, Progress, Status};
use crate::test_utils::{make_record, PeerReply, ScriptedChannelFactory};

fn chain() -> ChainIdentity {
    ChainIdentity::for_testing()
}

fn peer_hello(version: u64, caps: Vec<Capability>) -> PeerReply {
    PeerReply::Send(Message::Hello(Hello {
        version,
        name: "go-opera/v1.1.2-rc.6/linux-amd64/go1.19.3".into(),
        capabilities: caps,
        listen_port: 5050,
        id: PublicKey::new([0x42; 64]),
    }))
}

fn peer_status(protocol_version: u32, network_id: u64, genesis: [u8; 32]) -> PeerReply {
    PeerReply::Send(Message::Status(Status {
        protocol_version,
        network_id,
        genesis,
    }))
}

fn peer_progress() -> PeerReply {
    PeerReply::Send(Message::Progress(Progress {
        epoch: 7,
        last_block: 700,
        checkpoint: [1; 32],
    }))
}

fn opera_caps() -> Vec<Capability> {
    vec![Capability::new("opera", 62), Capability::new("opera", 63)]
}

// =============================================================================
// TEST HELPERS
// =============================================================================

fn setup_client(script: Vec<PeerReply>) -> (HandshakeClient, Arc<ScriptedChannelFactory>) {
    let factory = Arc::new(ScriptedChannelFactory::new(script));
    let client = HandshakeClient::new(
        Arc::new(chain()),
        factory.clone(),
        HandshakeConfig::for_testing(),
    );
    (client, factory)
}

fn full_script() -> Vec<PeerReply> {
    let c = chain();
    vec![
        peer_hello(5, opera_caps()),
        peer_status(63, c.network_id, c.genesis_hash),
        peer_progress(),
    ]
}

// =============================================================================
// TEST GROUP 1: Successful Handshakes
// =============================================================================

#[tokio::test]
async fn test_full_handshake_collects_info() {
    let (client, factory) = setup_client(full_script());

    let info = client.get_client_info(&make_record(1, 1)).await.unwrap();

    assert_eq!(info.client_type, "go-opera/v1.1.2-rc.6/linux-amd64/go1.19.3");
    assert_eq!(info.software_version, 5);
    assert_eq!(info.capabilities, opera_caps());
    assert_eq!(info.network_id, chain().network_id);

    let log = factory.log();
    assert!(log.snappy);
    assert!(log.closed);
    assert_eq!(
        log.written_codes(),
        vec![codes::HELLO, codes::STATUS, codes::PROGRESS, codes::DISCONNECT]
    );
}

#[tokio::test]
async fn test_hello_advertises_chain_capabilities_and_session_key() {
    let (client, factory) = setup_client(full_script());
    client.get_client_info(&make_record(1, 1)).await.unwrap();

    let written = factory.log().written_messages();
    let Some(Message::Hello(hello)) = written.first() else {
        panic!("first message must be hello, got {written:?}");
    };
    assert_eq!(hello.version, 5);
    assert_eq!(hello.capabilities, chain().capabilities());
    assert_eq!(hello.id, factory.session_ids()[0]);
}

#[tokio::test]
async fn test_status_carries_negotiated_version() {
    let (client, factory) = setup_client(full_script());
    client.get_client_info(&make_record(1, 1)).await.unwrap();

    let status = factory
        .log()
        .written_messages()
        .into_iter()
        .find_map(|m| match m {
            Message::Status(s) => Some(s),
            _ => None,
        })
        .unwrap();
    assert_eq!(status.protocol_version, 63);
    assert_eq!(status.genesis, chain().genesis_hash);
}

#[tokio::test]
async fn test_no_mutual_protocol_returns_capabilities_only() {
    let (client, factory) = setup_client(vec![peer_hello(5, vec![Capability::new("eth", 66)])]);

    let info = client.get_client_info(&make_record(1, 1)).await.unwrap();

    assert_eq!(info.capabilities, vec![Capability::new("eth", 66)]);
    assert_eq!(info.network_id, 0);
    assert_eq!(factory.log().written_codes(), vec![codes::HELLO, codes::DISCONNECT]);
}

#[tokio::test]
async fn test_old_peer_does_not_enable_snappy() {
    let c = chain();
    let (client, factory) = setup_client(vec![
        peer_hello(4, opera_caps()),
        peer_status(63, c.network_id, c.genesis_hash),
        peer_progress(),
    ]);

    client.get_client_info(&make_record(1, 1)).await.unwrap();

    assert!(!factory.log().snappy);
}

#[tokio::test]
async fn test_ping_is_answered_during_exchange() {
    let c = chain();
    let (client, factory) = setup_client(vec![
        PeerReply::Send(Message::Ping),
        peer_hello(5, opera_caps()),
        peer_status(63, c.network_id, c.genesis_hash),
        peer_progress(),
    ]);

    client.get_client_info(&make_record(1, 1)).await.unwrap();

    assert_eq!(factory.log().written_codes()[..2], [codes::HELLO, codes::PONG]);
}

#[tokio::test]
async fn test_each_dial_uses_fresh_key() {
    let (client, factory) = setup_client(full_script());

    client.get_client_info(&make_record(1, 1)).await.unwrap();
    client.get_client_info(&make_record(1, 1)).await.unwrap();

    let ids = factory.session_ids();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

// =============================================================================
// TEST GROUP 2: Failures
// =============================================================================

#[tokio::test]
async fn test_too_many_peers_disconnect() {
    let (client, factory) = setup_client(vec![PeerReply::Send(Message::Disconnect(
        DisconnectReason::TooManyPeers,
    ))]);

    let err = client.get_client_info(&make_record(1, 1)).await.unwrap_err();

    assert!(err.is_too_many_peers());
    assert_eq!(err.step(), Some(HandshakeStep::Hello));
    assert!(err.to_string().contains("too many peers"));
    assert!(factory.log().closed);
}

#[tokio::test]
async fn test_unexpected_message_at_hello() {
    let c = chain();
    let (client, _) = setup_client(vec![peer_status(63, c.network_id, c.genesis_hash)]);

    let err = client.get_client_info(&make_record(1, 1)).await.unwrap_err();

    assert!(matches!(
        err,
        HandshakeError::UnexpectedMessage {
            step: HandshakeStep::Hello,
            code: codes::STATUS
        }
    ));
}

#[tokio::test]
async fn test_genesis_mismatch() {
    let c = chain();
    let (client, factory) = setup_client(vec![
        peer_hello(5, opera_caps()),
        peer_status(63, c.network_id, [0; 32]),
    ]);

    let err = client.get_client_info(&make_record(1, 1)).await.unwrap_err();

    assert!(matches!(err, HandshakeError::GenesisMismatch { .. }));
    assert!(err.is_chain_mismatch());
    assert_eq!(factory.log().written_codes().last(), Some(&codes::DISCONNECT));
}

#[tokio::test]
async fn test_genesis_checked_before_network() {
    let (client, _) = setup_client(vec![peer_hello(5, opera_caps()), peer_status(62, 1, [0; 32])]);

    let err = client.get_client_info(&make_record(1, 1)).await.unwrap_err();

    assert!(matches!(err, HandshakeError::GenesisMismatch { .. }));
}

#[tokio::test]
async fn test_network_mismatch() {
    let c = chain();
    let (client, _) = setup_client(vec![
        peer_hello(5, opera_caps()),
        peer_status(63, 4002, c.genesis_hash),
    ]);

    let err = client.get_client_info(&make_record(1, 1)).await.unwrap_err();

    assert!(matches!(
        err,
        HandshakeError::NetworkMismatch {
            got: 4002,
            expected: 250
        }
    ));
}

#[tokio::test]
async fn test_version_mismatch() {
    let c = chain();
    let (client, _) = setup_client(vec![
        peer_hello(5, opera_caps()),
        peer_status(62, c.network_id, c.genesis_hash),
    ]);

    let err = client.get_client_info(&make_record(1, 1)).await.unwrap_err();

    assert!(matches!(
        err,
        HandshakeError::VersionMismatch {
            got: 62,
            expected: 63
        }
    ));
}

#[tokio::test]
async fn test_malformed_progress_fails() {
    let c = chain();
    let (client, _) = setup_client(vec![
        peer_hello(5, opera_caps()),
        peer_status(63, c.network_id, c.genesis_hash),
        PeerReply::Raw {
            code: codes::PROGRESS,
            payload: vec![0xc1, 0x01],
        },
    ]);

    let err = client.get_client_info(&make_record(1, 1)).await.unwrap_err();

    assert!(matches!(
        err,
        HandshakeError::Malformed {
            step: HandshakeStep::Progress,
            ..
        }
    ));
}

#[tokio::test]
async fn test_stalled_peer_times_out() {
    let (client, factory) = setup_client(vec![PeerReply::Stall]);

    let err = client.get_client_info(&make_record(1, 1)).await.unwrap_err();

    assert!(matches!(
        err,
        HandshakeError::Timeout {
            step: HandshakeStep::Hello
        }
    ));
    assert!(factory.log().closed);
}

#[tokio::test]
async fn test_refused_dial() {
    let factory = Arc::new(ScriptedChannelFactory::refusing());
    let client = HandshakeClient::new(
        Arc::new(chain()),
        factory.clone(),
        HandshakeConfig::for_testing(),
    );

    let err = client.get_client_info(&make_record(1, 1)).await.unwrap_err();

    assert!(matches!(
        err,
        HandshakeError::Channel {
            step: HandshakeStep::Dial,
            ..
        }
    ));
    assert_eq!(factory.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dial_and_encryption_have_separate_deadlines() {
    let factory = Arc::new(ScriptedChannelFactory::stalling_handshake());
    let config = HandshakeConfig {
        dial_timeout: Duration::from_secs(10),
        handshake_timeout: Duration::from_secs(15),
        ..HandshakeConfig::for_testing()
    };
    let client = HandshakeClient::new(Arc::new(chain()), factory.clone(), config);

    let started = tokio::time::Instant::now();
    let err = client.get_client_info(&make_record(1, 1)).await.unwrap_err();

    assert!(matches!(
        err,
        HandshakeError::Timeout {
            step: HandshakeStep::Dial
        }
    ));
    assert_eq!(started.elapsed(), Duration::from_secs(15));
    assert_eq!(
        factory.last_timeouts(),
        Some(ConnectTimeouts {
            dial: Duration::from_secs(10),
            handshake: Duration::from_secs(15),
        })
    );
}

#[tokio::test]
async fn test_peer_closing_mid_handshake() {
    let (client, _) = setup_client(vec![peer_hello(5, opera_caps())]);

    let err = client.get_client_info(&make_record(1, 1)).await.unwrap_err();

    assert!(matches!(
        err,
        HandshakeError::Channel {
            step: HandshakeStep::Status,
            source: crate::ports::ChannelError::Closed
        }
    ));
}

#[tokio::test]
async fn test_fixed_identity_is_reused() {
    let key = crate::protocol::SessionKey::generate();
    let factory = Arc::new(ScriptedChannelFactory::new(full_script()));
    let client = HandshakeClient::new(
        Arc::new(chain()),
        factory.clone(),
        HandshakeConfig::for_testing(),
    )
    .with_identity(key.clone());

    client.get_client_info(&make_record(1, 1)).await.unwrap();
    client.get_client_info(&make_record(2, 1)).await.unwrap();

    assert_eq!(factory.session_ids(), vec![key.public_key(), key.public_key()]);
}
