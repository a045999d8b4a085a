//! Tests for the discovery round engine

use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::domain::{NodeRecord, NodeSet, Timestamp};
use crate::ports::{DiscoverySource, NodeIterator, RecordResolver};
use crate::test_utils::{
    make_record, EndlessIterator, FixedTimeSource, MockHandshake, MockInfoFetcher, StaticResolver,
};

const NOW: u64 = 10_000;

fn seeded_node(byte: u8, score: i64) -> NodeRecord {
    let mut node = NodeRecord::new(make_record(byte, 1));
    node.score = score;
    node.last_check = Some(Timestamp::new(NOW - 3600));
    node.first_response = Some(Timestamp::new(NOW - 7200));
    node.last_response = Some(Timestamp::new(NOW - 3600));
    node
}

fn source(iterator: impl NodeIterator + 'static, resolver: Arc<dyn RecordResolver>) -> DiscoverySource {
    DiscoverySource::new(Box::new(iterator), resolver)
}

fn empty_source(resolver: Arc<dyn RecordResolver>) -> DiscoverySource {
    source(StaticNodeIterator::new("discv4", Vec::new()), resolver)
}

// =============================================================================
// TEST HELPERS
// =============================================================================

fn setup_engine(config: RoundConfig, fetcher: Arc<MockInfoFetcher>) -> RoundEngine {
    RoundEngine::new(config, fetcher, Arc::new(FixedTimeSource::new(NOW)))
}

// =============================================================================
// TEST GROUP 1: Termination
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_round_ends_when_iterators_drain_without_timeout() {
    let fetcher = Arc::new(MockInfoFetcher::new(Duration::from_millis(50)));
    let engine = setup_engine(RoundConfig::for_testing(), fetcher.clone());
    let input: NodeSet = [seeded_node(1, 3), seeded_node(2, 5)].into_iter().collect();
    let resolver: Arc<dyn RecordResolver> = Arc::new(StaticResolver::new());

    let output = engine
        .run(input, vec![empty_source(resolver.clone()), empty_source(resolver)])
        .await
        .unwrap();

    assert_eq!(output.len(), 2);
    let node = output.get(&make_record(1, 0).id()).unwrap();
    assert_eq!(node.score, 3 + 1 + 10);
    assert_eq!(node.last_check, Some(Timestamp::new(NOW)));
    assert!(node.client_info.is_some());
    assert_eq!(fetcher.calls().len(), 2);
}

#[tokio::test]
async fn test_round_requires_a_discovery_source() {
    let engine = setup_engine(
        RoundConfig::for_testing(),
        Arc::new(MockInfoFetcher::new(Duration::ZERO)),
    );

    let result = engine.run(NodeSet::new(), Vec::new()).await;

    assert!(matches!(result, Err(RoundError::NoDiscoverySources)));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_stops_endless_iterator() {
    let config = RoundConfig {
        timeout: Duration::from_secs(30),
        ..RoundConfig::for_testing()
    };
    let fetcher = Arc::new(MockInfoFetcher::new(Duration::from_millis(10)));
    let engine = setup_engine(config, fetcher.clone());
    let resolver: Arc<dyn RecordResolver> = Arc::new(StaticResolver::new());
    let endless = EndlessIterator::new("discv5", vec![make_record(7, 2), make_record(8, 2)]);

    let output = engine
        .run(NodeSet::new(), vec![source(endless, resolver)])
        .await
        .unwrap();

    assert_eq!(output.len(), 2);
    assert_eq!(output.get(&make_record(7, 0).id()).unwrap().score, 11);
}

#[tokio::test(start_paused = true)]
async fn test_running_handshakes_finish_before_round_returns() {
    let config = RoundConfig {
        timeout: Duration::from_secs(1),
        ..RoundConfig::for_testing()
    };
    let fetcher = Arc::new(MockInfoFetcher::new(Duration::from_secs(20)));
    let engine = setup_engine(config, fetcher.clone());
    let resolver: Arc<dyn RecordResolver> = Arc::new(StaticResolver::new());
    let endless = EndlessIterator::new("discv4", vec![make_record(3, 1)]);

    let output = engine
        .run(NodeSet::new(), vec![source(endless, resolver)])
        .await
        .unwrap();

    let node = output.get(&make_record(3, 0).id()).unwrap();
    assert!(node.client_info.is_some());
}

// =============================================================================
// TEST GROUP 2: Scoring Through the Round
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_unresolvable_new_node_is_never_handshaked() {
    let fetcher = Arc::new(MockInfoFetcher::new(Duration::ZERO));
    let engine = setup_engine(RoundConfig::for_testing(), fetcher.clone());
    let stranger = make_record(9, 0);
    let resolver: Arc<dyn RecordResolver> = Arc::new(StaticResolver::new().with_failure(stranger.id()));

    let output = engine
        .run(
            NodeSet::new(),
            vec![source(StaticNodeIterator::new("discv4", vec![stranger]), resolver)],
        )
        .await
        .unwrap();

    assert!(output.is_empty());
    assert!(fetcher.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_seed_uses_primary_resolver_and_evicts() {
    let fetcher = Arc::new(MockInfoFetcher::new(Duration::ZERO));
    let engine = setup_engine(RoundConfig::for_testing(), fetcher.clone());
    let weak = seeded_node(4, 1);
    let primary = Arc::new(StaticResolver::new().with_failure(weak.id()));
    let secondary = Arc::new(StaticResolver::new());
    let input: NodeSet = [weak.clone()].into_iter().collect();

    let output = engine
        .run(input, vec![empty_source(primary.clone()), empty_source(secondary.clone())])
        .await
        .unwrap();

    assert!(output.get(&weak.id()).is_none());
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_too_many_peers_flag_is_recorded() {
    let full = make_record(5, 1);
    let fetcher = Arc::new(
        MockInfoFetcher::new(Duration::ZERO).with_result(full.id(), MockHandshake::TooManyPeers),
    );
    let engine = setup_engine(RoundConfig::for_testing(), fetcher.clone());
    let resolver: Arc<dyn RecordResolver> = Arc::new(StaticResolver::new());

    let output = engine
        .run(
            NodeSet::new(),
            vec![source(StaticNodeIterator::new("discv4", vec![full.clone()]), resolver)],
        )
        .await
        .unwrap();

    let node = output.get(&full.id()).unwrap();
    assert!(node.too_many_peers);
    assert_eq!(node.score, 1);
    assert!(node.client_info.is_none());
}

// =============================================================================
// TEST GROUP 3: Concurrency
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_no_duplicate_concurrent_handshakes() {
    let busy = make_record(6, 1);
    let fetcher = Arc::new(
        MockInfoFetcher::new(Duration::from_millis(100))
            .with_result(busy.id(), MockHandshake::TooManyPeers),
    );
    let engine = setup_engine(RoundConfig::for_testing(), fetcher.clone());
    let resolver: Arc<dyn RecordResolver> = Arc::new(StaticResolver::new());

    let sources = (0..3)
        .map(|i| {
            source(
                StaticNodeIterator::new(format!("variant-{i}"), vec![busy.clone(); 20]),
                resolver.clone(),
            )
        })
        .collect();

    let output = engine.run(NodeSet::new(), sources).await.unwrap();

    assert_eq!(fetcher.max_concurrent_per_node(), 1);
    assert!(!fetcher.calls().is_empty());
    assert!(output.get(&busy.id()).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_recent_sightings_are_gated_within_round() {
    let node = make_record(2, 1);
    let fetcher = Arc::new(MockInfoFetcher::new(Duration::ZERO));
    let engine = setup_engine(RoundConfig::for_testing(), fetcher.clone());
    let resolver = Arc::new(StaticResolver::new());

    let output = engine
        .run(
            NodeSet::new(),
            vec![source(
                StaticNodeIterator::new("discv4", vec![node.clone(); 10]),
                resolver.clone(),
            )],
        )
        .await
        .unwrap();

    assert_eq!(resolver.calls(), 1);
    assert_eq!(fetcher.calls().len(), 1);
    assert_eq!(output.get(&node.id()).unwrap().score, 11);
}

#[tokio::test(start_paused = true)]
async fn test_queued_handshakes_are_drained_when_round_closes() {
    let config = RoundConfig {
        workers: 2,
        timeout: Duration::ZERO,
        ..RoundConfig::for_testing()
    };
    let fetcher = Arc::new(MockInfoFetcher::new(Duration::from_millis(100)));
    let engine = setup_engine(config, fetcher.clone());
    let resolver: Arc<dyn RecordResolver> = Arc::new(StaticResolver::new());
    let records: Vec<_> = (10..20).map(|byte| make_record(byte, 1)).collect();

    let output = engine
        .run(
            NodeSet::new(),
            vec![source(StaticNodeIterator::new("discv4", records.clone()), resolver)],
        )
        .await
        .unwrap();

    assert_eq!(output.len(), 10);
    assert_eq!(fetcher.calls().len(), 10);
    for record in &records {
        let node = output.get(&record.id()).unwrap();
        assert!(node.client_info.is_some());
        assert_eq!(node.score, 11);
    }
}
