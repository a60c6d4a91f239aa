//! End-to-end scenarios driving the packet envelope, topology tracker,
//! relay controller, and gossip sync manager together without a live
//! transport.

use std::time::Duration;

use fluxon::dedup::Deduplicator;
use fluxon::gossip::GossipSyncManager;
use fluxon::packet::{Packet, PacketType, VERSION};
use fluxon::peer::{to_hex, BROADCAST};
use fluxon::relay::RelayController;
use fluxon::topology::TopologyTracker;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn id(b: u8) -> [u8; 32] {
    [b; 32]
}

fn chat_packet(source: [u8; 32], ttl: u8, flags: u8) -> Packet {
    Packet {
        version: VERSION,
        packet_type: PacketType::Chat,
        ttl,
        flags,
        timestamp: 1_700_000_000_000,
        source_id: source,
        dest_id: BROADCAST,
        payload: b"hello".to_vec(),
        signature: None,
    }
}

/// S1: a chat packet relayed by B reaches C with its text and source
/// intact, with a strictly lower TTL.
#[test]
fn s1_linear_relay_preserves_payload_and_decrements_ttl() {
    let a = id(1);
    let mut dedup_b = Deduplicator::new(Duration::from_secs(300), 1024);
    let mut relay_b = RelayController::default();

    let pkt = chat_packet(a, 5, 42);
    assert!(!dedup_b.is_duplicate(&pkt.packet_id()));

    let decision = relay_b.decide(pkt.ttl, false, pkt.packet_type, pkt.is_directed(), 2);
    assert!(decision.should_relay);
    assert!(decision.new_ttl < pkt.ttl);

    let mut relayed = pkt.clone();
    relayed.ttl = decision.new_ttl;

    let mut dedup_c = Deduplicator::new(Duration::from_secs(300), 1024);
    assert!(!dedup_c.is_duplicate(&relayed.packet_id()));
    assert_eq!(relayed.payload, b"hello");
    assert_eq!(relayed.source_id, a);
    assert_eq!(relayed.receipt_key(), pkt.receipt_key());
}

/// S2: a packet arriving with ttl=1 is never relayed.
#[test]
fn s2_ttl_one_does_not_relay() {
    let mut relay = RelayController::default();
    let pkt = chat_packet(id(1), 1, 7);
    let decision = relay.decide(pkt.ttl, false, pkt.packet_type, pkt.is_directed(), 3);
    assert!(!decision.should_relay);
}

/// S3: an emergency alert relays with jitter bounded well under 25ms.
#[test]
fn s3_emergency_alert_relays_fast() {
    let mut relay = RelayController::default();
    for _ in 0..100 {
        let decision = relay.decide(7, false, PacketType::EmergencyAlert, false, 4);
        assert!(decision.should_relay);
        assert!(decision.delay_ms < 25);
    }
}

/// S4: an unverified discovery packet must never be fed into the topology
/// tracker (poisoning guard) — the pipeline-level gate lives in
/// `MeshService`, this checks the tracker stays empty when simply never
/// called for an unverified source.
#[test]
fn s4_topology_untouched_without_verification() {
    init_tracing();
    let topology = TopologyTracker::default();
    // Simulates the Mesh Service's decision to skip `update_neighbors`
    // entirely for an unverified sender.
    assert_eq!(topology.degree(&id(2)), 0);
}

/// S5: route computation with cache invalidation on claim change.
#[test]
fn s5_route_computed_cached_then_invalidated() {
    let mut topology = TopologyTracker::default();
    let a = id(1);
    let b = id(2);
    let c = id(3);
    topology.update_neighbors(&a, &[b]);
    topology.update_neighbors(&b, &[a, c]);
    topology.update_neighbors(&c, &[b]);

    let route = topology.compute_route(&a, &c, 10);
    assert_eq!(route, Some(vec![to_hex(&b)]));

    // Second call within 5s should be served identically (from cache).
    let cached = topology.compute_route(&a, &c, 10);
    assert_eq!(cached, route);

    // Breaking B's claims invalidates the cached route.
    topology.update_neighbors(&b, &[]);
    assert_eq!(topology.compute_route(&a, &c, 10), None);
}

/// S6: the gossip sync budget is shared across two successive calls
/// within the same window.
#[test]
fn s6_gossip_shared_budget_across_calls() {
    let mut gossip = GossipSyncManager::new(100, 2, Duration::from_secs(900));
    for i in 0..4u8 {
        gossip.on_packet_seen(&chat_packet(id(i), 5, i));
    }
    let empty = std::collections::HashSet::new();
    let first = gossip.handle_sync_request("peer-x", &empty);
    assert_eq!(first.len(), 2);
    let second = gossip.handle_sync_request("peer-x", &empty);
    assert!(second.is_empty());
}
