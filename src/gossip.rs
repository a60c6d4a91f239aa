//! Seen-packet store and per-peer sync bandwidth budget.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::packet::Packet;

const DEFAULT_SEEN_CAPACITY: usize = 1000;
const DEFAULT_MAX_SYNC_PACKETS_PER_REQUEST: usize = 20;
const DEFAULT_MAX_MESSAGE_AGE: Duration = Duration::from_secs(900);
const SYNC_WINDOW: Duration = Duration::from_secs(60);

struct SyncBudget {
    count: usize,
    window_start: Instant,
}

/// Stores shareable packets in insertion order and answers on-demand resend
/// requests within a sliding per-peer bandwidth budget.
pub struct GossipSyncManager {
    seen_packets: HashMap<String, (Packet, Instant)>,
    seen_order: VecDeque<String>,
    sync_budget_by_peer: HashMap<String, SyncBudget>,
    seen_capacity: usize,
    max_sync_packets_per_request: usize,
    max_message_age: Duration,
}

impl GossipSyncManager {
    pub fn new(
        seen_capacity: usize,
        max_sync_packets_per_request: usize,
        max_message_age: Duration,
    ) -> Self {
        Self {
            seen_packets: HashMap::new(),
            seen_order: VecDeque::new(),
            sync_budget_by_peer: HashMap::new(),
            seen_capacity,
            max_sync_packets_per_request,
            max_message_age,
        }
    }

    /// Stores `packet` unless its type is session-layer (handshake,
    /// noiseEncrypted, ack, ping, pong, gossipSync). Idempotent on repeated
    /// ids. Pops the oldest id once over `seenCapacity`.
    pub fn on_packet_seen(&mut self, packet: &Packet) {
        self.on_packet_seen_at(packet, Instant::now())
    }

    fn on_packet_seen_at(&mut self, packet: &Packet, now: Instant) {
        if packet.packet_type.is_session_layer() {
            return;
        }
        let id = packet.packet_id();
        if self.seen_packets.contains_key(&id) {
            return;
        }
        self.seen_packets.insert(id.clone(), (packet.clone(), now));
        self.seen_order.push_back(id);
        while self.seen_order.len() > self.seen_capacity {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen_packets.remove(&oldest);
            }
        }
    }

    /// Returns packets to unicast to `from_peer`, decrementing their TTL,
    /// skipping ids already in `peer_has_ids` or older than
    /// `maxMessageAge`, and stopping once the 60-second shared window
    /// budget is exhausted.
    pub fn handle_sync_request(
        &mut self,
        from_peer: &str,
        peer_has_ids: &std::collections::HashSet<String>,
    ) -> Vec<Packet> {
        self.handle_sync_request_at(from_peer, peer_has_ids, Instant::now())
    }

    fn handle_sync_request_at(
        &mut self,
        from_peer: &str,
        peer_has_ids: &std::collections::HashSet<String>,
        now: Instant,
    ) -> Vec<Packet> {
        let budget = self
            .sync_budget_by_peer
            .entry(from_peer.to_string())
            .or_insert(SyncBudget {
                count: 0,
                window_start: now,
            });
        if now.duration_since(budget.window_start) >= SYNC_WINDOW {
            budget.count = 0;
            budget.window_start = now;
        }

        let mut out = Vec::new();
        for id in self.seen_order.iter() {
            if budget.count >= self.max_sync_packets_per_request {
                break;
            }
            if peer_has_ids.contains(id) {
                continue;
            }
            let Some((packet, seen_at)) = self.seen_packets.get(id) else {
                continue;
            };
            if now.duration_since(*seen_at) > self.max_message_age {
                continue;
            }
            let mut relayed = packet.clone();
            relayed.ttl = relayed.ttl.saturating_sub(1);
            out.push(relayed);
            budget.count += 1;
        }
        out
    }

    /// Snapshot of stored packet ids; mutating the returned set has no
    /// effect on internal state.
    pub fn known_packet_ids(&self) -> std::collections::HashSet<String> {
        self.seen_packets.keys().cloned().collect()
    }

    /// Expires entries older than `maxMessageAge`.
    pub fn maintain(&mut self) {
        self.maintain_at(Instant::now())
    }

    fn maintain_at(&mut self, now: Instant) {
        let stale: Vec<String> = self
            .seen_packets
            .iter()
            .filter(|(_, (_, seen_at))| now.duration_since(*seen_at) > self.max_message_age)
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            self.seen_packets.remove(&id);
            self.seen_order.retain(|x| x != &id);
        }
    }

    pub fn reset(&mut self) {
        self.seen_packets.clear();
        self.seen_order.clear();
        self.sync_budget_by_peer.clear();
    }

    pub fn len(&self) -> usize {
        self.seen_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen_order.is_empty()
    }
}

impl Default for GossipSyncManager {
    fn default() -> Self {
        Self::new(
            DEFAULT_SEEN_CAPACITY,
            DEFAULT_MAX_SYNC_PACKETS_PER_REQUEST,
            DEFAULT_MAX_MESSAGE_AGE,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;
    use std::collections::HashSet;

    fn packet(source: u8, ts: i64, packet_type: PacketType) -> Packet {
        Packet {
            version: 1,
            packet_type,
            ttl: 5,
            flags: 0,
            timestamp: ts,
            source_id: [source; 32],
            dest_id: crate::peer::BROADCAST,
            payload: vec![],
            signature: None,
        }
    }

    #[test]
    fn session_layer_packets_are_rejected() {
        let mut g = GossipSyncManager::default();
        g.on_packet_seen(&packet(1, 1, PacketType::Handshake));
        g.on_packet_seen(&packet(1, 2, PacketType::Ack));
        assert!(g.is_empty());
    }

    #[test]
    fn application_packets_are_stored_idempotently() {
        let mut g = GossipSyncManager::default();
        let p = packet(1, 1, PacketType::Chat);
        g.on_packet_seen(&p);
        g.on_packet_seen(&p);
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn capacity_pops_oldest_first() {
        let mut g = GossipSyncManager::new(2, 20, DEFAULT_MAX_MESSAGE_AGE);
        g.on_packet_seen(&packet(1, 1, PacketType::Chat));
        g.on_packet_seen(&packet(2, 2, PacketType::Chat));
        g.on_packet_seen(&packet(3, 3, PacketType::Chat));
        assert_eq!(g.len(), 2);
        let ids = g.known_packet_ids();
        assert!(!ids.contains(&packet(1, 1, PacketType::Chat).packet_id()));
    }

    #[test]
    fn sync_request_skips_known_ids_and_decrements_ttl() {
        let mut g = GossipSyncManager::default();
        let p = packet(1, 1, PacketType::Chat);
        g.on_packet_seen(&p);
        let mut known = HashSet::new();
        known.insert(p.packet_id());
        let out = g.handle_sync_request("peer-a", &known);
        assert!(out.is_empty());

        let out2 = g.handle_sync_request("peer-a", &HashSet::new());
        assert_eq!(out2.len(), 1);
        assert_eq!(out2[0].ttl, p.ttl - 1);
    }

    #[test]
    fn sync_budget_is_shared_across_calls_in_window() {
        let mut g = GossipSyncManager::new(100, 2, DEFAULT_MAX_MESSAGE_AGE);
        for i in 0..5u8 {
            g.on_packet_seen(&packet(i, i as i64, PacketType::Chat));
        }
        let empty = HashSet::new();
        let first = g.handle_sync_request("peer-a", &empty);
        assert_eq!(first.len(), 2);
        let second = g.handle_sync_request("peer-a", &empty);
        assert!(second.is_empty(), "budget already exhausted within the window");
    }

    #[test]
    fn too_old_packets_are_skipped_on_sync() {
        let mut g = GossipSyncManager::new(100, 20, Duration::from_millis(10));
        let now = Instant::now();
        g.on_packet_seen_at(&packet(1, 1, PacketType::Chat), now);
        let later = now + Duration::from_millis(50);
        let out = g.handle_sync_request_at("peer-a", &HashSet::new(), later);
        assert!(out.is_empty());
    }

    #[test]
    fn maintain_expires_stale_entries() {
        let mut g = GossipSyncManager::new(100, 20, Duration::from_millis(10));
        let now = Instant::now();
        g.on_packet_seen_at(&packet(1, 1, PacketType::Chat), now);
        g.maintain_at(now + Duration::from_millis(50));
        assert!(g.is_empty());
    }

    #[test]
    fn known_packet_ids_snapshot_is_independent() {
        let mut g = GossipSyncManager::default();
        g.on_packet_seen(&packet(1, 1, PacketType::Chat));
        let mut snapshot = g.known_packet_ids();
        snapshot.clear();
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn reset_clears_everything() {
        let mut g = GossipSyncManager::default();
        g.on_packet_seen(&packet(1, 1, PacketType::Chat));
        g.handle_sync_request("peer-a", &HashSet::new());
        g.reset();
        assert!(g.is_empty());
    }
}
