//! Tunables for the mesh core.
//!
//! The Mesh Service has no CLI, no environment variables, and no persisted
//! state — operators configure it purely by constructor argument.
//! `Serialize` / `Deserialize` are still derived so a host application can
//! log or snapshot the config it built, even though Fluxon itself never
//! loads one from a file.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the mesh core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Hard ceiling for all packets.
    pub max_ttl: u8,
    /// Degree at or above which the relay controller treats the network as dense.
    pub high_degree_threshold: usize,
    /// Mesh-layer dedup window.
    pub dedup_max_age: Duration,
    /// Mesh-layer dedup capacity.
    pub dedup_max_count: usize,
    /// Gossip seen-packet store size.
    pub seen_capacity: usize,
    /// Gossip resend eligibility age.
    pub max_message_age: Duration,
    /// Per-peer sync budget per sliding window.
    pub max_sync_packets_per_request: usize,
    /// Gossip/topology maintenance timer period.
    pub maintenance_interval: Duration,
    /// Topology announce timer period.
    pub topology_announce_interval: Duration,
    /// BFS staleness cut-off for a node's claims.
    pub route_freshness_threshold: Duration,
    /// Cached route validity window.
    pub route_cache_ttl: Duration,
    /// Route cache capacity.
    pub max_route_cache_entries: usize,
    /// Signing-key LRU capacity.
    pub max_peer_signing_keys: usize,
    /// Handshake rate-limit LRU capacity (distinct source ids tracked).
    pub max_handshake_rate_sources: usize,
    /// Handshake rate limit per source per window.
    pub max_handshakes_per_window: u32,
    /// Window used by both the handshake and the sync-response rate limiters.
    pub rate_limit_window: Duration,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            max_ttl: 7,
            high_degree_threshold: 6,
            dedup_max_age: Duration::from_secs(300),
            dedup_max_count: 1024,
            seen_capacity: 1000,
            max_message_age: Duration::from_secs(900),
            max_sync_packets_per_request: 20,
            maintenance_interval: Duration::from_secs(60),
            topology_announce_interval: Duration::from_secs(45),
            route_freshness_threshold: Duration::from_secs(60),
            route_cache_ttl: Duration::from_secs(5),
            max_route_cache_entries: 500,
            max_peer_signing_keys: 500,
            max_handshake_rate_sources: 200,
            max_handshakes_per_window: 3,
            rate_limit_window: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stable() {
        let cfg = MeshConfig::default();
        assert_eq!(cfg.max_ttl, 7);
        assert_eq!(cfg.high_degree_threshold, 6);
        assert_eq!(cfg.dedup_max_count, 1024);
        assert_eq!(cfg.seen_capacity, 1000);
        assert_eq!(cfg.max_sync_packets_per_request, 20);
        assert_eq!(cfg.max_peer_signing_keys, 500);
        assert_eq!(cfg.max_handshakes_per_window, 3);
    }
}
