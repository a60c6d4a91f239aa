//! Pipeline orchestrator: owns the Deduplicator, Topology Tracker, and
//! Gossip Sync Manager; drives the inbound packet pipeline, periodic
//! announcers, and the service lifecycle.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use ed25519_dalek::{Signature, VerifyingKey};
use lru::LruCache;
use rand::Rng;
use tokio::sync::broadcast;
use tokio::time::Instant as TokioInstant;

use crate::config::MeshConfig;
use crate::dedup::Deduplicator;
use crate::error::Result;
use crate::gossip::GossipSyncManager;
use crate::identity::SigningService;
use crate::packet::{decode_discovery_payload, encode_discovery_payload, Packet, PacketType, MAX_TTL, VERSION};
use crate::peer::{to_hex, PeerId};
use crate::relay::RelayController;
use crate::topology::TopologyTracker;
use crate::transport::{PeerConnection, Transport};

struct RateWindow {
    count: u32,
    window_start: Instant,
}

/// The mesh core, owning all mutable state as a single logical task.
pub struct MeshService {
    config: MeshConfig,
    transport: Arc<dyn Transport>,
    signing: Arc<dyn SigningService>,
    dedup: Deduplicator,
    topology: TopologyTracker,
    gossip: GossipSyncManager,
    relay: RelayController,
    peer_signing_keys: LruCache<String, VerifyingKey>,
    handshake_rate: LruCache<String, RateWindow>,
    current_peers: HashMap<String, PeerConnection>,
    running: Arc<AtomicBool>,
    event_tx: broadcast::Sender<Packet>,
    my_peer_id: PeerId,
}

impl MeshService {
    pub fn new(
        config: MeshConfig,
        transport: Arc<dyn Transport>,
        signing: Arc<dyn SigningService>,
    ) -> Self {
        let my_peer_id = signing.local_peer_id();
        let (event_tx, _) = broadcast::channel(256);
        Self {
            dedup: Deduplicator::new(config.dedup_max_age, config.dedup_max_count),
            topology: TopologyTracker::new(config.route_freshness_threshold),
            gossip: GossipSyncManager::new(
                config.seen_capacity,
                config.max_sync_packets_per_request,
                config.max_message_age,
            ),
            relay: RelayController::new(config.high_degree_threshold),
            peer_signing_keys: LruCache::new(
                NonZeroUsize::new(config.max_peer_signing_keys).unwrap(),
            ),
            handshake_rate: LruCache::new(
                NonZeroUsize::new(config.max_handshake_rate_sources).unwrap(),
            ),
            current_peers: HashMap::new(),
            running: Arc::new(AtomicBool::new(false)),
            event_tx,
            my_peer_id,
            transport,
            signing,
            config,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Packet> {
        self.event_tx.subscribe()
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        self.transport.start().await?;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        self.running.store(false, Ordering::SeqCst);
        self.transport.stop().await?;
        Ok(())
    }

    pub async fn dispose(&mut self) -> Result<()> {
        self.stop().await
    }

    /// Drives the pipeline until `stop()` flips the running flag or the
    /// transport's streams end. Meant to be run as a single owned task.
    pub async fn run(&mut self) {
        let mut packet_rx = self.transport.packet_receiver();
        let mut peer_list_rx = self.transport.peer_list_receiver();
        let mut announce_timer = tokio::time::interval(self.config.topology_announce_interval);
        let mut maintenance_timer = tokio::time::interval(self.config.maintenance_interval);
        announce_timer.reset();
        maintenance_timer.reset();

        while self.is_running() {
            tokio::select! {
                maybe_packet = packet_rx.recv() => {
                    match maybe_packet {
                        Some(packet) => self.handle_inbound_packet(packet).await,
                        None => break,
                    }
                }
                maybe_peers = peer_list_rx.recv() => {
                    if let Some(peers) = maybe_peers {
                        self.handle_peer_list_update(peers).await;
                    }
                }
                _ = announce_timer.tick() => {
                    self.send_topology_announce().await;
                }
                _ = maintenance_timer.tick() => {
                    self.topology.prune(self.config.route_freshness_threshold);
                    self.gossip.maintain();
                }
            }
        }
    }

    // ---- Outbound path (4.E.1) ----

    pub async fn send_packet(&self, mut packet: Packet, peer: PeerId) -> bool {
        self.sign_if_possible(&mut packet).await;
        self.transport.send_packet(&packet, &peer).await
    }

    pub async fn broadcast_packet(&self, mut packet: Packet) {
        self.sign_if_possible(&mut packet).await;
        self.transport.broadcast_packet(&packet).await;
    }

    async fn sign_if_possible(&self, packet: &mut Packet) {
        let message = packet.encode();
        if let Some(sig) = self.signing.sign(&message).await {
            packet.signature = Some(sig.to_bytes());
        }
    }

    // ---- Inbound pipeline (4.E.2) ----

    async fn handle_inbound_packet(&mut self, packet: Packet) {
        let id = packet.packet_id();
        if self.dedup.is_duplicate(&id) {
            return;
        }

        let verified = match self.compute_verified(&packet) {
            None => {
                tracing::warn!(
                    source = %to_hex(&packet.source_id),
                    packet_type = packet.packet_type.as_str(),
                    "dropping packet with missing or invalid signature"
                );
                return;
            }
            Some(v) => v,
        };
        if !verified && packet.packet_type != PacketType::Handshake {
            tracing::debug!(
                source = %to_hex(&packet.source_id),
                "no signing key cached for source, continuing unverified"
            );
        }

        if packet.packet_type.is_topology_class() {
            if verified {
                if let Some(neighbors) = decode_discovery_payload(&packet.payload) {
                    self.topology.update_neighbors(&packet.source_id, &neighbors);
                }
                self.gossip.on_packet_seen(&packet);
            }
            self.maybe_relay(&packet);
            return;
        }

        if packet.packet_type == PacketType::Handshake {
            let source_hex = to_hex(&packet.source_id);
            if !self.handshake_rate_allows(&source_hex) {
                tracing::debug!(source = %source_hex, "handshake rate limit exceeded, dropping");
                return;
            }
            self.gossip.on_packet_seen(&packet);
            self.emit(packet.clone());
            self.maybe_relay(&packet);
            return;
        }

        let source_hex = to_hex(&packet.source_id);
        let drop_from_app = !verified && self.current_peers.contains_key(&source_hex);
        self.gossip.on_packet_seen(&packet);
        if !drop_from_app {
            self.emit(packet.clone());
        }
        self.maybe_relay(&packet);
    }

    /// `None` means drop with no relay or emit; `Some(bool)` is the
    /// verified flag to continue the pipeline with.
    fn compute_verified(&mut self, packet: &Packet) -> Option<bool> {
        if packet.packet_type == PacketType::Handshake {
            return Some(true);
        }
        let source_hex = to_hex(&packet.source_id);
        match self.peer_signing_keys.get(&source_hex) {
            None => Some(false),
            Some(key) => match packet.signature {
                None => None,
                Some(sig_bytes) => {
                    let signature = Signature::from_bytes(&sig_bytes);
                    let message = packet.encode();
                    if self.signing.verify(key, &message, &signature) {
                        Some(true)
                    } else {
                        None
                    }
                }
            },
        }
    }

    fn handshake_rate_allows(&mut self, source_hex: &str) -> bool {
        let now = Instant::now();
        let window = self.config.rate_limit_window;
        let limit = self.config.max_handshakes_per_window;
        let entry = self
            .handshake_rate
            .get_or_insert_mut(source_hex.to_string(), || RateWindow {
                count: 0,
                window_start: now,
            });
        if now.duration_since(entry.window_start) >= window {
            entry.count = 0;
            entry.window_start = now;
        }
        entry.count += 1;
        entry.count <= limit
    }

    fn emit(&self, packet: Packet) {
        let _ = self.event_tx.send(packet);
    }

    // ---- Relay execution (4.E.3) ----

    fn maybe_relay(&mut self, packet: &Packet) {
        let effective_ttl = if packet.packet_type == PacketType::Handshake {
            packet.ttl.clamp(0, 3)
        } else {
            packet.ttl
        };
        let degree = self.current_peers.len();
        let sender_is_self = packet.source_id == self.my_peer_id;
        let decision = self.relay.decide(
            effective_ttl,
            sender_is_self,
            packet.packet_type,
            packet.is_directed(),
            degree,
        );
        if !decision.should_relay {
            return;
        }

        let mut relayed = packet.clone();
        relayed.ttl = decision.new_ttl;
        let transport = Arc::clone(&self.transport);
        let running = Arc::clone(&self.running);
        let delay = Duration::from_millis(decision.delay_ms);
        tokio::spawn(async move {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep_until(TokioInstant::now() + delay).await;
            if !running.load(Ordering::SeqCst) {
                return;
            }
            transport.broadcast_packet(&relayed).await;
        });
    }

    // ---- Peer-list updates (4.E.4) ----

    async fn handle_peer_list_update(&mut self, peers: Vec<PeerConnection>) {
        let old_ids: std::collections::HashSet<String> =
            self.current_peers.keys().cloned().collect();

        let mut new_peers = HashMap::with_capacity(peers.len());
        for conn in &peers {
            new_peers.insert(conn.peer_id_hex.clone(), conn.clone());
            if let Some(key_bytes) = conn.verifying_key {
                if let Ok(key) = VerifyingKey::from_bytes(&key_bytes) {
                    self.peer_signing_keys.put(conn.peer_id_hex.clone(), key);
                }
            }
        }
        self.current_peers = new_peers;

        let neighbor_ids: Vec<PeerId> = peers.iter().map(|p| p.peer_id).take(10).collect();
        self.topology.update_neighbors(&self.my_peer_id, &neighbor_ids);

        let new_ids: std::collections::HashSet<String> =
            self.current_peers.keys().cloned().collect();
        if new_ids != old_ids {
            self.send_discovery_announce().await;
            self.send_topology_announce().await;
        }
    }

    // ---- Announces (4.E.5) ----

    async fn send_discovery_announce(&self) {
        self.broadcast_packet(self.build_announce(PacketType::Discovery)).await;
    }

    async fn send_topology_announce(&self) {
        self.broadcast_packet(self.build_announce(PacketType::TopologyAnnounce)).await;
    }

    fn build_announce(&self, packet_type: PacketType) -> Packet {
        let neighbors: Vec<PeerId> = self.current_peers.values().map(|p| p.peer_id).take(10).collect();
        Packet {
            version: VERSION,
            packet_type,
            ttl: MAX_TTL,
            flags: rand::thread_rng().gen(),
            timestamp: now_millis(),
            source_id: self.my_peer_id,
            dest_id: crate::peer::BROADCAST,
            payload: encode_discovery_payload(&neighbors),
            signature: None,
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
