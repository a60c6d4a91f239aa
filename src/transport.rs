//! Radio transport contract the Mesh Service sits on top of.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::packet::Packet;
use crate::peer::PeerId;

/// A currently-connected direct peer, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConnection {
    pub peer_id: PeerId,
    pub peer_id_hex: String,
    /// Present when the transport has a verification key for this peer
    /// (e.g. exchanged during session setup).
    pub verifying_key: Option<[u8; 32]>,
}

/// The send/receive/stream surface the Mesh Service is built on. Implemented
/// by the underlying radio driver (Bluetooth LE, LoRa, or any other
/// short-range carrier); the mesh core only ever calls through this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Idempotent: calling `start` while already running is a no-op.
    async fn start(&self) -> Result<()>;

    /// Idempotent: calling `stop` while already stopped is a no-op.
    async fn stop(&self) -> Result<()>;

    fn is_running(&self) -> bool;

    fn my_peer_id(&self) -> PeerId;

    /// Sends to a single peer. Returns `false` on failure without raising
    /// an error — the caller decides whether to retry.
    async fn send_packet(&self, packet: &Packet, peer_id: &PeerId) -> bool;

    /// Best-effort broadcast to all directly connected peers.
    async fn broadcast_packet(&self, packet: &Packet);

    /// A receiver of decoded inbound packets. `None` once the transport has
    /// no more to deliver for this subscription (the stream end, not an
    /// error).
    fn packet_receiver(&self) -> mpsc::Receiver<Packet>;

    /// A receiver of the current connected-peer-list snapshot, fired on
    /// every change.
    fn peer_list_receiver(&self) -> mpsc::Receiver<Vec<PeerConnection>>;
}
