//! The packet envelope and its bit-exact wire format.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

use crate::error::{Error, Result};
use crate::peer::PeerId;

/// Current (and only) wire-format version.
pub const VERSION: u8 = 1;

/// Hard ceiling on `ttl`, matching [`crate::config::MeshConfig::max_ttl`]'s default.
pub const MAX_TTL: u8 = 7;

/// 64-byte Ed25519 signature attached out-of-band by the signing wrapper.
pub type SignatureBytes = [u8; 64];

/// Tagged packet type, carried as a single byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Discovery,
    TopologyAnnounce,
    Handshake,
    NoiseEncrypted,
    Chat,
    LocationUpdate,
    EmergencyAlert,
    Ack,
    Ping,
    Pong,
    GossipSync,
}

impl PacketType {
    fn wire_tag(self) -> u8 {
        match self {
            PacketType::Discovery => 0,
            PacketType::TopologyAnnounce => 1,
            PacketType::Handshake => 2,
            PacketType::NoiseEncrypted => 3,
            PacketType::Chat => 4,
            PacketType::LocationUpdate => 5,
            PacketType::EmergencyAlert => 6,
            PacketType::Ack => 7,
            PacketType::Ping => 8,
            PacketType::Pong => 9,
            PacketType::GossipSync => 10,
        }
    }

    fn from_wire_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => PacketType::Discovery,
            1 => PacketType::TopologyAnnounce,
            2 => PacketType::Handshake,
            3 => PacketType::NoiseEncrypted,
            4 => PacketType::Chat,
            5 => PacketType::LocationUpdate,
            6 => PacketType::EmergencyAlert,
            7 => PacketType::Ack,
            8 => PacketType::Ping,
            9 => PacketType::Pong,
            10 => PacketType::GossipSync,
            _ => return None,
        })
    }

    /// Stable lowercase name used as the type component of a packet id.
    pub fn as_str(self) -> &'static str {
        match self {
            PacketType::Discovery => "discovery",
            PacketType::TopologyAnnounce => "topologyAnnounce",
            PacketType::Handshake => "handshake",
            PacketType::NoiseEncrypted => "noiseEncrypted",
            PacketType::Chat => "chat",
            PacketType::LocationUpdate => "locationUpdate",
            PacketType::EmergencyAlert => "emergencyAlert",
            PacketType::Ack => "ack",
            PacketType::Ping => "ping",
            PacketType::Pong => "pong",
            PacketType::GossipSync => "gossipSync",
        }
    }

    /// Session-layer types are exempt from gossip storage.
    pub fn is_session_layer(self) -> bool {
        matches!(
            self,
            PacketType::Handshake
                | PacketType::NoiseEncrypted
                | PacketType::Ack
                | PacketType::Ping
                | PacketType::Pong
                | PacketType::GossipSync
        )
    }

    /// Topology-class packets are only consumed by the Topology Tracker.
    pub fn is_topology_class(self) -> bool {
        matches!(self, PacketType::Discovery | PacketType::TopologyAnnounce)
    }
}

/// The packet envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub version: u8,
    pub packet_type: PacketType,
    pub ttl: u8,
    /// A random byte set at creation time; acts as a dedup nonce.
    pub flags: u8,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub source_id: PeerId,
    /// All-zero means broadcast.
    pub dest_id: PeerId,
    pub payload: Vec<u8>,
    /// Present only on packets the signing wrapper has signed.
    pub signature: Option<SignatureBytes>,
}

impl Packet {
    /// `true` if `dest_id` names a specific peer rather than the broadcast address.
    pub fn is_directed(&self) -> bool {
        !crate::peer::is_broadcast(&self.dest_id)
    }

    /// The dedup key: `"<type>:<sourceId-hex>:<timestamp>:<flags>"`.
    ///
    /// `flags` is a per-creation nonce, so two otherwise-identical packets
    /// from the same sender in the same millisecond still produce distinct
    /// ids.
    pub fn packet_id(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.packet_type.as_str(),
            crate::peer::to_hex(&self.source_id),
            self.timestamp,
            self.flags
        )
    }

    /// The application-level receipt-matching key, independent of `flags` so
    /// it stays stable across relays of the same original packet.
    pub fn receipt_key(&self) -> String {
        format!("{}:{}", crate::peer::to_hex(&self.source_id), self.timestamp)
    }

    /// Encode the pre-signature byte sequence: everything the signing
    /// wrapper signs and the wire format carries ahead of an optional
    /// trailing signature.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + 1 + 1 + 1 + 8 + 32 + 32 + 2 + self.payload.len());
        // Writes to a Vec<u8> never fail; unwrap is just threading the Result away.
        buf.write_u8(self.version).unwrap();
        buf.write_u8(self.packet_type.wire_tag()).unwrap();
        buf.write_u8(self.ttl).unwrap();
        buf.write_u8(self.flags).unwrap();
        buf.write_i64::<BigEndian>(self.timestamp).unwrap();
        buf.write_all(&self.source_id).unwrap();
        buf.write_all(&self.dest_id).unwrap();
        buf.write_u16::<BigEndian>(self.payload.len() as u16).unwrap();
        buf.write_all(&self.payload).unwrap();
        buf
    }

    /// Encode with the signature (if any) appended, ready for the transport.
    pub fn encode_signed(&self) -> Vec<u8> {
        let mut buf = self.encode();
        if let Some(sig) = &self.signature {
            buf.write_all(sig).unwrap();
        }
        buf
    }

    /// Decode a packet from the wire. Malformed data yields `None` rather
    /// than an error — the decoder itself never fails the pipeline, the
    /// caller just drops the packet silently.
    pub fn decode(bytes: &[u8]) -> Option<Packet> {
        let mut cursor = Cursor::new(bytes);
        let version = cursor.read_u8().ok()?;
        if version != VERSION {
            return None;
        }
        let type_tag = cursor.read_u8().ok()?;
        let packet_type = PacketType::from_wire_tag(type_tag)?;
        let ttl = cursor.read_u8().ok()?;
        if ttl > MAX_TTL {
            return None;
        }
        let flags = cursor.read_u8().ok()?;
        let timestamp = cursor.read_i64::<BigEndian>().ok()?;

        let mut source_id = [0u8; 32];
        cursor.read_exact(&mut source_id).ok()?;
        let mut dest_id = [0u8; 32];
        cursor.read_exact(&mut dest_id).ok()?;

        let payload_len = cursor.read_u16::<BigEndian>().ok()? as usize;
        let mut payload = vec![0u8; payload_len];
        cursor.read_exact(&mut payload).ok()?;

        let remaining = &bytes[cursor.position() as usize..];
        let signature = match remaining.len() {
            0 => None,
            64 => {
                let mut sig = [0u8; 64];
                sig.copy_from_slice(remaining);
                Some(sig)
            }
            _ => return None,
        };

        Some(Packet {
            version,
            packet_type,
            ttl,
            flags,
            timestamp,
            source_id,
            dest_id,
            payload,
            signature,
        })
    }

    /// Encode errors are impossible for well-formed fields, but exposed via
    /// `Result` at the crate boundary for callers that prefer `?` over
    /// pattern-matching `Option`.
    pub fn decode_strict(bytes: &[u8]) -> Result<Packet> {
        Packet::decode(bytes).ok_or_else(|| Error::Codec("malformed packet envelope".into()))
    }
}

/// Decode a discovery payload: `neighborCount(1) | neighborId(32) × neighborCount`.
///
/// Rejects `neighborCount > 10` and short buffers by returning `None`,
/// never panicking on attacker-controlled input.
pub fn decode_discovery_payload(payload: &[u8]) -> Option<Vec<PeerId>> {
    let mut cursor = Cursor::new(payload);
    let count = cursor.read_u8().ok()?;
    if count > 10 {
        return None;
    }
    let mut neighbors = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut id = [0u8; 32];
        cursor.read_exact(&mut id).ok()?;
        neighbors.push(id);
    }
    Some(neighbors)
}

/// Encode a discovery payload, truncating the neighbor list to 10 entries to
/// match the decoder.
pub fn encode_discovery_payload(neighbors: &[PeerId]) -> Vec<u8> {
    let neighbors = &neighbors[..neighbors.len().min(10)];
    let mut buf = Vec::with_capacity(1 + 32 * neighbors.len());
    buf.write_u8(neighbors.len() as u8).unwrap();
    for n in neighbors {
        buf.write_all(n).unwrap();
    }
    buf
}
