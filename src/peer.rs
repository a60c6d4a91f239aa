//! Peer identity primitives.
//!
//! A [`PeerId`] is a 32-byte opaque identifier, equal and hashed byte-wise.
//! The all-zeros value is reserved to mean "broadcast" (see [`BROADCAST`]).

/// 32-byte opaque peer identifier.
pub type PeerId = [u8; 32];

/// The all-zero `PeerId`, used as `destId` to mean "broadcast to the mesh".
pub const BROADCAST: PeerId = [0u8; 32];

/// Canonical lowercase hex encoding of a `PeerId`, used as a map key
/// wherever a raw byte array cannot be (e.g. as part of a composite string
/// key like the packet id or the route-cache key).
pub fn to_hex(id: &PeerId) -> String {
    hex::encode(id)
}

/// Parse a canonical hex-encoded peer id back into bytes.
///
/// Returns `None` on malformed input rather than erroring — callers treat
/// an unparseable hex key as "unknown peer", not as a fatal condition.
pub fn from_hex(s: &str) -> Option<PeerId> {
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}

/// `true` if `id` is the broadcast address (all zero bytes).
pub fn is_broadcast(id: &PeerId) -> bool {
    *id == BROADCAST
}
