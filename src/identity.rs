//! Signing contract the Mesh Service depends on for outbound packets.

use async_trait::async_trait;
use ed25519_dalek::{Signature, VerifyingKey};

use crate::peer::PeerId;

/// Exposes an Ed25519 signing key pair. Signing may be unavailable on some
/// platforms (hardware keystore locked, key not yet provisioned); callers
/// must tolerate failure by falling back to sending unsigned.
#[async_trait]
pub trait SigningService: Send + Sync {
    fn local_peer_id(&self) -> PeerId;

    fn verifying_key(&self) -> VerifyingKey;

    /// Signs `message`, returning `None` if signing is currently
    /// unavailable rather than propagating an error.
    async fn sign(&self, message: &[u8]) -> Option<Signature>;

    /// Verifies `signature` over `message` under `key`.
    fn verify(&self, key: &VerifyingKey, message: &[u8], signature: &Signature) -> bool {
        use ed25519_dalek::Verifier;
        key.verify(message, signature).is_ok()
    }
}
