//! Fluxon — a peer-to-peer mesh communication core for unreliable,
//! short-range radio transports.
//!
//! The crate is organized leaf-first: packet envelope and peer ids at the
//! bottom, the flood-control and topology components above that, and the
//! Mesh Service orchestrator on top, depending only on the [`transport::Transport`]
//! and [`identity::SigningService`] trait contracts for I/O and signing.

pub mod config;
pub mod dedup;
pub mod error;
pub mod gossip;
pub mod identity;
pub mod mesh;
pub mod packet;
pub mod peer;
pub mod relay;
pub mod topology;
pub mod transport;

pub use config::MeshConfig;
pub use error::{Error, Result};
pub use mesh::MeshService;
pub use packet::{Packet, PacketType};
pub use peer::PeerId;
