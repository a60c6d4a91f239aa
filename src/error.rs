//! Error types for the Fluxon mesh core.
//!
//! Almost nothing inside the packet pipeline is fatal — malformed wire
//! data, rate limits, and unverified topology updates are silent drops,
//! not `Err` returns. `Error` exists for the boundary operations that
//! *can* legitimately fail the caller: packet codec failures and the
//! external collaborator traits ([`crate::transport::Transport`],
//! [`crate::identity::SigningService`]).

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced across the Fluxon public API.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed packet: {0}")]
    Codec(String),

    #[error("signing service unavailable: {0}")]
    SigningUnavailable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
