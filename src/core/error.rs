//! Orchestrator error taxonomy

use super::codec::CodecError;
use super::transport::TransportError;
use thiserror::Error;

/// Errors surfaced by the session orchestrator
///
/// `NotConnected`, `AlreadyConnected`, `InvalidPayload` and `InvalidScan` are
/// rejected at the call boundary before any transport call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Operation needs an open link
    #[error("Not connected")]
    NotConnected,

    /// Connect requested while a link is already open
    #[error("Already connected")]
    AlreadyConnected,

    /// The transport failed or refused the request
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// Command payload is not valid hex
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] CodecError),

    /// Scan parameters describe an impossible range
    #[error("Invalid scan: {0}")]
    InvalidScan(String),

    /// The orchestrator task is gone
    #[error("Session closed")]
    Closed,
}

/// Result alias for orchestrator operations
pub type SessionResult<T> = Result<T, SessionError>;
