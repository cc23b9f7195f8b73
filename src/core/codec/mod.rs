//! Hex codec for command payloads and device replies
//!
//! Users type frames as hex text; the log and command results show bytes the
//! same way.

mod hex;

pub use self::hex::{format_hex, parse_hex, HexFormat};

/// Codec errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Nothing to send
    #[error("Payload is empty")]
    Empty,

    /// Odd number of hex digits
    #[error("Hex string must have even number of digits")]
    OddLength,

    /// Invalid character
    #[error("Invalid character at position {0}: {1}")]
    InvalidCharacter(usize, char),
}
