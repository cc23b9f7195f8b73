//! Transport client boundary
//!
//! The orchestrator never touches a serial port directly. Everything it needs
//! from the link (port enumeration, opening, raw frames, single register
//! reads) goes through [`TransportClient`].
//!
//! Implementations:
//! - [`SimulatedDevice`]: scriptable in-process device used by the CLI and tests

mod simulator;

pub use simulator::{DeviceProfile, FrameRule, RegisterBehavior, SimulatedDevice, TransportCall};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Serial port parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// No parity
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
    /// Parity bit always set
    Mark,
    /// Parity bit always cleared
    Space,
}

impl std::str::FromStr for Parity {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "n" => Ok(Self::None),
            "even" | "e" => Ok(Self::Even),
            "odd" | "o" => Ok(Self::Odd),
            "mark" | "m" => Ok(Self::Mark),
            "space" | "s" => Ok(Self::Space),
            other => Err(TransportError::InvalidConfiguration(format!(
                "unknown parity: {other}"
            ))),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Self::None => "N",
            Self::Even => "E",
            Self::Odd => "O",
            Self::Mark => "M",
            Self::Space => "S",
        };
        f.write_str(letter)
    }
}

/// Link settings submitted to [`TransportClient::connect`]
///
/// Immutable once handed to the connection manager; it is stored alongside
/// the `Connected` state for as long as the link is up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Parity
    pub parity: Parity,
}

impl ConnectionConfig {
    /// Create a configuration with no parity
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            parity: Parity::None,
        }
    }

    /// Set parity
    #[must_use]
    pub fn parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Reject settings no link could honour
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.port.trim().is_empty() {
            return Err(TransportError::InvalidConfiguration(
                "port name is empty".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(TransportError::InvalidConfiguration(
                "baud rate must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("COM1", 9600)
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} baud (8{}1)", self.port, self.baud_rate, self.parity)
    }
}

/// Transport error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Link is not open
    #[error("Link not open")]
    NotOpen,

    /// I/O failure on an open link
    #[error("I/O error: {0}")]
    Io(String),
}

/// Reply to a raw frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReply {
    /// Bytes actually written, including any appended checksum
    pub transmitted: Vec<u8>,
    /// Bytes read back; empty when the device stayed silent
    pub received: Vec<u8>,
    /// Whether the trailing checksum of `received` verified
    pub checksum_valid: bool,
}

/// Device answer to a single register read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterReply {
    /// Register value
    Value(u16),
    /// Device answered with an error (exception, bad checksum, short frame)
    DeviceError(String),
    /// Nothing came back before the transport's timeout
    NoResponse,
}

/// Operations the orchestrator consumes from the serial link
///
/// Callers serialize access; implementations never see two calls in flight.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportClient: Send {
    /// Enumerate available ports, in a stable order
    async fn list_ports(&mut self) -> Result<Vec<String>, TransportError>;

    /// Open the link
    async fn connect(&mut self, config: &ConnectionConfig) -> Result<(), TransportError>;

    /// Close the link
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Write a raw frame, optionally appending the protocol checksum, and
    /// collect whatever the device sends back
    async fn send_frame(
        &mut self,
        payload: &[u8],
        append_checksum: bool,
    ) -> Result<FrameReply, TransportError>;

    /// Read one register
    async fn read_register(
        &mut self,
        slave: u8,
        address: u16,
        function_code: u8,
    ) -> Result<RegisterReply, TransportError>;
}
