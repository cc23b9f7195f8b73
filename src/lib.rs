//! # RegProbe Core Library
//!
//! Interactive control surface for register-oriented serial devices:
//! - Open and close a serial link behind a pluggable transport
//! - Send raw hex frames, optionally with the protocol checksum appended
//! - Scan a register range with pacing and cooperative cancellation
//! - Keep a timestamped event log, optionally mirrored to a file
//!
//! ## Example
//!
//! ```rust,no_run
//! use regprobe_core::{
//!     CommandRequest, ConnectionConfig, DeviceProfile, ScanRequest, ScanSettings, ScanStart,
//!     Session, SessionLogger, SimulatedDevice,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let device = SimulatedDevice::new(DeviceProfile::demo())?;
//!     let logger = SessionLogger::new().shared();
//!     let session = Session::new(Box::new(device), logger.clone(), ScanSettings::default());
//!
//!     session.connect(ConnectionConfig::new("SIM0", 9600)).await?;
//!     let reply = session.send(CommandRequest::new("01 03 00 00 00 01", true)).await;
//!     println!("{:?}", reply.received);
//!
//!     if let ScanStart::Started(scan) = session.start_scan(ScanRequest::new(1, 0, 4)).await? {
//!         let report = scan.wait().await?;
//!         println!("{:?}: {} registers", report.state, report.outcomes.len());
//!     }
//!
//!     for entry in logger.lock().entries() {
//!         println!("{entry}");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes};
pub use crate::config::{AppConfig, ConfigError};
pub use crate::core::codec::{format_hex, parse_hex, CodecError, HexFormat};
pub use crate::core::connection::{ConnectionManager, ConnectionState};
pub use crate::core::dispatcher::{CommandDispatcher, CommandRequest, CommandResult};
pub use crate::core::error::{SessionError, SessionResult};
pub use crate::core::logger::{EventLog, LogCategory, LogEntry, LogFormat, Logger, SessionLogger};
pub use crate::core::scan::{
    NoResponseLogging, RegisterOutcome, ScanController, ScanHandle, ScanReport, ScanRequest,
    ScanSession, ScanSettings, ScanStart, ScanState,
};
pub use crate::core::session::{Session, SessionEvent};
pub use crate::core::transport::{
    ConnectionConfig, DeviceProfile, FrameReply, Parity, RegisterReply, SimulatedDevice,
    TransportClient, TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
