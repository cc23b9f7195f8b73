//! Command dispatcher
//!
//! Sends one user-authored frame and reports what went out, what came back,
//! and whether the reply's checksum held.

use super::codec::{format_hex, parse_hex, CodecError, HexFormat};
use super::connection::ConnectionManager;
use super::error::{SessionError, SessionResult};
use super::logger::{EventLog, LogCategory, LogEntry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A raw frame submitted by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Frame bytes as hex text
    pub payload: String,
    /// Ask the transport to append the protocol checksum
    pub append_checksum: bool,
}

impl CommandRequest {
    /// Create a request
    pub fn new(payload: impl Into<String>, append_checksum: bool) -> Self {
        Self {
            payload: payload.into(),
            append_checksum,
        }
    }
}

/// Outcome of one [`CommandRequest`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Bytes written, including any checksum
    pub transmitted: Option<String>,
    /// Bytes read back; `None` when the device did not answer
    pub received: Option<String>,
    /// Checksum verdict for `received`
    pub checksum_valid: bool,
    /// Set when the command could not be carried out
    pub error: Option<String>,
    /// Typed form of `error`
    #[serde(skip)]
    pub failure: Option<SessionError>,
}

impl CommandResult {
    pub(crate) fn failed(error: &SessionError) -> Self {
        Self {
            error: Some(error.to_string()),
            failure: Some(error.clone()),
            ..Self::default()
        }
    }

    /// Whether the command reached the device
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Sends frames over the session's link
///
/// Callers await each `send` before issuing the next one.
pub struct CommandDispatcher {
    connection: Arc<ConnectionManager>,
    log: Arc<dyn EventLog>,
}

impl CommandDispatcher {
    /// Create a dispatcher over a connection
    pub fn new(connection: Arc<ConnectionManager>, log: Arc<dyn EventLog>) -> Self {
        Self { connection, log }
    }

    /// Send a frame; failures are reported in [`CommandResult::error`]
    pub async fn send(&self, request: &CommandRequest) -> CommandResult {
        match self.dispatch(request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Command failed: {}", e);
                self.log.append(LogEntry::new(LogCategory::Error, format!("Error: {e}")));
                CommandResult::failed(&e)
            }
        }
    }

    async fn dispatch(&self, request: &CommandRequest) -> SessionResult<CommandResult> {
        if !self.connection.is_connected() {
            return Err(SessionError::NotConnected);
        }

        let payload = parse_hex(&request.payload)?;
        if payload.is_empty() {
            return Err(CodecError::Empty.into());
        }

        let reply = {
            let mut link = self.connection.acquire().await?;
            link.send_frame(&payload, request.append_checksum).await?
        };

        let transmitted = format_hex(&reply.transmitted, HexFormat::Spaced);
        tracing::debug!("TX {}", transmitted);
        self.log.append(LogEntry::new(LogCategory::Tx, format!("TX: {transmitted}")));

        if reply.received.is_empty() {
            self.log.append(LogEntry::new(LogCategory::Info, "RX: (No Response)"));
            return Ok(CommandResult {
                transmitted: Some(transmitted),
                received: None,
                ..CommandResult::default()
            });
        }

        let received = format_hex(&reply.received, HexFormat::Spaced);
        tracing::debug!("RX {} (checksum valid: {})", received, reply.checksum_valid);
        let verdict = if reply.checksum_valid { "[CRC OK]" } else { "[CRC FAIL]" };
        self.log.append(LogEntry::new(LogCategory::Rx, format!("RX: {received} {verdict}")));

        Ok(CommandResult {
            transmitted: Some(transmitted),
            received: Some(received),
            checksum_valid: reply.checksum_valid,
            ..CommandResult::default()
        })
    }
}
