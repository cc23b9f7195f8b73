//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use crate::config::ConfigError;
use crate::core::error::SessionError;
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// Command issued without a link
    pub const NOT_CONNECTED: u8 = 4;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 5;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Link failed mid-operation
    pub const TRANSPORT_ERROR: u8 = 9;

    /// Device did not answer
    pub const NO_RESPONSE: u8 = 10;

    /// User cancelled
    pub const CANCELLED: u8 = 11;

    /// Reply failed its checksum
    pub const CHECKSUM_FAILED: u8 = 12;

    /// Internal error
    pub const INTERNAL_ERROR: u8 = 127;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success with a message
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Error with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Operation cancelled by the user
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::CANCELLED, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to `ExitCode`
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<&SessionError> for CliResult {
    fn from(err: &SessionError) -> Self {
        let code = match err {
            SessionError::NotConnected => ExitCodes::NOT_CONNECTED,
            SessionError::AlreadyConnected => ExitCodes::ERROR,
            SessionError::Transport(TransportError::PortNotFound(_)) => ExitCodes::PORT_NOT_FOUND,
            SessionError::Transport(TransportError::ConnectionFailed(_)) => {
                ExitCodes::CONNECTION_FAILED
            }
            SessionError::Transport(TransportError::InvalidConfiguration(_))
            | SessionError::InvalidPayload(_)
            | SessionError::InvalidScan(_) => ExitCodes::INVALID_ARGS,
            SessionError::Transport(_) => ExitCodes::TRANSPORT_ERROR,
            SessionError::Closed => ExitCodes::INTERNAL_ERROR,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<&ConfigError> for CliResult {
    fn from(err: &ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Connection failed",
        4 => "Not connected",
        5 => "Port not found",
        8 => "Configuration error",
        9 => "Transport error",
        10 => "No response",
        11 => "Operation cancelled",
        12 => "Checksum failed",
        127 => "Internal error",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in [0, 1, 2, 3, 4, 5, 8, 9, 10, 11, 12, 127] {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::CodecError;

    #[test]
    fn test_cli_result() {
        let success = CliResult::success();
        assert!(success.is_success());
        assert_eq!(success.code(), 0);

        let error = CliResult::error(3, "Connection failed");
        assert!(!error.is_success());
        assert_eq!(error.code(), 3);
        assert_eq!(error.message(), Some("Connection failed"));
    }

    #[test]
    fn test_from_session_error() {
        assert_eq!(
            CliResult::from(&SessionError::NotConnected).code(),
            ExitCodes::NOT_CONNECTED
        );
        assert_eq!(
            CliResult::from(&SessionError::InvalidPayload(CodecError::OddLength)).code(),
            ExitCodes::INVALID_ARGS
        );

        let missing = SessionError::Transport(TransportError::PortNotFound("COM9".to_string()));
        let result = CliResult::from(&missing);
        assert_eq!(result.code(), ExitCodes::PORT_NOT_FOUND);
        assert_eq!(result.message(), Some("Port not found: COM9"));

        let io = SessionError::Transport(TransportError::Io("gone".to_string()));
        assert_eq!(CliResult::from(&io).code(), ExitCodes::TRANSPORT_ERROR);
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(exit_code_description(ExitCodes::CANCELLED), "Operation cancelled");
        assert_eq!(exit_code_description(200), "Unknown error");
    }
}
