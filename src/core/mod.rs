//! Core module containing the main functionality of RegProbe
//!
//! This module provides:
//! - Transport seam for the serial link, plus a scripted simulated device
//! - Connection manager owning the link state and the transport lock
//! - Command dispatcher for raw frames
//! - Register scan controller with cooperative cancellation
//! - Session orchestrator tying these together behind a command channel
//! - Hex codec for payloads
//! - Session event log with optional file mirror

pub mod codec;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod logger;
pub mod scan;
pub mod session;
pub mod transport;
