//! Simulated register device
//!
//! An in-process stand-in for a serial device. Register tables, scripted frame
//! replies and link failures come from a [`DeviceProfile`], usually loaded
//! from TOML. Every call is recorded so tests can check ordering.

use super::{ConnectionConfig, FrameReply, RegisterReply, TransportClient, TransportError};
use crate::core::codec::{parse_hex, CodecError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// What a register does when read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterBehavior {
    /// Answer with a value
    Value(u16),
    /// Answer with a device-level error
    Error(String),
}

/// One register table row in a device profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterEntry {
    /// Register address
    pub address: u16,
    /// Value returned on read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u16>,
    /// Device error returned on read (wins over `value`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RegisterEntry {
    fn behavior(&self) -> Option<RegisterBehavior> {
        match (&self.error, self.value) {
            (Some(message), _) => Some(RegisterBehavior::Error(message.clone())),
            (None, Some(value)) => Some(RegisterBehavior::Value(value)),
            (None, None) => None,
        }
    }
}

/// Scripted reply to an exact raw frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRule {
    /// Payload to match (hex, checksum excluded)
    pub request: String,
    /// Checksum bytes written after the payload when the caller asks for one;
    /// empty means the Modbus CRC-16 of the payload
    #[serde(default)]
    pub checksum: String,
    /// Reply bytes (hex); empty for a silent device
    #[serde(default)]
    pub response: String,
    /// Checksum verdict reported for the reply
    #[serde(default)]
    pub checksum_valid: bool,
}

/// Device profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    /// Ports reported by `list_ports`; only these can be opened
    pub ports: Vec<String>,
    /// Slave id the device answers to
    pub slave_id: u8,
    /// Delay applied to every frame and register call
    pub latency_ms: u64,
    /// Link breaks after this many frame/register calls
    pub fail_after: Option<usize>,
    /// Holding registers (function code 3)
    pub holding: Vec<RegisterEntry>,
    /// Input registers (any other function code)
    pub input: Vec<RegisterEntry>,
    /// Scripted raw frame replies
    pub frames: Vec<FrameRule>,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            ports: vec!["SIM0".to_string()],
            slave_id: 1,
            latency_ms: 0,
            fail_after: None,
            holding: Vec::new(),
            input: Vec::new(),
            frames: Vec::new(),
        }
    }
}

impl DeviceProfile {
    /// Parse a profile from TOML
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Small device with a handful of holding registers and one scripted frame
    ///
    /// Also answers on `COM1` so the default connection settings reach it.
    pub fn demo() -> Self {
        Self::default()
            .port("COM1")
            .holding(0, 230)
            .holding(1, 50)
            .holding(2, 0x1234)
            .holding_error(5, "Illegal Data Address")
            .input(0, 21)
            .frame(FrameRule {
                request: "01 03 00 00 00 01".to_string(),
                checksum: "84 0A".to_string(),
                response: "01 03 02 00 E6 B8 1A".to_string(),
                checksum_valid: true,
            })
    }

    /// Add a port name
    #[must_use]
    pub fn port(mut self, name: &str) -> Self {
        self.ports.push(name.to_string());
        self
    }

    /// Add a holding register value
    #[must_use]
    pub fn holding(mut self, address: u16, value: u16) -> Self {
        self.holding.push(RegisterEntry { address, value: Some(value), error: None });
        self
    }

    /// Add a holding register that answers with a device error
    #[must_use]
    pub fn holding_error(mut self, address: u16, message: &str) -> Self {
        self.holding.push(RegisterEntry {
            address,
            value: None,
            error: Some(message.to_string()),
        });
        self
    }

    /// Add an input register value
    #[must_use]
    pub fn input(mut self, address: u16, value: u16) -> Self {
        self.input.push(RegisterEntry { address, value: Some(value), error: None });
        self
    }

    /// Add a scripted frame reply
    #[must_use]
    pub fn frame(mut self, rule: FrameRule) -> Self {
        self.frames.push(rule);
        self
    }

    /// Break the link after `calls` frame/register calls
    #[must_use]
    pub fn fail_after(mut self, calls: usize) -> Self {
        self.fail_after = Some(calls);
        self
    }

    /// Set per-call latency
    #[must_use]
    pub fn latency(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }
}

/// A call observed by the simulated device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// `list_ports`
    ListPorts,
    /// `connect` to the named port
    Connect(String),
    /// `disconnect`
    Disconnect,
    /// `send_frame` with the raw payload
    SendFrame(Vec<u8>),
    /// `read_register`
    ReadRegister {
        /// Slave id
        slave: u8,
        /// Register address
        address: u16,
        /// Function code
        function_code: u8,
    },
}

/// CRC-16/MODBUS (poly 0xA001 reflected, init 0xFFFF), sent low byte first
fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

struct CompiledFrame {
    request: Vec<u8>,
    checksum: Vec<u8>,
    response: Vec<u8>,
    checksum_valid: bool,
}

/// Simulated serial device
pub struct SimulatedDevice {
    ports: Vec<String>,
    slave_id: u8,
    latency: Duration,
    fail_after: Option<usize>,
    holding: BTreeMap<u16, RegisterBehavior>,
    input: BTreeMap<u16, RegisterBehavior>,
    frames: Vec<CompiledFrame>,
    open: Option<ConnectionConfig>,
    link_calls: usize,
    history: Arc<Mutex<Vec<TransportCall>>>,
}

impl SimulatedDevice {
    /// Build a device from a profile
    pub fn new(profile: DeviceProfile) -> Result<Self, TransportError> {
        let table = |entries: &[RegisterEntry]| -> BTreeMap<u16, RegisterBehavior> {
            entries
                .iter()
                .filter_map(|e| e.behavior().map(|b| (e.address, b)))
                .collect()
        };

        let frames = profile
            .frames
            .iter()
            .map(|rule| -> Result<CompiledFrame, CodecError> {
                Ok(CompiledFrame {
                    request: parse_hex(&rule.request)?,
                    checksum: parse_hex(&rule.checksum)?,
                    response: parse_hex(&rule.response)?,
                    checksum_valid: rule.checksum_valid,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TransportError::InvalidConfiguration(format!("frame rule: {e}")))?;

        Ok(Self {
            holding: table(&profile.holding),
            input: table(&profile.input),
            ports: profile.ports,
            slave_id: profile.slave_id,
            latency: Duration::from_millis(profile.latency_ms),
            fail_after: profile.fail_after,
            frames,
            open: None,
            link_calls: 0,
            history: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Shared handle on the call history; stays valid after the device is
    /// moved into a session
    pub fn history(&self) -> Arc<Mutex<Vec<TransportCall>>> {
        Arc::clone(&self.history)
    }

    fn record(&self, call: TransportCall) {
        self.history.lock().push(call);
    }

    async fn link_step(&mut self) -> Result<(), TransportError> {
        if self.open.is_none() {
            return Err(TransportError::NotOpen);
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.link_calls += 1;
        match self.fail_after {
            Some(limit) if self.link_calls > limit => {
                Err(TransportError::Io("device disconnected".to_string()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl TransportClient for SimulatedDevice {
    async fn list_ports(&mut self) -> Result<Vec<String>, TransportError> {
        self.record(TransportCall::ListPorts);
        Ok(self.ports.clone())
    }

    async fn connect(&mut self, config: &ConnectionConfig) -> Result<(), TransportError> {
        self.record(TransportCall::Connect(config.port.clone()));
        config.validate()?;
        if !self.ports.iter().any(|p| p == &config.port) {
            return Err(TransportError::PortNotFound(config.port.clone()));
        }
        self.open = Some(config.clone());
        self.link_calls = 0;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.record(TransportCall::Disconnect);
        self.open = None;
        Ok(())
    }

    async fn send_frame(
        &mut self,
        payload: &[u8],
        append_checksum: bool,
    ) -> Result<FrameReply, TransportError> {
        self.record(TransportCall::SendFrame(payload.to_vec()));
        self.link_step().await?;

        let rule = self.frames.iter().find(|f| f.request == payload);
        let mut transmitted = payload.to_vec();
        if append_checksum {
            match rule.filter(|r| !r.checksum.is_empty()) {
                Some(rule) => transmitted.extend_from_slice(&rule.checksum),
                None => transmitted.extend_from_slice(&crc16_modbus(payload).to_le_bytes()),
            }
        }

        Ok(match rule {
            Some(rule) => FrameReply {
                transmitted,
                received: rule.response.clone(),
                checksum_valid: !rule.response.is_empty() && rule.checksum_valid,
            },
            None => FrameReply {
                transmitted,
                received: Vec::new(),
                checksum_valid: false,
            },
        })
    }

    async fn read_register(
        &mut self,
        slave: u8,
        address: u16,
        function_code: u8,
    ) -> Result<RegisterReply, TransportError> {
        self.record(TransportCall::ReadRegister { slave, address, function_code });
        self.link_step().await?;

        if slave != self.slave_id {
            return Ok(RegisterReply::NoResponse);
        }

        let table = if function_code == 3 { &self.holding } else { &self.input };
        Ok(match table.get(&address) {
            Some(RegisterBehavior::Value(value)) => RegisterReply::Value(*value),
            Some(RegisterBehavior::Error(message)) => RegisterReply::DeviceError(message.clone()),
            None => RegisterReply::NoResponse,
        })
    }
}
