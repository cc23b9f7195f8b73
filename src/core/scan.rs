//! Register scan controller
//!
//! Sweeps a contiguous address range one read at a time, in ascending order,
//! pausing between reads so the bus is never saturated. At most one scan runs
//! per controller; asking to start another while one runs cancels it instead.
//!
//! ```text
//! Idle -> Running -> { Completed | Cancelled | Faulted } -> Idle
//! ```

use super::connection::ConnectionManager;
use super::error::{SessionError, SessionResult};
use super::logger::{EventLog, LogCategory, LogEntry};
use super::session::SessionEvent;
use super::transport::RegisterReply;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Highest address count a scan can cover
const ADDRESS_SPACE: u32 = 1 << 16;

/// Whether silent registers get an event log entry
///
/// Sparse ranges produce mostly silence, so the default keeps it out of the
/// log. The outcome itself is always recorded in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoResponseLogging {
    /// Leave `NoResponse` outcomes out of the log
    #[default]
    Suppress,
    /// Log every `NoResponse` outcome
    Log,
}

/// Scan settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    /// Pause after each read
    pub pacing: Duration,
    /// Logging policy for silent registers
    pub no_response: NoResponseLogging,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(50),
            no_response: NoResponseLogging::Suppress,
        }
    }
}

/// Parameters of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Slave id
    pub slave: u8,
    /// First address
    pub start: u16,
    /// Number of addresses
    pub count: u32,
    /// Function code used for every read
    pub function_code: u8,
}

impl ScanRequest {
    /// Holding register scan (function code 3)
    pub fn new(slave: u8, start: u16, count: u32) -> Self {
        Self {
            slave,
            start,
            count,
            function_code: 3,
        }
    }

    /// Set function code
    #[must_use]
    pub fn function_code(mut self, code: u8) -> Self {
        self.function_code = code;
        self
    }

    /// Reject ranges that run past the last address
    pub fn validate(&self) -> SessionResult<()> {
        let end = u32::from(self.start).checked_add(self.count);
        if end.map_or(true, |end| end > ADDRESS_SPACE) {
            return Err(SessionError::InvalidScan(format!(
                "range {}+{} exceeds address 65535",
                self.start, self.count
            )));
        }
        Ok(())
    }
}

/// A scan as it runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSession {
    /// Scan id
    pub id: Uuid,
    /// Slave id
    pub slave: u8,
    /// First address
    pub start: u16,
    /// Number of addresses
    pub count: u32,
    /// Function code
    pub function_code: u8,
    /// Cleared when the scan ends, however it ends
    pub running: bool,
}

impl ScanSession {
    fn begin(request: &ScanRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            slave: request.slave,
            start: request.start,
            count: request.count,
            function_code: request.function_code,
            running: true,
        }
    }

    fn addresses(&self) -> impl Iterator<Item = u16> {
        let start = u32::from(self.start);
        let end = start.saturating_add(self.count).min(ADDRESS_SPACE);
        (start..end).filter_map(|a| u16::try_from(a).ok())
    }
}

/// Scan lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    /// No scan
    Idle,
    /// Issuing reads
    Running,
    /// Every address was visited
    Completed,
    /// Stopped on request
    Cancelled,
    /// Stopped by a transport failure
    Faulted,
}

/// Result of reading one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegisterOutcome {
    /// Register answered
    Ok {
        /// Address
        address: u16,
        /// Value
        value: u16,
        /// Value as `0x%04X`
        hex: String,
    },
    /// Device answered with an error; the scan goes on
    DeviceError {
        /// Address
        address: u16,
        /// Device message
        message: String,
    },
    /// Device stayed silent; the scan goes on
    NoResponse {
        /// Address
        address: u16,
    },
    /// Link failure; ends the scan
    TransportError {
        /// Failure message
        message: String,
    },
}

impl RegisterOutcome {
    /// Successful read
    pub fn ok(address: u16, value: u16) -> Self {
        Self::Ok {
            address,
            value,
            hex: format!("0x{value:04X}"),
        }
    }

    /// Address this outcome belongs to
    pub fn address(&self) -> Option<u16> {
        match self {
            Self::Ok { address, .. }
            | Self::DeviceError { address, .. }
            | Self::NoResponse { address } => Some(*address),
            Self::TransportError { .. } => None,
        }
    }

    /// Whether this outcome ends the scan
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TransportError { .. })
    }

    /// Event log entry for this outcome; `None` for a suppressed `NoResponse`
    pub fn log_entry(&self, policy: NoResponseLogging) -> Option<LogEntry> {
        match self {
            Self::Ok { address, value, hex } => Some(LogEntry::new(
                LogCategory::Success,
                format!("Reg {address}: {value} ({hex})"),
            )),
            Self::DeviceError { address, message } => Some(LogEntry::new(
                LogCategory::Error,
                format!("Reg {address}: Error ({message})"),
            )),
            Self::NoResponse { address } => match policy {
                NoResponseLogging::Suppress => None,
                NoResponseLogging::Log => Some(LogEntry::new(
                    LogCategory::Info,
                    format!("Reg {address}: No Response"),
                )),
            },
            Self::TransportError { message } => Some(LogEntry::new(
                LogCategory::Error,
                format!("Scan Error: {message}"),
            )),
        }
    }
}

/// What a finished scan produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Session snapshot, `running` cleared
    pub session: ScanSession,
    /// How the scan ended
    pub state: ScanState,
    /// One outcome per visited address, in address order
    pub outcomes: Vec<RegisterOutcome>,
    /// Wall time from start to end
    pub elapsed: Duration,
}

/// Handle on a running scan
#[derive(Debug)]
pub struct ScanHandle {
    id: Uuid,
    token: CancellationToken,
    done: oneshot::Receiver<ScanReport>,
}

impl ScanHandle {
    /// Scan id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Request cancellation; takes effect between reads
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the scan to end
    pub async fn wait(self) -> SessionResult<ScanReport> {
        self.done.await.map_err(|_| SessionError::Closed)
    }
}

/// Result of asking to start a scan
#[derive(Debug)]
pub enum ScanStart {
    /// A new scan is running
    Started(ScanHandle),
    /// A scan was already running; it has been asked to stop
    CancelRequested,
}

struct ActiveScan {
    id: Uuid,
    token: CancellationToken,
}

/// Runs scans over a session's connection
pub struct ScanController {
    connection: Arc<ConnectionManager>,
    log: Arc<dyn EventLog>,
    events: broadcast::Sender<SessionEvent>,
    settings: ScanSettings,
    active: Mutex<Option<ActiveScan>>,
}

impl ScanController {
    /// Create a controller
    pub fn new(
        connection: Arc<ConnectionManager>,
        log: Arc<dyn EventLog>,
        events: broadcast::Sender<SessionEvent>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            connection,
            log,
            events,
            settings,
            active: Mutex::new(None),
        }
    }

    /// Current settings
    pub fn settings(&self) -> ScanSettings {
        self.settings
    }

    /// `Running` while a scan is active, `Idle` otherwise
    pub fn state(&self) -> ScanState {
        if self.active.lock().is_some() {
            ScanState::Running
        } else {
            ScanState::Idle
        }
    }

    /// Start a scan, or cancel the running one
    ///
    /// Must be called from within a tokio runtime; the scan runs on its own
    /// task and reports through the returned handle.
    pub fn start(self: &Arc<Self>, request: ScanRequest) -> SessionResult<ScanStart> {
        if !self.connection.is_connected() {
            return Err(SessionError::NotConnected);
        }

        let mut active = self.active.lock();
        if let Some(scan) = active.as_ref() {
            tracing::info!("Scan {} running; cancelling instead of starting", scan.id);
            scan.token.cancel();
            return Ok(ScanStart::CancelRequested);
        }

        request.validate()?;
        let session = ScanSession::begin(&request);
        let id = session.id;
        let token = CancellationToken::new();
        *active = Some(ActiveScan {
            id,
            token: token.clone(),
        });
        drop(active);

        tracing::info!(
            "Scan {} started: slave {} addresses {}..+{} fc {}",
            id,
            session.slave,
            session.start,
            session.count,
            session.function_code
        );

        let (done_tx, done_rx) = oneshot::channel();
        let controller = Arc::clone(self);
        let task_token = token.clone();
        tokio::spawn(async move {
            let report = controller.run(session, task_token).await;
            controller.finish(id);
            tracing::info!(
                "Scan {} {:?} after {} outcome(s)",
                id,
                report.state,
                report.outcomes.len()
            );
            let _ = controller.events.send(SessionEvent::ScanFinished {
                id,
                state: report.state,
            });
            let _ = done_tx.send(report);
        });

        Ok(ScanStart::Started(ScanHandle {
            id,
            token,
            done: done_rx,
        }))
    }

    /// Cancel the running scan, if any; returns whether one was running
    pub fn stop(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(scan) => {
                scan.token.cancel();
                true
            }
            None => false,
        }
    }

    fn finish(&self, id: Uuid) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|scan| scan.id == id) {
            *active = None;
        }
    }

    async fn run(&self, mut session: ScanSession, token: CancellationToken) -> ScanReport {
        let started = tokio::time::Instant::now();
        let mut outcomes = Vec::new();
        let mut state = ScanState::Completed;
        let last = session.count.saturating_sub(1) as usize;

        for (index, address) in session.addresses().enumerate() {
            if token.is_cancelled() {
                state = ScanState::Cancelled;
                break;
            }

            let reply = match self.connection.acquire().await {
                Ok(mut link) => link
                    .read_register(session.slave, address, session.function_code)
                    .await
                    .map_err(SessionError::from),
                Err(e) => Err(e),
            };

            let outcome = match reply {
                Ok(RegisterReply::Value(value)) => RegisterOutcome::ok(address, value),
                Ok(RegisterReply::DeviceError(message)) => {
                    RegisterOutcome::DeviceError { address, message }
                }
                Ok(RegisterReply::NoResponse) => RegisterOutcome::NoResponse { address },
                // Disconnect cancels first, so a vanished link here is a stop request
                Err(SessionError::NotConnected) if token.is_cancelled() => {
                    state = ScanState::Cancelled;
                    break;
                }
                Err(e) => RegisterOutcome::TransportError {
                    message: e.to_string(),
                },
            };

            self.record(&outcome);
            let fatal = outcome.is_fatal();
            outcomes.push(outcome);

            if fatal {
                tracing::warn!("Scan {} faulted at address {}", session.id, address);
                state = ScanState::Faulted;
                break;
            }
            if token.is_cancelled() {
                state = ScanState::Cancelled;
                break;
            }
            if index < last {
                tokio::select! {
                    () = token.cancelled() => {
                        state = ScanState::Cancelled;
                        break;
                    }
                    () = tokio::time::sleep(self.settings.pacing) => {}
                }
            }
        }

        session.running = false;
        ScanReport {
            session,
            state,
            outcomes,
            elapsed: started.elapsed(),
        }
    }

    fn record(&self, outcome: &RegisterOutcome) {
        tracing::debug!("Scan outcome: {:?}", outcome);
        if let Some(entry) = outcome.log_entry(self.settings.no_response) {
            self.log.append(entry);
        }
        let _ = self.events.send(SessionEvent::ScanOutcome(outcome.clone()));
    }
}
