//! Session orchestrator
//!
//! A [`Session`] owns one connection and the components that use it. Callers
//! submit work as commands; a single task executes them in arrival order and
//! answers each over its own reply channel. Scans run on their own task and
//! share the link with commands through the transport lock.

use super::connection::{ConnectionManager, ConnectionState};
use super::dispatcher::{CommandDispatcher, CommandRequest, CommandResult};
use super::error::{SessionError, SessionResult};
use super::logger::{EventLog, LogCategory, LogEntry};
use super::scan::{RegisterOutcome, ScanController, ScanRequest, ScanSettings, ScanStart, ScanState};
use super::transport::{ConnectionConfig, TransportClient};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

/// Session events
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Connection state changed
    StateChanged(ConnectionState),
    /// A scan produced an outcome
    ScanOutcome(RegisterOutcome),
    /// A scan ended
    ScanFinished {
        /// Scan id
        id: Uuid,
        /// Final state
        state: ScanState,
    },
}

/// Internal commands for session control
enum SessionCommand {
    ListPorts(oneshot::Sender<SessionResult<Vec<String>>>),
    Connect(ConnectionConfig, oneshot::Sender<SessionResult<()>>),
    Disconnect(oneshot::Sender<SessionResult<()>>),
    Send(CommandRequest, oneshot::Sender<CommandResult>),
    StartScan(ScanRequest, oneshot::Sender<SessionResult<ScanStart>>),
    StopScan(oneshot::Sender<bool>),
}

/// Orchestrator over one transport
pub struct Session {
    id: Uuid,
    connection: Arc<ConnectionManager>,
    scanner: Arc<ScanController>,
    cmd_tx: mpsc::Sender<SessionCommand>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl Session {
    /// Create a session and spawn its command task
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        transport: Box<dyn TransportClient>,
        log: Arc<dyn EventLog>,
        settings: ScanSettings,
    ) -> Self {
        let id = Uuid::new_v4();
        let (event_tx, _) = broadcast::channel(1024);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        let connection = Arc::new(ConnectionManager::new(transport));
        let dispatcher = CommandDispatcher::new(Arc::clone(&connection), Arc::clone(&log));
        let scanner = Arc::new(ScanController::new(
            Arc::clone(&connection),
            Arc::clone(&log),
            event_tx.clone(),
            settings,
        ));

        let worker = Worker {
            connection: Arc::clone(&connection),
            dispatcher,
            scanner: Arc::clone(&scanner),
            log,
            event_tx: event_tx.clone(),
        };
        tokio::spawn(worker.run(cmd_rx));
        tracing::debug!("Session {} created", id);

        Self {
            id,
            connection,
            scanner,
            cmd_tx,
            event_tx,
        }
    }

    /// Get session ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Whether a scan is running
    pub fn scan_state(&self) -> ScanState {
        self.scanner.state()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Enumerate ports
    pub async fn list_ports(&self) -> SessionResult<Vec<String>> {
        self.submit(SessionCommand::ListPorts).await?
    }

    /// Open the link
    pub async fn connect(&self, config: ConnectionConfig) -> SessionResult<()> {
        self.submit(|reply| SessionCommand::Connect(config, reply)).await?
    }

    /// Close the link, cancelling any running scan first
    pub async fn disconnect(&self) -> SessionResult<()> {
        self.submit(SessionCommand::Disconnect).await?
    }

    /// Send a raw frame; await the result before sending the next one
    pub async fn send(&self, request: CommandRequest) -> CommandResult {
        match self.submit(|reply| SessionCommand::Send(request, reply)).await {
            Ok(result) => result,
            Err(e) => CommandResult::failed(&e),
        }
    }

    /// Start a scan, or cancel the running one
    pub async fn start_scan(&self, request: ScanRequest) -> SessionResult<ScanStart> {
        self.submit(|reply| SessionCommand::StartScan(request, reply)).await?
    }

    /// Cancel the running scan; returns whether one was running
    pub async fn stop_scan(&self) -> bool {
        self.submit(SessionCommand::StopScan).await.unwrap_or(false)
    }

    async fn submit<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> SessionResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }
}

/// Command task state
struct Worker {
    connection: Arc<ConnectionManager>,
    dispatcher: CommandDispatcher,
    scanner: Arc<ScanController>,
    log: Arc<dyn EventLog>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl Worker {
    async fn run(self, mut cmd_rx: mpsc::Receiver<SessionCommand>) {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                SessionCommand::ListPorts(reply) => {
                    let _ = reply.send(self.connection.list_ports().await);
                }
                SessionCommand::Connect(config, reply) => {
                    let _ = reply.send(self.connect(config).await);
                }
                SessionCommand::Disconnect(reply) => {
                    let _ = reply.send(self.disconnect().await);
                }
                SessionCommand::Send(request, reply) => {
                    let _ = reply.send(self.dispatcher.send(&request).await);
                }
                SessionCommand::StartScan(request, reply) => {
                    let _ = reply.send(self.scanner.start(request));
                }
                SessionCommand::StopScan(reply) => {
                    let _ = reply.send(self.scanner.stop());
                }
            }
        }
        tracing::debug!("Session command channel closed");
    }

    async fn connect(&self, config: ConnectionConfig) -> SessionResult<()> {
        let port = config.port.clone();
        match self.connection.connect(config).await {
            Ok(()) => {
                self.log
                    .append(LogEntry::new(LogCategory::Success, format!("Connected to {port}")));
                let _ = self
                    .event_tx
                    .send(SessionEvent::StateChanged(self.connection.state()));
                Ok(())
            }
            Err(e) => {
                self.log
                    .append(LogEntry::new(LogCategory::Error, format!("Connection failed: {e}")));
                Err(e)
            }
        }
    }

    async fn disconnect(&self) -> SessionResult<()> {
        if !self.connection.is_connected() {
            return Ok(());
        }

        self.scanner.stop();
        let result = self.connection.disconnect().await;
        self.log.append(LogEntry::new(LogCategory::Info, "Disconnected"));
        let _ = self
            .event_tx
            .send(SessionEvent::StateChanged(ConnectionState::Disconnected));
        result
    }
}
