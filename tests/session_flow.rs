//! End-to-end session tests against the simulated device

use regprobe_core::core::transport::TransportCall;
use regprobe_core::{
    CommandRequest, ConnectionConfig, DeviceProfile, LogCategory, LogFormat, Logger,
    RegisterOutcome, ScanHandle, ScanRequest, ScanSettings, ScanStart, ScanState, Session,
    SessionError, SessionEvent, SessionLogger, SimulatedDevice,
};
use std::sync::Arc;
use tempfile::TempDir;

type History = Arc<parking_lot::Mutex<Vec<TransportCall>>>;

fn demo_session() -> (Session, Logger, History) {
    session_with(DeviceProfile::demo(), SessionLogger::new())
}

fn session_with(profile: DeviceProfile, logger: SessionLogger) -> (Session, Logger, History) {
    let device = SimulatedDevice::new(profile).unwrap();
    let history = device.history();
    let logger = logger.shared();
    let session = Session::new(Box::new(device), logger.clone(), ScanSettings::default());
    (session, logger, history)
}

fn started(start: Result<ScanStart, SessionError>) -> ScanHandle {
    match start.unwrap() {
        ScanStart::Started(handle) => handle,
        ScanStart::CancelRequested => panic!("expected a new scan"),
    }
}

fn texts(logger: &Logger) -> Vec<String> {
    logger.lock().entries().into_iter().map(|e| e.text).collect()
}

fn read_addresses(history: &History) -> Vec<u16> {
    history
        .lock()
        .iter()
        .filter_map(|call| match call {
            TransportCall::ReadRegister { address, .. } => Some(*address),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_send_then_scan() {
    let (session, logger, history) = demo_session();
    session.connect(ConnectionConfig::new("SIM0", 9600)).await.unwrap();

    let reply = session.send(CommandRequest::new("01 03 00 00 00 01", true)).await;
    assert_eq!(reply.transmitted.as_deref(), Some("01 03 00 00 00 01 84 0A"));
    assert_eq!(reply.received.as_deref(), Some("01 03 02 00 E6 B8 1A"));
    assert!(reply.checksum_valid);

    let handle = started(session.start_scan(ScanRequest::new(1, 0, 6)).await);
    let report = handle.wait().await.unwrap();

    assert_eq!(report.state, ScanState::Completed);
    assert!(!report.session.running);
    assert_eq!(
        report.outcomes,
        vec![
            RegisterOutcome::ok(0, 230),
            RegisterOutcome::ok(1, 50),
            RegisterOutcome::ok(2, 0x1234),
            RegisterOutcome::NoResponse { address: 3 },
            RegisterOutcome::NoResponse { address: 4 },
            RegisterOutcome::DeviceError {
                address: 5,
                message: "Illegal Data Address".to_string(),
            },
        ]
    );
    assert_eq!(read_addresses(&history), vec![0, 1, 2, 3, 4, 5]);

    assert_eq!(
        texts(&logger),
        vec![
            "Connected to SIM0",
            "TX: 01 03 00 00 00 01 84 0A",
            "RX: 01 03 02 00 E6 B8 1A [CRC OK]",
            "Reg 0: 230 (0x00E6)",
            "Reg 1: 50 (0x0032)",
            "Reg 2: 4660 (0x1234)",
            "Reg 5: Error (Illegal Data Address)",
        ]
    );

    session.disconnect().await.unwrap();
    assert_eq!(history.lock().last(), Some(&TransportCall::Disconnect));
}

#[tokio::test(start_paused = true)]
async fn test_input_registers_by_function_code() {
    let (session, _logger, _history) = demo_session();
    session.connect(ConnectionConfig::new("SIM0", 9600)).await.unwrap();

    let handle = started(
        session
            .start_scan(ScanRequest::new(1, 0, 1).function_code(4))
            .await,
    );
    let report = handle.wait().await.unwrap();
    assert_eq!(report.outcomes, vec![RegisterOutcome::ok(0, 21)]);
}

#[tokio::test(start_paused = true)]
async fn test_link_failure_faults_scan() {
    let (session, logger, history) =
        session_with(DeviceProfile::demo().fail_after(3), SessionLogger::new());
    session.connect(ConnectionConfig::new("SIM0", 9600)).await.unwrap();

    let handle = started(session.start_scan(ScanRequest::new(1, 0, 10)).await);
    let report = handle.wait().await.unwrap();

    assert_eq!(report.state, ScanState::Faulted);
    assert_eq!(report.outcomes.len(), 4);
    assert!(report.outcomes[3].is_fatal());
    assert_eq!(read_addresses(&history), vec![0, 1, 2, 3]);
    assert_eq!(
        texts(&logger).last().map(String::as_str),
        Some("Scan Error: I/O error: device disconnected")
    );
}

#[tokio::test(start_paused = true)]
async fn test_toggle_cancels_running_scan() {
    let (session, _logger, history) = demo_session();
    session.connect(ConnectionConfig::new("SIM0", 9600)).await.unwrap();
    let mut events = session.subscribe();

    let handle = started(session.start_scan(ScanRequest::new(1, 0, 100)).await);
    tokio::time::sleep(std::time::Duration::from_millis(120)).await;

    assert!(matches!(
        session.start_scan(ScanRequest::new(1, 0, 100)).await,
        Ok(ScanStart::CancelRequested)
    ));

    let id = handle.id();
    let report = handle.wait().await.unwrap();
    assert_eq!(report.state, ScanState::Cancelled);
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(read_addresses(&history), vec![0, 1, 2]);

    let mut outcome_events = 0;
    loop {
        match events.recv().await.unwrap() {
            SessionEvent::ScanOutcome(_) => outcome_events += 1,
            SessionEvent::ScanFinished { id: finished, state } => {
                assert_eq!(finished, id);
                assert_eq!(state, ScanState::Cancelled);
                break;
            }
            SessionEvent::StateChanged(_) => {}
        }
    }
    assert_eq!(outcome_events, 3);

    // the next toggle starts fresh
    let next = started(session.start_scan(ScanRequest::new(1, 0, 1)).await);
    assert_eq!(next.wait().await.unwrap().state, ScanState::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_command_during_scan_shares_link() {
    let (session, _logger, history) = demo_session();
    session.connect(ConnectionConfig::new("SIM0", 9600)).await.unwrap();

    let handle = started(session.start_scan(ScanRequest::new(1, 0, 5)).await);
    let reply = session.send(CommandRequest::new("0103 0000 0001", true)).await;
    assert!(reply.is_ok());

    let report = handle.wait().await.unwrap();
    assert_eq!(report.state, ScanState::Completed);
    assert_eq!(report.outcomes.len(), 5);
    assert_eq!(read_addresses(&history), vec![0, 1, 2, 3, 4]);

    let frames = history
        .lock()
        .iter()
        .filter(|call| matches!(call, TransportCall::SendFrame(_)))
        .count();
    assert_eq!(frames, 1);
}

#[tokio::test]
async fn test_rejections_before_transport() {
    let (session, logger, history) = demo_session();

    let reply = session.send(CommandRequest::new("0103", true)).await;
    assert_eq!(reply.error.as_deref(), Some("Not connected"));
    assert_eq!(reply.failure, Some(SessionError::NotConnected));
    assert!(matches!(
        session.start_scan(ScanRequest::new(1, 0, 10)).await,
        Err(SessionError::NotConnected)
    ));

    let err = session.connect(ConnectionConfig::new("COM9", 9600)).await.unwrap_err();
    assert_eq!(err.to_string(), "Port not found: COM9");
    assert!(!session.is_connected());

    session.connect(ConnectionConfig::new("SIM0", 9600)).await.unwrap();
    assert!(matches!(
        session.connect(ConnectionConfig::new("SIM0", 9600)).await,
        Err(SessionError::AlreadyConnected)
    ));
    assert!(matches!(
        session.start_scan(ScanRequest::new(1, 65_000, 1_000)).await,
        Err(SessionError::InvalidScan(_))
    ));

    let calls = history.lock().clone();
    assert_eq!(
        calls,
        vec![
            TransportCall::Connect("COM9".to_string()),
            TransportCall::Connect("SIM0".to_string()),
        ]
    );

    let entries = logger.lock().entries();
    assert_eq!(entries[0].category, LogCategory::Error);
    assert_eq!(entries[0].text, "Error: Not connected");
    assert_eq!(entries[1].text, "Connection failed: Port not found: COM9");
}

#[tokio::test]
async fn test_oversized_scan_leaves_session_usable() {
    let (session, _logger, history) = demo_session();
    session.connect(ConnectionConfig::new("SIM0", 9600)).await.unwrap();

    assert!(matches!(
        session.start_scan(ScanRequest::new(1, 1, u32::MAX)).await,
        Err(SessionError::InvalidScan(_))
    ));
    assert_eq!(session.scan_state(), ScanState::Idle);
    assert_eq!(session.list_ports().await.unwrap().len(), 2);
    assert!(read_addresses(&history).is_empty());

    let reply = session.send(CommandRequest::new("01 03 00 00 00 01", true)).await;
    assert!(reply.is_ok());
}

#[tokio::test]
async fn test_list_ports_in_either_state() {
    let (session, _logger, _history) = demo_session();
    assert_eq!(session.list_ports().await.unwrap(), vec!["SIM0", "COM1"]);

    session.connect(ConnectionConfig::new("COM1", 19200)).await.unwrap();
    assert_eq!(session.list_ports().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_event_log_mirrored_to_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.log");

    let mut logger = SessionLogger::new();
    logger.start(&path, LogFormat::Text).unwrap();
    let (session, logger, _history) = session_with(DeviceProfile::demo(), logger);

    session.connect(ConnectionConfig::new("SIM0", 9600)).await.unwrap();
    session.send(CommandRequest::new("01 03 00 00 00 01", false)).await;
    session.disconnect().await.unwrap();
    logger.lock().flush();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].contains("OK") && lines[0].ends_with("Connected to SIM0"));
    assert!(lines[1].ends_with("TX: 01 03 00 00 00 01"));
    assert!(lines[2].ends_with("RX: 01 03 02 00 E6 B8 1A [CRC OK]"));
    assert!(lines[3].ends_with("Disconnected"));
}
