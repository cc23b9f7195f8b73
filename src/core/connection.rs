//! Connection manager
//!
//! Owns the one [`ConnectionState`] of a session and the transport behind it.
//! The transport sits inside an async mutex, which is the "transport busy"
//! lock: whoever holds it owns the serial line until the call completes.

use super::error::{SessionError, SessionResult};
use super::transport::{ConnectionConfig, TransportClient};
use parking_lot::RwLock;
use std::ops::{Deref, DerefMut};
use tokio::sync::{Mutex, MutexGuard};

/// Connection state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No link
    #[default]
    Disconnected,
    /// Link open with these settings
    Connected(ConnectionConfig),
}

impl ConnectionState {
    /// Check if connected
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

/// Exclusive access to a connected transport
///
/// Holding a `Link` means holding the transport lock; drop it as soon as the
/// call returns so the next caller can proceed.
pub struct Link<'a> {
    guard: MutexGuard<'a, Box<dyn TransportClient>>,
}

impl Deref for Link<'_> {
    type Target = dyn TransportClient;

    fn deref(&self) -> &Self::Target {
        &**self.guard
    }
}

impl DerefMut for Link<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut **self.guard
    }
}

/// Mediates connect/disconnect and hands out [`Link`]s
pub struct ConnectionManager {
    transport: Mutex<Box<dyn TransportClient>>,
    state: RwLock<ConnectionState>,
}

impl ConnectionManager {
    /// Wrap a transport; starts disconnected
    pub fn new(transport: Box<dyn TransportClient>) -> Self {
        Self {
            transport: Mutex::new(transport),
            state: RwLock::new(ConnectionState::Disconnected),
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.state.read().clone()
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.state.read().is_connected()
    }

    /// Open the link
    ///
    /// Waits for any in-flight transport call (including a disconnect) before
    /// looking at the state, so a teardown always completes first.
    pub async fn connect(&self, config: ConnectionConfig) -> SessionResult<()> {
        let mut transport = self.transport.lock().await;
        if self.is_connected() {
            return Err(SessionError::AlreadyConnected);
        }

        config.validate()?;
        transport.connect(&config).await?;
        tracing::info!("Connected: {}", config);
        *self.state.write() = ConnectionState::Connected(config);
        Ok(())
    }

    /// Close the link; succeeds without a transport call when already closed
    ///
    /// The state becomes `Disconnected` even if the transport reports a
    /// teardown failure; that failure is still returned.
    pub async fn disconnect(&self) -> SessionResult<()> {
        let mut transport = self.transport.lock().await;
        if !self.is_connected() {
            return Ok(());
        }

        let result = transport.disconnect().await;
        *self.state.write() = ConnectionState::Disconnected;
        match result {
            Ok(()) => {
                tracing::info!("Disconnected");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Disconnect reported an error: {}", e);
                Err(e.into())
            }
        }
    }

    /// Enumerate ports; allowed in either state
    pub async fn list_ports(&self) -> SessionResult<Vec<String>> {
        let mut transport = self.transport.lock().await;
        Ok(transport.list_ports().await?)
    }

    /// Take the transport lock for one call on a connected link
    ///
    /// The state is checked after the lock is held, so a disconnect that
    /// finished while we waited is always seen.
    pub async fn acquire(&self) -> SessionResult<Link<'_>> {
        let guard = self.transport.lock().await;
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        Ok(Link { guard })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::{MockTransportClient, TransportError};

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("COM3", 9600)
    }

    #[tokio::test]
    async fn test_connect_disconnect() {
        let mut mock = MockTransportClient::new();
        mock.expect_connect().times(1).returning(|_| Ok(()));
        mock.expect_disconnect().times(1).returning(|| Ok(()));

        let manager = ConnectionManager::new(Box::new(mock));
        assert!(!manager.is_connected());

        manager.connect(config()).await.unwrap();
        assert!(manager.is_connected());
        assert_eq!(manager.state(), ConnectionState::Connected(config()));

        manager.disconnect().await.unwrap();
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_connect_twice_rejected() {
        let mut mock = MockTransportClient::new();
        mock.expect_connect().times(1).returning(|_| Ok(()));

        let manager = ConnectionManager::new(Box::new(mock));
        manager.connect(config()).await.unwrap();

        let other = ConnectionConfig::new("COM4", 115200);
        assert_eq!(manager.connect(other).await, Err(SessionError::AlreadyConnected));
        assert_eq!(manager.state(), ConnectionState::Connected(config()));
    }

    #[tokio::test]
    async fn test_connect_rejected_by_transport() {
        let mut mock = MockTransportClient::new();
        mock.expect_connect()
            .times(1)
            .returning(|c| Err(TransportError::PortNotFound(c.port.clone())));

        let manager = ConnectionManager::new(Box::new(mock));
        let err = manager.connect(config()).await.unwrap_err();
        assert_eq!(
            err,
            SessionError::Transport(TransportError::PortNotFound("COM3".to_string()))
        );
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_connect_invalid_config() {
        let mut mock = MockTransportClient::new();
        mock.expect_connect().never();

        let manager = ConnectionManager::new(Box::new(mock));
        let err = manager.connect(ConnectionConfig::new("COM3", 0)).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::InvalidConfiguration(_))
        ));
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_idempotent() {
        let mut mock = MockTransportClient::new();
        mock.expect_disconnect().never();

        let manager = ConnectionManager::new(Box::new(mock));
        assert!(manager.disconnect().await.is_ok());
        assert!(manager.disconnect().await.is_ok());
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_failure_still_disconnects() {
        let mut mock = MockTransportClient::new();
        mock.expect_connect().returning(|_| Ok(()));
        mock.expect_disconnect()
            .times(1)
            .returning(|| Err(TransportError::Io("port vanished".to_string())));

        let manager = ConnectionManager::new(Box::new(mock));
        manager.connect(config()).await.unwrap();
        assert!(manager.disconnect().await.is_err());
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_acquire_requires_connection() {
        let manager = ConnectionManager::new(Box::new(MockTransportClient::new()));
        assert!(matches!(manager.acquire().await, Err(SessionError::NotConnected)));
    }

    #[tokio::test]
    async fn test_list_ports_while_disconnected() {
        let mut mock = MockTransportClient::new();
        mock.expect_list_ports()
            .returning(|| Ok(vec!["COM1".to_string(), "COM3".to_string()]));

        let manager = ConnectionManager::new(Box::new(mock));
        assert_eq!(manager.list_ports().await.unwrap(), vec!["COM1", "COM3"]);
    }
}
