//! In-memory actuator for tests and hardware-less development.
//!
//! Clones share state, so a test can keep one handle while the actuator owns
//! another, flip failure knobs, inspect written frames, and call
//! [`MockTransport::drop_link`] to simulate the actuator walking out of range.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use super::{Peer, Transport, TransportError, TransportResult};
use crate::actuator::SERVICE_UUID;

#[derive(Debug)]
struct MockState {
    service: Uuid,
    address: String,
    present: bool,
    fail_connect: bool,
    fail_write: bool,
    discovery_delay: Duration,
    connected: bool,
    written: Vec<Vec<u8>>,
    discover_calls: usize,
    connect_calls: usize,
    disconnect_calls: usize,
}

/// Simulated actuator transport.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    link: Arc<watch::Sender<bool>>,
}

impl MockTransport {
    /// An actuator in range, advertising the standard service.
    #[must_use]
    pub fn new() -> Self {
        let (link, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(MockState {
                service: SERVICE_UUID,
                address: "F0:0D:C0:DE:FA:01".to_string(),
                present: true,
                fail_connect: false,
                fail_write: false,
                discovery_delay: Duration::ZERO,
                connected: false,
                written: Vec::new(),
                discover_calls: 0,
                connect_calls: 0,
                disconnect_calls: 0,
            })),
            link: Arc::new(link),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advertise `service` instead of the standard one.
    #[must_use]
    pub fn with_service(self, service: Uuid) -> Self {
        self.state().service = service;
        self
    }

    /// Whether the actuator is in range.
    pub fn set_present(&self, present: bool) {
        self.state().present = present;
    }

    /// Make connect attempts fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.state().fail_connect = fail;
    }

    /// Make writes fail.
    pub fn set_fail_write(&self, fail: bool) {
        self.state().fail_write = fail;
    }

    /// How long a scan takes before reporting its result.
    pub fn set_discovery_delay(&self, delay: Duration) {
        self.state().discovery_delay = delay;
    }

    /// Drop the link as if the actuator went out of range.
    pub fn drop_link(&self) {
        self.state().connected = false;
        self.link.send_replace(false);
    }

    /// Whether the simulated link is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Every payload written so far.
    #[must_use]
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state().written.clone()
    }

    /// Number of scans started.
    #[must_use]
    pub fn discover_calls(&self) -> usize {
        self.state().discover_calls
    }

    /// Number of connect attempts.
    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.state().connect_calls
    }

    /// Number of disconnect calls.
    #[must_use]
    pub fn disconnect_calls(&self) -> usize {
        self.state().disconnect_calls
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn discover(&self, service: Uuid) -> TransportResult<Peer> {
        let delay = {
            let mut state = self.state();
            state.discover_calls += 1;
            state.discovery_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let state = self.state();
        if state.present && state.service == service {
            debug!(address = %state.address, "mock actuator discovered");
            Ok(Peer {
                address: state.address.clone(),
                name: Some("gaitcue-actuator".to_string()),
            })
        } else {
            Err(TransportError::DeviceNotFound { service })
        }
    }

    async fn connect(
        &self,
        peer: &Peer,
        service: Uuid,
        _characteristic: Uuid,
    ) -> TransportResult<()> {
        {
            let mut state = self.state();
            state.connect_calls += 1;
            if state.fail_connect {
                return Err(TransportError::ConnectFailed {
                    address: peer.address.clone(),
                    message: "simulated connect failure".to_string(),
                });
            }
            if state.service != service {
                return Err(TransportError::ServiceNotFound { uuid: service });
            }
            state.connected = true;
        }
        self.link.send_replace(true);
        Ok(())
    }

    async fn write(&self, payload: &[u8]) -> TransportResult<()> {
        let mut state = self.state();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.fail_write {
            return Err(TransportError::WriteFailed {
                message: "simulated write failure".to_string(),
            });
        }
        state.written.push(payload.to_vec());
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        {
            let mut state = self.state();
            state.disconnect_calls += 1;
            state.connected = false;
        }
        self.link.send_replace(false);
        Ok(())
    }

    async fn link_lost(&self) {
        let mut link = self.link.subscribe();
        if link.wait_for(|up| !*up).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
