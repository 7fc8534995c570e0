//! Vibration actuator reached over BLE.
//!
//! [`Actuator`] owns the link state machine and an [`IoBridge`] worker. The
//! synchronous operations check the state, then hand the transport work to
//! the worker:
//!
//! - [`Actuator::couple`] returns as soon as discovery is queued
//! - [`Actuator::decouple`] and [`Actuator::send`] block until the worker is
//!   done with them
//!
//! Transport failures never reach the caller. They are logged and end in
//! [`ConnectionState::Disconnected`], which the device layer turns into a
//! recouple.

pub mod bridge;
pub mod command;
pub mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use bridge::{BridgeError, Completion, IoBridge};
pub use command::{ActuatorCommand, CommandError, MotorMask, PulsePattern, TimerDirective};
pub use state::{ConnectionState, ConnectionStateMachine, DisconnectReason};

use crate::config::ActuatorConfig;
use crate::events::EventBus;
use crate::transport::{Transport, TransportError};

/// Service advertised by the actuator unit.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_fa01_0000_1000_8000_0080_5f9b_34fb);

/// Characteristic commands are written to.
pub const CONTROL_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000_fa61_0000_1000_8000_0080_5f9b_34fb);

/// Errors returned by actuator operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActuatorError {
    /// The operation is not valid in the current link state.
    #[error("cannot {operation} while {state}")]
    Inadequate {
        /// Rejected operation.
        operation: &'static str,
        /// State at the time of the call.
        state: ConnectionState,
    },

    /// The I/O worker is gone.
    #[error("actuator I/O worker has stopped")]
    WorkerStopped,

    /// The I/O worker could not be started.
    #[error("failed to start actuator I/O worker: {message}")]
    WorkerStart {
        /// Underlying cause.
        message: String,
    },

    /// The command could not be built.
    #[error(transparent)]
    Command(#[from] CommandError),
}

impl From<BridgeError> for ActuatorError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::StartFailed { message } => Self::WorkerStart { message },
            BridgeError::Stopped | BridgeError::TaskAbandoned => Self::WorkerStopped,
        }
    }
}

/// State shared between the caller side and worker tasks.
struct Link {
    state: ConnectionStateMachine,
    transport: Arc<dyn Transport>,
    config: ActuatorConfig,
    watcher: Mutex<Option<AbortHandle>>,
    closing: AtomicBool,
}

impl Link {
    async fn discover_and_connect(self: Arc<Self>) {
        if self.closing.load(Ordering::SeqCst) {
            self.fail_discovery(DisconnectReason::Requested);
            return;
        }
        let service = self.config.service_uuid;
        let timeout = self.config.discovery_timeout();

        let peer = match tokio::time::timeout(timeout, self.transport.discover(service)).await {
            Ok(Ok(peer)) => peer,
            Ok(Err(e)) => {
                warn!(error = %e, "actuator discovery failed");
                let reason = match e {
                    TransportError::DeviceNotFound { .. } | TransportError::DiscoveryTimeout { .. } => {
                        DisconnectReason::NotFound
                    }
                    _ => DisconnectReason::ConnectFailed,
                };
                self.fail_discovery(reason);
                return;
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.discovery_timeout_secs,
                    "actuator not found before discovery timed out"
                );
                self.fail_discovery(DisconnectReason::NotFound);
                return;
            }
        };

        if let Err(e) = self
            .transport
            .connect(&peer, service, self.config.control_uuid)
            .await
        {
            warn!(address = %peer.address, error = %e, "actuator connect failed");
            self.fail_discovery(DisconnectReason::ConnectFailed);
            return;
        }
        if self.closing.load(Ordering::SeqCst) {
            debug!("shutting down, dropping the new link");
            let _ = self.transport.disconnect().await;
            self.fail_discovery(DisconnectReason::Requested);
            return;
        }

        if self.state.transition_from(
            ConnectionState::Discovering,
            ConnectionState::Connected,
            None,
        ) {
            if self.closing.load(Ordering::SeqCst) {
                // Shutdown began after the check above; close may already
                // have seen Disconnected and skipped its decouple.
                debug!("shutting down, dropping the new link");
                let _ = self.transport.disconnect().await;
                self.state.transition_from(
                    ConnectionState::Connected,
                    ConnectionState::Disconnected,
                    Some(DisconnectReason::Requested),
                );
                return;
            }
            info!(address = %peer.address, name = ?peer.name, "actuator coupled");
            Arc::clone(&self).watch_link();
        } else {
            debug!("link state moved during connect, dropping the new link");
            let _ = self.transport.disconnect().await;
        }
    }

    fn fail_discovery(&self, reason: DisconnectReason) {
        self.state.transition_from(
            ConnectionState::Discovering,
            ConnectionState::Disconnected,
            Some(reason),
        );
    }

    /// Spawn the watcher that turns an unsolicited drop into a transition.
    /// Must run on the worker runtime.
    fn watch_link(self: Arc<Self>) {
        let link = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            link.transport.link_lost().await;
            if link.state.transition_from(
                ConnectionState::Connected,
                ConnectionState::Disconnected,
                Some(DisconnectReason::LinkLost),
            ) {
                warn!("actuator link lost");
            }
        });
        let previous = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle.abort_handle());
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn stop_watching(&self) {
        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(watcher) = watcher {
            watcher.abort();
        }
    }

    async fn disconnect(self: Arc<Self>) {
        self.stop_watching();
        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "actuator disconnect failed");
        }
    }

    async fn write(self: Arc<Self>, frame: Vec<u8>) {
        if self.state.current() != ConnectionState::Connected {
            debug!("link went down before the write, dropping command");
            return;
        }
        let Err(e) = self.transport.write(&frame).await else {
            debug!(code = ?frame.first(), "command written");
            return;
        };

        warn!(error = %e, "actuator write failed, tearing link down");
        self.stop_watching();
        if let Err(e) = self.transport.disconnect().await {
            debug!(error = %e, "disconnect after failed write");
        }
        self.state.transition_from(
            ConnectionState::Connected,
            ConnectionState::Disconnected,
            Some(DisconnectReason::WriteFailed),
        );
    }
}

/// The actuator unit and its connection.
pub struct Actuator {
    link: Arc<Link>,
    bridge: IoBridge,
}

impl Actuator {
    /// Start the I/O worker; the link starts out disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`ActuatorError::WorkerStart`] if the worker cannot be started.
    pub fn new(
        config: ActuatorConfig,
        transport: Arc<dyn Transport>,
        bus: Arc<EventBus>,
    ) -> Result<Self, ActuatorError> {
        let bridge = IoBridge::start("gaitcue-actuator-io")?;
        Ok(Self {
            link: Arc::new(Link {
                state: ConnectionStateMachine::new(bus),
                transport,
                config,
                watcher: Mutex::new(None),
                closing: AtomicBool::new(false),
            }),
            bridge,
        })
    }

    /// Current link state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.link.state.current()
    }

    /// Start discovery and connection in the background.
    ///
    /// Moves the link to Discovering and returns once the work is queued;
    /// the outcome arrives as `BleConnected` or `BleDisconnected`.
    ///
    /// # Errors
    ///
    /// [`ActuatorError::Inadequate`] unless disconnected, with nothing
    /// changed. [`ActuatorError::WorkerStopped`] if the worker is gone, in
    /// which case the link falls back to Disconnected.
    pub fn couple(&self) -> Result<(), ActuatorError> {
        if !self.link.state.transition_from(
            ConnectionState::Disconnected,
            ConnectionState::Discovering,
            None,
        ) {
            return Err(ActuatorError::Inadequate {
                operation: "couple",
                state: self.connection_state(),
            });
        }

        let link = Arc::clone(&self.link);
        if let Err(e) = self.bridge.spawn(link.discover_and_connect()) {
            self.link.fail_discovery(DisconnectReason::WorkerStopped);
            return Err(e.into());
        }
        Ok(())
    }

    /// Tear the link down and wait for the transport to finish.
    ///
    /// The link ends up Disconnected whether or not the transport call
    /// succeeded.
    ///
    /// # Errors
    ///
    /// [`ActuatorError::Inadequate`] unless connected.
    /// [`ActuatorError::WorkerStopped`] if the worker was gone; the state is
    /// still moved to Disconnected.
    pub fn decouple(&self) -> Result<(), ActuatorError> {
        let state = self.connection_state();
        if state != ConnectionState::Connected {
            return Err(ActuatorError::Inadequate {
                operation: "decouple",
                state,
            });
        }

        let outcome = self.bridge.execute(Arc::clone(&self.link).disconnect());
        self.link.state.transition_from(
            ConnectionState::Connected,
            ConnectionState::Disconnected,
            Some(DisconnectReason::Requested),
        );
        outcome.map(|_| ()).map_err(ActuatorError::from)
    }

    /// Write `command` to the control characteristic and wait for the write.
    ///
    /// A failed write is not returned: it drops the link, which shows up as
    /// `BleDisconnected`.
    ///
    /// # Errors
    ///
    /// [`ActuatorError::Inadequate`] unless connected; nothing is written.
    /// [`ActuatorError::WorkerStopped`] if the worker is gone.
    pub fn send(&self, command: &ActuatorCommand) -> Result<(), ActuatorError> {
        let state = self.connection_state();
        if state != ConnectionState::Connected {
            return Err(ActuatorError::Inadequate {
                operation: "send",
                state,
            });
        }

        let frame = command.encode();
        match self.bridge.execute(Arc::clone(&self.link).write(frame))? {
            Completion::Finished(()) => {}
            Completion::Scheduled => debug!("send issued from the I/O worker, queued"),
        }
        Ok(())
    }

    /// Whether the I/O worker still accepts work.
    #[must_use]
    pub fn is_worker_running(&self) -> bool {
        self.bridge.is_running()
    }

    /// Mark the actuator as closing without stopping the worker.
    ///
    /// From here on a discovery still queued or in flight ends Disconnected
    /// rather than Connected, so a caller that checks for Connected after
    /// this returns sees every link it has to take down.
    pub fn begin_shutdown(&self) {
        self.link.closing.store(true, Ordering::SeqCst);
    }

    /// Whether [`Actuator::begin_shutdown`] has run.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.link.closing.load(Ordering::SeqCst)
    }

    /// Stop the I/O worker after queued work finishes. Idempotent.
    ///
    /// Implies [`Actuator::begin_shutdown`].
    pub fn shutdown(&self) {
        self.begin_shutdown();
        self.bridge.shutdown();
    }
}

impl std::fmt::Debug for Actuator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actuator")
            .field("state", &self.connection_state())
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventKind};
    use crate::transport::MockTransport;
    use std::time::{Duration, Instant};

    fn actuator(mock: &MockTransport) -> (Actuator, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        let config = ActuatorConfig {
            discovery_timeout_secs: 0.2,
            ..ActuatorConfig::default()
        };
        let actuator =
            Actuator::new(config, Arc::new(mock.clone()), Arc::clone(&bus)).unwrap();
        (actuator, bus)
    }

    fn wait_for(actuator: &Actuator, state: ConnectionState) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while actuator.connection_state() != state {
            assert!(Instant::now() < deadline, "timed out waiting for {state}");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn record(bus: &EventBus) -> Arc<Mutex<Vec<Event>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in EventKind::ALL {
            let seen = Arc::clone(&seen);
            bus.subscribe(kind, move |event| seen.lock().unwrap().push(event.clone()));
        }
        seen
    }

    #[test]
    fn test_couple_connects() {
        let mock = MockTransport::new();
        let (actuator, bus) = actuator(&mock);
        let seen = record(&bus);

        actuator.couple().unwrap();
        wait_for(&actuator, ConnectionState::Connected);

        assert!(mock.is_connected());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Event::BleDiscovering, Event::BleConnected]
        );
    }

    #[test]
    fn test_couple_twice_is_inadequate() {
        let mock = MockTransport::new();
        mock.set_discovery_delay(Duration::from_millis(50));
        let (actuator, _bus) = actuator(&mock);

        actuator.couple().unwrap();
        assert_eq!(
            actuator.couple(),
            Err(ActuatorError::Inadequate {
                operation: "couple",
                state: ConnectionState::Discovering,
            })
        );
        wait_for(&actuator, ConnectionState::Connected);
        assert!(actuator.couple().is_err());
        assert_eq!(mock.discover_calls(), 1);
    }

    #[test]
    fn test_absent_actuator_ends_disconnected() {
        let mock = MockTransport::new();
        mock.set_present(false);
        let (actuator, bus) = actuator(&mock);
        let seen = record(&bus);

        actuator.couple().unwrap();
        wait_for(&actuator, ConnectionState::Disconnected);
        assert_eq!(
            seen.lock().unwrap().last(),
            Some(&Event::BleDisconnected {
                reason: DisconnectReason::NotFound
            })
        );
    }

    #[test]
    fn test_discovery_timeout_means_not_found() {
        let mock = MockTransport::new();
        mock.set_discovery_delay(Duration::from_secs(5));
        let (actuator, bus) = actuator(&mock);
        let seen = record(&bus);

        let started = Instant::now();
        actuator.couple().unwrap();
        wait_for(&actuator, ConnectionState::Disconnected);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(
            seen.lock().unwrap().last(),
            Some(&Event::BleDisconnected {
                reason: DisconnectReason::NotFound
            })
        );
        assert_eq!(mock.connect_calls(), 0);
    }

    #[test]
    fn test_connect_failure() {
        let mock = MockTransport::new();
        mock.set_fail_connect(true);
        let (actuator, bus) = actuator(&mock);
        let seen = record(&bus);

        actuator.couple().unwrap();
        wait_for(&actuator, ConnectionState::Disconnected);
        assert_eq!(
            seen.lock().unwrap().last(),
            Some(&Event::BleDisconnected {
                reason: DisconnectReason::ConnectFailed
            })
        );
    }

    #[test]
    fn test_send_writes_encoded_frame() {
        let mock = MockTransport::new();
        let (actuator, _bus) = actuator(&mock);
        actuator.couple().unwrap();
        wait_for(&actuator, ConnectionState::Connected);

        actuator.send(&ActuatorCommand::Stop).unwrap();
        assert_eq!(mock.written(), vec![vec![0x02]]);
    }

    #[test]
    fn test_send_while_disconnected_writes_nothing() {
        let mock = MockTransport::new();
        let (actuator, _bus) = actuator(&mock);

        assert_eq!(
            actuator.send(&ActuatorCommand::Stop),
            Err(ActuatorError::Inadequate {
                operation: "send",
                state: ConnectionState::Disconnected,
            })
        );
        assert!(mock.written().is_empty());
    }

    #[test]
    fn test_failed_write_drops_link() {
        let mock = MockTransport::new();
        let (actuator, bus) = actuator(&mock);
        let seen = record(&bus);
        actuator.couple().unwrap();
        wait_for(&actuator, ConnectionState::Connected);

        mock.set_fail_write(true);
        assert_eq!(actuator.send(&ActuatorCommand::Stop), Ok(()));
        assert_eq!(actuator.connection_state(), ConnectionState::Disconnected);
        assert_eq!(
            seen.lock().unwrap().last(),
            Some(&Event::BleDisconnected {
                reason: DisconnectReason::WriteFailed
            })
        );
    }

    #[test]
    fn test_decouple() {
        let mock = MockTransport::new();
        let (actuator, bus) = actuator(&mock);
        let seen = record(&bus);

        assert!(matches!(
            actuator.decouple(),
            Err(ActuatorError::Inadequate { .. })
        ));

        actuator.couple().unwrap();
        wait_for(&actuator, ConnectionState::Connected);
        actuator.decouple().unwrap();

        assert_eq!(actuator.connection_state(), ConnectionState::Disconnected);
        assert_eq!(mock.disconnect_calls(), 1);
        assert_eq!(
            seen.lock().unwrap().last(),
            Some(&Event::BleDisconnected {
                reason: DisconnectReason::Requested
            })
        );
        // The watcher was stopped, so no second event follows.
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_link_loss_is_noticed() {
        let mock = MockTransport::new();
        let (actuator, bus) = actuator(&mock);
        let seen = record(&bus);
        actuator.couple().unwrap();
        wait_for(&actuator, ConnectionState::Connected);

        mock.drop_link();
        wait_for(&actuator, ConnectionState::Disconnected);
        assert_eq!(
            seen.lock().unwrap().last(),
            Some(&Event::BleDisconnected {
                reason: DisconnectReason::LinkLost
            })
        );
    }

    #[test]
    fn test_couple_after_shutdown() {
        let mock = MockTransport::new();
        let (actuator, bus) = actuator(&mock);
        let seen = record(&bus);
        actuator.shutdown();

        assert_eq!(actuator.couple(), Err(ActuatorError::WorkerStopped));
        assert_eq!(actuator.connection_state(), ConnectionState::Disconnected);
        assert_eq!(
            seen.lock().unwrap().last(),
            Some(&Event::BleDisconnected {
                reason: DisconnectReason::WorkerStopped
            })
        );
    }

    #[test]
    fn test_discovery_in_flight_at_begin_shutdown_leaves_no_link() {
        let mock = MockTransport::new();
        mock.set_discovery_delay(Duration::from_millis(50));
        let (actuator, bus) = actuator(&mock);
        let seen = record(&bus);

        actuator.couple().unwrap();
        actuator.begin_shutdown();
        assert!(actuator.is_closing());
        wait_for(&actuator, ConnectionState::Disconnected);

        // The worker keeps running until shutdown; only the link is refused.
        assert!(actuator.is_worker_running());
        assert!(!mock.is_connected());
        assert_eq!(
            seen.lock().unwrap().last(),
            Some(&Event::BleDisconnected {
                reason: DisconnectReason::Requested
            })
        );
        actuator.shutdown();
    }

    #[test]
    fn test_uuids() {
        assert_eq!(
            SERVICE_UUID.to_string(),
            "0000fa01-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            CONTROL_CHARACTERISTIC_UUID.to_string(),
            "0000fa61-0000-1000-8000-00805f9b34fb"
        );
    }
}
