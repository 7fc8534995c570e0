//! The assembled device.
//!
//! [`GaitDevice`] wires the event bus, the actuator, the deferred-job queue,
//! the button watcher and the system monitor together, and owns their
//! lifetimes. Applications talk to it from any thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::actuator::{Actuator, ActuatorCommand, ActuatorError, ConnectionState};
use crate::config::{Config, ReconnectPolicy};
use crate::error::Result;
use crate::events::{Event, EventBus, EventKind, SubscriptionId};
use crate::hardware::{ButtonWatcher, Hardware};
use crate::indicators::{LedIndicators, StatusIndicators};
use crate::jobs::{DeferredJob, JobQueue};
use crate::monitor::{MonitorHandle, SystemMonitor};
use crate::transport::Transport;
use crate::types::DeviceStatus;

/// A running gait-cueing device.
///
/// Nothing connects on its own at start-up: call [`GaitDevice::couple`]
/// once. After that every disconnect is followed by a recouple on the next
/// monitor cycle, unless the reconnect policy is `disabled`.
pub struct GaitDevice {
    bus: Arc<EventBus>,
    actuator: Arc<Actuator>,
    jobs: Arc<JobQueue>,
    status: Arc<RwLock<DeviceStatus>>,
    monitor: MonitorHandle,
    button: Option<ButtonWatcher>,
    recouple_subscription: SubscriptionId,
    done: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl GaitDevice {
    /// Start the device: I/O worker, monitor thread and, if fitted, the
    /// button watcher.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be started.
    pub fn new(config: &Config, transport: Arc<dyn Transport>, hardware: Hardware) -> Result<Self> {
        let indicators = Arc::new(LedIndicators::new(hardware.leds.clone()));
        Self::with_indicators(config, transport, hardware, indicators)
    }

    /// Like [`GaitDevice::new`], showing status on `indicators` instead of
    /// the board LEDs.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be started.
    pub fn with_indicators(
        config: &Config,
        transport: Arc<dyn Transport>,
        hardware: Hardware,
        indicators: Arc<dyn StatusIndicators>,
    ) -> Result<Self> {
        let bus = Arc::new(EventBus::new());
        let jobs = Arc::new(JobQueue::new());
        let done = Arc::new(AtomicBool::new(false));

        let actuator = Arc::new(Actuator::new(
            config.actuator.clone(),
            transport,
            Arc::clone(&bus),
        )?);

        let recouple_subscription = {
            let policy = config.reconnect.policy;
            let jobs = Arc::clone(&jobs);
            let done = Arc::clone(&done);
            bus.subscribe(EventKind::BleDisconnected, move |event| {
                if done.load(Ordering::SeqCst) || policy == ReconnectPolicy::Disabled {
                    return;
                }
                if let Event::BleDisconnected { reason } = event {
                    debug!(?reason, "scheduling actuator recouple");
                }
                jobs.arm(DeferredJob::RECOUPLE_ACTUATOR);
            })
        };

        let monitor = SystemMonitor::new(
            Arc::clone(&actuator),
            hardware.charger,
            hardware.power_good,
            indicators,
            Arc::clone(&bus),
            Arc::clone(&jobs),
            &config.battery,
        );
        let status = monitor.status_handle();
        let monitor = monitor.spawn(config.monitor.poll_interval())?;

        let button = hardware
            .button
            .map(|input| ButtonWatcher::spawn(input, Arc::clone(&bus)))
            .transpose()?;

        info!(
            reconnect = ?config.reconnect.policy,
            button = button.is_some(),
            "device started"
        );
        Ok(Self {
            bus,
            actuator,
            jobs,
            status,
            monitor,
            button,
            recouple_subscription,
            done,
            closed: AtomicBool::new(false),
        })
    }

    /// Start connecting to the actuator.
    ///
    /// # Errors
    ///
    /// See [`Actuator::couple`].
    pub fn couple(&self) -> std::result::Result<(), ActuatorError> {
        self.actuator.couple()
    }

    /// Disconnect from the actuator.
    ///
    /// The disconnect counts like any other, so with the default policy the
    /// actuator is recoupled on the next monitor cycle.
    ///
    /// # Errors
    ///
    /// See [`Actuator::decouple`].
    pub fn decouple(&self) -> std::result::Result<(), ActuatorError> {
        self.actuator.decouple()
    }

    /// Send a command to the actuator.
    ///
    /// # Errors
    ///
    /// See [`Actuator::send`].
    pub fn send(&self, command: &ActuatorCommand) -> std::result::Result<(), ActuatorError> {
        self.actuator.send(command)
    }

    /// Current actuator link state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.actuator.connection_state()
    }

    /// Register `handler` for events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, handler)
    }

    /// The device's event bus.
    #[must_use]
    pub const fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Latest status published by the monitor.
    #[must_use]
    pub fn status(&self) -> DeviceStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Deferred jobs waiting for the next monitor cycle.
    #[must_use]
    pub fn pending_jobs(&self) -> DeferredJob {
        self.jobs.pending()
    }

    /// `true` once [`GaitDevice::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Shut everything down.
    ///
    /// Stops the monitor and button threads, decouples once if connected and
    /// returns after the I/O worker has exited. Idempotent; also run on drop.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("closing device");
        self.done.store(true, Ordering::SeqCst);

        self.monitor.stop();
        if let Some(button) = &self.button {
            button.stop();
        }

        self.actuator.begin_shutdown();
        if self.actuator.connection_state() == ConnectionState::Connected {
            if let Err(e) = self.actuator.decouple() {
                warn!(error = %e, "decouple during close failed");
            }
        }
        self.actuator.shutdown();
        self.bus.unsubscribe(self.recouple_subscription);
        info!("device closed");
    }
}

impl Drop for GaitDevice {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for GaitDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaitDevice")
            .field("connection", &self.connection_state())
            .field("pending_jobs", &self.pending_jobs())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
