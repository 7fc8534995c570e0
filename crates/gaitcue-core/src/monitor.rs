//! Periodic system monitor.
//!
//! Every cycle polls the charger, the power-good pin and the actuator link,
//! acts on whatever changed since the previous cycle (events, indicators,
//! battery estimate), publishes a [`DeviceStatus`] and runs the deferred
//! jobs. A failed hardware read skips the status part of that one cycle;
//! deferred jobs still run.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::actuator::{Actuator, ActuatorError, ConnectionState};
use crate::battery::{BatteryLevel, BatteryLevelEstimator};
use crate::config::BatteryConfig;
use crate::events::{Event, EventBus};
use crate::hardware::{Charger, HardwareResult, InputPin};
use crate::indicators::StatusIndicators;
use crate::jobs::{DeferredJob, JobQueue};
use crate::temperature::TemperatureRating;
use crate::types::{BatStatus, ChgStatus, DcStatus, DeviceStatus};

/// Last value seen of every watched status, used only to detect change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Battery flags.
    pub bat: Option<BatStatus>,
    /// Charger phase.
    pub chg: Option<ChgStatus>,
    /// DC input state.
    pub dc: Option<DcStatus>,
    /// Combined temperature.
    pub temperature: Option<TemperatureRating>,
    /// Power-good level.
    pub power_good: Option<bool>,
    /// Battery level.
    pub battery_level: Option<BatteryLevel>,
    /// Actuator link state.
    pub connection: Option<ConnectionState>,
}

/// One cycle's hardware readings.
#[derive(Debug, Clone, Copy)]
struct Reading {
    bat: BatStatus,
    chg: ChgStatus,
    dc: DcStatus,
    charger_temp: Option<TemperatureRating>,
    battery_temp: Option<TemperatureRating>,
    power_good: Option<bool>,
}

/// The monitor's state. Drive it with [`SystemMonitor::cycle`] or move it
/// onto its own thread with [`SystemMonitor::spawn`].
pub struct SystemMonitor {
    actuator: Arc<Actuator>,
    charger: Arc<dyn Charger>,
    power_good: Option<Arc<dyn InputPin>>,
    indicators: Arc<dyn StatusIndicators>,
    bus: Arc<EventBus>,
    jobs: Arc<JobQueue>,
    estimator: BatteryLevelEstimator,
    snapshot: StatusSnapshot,
    status: Arc<RwLock<DeviceStatus>>,
}

impl SystemMonitor {
    /// A monitor that has not yet observed anything.
    #[must_use]
    pub fn new(
        actuator: Arc<Actuator>,
        charger: Arc<dyn Charger>,
        power_good: Option<Arc<dyn InputPin>>,
        indicators: Arc<dyn StatusIndicators>,
        bus: Arc<EventBus>,
        jobs: Arc<JobQueue>,
        battery: &BatteryConfig,
    ) -> Self {
        Self {
            actuator,
            charger,
            power_good,
            indicators,
            bus,
            jobs,
            estimator: BatteryLevelEstimator::new(battery, Instant::now()),
            snapshot: StatusSnapshot::default(),
            status: Arc::new(RwLock::new(DeviceStatus::default())),
        }
    }

    /// Shared handle on the published status.
    #[must_use]
    pub fn status_handle(&self) -> Arc<RwLock<DeviceStatus>> {
        Arc::clone(&self.status)
    }

    /// What the monitor has seen so far.
    #[must_use]
    pub const fn snapshot(&self) -> &StatusSnapshot {
        &self.snapshot
    }

    /// Run one cycle as of `now`.
    pub fn cycle(&mut self, now: Instant) {
        let mut changed = false;
        let mut events = Vec::new();

        match self.read() {
            Ok(reading) => changed |= self.apply(reading, now, &mut events),
            Err(e) => warn!(error = %e, "status read failed, skipping this cycle"),
        }

        let connection = self.actuator.connection_state();
        if self.snapshot.connection != Some(connection) {
            self.snapshot.connection = Some(connection);
            self.indicators.show_connection(connection);
            changed = true;
        }

        if changed {
            self.publish();
        }
        for event in &events {
            self.bus.emit(event);
        }

        self.jobs.drain(|job| self.run_job(job));
    }

    fn read(&self) -> HardwareResult<Reading> {
        let bat = self.charger.bat_status()?;
        let charger_temp = self.charger.charger_temp_status()?;
        let battery_temp = if bat.is_present() {
            self.charger.battery_temp_status()?
        } else {
            None
        };
        let dc = self.charger.dc_status()?;
        let chg = self.charger.chg_status()?;
        let power_good = match &self.power_good {
            Some(pin) => Some(pin.is_high()?),
            None => None,
        };
        Ok(Reading {
            bat,
            chg,
            dc,
            charger_temp,
            battery_temp,
            power_good,
        })
    }

    fn apply(&mut self, reading: Reading, now: Instant, events: &mut Vec<Event>) -> bool {
        let before = self.snapshot.clone();

        if before.bat != Some(reading.bat) {
            debug!(battery = ?reading.bat, "battery status changed");
            self.snapshot.bat = Some(reading.bat);
        }

        if before.chg != Some(reading.chg) {
            debug!(charger = ?reading.chg, "charger status changed");
            self.snapshot.chg = Some(reading.chg);
            self.indicators.show_charging(reading.chg);
        }

        let temperature = TemperatureRating::combine(reading.charger_temp, reading.battery_temp);
        if before.temperature != Some(temperature) {
            self.snapshot.temperature = Some(temperature);
            self.indicators.show_temperature(temperature);
            let was_critical = before.temperature.is_some_and(TemperatureRating::is_critical);
            match (was_critical, temperature.is_critical()) {
                (false, true) => {
                    warn!(%temperature, "temperature critical");
                    events.push(Event::TempCritical(temperature));
                }
                (true, false) => {
                    info!(%temperature, "temperature back to normal");
                    events.push(Event::TempNormal(temperature));
                }
                _ => debug!(%temperature, "temperature changed"),
            }
        }

        if before.dc != Some(reading.dc) {
            self.snapshot.dc = Some(reading.dc);
            let was_valid = before.dc.is_some_and(DcStatus::is_valid);
            match (was_valid, reading.dc.is_valid()) {
                (false, true) => {
                    info!("DC plugged in");
                    events.push(Event::DcPlugged);
                }
                (true, false) => {
                    info!(dc = ?reading.dc, "DC unplugged");
                    self.estimator.reset_origin(now);
                    events.push(Event::DcUnplugged);
                }
                _ => debug!(dc = ?reading.dc, "DC status changed"),
            }
        }

        if let Some(good) = reading.power_good {
            if before.power_good != Some(good) {
                self.snapshot.power_good = Some(good);
                self.indicators.show_power(good);
                if !good {
                    warn!("LDO power not good");
                    events.push(Event::PowerCritical);
                } else if before.power_good == Some(false) {
                    info!("LDO power good again");
                    events.push(Event::PowerNormal);
                }
            }
        }

        let level = self.estimator.update(reading.dc, reading.bat, now);
        if before.battery_level != Some(level) {
            info!(%level, "battery level");
            self.snapshot.battery_level = Some(level);
            self.indicators.show_battery(level);
        }

        self.snapshot != before
    }

    fn publish(&self) {
        let snapshot = &self.snapshot;
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        *status = DeviceStatus {
            connection: snapshot.connection.unwrap_or(ConnectionState::Disconnected),
            battery: snapshot.bat,
            charger: snapshot.chg,
            dc: snapshot.dc,
            temperature: snapshot.temperature,
            power_good: snapshot.power_good,
            battery_level: self.estimator.level(),
            updated_at_utc: Utc::now(),
        };
    }

    fn run_job(&self, job: DeferredJob) {
        if job == DeferredJob::RECOUPLE_ACTUATOR {
            match self.actuator.couple() {
                Ok(()) => info!("recoupling actuator"),
                Err(ActuatorError::Inadequate { state, .. }) => {
                    debug!(%state, "recouple not needed");
                }
                Err(e) => warn!(error = %e, "recouple failed"),
            }
        }
    }

    /// Move the monitor onto its own thread, cycling every `interval`.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(mut self, interval: Duration) -> std::io::Result<MonitorHandle> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name("gaitcue-monitor".to_string())
            .spawn(move || {
                info!(interval_ms = interval.as_millis(), "system monitor started");
                loop {
                    self.cycle(Instant::now());
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("system monitor stopped");
            })?;

        Ok(MonitorHandle {
            stop: Mutex::new(Some(stop_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }
}

impl std::fmt::Debug for SystemMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemMonitor")
            .field("snapshot", &self.snapshot)
            .field("estimator", &self.estimator)
            .finish_non_exhaustive()
    }
}

/// Handle on a running monitor thread.
#[derive(Debug)]
pub struct MonitorHandle {
    stop: Mutex<Option<mpsc::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorHandle {
    /// Wake the monitor, let the current cycle finish and join the thread.
    /// Idempotent.
    pub fn stop(&self) {
        drop(self.stop.lock().unwrap_or_else(PoisonError::into_inner).take());
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                error!("system monitor panicked");
            }
        }
    }

    /// `true` until [`MonitorHandle::stop`] has joined the thread.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
