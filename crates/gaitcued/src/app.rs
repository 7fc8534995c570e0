//! Cueing application: the button toggles cueing on the actuator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use gaitcue_core::{
    ActuatorCommand, ActuatorError, Event, EventKind, GaitDevice, PulsePattern, SubscriptionId,
};
use tracing::{debug, info, warn};

/// Turns button presses into start/stop commands.
///
/// Pressing the button while the actuator is away still flips the cueing
/// state; cueing starts as soon as the link comes up.
pub struct CueingApp {
    device: Arc<GaitDevice>,
    start: ActuatorCommand,
    active: AtomicBool,
}

impl CueingApp {
    /// App sending `pattern` when cueing starts.
    #[must_use]
    pub fn new(device: Arc<GaitDevice>, pattern: PulsePattern) -> Arc<Self> {
        Arc::new(Self {
            device,
            start: ActuatorCommand::Start(pattern),
            active: AtomicBool::new(false),
        })
    }

    /// Subscribe to the device's events.
    ///
    /// Handlers hold a weak reference, so dropping the app detaches it.
    pub fn attach(self: &Arc<Self>) -> Vec<SubscriptionId> {
        let mut ids = Vec::new();

        let app = Arc::downgrade(self);
        ids.push(self.device.subscribe(EventKind::ButtonPressed, move |_| {
            with(&app, CueingApp::on_button);
        }));

        let app = Arc::downgrade(self);
        ids.push(self.device.subscribe(EventKind::BleConnected, move |_| {
            with(&app, Self::resume);
        }));

        for kind in EventKind::ALL {
            let app = Arc::downgrade(self);
            ids.push(self.device.subscribe(kind, move |event| {
                with(&app, |app| app.log_event(event));
            }));
        }
        ids
    }

    /// Whether cueing is on.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Flip cueing and tell the actuator if it is reachable.
    ///
    /// Returns the new state.
    ///
    /// # Errors
    ///
    /// Returns an error only if the actuator's worker is gone.
    pub fn toggle(&self) -> Result<bool, ActuatorError> {
        let active = !self.active.fetch_xor(true, Ordering::SeqCst);
        info!(active, "cueing toggled");
        let command = if active {
            self.start
        } else {
            ActuatorCommand::Stop
        };
        self.send(&command)?;
        Ok(active)
    }

    fn on_button(&self) {
        if let Err(e) = self.toggle() {
            warn!(error = %e, "cannot toggle cueing");
        }
    }

    fn resume(&self) {
        if self.is_active() {
            debug!("actuator back, resuming cueing");
            if let Err(e) = self.send(&self.start) {
                warn!(error = %e, "cannot resume cueing");
            }
        }
    }

    fn send(&self, command: &ActuatorCommand) -> Result<(), ActuatorError> {
        match self.device.send(command) {
            Err(ActuatorError::Inadequate { state, .. }) => {
                debug!(%state, "actuator not connected, command deferred");
                Ok(())
            }
            other => other,
        }
    }

    fn log_event(&self, event: &Event) {
        let status = self.device.status();
        let status = serde_json::to_string(&status).unwrap_or_default();
        let payload = serde_json::to_string(event).unwrap_or_default();
        info!(event = %event.kind(), %payload, %status, "device event");
    }
}

fn with(app: &Weak<CueingApp>, f: impl FnOnce(&CueingApp)) {
    if let Some(app) = app.upgrade() {
        f(&app);
    }
}

impl std::fmt::Debug for CueingApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CueingApp")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}
