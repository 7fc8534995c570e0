//! User-facing status indicators.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::warn;

use crate::actuator::ConnectionState;
use crate::battery::BatteryLevel;
use crate::hardware::{HardwareResult, Led, Leds};
use crate::temperature::TemperatureRating;
use crate::types::ChgStatus;

/// Blink period for urgent states.
pub const FAST_BLINK: Duration = Duration::from_millis(250);

/// Blink period for warnings and activity.
pub const SLOW_BLINK: Duration = Duration::from_millis(1_000);

/// Receives every watched status change from the monitor.
///
/// Calls happen on the monitor thread, only when the value changed.
pub trait StatusIndicators: Send + Sync {
    /// Actuator link state.
    fn show_connection(&self, state: ConnectionState);
    /// Estimated battery level.
    fn show_battery(&self, level: BatteryLevel);
    /// Charger phase.
    fn show_charging(&self, status: ChgStatus);
    /// Combined temperature rating.
    fn show_temperature(&self, rating: TemperatureRating);
    /// LDO power-good level.
    fn show_power(&self, good: bool);
}

/// Indicators for a device without any.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullIndicators;

impl StatusIndicators for NullIndicators {
    fn show_connection(&self, _state: ConnectionState) {}
    fn show_battery(&self, _level: BatteryLevel) {}
    fn show_charging(&self, _status: ChgStatus) {}
    fn show_temperature(&self, _rating: TemperatureRating) {}
    fn show_power(&self, _good: bool) {}
}

#[derive(Debug, Default)]
struct Alerts {
    temperature: bool,
    power: bool,
}

/// Indicators on the board's status LEDs.
pub struct LedIndicators {
    leds: Leds,
    alerts: Mutex<Alerts>,
}

impl LedIndicators {
    /// Drive `leds`.
    #[must_use]
    pub fn new(leds: Leds) -> Self {
        Self {
            leds,
            alerts: Mutex::new(Alerts::default()),
        }
    }

    fn apply(name: &str, result: HardwareResult<()>) {
        if let Err(e) = result {
            warn!(led = name, error = %e, "cannot update LED");
        }
    }

    fn update_alert(&self, update: impl FnOnce(&mut Alerts)) {
        let raised = {
            let mut alerts = self.alerts.lock().unwrap_or_else(PoisonError::into_inner);
            update(&mut alerts);
            alerts.temperature || alerts.power
        };
        let Some(led) = &self.leds.alert else {
            return;
        };
        let result = if raised {
            led.blink(FAST_BLINK)
        } else {
            led.off()
        };
        Self::apply("alert", result);
    }
}

fn show(led: &Arc<dyn Led>, blink: Option<Duration>, lit: bool) -> HardwareResult<()> {
    match (blink, lit) {
        (Some(period), _) => led.blink(period),
        (None, true) => led.on(),
        (None, false) => led.off(),
    }
}

impl StatusIndicators for LedIndicators {
    fn show_connection(&self, state: ConnectionState) {
        let result = match state {
            ConnectionState::Disconnected => show(&self.leds.connection, None, false),
            ConnectionState::Discovering => show(&self.leds.connection, Some(SLOW_BLINK), true),
            ConnectionState::Connected => show(&self.leds.connection, None, true),
        };
        Self::apply("connection", result);
    }

    fn show_battery(&self, level: BatteryLevel) {
        let result = match level {
            BatteryLevel::DeepDischarge | BatteryLevel::Empty => {
                show(&self.leds.battery, Some(FAST_BLINK), true)
            }
            BatteryLevel::Low => show(&self.leds.battery, Some(SLOW_BLINK), true),
            BatteryLevel::Medium | BatteryLevel::Good | BatteryLevel::Full => {
                show(&self.leds.battery, None, true)
            }
            BatteryLevel::Invalid => show(&self.leds.battery, None, false),
        };
        Self::apply("battery", result);
    }

    fn show_charging(&self, status: ChgStatus) {
        let result = match status {
            ChgStatus::Fault => show(&self.leds.charge, Some(FAST_BLINK), true),
            other => show(&self.leds.charge, None, other.is_charging()),
        };
        Self::apply("charge", result);
    }

    fn show_temperature(&self, rating: TemperatureRating) {
        self.update_alert(|alerts| alerts.temperature = rating.is_critical());
    }

    fn show_power(&self, good: bool) {
        self.update_alert(|alerts| alerts.power = !good);
    }
}

impl std::fmt::Debug for LedIndicators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedIndicators").finish_non_exhaustive()
    }
}
