//! Shared status types.
//!
//! This module contains the charger readings the monitor watches and the
//! [`DeviceStatus`] snapshot it publishes. Types specific to one component live
//! in that component's module (connection state in `actuator`, battery level in
//! `battery`).

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::actuator::ConnectionState;
use crate::battery::BatteryLevel;
use crate::temperature::TemperatureRating;

/// Battery flags reported by the charger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatStatus {
    /// No battery is attached.
    pub removed: bool,
    /// The battery is below its empty threshold.
    pub empty: bool,
    /// The battery is below its low threshold.
    pub low: bool,
}

impl BatStatus {
    /// A present battery with no warning flags.
    pub const NORMAL: Self = Self {
        removed: false,
        empty: false,
        low: false,
    };

    /// `true` unless the charger reports the battery as removed.
    #[must_use]
    pub const fn is_present(self) -> bool {
        !self.removed
    }
}

/// Charger phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChgStatus {
    /// Not charging.
    Off,
    /// Trickle charge of a deeply discharged battery.
    Precharge,
    /// Constant-current or constant-voltage charge.
    FastCharge,
    /// Charge terminated.
    Done,
    /// Charging stopped on a fault.
    Fault,
}

impl ChgStatus {
    /// `true` while current is flowing into the battery.
    #[must_use]
    pub const fn is_charging(self) -> bool {
        matches!(self, Self::Precharge | Self::FastCharge)
    }
}

/// DC supply state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DcStatus {
    /// Nothing plugged in.
    Absent,
    /// Supply is present and within range.
    Valid,
    /// Supply is present but too low.
    Undervoltage,
    /// Supply is present but too high.
    Overvoltage,
}

impl DcStatus {
    /// `true` only for [`DcStatus::Valid`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Latest observed device status, published by the system monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    /// Actuator link state.
    pub connection: ConnectionState,
    /// Battery flags, if read at least once.
    pub battery: Option<BatStatus>,
    /// Charger phase, if read at least once.
    pub charger: Option<ChgStatus>,
    /// DC supply state, if read at least once.
    pub dc: Option<DcStatus>,
    /// Combined temperature rating, if computed at least once.
    pub temperature: Option<TemperatureRating>,
    /// LDO power-good level, if the pin is wired and was read.
    pub power_good: Option<bool>,
    /// Estimated or reported battery level.
    pub battery_level: BatteryLevel,
    /// When any field last changed.
    pub updated_at_utc: DateTime<Utc>,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            battery: None,
            charger: None,
            dc: None,
            temperature: None,
            power_good: None,
            battery_level: BatteryLevel::Full,
            updated_at_utc: Utc::now(),
        }
    }
}
