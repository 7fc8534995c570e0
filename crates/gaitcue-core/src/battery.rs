//! Battery level estimation.
//!
//! The charger cannot report state of charge while the device runs on battery
//! alone, so the level is estimated from elapsed time: a fresh battery lasts
//! about six hours at "full" and one more hour at "low". When DC is valid the
//! charger's own battery flags are used instead.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::config::BatteryConfig;
use crate::types::{BatStatus, DcStatus};

/// Battery level as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryLevel {
    /// Below the safe discharge limit.
    DeepDischarge,
    /// Shutdown imminent.
    Empty,
    /// Running low.
    Low,
    /// Roughly half.
    Medium,
    /// Mostly charged.
    Good,
    /// Fully charged.
    Full,
    /// No battery, or unknown.
    Invalid,
}

impl BatteryLevel {
    /// Level implied by the charger's battery flags.
    #[must_use]
    pub const fn from_bat_status(status: BatStatus) -> Self {
        if status.removed {
            Self::Invalid
        } else if status.empty {
            Self::Empty
        } else if status.low {
            Self::Low
        } else {
            Self::Full
        }
    }
}

impl fmt::Display for BatteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DeepDischarge => "deep discharge",
            Self::Empty => "empty",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::Good => "good",
            Self::Full => "full",
            Self::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

/// Time-based battery level estimator.
#[derive(Debug, Clone)]
pub struct BatteryLevelEstimator {
    level: BatteryLevel,
    origin: Instant,
    full_to_low: Duration,
    low_to_empty: Duration,
}

impl BatteryLevelEstimator {
    /// Start at [`BatteryLevel::Full`] with the origin at `now`.
    #[must_use]
    pub const fn new(config: &BatteryConfig, now: Instant) -> Self {
        Self {
            level: BatteryLevel::Full,
            origin: now,
            full_to_low: Duration::from_secs(config.full_to_low_secs),
            low_to_empty: Duration::from_secs(config.low_to_empty_secs),
        }
    }

    /// Current estimate.
    #[must_use]
    pub const fn level(&self) -> BatteryLevel {
        self.level
    }

    /// Restart the elapsed-time measurement.
    pub fn reset_origin(&mut self, now: Instant) {
        self.origin = now;
    }

    /// Advance the estimate and return the new level.
    ///
    /// With DC valid the charger's flags are authoritative and the origin
    /// follows `now`, so the next battery-only episode starts from zero.
    pub fn update(&mut self, dc: DcStatus, battery: BatStatus, now: Instant) -> BatteryLevel {
        if dc.is_valid() {
            self.level = BatteryLevel::from_bat_status(battery);
            self.origin = now;
            return self.level;
        }

        let elapsed = now.saturating_duration_since(self.origin);
        let next = match self.level {
            BatteryLevel::Full if elapsed >= self.full_to_low => Some(BatteryLevel::Low),
            BatteryLevel::Low if elapsed >= self.low_to_empty => Some(BatteryLevel::Empty),
            _ => None,
        };

        if let Some(level) = next {
            debug!(
                from = %self.level,
                to = %level,
                elapsed_secs = elapsed.as_secs(),
                "battery estimate stepped down"
            );
            self.level = level;
            self.origin = now;
        }
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3_600);

    fn estimator(start: Instant) -> BatteryLevelEstimator {
        BatteryLevelEstimator::new(&BatteryConfig::default(), start)
    }

    #[test]
    fn test_full_low_empty_on_battery() {
        let t0 = Instant::now();
        let mut est = estimator(t0);
        let bat = BatStatus::NORMAL;

        assert_eq!(est.update(DcStatus::Absent, bat, t0 + 5 * HOUR), BatteryLevel::Full);
        assert_eq!(est.update(DcStatus::Absent, bat, t0 + 6 * HOUR), BatteryLevel::Low);
        // Origin was reset at the 6 h step.
        assert_eq!(
            est.update(DcStatus::Absent, bat, t0 + 6 * HOUR + HOUR / 2),
            BatteryLevel::Low
        );
        assert_eq!(est.update(DcStatus::Absent, bat, t0 + 7 * HOUR), BatteryLevel::Empty);
        assert_eq!(est.update(DcStatus::Absent, bat, t0 + 100 * HOUR), BatteryLevel::Empty);
    }

    #[test]
    fn test_dc_valid_abandons_estimate() {
        let t0 = Instant::now();
        let mut est = estimator(t0);
        est.update(DcStatus::Absent, BatStatus::NORMAL, t0 + 6 * HOUR);
        assert_eq!(est.level(), BatteryLevel::Low);

        let charging = BatStatus::NORMAL;
        assert_eq!(
            est.update(DcStatus::Valid, charging, t0 + 6 * HOUR + HOUR / 4),
            BatteryLevel::Full
        );
        // No timed transitions while plugged in, however long.
        assert_eq!(est.update(DcStatus::Valid, charging, t0 + 50 * HOUR), BatteryLevel::Full);

        // Unplugged again: the clock restarts from the last plugged-in cycle.
        assert_eq!(
            est.update(DcStatus::Absent, charging, t0 + 55 * HOUR),
            BatteryLevel::Full
        );
        assert_eq!(est.update(DcStatus::Absent, charging, t0 + 56 * HOUR), BatteryLevel::Low);
    }

    #[test]
    fn test_charger_flags_when_plugged_in() {
        let t0 = Instant::now();
        let mut est = estimator(t0);
        let removed = BatStatus {
            removed: true,
            ..BatStatus::NORMAL
        };
        let empty = BatStatus {
            empty: true,
            low: true,
            ..BatStatus::NORMAL
        };
        let low = BatStatus {
            low: true,
            ..BatStatus::NORMAL
        };

        assert_eq!(est.update(DcStatus::Valid, removed, t0), BatteryLevel::Invalid);
        assert_eq!(est.update(DcStatus::Valid, empty, t0), BatteryLevel::Empty);
        assert_eq!(est.update(DcStatus::Valid, low, t0), BatteryLevel::Low);
    }

    #[test]
    fn test_reset_origin() {
        let t0 = Instant::now();
        let mut est = estimator(t0);
        est.reset_origin(t0 + 4 * HOUR);
        assert_eq!(
            est.update(DcStatus::Absent, BatStatus::NORMAL, t0 + 8 * HOUR),
            BatteryLevel::Full
        );
        assert_eq!(
            est.update(DcStatus::Absent, BatStatus::NORMAL, t0 + 10 * HOUR),
            BatteryLevel::Low
        );
    }

    #[test]
    fn test_configurable_durations() {
        let t0 = Instant::now();
        let config = BatteryConfig {
            full_to_low_secs: 10,
            low_to_empty_secs: 5,
        };
        let mut est = BatteryLevelEstimator::new(&config, t0);
        let bat = BatStatus::NORMAL;
        assert_eq!(
            est.update(DcStatus::Absent, bat, t0 + Duration::from_secs(10)),
            BatteryLevel::Low
        );
        assert_eq!(
            est.update(DcStatus::Absent, bat, t0 + Duration::from_secs(15)),
            BatteryLevel::Empty
        );
    }
}
