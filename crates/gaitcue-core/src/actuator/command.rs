//! Actuator command encoding.
//!
//! Commands are written to the control characteristic with a write request.
//! Start commands are 11 bytes, multi-byte fields little-endian:
//!
//! | Offset | Bytes | Field |
//! |---|---|---|
//! | 0 | 1 | Command code |
//! | 1 | 2 | Pulse-on duration, ms |
//! | 3 | 2 | Pulse period, ms |
//! | 5 | 2 | Initial delay, ms |
//! | 7 | 1 | Pulse count (0 = infinite) |
//! | 8 | 1 | Intensity, 0-100 |
//! | 9 | 1 | Motor mask |
//! | 10 | 1 | Timer directive |
//!
//! Stop is the single byte `0x02`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest accepted intensity.
pub const MAX_INTENSITY: u8 = 100;

/// Length of an encoded start command.
pub const START_FRAME_LEN: usize = 11;

/// Errors raised while building a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Intensity above [`MAX_INTENSITY`].
    #[error("intensity {value} is out of range (0-{MAX_INTENSITY})")]
    IntensityOutOfRange {
        /// Rejected value.
        value: u8,
    },
}

/// Which vibration motors a command drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorMask {
    /// No motor.
    None,
    /// Motor 1 only.
    Motor1,
    /// Motor 2 only.
    Motor2,
    /// Both motors.
    #[default]
    Both,
}

impl MotorMask {
    const fn bits(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Motor1 => 1,
            Self::Motor2 => 2,
            Self::Both => 3,
        }
    }
}

/// Whether the actuator keeps or restarts its session timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerDirective {
    /// Keep the running timer.
    Keep,
    /// Restart the timer.
    #[default]
    Reset,
}

/// Parameters of a pulse train.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulsePattern {
    pulse_on_ms: u16,
    period_ms: u16,
    initial_delay_ms: u16,
    pulse_count: u8,
    intensity: u8,
    motors: MotorMask,
    timer: TimerDirective,
}

impl PulsePattern {
    /// A 100 ms pulse every second on both motors, repeating forever.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::IntensityOutOfRange`] if `intensity` is above 100.
    pub const fn new(intensity: u8) -> Result<Self, CommandError> {
        if intensity > MAX_INTENSITY {
            return Err(CommandError::IntensityOutOfRange { value: intensity });
        }
        Ok(Self {
            pulse_on_ms: 100,
            period_ms: 1_000,
            initial_delay_ms: 0,
            pulse_count: 0,
            intensity,
            motors: MotorMask::Both,
            timer: TimerDirective::Reset,
        })
    }

    /// Set the pulse on-time.
    #[must_use]
    pub const fn with_pulse_on_ms(mut self, value: u16) -> Self {
        self.pulse_on_ms = value;
        self
    }

    /// Set the pulse period.
    #[must_use]
    pub const fn with_period_ms(mut self, value: u16) -> Self {
        self.period_ms = value;
        self
    }

    /// Set the delay before the first pulse.
    #[must_use]
    pub const fn with_initial_delay_ms(mut self, value: u16) -> Self {
        self.initial_delay_ms = value;
        self
    }

    /// Set the number of pulses; 0 repeats until stopped.
    #[must_use]
    pub const fn with_pulse_count(mut self, value: u8) -> Self {
        self.pulse_count = value;
        self
    }

    /// Select the motors.
    #[must_use]
    pub const fn with_motors(mut self, value: MotorMask) -> Self {
        self.motors = value;
        self
    }

    /// Set the timer directive.
    #[must_use]
    pub const fn with_timer(mut self, value: TimerDirective) -> Self {
        self.timer = value;
        self
    }

    /// Intensity, 0-100.
    #[must_use]
    pub const fn intensity(&self) -> u8 {
        self.intensity
    }

    /// Selected motors.
    #[must_use]
    pub const fn motors(&self) -> MotorMask {
        self.motors
    }
}

/// A command for the actuator unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCommand {
    /// Start cueing with the given pattern.
    Start(PulsePattern),
    /// Stop cueing.
    Stop,
    /// Start cueing, letting the actuator fall back to its stored defaults
    /// for anything it does not accept from the pattern.
    StartDefault(PulsePattern),
}

impl ActuatorCommand {
    /// Wire opcode.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Start(_) => 0x01,
            Self::Stop => 0x02,
            Self::StartDefault(_) => 0x05,
        }
    }

    /// Encode the command as written to the control characteristic.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let pattern = match self {
            Self::Stop => return vec![self.code()],
            Self::Start(p) | Self::StartDefault(p) => p,
        };

        let mut frame = Vec::with_capacity(START_FRAME_LEN);
        frame.push(self.code());
        frame.extend_from_slice(&pattern.pulse_on_ms.to_le_bytes());
        frame.extend_from_slice(&pattern.period_ms.to_le_bytes());
        frame.extend_from_slice(&pattern.initial_delay_ms.to_le_bytes());
        frame.push(pattern.pulse_count);
        frame.push(pattern.intensity);
        frame.push(pattern.motors.bits());
        frame.push(match pattern.timer {
            TimerDirective::Keep => 0,
            TimerDirective::Reset => 1,
        });
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_single_byte() {
        assert_eq!(ActuatorCommand::Stop.encode(), vec![0x02]);
    }

    #[test]
    fn test_start_layout() {
        let pattern = PulsePattern::new(75)
            .unwrap()
            .with_pulse_on_ms(0x0102)
            .with_period_ms(1_000)
            .with_initial_delay_ms(250)
            .with_pulse_count(12)
            .with_motors(MotorMask::Motor2)
            .with_timer(TimerDirective::Keep);

        let frame = ActuatorCommand::Start(pattern).encode();
        assert_eq!(
            frame,
            vec![0x01, 0x02, 0x01, 0xE8, 0x03, 0xFA, 0x00, 12, 75, 2, 0]
        );
        assert_eq!(frame.len(), START_FRAME_LEN);
    }

    #[test]
    fn test_start_default_uses_its_own_code() {
        let frame = ActuatorCommand::StartDefault(PulsePattern::new(100).unwrap()).encode();
        assert_eq!(frame[0], 0x05);
        assert_eq!(&frame[8..], &[100, 3, 1]);
    }

    #[test]
    fn test_intensity_bounds() {
        assert!(PulsePattern::new(0).is_ok());
        assert!(PulsePattern::new(100).is_ok());
        assert_eq!(
            PulsePattern::new(101),
            Err(CommandError::IntensityOutOfRange { value: 101 })
        );
    }
}
