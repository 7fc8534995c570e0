//! # gaitcue-core
//!
//! Driver stack for a wearable gait-cueing device: a vibration actuator
//! reached over BLE, a battery charger, status LEDs, a push button and an
//! optional LDO power-good line.
//!
//! This crate provides:
//! - The actuator link state machine and its background I/O worker
//! - A periodic system monitor that watches the charger, estimates battery
//!   level and recouples the actuator after a disconnect
//! - A typed event bus applications subscribe to
//! - Configuration loading, saving, and validation
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`actuator`] - Link state machine, I/O worker and command encoding
//! - [`transport`] - BLE transport trait with BlueZ and in-memory backends
//! - [`events`] - Event enum and the synchronous fan-out bus
//! - [`jobs`] - Deferred jobs run from the monitor loop
//! - [`monitor`] - Status polling, debouncing and event generation
//! - [`battery`] - Time-based battery level estimation
//! - [`temperature`] - Temperature ratings and how charger and battery combine
//! - [`hardware`] - Charger, pin and LED contracts with sysfs and simulated backends
//! - [`indicators`] - Status shown on the LEDs
//! - [`device`] - [`GaitDevice`], which wires everything together
//! - [`config`] - Application configuration
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Charger readings and the published device status

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod actuator;
pub mod battery;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod hardware;
pub mod indicators;
pub mod jobs;
pub mod monitor;
pub mod temperature;
pub mod transport;
pub mod types;

// Re-export primary types for convenience
pub use actuator::{
    Actuator, ActuatorCommand, ActuatorError, CommandError, ConnectionState, DisconnectReason,
    MotorMask, PulsePattern, TimerDirective, CONTROL_CHARACTERISTIC_UUID, SERVICE_UUID,
};
pub use battery::{BatteryLevel, BatteryLevelEstimator};
pub use config::{Config, ConfigError, ConfigResult, HardwareBackend, ReconnectPolicy};
pub use device::GaitDevice;
pub use error::{Error, GaitcueError, Result};
pub use events::{Event, EventBus, EventKind, SubscriptionId};
pub use hardware::{Hardware, HardwareError, SimulatedBoard};
pub use indicators::{LedIndicators, NullIndicators, StatusIndicators};
pub use jobs::{DeferredJob, JobQueue};
pub use monitor::SystemMonitor;
pub use temperature::TemperatureRating;
#[cfg(feature = "bluetooth")]
pub use transport::BluerTransport;
pub use transport::{MockTransport, Transport, TransportError};
pub use types::{BatStatus, ChgStatus, DcStatus, DeviceStatus};
