//! Board peripherals: charger, LEDs, input pins and the button.
//!
//! The monitor and indicators only see the [`Charger`], [`InputPin`] and
//! [`Led`] traits. Which backend sits behind them is picked from
//! `hardware.backend` in the configuration by [`Hardware::from_config`].

pub mod button;
pub mod simulated;
pub mod sysfs;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::{HardwareBackend, HardwareConfig};
use crate::temperature::TemperatureRating;
use crate::types::{BatStatus, ChgStatus, DcStatus};

pub use button::ButtonWatcher;
pub use simulated::SimulatedBoard;

/// Errors raised by hardware backends.
#[derive(Debug, Error)]
pub enum HardwareError {
    /// An attribute could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Attribute path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An attribute could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Attribute path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An attribute held a value the backend does not understand.
    #[error("unexpected value {value:?} in {path}")]
    UnexpectedValue {
        /// Attribute path.
        path: PathBuf,
        /// Raw value.
        value: String,
    },

    /// The peripheral is not available.
    #[error("{what} is unavailable")]
    Unavailable {
        /// Which peripheral.
        what: String,
    },
}

/// Result type for hardware operations.
pub type HardwareResult<T> = std::result::Result<T, HardwareError>;

/// Battery charger status.
///
/// Each call reads the hardware; any of them may fail on an unreadable
/// device, in which case the monitor skips the cycle.
pub trait Charger: Send + Sync {
    /// Battery presence and charge warnings.
    fn bat_status(&self) -> HardwareResult<BatStatus>;
    /// Charger phase.
    fn chg_status(&self) -> HardwareResult<ChgStatus>;
    /// DC input state.
    fn dc_status(&self) -> HardwareResult<DcStatus>;
    /// Charger die temperature; `None` when unknown.
    fn charger_temp_status(&self) -> HardwareResult<Option<TemperatureRating>>;
    /// Battery temperature; `None` when unknown.
    fn battery_temp_status(&self) -> HardwareResult<Option<TemperatureRating>>;
}

/// A digital input.
pub trait InputPin: Send + Sync {
    /// Current level.
    fn is_high(&self) -> HardwareResult<bool>;
}

/// A status LED.
pub trait Led: Send + Sync {
    /// Steady on.
    fn on(&self) -> HardwareResult<()>;
    /// Off.
    fn off(&self) -> HardwareResult<()>;
    /// Blink with the given full period.
    fn blink(&self, period: Duration) -> HardwareResult<()>;
}

/// The board's status LEDs.
#[derive(Clone)]
pub struct Leds {
    /// Actuator link.
    pub connection: Arc<dyn Led>,
    /// Battery level.
    pub battery: Arc<dyn Led>,
    /// Charging.
    pub charge: Arc<dyn Led>,
    /// Temperature and power alerts, when fitted.
    pub alert: Option<Arc<dyn Led>>,
}

/// A push button on an input pin.
#[derive(Clone)]
pub struct ButtonInput {
    /// The pin.
    pub pin: Arc<dyn InputPin>,
    /// Whether a press pulls the line low.
    pub active_low: bool,
}

/// Every peripheral the device uses.
#[derive(Clone)]
pub struct Hardware {
    /// Battery charger.
    pub charger: Arc<dyn Charger>,
    /// LDO power-good pin, if wired.
    pub power_good: Option<Arc<dyn InputPin>>,
    /// Push button, if fitted.
    pub button: Option<ButtonInput>,
    /// Status LEDs.
    pub leds: Leds,
    /// Handle on the simulated board behind every peripheral above, when
    /// the simulated backend is in use.
    pub board: Option<SimulatedBoard>,
}

impl Hardware {
    /// Open the peripherals of the configured backend.
    ///
    /// The simulated backend starts from [`SimulatedBoard::new`] and keeps
    /// it in [`Hardware::board`].
    ///
    /// # Errors
    ///
    /// Returns an error if a sysfs GPIO line cannot be exported.
    pub fn from_config(config: &HardwareConfig) -> HardwareResult<Self> {
        match config.backend {
            HardwareBackend::Sysfs => sysfs::open(config),
            HardwareBackend::Simulated => Ok(Self::simulated(&SimulatedBoard::new())),
        }
    }

    /// Peripherals backed by `board`.
    #[must_use]
    pub fn simulated(board: &SimulatedBoard) -> Self {
        Self {
            charger: Arc::new(board.clone()),
            power_good: Some(board.power_good_pin()),
            button: Some(ButtonInput {
                pin: board.button_pin(),
                active_low: false,
            }),
            leds: Leds {
                connection: board.led("connection"),
                battery: board.led("battery"),
                charge: board.led("charge"),
                alert: Some(board.led("alert")),
            },
            board: Some(board.clone()),
        }
    }
}

impl std::fmt::Debug for Hardware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hardware")
            .field("power_good", &self.power_good.is_some())
            .field("button", &self.button.is_some())
            .field("alert_led", &self.leds.alert.is_some())
            .field("simulated", &self.board.is_some())
            .finish_non_exhaustive()
    }
}
