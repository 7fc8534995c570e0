//! In-memory board for tests and development without hardware.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::trace;

use super::{Charger, HardwareError, HardwareResult, InputPin, Led};
use crate::temperature::TemperatureRating;
use crate::types::{BatStatus, ChgStatus, DcStatus};

/// What a simulated LED is showing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LedState {
    /// Off.
    #[default]
    Off,
    /// Steady on.
    On,
    /// Blinking with this period.
    Blink(Duration),
}

#[derive(Debug)]
struct BoardState {
    bat: BatStatus,
    chg: ChgStatus,
    dc: DcStatus,
    charger_temp: Option<TemperatureRating>,
    battery_temp: Option<TemperatureRating>,
    power_good: bool,
    button_pressed: bool,
    fail_reads: bool,
    battery_temp_reads: usize,
    leds: HashMap<String, LedState>,
}

/// Shared simulated board. Clones see the same state.
#[derive(Debug, Clone)]
pub struct SimulatedBoard {
    state: Arc<Mutex<BoardState>>,
}

impl SimulatedBoard {
    /// A board on battery power, battery healthy, everything at room
    /// temperature, power good and no button pressed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BoardState {
                bat: BatStatus::NORMAL,
                chg: ChgStatus::Off,
                dc: DcStatus::Absent,
                charger_temp: Some(TemperatureRating::OK),
                battery_temp: Some(TemperatureRating::OK),
                power_good: true,
                button_pressed: false,
                fail_reads: false,
                battery_temp_reads: 0,
                leds: HashMap::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the battery flags.
    pub fn set_bat_status(&self, status: BatStatus) {
        self.state().bat = status;
    }

    /// Set the charger phase.
    pub fn set_chg_status(&self, status: ChgStatus) {
        self.state().chg = status;
    }

    /// Set the DC input state.
    pub fn set_dc_status(&self, status: DcStatus) {
        self.state().dc = status;
    }

    /// Set the charger temperature rating.
    pub fn set_charger_temp(&self, rating: Option<TemperatureRating>) {
        self.state().charger_temp = rating;
    }

    /// Set the battery temperature rating.
    pub fn set_battery_temp(&self, rating: Option<TemperatureRating>) {
        self.state().battery_temp = rating;
    }

    /// Set the power-good level.
    pub fn set_power_good(&self, good: bool) {
        self.state().power_good = good;
    }

    /// Hold or release the button.
    pub fn set_button(&self, pressed: bool) {
        self.state().button_pressed = pressed;
    }

    /// Make every charger read fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }

    /// How often the battery temperature has been read.
    #[must_use]
    pub fn battery_temp_reads(&self) -> usize {
        self.state().battery_temp_reads
    }

    /// What LED `name` is showing.
    #[must_use]
    pub fn led_state(&self, name: &str) -> LedState {
        self.state().leds.get(name).copied().unwrap_or_default()
    }

    /// The power-good input.
    #[must_use]
    pub fn power_good_pin(&self) -> Arc<dyn InputPin> {
        Arc::new(SimulatedPin {
            board: self.clone(),
            kind: PinKind::PowerGood,
        })
    }

    /// The button input; high while pressed.
    #[must_use]
    pub fn button_pin(&self) -> Arc<dyn InputPin> {
        Arc::new(SimulatedPin {
            board: self.clone(),
            kind: PinKind::Button,
        })
    }

    /// LED `name`.
    #[must_use]
    pub fn led(&self, name: &str) -> Arc<dyn Led> {
        Arc::new(SimulatedLed {
            board: self.clone(),
            name: name.to_string(),
        })
    }

    fn read<T>(&self, what: &str, get: impl FnOnce(&mut BoardState) -> T) -> HardwareResult<T> {
        let mut state = self.state();
        if state.fail_reads {
            return Err(HardwareError::Unavailable {
                what: format!("simulated {what}"),
            });
        }
        Ok(get(&mut state))
    }
}

impl Default for SimulatedBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl Charger for SimulatedBoard {
    fn bat_status(&self) -> HardwareResult<BatStatus> {
        self.read("battery status", |s| s.bat)
    }

    fn chg_status(&self) -> HardwareResult<ChgStatus> {
        self.read("charger status", |s| s.chg)
    }

    fn dc_status(&self) -> HardwareResult<DcStatus> {
        self.read("DC status", |s| s.dc)
    }

    fn charger_temp_status(&self) -> HardwareResult<Option<TemperatureRating>> {
        self.read("charger temperature", |s| s.charger_temp)
    }

    fn battery_temp_status(&self) -> HardwareResult<Option<TemperatureRating>> {
        self.read("battery temperature", |s| {
            s.battery_temp_reads += 1;
            s.battery_temp
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum PinKind {
    PowerGood,
    Button,
}

struct SimulatedPin {
    board: SimulatedBoard,
    kind: PinKind,
}

impl InputPin for SimulatedPin {
    fn is_high(&self) -> HardwareResult<bool> {
        let state = self.board.state();
        Ok(match self.kind {
            PinKind::PowerGood => state.power_good,
            PinKind::Button => state.button_pressed,
        })
    }
}

struct SimulatedLed {
    board: SimulatedBoard,
    name: String,
}

impl SimulatedLed {
    fn show(&self, led: LedState) {
        trace!(led = %self.name, state = ?led, "simulated LED");
        self.board.state().leds.insert(self.name.clone(), led);
    }
}

impl Led for SimulatedLed {
    fn on(&self) -> HardwareResult<()> {
        self.show(LedState::On);
        Ok(())
    }

    fn off(&self) -> HardwareResult<()> {
        self.show(LedState::Off);
        Ok(())
    }

    fn blink(&self, period: Duration) -> HardwareResult<()> {
        self.show(LedState::Blink(period));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let board = SimulatedBoard::new();
        let other = board.clone();
        other.set_dc_status(DcStatus::Valid);
        assert_eq!(board.dc_status().unwrap(), DcStatus::Valid);
    }

    #[test]
    fn test_failing_reads() {
        let board = SimulatedBoard::new();
        board.set_fail_reads(true);
        assert!(matches!(
            board.bat_status(),
            Err(HardwareError::Unavailable { .. })
        ));
        board.set_fail_reads(false);
        assert!(board.bat_status().is_ok());
    }

    #[test]
    fn test_leds_and_pins() {
        let board = SimulatedBoard::new();
        let led = board.led("connection");
        assert_eq!(board.led_state("connection"), LedState::Off);
        led.blink(Duration::from_millis(500)).unwrap();
        assert_eq!(
            board.led_state("connection"),
            LedState::Blink(Duration::from_millis(500))
        );

        let button = board.button_pin();
        assert!(!button.is_high().unwrap());
        board.set_button(true);
        assert!(button.is_high().unwrap());
    }
}
