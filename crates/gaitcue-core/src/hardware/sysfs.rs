//! Linux sysfs backend.
//!
//! - charger state from the `power_supply` class (battery and DC entries)
//! - LEDs from the `leds` class, blinking through the `timer` trigger
//! - input pins from the legacy `gpio` class

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::{
    ButtonInput, Charger, Hardware, HardwareError, HardwareResult, InputPin, Led, Leds,
};
use crate::config::HardwareConfig;
use crate::temperature::TemperatureRating;
use crate::types::{BatStatus, ChgStatus, DcStatus};

fn read_attr(path: &Path) -> HardwareResult<String> {
    fs::read_to_string(path)
        .map(|value| value.trim().to_string())
        .map_err(|source| HardwareError::Read {
            path: path.to_path_buf(),
            source,
        })
}

fn read_optional(path: &Path) -> HardwareResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(HardwareError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_attr(path: &Path, value: &str) -> HardwareResult<()> {
    fs::write(path, value).map_err(|source| HardwareError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn unexpected(path: &Path, value: &str) -> HardwareError {
    HardwareError::UnexpectedValue {
        path: path.to_path_buf(),
        value: value.to_string(),
    }
}

fn parse_flag(path: &Path) -> HardwareResult<bool> {
    let value = read_attr(path)?;
    match value.as_str() {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(unexpected(path, &value)),
    }
}

/// Temperature rating from a `power_supply` `health` string.
fn rating_from_health(health: &str) -> Option<TemperatureRating> {
    match health {
        "Cold" => Some(TemperatureRating::COLD),
        "Cool" => Some(TemperatureRating::COOL),
        "Good" => Some(TemperatureRating::OK),
        "Warm" => Some(TemperatureRating::WARM),
        "Hot" | "Overheat" => Some(TemperatureRating::HOT),
        _ => None,
    }
}

/// Charger exposed as two `power_supply` entries.
#[derive(Debug, Clone)]
pub struct SysfsCharger {
    battery: PathBuf,
    dc: PathBuf,
}

impl SysfsCharger {
    /// Charger reading `<class_root>/power_supply/{battery,dc}`.
    #[must_use]
    pub fn new(class_root: &Path, battery: &str, dc: &str) -> Self {
        let supplies = class_root.join("power_supply");
        Self {
            battery: supplies.join(battery),
            dc: supplies.join(dc),
        }
    }

    fn temperature(supply: &Path) -> HardwareResult<Option<TemperatureRating>> {
        let temp_path = supply.join("temp");
        if let Some(raw) = read_optional(&temp_path)? {
            let decidegrees = raw
                .parse::<i32>()
                .map_err(|_| unexpected(&temp_path, &raw))?;
            return Ok(Some(TemperatureRating::from_decidegrees(decidegrees)));
        }
        Ok(read_optional(&supply.join("health"))?
            .as_deref()
            .and_then(rating_from_health))
    }
}

impl Charger for SysfsCharger {
    fn bat_status(&self) -> HardwareResult<BatStatus> {
        if !parse_flag(&self.battery.join("present"))? {
            return Ok(BatStatus {
                removed: true,
                empty: false,
                low: false,
            });
        }
        let level_path = self.battery.join("capacity_level");
        let level = read_optional(&level_path)?.unwrap_or_default();
        Ok(BatStatus {
            removed: false,
            empty: level == "Critical",
            low: level == "Low",
        })
    }

    fn chg_status(&self) -> HardwareResult<ChgStatus> {
        let health = read_optional(&self.battery.join("health"))?;
        if matches!(
            health.as_deref(),
            Some("Unspecified failure" | "Safety timer expire" | "Watchdog timer expire")
        ) {
            return Ok(ChgStatus::Fault);
        }

        let status_path = self.battery.join("status");
        let status = read_attr(&status_path)?;
        match status.as_str() {
            "Charging" => {
                let kind = read_optional(&self.battery.join("charge_type"))?;
                Ok(match kind.as_deref() {
                    Some("Trickle") => ChgStatus::Precharge,
                    _ => ChgStatus::FastCharge,
                })
            }
            "Full" => Ok(ChgStatus::Done),
            "Discharging" | "Not charging" | "Unknown" => Ok(ChgStatus::Off),
            _ => Err(unexpected(&status_path, &status)),
        }
    }

    fn dc_status(&self) -> HardwareResult<DcStatus> {
        if !parse_flag(&self.dc.join("online"))? {
            return Ok(DcStatus::Absent);
        }
        Ok(match read_optional(&self.dc.join("health"))?.as_deref() {
            Some("Over voltage") => DcStatus::Overvoltage,
            Some("Dead") => DcStatus::Undervoltage,
            _ => DcStatus::Valid,
        })
    }

    fn charger_temp_status(&self) -> HardwareResult<Option<TemperatureRating>> {
        Self::temperature(&self.dc)
    }

    fn battery_temp_status(&self) -> HardwareResult<Option<TemperatureRating>> {
        Self::temperature(&self.battery)
    }
}

/// An LED in the `leds` class.
#[derive(Debug, Clone)]
pub struct SysfsLed {
    dir: PathBuf,
}

impl SysfsLed {
    /// LED `<class_root>/leds/<name>`.
    #[must_use]
    pub fn new(class_root: &Path, name: &str) -> Self {
        Self {
            dir: class_root.join("leds").join(name),
        }
    }

    fn max_brightness(&self) -> HardwareResult<String> {
        Ok(read_optional(&self.dir.join("max_brightness"))?.unwrap_or_else(|| "1".to_string()))
    }
}

impl Led for SysfsLed {
    fn on(&self) -> HardwareResult<()> {
        write_attr(&self.dir.join("trigger"), "none")?;
        write_attr(&self.dir.join("brightness"), &self.max_brightness()?)
    }

    fn off(&self) -> HardwareResult<()> {
        write_attr(&self.dir.join("trigger"), "none")?;
        write_attr(&self.dir.join("brightness"), "0")
    }

    fn blink(&self, period: Duration) -> HardwareResult<()> {
        let half = (period.as_millis() / 2).max(1).to_string();
        write_attr(&self.dir.join("trigger"), "timer")?;
        write_attr(&self.dir.join("delay_on"), &half)?;
        write_attr(&self.dir.join("delay_off"), &half)
    }
}

/// An input line in the legacy `gpio` class.
#[derive(Debug, Clone)]
pub struct SysfsPin {
    value: PathBuf,
}

impl SysfsPin {
    /// Export `line` if needed and configure it as an input.
    ///
    /// # Errors
    ///
    /// Returns an error if the line cannot be exported or configured.
    pub fn open(class_root: &Path, line: u32) -> HardwareResult<Self> {
        let gpio = class_root.join("gpio");
        let dir = gpio.join(format!("gpio{line}"));
        if !dir.exists() {
            debug!(line, "exporting GPIO line");
            write_attr(&gpio.join("export"), &line.to_string())?;
        }
        write_attr(&dir.join("direction"), "in")?;
        Ok(Self {
            value: dir.join("value"),
        })
    }
}

impl InputPin for SysfsPin {
    fn is_high(&self) -> HardwareResult<bool> {
        parse_flag(&self.value)
    }
}

/// Open every peripheral named in `config`.
pub(super) fn open(config: &HardwareConfig) -> HardwareResult<Hardware> {
    let sysfs = &config.sysfs;
    let root = sysfs.class_root.as_path();
    info!(root = %root.display(), "using sysfs hardware backend");

    let led = |name: &str| -> Arc<dyn Led> { Arc::new(SysfsLed::new(root, name)) };
    let power_good = match config.power_good_gpio {
        Some(line) => Some(Arc::new(SysfsPin::open(root, line)?) as Arc<dyn InputPin>),
        None => None,
    };
    let button = match config.button_gpio {
        Some(line) => Some(ButtonInput {
            pin: Arc::new(SysfsPin::open(root, line)?),
            active_low: config.button_active_low,
        }),
        None => None,
    };

    Ok(Hardware {
        charger: Arc::new(SysfsCharger::new(root, &sysfs.battery_supply, &sysfs.dc_supply)),
        power_good,
        button,
        leds: Leds {
            connection: led(&sysfs.connection_led),
            battery: led(&sysfs.battery_led),
            charge: led(&sysfs.charge_led),
            alert: sysfs.alert_led.as_deref().map(led),
        },
        board: None,
    })
}
