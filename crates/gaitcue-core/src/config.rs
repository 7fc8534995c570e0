//! Application configuration management.
//!
//! Handles loading, saving, and validating gaitcue configuration including:
//! - Actuator discovery timeout and BLE identifiers
//! - Monitor poll interval
//! - Battery estimation durations
//! - Automatic reconnect policy
//! - Default cueing pattern
//! - Hardware backend selection
//! - Logging
//!
//! Configuration is read from a TOML file, then overridden by environment
//! variables of the form `GAITCUE__SECTION__KEY`
//! (e.g. `GAITCUE__ACTUATOR__DISCOVERY_TIMEOUT_SECS=8.0`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::actuator::command::{CommandError, MotorMask, PulsePattern, TimerDirective};
use crate::actuator::{CONTROL_CHARACTERISTIC_UUID, SERVICE_UUID};

/// Errors raised while loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    ReadError {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file or environment overrides could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// The configuration could not be serialized to TOML.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field holds an invalid value.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} validation errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Actuator link settings.
    pub actuator: ActuatorConfig,
    /// System monitor settings.
    pub monitor: MonitorConfig,
    /// Battery estimation settings.
    pub battery: BatteryConfig,
    /// Automatic reconnect settings.
    pub reconnect: ReconnectConfig,
    /// Pattern sent when cueing is started from the button.
    pub cueing: CueingConfig,
    /// Hardware backend selection.
    pub hardware: HardwareConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Actuator link settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    /// How long to scan for the actuator before giving up, in seconds.
    pub discovery_timeout_secs: f64,
    /// Advertised service UUID of the actuator unit.
    pub service_uuid: Uuid,
    /// Control characteristic UUID commands are written to.
    pub control_uuid: Uuid,
}

impl ActuatorConfig {
    /// Discovery timeout as a [`Duration`].
    #[must_use]
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.discovery_timeout_secs)
    }
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            discovery_timeout_secs: 5.0,
            service_uuid: SERVICE_UUID,
            control_uuid: CONTROL_CHARACTERISTIC_UUID,
        }
    }
}

/// System monitor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Time between monitor cycles, in milliseconds.
    pub poll_interval_ms: u64,
}

impl MonitorConfig {
    /// Poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
        }
    }
}

/// Battery estimation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    /// Time on battery after which "full" becomes "low", in seconds.
    pub full_to_low_secs: u64,
    /// Time at "low" after which the level becomes "empty", in seconds.
    pub low_to_empty_secs: u64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            full_to_low_secs: 21_600,
            low_to_empty_secs: 3_600,
        }
    }
}

/// What the device does after the actuator link goes down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Recouple on the next monitor cycle after every disconnect, for as long
    /// as the device runs. There is no backoff and no attempt limit: a cueing
    /// device must keep trying to reach its actuator.
    #[default]
    Unbounded,
    /// Never recouple automatically.
    Disabled,
}

/// Automatic reconnect settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Reconnect policy.
    pub policy: ReconnectPolicy,
}

/// Default cueing pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CueingConfig {
    /// Vibration on-time per pulse, in milliseconds.
    pub pulse_on_ms: u16,
    /// Pulse period, in milliseconds.
    pub period_ms: u16,
    /// Delay before the first pulse, in milliseconds.
    pub initial_delay_ms: u16,
    /// Number of pulses, 0 for infinite.
    pub pulse_count: u8,
    /// Vibration intensity, 0 to 100.
    pub intensity: u8,
    /// Which motors to drive.
    pub motors: MotorMask,
    /// Whether the actuator restarts its session timer.
    pub reset_timer: bool,
}

impl CueingConfig {
    /// Build the pulse pattern described by this section.
    ///
    /// # Errors
    ///
    /// Returns an error if the intensity is above 100.
    pub fn pattern(&self) -> Result<PulsePattern, CommandError> {
        Ok(PulsePattern::new(self.intensity)?
            .with_pulse_on_ms(self.pulse_on_ms)
            .with_period_ms(self.period_ms)
            .with_initial_delay_ms(self.initial_delay_ms)
            .with_pulse_count(self.pulse_count)
            .with_motors(self.motors)
            .with_timer(if self.reset_timer {
                TimerDirective::Reset
            } else {
                TimerDirective::Keep
            }))
    }
}

impl Default for CueingConfig {
    fn default() -> Self {
        Self {
            pulse_on_ms: 100,
            period_ms: 1_000,
            initial_delay_ms: 0,
            pulse_count: 0,
            intensity: 80,
            motors: MotorMask::Both,
            reset_timer: true,
        }
    }
}

/// Which hardware backend drives the charger, LEDs and pins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareBackend {
    /// Linux sysfs classes (`power_supply`, `leds`, `gpio`).
    #[default]
    Sysfs,
    /// In-memory simulation, for development without the board.
    Simulated,
}

/// Hardware settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Selected backend.
    pub backend: HardwareBackend,
    /// Settings for the sysfs backend.
    pub sysfs: SysfsConfig,
    /// Button GPIO line, if a button is fitted.
    pub button_gpio: Option<u32>,
    /// Whether the button pulls its line low when pressed.
    pub button_active_low: bool,
    /// LDO power-good GPIO line, if wired.
    pub power_good_gpio: Option<u32>,
}

/// Sysfs backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SysfsConfig {
    /// Root of the sysfs class hierarchy.
    pub class_root: PathBuf,
    /// `power_supply` entry of the battery.
    pub battery_supply: String,
    /// `power_supply` entry of the DC input.
    pub dc_supply: String,
    /// `leds` entry showing the actuator link.
    pub connection_led: String,
    /// `leds` entry showing the battery level.
    pub battery_led: String,
    /// `leds` entry showing charging.
    pub charge_led: String,
    /// `leds` entry for temperature and power alerts.
    pub alert_led: Option<String>,
}

impl Default for SysfsConfig {
    fn default() -> Self {
        Self {
            class_root: PathBuf::from("/sys/class"),
            battery_supply: "battery".to_string(),
            dc_supply: "ac".to_string(),
            connection_led: "gaitcue:blue:link".to_string(),
            battery_led: "gaitcue:green:battery".to_string(),
            charge_led: "gaitcue:amber:charge".to_string(),
            alert_led: Some("gaitcue:red:alert".to_string()),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when neither `RUST_LOG` nor
    /// `GAITCUE_LOG_LEVEL` is set.
    pub level: String,
    /// JSON file logging plus compact stdout instead of pretty stdout.
    pub production: bool,
    /// Log directory for production mode.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            production: false,
            directory: None,
        }
    }
}

/// `GAITCUE__SECTION__FIELD` overrides from the process environment.
fn environment() -> config::Environment {
    config::Environment::with_prefix("GAITCUE")
        .separator("__")
        .try_parsing(true)
}

impl Config {
    /// Load configuration from `path` and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be parsed, or fails
    /// validation.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        Self::build(Some(path), environment())
    }

    /// Load configuration from `path`, or from defaults plus environment
    /// overrides if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or if the
    /// result fails validation.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::load_or_default_with(path.as_ref(), environment())
    }

    fn load_or_default_with(path: &Path, env: config::Environment) -> ConfigResult<Self> {
        if path.exists() {
            Self::build(Some(path), env)
        } else {
            tracing::info!(path = %path.display(), "no configuration file, using defaults");
            Self::build(None, env)
        }
    }

    fn build(file: Option<&Path>, env: config::Environment) -> ConfigResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder =
                builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }
        let config: Self = builder.add_source(env).build()?.try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path` as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized or written.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every field, collecting all problems.
    ///
    /// # Errors
    ///
    /// Returns the single error, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut fail = |field: &str, message: &str| {
            errors.push(ConfigError::ValidationError {
                field: field.to_string(),
                message: message.to_string(),
            });
        };

        let timeout = self.actuator.discovery_timeout_secs;
        if !timeout.is_finite() || timeout <= 0.0 {
            fail(
                "actuator.discovery_timeout_secs",
                "must be a positive number of seconds",
            );
        }
        if self.actuator.service_uuid.is_nil() {
            fail("actuator.service_uuid", "must not be the nil UUID");
        }
        if self.actuator.control_uuid.is_nil() {
            fail("actuator.control_uuid", "must not be the nil UUID");
        }
        if !(10..=60_000).contains(&self.monitor.poll_interval_ms) {
            fail("monitor.poll_interval_ms", "must be between 10 and 60000");
        }
        if self.battery.full_to_low_secs == 0 {
            fail("battery.full_to_low_secs", "must be greater than zero");
        }
        if self.battery.low_to_empty_secs == 0 {
            fail("battery.low_to_empty_secs", "must be greater than zero");
        }
        if self.cueing.intensity > 100 {
            fail("cueing.intensity", "must be between 0 and 100");
        }
        if self.cueing.period_ms == 0 {
            fail("cueing.period_ms", "must be greater than zero");
        }
        if self.cueing.pulse_on_ms > self.cueing.period_ms {
            fail("cueing.pulse_on_ms", "must not exceed cueing.period_ms");
        }
        if self.logging.level.trim().is_empty() {
            fail("logging.level", "must not be empty");
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Default configuration file location.
    ///
    /// On the device: `/etc/gaitcue/config.toml`.
    /// For development: the platform config directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        #[cfg(target_os = "linux")]
        {
            PathBuf::from("/etc/gaitcue/config.toml")
        }
        #[cfg(not(target_os = "linux"))]
        {
            directories::ProjectDirs::from("", "", "gaitcue").map_or_else(
                || PathBuf::from("gaitcue.toml"),
                |dirs| dirs.config_dir().join("config.toml"),
            )
        }
    }
}
