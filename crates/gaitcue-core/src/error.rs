//! Unified error types for the gaitcue core library.
//!
//! This module provides a unified error type [`GaitcueError`] that covers all failure
//! modes across the gaitcue system. Each module also has its own specific error types
//! (`ActuatorError`, `TransportError`, `HardwareError`, `ConfigError`, `CommandError`)
//! for internal use.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure mode
//! - **Actionable messages**: Error messages guide users toward resolution
//! - **Context preservation**: Wrapped errors maintain their original context
//! - **No fatal path**: Every actuator failure degrades to a disconnected link that
//!   the monitor can retry, so nothing here is meant to abort the process
//!
//! # Example
//!
//! ```rust
//! use gaitcue_core::error::{GaitcueError, Result};
//! use std::path::PathBuf;
//!
//! fn load_config(path: &PathBuf) -> Result<()> {
//!     if !path.exists() {
//!         return Err(GaitcueError::ConfigNotFound(path.clone()));
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::actuator::ConnectionState;

/// The unified error type for all gaitcue operations.
#[derive(Debug, Error)]
pub enum GaitcueError {
    // =========================================================================
    // ACTUATOR ERRORS
    // =========================================================================
    /// The operation is not allowed in the current connection state.
    #[error("Cannot {operation} while the actuator is {state}")]
    Inadequate {
        /// The rejected operation.
        operation: &'static str,
        /// The state the actuator was in.
        state: ConnectionState,
    },

    /// The background I/O worker has already been shut down.
    #[error("Actuator I/O worker has stopped. The device is closing or has been closed.")]
    WorkerStopped,

    /// The background I/O worker could not be started.
    #[error("Failed to start actuator I/O worker: {0}")]
    WorkerStartFailed(String),

    /// An actuator command could not be encoded.
    #[error("Invalid actuator command: {0}")]
    InvalidCommand(String),

    // =========================================================================
    // TRANSPORT ERRORS
    // =========================================================================
    /// No Bluetooth adapter could be used.
    #[error("Bluetooth adapter unavailable: {0}. Ensure bluetoothd is running and the adapter is powered.")]
    BluetoothAdapterUnavailable(String),

    /// The actuator was not found during discovery.
    #[error("Actuator not found: {0}. Ensure the actuator unit is powered on and within range.")]
    ActuatorNotFound(String),

    /// A BLE transport operation failed.
    #[error("BLE transport failed: {0}")]
    TransportFailed(String),

    // =========================================================================
    // HARDWARE ERRORS
    // =========================================================================
    /// A status source (charger, GPIO) could not be read or written.
    #[error("Hardware access failed: {0}")]
    HardwareFailed(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // I/O ERRORS
    // =========================================================================
    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for gaitcue operations.
pub type Result<T> = std::result::Result<T, GaitcueError>;

/// Short alias for [`GaitcueError`].
pub type Error = GaitcueError;

impl GaitcueError {
    /// Returns `true` if this error comes from the BLE transport layer.
    #[inline]
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::BluetoothAdapterUnavailable(_)
                | Self::ActuatorNotFound(_)
                | Self::TransportFailed(_)
        )
    }

    /// Returns `true` if the caller asked for something the current state forbids.
    #[inline]
    #[must_use]
    pub const fn is_misuse(&self) -> bool {
        matches!(self, Self::Inadequate { .. } | Self::InvalidCommand(_))
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error is likely recoverable without user intervention.
    ///
    /// Transport failures and status read failures go away on a later attempt;
    /// the monitor keeps retrying both.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ActuatorNotFound(_) | Self::TransportFailed(_) | Self::HardwareFailed(_)
        )
    }

    /// Returns a machine-readable error code for logs.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Inadequate { .. } => "INADEQUATE",
            Self::WorkerStopped => "WORKER_STOPPED",
            Self::WorkerStartFailed(_) => "WORKER_START_FAILED",
            Self::InvalidCommand(_) => "INVALID_COMMAND",
            Self::BluetoothAdapterUnavailable(_) => "BLUETOOTH_ADAPTER_UNAVAILABLE",
            Self::ActuatorNotFound(_) => "ACTUATOR_NOT_FOUND",
            Self::TransportFailed(_) => "TRANSPORT_FAILED",
            Self::HardwareFailed(_) => "HARDWARE_FAILED",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for GaitcueError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::ReadError { path, source } => Self::ConfigParseError(format!(
                "Failed to read {}: {}",
                path.display(),
                source
            )),
            ConfigError::WriteError { path, source } => Self::IoError(std::io::Error::new(
                source.kind(),
                format!("Failed to write {}: {}", path.display(), source),
            )),
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

impl From<crate::actuator::ActuatorError> for GaitcueError {
    fn from(err: crate::actuator::ActuatorError) -> Self {
        use crate::actuator::ActuatorError;
        match err {
            ActuatorError::Inadequate { operation, state } => Self::Inadequate { operation, state },
            ActuatorError::WorkerStopped => Self::WorkerStopped,
            ActuatorError::WorkerStart { message } => Self::WorkerStartFailed(message),
            ActuatorError::Command(e) => Self::InvalidCommand(e.to_string()),
        }
    }
}

impl From<crate::transport::TransportError> for GaitcueError {
    fn from(err: crate::transport::TransportError) -> Self {
        use crate::transport::TransportError;
        match err {
            TransportError::AdapterUnavailable { message } => {
                Self::BluetoothAdapterUnavailable(message)
            }
            TransportError::DeviceNotFound { service } => {
                Self::ActuatorNotFound(format!("no device advertising {service}"))
            }
            TransportError::DiscoveryTimeout { timeout_secs } => Self::ActuatorNotFound(format!(
                "discovery timed out after {timeout_secs:.1} seconds"
            )),
            other => Self::TransportFailed(other.to_string()),
        }
    }
}

impl From<crate::hardware::HardwareError> for GaitcueError {
    fn from(err: crate::hardware::HardwareError) -> Self {
        Self::HardwareFailed(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
