//! BLE transport abstraction.
//!
//! The actuator state machine drives the link through the [`Transport`]
//! trait. Two implementations exist:
//!
//! - [`bluez::BluerTransport`] (feature `bluetooth`) talks to BlueZ
//! - [`mock::MockTransport`] simulates an actuator in memory
//!
//! Transport calls are only ever made from the actuator's I/O worker, one at a
//! time, except [`Transport::link_lost`], which the link watcher awaits while
//! other operations run.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[cfg(feature = "bluetooth")]
pub mod bluez;
pub mod mock;

#[cfg(feature = "bluetooth")]
pub use bluez::BluerTransport;
pub use mock::MockTransport;

/// Errors raised by a transport.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// The Bluetooth adapter or daemon cannot be used.
    #[error("Bluetooth adapter unavailable: {message}")]
    AdapterUnavailable {
        /// Underlying cause.
        message: String,
    },

    /// Scanning could not be started or was interrupted.
    #[error("Discovery failed: {message}")]
    DiscoveryFailed {
        /// Underlying cause.
        message: String,
    },

    /// Scanning ended without seeing the service.
    #[error("No device advertising service {service}")]
    DeviceNotFound {
        /// Service that was looked for.
        service: Uuid,
    },

    /// Scanning ran for the whole discovery timeout without a match.
    #[error("Discovery timed out after {timeout_secs:.1} seconds")]
    DiscoveryTimeout {
        /// The timeout that expired.
        timeout_secs: f64,
    },

    /// The GATT connection could not be established.
    #[error("Connect to {address} failed: {message}")]
    ConnectFailed {
        /// Peer address.
        address: String,
        /// Underlying cause.
        message: String,
    },

    /// The peer does not expose the expected service.
    #[error("Service {uuid} not found on peer")]
    ServiceNotFound {
        /// Missing service.
        uuid: Uuid,
    },

    /// The service does not expose the expected characteristic.
    #[error("Characteristic {uuid} not found on peer")]
    CharacteristicNotFound {
        /// Missing characteristic.
        uuid: Uuid,
    },

    /// An operation needed a link and there is none.
    #[error("Not connected")]
    NotConnected,

    /// A characteristic write was rejected or failed.
    #[error("Write failed: {message}")]
    WriteFailed {
        /// Underlying cause.
        message: String,
    },

    /// Disconnecting failed; the link may already be gone.
    #[error("Disconnect failed: {message}")]
    DisconnectFailed {
        /// Underlying cause.
        message: String,
    },
}

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// A discovered peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Bluetooth address, `AA:BB:CC:DD:EE:FF`.
    pub address: String,
    /// Advertised name, if any.
    pub name: Option<String>,
}

/// BLE operations the actuator needs.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Scan until a peripheral advertising `service` shows up.
    ///
    /// The caller bounds this with the discovery timeout.
    async fn discover(&self, service: Uuid) -> TransportResult<Peer>;

    /// Connect to `peer` and locate `characteristic` inside `service`.
    async fn connect(&self, peer: &Peer, service: Uuid, characteristic: Uuid)
        -> TransportResult<()>;

    /// Write `payload` to the control characteristic with a write request.
    async fn write(&self, payload: &[u8]) -> TransportResult<()>;

    /// Tear the link down.
    async fn disconnect(&self) -> TransportResult<()>;

    /// Resolve when the current link drops without being asked to.
    async fn link_lost(&self);
}
