//! BlueZ transport built on `bluer`.

use std::collections::HashSet;
use std::str::FromStr;

use ::bluer::gatt::remote::{Characteristic, CharacteristicWriteRequest};
use ::bluer::gatt::WriteOp;
use ::bluer::{
    Adapter, AdapterEvent, Address, Device, DeviceEvent, DeviceProperty, DiscoveryFilter,
    DiscoveryTransport, Session,
};
use async_trait::async_trait;
use futures::{pin_mut, StreamExt};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Peer, Transport, TransportError, TransportResult};

struct Bluez {
    _session: Session,
    adapter: Adapter,
}

struct Link {
    device: Device,
    control: Characteristic,
}

/// Control writes are acknowledged by the peer, so a rejected command comes
/// back as an error.
fn write_request() -> CharacteristicWriteRequest {
    CharacteristicWriteRequest {
        op_type: WriteOp::Request,
        ..Default::default()
    }
}

/// Actuator transport over the system BlueZ daemon.
///
/// The adapter is opened lazily on first use, so constructing the transport
/// never fails; an unusable adapter surfaces as
/// [`TransportError::AdapterUnavailable`] from the first operation.
pub struct BluerTransport {
    bluez: OnceCell<Bluez>,
    link: Mutex<Option<Link>>,
}

impl BluerTransport {
    /// Transport on the default adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bluez: OnceCell::const_new(),
            link: Mutex::const_new(None),
        }
    }

    async fn adapter(&self) -> TransportResult<&Adapter> {
        let bluez = self
            .bluez
            .get_or_try_init(|| async {
                let session = Session::new().await.map_err(adapter_error)?;
                let adapter = session.default_adapter().await.map_err(adapter_error)?;
                adapter.set_powered(true).await.map_err(adapter_error)?;
                info!(adapter = adapter.name(), "Bluetooth adapter ready");
                Ok::<_, TransportError>(Bluez {
                    _session: session,
                    adapter,
                })
            })
            .await?;
        Ok(&bluez.adapter)
    }

    async fn find_control(
        device: &Device,
        service: Uuid,
        characteristic: Uuid,
    ) -> TransportResult<Characteristic> {
        let services = device.services().await.map_err(|e| TransportError::ConnectFailed {
            address: device.address().to_string(),
            message: e.to_string(),
        })?;

        for candidate in services {
            if candidate.uuid().await.ok() != Some(service) {
                continue;
            }
            let characteristics = candidate.characteristics().await.map_err(|e| {
                TransportError::ConnectFailed {
                    address: device.address().to_string(),
                    message: e.to_string(),
                }
            })?;
            for ch in characteristics {
                if ch.uuid().await.ok() == Some(characteristic) {
                    return Ok(ch);
                }
            }
            return Err(TransportError::CharacteristicNotFound {
                uuid: characteristic,
            });
        }
        Err(TransportError::ServiceNotFound { uuid: service })
    }
}

impl Default for BluerTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn adapter_error(e: ::bluer::Error) -> TransportError {
    TransportError::AdapterUnavailable {
        message: e.to_string(),
    }
}

#[async_trait]
impl Transport for BluerTransport {
    async fn discover(&self, service: Uuid) -> TransportResult<Peer> {
        let adapter = self.adapter().await?;
        let discovery_error = |e: ::bluer::Error| TransportError::DiscoveryFailed {
            message: e.to_string(),
        };

        adapter
            .set_discovery_filter(DiscoveryFilter {
                uuids: HashSet::from([service]),
                transport: DiscoveryTransport::Le,
                ..Default::default()
            })
            .await
            .map_err(discovery_error)?;

        let events = adapter.discover_devices().await.map_err(discovery_error)?;
        pin_mut!(events);

        while let Some(event) = events.next().await {
            let AdapterEvent::DeviceAdded(address) = event else {
                continue;
            };
            let Ok(device) = adapter.device(address) else {
                continue;
            };
            let advertised = device.uuids().await.ok().flatten().unwrap_or_default();
            if !advertised.contains(&service) {
                debug!(%address, "skipping device without the actuator service");
                continue;
            }
            let name = device.name().await.ok().flatten();
            info!(%address, ?name, "actuator found");
            return Ok(Peer {
                address: address.to_string(),
                name,
            });
        }

        Err(TransportError::DeviceNotFound { service })
    }

    async fn connect(
        &self,
        peer: &Peer,
        service: Uuid,
        characteristic: Uuid,
    ) -> TransportResult<()> {
        let adapter = self.adapter().await?;
        let connect_error = |message: String| TransportError::ConnectFailed {
            address: peer.address.clone(),
            message,
        };

        let address = Address::from_str(&peer.address).map_err(|e| connect_error(e.to_string()))?;
        let device = adapter
            .device(address)
            .map_err(|e| connect_error(e.to_string()))?;
        if !device.is_connected().await.unwrap_or(false) {
            device
                .connect()
                .await
                .map_err(|e| connect_error(e.to_string()))?;
        }

        let control = match Self::find_control(&device, service, characteristic).await {
            Ok(control) => control,
            Err(e) => {
                let _ = device.disconnect().await;
                return Err(e);
            }
        };

        *self.link.lock().await = Some(Link { device, control });
        Ok(())
    }

    async fn write(&self, payload: &[u8]) -> TransportResult<()> {
        let link = self.link.lock().await;
        let link = link.as_ref().ok_or(TransportError::NotConnected)?;
        link.control
            .write_ext(payload, &write_request())
            .await
            .map_err(|e| TransportError::WriteFailed {
                message: e.to_string(),
            })
    }

    async fn disconnect(&self) -> TransportResult<()> {
        let Some(link) = self.link.lock().await.take() else {
            return Err(TransportError::NotConnected);
        };
        link.device
            .disconnect()
            .await
            .map_err(|e| TransportError::DisconnectFailed {
                message: e.to_string(),
            })
    }

    async fn link_lost(&self) {
        let device = match self.link.lock().await.as_ref() {
            Some(link) => link.device.clone(),
            None => return,
        };

        let events = match device.events().await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "cannot watch actuator link, treating it as lost");
                return;
            }
        };
        pin_mut!(events);

        if !device.is_connected().await.unwrap_or(false) {
            return;
        }
        while let Some(event) = events.next().await {
            if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) = event {
                break;
            }
        }
        debug!(address = %device.address(), "actuator link dropped");
    }
}
