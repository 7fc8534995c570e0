//! Typed publish/subscribe dispatch of device events.
//!
//! Every event the core can raise is a variant of [`Event`]. Handlers subscribe
//! to an [`EventKind`] and are invoked synchronously, in subscription order, on
//! whichever thread emitted the event: the actuator I/O worker for link events,
//! the monitor thread for power and temperature events, the button thread for
//! presses.
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use gaitcue_core::events::{Event, EventBus, EventKind};
//!
//! let bus = EventBus::new();
//! let presses = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&presses);
//! bus.subscribe(EventKind::ButtonPressed, move |_| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//! bus.emit(&Event::ButtonPressed);
//! assert_eq!(presses.load(Ordering::SeqCst), 1);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::trace;

use crate::actuator::DisconnectReason;
use crate::temperature::TemperatureRating;

/// A discrete event raised by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// Actuator discovery has started.
    BleDiscovering,
    /// The actuator link is up and the control characteristic was found.
    BleConnected,
    /// The actuator link is down.
    BleDisconnected {
        /// Why the link went down.
        reason: DisconnectReason,
    },
    /// DC supply became valid.
    DcPlugged,
    /// DC supply stopped being valid.
    DcUnplugged,
    /// The combined temperature rating entered the cold-or-hot range.
    TempCritical(TemperatureRating),
    /// The combined temperature rating left the cold-or-hot range.
    TempNormal(TemperatureRating),
    /// The LDO power-good pin dropped.
    PowerCritical,
    /// The LDO power-good pin recovered.
    PowerNormal,
    /// The user button was pressed (debounced).
    ButtonPressed,
}

/// Payload-free discriminant of [`Event`], used as the dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// See [`Event::BleDiscovering`].
    BleDiscovering,
    /// See [`Event::BleConnected`].
    BleConnected,
    /// See [`Event::BleDisconnected`].
    BleDisconnected,
    /// See [`Event::DcPlugged`].
    DcPlugged,
    /// See [`Event::DcUnplugged`].
    DcUnplugged,
    /// See [`Event::TempCritical`].
    TempCritical,
    /// See [`Event::TempNormal`].
    TempNormal,
    /// See [`Event::PowerCritical`].
    PowerCritical,
    /// See [`Event::PowerNormal`].
    PowerNormal,
    /// See [`Event::ButtonPressed`].
    ButtonPressed,
}

impl EventKind {
    /// Every event kind, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::BleDiscovering,
        Self::BleConnected,
        Self::BleDisconnected,
        Self::DcPlugged,
        Self::DcUnplugged,
        Self::TempCritical,
        Self::TempNormal,
        Self::PowerCritical,
        Self::PowerNormal,
        Self::ButtonPressed,
    ];
}

impl Event {
    /// The dispatch key of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::BleDiscovering => EventKind::BleDiscovering,
            Self::BleConnected => EventKind::BleConnected,
            Self::BleDisconnected { .. } => EventKind::BleDisconnected,
            Self::DcPlugged => EventKind::DcPlugged,
            Self::DcUnplugged => EventKind::DcUnplugged,
            Self::TempCritical(_) => EventKind::TempCritical,
            Self::TempNormal(_) => EventKind::TempNormal,
            Self::PowerCritical => EventKind::PowerCritical,
            Self::PowerNormal => EventKind::PowerNormal,
            Self::ButtonPressed => EventKind::ButtonPressed,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BleDiscovering => "ble_discovering",
            Self::BleConnected => "ble_connected",
            Self::BleDisconnected => "ble_disconnected",
            Self::DcPlugged => "dc_plugged",
            Self::DcUnplugged => "dc_unplugged",
            Self::TempCritical => "temp_critical",
            Self::TempNormal => "temp_normal",
            Self::PowerCritical => "power_critical",
            Self::PowerNormal => "power_normal",
            Self::ButtonPressed => "button_pressed",
        };
        f.write_str(name)
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Multi-subscriber event dispatcher keyed by [`EventKind`].
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<(SubscriptionId, Handler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `handler` for every event of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        for list in handlers.values_mut() {
            if let Some(pos) = list.iter().position(|(sid, _)| *sid == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of handlers registered for `kind`.
    #[must_use]
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Invoke every handler registered for the event's kind.
    ///
    /// The handler list is cloned before dispatch, so handlers may themselves
    /// emit or subscribe without deadlocking.
    pub fn emit(&self, event: &Event) {
        let targets: Vec<Handler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.kind())
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        trace!(event = %event.kind(), handlers = targets.len(), "dispatching event");
        for handler in targets {
            handler(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<EventKind, usize> =
            handlers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_fan_out_in_subscription_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(EventKind::DcPlugged, move |_| seen.lock().unwrap().push(tag));
        }

        bus.emit(&Event::DcPlugged);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_dispatch_is_keyed_by_kind() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        bus.subscribe(EventKind::BleDisconnected, move |event| {
            assert!(matches!(event, Event::BleDisconnected { .. }));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&Event::BleConnected);
        bus.emit(&Event::BleDisconnected {
            reason: DisconnectReason::LinkLost,
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let id = bus.subscribe(EventKind::ButtonPressed, |_| panic!("should not run"));
        assert_eq!(bus.handler_count(EventKind::ButtonPressed), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&Event::ButtonPressed);
        assert_eq!(bus.handler_count(EventKind::ButtonPressed), 0);
    }

    #[test]
    fn test_handler_may_reenter_bus() {
        let bus = Arc::new(EventBus::new());
        let hits = Arc::new(AtomicU64::new(0));

        let inner_bus = Arc::clone(&bus);
        bus.subscribe(EventKind::PowerCritical, move |_| {
            inner_bus.emit(&Event::PowerNormal);
        });
        let counter = Arc::clone(&hits);
        bus.subscribe(EventKind::PowerNormal, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&Event::PowerCritical);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_every_kind_round_trips_through_event() {
        let events = [
            Event::BleDiscovering,
            Event::BleConnected,
            Event::BleDisconnected {
                reason: DisconnectReason::Requested,
            },
            Event::DcPlugged,
            Event::DcUnplugged,
            Event::TempCritical(TemperatureRating::HOT),
            Event::TempNormal(TemperatureRating::OK),
            Event::PowerCritical,
            Event::PowerNormal,
            Event::ButtonPressed,
        ];
        let kinds: Vec<EventKind> = events.iter().map(Event::kind).collect();
        assert_eq!(kinds, EventKind::ALL.to_vec());
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_string(&Event::BleDisconnected {
            reason: DisconnectReason::LinkLost,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"ble_disconnected","data":{"reason":"link_lost"}}"#);
    }
}
