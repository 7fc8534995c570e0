//! Connection state and its transition rules.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, info};

use crate::events::{Event, EventBus};

/// Actuator link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No link. Initial state, and where every failure ends up.
    Disconnected,
    /// Scanning for the actuator and connecting.
    Discovering,
    /// Link up, control characteristic located.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Discovering => "discovering",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Why the link went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The application asked for it.
    Requested,
    /// The transport reported the link dropped.
    LinkLost,
    /// Discovery finished or timed out without finding the actuator.
    NotFound,
    /// Connecting or locating the control characteristic failed.
    ConnectFailed,
    /// A command write failed and the link was torn down.
    WriteFailed,
    /// The I/O worker was gone when discovery was to be scheduled.
    WorkerStopped,
}

/// Whether `from` to `to` is one of the four edges of the link state machine.
#[must_use]
pub const fn is_legal(from: ConnectionState, to: ConnectionState) -> bool {
    use ConnectionState::{Connected, Disconnected, Discovering};
    matches!(
        (from, to),
        (Disconnected, Discovering)
            | (Discovering, Connected | Disconnected)
            | (Connected, Disconnected)
    )
}

/// Holds the link state and commits transitions.
///
/// A transition is a compare-and-set under the mutex. The matching event is
/// emitted after the guard is dropped, so a handler that reads the state sees
/// the value it was notified about.
pub struct ConnectionStateMachine {
    state: Mutex<ConnectionState>,
    bus: Arc<EventBus>,
}

impl ConnectionStateMachine {
    /// Start in [`ConnectionState::Disconnected`].
    #[must_use]
    pub const fn new(bus: Arc<EventBus>) -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            bus,
        }
    }

    /// Current state.
    #[must_use]
    pub fn current(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `to` if that is legal from the current state.
    ///
    /// Returns the previous state on success. Illegal or idempotent attempts
    /// change nothing and emit nothing.
    pub fn transition(
        &self,
        to: ConnectionState,
        reason: Option<DisconnectReason>,
    ) -> Option<ConnectionState> {
        self.commit(None, to, reason)
    }

    /// Move to `to` only if the current state is `from`.
    pub fn transition_from(
        &self,
        from: ConnectionState,
        to: ConnectionState,
        reason: Option<DisconnectReason>,
    ) -> bool {
        self.commit(Some(from), to, reason).is_some()
    }

    fn commit(
        &self,
        expected: Option<ConnectionState>,
        to: ConnectionState,
        reason: Option<DisconnectReason>,
    ) -> Option<ConnectionState> {
        let from = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let from = *state;
            if expected.is_some_and(|e| e != from) || !is_legal(from, to) {
                debug!(%from, %to, "ignoring transition");
                return None;
            }
            *state = to;
            from
        };

        info!(%from, %to, ?reason, "actuator link state changed");
        let event = match to {
            ConnectionState::Discovering => Event::BleDiscovering,
            ConnectionState::Connected => Event::BleConnected,
            ConnectionState::Disconnected => Event::BleDisconnected {
                reason: reason.unwrap_or(DisconnectReason::Requested),
            },
        };
        self.bus.emit(&event);
        Some(from)
    }
}

impl fmt::Debug for ConnectionStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionStateMachine")
            .field("state", &self.current())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ConnectionState::{Connected, Disconnected, Discovering};

    #[test]
    fn test_legal_edges() {
        assert!(is_legal(Disconnected, Discovering));
        assert!(is_legal(Discovering, Connected));
        assert!(is_legal(Discovering, Disconnected));
        assert!(is_legal(Connected, Disconnected));

        assert!(!is_legal(Disconnected, Connected));
        assert!(!is_legal(Connected, Discovering));
        for state in [Disconnected, Discovering, Connected] {
            assert!(!is_legal(state, state));
        }
    }

    #[test]
    fn test_one_event_per_committed_transition() {
        let bus = Arc::new(EventBus::new());
        let count = Arc::new(AtomicUsize::new(0));
        for kind in EventKind::ALL {
            let count = Arc::clone(&count);
            bus.subscribe(kind, move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        let sm = ConnectionStateMachine::new(Arc::clone(&bus));

        assert_eq!(sm.transition(Discovering, None), Some(Disconnected));
        assert_eq!(sm.transition(Discovering, None), None);
        assert_eq!(sm.transition(Connected, None), Some(Discovering));
        assert_eq!(sm.transition(Discovering, None), None);
        assert_eq!(
            sm.transition(Disconnected, Some(DisconnectReason::LinkLost)),
            Some(Connected)
        );
        assert_eq!(sm.transition(Disconnected, None), None);

        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(sm.current(), Disconnected);
    }

    #[test]
    fn test_handler_sees_new_state() {
        let bus = Arc::new(EventBus::new());
        let sm = Arc::new(ConnectionStateMachine::new(Arc::clone(&bus)));
        let observed = Arc::new(Mutex::new(Vec::new()));

        for kind in [
            EventKind::BleDiscovering,
            EventKind::BleConnected,
            EventKind::BleDisconnected,
        ] {
            let sm = Arc::clone(&sm);
            let observed = Arc::clone(&observed);
            bus.subscribe(kind, move |event| {
                observed.lock().unwrap().push((event.kind(), sm.current()));
            });
        }

        sm.transition(Discovering, None);
        sm.transition(Connected, None);
        sm.transition(Disconnected, Some(DisconnectReason::Requested));

        assert_eq!(
            *observed.lock().unwrap(),
            vec![
                (EventKind::BleDiscovering, Discovering),
                (EventKind::BleConnected, Connected),
                (EventKind::BleDisconnected, Disconnected),
            ]
        );
    }

    #[test]
    fn test_transition_from_requires_expected_state() {
        let sm = ConnectionStateMachine::new(Arc::new(EventBus::new()));
        assert!(!sm.transition_from(Connected, Disconnected, None));
        assert!(sm.transition_from(Disconnected, Discovering, None));
        assert!(!sm.transition_from(Disconnected, Discovering, None));
        assert!(sm.transition_from(Discovering, Connected, None));
        assert!(sm.transition_from(Connected, Disconnected, None));
    }

    #[test]
    fn test_disconnect_reason_is_carried() {
        let bus = Arc::new(EventBus::new());
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reasons);
        bus.subscribe(EventKind::BleDisconnected, move |event| {
            if let Event::BleDisconnected { reason } = event {
                sink.lock().unwrap().push(*reason);
            }
        });
        let sm = ConnectionStateMachine::new(bus);
        sm.transition(Discovering, None);
        sm.transition(Disconnected, Some(DisconnectReason::NotFound));

        assert_eq!(*reasons.lock().unwrap(), vec![DisconnectReason::NotFound]);
    }
}
