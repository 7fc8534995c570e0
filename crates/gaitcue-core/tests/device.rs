//! End-to-end behaviour of the assembled device against the in-memory
//! transport and simulated board.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use gaitcue_core::actuator::state::is_legal;
use gaitcue_core::config::Config;
use gaitcue_core::{
    Actuator, ActuatorCommand, ActuatorError, BatteryLevel, ConnectionState, DcStatus,
    DeferredJob, DisconnectReason, Event, EventBus, EventKind, GaitDevice, Hardware,
    MockTransport, NullIndicators, ReconnectPolicy, SimulatedBoard, TemperatureRating,
};

fn config(poll_ms: u64) -> Config {
    let mut config = Config::default();
    config.actuator.discovery_timeout_secs = 0.3;
    config.monitor.poll_interval_ms = poll_ms;
    config
}

fn device(config: &Config) -> (GaitDevice, MockTransport, SimulatedBoard) {
    let mock = MockTransport::new();
    let board = SimulatedBoard::new();
    let device =
        GaitDevice::new(config, Arc::new(mock.clone()), Hardware::simulated(&board)).unwrap();
    (device, mock, board)
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

fn record(device: &GaitDevice, kinds: &[EventKind]) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in kinds {
        let seen = Arc::clone(&seen);
        device.subscribe(*kind, move |event| seen.lock().unwrap().push(event.clone()));
    }
    seen
}

const LINK_EVENTS: [EventKind; 3] = [
    EventKind::BleDiscovering,
    EventKind::BleConnected,
    EventKind::BleDisconnected,
];

#[test]
fn test_only_legal_transitions_are_observed() {
    let mut config = config(20);
    config.reconnect.policy = ReconnectPolicy::Disabled;
    let (device, mock, _board) = device(&config);
    let states = Arc::new(Mutex::new(vec![ConnectionState::Disconnected]));
    for kind in LINK_EVENTS {
        let states = Arc::clone(&states);
        device.subscribe(kind, move |event| {
            let state = match event {
                Event::BleDiscovering => ConnectionState::Discovering,
                Event::BleConnected => ConnectionState::Connected,
                _ => ConnectionState::Disconnected,
            };
            states.lock().unwrap().push(state);
        });
    }
    let settled = || {
        let state = device.connection_state();
        state != ConnectionState::Discovering && states.lock().unwrap().last() == Some(&state)
    };

    for round in 0..6 {
        mock.set_present(round % 3 != 1);
        device.couple().unwrap();
        let _ = device.couple();
        wait_until("discovery to finish", settled);

        assert!(device.couple().is_err() || round % 3 == 1);
        wait_until("discovery to finish", settled);

        if device.connection_state() == ConnectionState::Connected {
            if round % 2 == 0 {
                mock.drop_link();
            } else {
                device.decouple().unwrap();
            }
        }
        let _ = device.decouple();
        wait_until("link to drop", || {
            settled() && device.connection_state() == ConnectionState::Disconnected
        });
    }
    device.close();

    let states = states.lock().unwrap();
    assert!(states.len() > 6);
    for pair in states.windows(2) {
        assert!(is_legal(pair[0], pair[1]), "illegal {} -> {}", pair[0], pair[1]);
    }
}

#[test]
fn test_couple_while_busy_is_a_silent_no_op() {
    let (device, mock, _board) = device(&config(60_000));
    mock.set_discovery_delay(Duration::from_millis(100));
    let seen = record(&device, &LINK_EVENTS);

    device.couple().unwrap();
    assert!(matches!(
        device.couple(),
        Err(ActuatorError::Inadequate {
            state: ConnectionState::Discovering,
            ..
        })
    ));
    wait_until("connected", || {
        device.connection_state() == ConnectionState::Connected
    });
    assert!(device.couple().is_err());

    assert_eq!(
        *seen.lock().unwrap(),
        vec![Event::BleDiscovering, Event::BleConnected]
    );
    assert_eq!(device.connection_state(), ConnectionState::Connected);
}

#[test]
fn test_handlers_see_the_new_state() {
    let bus = Arc::new(EventBus::new());
    let mock = MockTransport::new();
    let actuator = Arc::new(
        Actuator::new(
            config(500).actuator,
            Arc::new(mock.clone()),
            Arc::clone(&bus),
        )
        .unwrap(),
    );

    let observed = Arc::new(Mutex::new(Vec::new()));
    for kind in LINK_EVENTS {
        let weak = Arc::downgrade(&actuator);
        let observed = Arc::clone(&observed);
        bus.subscribe(kind, move |event| {
            if let Some(actuator) = weak.upgrade() {
                observed
                    .lock()
                    .unwrap()
                    .push((event.kind(), actuator.connection_state()));
            }
        });
    }

    actuator.couple().unwrap();
    wait_until("connected", || {
        actuator.connection_state() == ConnectionState::Connected
    });
    actuator.decouple().unwrap();
    actuator.shutdown();

    assert_eq!(
        *observed.lock().unwrap(),
        vec![
            (EventKind::BleDiscovering, ConnectionState::Discovering),
            (EventKind::BleConnected, ConnectionState::Connected),
            (EventKind::BleDisconnected, ConnectionState::Disconnected),
        ]
    );
}

#[test]
fn test_link_loss_arms_recouple() {
    // The monitor cycles once at start-up and then not again during the test.
    let (device, mock, _board) = device(&config(60_000));
    let seen = record(&device, &[EventKind::BleDisconnected]);

    device.couple().unwrap();
    wait_until("connected", || {
        device.connection_state() == ConnectionState::Connected
    });
    mock.drop_link();
    wait_until("disconnected", || {
        device.connection_state() == ConnectionState::Disconnected
    });

    assert_eq!(
        *seen.lock().unwrap(),
        vec![Event::BleDisconnected {
            reason: DisconnectReason::LinkLost
        }]
    );
    assert_eq!(device.pending_jobs(), DeferredJob::RECOUPLE_ACTUATOR);
}

#[test]
fn test_next_cycle_recouples_exactly_once() {
    let (device, mock, _board) = device(&config(20));
    device.couple().unwrap();
    wait_until("connected", || mock.is_connected());
    assert_eq!(mock.discover_calls(), 1);

    thread::sleep(Duration::from_millis(100));
    mock.drop_link();
    wait_until("recoupled", || mock.connect_calls() == 2);
    wait_until("connected again", || {
        device.connection_state() == ConnectionState::Connected
    });
    thread::sleep(Duration::from_millis(100));

    assert_eq!(mock.discover_calls(), 2);
    assert!(device.pending_jobs().is_empty());
}

#[test]
fn test_failed_recouple_keeps_retrying() {
    let (device, mock, _board) = device(&config(20));
    mock.set_present(false);
    device.couple().unwrap();

    wait_until("several attempts", || mock.discover_calls() >= 3);
    mock.set_present(true);
    wait_until("connected", || {
        device.connection_state() == ConnectionState::Connected
    });
}

#[test]
fn test_disabled_policy_does_not_recouple() {
    let mut config = config(20);
    config.reconnect.policy = ReconnectPolicy::Disabled;
    let (device, mock, _board) = device(&config);

    device.couple().unwrap();
    wait_until("connected", || {
        device.connection_state() == ConnectionState::Connected
    });
    mock.drop_link();
    wait_until("disconnected", || {
        device.connection_state() == ConnectionState::Disconnected
    });
    thread::sleep(Duration::from_millis(100));

    assert!(device.pending_jobs().is_empty());
    assert_eq!(mock.discover_calls(), 1);
}

#[test]
fn test_send_requires_link() {
    let (device, mock, _board) = device(&config(60_000));
    let start = ActuatorCommand::Start(config(0).cueing.pattern().unwrap());

    assert!(matches!(
        device.send(&start),
        Err(ActuatorError::Inadequate {
            operation: "send",
            ..
        })
    ));
    assert!(mock.written().is_empty());

    device.couple().unwrap();
    wait_until("connected", || {
        device.connection_state() == ConnectionState::Connected
    });
    device.send(&start).unwrap();
    device.send(&ActuatorCommand::Stop).unwrap();
    assert_eq!(mock.written(), vec![start.encode(), vec![0x02]]);
}

#[test]
fn test_close_decouples_once_and_releases_worker() {
    let (device, mock, _board) = device(&config(20));
    device.couple().unwrap();
    wait_until("connected", || {
        device.connection_state() == ConnectionState::Connected
    });

    device.close();
    device.close();

    assert!(device.is_closed());
    assert_eq!(mock.disconnect_calls(), 1);
    assert_eq!(device.connection_state(), ConnectionState::Disconnected);
    // No recouple is armed for the shutdown disconnect, and the worker is gone.
    assert!(device.pending_jobs().is_empty());
    assert_eq!(device.couple(), Err(ActuatorError::WorkerStopped));
}

#[test]
fn test_close_while_discovering_leaves_no_link() {
    let (device, mock, _board) = device(&config(60_000));
    mock.set_discovery_delay(Duration::from_millis(50));
    device.couple().unwrap();
    device.close();

    assert!(!mock.is_connected());
    assert_eq!(device.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn test_charger_events_and_status() {
    let (device, _mock, board) = device(&config(10));
    let seen = record(
        &device,
        &[
            EventKind::DcPlugged,
            EventKind::DcUnplugged,
            EventKind::TempCritical,
            EventKind::TempNormal,
            EventKind::PowerCritical,
            EventKind::PowerNormal,
        ],
    );
    let count = |seen: &Mutex<Vec<Event>>| seen.lock().unwrap().len();

    board.set_dc_status(DcStatus::Valid);
    wait_until("plugged", || count(&seen) == 1);
    board.set_charger_temp(Some(TemperatureRating::WARM));
    board.set_battery_temp(Some(TemperatureRating::COLD));
    wait_until("critical", || count(&seen) == 2);
    board.set_battery_temp(None);
    wait_until("normal", || count(&seen) == 3);
    board.set_power_good(false);
    wait_until("power critical", || count(&seen) == 4);
    board.set_dc_status(DcStatus::Absent);
    wait_until("unplugged", || count(&seen) == 5);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            Event::DcPlugged,
            Event::TempCritical(TemperatureRating::COLD),
            Event::TempNormal(TemperatureRating::WARM),
            Event::PowerCritical,
            Event::DcUnplugged,
        ]
    );

    let status = device.status();
    assert_eq!(status.dc, Some(DcStatus::Absent));
    assert_eq!(status.temperature, Some(TemperatureRating::WARM));
    assert_eq!(status.power_good, Some(false));
    assert_eq!(status.battery_level, BatteryLevel::Full);
}

#[test]
fn test_button_press_reaches_subscribers() {
    let mock = MockTransport::new();
    let board = SimulatedBoard::new();
    let device = GaitDevice::with_indicators(
        &config(60_000),
        Arc::new(mock),
        Hardware::simulated(&board),
        Arc::new(NullIndicators),
    )
    .unwrap();
    let seen = record(&device, &[EventKind::ButtonPressed]);

    board.set_button(true);
    wait_until("press", || !seen.lock().unwrap().is_empty());
    board.set_button(false);
    thread::sleep(Duration::from_millis(100));

    assert_eq!(*seen.lock().unwrap(), vec![Event::ButtonPressed]);
}

#[test]
fn test_temperature_combine_table() {
    use TemperatureRating as T;
    assert_eq!(T::combine(Some(T::WARM), Some(T::HOT)), T::HOT);
    assert_eq!(T::combine(Some(T::OK), Some(T::COLD)), T::COLD);
    assert_eq!(T::combine(Some(T::WARM), Some(T::OK)), T::WARM);
    assert_eq!(T::combine(Some(T::WARM), None), T::WARM);
    assert_eq!(T::combine(None, None), T::OK);
}
