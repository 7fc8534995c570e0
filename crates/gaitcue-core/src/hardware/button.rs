//! Debounced push button.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use super::ButtonInput;
use crate::events::{Event, EventBus};

/// How often the pin is sampled.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

/// How long a level must hold before it counts.
pub const DEBOUNCE: Duration = Duration::from_millis(50);

/// Level filter: reports a press once the pressed level has held for the
/// debounce time, and not again until a release has held as long.
#[derive(Debug, Clone)]
pub struct Debouncer {
    stable: bool,
    candidate: bool,
    since: Instant,
    hold: Duration,
}

impl Debouncer {
    /// Released, as of `now`.
    #[must_use]
    pub const fn new(hold: Duration, now: Instant) -> Self {
        Self {
            stable: false,
            candidate: false,
            since: now,
            hold,
        }
    }

    /// Feed one sample; `true` exactly when a press is confirmed.
    pub fn sample(&mut self, pressed: bool, now: Instant) -> bool {
        if pressed != self.candidate {
            self.candidate = pressed;
            self.since = now;
            return false;
        }
        if self.candidate == self.stable || now.duration_since(self.since) < self.hold {
            return false;
        }
        self.stable = self.candidate;
        self.stable
    }
}

/// Samples the button on its own thread and emits
/// [`Event::ButtonPressed`] once per debounced press.
pub struct ButtonWatcher {
    stop: Mutex<Option<mpsc::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ButtonWatcher {
    /// Start watching `input`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sampling thread cannot be spawned.
    pub fn spawn(input: ButtonInput, bus: Arc<EventBus>) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name("gaitcue-button".to_string())
            .spawn(move || sample_loop(&input, &bus, &stop_rx))?;

        Ok(Self {
            stop: Mutex::new(Some(stop_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Stop sampling and join the thread. Idempotent.
    pub fn stop(&self) {
        drop(self.stop.lock().unwrap_or_else(PoisonError::into_inner).take());
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                error!("button thread panicked");
            }
        }
    }
}

impl Drop for ButtonWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ButtonWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let running = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        f.debug_struct("ButtonWatcher")
            .field("running", &running)
            .finish()
    }
}

fn sample_loop(input: &ButtonInput, bus: &EventBus, stop: &mpsc::Receiver<()>) {
    let mut debouncer = Debouncer::new(DEBOUNCE, Instant::now());
    let mut failing = false;
    debug!("button watcher started");

    loop {
        match stop.recv_timeout(SAMPLE_INTERVAL) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let level = match input.pin.is_high() {
            Ok(level) => {
                failing = false;
                level
            }
            Err(e) => {
                if !failing {
                    warn!(error = %e, "cannot read button");
                    failing = true;
                }
                continue;
            }
        };

        if debouncer.sample(level != input.active_low, Instant::now()) {
            debug!("button pressed");
            bus.emit(&Event::ButtonPressed);
        }
    }
    debug!("button watcher stopped");
}
