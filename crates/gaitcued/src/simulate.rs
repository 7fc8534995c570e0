//! Driving the simulated board from the running daemon.
//!
//! With `hardware.backend = "simulated"` there is no real button, so
//! `SIGUSR1` stands in for a press:
//!
//! ```bash
//! kill -USR1 $(pidof gaitcued)
//! ```

use std::time::Duration;

use gaitcue_core::SimulatedBoard;
use tracing::info;

/// How long a simulated press holds the button down.
pub const PRESS_DURATION: Duration = Duration::from_millis(100);

/// Press and release the simulated button.
pub async fn press_button(board: &SimulatedBoard) {
    board.set_button(true);
    tokio::time::sleep(PRESS_DURATION).await;
    board.set_button(false);
}

/// Press the simulated button on every `SIGUSR1`.
///
/// # Errors
///
/// Returns an error if the signal handler cannot be installed.
#[cfg(unix)]
pub async fn press_on_signal(board: SimulatedBoard) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut presses = signal(SignalKind::user_defined1())?;
    while presses.recv().await.is_some() {
        info!("SIGUSR1, pressing the simulated button");
        press_button(&board).await;
    }
    Ok(())
}
