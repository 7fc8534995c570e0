//! # gaitcued
//!
//! Daemon library for the gaitcue wearable.
//!
//! This library provides logging setup, transport selection, the cueing
//! application that runs on top of [`gaitcue_core::GaitDevice`] and hooks
//! for driving the simulated board.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod app;
pub mod logging;
pub mod simulate;

use std::sync::Arc;

use gaitcue_core::Transport;
use tracing::info;

/// The actuator transport this build was compiled for.
///
/// `mock-bluetooth` (or a build without `bluetooth`) runs against the
/// in-memory actuator.
#[cfg(all(feature = "bluetooth", not(feature = "mock-bluetooth")))]
#[must_use]
pub fn transport() -> Arc<dyn Transport> {
    info!("using BlueZ actuator transport");
    Arc::new(gaitcue_core::BluerTransport::new())
}

/// The actuator transport this build was compiled for.
///
/// `mock-bluetooth` (or a build without `bluetooth`) runs against the
/// in-memory actuator.
#[cfg(any(feature = "mock-bluetooth", not(feature = "bluetooth")))]
#[must_use]
pub fn transport() -> Arc<dyn Transport> {
    info!("using in-memory actuator transport");
    Arc::new(gaitcue_core::MockTransport::new())
}
