//! Common utilities for the TourBox daemon and host bridge
//!
//! This crate provides shared functionality between the daemon and the
//! bridge, including error handling, logging setup, and the async channel
//! bridge between the daemon's Tokio runtime and its device reader thread.

pub mod channel;
pub mod error;
pub mod logging;
pub mod test_utils;

pub use channel::{DeviceBridge, DeviceCommand, DeviceEvent, DeviceWorker, create_device_bridge};
pub use error::{Error, Result};
pub use logging::setup_logging;
