//! Device access
//!
//! Report sources (USB, tty, replay), report decoding, and the reader thread
//! that bridges a blocking source to the Tokio runtime.

pub mod backoff;
pub mod reader;
pub mod replay;
pub mod report;
pub mod source;
pub mod tty;
pub mod usb;

pub use backoff::ReconnectPolicy;
pub use reader::{ReaderExit, spawn_device_reader};
pub use replay::ReplaySource;
pub use report::decode_report;
pub use source::{DeviceError, ReadOutcome, ReportSource};
pub use tty::TtySource;
pub use usb::{UsbSource, list_devices};
