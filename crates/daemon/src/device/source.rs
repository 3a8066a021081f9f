//! Report source abstraction
//!
//! A [`ReportSource`] is anything the reader thread can pull raw reports
//! from: a USB bulk endpoint, a serial tty, or a replay file. Sources are
//! opened, read until they fail, closed, and reopened by the reader.

use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;

/// One raw input report as received from the device
pub type RawReport = Vec<u8>;

/// Result of a single read attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A report was read
    Report(RawReport),
    /// Nothing arrived within the timeout
    Idle,
    /// The source will never produce another report
    Exhausted,
}

/// Device-level errors
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device not open")]
    NotOpen,

    #[error("Invalid device configuration: {0}")]
    Config(String),

    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("Terminal error: {0}")]
    Terminal(#[from] nix::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    /// Errors worth retrying; configuration errors never heal on their own
    pub fn is_transient(&self) -> bool {
        !matches!(self, DeviceError::Config(_))
    }
}

/// Source of raw device reports
pub trait ReportSource: Send {
    /// Open (or reopen) the device
    fn open(&mut self) -> Result<(), DeviceError>;

    /// Read the next report, waiting at most `timeout`
    fn read_report(&mut self, timeout: Duration) -> Result<ReadOutcome, DeviceError>;

    /// Release the device; safe to call when not open
    fn close(&mut self);

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

impl<S: ReportSource + ?Sized> ReportSource for Box<S> {
    fn open(&mut self) -> Result<(), DeviceError> {
        (**self).open()
    }

    fn read_report(&mut self, timeout: Duration) -> Result<ReadOutcome, DeviceError> {
        (**self).read_report(timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Splits a byte stream into one-byte reports
///
/// USB and tty transports hand over whatever bytes have accumulated; each
/// byte is a report of its own. Bytes already read survive a close so none
/// are lost across a reconnect.
#[derive(Debug, Default)]
pub struct ByteReports {
    pending: VecDeque<u8>,
}

impl ByteReports {
    /// Read chunk size
    pub const CHUNK: usize = 64;

    pub fn new() -> Self {
        Self::default()
    }

    /// Next buffered report, if any
    pub fn pop(&mut self) -> Option<RawReport> {
        self.pending.pop_front().map(|byte| vec![byte])
    }

    /// Fill from the transport and return the first new report
    ///
    /// `fill` returns the number of bytes written into the buffer, 0 on timeout.
    pub fn refill<F>(&mut self, fill: F) -> Result<ReadOutcome, DeviceError>
    where
        F: FnOnce(&mut [u8]) -> Result<usize, DeviceError>,
    {
        let mut buf = [0u8; Self::CHUNK];
        let read = fill(&mut buf)?;
        self.pending.extend(&buf[..read.min(Self::CHUNK)]);
        Ok(self
            .pop()
            .map(ReadOutcome::Report)
            .unwrap_or(ReadOutcome::Idle))
    }
}
