//! Test utilities for the TourBox daemon and bridge
//!
//! Provides in-memory writers, event fixtures and timeout helpers for testing
//! across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{SharedBuffer, encode_stream, press_turn_release};
//! use std::io::Write;
//!
//! let buffer = SharedBuffer::new();
//! let mut writer = buffer.clone();
//! writer.write_all(&encode_stream(&press_turn_release())).unwrap();
//! assert_eq!(buffer.lines(), vec!["TallDialPress", "TallDialRight", "TallDialRelease"]);
//! ```

use protocol::{Action, Control, Event, encode_line};
use std::future::Future;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Clonable in-memory writer
///
/// Every clone appends to the same buffer, so a test can hand one clone to
/// the code under test and inspect the output through another.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
    flushes: Arc<Mutex<usize>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().map(|buf| buf.clone()).unwrap_or_default()
    }

    /// Written bytes split into lines (lossy UTF-8, terminators removed)
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.contents())
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Number of `flush` calls seen
    pub fn flush_count(&self) -> usize {
        self.flushes.lock().map(|n| *n).unwrap_or_default()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("buffer lock poisoned"))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut flushes = self
            .flushes
            .lock()
            .map_err(|_| io::Error::other("buffer lock poisoned"))?;
        *flushes += 1;
        Ok(())
    }
}

/// Writer whose reader has gone away (every write fails with `BrokenPipe`)
#[derive(Debug, Clone, Copy, Default)]
pub struct ClosedPipe;

impl Write for ClosedPipe {
    fn write(&mut self, _data: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))
    }
}

/// Encode events as the daemon would write them
pub fn encode_stream(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .flat_map(|event| encode_line(event).into_bytes())
        .collect()
}

/// Press the tall dial, turn it one detent right, release it
pub fn press_turn_release() -> Vec<Event> {
    vec![
        Event::input(Control::TallDial, Action::Press),
        Event::input(Control::TallDial, Action::Right),
        Event::input(Control::TallDial, Action::Release),
    ]
}

/// Raw one-byte reports for [`press_turn_release`]
pub fn press_turn_release_reports() -> Vec<Vec<u8>> {
    vec![vec![0x37], vec![0x44], vec![0xb7]]
}

/// Run a future with a timeout
///
/// # Example
/// ```
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// # #[tokio::main]
/// # async fn main() {
/// let value = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await.unwrap();
/// assert_eq!(value, 42);
/// # }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
