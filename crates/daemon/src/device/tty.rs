//! Serial tty report source
//!
//! The USB models also enumerate as a CDC ACM serial port (`/dev/ttyACM*`).
//! The tty is switched to raw mode with a short inter-byte timeout so reads
//! return periodically even when the device is quiet.

use super::report::INIT_SEQUENCE;
use super::source::{ByteReports, DeviceError, ReadOutcome, ReportSource};
use nix::sys::termios::{self, BaudRate, SetArg, SpecialCharacterIndices};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;

/// Consecutive early zero-byte reads taken as a hangup
const HANGUP_EOFS: u32 = 3;

/// Tells a hung-up line from a quiet one
///
/// With VMIN=0 a quiet line returns 0 bytes once VTIME expires. A hung-up
/// line returns 0 bytes at once, on every read.
#[derive(Debug)]
struct HangupDetector {
    early: Duration,
    eofs: u32,
}

impl HangupDetector {
    fn new(vtime: Duration) -> Self {
        Self {
            early: vtime / 2,
            eofs: 0,
        }
    }

    /// Record one read; true once the line looks hung up
    fn observe(&mut self, read: usize, elapsed: Duration) -> bool {
        if read == 0 && elapsed < self.early {
            self.eofs += 1;
        } else {
            self.eofs = 0;
        }
        self.eofs >= HANGUP_EOFS
    }
}

/// Reads one-byte reports from a serial device node
pub struct TtySource {
    path: PathBuf,
    send_init: bool,
    read_timeout: Duration,
    file: Option<File>,
    reports: ByteReports,
    hangup: HangupDetector,
}

impl TtySource {
    pub fn new(path: PathBuf, send_init: bool, read_timeout: Duration) -> Self {
        Self {
            path,
            send_init,
            read_timeout,
            file: None,
            reports: ByteReports::new(),
            hangup: HangupDetector::new(Duration::ZERO),
        }
    }

    /// Read timeout in tenths of a second (VTIME), at least 1
    fn vtime(&self) -> u8 {
        let tenths = self.read_timeout.as_millis().div_ceil(100);
        tenths.clamp(1, u8::MAX as u128) as u8
    }

    fn configure(&self, file: &File) -> Result<(), DeviceError> {
        let mut attrs = termios::tcgetattr(file)?;
        termios::cfmakeraw(&mut attrs);
        termios::cfsetspeed(&mut attrs, BaudRate::B115200)?;
        attrs.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        attrs.control_chars[SpecialCharacterIndices::VTIME as usize] = self.vtime();
        termios::tcsetattr(file, SetArg::TCSANOW, &attrs)?;
        Ok(())
    }
}

impl ReportSource for TtySource {
    fn open(&mut self) -> Result<(), DeviceError> {
        self.close();
        if self.path.as_os_str().is_empty() {
            return Err(DeviceError::Config("tty path is empty".to_string()));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => DeviceError::NotFound(self.path.display().to_string()),
                io::ErrorKind::PermissionDenied => {
                    DeviceError::PermissionDenied(self.path.display().to_string())
                }
                _ => DeviceError::Io(e),
            })?;

        self.configure(&file)?;

        if self.send_init {
            for chunk in INIT_SEQUENCE {
                file.write_all(chunk)?;
            }
            file.flush()?;
            debug!("Sent init sequence to {}", self.path.display());
        }

        self.hangup = HangupDetector::new(Duration::from_millis(u64::from(self.vtime()) * 100));
        self.file = Some(file);
        Ok(())
    }

    fn read_report(&mut self, _timeout: Duration) -> Result<ReadOutcome, DeviceError> {
        if let Some(report) = self.reports.pop() {
            return Ok(ReadOutcome::Report(report));
        }

        let file = self.file.as_mut().ok_or(DeviceError::NotOpen)?;
        let hangup = &mut self.hangup;
        self.reports.refill(|buf| {
            let started = Instant::now();
            match file.read(buf) {
                // VTIME expiry and hangup both read 0 bytes
                Ok(0) if termios::tcgetattr(&*file).is_err() => Err(DeviceError::Disconnected),
                Ok(read) if hangup.observe(read, started.elapsed()) => {
                    Err(DeviceError::Disconnected)
                }
                Ok(read) => Ok(read),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            debug!("Closed {}", self.path.display());
        }
    }

    fn describe(&self) -> String {
        format!("tty {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tty_is_not_found() {
        let mut source = TtySource::new(
            PathBuf::from("/dev/does-not-exist-tourbox"),
            false,
            Duration::from_millis(100),
        );
        let err = source.open().unwrap_err();
        assert!(matches!(err, DeviceError::NotFound(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_empty_path_is_not_transient() {
        let mut source = TtySource::new(PathBuf::new(), false, Duration::from_millis(100));
        assert!(!source.open().unwrap_err().is_transient());
    }

    #[test]
    fn test_read_before_open() {
        let mut source = TtySource::new(PathBuf::from("/dev/null"), false, Duration::ZERO);
        assert!(matches!(
            source.read_report(Duration::from_millis(10)),
            Err(DeviceError::NotOpen)
        ));
    }

    #[test]
    fn test_instant_eofs_mean_hangup() {
        let mut hangup = HangupDetector::new(Duration::from_millis(100));
        assert!(!hangup.observe(0, Duration::from_millis(1)));
        assert!(!hangup.observe(0, Duration::ZERO));
        assert!(hangup.observe(0, Duration::from_millis(2)));
    }

    #[test]
    fn test_quiet_line_is_not_hangup() {
        let mut hangup = HangupDetector::new(Duration::from_millis(100));
        for _ in 0..10 {
            assert!(!hangup.observe(0, Duration::from_millis(100)));
        }

        // Data or a full timeout in between resets the count
        assert!(!hangup.observe(0, Duration::ZERO));
        assert!(!hangup.observe(0, Duration::ZERO));
        assert!(!hangup.observe(1, Duration::ZERO));
        assert!(!hangup.observe(0, Duration::ZERO));
        assert!(!hangup.observe(0, Duration::ZERO));
        assert!(!hangup.observe(0, Duration::from_millis(120)));
        assert!(!hangup.observe(0, Duration::ZERO));
    }

    #[test]
    fn test_vtime_rounds_up() {
        let source = |ms| TtySource::new(PathBuf::new(), false, Duration::from_millis(ms));
        assert_eq!(source(0).vtime(), 1);
        assert_eq!(source(100).vtime(), 1);
        assert_eq!(source(250).vtime(), 3);
        assert_eq!(source(60_000).vtime(), u8::MAX);
    }
}
