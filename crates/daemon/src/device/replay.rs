//! Replay report source
//!
//! Feeds recorded reports from a text file, one report per line:
//!
//! ```text
//! # press, turn, release the tall dial
//! 37
//! 44
//! 0xb7
//! ```
//!
//! Bytes are hex, optionally `0x`-prefixed and separated by whitespace. `#`
//! starts a comment and blank lines are skipped. A line that does not parse
//! becomes an empty report, which decodes to `Unknown`.

use super::source::{DeviceError, RawReport, ReadOutcome, ReportSource};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Plays back reports recorded in a file
pub struct ReplaySource {
    path: PathBuf,
    pace: Duration,
    hold_open: bool,
    reports: Option<VecDeque<RawReport>>,
    last_report: Option<Instant>,
}

impl ReplaySource {
    pub fn new(path: PathBuf, pace: Duration, hold_open: bool) -> Self {
        Self {
            path,
            pace,
            hold_open,
            reports: None,
            last_report: None,
        }
    }

    /// Reports still queued (0 when not open)
    #[cfg(test)]
    pub fn remaining(&self) -> usize {
        self.reports.as_ref().map(VecDeque::len).unwrap_or(0)
    }
}

impl ReportSource for ReplaySource {
    fn open(&mut self) -> Result<(), DeviceError> {
        let content = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => DeviceError::NotFound(self.path.display().to_string()),
            _ => DeviceError::Io(e),
        })?;

        let reports: VecDeque<RawReport> = content
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let report = parse_report_line(line)?;
                if report.is_empty() {
                    warn!(
                        "{}:{}: unparseable report {:?}",
                        self.path.display(),
                        index + 1,
                        line.trim()
                    );
                }
                Some(report)
            })
            .collect();

        debug!(
            "Loaded {} reports from {}",
            reports.len(),
            self.path.display()
        );
        self.reports = Some(reports);
        self.last_report = None;
        Ok(())
    }

    fn read_report(&mut self, timeout: Duration) -> Result<ReadOutcome, DeviceError> {
        let reports = self.reports.as_mut().ok_or(DeviceError::NotOpen)?;

        if let Some(last) = self.last_report {
            let due = last + self.pace;
            let now = Instant::now();
            if now < due {
                std::thread::sleep((due - now).min(timeout));
                if Instant::now() < due {
                    return Ok(ReadOutcome::Idle);
                }
            }
        }

        match reports.pop_front() {
            Some(report) => {
                self.last_report = Some(Instant::now());
                Ok(ReadOutcome::Report(report))
            }
            None if self.hold_open => {
                std::thread::sleep(timeout);
                Ok(ReadOutcome::Idle)
            }
            None => Ok(ReadOutcome::Exhausted),
        }
    }

    fn close(&mut self) {
        self.reports = None;
    }

    fn describe(&self) -> String {
        format!("replay {}", self.path.display())
    }
}

/// Parse one replay line
///
/// Returns `None` for blank and comment-only lines and an empty report for
/// lines that do not parse.
pub fn parse_report_line(line: &str) -> Option<RawReport> {
    let content = line.split('#').next().unwrap_or_default().trim();
    if content.is_empty() {
        return None;
    }

    let parsed: Result<RawReport, _> = content
        .split_whitespace()
        .map(|token| {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            u8::from_str_radix(digits, 16)
        })
        .collect();

    Some(parsed.unwrap_or_default())
}
