//! Daemon output reader
//!
//! One thread per running daemon. It reads lines from the daemon's stdout,
//! decodes them, and pushes actionable events onto the host queue. It never
//! calls host code. When the stream ends it reaps the daemon and reports the
//! exit.

use crate::queue::{BridgeMessage, QueueProducer};
use protocol::read_line;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, ExitStatus};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Poll interval while waiting for the daemon to exit after EOF
const REAP_POLL: Duration = Duration::from_millis(10);

/// How long to poll quickly for the daemon to exit after its output ended
const REAP_PATIENCE: Duration = Duration::from_secs(5);

/// Poll interval once the daemon has outlived `REAP_PATIENCE`
const REAP_SLOW_POLL: Duration = Duration::from_millis(250);

/// Daemon process plus its exit status once reaped
///
/// Shared between the host (which may signal the process) and the reader
/// (which reaps it). Signalling happens under the lock and only while
/// `status` is `None`, so a reaped pid is never signalled.
#[derive(Debug)]
pub struct ChildState {
    child: Child,
    status: Option<ExitStatus>,
}

impl ChildState {
    pub fn new(child: Child) -> Self {
        Self {
            child,
            status: None,
        }
    }

    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Reap if the process has exited
    pub fn try_reap(&mut self) -> io::Result<Option<ExitStatus>> {
        if self.status.is_none() {
            self.status = self.child.try_wait()?;
        }
        Ok(self.status)
    }

    /// Kill and reap; used when startup fails halfway
    pub fn kill(&mut self) {
        if self.status.is_some() {
            return;
        }
        if let Err(e) = self.child.kill() {
            debug!("Failed to kill daemon: {}", e);
        }
        match self.child.wait() {
            Ok(status) => self.status = Some(status),
            Err(e) => warn!("Failed to reap daemon: {}", e),
        }
    }
}

pub type SharedChild = Arc<Mutex<ChildState>>;

/// Lock the shared child, recovering from poisoning
pub fn lock_child(child: &SharedChild) -> MutexGuard<'_, ChildState> {
    child.lock().unwrap_or_else(|e| e.into_inner())
}

/// Counts from one output stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadSummary {
    /// Events pushed onto the queue
    pub delivered: u64,
    /// Lines dropped as `Unknown` or blank
    pub discarded: u64,
}

/// Decode lines until EOF, pushing actionable events
pub fn pump_events<R: BufRead>(mut reader: R, producer: &QueueProducer) -> ReadSummary {
    let mut summary = ReadSummary::default();
    let mut buf = Vec::new();

    loop {
        match read_line(&mut reader, &mut buf) {
            Ok(Some(event)) if event.is_actionable() => {
                if !producer.push(BridgeMessage::Event(event)) {
                    debug!("Host queue closed, stopping reader");
                    break;
                }
                summary.delivered += 1;
            }
            Ok(Some(_)) => summary.discarded += 1,
            Ok(None) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Failed to read daemon output: {}", e);
                break;
            }
        }
    }

    summary
}

/// Wait for the daemon to exit, polling under the shared lock
///
/// Polls quickly for `patience`, then slowly until the process is reaped.
/// The lock is released between polls so `stop` can still signal it.
fn reap(child: &SharedChild, patience: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + patience;
    let mut warned = false;
    loop {
        match lock_child(child).try_reap() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to reap daemon: {}", e);
                return None;
            }
        }

        if Instant::now() < deadline {
            thread::sleep(REAP_POLL);
            continue;
        }
        if !warned {
            warn!("Daemon closed its output but is still running, waiting for it to exit");
            warned = true;
        }
        thread::sleep(REAP_SLOW_POLL);
    }
}

/// Spawn the reader thread for one daemon
pub fn spawn_reader<R>(
    output: R,
    child: SharedChild,
    generation: u64,
    producer: QueueProducer,
) -> io::Result<JoinHandle<ReadSummary>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("tourbox-bridge-reader".to_string())
        .spawn(move || {
            let summary = pump_events(BufReader::new(output), &producer);
            let status = reap(&child, REAP_PATIENCE);
            info!(
                "Daemon output ended: {} events delivered, {} lines discarded, status {:?}",
                summary.delivered, summary.discarded, status
            );
            producer.push(BridgeMessage::Exited { generation, status });
            summary
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::event_queue;
    use protocol::{Action, Control, Event};
    use std::io::Cursor;
    use std::process::{Command, Stdio};

    #[test]
    fn test_pump_filters_unknown_and_blank() {
        let (producer, consumer) = event_queue();
        let input = Cursor::new(b"Unknown\n\nMouseWheelUp\n\xff\nTallDialPress".to_vec());

        let summary = pump_events(input, &producer);

        assert_eq!(
            summary,
            ReadSummary {
                delivered: 2,
                discarded: 3
            }
        );
        assert_eq!(
            consumer.pop(),
            Some(BridgeMessage::Event(Event::input(
                Control::MouseWheel,
                Action::Up
            )))
        );
        assert_eq!(
            consumer.pop(),
            Some(BridgeMessage::Event(Event::input(
                Control::TallDial,
                Action::Press
            )))
        );
        assert_eq!(consumer.pop(), None);
    }

    #[test]
    fn test_pump_stops_when_queue_closed() {
        let (producer, consumer) = event_queue();
        drop(consumer);
        let summary = pump_events(Cursor::new(b"DpadUpPress\nDpadUpRelease\n".to_vec()), &producer);
        assert_eq!(summary.delivered, 0);
    }

    #[test]
    fn test_reap_outlasts_patience() {
        let child = Command::new("/bin/sh")
            .args(["-c", "sleep 0.3; exit 4"])
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        let shared: SharedChild = Arc::new(Mutex::new(ChildState::new(child)));

        let status = reap(&shared, Duration::from_millis(20));

        assert_eq!(status.and_then(|s| s.code()), Some(4));
        assert_eq!(lock_child(&shared).status(), status);
    }
}
