//! Device reader thread
//!
//! Dedicated OS thread that owns the report source. It reads with a timeout,
//! decodes every report into an event and forwards it to the Tokio runtime
//! over the device channel bridge. Between reads, and while sleeping off a
//! reconnect backoff, it polls for `Shutdown`.

use super::backoff::ReconnectPolicy;
use super::report::decode_report;
use super::source::{DeviceError, ReadOutcome, ReportSource};
use common::{DeviceEvent, DeviceWorker};
use protocol::Event;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Longest uninterrupted sleep while backing off
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Why the reader thread stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// Shutdown requested (or the runtime side went away)
    Shutdown,
    /// Source has no more reports
    Exhausted,
    /// Retry budget exhausted or non-transient error
    Fatal,
}

/// Reader connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Connecting,
    Connected,
    Degraded { attempt: u32 },
}

/// Device reader
///
/// Owns the source and the worker side of the channel bridge.
pub struct DeviceReader<S: ReportSource> {
    source: S,
    worker: DeviceWorker,
    policy: ReconnectPolicy,
    read_timeout: Duration,
    state: ReaderState,
}

impl<S: ReportSource> DeviceReader<S> {
    pub fn new(
        source: S,
        worker: DeviceWorker,
        policy: ReconnectPolicy,
        read_timeout: Duration,
    ) -> Self {
        Self {
            source,
            worker,
            policy,
            read_timeout,
            state: ReaderState::Connecting,
        }
    }

    /// Run until shutdown, exhaustion or a fatal error
    pub fn run(mut self) -> ReaderExit {
        info!("Device reader started for {}", self.source.describe());

        let exit = match self.connect(0) {
            Ok(()) => self.read_loop(),
            Err(exit) => exit,
        };

        self.source.close();
        info!("Device reader stopped ({:?}, last state {:?})", exit, self.state);
        exit
    }

    fn read_loop(&mut self) -> ReaderExit {
        loop {
            if self.worker.should_stop() {
                return ReaderExit::Shutdown;
            }

            match self.source.read_report(self.read_timeout) {
                Ok(ReadOutcome::Report(report)) => {
                    let event = decode_report(&report);
                    if event == Event::Unknown {
                        debug!("Unmapped report {:02x?}", report);
                    }
                    if !self.send(DeviceEvent::Input(event)) {
                        return ReaderExit::Shutdown;
                    }
                }
                Ok(ReadOutcome::Idle) => {}
                Ok(ReadOutcome::Exhausted) => {
                    info!("{} exhausted", self.source.describe());
                    self.send(DeviceEvent::Exhausted);
                    return ReaderExit::Exhausted;
                }
                Err(e) => {
                    warn!("Read from {} failed: {}", self.source.describe(), e);
                    self.source.close();
                    if let Err(exit) = self.fail(1, &e).and_then(|()| self.connect(1)) {
                        return exit;
                    }
                }
            }
        }
    }

    /// Open the source, retrying with backoff
    ///
    /// `failures` counts consecutive failures already recorded. The first
    /// successful open reports `Opened`, later ones `Reconnected`.
    fn connect(&mut self, mut failures: u32) -> Result<(), ReaderExit> {
        let reconnecting = failures > 0 || self.state != ReaderState::Connecting;

        loop {
            if self.worker.should_stop() {
                return Err(ReaderExit::Shutdown);
            }

            match self.source.open() {
                Ok(()) => {
                    let description = self.source.describe();
                    let event = if reconnecting {
                        info!("Reconnected to {} after {} attempts", description, failures);
                        DeviceEvent::Reconnected {
                            description,
                            attempts: failures,
                        }
                    } else {
                        info!("Reading from {}", description);
                        DeviceEvent::Opened { description }
                    };
                    self.state = ReaderState::Connected;
                    return if self.send(event) {
                        Ok(())
                    } else {
                        Err(ReaderExit::Shutdown)
                    };
                }
                Err(e) => {
                    failures += 1;
                    self.fail(failures, &e)?;
                }
            }
        }
    }

    /// Record a failure, then either give up or sleep off the backoff
    fn fail(&mut self, attempt: u32, err: &DeviceError) -> Result<(), ReaderExit> {
        if !err.is_transient() || self.policy.is_exhausted(attempt) {
            error!(
                "Giving up on {} after {} attempts: {}",
                self.source.describe(),
                attempt,
                err
            );
            self.send(DeviceEvent::Fatal {
                error: err.to_string(),
            });
            return Err(ReaderExit::Fatal);
        }

        let retry_in = self.policy.delay(attempt);
        warn!(
            "Device unavailable ({}), attempt {}, retrying in {:?}",
            err, attempt, retry_in
        );
        self.state = ReaderState::Degraded { attempt };
        if !self.send(DeviceEvent::Degraded {
            attempt,
            error: err.to_string(),
            retry_in,
        }) {
            return Err(ReaderExit::Shutdown);
        }

        if self.sleep_unless_stopped(retry_in) {
            Ok(())
        } else {
            Err(ReaderExit::Shutdown)
        }
    }

    /// Sleep in slices; false if shutdown was requested meanwhile
    fn sleep_unless_stopped(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.worker.should_stop() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }

    /// False once the runtime side has gone away
    fn send(&self, event: DeviceEvent) -> bool {
        match self.worker.send_event(event) {
            Ok(()) => true,
            Err(e) => {
                debug!("Runtime stopped listening: {}", e);
                false
            }
        }
    }
}

/// Spawn the reader on its own named thread
pub fn spawn_device_reader<S>(
    source: S,
    worker: DeviceWorker,
    policy: ReconnectPolicy,
    read_timeout: Duration,
) -> std::io::Result<JoinHandle<ReaderExit>>
where
    S: ReportSource + 'static,
{
    thread::Builder::new()
        .name("device-reader".to_string())
        .spawn(move || DeviceReader::new(source, worker, policy, read_timeout).run())
}
