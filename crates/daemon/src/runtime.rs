//! Daemon run loop
//!
//! Wires a report source to the emitter: spawns the reader thread, forwards
//! decoded events to the output, and drives the lifecycle until a stop
//! condition (shutdown future, device failure, exhaustion, closed output).

use crate::device::{ReconnectPolicy, ReportSource, spawn_device_reader};
use crate::emitter::{EmitError, EventEmitter};
use crate::lifecycle::{DaemonExit, Lifecycle, StopReason};
use common::{DeviceCommand, DeviceEvent, create_device_bridge};
use nix::sys::signal::{SigSet, Signal};
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info};

/// Runs one daemon session
pub struct Daemon<W> {
    lifecycle: Arc<Lifecycle>,
    emitter: EventEmitter<W>,
    policy: ReconnectPolicy,
    read_timeout: Duration,
}

impl<W: Write + Send + 'static> Daemon<W> {
    pub fn new(output: W, policy: ReconnectPolicy, read_timeout: Duration) -> Self {
        Self {
            lifecycle: Arc::new(Lifecycle::new()),
            emitter: EventEmitter::new(output),
            policy,
            read_timeout,
        }
    }

    #[cfg(test)]
    pub fn lifecycle(&self) -> Arc<Lifecycle> {
        Arc::clone(&self.lifecycle)
    }

    #[cfg(test)]
    pub fn emitter(&self) -> &EventEmitter<W> {
        &self.emitter
    }

    /// Read from `source` until stopped, returning the exit status
    ///
    /// `shutdown` resolving is the stop request (SIGINT/SIGTERM in the binary).
    pub async fn run<S, F>(&self, source: S, shutdown: F) -> DaemonExit
    where
        S: ReportSource + 'static,
        F: Future<Output = ()>,
    {
        if !self.lifecycle.request_start() {
            return DaemonExit::Failure;
        }

        let (bridge, worker) = create_device_bridge();
        let reader = match spawn_device_reader(source, worker, self.policy.clone(), self.read_timeout)
        {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to spawn device reader thread: {}", e);
                self.lifecycle.request_stop(StopReason::StartupFailure);
                self.lifecycle.finish();
                return DaemonExit::Failure;
            }
        };

        tokio::pin!(shutdown);
        let reason = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Received interrupt, shutting down gracefully...");
                    break StopReason::Signal;
                }
                event = bridge.recv_event() => {
                    let Ok(event) = event else {
                        error!("Device reader exited unexpectedly");
                        break StopReason::DeviceFailure;
                    };
                    if let Some(reason) = self.handle_event(event) {
                        break reason;
                    }
                }
            }
        };

        self.lifecycle.request_stop(reason);

        // Closing the bridge also unblocks a reader waiting on a full channel
        if let Err(e) = bridge.send_command(DeviceCommand::Shutdown).await {
            debug!("Reader already gone: {}", e);
        }
        drop(bridge);

        match tokio::task::spawn_blocking(move || reader.join()).await {
            Ok(Ok(exit)) => debug!("Device reader finished: {:?}", exit),
            Ok(Err(_)) => error!("Device reader thread panicked"),
            Err(e) => error!("Failed to join device reader: {}", e),
        }

        if let Err(e) = self.emitter.flush() {
            debug!("Final flush failed: {}", e);
        }

        self.lifecycle.finish();
        let exit = DaemonExit::from(reason);
        info!(
            "Stopped ({:?}) after emitting {} events",
            reason,
            self.emitter.emitted()
        );
        exit
    }

    /// Handle one reader event; `Some` means stop
    fn handle_event(&self, event: DeviceEvent) -> Option<StopReason> {
        match event {
            DeviceEvent::Opened { description } => {
                info!("Device ready: {}", description);
                self.lifecycle.mark_running();
                None
            }
            DeviceEvent::Input(event) => match self.emitter.emit(&event) {
                Ok(()) => None,
                Err(EmitError::Closed) => {
                    info!("Output closed by consumer");
                    Some(StopReason::OutputClosed)
                }
                Err(e) => {
                    error!("{}", e);
                    Some(StopReason::OutputClosed)
                }
            },
            DeviceEvent::Degraded {
                attempt,
                error,
                retry_in,
            } => {
                debug!(
                    "Device degraded (attempt {}): {}, retry in {:?}",
                    attempt, error, retry_in
                );
                None
            }
            DeviceEvent::Reconnected {
                description,
                attempts,
            } => {
                info!("Device back after {} attempts: {}", attempts, description);
                None
            }
            DeviceEvent::Exhausted => Some(StopReason::SourceExhausted),
            DeviceEvent::Fatal { error } => {
                error!("Device failure: {}", error);
                Some(StopReason::DeviceFailure)
            }
        }
    }
}

/// Install SIGINT/SIGTERM handlers; the returned future resolves on either
///
/// Handlers are registered before this returns, so a signal arriving before
/// the future is first polled is not lost. Both signals are then unblocked
/// for the calling thread: a host may launch the daemon with them blocked so
/// that an interrupt sent during startup stays pending until now.
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let mut pending = SigSet::empty();
    pending.add(Signal::SIGINT);
    pending.add(Signal::SIGTERM);
    pending.thread_unblock().map_err(std::io::Error::from)?;

    Ok(async move {
        tokio::select! {
            _ = sigint.recv() => debug!("SIGINT received"),
            _ = sigterm.recv() => debug!("SIGTERM received"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceError, ReadOutcome, ReplaySource};
    use crate::lifecycle::DaemonState;
    use common::test_utils::{
        ClosedPipe, DEFAULT_TEST_TIMEOUT, SharedBuffer, press_turn_release_reports, with_timeout,
    };
    use tempfile::NamedTempFile;

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(5),
            max_attempts,
            jitter: 0.0,
        }
    }

    fn replay(lines: &[&str], hold_open: bool) -> (NamedTempFile, ReplaySource) {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        let source = ReplaySource::new(file.path().to_path_buf(), Duration::ZERO, hold_open);
        (file, source)
    }

    /// Source that never opens
    struct Absent;

    impl ReportSource for Absent {
        fn open(&mut self) -> Result<(), DeviceError> {
            Err(DeviceError::NotFound("0xc251:0x2005".to_string()))
        }

        fn read_report(&mut self, _timeout: Duration) -> Result<ReadOutcome, DeviceError> {
            Err(DeviceError::NotOpen)
        }

        fn close(&mut self) {}

        fn describe(&self) -> String {
            "absent".to_string()
        }
    }

    #[tokio::test]
    async fn test_replay_emits_every_report() {
        let hex: Vec<String> = press_turn_release_reports()
            .iter()
            .map(|r| format!("{:02x}", r[0]))
            .collect();
        let mut lines: Vec<&str> = hex.iter().map(String::as_str).collect();
        lines.insert(1, "c4");

        let (_file, source) = replay(&lines, false);
        let output = SharedBuffer::new();
        let daemon = Daemon::new(output.clone(), policy(3), Duration::from_millis(10));

        let exit = with_timeout(DEFAULT_TEST_TIMEOUT, daemon.run(source, std::future::pending()))
            .await
            .unwrap();

        assert_eq!(exit, DaemonExit::Graceful);
        assert_eq!(
            output.lines(),
            vec!["TallDialPress", "Unknown", "TallDialRight", "TallDialRelease"]
        );
        assert_eq!(daemon.emitter().emitted(), 4);
        assert_eq!(daemon.lifecycle().state(), DaemonState::Idle);
        assert_eq!(
            daemon.lifecycle().stop_reason(),
            Some(StopReason::SourceExhausted)
        );
    }

    #[tokio::test]
    async fn test_shutdown_future_stops_held_replay() {
        let (_file, source) = replay(&["37"], true);
        let output = SharedBuffer::new();
        let daemon = Daemon::new(output.clone(), policy(3), Duration::from_millis(10));

        let shutdown = tokio::time::sleep(Duration::from_millis(200));
        let exit = with_timeout(DEFAULT_TEST_TIMEOUT, daemon.run(source, shutdown))
            .await
            .unwrap();

        assert_eq!(exit, DaemonExit::Graceful);
        assert_eq!(output.lines(), vec!["TallDialPress"]);
        assert_eq!(daemon.lifecycle().stop_reason(), Some(StopReason::Signal));
    }

    #[tokio::test]
    async fn test_device_failure_exit() {
        let output = SharedBuffer::new();
        let daemon = Daemon::new(output.clone(), policy(2), Duration::from_millis(10));

        let exit = with_timeout(DEFAULT_TEST_TIMEOUT, daemon.run(Absent, std::future::pending()))
            .await
            .unwrap();

        assert_eq!(exit, DaemonExit::DeviceFailure);
        assert_eq!(exit.code(), 2);
        assert!(output.contents().is_empty());
    }

    #[tokio::test]
    async fn test_closed_output_exit() {
        let (_file, source) = replay(&["37", "b7"], true);
        let daemon = Daemon::new(ClosedPipe, policy(3), Duration::from_millis(10));

        let exit = with_timeout(DEFAULT_TEST_TIMEOUT, daemon.run(source, std::future::pending()))
            .await
            .unwrap();

        assert_eq!(exit, DaemonExit::OutputClosed);
        assert_eq!(daemon.emitter().emitted(), 0);
    }
}
