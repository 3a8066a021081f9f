//! Host bridge
//!
//! Launches the daemon as a child process, reads its output on a background
//! thread, and hands decoded events to host code on the host's own thread.
//!
//! The host calls [`HostBridge::dispatch`] once per tick (a UI timer, a game
//! loop frame). All host callbacks run inside `dispatch`, so host code never
//! runs on the reader thread.

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::queue::{BridgeMessage, QueueConsumer, QueueProducer, event_queue};
use crate::reader::{ChildState, SharedChild, lock_child, spawn_reader};
use nix::sys::signal::{SigSet, SigmaskHow, Signal, kill, sigprocmask};
use nix::unistd::Pid;
use protocol::Event;
use std::io;
use std::os::unix::process::CommandExt;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Result of [`HostBridge::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A daemon from an earlier `start` is still attached
    AlreadyRunning,
}

/// Result of [`HostBridge::stop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// SIGINT sent to the daemon
    Signalled,
    /// No daemon attached, or it had already exited
    NotRunning,
}

/// Sends the interrupt that asks the daemon to shut down
pub trait ProcessSignaller: Send {
    fn interrupt(&self, pid: u32) -> Result<()>;
}

/// Delivers SIGINT with `kill(2)`
#[derive(Debug, Clone, Copy, Default)]
pub struct NixSignaller;

impl ProcessSignaller for NixSignaller {
    fn interrupt(&self, pid: u32) -> Result<()> {
        let raw = i32::try_from(pid).map_err(|_| BridgeError::Signal {
            pid,
            reason: "pid out of range".to_string(),
        })?;
        kill(Pid::from_raw(raw), Signal::SIGINT).map_err(|e| BridgeError::Signal {
            pid,
            reason: e.to_string(),
        })
    }
}

/// Signals the daemon treats as a shutdown request
fn interrupt_signals() -> SigSet {
    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    set.add(Signal::SIGTERM);
    set
}

/// Host callbacks, invoked from [`HostBridge::dispatch`]
pub trait EventHandler {
    /// One decoded event, in the order the daemon wrote it
    fn on_event(&mut self, event: &Event);

    /// The attached daemon exited on its own (or after `stop` was not called)
    fn on_daemon_exit(&mut self, status: Option<ExitStatus>) {
        let _ = status;
    }
}

impl<F> EventHandler for F
where
    F: FnMut(&Event),
{
    fn on_event(&mut self, event: &Event) {
        self(event)
    }
}

/// The attached daemon
struct DaemonHandle {
    pid: u32,
    generation: u64,
    child: SharedChild,
}

/// Owns the daemon subprocess and the host event queue
pub struct HostBridge {
    config: BridgeConfig,
    signaller: Box<dyn ProcessSignaller>,
    producer: QueueProducer,
    consumer: QueueConsumer,
    handle: Option<DaemonHandle>,
    generation: u64,
    delivered: u64,
}

impl HostBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_signaller(config, Box::new(NixSignaller))
    }

    pub fn with_signaller(config: BridgeConfig, signaller: Box<dyn ProcessSignaller>) -> Self {
        let (producer, consumer) = event_queue();
        Self {
            config,
            signaller,
            producer,
            consumer,
            handle: None,
            generation: 0,
            delivered: 0,
        }
    }

    /// Launch the daemon and its reader thread
    ///
    /// Does nothing if a daemon is already attached.
    pub fn start(&mut self) -> Result<StartOutcome> {
        if self.handle.is_some() {
            debug!("Daemon already running, ignoring start");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let program = self.config.daemon.program_path();
        let mut command = Command::new(&program);
        command
            .args(&self.config.daemon.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if self.config.daemon.defer_interrupts {
            let interrupts = interrupt_signals();
            // SAFETY: sigprocmask is async-signal-safe and nothing is allocated
            // between fork and exec
            unsafe {
                command.pre_exec(move || {
                    sigprocmask(SigmaskHow::SIG_BLOCK, Some(&interrupts), None)
                        .map_err(io::Error::from)
                });
            }
        }

        let mut child = command
            .spawn()
            .map_err(|source| BridgeError::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        let pid = child.id();
        let stdout = child.stdout.take();
        let child: SharedChild = Arc::new(Mutex::new(ChildState::new(child)));
        let Some(stdout) = stdout else {
            lock_child(&child).kill();
            return Err(BridgeError::NoStdout);
        };

        let generation = self.generation + 1;
        if let Err(e) = spawn_reader(
            stdout,
            Arc::clone(&child),
            generation,
            self.producer.clone(),
        ) {
            lock_child(&child).kill();
            return Err(BridgeError::ReaderThread(e));
        }

        self.generation = generation;
        self.handle = Some(DaemonHandle {
            pid,
            generation,
            child,
        });
        info!("Started daemon {} (pid {})", program.display(), pid);
        Ok(StartOutcome::Started)
    }

    /// Ask the daemon to shut down
    ///
    /// Sends SIGINT unless the daemon has already exited, then forgets the
    /// handle. Never waits for the daemon or the reader thread; lines the
    /// daemon flushes before exiting are still delivered by `dispatch`.
    pub fn stop(&mut self) -> StopOutcome {
        let Some(handle) = self.handle.take() else {
            debug!("No daemon running, ignoring stop");
            return StopOutcome::NotRunning;
        };

        let state = lock_child(&handle.child);
        if let Some(status) = state.status() {
            debug!("Daemon (pid {}) already exited: {}", handle.pid, status);
            return StopOutcome::NotRunning;
        }

        match self.signaller.interrupt(handle.pid) {
            Ok(()) => {
                info!("Sent SIGINT to daemon (pid {})", handle.pid);
                StopOutcome::Signalled
            }
            Err(e) => {
                warn!("{}", e);
                StopOutcome::NotRunning
            }
        }
    }

    /// Deliver queued events to `handler`, in order
    ///
    /// Handles at most the messages queued when the call begins, so a busy
    /// daemon cannot starve the host tick. Returns the number of events
    /// delivered.
    pub fn dispatch<H>(&mut self, handler: &mut H) -> usize
    where
        H: EventHandler + ?Sized,
    {
        let mut delivered = 0;
        for _ in 0..self.consumer.len() {
            let Some(message) = self.consumer.pop() else {
                break;
            };
            match message {
                BridgeMessage::Event(event) => {
                    handler.on_event(&event);
                    delivered += 1;
                }
                BridgeMessage::Exited { generation, status } => {
                    if self.current_generation() == Some(generation) {
                        info!("Daemon exited: {:?}", status);
                        self.handle = None;
                        handler.on_daemon_exit(status);
                    } else {
                        debug!("Ignoring exit of earlier daemon (generation {})", generation);
                    }
                }
            }
        }

        self.delivered += delivered as u64;
        delivered
    }

    /// Whether a daemon is attached
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Pid of the attached daemon
    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().map(|h| h.pid)
    }

    /// Events delivered through `dispatch` over the bridge's lifetime
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn current_generation(&self) -> Option<u64> {
        self.handle.as_ref().map(|h| h.generation)
    }
}

impl Drop for HostBridge {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSignaller(Arc<AtomicUsize>);

    impl ProcessSignaller for CountingSignaller {
        fn interrupt(&self, _pid: u32) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_stop_when_not_running() {
        let signals = Arc::new(AtomicUsize::new(0));
        let mut bridge = HostBridge::with_signaller(
            BridgeConfig::default(),
            Box::new(CountingSignaller(Arc::clone(&signals))),
        );

        assert_eq!(bridge.stop(), StopOutcome::NotRunning);
        assert_eq!(bridge.stop(), StopOutcome::NotRunning);
        assert_eq!(signals.load(Ordering::SeqCst), 0);
        assert!(!bridge.is_running());
    }

    #[test]
    fn test_dispatch_empty_queue() {
        let mut bridge = HostBridge::new(BridgeConfig::default());
        let mut seen = Vec::new();
        let delivered = bridge.dispatch(&mut |event: &Event| seen.push(event.clone()));
        assert_eq!(delivered, 0);
        assert!(seen.is_empty());
    }

    #[test]
    fn test_stale_exit_is_ignored() {
        let mut bridge = HostBridge::new(BridgeConfig::default());
        bridge.producer.push(BridgeMessage::Exited {
            generation: 7,
            status: None,
        });

        struct Exits(usize);
        impl EventHandler for Exits {
            fn on_event(&mut self, _event: &Event) {}
            fn on_daemon_exit(&mut self, _status: Option<ExitStatus>) {
                self.0 += 1;
            }
        }

        let mut exits = Exits(0);
        bridge.dispatch(&mut exits);
        assert_eq!(exits.0, 0);
    }

    #[test]
    fn test_missing_program_fails_to_start() {
        let mut bridge = HostBridge::new(BridgeConfig::for_program(
            "/nonexistent/tourboxd",
            Vec::<String>::new(),
        ));
        let err = bridge.start().unwrap_err();
        assert!(matches!(err, BridgeError::Spawn { .. }));
        assert!(!bridge.is_running());
    }
}
