//! Daemon lifecycle state machine
//!
//! ```text
//! Idle -> Starting -> Running -> Stopping -> Idle
//!            |                      ^
//!            +----------------------+
//! ```
//!
//! Transitions that do not apply to the current state are rejected and
//! logged; none of them panic.

use std::fmt;
use std::process::ExitCode;
use std::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DaemonState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DaemonState::Idle => "idle",
            DaemonState::Starting => "starting",
            DaemonState::Running => "running",
            DaemonState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// What moved the daemon into `Stopping`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// SIGINT/SIGTERM or an explicit stop
    Signal,
    /// Replay source ran out of reports
    SourceExhausted,
    /// Device retry budget exhausted
    DeviceFailure,
    /// Nobody is reading stdout anymore
    OutputClosed,
    /// Startup could not complete
    StartupFailure,
}

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonExit {
    Graceful,
    Failure,
    DeviceFailure,
    OutputClosed,
}

impl DaemonExit {
    pub fn code(self) -> u8 {
        match self {
            DaemonExit::Graceful => 0,
            DaemonExit::Failure => 1,
            DaemonExit::DeviceFailure => 2,
            DaemonExit::OutputClosed => 3,
        }
    }
}

impl From<StopReason> for DaemonExit {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::Signal | StopReason::SourceExhausted => DaemonExit::Graceful,
            StopReason::DeviceFailure => DaemonExit::DeviceFailure,
            StopReason::OutputClosed => DaemonExit::OutputClosed,
            StopReason::StartupFailure => DaemonExit::Failure,
        }
    }
}

impl From<DaemonExit> for ExitCode {
    fn from(exit: DaemonExit) -> Self {
        ExitCode::from(exit.code())
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: DaemonState,
    stop_reason: Option<StopReason>,
}

/// Shared lifecycle state
#[derive(Debug, Default)]
pub struct Lifecycle {
    inner: RwLock<Inner>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DaemonState {
        self.read(|inner| inner.state)
    }

    /// Reason recorded by the last `request_stop`
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.read(|inner| inner.stop_reason)
    }

    /// Idle -> Starting
    pub fn request_start(&self) -> bool {
        self.transition("start", |inner| match inner.state {
            DaemonState::Idle => {
                inner.state = DaemonState::Starting;
                inner.stop_reason = None;
                true
            }
            _ => false,
        })
    }

    /// Starting -> Running
    pub fn mark_running(&self) -> bool {
        self.transition("mark running", |inner| match inner.state {
            DaemonState::Starting => {
                inner.state = DaemonState::Running;
                true
            }
            _ => false,
        })
    }

    /// Starting | Running -> Stopping
    pub fn request_stop(&self, reason: StopReason) -> bool {
        self.transition("stop", |inner| match inner.state {
            DaemonState::Starting | DaemonState::Running => {
                inner.state = DaemonState::Stopping;
                inner.stop_reason = Some(reason);
                true
            }
            _ => false,
        })
    }

    /// Stopping -> Idle
    pub fn finish(&self) -> bool {
        self.transition("finish", |inner| match inner.state {
            DaemonState::Stopping => {
                inner.state = DaemonState::Idle;
                true
            }
            _ => false,
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> T) -> T {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        f(&inner)
    }

    fn transition(&self, name: &str, f: impl FnOnce(&mut Inner) -> bool) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let from = inner.state;
        let applied = f(&mut inner);
        if applied {
            debug!("Lifecycle {} -> {}", from, inner.state);
        } else {
            warn!("Ignoring {} request while {}", name, from);
        }
        applied
    }
}
