//! Async channel bridge between Tokio runtime and the device reader thread

use async_channel::{Receiver, Sender, TryRecvError, bounded};
use protocol::Event;
use std::time::Duration;

/// Commands from Tokio runtime to the device reader thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Close the device and exit the reader thread
    Shutdown,
}

/// Events from the device reader thread
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Device opened for the first time
    Opened {
        /// Human-readable description of the source
        description: String,
    },

    /// One decoded report (possibly `Event::Unknown`)
    Input(Event),

    /// Device lost, reconnection pending
    Degraded {
        /// Consecutive failed attempt number (1-based)
        attempt: u32,
        /// Error that caused the failure
        error: String,
        /// Delay before the next attempt
        retry_in: Duration,
    },

    /// Device reopened after being degraded
    Reconnected {
        description: String,
        /// Attempts it took
        attempts: u32,
    },

    /// Source has no more reports (replay finished)
    Exhausted,

    /// Retry budget exhausted; the reader thread has stopped
    Fatal {
        error: String,
    },
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct DeviceBridge {
    cmd_tx: Sender<DeviceCommand>,
    event_rx: Receiver<DeviceEvent>,
}

impl DeviceBridge {
    /// Send a command to the reader thread
    pub async fn send_command(&self, cmd: DeviceCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive an event from the reader thread
    pub async fn recv_event(&self) -> crate::Result<DeviceEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive an event without waiting
    pub fn try_recv_event(&self) -> Option<DeviceEvent> {
        self.event_rx.try_recv().ok()
    }
}

/// Handle for the device reader thread (blocking)
pub struct DeviceWorker {
    cmd_rx: Receiver<DeviceCommand>,
    event_tx: Sender<DeviceEvent>,
}

impl DeviceWorker {
    /// Receive a command from Tokio runtime (blocking)
    pub fn recv_command(&self) -> crate::Result<DeviceCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Shutdown was requested, or the runtime side is gone
    pub fn should_stop(&self) -> bool {
        match self.cmd_rx.try_recv() {
            Ok(DeviceCommand::Shutdown) => true,
            Err(TryRecvError::Closed) => true,
            Err(TryRecvError::Empty) => false,
        }
    }

    /// Send an event to Tokio runtime (blocking)
    pub fn send_event(&self, event: DeviceEvent) -> crate::Result<()> {
        self.event_tx
            .send_blocking(event)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the channel bridge between Tokio and the device reader thread
///
/// Returns (DeviceBridge for Tokio, DeviceWorker for the reader thread)
pub fn create_device_bridge() -> (DeviceBridge, DeviceWorker) {
    let (cmd_tx, cmd_rx) = bounded(16);
    let (event_tx, event_rx) = bounded(256);

    (
        DeviceBridge { cmd_tx, event_rx },
        DeviceWorker { cmd_rx, event_tx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_bridge() {
        let (bridge, worker) = create_device_bridge();

        // Spawn a thread to simulate the device reader
        let handle = std::thread::spawn(move || {
            let cmd = worker.recv_command().unwrap();
            matches!(cmd, DeviceCommand::Shutdown)
        });

        bridge.send_command(DeviceCommand::Shutdown).await.unwrap();

        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_should_stop_when_bridge_dropped() {
        let (bridge, worker) = create_device_bridge();
        assert!(!worker.should_stop());

        drop(bridge);
        assert!(worker.should_stop());
    }
}
