//! Host-side bridge to the TourBox daemon
//!
//! Runs `tourboxd` as a child process and turns its line output into
//! [`Event`](protocol::Event) callbacks on the host's thread.
//!
//! # Example
//!
//! ```no_run
//! use bridge::{BridgeConfig, HostBridge};
//! use protocol::Event;
//!
//! let mut bridge = HostBridge::new(BridgeConfig::default());
//! bridge.start()?;
//!
//! // Once per host tick:
//! bridge.dispatch(&mut |event: &Event| println!("{}", event.name()));
//!
//! bridge.stop();
//! # Ok::<(), bridge::BridgeError>(())
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod queue;
pub mod reader;

pub use bridge::{
    EventHandler, HostBridge, NixSignaller, ProcessSignaller, StartOutcome, StopOutcome,
};
pub use config::{BridgeConfig, BridgeSettings, DaemonCommand};
pub use error::{BridgeError, Result};
pub use queue::{BridgeMessage, QueueConsumer, QueueProducer, event_queue};
