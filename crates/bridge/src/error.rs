//! Bridge error types

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Failed to launch daemon '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Daemon stdout was not captured")]
    NoStdout,

    #[error("Failed to spawn reader thread: {0}")]
    ReaderThread(#[source] io::Error),

    #[error("Failed to signal daemon (pid {pid}): {reason}")]
    Signal { pid: u32, reason: String },
}

pub type Result<T> = std::result::Result<T, BridgeError>;
