//! Event emitter
//!
//! The only writer of the output stream. Each event becomes one line,
//! written whole under a lock and flushed immediately so consumers see it
//! without delay.

use protocol::{Event, encode_line};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmitError {
    /// The consumer closed its end of the stream
    #[error("Output stream closed")]
    Closed,

    #[error("Failed to write event: {0}")]
    Io(#[source] io::Error),

    #[error("Output lock poisoned")]
    Poisoned,
}

impl EmitError {
    fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::BrokenPipe => EmitError::Closed,
            _ => EmitError::Io(err),
        }
    }
}

/// Line writer shared by all producers
pub struct EventEmitter<W> {
    writer: Arc<Mutex<W>>,
    emitted: Arc<AtomicU64>,
}

impl<W> Clone for EventEmitter<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            emitted: Arc::clone(&self.emitted),
        }
    }
}

impl<W: Write + Send> EventEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
            emitted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Write one event line and flush it
    pub fn emit(&self, event: &Event) -> Result<(), EmitError> {
        let line = encode_line(event);
        let mut writer = self.writer.lock().map_err(|_| EmitError::Poisoned)?;
        writer
            .write_all(line.as_bytes())
            .map_err(EmitError::from_io)?;
        writer.flush().map_err(EmitError::from_io)?;
        self.emitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn flush(&self) -> Result<(), EmitError> {
        let mut writer = self.writer.lock().map_err(|_| EmitError::Poisoned)?;
        writer.flush().map_err(EmitError::from_io)
    }

    /// Lines written successfully so far
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}
