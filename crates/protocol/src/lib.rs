//! Event line protocol for the TourBox daemon
//!
//! This crate defines the vocabulary of device events and their wire
//! encoding: one UTF-8 event name per line, newline-terminated, no other
//! framing. It is shared by the daemon (encoder) and the host bridge
//! (decoder).
//!
//! # Example
//!
//! ```
//! use protocol::{Action, Control, Event, decode_line, encode_line};
//!
//! let event = Event::input(Control::TallDial, Action::Right);
//! let line = encode_line(&event);
//! assert_eq!(line, "TallDialRight\n");
//!
//! let decoded = decode_line(line.as_bytes());
//! assert_eq!(decoded, event);
//! assert_eq!(decoded.control(), Some(Control::TallDial));
//! ```
//!
//! # Forward Compatibility
//!
//! Names this build does not know still decode, with the control kept as a
//! string. Consumers match on the controls they understand and ignore the
//! rest:
//!
//! ```
//! use protocol::{Action, ControlId, decode_line};
//!
//! let event = decode_line(b"JogShuttleLeft\n");
//! let input = event.as_input().unwrap();
//! assert!(matches!(input.control, ControlId::Unrecognized(_)));
//! assert_eq!(input.action, Some(Action::Left));
//! assert!(!input.is_recognized());
//! ```

pub mod codec;
pub mod error;
pub mod event;

pub use codec::{
    LINE_TERMINATOR, MAX_LINE_LENGTH, decode_line, decode_name, encode_line, is_valid_name,
    read_line, write_line,
};
pub use error::{ProtocolError, Result};
pub use event::{Action, Control, ControlId, Event, InputEvent, vocabulary};
