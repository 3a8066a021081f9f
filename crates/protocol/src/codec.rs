//! Line encoding and decoding
//!
//! # Line Format
//!
//! ```text
//! <EventName>\n
//! ```
//!
//! One UTF-8 event name per line, no headers or length prefixes. Decoding
//! never fails: anything that is not a well-formed name (invalid UTF-8,
//! interior whitespace, control characters, overlong lines, empty lines)
//! decodes to [`Event::Unknown`], so one bad line cannot desynchronize the
//! lines that follow it.

use crate::event::{Event, InputEvent};
use std::io::{self, BufRead, Read, Write};

/// Longest accepted line, excluding the terminator
pub const MAX_LINE_LENGTH: usize = 256;

/// Line terminator byte
pub const LINE_TERMINATOR: u8 = b'\n';

/// Encode an event as a single newline-terminated line
///
/// # Example
/// ```
/// use protocol::{Action, Control, Event, encode_line};
///
/// let line = encode_line(&Event::input(Control::TallDial, Action::Press));
/// assert_eq!(line, "TallDialPress\n");
/// ```
pub fn encode_line(event: &Event) -> String {
    format!("{event}\n")
}

/// Write one encoded line to `writer` (no flush)
pub fn write_line<W: Write + ?Sized>(writer: &mut W, event: &Event) -> io::Result<()> {
    writer.write_all(encode_line(event).as_bytes())
}

/// Decode one line, with or without its terminator
///
/// # Example
/// ```
/// use protocol::{Event, decode_line};
///
/// assert_eq!(decode_line(b"MouseWheelUp\n").name(), "MouseWheelUp");
/// assert_eq!(decode_line(b"\xff\xfe\n"), Event::Unknown);
/// assert_eq!(decode_line(b"\n"), Event::Unknown);
/// ```
pub fn decode_line(line: &[u8]) -> Event {
    let Ok(text) = std::str::from_utf8(line) else {
        return Event::Unknown;
    };
    decode_name(text.trim_end())
}

/// Decode an already-trimmed event name
pub fn decode_name(name: &str) -> Event {
    if !is_valid_name(name) || name == Event::UNKNOWN_NAME {
        return Event::Unknown;
    }
    Event::Input(InputEvent::parse(name))
}

/// Non-empty, bounded, and free of whitespace and control characters
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_LINE_LENGTH
        && !name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
}

/// Read and decode the next line from a buffered reader
///
/// Returns `Ok(None)` at end of stream. A final line without a terminator is
/// still decoded. Lines longer than [`MAX_LINE_LENGTH`] are consumed up to
/// their terminator and decode to `Unknown`. `buf` is scratch space reused
/// between calls.
///
/// # Example
/// ```
/// use protocol::{Event, read_line};
/// use std::io::Cursor;
///
/// let mut reader = Cursor::new(b"TallDialPress\nUnknown\n".to_vec());
/// let mut buf = Vec::new();
/// assert_eq!(read_line(&mut reader, &mut buf).unwrap().unwrap().name(), "TallDialPress");
/// assert_eq!(read_line(&mut reader, &mut buf).unwrap(), Some(Event::Unknown));
/// assert_eq!(read_line(&mut reader, &mut buf).unwrap(), None);
/// ```
pub fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<Event>> {
    buf.clear();

    // Terminator plus a possible '\r' on top of the name itself
    let limit = (MAX_LINE_LENGTH + 2) as u64;
    let read = Read::take(&mut *reader, limit).read_until(LINE_TERMINATOR, buf)?;
    if read == 0 {
        return Ok(None);
    }

    if buf.last() != Some(&LINE_TERMINATOR) && read as u64 == limit {
        skip_line(reader)?;
        return Ok(Some(Event::Unknown));
    }

    Ok(Some(decode_line(buf)))
}

/// Discard input up to and including the next terminator
fn skip_line<R: BufRead>(reader: &mut R) -> io::Result<()> {
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|b| *b == LINE_TERMINATOR) {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}
