//! Protocol error types

use thiserror::Error;

/// Errors from the strict event parsers (`FromStr`)
///
/// The line decoder never returns these: malformed input decodes to
/// [`Event::Unknown`](crate::Event::Unknown) instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Name is empty, too long, or contains whitespace/control characters
    #[error("Invalid event name: {0:?}")]
    InvalidName(String),

    /// Control identifier is not part of the vocabulary
    #[error("Unknown control: {0}")]
    UnknownControl(String),

    /// Action suffix is not part of the grammar
    #[error("Unknown action: {0}")]
    UnknownAction(String),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::InvalidName("Tall Dial".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("Invalid event name"));
        assert!(msg.contains("Tall Dial"));
    }

    #[test]
    fn test_unknown_control_display() {
        let err = ProtocolError::UnknownControl("Joystick".to_string());
        assert_eq!(err.to_string(), "Unknown control: Joystick");
    }
}
