//! Event vocabulary and name grammar
//!
//! Every event name is a control identifier followed by an action suffix:
//!
//! ```text
//! TallDialPress     = TallDial + Press
//! DpadLeftRelease   = DpadLeft + Release
//! MouseWheelUp      = MouseWheel + Up
//! ```
//!
//! `Press`/`Release` are stripped before the directional suffixes, so
//! `DpadLeftPress` parses as control `DpadLeft` with action `Press`.
//! Names are parsed once, at decode time, into an [`Event`].

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Action suffix of an event name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Press,
    Release,
    Up,
    Down,
    Left,
    Right,
}

impl Action {
    /// All actions, in suffix matching order
    pub const ALL: [Action; 6] = [
        Action::Press,
        Action::Release,
        Action::Up,
        Action::Down,
        Action::Left,
        Action::Right,
    ];

    /// Suffix as it appears on the wire
    pub fn suffix(self) -> &'static str {
        match self {
            Action::Press => "Press",
            Action::Release => "Release",
            Action::Up => "Up",
            Action::Down => "Down",
            Action::Left => "Left",
            Action::Right => "Right",
        }
    }

    /// Press or release of a button-like control
    pub fn is_button(self) -> bool {
        matches!(self, Action::Press | Action::Release)
    }

    /// One detent of a rotary control
    pub fn is_directional(self) -> bool {
        !self.is_button()
    }

    /// Split a name into (control, action) by its suffix
    ///
    /// Returns `None` when no suffix matches or the control part would be empty.
    fn split(name: &str) -> Option<(&str, Action)> {
        Self::ALL.iter().find_map(|action| {
            name.strip_suffix(action.suffix())
                .filter(|control| !control.is_empty())
                .map(|control| (control, *action))
        })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for Action {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.suffix() == s)
            .ok_or_else(|| ProtocolError::UnknownAction(s.to_string()))
    }
}

/// Physical control on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Tall rotary knob
    TallDial,
    /// Flat dial at the bottom
    FlatWheel,
    /// Scroll wheel
    MouseWheel,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    LogoButtonLeft,
    LogoButtonRight,
    /// Long "tall" button on the side of the device
    LongBarButton,
    /// Side button under the thumb
    SideThumb,
    /// "Top" button next to the tall dial
    ButtonNearTallDial,
    ShortButton,
    /// C1
    BottomRightClickerLeft,
    /// C2
    BottomRightClickerRight,
}

impl Control {
    pub const ALL: [Control; 15] = [
        Control::TallDial,
        Control::FlatWheel,
        Control::MouseWheel,
        Control::DpadUp,
        Control::DpadDown,
        Control::DpadLeft,
        Control::DpadRight,
        Control::LogoButtonLeft,
        Control::LogoButtonRight,
        Control::LongBarButton,
        Control::SideThumb,
        Control::ButtonNearTallDial,
        Control::ShortButton,
        Control::BottomRightClickerLeft,
        Control::BottomRightClickerRight,
    ];

    /// Control identifier as it appears on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            Control::TallDial => "TallDial",
            Control::FlatWheel => "FlatWheel",
            Control::MouseWheel => "MouseWheel",
            Control::DpadUp => "DpadUp",
            Control::DpadDown => "DpadDown",
            Control::DpadLeft => "DpadLeft",
            Control::DpadRight => "DpadRight",
            Control::LogoButtonLeft => "LogoButtonLeft",
            Control::LogoButtonRight => "LogoButtonRight",
            Control::LongBarButton => "LongBarButton",
            Control::SideThumb => "SideThumb",
            Control::ButtonNearTallDial => "ButtonNearTallDial",
            Control::ShortButton => "ShortButton",
            Control::BottomRightClickerLeft => "BottomRightClickerLeft",
            Control::BottomRightClickerRight => "BottomRightClickerRight",
        }
    }

    /// Actions this control can produce
    pub fn actions(self) -> &'static [Action] {
        match self {
            Control::TallDial | Control::FlatWheel => {
                &[Action::Press, Action::Release, Action::Left, Action::Right]
            }
            Control::MouseWheel => &[Action::Press, Action::Release, Action::Up, Action::Down],
            _ => &[Action::Press, Action::Release],
        }
    }

    /// Whether `action` is valid for this control
    pub fn supports(self, action: Action) -> bool {
        self.actions().contains(&action)
    }

    /// Rotary controls (dials and the scroll wheel)
    pub fn is_rotary(self) -> bool {
        matches!(
            self,
            Control::TallDial | Control::FlatWheel | Control::MouseWheel
        )
    }

    fn lookup(name: &str) -> Option<Control> {
        Self::ALL.into_iter().find(|control| control.as_str() == name)
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Control {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::lookup(s).ok_or_else(|| ProtocolError::UnknownControl(s.to_string()))
    }
}

/// Control part of a decoded event name
///
/// Names from a newer daemon may carry controls this build does not know.
/// They still parse, so consumers can classify them by suffix and ignore them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ControlId {
    Known(Control),
    Unrecognized(String),
}

impl ControlId {
    pub fn as_str(&self) -> &str {
        match self {
            ControlId::Known(control) => control.as_str(),
            ControlId::Unrecognized(name) => name,
        }
    }

    pub fn known(&self) -> Option<Control> {
        match self {
            ControlId::Known(control) => Some(*control),
            ControlId::Unrecognized(_) => None,
        }
    }

    fn parse(name: &str) -> Self {
        Control::lookup(name)
            .map(ControlId::Known)
            .unwrap_or_else(|| ControlId::Unrecognized(name.to_string()))
    }
}

impl From<Control> for ControlId {
    fn from(control: Control) -> Self {
        ControlId::Known(control)
    }
}

/// A decoded, non-sentinel event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputEvent {
    pub control: ControlId,
    /// `None` when the name carries no known suffix
    pub action: Option<Action>,
}

impl InputEvent {
    pub fn new(control: Control, action: Action) -> Self {
        Self {
            control: ControlId::Known(control),
            action: Some(action),
        }
    }

    /// Parse a name that has already passed validation
    pub(crate) fn parse(name: &str) -> Self {
        match Action::split(name) {
            Some((control, action)) => Self {
                control: ControlId::parse(control),
                action: Some(action),
            },
            None => Self {
                control: ControlId::parse(name),
                action: None,
            },
        }
    }

    /// Known control with an action that control can produce
    pub fn is_recognized(&self) -> bool {
        match (&self.control, self.action) {
            (ControlId::Known(control), Some(action)) => control.supports(action),
            _ => false,
        }
    }
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.control.as_str())?;
        if let Some(action) = self.action {
            f.write_str(action.suffix())?;
        }
        Ok(())
    }
}

/// A device event as carried by the line protocol
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Event {
    Input(InputEvent),
    /// Device-side decode failure; consumers must drop it
    Unknown,
}

impl Event {
    /// Wire name of the sentinel event
    pub const UNKNOWN_NAME: &'static str = "Unknown";

    pub fn input(control: Control, action: Action) -> Self {
        Event::Input(InputEvent::new(control, action))
    }

    /// Wire name of this event
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// `false` for the `Unknown` sentinel
    pub fn is_actionable(&self) -> bool {
        matches!(self, Event::Input(_))
    }

    pub fn as_input(&self) -> Option<&InputEvent> {
        match self {
            Event::Input(input) => Some(input),
            Event::Unknown => None,
        }
    }

    pub fn control(&self) -> Option<Control> {
        self.as_input().and_then(|input| input.control.known())
    }

    pub fn action(&self) -> Option<Action> {
        self.as_input().and_then(|input| input.action)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Input(input) => input.fmt(f),
            Event::Unknown => f.write_str(Self::UNKNOWN_NAME),
        }
    }
}

impl From<InputEvent> for Event {
    fn from(input: InputEvent) -> Self {
        Event::Input(input)
    }
}

impl FromStr for Event {
    type Err = ProtocolError;

    /// Strict parse: rejects malformed names instead of mapping them to `Unknown`
    fn from_str(s: &str) -> Result<Self> {
        if !crate::codec::is_valid_name(s) {
            return Err(ProtocolError::InvalidName(s.to_string()));
        }
        Ok(crate::codec::decode_name(s))
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Every event the device mapping can produce, excluding `Unknown`
pub fn vocabulary() -> Vec<Event> {
    Control::ALL
        .into_iter()
        .flat_map(|control| {
            control
                .actions()
                .iter()
                .map(move |action| Event::input(control, *action))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_suffix_wins_over_direction() {
        let input = InputEvent::parse("DpadLeftPress");
        assert_eq!(input.control, ControlId::Known(Control::DpadLeft));
        assert_eq!(input.action, Some(Action::Press));
    }

    #[test]
    fn test_directional_suffix() {
        let input = InputEvent::parse("TallDialRight");
        assert_eq!(input.control, ControlId::Known(Control::TallDial));
        assert_eq!(input.action, Some(Action::Right));
        assert!(input.is_recognized());
    }

    #[test]
    fn test_unrecognized_control_keeps_suffix() {
        let input = InputEvent::parse("JogShuttlePress");
        assert_eq!(
            input.control,
            ControlId::Unrecognized("JogShuttle".to_string())
        );
        assert_eq!(input.action, Some(Action::Press));
        assert!(!input.is_recognized());
    }

    #[test]
    fn test_bare_suffix_is_a_control() {
        let input = InputEvent::parse("Press");
        assert_eq!(input.control, ControlId::Unrecognized("Press".to_string()));
        assert_eq!(input.action, None);
        assert_eq!(input.to_string(), "Press");
    }

    #[test]
    fn test_unsupported_action_not_recognized() {
        // Buttons do not rotate
        let input = InputEvent::parse("SideThumbUp");
        assert_eq!(input.control, ControlId::Known(Control::SideThumb));
        assert!(!input.is_recognized());
    }

    #[test]
    fn test_vocabulary_size() {
        // 12 buttons x 2 + 2 dials x 4 + scroll wheel x 4
        assert_eq!(vocabulary().len(), 12 * 2 + 2 * 4 + 4);
        assert!(vocabulary().iter().all(Event::is_actionable));
    }

    #[test]
    fn test_vocabulary_names_parse_back() {
        for event in vocabulary() {
            let reparsed = InputEvent::parse(&event.name());
            assert!(reparsed.is_recognized(), "{event} did not parse back");
            assert_eq!(Event::Input(reparsed), event);
        }
    }

    #[test]
    fn test_control_from_str() {
        assert_eq!("FlatWheel".parse::<Control>(), Ok(Control::FlatWheel));
        assert!(matches!(
            "Flatwheel".parse::<Control>(),
            Err(ProtocolError::UnknownControl(_))
        ));
    }

    #[test]
    fn test_unknown_display() {
        assert_eq!(Event::Unknown.name(), "Unknown");
        assert!(!Event::Unknown.is_actionable());
        assert_eq!(Event::Unknown.control(), None);
    }
}
