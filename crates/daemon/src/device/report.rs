//! Raw report decoding
//!
//! The device sends one-byte codes. Buttons send `code` on press and
//! `code | 0x80` on release. Rotary controls send one code per detent and a
//! stop code (`code | 0x80`) when movement ends; stop codes carry nothing
//! actionable and decode to `Unknown` like any other unmapped report.

use protocol::{Action, Control, Event};

/// Bit set on button codes when the button is released
pub const RELEASE_BIT: u8 = 0x80;

/// Button controls and their press codes
const BUTTONS: [(u8, Control); 15] = [
    (0x00, Control::LongBarButton),
    (0x01, Control::SideThumb),
    (0x02, Control::ButtonNearTallDial),
    (0x03, Control::ShortButton),
    (0x0a, Control::MouseWheel),
    (0x10, Control::DpadUp),
    (0x11, Control::DpadDown),
    (0x12, Control::DpadLeft),
    (0x13, Control::DpadRight),
    (0x22, Control::BottomRightClickerLeft),
    (0x23, Control::BottomRightClickerRight),
    (0x2a, Control::LogoButtonLeft),
    (0x2b, Control::LogoButtonRight),
    (0x37, Control::TallDial),
    (0x38, Control::FlatWheel),
];

/// Rotation codes, one per detent
const ROTATIONS: [(u8, Control, Action); 6] = [
    (0x44, Control::TallDial, Action::Right),
    (0x04, Control::TallDial, Action::Left),
    (0x49, Control::MouseWheel, Action::Down),
    (0x09, Control::MouseWheel, Action::Up),
    (0x4f, Control::FlatWheel, Action::Right),
    (0x0f, Control::FlatWheel, Action::Left),
];

/// Handshake written to the device after opening it
///
/// Without it the Elite only reports a subset of its controls.
pub const INIT_SEQUENCE: [&[u8]; 6] = [
    &[0x55, 0x00, 0x07, 0x88, 0x94, 0x00, 0x1a, 0xfe],
    &[
        0xb5, 0x00, 0x5d, 0x04, 0x08, 0x05, 0x08, 0x06, 0x08, 0x07, 0x08, 0x08, 0x08, 0x09, 0x08,
        0x0b, 0x08, 0x0c, 0x08, 0x0d,
    ],
    &[
        0x08, 0x0e, 0x08, 0x0f, 0x08, 0x26, 0x08, 0x27, 0x08, 0x28, 0x08, 0x29, 0x08, 0x3b, 0x08,
        0x3c, 0x08, 0x3d, 0x08, 0x3e,
    ],
    &[
        0x08, 0x3f, 0x08, 0x40, 0x08, 0x41, 0x08, 0x42, 0x08, 0x43, 0x08, 0x44, 0x08, 0x45, 0x08,
        0x46, 0x08, 0x47, 0x08, 0x48,
    ],
    &[
        0x08, 0x49, 0x08, 0x4a, 0x08, 0x4b, 0x08, 0x4c, 0x08, 0x4d, 0x08, 0x4e, 0x08, 0x4f, 0x08,
        0x50, 0x08, 0x51, 0x08, 0x52,
    ],
    &[
        0x08, 0x53, 0x08, 0x54, 0x08, 0xa8, 0x08, 0xa9, 0x08, 0xaa, 0x08, 0xab, 0x08, 0xfe,
    ],
];

/// Decode one raw report into exactly one event
pub fn decode_report(report: &[u8]) -> Event {
    match report {
        [code] => decode_code(*code),
        _ => Event::Unknown,
    }
}

fn decode_code(code: u8) -> Event {
    if let Some((_, control, action)) = ROTATIONS.iter().find(|(c, _, _)| *c == code) {
        return Event::input(*control, *action);
    }

    let action = if code & RELEASE_BIT == 0 {
        Action::Press
    } else {
        Action::Release
    };
    let press_code = code & !RELEASE_BIT;

    BUTTONS
        .iter()
        .find(|(c, _)| *c == press_code)
        .map(|(_, control)| Event::input(*control, action))
        .unwrap_or(Event::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use protocol::vocabulary;
    use std::collections::HashSet;

    #[test]
    fn test_button_press_and_release() {
        assert_eq!(
            decode_report(&[0x37]),
            Event::input(Control::TallDial, Action::Press)
        );
        assert_eq!(
            decode_report(&[0xb7]),
            Event::input(Control::TallDial, Action::Release)
        );
        assert_eq!(
            decode_report(&[0x92]),
            Event::input(Control::DpadLeft, Action::Release)
        );
    }

    #[test]
    fn test_rotations() {
        assert_eq!(
            decode_report(&[0x09]),
            Event::input(Control::MouseWheel, Action::Up)
        );
        assert_eq!(
            decode_report(&[0x4f]),
            Event::input(Control::FlatWheel, Action::Right)
        );
    }

    #[test]
    fn test_rotation_stop_codes_are_unknown() {
        for code in [0xc4, 0x84, 0xc9, 0x89, 0xcf, 0x8f] {
            assert_eq!(decode_report(&[code]), Event::Unknown, "{code:#04x}");
        }
    }

    #[test]
    fn test_malformed_reports_are_unknown() {
        assert_eq!(decode_report(&[]), Event::Unknown);
        assert_eq!(decode_report(&[0x37, 0x44]), Event::Unknown);
        assert_eq!(decode_report(&[0x7f]), Event::Unknown);
    }

    #[test]
    fn test_codes_are_unambiguous() {
        let mut seen = HashSet::new();
        for (code, _) in BUTTONS {
            assert!(seen.insert(code), "duplicate press code {code:#04x}");
            assert!(seen.insert(code | RELEASE_BIT), "duplicate release code");
        }
        for (code, _, _) in ROTATIONS {
            assert!(seen.insert(code), "rotation code {code:#04x} collides");
        }
    }

    #[test]
    fn test_every_byte_decodes_into_vocabulary() {
        let known: HashSet<Event> = vocabulary().into_iter().collect();
        let mut produced = HashSet::new();
        for code in 0..=u8::MAX {
            let event = decode_report(&[code]);
            assert!(event == Event::Unknown || known.contains(&event));
            produced.insert(event);
        }
        // every vocabulary entry is reachable from some report
        assert_eq!(produced.len(), known.len() + 1);
    }

    proptest! {
        #[test]
        fn prop_reports_decode_to_vocabulary_or_unknown(
            report in proptest::collection::vec(any::<u8>(), 0..8)
        ) {
            let event = decode_report(&report);
            let name = event.name();
            prop_assert!(!name.is_empty());
            prop_assert!(event == Event::Unknown || vocabulary().contains(&event));
        }
    }
}
