//! Key-event encoding: legacy xterm and the progressive CSI-u
//! protocol.

use bitflags::bitflags;
use vtscreen::KeyboardFlags;

use crate::InputModes;

bitflags! {
    /// Modifier bits as the keyboard protocol encodes them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u16 {
        const SHIFT = 0b0000_0001;
        const ALT   = 0b0000_0010;
        const CTRL  = 0b0000_0100;
        const SUPER = 0b0000_1000;
        const HYPER = 0b0001_0000;
        const META  = 0b0010_0000;
        const CAPS_LOCK = 0b0100_0000;
        const NUM_LOCK  = 0b1000_0000;
    }
}

/// Press, repeat, or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyEventKind {
    #[default]
    Press,
    Repeat,
    Release,
}

impl KeyEventKind {
    fn protocol_value(self) -> u16 {
        match self {
            KeyEventKind::Press => 1,
            KeyEventKind::Repeat => 2,
            KeyEventKind::Release => 3,
        }
    }
}

/// The keys the reporter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Char(char),
    Enter,
    Tab,
    Backspace,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F(u8),
}

/// One key event from the window system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub mods: Modifiers,
    pub kind: KeyEventKind,
    /// The text this key generates, when any.
    pub text: Option<String>,
}

impl KeyEvent {
    #[must_use]
    pub fn plain(code: KeyCode) -> Self {
        Self {
            code,
            mods: Modifiers::empty(),
            kind: KeyEventKind::Press,
            text: None,
        }
    }

    #[must_use]
    pub fn with_mods(code: KeyCode, mods: Modifiers) -> Self {
        Self {
            code,
            mods,
            kind: KeyEventKind::Press,
            text: None,
        }
    }
}

/// Encode a key event per the active modes. Returns an empty vector
/// when the event produces no bytes (e.g. a release in legacy mode).
#[must_use]
pub fn encode_key(event: &KeyEvent, modes: &InputModes) -> Vec<u8> {
    let flags = modes.keyboard;
    if flags.is_empty() {
        return encode_legacy(event, modes);
    }
    encode_protocol(event, modes, flags)
}

// ----------------------------------------------------------------------
// Legacy encoding
// ----------------------------------------------------------------------

fn encode_legacy(event: &KeyEvent, modes: &InputModes) -> Vec<u8> {
    // Legacy mode never reports release or repeat as distinct events;
    // repeats re-send the press bytes.
    if event.kind == KeyEventKind::Release {
        return Vec::new();
    }

    let mut out = Vec::new();
    let alt = event.mods.contains(Modifiers::ALT);
    let ctrl = event.mods.contains(Modifiers::CTRL);
    let shift = event.mods.contains(Modifiers::SHIFT);

    match event.code {
        KeyCode::Char(c) => {
            if alt {
                out.push(0x1B);
            }
            if ctrl {
                if let Some(byte) = ctrl_byte(c) {
                    out.push(byte);
                    return out;
                }
            }
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
        KeyCode::Enter => {
            if alt {
                out.push(0x1B);
            }
            out.push(b'\r');
        }
        KeyCode::Tab => {
            if shift {
                out.extend_from_slice(b"\x1b[Z");
            } else {
                if alt {
                    out.push(0x1B);
                }
                out.push(b'\t');
            }
        }
        KeyCode::Backspace => {
            if alt {
                out.push(0x1B);
            }
            out.push(if ctrl { 0x08 } else { 0x7F });
        }
        KeyCode::Escape => {
            if alt {
                out.push(0x1B);
            }
            out.push(0x1B);
        }
        KeyCode::Up | KeyCode::Down | KeyCode::Right | KeyCode::Left
        | KeyCode::Home | KeyCode::End => {
            let final_byte = match event.code {
                KeyCode::Up => b'A',
                KeyCode::Down => b'B',
                KeyCode::Right => b'C',
                KeyCode::Left => b'D',
                KeyCode::Home => b'H',
                _ => b'F',
            };
            if event.mods.is_empty() {
                if modes.app_cursor_keys {
                    out.extend_from_slice(b"\x1bO");
                } else {
                    out.extend_from_slice(b"\x1b[");
                }
                out.push(final_byte);
            } else {
                out.extend_from_slice(
                    format!("\x1b[1;{}{}", legacy_mods(event.mods), final_byte as char)
                        .as_bytes(),
                );
            }
        }
        KeyCode::PageUp | KeyCode::PageDown | KeyCode::Insert | KeyCode::Delete => {
            let number = match event.code {
                KeyCode::Insert => 2,
                KeyCode::Delete => 3,
                KeyCode::PageUp => 5,
                _ => 6,
            };
            if event.mods.is_empty() {
                out.extend_from_slice(format!("\x1b[{number}~").as_bytes());
            } else {
                out.extend_from_slice(
                    format!("\x1b[{number};{}~", legacy_mods(event.mods)).as_bytes(),
                );
            }
        }
        KeyCode::F(n) => encode_legacy_function(n, event.mods, &mut out),
    }
    out
}

/// Legacy modifier parameter: bits + 1.
fn legacy_mods(mods: Modifiers) -> u16 {
    (mods & (Modifiers::SHIFT | Modifiers::ALT | Modifiers::CTRL | Modifiers::SUPER)).bits() + 1
}

fn ctrl_byte(c: char) -> Option<u8> {
    match c {
        'a'..='z' => Some(c as u8 - b'a' + 1),
        'A'..='Z' => Some(c as u8 - b'A' + 1),
        ' ' | '@' => Some(0),
        '[' => Some(0x1B),
        '\\' => Some(0x1C),
        ']' => Some(0x1D),
        '^' => Some(0x1E),
        '_' | '/' => Some(0x1F),
        _ => None,
    }
}

fn encode_legacy_function(n: u8, mods: Modifiers, out: &mut Vec<u8>) {
    // F1-F4 are SS3 letters; the rest are tilde codes.
    match n {
        1..=4 => {
            let letter = (b'P' + n - 1) as char;
            if mods.is_empty() {
                out.extend_from_slice(format!("\x1bO{letter}").as_bytes());
            } else {
                out.extend_from_slice(format!("\x1b[1;{}{letter}", legacy_mods(mods)).as_bytes());
            }
        }
        5..=12 => {
            let number = match n {
                5 => 15,
                6 => 17,
                7 => 18,
                8 => 19,
                9 => 20,
                10 => 21,
                11 => 23,
                _ => 24,
            };
            if mods.is_empty() {
                out.extend_from_slice(format!("\x1b[{number}~").as_bytes());
            } else {
                out.extend_from_slice(
                    format!("\x1b[{number};{}~", legacy_mods(mods)).as_bytes(),
                );
            }
        }
        _ => {}
    }
}

// ----------------------------------------------------------------------
// Progressive protocol (CSI u)
// ----------------------------------------------------------------------

fn encode_protocol(event: &KeyEvent, modes: &InputModes, flags: KeyboardFlags) -> Vec<u8> {
    let report_events = flags.contains(KeyboardFlags::REPORT_EVENT_TYPES);
    if event.kind != KeyEventKind::Press && !report_events {
        return Vec::new();
    }

    // Plain printable text without modifiers stays text unless the
    // application asked for every key as an escape code.
    if !flags.contains(KeyboardFlags::REPORT_ALL_KEYS) {
        if let KeyCode::Char(c) = event.code {
            let effectively_plain = (event.mods
                - (Modifiers::SHIFT | Modifiers::CAPS_LOCK | Modifiers::NUM_LOCK))
                .is_empty();
            if effectively_plain && event.kind != KeyEventKind::Release {
                let mut buf = [0u8; 4];
                return c.encode_utf8(&mut buf).as_bytes().to_vec();
            }
            if event.kind == KeyEventKind::Release && !report_events {
                return Vec::new();
            }
        }
        // Enter, Tab, and Backspace keep their legacy bytes in the
        // disambiguate-only mode and never emit spurious releases.
        if matches!(
            event.code,
            KeyCode::Enter | KeyCode::Tab | KeyCode::Backspace
        ) && event.mods.is_empty()
        {
            if event.kind == KeyEventKind::Release {
                return Vec::new();
            }
            return encode_legacy(event, modes);
        }
    }

    let (number, suffix) = protocol_number(event.code);
    let mods_value = event.mods.bits() + 1;
    let needs_mods = mods_value > 1 || report_events && event.kind != KeyEventKind::Press;

    let mut out = Vec::new();
    out.extend_from_slice(b"\x1b[");
    if suffix == b'u' || suffix == b'~' || number != 1 || !needs_mods {
        out.extend_from_slice(number.to_string().as_bytes());
    } else {
        out.push(b'1');
    }
    if needs_mods {
        out.push(b';');
        out.extend_from_slice(mods_value.to_string().as_bytes());
        if report_events && event.kind != KeyEventKind::Press {
            out.push(b':');
            out.extend_from_slice(event.kind.protocol_value().to_string().as_bytes());
        }
    }
    if flags.contains(KeyboardFlags::REPORT_TEXT)
        && event.kind != KeyEventKind::Release
    {
        if let Some(text) = &event.text {
            let codepoints: Vec<String> =
                text.chars().map(|c| (c as u32).to_string()).collect();
            if !codepoints.is_empty() {
                if !needs_mods {
                    out.push(b';');
                    out.extend_from_slice(mods_value.to_string().as_bytes());
                }
                out.push(b';');
                out.extend_from_slice(codepoints.join(":").as_bytes());
            }
        }
    }
    out.push(suffix);
    out
}

/// The protocol's key number and final byte.
fn protocol_number(code: KeyCode) -> (u32, u8) {
    match code {
        KeyCode::Char(c) => (c.to_ascii_lowercase() as u32, b'u'),
        KeyCode::Enter => (13, b'u'),
        KeyCode::Tab => (9, b'u'),
        KeyCode::Backspace => (127, b'u'),
        KeyCode::Escape => (27, b'u'),
        KeyCode::Up => (1, b'A'),
        KeyCode::Down => (1, b'B'),
        KeyCode::Right => (1, b'C'),
        KeyCode::Left => (1, b'D'),
        KeyCode::Home => (1, b'H'),
        KeyCode::End => (1, b'F'),
        KeyCode::PageUp => (5, b'~'),
        KeyCode::PageDown => (6, b'~'),
        KeyCode::Insert => (2, b'~'),
        KeyCode::Delete => (3, b'~'),
        KeyCode::F(n) => match n {
            1 => (1, b'P'),
            2 => (1, b'Q'),
            3 => (13, b'~'),
            4 => (1, b'S'),
            5 => (15, b'~'),
            6 => (17, b'~'),
            7 => (18, b'~'),
            8 => (19, b'~'),
            9 => (20, b'~'),
            10 => (21, b'~'),
            11 => (23, b'~'),
            _ => (24, b'~'),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn legacy_modes() -> InputModes {
        InputModes::default()
    }

    fn protocol_modes(flags: KeyboardFlags) -> InputModes {
        InputModes {
            keyboard: flags,
            ..InputModes::default()
        }
    }

    #[test]
    fn plain_char_is_text() {
        let bytes = encode_key(&KeyEvent::plain(KeyCode::Char('a')), &legacy_modes());
        assert_eq!(bytes, b"a");
    }

    #[test]
    fn ctrl_char_legacy() {
        let bytes = encode_key(
            &KeyEvent::with_mods(KeyCode::Char('c'), Modifiers::CTRL),
            &legacy_modes(),
        );
        assert_eq!(bytes, vec![0x03]);
    }

    #[test]
    fn alt_char_gets_esc_prefix() {
        let bytes = encode_key(
            &KeyEvent::with_mods(KeyCode::Char('x'), Modifiers::ALT),
            &legacy_modes(),
        );
        assert_eq!(bytes, b"\x1bx");
    }

    #[test]
    fn arrows_follow_cursor_key_mode() {
        let mut modes = legacy_modes();
        assert_eq!(encode_key(&KeyEvent::plain(KeyCode::Up), &modes), b"\x1b[A");
        modes.app_cursor_keys = true;
        assert_eq!(encode_key(&KeyEvent::plain(KeyCode::Up), &modes), b"\x1bOA");
    }

    #[test]
    fn modified_arrow_uses_parameter_form() {
        let bytes = encode_key(
            &KeyEvent::with_mods(KeyCode::Left, Modifiers::CTRL),
            &legacy_modes(),
        );
        assert_eq!(bytes, b"\x1b[1;5D");
    }

    #[test]
    fn release_silent_in_legacy() {
        let mut event = KeyEvent::plain(KeyCode::Char('a'));
        event.kind = KeyEventKind::Release;
        assert!(encode_key(&event, &legacy_modes()).is_empty());
    }

    #[test]
    fn disambiguate_keeps_plain_text() {
        let modes = protocol_modes(KeyboardFlags::DISAMBIGUATE);
        assert_eq!(
            encode_key(&KeyEvent::plain(KeyCode::Char('a')), &modes),
            b"a"
        );
        // Esc becomes unambiguous CSI u.
        assert_eq!(
            encode_key(&KeyEvent::plain(KeyCode::Escape), &modes),
            b"\x1b[27u"
        );
    }

    #[test]
    fn ctrl_char_protocol_form() {
        let modes = protocol_modes(KeyboardFlags::DISAMBIGUATE);
        let bytes = encode_key(
            &KeyEvent::with_mods(KeyCode::Char('c'), Modifiers::CTRL),
            &modes,
        );
        assert_eq!(bytes, b"\x1b[99;5u");
    }

    #[test]
    fn enter_tab_backspace_no_spurious_release() {
        let modes = protocol_modes(KeyboardFlags::DISAMBIGUATE);
        for code in [KeyCode::Enter, KeyCode::Tab, KeyCode::Backspace] {
            let press = encode_key(&KeyEvent::plain(code), &modes);
            assert!(!press.is_empty());
            let mut release = KeyEvent::plain(code);
            release.kind = KeyEventKind::Release;
            assert!(
                encode_key(&release, &modes).is_empty(),
                "{code:?} must not emit a release"
            );
        }
    }

    #[test]
    fn report_all_keys_encodes_everything() {
        let modes = protocol_modes(KeyboardFlags::REPORT_ALL_KEYS);
        assert_eq!(
            encode_key(&KeyEvent::plain(KeyCode::Char('a')), &modes),
            b"\x1b[97u"
        );
        assert_eq!(
            encode_key(&KeyEvent::plain(KeyCode::Enter), &modes),
            b"\x1b[13u"
        );
    }

    #[test]
    fn event_types_add_suffix() {
        let modes = protocol_modes(
            KeyboardFlags::REPORT_ALL_KEYS | KeyboardFlags::REPORT_EVENT_TYPES,
        );
        let mut event = KeyEvent::plain(KeyCode::Char('a'));
        event.kind = KeyEventKind::Release;
        assert_eq!(encode_key(&event, &modes), b"\x1b[97;1:3u");
        event.kind = KeyEventKind::Repeat;
        assert_eq!(encode_key(&event, &modes), b"\x1b[97;1:2u");
    }

    #[test]
    fn associated_text_reported() {
        let modes = protocol_modes(
            KeyboardFlags::REPORT_ALL_KEYS | KeyboardFlags::REPORT_TEXT,
        );
        let mut event = KeyEvent::plain(KeyCode::Char('a'));
        event.text = Some("a".to_string());
        assert_eq!(encode_key(&event, &modes), b"\x1b[97;1;97u");
    }

    #[test]
    fn arrow_in_protocol_mode() {
        let modes = protocol_modes(KeyboardFlags::DISAMBIGUATE);
        let bytes = encode_key(
            &KeyEvent::with_mods(KeyCode::Up, Modifiers::SHIFT),
            &modes,
        );
        assert_eq!(bytes, b"\x1b[1;2A");
    }
}
