//! ANSI and DEC private mode state.

use std::collections::HashMap;

use tracing::debug;

/// Which mouse events are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseMode {
    #[default]
    Off,
    /// DECSET 9: press only (X10).
    Press,
    /// DECSET 1000: press and release.
    Normal,
    /// DECSET 1002: plus drag motion.
    ButtonMotion,
    /// DECSET 1003: all motion.
    AnyMotion,
}

/// How mouse coordinates are encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseEncoding {
    /// Legacy single-byte offsets.
    #[default]
    Legacy,
    /// DECSET 1005: UTF-8 extended coordinates.
    Utf8,
    /// DECSET 1006: SGR digits.
    Sgr,
    /// DECSET 1015: urxvt digits.
    Urxvt,
    /// DECSET 1016: SGR with pixel coordinates.
    SgrPixel,
}

/// The mode flags the state machine consults. Unknown private modes
/// are stored (for DECRQM round-trips) but have no effect.
#[derive(Debug, Clone)]
pub struct Modes {
    /// DECAWM (?7), on by default.
    pub autowrap: bool,
    /// DECOM (?6).
    pub origin: bool,
    /// IRM (4).
    pub insert: bool,
    /// LNM (20): LF implies CR.
    pub newline: bool,
    /// DECTCEM (?25), on by default.
    pub cursor_visible: bool,
    /// DECSCNM (?5): global reverse video.
    pub reverse_video: bool,
    /// DECCKM (?1): application cursor keys.
    pub app_cursor_keys: bool,
    /// DECNKM / ESC = : application keypad.
    pub app_keypad: bool,
    /// ?2004.
    pub bracketed_paste: bool,
    /// ?1004.
    pub focus_reporting: bool,
    /// ?2026; mirrors the parser's pending state for DECRQM.
    pub synchronized_updates: bool,
    pub mouse: MouseMode,
    pub mouse_encoding: MouseEncoding,
    unknown: HashMap<u32, bool>,
}

impl Default for Modes {
    fn default() -> Self {
        Self {
            autowrap: true,
            origin: false,
            insert: false,
            newline: false,
            cursor_visible: true,
            reverse_video: false,
            app_cursor_keys: false,
            app_keypad: false,
            bracketed_paste: false,
            focus_reporting: false,
            synchronized_updates: false,
            mouse: MouseMode::default(),
            mouse_encoding: MouseEncoding::default(),
            unknown: HashMap::new(),
        }
    }
}

impl Modes {
    /// Record an unrecognized private mode; it round-trips through
    /// DECRQM but changes nothing.
    pub fn set_unknown(&mut self, number: u32, enabled: bool) {
        debug!(mode = number, enabled, "storing unknown private mode");
        self.unknown.insert(number, enabled);
    }

    #[must_use]
    pub fn unknown_state(&self, number: u32) -> Option<bool> {
        self.unknown.get(&number).copied()
    }
}
