//! Serialization of user input into PTY bytes.
//!
//! The reporter is the outbound half of the terminal: key presses,
//! mouse events, focus changes, and pastes become escape codes chosen
//! by the modes the application enabled (legacy encodings, the
//! progressive keyboard protocol, SGR or SGR-pixel mouse reports,
//! bracketed paste).

#![warn(clippy::pedantic)]

pub mod key;
pub mod mouse;
pub mod paste;

pub use key::{KeyCode, KeyEvent, KeyEventKind, Modifiers, encode_key};
pub use mouse::{MouseButton, MouseEvent, MouseEventKind, encode_mouse};
pub use paste::{PasteConfig, encode_paste};

use vtscreen::{KeyboardFlags, Modes, MouseEncoding, MouseMode, Screen};

/// A snapshot of the mode state input encoding depends on.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputModes {
    pub app_cursor_keys: bool,
    pub app_keypad: bool,
    pub bracketed_paste: bool,
    pub focus_reporting: bool,
    pub mouse: MouseMode,
    pub mouse_encoding: MouseEncoding,
    pub keyboard: KeyboardFlags,
}

impl InputModes {
    /// Capture the encoding-relevant modes from a screen.
    #[must_use]
    pub fn from_screen(screen: &Screen) -> Self {
        let modes: &Modes = screen.modes();
        Self {
            app_cursor_keys: modes.app_cursor_keys,
            app_keypad: modes.app_keypad,
            bracketed_paste: modes.bracketed_paste,
            focus_reporting: modes.focus_reporting,
            mouse: modes.mouse,
            mouse_encoding: modes.mouse_encoding,
            keyboard: screen.keyboard_flags(),
        }
    }
}

/// Focus-in/out reports (`CSI I` / `CSI O`), when enabled.
#[must_use]
pub fn encode_focus(focused: bool, modes: &InputModes) -> Option<&'static [u8]> {
    if !modes.focus_reporting {
        return None;
    }
    Some(if focused {
        vtenc::csi!("I").as_bytes()
    } else {
        vtenc::csi!("O").as_bytes()
    })
}

/// Primary-device-attributes request from the application side is
/// answered by the screen; this is the reporter's DA reply used by
/// embedders implementing their own query channel.
#[must_use]
pub fn device_attributes_reply() -> &'static [u8] {
    vtenc::csi!("?62;c").as_bytes()
}
