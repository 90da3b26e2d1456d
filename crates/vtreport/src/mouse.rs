//! Mouse-event encoding: legacy bytes, SGR, SGR-pixel, and urxvt.

use vtscreen::{MouseEncoding, MouseMode};

use crate::InputModes;
use crate::key::Modifiers;

/// Buttons as the wire protocols number them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    /// Motion with no button held.
    None,
    WheelUp,
    WheelDown,
    /// Horizontal wheel; the SGR-pixel direction is authoritative:
    /// 6 tilts left, 7 tilts right.
    WheelLeft,
    WheelRight,
}

impl MouseButton {
    fn code(self) -> u32 {
        match self {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
            MouseButton::None => 3,
            MouseButton::WheelUp => 64,
            MouseButton::WheelDown => 65,
            MouseButton::WheelLeft => 66,
            MouseButton::WheelRight => 67,
        }
    }

    fn is_wheel(self) -> bool {
        self.code() >= 64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEventKind {
    Press,
    Release,
    Motion,
}

/// One pointer event in cell coordinates (0-based), with optional
/// pixel coordinates for the SGR-pixel protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub button: MouseButton,
    pub kind: MouseEventKind,
    /// 0-based cell position. May lie outside the grid during drags;
    /// legacy encodings clamp instead of dropping the report.
    pub row: i32,
    pub col: i32,
    /// Pixel position for DECSET 1016.
    pub pixel: Option<(i32, i32)>,
    pub mods: Modifiers,
}

/// Encode per the active mouse mode and encoding; `None` when the
/// mode filters the event out.
#[must_use]
pub fn encode_mouse(event: &MouseEvent, modes: &InputModes) -> Option<Vec<u8>> {
    if !wanted(event, modes.mouse) {
        return None;
    }

    let mut code = event.button.code();
    if event.kind == MouseEventKind::Motion {
        code += 32;
    }
    if event.mods.contains(Modifiers::SHIFT) {
        code += 4;
    }
    if event.mods.contains(Modifiers::ALT) {
        code += 8;
    }
    if event.mods.contains(Modifiers::CTRL) {
        code += 16;
    }

    match modes.mouse_encoding {
        MouseEncoding::Sgr => {
            let (col, row) = clamp_cells(event);
            Some(sgr_report(code, col, row, event.kind == MouseEventKind::Release))
        }
        MouseEncoding::SgrPixel => {
            let (x, y) = event
                .pixel
                .map_or_else(|| clamp_cells(event), |(x, y)| (x.max(0) as u32 + 1, y.max(0) as u32 + 1));
            Some(sgr_report(code, x, y, event.kind == MouseEventKind::Release))
        }
        MouseEncoding::Urxvt => {
            let (col, row) = clamp_cells(event);
            let code = if event.kind == MouseEventKind::Release && !event.button.is_wheel() {
                3 + 32
            } else {
                code + 32
            };
            Some(format!("\x1b[{code};{col};{row}M").into_bytes())
        }
        MouseEncoding::Legacy | MouseEncoding::Utf8 => {
            Some(legacy_report(event, code, modes.mouse_encoding == MouseEncoding::Utf8))
        }
    }
}

fn wanted(event: &MouseEvent, mode: MouseMode) -> bool {
    match mode {
        MouseMode::Off => false,
        MouseMode::Press => {
            event.kind == MouseEventKind::Press && !event.button.is_wheel()
        }
        MouseMode::Normal => event.kind != MouseEventKind::Motion,
        MouseMode::ButtonMotion => {
            event.kind != MouseEventKind::Motion || event.button != MouseButton::None
        }
        MouseMode::AnyMotion => true,
    }
}

fn clamp_cells(event: &MouseEvent) -> (u32, u32) {
    // 1-based; drags past the window edge clamp to the border.
    (
        u32::try_from(event.col.max(0)).unwrap_or(0) + 1,
        u32::try_from(event.row.max(0)).unwrap_or(0) + 1,
    )
}

fn sgr_report(code: u32, x: u32, y: u32, release: bool) -> Vec<u8> {
    let suffix = if release { 'm' } else { 'M' };
    format!("\x1b[<{code};{x};{y}{suffix}").into_bytes()
}

fn legacy_report(event: &MouseEvent, code: u32, utf8: bool) -> Vec<u8> {
    // Release collapses to button 3; wheels never report release.
    let code = if event.kind == MouseEventKind::Release && !event.button.is_wheel() {
        (code & !0b11) | 3
    } else {
        code
    };
    let (col, row) = clamp_cells(event);
    let mut out = b"\x1b[M".to_vec();
    out.push(u8::try_from(code + 32).unwrap_or(0xFF));
    for coord in [col, row] {
        let value = coord + 32;
        if utf8 {
            // DECSET 1005: coordinates above 127 become two UTF-8
            // bytes.
            if let Some(c) = char::from_u32(value) {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        } else {
            // Legacy caps at 223 + 32.
            out.push(u8::try_from(value.min(255)).unwrap_or(255));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn modes(mode: MouseMode, encoding: MouseEncoding) -> InputModes {
        InputModes {
            mouse: mode,
            mouse_encoding: encoding,
            ..InputModes::default()
        }
    }

    fn press(button: MouseButton, col: i32, row: i32) -> MouseEvent {
        MouseEvent {
            button,
            kind: MouseEventKind::Press,
            row,
            col,
            pixel: None,
            mods: Modifiers::empty(),
        }
    }

    #[test]
    fn off_mode_reports_nothing() {
        let event = press(MouseButton::Left, 0, 0);
        assert_eq!(
            encode_mouse(&event, &modes(MouseMode::Off, MouseEncoding::Sgr)),
            None
        );
    }

    #[test]
    fn sgr_press_and_release() {
        let m = modes(MouseMode::Normal, MouseEncoding::Sgr);
        let event = press(MouseButton::Left, 4, 2);
        assert_eq!(encode_mouse(&event, &m).unwrap(), b"\x1b[<0;5;3M");

        let mut release = event;
        release.kind = MouseEventKind::Release;
        assert_eq!(encode_mouse(&release, &m).unwrap(), b"\x1b[<0;5;3m");
    }

    #[test]
    fn sgr_pixel_uses_pixel_coordinates() {
        let m = modes(MouseMode::Normal, MouseEncoding::SgrPixel);
        let mut event = press(MouseButton::Left, 4, 2);
        event.pixel = Some((47, 91));
        assert_eq!(encode_mouse(&event, &m).unwrap(), b"\x1b[<0;48;92M");
    }

    #[test]
    fn horizontal_wheel_codes() {
        let m = modes(MouseMode::Normal, MouseEncoding::Sgr);
        let left = press(MouseButton::WheelLeft, 0, 0);
        let right = press(MouseButton::WheelRight, 0, 0);
        assert_eq!(encode_mouse(&left, &m).unwrap(), b"\x1b[<66;1;1M");
        assert_eq!(encode_mouse(&right, &m).unwrap(), b"\x1b[<67;1;1M");
    }

    #[test]
    fn motion_filtered_by_mode() {
        let mut event = press(MouseButton::None, 1, 1);
        event.kind = MouseEventKind::Motion;
        assert_eq!(
            encode_mouse(&event, &modes(MouseMode::Normal, MouseEncoding::Sgr)),
            None
        );
        assert!(
            encode_mouse(&event, &modes(MouseMode::AnyMotion, MouseEncoding::Sgr)).is_some()
        );
    }

    #[test]
    fn drag_motion_adds_32() {
        let m = modes(MouseMode::ButtonMotion, MouseEncoding::Sgr);
        let mut event = press(MouseButton::Left, 0, 0);
        event.kind = MouseEventKind::Motion;
        assert_eq!(encode_mouse(&event, &m).unwrap(), b"\x1b[<32;1;1M");
    }

    #[test]
    fn legacy_bytes() {
        let m = modes(MouseMode::Normal, MouseEncoding::Legacy);
        let event = press(MouseButton::Left, 0, 0);
        assert_eq!(encode_mouse(&event, &m).unwrap(), b"\x1b[M\x20\x21\x21");
    }

    #[test]
    fn legacy_release_outside_window_is_clamped() {
        let m = modes(MouseMode::Normal, MouseEncoding::Legacy);
        let mut event = press(MouseButton::Left, -3, -1);
        event.kind = MouseEventKind::Release;
        let bytes = encode_mouse(&event, &m).unwrap();
        // Button 3 (release), clamped to column 1, row 1.
        assert_eq!(bytes, b"\x1b[M\x23\x21\x21");
    }

    #[test]
    fn modifiers_fold_into_button_code() {
        let m = modes(MouseMode::Normal, MouseEncoding::Sgr);
        let mut event = press(MouseButton::Left, 0, 0);
        event.mods = Modifiers::CTRL | Modifiers::SHIFT;
        assert_eq!(encode_mouse(&event, &m).unwrap(), b"\x1b[<20;1;1M");
    }

    #[test]
    fn x10_mode_presses_only() {
        let m = modes(MouseMode::Press, MouseEncoding::Sgr);
        assert!(encode_mouse(&press(MouseButton::Left, 0, 0), &m).is_some());
        let mut release = press(MouseButton::Left, 0, 0);
        release.kind = MouseEventKind::Release;
        assert_eq!(encode_mouse(&release, &m), None);
        assert_eq!(encode_mouse(&press(MouseButton::WheelUp, 0, 0), &m), None);
    }
}
