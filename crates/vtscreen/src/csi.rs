//! CSI and ESC dispatch.

use tracing::debug;

use vtgrid::line::ErasePolicy;
use vtparse::params::Params;

use crate::kbd::KeyboardFlags;
use crate::modes::{MouseEncoding, MouseMode};
use crate::screen::{Screen, TERM_NAME, TERM_VERSION};

/// ESC sequences (and the C1 aliases spelled with ESC).
pub(crate) fn dispatch_esc(screen: &mut Screen, intermediates: &[u8], byte: u8) {
    match (intermediates, byte) {
        ([], b'D') => screen.linefeed(),                    // IND
        ([], b'E') => {
            // NEL
            screen.linefeed();
            screen.carriage_return();
        }
        ([], b'H') => {
            let col = screen.grid().cursor.col;
            screen.tabs.set(col);                           // HTS
        }
        ([], b'M') => screen.reverse_linefeed(),            // RI
        ([], b'7') => screen.save_cursor(),                 // DECSC
        ([], b'8') => screen.restore_cursor(),              // DECRC
        ([], b'=') => screen.modes.app_keypad = true,       // DECKPAM
        ([], b'>') => screen.modes.app_keypad = false,      // DECKPNM
        ([], b'c') => reset_terminal(screen),               // RIS
        ([], b'\\') => {}                                   // ST
        ([], b'N' | b'O') => {}                             // SS2/SS3
        ([b'#'], b'8') => {
            // DECALN
            screen.clear_selection();
            screen.grid_mut().fill_alignment_pattern();
        }
        ([b'('], designator) => {
            if let Some(set) = crate::charset::Charset::from_designator(designator) {
                screen.charsets.g0 = set;
            }
        }
        ([b')'], designator) => {
            if let Some(set) = crate::charset::Charset::from_designator(designator) {
                screen.charsets.g1 = set;
            }
        }
        _ => debug!(?intermediates, byte, "ignoring ESC sequence"),
    }
}

/// RIS and the soft parts of DECSTR.
fn reset_terminal(screen: &mut Screen) {
    let rows = screen.rows();
    let cols = screen.cols();
    screen.leave_alt_screen(false);
    screen.modes = crate::modes::Modes::default();
    screen.scroll_region = None;
    screen.charsets = crate::charset::Charsets::default();
    screen.tabs = crate::tabstops::TabStops::new(cols);
    screen.selection = None;
    screen.current_link = 0;
    screen.grid_mut().erase_rows(0..rows, ErasePolicy::ContentAndContinuation);
    screen.grid_mut().cursor = vtgrid::cursor::Cursor::default();
}

pub(crate) fn dispatch_csi(
    screen: &mut Screen,
    private: Option<u8>,
    params: &Params,
    intermediates: &[u8],
    final_byte: u8,
) {
    match private {
        Some(b'?') => dispatch_private(screen, params, intermediates, final_byte),
        Some(b'>') => dispatch_gt(screen, params, final_byte),
        Some(b'<') => dispatch_lt(screen, params, final_byte),
        Some(b'=') => dispatch_eq(screen, params, final_byte),
        Some(other) => debug!(marker = other, "ignoring CSI private marker"),
        None => dispatch_plain(screen, params, intermediates, final_byte),
    }
}

#[allow(clippy::too_many_lines)]
fn dispatch_plain(
    screen: &mut Screen,
    params: &Params,
    intermediates: &[u8],
    final_byte: u8,
) {
    let n = params.get_nonzero(0, 1) as usize;
    match (intermediates, final_byte) {
        ([], b'A') => move_cursor(screen, |c, _| c.0 = c.0.saturating_sub(n)),
        ([], b'B') => move_cursor(screen, |c, max| c.0 = (c.0 + n).min(max.0)),
        ([], b'C') => move_cursor(screen, |c, max| c.1 = (c.1 + n).min(max.1)),
        ([], b'D') => move_cursor(screen, |c, _| c.1 = c.1.saturating_sub(n)),
        ([], b'E') => {
            move_cursor(screen, |c, max| {
                c.0 = (c.0 + n).min(max.0);
                c.1 = 0;
            });
        }
        ([], b'F') => {
            move_cursor(screen, |c, _| {
                c.0 = c.0.saturating_sub(n);
                c.1 = 0;
            });
        }
        ([], b'G' | b'`') => move_cursor(screen, |c, max| c.1 = (n - 1).min(max.1)),
        ([], b'H' | b'f') => {
            let row = params.get_nonzero(0, 1) as usize - 1;
            let col = params.get_nonzero(1, 1) as usize - 1;
            cursor_position(screen, row, col);
        }
        ([], b'd') => {
            let row = n - 1;
            let origin = screen.modes.origin;
            let (top, bottom) = screen.region();
            let max = screen.rows() - 1;
            let target = if origin {
                (top + row).min(bottom)
            } else {
                row.min(max)
            };
            move_cursor(screen, |c, _| c.0 = target);
        }
        ([], b'I') => {
            for _ in 0..n {
                screen.horizontal_tab();
            }
        }
        ([], b'Z') => {
            let col = screen.grid().cursor.col;
            let target = {
                let mut c = col;
                for _ in 0..n {
                    c = screen.tabs.previous(c);
                }
                c
            };
            move_cursor(screen, |c, _| c.1 = target);
        }
        ([], b'J') => screen.erase_in_display(params.get(0, 0)),
        ([], b'K') => screen.erase_in_line(params.get(0, 0)),
        ([], b'L') => {
            let (top, bottom) = screen.region();
            let row = screen.grid().cursor.row;
            if row >= top && row <= bottom {
                screen.damage_selection(row as isize, bottom as isize);
                screen.grid_mut().insert_lines(row, n, bottom);
                screen.carriage_return();
            }
        }
        ([], b'M') => {
            let (top, bottom) = screen.region();
            let row = screen.grid().cursor.row;
            if row >= top && row <= bottom {
                screen.damage_selection(row as isize, bottom as isize);
                screen.grid_mut().delete_lines(row, n, bottom);
                screen.carriage_return();
            }
        }
        ([], b'@') => {
            // ICH
            let (row, col) = cursor_pos(screen);
            screen.damage_selection(row as isize, row as isize);
            let attrs = screen.grid().cursor.attrs;
            if let Some(line) = screen.grid_mut().line_mut(row) {
                line.insert_blanks(col, n, attrs);
            }
        }
        ([], b'P') => {
            // DCH
            let (row, col) = cursor_pos(screen);
            screen.damage_selection(row as isize, row as isize);
            let attrs = screen.grid().cursor.attrs;
            if let Some(line) = screen.grid_mut().line_mut(row) {
                line.delete_cells(col, n, attrs);
            }
        }
        ([], b'X') => {
            // ECH
            let (row, col) = cursor_pos(screen);
            let cols = screen.cols();
            screen.damage_selection(row as isize, row as isize);
            screen
                .grid_mut()
                .erase_in_row(row, col..(col + n).min(cols), ErasePolicy::ContentOnly);
        }
        ([], b'S') => screen.scroll_region_up(n),
        ([], b'T') => screen.scroll_region_down(n),
        ([], b'b') => screen.repeat_last(n),
        ([], b'm') => crate::sgr::apply_sgr(screen, params),
        ([], b'r') => {
            // DECSTBM
            let top = params.get_nonzero(0, 1) as usize - 1;
            let bottom = params.get_nonzero(1, screen.rows() as u32) as usize - 1;
            if top < bottom && bottom < screen.rows() {
                screen.scroll_region = if top == 0 && bottom == screen.rows() - 1 {
                    None
                } else {
                    Some((top, bottom))
                };
            } else {
                screen.scroll_region = None;
            }
            cursor_position(screen, 0, 0);
        }
        ([], b's') => screen.save_cursor(),
        ([], b'u') => screen.restore_cursor(),
        ([], b'g') => {
            // TBC
            match params.get(0, 0) {
                0 => {
                    let col = screen.grid().cursor.col;
                    screen.tabs.clear(col);
                }
                3 => screen.tabs.clear_all(),
                other => debug!(mode = other, "ignoring TBC mode"),
            }
        }
        ([], b'h') => set_ansi_mode(screen, params, true),
        ([], b'l') => set_ansi_mode(screen, params, false),
        ([], b'c') => {
            // DA1: VT220-class with the kitty keyboard protocol
            // discoverable via `CSI ? u`.
            if params.get(0, 0) == 0 {
                screen
                    .responses
                    .extend_from_slice(vtenc::csi!("?62;c").as_bytes());
            }
        }
        ([], b'n') => match params.get(0, 0) {
            5 => screen
                .responses
                .extend_from_slice(vtenc::csi!("0n").as_bytes()),
            6 => {
                let (row, col) = cursor_pos(screen);
                let (top, _) = screen.region();
                let row = if screen.modes.origin { row - top } else { row };
                let reply = format!("\x1b[{};{}R", row + 1, col + 1);
                screen.responses.extend_from_slice(reply.as_bytes());
            }
            other => debug!(kind = other, "ignoring DSR"),
        },
        ([], b't') => window_op(screen, params),
        ([b'$'], b'p') => {
            // DECRQM, ANSI flavor.
            let mode = params.get(0, 0);
            let state = match mode {
                4 => {
                    if screen.modes.insert {
                        1
                    } else {
                        2
                    }
                }
                20 => {
                    if screen.modes.newline {
                        1
                    } else {
                        2
                    }
                }
                _ => 0,
            };
            let reply = format!("\x1b[{mode};{state}$y");
            screen.responses.extend_from_slice(reply.as_bytes());
        }
        ([b' '], b'q') => {
            // DECSCUSR: accepted, cursor shape is a render concern.
            debug!(shape = params.get(0, 0), "cursor shape request");
        }
        _ => {
            debug!(?intermediates, final_byte, "ignoring CSI");
        }
    }
}

fn dispatch_private(
    screen: &mut Screen,
    params: &Params,
    intermediates: &[u8],
    final_byte: u8,
) {
    match (intermediates, final_byte) {
        ([], b'h') => {
            for group in params.iter() {
                set_dec_mode(screen, group[0], true);
            }
        }
        ([], b'l') => {
            for group in params.iter() {
                set_dec_mode(screen, group[0], false);
            }
        }
        ([b'$'], b'p') => {
            // DECRQM, DEC flavor.
            let mode = params.get(0, 0);
            let reply = format!("\x1b[?{};{}$y", mode, dec_mode_state(screen, mode));
            screen.responses.extend_from_slice(reply.as_bytes());
        }
        ([], b'u') => {
            // Query keyboard-protocol flags.
            let flags = screen.keyboard_flags().bits();
            let reply = format!("\x1b[?{flags}u");
            screen.responses.extend_from_slice(reply.as_bytes());
        }
        ([], b'c') => {
            // DA1 with private marker is a response, not a query.
        }
        _ => debug!(?intermediates, final_byte, "ignoring private CSI"),
    }
}

fn dispatch_gt(screen: &mut Screen, params: &Params, final_byte: u8) {
    match final_byte {
        b'u' => {
            // Push keyboard flags.
            let flags = KeyboardFlags::from_bits_truncate(params.get(0, 0) as u8);
            screen.kbd_mut().push(flags);
        }
        b'c' => {
            // DA2: model 1, encoded version, firmware 0.
            let version =
                TERM_VERSION.0 * 10_000 + TERM_VERSION.1 * 100 + TERM_VERSION.2;
            let reply = format!("\x1b[>1;{version};0c");
            screen.responses.extend_from_slice(reply.as_bytes());
        }
        b'q' => {
            // XTVERSION.
            let reply = format!(
                "\x1bP>|{TERM_NAME} {}.{}.{}\x1b\\",
                TERM_VERSION.0, TERM_VERSION.1, TERM_VERSION.2
            );
            screen.responses.extend_from_slice(reply.as_bytes());
        }
        other => debug!(final_byte = other, "ignoring CSI >"),
    }
}

fn dispatch_lt(screen: &mut Screen, params: &Params, final_byte: u8) {
    if final_byte == b'u' {
        let count = params.get_nonzero(0, 1) as usize;
        screen.kbd_mut().pop(count);
    } else {
        debug!(final_byte, "ignoring CSI <");
    }
}

fn dispatch_eq(screen: &mut Screen, params: &Params, final_byte: u8) {
    if final_byte == b'u' {
        let flags = KeyboardFlags::from_bits_truncate(params.get(0, 0) as u8);
        let mode = params.get(1, 1);
        screen.kbd_mut().set(flags, mode);
    } else {
        debug!(final_byte, "ignoring CSI =");
    }
}

fn cursor_pos(screen: &Screen) -> (usize, usize) {
    let c = &screen.grid().cursor;
    (c.row, c.col)
}

fn move_cursor(screen: &mut Screen, f: impl FnOnce(&mut (usize, usize), (usize, usize))) {
    let max = (screen.rows() - 1, screen.cols() - 1);
    let cursor = &mut screen.grid_mut().cursor;
    let mut pos = (cursor.row, cursor.col);
    f(&mut pos, max);
    cursor.row = pos.0.min(max.0);
    cursor.col = pos.1.min(max.1);
    cursor.pending_wrap = false;
}

/// CUP/HVP with origin-mode addressing.
fn cursor_position(screen: &mut Screen, row: usize, col: usize) {
    let (top, bottom) = screen.region();
    let max_col = screen.cols() - 1;
    let target_row = if screen.modes.origin {
        (top + row).min(bottom)
    } else {
        row.min(screen.rows() - 1)
    };
    screen.grid_mut().cursor.move_to(target_row, col.min(max_col));
}

fn set_ansi_mode(screen: &mut Screen, params: &Params, enabled: bool) {
    for group in params.iter() {
        match group[0] {
            4 => screen.modes.insert = enabled,
            20 => screen.modes.newline = enabled,
            other => debug!(mode = other, enabled, "ignoring ANSI mode"),
        }
    }
}

#[allow(clippy::too_many_lines)]
fn set_dec_mode(screen: &mut Screen, mode: u32, enabled: bool) {
    match mode {
        1 => screen.modes.app_cursor_keys = enabled,
        5 => screen.modes.reverse_video = enabled,
        6 => {
            screen.modes.origin = enabled;
            cursor_position(screen, 0, 0);
        }
        7 => screen.modes.autowrap = enabled,
        9 => set_mouse(screen, MouseMode::Press, enabled),
        25 => screen.modes.cursor_visible = enabled,
        47 => toggle_alt(screen, enabled, false, false),
        66 => screen.modes.app_keypad = enabled,
        1000 => set_mouse(screen, MouseMode::Normal, enabled),
        1002 => set_mouse(screen, MouseMode::ButtonMotion, enabled),
        1003 => set_mouse(screen, MouseMode::AnyMotion, enabled),
        1004 => screen.modes.focus_reporting = enabled,
        1005 => set_mouse_encoding(screen, MouseEncoding::Utf8, enabled),
        1006 => set_mouse_encoding(screen, MouseEncoding::Sgr, enabled),
        1015 => set_mouse_encoding(screen, MouseEncoding::Urxvt, enabled),
        1016 => set_mouse_encoding(screen, MouseEncoding::SgrPixel, enabled),
        1047 => toggle_alt(screen, enabled, false, true),
        1048 => {
            if enabled {
                screen.save_cursor();
            } else {
                screen.restore_cursor();
            }
        }
        1049 => toggle_alt(screen, enabled, true, true),
        2004 => screen.modes.bracketed_paste = enabled,
        2026 => screen.modes.synchronized_updates = enabled,
        other => screen.modes.set_unknown(other, enabled),
    }
}

fn toggle_alt(screen: &mut Screen, enter: bool, save_cursor: bool, clear: bool) {
    if enter {
        screen.enter_alt_screen(save_cursor, clear);
    } else {
        screen.leave_alt_screen(save_cursor);
    }
}

fn set_mouse(screen: &mut Screen, mode: MouseMode, enabled: bool) {
    screen.modes.mouse = if enabled { mode } else { MouseMode::Off };
}

fn set_mouse_encoding(screen: &mut Screen, encoding: MouseEncoding, enabled: bool) {
    screen.modes.mouse_encoding = if enabled {
        encoding
    } else {
        MouseEncoding::Legacy
    };
}

fn dec_mode_state(screen: &Screen, mode: u32) -> u32 {
    let known = match mode {
        1 => Some(screen.modes.app_cursor_keys),
        5 => Some(screen.modes.reverse_video),
        6 => Some(screen.modes.origin),
        7 => Some(screen.modes.autowrap),
        25 => Some(screen.modes.cursor_visible),
        47 | 1047 | 1049 => Some(screen.alt_screen_active()),
        1000 => Some(screen.modes.mouse == MouseMode::Normal),
        1002 => Some(screen.modes.mouse == MouseMode::ButtonMotion),
        1003 => Some(screen.modes.mouse == MouseMode::AnyMotion),
        1004 => Some(screen.modes.focus_reporting),
        1006 => Some(screen.modes.mouse_encoding == MouseEncoding::Sgr),
        1016 => Some(screen.modes.mouse_encoding == MouseEncoding::SgrPixel),
        2004 => Some(screen.modes.bracketed_paste),
        2026 => Some(screen.modes.synchronized_updates),
        other => screen.modes.unknown_state(other),
    };
    match known {
        Some(true) => 1,
        Some(false) => 2,
        None => 0,
    }
}

/// XTWINOPS subset: size reports and the title stack.
fn window_op(screen: &mut Screen, params: &Params) {
    match params.get(0, 0) {
        14 => {
            let width = screen.cols() as u32 * screen.config.cell_width;
            let height = screen.rows() as u32 * screen.config.cell_height;
            let reply = format!("\x1b[4;{height};{width}t");
            screen.responses.extend_from_slice(reply.as_bytes());
        }
        16 => {
            let reply = format!(
                "\x1b[6;{};{}t",
                screen.config.cell_height, screen.config.cell_width
            );
            screen.responses.extend_from_slice(reply.as_bytes());
        }
        18 => {
            let reply = format!("\x1b[8;{};{}t", screen.rows(), screen.cols());
            screen.responses.extend_from_slice(reply.as_bytes());
        }
        22 => screen.title_stack.push(screen.title.clone()),
        23 => {
            if let Some(title) = screen.title_stack.pop() {
                screen.title = title.clone();
                screen
                    .events
                    .push(crate::events::TermEvent::TitleChanged(title));
            }
        }
        other => debug!(op = other, "ignoring XTWINOPS"),
    }
}
