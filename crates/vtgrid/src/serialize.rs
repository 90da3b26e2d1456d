//! Serialization of grid content as plain text or ANSI.
//!
//! The ANSI form re-emits enough SGR and OSC 8 state that feeding it
//! back through the parser reproduces the original cells, colors,
//! attributes, and hyperlinks included.

use std::io::Write;

use crate::cell::{Attrs, Cell, CellFlags, Color, UnderlineStyle};
use crate::hyperlink::HyperlinkPool;
use crate::line::Line;

/// Output flavor for copy queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyFormat {
    Plain,
    Ansi,
}

/// Options for region copies.
#[derive(Debug, Clone, Copy)]
pub struct CopyOptions {
    pub format: CopyFormat,
    /// Drop trailing blanks on each line.
    pub strip_trailing_spaces: bool,
    /// Mark soft-wrap boundaries with a carriage return so multi-line
    /// pattern matching can distinguish them from hard breaks.
    pub wrap_markers: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            format: CopyFormat::Plain,
            strip_trailing_spaces: true,
            wrap_markers: false,
        }
    }
}

/// Append the SGR sequence that makes a parser's state equal `attrs`.
///
/// Emits a full restate (`0` first) so no prior state leaks through.
fn emit_sgr(attrs: Attrs, out: &mut Vec<u8>) {
    out.extend_from_slice(vtenc::csi!("0").as_bytes());
    let mut push = |s: &str| {
        out.extend_from_slice(b";");
        out.extend_from_slice(s.as_bytes());
    };
    if attrs.flags.contains(CellFlags::BOLD) {
        push("1");
    }
    if attrs.flags.contains(CellFlags::FAINT) {
        push("2");
    }
    if attrs.flags.contains(CellFlags::ITALIC) {
        push("3");
    }
    if attrs.flags.contains(CellFlags::REVERSE) {
        push("7");
    }
    if attrs.flags.contains(CellFlags::CONCEAL) {
        push("8");
    }
    if attrs.flags.contains(CellFlags::STRIKETHROUGH) {
        push("9");
    }
    if attrs.underline != UnderlineStyle::None {
        push(&format!("4:{}", attrs.underline as u8));
    }
    match attrs.fg {
        Color::Default => {}
        Color::Indexed(n) => push(&format!("38;5;{n}")),
        Color::Rgb(r, g, b) => push(&format!("38;2;{r};{g};{b}")),
    }
    match attrs.bg {
        Color::Default => {}
        Color::Indexed(n) => push(&format!("48;5;{n}")),
        Color::Rgb(r, g, b) => push(&format!("48;2;{r};{g};{b}")),
    }
    match attrs.underline_color {
        Color::Default => {}
        Color::Indexed(n) => push(&format!("58:5:{n}")),
        Color::Rgb(r, g, b) => push(&format!("58:2:{r}:{g}:{b}")),
    }
    out.push(b'm');
}

fn emit_link_transition(
    prev: u32,
    next: u32,
    pool: Option<&HyperlinkPool>,
    out: &mut Vec<u8>,
) {
    if prev == next {
        return;
    }
    if next == 0 {
        out.extend_from_slice(vtenc::osc!("8;;").as_bytes());
        return;
    }
    let Some(link) = pool.and_then(|p| p.get(next)) else {
        return;
    };
    out.extend_from_slice(b"\x1b]8;");
    if let Some(id) = &link.id_param {
        let _ = write!(out, "id={id}");
    }
    out.push(b';');
    out.extend_from_slice(link.uri.as_bytes());
    out.extend_from_slice(b"\x1b\\");
}

fn push_cell_text(cell: &Cell, out: &mut Vec<u8>) {
    let mut buf = [0u8; 4];
    let ch = if cell.is_empty() { ' ' } else { cell.ch };
    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
    for combining in cell.combining_chars() {
        out.extend_from_slice(combining.encode_utf8(&mut buf).as_bytes());
    }
}

/// Serialize one full line as ANSI, starting and ending in the default
/// state. Used by the scrollback spill.
#[must_use]
pub fn line_to_ansi(line: &Line, pool: Option<&HyperlinkPool>) -> Vec<u8> {
    let mut out = Vec::new();
    let mut state = LineState::default();
    serialize_cells(line, 0, line.len(), true, pool, &mut state, &mut out);
    finish_state(&mut state, pool, &mut out);
    out
}

#[derive(Default)]
struct LineState {
    attrs: Option<Attrs>,
    link: u32,
}

fn finish_state(state: &mut LineState, pool: Option<&HyperlinkPool>, out: &mut Vec<u8>) {
    emit_link_transition(state.link, 0, pool, out);
    if state.attrs.is_some_and(|a| a != Attrs::default()) {
        out.extend_from_slice(vtenc::csi!("0m").as_bytes());
    }
    state.attrs = None;
    state.link = 0;
}

#[allow(clippy::too_many_arguments)]
fn serialize_cells(
    line: &Line,
    left: usize,
    right: usize,
    strip_trailing: bool,
    pool: Option<&HyperlinkPool>,
    state: &mut LineState,
    out: &mut Vec<u8>,
) {
    let end = if strip_trailing {
        line.content_width().clamp(left, right)
    } else {
        right.min(line.len())
    };
    for col in left..end {
        let Some(cell) = line.cell(col) else { break };
        if cell.is_wide_continuation() {
            continue;
        }
        let attrs = cell.attrs();
        if state.attrs != Some(attrs) {
            emit_sgr(attrs, out);
            state.attrs = Some(attrs);
        }
        emit_link_transition(state.link, cell.hyperlink, pool, out);
        state.link = cell.hyperlink;
        push_cell_text(cell, out);
    }
}

/// Copy a rectangular column range over a run of lines.
///
/// `lines` are in display order. Hard line breaks become `\n`;
/// soft-wrap boundaries are elided (joined) unless `wrap_markers`
/// requests the `\r` sentinel.
#[must_use]
pub fn copy_region(
    lines: &[&Line],
    left: usize,
    right: usize,
    opts: &CopyOptions,
    pool: Option<&HyperlinkPool>,
) -> Vec<u8> {
    let mut out = Vec::new();
    let mut state = LineState::default();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            let continued = line.continued;
            if continued {
                if opts.wrap_markers {
                    out.push(b'\r');
                }
            } else {
                out.push(b'\n');
            }
        }
        match opts.format {
            CopyFormat::Plain => {
                let end = if opts.strip_trailing_spaces {
                    line.content_width().clamp(left, right.min(line.len()))
                } else {
                    right.min(line.len())
                };
                for col in left..end {
                    let Some(cell) = line.cell(col) else { break };
                    if cell.is_wide_continuation() {
                        continue;
                    }
                    push_cell_text(cell, &mut out);
                }
            }
            CopyFormat::Ansi => {
                serialize_cells(
                    line,
                    left,
                    right,
                    opts.strip_trailing_spaces,
                    pool,
                    &mut state,
                    &mut out,
                );
            }
        }
    }
    if opts.format == CopyFormat::Ansi {
        finish_state(&mut state, pool, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Attrs, Cell};
    use pretty_assertions::assert_eq;

    fn line_of(text: &str, attrs: Attrs) -> Line {
        let mut line = Line::blank(10);
        for (i, ch) in text.chars().enumerate() {
            line.put(i, Cell::new(ch, attrs));
        }
        line
    }

    #[test]
    fn plain_copy_strips_trailing_blanks() {
        let line = line_of("hi", Attrs::default());
        let out = copy_region(&[&line], 0, 10, &CopyOptions::default(), None);
        assert_eq!(out, b"hi");
    }

    #[test]
    fn hard_break_is_newline_soft_break_elided() {
        let a = line_of("ab", Attrs::default());
        let mut b = line_of("cd", Attrs::default());
        b.continued = true;
        let c = line_of("ef", Attrs::default());
        let out = copy_region(&[&a, &b, &c], 0, 10, &CopyOptions::default(), None);
        assert_eq!(out, b"abcd\nef");
    }

    #[test]
    fn wrap_marker_sentinel() {
        let a = line_of("ab", Attrs::default());
        let mut b = line_of("cd", Attrs::default());
        b.continued = true;
        let opts = CopyOptions {
            wrap_markers: true,
            ..CopyOptions::default()
        };
        let out = copy_region(&[&a, &b], 0, 10, &opts, None);
        assert_eq!(out, b"ab\rcd");
    }

    #[test]
    fn ansi_copy_emits_sgr_and_reset() {
        let attrs = Attrs {
            fg: Color::Rgb(255, 0, 0),
            underline: UnderlineStyle::Curly,
            ..Attrs::default()
        };
        let line = line_of("x", attrs);
        let opts = CopyOptions {
            format: CopyFormat::Ansi,
            ..CopyOptions::default()
        };
        let out = copy_region(&[&line], 0, 10, &opts, None);
        let s = String::from_utf8(out).unwrap();
        assert!(s.contains("4:3"), "underline style missing: {s}");
        assert!(s.contains("38;2;255;0;0"), "fg missing: {s}");
        assert!(s.ends_with("\x1b[0m"), "missing trailing reset: {s}");
    }

    #[test]
    fn ansi_copy_emits_hyperlinks() {
        let mut pool = HyperlinkPool::new();
        let id = pool.intern(None, "https://example.com");
        let mut line = Line::blank(4);
        let mut cell = Cell::new('x', Attrs::default());
        cell.hyperlink = id;
        line.put(0, cell);
        let opts = CopyOptions {
            format: CopyFormat::Ansi,
            ..CopyOptions::default()
        };
        let out = copy_region(&[&line], 0, 4, &opts, Some(&pool));
        let s = String::from_utf8(out).unwrap();
        assert!(s.contains("\x1b]8;;https://example.com\x1b\\"), "{s}");
        assert!(s.ends_with("\x1b]8;;\x1b\\\x1b[0m") || s.contains("\x1b]8;;\x1b\\"), "{s}");
    }
}
