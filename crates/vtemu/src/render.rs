//! The render descriptor: a read-only frame snapshot for a drawing
//! backend.
//!
//! The descriptor resolves everything a GPU layer should not have to
//! know: reverse video, concealment, underline-color fallback,
//! selection geometry in viewport coordinates, placeholder cells
//! turned into image references, and z-ordered placements. Version
//! counters let the backend skip rows that have not changed.

use vtgfx::placeholder::{self, PlaceholderCell};
use vtgrid::cell::{Cell, CellFlags, Color, UnderlineStyle};
use vtscreen::Screen;

/// One resolved cell, ready to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderCell {
    pub ch: char,
    pub combining: [char; 3],
    pub fg: Color,
    pub bg: Color,
    pub underline: UnderlineStyle,
    pub underline_color: Color,
    pub bold: bool,
    pub faint: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub hyperlink: u32,
    /// Left half of a wide pair; the next cell is its continuation.
    pub wide: bool,
}

/// Cursor state for the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorState {
    pub row: usize,
    pub col: usize,
    pub visible: bool,
}

/// A visible placement with its derived screen position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisiblePlacement {
    pub image_id: u32,
    pub placement_id: u32,
    pub row: i64,
    pub col: i64,
    pub columns: u32,
    pub rows: u32,
    pub src: Option<(u32, u32, u32, u32)>,
    pub cell_offset: (u32, u32),
    pub z_index: i32,
}

/// A cell showing one unit cell of a virtual placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderRef {
    pub row: usize,
    pub col: usize,
    pub image_id: u32,
    pub src_row: u32,
    pub src_col: u32,
}

/// The per-frame snapshot.
#[derive(Debug, Clone)]
pub struct RenderDescriptor {
    pub rows: usize,
    pub cols: usize,
    /// Row-major resolved cells, `rows * cols` entries.
    pub cells: Vec<RenderCell>,
    pub cursor: CursorState,
    /// Selected column spans per row, viewport coordinates.
    pub selection: Vec<(usize, usize, usize)>,
    /// Direct and relative placements, back-to-front.
    pub placements: Vec<VisiblePlacement>,
    /// Virtual-placement cells resolved from Unicode placeholders.
    pub placeholders: Vec<PlaceholderRef>,
    /// A bell rang since the window last had focus.
    pub bell_pending: bool,
    /// Grid version at snapshot time.
    pub frame: u64,
    /// Per-row versions for cheap redraw decisions.
    pub row_versions: Vec<u64>,
}

impl RenderDescriptor {
    /// Build a snapshot from the screen. The caller holds whatever
    /// lock guards the screen, so the snapshot is consistent with a
    /// prefix of processed bytes.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn build(screen: &Screen) -> Self {
        let grid = screen.grid();
        let (rows, cols) = (grid.rows(), grid.cols());
        let reverse_all = screen.modes().reverse_video;

        let mut cells = Vec::with_capacity(rows * cols);
        let mut placeholder_rows: Vec<PlaceholderRef> = Vec::new();

        for row in 0..rows {
            let line = grid.line(row).expect("row in range");
            let mut raw_placeholders: Vec<Option<PlaceholderCell>> = Vec::with_capacity(cols);
            for col in 0..cols {
                let cell = line.cell(col).copied().unwrap_or(Cell::BLANK);
                cells.push(resolve_cell(&cell, reverse_all));
                raw_placeholders.push(extract_placeholder(&cell));
            }
            for (col, resolved) in placeholder::resolve_row(&raw_placeholders)
                .into_iter()
                .enumerate()
            {
                if let Some(reference) = resolved {
                    placeholder_rows.push(PlaceholderRef {
                        row,
                        col,
                        image_id: reference.image_id,
                        src_row: reference.row,
                        src_col: reference.col,
                    });
                }
            }
        }

        let cursor = CursorState {
            row: grid.cursor.row,
            col: grid.cursor.col,
            visible: screen.modes().cursor_visible,
        };

        let selection = selection_spans(screen);
        let placements = visible_placements(screen);

        let row_versions = (0..rows).map(|r| grid.line_version(r)).collect();

        Self {
            rows,
            cols,
            cells,
            cursor,
            selection,
            placements,
            placeholders: placeholder_rows,
            bell_pending: screen.bell_since_focus(),
            frame: grid.version(),
            row_versions,
        }
    }

    #[must_use]
    pub fn cell(&self, row: usize, col: usize) -> Option<&RenderCell> {
        self.cells.get(row * self.cols + col)
    }
}

fn resolve_cell(cell: &Cell, reverse_all: bool) -> RenderCell {
    let mut fg = cell.fg;
    let mut bg = cell.bg;
    let reversed = cell.flags.contains(CellFlags::REVERSE) ^ reverse_all;
    if reversed {
        std::mem::swap(&mut fg, &mut bg);
    }
    // Under reverse video an explicit underline color is preserved;
    // otherwise the underline follows the (possibly swapped)
    // foreground.
    let underline_color = if cell.underline_color == Color::Default {
        fg
    } else {
        cell.underline_color
    };
    let concealed = cell.flags.contains(CellFlags::CONCEAL);
    RenderCell {
        ch: if concealed || cell.is_empty() { ' ' } else { cell.ch },
        combining: if concealed { ['\0'; 3] } else { cell.combining },
        fg,
        bg,
        underline: cell.underline,
        underline_color,
        bold: cell.flags.contains(CellFlags::BOLD),
        faint: cell.flags.contains(CellFlags::FAINT),
        italic: cell.flags.contains(CellFlags::ITALIC),
        strikethrough: cell.flags.contains(CellFlags::STRIKETHROUGH),
        hyperlink: cell.hyperlink,
        wide: cell.is_wide(),
    }
}

/// A placeholder cell carries the image id in its foreground color.
fn extract_placeholder(cell: &Cell) -> Option<PlaceholderCell> {
    if cell.ch != placeholder::PLACEHOLDER {
        return None;
    }
    let id_low = match cell.fg {
        Color::Rgb(r, g, b) => (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b),
        Color::Indexed(n) => u32::from(n),
        Color::Default => 0,
    };
    let mut row = None;
    let mut col = None;
    let mut high = None;
    for (i, combining) in cell.combining_chars().enumerate() {
        let Some(value) = placeholder::diacritic_value(combining) else {
            continue;
        };
        match i {
            0 => row = Some(value),
            1 => col = Some(value),
            2 => high = Some(value),
            _ => {}
        }
    }
    let color_key = color_key(cell.fg) << 32 | color_key(cell.underline_color);
    Some(PlaceholderCell {
        id_low,
        row,
        col,
        id_high: high,
        color_key,
    })
}

fn color_key(color: Color) -> u64 {
    match color {
        Color::Default => 0,
        Color::Indexed(n) => 0x0100_0000 | u64::from(n),
        Color::Rgb(r, g, b) => {
            0x0200_0000 | (u64::from(r) << 16) | (u64::from(g) << 8) | u64::from(b)
        }
    }
}

fn selection_spans(screen: &Screen) -> Vec<(usize, usize, usize)> {
    let Some(selection) = screen.selection() else {
        return Vec::new();
    };
    let mut spans = Vec::new();
    for row in 0..screen.rows() {
        let mut start: Option<usize> = None;
        for col in 0..screen.cols() {
            let inside = selection.contains(
                isize::try_from(row).unwrap_or(isize::MAX),
                col,
            );
            match (inside, start) {
                (true, None) => start = Some(col),
                (false, Some(s)) => {
                    spans.push((row, s, col));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            spans.push((row, s, screen.cols()));
        }
    }
    spans
}

/// Direct placements plus relative ones with derived positions,
/// sorted back to front. A placement whose parent chain ends in a
/// virtual placement is anchored by placeholder cells instead and is
/// skipped here.
fn visible_placements(screen: &Screen) -> Vec<VisiblePlacement> {
    let store = &screen.graphics().store;
    let mut out = Vec::new();
    for image in store.iter() {
        let Some(data) = &image.data else { continue };
        for placement in image.placements.values() {
            if placement.is_virtual {
                continue;
            }
            let Some((row, col)) = resolve_position(screen, image.id, placement.id, 0) else {
                continue;
            };
            let (columns, rows) =
                placement.extent_cells((data.width, data.height), screen.cell_pixel_size());
            // Fully off-screen placements are clipped out here; the
            // backend clips partial overlaps.
            if row >= screen.rows() as i64 || col >= screen.cols() as i64 {
                continue;
            }
            if row + i64::from(rows) <= 0 || col + i64::from(columns) <= 0 {
                continue;
            }
            out.push(VisiblePlacement {
                image_id: image.id,
                placement_id: placement.id,
                row,
                col,
                columns,
                rows,
                src: placement.src,
                cell_offset: placement.cell_offset,
                z_index: placement.z_index,
            });
        }
    }
    out.sort_by_key(|p| (p.z_index, p.image_id, p.placement_id));
    out
}

/// Walk the parent chain to an absolute cell position. Depth is
/// bounded by the store's insertion checks; the fuel is defensive
/// against concurrent mutation races.
fn resolve_position(
    screen: &Screen,
    image_id: u32,
    placement_id: u32,
    fuel: u8,
) -> Option<(i64, i64)> {
    if fuel > 9 {
        return None;
    }
    let store = &screen.graphics().store;
    let placement = store.get(image_id)?.placements.get(&placement_id)?;
    if placement.is_virtual {
        // Children anchored to a virtual placement are located by
        // placeholder cells, not by this walk.
        return None;
    }
    match placement.parent {
        None => Some((placement.row as i64, placement.col as i64)),
        Some(parent) => {
            let (row, col) =
                resolve_position(screen, parent.image_id, parent.placement_id, fuel + 1)?;
            Some((
                row + i64::from(placement.rel_offset.1),
                col + i64::from(placement.rel_offset.0),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vtparse::Parser;
    use vtparse::token::TokenSink as _;
    use vtscreen::ScreenConfig;

    fn term(rows: usize, cols: usize) -> (Screen, Parser) {
        (
            Screen::new(rows, cols, ScreenConfig::default()),
            Parser::new(),
        )
    }

    #[test]
    fn resolved_reverse_video() {
        let (mut screen, mut parser) = term(2, 10);
        parser.feed(b"\x1b[7;31mx", &mut screen);
        let frame = RenderDescriptor::build(&screen);
        let cell = frame.cell(0, 0).unwrap();
        assert_eq!(cell.bg, Color::Indexed(1), "reverse swaps fg into bg");
        assert_eq!(cell.underline_color, cell.fg);
    }

    #[test]
    fn conceal_blanks_content() {
        let (mut screen, mut parser) = term(2, 10);
        parser.feed(b"\x1b[8msecret", &mut screen);
        let frame = RenderDescriptor::build(&screen);
        assert_eq!(frame.cell(0, 0).unwrap().ch, ' ');
    }

    #[test]
    fn version_counters_mark_dirty_rows() {
        let (mut screen, mut parser) = term(3, 10);
        let before = RenderDescriptor::build(&screen);
        parser.feed(b"\x1b[2;1Hx", &mut screen);
        let after = RenderDescriptor::build(&screen);
        assert!(after.frame > before.frame);
        assert_eq!(after.row_versions[0], before.row_versions[0]);
        assert!(after.row_versions[1] > before.row_versions[1]);
    }

    #[test]
    fn selection_in_viewport_spans() {
        use vtgrid::selection::{SelectionKind, SelectionPos};
        let (mut screen, mut parser) = term(3, 10);
        parser.feed(b"abcdef", &mut screen);
        screen.select_in_range(
            SelectionPos { row: 0, col: 1 },
            SelectionPos { row: 0, col: 3 },
            SelectionKind::Stream,
        );
        let frame = RenderDescriptor::build(&screen);
        assert_eq!(frame.selection, vec![(0, 1, 4)]);
    }

    #[test]
    fn placements_sorted_by_z() {
        let (mut screen, mut parser) = term(10, 40);
        let png = b"AAECAwQFBgcICQoLDA0ODw==";
        for (id, z) in [(1u32, 5i32), (2, -3)] {
            let cmd = format!("\x1b_Ga=T,f=32,s=2,v=2,i={id},z={z};");
            parser.feed(cmd.as_bytes(), &mut screen);
            parser.feed(png, &mut screen);
            parser.feed(b"\x1b\\", &mut screen);
        }
        let frame = RenderDescriptor::build(&screen);
        assert_eq!(frame.placements.len(), 2);
        assert!(frame.placements[0].z_index < frame.placements[1].z_index);
    }

    #[test]
    fn placeholder_cells_resolve() {
        let (mut screen, mut parser) = term(2, 10);
        // Image id 5 in the foreground color, row and column
        // diacritics for cell (0, 0), written like any other text.
        let diacritic = vtgfx::placeholder::diacritic_index(0).unwrap();
        let mut bytes = b"\x1b[38;2;0;0;5m".to_vec();
        let mut buf = [0u8; 4];
        bytes.extend_from_slice(
            vtgfx::placeholder::PLACEHOLDER.encode_utf8(&mut buf).as_bytes(),
        );
        bytes.extend_from_slice(diacritic.encode_utf8(&mut buf).as_bytes());
        bytes.extend_from_slice(diacritic.encode_utf8(&mut buf).as_bytes());
        parser.feed(&bytes, &mut screen);
        let frame = RenderDescriptor::build(&screen);
        assert_eq!(
            frame.placeholders,
            vec![PlaceholderRef {
                row: 0,
                col: 0,
                image_id: 5,
                src_row: 0,
                src_col: 0
            }]
        );
    }

    #[test]
    fn bell_flag_propagates() {
        let (mut screen, _parser) = term(2, 10);
        screen.set_focus(false);
        screen.execute(0x07);
        let frame = RenderDescriptor::build(&screen);
        assert!(frame.bell_pending);
    }
}
