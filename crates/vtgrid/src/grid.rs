//! The finite cell grid and its mutation operations.

use tracing::trace;

use crate::cell::{Attrs, Cell, CellFlags};
use crate::cursor::Cursor;
use crate::line::{ErasePolicy, Line};
use crate::scrollback::Scrollback;

/// Grid-facing width of a printable, as classified by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharWidth {
    Narrow,
    Wide,
    /// Zero-width: attaches to the previous cell as a combining mark.
    Zero,
}

/// A rows × cols cell matrix with a cursor and a version counter.
///
/// Every mutation bumps the grid version and stamps the touched rows,
/// which is what lets the render layer skip unchanged regions.
#[derive(Debug, Clone)]
pub struct Grid {
    rows: usize,
    cols: usize,
    lines: Vec<Line>,
    line_versions: Vec<u64>,
    version: u64,
    pub cursor: Cursor,
}

impl Grid {
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        Self {
            rows,
            cols,
            lines: (0..rows).map(|_| Line::blank(cols)).collect(),
            line_versions: vec![0; rows],
            version: 0,
            cursor: Cursor::default(),
        }
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Monotonic mutation counter.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Version at which `row` last changed.
    #[must_use]
    pub fn line_version(&self, row: usize) -> u64 {
        self.line_versions.get(row).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn line(&self, row: usize) -> Option<&Line> {
        self.lines.get(row)
    }

    /// Mutable line access for callers that stamp damage themselves.
    pub fn line_mut(&mut self, row: usize) -> Option<&mut Line> {
        self.touch(row);
        self.lines.get_mut(row)
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    fn touch(&mut self, row: usize) {
        self.version += 1;
        if let Some(v) = self.line_versions.get_mut(row) {
            *v = self.version;
        }
    }

    fn touch_range(&mut self, rows: std::ops::Range<usize>) {
        self.version += 1;
        for row in rows {
            if let Some(v) = self.line_versions.get_mut(row) {
                *v = self.version;
            }
        }
    }

    // ------------------------------------------------------------------
    // Printing
    // ------------------------------------------------------------------

    /// Place a printable at the cursor, honoring pending-wrap, IRM,
    /// wide-cell handling, and combining attachment.
    ///
    /// `region` is the scroll region (top, bottom inclusive); a wrap on
    /// the bottom margin scrolls it, feeding `scrollback` when the
    /// region is flush with the top of a main screen.
    pub fn put_char(
        &mut self,
        ch: char,
        width: CharWidth,
        autowrap: bool,
        insert: bool,
        region: (usize, usize),
        mut scrollback: Option<&mut Scrollback>,
    ) {
        if width == CharWidth::Zero {
            self.attach_combining(ch);
            return;
        }

        if self.cursor.pending_wrap {
            // Only set while DECAWM is on; consume it by wrapping
            // before this printable lands.
            self.wrap_cursor(region, scrollback.as_deref_mut());
        }

        let cell_width = if width == CharWidth::Wide { 2 } else { 1 };

        if cell_width == 2 && self.cursor.col + 1 >= self.cols {
            // No room for both halves in this row.
            let attrs = self.cursor.attrs;
            let (row, col) = (self.cursor.row, self.cursor.col);
            self.touch(row);
            if let Some(line) = self.lines.get_mut(row) {
                line.put(col, Cell::erased(attrs));
            }
            if autowrap {
                self.wrap_cursor(region, scrollback.as_deref_mut());
            } else {
                // Nowhere to go; the character is dropped.
                trace!("wide printable discarded at right margin");
                return;
            }
        }

        if insert {
            let (row, col) = (self.cursor.row, self.cursor.col);
            let attrs = self.cursor.attrs;
            self.touch(row);
            if let Some(line) = self.lines.get_mut(row) {
                line.insert_blanks(col, cell_width, attrs);
            }
        }

        let attrs = self.cursor.attrs;
        let mut cell = Cell::new(ch, attrs);
        let (row, col) = (self.cursor.row, self.cursor.col);
        self.touch(row);
        if cell_width == 2 {
            cell.flags |= CellFlags::WIDE;
        }
        if let Some(line) = self.lines.get_mut(row) {
            line.put(col, cell);
            if cell_width == 2 {
                let mut cont = Cell::erased(attrs);
                cont.flags |= CellFlags::WIDE_CONT;
                line.put(col + 1, cont);
            }
        }

        let next = col + cell_width;
        if next >= self.cols {
            self.cursor.col = self.cols - 1;
            self.cursor.pending_wrap = autowrap;
        } else {
            self.cursor.col = next;
        }
    }

    /// Wrap to the start of the next row, scrolling at the bottom
    /// margin. The target row is marked as a soft continuation.
    fn wrap_cursor(&mut self, region: (usize, usize), scrollback: Option<&mut Scrollback>) {
        let (_, bottom) = region;
        if self.cursor.row == bottom {
            self.scroll_up(region, 1, scrollback);
        } else if self.cursor.row + 1 < self.rows {
            self.cursor.row += 1;
        }
        let row = self.cursor.row;
        self.touch(row);
        if let Some(line) = self.lines.get_mut(row) {
            line.continued = true;
        }
        self.cursor.col = 0;
        self.cursor.pending_wrap = false;
    }

    /// Attach a combining scalar to the cell logically before the
    /// cursor; with a wrap pending this is the last cell written.
    fn attach_combining(&mut self, ch: char) {
        let Some((row, col)) = self.combining_target() else {
            return;
        };
        self.touch(row);
        let Some(line) = self.lines.get_mut(row) else {
            return;
        };
        let mut col = col;
        if line.cell(col).is_some_and(Cell::is_wide_continuation) && col > 0 {
            col -= 1;
        }
        if let Some(cell) = line.cell_mut(col) {
            if !cell.is_empty() {
                cell.push_combining(ch);
            }
        }
    }

    fn combining_target(&self) -> Option<(usize, usize)> {
        if self.cursor.pending_wrap {
            return Some((self.cursor.row, self.cols - 1));
        }
        if self.cursor.col == 0 {
            // Start of a continued line: the mark belongs to the last
            // cell of the previous row. With nothing before the
            // cursor, the mark has no base and is dropped.
            if self.cursor.row > 0
                && self
                    .lines
                    .get(self.cursor.row)
                    .is_some_and(|l| l.continued)
            {
                return Some((self.cursor.row - 1, self.cols - 1));
            }
            return None;
        }
        Some((self.cursor.row, self.cursor.col - 1))
    }

    /// Force the width of the most recently written cell, for the
    /// emoji presentation selectors (VS15 narrows, VS16 widens).
    pub fn set_last_cell_width(&mut self, wide: bool) {
        let Some((row, mut col)) = self.combining_target() else {
            return;
        };
        self.touch(row);
        let cols = self.cols;
        let Some(line) = self.lines.get_mut(row) else {
            return;
        };
        if line.cell(col).is_some_and(Cell::is_wide_continuation) && col > 0 {
            col -= 1;
        }
        let (is_empty, is_wide) = match line.cell(col) {
            Some(cell) => (cell.is_empty(), cell.is_wide()),
            None => return,
        };
        if is_empty {
            return;
        }
        if wide && !is_wide && col + 1 < cols {
            line.dissolve_wide_at(col + 1);
            let attrs = line.cell(col).map(Cell::attrs).unwrap_or_default();
            if let Some(c) = line.cell_mut(col) {
                c.flags |= CellFlags::WIDE;
            }
            let mut cont = Cell::erased(attrs);
            cont.flags |= CellFlags::WIDE_CONT;
            if let Some(slot) = line.cell_mut(col + 1) {
                *slot = cont;
            }
            if self.cursor.col == col + 1 && self.cursor.col + 1 < cols {
                self.cursor.col += 1;
            }
        } else if !wide && is_wide {
            if let Some(c) = line.cell_mut(col) {
                c.flags -= CellFlags::WIDE;
            }
            if let Some(right) = line.cell_mut(col + 1) {
                if right.is_wide_continuation() {
                    *right = Cell::BLANK;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Erasing
    // ------------------------------------------------------------------

    /// Erase a cell range within one row.
    pub fn erase_in_row(
        &mut self,
        row: usize,
        range: std::ops::Range<usize>,
        policy: ErasePolicy,
    ) {
        let attrs = self.cursor.attrs;
        self.touch(row);
        if let Some(line) = self.lines.get_mut(row) {
            line.erase(range, policy, attrs);
        }
    }

    /// Erase whole rows.
    pub fn erase_rows(&mut self, rows: std::ops::Range<usize>, policy: ErasePolicy) {
        let attrs = self.cursor.attrs;
        let cols = self.cols;
        self.touch_range(rows.clone());
        for row in rows {
            if let Some(line) = self.lines.get_mut(row) {
                line.erase(0..cols, policy, attrs);
            }
        }
    }

    /// DECALN: fill the whole grid with `E` and home the cursor.
    pub fn fill_alignment_pattern(&mut self) {
        self.touch_range(0..self.rows);
        let cell = Cell::new('E', Attrs::default());
        for line in &mut self.lines {
            *line = Line::filled(self.cols, cell);
        }
        self.cursor = Cursor::default();
    }

    // ------------------------------------------------------------------
    // Scrolling
    // ------------------------------------------------------------------

    /// Scroll the region up by `n`. Lines leaving a top-flush region
    /// migrate into `scrollback` when one is supplied.
    pub fn scroll_up(
        &mut self,
        region: (usize, usize),
        n: usize,
        mut scrollback: Option<&mut Scrollback>,
    ) {
        let (top, bottom) = self.clamp_region(region);
        let span = bottom - top + 1;
        let n = n.min(span);
        if n == 0 {
            return;
        }
        let preserved = top == 0 && scrollback.is_some();
        self.touch_range(top..bottom + 1);
        for _ in 0..n {
            let line = std::mem::replace(&mut self.lines[top], Line::blank(self.cols));
            if preserved {
                if let Some(sb) = scrollback.as_deref_mut() {
                    sb.push(line);
                }
            }
            self.lines[top..=bottom].rotate_left(1);
        }
        // When the evicted lines are gone for good, a soft wrap split
        // at the boundary has lost its predecessor and the new top
        // line becomes hard. Lines that moved into history keep their
        // continuity for reflow.
        if !preserved {
            if let Some(line) = self.lines.get_mut(top) {
                line.continued = false;
            }
        }
    }

    /// Scroll the region down by `n`, losing lines off the bottom.
    pub fn scroll_down(&mut self, region: (usize, usize), n: usize) {
        let (top, bottom) = self.clamp_region(region);
        let span = bottom - top + 1;
        let n = n.min(span);
        if n == 0 {
            return;
        }
        self.touch_range(top..bottom + 1);
        for _ in 0..n {
            self.lines[top..=bottom].rotate_right(1);
            self.lines[top] = Line::blank(self.cols);
        }
        if let Some(line) = self.lines.get_mut(top) {
            line.continued = false;
        }
    }

    /// Insert `n` blank lines at `row` (IL), pushing lines toward the
    /// region bottom.
    pub fn insert_lines(&mut self, row: usize, n: usize, region_bottom: usize) {
        if row > region_bottom || row >= self.rows {
            return;
        }
        self.scroll_down((row, region_bottom.min(self.rows - 1)), n);
    }

    /// Delete `n` lines at `row` (DL), pulling lines up from the
    /// region bottom.
    pub fn delete_lines(&mut self, row: usize, n: usize, region_bottom: usize) {
        if row > region_bottom || row >= self.rows {
            return;
        }
        self.scroll_up((row, region_bottom.min(self.rows - 1)), n, None);
    }

    fn clamp_region(&self, region: (usize, usize)) -> (usize, usize) {
        let top = region.0.min(self.rows - 1);
        let bottom = region.1.min(self.rows - 1).max(top);
        (top, bottom)
    }

    // ------------------------------------------------------------------
    // Resize
    // ------------------------------------------------------------------

    /// Resize the grid, reflowing soft-wrapped lines when the column
    /// count changes. The cursor keeps its logical position within the
    /// text. Scrollback, when supplied, takes overflow and contributes
    /// history to the reflow.
    pub fn resize(
        &mut self,
        new_rows: usize,
        new_cols: usize,
        mut scrollback: Option<&mut Scrollback>,
    ) {
        let new_rows = new_rows.max(1);
        let new_cols = new_cols.max(1);
        if new_rows == self.rows && new_cols == self.cols {
            return;
        }

        if new_cols == self.cols {
            self.resize_rows_only(new_rows, scrollback);
            return;
        }

        // Gather history + screen into logical lines, remembering the
        // cursor as (logical line, cell offset within it).
        let history: Vec<Line> = scrollback
            .as_deref_mut()
            .map(Scrollback::drain_lines)
            .unwrap_or_default();
        let history_rows = history.len();

        let cursor_flat = (history_rows + self.cursor.row, self.cursor.col);
        let mut logical: Vec<Vec<Cell>> = Vec::new();
        let mut cursor_logical: Option<(usize, usize)> = None;

        for (flat_row, line) in history.iter().chain(self.lines.iter()).enumerate() {
            let start_new = !line.continued || logical.is_empty();
            if start_new {
                logical.push(Vec::new());
            }
            let logical_idx = logical.len() - 1;
            let current = logical.last_mut().expect("pushed above");
            if flat_row == cursor_flat.0 {
                cursor_logical = Some((logical_idx, current.len() + cursor_flat.1));
            }
            let width = line.content_width();
            current.extend_from_slice(&line.cells()[..width]);
        }
        let cursor_logical = cursor_logical.unwrap_or((logical.len().saturating_sub(1), 0));

        // Re-wrap every logical line to the new width.
        let mut wrapped: Vec<Line> = Vec::new();
        let mut cursor_wrapped: (usize, usize) = (0, 0);
        for (idx, cells) in logical.iter().enumerate() {
            let first_row = wrapped.len();
            let mut chunks = cells.chunks(new_cols).peekable();
            if chunks.peek().is_none() {
                wrapped.push(Line::blank(new_cols));
            }
            let mut continued = false;
            for chunk in chunks {
                let mut line = Line::blank(new_cols);
                for (i, cell) in chunk.iter().enumerate() {
                    if let Some(slot) = line.cell_mut(i) {
                        *slot = *cell;
                    }
                }
                line.continued = continued;
                continued = true;
                wrapped.push(line);
            }
            if idx == cursor_logical.0 {
                let offset = cursor_logical.1;
                cursor_wrapped = (
                    first_row + offset / new_cols,
                    (offset % new_cols).min(new_cols - 1),
                );
            }
        }
        if wrapped.is_empty() {
            wrapped.push(Line::blank(new_cols));
        }

        // Trailing blank rows below the cursor would push real content
        // into history when distributing; drop them first.
        while wrapped.len() > cursor_wrapped.0 + 1
            && wrapped
                .last()
                .is_some_and(|l| l.content_width() == 0 && !l.continued)
        {
            wrapped.pop();
        }

        // Distribute: the last `new_rows` stay visible; earlier rows
        // return to the scrollback. Keep the cursor on screen.
        let visible_start = wrapped
            .len()
            .saturating_sub(new_rows)
            .min(cursor_wrapped.0);
        let overflow: Vec<Line> = wrapped.drain(..visible_start).collect();
        if let Some(sb) = scrollback.as_deref_mut() {
            for line in overflow {
                sb.push(line);
            }
        }
        wrapped.truncate(new_rows);
        while wrapped.len() < new_rows {
            wrapped.push(Line::blank(new_cols));
        }

        self.rows = new_rows;
        self.cols = new_cols;
        self.lines = wrapped;
        self.line_versions = vec![0; new_rows];
        self.version += 1;
        self.touch_range(0..new_rows);

        self.cursor.row = cursor_wrapped.0.saturating_sub(visible_start).min(new_rows - 1);
        self.cursor.col = cursor_wrapped.1.min(new_cols - 1);
        self.cursor.pending_wrap = false;
    }

    fn resize_rows_only(&mut self, new_rows: usize, mut scrollback: Option<&mut Scrollback>) {
        if new_rows < self.rows {
            // Shrink: move top lines to history so the cursor stays
            // visible; alt screens simply truncate the bottom.
            let excess = self.rows - new_rows;
            if let Some(sb) = scrollback.as_deref_mut() {
                for line in self.lines.drain(..excess) {
                    sb.push(line);
                }
                self.cursor.row = self.cursor.row.saturating_sub(excess);
            } else {
                self.lines.truncate(new_rows);
                self.cursor.row = self.cursor.row.min(new_rows - 1);
            }
        } else {
            // Grow: pull history back first, then pad with blanks.
            let mut needed = new_rows - self.rows;
            if let Some(sb) = scrollback.as_deref_mut() {
                while needed > 0 {
                    let Some(line) = sb.pop_newest() else { break };
                    self.lines.insert(0, line);
                    self.cursor.row += 1;
                    needed -= 1;
                }
            }
            for _ in 0..needed {
                self.lines.push(Line::blank(self.cols));
            }
        }
        self.rows = new_rows;
        self.line_versions = vec![0; new_rows];
        self.version += 1;
        self.touch_range(0..new_rows);
        self.cursor.row = self.cursor.row.min(new_rows - 1);
        self.cursor.pending_wrap = false;
    }
}
