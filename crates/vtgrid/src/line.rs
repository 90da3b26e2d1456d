//! A single grid row.

use crate::cell::{Attrs, Cell};

/// What an erase clears besides cell content.
///
/// Continuation bits record soft wraps; clearing them from lines that
/// only lost content breaks reflow, so erases must say which they mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErasePolicy {
    /// Clear cell content only; the line's continuation bit survives.
    ContentOnly,
    /// Clear content and mark the line as a hard (non-continued) line.
    ContentAndContinuation,
}

/// A fixed-width row of cells plus the soft-wrap marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    cells: Vec<Cell>,
    /// Set when this line is a soft-wrap continuation of its
    /// predecessor. Survives erases under `ContentOnly`; cleared by a
    /// hard line feed.
    pub continued: bool,
}

impl Line {
    #[must_use]
    pub fn blank(cols: usize) -> Self {
        Self {
            cells: vec![Cell::BLANK; cols],
            continued: false,
        }
    }

    #[must_use]
    pub fn filled(cols: usize, cell: Cell) -> Self {
        Self {
            cells: vec![cell; cols],
            continued: false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[must_use]
    pub fn cell(&self, col: usize) -> Option<&Cell> {
        self.cells.get(col)
    }

    pub fn cell_mut(&mut self, col: usize) -> Option<&mut Cell> {
        self.cells.get_mut(col)
    }

    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Write a cell, dissolving any wide character it overlaps.
    ///
    /// Writing into either half of a wide cell replaces the whole pair:
    /// the orphaned half reverts to a blank with the old attributes.
    pub fn put(&mut self, col: usize, cell: Cell) {
        self.dissolve_wide_at(col);
        if let Some(slot) = self.cells.get_mut(col) {
            *slot = cell;
        }
    }

    /// Break up the wide pair covering `col`, if any.
    pub fn dissolve_wide_at(&mut self, col: usize) {
        let Some(target) = self.cells.get(col) else {
            return;
        };
        if target.is_wide() {
            if let Some(right) = self.cells.get_mut(col + 1) {
                if right.is_wide_continuation() {
                    let attrs = right.attrs();
                    *right = Cell::erased(attrs);
                }
            }
        } else if target.is_wide_continuation() && col > 0 {
            if let Some(left) = self.cells.get_mut(col - 1) {
                if left.is_wide() {
                    let attrs = left.attrs();
                    *left = Cell::erased(attrs);
                }
            }
        }
    }

    /// Erase a column range with the given policy and erasing attrs.
    pub fn erase(&mut self, range: std::ops::Range<usize>, policy: ErasePolicy, attrs: Attrs) {
        let end = range.end.min(self.cells.len());
        let start = range.start.min(end);
        // Wide pairs straddling the range boundary dissolve.
        self.dissolve_wide_at(start);
        if end > 0 {
            self.dissolve_wide_at(end - 1);
        }
        for cell in &mut self.cells[start..end] {
            *cell = Cell::erased(attrs);
        }
        if policy == ErasePolicy::ContentAndContinuation {
            self.continued = false;
        }
    }

    /// Insert `n` blank cells at `col`, shifting the tail right (ICH).
    pub fn insert_blanks(&mut self, col: usize, n: usize, attrs: Attrs) {
        if col >= self.cells.len() {
            return;
        }
        self.dissolve_wide_at(col);
        let n = n.min(self.cells.len() - col);
        self.cells[col..].rotate_right(n);
        for cell in &mut self.cells[col..col + n] {
            *cell = Cell::erased(attrs);
        }
        self.fix_trailing_wide();
    }

    /// Delete `n` cells at `col`, shifting the tail left (DCH).
    pub fn delete_cells(&mut self, col: usize, n: usize, attrs: Attrs) {
        if col >= self.cells.len() {
            return;
        }
        self.dissolve_wide_at(col);
        let n = n.min(self.cells.len() - col);
        self.cells[col..].rotate_left(n);
        let tail = self.cells.len() - n;
        for cell in &mut self.cells[tail..] {
            *cell = Cell::erased(attrs);
        }
        self.fix_trailing_wide();
    }

    /// A wide cell shifted into the last column loses its right half.
    fn fix_trailing_wide(&mut self) {
        if let Some(last) = self.cells.last_mut() {
            if last.is_wide() {
                let attrs = last.attrs();
                *last = Cell::erased(attrs);
            }
        }
        if let Some(first) = self.cells.first_mut() {
            if first.is_wide_continuation() {
                let attrs = first.attrs();
                *first = Cell::erased(attrs);
            }
        }
    }

    /// Column just past the last non-empty cell.
    #[must_use]
    pub fn content_width(&self) -> usize {
        self.cells
            .iter()
            .rposition(|c| !c.is_empty())
            .map_or(0, |i| i + 1)
    }

    /// True when any cell carries a hyperlink id.
    #[must_use]
    pub fn has_hyperlinks(&self) -> bool {
        self.cells.iter().any(|c| c.hyperlink != 0)
    }

    /// Resize in place, padding with blanks or truncating.
    pub fn resize_width(&mut self, cols: usize) {
        self.cells.resize(cols, Cell::BLANK);
        self.fix_trailing_wide();
    }
}
