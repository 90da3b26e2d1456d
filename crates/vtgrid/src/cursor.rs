//! Cursor position and the DECSC/DECRC saved state.

use crate::cell::Attrs;

/// Cursor state owned by each grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cursor {
    /// Zero-based row within the grid.
    pub row: usize,
    /// Zero-based column within the grid.
    pub col: usize,
    /// The DEC last-column rule: set when a printable lands in the
    /// rightmost column with auto-wrap on, consumed by the next
    /// printable, cleared by any explicit motion.
    pub pending_wrap: bool,
    /// Attributes applied to printables.
    pub attrs: Attrs,
}

impl Cursor {
    /// Move to an absolute position, clearing pending-wrap.
    pub fn move_to(&mut self, row: usize, col: usize) {
        self.row = row;
        self.col = col;
        self.pending_wrap = false;
    }
}

/// State captured by DECSC. One slot per screen; DECRC with no armed
/// slot restores nothing.
#[derive(Debug, Clone, Copy)]
pub struct SavedCursor {
    pub row: usize,
    pub col: usize,
    pub attrs: Attrs,
    /// DECOM at save time; restored with the position.
    pub origin_mode: bool,
    pub pending_wrap: bool,
}
