//! The screen data model: cells, lines, grids, scrollback, selection.
//!
//! Everything here is plain data plus mutation operations with the
//! wrapping/scrolling/attribute invariants terminals depend on. No
//! escape-code knowledge lives in this crate; the state machine drives
//! it through typed operations.

#![warn(clippy::pedantic)]

pub mod cell;
pub mod cursor;
pub mod grid;
pub mod hyperlink;
pub mod line;
pub mod scrollback;
pub mod selection;
pub mod serialize;

pub use cell::{Attrs, Cell, CellFlags, Color, UnderlineStyle};
pub use cursor::{Cursor, SavedCursor};
pub use grid::{CharWidth, Grid};
pub use hyperlink::HyperlinkPool;
pub use line::{ErasePolicy, Line};
pub use scrollback::{Scrollback, SpillConfig};
pub use selection::{Selection, SelectionKind, SelectionPos};
pub use serialize::{CopyFormat, CopyOptions};
