//! The terminal state machine.
//!
//! [`Screen`] consumes parser tokens and turns them into grid
//! mutations, mode changes, protocol traffic, and outgoing events.
//! One instance owns both the main and alternate grids plus every
//! per-terminal store (hyperlinks, images), so multiple terminals in
//! one process stay independent.

use tracing::debug;

use vtgfx::{GraphicsContext, GraphicsDispatcher, ImageStore, StoreConfig};
use vtgrid::cursor::SavedCursor;
use vtgrid::grid::{CharWidth, Grid};
use vtgrid::hyperlink::HyperlinkPool;
use vtgrid::line::ErasePolicy;
use vtgrid::scrollback::{Scrollback, SpillConfig};
use vtgrid::selection::{Selection, SelectionKind, SelectionPos};
use vtgrid::serialize::{self, CopyOptions};
use vtparse::decode::{self, CharClass, SOFT_HYPHEN, VS15, VS16};
use vtparse::params::Params;
use vtparse::token::{StringKind, TokenSink};

use crate::charset::{Charset, Charsets};
use crate::clipboard::{ClipboardConfig, ClipboardState};
use crate::events::TermEvent;
use crate::kbd::KeyboardStack;
use crate::modes::Modes;
use crate::notify::NotificationDispatcher;
use crate::tabstops::TabStops;

/// Construction-time knobs.
#[derive(Debug, Clone)]
pub struct ScreenConfig {
    pub scrollback_lines: usize,
    pub scrollback_spill: Option<SpillConfig>,
    /// Cell size in pixels, reported by XTWINOPS and used to size
    /// image placements.
    pub cell_width: u32,
    pub cell_height: u32,
    pub clipboard: ClipboardConfig,
    pub graphics: StoreConfig,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            scrollback_lines: 10_000,
            scrollback_spill: None,
            cell_width: 10,
            cell_height: 20,
            clipboard: ClipboardConfig::default(),
            graphics: StoreConfig::default(),
        }
    }
}

/// Emulator identity used in DA2/XTVERSION replies.
pub const TERM_NAME: &str = "vtemu";
pub const TERM_VERSION: (u32, u32, u32) = (0, 1, 0);

pub struct Screen {
    pub(crate) main: Grid,
    pub(crate) alt: Grid,
    pub(crate) alt_active: bool,
    pub(crate) scrollback: Scrollback,
    pub(crate) hyperlinks: HyperlinkPool,
    pub(crate) graphics: GraphicsDispatcher,
    pub(crate) modes: Modes,
    pub(crate) tabs: TabStops,
    pub(crate) kbd_main: KeyboardStack,
    pub(crate) kbd_alt: KeyboardStack,
    pub(crate) charsets: Charsets,
    pub(crate) saved_main: Option<SavedCursor>,
    pub(crate) saved_alt: Option<SavedCursor>,
    /// DECSTBM margins; `None` means the whole screen.
    pub(crate) scroll_region: Option<(usize, usize)>,
    pub(crate) title: String,
    pub(crate) icon_title: String,
    pub(crate) title_stack: Vec<String>,
    pub(crate) selection: Option<Selection>,
    pub(crate) focused: bool,
    pub(crate) bell_since_focus: bool,
    pub(crate) events: Vec<TermEvent>,
    pub(crate) responses: Vec<u8>,
    pub(crate) notify: NotificationDispatcher,
    pub(crate) clipboard: ClipboardState,
    /// Active OSC 8 scope applied to new cells.
    pub(crate) current_link: u32,
    /// Last graphic character, for REP.
    pub(crate) last_graphic: Option<(char, CharWidth)>,
    pub(crate) config: ScreenConfig,
    /// Hyperlink sweep trigger: counts link-bearing line evictions.
    pub(crate) sweep_debt: usize,
}

impl Screen {
    #[must_use]
    pub fn new(rows: usize, cols: usize, config: ScreenConfig) -> Self {
        let scrollback = match &config.scrollback_spill {
            Some(spill) => Scrollback::with_spill(config.scrollback_lines, spill.clone()),
            None => Scrollback::new(config.scrollback_lines),
        };
        Self {
            main: Grid::new(rows, cols),
            alt: Grid::new(rows, cols),
            alt_active: false,
            scrollback,
            hyperlinks: HyperlinkPool::new(),
            graphics: GraphicsDispatcher::new(ImageStore::new(config.graphics)),
            modes: Modes::default(),
            tabs: TabStops::new(cols),
            kbd_main: KeyboardStack::new(),
            kbd_alt: KeyboardStack::new(),
            charsets: Charsets::default(),
            saved_main: None,
            saved_alt: None,
            scroll_region: None,
            title: String::new(),
            icon_title: String::new(),
            title_stack: Vec::new(),
            selection: None,
            focused: true,
            bell_since_focus: false,
            events: Vec::new(),
            responses: Vec::new(),
            notify: NotificationDispatcher::new(),
            clipboard: ClipboardState::new(config.clipboard),
            current_link: 0,
            last_graphic: None,
            config,
            sweep_debt: 0,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[must_use]
    pub fn grid(&self) -> &Grid {
        if self.alt_active { &self.alt } else { &self.main }
    }

    pub(crate) fn grid_mut(&mut self) -> &mut Grid {
        if self.alt_active {
            &mut self.alt
        } else {
            &mut self.main
        }
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.grid().rows()
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.grid().cols()
    }

    #[must_use]
    pub fn alt_screen_active(&self) -> bool {
        self.alt_active
    }

    #[must_use]
    pub fn scrollback(&self) -> &Scrollback {
        &self.scrollback
    }

    #[must_use]
    pub fn hyperlinks(&self) -> &HyperlinkPool {
        &self.hyperlinks
    }

    #[must_use]
    pub fn graphics(&self) -> &GraphicsDispatcher {
        &self.graphics
    }

    #[must_use]
    pub fn modes(&self) -> &Modes {
        &self.modes
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    #[must_use]
    pub fn keyboard_flags(&self) -> crate::kbd::KeyboardFlags {
        self.kbd().current()
    }

    pub(crate) fn kbd(&self) -> &KeyboardStack {
        if self.alt_active {
            &self.kbd_alt
        } else {
            &self.kbd_main
        }
    }

    pub(crate) fn kbd_mut(&mut self) -> &mut KeyboardStack {
        if self.alt_active {
            &mut self.kbd_alt
        } else {
            &mut self.kbd_main
        }
    }

    /// Cell geometry in pixels, as configured.
    #[must_use]
    pub fn cell_pixel_size(&self) -> (u32, u32) {
        (self.config.cell_width, self.config.cell_height)
    }

    /// Whether a bell has rung since the window last gained focus.
    #[must_use]
    pub fn bell_since_focus(&self) -> bool {
        self.bell_since_focus
    }

    /// Focus change from the window system.
    pub fn set_focus(&mut self, focused: bool) {
        self.focused = focused;
        if focused {
            self.bell_since_focus = false;
        }
    }

    /// Drain queued outgoing events.
    pub fn take_events(&mut self) -> Vec<TermEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drain bytes owed to the PTY (query replies, protocol
    /// responses).
    pub fn take_responses(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.responses)
    }

    /// The active scroll region (top, bottom inclusive).
    #[must_use]
    pub(crate) fn region(&self) -> (usize, usize) {
        self.scroll_region
            .unwrap_or((0, self.grid().rows() - 1))
    }

    // ------------------------------------------------------------------
    // Printing
    // ------------------------------------------------------------------

    pub(crate) fn print_char(&mut self, ch: char) {
        // Emoji presentation selectors retroactively change the width
        // of the preceding cell.
        if ch == VS16 {
            self.grid_mut().set_last_cell_width(true);
            return;
        }
        if ch == VS15 {
            self.grid_mut().set_last_cell_width(false);
            return;
        }

        let mapped = self.charsets.map(ch);
        let width = match decode::classify(mapped) {
            CharClass::Narrow => CharWidth::Narrow,
            CharClass::Wide => CharWidth::Wide,
            CharClass::Combining => CharWidth::Zero,
        };
        // The soft hyphen is stored as a combining mark on the
        // previous cell; classify already returns Zero for it.
        debug_assert!(mapped != SOFT_HYPHEN || width == CharWidth::Zero);

        self.put(mapped, width);
    }

    fn put(&mut self, ch: char, width: CharWidth) {
        let region = self.region();
        let autowrap = self.modes.autowrap;
        let insert = self.modes.insert;
        let link = self.current_link;
        let row_before = self.grid().cursor.row;
        let at_bottom = row_before == region.1 && self.grid().cursor.pending_wrap;

        {
            let (grid, scrollback) = if self.alt_active {
                (&mut self.alt, None)
            } else {
                (&mut self.main, Some(&mut self.scrollback))
            };
            grid.cursor.attrs.hyperlink = link;
            grid.put_char(ch, width, autowrap, insert, region, scrollback);
        }

        if width != CharWidth::Zero {
            self.last_graphic = Some((ch, width));
        }
        if at_bottom && region.0 == 0 {
            // The wrap scrolled the whole region: the selection moves
            // with the text.
            self.shift_selection(-1);
            self.scroll_placements(1);
        }
        let row_after = self.grid().cursor.row;
        self.damage_selection(row_before as isize, row_after as isize);
    }

    pub(crate) fn print_text(&mut self, text: &str) {
        for ch in text.chars() {
            self.print_char(ch);
        }
    }

    /// REP: repeat the preceding graphic character.
    pub(crate) fn repeat_last(&mut self, count: usize) {
        let Some((ch, width)) = self.last_graphic else {
            return;
        };
        for _ in 0..count.min(self.cols() * self.rows()) {
            self.put(ch, width);
        }
    }

    // ------------------------------------------------------------------
    // Cursor motion and scrolling
    // ------------------------------------------------------------------

    /// LF/IND: move down, scrolling at the bottom margin.
    pub(crate) fn linefeed(&mut self) {
        let (_, bottom) = self.region();
        let row = self.grid().cursor.row;
        if row == bottom {
            self.scroll_region_up(1);
        } else if row + 1 < self.rows() {
            self.grid_mut().cursor.row += 1;
        }
        self.grid_mut().cursor.pending_wrap = false;
        if self.modes.newline {
            self.grid_mut().cursor.col = 0;
        }
        // A hard line feed breaks the soft-wrap chain: the line the
        // cursor lands on starts a new logical line.
        let row = self.grid().cursor.row;
        if let Some(line) = self.grid_mut().line_mut(row) {
            line.continued = false;
        }
    }

    /// RI: move up, reverse-scrolling at the top margin.
    pub(crate) fn reverse_linefeed(&mut self) {
        let (top, _) = self.region();
        let row = self.grid().cursor.row;
        if row == top {
            self.scroll_region_down(1);
        } else if row > 0 {
            self.grid_mut().cursor.row -= 1;
        }
        self.grid_mut().cursor.pending_wrap = false;
    }

    pub(crate) fn carriage_return(&mut self) {
        let cursor = &mut self.grid_mut().cursor;
        cursor.col = 0;
        cursor.pending_wrap = false;
    }

    pub(crate) fn backspace(&mut self) {
        let cursor = &mut self.grid_mut().cursor;
        if cursor.pending_wrap {
            cursor.pending_wrap = false;
        } else if cursor.col > 0 {
            cursor.col -= 1;
        }
    }

    pub(crate) fn horizontal_tab(&mut self) {
        let col = self.grid().cursor.col;
        let next = self.tabs.next(col);
        let cursor = &mut self.grid_mut().cursor;
        cursor.col = next;
        cursor.pending_wrap = false;
    }

    /// Scroll the active region up, feeding scrollback when eligible.
    pub(crate) fn scroll_region_up(&mut self, n: usize) {
        let region = self.region();
        let full = region.0 == 0;
        {
            let (grid, scrollback) = if self.alt_active {
                (&mut self.alt, None)
            } else {
                (&mut self.main, Some(&mut self.scrollback))
            };
            grid.scroll_up(region, n, scrollback);
        }
        if full && !self.alt_active {
            self.shift_selection(-(n as isize));
            self.scroll_placements(n);
            self.flush_housekeeping();
        } else {
            self.damage_selection(region.0 as isize, region.1 as isize);
        }
    }

    pub(crate) fn scroll_region_down(&mut self, n: usize) {
        let region = self.region();
        self.grid_mut().scroll_down(region, n);
        self.damage_selection(region.0 as isize, region.1 as isize);
    }

    /// Non-virtual placements ride along with scrolled text.
    fn scroll_placements(&mut self, n: usize) {
        let mut dead: Vec<(u32, u32)> = Vec::new();
        for image in self.graphics.store.iter() {
            for placement in image.placements.values() {
                if placement.is_virtual || placement.parent.is_some() {
                    continue;
                }
                if placement.row < n {
                    dead.push((image.id, placement.id));
                }
            }
        }
        // Placements fully above the screen after the scroll are
        // dropped; the rest shift up.
        let ids: Vec<u32> = self.graphics.store.iter().map(|i| i.id).collect();
        for id in ids {
            if let Some(image) = self.graphics.store.get_mut(id) {
                for placement in image.placements.values_mut() {
                    if !placement.is_virtual && placement.parent.is_none() && placement.row >= n
                    {
                        placement.row -= n;
                    }
                }
            }
        }
        for (image_id, placement_id) in dead {
            self.graphics.store.remove_placement(image_id, placement_id);
        }
    }

    /// Flush spill queues and sweep hyperlinks occasionally.
    fn flush_housekeeping(&mut self) {
        self.sweep_debt += 1;
        if self.sweep_debt >= 1024 {
            self.sweep_debt = 0;
            self.scrollback.flush_spill(Some(&self.hyperlinks));
            let live: std::collections::HashSet<u32> = self
                .scrollback
                .referenced_link_ids()
                .chain(self.main.lines().iter().flat_map(|l| {
                    l.cells().iter().map(|c| c.hyperlink).filter(|&h| h != 0)
                }))
                .chain(self.alt.lines().iter().flat_map(|l| {
                    l.cells().iter().map(|c| c.hyperlink).filter(|&h| h != 0)
                }))
                .chain((self.current_link != 0).then_some(self.current_link))
                .collect();
            self.hyperlinks.sweep(live);
        }
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Establish a selection; Word and Line kinds expand endpoints.
    pub fn select_in_range(
        &mut self,
        mut start: SelectionPos,
        mut end: SelectionPos,
        kind: SelectionKind,
    ) {
        if kind == SelectionKind::Word {
            start.col = self.word_boundary(start, false);
            end.col = self.word_boundary(end, true);
        }
        if kind == SelectionKind::Line {
            start.col = 0;
            end.col = self.cols().saturating_sub(1);
        }
        self.selection = Some(Selection::new(start, end, kind));
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    fn word_boundary(&self, pos: SelectionPos, forward: bool) -> usize {
        let Some(line) = self.line_at(pos.row) else {
            return pos.col;
        };
        let is_word = |col: usize| {
            line.cell(col)
                .map(|c| !c.is_empty() && (c.ch.is_alphanumeric() || c.ch == '_'))
                .unwrap_or(false)
        };
        let mut col = pos.col.min(self.cols().saturating_sub(1));
        if !is_word(col) {
            return col;
        }
        if forward {
            while col + 1 < self.cols() && is_word(col + 1) {
                col += 1;
            }
        } else {
            while col > 0 && is_word(col - 1) {
                col -= 1;
            }
        }
        col
    }

    /// A line by selection row coordinates (negative = scrollback).
    #[must_use]
    pub fn line_at(&self, row: isize) -> Option<&vtgrid::line::Line> {
        if row >= 0 {
            self.grid().line(usize::try_from(row).ok()?)
        } else {
            let depth = usize::try_from(-row).ok()?;
            self.scrollback.line_from_newest(depth - 1)
        }
    }

    /// Clear the selection when rows in `[first, last]` changed.
    pub(crate) fn damage_selection(&mut self, first: isize, last: isize) {
        if self
            .selection
            .as_ref()
            .is_some_and(|s| s.intersects_rows(first.min(last), first.max(last)))
        {
            self.selection = None;
        }
    }

    pub(crate) fn shift_selection(&mut self, delta: isize) {
        let oldest = -(self.scrollback.len() as isize);
        self.selection = self
            .selection
            .take()
            .and_then(|s| s.shifted(delta, oldest));
    }

    /// Serialize the current selection.
    #[must_use]
    pub fn serialize_selection(&self, opts: &CopyOptions) -> Option<Vec<u8>> {
        let selection = self.selection?;
        let (start, end) = selection.ordered();
        let cols = self.cols();
        let (rect_left, rect_right) = {
            let (a, b) = if start.col <= end.col {
                (start.col, end.col)
            } else {
                (end.col, start.col)
            };
            (a, b + 1)
        };
        let mut out = Vec::new();
        for row in start.row..=end.row {
            let line = self.line_at(row)?;
            let (left, right) = match selection.kind {
                SelectionKind::Rectangular => (rect_left, rect_right),
                SelectionKind::Line => (0, cols),
                SelectionKind::Stream | SelectionKind::Word => {
                    let left = if row == start.row { start.col } else { 0 };
                    let right = if row == end.row { end.col + 1 } else { cols };
                    (left.min(right.saturating_sub(1)), right)
                }
            };
            if row > start.row {
                if line.continued && selection.kind != SelectionKind::Rectangular {
                    if opts.wrap_markers {
                        out.push(b'\r');
                    }
                } else {
                    out.push(b'\n');
                }
            }
            out.extend_from_slice(&serialize::copy_region(
                &[line],
                left,
                right,
                opts,
                Some(&self.hyperlinks),
            ));
        }
        Some(out)
    }

    /// Copy an arbitrary region (scrollback rows negative).
    #[must_use]
    pub fn copy_region(
        &self,
        start_line: isize,
        end_line: isize,
        left: usize,
        right: usize,
        opts: &CopyOptions,
    ) -> Vec<u8> {
        let mut lines = Vec::new();
        for row in start_line..=end_line {
            if let Some(line) = self.line_at(row) {
                lines.push(line);
            }
        }
        serialize::copy_region(&lines, left, right, opts, Some(&self.hyperlinks))
    }

    // ------------------------------------------------------------------
    // Alternate screen
    // ------------------------------------------------------------------

    pub(crate) fn enter_alt_screen(&mut self, save_cursor: bool, clear: bool) {
        if self.alt_active {
            return;
        }
        if save_cursor {
            self.save_cursor();
        }
        self.alt_active = true;
        if clear {
            self.alt = Grid::new(self.main.rows(), self.main.cols());
        }
        self.selection = None;
    }

    pub(crate) fn leave_alt_screen(&mut self, restore_cursor: bool) {
        if !self.alt_active {
            return;
        }
        self.alt_active = false;
        if restore_cursor {
            self.restore_cursor();
        }
        self.selection = None;
    }

    pub(crate) fn save_cursor(&mut self) {
        let cursor = self.grid().cursor;
        let saved = SavedCursor {
            row: cursor.row,
            col: cursor.col,
            attrs: cursor.attrs,
            origin_mode: self.modes.origin,
            pending_wrap: cursor.pending_wrap,
        };
        if self.alt_active {
            self.saved_alt = Some(saved);
        } else {
            self.saved_main = Some(saved);
        }
    }

    /// DECRC. Without a prior DECSC this restores nothing.
    pub(crate) fn restore_cursor(&mut self) {
        let slot = if self.alt_active {
            self.saved_alt
        } else {
            self.saved_main
        };
        let Some(saved) = slot else {
            debug!("DECRC without DECSC ignored");
            return;
        };
        self.modes.origin = saved.origin_mode;
        let rows = self.rows();
        let cols = self.cols();
        let cursor = &mut self.grid_mut().cursor;
        cursor.row = saved.row.min(rows - 1);
        cursor.col = saved.col.min(cols - 1);
        cursor.attrs = saved.attrs;
        cursor.pending_wrap = saved.pending_wrap;
    }

    // ------------------------------------------------------------------
    // Erase operations
    // ------------------------------------------------------------------

    /// ED: erase in display. Clears the selection only on
    /// intersection.
    pub(crate) fn erase_in_display(&mut self, mode: u32) {
        let rows = self.rows();
        let cols = self.cols();
        let (row, col) = {
            let c = &self.grid().cursor;
            (c.row, c.col)
        };
        match mode {
            0 => {
                self.damage_selection(row as isize, rows as isize - 1);
                self.grid_mut()
                    .erase_in_row(row, col..cols, ErasePolicy::ContentOnly);
                if row + 1 < rows {
                    self.grid_mut()
                        .erase_rows(row + 1..rows, ErasePolicy::ContentAndContinuation);
                }
            }
            1 => {
                self.damage_selection(0, row as isize);
                if row > 0 {
                    self.grid_mut()
                        .erase_rows(0..row, ErasePolicy::ContentAndContinuation);
                }
                self.grid_mut()
                    .erase_in_row(row, 0..col + 1, ErasePolicy::ContentOnly);
            }
            2 => {
                self.damage_selection(0, rows as isize - 1);
                self.grid_mut()
                    .erase_rows(0..rows, ErasePolicy::ContentAndContinuation);
            }
            3 => {
                // Clear the scrollback only; selections reaching into
                // it are dropped.
                let _ = self.scrollback.drain_lines();
                self.shift_selection(0);
            }
            22 => {
                // Push the screen into the scrollback, then clear.
                self.damage_selection(0, rows as isize - 1);
                if !self.alt_active {
                    let snapshot: Vec<vtgrid::line::Line> =
                        self.main.lines().to_vec();
                    for line in snapshot {
                        self.scrollback.push(line);
                    }
                }
                self.grid_mut()
                    .erase_rows(0..rows, ErasePolicy::ContentAndContinuation);
            }
            _ => debug!(mode, "ignoring unknown ED mode"),
        }
    }

    /// EL: erase in line. Never touches other lines' continued bits.
    pub(crate) fn erase_in_line(&mut self, mode: u32) {
        let cols = self.cols();
        let (row, col) = {
            let c = &self.grid().cursor;
            (c.row, c.col)
        };
        self.damage_selection(row as isize, row as isize);
        match mode {
            0 => self
                .grid_mut()
                .erase_in_row(row, col..cols, ErasePolicy::ContentOnly),
            1 => self
                .grid_mut()
                .erase_in_row(row, 0..col + 1, ErasePolicy::ContentOnly),
            2 => self
                .grid_mut()
                .erase_in_row(row, 0..cols, ErasePolicy::ContentOnly),
            _ => debug!(mode, "ignoring unknown EL mode"),
        }
    }

    // ------------------------------------------------------------------
    // Resize
    // ------------------------------------------------------------------

    /// Resize both grids, reflowing the main screen through its
    /// scrollback.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        let rows = rows.max(1);
        let cols = cols.max(1);
        self.main.resize(rows, cols, Some(&mut self.scrollback));
        self.alt.resize(rows, cols, None);
        self.tabs.resize(cols);
        self.scroll_region = None;
        self.selection = None;
        // Clip placements that fell off the right/bottom edge.
        let ids: Vec<u32> = self.graphics.store.iter().map(|i| i.id).collect();
        let mut dead = Vec::new();
        for id in &ids {
            if let Some(image) = self.graphics.store.get(*id) {
                for placement in image.placements.values() {
                    if !placement.is_virtual
                        && placement.parent.is_none()
                        && (placement.row >= rows || placement.col >= cols)
                    {
                        dead.push((*id, placement.id));
                    }
                }
            }
        }
        for (image_id, placement_id) in dead {
            self.graphics.store.remove_placement(image_id, placement_id);
        }
    }

    // ------------------------------------------------------------------
    // Graphics plumbing
    // ------------------------------------------------------------------

    fn handle_graphics(&mut self, payload: &[u8]) {
        let cursor = self.grid().cursor;
        let ctx = GraphicsContext {
            cursor_row: cursor.row,
            cursor_col: cursor.col,
            screen_rows: self.rows(),
            screen_cols: self.cols(),
            cell_width: self.config.cell_width,
            cell_height: self.config.cell_height,
        };
        if let Some(response) = self.graphics.handle(payload, &ctx) {
            if let Some((cols, rows)) = response.cursor_advance {
                self.advance_cursor_over_image(cols as usize, rows as usize);
            }
            if response.should_send() {
                self.responses.extend_from_slice(&response.encode());
            }
        }
    }

    /// After displaying an image with `C=0` the cursor lands just
    /// past the image's bottom-right cell.
    fn advance_cursor_over_image(&mut self, cols: usize, rows: usize) {
        let max_row = self.rows() - 1;
        let max_col = self.cols() - 1;
        let cursor = &mut self.grid_mut().cursor;
        cursor.row = (cursor.row + rows.saturating_sub(1)).min(max_row);
        cursor.col = (cursor.col + cols).min(max_col);
        cursor.pending_wrap = false;
    }

    /// Session shutdown: finalize the spill, release stores.
    pub fn shutdown(&mut self) {
        self.scrollback.flush_spill(Some(&self.hyperlinks));
        if let Err(e) = self.scrollback.finalize(Some(&self.hyperlinks)) {
            debug!(error = %e, "scrollback finalize failed");
        }
        self.graphics.store.clear();
        self.hyperlinks.clear();
    }
}

impl TokenSink for Screen {
    fn print(&mut self, ch: char) {
        self.print_char(ch);
    }

    fn print_run(&mut self, text: &str) {
        if self.charsets.active() == Charset::Ascii && !self.modes.insert {
            // Narrow ASCII fast path still goes cell by cell through
            // put so wrap and damage stay exact; the win is skipping
            // classification.
            for ch in text.chars() {
                self.put(ch, CharWidth::Narrow);
            }
        } else {
            self.print_text(text);
        }
    }

    fn execute(&mut self, control: u8) {
        match control {
            0x07 => {
                self.bell_since_focus = true;
                self.events.push(TermEvent::Bell);
            }
            0x08 => self.backspace(),
            0x09 => self.horizontal_tab(),
            0x0A | 0x0B | 0x0C => self.linefeed(),
            0x0D => self.carriage_return(),
            0x0E => self.charsets.shifted = true,
            0x0F => self.charsets.shifted = false,
            0x18 | 0x1A | 0x7F => {}
            other => debug!(control = other, "ignoring C0 control"),
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], byte: u8) {
        crate::csi::dispatch_esc(self, intermediates, byte);
    }

    fn csi_dispatch(
        &mut self,
        private: Option<u8>,
        params: &Params,
        intermediates: &[u8],
        final_byte: u8,
    ) {
        crate::csi::dispatch_csi(self, private, params, intermediates, final_byte);
    }

    fn osc_dispatch(&mut self, cmd: Option<u32>, payload: &[u8], _bell_terminated: bool) {
        crate::osc::dispatch_osc(self, cmd, payload);
    }

    fn dcs_dispatch(
        &mut self,
        private: Option<u8>,
        _params: &Params,
        _intermediates: &[u8],
        final_byte: u8,
        _payload: &[u8],
    ) {
        debug!(?private, final_byte, "ignoring DCS");
    }

    fn string_dispatch(&mut self, kind: StringKind, payload: &[u8]) {
        match kind {
            StringKind::Apc if payload.first() == Some(&b'G') => {
                self.handle_graphics(&payload[1..]);
            }
            _ => debug!(?kind, "ignoring control string"),
        }
    }

    fn error_glyph(&mut self) {
        self.print_char('\u{FFFD}');
    }
}
