//! History of lines that have left the main screen.
//!
//! A bounded ring of immutable lines. Evicted lines may spill to an
//! append-only disk file for an external pager; the on-disk format is
//! opaque but round-trips formatting and hyperlinks by storing the
//! same ANSI serialization the copy queries produce.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::hyperlink::HyperlinkPool;
use crate::line::Line;
use crate::serialize;

/// Where and whether to spill evicted lines.
#[derive(Debug, Clone)]
pub struct SpillConfig {
    /// Target file; created (truncated) on first eviction.
    pub path: PathBuf,
}

struct Spill {
    writer: BufWriter<File>,
    path: PathBuf,
    records: u64,
}

impl Spill {
    fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(path)?;
        info!(path = %path.display(), "opened scrollback spill file");
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            records: 0,
        })
    }

    /// Record layout: flags byte (bit 0 = continued), u32-le payload
    /// length, then the line as ANSI bytes.
    fn append(&mut self, line: &Line, pool: Option<&HyperlinkPool>) -> io::Result<()> {
        let payload = serialize::line_to_ansi(line, pool);
        let flags: u8 = u8::from(line.continued);
        self.writer.write_all(&[flags])?;
        self.writer
            .write_all(&u32::try_from(payload.len()).unwrap_or(u32::MAX).to_le_bytes())?;
        self.writer.write_all(&payload)?;
        self.records += 1;
        Ok(())
    }
}

/// The in-memory scrollback ring.
pub struct Scrollback {
    lines: std::collections::VecDeque<Line>,
    capacity: usize,
    /// Hyperlink ids referenced by stored lines, with counts, so the
    /// interning pool can tell which ids history keeps alive.
    link_refs: HashMap<u32, u32>,
    spill: Option<Spill>,
    spill_config: Option<SpillConfig>,
    /// Evicted lines awaiting a spill flush. The spill needs the
    /// hyperlink pool to resolve URIs, so writing happens in
    /// [`Scrollback::flush_spill`] where the caller can supply it.
    spill_queue: Vec<Line>,
    /// Lines ever evicted past the in-memory cap.
    evicted: u64,
}

impl std::fmt::Debug for Scrollback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scrollback")
            .field("len", &self.lines.len())
            .field("capacity", &self.capacity)
            .field("evicted", &self.evicted)
            .finish_non_exhaustive()
    }
}

impl Scrollback {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: std::collections::VecDeque::new(),
            capacity,
            link_refs: HashMap::new(),
            spill: None,
            spill_config: None,
            spill_queue: Vec::new(),
            evicted: 0,
        }
    }

    #[must_use]
    pub fn with_spill(capacity: usize, config: SpillConfig) -> Self {
        Self {
            spill_config: Some(config),
            ..Self::new(capacity)
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lines evicted past the in-memory cap since creation.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Path of the spill file once anything has been spilled.
    #[must_use]
    pub fn spill_path(&self) -> Option<&Path> {
        self.spill.as_ref().map(|s| s.path.as_path())
    }

    /// Oldest-first access; index 0 is the oldest retained line.
    #[must_use]
    pub fn line(&self, index: usize) -> Option<&Line> {
        self.lines.get(index)
    }

    /// Newest-first access; index 0 is the line most recently pushed.
    #[must_use]
    pub fn line_from_newest(&self, index: usize) -> Option<&Line> {
        let len = self.lines.len();
        if index < len {
            self.lines.get(len - 1 - index)
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Line> {
        self.lines.iter()
    }

    /// Append a line scrolled off the screen, evicting past capacity.
    pub fn push(&mut self, line: Line) {
        for cell in line.cells() {
            if cell.hyperlink != 0 {
                *self.link_refs.entry(cell.hyperlink).or_insert(0) += 1;
            }
        }
        self.lines.push_back(line);
        while self.lines.len() > self.capacity {
            if let Some(old) = self.lines.pop_front() {
                self.evict(old);
            }
        }
    }

    fn evict(&mut self, line: Line) {
        self.evicted += 1;
        for cell in line.cells() {
            if cell.hyperlink != 0 {
                if let Some(count) = self.link_refs.get_mut(&cell.hyperlink) {
                    *count -= 1;
                    if *count == 0 {
                        self.link_refs.remove(&cell.hyperlink);
                    }
                }
            }
        }
        if self.spill_config.is_some() || self.spill.is_some() {
            self.spill_queue.push(line);
        }
    }

    /// Write queued evictions to the spill file. The pool resolves
    /// hyperlink ids so links survive the round trip to disk.
    pub fn flush_spill(&mut self, pool: Option<&HyperlinkPool>) {
        if self.spill_queue.is_empty() {
            return;
        }
        if self.spill.is_none() {
            if let Some(config) = &self.spill_config {
                match Spill::open(&config.path) {
                    Ok(spill) => self.spill = Some(spill),
                    Err(e) => {
                        warn!(error = %e, "scrollback spill disabled");
                        self.spill_config = None;
                        self.spill_queue.clear();
                        return;
                    }
                }
            }
        }
        let mut failed = false;
        if let Some(spill) = &mut self.spill {
            for line in self.spill_queue.drain(..) {
                if let Err(e) = spill.append(&line, pool) {
                    warn!(error = %e, "scrollback spill write failed");
                    failed = true;
                    break;
                }
            }
        }
        if failed {
            self.spill = None;
            self.spill_config = None;
        }
        self.spill_queue.clear();
    }

    /// Take the newest line back out (row-count grow pulls history).
    pub fn pop_newest(&mut self) -> Option<Line> {
        let line = self.lines.pop_back()?;
        for cell in line.cells() {
            if cell.hyperlink != 0 {
                if let Some(count) = self.link_refs.get_mut(&cell.hyperlink) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        self.link_refs.remove(&cell.hyperlink);
                    }
                }
            }
        }
        Some(line)
    }

    /// Remove and return every retained line, oldest first. Used by
    /// column reflow, which re-pushes what still fits.
    pub fn drain_lines(&mut self) -> Vec<Line> {
        self.link_refs.clear();
        self.lines.drain(..).collect()
    }

    /// Hyperlink ids any retained line still references.
    pub fn referenced_link_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.link_refs.keys().copied()
    }

    /// Flush queued evictions and the spill file; called at session
    /// shutdown.
    pub fn finalize(&mut self, pool: Option<&HyperlinkPool>) -> io::Result<()> {
        self.flush_spill(pool);
        if let Some(spill) = &mut self.spill {
            spill.writer.flush()?;
        }
        Ok(())
    }
}
