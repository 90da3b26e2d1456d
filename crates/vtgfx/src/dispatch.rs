//! The APC `G` dispatcher: chunk assembly, action routing, responses.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, warn};

use crate::animation::{Frame, PlaybackState, compose_rect, solid_canvas};
use crate::command::{Action, DeleteSpec, GraphicsCommand, Medium};
use crate::error::GraphicsError;
use crate::image::{self, ImageData};
use crate::placement::{ParentRef, Placement};
use crate::store::ImageStore;

/// Screen-side facts a command needs: where the cursor is and how big
/// cells are.
#[derive(Debug, Clone, Copy)]
pub struct GraphicsContext {
    pub cursor_row: usize,
    pub cursor_col: usize,
    pub screen_rows: usize,
    pub screen_cols: usize,
    /// Cell size in pixels, for deriving placement extents.
    pub cell_width: u32,
    pub cell_height: u32,
}

/// Outcome of a command, serialized back over the PTY unless quiet
/// flags suppress it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub image_id: Option<u32>,
    pub image_number: Option<u32>,
    pub placement_id: Option<u32>,
    pub status: Result<(), GraphicsError>,
    quiet: u32,
    /// Cells the cursor should advance over after a display action
    /// with `C=0`.
    pub cursor_advance: Option<(u32, u32)>,
}

impl Response {
    fn new(cmd: &GraphicsCommand, status: Result<(), GraphicsError>) -> Self {
        Self {
            image_id: cmd.image_id,
            image_number: cmd.image_number,
            placement_id: cmd.placement_id,
            status,
            quiet: cmd.quiet,
            cursor_advance: None,
        }
    }

    /// Whether this response should be written to the PTY: `q=1`
    /// suppresses OK, `q=2` suppresses everything.
    #[must_use]
    pub fn should_send(&self) -> bool {
        match (&self.status, self.quiet) {
            (_, q) if q >= 2 => false,
            (Ok(()), q) if q >= 1 => false,
            _ => true,
        }
    }

    /// Wire form: `<APC>G<k=v,...>;<OK|CODE:msg><ST>`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut keys = String::new();
        if let Some(id) = self.image_id {
            keys.push_str(&format!("i={id}"));
        }
        if let Some(number) = self.image_number {
            if !keys.is_empty() {
                keys.push(',');
            }
            keys.push_str(&format!("I={number}"));
        }
        if let Some(p) = self.placement_id {
            if !keys.is_empty() {
                keys.push(',');
            }
            keys.push_str(&format!("p={p}"));
        }
        let status = match &self.status {
            Ok(()) => "OK".to_string(),
            Err(e) => e.to_string(),
        };
        let mut out = Vec::with_capacity(keys.len() + status.len() + 8);
        out.extend_from_slice(b"\x1b_G");
        out.extend_from_slice(keys.as_bytes());
        out.push(b';');
        out.extend_from_slice(status.as_bytes());
        out.extend_from_slice(b"\x1b\\");
        out
    }
}

/// In-flight chunked command.
#[derive(Debug)]
struct ChunkState {
    cmd: GraphicsCommand,
    /// Base64 text accumulated across chunks; decoded once at the end.
    payload: Vec<u8>,
}

/// Cap on accumulated chunked payload (base64 bytes) before the
/// command is abandoned.
const MAX_CHUNKED_PAYLOAD: usize = 512 * 1024 * 1024;

/// The graphics protocol dispatcher. Owns the store.
#[derive(Debug, Default)]
pub struct GraphicsDispatcher {
    pub store: ImageStore,
    chunk: Option<ChunkState>,
}

impl GraphicsDispatcher {
    #[must_use]
    pub fn new(store: ImageStore) -> Self {
        Self { store, chunk: None }
    }

    /// Handle one APC `G` payload (bytes after the `G`).
    ///
    /// Returns the response to write, if any. Chunked commands answer
    /// only once, after the final chunk.
    pub fn handle(&mut self, payload: &[u8], ctx: &GraphicsContext) -> Option<Response> {
        let (control, body) = match payload.iter().position(|&b| b == b';') {
            Some(i) => (&payload[..i], &payload[i + 1..]),
            None => (payload, &payload[..0]),
        };

        // Continuation chunks carry only m (and the body).
        if self.chunk.is_some() {
            let cont = match GraphicsCommand::parse(control) {
                Ok(c) => c,
                Err(e) => {
                    self.chunk = None;
                    return Some(Response::new(&GraphicsCommand::default(), Err(e)));
                }
            };
            let overflowed = {
                let state = self.chunk.as_mut().expect("checked above");
                state.payload.extend_from_slice(body);
                state.payload.len() > MAX_CHUNKED_PAYLOAD
            };
            if overflowed {
                let cmd = self.chunk.take().map(|s| s.cmd).unwrap_or_default();
                return Some(Response::new(
                    &cmd,
                    Err(GraphicsError::enospc("chunked payload too large")),
                ));
            }
            if cont.more {
                return None;
            }
            let state = self.chunk.take().expect("checked above");
            return Some(self.execute(&state.cmd, &state.payload, ctx));
        }

        let cmd = match GraphicsCommand::parse(control) {
            Ok(cmd) => cmd,
            Err(e) => {
                debug!(error = %e, "rejected graphics command");
                return Some(Response::new(&GraphicsCommand::default(), Err(e)));
            }
        };

        if cmd.more {
            self.chunk = Some(ChunkState {
                cmd,
                payload: body.to_vec(),
            });
            return None;
        }

        Some(self.execute(&cmd, body, ctx))
    }

    /// Run a complete command against the store.
    fn execute(
        &mut self,
        cmd: &GraphicsCommand,
        payload: &[u8],
        ctx: &GraphicsContext,
    ) -> Response {
        let result = match cmd.action {
            Action::Query => self.query(cmd, payload).map(|()| None),
            Action::Transmit => self.transmit(cmd, payload).map(Some),
            Action::TransmitAndDisplay => match self.transmit(cmd, payload) {
                Ok(id) => self.display(cmd, id, ctx).map(|()| Some(id)),
                Err(e) => Err(e),
            },
            Action::Put => match self.resolve_target(cmd) {
                Ok(id) => self.display(cmd, id, ctx).map(|()| Some(id)),
                Err(e) => Err(e),
            },
            Action::Delete => self.delete(cmd, ctx).map(|()| None),
            Action::Frame => self.add_frame(cmd, payload).map(|()| None),
            Action::Animate => self.animate(cmd).map(|()| None),
            Action::Compose => self.compose(cmd).map(|()| None),
        };

        let mut response = match result {
            Ok(resolved) => {
                let mut r = Response::new(cmd, Ok(()));
                if r.image_id.is_none() {
                    r.image_id = resolved;
                }
                r
            }
            Err(e) => {
                warn!(error = %e, "graphics command failed");
                Response::new(cmd, Err(e))
            }
        };

        if response.status.is_ok()
            && matches!(cmd.action, Action::TransmitAndDisplay | Action::Put)
            && !cmd.cursor_stays
            && !cmd.unicode_placeholder
        {
            if let Some(id) = response.image_id {
                if let Some(image) = self.store.get(id) {
                    if let Some(data) = &image.data {
                        let placement = image.placements.get(&cmd.placement_id.unwrap_or(0));
                        if let Some(p) = placement {
                            response.cursor_advance = Some(p.extent_cells(
                                (data.width, data.height),
                                (ctx.cell_width, ctx.cell_height),
                            ));
                        }
                    }
                }
            }
        }
        response
    }

    /// Decode the payload for the command's medium.
    fn fetch_payload(cmd: &GraphicsCommand, payload: &[u8]) -> Result<Vec<u8>, GraphicsError> {
        match cmd.medium {
            Medium::Direct => BASE64
                .decode(payload)
                .map_err(|e| GraphicsError::einval(format!("bad base64 payload: {e}"))),
            Medium::File | Medium::TempFile => {
                let path = decode_path(payload)?;
                image::read_file_medium(
                    &path,
                    cmd.data_offset,
                    cmd.data_size,
                    cmd.medium == Medium::TempFile,
                )
            }
            Medium::SharedMemory => {
                let name = decode_path(payload)?;
                image::read_shm_medium(&name, cmd.data_offset, cmd.data_size)
            }
        }
    }

    fn decode_image(cmd: &GraphicsCommand, payload: &[u8]) -> Result<ImageData, GraphicsError> {
        let raw = Self::fetch_payload(cmd, payload)?;
        image::decode_payload(&raw, cmd.format, cmd.compression, cmd.width, cmd.height)
    }

    fn query(&self, cmd: &GraphicsCommand, payload: &[u8]) -> Result<(), GraphicsError> {
        // With a payload: validate without storing (decode and drop).
        // Without one: confirm the referenced image exists.
        if payload.is_empty() {
            if cmd.image_id.is_some() || cmd.image_number.is_some() {
                return self.resolve_target(cmd).map(|_| ());
            }
            return Ok(());
        }
        Self::decode_image(cmd, payload).map(|_| ())
    }

    fn transmit(&mut self, cmd: &GraphicsCommand, payload: &[u8]) -> Result<u32, GraphicsError> {
        let data = Self::decode_image(cmd, payload)?;
        self.store.insert(cmd.image_id, cmd.image_number, data)
    }

    /// The image a non-transmit command refers to.
    fn resolve_target(&self, cmd: &GraphicsCommand) -> Result<u32, GraphicsError> {
        if let Some(id) = cmd.image_id {
            if self.store.get(id).is_some() {
                return Ok(id);
            }
            return Err(GraphicsError::enoent(format!("no image with id {id}")));
        }
        if let Some(number) = cmd.image_number {
            return self
                .store
                .resolve_number(number)
                .ok_or_else(|| GraphicsError::enoent(format!("no image with number {number}")));
        }
        Err(GraphicsError::einval("i or I is required"))
    }

    fn display(
        &mut self,
        cmd: &GraphicsCommand,
        image_id: u32,
        ctx: &GraphicsContext,
    ) -> Result<(), GraphicsError> {
        let parent = match (cmd.parent_image, cmd.parent_placement) {
            (Some(image), Some(placement)) => Some(ParentRef {
                image_id: image,
                placement_id: placement,
            }),
            (Some(image), None) => Some(ParentRef {
                image_id: image,
                placement_id: 0,
            }),
            (None, Some(_)) => {
                return Err(GraphicsError::einval("Q requires P"));
            }
            (None, None) => None,
        };

        let src = if cmd.src_w > 0 || cmd.src_h > 0 || cmd.src_x > 0 || cmd.src_y > 0 {
            Some((cmd.src_x, cmd.src_y, cmd.src_w, cmd.src_h))
        } else {
            None
        };

        let placement = Placement {
            id: cmd.placement_id.unwrap_or(0),
            row: ctx.cursor_row,
            col: ctx.cursor_col,
            columns: cmd.columns,
            rows: cmd.rows,
            src,
            cell_offset: (cmd.cell_x_offset, cmd.cell_y_offset),
            z_index: cmd.z_index,
            cursor_stays: cmd.cursor_stays,
            is_virtual: cmd.unicode_placeholder,
            parent,
            rel_offset: (cmd.rel_x, cmd.rel_y),
            depth: 0,
        };
        self.store.put_placement(image_id, placement)
    }

    #[allow(clippy::too_many_lines)]
    fn delete(&mut self, cmd: &GraphicsCommand, ctx: &GraphicsContext) -> Result<(), GraphicsError> {
        match cmd.delete {
            DeleteSpec::All => {
                let ids: Vec<u32> = self.store.iter().map(|i| i.id).collect();
                for id in ids {
                    if cmd.delete_frees {
                        self.store.remove_image(id);
                    } else {
                        let pids: Vec<u32> = self
                            .store
                            .get(id)
                            .map(|i| i.placements.keys().copied().collect())
                            .unwrap_or_default();
                        for pid in pids {
                            self.store.remove_placement(id, pid);
                        }
                    }
                }
                Ok(())
            }
            DeleteSpec::ById => {
                let id = self.resolve_target(cmd)?;
                self.delete_one(cmd, id);
                Ok(())
            }
            DeleteSpec::ByNumber => {
                let number = cmd
                    .image_number
                    .ok_or_else(|| GraphicsError::einval("d=n requires I"))?;
                if let Some(id) = self.store.resolve_number(number) {
                    self.delete_one(cmd, id);
                }
                Ok(())
            }
            DeleteSpec::AtCursor => {
                self.delete_matching(cmd, ctx, |p, extent, ctx| {
                    intersects_cell(p, extent, ctx.cursor_row, ctx.cursor_col)
                });
                Ok(())
            }
            DeleteSpec::AtCell => {
                let (row, col) = (cmd.src_y as usize, cmd.src_x as usize);
                let (row, col) = (row.saturating_sub(1), col.saturating_sub(1));
                self.delete_matching(cmd, ctx, move |p, extent, _| {
                    intersects_cell(p, extent, row, col)
                });
                Ok(())
            }
            DeleteSpec::AtCellWithZ => {
                let (row, col) = (
                    (cmd.src_y as usize).saturating_sub(1),
                    (cmd.src_x as usize).saturating_sub(1),
                );
                let z = cmd.z_index;
                self.delete_matching(cmd, ctx, move |p, extent, _| {
                    p.z_index == z && intersects_cell(p, extent, row, col)
                });
                Ok(())
            }
            DeleteSpec::AtColumn => {
                let col = (cmd.src_x as usize).saturating_sub(1);
                self.delete_matching(cmd, ctx, move |p, extent, _| {
                    !p.is_virtual && p.col <= col && col < p.col + extent.0 as usize
                });
                Ok(())
            }
            DeleteSpec::AtRow => {
                let row = (cmd.src_y as usize).saturating_sub(1);
                self.delete_matching(cmd, ctx, move |p, extent, _| {
                    !p.is_virtual && p.row <= row && row < p.row + extent.1 as usize
                });
                Ok(())
            }
            DeleteSpec::AtZ => {
                let z = cmd.z_index;
                self.delete_matching(cmd, ctx, move |p, _, _| p.z_index == z);
                Ok(())
            }
            DeleteSpec::IdRange => {
                let (lo, hi) = (cmd.src_x, cmd.src_y.max(cmd.src_x));
                let ids: Vec<u32> = self
                    .store
                    .iter()
                    .map(|i| i.id)
                    .filter(|id| (lo..=hi).contains(id))
                    .collect();
                for id in ids {
                    self.delete_one(cmd, id);
                }
                Ok(())
            }
            DeleteSpec::Frames => {
                let id = self.resolve_target(cmd)?;
                if let Some(image) = self.store.get_mut(id) {
                    // Frame 1 is the root image and cannot be deleted
                    // this way; extra frames are numbered from 2.
                    if cmd.frame_number >= 2 {
                        let idx = cmd.frame_number as usize - 2;
                        if idx < image.animation.frames.len() {
                            image.animation.frames.remove(idx);
                        }
                    } else {
                        image.animation.frames.clear();
                    }
                }
                Ok(())
            }
        }
    }

    /// Delete one image's placements; uppercase also drops the image.
    fn delete_one(&mut self, cmd: &GraphicsCommand, id: u32) {
        if let Some(pid) = cmd.placement_id {
            self.store.remove_placement(id, pid);
            if cmd.delete_frees
                && self
                    .store
                    .get(id)
                    .is_some_and(|i| i.placements.is_empty())
            {
                self.store.remove_image(id);
            }
        } else if cmd.delete_frees {
            self.store.remove_image(id);
        } else {
            let pids: Vec<u32> = self
                .store
                .get(id)
                .map(|i| i.placements.keys().copied().collect())
                .unwrap_or_default();
            for pid in pids {
                self.store.remove_placement(id, pid);
            }
        }
    }

    fn delete_matching<F>(&mut self, cmd: &GraphicsCommand, ctx: &GraphicsContext, pred: F)
    where
        F: Fn(&Placement, (u32, u32), &GraphicsContext) -> bool,
    {
        let cell = (ctx.cell_width, ctx.cell_height);
        let targets: Vec<(u32, u32)> = self
            .store
            .iter()
            .flat_map(|image| {
                let px = image
                    .data
                    .as_ref()
                    .map_or((1, 1), |d| (d.width, d.height));
                let pred = &pred;
                image
                    .placements
                    .values()
                    .filter(move |p| {
                        let extent = p.extent_cells(px, cell);
                        pred(p, extent, ctx)
                    })
                    .map(move |p| (image.id, p.id))
            })
            .collect();
        let mut touched: Vec<u32> = Vec::new();
        for (image_id, placement_id) in targets {
            self.store.remove_placement(image_id, placement_id);
            touched.push(image_id);
        }
        if cmd.delete_frees {
            for id in touched {
                if self
                    .store
                    .get(id)
                    .is_some_and(|i| i.placements.is_empty())
                {
                    self.store.remove_image(id);
                }
            }
        }
    }

    fn add_frame(&mut self, cmd: &GraphicsCommand, payload: &[u8]) -> Result<(), GraphicsError> {
        let id = self.resolve_target(cmd)?;
        let incoming = Self::decode_image(cmd, payload)?;
        let (root_w, root_h) = {
            let image = self
                .store
                .get(id)
                .ok_or_else(|| GraphicsError::enoent("image vanished"))?;
            let data = image
                .data
                .as_ref()
                .ok_or_else(|| GraphicsError::enoent("image has no data"))?;
            (data.width, data.height)
        };

        // Base canvas: an existing frame (1 is the root image), or a
        // solid background color.
        let mut canvas = if cmd.frame_base > 0 {
            let image = self.store.get(id).expect("resolved above");
            let base_idx = cmd.frame_base as usize;
            if base_idx == 1 {
                image.data.clone().expect("checked above")
            } else {
                image
                    .animation
                    .frames
                    .get(base_idx - 2)
                    .map(|f| f.data.clone())
                    .ok_or_else(|| {
                        GraphicsError::einval(format!("no frame {base_idx} to base on"))
                    })?
            }
        } else {
            solid_canvas(root_w, root_h, cmd.background)
        };

        let dst = (cmd.src_x.min(root_w), cmd.src_y.min(root_h));
        let w = incoming.width.min(root_w - dst.0);
        let h = incoming.height.min(root_h - dst.1);
        compose_rect(
            &mut canvas,
            &incoming,
            (0, 0, w, h),
            dst,
            cmd.replace_compose,
        )?;

        if let Some(image) = self.store.get_mut(id) {
            image.animation.frames.push(Frame {
                data: canvas,
                gap_ms: cmd.frame_gap,
            });
        }
        Ok(())
    }

    fn animate(&mut self, cmd: &GraphicsCommand) -> Result<(), GraphicsError> {
        let id = self.resolve_target(cmd)?;
        let image = self
            .store
            .get_mut(id)
            .ok_or_else(|| GraphicsError::enoent("image vanished"))?;
        if cmd.anim_state > 0 {
            image.animation.state = PlaybackState::from_value(cmd.anim_state);
        }
        if cmd.loops > 0 {
            image.animation.loops = cmd.loops;
        }
        if cmd.frame_number > 0 {
            image.animation.current = cmd.frame_number;
        }
        Ok(())
    }

    fn compose(&mut self, cmd: &GraphicsCommand) -> Result<(), GraphicsError> {
        let id = self.resolve_target(cmd)?;
        let src_idx = cmd.frame_base as usize;
        let dst_idx = cmd.frame_number as usize;
        if src_idx == 0 || dst_idx == 0 {
            return Err(GraphicsError::einval("c and r are required for a=c"));
        }

        let rect = (
            cmd.src_x,
            cmd.src_y,
            cmd.src_w.max(1),
            cmd.src_h.max(1),
        );
        let dst_pos = (cmd.cell_x_offset, cmd.cell_y_offset);
        if src_idx == dst_idx && rects_overlap(rect, (dst_pos.0, dst_pos.1, rect.2, rect.3)) {
            return Err(GraphicsError::einval(
                "compose source and destination rectangles overlap",
            ));
        }

        let src_frame = {
            let image = self
                .store
                .get(id)
                .ok_or_else(|| GraphicsError::enoent("image vanished"))?;
            if src_idx == 1 {
                image
                    .data
                    .clone()
                    .ok_or_else(|| GraphicsError::enoent("image has no data"))?
            } else {
                image
                    .animation
                    .frames
                    .get(src_idx - 2)
                    .map(|f| f.data.clone())
                    .ok_or_else(|| GraphicsError::enoent(format!("no frame {src_idx}")))?
            }
        };

        let image = self
            .store
            .get_mut(id)
            .ok_or_else(|| GraphicsError::enoent("image vanished"))?;
        let dst = if dst_idx == 1 {
            image
                .data
                .as_mut()
                .ok_or_else(|| GraphicsError::enoent("image has no data"))?
        } else {
            image
                .animation
                .frames
                .get_mut(dst_idx - 2)
                .map(|f| &mut f.data)
                .ok_or_else(|| GraphicsError::enoent(format!("no frame {dst_idx}")))?
        };
        compose_rect(dst, &src_frame, rect, dst_pos, cmd.replace_compose)
    }
}

fn decode_path(payload: &[u8]) -> Result<String, GraphicsError> {
    let decoded = BASE64
        .decode(payload)
        .map_err(|e| GraphicsError::einval(format!("bad base64 path: {e}")))?;
    String::from_utf8(decoded).map_err(|_| GraphicsError::einval("path is not UTF-8"))
}

fn intersects_cell(p: &Placement, extent: (u32, u32), row: usize, col: usize) -> bool {
    if p.is_virtual {
        return false;
    }
    p.row <= row
        && row < p.row + extent.1 as usize
        && p.col <= col
        && col < p.col + extent.0 as usize
}

fn rects_overlap(a: (u32, u32, u32, u32), b: (u32, u32, u32, u32)) -> bool {
    a.0 < b.0 + b.2 && b.0 < a.0 + a.2 && a.1 < b.1 + b.3 && b.1 < a.1 + a.3
}
