//! The per-terminal image store: ids, quotas, eviction, placements.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::animation::Animation;
use crate::error::GraphicsError;
use crate::image::ImageData;
use crate::placement::{MAX_RELATIVE_DEPTH, ParentRef, Placement};

/// Store limits.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// Byte quota for root image data.
    pub quota_bytes: usize,
    /// Animation frame data gets `quota_bytes * frame_quota_multiplier`.
    pub frame_quota_multiplier: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            quota_bytes: 320 * 1024 * 1024,
            frame_quota_multiplier: 2,
        }
    }
}

/// A stored image with its placements and animation state.
#[derive(Debug, Clone)]
pub struct Image {
    pub id: u32,
    pub number: Option<u32>,
    /// Pixel data; `None` after a lowercase delete freed nothing but a
    /// placement while an uppercase delete is pending, or when only
    /// metadata remains.
    pub data: Option<ImageData>,
    pub placements: HashMap<u32, Placement>,
    pub animation: Animation,
    /// LRU tick of the most recent reference.
    pub last_used: u64,
    /// Creation order; breaks LRU ties and resolves "newest with this
    /// number".
    pub seq: u64,
}

impl Image {
    #[must_use]
    pub fn data_bytes(&self) -> usize {
        self.data.as_ref().map_or(0, ImageData::byte_size)
    }
}

/// Per-terminal image store. Never process-global; each terminal
/// instance owns one.
#[derive(Debug, Default)]
pub struct ImageStore {
    images: HashMap<u32, Image>,
    next_id: u32,
    next_seq: u64,
    tick: u64,
    config: StoreConfig,
}

impl ImageStore {
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            images: HashMap::new(),
            next_id: 0,
            next_seq: 0,
            tick: 0,
            config,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: u32) -> Option<&Image> {
        self.images.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Image> {
        self.tick += 1;
        let tick = self.tick;
        let image = self.images.get_mut(&id)?;
        image.last_used = tick;
        Some(image)
    }

    /// Total bytes of root image data currently held.
    #[must_use]
    pub fn data_bytes(&self) -> usize {
        self.images.values().map(Image::data_bytes).sum()
    }

    /// Total bytes of animation frame data currently held.
    #[must_use]
    pub fn frame_bytes(&self) -> usize {
        self.images
            .values()
            .map(|i| i.animation.frame_bytes())
            .sum()
    }

    /// Resolve an image number to the newest image carrying it.
    #[must_use]
    pub fn resolve_number(&self, number: u32) -> Option<u32> {
        self.images
            .values()
            .filter(|i| i.number == Some(number))
            .max_by_key(|i| i.seq)
            .map(|i| i.id)
    }

    /// Allocate a fresh id: monotonic, wrapping, skipping live ids.
    pub fn allocate_id(&mut self) -> u32 {
        loop {
            self.next_id = self.next_id.wrapping_add(1);
            if self.next_id == 0 {
                self.next_id = 1;
            }
            if !self.images.contains_key(&self.next_id) {
                return self.next_id;
            }
        }
    }

    /// Insert a new image, enforcing the quota first.
    ///
    /// With an explicit id, an existing image under that id is
    /// replaced (its placements survive only on replacement-by-
    /// transmit per protocol: they are dropped here and re-created by
    /// the client). A number always creates a fresh image.
    ///
    /// # Errors
    ///
    /// `ENOSPC` when the image alone exceeds the quota.
    pub fn insert(
        &mut self,
        id: Option<u32>,
        number: Option<u32>,
        data: ImageData,
    ) -> Result<u32, GraphicsError> {
        if data.byte_size() > self.config.quota_bytes {
            return Err(GraphicsError::enospc(format!(
                "image of {} bytes exceeds the {} byte quota",
                data.byte_size(),
                self.config.quota_bytes
            )));
        }
        let id = match id {
            Some(id) => {
                self.remove_image(id);
                id
            }
            None => self.allocate_id(),
        };
        self.make_room(data.byte_size());
        self.tick += 1;
        self.next_seq += 1;
        self.images.insert(
            id,
            Image {
                id,
                number,
                data: Some(data),
                placements: HashMap::new(),
                animation: Animation::default(),
                last_used: self.tick,
                seq: self.next_seq,
            },
        );
        Ok(id)
    }

    /// Evict least-recently-used images until `incoming` fits.
    /// Images without placements go first.
    fn make_room(&mut self, incoming: usize) {
        let quota = self.config.quota_bytes;
        while self.data_bytes() + incoming > quota {
            let victim = self
                .images
                .values()
                .filter(|i| i.placements.is_empty() && i.data.is_some())
                .min_by_key(|i| (i.last_used, i.seq))
                .map(|i| i.id)
                .or_else(|| {
                    self.images
                        .values()
                        .filter(|i| i.data.is_some())
                        .min_by_key(|i| (i.last_used, i.seq))
                        .map(|i| i.id)
                });
            match victim {
                Some(id) => {
                    info!(image = id, "evicting image to honor quota");
                    self.remove_image(id);
                }
                None => break,
            }
        }
        // Frames have their own, larger allowance.
        let frame_quota = quota * self.config.frame_quota_multiplier;
        while self.frame_bytes() > frame_quota {
            let victim = self
                .images
                .values()
                .filter(|i| !i.animation.frames.is_empty())
                .min_by_key(|i| (i.last_used, i.seq))
                .map(|i| i.id);
            match victim {
                Some(id) => {
                    debug!(image = id, "dropping animation frames to honor quota");
                    if let Some(image) = self.images.get_mut(&id) {
                        image.animation.frames.clear();
                    }
                }
                None => break,
            }
        }
    }

    /// Remove an image entirely, cascading to relative children.
    pub fn remove_image(&mut self, id: u32) {
        if let Some(image) = self.images.remove(&id) {
            for pid in image.placements.keys() {
                self.remove_children_of(ParentRef {
                    image_id: id,
                    placement_id: *pid,
                });
            }
        }
    }

    /// Remove a single placement, cascading to relative children. The
    /// image itself (and its data) survives.
    pub fn remove_placement(&mut self, image_id: u32, placement_id: u32) {
        let removed = self
            .images
            .get_mut(&image_id)
            .and_then(|i| i.placements.remove(&placement_id))
            .is_some();
        if removed {
            self.remove_children_of(ParentRef {
                image_id,
                placement_id,
            });
        }
    }

    fn remove_children_of(&mut self, parent: ParentRef) {
        let children: Vec<(u32, u32)> = self
            .images
            .values()
            .flat_map(|image| {
                image
                    .placements
                    .values()
                    .filter(|p| p.parent == Some(parent))
                    .map(move |p| (image.id, p.id))
            })
            .collect();
        for (image_id, placement_id) in children {
            self.remove_placement(image_id, placement_id);
        }
    }

    /// Create or replace a placement. Re-sending the same
    /// (image, placement) pair replaces it.
    ///
    /// # Errors
    ///
    /// `ENOPARENT`, `ECYCLE`, `ETOODEEP`, or `EINVAL` per the
    /// relative-placement rules.
    pub fn put_placement(
        &mut self,
        image_id: u32,
        mut placement: Placement,
    ) -> Result<(), GraphicsError> {
        if !self.images.contains_key(&image_id) {
            return Err(GraphicsError::enoent(format!("no image with id {image_id}")));
        }

        if let Some(parent) = placement.parent {
            if placement.is_virtual {
                return Err(GraphicsError::einval(
                    "a virtual placement cannot itself be relative",
                ));
            }
            let depth = self.validate_parent_chain(
                parent,
                ParentRef {
                    image_id,
                    placement_id: placement.id,
                },
            )?;
            placement.depth = depth;
        } else {
            placement.depth = 0;
        }

        self.tick += 1;
        let tick = self.tick;
        if let Some(image) = self.images.get_mut(&image_id) {
            image.last_used = tick;
            image.placements.insert(placement.id, placement);
        }
        Ok(())
    }

    /// Walk the parent chain, checking existence, depth, and cycles.
    /// Returns the depth of the new placement.
    fn validate_parent_chain(
        &self,
        parent: ParentRef,
        this: ParentRef,
    ) -> Result<u8, GraphicsError> {
        let mut depth: u8 = 1;
        let mut cursor = parent;
        loop {
            if cursor == this {
                return Err(GraphicsError::ecycle(
                    "relative placement would create a cycle",
                ));
            }
            let Some(node) = self
                .images
                .get(&cursor.image_id)
                .and_then(|i| i.placements.get(&cursor.placement_id))
            else {
                return Err(GraphicsError::enoparent(format!(
                    "no placement {} on image {}",
                    cursor.placement_id, cursor.image_id
                )));
            };
            match node.parent {
                None => break,
                Some(next) => {
                    depth += 1;
                    if depth > MAX_RELATIVE_DEPTH {
                        return Err(GraphicsError::etoodeep(format!(
                            "relative placement chain exceeds depth {MAX_RELATIVE_DEPTH}"
                        )));
                    }
                    cursor = next;
                }
            }
        }
        Ok(depth)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Image> {
        self.images.values()
    }

    /// Drop everything (session shutdown or `d=A` with no selector).
    pub fn clear(&mut self) {
        self.images.clear();
    }
}
