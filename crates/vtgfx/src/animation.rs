//! Animation frames and playback state.

use crate::error::GraphicsError;
use crate::image::ImageData;

/// What a new frame is composited onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBase {
    /// A solid background color (RGBA, `b=` key).
    Background(u32),
    /// A previously transmitted frame (1-based, `g=` key).
    Frame(u32),
}

/// One animation frame, materialized as a full canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Canvas pixels, same dimensions as the root image.
    pub data: ImageData,
    /// Milliseconds to show this frame. Zero means "gapless": the
    /// frame is skipped without display. Negative also skips.
    pub gap_ms: i32,
}

/// Playback state driven by `a=a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    /// Waiting for more frames; the client is still loading.
    Loading,
    Running,
}

impl PlaybackState {
    #[must_use]
    pub fn from_value(v: u32) -> Self {
        match v {
            2 => Self::Loading,
            3 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

/// Animation bookkeeping attached to an image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Animation {
    pub frames: Vec<Frame>,
    pub state: PlaybackState,
    /// Loop count; zero leaves the current value, one means loop
    /// forever, n > 1 runs n - 1 repeats.
    pub loops: u32,
    /// Frame currently displayed (1-based; 0 = root image).
    pub current: u32,
}

impl Animation {
    #[must_use]
    pub fn frame_bytes(&self) -> usize {
        self.frames.iter().map(|f| f.data.byte_size()).sum()
    }
}

/// Alpha-blend `src` over `dst` in place (premultiplied-free,
/// straight-alpha blending on byte channels).
pub fn blend_rgba(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let sa = u32::from(s[3]);
        if sa == 255 {
            d.copy_from_slice(s);
            continue;
        }
        if sa == 0 {
            continue;
        }
        let da = u32::from(d[3]);
        let out_a = sa + da * (255 - sa) / 255;
        for i in 0..3 {
            let sc = u32::from(s[i]);
            let dc = u32::from(d[i]);
            let num = sc * sa + dc * da * (255 - sa) / 255;
            d[i] = if out_a == 0 {
                0
            } else {
                u8::try_from(num / out_a).unwrap_or(255)
            };
        }
        d[3] = u8::try_from(out_a).unwrap_or(255);
    }
}

/// Copy or blend a source rectangle onto a canvas.
///
/// # Errors
///
/// `EINVAL` when the rectangle falls outside either buffer.
pub fn compose_rect(
    canvas: &mut ImageData,
    src: &ImageData,
    src_rect: (u32, u32, u32, u32),
    dst_pos: (u32, u32),
    replace: bool,
) -> Result<(), GraphicsError> {
    let (sx, sy, w, h) = src_rect;
    let (dx, dy) = dst_pos;
    if sx + w > src.width
        || sy + h > src.height
        || dx + w > canvas.width
        || dy + h > canvas.height
    {
        return Err(GraphicsError::einval("compose rectangle out of bounds"));
    }
    for row in 0..h {
        let src_start = (((sy + row) * src.width + sx) * 4) as usize;
        let dst_start = (((dy + row) * canvas.width + dx) * 4) as usize;
        let len = (w * 4) as usize;
        let src_row = &src.pixels[src_start..src_start + len];
        let dst_row = &mut canvas.pixels[dst_start..dst_start + len];
        if replace {
            dst_row.copy_from_slice(src_row);
        } else {
            blend_rgba(dst_row, src_row);
        }
    }
    canvas.has_transparency = canvas.pixels.chunks_exact(4).any(|px| px[3] != 0xFF);
    Ok(())
}

/// A solid-color canvas for background-based frames.
#[must_use]
pub fn solid_canvas(width: u32, height: u32, rgba: u32) -> ImageData {
    let [r, g, b, a] = rgba.to_be_bytes();
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..width * height {
        pixels.extend_from_slice(&[r, g, b, a]);
    }
    ImageData {
        width,
        height,
        pixels,
        has_transparency: a != 0xFF,
    }
}
