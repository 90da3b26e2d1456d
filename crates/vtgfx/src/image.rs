//! Image payload decoding and the file/shared-memory media.

use std::fs;
use std::io::Read;
use std::path::{Component, Path};
use std::time::{Duration, Instant};

use flate2::read::ZlibDecoder;
use tracing::warn;

use crate::command::{Compression, PixelFormat};
use crate::error::GraphicsError;

/// Decoded pixel data, always held as RGBA after ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    /// RGBA, row-major, `width * 4` bytes per row.
    pub pixels: Vec<u8>,
    /// True when any pixel has alpha < 255.
    pub has_transparency: bool,
}

impl ImageData {
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

/// Largest accepted decoded image in bytes, to bound hostile
/// allocations before the store quota can see them.
const MAX_DECODED_BYTES: usize = 512 * 1024 * 1024;

/// Maximum time spent reading one image from its medium.
pub const READ_DEADLINE: Duration = Duration::from_secs(10);

/// Decode a raw (already base64-decoded) payload into pixels.
///
/// # Errors
///
/// `EINVAL` for size mismatches and malformed PNG data, `ENOSPC` for
/// absurd dimensions.
pub fn decode_payload(
    payload: &[u8],
    format: PixelFormat,
    compression: Compression,
    width: u32,
    height: u32,
) -> Result<ImageData, GraphicsError> {
    let raw = match compression {
        Compression::None => payload.to_vec(),
        Compression::Zlib => {
            let mut out = Vec::new();
            let decoder = ZlibDecoder::new(payload);
            decoder
                .take(MAX_DECODED_BYTES as u64)
                .read_to_end(&mut out)
                .map_err(|e| GraphicsError::einval(format!("zlib decompression failed: {e}")))?;
            out
        }
    };

    match format {
        PixelFormat::Png => decode_png(&raw),
        PixelFormat::Rgb | PixelFormat::Rgba => {
            if width == 0 || height == 0 {
                return Err(GraphicsError::einval(
                    "s and v are required for raw pixel formats",
                ));
            }
            let bpp = format.bytes_per_pixel().unwrap_or(4);
            let expected = (width as usize)
                .checked_mul(height as usize)
                .and_then(|n| n.checked_mul(bpp))
                .ok_or_else(|| GraphicsError::enospc("image dimensions overflow"))?;
            if expected > MAX_DECODED_BYTES {
                return Err(GraphicsError::enospc("image too large"));
            }
            if raw.len() != expected {
                return Err(GraphicsError::einval(format!(
                    "payload size {} does not match {width}x{height} at {bpp} bytes/pixel",
                    raw.len()
                )));
            }
            let (pixels, has_transparency) = if format == PixelFormat::Rgb {
                let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
                for px in raw.chunks_exact(3) {
                    rgba.extend_from_slice(px);
                    rgba.push(0xFF);
                }
                (rgba, false)
            } else {
                let transparent = raw.chunks_exact(4).any(|px| px[3] != 0xFF);
                (raw, transparent)
            };
            Ok(ImageData {
                width,
                height,
                pixels,
                has_transparency,
            })
        }
    }
}

fn decode_png(data: &[u8]) -> Result<ImageData, GraphicsError> {
    let decoder = png::Decoder::new(data);
    let mut reader = decoder
        .read_info()
        .map_err(|e| GraphicsError::einval(format!("bad PNG header: {e}")))?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| GraphicsError::einval(format!("bad PNG data: {e}")))?;
    buf.truncate(info.buffer_size());

    let (width, height) = (info.width, info.height);
    if (width as usize)
        .saturating_mul(height as usize)
        .saturating_mul(4)
        > MAX_DECODED_BYTES
    {
        return Err(GraphicsError::enospc("PNG too large"));
    }

    let rgba = match info.color_type {
        png::ColorType::Rgba => buf,
        png::ColorType::Rgb => {
            let mut rgba = Vec::with_capacity(buf.len() / 3 * 4);
            for px in buf.chunks_exact(3) {
                rgba.extend_from_slice(px);
                rgba.push(0xFF);
            }
            rgba
        }
        png::ColorType::Grayscale => {
            let mut rgba = Vec::with_capacity(buf.len() * 4);
            for &g in &buf {
                rgba.extend_from_slice(&[g, g, g, 0xFF]);
            }
            rgba
        }
        png::ColorType::GrayscaleAlpha => {
            let mut rgba = Vec::with_capacity(buf.len() * 2);
            for px in buf.chunks_exact(2) {
                rgba.extend_from_slice(&[px[0], px[0], px[0], px[1]]);
            }
            rgba
        }
        png::ColorType::Indexed => {
            return Err(GraphicsError::einval(
                "indexed PNG should have been expanded by the decoder",
            ));
        }
    };
    let has_transparency = rgba.chunks_exact(4).any(|px| px[3] != 0xFF);
    Ok(ImageData {
        width,
        height,
        pixels: rgba,
        has_transparency,
    })
}

/// Paths never opened regardless of file type.
const FORBIDDEN_PREFIXES: &[&str] = &["/proc", "/sys", "/dev"];

/// Marker a temp-file path must contain before the terminal will
/// unlink it after reading.
const TEMP_MARKER: &str = "tty-graphics-protocol";

/// Read an image payload from a file path medium.
///
/// Security rules: only regular files; `/proc`, `/sys`, and `/dev`
/// are refused; symlinks are followed but loops surface as I/O
/// errors. `unlink_after` additionally requires the path to carry the
/// temp-file marker and live under a known temp directory.
///
/// # Errors
///
/// `ENOENT` for missing files, `EPERM` for policy refusals, `EIO` for
/// read failures and deadline overruns.
pub fn read_file_medium(
    path: &str,
    offset: u32,
    size: u32,
    unlink_after: bool,
) -> Result<Vec<u8>, GraphicsError> {
    let path = Path::new(path);

    if unlink_after && !is_sanctioned_temp_path(path) {
        return Err(GraphicsError::eperm(
            "temp file must live in a temporary directory and contain tty-graphics-protocol",
        ));
    }

    for prefix in FORBIDDEN_PREFIXES {
        if path.starts_with(prefix) {
            return Err(GraphicsError::eperm(format!(
                "refusing to read from {prefix}"
            )));
        }
    }

    // Resolving also follows symlinks; a loop shows up as an error.
    let resolved = fs::canonicalize(path).map_err(map_io_error)?;
    for prefix in FORBIDDEN_PREFIXES {
        if resolved.starts_with(prefix) {
            return Err(GraphicsError::eperm(format!(
                "refusing to read from {prefix}"
            )));
        }
    }

    let metadata = fs::metadata(&resolved).map_err(map_io_error)?;
    if !metadata.is_file() {
        return Err(GraphicsError::eperm("only regular files may be read"));
    }

    let deadline = Instant::now() + READ_DEADLINE;
    let mut file = fs::File::open(&resolved).map_err(map_io_error)?;
    if offset > 0 {
        use std::io::Seek;
        file.seek(std::io::SeekFrom::Start(u64::from(offset)))
            .map_err(map_io_error)?;
    }
    let mut data = Vec::new();
    let mut chunk = [0u8; 64 * 1024];
    loop {
        if Instant::now() >= deadline {
            return Err(GraphicsError::eio("image read deadline exceeded"));
        }
        let n = file.read(&mut chunk).map_err(map_io_error)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
        if size > 0 && data.len() >= size as usize {
            data.truncate(size as usize);
            break;
        }
    }

    if unlink_after {
        if let Err(e) = fs::remove_file(path) {
            warn!(error = %e, "failed to unlink temp graphics file");
        }
    }
    Ok(data)
}

fn is_sanctioned_temp_path(path: &Path) -> bool {
    if !path.to_string_lossy().contains(TEMP_MARKER) {
        return false;
    }
    let tmp = std::env::temp_dir();
    path.starts_with(&tmp)
        || path.starts_with("/tmp")
        || path.starts_with("/dev/shm")
        || path
            .components()
            .any(|c| matches!(c, Component::Normal(n) if n == "tmp"))
}

fn map_io_error(e: std::io::Error) -> GraphicsError {
    match e.kind() {
        std::io::ErrorKind::NotFound => GraphicsError::enoent("no such file"),
        std::io::ErrorKind::PermissionDenied => GraphicsError::eperm("permission denied"),
        // ELOOP and friends surface here.
        _ => GraphicsError::eio(format!("read failed: {e}")),
    }
}

/// Read and unlink a POSIX shared-memory object.
///
/// Shared memory objects live in `/dev/shm` on Linux; the forbidden
/// `/dev` prefix rule deliberately does not apply to them.
///
/// # Errors
///
/// Same mapping as [`read_file_medium`].
pub fn read_shm_medium(name: &str, offset: u32, size: u32) -> Result<Vec<u8>, GraphicsError> {
    let path = if name.starts_with('/') && !name.starts_with("/dev/shm/") {
        format!("/dev/shm{name}")
    } else if name.starts_with("/dev/shm/") {
        name.to_string()
    } else {
        format!("/dev/shm/{name}")
    };
    let path_ref = Path::new(&path);
    let metadata = fs::symlink_metadata(path_ref).map_err(map_io_error)?;
    if !metadata.is_file() {
        return Err(GraphicsError::eperm("shared memory object is not regular"));
    }
    let mut file = fs::File::open(path_ref).map_err(map_io_error)?;
    if offset > 0 {
        use std::io::Seek;
        file.seek(std::io::SeekFrom::Start(u64::from(offset)))
            .map_err(map_io_error)?;
    }
    let mut data = Vec::new();
    file.read_to_end(&mut data).map_err(map_io_error)?;
    if size > 0 {
        data.truncate(size as usize);
    }
    if let Err(e) = fs::remove_file(path_ref) {
        warn!(error = %e, "failed to unlink shared memory object");
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rgb_payload_gains_opaque_alpha() {
        let data = decode_payload(
            &[1, 2, 3, 4, 5, 6],
            PixelFormat::Rgb,
            Compression::None,
            2,
            1,
        )
        .unwrap();
        assert_eq!(data.pixels, vec![1, 2, 3, 255, 4, 5, 6, 255]);
        assert!(!data.has_transparency);
    }

    #[test]
    fn rgba_size_mismatch_is_einval() {
        let err = decode_payload(&[0; 5], PixelFormat::Rgba, Compression::None, 1, 1).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Einval);
    }

    #[test]
    fn rgba_transparency_detected() {
        let data = decode_payload(
            &[9, 9, 9, 128],
            PixelFormat::Rgba,
            Compression::None,
            1,
            1,
        )
        .unwrap();
        assert!(data.has_transparency);
    }

    #[test]
    fn zlib_roundtrip() {
        use flate2::Compression as Level;
        use flate2::write::ZlibEncoder;
        use std::io::Write;
        let raw: Vec<u8> = vec![7; 16]; // 2x2 RGBA
        let mut encoder = ZlibEncoder::new(Vec::new(), Level::default());
        encoder.write_all(&raw).unwrap();
        let compressed = encoder.finish().unwrap();
        let data = decode_payload(&compressed, PixelFormat::Rgba, Compression::Zlib, 2, 2).unwrap();
        assert_eq!(data.pixels, raw);
    }

    #[test]
    fn proc_paths_refused() {
        let err = read_file_medium("/proc/self/mem", 0, 0, false).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Eperm);
    }

    #[test]
    fn missing_file_is_enoent() {
        let err = read_file_medium("/no/such/file/anywhere", 0, 0, false).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Enoent);
    }

    #[test]
    fn temp_medium_requires_marker() {
        let err = read_file_medium("/tmp/innocent.png", 0, 0, true).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Eperm);
    }

    #[test]
    fn png_decode_smoke() {
        // Encode a tiny PNG with the same crate, then decode it.
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, 2, 1);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer
                .write_image_data(&[1, 2, 3, 255, 4, 5, 6, 255])
                .unwrap();
        }
        let data = decode_payload(&out, PixelFormat::Png, Compression::None, 0, 0).unwrap();
        assert_eq!((data.width, data.height), (2, 1));
        assert_eq!(&data.pixels[..4], &[1, 2, 3, 255]);
    }
}
