//! Parsing of APC `G` control data.
//!
//! The control data is `key=value` pairs separated by commas, ending
//! at an optional `;` that introduces the base64 body. Unknown keys
//! are ignored; malformed values fail the whole command with `EINVAL`.

use vtenc::parse_int;

use crate::error::GraphicsError;

/// The `a=` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// `t`: transmit image data.
    #[default]
    Transmit,
    /// `T`: transmit and display in one step.
    TransmitAndDisplay,
    /// `p`: display previously transmitted data.
    Put,
    /// `d`: delete images or placements.
    Delete,
    /// `f`: transmit an animation frame.
    Frame,
    /// `a`: control animation playback.
    Animate,
    /// `c`: compose animation frames.
    Compose,
    /// `q`: query support without storing anything.
    Query,
}

/// The `t=` transmission medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Medium {
    /// `d`: payload carried in-band, base64 encoded.
    #[default]
    Direct,
    /// `f`: payload is a file path.
    File,
    /// `t`: like `f` but the terminal unlinks the file after reading.
    TempFile,
    /// `s`: POSIX shared-memory object, unlinked after reading.
    SharedMemory,
}

/// The `f=` pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 24-bit RGB.
    Rgb,
    /// 32-bit RGBA in sRGB (the default).
    #[default]
    Rgba,
    /// PNG; dimensions come from the image itself.
    Png,
}

impl PixelFormat {
    #[must_use]
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Rgb => Some(3),
            PixelFormat::Rgba => Some(4),
            PixelFormat::Png => None,
        }
    }
}

/// The `o=` payload compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    /// `z`: RFC 1950 zlib.
    Zlib,
}

/// The `d=` delete specifier. Uppercase variants also free the pixel
/// data; lowercase variants keep it for later re-display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteSpec {
    /// `a`: all visible placements.
    #[default]
    All,
    /// `i`: by image id (and optional placement id).
    ById,
    /// `n`: newest image with the given number.
    ByNumber,
    /// `c`: placements intersecting the cursor.
    AtCursor,
    /// `f`: animation frames of an image.
    Frames,
    /// `p`: placements intersecting a cell.
    AtCell,
    /// `q`: placements intersecting a cell with a z-index.
    AtCellWithZ,
    /// `r`: images whose id falls in `[x, y]`.
    IdRange,
    /// `x`: placements intersecting a column.
    AtColumn,
    /// `y`: placements intersecting a row.
    AtRow,
    /// `z`: placements at a z-index.
    AtZ,
}

/// A parsed graphics command: every key the protocol defines, with
/// protocol defaults for the ones the client omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsCommand {
    pub action: Action,
    pub quiet: u32,
    pub medium: Medium,
    pub format: PixelFormat,
    pub compression: Compression,
    /// `m=`: more chunks follow for this command.
    pub more: bool,
    /// `i=`: explicit image id.
    pub image_id: Option<u32>,
    /// `I=`: image number (terminal allocates the id).
    pub image_number: Option<u32>,
    /// `p=`: placement id.
    pub placement_id: Option<u32>,
    /// `s=`, `v=`: source width/height in pixels.
    pub width: u32,
    pub height: u32,
    /// `S=`, `O=`: payload size/offset for file media.
    pub data_size: u32,
    pub data_offset: u32,
    /// `x=`, `y=`, `w=`, `h=`: source rectangle.
    pub src_x: u32,
    pub src_y: u32,
    pub src_w: u32,
    pub src_h: u32,
    /// `X=`, `Y=`: pixel offset within the first cell.
    pub cell_x_offset: u32,
    pub cell_y_offset: u32,
    /// `c=`, `r=`: destination size in cells.
    pub columns: u32,
    pub rows: u32,
    /// `z=`: stacking order.
    pub z_index: i32,
    /// `C=1`: do not move the cursor after display.
    pub cursor_stays: bool,
    /// `U=1`: virtual placement for Unicode placeholders.
    pub unicode_placeholder: bool,
    /// `P=`, `Q=`: parent image/placement for relative placements.
    pub parent_image: Option<u32>,
    pub parent_placement: Option<u32>,
    /// `H=`, `V=`: cell offset from the parent.
    pub rel_x: i32,
    pub rel_y: i32,
    /// `d=` delete specifier plus whether data is freed (uppercase).
    pub delete: DeleteSpec,
    pub delete_frees: bool,
    /// Frame keys: `r=` is overloaded for frames (frame number); kept
    /// separately after parse by action.
    /// `g=`: base frame, `b=`: background color, `X=1` on compose:
    /// replace instead of blend, `Z=`: gap in ms.
    pub frame_gap: i32,
    pub frame_base: u32,
    pub frame_number: u32,
    pub background: u32,
    pub replace_compose: bool,
    /// `s=` on `a=a`: animation state control.
    pub anim_state: u32,
    /// `v=` on `a=a`: loop count.
    pub loops: u32,
}

impl Default for GraphicsCommand {
    fn default() -> Self {
        Self {
            action: Action::default(),
            quiet: 0,
            medium: Medium::default(),
            format: PixelFormat::default(),
            compression: Compression::default(),
            more: false,
            image_id: None,
            image_number: None,
            placement_id: None,
            width: 0,
            height: 0,
            data_size: 0,
            data_offset: 0,
            src_x: 0,
            src_y: 0,
            src_w: 0,
            src_h: 0,
            cell_x_offset: 0,
            cell_y_offset: 0,
            columns: 0,
            rows: 0,
            z_index: 0,
            cursor_stays: false,
            unicode_placeholder: false,
            parent_image: None,
            parent_placement: None,
            rel_x: 0,
            rel_y: 0,
            delete: DeleteSpec::default(),
            delete_frees: false,
            frame_gap: 0,
            frame_base: 0,
            frame_number: 0,
            background: 0,
            replace_compose: false,
            anim_state: 0,
            loops: 0,
        }
    }
}

impl GraphicsCommand {
    /// Parse the control-data portion (everything between `G` and the
    /// `;` that starts the payload).
    ///
    /// # Errors
    ///
    /// `EINVAL` for malformed numbers or contradictory keys.
    pub fn parse(control: &[u8]) -> Result<Self, GraphicsError> {
        let mut cmd = Self::default();
        for item in control.split(|&b| b == b',') {
            if item.is_empty() {
                continue;
            }
            let mut halves = item.splitn(2, |&b| b == b'=');
            let key = halves.next().unwrap_or(b"");
            let Some(value) = halves.next() else {
                return Err(GraphicsError::einval(format!(
                    "malformed key=value pair: {}",
                    String::from_utf8_lossy(item)
                )));
            };
            cmd.apply(key, value)?;
        }
        if cmd.image_id.is_some() && cmd.image_number.is_some() {
            return Err(GraphicsError::einval(
                "i and I are mutually exclusive",
            ));
        }
        Ok(cmd)
    }

    #[allow(clippy::too_many_lines)]
    fn apply(&mut self, key: &[u8], value: &[u8]) -> Result<(), GraphicsError> {
        let num = |value: &[u8]| -> Result<u32, GraphicsError> {
            parse_int::<u32>(value)
                .map_err(|e| GraphicsError::einval(format!("bad numeric value: {e}")))
        };
        let snum = |value: &[u8]| -> Result<i32, GraphicsError> {
            parse_int::<i32>(value)
                .map_err(|e| GraphicsError::einval(format!("bad numeric value: {e}")))
        };
        let letter = |value: &[u8]| -> Result<u8, GraphicsError> {
            if value.len() == 1 {
                Ok(value[0])
            } else {
                Err(GraphicsError::einval("single-character value expected"))
            }
        };

        match key {
            b"a" => {
                self.action = match letter(value)? {
                    b't' => Action::Transmit,
                    b'T' => Action::TransmitAndDisplay,
                    b'p' => Action::Put,
                    b'd' => Action::Delete,
                    b'f' => Action::Frame,
                    b'a' => Action::Animate,
                    b'c' => Action::Compose,
                    b'q' => Action::Query,
                    other => {
                        return Err(GraphicsError::einval(format!(
                            "unknown action: {}",
                            other as char
                        )));
                    }
                };
            }
            b"q" => self.quiet = num(value)?,
            b"t" => {
                self.medium = match letter(value)? {
                    b'd' => Medium::Direct,
                    b'f' => Medium::File,
                    b't' => Medium::TempFile,
                    b's' => Medium::SharedMemory,
                    other => {
                        return Err(GraphicsError::einval(format!(
                            "unknown transmission medium: {}",
                            other as char
                        )));
                    }
                };
            }
            b"f" => {
                self.format = match num(value)? {
                    24 => PixelFormat::Rgb,
                    32 => PixelFormat::Rgba,
                    100 => PixelFormat::Png,
                    other => {
                        return Err(GraphicsError::einval(format!(
                            "unknown format: {other}"
                        )));
                    }
                };
            }
            b"o" => {
                self.compression = match letter(value)? {
                    b'z' => Compression::Zlib,
                    other => {
                        return Err(GraphicsError::einval(format!(
                            "unknown compression: {}",
                            other as char
                        )));
                    }
                };
            }
            b"m" => self.more = num(value)? == 1,
            b"i" => self.image_id = Some(num(value)?),
            b"I" => self.image_number = Some(num(value)?),
            b"p" => self.placement_id = Some(num(value)?),
            b"s" => {
                // Overloaded: pixel width for transmits, animation
                // state for `a=a`. Disambiguated at dispatch.
                self.width = num(value)?;
                self.anim_state = self.width;
            }
            b"v" => {
                self.height = num(value)?;
                self.loops = self.height;
            }
            b"S" => self.data_size = num(value)?,
            b"O" => self.data_offset = num(value)?,
            b"x" => self.src_x = num(value)?,
            b"y" => self.src_y = num(value)?,
            b"w" => self.src_w = num(value)?,
            b"h" => self.src_h = num(value)?,
            b"X" => {
                self.cell_x_offset = num(value)?;
                self.replace_compose = self.cell_x_offset == 1;
            }
            b"Y" => self.cell_y_offset = num(value)?,
            b"c" => {
                self.columns = num(value)?;
                // Overloaded as the frame to compose from on `a=c`.
                self.frame_base = self.columns;
            }
            b"r" => {
                self.rows = num(value)?;
                self.frame_number = self.rows;
            }
            b"z" => {
                self.z_index = snum(value)?;
                self.frame_gap = self.z_index;
            }
            b"C" => self.cursor_stays = num(value)? == 1,
            b"U" => self.unicode_placeholder = num(value)? == 1,
            b"P" => self.parent_image = Some(num(value)?),
            b"Q" => self.parent_placement = Some(num(value)?),
            b"H" => self.rel_x = snum(value)?,
            b"V" => self.rel_y = snum(value)?,
            b"b" => self.background = num(value)?,
            b"d" => {
                let v = letter(value)?;
                self.delete_frees = v.is_ascii_uppercase();
                self.delete = match v.to_ascii_lowercase() {
                    b'a' => DeleteSpec::All,
                    b'i' => DeleteSpec::ById,
                    b'n' => DeleteSpec::ByNumber,
                    b'c' => DeleteSpec::AtCursor,
                    b'f' => DeleteSpec::Frames,
                    b'p' => DeleteSpec::AtCell,
                    b'q' => DeleteSpec::AtCellWithZ,
                    b'r' => DeleteSpec::IdRange,
                    b'x' => DeleteSpec::AtColumn,
                    b'y' => DeleteSpec::AtRow,
                    b'z' => DeleteSpec::AtZ,
                    other => {
                        return Err(GraphicsError::einval(format!(
                            "unknown delete specifier: {}",
                            other as char
                        )));
                    }
                };
            }
            // Unknown keys are ignored per protocol.
            _ => {}
        }
        Ok(())
    }
}
