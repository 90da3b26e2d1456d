//! Cell contents and visual attributes.

use bitflags::bitflags;

/// A foreground, background, or underline color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Color {
    /// The configured default for its role.
    #[default]
    Default,
    /// One of the 256 palette entries.
    Indexed(u8),
    /// 24-bit truecolor.
    Rgb(u8, u8, u8),
}

/// Underline rendering style, per the extended `CSI 4 : n m` grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum UnderlineStyle {
    #[default]
    None = 0,
    Straight = 1,
    Double = 2,
    Curly = 3,
    Dotted = 4,
    Dashed = 5,
}

impl UnderlineStyle {
    /// Map the sub-parameter of `CSI 4 : n m`; out-of-range is ignored
    /// by callers.
    #[must_use]
    pub fn from_param(n: u32) -> Option<Self> {
        match n {
            0 => Some(Self::None),
            1 => Some(Self::Straight),
            2 => Some(Self::Double),
            3 => Some(Self::Curly),
            4 => Some(Self::Dotted),
            5 => Some(Self::Dashed),
            _ => None,
        }
    }
}

bitflags! {
    /// Boolean cell attributes plus width markers.
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(transparent))]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CellFlags: u16 {
        const BOLD          = 0b0000_0000_0001;
        const FAINT         = 0b0000_0000_0010;
        const ITALIC        = 0b0000_0000_0100;
        const REVERSE       = 0b0000_0000_1000;
        const CONCEAL       = 0b0000_0001_0000;
        const STRIKETHROUGH = 0b0000_0010_0000;
        /// Left half of a double-width character.
        const WIDE          = 0b0000_0100_0000;
        /// Non-owning right half of a double-width character.
        const WIDE_CONT     = 0b0000_1000_0000;
    }
}

/// Attribute bits that SGR state carries onto newly written cells.
const SGR_FLAGS: CellFlags = CellFlags::BOLD
    .union(CellFlags::FAINT)
    .union(CellFlags::ITALIC)
    .union(CellFlags::REVERSE)
    .union(CellFlags::CONCEAL)
    .union(CellFlags::STRIKETHROUGH);

/// The cursor's current character attributes, applied to printables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attrs {
    pub fg: Color,
    pub bg: Color,
    pub flags: CellFlags,
    pub underline: UnderlineStyle,
    pub underline_color: Color,
    /// Interned hyperlink id; 0 means none.
    pub hyperlink: u32,
}

impl Attrs {
    /// Reset to defaults (SGR 0), keeping nothing.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Maximum combining scalars stored per cell.
pub const MAX_COMBINING: usize = 3;

/// One grid position. Plain data; copying a cell copies the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cell {
    /// Primary code point; NUL means the cell is empty.
    pub ch: char,
    /// Combining code points attached to `ch`, NUL-padded.
    pub combining: [char; MAX_COMBINING],
    pub fg: Color,
    pub bg: Color,
    pub underline_color: Color,
    pub flags: CellFlags,
    pub underline: UnderlineStyle,
    /// Interned hyperlink id; 0 means none.
    pub hyperlink: u32,
}

impl Default for Cell {
    fn default() -> Self {
        Self::BLANK
    }
}

impl Cell {
    /// An empty cell with default attributes.
    pub const BLANK: Self = Self {
        ch: '\0',
        combining: ['\0'; MAX_COMBINING],
        fg: Color::Default,
        bg: Color::Default,
        underline_color: Color::Default,
        flags: CellFlags::empty(),
        underline: UnderlineStyle::None,
        hyperlink: 0,
    };

    /// A printable cell carrying the cursor's attributes.
    #[must_use]
    pub fn new(ch: char, attrs: Attrs) -> Self {
        Self {
            ch,
            combining: ['\0'; MAX_COMBINING],
            fg: attrs.fg,
            bg: attrs.bg,
            underline_color: attrs.underline_color,
            flags: attrs.flags & SGR_FLAGS,
            underline: attrs.underline,
            hyperlink: attrs.hyperlink,
        }
    }

    /// An erased cell: blank content, but keeping the background color
    /// of the erasing attributes (background-color-erase).
    #[must_use]
    pub fn erased(attrs: Attrs) -> Self {
        Self {
            bg: attrs.bg,
            ..Self::BLANK
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ch == '\0'
    }

    #[must_use]
    pub fn is_wide(&self) -> bool {
        self.flags.contains(CellFlags::WIDE)
    }

    #[must_use]
    pub fn is_wide_continuation(&self) -> bool {
        self.flags.contains(CellFlags::WIDE_CONT)
    }

    /// Attach a combining scalar; silently dropped when full.
    pub fn push_combining(&mut self, ch: char) {
        for slot in &mut self.combining {
            if *slot == '\0' {
                *slot = ch;
                return;
            }
        }
    }

    /// The attached combining scalars.
    pub fn combining_chars(&self) -> impl Iterator<Item = char> + '_ {
        self.combining.iter().copied().filter(|&c| c != '\0')
    }

    /// Attributes equivalent to this cell's, for serialization deltas.
    #[must_use]
    pub fn attrs(&self) -> Attrs {
        Attrs {
            fg: self.fg,
            bg: self.bg,
            flags: self.flags & SGR_FLAGS,
            underline: self.underline,
            underline_color: self.underline_color,
            hyperlink: self.hyperlink,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn blank_cell_is_empty() {
        assert!(Cell::BLANK.is_empty());
        assert_eq!(Cell::BLANK.attrs(), Attrs::default());
    }

    #[test]
    fn new_cell_strips_width_flags_from_attrs() {
        let attrs = Attrs {
            flags: CellFlags::BOLD | CellFlags::WIDE,
            ..Attrs::default()
        };
        let cell = Cell::new('x', attrs);
        assert!(cell.flags.contains(CellFlags::BOLD));
        assert!(!cell.flags.contains(CellFlags::WIDE));
    }

    #[test]
    fn combining_capacity_is_bounded() {
        let mut cell = Cell::new('e', Attrs::default());
        for _ in 0..5 {
            cell.push_combining('\u{0301}');
        }
        assert_eq!(cell.combining_chars().count(), MAX_COMBINING);
    }

    #[test]
    fn erased_cell_keeps_background() {
        let attrs = Attrs {
            bg: Color::Indexed(4),
            fg: Color::Indexed(7),
            ..Attrs::default()
        };
        let cell = Cell::erased(attrs);
        assert!(cell.is_empty());
        assert_eq!(cell.bg, Color::Indexed(4));
        assert_eq!(cell.fg, Color::Default);
    }
}
