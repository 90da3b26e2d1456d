//! SGR (select graphic rendition) application.
//!
//! Handles both parameter grammars: colon sub-parameters
//! (`38:2:r:g:b`, `4:3`) and the legacy semicolon form
//! (`38;2;r;g;b`). Unknown attributes are ignored.

use tracing::debug;

use vtgrid::cell::{CellFlags, Color, UnderlineStyle};
use vtparse::params::Params;

use crate::screen::Screen;

pub(crate) fn apply_sgr(screen: &mut Screen, params: &Params) {
    let attrs = &mut screen.grid_mut().cursor.attrs;
    if params.is_empty() {
        attrs.reset();
        return;
    }

    let groups: Vec<&[u32]> = params.iter().collect();
    let mut i = 0;
    while i < groups.len() {
        let group = groups[i];
        match group[0] {
            0 => attrs.reset(),
            1 => attrs.flags |= CellFlags::BOLD,
            2 => attrs.flags |= CellFlags::FAINT,
            3 => attrs.flags |= CellFlags::ITALIC,
            4 => {
                // `4:n` selects a style; bare `4` is a straight
                // underline.
                let style = group
                    .get(1)
                    .copied()
                    .map_or(Some(UnderlineStyle::Straight), UnderlineStyle::from_param);
                if let Some(style) = style {
                    attrs.underline = style;
                } else {
                    debug!(param = ?group, "ignoring unknown underline style");
                }
            }
            7 => attrs.flags |= CellFlags::REVERSE,
            8 => attrs.flags |= CellFlags::CONCEAL,
            9 => attrs.flags |= CellFlags::STRIKETHROUGH,
            21 => attrs.underline = UnderlineStyle::Double,
            22 => attrs.flags -= CellFlags::BOLD | CellFlags::FAINT,
            23 => attrs.flags -= CellFlags::ITALIC,
            24 => attrs.underline = UnderlineStyle::None,
            27 => attrs.flags -= CellFlags::REVERSE,
            28 => attrs.flags -= CellFlags::CONCEAL,
            29 => attrs.flags -= CellFlags::STRIKETHROUGH,
            30..=37 => attrs.fg = Color::Indexed((group[0] - 30) as u8),
            38 => {
                if let Some(color) = parse_color(&groups, &mut i) {
                    attrs.fg = color;
                }
            }
            39 => attrs.fg = Color::Default,
            40..=47 => attrs.bg = Color::Indexed((group[0] - 40) as u8),
            48 => {
                if let Some(color) = parse_color(&groups, &mut i) {
                    attrs.bg = color;
                }
            }
            49 => attrs.bg = Color::Default,
            58 => {
                if let Some(color) = parse_color(&groups, &mut i) {
                    attrs.underline_color = color;
                }
            }
            59 => attrs.underline_color = Color::Default,
            90..=97 => attrs.fg = Color::Indexed((group[0] - 90 + 8) as u8),
            100..=107 => attrs.bg = Color::Indexed((group[0] - 100 + 8) as u8),
            other => debug!(attr = other, "ignoring SGR attribute"),
        }
        i += 1;
    }
}

/// Parse the extended-color grammar at `groups[*i]` (which starts
/// with 38/48/58). Advances `*i` past consumed semicolon groups.
fn parse_color(groups: &[&[u32]], i: &mut usize) -> Option<Color> {
    let group = groups[*i];
    if group.len() > 1 {
        // Colon form, all in one group.
        return match group[1] {
            2 => {
                // `38:2:r:g:b` or `38:2::r:g:b` with a colorspace id.
                let rgb = if group.len() >= 6 {
                    &group[3..6]
                } else if group.len() >= 5 {
                    &group[2..5]
                } else {
                    return None;
                };
                Some(Color::Rgb(
                    clamp_u8(rgb[0]),
                    clamp_u8(rgb[1]),
                    clamp_u8(rgb[2]),
                ))
            }
            5 => group.get(2).map(|&n| Color::Indexed(clamp_u8(n))),
            _ => None,
        };
    }

    // Semicolon form: the selector and payload are separate groups.
    let selector = groups.get(*i + 1).map(|g| g[0])?;
    match selector {
        2 => {
            if *i + 4 < groups.len() {
                let color = Color::Rgb(
                    clamp_u8(groups[*i + 2][0]),
                    clamp_u8(groups[*i + 3][0]),
                    clamp_u8(groups[*i + 4][0]),
                );
                *i += 4;
                Some(color)
            } else {
                None
            }
        }
        5 => {
            let color = groups.get(*i + 2).map(|g| Color::Indexed(clamp_u8(g[0])));
            if color.is_some() {
                *i += 2;
            }
            color
        }
        _ => None,
    }
}

fn clamp_u8(v: u32) -> u8 {
    u8::try_from(v.min(255)).unwrap_or(255)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::{Screen, ScreenConfig};
    use pretty_assertions::assert_eq;
    use vtgrid::cell::Attrs;

    fn apply(input: &str) -> Attrs {
        let mut screen = Screen::new(4, 10, ScreenConfig::default());
        let mut params = Params::new();
        for b in input.bytes() {
            match b {
                b'0'..=b'9' => params.push_digit(b - b'0'),
                b';' => params.separator(false),
                b':' => params.separator(true),
                _ => {}
            }
        }
        params.finish();
        apply_sgr(&mut screen, &params);
        screen.grid().cursor.attrs
    }

    #[test]
    fn reset_and_flags() {
        let attrs = apply("1;3;9");
        assert!(attrs.flags.contains(CellFlags::BOLD));
        assert!(attrs.flags.contains(CellFlags::ITALIC));
        assert!(attrs.flags.contains(CellFlags::STRIKETHROUGH));
        assert_eq!(apply("1;0"), Attrs::default());
    }

    #[test]
    fn underline_styles() {
        assert_eq!(apply("4").underline, UnderlineStyle::Straight);
        assert_eq!(apply("4:3").underline, UnderlineStyle::Curly);
        assert_eq!(apply("4:0").underline, UnderlineStyle::None);
        assert_eq!(apply("21").underline, UnderlineStyle::Double);
        assert_eq!(apply("4:3;24").underline, UnderlineStyle::None);
    }

    #[test]
    fn basic_and_bright_colors() {
        assert_eq!(apply("31").fg, Color::Indexed(1));
        assert_eq!(apply("94").fg, Color::Indexed(12));
        assert_eq!(apply("41").bg, Color::Indexed(1));
        assert_eq!(apply("31;39").fg, Color::Default);
    }

    #[test]
    fn truecolor_semicolon_form() {
        let attrs = apply("38;2;255;128;0");
        assert_eq!(attrs.fg, Color::Rgb(255, 128, 0));
    }

    #[test]
    fn truecolor_colon_form() {
        assert_eq!(apply("38:2:255:128:0").fg, Color::Rgb(255, 128, 0));
        // With a colorspace id.
        assert_eq!(apply("38:2::255:128:0").fg, Color::Rgb(255, 128, 0));
    }

    #[test]
    fn indexed_256() {
        assert_eq!(apply("38;5;123").fg, Color::Indexed(123));
        assert_eq!(apply("48:5:200").bg, Color::Indexed(200));
    }

    #[test]
    fn underline_color() {
        let attrs = apply("58:2:255:0:0");
        assert_eq!(attrs.underline_color, Color::Rgb(255, 0, 0));
        assert_eq!(apply("58:2:255:0:0;59").underline_color, Color::Default);
    }

    #[test]
    fn semicolon_color_consumes_following_params() {
        // The bold after the truecolor sequence must still apply.
        let attrs = apply("38;2;1;2;3;1");
        assert_eq!(attrs.fg, Color::Rgb(1, 2, 3));
        assert!(attrs.flags.contains(CellFlags::BOLD));
    }

    #[test]
    fn malformed_extended_color_ignored() {
        let attrs = apply("38;9;4");
        assert_eq!(attrs.fg, Color::Default);
    }
}
