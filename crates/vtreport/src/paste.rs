//! Paste encoding: bracketed markers and control filtering.

use crate::InputModes;

/// Paste-handling policy.
#[derive(Debug, Clone, Copy)]
pub struct PasteConfig {
    /// Replace embedded newlines with carriage returns.
    pub newline_to_cr: bool,
    /// Drop C0/C1 controls from unbracketed pastes (ESC always goes).
    pub filter_controls: bool,
}

impl Default for PasteConfig {
    fn default() -> Self {
        Self {
            newline_to_cr: true,
            filter_controls: true,
        }
    }
}

/// Serialize pasted text per the bracketed-paste mode and policy.
#[must_use]
pub fn encode_paste(text: &str, modes: &InputModes, config: &PasteConfig) -> Vec<u8> {
    let mut body = String::with_capacity(text.len());
    for ch in text.chars() {
        let ch = if config.newline_to_cr && ch == '\n' {
            '\r'
        } else {
            ch
        };
        if modes.bracketed_paste {
            // Inside brackets only the bracket-closing sequence is
            // dangerous; strip ESC so a paste cannot fake it.
            if ch == '\u{1b}' {
                continue;
            }
            body.push(ch);
        } else {
            let is_control = ch.is_control() && ch != '\r' && ch != '\t';
            if config.filter_controls && is_control {
                continue;
            }
            if ch == '\u{1b}' {
                continue;
            }
            body.push(ch);
        }
    }

    if modes.bracketed_paste {
        let mut out = Vec::with_capacity(body.len() + 12);
        out.extend_from_slice(b"\x1b[200~");
        out.extend_from_slice(body.as_bytes());
        out.extend_from_slice(b"\x1b[201~");
        out
    } else {
        body.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bracketed() -> InputModes {
        InputModes {
            bracketed_paste: true,
            ..InputModes::default()
        }
    }

    #[test]
    fn bracketed_paste_is_wrapped() {
        let out = encode_paste("hi", &bracketed(), &PasteConfig::default());
        assert_eq!(out, b"\x1b[200~hi\x1b[201~");
    }

    #[test]
    fn newline_becomes_cr() {
        let out = encode_paste("a\nb", &bracketed(), &PasteConfig::default());
        assert_eq!(out, b"\x1b[200~a\rb\x1b[201~");

        let keep = PasteConfig {
            newline_to_cr: false,
            ..PasteConfig::default()
        };
        let out = encode_paste("a\nb", &bracketed(), &keep);
        assert_eq!(out, b"\x1b[200~a\nb\x1b[201~");
    }

    #[test]
    fn esc_never_survives_a_paste() {
        let out = encode_paste("x\x1b[201~y", &bracketed(), &PasteConfig::default());
        assert_eq!(out, b"\x1b[200~x[201~y\x1b[201~");
    }

    #[test]
    fn unbracketed_controls_filtered_by_policy() {
        let modes = InputModes::default();
        let out = encode_paste("a\x07b\tc", &modes, &PasteConfig::default());
        assert_eq!(out, b"ab\tc");

        let relaxed = PasteConfig {
            filter_controls: false,
            ..PasteConfig::default()
        };
        let out = encode_paste("a\x07b", &modes, &relaxed);
        assert_eq!(out, b"a\x07b");
    }
}
