//! Parsed-token callbacks.

use crate::params::Params;

/// Which control-string envelope a payload arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringKind {
    /// Application Program Command (`ESC _`). Carries the graphics
    /// protocol when the payload begins with `G`.
    Apc,
    /// Privacy Message (`ESC ^`).
    Pm,
    /// Start of String (`ESC X`).
    Sos,
}

/// Receiver for the parser's token stream.
///
/// The parser borrows payloads from its internal accumulators, so
/// implementations must copy anything they keep. Methods have empty or
/// forwarding defaults where a consumer may not care.
pub trait TokenSink {
    /// One printable scalar reached the ground state.
    fn print(&mut self, ch: char);

    /// A validated run of printable ASCII. The default forwards to
    /// [`TokenSink::print`] per scalar; the screen overrides this to
    /// blit runs.
    fn print_run(&mut self, text: &str) {
        for ch in text.chars() {
            self.print(ch);
        }
    }

    /// A C0 control or DEL executed in place.
    fn execute(&mut self, control: u8);

    /// `ESC` sequence without parameters (includes the C1 aliases
    /// IND, NEL, HTS, RI, and friends).
    fn esc_dispatch(&mut self, intermediates: &[u8], byte: u8);

    /// Complete CSI sequence.
    fn csi_dispatch(
        &mut self,
        private: Option<u8>,
        params: &Params,
        intermediates: &[u8],
        final_byte: u8,
    );

    /// Complete OSC string. `cmd` is the leading numeric command when
    /// present; `payload` is everything after the first `;`.
    fn osc_dispatch(&mut self, cmd: Option<u32>, payload: &[u8], bell_terminated: bool);

    /// Complete DCS string with its header and payload.
    fn dcs_dispatch(
        &mut self,
        private: Option<u8>,
        params: &Params,
        intermediates: &[u8],
        final_byte: u8,
        payload: &[u8],
    );

    /// Complete APC/PM/SOS string.
    fn string_dispatch(&mut self, kind: StringKind, payload: &[u8]);

    /// SUB aborted a sequence; the reference renders an error glyph.
    fn error_glyph(&mut self) {
        self.print('\u{FFFD}');
    }
}
