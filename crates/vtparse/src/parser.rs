//! The VT500-series escape-sequence state machine.
//!
//! Modeled on the published DEC parser with the extensions modern
//! terminals need: long OSC/DCS/APC payload capture, `:` sub-parameter
//! preservation, UTF-8 in the ground state, and buffered synchronized
//! updates. The machine is a plain record; feed it byte slices split
//! anywhere.

use std::time::Instant;

use tracing::debug;

use crate::decode::{Decoded, Utf8Decoder};
use crate::params::Params;
use crate::pending::{PendingConfig, PendingState};
use crate::token::{StringKind, TokenSink};

const ESC: u8 = 0x1B;
const CAN: u8 = 0x18;
const SUB: u8 = 0x1A;
const BEL: u8 = 0x07;
const DEL: u8 = 0x7F;

const MAX_INTERMEDIATES: usize = 2;

/// Parser states, as named by the published VT500 state diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    CsiIgnore,
    DcsEntry,
    DcsParam,
    DcsIntermediate,
    DcsPassthrough,
    DcsIgnore,
    OscString,
    SosPmApcString,
}

/// Tunables for payload capture and synchronized updates.
#[derive(Debug, Clone, Copy)]
pub struct ParserConfig {
    /// Cap on accumulated OSC/DCS/APC payload bytes. A sequence whose
    /// payload exceeds the cap is discarded without dispatch.
    pub max_string_len: usize,
    /// Synchronized-update buffering limits.
    pub pending: PendingConfig,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_string_len: 2 * 1024 * 1024,
            pending: PendingConfig::default(),
        }
    }
}

/// The resumable parser record.
pub struct Parser {
    state: State,
    decoder: Utf8Decoder,
    params: Params,
    intermediates: [u8; MAX_INTERMEDIATES],
    intermediate_len: usize,
    private: Option<u8>,
    string_buf: Vec<u8>,
    string_kind: StringKind,
    string_overflow: bool,
    dcs_final: u8,
    string_esc: bool,
    max_string_len: usize,
    pending: PendingState,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            state: State::Ground,
            decoder: Utf8Decoder::new(),
            params: Params::new(),
            intermediates: [0; MAX_INTERMEDIATES],
            intermediate_len: 0,
            private: None,
            string_buf: Vec::new(),
            string_kind: StringKind::Apc,
            string_overflow: false,
            dcs_final: 0,
            string_esc: false,
            max_string_len: config.max_string_len,
            pending: PendingState::with_config(config.pending),
        }
    }

    /// Forcibly return to the ground state, dropping any partial
    /// sequence. Used for subsystem recovery, never in normal flow.
    pub fn reset(&mut self) {
        self.state = State::Ground;
        self.decoder.reset();
        self.clear_sequence();
        self.string_buf.clear();
        self.string_esc = false;
    }

    /// True while a synchronized update is buffering input.
    #[must_use]
    pub fn pending_active(&self) -> bool {
        self.pending.active
    }

    /// When the open synchronized update becomes invalid.
    #[must_use]
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.pending.deadline()
    }

    /// Invalidate an open synchronized update (deadline expiry),
    /// discarding everything it buffered. Subsequent bytes are
    /// processed live.
    pub fn discard_pending(&mut self) {
        self.pending.discard();
    }

    /// Feed a byte slice, emitting tokens into `sink`.
    pub fn feed<S: TokenSink>(&mut self, bytes: &[u8], sink: &mut S) {
        if self.pending.active {
            self.pending.push(bytes);
        } else {
            self.run(bytes, sink);
        }
        self.drain_pending(sink);
    }

    /// Drain properly closed synchronized regions; only those are
    /// ever applied (cap or deadline violations discard instead).
    /// Applied regions may re-open pending mode; loop until stable so
    /// the call stack stays flat no matter how many regions are
    /// queued.
    fn drain_pending<S: TokenSink>(&mut self, sink: &mut S) {
        while let Some(data) = self.pending.take_flush() {
            self.run(&data, sink);
        }
    }

    /// Run the machine over bytes until exhausted or until a
    /// synchronized update opens, in which case the remainder is
    /// buffered.
    fn run<S: TokenSink>(&mut self, bytes: &[u8], sink: &mut S) {
        let mut i = 0;
        while i < bytes.len() {
            // Fast path: a run of printable ASCII in ground state is
            // blitted without per-byte dispatch.
            if self.state == State::Ground && !self.decoder.has_partial() {
                let run = ascii_run(&bytes[i..]);
                if run > 0 {
                    // The run contains only 0x20..=0x7E, valid UTF-8.
                    if let Ok(text) = std::str::from_utf8(&bytes[i..i + run]) {
                        sink.print_run(text);
                    }
                    i += run;
                    continue;
                }
            }

            let byte = bytes[i];
            i += 1;
            self.step(byte, sink);

            if self.pending.active {
                self.pending.push(&bytes[i..]);
                return;
            }
        }
    }

    fn step<S: TokenSink>(&mut self, byte: u8, sink: &mut S) {
        // CAN and SUB abort any sequence from any state.
        if byte == CAN || byte == SUB {
            if self.state != State::Ground {
                self.abort_sequence();
                if byte == SUB {
                    sink.error_glyph();
                }
                return;
            }
            // In ground state they execute as ordinary C0 controls.
            sink.execute(byte);
            return;
        }

        match self.state {
            State::Ground => self.ground(byte, sink),
            State::Escape => self.escape(byte, sink),
            State::EscapeIntermediate => self.escape_intermediate(byte, sink),
            State::CsiEntry => self.csi_entry(byte, sink),
            State::CsiParam => self.csi_param(byte, sink),
            State::CsiIntermediate => self.csi_intermediate(byte, sink),
            State::CsiIgnore => self.csi_ignore(byte, sink),
            State::DcsEntry => self.dcs_entry(byte),
            State::DcsParam => self.dcs_param(byte),
            State::DcsIntermediate => self.dcs_intermediate(byte),
            State::DcsPassthrough => self.dcs_passthrough(byte, sink),
            State::DcsIgnore => self.dcs_ignore(byte),
            State::OscString => self.osc_string(byte, sink),
            State::SosPmApcString => self.sos_pm_apc_string(byte, sink),
        }
    }

    // ------------------------------------------------------------------
    // Per-state handlers
    // ------------------------------------------------------------------

    fn ground<S: TokenSink>(&mut self, byte: u8, sink: &mut S) {
        match byte {
            ESC => {
                if self.decoder.has_partial() {
                    // ESC cuts off a partial scalar; the broken subpart
                    // is replaced before the sequence starts.
                    self.decoder.reset();
                    sink.print(crate::decode::REPLACEMENT);
                }
                self.enter_escape();
            }
            0x00..=0x1F | DEL => {
                if self.decoder.has_partial() {
                    self.decoder.reset();
                    sink.print(crate::decode::REPLACEMENT);
                }
                sink.execute(byte);
            }
            _ => match self.decoder.push(byte) {
                Decoded::None => {}
                Decoded::One(ch) => sink.print(ch),
                Decoded::Two(a, b) => {
                    sink.print(a);
                    sink.print(b);
                }
            },
        }
    }

    fn escape<S: TokenSink>(&mut self, byte: u8, sink: &mut S) {
        match byte {
            ESC => self.enter_escape(),
            0x00..=0x1A | 0x1C..=0x1F => sink.execute(byte),
            0x20..=0x2F => {
                self.push_intermediate(byte);
                self.state = State::EscapeIntermediate;
            }
            b'[' => {
                self.clear_sequence();
                self.state = State::CsiEntry;
            }
            b']' => {
                self.begin_string(StringKind::Apc); // kind unused for OSC
                self.string_esc = false;
                self.state = State::OscString;
            }
            b'P' => {
                self.clear_sequence();
                self.begin_string(StringKind::Apc); // kind unused for DCS
                self.state = State::DcsEntry;
            }
            b'_' => {
                self.begin_string(StringKind::Apc);
                self.state = State::SosPmApcString;
            }
            b'^' => {
                self.begin_string(StringKind::Pm);
                self.state = State::SosPmApcString;
            }
            b'X' => {
                self.begin_string(StringKind::Sos);
                self.state = State::SosPmApcString;
            }
            0x30..=0x7E => {
                let len = self.intermediate_len;
                let intermediates = self.intermediates;
                sink.esc_dispatch(&intermediates[..len], byte);
                self.to_ground();
            }
            _ => {
                // Bytes above 0x7E have no meaning here; drop the
                // sequence rather than guess.
                debug!(byte, "ignoring byte in escape state");
                self.to_ground();
            }
        }
    }

    fn escape_intermediate<S: TokenSink>(&mut self, byte: u8, sink: &mut S) {
        match byte {
            ESC => self.enter_escape(),
            0x00..=0x1A | 0x1C..=0x1F => sink.execute(byte),
            0x20..=0x2F => self.push_intermediate(byte),
            0x30..=0x7E => {
                let len = self.intermediate_len;
                let intermediates = self.intermediates;
                sink.esc_dispatch(&intermediates[..len], byte);
                self.to_ground();
            }
            _ => {
                debug!(byte, "ignoring byte in escape-intermediate state");
                self.to_ground();
            }
        }
    }

    fn csi_entry<S: TokenSink>(&mut self, byte: u8, sink: &mut S) {
        match byte {
            ESC => self.enter_escape(),
            0x00..=0x1A | 0x1C..=0x1F => sink.execute(byte),
            b'0'..=b'9' => {
                self.params.push_digit(byte - b'0');
                self.state = State::CsiParam;
            }
            b';' => {
                self.params.separator(false);
                self.state = State::CsiParam;
            }
            b':' => {
                self.params.separator(true);
                self.state = State::CsiParam;
            }
            0x3C..=0x3F => {
                self.private = Some(byte);
                self.state = State::CsiParam;
            }
            0x20..=0x2F => {
                self.push_intermediate(byte);
                self.state = State::CsiIntermediate;
            }
            0x40..=0x7E => self.csi_finish(byte, sink),
            _ => self.state = State::CsiIgnore,
        }
    }

    fn csi_param<S: TokenSink>(&mut self, byte: u8, sink: &mut S) {
        match byte {
            ESC => self.enter_escape(),
            0x00..=0x1A | 0x1C..=0x1F => sink.execute(byte),
            b'0'..=b'9' => self.params.push_digit(byte - b'0'),
            b';' => self.params.separator(false),
            b':' => self.params.separator(true),
            0x20..=0x2F => {
                self.push_intermediate(byte);
                self.state = State::CsiIntermediate;
            }
            0x3C..=0x3F => self.state = State::CsiIgnore,
            0x40..=0x7E => self.csi_finish(byte, sink),
            _ => self.state = State::CsiIgnore,
        }
    }

    fn csi_intermediate<S: TokenSink>(&mut self, byte: u8, sink: &mut S) {
        match byte {
            ESC => self.enter_escape(),
            0x00..=0x1A | 0x1C..=0x1F => sink.execute(byte),
            0x20..=0x2F => self.push_intermediate(byte),
            0x30..=0x3F => self.state = State::CsiIgnore,
            0x40..=0x7E => self.csi_finish(byte, sink),
            _ => self.state = State::CsiIgnore,
        }
    }

    fn csi_ignore<S: TokenSink>(&mut self, byte: u8, sink: &mut S) {
        match byte {
            ESC => self.enter_escape(),
            0x00..=0x1A | 0x1C..=0x1F => sink.execute(byte),
            0x40..=0x7E => self.to_ground(),
            _ => {}
        }
    }

    fn csi_finish<S: TokenSink>(&mut self, final_byte: u8, sink: &mut S) {
        self.params.finish();
        let len = self.intermediate_len;
        let intermediates = self.intermediates;
        sink.csi_dispatch(
            self.private,
            &self.params,
            &intermediates[..len],
            final_byte,
        );

        // DECSET 2026: everything after this sequence buffers until the
        // matching reset (or a limit trips).
        if self.pending.enabled()
            && self.private == Some(b'?')
            && final_byte == b'h'
            && self.params.iter().any(|p| p[0] == 2026)
        {
            self.pending.activate(Instant::now());
        }

        self.to_ground();
    }

    fn dcs_entry(&mut self, byte: u8) {
        match byte {
            ESC => self.enter_escape(),
            0x00..=0x1A | 0x1C..=0x1F => {}
            b'0'..=b'9' => {
                self.params.push_digit(byte - b'0');
                self.state = State::DcsParam;
            }
            b';' => {
                self.params.separator(false);
                self.state = State::DcsParam;
            }
            b':' => {
                self.params.separator(true);
                self.state = State::DcsParam;
            }
            0x3C..=0x3F => {
                self.private = Some(byte);
                self.state = State::DcsParam;
            }
            0x20..=0x2F => {
                self.push_intermediate(byte);
                self.state = State::DcsIntermediate;
            }
            0x40..=0x7E => {
                self.dcs_final = byte;
                self.state = State::DcsPassthrough;
            }
            _ => self.state = State::DcsIgnore,
        }
    }

    fn dcs_param(&mut self, byte: u8) {
        match byte {
            ESC => self.enter_escape(),
            0x00..=0x1A | 0x1C..=0x1F => {}
            b'0'..=b'9' => self.params.push_digit(byte - b'0'),
            b';' => self.params.separator(false),
            b':' => self.params.separator(true),
            0x20..=0x2F => {
                self.push_intermediate(byte);
                self.state = State::DcsIntermediate;
            }
            0x40..=0x7E => {
                self.dcs_final = byte;
                self.params.finish();
                self.state = State::DcsPassthrough;
            }
            _ => self.state = State::DcsIgnore,
        }
    }

    fn dcs_intermediate(&mut self, byte: u8) {
        match byte {
            ESC => self.enter_escape(),
            0x00..=0x1A | 0x1C..=0x1F => {}
            0x20..=0x2F => self.push_intermediate(byte),
            0x40..=0x7E => {
                self.dcs_final = byte;
                self.params.finish();
                self.state = State::DcsPassthrough;
            }
            _ => self.state = State::DcsIgnore,
        }
    }

    fn dcs_passthrough<S: TokenSink>(&mut self, byte: u8, sink: &mut S) {
        if byte == ESC {
            self.string_esc = true;
            return;
        }
        if self.string_esc {
            self.string_esc = false;
            if byte == b'\\' {
                self.finish_dcs(sink);
                return;
            }
            // ESC aborts the string and starts a new sequence.
            self.abort_sequence();
            self.enter_escape();
            self.step(byte, sink);
            return;
        }
        self.push_string_byte(byte);
    }

    fn dcs_ignore(&mut self, byte: u8) {
        if byte == ESC {
            self.string_esc = true;
        } else if self.string_esc {
            self.string_esc = false;
            if byte == b'\\' {
                self.to_ground();
            }
        }
    }

    fn osc_string<S: TokenSink>(&mut self, byte: u8, sink: &mut S) {
        if byte == ESC {
            self.string_esc = true;
            return;
        }
        if self.string_esc {
            self.string_esc = false;
            if byte == b'\\' {
                self.finish_osc(sink, false);
                return;
            }
            // ESC without ST still terminates the string, then the new
            // sequence begins with the byte we are holding.
            self.finish_osc(sink, false);
            self.enter_escape();
            self.step(byte, sink);
            return;
        }
        match byte {
            BEL => self.finish_osc(sink, true),
            0x00..=0x06 | 0x08..=0x1F => {
                // Other C0 controls are not part of any OSC payload.
            }
            _ => self.push_string_byte(byte),
        }
    }

    fn sos_pm_apc_string<S: TokenSink>(&mut self, byte: u8, sink: &mut S) {
        if byte == ESC {
            self.string_esc = true;
            return;
        }
        if self.string_esc {
            self.string_esc = false;
            if byte == b'\\' {
                self.finish_string(sink);
                return;
            }
            self.abort_sequence();
            self.enter_escape();
            self.step(byte, sink);
            return;
        }
        self.push_string_byte(byte);
    }

    // ------------------------------------------------------------------
    // Shared transitions
    // ------------------------------------------------------------------

    fn enter_escape(&mut self) {
        self.clear_sequence();
        self.string_buf.clear();
        self.string_esc = false;
        self.state = State::Escape;
    }

    fn to_ground(&mut self) {
        self.clear_sequence();
        self.state = State::Ground;
    }

    fn abort_sequence(&mut self) {
        self.string_buf.clear();
        self.string_esc = false;
        self.to_ground();
    }

    fn clear_sequence(&mut self) {
        self.params.clear();
        self.intermediate_len = 0;
        self.private = None;
        self.string_overflow = false;
        self.dcs_final = 0;
    }

    fn push_intermediate(&mut self, byte: u8) {
        if self.intermediate_len < MAX_INTERMEDIATES {
            self.intermediates[self.intermediate_len] = byte;
            self.intermediate_len += 1;
        }
    }

    fn begin_string(&mut self, kind: StringKind) {
        self.string_buf.clear();
        self.string_kind = kind;
        self.string_overflow = false;
        self.string_esc = false;
    }

    fn push_string_byte(&mut self, byte: u8) {
        if self.string_buf.len() >= self.max_string_len {
            if !self.string_overflow {
                debug!(cap = self.max_string_len, "string payload overflow");
            }
            self.string_overflow = true;
            return;
        }
        self.string_buf.push(byte);
    }

    fn finish_osc<S: TokenSink>(&mut self, sink: &mut S, bell: bool) {
        if !self.string_overflow {
            let (cmd, payload) = split_osc(&self.string_buf);
            sink.osc_dispatch(cmd, payload, bell);
        }
        self.string_buf.clear();
        self.to_ground();
    }

    fn finish_dcs<S: TokenSink>(&mut self, sink: &mut S) {
        if !self.string_overflow {
            let intermediates_len = self.intermediate_len;
            let intermediates = self.intermediates;
            sink.dcs_dispatch(
                self.private,
                &self.params,
                &intermediates[..intermediates_len],
                self.dcs_final,
                &self.string_buf,
            );
        }
        self.string_buf.clear();
        self.to_ground();
    }

    fn finish_string<S: TokenSink>(&mut self, sink: &mut S) {
        if !self.string_overflow {
            sink.string_dispatch(self.string_kind, &self.string_buf);
        }
        self.string_buf.clear();
        self.to_ground();
    }
}

/// Length of the leading run of printable ASCII (0x20..=0x7E).
fn ascii_run(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .position(|&b| !(0x20..=0x7E).contains(&b))
        .unwrap_or(bytes.len())
}

/// Split an OSC payload into its numeric command and remainder.
fn split_osc(buf: &[u8]) -> (Option<u32>, &[u8]) {
    let digits_end = buf
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(buf.len());
    if digits_end == 0 || digits_end > 9 {
        return (None, buf);
    }
    let cmd = std::str::from_utf8(&buf[..digits_end])
        .ok()
        .and_then(|s| s.parse::<u32>().ok());
    let payload = if digits_end < buf.len() && buf[digits_end] == b';' {
        &buf[digits_end + 1..]
    } else {
        &buf[digits_end..]
    };
    (cmd, payload)
}
