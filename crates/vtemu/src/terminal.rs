//! One terminal instance: parser plus screen, fed in order.

use std::time::Instant;

use vtparse::Parser;
use vtreport::{InputModes, KeyEvent, PasteConfig};
use vtscreen::{Screen, TermEvent};

use crate::config::Config;

/// A complete terminal core. Not `Sync`: wrap it in a lock (see
/// [`crate::session`]) to share between parser and render threads.
pub struct Terminal {
    parser: Parser,
    screen: Screen,
    paste: PasteConfig,
    /// Bytes produced for the PTY by input encoding and query
    /// replies.
    outbound: Vec<u8>,
}

impl Terminal {
    #[must_use]
    pub fn new(rows: usize, cols: usize, config: &Config) -> Self {
        Self {
            parser: Parser::with_config(config.parser_config()),
            screen: Screen::new(rows, cols, config.screen_config()),
            paste: config.paste,
            outbound: Vec::new(),
        }
    }

    /// Feed PTY output bytes. Tokens buffered by a synchronized
    /// update are applied atomically inside this call once the region
    /// closes.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.parser.feed(bytes, &mut self.screen);
        self.collect_responses();
    }

    /// Invalidate a synchronized update whose deadline has passed,
    /// discarding the partial region.
    pub fn tick(&mut self, now: Instant) {
        if self
            .parser
            .pending_deadline()
            .is_some_and(|deadline| now >= deadline)
        {
            self.parser.discard_pending();
        }
    }

    /// Deadline at which an open synchronized update becomes
    /// invalid; the embedder should wake then.
    #[must_use]
    pub fn wakeup_deadline(&self) -> Option<Instant> {
        self.parser.pending_deadline()
    }

    fn collect_responses(&mut self) {
        let responses = self.screen.take_responses();
        self.outbound.extend_from_slice(&responses);
    }

    #[must_use]
    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut Screen {
        &mut self.screen
    }

    /// Drain queued screen events (bell, title, notifications...).
    pub fn take_events(&mut self) -> Vec<TermEvent> {
        self.screen.take_events()
    }

    /// Drain bytes owed to the PTY.
    pub fn take_outbound(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbound)
    }

    /// Snapshot of the modes input encoding depends on.
    #[must_use]
    pub fn input_modes(&self) -> InputModes {
        InputModes::from_screen(&self.screen)
    }

    /// Encode a key event into the outbound queue.
    pub fn key(&mut self, event: &KeyEvent) {
        let modes = self.input_modes();
        let bytes = vtreport::encode_key(event, &modes);
        self.outbound.extend_from_slice(&bytes);
    }

    /// Encode a mouse event into the outbound queue.
    pub fn mouse(&mut self, event: &vtreport::MouseEvent) {
        let modes = self.input_modes();
        if let Some(bytes) = vtreport::encode_mouse(event, &modes) {
            self.outbound.extend_from_slice(&bytes);
        }
    }

    /// Paste text into the outbound queue.
    pub fn paste(&mut self, text: &str) {
        let modes = self.input_modes();
        let bytes = vtreport::encode_paste(text, &modes, &self.paste);
        self.outbound.extend_from_slice(&bytes);
    }

    /// Focus change: updates bell tracking and reports when enabled.
    pub fn focus(&mut self, focused: bool) {
        self.screen.set_focus(focused);
        let modes = self.input_modes();
        if let Some(bytes) = vtreport::encode_focus(focused, &modes) {
            self.outbound.extend_from_slice(bytes);
        }
    }

    /// Resize in cells.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        self.screen.resize(rows, cols);
    }

    /// Shutdown: finalize the scrollback spill and drop the stores.
    pub fn shutdown(&mut self) {
        self.screen.shutdown();
    }

    /// Recovery for internal invariant violations: put the parser
    /// back in ground state without touching screen content.
    pub fn reset_parser(&mut self) {
        self.parser.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vtreport::{KeyCode, Modifiers};

    #[test]
    fn feed_and_key_roundtrip() {
        let mut term = Terminal::new(4, 20, &Config::default());
        term.feed(b"hi");
        assert_eq!(term.screen().grid().cursor.col, 2);

        term.key(&KeyEvent::plain(KeyCode::Char('x')));
        assert_eq!(term.take_outbound(), b"x");
    }

    #[test]
    fn responses_are_queued_outbound() {
        let mut term = Terminal::new(4, 20, &Config::default());
        term.feed(b"\x1b[c");
        assert_eq!(term.take_outbound(), b"\x1b[?62;c");
    }

    #[test]
    fn focus_report_follows_mode() {
        let mut term = Terminal::new(4, 20, &Config::default());
        term.focus(true);
        assert!(term.take_outbound().is_empty());
        term.feed(b"\x1b[?1004h");
        term.focus(false);
        assert_eq!(term.take_outbound(), b"\x1b[O");
    }

    #[test]
    fn paste_respects_bracket_mode() {
        let mut term = Terminal::new(4, 20, &Config::default());
        term.paste("hi");
        assert_eq!(term.take_outbound(), b"hi");
        term.feed(b"\x1b[?2004h");
        term.paste("hi");
        assert_eq!(term.take_outbound(), b"\x1b[200~hi\x1b[201~");
    }

    #[test]
    fn sync_update_timeout_discards_buffer() {
        use std::time::Duration;
        let mut config = Config::default();
        config.pending_timeout = Duration::from_millis(0);
        let mut term = Terminal::new(4, 20, &config);
        term.feed(b"\x1b[?2026hqueued");
        assert_eq!(term.screen().grid().cursor.col, 0);
        term.tick(Instant::now() + Duration::from_millis(1));
        assert_eq!(
            term.screen().grid().cursor.col,
            0,
            "an expired region is invalidated, never applied"
        );
        // The stream continues live once the region is gone.
        term.feed(b"now");
        assert_eq!(term.screen().grid().cursor.col, 3);
    }

    #[test]
    fn ctrl_key_encoding() {
        let mut term = Terminal::new(4, 20, &Config::default());
        term.key(&KeyEvent::with_mods(KeyCode::Char('c'), Modifiers::CTRL));
        assert_eq!(term.take_outbound(), vec![0x03]);
    }
}
