//! Buffering for synchronized screen updates (DECSET 2026).
//!
//! While a synchronized update is active, raw bytes are held here and
//! scanned for the end-sync sequence. A region that closes properly
//! is applied in one burst, so no observer ever sees it half-done. A
//! region that overruns the byte cap or the deadline is invalid: the
//! buffered bytes are discarded, never applied partially.

use std::time::{Duration, Instant};

use memchr::memchr;
use tracing::debug;

/// The end-sync sequence searched for in the buffered stream.
const END_SYNC: &[u8] = b"\x1b[?2026l";

/// Limits for the pending buffer. Capacity and timeout are independent.
#[derive(Debug, Clone, Copy)]
pub struct PendingConfig {
    /// Maximum buffered bytes before the region is invalidated.
    /// Zero disables synchronized-update buffering entirely.
    pub max_bytes: usize,
    /// Maximum time a region may stay open before invalidation.
    pub timeout: Duration,
}

impl Default for PendingConfig {
    fn default() -> Self {
        Self {
            // Reference terminals cap pending data in the low MiB and
            // give clients on the order of a hundred ms to finish.
            max_bytes: 4 * 1024 * 1024,
            timeout: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct PendingState {
    pub(crate) active: bool,
    buf: Vec<u8>,
    scan_pos: usize,
    end_found: bool,
    opened_at: Option<Instant>,
    config: PendingConfig,
}

impl PendingState {
    pub(crate) fn with_config(config: PendingConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub(crate) fn enabled(&self) -> bool {
        self.config.max_bytes > 0
    }

    pub(crate) fn activate(&mut self, now: Instant) {
        self.active = true;
        self.end_found = false;
        self.scan_pos = 0;
        self.opened_at = Some(now);
    }

    /// Append bytes while active and rescan for the end sequence. A
    /// region that grows past the cap without closing is invalid and
    /// is dropped on the spot.
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        self.scan();
        if !self.end_found && self.buf.len() >= self.config.max_bytes {
            debug!(
                cap = self.config.max_bytes,
                "synchronized update exceeded its byte cap; discarding"
            );
            self.discard();
        }
    }

    /// The instant at which the open region becomes invalid.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        if self.active {
            self.opened_at.map(|t| t + self.config.timeout)
        } else {
            None
        }
    }

    /// Invalidate the open region, dropping everything it buffered.
    /// Used for cap overrun and deadline expiry; the stream resumes
    /// live with the next byte fed.
    pub(crate) fn discard(&mut self) {
        self.active = false;
        self.end_found = false;
        self.scan_pos = 0;
        self.opened_at = None;
        self.buf.clear();
    }

    /// Take the buffered bytes of a properly closed region for
    /// atomic application.
    pub(crate) fn take_flush(&mut self) -> Option<Vec<u8>> {
        if self.active && self.end_found {
            self.active = false;
            self.end_found = false;
            self.scan_pos = 0;
            self.opened_at = None;
            Some(std::mem::take(&mut self.buf))
        } else {
            None
        }
    }

    fn scan(&mut self) {
        while !self.end_found && self.scan_pos < self.buf.len() {
            let window = &self.buf[self.scan_pos..];
            match memchr(0x1B, window) {
                None => {
                    self.scan_pos = self.buf.len();
                    return;
                }
                Some(off) => {
                    let esc_at = self.scan_pos + off;
                    let rest = &self.buf[esc_at..];
                    if rest.len() < END_SYNC.len() {
                        // Possible partial match at the tail; resume
                        // scanning here when more bytes arrive.
                        self.scan_pos = esc_at;
                        return;
                    }
                    if rest.starts_with(END_SYNC) {
                        self.end_found = true;
                        return;
                    }
                    self.scan_pos = esc_at + 1;
                }
            }
        }
    }
}
