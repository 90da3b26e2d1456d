//! The keyboard-protocol flag stack.
//!
//! Progressive enhancement flags are pushed with `CSI > flags u`,
//! popped with `CSI < n u`, and replaced with `CSI = flags ; mode u`.
//! Each screen (main/alternate) carries its own stack.

use bitflags::bitflags;

bitflags! {
    /// Progressive-enhancement flags.
    ///
    /// See <https://sw.kovidgoyal.net/kitty/keyboard-protocol/> for
    /// the flag meanings.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct KeyboardFlags: u8 {
        /// Disambiguate Escape and modified keys via CSI-u.
        const DISAMBIGUATE = 0b0000_0001;
        /// Report repeat and release events, not just presses.
        const REPORT_EVENT_TYPES = 0b0000_0010;
        /// Report alternate key codes alongside the base code.
        const REPORT_ALTERNATE_KEYS = 0b0000_0100;
        /// Encode every key as a CSI-u escape code.
        const REPORT_ALL_KEYS = 0b0000_1000;
        /// Attach the generated text to key events.
        const REPORT_TEXT = 0b0001_0000;
    }
}

/// Maximum stack depth; pushing beyond it discards the oldest entry,
/// so a buggy client cannot grow memory without bound.
const MAX_DEPTH: usize = 128;

/// The per-screen pushdown stack of flag sets.
#[derive(Debug, Clone, Default)]
pub struct KeyboardStack {
    stack: Vec<KeyboardFlags>,
}

impl KeyboardStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The flags currently in effect.
    #[must_use]
    pub fn current(&self) -> KeyboardFlags {
        self.stack.last().copied().unwrap_or_default()
    }

    /// `CSI > flags u`.
    pub fn push(&mut self, flags: KeyboardFlags) {
        if self.stack.len() == MAX_DEPTH {
            self.stack.remove(0);
        }
        self.stack.push(flags);
    }

    /// `CSI < n u`; popping past the bottom leaves the legacy state.
    pub fn pop(&mut self, count: usize) {
        let count = count.max(1);
        let new_len = self.stack.len().saturating_sub(count);
        self.stack.truncate(new_len);
    }

    /// `CSI = flags ; mode u`: mutate the current entry in place.
    /// Mode 1 sets, 2 ors in, 3 masks out.
    pub fn set(&mut self, flags: KeyboardFlags, mode: u32) {
        if self.stack.is_empty() {
            self.stack.push(KeyboardFlags::default());
        }
        let Some(top) = self.stack.last_mut() else {
            return;
        };
        match mode {
            2 => *top |= flags,
            3 => *top -= flags,
            _ => *top = flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn push_then_pop_restores_previous() {
        let mut stack = KeyboardStack::new();
        stack.push(KeyboardFlags::DISAMBIGUATE);
        stack.push(KeyboardFlags::REPORT_ALL_KEYS | KeyboardFlags::REPORT_EVENT_TYPES);
        assert!(stack.current().contains(KeyboardFlags::REPORT_ALL_KEYS));
        stack.pop(1);
        assert_eq!(stack.current(), KeyboardFlags::DISAMBIGUATE);
    }

    #[test]
    fn pop_past_bottom_is_legacy() {
        let mut stack = KeyboardStack::new();
        stack.push(KeyboardFlags::DISAMBIGUATE);
        stack.pop(5);
        assert_eq!(stack.current(), KeyboardFlags::empty());
    }

    #[test]
    fn set_modes() {
        let mut stack = KeyboardStack::new();
        stack.set(KeyboardFlags::DISAMBIGUATE, 1);
        stack.set(KeyboardFlags::REPORT_EVENT_TYPES, 2);
        assert_eq!(
            stack.current(),
            KeyboardFlags::DISAMBIGUATE | KeyboardFlags::REPORT_EVENT_TYPES
        );
        stack.set(KeyboardFlags::DISAMBIGUATE, 3);
        assert_eq!(stack.current(), KeyboardFlags::REPORT_EVENT_TYPES);
    }

    #[test]
    fn depth_is_bounded() {
        let mut stack = KeyboardStack::new();
        for _ in 0..200 {
            stack.push(KeyboardFlags::DISAMBIGUATE);
        }
        stack.pop(usize::MAX);
        assert_eq!(stack.current(), KeyboardFlags::empty());
    }
}
