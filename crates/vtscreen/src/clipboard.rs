//! OSC 52 clipboard handling.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::debug;

use crate::events::{ClipboardTarget, TermEvent};

/// Policy knobs for OSC 52.
#[derive(Debug, Clone, Copy)]
pub struct ClipboardConfig {
    /// Allow applications to write the clipboard at all.
    pub allow_write: bool,
    /// Allow applications to request reads (the embedder still
    /// mediates the actual data).
    pub allow_read: bool,
    /// Successive sets concatenate instead of replacing.
    pub allow_append: bool,
    /// Cap on the accumulated decoded payload.
    pub max_bytes: usize,
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            allow_write: true,
            allow_read: false,
            allow_append: true,
            max_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Accumulator state for the append extension.
#[derive(Debug, Default)]
pub struct ClipboardState {
    config: ClipboardConfig,
    pending: Vec<u8>,
    pending_target: Option<ClipboardTarget>,
}

impl ClipboardState {
    #[must_use]
    pub fn new(config: ClipboardConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            pending_target: None,
        }
    }

    /// Handle an OSC 52 payload (`<targets> ; <base64 | ? | !>`),
    /// producing events for the embedder.
    pub fn handle(&mut self, payload: &[u8], events: &mut Vec<TermEvent>) {
        let mut parts = payload.splitn(2, |&b| b == b';');
        let targets = parts.next().unwrap_or(b"");
        let data = parts.next().unwrap_or(b"");

        let target = if targets.contains(&b'p') {
            ClipboardTarget::Primary
        } else {
            ClipboardTarget::Clipboard
        };

        match data {
            b"?" => {
                if self.config.allow_read {
                    events.push(TermEvent::ClipboardQuery(target));
                } else {
                    debug!("clipboard read request denied by policy");
                }
            }
            b"!" => {
                // Reset the accumulator ahead of a new sequence of
                // appends.
                self.pending.clear();
                self.pending_target = Some(target);
            }
            _ => {
                if !self.config.allow_write {
                    debug!("clipboard write denied by policy");
                    return;
                }
                let Ok(decoded) = BASE64.decode(data) else {
                    // An undecodable payload also clears the
                    // accumulator, so garbage cannot poison appends.
                    self.pending.clear();
                    self.pending_target = None;
                    return;
                };
                let same_target = self.pending_target == Some(target);
                if !(self.config.allow_append && same_target) {
                    self.pending.clear();
                }
                self.pending_target = Some(target);
                let room = self.config.max_bytes.saturating_sub(self.pending.len());
                self.pending.extend_from_slice(&decoded[..decoded.len().min(room)]);
                events.push(TermEvent::ClipboardSet(target, self.pending.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set_events(state: &mut ClipboardState, payload: &[u8]) -> Vec<TermEvent> {
        let mut events = Vec::new();
        state.handle(payload, &mut events);
        events
    }

    #[test]
    fn write_decodes_base64() {
        let mut state = ClipboardState::default();
        let events = set_events(&mut state, b"c;aGVsbG8=");
        assert_eq!(
            events,
            vec![TermEvent::ClipboardSet(
                ClipboardTarget::Clipboard,
                b"hello".to_vec()
            )]
        );
    }

    #[test]
    fn appends_concatenate() {
        let mut state = ClipboardState::default();
        set_events(&mut state, b"c;aGVs"); // "hel"
        let events = set_events(&mut state, b"c;bG8="); // "lo"
        assert_eq!(
            events,
            vec![TermEvent::ClipboardSet(
                ClipboardTarget::Clipboard,
                b"hello".to_vec()
            )]
        );
    }

    #[test]
    fn bang_resets_accumulator() {
        let mut state = ClipboardState::default();
        set_events(&mut state, b"c;aGVs");
        set_events(&mut state, b"c;!");
        let events = set_events(&mut state, b"c;bG8=");
        assert_eq!(
            events,
            vec![TermEvent::ClipboardSet(
                ClipboardTarget::Clipboard,
                b"lo".to_vec()
            )]
        );
    }

    #[test]
    fn append_disabled_replaces() {
        let mut state = ClipboardState::new(ClipboardConfig {
            allow_append: false,
            ..ClipboardConfig::default()
        });
        set_events(&mut state, b"c;aGVs");
        let events = set_events(&mut state, b"c;bG8=");
        assert_eq!(
            events,
            vec![TermEvent::ClipboardSet(
                ClipboardTarget::Clipboard,
                b"lo".to_vec()
            )]
        );
    }

    #[test]
    fn read_respects_policy() {
        let mut denied = ClipboardState::default();
        assert!(set_events(&mut denied, b"c;?").is_empty());

        let mut allowed = ClipboardState::new(ClipboardConfig {
            allow_read: true,
            ..ClipboardConfig::default()
        });
        assert_eq!(
            set_events(&mut allowed, b"c;?"),
            vec![TermEvent::ClipboardQuery(ClipboardTarget::Clipboard)]
        );
    }

    #[test]
    fn primary_selection_targeted() {
        let mut state = ClipboardState::default();
        let events = set_events(&mut state, b"p;eA==");
        assert_eq!(
            events,
            vec![TermEvent::ClipboardSet(
                ClipboardTarget::Primary,
                b"x".to_vec()
            )]
        );
    }

    #[test]
    fn payload_size_is_bounded() {
        let mut state = ClipboardState::new(ClipboardConfig {
            max_bytes: 4,
            ..ClipboardConfig::default()
        });
        let payload = BASE64.encode(b"0123456789");
        let events = set_events(&mut state, format!("c;{payload}").as_bytes());
        match &events[0] {
            TermEvent::ClipboardSet(_, data) => assert_eq!(data.len(), 4),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
