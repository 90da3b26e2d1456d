//! Desktop notifications (OSC 99).
//!
//! Format: `OSC 99 ; metadata ; payload ST`, metadata being
//! colon-separated `key=value`. Chunked commands repeat the same `i`
//! with `d=0` until a final `d=1`. Unknown keys and payload kinds are
//! ignored; identifiers are sanitized before they are ever echoed.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::debug;

use crate::events::{Notification, Occasion, TermEvent, Urgency};

/// Per-chunk decoded payload limit.
const MAX_CHUNK_BYTES: usize = 2048;

/// Maximum concurrently assembling notifications.
const MAX_PENDING: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum PayloadKind {
    #[default]
    Title,
    Body,
    Icon,
    Close,
    Alive,
    Buttons,
    Query,
    /// Unknown kinds are parsed but contribute nothing.
    Ignored,
}

#[derive(Debug, Default)]
struct Pending {
    notification: Notification,
    icon_data: Vec<u8>,
}

/// Assembles chunked commands and emits notification events.
#[derive(Debug, Default)]
pub struct NotificationDispatcher {
    pending: HashMap<String, Pending>,
}

/// Strip every character outside `[a-zA-Z0-9_\-+.]`, the injection
/// guard for identifiers that get echoed back to the application.
#[must_use]
pub fn sanitize_identifier(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '.'))
        .collect()
}

/// Escape-safety check: printable UTF-8 with no C0/C1 controls.
fn strip_controls(text: &str) -> String {
    text.chars()
        .filter(|&c| !c.is_control() && !('\u{80}'..='\u{9F}').contains(&c))
        .collect()
}

impl NotificationDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one OSC 99 payload (after the `99;`), appending events
    /// and response bytes.
    pub fn handle(
        &mut self,
        payload: &[u8],
        events: &mut Vec<TermEvent>,
        responses: &mut Vec<u8>,
    ) {
        // Both semicolons are always present: metadata ; body.
        let mut parts = payload.splitn(2, |&b| b == b';');
        let metadata = parts.next().unwrap_or(b"");
        let body = parts.next().unwrap_or(b"");

        let mut id = String::new();
        let mut done = true;
        let mut kind = PayloadKind::Title;
        let mut base64_payload = false;
        let mut actions_report = false;
        let mut actions_focus = true;
        let mut meta: Vec<(String, String)> = Vec::new();

        for item in metadata.split(|&b| b == b':') {
            if item.is_empty() {
                continue;
            }
            let mut halves = item.splitn(2, |&b| b == b'=');
            let key = halves.next().unwrap_or(b"");
            let value = halves.next().unwrap_or(b"");
            let key = String::from_utf8_lossy(key).trim().to_string();
            let value = String::from_utf8_lossy(value).trim().to_string();
            match key.as_str() {
                "i" => id = sanitize_identifier(&value),
                "d" => done = value != "0",
                "e" => base64_payload = value == "1",
                "p" => {
                    kind = match value.as_str() {
                        "title" => PayloadKind::Title,
                        "body" => PayloadKind::Body,
                        "icon" => PayloadKind::Icon,
                        "close" => PayloadKind::Close,
                        "alive" => PayloadKind::Alive,
                        "buttons" => PayloadKind::Buttons,
                        "?" => PayloadKind::Query,
                        other => {
                            debug!(kind = other, "ignoring unknown payload kind");
                            PayloadKind::Ignored
                        }
                    };
                }
                "a" => {
                    for action in value.split(',') {
                        let (disable, name) = match action.strip_prefix('-') {
                            Some(rest) => (true, rest),
                            None => (false, action),
                        };
                        match name {
                            "report" => actions_report = !disable,
                            "focus" => actions_focus = !disable,
                            other => debug!(action = other, "ignoring unknown action"),
                        }
                    }
                }
                _ => meta.push((key, value)),
            }
        }
        let _ = actions_focus;

        match kind {
            PayloadKind::Query => {
                self.send_query_response(&id, responses);
                return;
            }
            PayloadKind::Close => {
                events.push(TermEvent::NotifyClose(id));
                return;
            }
            PayloadKind::Alive | PayloadKind::Ignored => return,
            _ => {}
        }

        let decoded = if base64_payload {
            match BASE64.decode(body) {
                Ok(data) => data,
                Err(e) => {
                    debug!(error = %e, "discarding notification chunk with bad base64");
                    return;
                }
            }
        } else {
            body.to_vec()
        };
        if decoded.len() > MAX_CHUNK_BYTES {
            debug!(len = decoded.len(), "notification chunk over the limit");
            return;
        }
        let text = strip_controls(&String::from_utf8_lossy(&decoded));

        if self.pending.len() >= MAX_PENDING && !self.pending.contains_key(&id) {
            self.pending.clear();
        }
        let entry = self.pending.entry(id.clone()).or_default();
        entry.notification.id.clone_from(&id);
        entry.notification.report_activation |= actions_report;
        match kind {
            PayloadKind::Title => entry.notification.title.push_str(&text),
            PayloadKind::Body => entry.notification.body.push_str(&text),
            PayloadKind::Icon => entry.icon_data.extend_from_slice(&decoded),
            PayloadKind::Buttons => {
                entry
                    .notification
                    .buttons
                    .extend(text.split('\u{2028}').map(str::to_string));
            }
            _ => {}
        }

        for (key, value) in &meta {
            apply_meta(&mut entry.notification, key, value);
        }

        if done {
            if let Some(pending) = self.pending.remove(&id) {
                events.push(TermEvent::Notify(pending.notification));
            }
        }
    }

    /// Report an activation (possibly with a button index) back to
    /// the application.
    pub fn report_activation(id: &str, button: Option<usize>, responses: &mut Vec<u8>) {
        let id = sanitize_identifier(id);
        responses.extend_from_slice(b"\x1b]99;i=");
        responses.extend_from_slice(id.as_bytes());
        responses.extend_from_slice(b";");
        if let Some(button) = button {
            responses.extend_from_slice(button.to_string().as_bytes());
        }
        responses.extend_from_slice(b"\x1b\\");
    }

    /// Report a closure (`c=1` notifications only; the screen checks).
    pub fn report_close(id: &str, responses: &mut Vec<u8>) {
        let id = sanitize_identifier(id);
        responses.extend_from_slice(b"\x1b]99;i=");
        responses.extend_from_slice(id.as_bytes());
        responses.extend_from_slice(b":p=close;\x1b\\");
    }

    fn send_query_response(&self, id: &str, responses: &mut Vec<u8>) {
        let id = sanitize_identifier(id);
        responses.extend_from_slice(b"\x1b]99;i=");
        responses.extend_from_slice(id.as_bytes());
        responses.extend_from_slice(
            b":p=?;a=report,focus:o=always,unfocused,invisible:u=0,1,2:p=title,body,icon,close,alive,buttons:c=1:w=1\x1b\\",
        );
    }
}

fn apply_meta(notification: &mut Notification, key: &str, value: &str) {
    match key {
        "u" => {
            notification.urgency = match value {
                "0" => Urgency::Low,
                "2" => Urgency::Critical,
                _ => Urgency::Normal,
            };
        }
        "o" => {
            notification.occasion = match value {
                "unfocused" => Occasion::Unfocused,
                "invisible" => Occasion::Invisible,
                _ => Occasion::Always,
            };
        }
        "w" => notification.expiry_ms = value.parse().unwrap_or(-1),
        "c" => notification.report_close = value == "1",
        "s" => notification.sound = Some(value.to_string()),
        "f" => {
            if let Ok(decoded) = BASE64.decode(value) {
                notification.app_name = Some(String::from_utf8_lossy(&decoded).into_owned());
            }
        }
        "t" => notification
            .notification_types
            .push(value.to_string()),
        "n" => {
            if let Ok(decoded) = BASE64.decode(value) {
                notification
                    .icon_names
                    .push(String::from_utf8_lossy(&decoded).into_owned());
            }
        }
        "g" => notification.icon_cache_id = Some(sanitize_identifier(value)),
        other => debug!(key = other, "ignoring unknown notification key"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(dispatcher: &mut NotificationDispatcher, payloads: &[&[u8]]) -> Vec<TermEvent> {
        let mut events = Vec::new();
        let mut responses = Vec::new();
        for p in payloads {
            dispatcher.handle(p, &mut events, &mut responses);
        }
        events
    }

    #[test]
    fn chunked_title_and_body() {
        let mut d = NotificationDispatcher::new();
        let events = run(
            &mut d,
            &[b"i=abc:d=0;Hel", b"i=abc:d=1:p=body;lo"],
        );
        assert_eq!(events.len(), 1);
        match &events[0] {
            TermEvent::Notify(n) => {
                assert_eq!(n.id, "abc");
                assert_eq!(n.title, "Hel");
                assert_eq!(n.body, "lo");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn close_event() {
        let mut d = NotificationDispatcher::new();
        let events = run(&mut d, &[b"i=abc:p=close;"]);
        assert_eq!(events, vec![TermEvent::NotifyClose("abc".into())]);
    }

    #[test]
    fn identifier_is_sanitized() {
        let mut d = NotificationDispatcher::new();
        let events = run(&mut d, &[b"i=ab\x1bc;$(rm);t"]);
        match &events[0] {
            TermEvent::Notify(n) => assert_eq!(n.id, "abc"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn base64_payload() {
        let mut d = NotificationDispatcher::new();
        let events = run(&mut d, &[b"i=x:e=1;aGVsbG8="]);
        match &events[0] {
            TermEvent::Notify(n) => assert_eq!(n.title, "hello"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn controls_stripped_from_text() {
        let mut d = NotificationDispatcher::new();
        let events = run(&mut d, &[b"i=x;a\x07b"]);
        match &events[0] {
            TermEvent::Notify(n) => assert_eq!(n.title, "ab"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn oversized_chunk_dropped() {
        let mut d = NotificationDispatcher::new();
        let big = vec![b'x'; 4096];
        let mut payload = b"i=x:d=1;".to_vec();
        payload.extend_from_slice(&big);
        let events = run(&mut d, &[&payload]);
        // The chunk is discarded, but d=1 never assembled anything,
        // so no event fires.
        assert!(events.is_empty());
    }

    #[test]
    fn unknown_keys_and_kinds_ignored() {
        let mut d = NotificationDispatcher::new();
        let events = run(&mut d, &[b"i=x:zz=1:p=species;t"]);
        assert!(events.is_empty(), "unknown payload kind contributes nothing");
        let events = run(&mut d, &[b"i=x:zz=9;title"]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn urgency_and_expiry() {
        let mut d = NotificationDispatcher::new();
        let events = run(&mut d, &[b"i=x:u=2:w=5000;t"]);
        match &events[0] {
            TermEvent::Notify(n) => {
                assert_eq!(n.urgency, Urgency::Critical);
                assert_eq!(n.expiry_ms, 5000);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn query_produces_response() {
        let mut d = NotificationDispatcher::new();
        let mut events = Vec::new();
        let mut responses = Vec::new();
        d.handle(b"i=q1:p=?;", &mut events, &mut responses);
        let s = String::from_utf8(responses).unwrap();
        assert!(s.starts_with("\x1b]99;i=q1:p=?;"));
        assert!(s.contains("a=report"));
    }

    #[test]
    fn activation_report_format() {
        let mut responses = Vec::new();
        NotificationDispatcher::report_activation("abc", Some(2), &mut responses);
        assert_eq!(responses, b"\x1b]99;i=abc;2\x1b\\");
    }
}
