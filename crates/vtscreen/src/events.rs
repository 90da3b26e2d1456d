//! Event records the screen emits for its embedder.
//!
//! The core never rings a speaker, sets a window title, or talks to a
//! clipboard daemon itself; it produces these records and a backend
//! carries them out.

/// Which clipboard an OSC 52 command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardTarget {
    Clipboard,
    Primary,
}

/// Urgency for desktop notifications (OSC 99 `u=`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    Critical,
}

/// When a notification may be shown (OSC 99 `o=`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Occasion {
    #[default]
    Always,
    Unfocused,
    Invisible,
}

/// A complete desktop notification ready for the OS notifier.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Notification {
    /// Sanitized identifier; safe to echo back.
    pub id: String,
    pub title: String,
    pub body: String,
    pub urgency: Urgency,
    pub occasion: Occasion,
    /// Auto-expiry in ms; negative means OS default, 0 never.
    pub expiry_ms: i64,
    /// Report activation back to the application.
    pub report_activation: bool,
    /// Report closure back to the application.
    pub report_close: bool,
    pub sound: Option<String>,
    pub app_name: Option<String>,
    pub notification_types: Vec<String>,
    pub icon_names: Vec<String>,
    pub icon_cache_id: Option<String>,
    pub buttons: Vec<String>,
}

/// Outgoing side effects, drained by the embedder after each feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermEvent {
    /// BEL or the visual-bell escape; the backend beeps or flashes.
    Bell,
    TitleChanged(String),
    IconTitleChanged(String),
    /// A complete notification to hand to the OS.
    Notify(Notification),
    /// The application closed a notification by id.
    NotifyClose(String),
    /// Set a system clipboard from OSC 52 (decoded bytes).
    ClipboardSet(ClipboardTarget, Vec<u8>),
    /// The application asked to read the clipboard; policy decides
    /// whether the backend answers.
    ClipboardQuery(ClipboardTarget),
}
