//! The terminal emulation engine.
//!
//! `vtemu` wires the pipeline together: PTY bytes go through the
//! escape-code parser into the screen state machine; the render layer
//! takes consistent snapshots; the input reporter turns user events
//! into PTY bytes. The engine owns no window, font, or GPU resources;
//! it trades in [`RenderDescriptor`]s and event records.

#![warn(clippy::pedantic)]

pub mod config;
pub mod render;
pub mod session;
pub mod terminal;

pub use config::Config;
pub use render::{CursorState, RenderCell, RenderDescriptor, VisiblePlacement};
pub use session::Session;
pub use terminal::Terminal;

pub use vtreport::{InputModes, KeyCode, KeyEvent, KeyEventKind, Modifiers};
pub use vtscreen::{TERM_NAME, TERM_VERSION, TermEvent};
