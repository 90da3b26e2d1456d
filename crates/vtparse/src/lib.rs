//! Streaming parser for the VT escape-code grammar.
//!
//! Bytes from the PTY are decoded to Unicode scalars and run through the
//! published VT500-series state machine, extended with long OSC/DCS/APC
//! payload capture and a buffered "pending" mode for synchronized screen
//! updates (DECSET 2026).
//!
//! The parser is a plain state-machine record: it may be fed any byte
//! split, carries partial UTF-8 and partial sequences across calls, and
//! emits tokens through the [`TokenSink`] callback trait so that token
//! payloads can borrow the input buffer.

#![warn(clippy::pedantic)]

pub mod decode;
pub mod params;
pub mod parser;
pub mod pending;
pub mod token;

pub use decode::{CharClass, Utf8Decoder, classify};
pub use params::Params;
pub use parser::{Parser, ParserConfig};
pub use pending::PendingConfig;
pub use token::{StringKind, TokenSink};
