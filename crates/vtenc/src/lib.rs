//! Framing and byte-level codecs for VT control sequences.
//!
//! Everything the emulator writes back to the PTY (key reports, mouse
//! reports, query replies, graphics responses) goes through the helpers in
//! this crate. The macros frame a sequence with the proper introducer and
//! terminator at compile time; the [`encode`] module writes parameters
//! without heap allocation.

#![warn(clippy::pedantic)]

pub mod encode;
pub mod parse;

pub use encode::{Encode, EncodeError, write_bytes_into, write_int, write_str_into};
pub use parse::{ParseError, keyvalue_pairs, parse_int};

/// Concatenate string literals after a Control Sequence Introducer
/// (`"\x1b["`).
#[macro_export]
macro_rules! csi {
    ($($arg:expr),+ $(,)?) => {
        concat!("\x1B[", $($arg),+)
    };
}

/// Concatenate string literals after an Operating System Command
/// introducer (`"\x1b]"`), appending a string terminator (`"\x1b\\"`).
#[macro_export]
macro_rules! osc {
    ($($arg:expr),+ $(,)?) => {
        concat!("\x1B]", $($arg),+, "\x1B\\")
    };
}

/// Concatenate string literals after an Application Program Command
/// introducer (`"\x1b_"`), appending a string terminator (`"\x1b\\"`).
#[macro_export]
macro_rules! apc {
    ($($arg:expr),+ $(,)?) => {
        concat!("\x1B_", $($arg),+, "\x1B\\")
    };
}

/// Concatenate string literals after a Single Shift 3 introducer
/// (`"\x1bO"`). Used by application cursor-key and keypad reports.
#[macro_export]
macro_rules! ss3 {
    ($($arg:expr),+ $(,)?) => {
        concat!("\x1BO", $($arg),+)
    };
}

/// Write a CSI sequence into a sink without heap allocation.
///
/// Items are written in order after the introducer; string literals and
/// integers are both accepted.
///
/// ```ignore
/// write_csi!(buf; row, ";", col, "H")     // ESC[row;colH
/// ```
#[macro_export]
macro_rules! write_csi {
    ($buf:expr; $($item:expr),* $(,)?) => {{
        (|| -> Result<usize, $crate::encode::EncodeError> {
            let mut __n = 0usize;
            __n += $crate::encode::write_str_into($buf, "\x1B[")?;
            $(
                __n += $crate::encode::Encode::encode_into(&($item), $buf)?;
            )*
            Ok(__n)
        })()
    }};
}

/// Write an OSC sequence into a sink without heap allocation, including
/// the trailing string terminator.
#[macro_export]
macro_rules! write_osc {
    ($buf:expr; $($item:expr),* $(,)?) => {{
        (|| -> Result<usize, $crate::encode::EncodeError> {
            let mut __n = 0usize;
            __n += $crate::encode::write_str_into($buf, "\x1B]")?;
            $(
                __n += $crate::encode::Encode::encode_into(&($item), $buf)?;
            )*
            __n += $crate::encode::write_str_into($buf, "\x1B\\")?;
            Ok(__n)
        })()
    }};
}

/// Write an APC sequence into a sink without heap allocation, including
/// the trailing string terminator.
#[macro_export]
macro_rules! write_apc {
    ($buf:expr; $($item:expr),* $(,)?) => {{
        (|| -> Result<usize, $crate::encode::EncodeError> {
            let mut __n = 0usize;
            __n += $crate::encode::write_str_into($buf, "\x1B_")?;
            $(
                __n += $crate::encode::Encode::encode_into(&($item), $buf)?;
            )*
            __n += $crate::encode::write_str_into($buf, "\x1B\\")?;
            Ok(__n)
        })()
    }};
}
