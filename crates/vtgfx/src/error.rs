//! Coded errors for graphics-protocol responses.

use core::fmt;

/// The wire-visible error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Referenced image or file does not exist.
    Enoent,
    /// Refused for security reasons (non-regular file, forbidden path).
    Eperm,
    /// I/O failure reading image data.
    Eio,
    /// Malformed or contradictory command arguments.
    Einval,
    /// Image quota exhausted and the new image alone exceeds it.
    Enospc,
    /// Relative-placement chain exceeds the supported depth.
    Etoodeep,
    /// Relative placement would create a cycle.
    Ecycle,
    /// Relative placement references a missing parent.
    Enoparent,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Enoent => "ENOENT",
            ErrorCode::Eperm => "EPERM",
            ErrorCode::Eio => "EIO",
            ErrorCode::Einval => "EINVAL",
            ErrorCode::Enospc => "ENOSPC",
            ErrorCode::Etoodeep => "ETOODEEP",
            ErrorCode::Ecycle => "ECYCLE",
            ErrorCode::Enoparent => "ENOPARENT",
        }
    }
}

/// A rejected graphics command: code plus a human-readable message,
/// serialized as `CODE:message` in the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsError {
    pub code: ErrorCode,
    pub message: String,
}

impl GraphicsError {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for GraphicsError {}

/// Shorthand constructors used across the store.
macro_rules! error_ctor {
    ($($fn_name:ident => $code:ident),+ $(,)?) => {
        impl GraphicsError {
            $(
                #[must_use]
                pub fn $fn_name(message: impl Into<String>) -> Self {
                    Self::new(ErrorCode::$code, message)
                }
            )+
        }
    };
}

error_ctor! {
    enoent => Enoent,
    eperm => Eperm,
    eio => Eio,
    einval => Einval,
    enospc => Enospc,
    etoodeep => Etoodeep,
    ecycle => Ecycle,
    enoparent => Enoparent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_code_colon_message() {
        let e = GraphicsError::einval("i and I are mutually exclusive");
        assert_eq!(e.to_string(), "EINVAL:i and I are mutually exclusive");
    }
}
