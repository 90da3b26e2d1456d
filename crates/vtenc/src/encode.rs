//! Allocation-free writing of control-sequence parameters.

use core::fmt;
use std::io;

/// Error produced when encoding into an undersized sink fails.
#[derive(Debug)]
pub enum EncodeError {
    /// The sink could not hold the encoded bytes; carries the number of
    /// bytes that did not fit.
    Overflow(usize),
    /// The sink reported an I/O error.
    Io(io::Error),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::Overflow(n) => {
                write!(f, "sink overflow: {n} bytes could not be written")
            }
            EncodeError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EncodeError::Io(e) => Some(e),
            EncodeError::Overflow(_) => None,
        }
    }
}

impl From<EncodeError> for io::Error {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::Overflow(n) => io::Error::new(
                io::ErrorKind::WriteZero,
                format!("sink overflow: {n} bytes could not be written"),
            ),
            EncodeError::Io(e) => e,
        }
    }
}

/// Copy a byte slice into the sink, returning the number of bytes written.
///
/// # Errors
///
/// Returns [`EncodeError::Overflow`] when the sink is a fixed slice that
/// cannot hold the data.
#[inline]
pub fn write_bytes_into<W: io::Write + ?Sized>(
    sink: &mut W,
    bytes: &[u8],
) -> Result<usize, EncodeError> {
    match sink.write(bytes) {
        Err(ref e) if e.kind() == io::ErrorKind::WriteZero => {
            Err(EncodeError::Overflow(bytes.len()))
        }
        Err(e) => Err(EncodeError::Io(e)),
        Ok(n) if n < bytes.len() => Err(EncodeError::Overflow(bytes.len() - n)),
        Ok(n) => Ok(n),
    }
}

/// Copy a UTF-8 string into the sink, returning the number of bytes written.
///
/// # Errors
///
/// See [`write_bytes_into`].
#[inline]
pub fn write_str_into<W: io::Write + ?Sized>(sink: &mut W, s: &str) -> Result<usize, EncodeError> {
    write_bytes_into(sink, s.as_bytes())
}

/// Write an integer to the sink without allocation, via `itoa`.
///
/// # Errors
///
/// See [`write_bytes_into`].
#[inline]
pub fn write_int<W: io::Write + ?Sized>(
    sink: &mut W,
    value: impl itoa::Integer,
) -> Result<usize, EncodeError> {
    let mut buffer = itoa::Buffer::new();
    write_str_into(sink, buffer.format(value))
}

/// A value that can be written as part of a control sequence.
///
/// Implemented for string slices, integers, and `char` so that the
/// `write_csi!` family of macros can interleave literals and parameters
/// without formatting machinery.
pub trait Encode {
    /// Write this value into the sink, returning the number of bytes
    /// written.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink is too small or reports I/O failure.
    fn encode_into<W: io::Write + ?Sized>(&self, sink: &mut W) -> Result<usize, EncodeError>;
}

impl Encode for &str {
    #[inline]
    fn encode_into<W: io::Write + ?Sized>(&self, sink: &mut W) -> Result<usize, EncodeError> {
        write_str_into(sink, self)
    }
}

impl Encode for String {
    #[inline]
    fn encode_into<W: io::Write + ?Sized>(&self, sink: &mut W) -> Result<usize, EncodeError> {
        write_str_into(sink, self)
    }
}

impl Encode for char {
    #[inline]
    fn encode_into<W: io::Write + ?Sized>(&self, sink: &mut W) -> Result<usize, EncodeError> {
        let mut buf = [0u8; 4];
        write_str_into(sink, self.encode_utf8(&mut buf))
    }
}

impl Encode for &[u8] {
    #[inline]
    fn encode_into<W: io::Write + ?Sized>(&self, sink: &mut W) -> Result<usize, EncodeError> {
        write_bytes_into(sink, self)
    }
}

macro_rules! encode_int {
    ($($t:ty),+ $(,)?) => {
        $(
            impl Encode for $t {
                #[inline]
                fn encode_into<W: io::Write + ?Sized>(
                    &self,
                    sink: &mut W,
                ) -> Result<usize, EncodeError> {
                    write_int(sink, *self)
                }
            }
        )+
    };
}

encode_int!(u8, i8, u16, i16, u32, i32, u64, i64, usize, isize);

impl<T: Encode> Encode for &T {
    #[inline]
    fn encode_into<W: io::Write + ?Sized>(&self, sink: &mut W) -> Result<usize, EncodeError> {
        (**self).encode_into(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn write_int_formats_without_alloc() {
        let mut buf = Vec::new();
        write_int(&mut buf, 1_073_741_824u32).unwrap();
        assert_eq!(buf, b"1073741824");
    }

    #[test]
    fn slice_sink_overflow_is_reported() {
        let mut storage = [0u8; 3];
        let mut sink = &mut storage[..];
        let err = write_str_into(&mut sink, "abcdef").unwrap_err();
        assert!(matches!(err, EncodeError::Overflow(_)));
    }

    #[test]
    fn negative_ints_roundtrip() {
        let mut buf = Vec::new();
        write_int(&mut buf, -1_073_741_824i32).unwrap();
        assert_eq!(buf, b"-1073741824");
    }
}
