
//! Error type and conversion helpers.
//! Re-exported in the crate prelude.

use std::borrow::Cow;
use std::convert::TryFrom;
use std::error;
use std::fmt;
use std::io;
use std::io::ErrorKind;

/// A result that may contain an error of this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains an error of this crate.
pub type UnitResult = Result<()>;

/// A raw std io result, for functions that do not interpret the bytes they move.
pub type IoResult<T> = io::Result<T>;


/// An error that may happen while reading or writing an exr file.
#[derive(Debug)]
pub enum Error {

    /// The contents of the file are valid exr,
    /// but this implementation does not handle that feature.
    NotSupported(Cow<'static, str>),

    /// The contents of the file are contradicting or insufficient.
    /// Also returned when the file ends in the middle of a record.
    Invalid(Cow<'static, str>),

    /// The underlying byte stream could not be read or written,
    /// probably due to file system related errors.
    Io(io::Error),
}


impl Error {

    /// Create an error of the variant `Invalid`.
    pub(crate) fn invalid(message: impl Into<Cow<'static, str>>) -> Self {
        Error::Invalid(message.into())
    }

    /// Create an error of the variant `NotSupported`.
    pub(crate) fn unsupported(message: impl Into<Cow<'static, str>>) -> Self {
        Error::NotSupported(message.into())
    }
}

/// Enable using the `?` operator on `io::Result`.
/// An unexpected end of the stream means the file itself is incomplete,
/// so it maps to `Invalid` instead of `Io`.
impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        if error.kind() == ErrorKind::UnexpectedEof {
            Error::invalid("reference to missing bytes")
        }
        else {
            Error::Io(error)
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Io(ref err) => err.fmt(formatter),
            Error::NotSupported(ref message) => write!(formatter, "not supported: {}", message),
            Error::Invalid(ref message) => write!(formatter, "invalid: {}", message),
        }
    }
}

/// Return an invalid error on negative values.
#[inline]
pub(crate) fn i32_to_usize(value: i32, error_message: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::invalid(error_message))
}

/// Panic on overflow.
#[inline]
pub(crate) fn usize_to_i32(value: usize) -> i32 {
    i32::try_from(value).expect("usize to i32 overflow")
}

/// Panic on overflow.
#[inline]
pub(crate) fn usize_to_u64(value: usize) -> u64 {
    u64::try_from(value).expect("usize to u64 overflow")
}

/// Panic on overflow.
#[inline]
pub(crate) fn u64_to_usize(value: u64) -> usize {
    usize::try_from(value).expect("u64 to usize overflow")
}
