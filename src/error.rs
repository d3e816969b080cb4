//! The error type shared by every kernel, codec, and container in the crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by kernels, codecs, and buffers.
///
/// Variants follow the kind of failure rather than where it arose; callers that
/// need to branch on the kind should use [`Error::kind`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Overflow or truncation with checks enabled, out-of-range dictionary
    /// indices, insertion into a non-expanding memo, or malformed input.
    #[error("Invalid: {0}")]
    Invalid(String),

    /// No rule exists for the requested type or type pair.
    #[error("NotImplemented: {0}")]
    NotImplemented(String),

    /// Physical layout disagrees with the declared logical type.
    #[error("Type error: {0}")]
    TypeError(String),

    /// A reader ran out of input while decoding a declared run.
    #[error("Unexpected end of input: {0}")]
    Eof(String),

    /// A caller-supplied buffer is too small, or an offset would exceed its limit.
    #[error("Capacity error: {0}")]
    Capacity(String),

    /// A lookup by id found nothing.
    #[error("Key error: {0}")]
    KeyError(String),

    /// The memory pool refused a reservation.
    #[error("Out of memory: requested {requested} bytes with {allocated} of {limit} bytes in use")]
    OutOfMemory { requested: usize, allocated: usize, limit: usize },
}

/// The discriminant of an [`Error`], without its message.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Invalid,
    NotImplemented,
    TypeError,
    Eof,
    Capacity,
    KeyError,
    OutOfMemory,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Invalid(_) => ErrorKind::Invalid,
            Error::NotImplemented(_) => ErrorKind::NotImplemented,
            Error::TypeError(_) => ErrorKind::TypeError,
            Error::Eof(_) => ErrorKind::Eof,
            Error::Capacity(_) => ErrorKind::Capacity,
            Error::KeyError(_) => ErrorKind::KeyError,
            Error::OutOfMemory { .. } => ErrorKind::OutOfMemory,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self { Error::Invalid(msg.into()) }
    pub fn not_implemented(msg: impl Into<String>) -> Self { Error::NotImplemented(msg.into()) }
    pub fn type_error(msg: impl Into<String>) -> Self { Error::TypeError(msg.into()) }
    pub fn eof(msg: impl Into<String>) -> Self { Error::Eof(msg.into()) }
    pub fn capacity(msg: impl Into<String>) -> Self { Error::Capacity(msg.into()) }
    pub fn key_error(msg: impl Into<String>) -> Self { Error::KeyError(msg.into()) }
}
