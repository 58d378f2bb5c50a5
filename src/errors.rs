use std::{fmt, sync::Arc};

/// Top-level error of the crate.
///
/// Server-side errors are *not* represented here: a request the server
/// rejected still produces a [`crate::Response`] whose body carries the
/// error stack. `Error` covers everything that prevents a response from
/// being delivered at all.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(Arc<std::io::Error>),
    /// The inbound stream is unrecoverable (e.g. corrupted frame length).
    /// The connection is closed.
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Decoding error: {0}")]
    Decode(#[from] DecodingError),
    #[error("Encoding error: {0}")]
    Encode(#[from] EncodingError),
    #[error("Wait timed out")]
    Timeout,
    #[error("Connection is not established")]
    NotConnected,
    #[error("{0}")]
    Other(Arc<anyhow::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Connection(Arc::new(value))
    }
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Other(Arc::new(value))
    }
}

impl From<OutOfMemory> for Error {
    fn from(value: OutOfMemory) -> Self {
        Error::Encode(EncodingError::from(value))
    }
}

/// Chunk allocation failure, reported by [`crate::Allocator`] impls.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Out of memory")]
pub struct OutOfMemory;

/// Errors of encoding values into MessagePack.
#[derive(Clone, Debug, thiserror::Error)]
pub enum EncodingError {
    #[error(transparent)]
    OutOfMemory(#[from] OutOfMemory),
    #[error("Value {0} does not fit into a single MessagePack tag byte")]
    FixnumRange(i64),
}

/// Recoverable MessagePack decoding error. The offending frame is skipped,
/// the connection stays usable.
#[derive(Clone, Debug, thiserror::Error)]
pub enum DecodingError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: &'static str,
        got: String,
    },
    #[error("Value of type {0} does not fit the requested numeric range")]
    NumberRange(&'static str),
    #[error("Unknown MessagePack marker 0x{0:02x}")]
    UnknownMarker(u8),
    #[error("{0}")]
    Message(String),
}

impl DecodingError {
    pub(crate) fn type_mismatch(expected: &'static str, got: impl fmt::Display) -> Self {
        Self::TypeMismatch {
            expected,
            got: got.to_string(),
        }
    }

    pub(crate) fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

/// Per-connection error slot contents.
///
/// Mirrors what the failed operation reported: a human readable message plus
/// the saved `errno` when the failure came from a syscall.
#[derive(Clone, Debug, Default)]
pub struct ConnError {
    pub msg: String,
    pub saved_errno: i32,
}

impl ConnError {
    pub(crate) fn new(msg: impl Into<String>, saved_errno: i32) -> Self {
        Self {
            msg: msg.into(),
            saved_errno,
        }
    }
}

impl fmt::Display for ConnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.saved_errno != 0 {
            write!(f, "{} (errno {})", self.msg, self.saved_errno)
        } else {
            write!(f, "{}", self.msg)
        }
    }
}
