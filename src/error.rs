use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    IoError(io::Error),
    Decode(&'static str, io::Error),
    Encode(&'static str, io::Error),
    ChecksumMismatch,
    /// Tree is empty, a node is missing or a block is missing.
    NotFound(String),
    /// Default-mode insert hit an existing, non-deleted key.
    UniqueViolation(String),
    /// Root split attempted at the configured maximum height.
    CapacityExceeded(String),
    /// A stored reference cannot be resolved or a record is inconsistent.
    Corrupt(String),
    InvalidArgument(String),
}

/// The caller-facing error taxonomy. Codec plumbing collapses into `Corrupt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    UniqueViolation,
    CapacityExceeded,
    Corrupt,
    InvalidArgument,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::IoError(_) | Error::Encode(..) => ErrorKind::Io,
            Error::Decode(..) | Error::ChecksumMismatch | Error::Corrupt(_) => ErrorKind::Corrupt,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::UniqueViolation(_) => ErrorKind::UniqueViolation,
            Error::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::Decode(field, err) => write!(f, "Failed to decode {}: {}", field, err),
            Error::Encode(field, err) => write!(f, "Failed to encode {}: {}", field, err),
            Error::ChecksumMismatch => write!(f, "Checksum mismatch"),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::UniqueViolation(msg) => write!(f, "Unique violation: {}", msg),
            Error::CapacityExceeded(msg) => write!(f, "Capacity exceeded: {}", msg),
            Error::Corrupt(msg) => write!(f, "Corrupt: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
