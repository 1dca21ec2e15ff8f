use std::io;

use crate::types::StreamId;

/// Unified error type for pool and stream operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Pool options rejected at construction time
    #[error("Invalid option {option}: {message}")]
    InvalidOption {
        option: &'static str,
        message: String,
    },

    /// The system allocator could not provide the requested memory.
    /// Fatal: the pool never retries.
    #[error("Out of memory allocating {requested} bytes")]
    OutOfMemory { requested: usize },

    /// Operation attempted on a stream after it was released
    #[error("Stream {id} has already been released")]
    StreamReleased { id: StreamId },

    /// Strict read extending beyond the logical length
    #[error("Read past end: offset {offset} + {requested} bytes exceeds length {length}")]
    ReadPastEnd {
        offset: usize,
        requested: usize,
        length: usize,
    },

    /// Seek resolved to a position before the start of the stream
    #[error("Seek to negative position {position}")]
    NegativeSeek { position: i128 },

    /// Stream growth beyond the configured per-stream cap
    #[error("Stream capacity exceeded: requested {requested}, maximum {maximum}")]
    CapacityExceeded { requested: usize, maximum: usize },

    /// I/O error from a collaborator writer or reader
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create an invalid option error
    pub fn invalid_option(option: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidOption {
            option,
            message: message.into(),
        }
    }

    /// Whether the error is a caller mistake rather than an environmental failure
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Error::StreamReleased { .. }
                | Error::ReadPastEnd { .. }
                | Error::NegativeSeek { .. }
                | Error::CapacityExceeded { .. }
        )
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        let kind = match &e {
            Error::Io(inner) => inner.kind(),
            Error::OutOfMemory { .. } => io::ErrorKind::OutOfMemory,
            Error::ReadPastEnd { .. } => io::ErrorKind::UnexpectedEof,
            Error::NegativeSeek { .. } | Error::InvalidOption { .. } => {
                io::ErrorKind::InvalidInput
            }
            Error::StreamReleased { .. } | Error::CapacityExceeded { .. } => {
                io::ErrorKind::Other
            }
        };
        match e {
            Error::Io(inner) => inner,
            other => io::Error::new(kind, other),
        }
    }
}

/// Result type alias for pool operations
pub type Result<T> = std::result::Result<T, Error>;
