//! Error types for Geode client operations.

use std::io;
use thiserror::Error;

/// The main error type for Geode client operations.
#[derive(Debug, Error)]
pub enum GeodeError {
    /// Malformed or unsupported data encountered while encoding or decoding.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A read ran past the end of the buffer.
    #[error("serialization error: buffer underflow (need {needed} bytes, have {remaining})")]
    BufferUnderflow {
        /// Bytes the read required.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A PDX type id that this process has not registered or fetched.
    #[error("PDX type not found: {0}")]
    TypeNotFound(i32),

    /// The client reached a state that indicates a programming or metadata bug.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Configuration errors (invalid settings).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A server-bound call did not complete in time.
    #[error("timeout error: {0}")]
    Timeout(String),

    /// Protocol-related errors (unexpected message contents).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl GeodeError {
    /// Returns true for errors caused by corrupt or mismatched encoded data.
    pub fn is_serialization(&self) -> bool {
        matches!(
            self,
            GeodeError::Serialization(_) | GeodeError::BufferUnderflow { .. }
        )
    }

    /// Returns true if the operation may succeed after a type or metadata refresh.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GeodeError::TypeNotFound(_) | GeodeError::Timeout(_))
    }
}

/// A specialized `Result` type for Geode operations.
pub type Result<T> = std::result::Result<T, GeodeError>;
