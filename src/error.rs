//! Error handling for particle ingestion.
//!
//! Provides the error taxonomy for sieve, validation, decode, and
//! range-accounting failures. Header and cursor-restore failures are fatal
//! and propagate to the constructor caller; per-record failures during
//! steady-state streaming are reported through the parser's error channel
//! and never halt ingestion of the rest of the file.

use thiserror::Error;

use crate::cursor::ByteRange;

/// Result type alias for particle ingestion operations
pub type Result<T> = std::result::Result<T, ParseError>;

/// Error types for instrument-log parsing operations
#[derive(Error, Debug)]
pub enum ParseError {
    /// I/O operation on the byte source failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File header does not match the expected format; fatal at construction
    #[error("file header does not match the {format} format: {reason}")]
    Header { format: &'static str, reason: String },

    /// Buffer cannot be sieved; structurally unrecoverable for this pass
    #[error("buffer cannot be sieved at offset {offset}: {reason}")]
    Format { offset: u64, reason: String },

    /// A candidate record's bytes failed the structural validator
    #[error("record validation failed in bytes [{start}, {end}): {reason}")]
    Validation { start: u64, end: u64, reason: String },

    /// The validator matched but field unpacking failed
    #[error("record decode failed in bytes [{start}, {end}): {reason}")]
    Decode { start: u64, end: u64, reason: String },

    /// Non-data bytes found interleaved with valid records
    #[error("found {len} bytes of unexpected non-data at offset {offset}")]
    UnexpectedData { offset: u64, len: usize },

    /// Byte-range tracker invariant violation; indicates an accounting bug
    #[error("byte range accounting violation: {reason}")]
    Range { reason: String },

    /// Persisted cursor state failed validation on restore
    #[error("invalid cursor state: {reason}")]
    InvalidState { reason: String },

    /// Cursor serialization failed
    #[error("cursor serialization error: {0}")]
    CursorSerialization(#[from] serde_json::Error),
}

impl ParseError {
    /// Create a fatal header mismatch error
    pub fn header(format: &'static str, reason: impl Into<String>) -> Self {
        Self::Header {
            format,
            reason: reason.into(),
        }
    }

    /// Create a sieve failure error for the buffer starting at `offset`
    pub fn format(offset: u64, reason: impl Into<String>) -> Self {
        Self::Format {
            offset,
            reason: reason.into(),
        }
    }

    /// Create a validation error for the record bytes in `range`
    pub fn validation(range: ByteRange, reason: impl Into<String>) -> Self {
        Self::Validation {
            start: range.start,
            end: range.end,
            reason: reason.into(),
        }
    }

    /// Create a decode error for the record bytes in `range`
    pub fn decode(range: ByteRange, reason: impl Into<String>) -> Self {
        Self::Decode {
            start: range.start,
            end: range.end,
            reason: reason.into(),
        }
    }

    /// Create an unexpected non-data error for the bytes in `range`
    pub fn unexpected_data(range: ByteRange) -> Self {
        Self::UnexpectedData {
            offset: range.start,
            len: range.len() as usize,
        }
    }

    /// Create a range accounting error
    pub fn range(reason: impl Into<String>) -> Self {
        Self::Range {
            reason: reason.into(),
        }
    }

    /// Create an invalid cursor state error
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }
}
