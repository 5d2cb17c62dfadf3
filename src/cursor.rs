//! Serializable parser cursor state.
//!
//! The cursor is the sole externally persisted unit of parser state.
//! Restoring a cursor into a fresh parser over the same file and continuing
//! to read reproduces the identical sequence of future particles that an
//! uninterrupted run would have produced from that point forward.
//!
//! The persisted JSON layout is the only format-compatibility-sensitive
//! surface of this crate: byte ranges serialize as two-element
//! `[start, end]` arrays, in-process ranges as four-element
//! `[start, end, read_count, fill_count]` arrays.

use serde::{Deserialize, Serialize};

use crate::error::{ParseError, Result};

/// A half-open `[start, end)` span of absolute file-byte offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u64, u64)", into = "(u64, u64)")]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "byte range start must not exceed end");
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when `other` shares at least one byte with this range
    pub fn overlaps(&self, other: &ByteRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True when the ranges overlap or touch end-to-start
    pub fn touches(&self, other: &ByteRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// True when `other` lies entirely within this range
    pub fn contains(&self, other: &ByteRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl From<(u64, u64)> for ByteRange {
    fn from((start, end): (u64, u64)) -> Self {
        Self { start, end }
    }
}

impl From<ByteRange> for (u64, u64) {
    fn from(range: ByteRange) -> Self {
        (range.start, range.end)
    }
}

/// A byte span tentatively classified as record-bearing, pending
/// confirmation.
///
/// `fill_count` is 0 while the span is a zero-filled placeholder awaiting
/// backfill, and counts the times zero bytes were supplemented with real
/// data thereafter. `read_count` counts delivery attempts that found the
/// span unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u64, u64, u32, u32)", into = "(u64, u64, u32, u32)")]
pub struct InProcessRange {
    pub start: u64,
    pub end: u64,
    pub read_count: u32,
    pub fill_count: u32,
}

impl InProcessRange {
    pub fn new(range: ByteRange, fill_count: u32) -> Self {
        Self {
            start: range.start,
            end: range.end,
            read_count: 0,
            fill_count,
        }
    }

    pub fn range(&self) -> ByteRange {
        ByteRange::new(self.start, self.end)
    }
}

impl From<(u64, u64, u32, u32)> for InProcessRange {
    fn from((start, end, read_count, fill_count): (u64, u64, u32, u32)) -> Self {
        Self {
            start,
            end,
            read_count,
            fill_count,
        }
    }
}

impl From<InProcessRange> for (u64, u64, u32, u32) {
    fn from(r: InProcessRange) -> Self {
        (r.start, r.end, r.read_count, r.fill_count)
    }
}

/// Complete persisted parser state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserCursor {
    /// Byte ranges read from the file but not yet classified, ascending
    /// and disjoint
    #[serde(rename = "unprocessed_data")]
    pub unprocessed: Vec<ByteRange>,

    /// Byte ranges tentatively identified as record-bearing
    #[serde(rename = "in_process_data")]
    pub in_process: Vec<InProcessRange>,

    /// Ingestion frontier: the absolute offset up to which file bytes have
    /// been pulled into the tracker
    pub position: u64,

    /// One-shot flag for formats with a one-time leading metadata particle
    #[serde(default)]
    pub metadata_sent: bool,
}

impl ParserCursor {
    /// Serialize the cursor to its persisted JSON form
    pub fn persist(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restore a cursor from its persisted JSON form, validating the
    /// structural invariants
    pub fn restore(persisted: &str) -> Result<Self> {
        let cursor: ParserCursor = serde_json::from_str(persisted)?;
        cursor.validate()?;
        Ok(cursor)
    }

    /// Check the structural invariants of a cursor: well-formed ranges,
    /// ascending disjoint unprocessed set, nothing tracked beyond the
    /// ingestion frontier
    pub fn validate(&self) -> Result<()> {
        let mut prev_end = 0u64;
        for range in &self.unprocessed {
            if range.start >= range.end {
                return Err(ParseError::invalid_state(format!(
                    "empty or inverted unprocessed range [{}, {})",
                    range.start, range.end
                )));
            }
            if range.start < prev_end {
                return Err(ParseError::invalid_state(
                    "unprocessed ranges must be ascending and disjoint",
                ));
            }
            if range.end > self.position {
                return Err(ParseError::invalid_state(format!(
                    "unprocessed range [{}, {}) extends past position {}",
                    range.start, range.end, self.position
                )));
            }
            prev_end = range.end;
        }
        for entry in &self.in_process {
            if entry.start >= entry.end {
                return Err(ParseError::invalid_state(format!(
                    "empty or inverted in-process range [{}, {})",
                    entry.start, entry.end
                )));
            }
            if entry.end > self.position {
                return Err(ParseError::invalid_state(format!(
                    "in-process range [{}, {}) extends past position {}",
                    entry.start, entry.end, self.position
                )));
            }
        }
        Ok(())
    }
}
