//! Byte-range accounting for a single instrument-log file.
//!
//! The tracker maintains the set of unprocessed and in-process byte ranges.
//! It is a pure data structure with no I/O: the engine reads bytes, the
//! sieve identifies record boundaries, and the tracker records what has
//! been consumed so that parsing can stop and resume with byte-exact
//! precision.

use tracing::trace;

use crate::cursor::{ByteRange, InProcessRange, ParserCursor};
use crate::error::{ParseError, Result};

/// Tracks unprocessed and in-process byte ranges for one file.
///
/// Invariants: the unprocessed set is ascending, disjoint, and
/// non-adjacent (touching ranges are merged on insert); in-process entries
/// are ascending and never overlap the unprocessed set.
#[derive(Debug, Default)]
pub struct ByteRangeTracker {
    unprocessed: Vec<ByteRange>,
    in_process: Vec<InProcessRange>,
}

impl ByteRangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a tracker from a restored cursor
    pub fn from_cursor(cursor: &ParserCursor) -> Self {
        Self {
            unprocessed: cursor.unprocessed.clone(),
            in_process: cursor.in_process.clone(),
        }
    }

    pub fn unprocessed(&self) -> &[ByteRange] {
        &self.unprocessed
    }

    pub fn in_process(&self) -> &[InProcessRange] {
        &self.in_process
    }

    pub fn is_empty(&self) -> bool {
        self.unprocessed.is_empty() && self.in_process.is_empty()
    }

    /// Insert a range into the unprocessed set, merging with any existing
    /// ranges it overlaps or touches
    pub fn mark_unprocessed(&mut self, range: ByteRange) {
        if range.is_empty() {
            return;
        }
        let mut merged = range;
        let mut next = Vec::with_capacity(self.unprocessed.len() + 1);
        for existing in self.unprocessed.drain(..) {
            if existing.touches(&merged) {
                merged = ByteRange::new(
                    merged.start.min(existing.start),
                    merged.end.max(existing.end),
                );
            } else {
                next.push(existing);
            }
        }
        next.push(merged);
        next.sort_by_key(|r| r.start);
        trace!(start = range.start, end = range.end, "marked unprocessed");
        self.unprocessed = next;
    }

    /// Remove a range from the unprocessed set, splitting partially
    /// covered entries into their still-unprocessed residues.
    ///
    /// Fails with a range error when `range` overlaps no stored entry,
    /// which indicates an accounting bug upstream.
    pub fn mark_processed(&mut self, range: ByteRange) -> Result<()> {
        if range.is_empty() {
            return Ok(());
        }
        let mut touched = false;
        let mut next = Vec::with_capacity(self.unprocessed.len() + 1);
        for existing in self.unprocessed.drain(..) {
            if !existing.overlaps(&range) {
                next.push(existing);
                continue;
            }
            touched = true;
            if existing.start < range.start {
                next.push(ByteRange::new(existing.start, range.start));
            }
            if range.end < existing.end {
                next.push(ByteRange::new(range.end, existing.end));
            }
        }
        self.unprocessed = next;
        if !touched {
            return Err(ParseError::range(format!(
                "processed range [{}, {}) overlaps no unprocessed range",
                range.start, range.end
            )));
        }
        trace!(start = range.start, end = range.end, "marked processed");
        Ok(())
    }

    /// Move a sub-range from unprocessed to in-process.
    ///
    /// `raw` is the sub-range's current bytes: an all-zero span enters with
    /// `fill_count = 0` (placeholder awaiting backfill), a span that
    /// already holds data enters with `fill_count = 1` (incomplete
    /// candidate, e.g. a truncated trailing record).
    pub fn subtract_in_process(&mut self, range: ByteRange, raw: &[u8]) -> Result<()> {
        if range.is_empty() {
            return Ok(());
        }
        debug_assert_eq!(range.len() as usize, raw.len());
        self.mark_processed(range)?;
        let fill_count = if raw.iter().all(|&b| b == 0) { 0 } else { 1 };
        let entry = InProcessRange::new(range, fill_count);
        let insert_at = self
            .in_process
            .partition_point(|e| e.start < entry.start);
        self.in_process.insert(insert_at, entry);
        trace!(
            start = range.start,
            end = range.end,
            fill_count,
            "moved to in-process"
        );
        Ok(())
    }

    /// Record another delivery attempt that found the in-process range
    /// unchanged
    pub fn bump_read_count(&mut self, range: ByteRange) -> Result<()> {
        let entry = self
            .in_process
            .iter_mut()
            .find(|e| e.range() == range)
            .ok_or_else(|| {
                ParseError::range(format!(
                    "no in-process entry for range [{}, {})",
                    range.start, range.end
                ))
            })?;
        entry.read_count += 1;
        Ok(())
    }

    /// Return an in-process range to the unprocessed set so it can be
    /// re-sieved as if newly arrived. Returns the retired entry with its
    /// counts, the fill count already incremented when `backfilled`.
    pub fn promote_in_process(
        &mut self,
        range: ByteRange,
        backfilled: bool,
    ) -> Result<InProcessRange> {
        let index = self
            .in_process
            .iter()
            .position(|e| e.range() == range)
            .ok_or_else(|| {
                ParseError::range(format!(
                    "no in-process entry for range [{}, {})",
                    range.start, range.end
                ))
            })?;
        let mut entry = self.in_process.remove(index);
        if backfilled {
            entry.fill_count += 1;
        }
        self.mark_unprocessed(range);
        trace!(
            start = range.start,
            end = range.end,
            fill_count = entry.fill_count,
            "promoted in-process range for re-sieve"
        );
        Ok(entry)
    }

    /// True when an unprocessed range begins exactly at `offset`
    pub fn unprocessed_starts_at(&self, offset: u64) -> bool {
        self.unprocessed.iter().any(|r| r.start == offset)
    }
}
