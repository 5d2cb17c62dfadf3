//! Chunk assembly and classification.
//!
//! The assembler buffers one contiguous region of raw file bytes together
//! with its absolute base offset and, once a format sieve has been applied,
//! exposes the region as ordered data chunks, non-data chunks, and pending
//! chunks. Every loaded byte ends up in exactly one class:
//!
//! - bytes inside a sieve span are data;
//! - gap bytes that are all zero are pending (backfill placeholders);
//! - the trailing gap after the last sieve span is pending (a truncated
//!   record candidate that may complete when the file grows);
//! - any other interior gap is non-data.

use std::collections::VecDeque;

use crate::cursor::ByteRange;
use crate::error::{ParseError, Result};

/// True when every byte in the slice is zero
pub(crate) fn is_all_zero(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == 0)
}

/// A classified span of bytes with its absolute file range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub range: ByteRange,
    pub bytes: Vec<u8>,
}

/// Buffers one raw region and partitions it into data, non-data, and
/// pending chunks according to a sieve result.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    base: u64,
    buffer: Vec<u8>,
    data: VecDeque<Chunk>,
    non_data: VecDeque<Chunk>,
    pending: Vec<Chunk>,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a contiguous region read from absolute offset `base`.
    /// Any previously loaded region must have been fully drained.
    pub fn load(&mut self, base: u64, bytes: Vec<u8>) {
        debug_assert!(self.is_drained(), "assembler loaded before drain");
        self.base = base;
        self.buffer = bytes;
    }

    /// The currently loaded raw bytes
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Partition the loaded buffer using buffer-relative sieve spans.
    ///
    /// Spans must be ascending, non-overlapping, and within the buffer;
    /// anything else is an accounting bug in the sieve and fails with a
    /// range error.
    pub fn apply_sieve(&mut self, spans: &[(usize, usize)]) -> Result<()> {
        let len = self.buffer.len();
        let mut pos = 0usize;
        for &(start, end) in spans {
            if start < pos || end <= start || end > len {
                return Err(ParseError::range(format!(
                    "sieve span ({start}, {end}) violates ascending order in buffer of {len} bytes"
                )));
            }
            if start > pos {
                self.classify_gap(pos, start, false);
            }
            self.data.push_back(self.chunk(start, end));
            pos = end;
        }
        if pos < len {
            self.classify_gap(pos, len, true);
        }
        self.buffer.clear();
        Ok(())
    }

    /// Next data chunk in file order, removed from the assembler
    pub fn next_data(&mut self) -> Option<Chunk> {
        self.data.pop_front()
    }

    /// Next non-data chunk in file order. `clean` removes the chunk;
    /// otherwise this is a peek and the chunk stays queued.
    pub fn next_non_data(&mut self, clean: bool) -> Option<Chunk> {
        if clean {
            self.non_data.pop_front()
        } else {
            self.non_data.front().cloned()
        }
    }

    /// Absolute start offset of the next data chunk, if any
    pub fn peek_data_start(&self) -> Option<u64> {
        self.data.front().map(|c| c.range.start)
    }

    /// Absolute start offset of the next non-data chunk, if any
    pub fn peek_non_data_start(&self) -> Option<u64> {
        self.non_data.front().map(|c| c.range.start)
    }

    /// Remove and return all pending chunks (backfill placeholders and
    /// truncated trailing candidates)
    pub fn take_pending(&mut self) -> Vec<Chunk> {
        std::mem::take(&mut self.pending)
    }

    /// True when no loaded bytes or classified chunks remain
    pub fn is_drained(&self) -> bool {
        self.buffer.is_empty()
            && self.data.is_empty()
            && self.non_data.is_empty()
            && self.pending.is_empty()
    }

    /// Discard the loaded buffer and all classified chunks
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.data.clear();
        self.non_data.clear();
        self.pending.clear();
    }

    fn chunk(&self, start: usize, end: usize) -> Chunk {
        Chunk {
            range: ByteRange::new(self.base + start as u64, self.base + end as u64),
            bytes: self.buffer[start..end].to_vec(),
        }
    }

    fn classify_gap(&mut self, start: usize, end: usize, trailing: bool) {
        let chunk = self.chunk(start, end);
        if trailing || is_all_zero(&chunk.bytes) {
            self.pending.push(chunk);
        } else {
            self.non_data.push_back(chunk);
        }
    }
}
