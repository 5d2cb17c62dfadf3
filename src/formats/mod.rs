//! Instrument log formats.
//!
//! Each format bundles the two strategies the engine needs: a sieve that
//! locates record boundaries in a raw buffer, and a decoder that converts
//! one delimited region into typed particles. Formats with a one-time
//! leading header also validate it at construction.
//!
//! - [`wfp_eng`]: telemetered profiler engineering stream with a flag
//!   header and a positional union of status and engineering frames
//! - [`dosta_wfp`]: recovered oxygen-profiler stream scanned in reverse
//!   over fixed 30-byte frames
//! - [`optode_log`]: mooring optode controller log with regex-delimited
//!   records and a one-time metadata particle

pub mod dosta_wfp;
pub mod optode_log;
pub mod wfp_eng;

use std::io::Read;

use crate::chunker::Chunk;
use crate::error::Result;
use crate::particle::Particle;

pub use dosta_wfp::DostaWfpFormat;
pub use optode_log::OptodeLogFormat;
pub use wfp_eng::WfpEngFormat;

/// Format strategy pair injected into the parser engine at construction
pub trait InstrumentFormat: Send {
    /// Short format name used in log and error messages
    fn name(&self) -> &'static str;

    /// Read and validate the one-time leading header, returning the bytes
    /// consumed and any particles it produces. Formats without a header
    /// return `(0, vec![])`. Failures here are fatal: a bad header means
    /// the file is fundamentally not this format.
    fn read_header(&mut self, source: &mut dyn Read) -> Result<(usize, Vec<Particle>)> {
        let _ = source;
        Ok((0, Vec::new()))
    }

    /// Locate record boundaries in `buffer`, whose first byte sits at
    /// absolute file offset `base`. Returns ascending, non-overlapping
    /// buffer-relative `(start, end)` pairs. A structural failure aborts
    /// the whole call with a format error.
    fn sieve(&self, buffer: &[u8], base: u64) -> Result<Vec<(usize, usize)>>;

    /// Decode one sieved data chunk into particles. `metadata_sent` is the
    /// cursor's one-shot flag for formats with a one-time metadata
    /// particle; other formats ignore it.
    fn decode(&mut self, chunk: &Chunk, metadata_sent: &mut bool) -> Result<Vec<Particle>>;
}

// Bounds-checked big-endian field readers shared by the format decoders.

pub(crate) fn be_i16(buf: &[u8], offset: usize) -> Option<i16> {
    let bytes = buf.get(offset..offset + 2)?;
    Some(i16::from_be_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn be_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn be_i32(buf: &[u8], offset: usize) -> Option<i32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn be_f32(buf: &[u8], offset: usize) -> Option<f32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
