//! Recovered oxygen-profiler stream.
//!
//! The file opens with a 24-byte flag header that is validated and
//! consumed but produces no particle. The body is fixed 30-byte sample
//! frames terminated by a 16-byte status frame, optionally augmented to
//! 18 bytes with a trailing decimation factor. Because the status frame
//! sits at the end and nothing in a sample frame marks its own boundary,
//! the sieve scans the buffer back to front: peel the status frame, then
//! peel 30-byte samples until the front is reached. Any remainder means
//! the file is structurally corrupt and the sieve aborts.

use std::io::Read;
use std::sync::LazyLock;

use regex::bytes::Regex;
use tracing::{debug, trace};

use super::{be_f32, be_i16, be_i32, be_u32, InstrumentFormat};
use crate::chunker::Chunk;
use crate::error::{ParseError, Result};
use crate::particle::{DostaSampleParticle, Particle, WfpStatusParticle};

/// One-time flag header, validated but never emitted
pub const HEADER_BYTES: usize = 24;
/// Fixed sample frame size
pub const SAMPLE_BYTES: usize = 30;
/// Terminating status frame size
pub const STATUS_BYTES: usize = 16;
/// Status frame followed by a 2-byte decimation factor
pub const STATUS_BYTES_AUGMENTED: usize = 18;

static HEADER_MATCHER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s-u)\A\x00\x01\x00{5}\x01\x00{7}\x01[\x00-\xff]{8}").unwrap()
});

static STATUS_START_MATCHER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s-u)\A\xff\xff\xff[\xfa-\xff]").unwrap());

/// Recovered oxygen-profiler format strategy
#[derive(Debug, Default)]
pub struct DostaWfpFormat;

impl DostaWfpFormat {
    pub fn new() -> Self {
        Self
    }
}

impl InstrumentFormat for DostaWfpFormat {
    fn name(&self) -> &'static str {
        "dosta_wfp"
    }

    fn read_header(&mut self, source: &mut dyn Read) -> Result<(usize, Vec<Particle>)> {
        let mut header = [0u8; HEADER_BYTES];
        source
            .read_exact(&mut header)
            .map_err(|e| ParseError::header(self.name(), format!("short header read: {e}")))?;

        if !HEADER_MATCHER.is_match(&header) {
            return Err(ParseError::header(
                self.name(),
                "flag bytes do not match the recovered header pattern",
            ));
        }
        debug!("validated flag header");
        Ok((HEADER_BYTES, Vec::new()))
    }

    fn sieve(&self, buffer: &[u8], base: u64) -> Result<Vec<(usize, usize)>> {
        let mut spans = Vec::new();
        let mut end = buffer.len();
        while end > 0 {
            if end >= STATUS_BYTES_AUGMENTED
                && STATUS_START_MATCHER.is_match(&buffer[end - STATUS_BYTES_AUGMENTED..end])
            {
                spans.push((end - STATUS_BYTES_AUGMENTED, end));
                end -= STATUS_BYTES_AUGMENTED;
            } else if end >= STATUS_BYTES
                && STATUS_START_MATCHER.is_match(&buffer[end - STATUS_BYTES..end])
            {
                spans.push((end - STATUS_BYTES, end));
                end -= STATUS_BYTES;
            } else if end >= SAMPLE_BYTES {
                spans.push((end - SAMPLE_BYTES, end));
                end -= SAMPLE_BYTES;
            } else {
                return Err(ParseError::format(
                    base,
                    format!("{end} leading bytes fit neither a sample nor a status frame"),
                ));
            }
        }
        spans.reverse();
        trace!(frames = spans.len(), "reverse scan complete");
        Ok(spans)
    }

    fn decode(&mut self, chunk: &Chunk, _metadata_sent: &mut bool) -> Result<Vec<Particle>> {
        let bytes = &chunk.bytes;
        if bytes.len() == STATUS_BYTES || bytes.len() == STATUS_BYTES_AUGMENTED {
            // the augmented form appends a decimation factor the stream
            // does not publish
            let particle = WfpStatusParticle {
                indicator: be_i32(bytes, 0)
                    .ok_or_else(|| ParseError::decode(chunk.range, "indicator field"))?,
                ramp_status: be_i16(bytes, 4)
                    .ok_or_else(|| ParseError::decode(chunk.range, "ramp status field"))?,
                profile_status: be_i16(bytes, 6)
                    .ok_or_else(|| ParseError::decode(chunk.range, "profile status field"))?,
                profile_stop: be_u32(bytes, 8)
                    .ok_or_else(|| ParseError::decode(chunk.range, "profile stop field"))?,
                sensor_stop: be_u32(bytes, 12)
                    .ok_or_else(|| ParseError::decode(chunk.range, "sensor stop field"))?,
            };
            return Ok(vec![Particle::Status(particle)]);
        }

        if bytes.len() != SAMPLE_BYTES {
            return Err(ParseError::validation(
                chunk.range,
                format!("expected a {SAMPLE_BYTES}-byte sample frame"),
            ));
        }
        let particle = DostaSampleParticle {
            wfp_timestamp: be_u32(bytes, 0)
                .ok_or_else(|| ParseError::decode(chunk.range, "timestamp field"))?,
            optode_oxygen: be_f32(bytes, 16)
                .ok_or_else(|| ParseError::decode(chunk.range, "oxygen field"))?,
            optode_temperature: be_f32(bytes, 20)
                .ok_or_else(|| ParseError::decode(chunk.range, "temperature field"))?,
        };
        Ok(vec![Particle::DostaSample(particle)])
    }
}
