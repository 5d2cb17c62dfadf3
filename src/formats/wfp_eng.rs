//! Telemetered profiler engineering stream.
//!
//! The file opens with a 24-byte flag header (16 flag bytes plus two
//! big-endian u32 start times) that is emitted once as a start-time
//! particle. The body is a positional union of frames: a 16-byte status
//! frame wherever the 4-byte status marker matches, otherwise a 26-byte
//! engineering frame. Frame boundaries are positional, so the sieve walks
//! the buffer front to back and leaves a short tail unsieved for the next
//! read.

use std::io::Read;
use std::sync::LazyLock;

use regex::bytes::Regex;
use tracing::{debug, trace};

use super::{be_f32, be_i16, be_i32, be_u32, InstrumentFormat};
use crate::chunker::Chunk;
use crate::error::{ParseError, Result};
use crate::particle::{Particle, WfpEngineeringParticle, WfpStartTimeParticle, WfpStatusParticle};

/// One-time flag header: 16 flag bytes followed by 8 bytes of start times
pub const HEADER_BYTES: usize = 24;
/// Fixed engineering frame size
pub const SAMPLE_BYTES: usize = 26;
/// Fixed status frame size
pub const STATUS_BYTES: usize = 16;

static HEADER_MATCHER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s-u)\A(\x00\x01\x00{7}\x01\x00\x01\x00{4})([\x00-\xff]{8})").unwrap()
});

static STATUS_START_MATCHER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s-u)\A\xff\xff\xff[\xfa-\xff]").unwrap());

static STATUS_MATCHER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s-u)\A\xff\xff\xff[\xfa-\xff][\x00-\xff]{12}").unwrap());

/// Telemetered engineering-stream format strategy
#[derive(Debug, Default)]
pub struct WfpEngFormat;

impl WfpEngFormat {
    pub fn new() -> Self {
        Self
    }
}

impl InstrumentFormat for WfpEngFormat {
    fn name(&self) -> &'static str {
        "wfp_eng"
    }

    fn read_header(&mut self, source: &mut dyn Read) -> Result<(usize, Vec<Particle>)> {
        let mut header = [0u8; HEADER_BYTES];
        source
            .read_exact(&mut header)
            .map_err(|e| ParseError::header(self.name(), format!("short header read: {e}")))?;

        if !HEADER_MATCHER.is_match(&header) {
            return Err(ParseError::header(
                self.name(),
                "flag bytes do not match the telemetered header pattern",
            ));
        }

        let sensor_start = be_u32(&header, 16)
            .ok_or_else(|| ParseError::header(self.name(), "sensor start time field"))?;
        let profile_start = be_u32(&header, 20)
            .ok_or_else(|| ParseError::header(self.name(), "profile start time field"))?;
        debug!(sensor_start, profile_start, "parsed flag header");

        Ok((
            HEADER_BYTES,
            vec![Particle::StartTime(WfpStartTimeParticle {
                sensor_start,
                profile_start,
            })],
        ))
    }

    fn sieve(&self, buffer: &[u8], _base: u64) -> Result<Vec<(usize, usize)>> {
        let mut spans = Vec::new();
        let mut index = 0usize;
        while index < buffer.len() {
            let remaining = buffer.len() - index;
            if remaining >= STATUS_BYTES && STATUS_START_MATCHER.is_match(&buffer[index..]) {
                spans.push((index, index + STATUS_BYTES));
                index += STATUS_BYTES;
            } else if remaining >= SAMPLE_BYTES {
                spans.push((index, index + SAMPLE_BYTES));
                index += SAMPLE_BYTES;
            } else {
                trace!(remaining, "tail too short for a frame, leaving unsieved");
                break;
            }
        }
        Ok(spans)
    }

    fn decode(&mut self, chunk: &Chunk, _metadata_sent: &mut bool) -> Result<Vec<Particle>> {
        let bytes = &chunk.bytes;
        if bytes.len() == STATUS_BYTES {
            if !STATUS_MATCHER.is_match(bytes) {
                return Err(ParseError::validation(
                    chunk.range,
                    "status frame does not match the status pattern",
                ));
            }
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
                format!("expected a {SAMPLE_BYTES}-byte engineering frame"),
            ));
        }
        let particle = WfpEngineeringParticle {
            timestamp: be_u32(bytes, 0)
                .ok_or_else(|| ParseError::decode(chunk.range, "timestamp field"))?,
            current: be_f32(bytes, 4)
                .ok_or_else(|| ParseError::decode(chunk.range, "current field"))?,
            voltage: be_f32(bytes, 8)
                .ok_or_else(|| ParseError::decode(chunk.range, "voltage field"))?,
            pressure: be_f32(bytes, 12)
                .ok_or_else(|| ParseError::decode(chunk.range, "pressure field"))?,
        };
        Ok(vec![Particle::Engineering(particle)])
    }
}
