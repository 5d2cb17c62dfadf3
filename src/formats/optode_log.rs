//! Mooring optode controller log.
//!
//! Records are self-delimiting: a 4-byte binary marker, an ASCII
//! hex controller timestamp, the instrument model and serial numbers,
//! ten tab-separated decimal readings, and a CRLF terminator. The sieve
//! simply collects every regex match, so bytes between records (logger
//! banners, retransmit noise) fall out as gaps. The first decoded record
//! additionally produces a one-time metadata particle carrying the
//! instrument identity.

use std::str;
use std::sync::LazyLock;

use regex::bytes::Regex;
use tracing::{debug, trace};

use super::InstrumentFormat;
use crate::chunker::Chunk;
use crate::cursor::ByteRange;
use crate::error::{ParseError, Result};
use crate::particle::{OptodeMetadataParticle, OptodeSampleParticle, Particle};

static RECORD_MATCHER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?s-u)\xff\x11\x25\x11",
        r"([0-9A-Fa-f]{8})\t",
        r"(\d+)\t(\d+)\t",
        r"(\d+\.\d+)\t(\d+\.\d+)\t(\d+\.\d+)\t(\d+\.\d+)\t(\d+\.\d+)\t",
        r"(\d+\.\d+)\t(\d+\.\d+)\t(\d+\.\d+)\t(\d+\.\d+)\t(\d+\.\d+)",
        r"\x0d\x0a",
    ))
    .unwrap()
});

fn ascii_u32_hex(range: ByteRange, field: &str, bytes: &[u8]) -> Result<u32> {
    let text = str::from_utf8(bytes)
        .map_err(|_| ParseError::decode(range, format!("{field} is not ASCII")))?;
    u32::from_str_radix(text, 16)
        .map_err(|_| ParseError::decode(range, format!("{field} is not hexadecimal")))
}

fn ascii_u32(range: ByteRange, field: &str, bytes: &[u8]) -> Result<u32> {
    let text = str::from_utf8(bytes)
        .map_err(|_| ParseError::decode(range, format!("{field} is not ASCII")))?;
    text.parse()
        .map_err(|_| ParseError::decode(range, format!("{field} is not an integer")))
}

fn ascii_f64(range: ByteRange, field: &str, bytes: &[u8]) -> Result<f64> {
    let text = str::from_utf8(bytes)
        .map_err(|_| ParseError::decode(range, format!("{field} is not ASCII")))?;
    text.parse()
        .map_err(|_| ParseError::decode(range, format!("{field} is not a decimal number")))
}

/// Optode controller-log format strategy
#[derive(Debug, Default)]
pub struct OptodeLogFormat;

impl OptodeLogFormat {
    pub fn new() -> Self {
        Self
    }
}

impl InstrumentFormat for OptodeLogFormat {
    fn name(&self) -> &'static str {
        "optode_log"
    }

    fn sieve(&self, buffer: &[u8], _base: u64) -> Result<Vec<(usize, usize)>> {
        let spans: Vec<(usize, usize)> = RECORD_MATCHER
            .find_iter(buffer)
            .map(|m| (m.start(), m.end()))
            .collect();
        trace!(records = spans.len(), "matched controller-log records");
        Ok(spans)
    }

    fn decode(&mut self, chunk: &Chunk, metadata_sent: &mut bool) -> Result<Vec<Particle>> {
        let range = chunk.range;
        let captures = RECORD_MATCHER.captures(&chunk.bytes).ok_or_else(|| {
            ParseError::decode(range, "sieved chunk no longer matches the record pattern")
        })?;

        let field =
            |index: usize| captures.get(index).map(|m| m.as_bytes()).unwrap_or(&[]);

        let controller_timestamp = ascii_u32_hex(range, "controller timestamp", field(1))?;
        let product_number = ascii_u32(range, "product number", field(2))?;
        let serial_number = ascii_u32(range, "serial number", field(3))?;

        let mut readings = [0.0f64; 10];
        for (slot, reading) in readings.iter_mut().enumerate() {
            *reading = ascii_f64(range, "instrument reading", field(4 + slot))?;
        }

        let sample = Particle::OptodeSample(OptodeSampleParticle {
            controller_timestamp,
            estimated_oxygen: readings[0],
            estimated_saturation: readings[1],
            optode_temperature: readings[2],
            calibrated_phase: readings[3],
            temp_compensated_phase: readings[4],
            blue_phase: readings[5],
            red_phase: readings[6],
            blue_amplitude: readings[7],
            red_amplitude: readings[8],
            raw_temperature: readings[9],
        });

        if !*metadata_sent {
            *metadata_sent = true;
            debug!(product_number, serial_number, "emitting one-time metadata");
            let metadata = Particle::OptodeMetadata(OptodeMetadataParticle {
                controller_timestamp,
                product_number,
                serial_number,
            });
            return Ok(vec![metadata, sample]);
        }
        Ok(vec![sample])
    }
}
