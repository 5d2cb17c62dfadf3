//! Particle Ingest Library
//!
//! A Rust library for resumable, incremental parsing of append-only binary
//! instrument-log files from ocean-observing platforms into typed,
//! timestamped data particles.
//!
//! This library provides tools for:
//! - Byte-exact resumable parsing driven by a serializable cursor
//! - Chunk assembly that classifies every ingested byte as record data,
//!   unexpected non-data, or a pending backfill placeholder
//! - Format strategies for profiler engineering streams, recovered oxygen
//!   profiles, and optode controller logs
//! - Observer callbacks for state persistence, publication, and
//!   per-record error reporting

pub mod chunker;
pub mod constants;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod formats;
pub mod particle;
pub mod tracker;

// Re-export commonly used types
pub use cursor::{ByteRange, InProcessRange, ParserCursor};
pub use engine::{Callbacks, EngineState, Parser, ParticleRecord};
pub use error::{ParseError, Result};
pub use formats::{DostaWfpFormat, InstrumentFormat, OptodeLogFormat, WfpEngFormat};
pub use particle::{Particle, TaggedValue};
