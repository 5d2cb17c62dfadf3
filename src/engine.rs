//! The parser engine.
//!
//! Drives one instrument-log file from raw bytes to published particles:
//! read new bytes at the ingestion frontier, revisit in-process ranges for
//! backfill, sieve every unprocessed range, and decode the resulting data
//! chunks. All consumption is recorded in the byte-range tracker, so the
//! cursor snapshot attached to each emitted record is sufficient to
//! resume parsing in a fresh engine with no repeats and no gaps.

use std::collections::VecDeque;
use std::io::{Read, Seek, SeekFrom};

use tracing::{debug, info, warn};

use crate::chunker::{is_all_zero, ChunkAssembler};
use crate::constants::READ_BLOCK_SIZE;
use crate::cursor::{ByteRange, InProcessRange, ParserCursor};
use crate::error::{ParseError, Result};
use crate::formats::InstrumentFormat;
use crate::particle::Particle;
use crate::tracker::ByteRangeTracker;

/// Engine lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Fresh file, leading header not yet consumed
    HeaderPending,
    /// Steady-state ingestion
    Streaming,
    /// Frontier at end of file with nothing left unprocessed
    Eof,
}

/// A published particle paired with the cursor that resumes after it
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleRecord {
    pub particle: Particle,
    pub cursor: ParserCursor,
}

/// Observer callbacks fired as the engine makes progress.
///
/// `on_state` fires after every record and every non-data accounting
/// change, `on_publish` once per record handed to the caller, and
/// `on_error` for each recoverable per-record failure. Fatal failures
/// are returned, not reported here.
#[derive(Default)]
pub struct Callbacks {
    pub on_state: Option<Box<dyn FnMut(&ParserCursor) + Send>>,
    pub on_publish: Option<Box<dyn FnMut(&ParticleRecord) + Send>>,
    pub on_error: Option<Box<dyn FnMut(&ParseError) + Send>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_state(mut self, f: impl FnMut(&ParserCursor) + Send + 'static) -> Self {
        self.on_state = Some(Box::new(f));
        self
    }

    pub fn on_publish(mut self, f: impl FnMut(&ParticleRecord) + Send + 'static) -> Self {
        self.on_publish = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&ParseError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

/// Resumable parser over one append-only instrument-log file
pub struct Parser<S: Read + Seek> {
    source: S,
    format: Box<dyn InstrumentFormat>,
    tracker: ByteRangeTracker,
    assembler: ChunkAssembler,
    position: u64,
    metadata_sent: bool,
    state: EngineState,
    records: VecDeque<ParticleRecord>,
    callbacks: Callbacks,
    // unprocessed ranges whose sieve failure was already reported;
    // cleared when the range's bounds change or it leaves the set
    sieve_failed: Vec<ByteRange>,
}

impl<S: Read + Seek> Parser<S> {
    /// Build a parser over `source`, optionally resuming from a persisted
    /// cursor.
    ///
    /// With no cursor (or a default one) the file is treated as fresh and
    /// the format's leading header is read immediately; a header mismatch
    /// is fatal and fails construction. A restored cursor skips the header
    /// and picks up exactly where the previous engine left off.
    pub fn new(
        mut source: S,
        mut format: Box<dyn InstrumentFormat>,
        cursor: Option<ParserCursor>,
        callbacks: Callbacks,
    ) -> Result<Self> {
        let cursor = cursor.unwrap_or_default();
        cursor.validate()?;

        let fresh = cursor.position == 0
            && cursor.unprocessed.is_empty()
            && cursor.in_process.is_empty();

        let mut records = VecDeque::new();
        let mut position = cursor.position;
        let metadata_sent = cursor.metadata_sent;
        if fresh {
            source.seek(SeekFrom::Start(0))?;
            let (consumed, particles) = format.read_header(&mut source)?;
            position = consumed as u64;
            info!(format = format.name(), consumed, "consumed file header");
            let snapshot = ParserCursor {
                unprocessed: Vec::new(),
                in_process: Vec::new(),
                position,
                metadata_sent,
            };
            for particle in particles {
                records.push_back(ParticleRecord {
                    particle,
                    cursor: snapshot.clone(),
                });
            }
        } else {
            debug!(
                position,
                unprocessed = cursor.unprocessed.len(),
                in_process = cursor.in_process.len(),
                "resumed from persisted cursor"
            );
        }

        Ok(Self {
            source,
            format,
            tracker: ByteRangeTracker::from_cursor(&cursor),
            assembler: ChunkAssembler::new(),
            position,
            metadata_sent,
            state: EngineState::Streaming,
            records,
            callbacks,
            sieve_failed: Vec::new(),
        })
    }

    /// Current lifecycle phase
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Cursor snapshot describing the engine's current accounting
    pub fn cursor(&self) -> ParserCursor {
        ParserCursor {
            unprocessed: self.tracker.unprocessed().to_vec(),
            in_process: self.tracker.in_process().to_vec(),
            position: self.position,
            metadata_sent: self.metadata_sent,
        }
    }

    /// Pull up to `count` records, ingesting more of the file as needed.
    ///
    /// Returns fewer than `count` records only when the file is exhausted:
    /// the frontier is at end of file and nothing actionable remains. Each
    /// returned record carries the cursor to persist after publishing it.
    pub async fn get_records(&mut self, count: usize) -> Result<Vec<ParticleRecord>> {
        while self.records.len() < count {
            if !self.cycle().await? {
                break;
            }
        }
        let n = count.min(self.records.len());
        let published: Vec<ParticleRecord> = self.records.drain(..n).collect();
        if let Some(on_publish) = self.callbacks.on_publish.as_mut() {
            for record in &published {
                on_publish(record);
            }
        }
        Ok(published)
    }

    /// One ingestion cycle: extend the frontier, revisit in-process ranges,
    /// then sieve and decode everything unprocessed. Returns whether any
    /// accounting changed; a false return means another cycle would be a
    /// no-op until the file grows.
    async fn cycle(&mut self) -> Result<bool> {
        let new_bytes = self.read_frontier().await?;
        let mut progressed = new_bytes > 0;
        if self.revisit_in_process()? {
            progressed = true;
        }
        if self.process_unprocessed()? {
            progressed = true;
        }
        self.state = if new_bytes == 0 && self.tracker.unprocessed().is_empty() {
            EngineState::Eof
        } else {
            EngineState::Streaming
        };
        Ok(progressed)
    }

    /// Read from the frontier to the current end of file in fixed blocks,
    /// yielding to the runtime between blocks
    async fn read_frontier(&mut self) -> Result<u64> {
        self.source.seek(SeekFrom::Start(self.position))?;
        let mut total = 0u64;
        let mut block = vec![0u8; READ_BLOCK_SIZE];
        loop {
            let n = self.source.read(&mut block)?;
            if n == 0 {
                break;
            }
            self.tracker
                .mark_unprocessed(ByteRange::new(self.position, self.position + n as u64));
            self.position += n as u64;
            total += n as u64;
            tokio::task::yield_now().await;
        }
        Ok(total)
    }

    /// Re-read every in-process range and decide its fate: still zero
    /// means another unfruitful read, newly arrived data means the range
    /// goes back to the unprocessed set for a fresh sieve pass.
    fn revisit_in_process(&mut self) -> Result<bool> {
        let entries: Vec<InProcessRange> = self.tracker.in_process().to_vec();
        let mut progressed = false;
        for entry in entries {
            let range = entry.range();
            let bytes = self.read_range(range)?;
            if is_all_zero(&bytes) {
                self.tracker.bump_read_count(range)?;
            } else if entry.fill_count == 0 {
                // placeholder got backfilled with real data
                self.tracker.promote_in_process(range, true)?;
                progressed = true;
            } else if self.tracker.unprocessed_starts_at(range.end) {
                // incomplete candidate extended by newly read bytes
                self.tracker.promote_in_process(range, false)?;
                progressed = true;
            } else {
                self.tracker.bump_read_count(range)?;
            }
        }
        Ok(progressed)
    }

    /// Sieve and drain every unprocessed range. A sieve failure is
    /// reported once and leaves its range unprocessed; the range is still
    /// re-sieved every pass, but the failure is not re-reported until its
    /// bounds change (more bytes merged in) or it leaves the set.
    fn process_unprocessed(&mut self) -> Result<bool> {
        let ranges: Vec<ByteRange> = self.tracker.unprocessed().to_vec();
        self.sieve_failed.retain(|r| ranges.contains(r));
        let mut progressed = false;
        for range in ranges {
            let bytes = self.read_range(range)?;
            let spans = match self.format.sieve(&bytes, range.start) {
                Ok(spans) => spans,
                Err(error) => {
                    if !self.sieve_failed.contains(&range) {
                        self.sieve_failed.push(range);
                        self.report(error);
                    }
                    continue;
                }
            };
            self.assembler.load(range.start, bytes);
            self.assembler.apply_sieve(&spans)?;
            if self.drain_assembler()? {
                progressed = true;
            }
        }
        Ok(progressed)
    }

    /// Consume the assembler's chunks in file order, decoding data,
    /// reporting non-data, and parking pending spans as in-process
    fn drain_assembler(&mut self) -> Result<bool> {
        let mut progressed = false;
        loop {
            let take_non_data = match (
                self.assembler.peek_data_start(),
                self.assembler.peek_non_data_start(),
            ) {
                (None, None) => break,
                (Some(data), Some(non_data)) => non_data < data,
                (None, Some(_)) => true,
                (Some(_), None) => false,
            };
            progressed = true;

            if take_non_data {
                let chunk = self
                    .assembler
                    .next_non_data(true)
                    .ok_or_else(|| ParseError::range("peeked non-data chunk vanished"))?;
                self.report(ParseError::unexpected_data(chunk.range));
                self.tracker.mark_processed(chunk.range)?;
                self.emit_state();
                continue;
            }

            let chunk = self
                .assembler
                .next_data()
                .ok_or_else(|| ParseError::range("peeked data chunk vanished"))?;
            if is_all_zero(&chunk.bytes) {
                // zero-filled placeholder awaiting backfill
                self.tracker.subtract_in_process(chunk.range, &chunk.bytes)?;
                self.emit_state();
                continue;
            }
            match self.format.decode(&chunk, &mut self.metadata_sent) {
                Ok(particles) => self.emit_particles(chunk.range, particles)?,
                Err(error) => {
                    self.report(error);
                    self.tracker.mark_processed(chunk.range)?;
                    self.emit_state();
                }
            }
        }

        for chunk in self.assembler.take_pending() {
            self.tracker.subtract_in_process(chunk.range, &chunk.bytes)?;
            self.emit_state();
            progressed = true;
        }
        Ok(progressed)
    }

    /// Queue decoded particles with their resumption cursors.
    ///
    /// For a chunk producing several particles, only the last carries the
    /// post-consumption cursor; earlier ones snapshot the pre-consumption
    /// state so that resuming from them re-delivers the remainder of the
    /// chunk and nothing before it. The state callback fires once per
    /// record with that record's cursor.
    fn emit_particles(&mut self, range: ByteRange, particles: Vec<Particle>) -> Result<()> {
        if particles.is_empty() {
            self.tracker.mark_processed(range)?;
            self.emit_state();
            return Ok(());
        }
        let pre = self.cursor();
        self.tracker.mark_processed(range)?;
        let post = self.cursor();
        let last = particles.len() - 1;
        for (index, particle) in particles.into_iter().enumerate() {
            debug!(stream = particle.stream(), "decoded particle");
            let cursor = if index == last {
                post.clone()
            } else {
                pre.clone()
            };
            if let Some(on_state) = self.callbacks.on_state.as_mut() {
                on_state(&cursor);
            }
            self.records.push_back(ParticleRecord { particle, cursor });
        }
        Ok(())
    }

    fn read_range(&mut self, range: ByteRange) -> Result<Vec<u8>> {
        self.source.seek(SeekFrom::Start(range.start))?;
        let mut buf = vec![0u8; range.len() as usize];
        self.source.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn report(&mut self, error: ParseError) {
        warn!(%error, "recoverable parse error");
        if let Some(on_error) = self.callbacks.on_error.as_mut() {
            on_error(&error);
        }
    }

    fn emit_state(&mut self) {
        if let Some(on_state) = self.callbacks.on_state.as_mut() {
            let snapshot = ParserCursor {
                unprocessed: self.tracker.unprocessed().to_vec(),
                in_process: self.tracker.in_process().to_vec(),
                position: self.position,
                metadata_sent: self.metadata_sent,
            };
            on_state(&snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{DostaWfpFormat, OptodeLogFormat, WfpEngFormat};
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    fn optode_record(timestamp: u32) -> Vec<u8> {
        let mut record = vec![0xff, 0x11, 0x25, 0x11];
        record.extend_from_slice(format!("{timestamp:08x}").as_bytes());
        record.extend_from_slice(b"\t4831\t538\t");
        record.extend_from_slice(
            b"243.085\t93.283\t5.886\t31.254\t31.254\t35.748\t17.360\t681.6\t851.4\t566.5",
        );
        record.extend_from_slice(b"\x0d\x0a");
        record
    }

    fn eng_header() -> Vec<u8> {
        let mut header = vec![
            0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00,
            0x00, 0x00,
        ];
        header.extend_from_slice(&100u32.to_be_bytes());
        header.extend_from_slice(&200u32.to_be_bytes());
        header
    }

    fn eng_sample(timestamp: u32) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&timestamp.to_be_bytes());
        frame.extend_from_slice(&0.5f32.to_be_bytes());
        frame.extend_from_slice(&11.9f32.to_be_bytes());
        frame.extend_from_slice(&40.25f32.to_be_bytes());
        frame.extend_from_slice(&[0u8; 10]);
        frame
    }

    fn dosta_header() -> Vec<u8> {
        let mut header = vec![
            0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x01,
        ];
        header.extend_from_slice(&[0u8; 8]);
        header
    }

    fn dosta_sample(timestamp: u32) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&timestamp.to_be_bytes());
        for value in [1.0f32, 2.0, 3.0, 240.5, 4.25] {
            frame.extend_from_slice(&value.to_be_bytes());
        }
        frame.extend_from_slice(&[0u8; 6]);
        frame
    }

    fn dosta_status() -> Vec<u8> {
        let mut frame = vec![0xff, 0xff, 0xff, 0xfa];
        frame.extend_from_slice(&0i16.to_be_bytes());
        frame.extend_from_slice(&1i16.to_be_bytes());
        frame.extend_from_slice(&500u32.to_be_bytes());
        frame.extend_from_slice(&600u32.to_be_bytes());
        frame
    }

    fn errors_sink() -> (Arc<Mutex<Vec<String>>>, Callbacks) {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let callbacks =
            Callbacks::new().on_error(move |e| sink.lock().unwrap().push(e.to_string()));
        (errors, callbacks)
    }

    #[tokio::test]
    async fn optode_stream_emits_metadata_once() {
        let mut file = optode_record(0x10);
        file.extend(optode_record(0x20));

        let mut parser = Parser::new(
            Cursor::new(file),
            Box::new(OptodeLogFormat::new()),
            None,
            Callbacks::new(),
        )
        .unwrap();

        let records = parser.get_records(10).await.unwrap();
        let streams: Vec<&str> = records.iter().map(|r| r.particle.stream()).collect();
        assert_eq!(
            streams,
            vec![
                "optode_log_metadata",
                "optode_log_instrument",
                "optode_log_instrument",
            ]
        );
        assert_eq!(parser.state(), EngineState::Eof);
        assert!(parser.cursor().unprocessed.is_empty());
    }

    #[tokio::test]
    async fn metadata_cursor_resumes_before_its_chunk() {
        let file = optode_record(0x10);
        let record_len = file.len() as u64;

        let mut parser = Parser::new(
            Cursor::new(file),
            Box::new(OptodeLogFormat::new()),
            None,
            Callbacks::new(),
        )
        .unwrap();
        let records = parser.get_records(2).await.unwrap();
        assert_eq!(records.len(), 2);

        // the metadata particle's cursor still holds its chunk unprocessed
        let metadata_cursor = &records[0].cursor;
        assert!(metadata_cursor.metadata_sent);
        assert_eq!(
            metadata_cursor.unprocessed,
            vec![ByteRange::new(0, record_len)]
        );
        // the sample particle's cursor has consumed it
        assert!(records[1].cursor.unprocessed.is_empty());
    }

    #[tokio::test]
    async fn noise_between_records_is_reported_not_fatal() {
        let mut file = optode_record(0x10);
        file.extend_from_slice(b"GARBAGE");
        file.extend(optode_record(0x20));
        let (errors, callbacks) = errors_sink();

        let mut parser = Parser::new(
            Cursor::new(file),
            Box::new(OptodeLogFormat::new()),
            None,
            callbacks,
        )
        .unwrap();
        let records = parser.get_records(10).await.unwrap();

        assert_eq!(records.len(), 3);
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("7 bytes of unexpected non-data"));
        assert!(parser.cursor().unprocessed.is_empty());
    }

    #[tokio::test]
    async fn header_particle_precedes_body_records() {
        let mut file = eng_header();
        file.extend(eng_sample(1_000));
        file.extend(eng_sample(1_010));

        let mut parser = Parser::new(
            Cursor::new(file),
            Box::new(WfpEngFormat::new()),
            None,
            Callbacks::new(),
        )
        .unwrap();
        let records = parser.get_records(10).await.unwrap();

        let streams: Vec<&str> = records.iter().map(|r| r.particle.stream()).collect();
        assert_eq!(
            streams,
            vec!["wfp_start_time", "wfp_eng_engineering", "wfp_eng_engineering"]
        );
        // header cursor resumes past the header without re-reading it
        assert_eq!(records[0].cursor.position, 24);
    }

    #[tokio::test]
    async fn corrupt_header_fails_construction() {
        let mut file = eng_header();
        file[0] = 0x99;
        file.extend(eng_sample(1_000));

        let result = Parser::new(
            Cursor::new(file),
            Box::new(WfpEngFormat::new()),
            None,
            Callbacks::new(),
        );
        assert!(matches!(result, Err(ParseError::Header { .. })));
    }

    #[tokio::test]
    async fn dosta_yields_exactly_requested_count() {
        let mut file = dosta_header();
        file.extend(dosta_sample(100));
        file.extend(dosta_sample(110));
        file.extend(dosta_sample(120));
        file.extend(dosta_status());

        let mut parser = Parser::new(
            Cursor::new(file),
            Box::new(DostaWfpFormat::new()),
            None,
            Callbacks::new(),
        )
        .unwrap();

        let records = parser.get_records(3).await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records
            .iter()
            .all(|r| r.particle.stream() == "dosta_wfp_instrument"));

        // the status frame is still queued
        let rest = parser.get_records(10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].particle.stream(), "wfp_status");
        assert!(parser.cursor().unprocessed.is_empty());
        assert!(parser.cursor().in_process.is_empty());
    }

    #[tokio::test]
    async fn unsievable_body_is_reported_and_left_unprocessed() {
        let mut file = dosta_header();
        file.extend_from_slice(&[0x42; 10]); // stray bytes ahead of the frames
        file.extend(dosta_sample(100));
        file.extend(dosta_status());
        let (errors, callbacks) = errors_sink();

        let mut parser = Parser::new(
            Cursor::new(file),
            Box::new(DostaWfpFormat::new()),
            None,
            callbacks,
        )
        .unwrap();
        let records = parser.get_records(10).await.unwrap();

        assert!(records.is_empty());
        assert_eq!(errors.lock().unwrap().len(), 1);
        // the whole body is still unprocessed for a later pass
        assert_eq!(parser.cursor().unprocessed, vec![ByteRange::new(24, 80)]);

        // re-sieving the unchanged range does not re-report the failure
        assert!(parser.get_records(10).await.unwrap().is_empty());
        assert_eq!(errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn state_callback_fires_once_per_record() {
        let file = optode_record(0x10);
        let states: Arc<Mutex<Vec<ParserCursor>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);
        let callbacks =
            Callbacks::new().on_state(move |cursor| sink.lock().unwrap().push(cursor.clone()));

        let mut parser = Parser::new(
            Cursor::new(file),
            Box::new(OptodeLogFormat::new()),
            None,
            callbacks,
        )
        .unwrap();
        let records = parser.get_records(10).await.unwrap();
        assert_eq!(records.len(), 2); // metadata + sample from one chunk

        // one state snapshot per record, matching the attached cursors
        let states = states.lock().unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0], records[0].cursor);
        assert_eq!(states[1], records[1].cursor);
        assert!(!states[0].unprocessed.is_empty());
        assert!(states[1].unprocessed.is_empty());
    }

    #[tokio::test]
    async fn resume_from_mid_stream_cursor_continues_without_repeats() {
        let mut file = Vec::new();
        for t in [0x10u32, 0x20, 0x30, 0x40] {
            file.extend(optode_record(t));
        }

        let mut full = Parser::new(
            Cursor::new(file.clone()),
            Box::new(OptodeLogFormat::new()),
            None,
            Callbacks::new(),
        )
        .unwrap();
        let all = full.get_records(10).await.unwrap();
        assert_eq!(all.len(), 5); // metadata + 4 samples

        // resume from the cursor after the second record
        let persisted = all[1].cursor.persist().unwrap();
        let restored = ParserCursor::restore(&persisted).unwrap();
        let mut resumed = Parser::new(
            Cursor::new(file),
            Box::new(OptodeLogFormat::new()),
            Some(restored),
            Callbacks::new(),
        )
        .unwrap();
        let tail = resumed.get_records(10).await.unwrap();

        assert_eq!(tail.len(), 3);
        assert_eq!(
            tail.iter().map(|r| &r.particle).collect::<Vec<_>>(),
            all[2..].iter().map(|r| &r.particle).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn invalid_cursor_fails_construction() {
        let cursor = ParserCursor {
            unprocessed: vec![ByteRange::new(0, 100)],
            in_process: vec![],
            position: 50,
            metadata_sent: false,
        };
        let result = Parser::new(
            Cursor::new(Vec::new()),
            Box::new(OptodeLogFormat::new()),
            Some(cursor),
            Callbacks::new(),
        );
        assert!(matches!(result, Err(ParseError::InvalidState { .. })));
    }
}
