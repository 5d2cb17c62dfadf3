//! Shared constants for particle ingestion.

/// Bounded read increment for pulling bytes from the source stream.
/// The engine yields cooperatively between increments so a large file
/// does not monopolize the host scheduler.
pub const READ_BLOCK_SIZE: usize = 1024;

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch
/// (1970-01-01). Instrument timestamps are Unix seconds; particles carry
/// NTP-epoch seconds.
pub const NTP_EPOCH_DELTA: f64 = 2_208_988_800.0;
