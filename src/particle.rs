//! Typed data particles decoded from instrument-log records.
//!
//! Each particle carries the fields unpacked from one structural record
//! plus an NTP-epoch timestamp. Wire encoding is out of scope here: a
//! particle exposes itself as a tagged key/value list and the publishing
//! layer takes it from there.

use chrono::{DateTime, TimeZone, Utc};

use crate::constants::NTP_EPOCH_DELTA;

/// One field value in a particle's tagged key/value view
#[derive(Debug, Clone, PartialEq)]
pub enum TaggedValue {
    Int(i64),
    UInt(u64),
    Float(f64),
}

/// A field name paired with its value
pub type TaggedField = (&'static str, TaggedValue);

/// Profiler start-time particle, built from the one-time file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WfpStartTimeParticle {
    pub sensor_start: u32,
    pub profile_start: u32,
}

/// Profiler status particle, built from a 16-byte status frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WfpStatusParticle {
    pub indicator: i32,
    pub ramp_status: i16,
    pub profile_status: i16,
    pub profile_stop: u32,
    pub sensor_stop: u32,
}

/// Telemetered profiler engineering sample
#[derive(Debug, Clone, PartialEq)]
pub struct WfpEngineeringParticle {
    pub timestamp: u32,
    pub current: f32,
    pub voltage: f32,
    pub pressure: f32,
}

/// Recovered oxygen-profiler instrument sample
#[derive(Debug, Clone, PartialEq)]
pub struct DostaSampleParticle {
    pub wfp_timestamp: u32,
    pub optode_oxygen: f32,
    pub optode_temperature: f32,
}

/// One-time optode controller-log metadata particle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptodeMetadataParticle {
    pub controller_timestamp: u32,
    pub product_number: u32,
    pub serial_number: u32,
}

/// Optode controller-log instrument sample
#[derive(Debug, Clone, PartialEq)]
pub struct OptodeSampleParticle {
    pub controller_timestamp: u32,
    pub estimated_oxygen: f64,
    pub estimated_saturation: f64,
    pub optode_temperature: f64,
    pub calibrated_phase: f64,
    pub temp_compensated_phase: f64,
    pub blue_phase: f64,
    pub red_phase: f64,
    pub blue_amplitude: f64,
    pub red_amplitude: f64,
    pub raw_temperature: f64,
}

/// A decoded, typed unit of instrument data
#[derive(Debug, Clone, PartialEq)]
pub enum Particle {
    StartTime(WfpStartTimeParticle),
    Status(WfpStatusParticle),
    Engineering(WfpEngineeringParticle),
    DostaSample(DostaSampleParticle),
    OptodeMetadata(OptodeMetadataParticle),
    OptodeSample(OptodeSampleParticle),
}

impl Particle {
    /// Stream name identifying the particle type on the wire
    pub fn stream(&self) -> &'static str {
        match self {
            Particle::StartTime(_) => "wfp_start_time",
            Particle::Status(_) => "wfp_status",
            Particle::Engineering(_) => "wfp_eng_engineering",
            Particle::DostaSample(_) => "dosta_wfp_instrument",
            Particle::OptodeMetadata(_) => "optode_log_metadata",
            Particle::OptodeSample(_) => "optode_log_instrument",
        }
    }

    /// Particle timestamp as NTP-epoch seconds
    pub fn ntp_timestamp(&self) -> f64 {
        let unix_seconds = match self {
            Particle::StartTime(p) => p.profile_start as f64,
            Particle::Status(p) => p.profile_stop as f64,
            Particle::Engineering(p) => p.timestamp as f64,
            Particle::DostaSample(p) => p.wfp_timestamp as f64,
            Particle::OptodeMetadata(p) => p.controller_timestamp as f64,
            Particle::OptodeSample(p) => p.controller_timestamp as f64,
        };
        unix_seconds + NTP_EPOCH_DELTA
    }

    /// Particle timestamp as a UTC datetime, when representable
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        let unix = self.ntp_timestamp() - NTP_EPOCH_DELTA;
        Utc.timestamp_opt(unix as i64, 0).single()
    }

    /// Tagged key/value view of the particle's fields
    pub fn tagged_values(&self) -> Vec<TaggedField> {
        use TaggedValue::*;
        match self {
            Particle::StartTime(p) => vec![
                ("wfp_sensor_start", UInt(p.sensor_start as u64)),
                ("wfp_profile_start", UInt(p.profile_start as u64)),
            ],
            Particle::Status(p) => vec![
                ("wfp_indicator", Int(p.indicator as i64)),
                ("wfp_ramp_status", Int(p.ramp_status as i64)),
                ("wfp_profile_status", Int(p.profile_status as i64)),
                ("wfp_profile_stop", UInt(p.profile_stop as u64)),
                ("wfp_sensor_stop", UInt(p.sensor_stop as u64)),
            ],
            Particle::Engineering(p) => vec![
                ("wfp_timestamp", UInt(p.timestamp as u64)),
                ("wfp_prof_current", Float(p.current as f64)),
                ("wfp_prof_voltage", Float(p.voltage as f64)),
                ("wfp_prof_pressure", Float(p.pressure as f64)),
            ],
            Particle::DostaSample(p) => vec![
                ("wfp_timestamp", UInt(p.wfp_timestamp as u64)),
                ("optode_oxygen", Float(p.optode_oxygen as f64)),
                ("optode_temperature", Float(p.optode_temperature as f64)),
            ],
            Particle::OptodeMetadata(p) => vec![
                ("controller_timestamp", UInt(p.controller_timestamp as u64)),
                ("product_number", UInt(p.product_number as u64)),
                ("serial_number", UInt(p.serial_number as u64)),
            ],
            Particle::OptodeSample(p) => vec![
                ("controller_timestamp", UInt(p.controller_timestamp as u64)),
                ("estimated_oxygen_concentration", Float(p.estimated_oxygen)),
                ("estimated_oxygen_saturation", Float(p.estimated_saturation)),
                ("optode_temperature", Float(p.optode_temperature)),
                ("calibrated_phase", Float(p.calibrated_phase)),
                ("temp_compensated_phase", Float(p.temp_compensated_phase)),
                ("blue_phase", Float(p.blue_phase)),
                ("red_phase", Float(p.red_phase)),
                ("blue_amplitude", Float(p.blue_amplitude)),
                ("red_amplitude", Float(p.red_amplitude)),
                ("raw_temperature", Float(p.raw_temperature)),
            ],
        }
    }
}
