//! Core data structures and types for RAPIC ingest.
//!
//! Defines records, angles, radials, scan descriptors, field collections
//! and the composite beams handed to the output sink.

use crate::constants::{TENTHS_PER_CIRCLE, TENTHS_PER_HALF_CIRCLE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;

/// Classification of a record produced by the record reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// `/`-prefixed framing or comment line
    Comment,
    /// `%`-prefixed 6-level or 16-level radial
    AsciiRadial,
    /// `@`-prefixed binary radial
    BinaryRadial,
    /// Any other text line (usually `KEY: value`)
    Header,
    /// Record force-terminated because the buffer filled up
    Overflow,
}

impl RecordKind {
    pub fn name(&self) -> &'static str {
        match self {
            RecordKind::Comment => "comment",
            RecordKind::AsciiRadial => "ascii radial",
            RecordKind::BinaryRadial => "binary radial",
            RecordKind::Header => "header",
            RecordKind::Overflow => "overflow",
        }
    }

    pub fn is_radial(&self) -> bool {
        matches!(self, RecordKind::AsciiRadial | RecordKind::BinaryRadial)
    }
}

/// One classified record, terminator stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    kind: RecordKind,
    bytes: Vec<u8>,
}

impl RawRecord {
    pub fn new(kind: RecordKind, bytes: Vec<u8>) -> Self {
        Self { kind, bytes }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lossy text view, used for header and comment lines
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Substring search over the raw bytes
    pub fn contains(&self, needle: &str) -> bool {
        let needle = needle.as_bytes();
        !needle.is_empty()
            && self.bytes.len() >= needle.len()
            && self.bytes.windows(needle.len()).any(|w| w == needle)
    }
}

/// Angle in tenths of a degree, normalised into [0, 3600)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RadarAngle(i32);

impl RadarAngle {
    pub fn from_tenths(tenths: i32) -> Self {
        Self(tenths.rem_euclid(TENTHS_PER_CIRCLE))
    }

    /// Rounds to the nearest tenth before normalising
    pub fn from_degrees(degrees: f64) -> Self {
        Self::from_tenths((degrees * 10.0).round() as i32)
    }

    pub fn tenths(&self) -> i32 {
        self.0
    }

    pub fn degrees(&self) -> f64 {
        f64::from(self.0) / 10.0
    }

    /// Circular ordering used by the azimuth merge.
    ///
    /// `a` precedes `b` when `b` lies less than half a turn clockwise of `a`.
    /// Pairs exactly half a turn apart resolve to the numerically smaller angle,
    /// so for any `a != b` exactly one of `a.precedes(b)` and `b.precedes(a)` holds.
    pub fn precedes(&self, other: RadarAngle) -> bool {
        let (a, b) = (self.0, other.0);
        if a < b {
            b - a <= TENTHS_PER_HALF_CIRCLE
        } else {
            a - b > TENTHS_PER_HALF_CIRCLE
        }
    }
}

impl fmt::Display for RadarAngle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.degrees())
    }
}

/// One decoded radial
#[derive(Debug, Clone, PartialEq)]
pub struct Radial {
    pub azimuth: RadarAngle,
    pub elevation: RadarAngle,
    pub timestamp: Option<DateTime<Utc>>,
    pub gates: Vec<u8>,
    /// Set when the decoder hit the gate ceiling and dropped the tail
    pub truncated: bool,
}

/// One `/SCAN n:` entry from the image header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanDescriptor {
    pub scan_num: i32,
    pub station_id: i32,
    /// `yymmddhhmm` as written in the scan line
    pub timestamp: String,
    pub radar_type_flag: i32,
    pub elev_angle: f64,
    pub field_index: i32,
    /// Filled in once the whole list has been grouped
    pub n_fields_at_elev: usize,
    pub flags: i32,
    pub offset: Option<i64>,
    pub size: Option<i64>,
}

/// Moment kinds with a fixed scale/bias table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MomentKind {
    Refl,
    Vel,
    Width,
    Zdr,
    Phidp,
    Rhohv,
    Other(String),
}

/// Linear transform from raw byte to physical value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldScaling {
    pub scale: f64,
    pub bias: f64,
    pub units: String,
}

impl MomentKind {
    /// Maps a `VIDEO:` name onto a moment kind, ignoring case
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "refl" | "uncorrefl" => MomentKind::Refl,
            "vel" | "filtvel" => MomentKind::Vel,
            "spwdth" | "width" => MomentKind::Width,
            "diffz" | "zdr" => MomentKind::Zdr,
            "phidp" => MomentKind::Phidp,
            "rhohv" => MomentKind::Rhohv,
            _ => MomentKind::Other(name.trim().to_string()),
        }
    }

    pub fn scaling(&self, nyquist: f64) -> FieldScaling {
        let (scale, bias, units) = match self {
            MomentKind::Refl => (0.5, -32.0, "dBZ"),
            MomentKind::Vel => (nyquist / 127.0, -nyquist * 128.0 / 127.0, "m/s"),
            MomentKind::Width => (nyquist / 255.0, 0.0, "m/s"),
            MomentKind::Zdr => (1.0 / 16.0, -8.0, "dB"),
            MomentKind::Phidp => (360.0 / 255.0, 0.0, "deg"),
            MomentKind::Rhohv => (1.0 / 255.0, 0.0, ""),
            MomentKind::Other(_) => (1.0, 0.0, ""),
        };
        FieldScaling {
            scale,
            bias,
            units: units.to_string(),
        }
    }
}

/// Radials for one (elevation, field) pair
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCollection {
    pub field_name: String,
    pub moment: MomentKind,
    pub units: String,
    pub scale: f64,
    pub bias: f64,
    pub start_range: f64,
    pub range_res: f64,
    pub radials: Vec<Radial>,
    /// Gate count advertised downstream for this field
    pub max_gates: usize,
    /// Set when the field closed without a single radial
    pub empty: bool,
}

impl FieldCollection {
    pub fn new(field_name: &str, nyquist: f64, start_range: f64, range_res: f64) -> Self {
        let moment = MomentKind::from_name(field_name);
        let FieldScaling { scale, bias, units } = moment.scaling(nyquist);
        Self {
            field_name: field_name.to_string(),
            moment,
            units,
            scale,
            bias,
            start_range,
            range_res,
            radials: Vec::new(),
            max_gates: 0,
            empty: false,
        }
    }

    /// Longest radial currently held
    pub fn longest_radial(&self) -> usize {
        self.radials.iter().map(|r| r.gates.len()).max().unwrap_or(0)
    }
}

/// One azimuth with every field's gates interleaved at stride `n_fields`
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeBeam {
    pub azimuth: RadarAngle,
    pub elevation: RadarAngle,
    pub timestamp: Option<DateTime<Utc>>,
    pub n_fields: usize,
    pub n_gates: usize,
    pub data: Vec<u8>,
}

impl CompositeBeam {
    pub fn gate(&self, field: usize, gate: usize) -> u8 {
        self.data
            .get(gate * self.n_fields + field)
            .copied()
            .unwrap_or(0)
    }

    /// Copies one field's gates out of the interleaved buffer
    pub fn field_gates(&self, field: usize) -> Vec<u8> {
        (0..self.n_gates).map(|g| self.gate(field, g)).collect()
    }
}

/// Per-field entry of the radar parameters record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldParams {
    pub name: String,
    pub units: String,
    pub scale: f64,
    pub bias: f64,
    pub start_range_m: f64,
    pub range_res_m: f64,
    pub n_gates: usize,
}

impl From<&FieldCollection> for FieldParams {
    fn from(field: &FieldCollection) -> Self {
        Self {
            name: field.field_name.clone(),
            units: field.units.clone(),
            scale: field.scale,
            bias: field.bias,
            start_range_m: field.start_range,
            range_res_m: field.range_res,
            n_gates: field.max_gates,
        }
    }
}

/// Radar parameters sent ahead of each tilt's beams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarParams {
    pub radar_id: i32,
    pub radar_name: String,
    pub scan_type: i32,
    pub tilt_num: usize,
    pub elevation_deg: f64,
    pub gate_count: usize,
    pub gate_spacing_m: f64,
    pub start_range_m: f64,
    pub beam_width_deg: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    pub frequency_mhz: Option<f64>,
    pub prf: Option<f64>,
    pub pulse_length_us: Option<f64>,
    pub nyquist: f64,
    pub clear_air: bool,
    pub fields: Vec<FieldParams>,
}

/// Volume-level identity sent with the start and end of volume markers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub image_id: String,
    pub station_id: i32,
    pub radar_name: String,
    pub volume_id: Option<i32>,
    pub timestamp: Option<DateTime<Utc>>,
    pub n_tilts: usize,
}

/// Counters for one stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestStats {
    pub images_seen: usize,
    pub volumes_emitted: usize,
    pub images_skipped: usize,
    pub beams_emitted: usize,
    pub radials_dropped: usize,
    pub overflow_records: usize,
    pub empty_fields: usize,
    pub skip_reasons: Vec<String>,
}

impl IngestStats {
    pub fn absorb(&mut self, other: IngestStats) {
        self.images_seen += other.images_seen;
        self.volumes_emitted += other.volumes_emitted;
        self.images_skipped += other.images_skipped;
        self.beams_emitted += other.beams_emitted;
        self.radials_dropped += other.radials_dropped;
        self.overflow_records += other.overflow_records;
        self.empty_fields += other.empty_fields;
        self.skip_reasons.extend(other.skip_reasons);
    }
}

/// Processing statistics for a whole run
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub files_processed: usize,
    pub files_failed: usize,
    pub ingest: IngestStats,
    pub output_path: PathBuf,
    pub processing_time_ms: u128,
}
