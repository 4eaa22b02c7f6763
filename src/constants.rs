//! Protocol constants for the RAPIC ingest pipeline
//!
//! This module contains record markers, control bytes, buffer ceilings
//! and the fixed geometry values used throughout the decoder.

// =============================================================================
// Record Markers and Control Bytes
// =============================================================================

/// First byte of a binary radial record
pub const BINARY_RADIAL_MARKER: u8 = b'@';

/// First byte of an ASCII (6-level or 16-level) radial record
pub const ASCII_RADIAL_MARKER: u8 = b'%';

/// First byte of an image framing / comment record
pub const COMMENT_MARKER: u8 = b'/';

pub const NUL: u8 = 0x00;
pub const CTRL_C: u8 = 0x03;
pub const EOT: u8 = 0x04;
pub const CTRL_Z: u8 = 0x1a;
pub const CR: u8 = b'\r';
pub const LF: u8 = b'\n';
pub const HASH: u8 = b'#';

/// Bytes that end a non-binary record
pub const RECORD_TERMINATORS: &[u8] = &[CR, LF, HASH, CTRL_Z, CTRL_C, NUL];

/// A binary record may only terminate once this many bytes have accumulated
pub const MIN_BINARY_RECORD_LEN: usize = 20;

/// Length of the fixed `@aaa.a,eee.e,sss=` header written by the binary encoder
pub const BINARY_HEADER_LEN: usize = 17;

// =============================================================================
// Image Framing Markers
// =============================================================================

pub const IMAGE_START_MARKER: &str = "/IMAGE:";
pub const IMAGE_END_MARKER: &str = "/IMAGEEND:";
pub const IMAGE_SCANS_MARKER: &str = "/IMAGESCANS:";
pub const IMAGE_HEADER_END_MARKER: &str = "/IMAGEHEADER END";
pub const SCAN_LINE_MARKER: &str = "/SCAN";

/// Substring that closes one sub-scan (field) inside an image
pub const END_RADAR_IMAGE: &str = "END RADAR IMAGE";

// =============================================================================
// Buffer Ceilings
// =============================================================================

/// Historical gate ceiling for a single decoded radial
pub const DEFAULT_MAX_RADIAL_GATES: usize = 1536;

/// Default capacity of the record buffer
pub const DEFAULT_RECORD_BUFFER_SIZE: usize = 8192;

/// Default ceiling for the reflectivity resolution remap
pub const DEFAULT_REMAP_GATE_LIMIT: usize = 2048;

/// Fields whose radials are all empty still advertise this many gates
pub const MIN_FIELD_GATES: usize = 4;

// =============================================================================
// Angles and Geometry
// =============================================================================

/// Full circle in tenths of a degree
pub const TENTHS_PER_CIRCLE: i32 = 3600;

/// Half circle in tenths of a degree
pub const TENTHS_PER_HALF_CIRCLE: i32 = 1800;

/// Tolerance used when grouping scan descriptors by elevation
pub const ELEVATION_GROUP_EPSILON: f64 = 0.00001;

pub const DEFAULT_BEAM_WIDTH_DEG: f64 = 1.0;

/// Dual-resolution remap geometry (reflectivity 1000 m → velocity 250 m)
pub mod remap {
    pub const RATIO: usize = 4;
    pub const TARGET_START_RANGE_M: f64 = 375.0;
    pub const TARGET_RANGE_RES_M: f64 = 250.0;
    pub const REFL_FIELD: &str = "Refl";
    pub const VEL_FIELD: &str = "Vel";
}

// =============================================================================
// Level Tables
// =============================================================================

/// Reflectivity level 0 always represents "no echo" at this threshold
pub const NO_ECHO_DBZ: f64 = -32.0;

/// Default thresholds for 6-level video (8 entries, index 0 is no-echo)
pub const DEFAULT_6LVL_DBZ: [f64; 8] = [-32.0, 12.0, 23.0, 28.0, 35.0, 42.0, 48.0, 55.0];

/// Default thresholds for 16-level video
pub const DEFAULT_16LVL_DBZ: [f64; 16] = [
    -32.0, 12.0, 23.0, 28.0, 31.0, 34.0, 37.0, 40.0, 43.0, 46.0, 49.0, 52.0, 55.0, 58.0, 61.0,
    64.0,
];

/// Video resolution at and above which radials are 8-bit binary
pub const BINARY_VIDEO_RES: u16 = 256;

// =============================================================================
// Discovery
// =============================================================================

/// File extensions picked up when walking an input directory
pub const RAPIC_FILE_EXTENSIONS: &[&str] = &["rapic", "rap", "txt"];
