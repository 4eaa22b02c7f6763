//! Error handling for RAPIC ingest operations.
//!
//! Codec and metadata failures are typed so the scan assembler can decide
//! between dropping a radial, skipping an image, or aborting the stream.

use std::path::PathBuf;
use thiserror::Error;

/// Failures while decoding or encoding a single radial
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Malformed angle prefix at byte {offset}: {reason}")]
    MalformedAngle { offset: usize, reason: String },

    #[error("Binary radial too short: expected at least {expected} bytes, found {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("Level {level} at gate {gate} is outside the {format} alphabet (max {max})")]
    InvalidLevel {
        format: &'static str,
        gate: usize,
        level: u8,
        max: u8,
    },

    #[error("Encoded radial of {length} bytes does not fit the 16-bit length field")]
    EncodedTooLong { length: usize },
}

/// Failures while parsing header lines or the scan descriptor list
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetadataError {
    #[error("Malformed {key} line: {line}")]
    MalformedLine { key: &'static str, line: String },

    #[error("Scan list ended with {found} descriptors but {declared} were declared")]
    ScanCountMismatch { declared: usize, found: usize },

    #[error("Scan list ended without a declared scan count")]
    MissingScanCount,

    #[error("Scan list contains no descriptors")]
    NoFields,

    #[error("{n_scans} scans cannot be split into PPIs of {n_fields} fields")]
    UnevenFieldGrouping { n_scans: usize, n_fields: usize },

    #[error("Single-scan composite PPI images are not supported")]
    CompositePpi,

    #[error("Invalid {key} counter: {value}")]
    InvalidCounter { key: &'static str, value: String },
}

/// Reasons an image is abandoned as a whole
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImageError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("Radar name mismatch: expected {expected}, found {found}")]
    RadarNameMismatch { expected: String, found: String },

    #[error("Volume id mismatch: expected {expected}, found {found:?}")]
    VolumeIdMismatch { expected: i32, found: Option<i32> },

    #[error(
        "Elevation {found:.2} deg of scan {scan_num} differs from descriptor {expected:.2} deg by more than {tolerance:.2}"
    )]
    ElevationMismatch {
        scan_num: i32,
        expected: f64,
        found: f64,
        tolerance: f64,
    },

    #[error("Scan {scan_num} carries no ELEV: header")]
    MissingElevation { scan_num: i32 },

    #[error("Image truncated while {stage}")]
    Truncated { stage: &'static str },

    #[error("Unexpected {kind} record while {stage}")]
    UnexpectedRecord {
        kind: &'static str,
        stage: &'static str,
    },
}

/// Failures that end processing of a stream or a run
///
/// Codec and image errors never surface here: they drop a radial or skip
/// an image and are counted in the ingest statistics instead.
#[derive(Error, Debug)]
pub enum RapicError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Input not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error("Invalid input pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Processing failed for file: {path} - {reason}")]
    ProcessingFailed { path: PathBuf, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

pub type Result<T> = std::result::Result<T, RapicError>;
