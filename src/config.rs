//! Configuration management and validation.
//!
//! Provides the ingest configuration: station/volume expectations,
//! beam geometry, buffer ceilings and Parquet output settings.

use crate::constants::{
    DEFAULT_BEAM_WIDTH_DEG, DEFAULT_MAX_RADIAL_GATES, DEFAULT_RECORD_BUFFER_SIZE,
    DEFAULT_REMAP_GATE_LIMIT,
};
use crate::error::{RapicError, Result};
use polars::prelude::ParquetCompression;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported compression algorithms for parquet files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionAlgorithm {
    /// Snappy compression - good balance of speed and compression
    Snappy,
    /// ZSTD compression - better compression ratio, slower
    Zstd,
    /// LZ4 compression - fastest, lower compression ratio
    Lz4,
    /// No compression
    Uncompressed,
}

impl CompressionAlgorithm {
    /// Convert to polars ParquetCompression type
    pub fn to_polars_compression(&self) -> ParquetCompression {
        match self {
            CompressionAlgorithm::Snappy => ParquetCompression::Snappy,
            CompressionAlgorithm::Zstd => ParquetCompression::Zstd(None),
            CompressionAlgorithm::Lz4 => ParquetCompression::Lz4Raw,
            CompressionAlgorithm::Uncompressed => ParquetCompression::Uncompressed,
        }
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = RapicError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "snappy" => Ok(CompressionAlgorithm::Snappy),
            "zstd" => Ok(CompressionAlgorithm::Zstd),
            "lz4" => Ok(CompressionAlgorithm::Lz4),
            "none" | "uncompressed" => Ok(CompressionAlgorithm::Uncompressed),
            other => Err(RapicError::Configuration {
                message: format!("unknown compression algorithm '{other}'"),
            }),
        }
    }
}

/// Global configuration for RAPIC ingest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Volumes from any other radar are skipped
    pub expected_radar_name: Option<String>,

    /// Volumes with any other `VOLUMEID:` are skipped
    pub expected_volume_id: Option<i32>,

    /// Beam width in degrees; half of it bounds the elevation check
    pub beam_width_deg: f64,

    /// Flip the sign of header latitudes
    pub invert_latitude: bool,

    /// Gate ceiling for the reflectivity resolution remap
    pub remap_gate_limit: usize,

    /// Gate ceiling for a single decoded radial
    pub max_radial_gates: usize,

    /// Record buffer capacity in bytes
    pub record_buffer_size: usize,

    /// Maximum concurrent file processing
    pub max_concurrent_files: usize,

    /// Write rows for gates with a raw value of 0
    pub keep_null_gates: bool,

    /// Parquet compression
    pub compression: CompressionAlgorithm,

    /// Summarise volumes without writing Parquet files
    pub dry_run: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            expected_radar_name: None,
            expected_volume_id: None,
            beam_width_deg: DEFAULT_BEAM_WIDTH_DEG,
            invert_latitude: false,
            remap_gate_limit: DEFAULT_REMAP_GATE_LIMIT,
            max_radial_gates: DEFAULT_MAX_RADIAL_GATES,
            record_buffer_size: DEFAULT_RECORD_BUFFER_SIZE,
            max_concurrent_files: num_cpus::get().max(1),
            keep_null_gates: false,
            compression: CompressionAlgorithm::Snappy,
            dry_run: false,
        }
    }
}

impl IngestConfig {
    /// Only accept volumes from this radar
    pub fn with_expected_radar_name(mut self, name: impl Into<String>) -> Self {
        self.expected_radar_name = Some(name.into());
        self
    }

    /// Only accept volumes with this volume id
    pub fn with_expected_volume_id(mut self, volume_id: i32) -> Self {
        self.expected_volume_id = Some(volume_id);
        self
    }

    pub fn with_beam_width(mut self, degrees: f64) -> Self {
        self.beam_width_deg = degrees;
        self
    }

    pub fn with_inverted_latitude(mut self) -> Self {
        self.invert_latitude = true;
        self
    }

    pub fn with_remap_gate_limit(mut self, limit: usize) -> Self {
        self.remap_gate_limit = limit;
        self
    }

    pub fn with_max_radial_gates(mut self, gates: usize) -> Self {
        self.max_radial_gates = gates;
        self
    }

    pub fn with_record_buffer_size(mut self, bytes: usize) -> Self {
        self.record_buffer_size = bytes;
        self
    }

    /// Set maximum concurrent files
    pub fn with_max_concurrent_files(mut self, max_files: usize) -> Self {
        self.max_concurrent_files = max_files;
        self
    }

    pub fn with_null_gates(mut self) -> Self {
        self.keep_null_gates = true;
        self
    }

    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.compression = compression;
        self
    }

    /// Enable dry-run mode
    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Half the beam width, the allowed elevation disagreement
    pub fn elevation_tolerance(&self) -> f64 {
        self.beam_width_deg / 2.0
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| -> Result<()> { Err(RapicError::Configuration { message }) };
        if !(self.beam_width_deg.is_finite() && self.beam_width_deg > 0.0) {
            return fail(format!("beam width must be positive, got {}", self.beam_width_deg));
        }
        if self.max_radial_gates == 0 || self.remap_gate_limit == 0 {
            return fail("gate ceilings must be non-zero".to_string());
        }
        if self.record_buffer_size == 0 {
            return fail("record buffer size must be non-zero".to_string());
        }
        if self.max_radial_gates > self.record_buffer_size {
            return fail(format!(
                "max radial gates ({}) exceeds record buffer size ({})",
                self.max_radial_gates, self.record_buffer_size
            ));
        }
        if self.max_concurrent_files == 0 {
            return fail("max concurrent files must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_radial_gates, 1536);
        assert_eq!(config.elevation_tolerance(), 0.5);
    }

    #[test]
    fn test_builder_overrides() {
        let config = IngestConfig::default()
            .with_expected_radar_name("Melb")
            .with_expected_volume_id(3)
            .with_beam_width(0.9)
            .with_inverted_latitude()
            .with_compression(CompressionAlgorithm::Zstd);
        assert_eq!(config.expected_radar_name.as_deref(), Some("Melb"));
        assert_eq!(config.expected_volume_id, Some(3));
        assert!(config.invert_latitude);
        assert!((config.elevation_tolerance() - 0.45).abs() < 1e-12);
        assert_eq!(config.compression, CompressionAlgorithm::Zstd);
    }

    #[test]
    fn test_validation_failures() {
        assert!(IngestConfig::default().with_beam_width(0.0).validate().is_err());
        assert!(
            IngestConfig::default()
                .with_record_buffer_size(512)
                .validate()
                .is_err()
        );
        assert!(
            IngestConfig::default()
                .with_max_concurrent_files(0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_compression_from_str() {
        assert_eq!(
            "ZSTD".parse::<CompressionAlgorithm>().unwrap(),
            CompressionAlgorithm::Zstd
        );
        assert_eq!(
            "none".parse::<CompressionAlgorithm>().unwrap(),
            CompressionAlgorithm::Uncompressed
        );
        assert!("brotli".parse::<CompressionAlgorithm>().is_err());
    }
}
