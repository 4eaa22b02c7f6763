//! Parquet writing for assembled volumes
//!
//! Each volume becomes one Parquet file holding one row per
//! (beam, field, gate). Files are written to a temporary path in the output
//! directory and renamed into place once complete.

use super::sink::BeamSink;
use crate::config::{CompressionAlgorithm, IngestConfig};
use crate::error::{RapicError, Result};
use crate::models::{CompositeBeam, FieldParams, RadarParams, VolumeInfo};

use polars::df;
use polars::prelude::{DataFrame, ParquetWriter as PolarsParquetWriter, StatisticsOptions};
use std::io::ErrorKind;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::debug;

/// Column buffers for the volume being written
#[derive(Debug, Default)]
struct VolumeColumns {
    tilt: Vec<u32>,
    elevation: Vec<f32>,
    azimuth: Vec<f32>,
    time_ms: Vec<Option<i64>>,
    field: Vec<String>,
    gate: Vec<u32>,
    range_m: Vec<f32>,
    raw: Vec<u32>,
    value: Vec<f32>,
}

impl VolumeColumns {
    fn len(&self) -> usize {
        self.raw.len()
    }

    fn push_beam(
        &mut self,
        tilt: u32,
        fields: &[FieldParams],
        beam: &CompositeBeam,
        keep_null_gates: bool,
    ) {
        let elevation = beam.elevation.degrees() as f32;
        let azimuth = beam.azimuth.degrees() as f32;
        let time_ms = beam.timestamp.map(|t| t.timestamp_millis());

        for (f, field) in fields.iter().enumerate() {
            for g in 0..beam.n_gates.min(field.n_gates) {
                let raw = beam.gate(f, g);
                if raw == 0 && !keep_null_gates {
                    continue;
                }
                self.tilt.push(tilt);
                self.elevation.push(elevation);
                self.azimuth.push(azimuth);
                self.time_ms.push(time_ms);
                self.field.push(field.name.clone());
                self.gate.push(g as u32);
                self.range_m
                    .push((field.start_range_m + g as f64 * field.range_res_m) as f32);
                self.raw.push(u32::from(raw));
                self.value
                    .push((f64::from(raw) * field.scale + field.bias) as f32);
            }
        }
    }

    fn into_frame(self) -> Result<DataFrame> {
        let df = df!(
            "tilt" => self.tilt,
            "elevation" => self.elevation,
            "azimuth" => self.azimuth,
            "time_ms" => self.time_ms,
            "field" => self.field,
            "gate" => self.gate,
            "range_m" => self.range_m,
            "raw" => self.raw,
            "value" => self.value,
        )?;
        Ok(df)
    }
}

/// Sink writing one Parquet file per volume
#[derive(Debug)]
pub struct ParquetSink {
    output_dir: PathBuf,
    compression: CompressionAlgorithm,
    keep_null_gates: bool,
    columns: Option<VolumeColumns>,
    tilt: u32,
    fields: Vec<FieldParams>,
    written: Vec<PathBuf>,
    rows_written: usize,
}

impl ParquetSink {
    pub fn new(output_dir: impl Into<PathBuf>, config: &IngestConfig) -> Self {
        Self {
            output_dir: output_dir.into(),
            compression: config.compression,
            keep_null_gates: config.keep_null_gates,
            columns: None,
            tilt: 0,
            fields: Vec::new(),
            written: Vec::new(),
            rows_written: 0,
        }
    }

    /// Files completed so far, in write order
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// `<station>_<YYYYMMDDhhmmss>_v<volume_id>.parquet`
    pub fn volume_file_name(info: &VolumeInfo) -> String {
        let stamp = info
            .timestamp
            .map(|t| t.format("%Y%m%d%H%M%S").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "{}_{}_v{}.parquet",
            info.station_id,
            stamp,
            info.volume_id.unwrap_or(0)
        )
    }

    /// Writes `df` under the volume's name, adding `_1`, `_2`, .. while the
    /// name is taken in the output directory.
    fn write_volume(&self, mut df: DataFrame, info: &VolumeInfo) -> Result<PathBuf> {
        let name = Self::volume_file_name(info);
        let stem = name.trim_end_matches(".parquet");

        let mut file = NamedTempFile::new_in(&self.output_dir)?;
        PolarsParquetWriter::new(file.as_file())
            .with_compression(self.compression.to_polars_compression())
            .with_statistics(StatisticsOptions::full())
            .finish(&mut df)
            .map_err(|e| RapicError::ProcessingFailed {
                path: self.output_dir.join(&name),
                reason: format!("Failed to write volume parquet: {}", e),
            })?;

        let mut n = 0usize;
        loop {
            let path = if n == 0 {
                self.output_dir.join(&name)
            } else {
                self.output_dir.join(format!("{stem}_{n}.parquet"))
            };
            match file.persist_noclobber(&path) {
                Ok(_) => return Ok(path),
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                    debug!("{} exists, trying next suffix", path.display());
                    file = e.file;
                    n += 1;
                }
                Err(e) => return Err(RapicError::Io(e.error)),
            }
        }
    }
}

impl BeamSink for ParquetSink {
    fn start_volume(&mut self, info: &VolumeInfo) -> Result<()> {
        debug!("Starting volume {} for station {}", info.image_id, info.station_id);
        self.columns = Some(VolumeColumns::default());
        Ok(())
    }

    fn start_tilt(&mut self, tilt_num: usize, _elevation_deg: f64) -> Result<()> {
        self.tilt = tilt_num as u32;
        self.fields.clear();
        Ok(())
    }

    fn radar_params(&mut self, params: &RadarParams) -> Result<()> {
        self.fields = params.fields.clone();
        Ok(())
    }

    fn beam(&mut self, beam: &CompositeBeam) -> Result<()> {
        if beam.n_fields != self.fields.len() {
            return Err(RapicError::Internal {
                message: format!(
                    "beam carries {} fields but tilt {} declared {}",
                    beam.n_fields,
                    self.tilt,
                    self.fields.len()
                ),
            });
        }
        let columns = self.columns.as_mut().ok_or_else(|| RapicError::Internal {
            message: "beam data received outside a volume".to_string(),
        })?;
        columns.push_beam(self.tilt, &self.fields, beam, self.keep_null_gates);
        Ok(())
    }

    fn end_tilt(&mut self, _tilt_num: usize) -> Result<()> {
        Ok(())
    }

    fn end_volume(&mut self, info: &VolumeInfo) -> Result<()> {
        let columns = self.columns.take().ok_or_else(|| RapicError::Internal {
            message: "end of volume without a start".to_string(),
        })?;
        let rows = columns.len();
        let path = self.write_volume(columns.into_frame()?, info)?;

        debug!("Wrote {} rows to {}", rows, path.display());
        self.rows_written += rows;
        self.written.push(path);
        Ok(())
    }
}
