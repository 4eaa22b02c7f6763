//! Output seam between the assembler and whatever consumes volumes.
//!
//! The assembler drives a [`BeamSink`] with a fixed message sequence per
//! image:
//!
//! ```text
//! start_volume
//!   ( [new_scan_type] start_tilt radar_params beam* end_tilt )*
//! end_volume
//! ```
//!
//! Nothing is sent for an image until it has been read completely, so a
//! sink never sees a partial volume.

use crate::error::Result;
use crate::models::{CompositeBeam, RadarParams, VolumeInfo};
use tracing::info;

/// Receiver for assembled volumes
pub trait BeamSink {
    fn start_volume(&mut self, info: &VolumeInfo) -> Result<()>;

    /// Sent before a tilt whose radar-type flag differs from the previous tilt's
    fn new_scan_type(&mut self, _scan_type: i32) -> Result<()> {
        Ok(())
    }

    fn start_tilt(&mut self, tilt_num: usize, elevation_deg: f64) -> Result<()>;

    fn radar_params(&mut self, params: &RadarParams) -> Result<()>;

    fn beam(&mut self, beam: &CompositeBeam) -> Result<()>;

    fn end_tilt(&mut self, tilt_num: usize) -> Result<()>;

    fn end_volume(&mut self, info: &VolumeInfo) -> Result<()>;
}

/// Owned copy of one sink call
#[derive(Debug, Clone, PartialEq)]
pub enum RadarMessage {
    StartVolume(VolumeInfo),
    NewScanType(i32),
    StartTilt { tilt_num: usize, elevation_deg: f64 },
    RadarParams(RadarParams),
    Beam(CompositeBeam),
    EndTilt { tilt_num: usize },
    EndVolume(VolumeInfo),
}

/// Records every message in order
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub messages: Vec<RadarMessage>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beams(&self) -> impl Iterator<Item = &CompositeBeam> {
        self.messages.iter().filter_map(|m| match m {
            RadarMessage::Beam(beam) => Some(beam),
            _ => None,
        })
    }

    pub fn volumes(&self) -> impl Iterator<Item = &VolumeInfo> {
        self.messages.iter().filter_map(|m| match m {
            RadarMessage::EndVolume(info) => Some(info),
            _ => None,
        })
    }

    pub fn radar_params(&self) -> impl Iterator<Item = &RadarParams> {
        self.messages.iter().filter_map(|m| match m {
            RadarMessage::RadarParams(params) => Some(params),
            _ => None,
        })
    }
}

impl BeamSink for CollectingSink {
    fn start_volume(&mut self, info: &VolumeInfo) -> Result<()> {
        self.messages.push(RadarMessage::StartVolume(info.clone()));
        Ok(())
    }

    fn new_scan_type(&mut self, scan_type: i32) -> Result<()> {
        self.messages.push(RadarMessage::NewScanType(scan_type));
        Ok(())
    }

    fn start_tilt(&mut self, tilt_num: usize, elevation_deg: f64) -> Result<()> {
        self.messages.push(RadarMessage::StartTilt {
            tilt_num,
            elevation_deg,
        });
        Ok(())
    }

    fn radar_params(&mut self, params: &RadarParams) -> Result<()> {
        self.messages.push(RadarMessage::RadarParams(params.clone()));
        Ok(())
    }

    fn beam(&mut self, beam: &CompositeBeam) -> Result<()> {
        self.messages.push(RadarMessage::Beam(beam.clone()));
        Ok(())
    }

    fn end_tilt(&mut self, tilt_num: usize) -> Result<()> {
        self.messages.push(RadarMessage::EndTilt { tilt_num });
        Ok(())
    }

    fn end_volume(&mut self, info: &VolumeInfo) -> Result<()> {
        self.messages.push(RadarMessage::EndVolume(info.clone()));
        Ok(())
    }
}

/// Per-volume counts kept by [`SummarySink`]
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSummary {
    pub image_id: String,
    pub station_id: i32,
    pub n_tilts: usize,
    pub n_beams: usize,
    pub fields: Vec<String>,
}

/// Counts volumes and beams without retaining gate data; used for dry runs
#[derive(Debug, Default)]
pub struct SummarySink {
    pub volumes: Vec<VolumeSummary>,
    tilts: usize,
    beams: usize,
    fields: Vec<String>,
}

impl SummarySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BeamSink for SummarySink {
    fn start_volume(&mut self, _info: &VolumeInfo) -> Result<()> {
        self.tilts = 0;
        self.beams = 0;
        self.fields.clear();
        Ok(())
    }

    fn start_tilt(&mut self, _tilt_num: usize, _elevation_deg: f64) -> Result<()> {
        self.tilts += 1;
        Ok(())
    }

    fn radar_params(&mut self, params: &RadarParams) -> Result<()> {
        for field in &params.fields {
            if !self.fields.contains(&field.name) {
                self.fields.push(field.name.clone());
            }
        }
        Ok(())
    }

    fn beam(&mut self, _beam: &CompositeBeam) -> Result<()> {
        self.beams += 1;
        Ok(())
    }

    fn end_tilt(&mut self, _tilt_num: usize) -> Result<()> {
        Ok(())
    }

    fn end_volume(&mut self, info: &VolumeInfo) -> Result<()> {
        info!(
            "Volume {} (station {}): {} tilts, {} beams, fields [{}]",
            info.image_id,
            info.station_id,
            self.tilts,
            self.beams,
            self.fields.join(", ")
        );
        self.volumes.push(VolumeSummary {
            image_id: info.image_id.clone(),
            station_id: info.station_id,
            n_tilts: self.tilts,
            n_beams: self.beams,
            fields: std::mem::take(&mut self.fields),
        });
        Ok(())
    }
}
