//! Per-image state machine.
//!
//! ```text
//! SeekImageStart -> ReadScanList -> (ReadScanParams -> ReadField) x fields x PPIs
//!                -> MergeEmit -> SeekImageEnd -> SeekImageStart ...
//! ```
//!
//! An image is read completely before anything is sent to the sink. Any
//! image-level failure abandons the image, skips to its `/IMAGEEND:` marker
//! and resumes the search for the next `/IMAGE:`. End of input while seeking
//! an image start is normal termination.

use super::merge::{BeamMerger, apply_resolution_remap, settle_gate_counts};
use super::sink::BeamSink;
use crate::codec::{DecodeStatus, DecodedRadial, VideoFormat, decode_record};
use crate::config::IngestConfig;
use crate::constants::{END_RADAR_IMAGE, IMAGE_END_MARKER, IMAGE_START_MARKER};
use crate::error::{ImageError, MetadataError, RapicError, Result};
use crate::models::{
    FieldCollection, FieldParams, IngestStats, MomentKind, RadarAngle, RadarParams, Radial,
    RawRecord, RecordKind, ScanDescriptor, VolumeInfo,
};
use crate::record_reader::RecordReader;
use crate::scan_list::{ScanList, ScanListBuilder};
use crate::scan_params::{ScanParams, ScanParamsBuilder};

use chrono::TimeDelta;
use std::io::BufRead;
use tracing::{debug, trace, warn};

/// Where the assembler is within the current image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    SeekImageStart,
    ReadScanList,
    ReadScanParams { ppi: usize, field: usize },
    ReadField { ppi: usize, field: usize },
    MergeEmit,
    SeekImageEnd,
    Finished,
}

/// Why reading an image stopped early
#[derive(Debug)]
enum ImageFailure {
    /// Abandon this image and look for the next one
    Rejected(ImageError),
    /// Stop the whole stream
    Fatal(RapicError),
}

impl From<ImageError> for ImageFailure {
    fn from(err: ImageError) -> Self {
        ImageFailure::Rejected(err)
    }
}

impl From<MetadataError> for ImageFailure {
    fn from(err: MetadataError) -> Self {
        ImageFailure::Rejected(ImageError::Metadata(err))
    }
}

impl From<RapicError> for ImageFailure {
    fn from(err: RapicError) -> Self {
        ImageFailure::Fatal(err)
    }
}

type ImageResult<T> = std::result::Result<T, ImageFailure>;

/// One PPI with its fields prepared for merging
#[derive(Debug, Clone)]
pub struct AssembledTilt {
    pub params: RadarParams,
    pub fields: Vec<FieldCollection>,
}

/// A fully read and validated image
#[derive(Debug, Clone)]
pub struct AssembledVolume {
    pub info: VolumeInfo,
    pub tilts: Vec<AssembledTilt>,
}

/// Pull-based assembler driving a [`RecordReader`] over one stream
pub struct ScanAssembler<R> {
    reader: RecordReader<R>,
    config: IngestConfig,
    state: AssemblerState,
    stats: IngestStats,
    last_scan_type: Option<i32>,
}

impl<R: BufRead> ScanAssembler<R> {
    pub fn new(source: R, config: IngestConfig) -> Self {
        let reader = RecordReader::with_capacity(source, config.record_buffer_size);
        Self {
            reader,
            config,
            state: AssemblerState::SeekImageStart,
            stats: IngestStats::default(),
            last_scan_type: None,
        }
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Streams every image to `sink` until end of input
    pub fn run<S: BeamSink + ?Sized>(&mut self, sink: &mut S) -> Result<IngestStats> {
        while let Some(volume) = self.next_volume()? {
            self.state = AssemblerState::MergeEmit;
            self.emit_volume(&volume, sink)?;
            self.stats.volumes_emitted += 1;

            self.state = AssemblerState::SeekImageEnd;
            self.seek_image_end()?;
        }
        self.state = AssemblerState::Finished;
        Ok(self.stats.clone())
    }

    /// Reads the next image that passes validation, skipping rejected ones.
    ///
    /// Returns `Ok(None)` at end of input.
    pub fn next_volume(&mut self) -> Result<Option<AssembledVolume>> {
        loop {
            self.state = AssemblerState::SeekImageStart;
            let Some(image_id) = self.seek_image_start()? else {
                self.state = AssemblerState::Finished;
                self.stats.overflow_records = self.reader.overflow_count();
                return Ok(None);
            };
            self.stats.images_seen += 1;
            debug!("Reading image {}", image_id);

            let result = self.read_image(&image_id);
            self.stats.overflow_records = self.reader.overflow_count();
            match result {
                Ok(volume) => return Ok(Some(volume)),
                Err(ImageFailure::Fatal(err)) => return Err(err),
                Err(ImageFailure::Rejected(reason)) => {
                    warn!("Skipping image {}: {}", image_id, reason);
                    self.stats.images_skipped += 1;
                    self.stats.skip_reasons.push(format!("{image_id}: {reason}"));

                    self.state = AssemblerState::SeekImageEnd;
                    self.seek_image_end()?;
                }
            }
        }
    }

    fn emit_volume<S: BeamSink + ?Sized>(
        &mut self,
        volume: &AssembledVolume,
        sink: &mut S,
    ) -> Result<()> {
        sink.start_volume(&volume.info)?;
        for (tilt_num, tilt) in volume.tilts.iter().enumerate() {
            let scan_type = tilt.params.scan_type;
            if self.last_scan_type != Some(scan_type) {
                sink.new_scan_type(scan_type)?;
                self.last_scan_type = Some(scan_type);
            }
            sink.start_tilt(tilt_num, tilt.params.elevation_deg)?;
            sink.radar_params(&tilt.params)?;

            let mut merger = BeamMerger::new(&tilt.fields);
            for beam in merger.by_ref() {
                sink.beam(&beam)?;
                self.stats.beams_emitted += 1;
            }
            if merger.duplicates() > 0 {
                warn!(
                    "Image {} tilt {}: dropped {} radials with repeated azimuths",
                    volume.info.image_id,
                    tilt_num,
                    merger.duplicates()
                );
                self.stats.radials_dropped += merger.duplicates();
            }
            sink.end_tilt(tilt_num)?;
        }
        sink.end_volume(&volume.info)?;
        debug!(
            "Emitted volume {} with {} tilts",
            volume.info.image_id,
            volume.tilts.len()
        );
        Ok(())
    }

    fn seek_image_start(&mut self) -> Result<Option<String>> {
        while let Some(record) = self.reader.next_record()? {
            if record.kind() == RecordKind::Comment && record.contains(IMAGE_START_MARKER) {
                let text = record.text();
                let id = text
                    .split_once(IMAGE_START_MARKER)
                    .map(|(_, rest)| rest.trim().to_string())
                    .unwrap_or_default();
                return Ok(Some(id));
            }
            trace!("Skipping {} record outside an image", record.kind().name());
        }
        Ok(None)
    }

    /// Consumes up to the image end marker, stopping short of a new image start
    fn seek_image_end(&mut self) -> Result<()> {
        while let Some(record) = self.reader.next_record()? {
            if record.kind() != RecordKind::Comment {
                continue;
            }
            if record.contains(IMAGE_END_MARKER) {
                return Ok(());
            }
            if record.contains(IMAGE_START_MARKER) {
                self.reader.push_back(record)?;
                return Ok(());
            }
        }
        Ok(())
    }

    fn next_record(&mut self, stage: &'static str) -> ImageResult<RawRecord> {
        match self.reader.next_record()? {
            Some(record) => Ok(record),
            None => Err(ImageError::Truncated { stage }.into()),
        }
    }

    /// Image framing markers inside an image mean the current one was cut short
    fn check_framing(&mut self, record: RawRecord, stage: &'static str) -> ImageResult<()> {
        if record.contains(IMAGE_START_MARKER) || record.contains(IMAGE_END_MARKER) {
            self.reader.push_back(record)?;
            return Err(ImageError::Truncated { stage }.into());
        }
        trace!("Ignoring comment: {}", record.text());
        Ok(())
    }

    fn read_image(&mut self, image_id: &str) -> ImageResult<AssembledVolume> {
        self.state = AssemblerState::ReadScanList;
        let scan_list = self.read_scan_list()?;

        let mut tilts = Vec::with_capacity(scan_list.n_ppis());
        let mut volume_params: Option<ScanParams> = None;

        for ppi in 0..scan_list.n_ppis() {
            let mut fields = Vec::with_capacity(scan_list.n_fields());
            let mut field_params = Vec::with_capacity(scan_list.n_fields());

            for field in 0..scan_list.n_fields() {
                let descriptor = scan_list.descriptor(ppi, field).ok_or_else(|| {
                    RapicError::Internal {
                        message: format!("no scan descriptor for PPI {ppi} field {field}"),
                    }
                })?;

                self.state = AssemblerState::ReadScanParams { ppi, field };
                let (params, closed) = self.read_scan_params()?;
                self.check_identity(&params)?;

                self.state = AssemblerState::ReadField { ppi, field };
                let collection = self.read_field(image_id, &params, descriptor, closed)?;
                let tolerance = self.config.elevation_tolerance();
                check_elevation(&params, descriptor, &collection, tolerance)?;

                fields.push(collection);
                field_params.push(params);
            }

            settle_gate_counts(&mut fields);
            apply_resolution_remap(&mut fields, self.config.remap_gate_limit);

            let descriptor = scan_list.descriptor(ppi, 0).ok_or_else(|| RapicError::Internal {
                message: format!("PPI {ppi} has no fields"),
            })?;
            let params = self.radar_params(ppi, &field_params, descriptor, &fields);
            tilts.push(AssembledTilt { params, fields });

            if volume_params.is_none() {
                volume_params = field_params.into_iter().next();
            }
        }

        let info = volume_info(image_id, volume_params.as_ref(), &scan_list, tilts.len());
        Ok(AssembledVolume { info, tilts })
    }

    fn read_scan_list(&mut self) -> ImageResult<ScanList> {
        const STAGE: &str = "reading the scan list";
        let mut builder = ScanListBuilder::new();
        loop {
            let record = self.next_record(STAGE)?;
            match record.kind() {
                RecordKind::Comment => {
                    if record.contains(IMAGE_START_MARKER) || record.contains(IMAGE_END_MARKER) {
                        self.check_framing(record, STAGE)?;
                        continue;
                    }
                    if builder.add_scan_descriptor(&record.text())? {
                        return Ok(builder.finish()?);
                    }
                }
                kind if kind.is_radial() => {
                    return Err(ImageError::UnexpectedRecord {
                        kind: kind.name(),
                        stage: STAGE,
                    }
                    .into());
                }
                kind => trace!("Ignoring {} record in scan list", kind.name()),
            }
        }
    }

    /// Collects header lines up to the first radial.
    ///
    /// The flag is set when the field's end sentinel arrived before any
    /// radial, leaving the field empty.
    fn read_scan_params(&mut self) -> ImageResult<(ScanParams, bool)> {
        const STAGE: &str = "reading scan parameters";
        let mut builder = ScanParamsBuilder::new();
        loop {
            let record = self.next_record(STAGE)?;
            match record.kind() {
                RecordKind::AsciiRadial | RecordKind::BinaryRadial => {
                    self.reader.push_back(record)?;
                    return Ok((builder.build(), false));
                }
                RecordKind::Header if record.contains(END_RADAR_IMAGE) => {
                    return Ok((builder.build(), true));
                }
                RecordKind::Header => builder.set_param(&record.text())?,
                RecordKind::Comment => self.check_framing(record, STAGE)?,
                RecordKind::Overflow => {
                    debug!("Ignoring overflowed record among scan parameters");
                }
            }
        }
    }

    fn read_field(
        &mut self,
        image_id: &str,
        params: &ScanParams,
        descriptor: &ScanDescriptor,
        closed: bool,
    ) -> ImageResult<FieldCollection> {
        let mut field = FieldCollection::new(
            params.field_name(),
            params.nyquist_or_default(),
            params.start_range_or_default(),
            params.range_res_or_default(),
        );
        if !closed {
            self.read_radials(image_id, params, descriptor, &mut field)?;
        }
        if field.radials.is_empty() {
            warn!(
                "Image {} scan {}: field {} has no radials",
                image_id, descriptor.scan_num, field.field_name
            );
            field.empty = true;
            self.stats.empty_fields += 1;
        }
        Ok(field)
    }

    fn read_radials(
        &mut self,
        image_id: &str,
        params: &ScanParams,
        descriptor: &ScanDescriptor,
        field: &mut FieldCollection,
    ) -> ImageResult<()> {
        const STAGE: &str = "reading radials";
        let video_res = params.video_res_or_default();
        let calibrate = field.moment == MomentKind::Refl
            && VideoFormat::from_video_res(video_res) != VideoFormat::Binary
            && !params.dbz_levels.is_empty();
        let sweep_elevation =
            RadarAngle::from_degrees(params.elevation_deg.unwrap_or(descriptor.elev_angle));

        loop {
            let record = self.next_record(STAGE)?;
            match record.kind() {
                RecordKind::AsciiRadial | RecordKind::BinaryRadial => {
                    match decode_record(&record, video_res, self.config.max_radial_gates) {
                        Ok(decoded) => {
                            let radial = build_radial(decoded, params, sweep_elevation, calibrate);
                            if radial.truncated {
                                debug!(
                                    "Image {} field {} azimuth {}: radial truncated at {} gates",
                                    image_id,
                                    field.field_name,
                                    radial.azimuth,
                                    radial.gates.len()
                                );
                            }
                            field.radials.push(radial);
                        }
                        Err(err) => {
                            warn!(
                                "Image {} scan {} field {}: dropping radial: {}",
                                image_id, descriptor.scan_num, field.field_name, err
                            );
                            self.stats.radials_dropped += 1;
                        }
                    }
                }
                RecordKind::Header if record.contains(END_RADAR_IMAGE) => return Ok(()),
                RecordKind::Header => {
                    trace!("Ignoring header after radial data: {}", record.text());
                }
                RecordKind::Comment => self.check_framing(record, STAGE)?,
                RecordKind::Overflow => {
                    debug!(
                        "Image {} field {}: skipping overflowed record",
                        image_id, field.field_name
                    );
                }
            }
        }
    }

    fn check_identity(&self, params: &ScanParams) -> std::result::Result<(), ImageError> {
        if let Some(expected) = &self.config.expected_radar_name {
            let found = params.radar_name.as_deref().unwrap_or("");
            if !found.trim().eq_ignore_ascii_case(expected.trim()) {
                return Err(ImageError::RadarNameMismatch {
                    expected: expected.clone(),
                    found: found.to_string(),
                });
            }
        }
        if let Some(expected) = self.config.expected_volume_id {
            if params.volume_id != Some(expected) {
                return Err(ImageError::VolumeIdMismatch {
                    expected,
                    found: params.volume_id,
                });
            }
        }
        Ok(())
    }

    fn radar_params(
        &self,
        tilt_num: usize,
        field_params: &[ScanParams],
        descriptor: &ScanDescriptor,
        fields: &[FieldCollection],
    ) -> RadarParams {
        let params = field_params.first().cloned().unwrap_or_default();
        let finest = fields
            .iter()
            .min_by(|a, b| a.range_res.total_cmp(&b.range_res));
        let latitude = params.latitude.unwrap_or(0.0);

        RadarParams {
            radar_id: params.station_id.unwrap_or(descriptor.station_id),
            radar_name: params.radar_name.clone().unwrap_or_default(),
            scan_type: descriptor.radar_type_flag,
            tilt_num,
            elevation_deg: params.elevation_deg.unwrap_or(descriptor.elev_angle),
            gate_count: fields.iter().map(|f| f.max_gates).max().unwrap_or(0),
            gate_spacing_m: finest.map_or(params.range_res_or_default(), |f| f.range_res),
            start_range_m: finest.map_or(params.start_range_or_default(), |f| f.start_range),
            beam_width_deg: params.beam_width_deg.unwrap_or(self.config.beam_width_deg),
            latitude: if self.config.invert_latitude {
                -latitude
            } else {
                latitude
            },
            longitude: params.longitude.unwrap_or(0.0),
            altitude_m: params.height_m.unwrap_or(0.0),
            frequency_mhz: params.frequency_mhz,
            prf: params.prf,
            pulse_length_us: params.pulse_length_us,
            nyquist: field_params.iter().find_map(|p| p.nyquist).unwrap_or(0.0),
            clear_air: params.clear_air.unwrap_or(false),
            fields: fields.iter().map(FieldParams::from).collect(),
        }
    }
}

/// Checks the sweep `ELEV:` against the scan list entry.
///
/// An empty field without `ELEV:` is accepted since it contributes no beams.
fn check_elevation(
    params: &ScanParams,
    descriptor: &ScanDescriptor,
    field: &FieldCollection,
    tolerance: f64,
) -> std::result::Result<(), ImageError> {
    let Some(found) = params.elevation_deg else {
        if field.radials.is_empty() {
            return Ok(());
        }
        return Err(ImageError::MissingElevation {
            scan_num: descriptor.scan_num,
        });
    };
    if (found - descriptor.elev_angle).abs() > tolerance {
        return Err(ImageError::ElevationMismatch {
            scan_num: descriptor.scan_num,
            expected: descriptor.elev_angle,
            found,
            tolerance,
        });
    }
    Ok(())
}

fn build_radial(
    decoded: DecodedRadial,
    params: &ScanParams,
    sweep_elevation: RadarAngle,
    calibrate: bool,
) -> Radial {
    let mut gates = decoded.gates;
    if calibrate {
        for gate in gates.iter_mut() {
            *gate = params.level_to_refl_byte(*gate);
        }
    }
    let timestamp = params.timestamp.and_then(|start| match decoded.time_offset_secs {
        Some(secs) => TimeDelta::try_seconds(i64::from(secs))
            .and_then(|offset| start.checked_add_signed(offset)),
        None => Some(start),
    });
    Radial {
        azimuth: decoded.azimuth,
        elevation: decoded.elevation.unwrap_or(sweep_elevation),
        timestamp,
        gates,
        truncated: decoded.status == DecodeStatus::Truncated,
    }
}

fn volume_info(
    image_id: &str,
    params: Option<&ScanParams>,
    scan_list: &ScanList,
    n_tilts: usize,
) -> VolumeInfo {
    let fallback_station = scan_list
        .descriptors()
        .first()
        .map_or(0, |d| d.station_id);
    VolumeInfo {
        image_id: image_id.to_string(),
        station_id: params
            .and_then(|p| p.station_id)
            .unwrap_or(fallback_station),
        radar_name: params
            .and_then(|p| p.radar_name.clone())
            .unwrap_or_default(),
        volume_id: params.and_then(|p| p.volume_id),
        timestamp: params.and_then(|p| p.timestamp),
        n_tilts,
    }
}
