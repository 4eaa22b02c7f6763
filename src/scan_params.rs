//! RAPIC sweep header parsing.
//!
//! Header lines of the form `KEY: value` are folded into a
//! [`ScanParamsBuilder`] as they stream in. The builder is consumed into an
//! immutable [`ScanParams`] as soon as the first radial of the sub-scan
//! arrives, so code handling radials can only ever see frozen parameters.

use crate::constants::{DEFAULT_16LVL_DBZ, DEFAULT_6LVL_DBZ, NO_ECHO_DBZ};
use crate::error::MetadataError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, trace, warn};

static COUNTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(\d+)\s+of\s+(\d+)").expect("valid counter regex"));

static UNFOLDING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*:\s*(\d+)").expect("valid unfolding regex"));

/// Header keys in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamKey {
    Country,
    Name,
    StationId,
    Latitude,
    Longitude,
    Height,
    Timestamp,
    Date,
    Time,
    Frequency,
    Prf,
    PulseLength,
    RangeRes,
    AngleRes,
    VideoRes,
    StartRange,
    EndRange,
    Pass,
    Tilt,
    VolumeId,
    Video,
    Elevation,
    ClearAir,
    Unfolding,
    DbzLevels,
    DbmLevels,
    ThresholdTable,
    DbzCorrection,
    Nyquist,
    VelocityLevels,
    Product,
    ImageFormat,
    BeamWidth,
}

const PARAM_KEYS: &[(&str, ParamKey)] = &[
    ("COUNTRY:", ParamKey::Country),
    ("NAME:", ParamKey::Name),
    ("STNID:", ParamKey::StationId),
    ("LATITUDE:", ParamKey::Latitude),
    ("LONGITUDE:", ParamKey::Longitude),
    ("HEIGHT:", ParamKey::Height),
    ("TIMESTAMP:", ParamKey::Timestamp),
    ("DATE:", ParamKey::Date),
    ("TIME:", ParamKey::Time),
    ("FREQUENCY:", ParamKey::Frequency),
    ("PRF:", ParamKey::Prf),
    ("PULSELENGTH:", ParamKey::PulseLength),
    ("RNGRES:", ParamKey::RangeRes),
    ("ANGRES:", ParamKey::AngleRes),
    ("VIDRES:", ParamKey::VideoRes),
    ("STARTRNG:", ParamKey::StartRange),
    ("ENDRNG:", ParamKey::EndRange),
    ("PASS:", ParamKey::Pass),
    ("TILT:", ParamKey::Tilt),
    ("VOLUMEID:", ParamKey::VolumeId),
    ("VIDEO:", ParamKey::Video),
    ("ELEV:", ParamKey::Elevation),
    ("CLEARAIR:", ParamKey::ClearAir),
    ("UNFOLDING:", ParamKey::Unfolding),
    ("DBZLVL:", ParamKey::DbzLevels),
    ("DBMLVL:", ParamKey::DbmLevels),
    ("THRESHTBL:", ParamKey::ThresholdTable),
    ("DBZCOR:", ParamKey::DbzCorrection),
    ("NYQUIST:", ParamKey::Nyquist),
    ("VELLVL:", ParamKey::VelocityLevels),
    ("PRODUCT:", ParamKey::Product),
    ("IMGFMT:", ParamKey::ImageFormat),
    ("BEAMWIDTH:", ParamKey::BeamWidth),
];

/// Source of the reflectivity level table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSource {
    /// Seeded from `VIDRES:`
    Default,
    /// `DBZLVL:` or `THRESHTBL:`
    Dbz,
    /// `DBMLVL:`, converted with `DBZCOR:` on freeze
    Dbm,
}

/// Frozen header values for one sub-scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanParams {
    pub country: Option<u16>,
    pub radar_name: Option<String>,
    pub station_id: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub height_m: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub frequency_mhz: Option<f64>,
    pub prf: Option<f64>,
    pub pulse_length_us: Option<f64>,
    pub range_res_m: Option<f64>,
    pub angle_res_deg: Option<f64>,
    pub video_res: Option<u16>,
    pub start_range_m: Option<f64>,
    pub end_range_m: Option<f64>,
    pub pass: Option<(u32, u32)>,
    pub tilt: Option<(u32, u32)>,
    pub volume_id: Option<i32>,
    pub video: Option<String>,
    pub elevation_deg: Option<f64>,
    pub clear_air: Option<bool>,
    pub unfolding: Option<(u32, u32)>,
    /// Reflectivity thresholds in dBZ, index 0 is the no-echo level
    pub dbz_levels: Vec<f64>,
    pub level_source: Option<LevelSource>,
    pub nyquist: Option<f64>,
    pub product: Option<String>,
    pub image_format: Option<String>,
    pub beam_width_deg: Option<f64>,
}

impl ScanParams {
    /// Video resolution, 6-level when the header is silent
    pub fn video_res_or_default(&self) -> u16 {
        self.video_res.unwrap_or(6)
    }

    pub fn range_res_or_default(&self) -> f64 {
        self.range_res_m.unwrap_or(1000.0)
    }

    pub fn start_range_or_default(&self) -> f64 {
        self.start_range_m.unwrap_or(0.0)
    }

    pub fn nyquist_or_default(&self) -> f64 {
        self.nyquist.unwrap_or(0.0)
    }

    pub fn field_name(&self) -> &str {
        self.video.as_deref().unwrap_or("Refl")
    }

    /// Maps a level index onto the 8-bit 0.5 dB / -32 dBZ scale
    pub fn level_to_refl_byte(&self, level: u8) -> u8 {
        if level == 0 {
            return 0;
        }
        let Some(&dbz) = self.dbz_levels.get(usize::from(level)) else {
            return u8::MAX;
        };
        ((dbz - NO_ECHO_DBZ) / 0.5).round().clamp(1.0, 255.0) as u8
    }
}

/// Incrementally populated header values
#[derive(Debug, Default)]
pub struct ScanParamsBuilder {
    params: Option<ScanParams>,
    date: Option<NaiveDate>,
    time: Option<(u32, u32)>,
    dbz_correction: Option<f64>,
    /// Numeric lines continue the most recent level table
    awaiting_levels: bool,
}

impl ScanParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn params(&mut self) -> &mut ScanParams {
        self.params.get_or_insert_with(ScanParams::default)
    }

    /// Folds one header line into the builder; unknown keys are ignored
    pub fn set_param(&mut self, line: &str) -> Result<(), MetadataError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        if self.awaiting_levels {
            if let Some(levels) = parse_numbers(line) {
                trace!("Level table continuation: {} values", levels.len());
                self.params().dbz_levels.extend(levels);
                return Ok(());
            }
            self.awaiting_levels = false;
        }

        let Some((key, value)) = PARAM_KEYS
            .iter()
            .find_map(|(prefix, key)| line.strip_prefix(prefix).map(|v| (*key, v.trim())))
        else {
            trace!("Ignoring header line: {}", line);
            return Ok(());
        };

        self.apply(key, value, line)
    }

    fn apply(&mut self, key: ParamKey, value: &str, line: &str) -> Result<(), MetadataError> {
        match key {
            ParamKey::Country => self.params().country = parse_value(value, "COUNTRY"),
            ParamKey::Name => self.params().radar_name = Some(value.to_string()),
            ParamKey::StationId => self.params().station_id = parse_value(value, "STNID"),
            ParamKey::Latitude => self.params().latitude = parse_value(value, "LATITUDE"),
            ParamKey::Longitude => self.params().longitude = parse_value(value, "LONGITUDE"),
            ParamKey::Height => self.params().height_m = parse_value(value, "HEIGHT"),
            ParamKey::Timestamp => self.params().timestamp = parse_timestamp(value),
            ParamKey::Date => self.date = parse_julian_date(value),
            ParamKey::Time => self.time = parse_clock_time(value),
            ParamKey::Frequency => self.params().frequency_mhz = parse_value(value, "FREQUENCY"),
            ParamKey::Prf => self.params().prf = parse_value(value, "PRF"),
            ParamKey::PulseLength => {
                self.params().pulse_length_us = parse_value(value, "PULSELENGTH")
            }
            ParamKey::RangeRes => self.params().range_res_m = parse_value(value, "RNGRES"),
            ParamKey::AngleRes => self.params().angle_res_deg = parse_value(value, "ANGRES"),
            ParamKey::VideoRes => self.set_video_res(value),
            ParamKey::StartRange => self.params().start_range_m = parse_value(value, "STARTRNG"),
            ParamKey::EndRange => self.params().end_range_m = parse_value(value, "ENDRNG"),
            ParamKey::Pass => self.params().pass = Some(parse_counter(value, "PASS", line)?),
            ParamKey::Tilt => self.params().tilt = Some(parse_counter(value, "TILT", line)?),
            ParamKey::VolumeId => self.params().volume_id = parse_value(value, "VOLUMEID"),
            ParamKey::Video => self.params().video = Some(value.to_string()),
            ParamKey::Elevation => self.params().elevation_deg = parse_value(value, "ELEV"),
            ParamKey::ClearAir => {
                self.params().clear_air = Some(value.eq_ignore_ascii_case("ON"))
            }
            ParamKey::Unfolding => self.params().unfolding = parse_unfolding(value),
            ParamKey::DbzLevels | ParamKey::ThresholdTable => {
                self.set_levels(value, LevelSource::Dbz)
            }
            ParamKey::DbmLevels => self.set_levels(value, LevelSource::Dbm),
            ParamKey::DbzCorrection => self.dbz_correction = parse_value(value, "DBZCOR"),
            ParamKey::Nyquist | ParamKey::VelocityLevels => {
                self.params().nyquist = parse_value(value, "NYQUIST")
            }
            ParamKey::Product => self.params().product = Some(value.to_string()),
            ParamKey::ImageFormat => self.params().image_format = Some(value.to_string()),
            ParamKey::BeamWidth => self.params().beam_width_deg = parse_value(value, "BEAMWIDTH"),
        }
        Ok(())
    }

    fn set_video_res(&mut self, value: &str) {
        let Some(res) = parse_value::<u16>(value, "VIDRES") else {
            return;
        };
        let params = self.params();
        params.video_res = Some(res);
        if matches!(params.level_source, Some(LevelSource::Dbz | LevelSource::Dbm)) {
            return;
        }
        let defaults: &[f64] = match res {
            0..=8 => &DEFAULT_6LVL_DBZ,
            9..=255 => &DEFAULT_16LVL_DBZ,
            _ => &[],
        };
        params.dbz_levels = defaults.to_vec();
        params.level_source = (!defaults.is_empty()).then_some(LevelSource::Default);
    }

    fn set_levels(&mut self, value: &str, source: LevelSource) {
        let Some(levels) = parse_numbers(value) else {
            warn!("Could not parse level table: {}", value);
            return;
        };
        let params = self.params();
        params.dbz_levels = std::iter::once(NO_ECHO_DBZ).chain(levels).collect();
        params.level_source = Some(source);
        self.awaiting_levels = true;
    }

    /// True once at least one recognised key has been applied
    pub fn has_values(&self) -> bool {
        self.params.is_some()
    }

    /// Freezes the collected values
    pub fn build(self) -> ScanParams {
        let mut params = self.params.unwrap_or_default();

        if params.timestamp.is_none() {
            params.timestamp = self
                .date
                .and_then(|d| {
                    let (h, m) = self.time.unwrap_or((0, 0));
                    d.and_hms_opt(h, m, 0)
                })
                .map(|dt| dt.and_utc());
        }

        if params.level_source == Some(LevelSource::Dbm) {
            let correction = self.dbz_correction.unwrap_or(0.0);
            for level in params.dbz_levels.iter_mut().skip(1) {
                *level += correction;
            }
        }

        debug!(
            "Froze scan params: video={:?} elev={:?} vidres={:?}",
            params.video, params.elevation_deg, params.video_res
        );
        params
    }
}

fn parse_value<T: std::str::FromStr>(value: &str, key: &str) -> Option<T> {
    let token = value.split_whitespace().next()?;
    match token.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Could not parse {} value: {}", key, value);
            None
        }
    }
}

/// Parses a line made up only of numbers
fn parse_numbers(text: &str) -> Option<Vec<f64>> {
    let values: Option<Vec<f64>> = text
        .split_whitespace()
        .map(|t| t.parse::<f64>().ok())
        .collect();
    values.filter(|v| !v.is_empty())
}

fn parse_counter(value: &str, key: &'static str, line: &str) -> Result<(u32, u32), MetadataError> {
    let caps = COUNTER_RE
        .captures(value)
        .ok_or_else(|| MetadataError::MalformedLine {
            key,
            line: line.to_string(),
        })?;
    let current: u32 = caps[1].parse().map_err(|_| MetadataError::MalformedLine {
        key,
        line: line.to_string(),
    })?;
    let total: u32 = caps[2].parse().map_err(|_| MetadataError::MalformedLine {
        key,
        line: line.to_string(),
    })?;
    if current == 0 || total == 0 {
        return Err(MetadataError::InvalidCounter {
            key,
            value: value.to_string(),
        });
    }
    Ok((current, total))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let token = value.split_whitespace().next()?;
    match NaiveDateTime::parse_from_str(token, "%Y%m%d%H%M%S") {
        Ok(dt) => Some(dt.and_utc()),
        Err(e) => {
            warn!("Could not parse TIMESTAMP {}: {}", value, e);
            None
        }
    }
}

/// `dddyy`: day of year followed by a two-digit year
fn parse_julian_date(value: &str) -> Option<NaiveDate> {
    let token = value.split_whitespace().next()?;
    if token.len() != 5 || !token.bytes().all(|b| b.is_ascii_digit()) {
        warn!("Could not parse DATE value: {}", value);
        return None;
    }
    let doy: u32 = token[..3].parse().ok()?;
    let yy: i32 = token[3..].parse().ok()?;
    let year = if yy < 70 { 2000 + yy } else { 1900 + yy };
    NaiveDate::from_yo_opt(year, doy)
}

/// `hh.mm`
fn parse_clock_time(value: &str) -> Option<(u32, u32)> {
    let token = value.split_whitespace().next()?;
    let (h, m) = token.split_once('.')?;
    Some((h.parse().ok()?, m.parse().ok()?))
}

fn parse_unfolding(value: &str) -> Option<(u32, u32)> {
    let caps = UNFOLDING_RE.captures(value)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}
