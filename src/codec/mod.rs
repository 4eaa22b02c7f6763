//! Radial codecs for the three RAPIC gate encodings.
//!
//! Every radial starts with an angle prefix (`%az` for ASCII video,
//! `@az,el,secs=` for binary video) followed by a run-length payload:
//!
//! - [`six_level`]: letter codes each carrying two 3-bit levels
//! - [`sixteen_level`]: absolute and delta-pair codes with digit runs
//! - [`binary`]: raw bytes with run-length escapes for 0x00 and 0x01
//!
//! Decoders never fail on corrupt payloads. They stop early and report the
//! reason in [`DecodeStatus`]. Only a malformed angle prefix is an error.

pub mod binary;
pub mod six_level;
pub mod sixteen_level;
pub mod tables;

use crate::constants::{ASCII_RADIAL_MARKER, BINARY_VIDEO_RES};
use crate::error::CodecError;
use crate::models::{RadarAngle, RawRecord, RecordKind};

pub use binary::{BinaryHeader, decode_binary, encode_binary};
pub use six_level::{decode_six_level, encode_six_level};
pub use sixteen_level::{decode_sixteen_level, encode_sixteen_level};

/// How a decode ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// Payload consumed up to its terminator or sentinel
    Complete,
    /// Gate ceiling reached, remaining payload dropped
    Truncated,
    /// Unknown code or out-of-range level at this payload offset
    Corrupt { offset: usize },
}

/// Gates produced by one payload decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecode {
    pub gates: Vec<u8>,
    pub status: DecodeStatus,
}

/// Fully decoded radial record
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRadial {
    pub azimuth: RadarAngle,
    /// Only binary radials carry their own elevation
    pub elevation: Option<RadarAngle>,
    pub time_offset_secs: Option<u32>,
    pub gates: Vec<u8>,
    pub status: DecodeStatus,
}

/// Video encoding selected from the `VIDRES:` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFormat {
    SixLevel,
    SixteenLevel { max_level: u8 },
    Binary,
}

impl VideoFormat {
    pub fn from_video_res(video_res: u16) -> Self {
        match video_res {
            0..=8 => VideoFormat::SixLevel,
            res if res < BINARY_VIDEO_RES => VideoFormat::SixteenLevel {
                max_level: (res - 1) as u8,
            },
            _ => VideoFormat::Binary,
        }
    }
}

/// Bounded gate accumulator shared by the decoders
#[derive(Debug)]
pub(crate) struct GateBuffer {
    gates: Vec<u8>,
    max_gates: usize,
    truncated: bool,
}

impl GateBuffer {
    pub(crate) fn new(max_gates: usize) -> Self {
        Self {
            gates: Vec::with_capacity(max_gates.min(2048)),
            max_gates,
            truncated: false,
        }
    }

    /// Appends one gate; returns false once the ceiling is hit
    pub(crate) fn push(&mut self, value: u8) -> bool {
        if self.gates.len() >= self.max_gates {
            self.truncated = true;
            return false;
        }
        self.gates.push(value);
        true
    }

    pub(crate) fn push_n(&mut self, value: u8, count: usize) -> bool {
        let room = self.max_gates.saturating_sub(self.gates.len());
        let take = count.min(room);
        self.gates.extend(std::iter::repeat_n(value, take));
        if take < count {
            self.truncated = true;
            return false;
        }
        true
    }

    pub(crate) fn last(&self) -> Option<u8> {
        self.gates.last().copied()
    }

    pub(crate) fn finish(self, corrupt_at: Option<usize>) -> GateDecode {
        let status = match (corrupt_at, self.truncated) {
            (_, true) => DecodeStatus::Truncated,
            (Some(offset), false) => DecodeStatus::Corrupt { offset },
            (None, false) => DecodeStatus::Complete,
        };
        GateDecode {
            gates: self.gates,
            status,
        }
    }
}

/// Parses an unsigned or signed decimal number starting at `pos`.
///
/// Returns the value and the offset just past the last consumed byte.
pub fn parse_decimal(bytes: &[u8], pos: usize) -> Result<(f64, usize), CodecError> {
    let mut end = pos;
    while bytes.get(end) == Some(&b' ') {
        end += 1;
    }
    let start = end;
    if bytes.get(end) == Some(&b'-') {
        end += 1;
    }
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - int_start;
    if bytes.get(end) == Some(&b'.') {
        end += 1;
        let frac_start = end;
        while bytes.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
        }
        digits += end - frac_start;
    }
    if digits == 0 {
        return Err(CodecError::MalformedAngle {
            offset: pos,
            reason: "expected a decimal number".to_string(),
        });
    }
    // Only ASCII digits, '-' and '.' were consumed
    let text = std::str::from_utf8(&bytes[start..end]).map_err(|e| CodecError::MalformedAngle {
        offset: pos,
        reason: e.to_string(),
    })?;
    let value = text.parse::<f64>().map_err(|e| CodecError::MalformedAngle {
        offset: pos,
        reason: format!("{text:?}: {e}"),
    })?;
    Ok((value, end))
}

/// Parses the `%az` prefix of an ASCII radial, returning the azimuth and payload offset
pub fn parse_ascii_prefix(bytes: &[u8]) -> Result<(RadarAngle, usize), CodecError> {
    if bytes.first() != Some(&ASCII_RADIAL_MARKER) {
        return Err(CodecError::MalformedAngle {
            offset: 0,
            reason: "missing '%' marker".to_string(),
        });
    }
    let (azimuth, consumed) = parse_decimal(bytes, 1)?;
    Ok((RadarAngle::from_degrees(azimuth), consumed))
}

/// Reads a run of ASCII digits as a repeat count
pub(crate) fn parse_run_count(bytes: &[u8], mut pos: usize) -> (usize, usize) {
    let mut count = 0usize;
    while let Some(&b) = bytes.get(pos) {
        if !b.is_ascii_digit() {
            break;
        }
        count = count.saturating_mul(10).saturating_add(usize::from(b - b'0'));
        pos += 1;
    }
    (count, pos)
}

/// Decodes any radial record according to its kind and the sweep's video resolution
pub fn decode_record(
    record: &RawRecord,
    video_res: u16,
    max_gates: usize,
) -> Result<DecodedRadial, CodecError> {
    match record.kind() {
        RecordKind::BinaryRadial => {
            let (header, decode) = decode_binary(record.bytes(), max_gates)?;
            Ok(DecodedRadial {
                azimuth: header.azimuth,
                elevation: Some(header.elevation),
                time_offset_secs: Some(header.time_offset_secs),
                gates: decode.gates,
                status: decode.status,
            })
        }
        RecordKind::AsciiRadial => {
            let (azimuth, payload_at) = parse_ascii_prefix(record.bytes())?;
            let payload = &record.bytes()[payload_at..];
            let decode = match VideoFormat::from_video_res(video_res) {
                VideoFormat::SixLevel => decode_six_level(payload, max_gates),
                VideoFormat::SixteenLevel { max_level } => {
                    decode_sixteen_level(payload, max_level, max_gates)
                }
                VideoFormat::Binary => {
                    return Err(CodecError::MalformedAngle {
                        offset: 0,
                        reason: format!("ASCII radial in a {video_res}-level sweep"),
                    });
                }
            };
            Ok(DecodedRadial {
                azimuth,
                elevation: None,
                time_offset_secs: None,
                gates: decode.gates,
                status: decode.status,
            })
        }
        other => Err(CodecError::MalformedAngle {
            offset: 0,
            reason: format!("{} record is not a radial", other.name()),
        }),
    }
}
