//! Binary null/one run-length video.
//!
//! Layout of one radial:
//!
//! ```text
//! @aaa.a,eee.e,sss=  LL LL  payload...  00 00
//! ```
//!
//! `LL LL` is the big-endian length of the whole radial, counted from `@`
//! through the end sentinel. In the payload every byte is a gate value,
//! except that 0x00 and 0x01 are followed by a run-count byte giving the
//! total number of gates with that value. `00 00` ends the radial.

use super::{GateBuffer, GateDecode, parse_decimal};
use crate::constants::BINARY_RADIAL_MARKER;
use crate::error::CodecError;
use crate::models::RadarAngle;

/// Longest run a single count byte can express
const MAX_RUN: usize = u8::MAX as usize;

/// Angle header of a binary radial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryHeader {
    pub azimuth: RadarAngle,
    pub elevation: RadarAngle,
    pub time_offset_secs: u32,
    /// Offset of the 16-bit length field
    pub length_at: usize,
}

fn expect_byte(bytes: &[u8], pos: usize, expected: u8) -> Result<usize, CodecError> {
    match bytes.get(pos) {
        Some(&b) if b == expected => Ok(pos + 1),
        found => Err(CodecError::MalformedAngle {
            offset: pos,
            reason: format!(
                "expected {:?}, found {:?}",
                expected as char,
                found.map(|&b| b as char)
            ),
        }),
    }
}

/// Parses `@az,el,secs=` and returns the header with the length-field offset
pub fn parse_binary_header(bytes: &[u8]) -> Result<BinaryHeader, CodecError> {
    let pos = expect_byte(bytes, 0, BINARY_RADIAL_MARKER)?;
    let (azimuth, pos) = parse_decimal(bytes, pos)?;
    let pos = expect_byte(bytes, pos, b',')?;
    let (elevation, pos) = parse_decimal(bytes, pos)?;
    let pos = expect_byte(bytes, pos, b',')?;
    let (secs, pos) = parse_decimal(bytes, pos)?;
    let length_at = expect_byte(bytes, pos, b'=')?;

    if secs < 0.0 || secs.fract() != 0.0 {
        return Err(CodecError::MalformedAngle {
            offset: pos,
            reason: format!("invalid time offset {secs}"),
        });
    }

    Ok(BinaryHeader {
        azimuth: RadarAngle::from_degrees(azimuth),
        elevation: RadarAngle::from_degrees(elevation),
        time_offset_secs: secs as u32,
        length_at,
    })
}

pub fn decode_binary(
    bytes: &[u8],
    max_gates: usize,
) -> Result<(BinaryHeader, GateDecode), CodecError> {
    let header = parse_binary_header(bytes)?;
    let data_at = header.length_at + 2;
    let [hi, lo] = match bytes.get(header.length_at..data_at) {
        Some(&[hi, lo]) => [hi, lo],
        _ => {
            return Err(CodecError::TooShort {
                expected: data_at,
                actual: bytes.len(),
            });
        }
    };
    let declared = usize::from(u16::from_be_bytes([hi, lo]));
    let end = declared.min(bytes.len());

    let mut out = GateBuffer::new(max_gates);
    let mut pos = data_at;
    while pos < end {
        let value = bytes[pos];
        if value > 1 {
            if !out.push(value) {
                break;
            }
            pos += 1;
            continue;
        }
        let Some(&count) = bytes[..end].get(pos + 1) else {
            break;
        };
        if value == 0 && count == 0 {
            break;
        }
        if !out.push_n(value, usize::from(count.max(1))) {
            break;
        }
        pos += 2;
    }

    Ok((header, out.finish(None)))
}

/// Encodes gates as an `@az,el,secs=` binary record including its end sentinel
pub fn encode_binary(
    azimuth: RadarAngle,
    elevation: RadarAngle,
    time_offset_secs: u32,
    gates: &[u8],
) -> Result<Vec<u8>, CodecError> {
    let mut out = format!(
        "@{:05.1},{:05.1},{:03}=",
        azimuth.degrees(),
        elevation.degrees(),
        time_offset_secs
    )
    .into_bytes();
    let length_at = out.len();
    out.extend_from_slice(&[0, 0]);

    let mut zero_run = 0usize;
    let mut one_run = 0usize;
    for &gate in gates {
        match gate {
            0 => {
                flush_run(&mut out, 1, &mut one_run);
                zero_run += 1;
                if zero_run == MAX_RUN {
                    flush_run(&mut out, 0, &mut zero_run);
                }
            }
            1 => {
                flush_run(&mut out, 0, &mut zero_run);
                one_run += 1;
                if one_run == MAX_RUN {
                    flush_run(&mut out, 1, &mut one_run);
                }
            }
            value => {
                flush_run(&mut out, 0, &mut zero_run);
                flush_run(&mut out, 1, &mut one_run);
                out.push(value);
            }
        }
    }
    flush_run(&mut out, 0, &mut zero_run);
    flush_run(&mut out, 1, &mut one_run);
    out.extend_from_slice(&[0, 0]);

    let length = u16::try_from(out.len()).map_err(|_| CodecError::EncodedTooLong {
        length: out.len(),
    })?;
    out[length_at..length_at + 2].copy_from_slice(&length.to_be_bytes());

    Ok(out)
}

fn flush_run(out: &mut Vec<u8>, value: u8, run: &mut usize) {
    if *run > 0 {
        out.push(value);
        out.push(*run as u8);
        *run = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecodeStatus;
    use crate::constants::BINARY_HEADER_LEN;

    fn angle(tenths: i32) -> RadarAngle {
        RadarAngle::from_tenths(tenths)
    }

    fn round_trip(gates: &[u8]) -> Vec<u8> {
        let encoded = encode_binary(angle(1234), angle(15), 42, gates).unwrap();
        let (header, decode) = decode_binary(&encoded, 4096).unwrap();
        assert_eq!(header.azimuth.tenths(), 1234);
        assert_eq!(header.elevation.tenths(), 15);
        assert_eq!(header.time_offset_secs, 42);
        assert_eq!(decode.status, DecodeStatus::Complete);
        decode.gates
    }

    #[test]
    fn test_header_is_seventeen_bytes() {
        let encoded = encode_binary(angle(3599), angle(905), 7, &[]).unwrap();
        assert_eq!(&encoded[..BINARY_HEADER_LEN], b"@359.9,090.5,007=");
        assert_eq!(encoded.len(), BINARY_HEADER_LEN + 4);
        assert_eq!(&encoded[BINARY_HEADER_LEN..], &[0, 21, 0, 0]);
    }

    #[test]
    fn test_scenario_short_length_gives_empty_radial() {
        let mut bytes = b"@012.0,003.5,000005=".to_vec();
        bytes.extend_from_slice(&[0x00, 0x03, 0x05, 0x00, 0x00]);
        let (header, decode) = decode_binary(&bytes, 1536).unwrap();
        assert_eq!(header.azimuth.tenths(), 120);
        assert_eq!(header.elevation.tenths(), 35);
        assert!(decode.gates.is_empty());
        assert_eq!(decode.status, DecodeStatus::Complete);
    }

    #[test]
    fn test_runs_of_zero_and_one() {
        let mut bytes = b"@001.0,000.5,000=".to_vec();
        let payload = [0x00, 0x03, 0x07, 0x01, 0x02, 0x09, 0x00, 0x00];
        let length = (bytes.len() + 2 + payload.len()) as u16;
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.extend_from_slice(&payload);
        let (_, decode) = decode_binary(&bytes, 100).unwrap();
        assert_eq!(decode.gates, vec![0, 0, 0, 7, 1, 1, 9]);
    }

    #[test]
    fn test_missing_length_field() {
        assert!(matches!(
            decode_binary(b"@001.0,000.5,000=\x00", 100),
            Err(CodecError::TooShort { .. })
        ));
    }

    #[test]
    fn test_malformed_header() {
        assert!(matches!(
            decode_binary(b"@001.0;000.5,000=\x00\x10", 100),
            Err(CodecError::MalformedAngle { .. })
        ));
        assert!(parse_binary_header(b"@abc,1,1=").is_err());
    }

    #[test]
    fn test_round_trip_spectrum_width_profile() {
        let mut gates = vec![0u8; 300];
        gates.extend(std::iter::repeat_n(1u8, 260));
        gates.extend([2, 3, 0, 1, 0, 0, 1, 1, 255, 254]);
        gates.extend(std::iter::repeat_n(0u8, 10));
        assert_eq!(round_trip(&gates), gates);
    }

    #[test]
    fn test_round_trip_edge_shapes() {
        assert!(round_trip(&[]).is_empty());
        assert_eq!(round_trip(&[0]), vec![0]);
        assert_eq!(round_trip(&[1]), vec![1]);
        let all: Vec<u8> = (0..=255).collect();
        assert_eq!(round_trip(&all), all);
    }

    #[test]
    fn test_runs_wrap_at_255() {
        let gates = vec![0u8; 600];
        let encoded = encode_binary(angle(0), angle(0), 0, &gates).unwrap();
        let payload = &encoded[BINARY_HEADER_LEN + 2..];
        assert_eq!(payload, &[0, 255, 0, 255, 0, 90, 0, 0]);
    }

    #[test]
    fn test_gate_ceiling_truncates() {
        let gates = vec![9u8; 50];
        let encoded = encode_binary(angle(0), angle(0), 0, &gates).unwrap();
        let (_, decode) = decode_binary(&encoded, 20).unwrap();
        assert_eq!(decode.gates.len(), 20);
        assert_eq!(decode.status, DecodeStatus::Truncated);
    }

    #[test]
    fn test_record_without_sentinel_decodes_to_end() {
        let mut encoded = encode_binary(angle(0), angle(0), 0, &[5, 6, 7]).unwrap();
        encoded.truncate(encoded.len() - 2);
        let (_, decode) = decode_binary(&encoded, 20).unwrap();
        assert_eq!(decode.gates, vec![5, 6, 7]);
    }
}
