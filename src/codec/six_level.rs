//! 6-level ASCII run-length video.
//!
//! Each code letter carries two consecutive 3-bit levels. An optional digit
//! run after a letter repeats the pair that many extra times.

use super::tables::{A2N_XLAT, SIX_LEVEL_ENCODE, six_level_index};
use super::{GateBuffer, GateDecode, parse_run_count};
use crate::constants::{CR, CTRL_Z, NUL};
use crate::error::CodecError;
use crate::models::RadarAngle;

/// Highest level the 6-level alphabet can carry
pub const MAX_SIX_LEVEL: u8 = 6;

pub fn decode_six_level(payload: &[u8], max_gates: usize) -> GateDecode {
    let mut out = GateBuffer::new(max_gates);
    let mut pos = 0;

    while let Some(&code) = payload.get(pos) {
        let Some(index) = six_level_index(code) else {
            let corrupt = !matches!(code, NUL | CR | CTRL_Z);
            return out.finish(corrupt.then_some(pos));
        };
        let packed = A2N_XLAT[usize::from(index)];
        let (hi, lo) = (packed >> 3, packed & 0x07);

        let (extra, next) = parse_run_count(payload, pos + 1);
        pos = next;

        for _ in 0..=extra {
            if !out.push(hi) || !out.push(lo) {
                return out.finish(None);
            }
        }
    }

    out.finish(None)
}

/// Encodes gates as a `%az` 6-level record.
///
/// An odd-length radial is padded with one trailing level-0 gate.
pub fn encode_six_level(azimuth: RadarAngle, gates: &[u8]) -> Result<Vec<u8>, CodecError> {
    if let Some((gate, &level)) = gates.iter().enumerate().find(|(_, l)| **l > MAX_SIX_LEVEL) {
        return Err(CodecError::InvalidLevel {
            format: "6-level",
            gate,
            level,
            max: MAX_SIX_LEVEL,
        });
    }

    let mut out = format!("%{:05.1}", azimuth.degrees()).into_bytes();
    let packed: Vec<u8> = gates
        .chunks(2)
        .map(|pair| (pair[0] << 3) | pair.get(1).copied().unwrap_or(0))
        .collect();

    let mut i = 0;
    while i < packed.len() {
        let value = packed[i];
        let run = packed[i..].iter().take_while(|&&p| p == value).count();
        out.push(SIX_LEVEL_ENCODE[usize::from(value)]);
        if run > 1 {
            out.extend_from_slice((run - 1).to_string().as_bytes());
        }
        i += run;
    }

    Ok(out)
}
