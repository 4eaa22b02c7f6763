//! 16-level ASCII delta/absolute run-length video.
//!
//! The payload mixes three token kinds:
//! - absolute codes (`A`..`P`) that set the running level directly
//! - delta-pair codes that step the running level twice by -3..=3
//! - digit runs that repeat the last written gate N more times

use super::tables::{
    ABSOLUTE, DELTA_FLAG, INVALID_CODE, MAX_DELTA, XLAT_16L, delta_code, unpack_delta,
};
use super::{GateBuffer, GateDecode, parse_run_count};
use crate::constants::{CR, CTRL_Z, NUL};
use crate::error::CodecError;
use crate::models::RadarAngle;

/// Highest level an absolute escape can express
pub const MAX_ABSOLUTE_LEVEL: u8 = (ABSOLUTE.len() - 1) as u8;

pub fn decode_sixteen_level(payload: &[u8], max_level: u8, max_gates: usize) -> GateDecode {
    let mut out = GateBuffer::new(max_gates);
    let max = i16::from(max_level);
    let mut acc: i16 = 0;
    let mut pos = 0;

    while let Some(&code) = payload.get(pos) {
        match code {
            NUL | CR | CTRL_Z => break,
            b'0'..=b'9' => {
                let (count, next) = parse_run_count(payload, pos);
                let Some(last) = out.last() else {
                    return out.finish(Some(pos));
                };
                if !out.push_n(last, count) {
                    break;
                }
                pos = next;
            }
            _ => {
                let entry = XLAT_16L[usize::from(code)];
                if entry == INVALID_CODE {
                    return out.finish(Some(pos));
                }
                if entry & DELTA_FLAG == 0 {
                    if entry > max_level {
                        return out.finish(Some(pos));
                    }
                    acc = i16::from(entry);
                    if !out.push(entry) {
                        break;
                    }
                } else {
                    let (d1, d2) = unpack_delta(entry & !DELTA_FLAG);
                    for step in [d1, d2] {
                        acc += step;
                        if !(0..=max).contains(&acc) {
                            out.push(acc.clamp(0, max) as u8);
                            return out.finish(Some(pos));
                        }
                        if !out.push(acc as u8) {
                            return out.finish(None);
                        }
                    }
                }
                pos += 1;
            }
        }
    }

    out.finish(None)
}

/// Running state of the delta encoder
struct DeltaEncoder {
    out: Vec<u8>,
    /// Value of the most recent sample, emitted or pending
    prev: i16,
    /// Extra repeats of `prev` not yet written
    run: usize,
    /// First step of an incomplete delta pair
    half: Option<i16>,
}

impl DeltaEncoder {
    fn absolute(&mut self, value: i16) {
        self.out.push(ABSOLUTE[value as usize]);
    }

    fn flush_run(&mut self) {
        if self.run > 0 {
            self.out.extend_from_slice(self.run.to_string().as_bytes());
            self.run = 0;
        }
    }

    fn sample(&mut self, value: i16) {
        let delta = value - self.prev;
        if delta == 0 && self.half.is_none() {
            self.run += 1;
            return;
        }
        if delta.abs() > MAX_DELTA {
            self.flush_run();
            if self.half.take().is_some() {
                self.absolute(self.prev);
            }
            self.absolute(value);
        } else {
            match self.half.take() {
                None => {
                    self.flush_run();
                    self.half = Some(delta);
                }
                Some(first) => self.out.push(delta_code(first, delta)),
            }
        }
        self.prev = value;
    }

    fn finish(mut self) -> Vec<u8> {
        if self.half.take().is_some() {
            self.absolute(self.prev);
        }
        self.flush_run();
        self.out
    }
}

/// Encodes gates as a `%az` 16-level record
pub fn encode_sixteen_level(azimuth: RadarAngle, gates: &[u8]) -> Result<Vec<u8>, CodecError> {
    if let Some((gate, &level)) = gates
        .iter()
        .enumerate()
        .find(|(_, l)| **l > MAX_ABSOLUTE_LEVEL)
    {
        return Err(CodecError::InvalidLevel {
            format: "16-level",
            gate,
            level,
            max: MAX_ABSOLUTE_LEVEL,
        });
    }

    let prefix = format!("%{:05.1}", azimuth.degrees()).into_bytes();
    let Some((&first, rest)) = gates.split_first() else {
        return Ok(prefix);
    };

    let mut encoder = DeltaEncoder {
        out: prefix,
        prev: i16::from(first),
        run: 0,
        half: None,
    };
    encoder.absolute(i16::from(first));
    for &gate in rest {
        encoder.sample(i16::from(gate));
    }
    Ok(encoder.finish())
}
