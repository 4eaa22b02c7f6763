//! Constant lookup tables shared by the ASCII radial codecs.
//!
//! All tables are built at compile time and never mutated.

/// Number of possible byte values for lookup tables
pub const BYTE_LOOKUP_LENGTH: usize = 256;

/// Marks a byte with no meaning in the 16-level alphabet
pub const INVALID_CODE: u8 = 0xff;

/// High bit of a `XLAT_16L` entry: the low 7 bits index a delta pair
pub const DELTA_FLAG: u8 = 0x80;

/// Largest step a single delta can express
pub const MAX_DELTA: i16 = 3;

/// Absolute-value escapes for 16-level video, indexed by level
pub const ABSOLUTE: [u8; 16] = *b"ABCDEFGHIJKLMNOP";

/// Delta-pair codes indexed by `(d1 + 3) * 7 + (d2 + 3)`
pub const DELTA: [u8; 49] = *b"QRSTUVWXYZabcdefghijklmnopqrstuvwxyz!$&'()*:;<=>?";

/// Byte → absolute level, `DELTA_FLAG | pair index`, or `INVALID_CODE`
pub static XLAT_16L: [u8; BYTE_LOOKUP_LENGTH] = build_xlat_16l();

/// 6-level code index → packed `(hi << 3) | lo` level pair
pub const A2N_XLAT: [u8; 49] = build_a2n();

/// Packed `(hi << 3) | lo` level pair → 6-level code byte, 0 when invalid
pub static SIX_LEVEL_ENCODE: [u8; 64] = build_six_level_encode();

const fn build_xlat_16l() -> [u8; BYTE_LOOKUP_LENGTH] {
    let mut table = [INVALID_CODE; BYTE_LOOKUP_LENGTH];
    let mut i = 0;
    while i < ABSOLUTE.len() {
        table[ABSOLUTE[i] as usize] = i as u8;
        i += 1;
    }
    let mut j = 0;
    while j < DELTA.len() {
        table[DELTA[j] as usize] = DELTA_FLAG | j as u8;
        j += 1;
    }
    table
}

const fn build_a2n() -> [u8; 49] {
    let mut table = [0u8; 49];
    let mut i = 0;
    while i < 49 {
        table[i] = (((i / 7) << 3) | (i % 7)) as u8;
        i += 1;
    }
    table
}

const fn build_six_level_encode() -> [u8; 64] {
    let mut table = [0u8; 64];
    let mut i = 0;
    while i < 49 {
        table[A2N_XLAT[i] as usize] = six_level_char(i as u8);
        i += 1;
    }
    table
}

/// Code byte for a 6-level index in `0..49`
pub const fn six_level_char(index: u8) -> u8 {
    if index < 25 { b'A' + index } else { b'a' + (index - 25) }
}

/// 6-level index for a code byte; lowercase codes carry a 7-place offset
pub const fn six_level_index(code: u8) -> Option<u8> {
    match code {
        b'A'..=b'Y' => Some(code - b'A'),
        b'a'..=b'x' => Some(code - b'A' - 7),
        _ => None,
    }
}

/// Splits a delta-pair index into its two signed steps
pub const fn unpack_delta(index: u8) -> (i16, i16) {
    ((index / 7) as i16 - MAX_DELTA, (index % 7) as i16 - MAX_DELTA)
}

/// Code byte for a pair of steps in `-3..=3`
pub const fn delta_code(d1: i16, d2: i16) -> u8 {
    DELTA[((d1 + MAX_DELTA) * 7 + (d2 + MAX_DELTA)) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_16l_alphabet_is_disjoint() {
        let mut seen = HashSet::new();
        for b in ABSOLUTE.iter().chain(DELTA.iter()) {
            assert!(seen.insert(*b), "duplicate code {}", *b as char);
            assert!(!b.is_ascii_digit());
        }
        assert_eq!(seen.len(), 65);
    }

    #[test]
    fn test_xlat_round_trips_every_code() {
        for (level, &code) in ABSOLUTE.iter().enumerate() {
            assert_eq!(XLAT_16L[code as usize], level as u8);
        }
        for d1 in -3..=3 {
            for d2 in -3..=3 {
                let entry = XLAT_16L[delta_code(d1, d2) as usize];
                assert_eq!(entry & DELTA_FLAG, DELTA_FLAG);
                assert_eq!(unpack_delta(entry & !DELTA_FLAG), (d1, d2));
            }
        }
        assert_eq!(XLAT_16L[b'5' as usize], INVALID_CODE);
        assert_eq!(XLAT_16L[0], INVALID_CODE);
    }

    #[test]
    fn test_six_level_tables_agree() {
        for code in (b'A'..=b'Y').chain(b'a'..=b'x') {
            let index = six_level_index(code).unwrap();
            assert_eq!(six_level_char(index), code);
            let packed = A2N_XLAT[index as usize];
            assert_eq!(SIX_LEVEL_ENCODE[packed as usize], code);
        }
        assert_eq!(six_level_index(b'a'), Some(25));
        assert_eq!(six_level_index(b'x'), Some(48));
        assert_eq!(six_level_index(b'Z'), None);
        assert_eq!(A2N_XLAT[0], 0);
        assert_eq!(A2N_XLAT[48], (6 << 3) | 6);
    }
}
