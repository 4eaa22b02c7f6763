//! Field preparation and azimuth merge for one PPI.
//!
//! Before merging, every field gets an effective gate count and a coarse
//! reflectivity field paired with a fine velocity field is resampled onto
//! the velocity grid. The merge then walks all fields in circular azimuth
//! order and interleaves their gates into composite beams.

use crate::constants::{MIN_FIELD_GATES, remap};
use crate::models::{CompositeBeam, FieldCollection, RadarAngle};
use tracing::{debug, trace};

/// Sets each field's advertised gate count from its longest radial.
///
/// Fields whose radials are all empty still advertise a small non-zero count.
pub fn settle_gate_counts(fields: &mut [FieldCollection]) {
    for field in fields.iter_mut() {
        let longest = field.longest_radial();
        field.max_gates = if longest == 0 {
            debug!(
                "Field {} has no gate data, advertising {} gates",
                field.field_name, MIN_FIELD_GATES
            );
            MIN_FIELD_GATES
        } else {
            longest
        };
    }
}

/// True for the dual-resolution Refl/Vel pair
pub fn needs_resolution_remap(fields: &[FieldCollection]) -> bool {
    matches!(fields, [refl, vel]
        if refl.field_name == remap::REFL_FIELD
            && vel.field_name == remap::VEL_FIELD
            && refl.range_res != vel.range_res)
}

/// Resamples one radial at a fixed 4:1 ratio
pub fn remap_gates(old: &[u8], limit: usize) -> Vec<u8> {
    let new_len = (old.len() * remap::RATIO).min(limit);
    (0..new_len)
        .map(|j| old.get((j + 2) / remap::RATIO).copied().unwrap_or(0))
        .collect()
}

/// Resamples the reflectivity field onto the fixed velocity grid.
///
/// Returns whether a remap took place. The target geometry is fixed
/// (375 m start, 250 m gates) and not derived from the velocity field.
pub fn apply_resolution_remap(fields: &mut [FieldCollection], limit: usize) -> bool {
    if !needs_resolution_remap(fields) {
        return false;
    }
    let refl = &mut fields[0];
    let old_max = refl.max_gates;
    for radial in refl.radials.iter_mut() {
        radial.gates = remap_gates(&radial.gates, limit);
    }
    refl.max_gates = (old_max * remap::RATIO).min(limit);
    refl.start_range = remap::TARGET_START_RANGE_M;
    refl.range_res = remap::TARGET_RANGE_RES_M;
    debug!(
        "Remapped {} from {} to {} gates",
        refl.field_name, old_max, refl.max_gates
    );
    true
}

/// Iterator producing composite beams in circular azimuth order
#[derive(Debug)]
pub struct BeamMerger<'a> {
    fields: &'a [FieldCollection],
    cursors: Vec<usize>,
    n_gates: usize,
    duplicates: usize,
}

impl<'a> BeamMerger<'a> {
    pub fn new(fields: &'a [FieldCollection]) -> Self {
        let n_gates = fields.iter().map(|f| f.max_gates).max().unwrap_or(0);
        Self {
            fields,
            cursors: vec![0; fields.len()],
            n_gates,
            duplicates: 0,
        }
    }

    pub fn n_gates(&self) -> usize {
        self.n_gates
    }

    /// Radials skipped because their field repeated an azimuth
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    fn current_azimuth(&self, field: usize) -> Option<RadarAngle> {
        self.fields[field]
            .radials
            .get(self.cursors[field])
            .map(|r| r.azimuth)
    }

    fn next_azimuth(&self) -> Option<RadarAngle> {
        (0..self.fields.len())
            .filter_map(|f| self.current_azimuth(f))
            .reduce(|best, az| if az.precedes(best) { az } else { best })
    }
}

impl Iterator for BeamMerger<'_> {
    type Item = CompositeBeam;

    fn next(&mut self) -> Option<CompositeBeam> {
        let azimuth = self.next_azimuth()?;
        let n_fields = self.fields.len();
        let mut beam = CompositeBeam {
            azimuth,
            elevation: azimuth,
            timestamp: None,
            n_fields,
            n_gates: self.n_gates,
            data: vec![0; n_fields * self.n_gates],
        };
        let mut first = true;

        for f in 0..n_fields {
            if self.current_azimuth(f) != Some(azimuth) {
                continue;
            }
            let radial = &self.fields[f].radials[self.cursors[f]];
            if first {
                beam.elevation = radial.elevation;
                beam.timestamp = radial.timestamp;
                first = false;
            }
            for (g, &value) in radial.gates.iter().take(self.n_gates).enumerate() {
                beam.data[g * n_fields + f] = value;
            }
            self.cursors[f] += 1;

            while self.current_azimuth(f) == Some(azimuth) {
                trace!("Dropping repeated azimuth {} in field {}", azimuth, f);
                self.duplicates += 1;
                self.cursors[f] += 1;
            }
        }

        Some(beam)
    }
}
