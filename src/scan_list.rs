//! Image header scan list.
//!
//! An image header enumerates every sub-scan before any radial data:
//!
//! ```text
//! /IMAGE: 0070 0404211207
//! /IMAGESCANS: 2
//! /SCAN   1:   70 0404211207  2   0.5  0  1       1234       5678
//! /SCAN   2:   70 0404211207  2   0.5  1  1       6912       4101
//! /IMAGEHEADER END:
//! ```
//!
//! Consecutive scans at the same elevation are the fields of one PPI.

use crate::constants::{
    ELEVATION_GROUP_EPSILON, IMAGE_HEADER_END_MARKER, IMAGE_SCANS_MARKER, SCAN_LINE_MARKER,
};
use crate::error::MetadataError;
use crate::models::ScanDescriptor;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static SCAN_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^/SCAN\s*(\d+)\s*:\s*(-?\d+)\s+(\d+)\s+(-?\d+)\s+(-?\d+(?:\.\d*)?)\s+(-?\d+)\s+(-?\d+)(?:\s+(-?\d+))?(?:\s+(-?\d+))?",
    )
    .expect("valid scan line regex")
});

/// Accumulates descriptors until the header-end sentinel
#[derive(Debug, Default)]
pub struct ScanListBuilder {
    declared: Option<usize>,
    descriptors: Vec<ScanDescriptor>,
}

impl ScanListBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Folds one `/`-line into the list.
    ///
    /// Returns `Ok(true)` once the sentinel has been seen and the descriptor
    /// count matches the declared total.
    pub fn add_scan_descriptor(&mut self, line: &str) -> Result<bool, MetadataError> {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix(IMAGE_SCANS_MARKER) {
            let count = rest
                .split_whitespace()
                .next()
                .and_then(|t| t.parse::<usize>().ok())
                .ok_or_else(|| MetadataError::MalformedLine {
                    key: "IMAGESCANS",
                    line: line.to_string(),
                })?;
            self.declared = Some(count);
            return Ok(false);
        }

        if line.starts_with(SCAN_LINE_MARKER) {
            let descriptor = parse_scan_line(line)?;
            self.descriptors.push(descriptor);
            return Ok(false);
        }

        if line.contains(IMAGE_HEADER_END_MARKER) {
            let declared = self.declared.ok_or(MetadataError::MissingScanCount)?;
            if declared != self.descriptors.len() {
                return Err(MetadataError::ScanCountMismatch {
                    declared,
                    found: self.descriptors.len(),
                });
            }
            return Ok(true);
        }

        Ok(false)
    }

    /// Groups the completed list into PPIs
    pub fn finish(self) -> Result<ScanList, MetadataError> {
        ScanList::from_descriptors(self.descriptors)
    }
}

fn parse_scan_line(line: &str) -> Result<ScanDescriptor, MetadataError> {
    let malformed = || MetadataError::MalformedLine {
        key: "SCAN",
        line: line.to_string(),
    };
    let caps = SCAN_LINE_RE.captures(line).ok_or_else(malformed)?;
    let int = |i: usize| -> Result<i32, MetadataError> {
        caps[i].parse::<i32>().map_err(|_| malformed())
    };
    let optional = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<i64>().ok());

    Ok(ScanDescriptor {
        scan_num: int(1)?,
        station_id: int(2)?,
        timestamp: caps[3].to_string(),
        radar_type_flag: int(4)?,
        elev_angle: caps[5].parse::<f64>().map_err(|_| malformed())?,
        field_index: int(6)?,
        n_fields_at_elev: 0,
        flags: int(7)?,
        offset: optional(8),
        size: optional(9),
    })
}

/// Derives `(n_fields, n_ppis)` from the scan elevations.
///
/// The field count is the largest run of consecutive equal elevations, and
/// the total must split into whole PPIs of that size.
pub fn field_grouping(elevations: &[f64]) -> Result<(usize, usize), MetadataError> {
    let n_fields = group_sizes(elevations).into_iter().max().unwrap_or(0);
    if n_fields == 0 {
        return Err(MetadataError::NoFields);
    }
    if elevations.len() % n_fields != 0 {
        return Err(MetadataError::UnevenFieldGrouping {
            n_scans: elevations.len(),
            n_fields,
        });
    }
    Ok((n_fields, elevations.len() / n_fields))
}

fn group_sizes(elevations: &[f64]) -> Vec<usize> {
    let mut sizes: Vec<usize> = Vec::new();
    let mut previous: Option<f64> = None;
    for &elev in elevations {
        match (previous, sizes.last_mut()) {
            (Some(p), Some(size)) if (elev - p).abs() < ELEVATION_GROUP_EPSILON => *size += 1,
            _ => sizes.push(1),
        }
        previous = Some(elev);
    }
    sizes
}

/// Complete, grouped scan list for one image
#[derive(Debug, Clone, PartialEq)]
pub struct ScanList {
    descriptors: Vec<ScanDescriptor>,
    n_fields: usize,
    n_ppis: usize,
}

impl ScanList {
    pub fn from_descriptors(mut descriptors: Vec<ScanDescriptor>) -> Result<Self, MetadataError> {
        if descriptors.len() == 1 {
            return Err(MetadataError::CompositePpi);
        }
        let elevations: Vec<f64> = descriptors.iter().map(|d| d.elev_angle).collect();
        let (n_fields, n_ppis) = field_grouping(&elevations)?;

        let mut at = 0;
        for size in group_sizes(&elevations) {
            for descriptor in &mut descriptors[at..at + size] {
                descriptor.n_fields_at_elev = size;
            }
            at += size;
        }

        debug!(
            "Scan list: {} scans, {} fields, {} PPIs",
            descriptors.len(),
            n_fields,
            n_ppis
        );
        Ok(Self {
            descriptors,
            n_fields,
            n_ppis,
        })
    }

    pub fn n_fields(&self) -> usize {
        self.n_fields
    }

    pub fn n_ppis(&self) -> usize {
        self.n_ppis
    }

    pub fn descriptors(&self) -> &[ScanDescriptor] {
        &self.descriptors
    }

    /// Descriptor for the given PPI and field position
    pub fn descriptor(&self, ppi: usize, field: usize) -> Option<&ScanDescriptor> {
        self.descriptors.get(ppi * self.n_fields + field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_line(num: usize, elev: f64, data_type: i32) -> String {
        format!(
            "/SCAN {:3}: {:4} 0404211207 {:2} {:5.1} {:2} {:2} {:10} {:10}",
            num,
            70,
            2,
            elev,
            data_type,
            1,
            num * 1000,
            900
        )
    }

    #[test]
    fn test_field_grouping_regular_volume() {
        assert_eq!(
            field_grouping(&[1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 3.0, 3.0, 3.0]),
            Ok((3, 3))
        );
    }

    #[test]
    fn test_field_grouping_rejects_uneven_split() {
        assert_eq!(
            field_grouping(&[1.0, 1.0, 2.0, 2.0, 2.0]),
            Err(MetadataError::UnevenFieldGrouping {
                n_scans: 5,
                n_fields: 3
            })
        );
        assert_eq!(field_grouping(&[]), Err(MetadataError::NoFields));
    }

    #[test]
    fn test_grouping_tolerance() {
        assert_eq!(field_grouping(&[0.5, 0.500001, 0.9, 0.9]), Ok((2, 2)));
        assert_eq!(field_grouping(&[0.5, 0.51, 0.9, 0.9]), Ok((2, 2)));
        assert_eq!(group_sizes(&[0.5, 0.51, 0.9, 0.9]), vec![1, 1, 2]);
    }

    #[test]
    fn test_parse_scan_line() {
        let descriptor = parse_scan_line(&scan_line(3, 1.3, 1)).unwrap();
        assert_eq!(descriptor.scan_num, 3);
        assert_eq!(descriptor.station_id, 70);
        assert_eq!(descriptor.timestamp, "0404211207");
        assert_eq!(descriptor.radar_type_flag, 2);
        assert_eq!(descriptor.elev_angle, 1.3);
        assert_eq!(descriptor.field_index, 1);
        assert_eq!(descriptor.flags, 1);
        assert_eq!(descriptor.offset, Some(3000));
        assert_eq!(descriptor.size, Some(900));

        assert!(parse_scan_line("/SCAN 1: junk").is_err());
    }

    #[test]
    fn test_builder_completes_on_sentinel() {
        let mut builder = ScanListBuilder::new();
        assert!(!builder.add_scan_descriptor("/IMAGESCANS: 4").unwrap());
        assert!(!builder.add_scan_descriptor("/IMAGESIZE: 12345").unwrap());
        for (i, elev) in [0.5, 0.5, 1.3, 1.3].iter().enumerate() {
            let line = scan_line(i + 1, *elev, (i % 2) as i32);
            assert!(!builder.add_scan_descriptor(&line).unwrap());
        }
        assert!(builder.add_scan_descriptor("/IMAGEHEADER END:").unwrap());

        let list = builder.finish().unwrap();
        assert_eq!((list.n_fields(), list.n_ppis()), (2, 2));
        assert_eq!(list.descriptor(1, 0).map(|d| d.scan_num), Some(3));
        assert!(list.descriptors().iter().all(|d| d.n_fields_at_elev == 2));
    }

    #[test]
    fn test_sentinel_with_wrong_count_is_error() {
        let mut builder = ScanListBuilder::new();
        builder.add_scan_descriptor("/IMAGESCANS: 3").unwrap();
        builder.add_scan_descriptor(&scan_line(1, 0.5, 0)).unwrap();
        assert_eq!(
            builder.add_scan_descriptor("/IMAGEHEADER END:"),
            Err(MetadataError::ScanCountMismatch {
                declared: 3,
                found: 1
            })
        );

        let mut undeclared = ScanListBuilder::new();
        assert_eq!(
            undeclared.add_scan_descriptor("/IMAGEHEADER END:"),
            Err(MetadataError::MissingScanCount)
        );
    }

    #[test]
    fn test_single_scan_is_composite_ppi() {
        let descriptor = parse_scan_line(&scan_line(1, 0.5, 0)).unwrap();
        assert_eq!(
            ScanList::from_descriptors(vec![descriptor]),
            Err(MetadataError::CompositePpi)
        );
    }
}
