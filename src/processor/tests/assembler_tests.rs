//! Assembler state machine tests

use super::fixtures::{ImageFixture, SweepFixture, Video, dual_field_volume, stream};
use crate::config::IngestConfig;
use crate::processor::assembler::{AssemblerState, ScanAssembler};
use crate::processor::sink::{CollectingSink, RadarMessage};
use chrono::{TimeZone, Utc};
use std::io::Cursor;

fn run(bytes: Vec<u8>, config: IngestConfig) -> (CollectingSink, crate::models::IngestStats) {
    let mut sink = CollectingSink::new();
    let mut assembler = ScanAssembler::new(Cursor::new(bytes), config);
    let stats = assembler.run(&mut sink).unwrap();
    assert_eq!(assembler.state(), AssemblerState::Finished);
    (sink, stats)
}

fn message_kinds(sink: &CollectingSink) -> Vec<&'static str> {
    sink.messages
        .iter()
        .map(|m| match m {
            RadarMessage::StartVolume(_) => "start_volume",
            RadarMessage::NewScanType(_) => "scan_type",
            RadarMessage::StartTilt { .. } => "start_tilt",
            RadarMessage::RadarParams(_) => "params",
            RadarMessage::Beam(_) => "beam",
            RadarMessage::EndTilt { .. } => "end_tilt",
            RadarMessage::EndVolume(_) => "end_volume",
        })
        .collect()
}

#[test]
fn test_message_sequence_for_two_tilt_volume() {
    let (sink, stats) = run(stream(&[dual_field_volume(70)]), IngestConfig::default());

    assert_eq!(
        message_kinds(&sink),
        vec![
            "start_volume",
            "scan_type",
            "start_tilt",
            "params",
            "beam",
            "beam",
            "end_tilt",
            "start_tilt",
            "params",
            "beam",
            "beam",
            "end_tilt",
            "end_volume",
        ]
    );
    assert_eq!(stats.images_seen, 1);
    assert_eq!(stats.volumes_emitted, 1);
    assert_eq!(stats.beams_emitted, 4);
    assert_eq!(stats.images_skipped, 0);
}

#[test]
fn test_composite_beams_interleave_fields() {
    let (sink, _) = run(stream(&[dual_field_volume(70)]), IngestConfig::default());
    let beams: Vec<_> = sink.beams().collect();

    let first = beams[0];
    assert_eq!(first.azimuth.tenths(), 0);
    assert_eq!(first.elevation.tenths(), 5);
    assert_eq!(first.n_fields, 2);
    assert_eq!(first.n_gates, 4);
    // 6-level reflectivity calibrated through the default threshold table
    assert_eq!(first.field_gates(0), vec![88, 110, 0, 120]);
    assert_eq!(first.field_gates(1), vec![128, 0, 0, 140]);
    assert_eq!(first.data[..4], [88, 128, 110, 0]);

    assert_eq!(beams[1].azimuth.tenths(), 10);
    assert_eq!(beams[1].field_gates(1), vec![120, 1, 1, 0]);
    assert_eq!(beams[2].elevation.tenths(), 13);
}

#[test]
fn test_radar_params_and_volume_info() {
    let config = IngestConfig::default().with_inverted_latitude();
    let (sink, _) = run(stream(&[dual_field_volume(70).volume_id(4)]), config);

    let params: Vec<_> = sink.radar_params().collect();
    assert_eq!(params.len(), 2);
    assert_eq!(params[0].radar_id, 70);
    assert_eq!(params[0].radar_name, "Melb");
    assert_eq!(params[0].scan_type, 2);
    assert_eq!(params[1].tilt_num, 1);
    assert_eq!(params[1].elevation_deg, 1.3);
    assert_eq!(params[0].gate_count, 4);
    assert_eq!(params[0].gate_spacing_m, 1000.0);
    assert!((params[0].latitude + 37.852).abs() < 1e-9);
    assert!((params[0].nyquist - 12.7).abs() < 1e-9);

    let names: Vec<_> = params[0].fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["Refl", "Vel"]);
    assert_eq!(params[0].fields[0].scale, 0.5);
    assert_eq!(params[0].fields[0].bias, -32.0);
    assert_eq!(params[0].fields[1].units, "m/s");
    assert!((params[0].fields[1].scale - 0.1).abs() < 1e-9);

    let info = sink.volumes().next().unwrap();
    assert_eq!(info.image_id, "0070 0404211207");
    assert_eq!(info.station_id, 70);
    assert_eq!(info.volume_id, Some(4));
    assert_eq!(info.n_tilts, 2);
    assert_eq!(
        info.timestamp,
        Utc.with_ymd_and_hms(2004, 4, 21, 12, 7, 0).single()
    );
}

#[test]
fn test_binary_radials_carry_time_offsets() {
    let (sink, _) = run(stream(&[dual_field_volume(70)]), IngestConfig::default());
    let beams: Vec<_> = sink.beams().collect();
    // Refl (ASCII) comes first at each azimuth, so the sweep time is used
    assert_eq!(
        beams[1].timestamp,
        Utc.with_ymd_and_hms(2004, 4, 21, 12, 7, 0).single()
    );

    let vel_only = ImageFixture::new(70, "Melb")
        .sweep(
            SweepFixture::new("Vel", 0.5, Video::Binary)
                .radial(0, &[5])
                .radial(10, &[6]),
        )
        .sweep(SweepFixture::new("Vel", 1.3, Video::Binary).radial(0, &[7]));
    let (sink, _) = run(stream(&[vel_only]), IngestConfig::default());
    let beams: Vec<_> = sink.beams().collect();
    assert_eq!(
        beams[1].timestamp,
        Utc.with_ymd_and_hms(2004, 4, 21, 12, 7, 1).single()
    );
}

#[test]
fn test_scan_type_marker_only_on_change() {
    let image = ImageFixture::new(70, "Melb")
        .sweep(SweepFixture::new("Refl", 0.5, Video::SixLevel).radial(0, &[1, 1]))
        .sweep(SweepFixture::new("Refl", 1.3, Video::SixLevel).radial(0, &[1, 1]))
        .sweep(
            SweepFixture::new("Refl", 2.4, Video::SixLevel)
                .scan_type(3)
                .radial(0, &[1, 1]),
        );
    let (sink, _) = run(stream(&[image.clone(), image]), IngestConfig::default());

    let types: Vec<i32> = sink
        .messages
        .iter()
        .filter_map(|m| match m {
            RadarMessage::NewScanType(t) => Some(*t),
            _ => None,
        })
        .collect();
    // The flag carries over between volumes of the same stream
    assert_eq!(types, vec![2, 3, 2, 3]);
}

#[test]
fn test_resolution_remap_for_dual_resolution_pair() {
    let image = ImageFixture::new(70, "Melb")
        .sweep(
            SweepFixture::new("Refl", 0.5, Video::SixLevel)
                .range(0.0, 1000.0)
                .radial(0, &[1, 2]),
        )
        .sweep(
            SweepFixture::new("Vel", 0.5, Video::Binary)
                .range(375.0, 250.0)
                .radial(0, &[9; 8]),
        );
    let (sink, _) = run(stream(&[image]), IngestConfig::default());

    let params = sink.radar_params().next().unwrap();
    let refl = &params.fields[0];
    assert_eq!(refl.start_range_m, 375.0);
    assert_eq!(refl.range_res_m, 250.0);
    assert_eq!(refl.n_gates, 8);
    assert_eq!(params.gate_spacing_m, 250.0);

    let beam = sink.beams().next().unwrap();
    // new gate j takes old gate (j + 2) / 4
    assert_eq!(beam.field_gates(0), vec![88, 88, 110, 110, 110, 110, 0, 0]);
}

#[test]
fn test_empty_field_is_kept_with_minimum_gates() {
    let image = ImageFixture::new(70, "Melb")
        .sweep(SweepFixture::new("Refl", 0.5, Video::SixLevel).radial(0, &[1, 1]))
        .sweep(SweepFixture::new("Vel", 0.5, Video::Binary));
    let (sink, stats) = run(stream(&[image]), IngestConfig::default());

    assert_eq!(stats.volumes_emitted, 1);
    assert_eq!(stats.empty_fields, 1);
    let params = sink.radar_params().next().unwrap();
    assert_eq!(params.fields[1].name, "Vel");
    assert_eq!(params.fields[1].n_gates, 4);
    let beam = sink.beams().next().unwrap();
    assert_eq!(beam.field_gates(1), vec![0; 4]);
}

#[test]
fn test_all_null_field_advertises_four_gates() {
    let image = ImageFixture::new(70, "Melb")
        .sweep(SweepFixture::new("Refl", 0.5, Video::SixLevel).radial(0, &[1, 1]))
        .sweep(
            SweepFixture::new("Vel", 0.5, Video::Binary)
                .radial(0, &[])
                .radial(10, &[]),
        );
    let (sink, stats) = run(stream(&[image]), IngestConfig::default());
    assert_eq!(stats.empty_fields, 0);
    let params = sink.radar_params().next().unwrap();
    assert_eq!(params.fields[1].n_gates, 4);
    assert_eq!(params.gate_count, 4);
    assert_eq!(sink.beams().count(), 2);
}

#[test]
fn test_bad_radial_is_dropped_not_fatal() {
    let image = ImageFixture::new(70, "Melb")
        .sweep(
            SweepFixture::new("Refl", 0.5, Video::SixLevel)
                .radial(0, &[1, 1])
                .extra(b"%XYZ")
                .radial(10, &[2, 2]),
        )
        .sweep(SweepFixture::new("Refl", 1.3, Video::SixLevel).radial(0, &[1, 1]));
    let (sink, stats) = run(stream(&[image]), IngestConfig::default());

    assert_eq!(stats.radials_dropped, 1);
    assert_eq!(stats.volumes_emitted, 1);
    assert_eq!(sink.beams().count(), 3);
}

#[test]
fn test_radar_name_mismatch_skips_volume_only() {
    let images = [
        dual_field_volume(70),
        ImageFixture::new(2, "Syd")
            .sweep(SweepFixture::new("Refl", 0.5, Video::SixLevel).radial(0, &[1, 1]))
            .sweep(SweepFixture::new("Refl", 0.9, Video::SixLevel).radial(0, &[1, 1])),
        dual_field_volume(70),
    ];
    let config = IngestConfig::default().with_expected_radar_name("melb");
    let (sink, stats) = run(stream(&images), config);

    assert_eq!(stats.images_seen, 3);
    assert_eq!(stats.volumes_emitted, 2);
    assert_eq!(stats.images_skipped, 1);
    assert!(stats.skip_reasons[0].contains("Radar name mismatch"));
    assert_eq!(sink.volumes().count(), 2);
}

#[test]
fn test_volume_id_mismatch_skips_volume() {
    let images = [dual_field_volume(70).volume_id(1), dual_field_volume(70).volume_id(2)];
    let config = IngestConfig::default().with_expected_volume_id(2);
    let (sink, stats) = run(stream(&images), config);

    assert_eq!(stats.images_skipped, 1);
    assert_eq!(sink.volumes().next().unwrap().volume_id, Some(2));
}

#[test]
fn test_single_scan_image_is_skipped() {
    let composite = ImageFixture::new(70, "Melb")
        .sweep(SweepFixture::new("Refl", 0.5, Video::SixLevel).radial(0, &[1, 1]));
    let (sink, stats) = run(
        stream(&[composite, dual_field_volume(70)]),
        IngestConfig::default(),
    );
    assert_eq!(stats.images_skipped, 1);
    assert_eq!(stats.volumes_emitted, 1);
    assert!(stats.skip_reasons[0].contains("composite"));
    assert_eq!(sink.volumes().count(), 1);
}

#[test]
fn test_scan_count_mismatch_skips_image() {
    let bad = dual_field_volume(70).declared_scans(5);
    let (_, stats) = run(stream(&[bad, dual_field_volume(70)]), IngestConfig::default());
    assert_eq!(stats.images_skipped, 1);
    assert_eq!(stats.volumes_emitted, 1);
}

#[test]
fn test_uneven_field_grouping_skips_image() {
    let image = ImageFixture::new(70, "Melb")
        .sweep(SweepFixture::new("Refl", 0.5, Video::SixLevel).radial(0, &[1, 1]))
        .sweep(SweepFixture::new("Vel", 0.5, Video::Binary).radial(0, &[1]))
        .sweep(SweepFixture::new("Refl", 1.3, Video::SixLevel).radial(0, &[1, 1]));
    let (sink, stats) = run(stream(&[image]), IngestConfig::default());
    assert_eq!(stats.images_skipped, 1);
    assert!(sink.messages.is_empty());
}

#[test]
fn test_elevation_outside_beam_width_skips_image() {
    let mut image = dual_field_volume(70);
    image.sweeps[2] = image.sweeps[2].clone().header_elevation(Some(2.0));
    let (sink, stats) = run(stream(&[image.clone()]), IngestConfig::default());
    assert_eq!(stats.images_skipped, 1);
    assert!(stats.skip_reasons[0].contains("differs from descriptor"));
    // Nothing from the partially read image reaches the sink
    assert!(sink.messages.is_empty());

    let wide = IngestConfig::default().with_beam_width(2.0);
    let (_, stats) = run(stream(&[image]), wide);
    assert_eq!(stats.volumes_emitted, 1);
}

#[test]
fn test_missing_elevation_skips_image() {
    let mut image = dual_field_volume(70);
    image.sweeps[0] = image.sweeps[0].clone().header_elevation(None);
    let (_, stats) = run(stream(&[image]), IngestConfig::default());
    assert_eq!(stats.images_skipped, 1);
    assert!(stats.skip_reasons[0].contains("ELEV"));
}

#[test]
fn test_image_cut_by_next_image_start() {
    let cut = dual_field_volume(70).cut_after(2);
    let (sink, stats) = run(
        stream(&[cut, dual_field_volume(71)]),
        IngestConfig::default(),
    );
    assert_eq!(stats.images_seen, 2);
    assert_eq!(stats.images_skipped, 1);
    assert!(stats.skip_reasons[0].contains("truncated"));
    assert_eq!(sink.volumes().next().unwrap().station_id, 71);
}

#[test]
fn test_image_cut_by_end_of_stream() {
    let cut = dual_field_volume(70).cut_after(3);
    let (sink, stats) = run(
        stream(&[dual_field_volume(70), cut]),
        IngestConfig::default(),
    );
    assert_eq!(stats.volumes_emitted, 1);
    assert_eq!(stats.images_skipped, 1);
    assert_eq!(sink.volumes().count(), 1);
}

#[test]
fn test_overflowed_record_inside_field() {
    let long_line = vec![b'x'; 3000];
    let mut image = dual_field_volume(70);
    image.sweeps[0] = image.sweeps[0].clone().extra(&long_line);
    let config = IngestConfig::default()
        .with_record_buffer_size(2048)
        .with_max_radial_gates(1024);
    let (_, stats) = run(stream(&[image]), config);

    assert_eq!(stats.overflow_records, 1);
    assert_eq!(stats.volumes_emitted, 1);
    assert_eq!(stats.beams_emitted, 4);
}

#[test]
fn test_overflow_count_visible_through_next_volume() {
    let mut image = dual_field_volume(70);
    image.sweeps[0] = image.sweeps[0].clone().extra(&[b'x'; 3000]);
    let config = IngestConfig::default()
        .with_record_buffer_size(2048)
        .with_max_radial_gates(1024);
    let mut assembler = ScanAssembler::new(Cursor::new(stream(&[image])), config);

    let volume = assembler.next_volume().unwrap().unwrap();
    assert_eq!(volume.tilts.len(), 2);
    assert_eq!(assembler.stats().overflow_records, 1);
    assert_eq!(assembler.stats().volumes_emitted, 0);
}

#[test]
fn test_garbage_between_images_is_ignored() {
    let mut bytes = b"\x04\x04junk line\n/RXTIME: 123\n".to_vec();
    bytes.extend(stream(&[dual_field_volume(70)]));
    bytes.extend_from_slice(b"trailing\n\x1a");
    let (_, stats) = run(bytes, IngestConfig::default());
    assert_eq!(stats.volumes_emitted, 1);
}

#[test]
fn test_empty_stream_finishes_cleanly() {
    let (sink, stats) = run(Vec::new(), IngestConfig::default());
    assert!(sink.messages.is_empty());
    assert_eq!(stats.images_seen, 0);
}

#[test]
fn test_next_volume_iterates_without_sink() {
    let bytes = stream(&[dual_field_volume(70), dual_field_volume(71)]);
    let mut assembler = ScanAssembler::new(Cursor::new(bytes), IngestConfig::default());

    let first = assembler.next_volume().unwrap().unwrap();
    assert_eq!(first.info.station_id, 70);
    assert_eq!(first.tilts.len(), 2);
    assert_eq!(first.tilts[0].fields.len(), 2);

    let second = assembler.next_volume().unwrap().unwrap();
    assert_eq!(second.info.station_id, 71);
    assert!(assembler.next_volume().unwrap().is_none());
    assert_eq!(assembler.state(), AssemblerState::Finished);
}

#[test]
fn test_back_to_back_image_starts() {
    let bytes = b"/IMAGE: 0070 0404211207\n/IMAGE: 0070 0404211207\n".to_vec();
    let (sink, stats) = run(bytes, IngestConfig::default());
    assert!(sink.messages.is_empty());
    assert_eq!(stats.images_seen, 2);
    assert_eq!(stats.images_skipped, 2);
}
