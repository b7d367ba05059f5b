use bergscan::core::features::{RadiometricFeatures, ShapeDescriptors};
use bergscan::core::{ChannelMerger, IcebergRecord, MergeParams, Polygon};
use bergscan::Polarization;

fn square_record(x: f64, y: f64, side: f64, channel: Polarization) -> IcebergRecord {
    let geometry = Polygon::new(vec![(x, y), (x + side, y), (x + side, y + side), (x, y + side)])
        .expect("Square must be a valid polygon");
    let area = geometry.area();
    IcebergRecord {
        index: 0,
        geometry,
        cfar_area: area,
        predicted_area: area,
        synthesized_area: area,
        radiometry: RadiometricFeatures {
            hh_mean: -8.0,
            hv_mean: -18.0,
            ia_mean: 33.0,
            hh_clutter_mean: -20.0,
            hh_contrast_mean: 12.0,
            hv_clutter_mean: -29.0,
            hv_contrast_mean: 11.0,
        },
        shape: ShapeDescriptors {
            perimeter_index: 0.886,
            max_chord_length: side * 2f64.sqrt(),
            length_root_area_ratio: 2f64.sqrt(),
        },
        detection_channel: channel,
        classification: None,
    }
}

#[test]
fn test_disjoint_channels_are_concatenated() {
    let hh: Vec<_> = (0..4).map(|k| square_record(k as f64 * 1000.0, 0.0, 200.0, Polarization::HH)).collect();
    let hv: Vec<_> = (0..3).map(|k| square_record(k as f64 * 1000.0, 5000.0, 150.0, Polarization::HV)).collect();
    let merged = ChannelMerger::new(MergeParams::default()).merge(hh, hv);

    assert_eq!(merged.len(), 7);
    assert!(merged[..4].iter().all(|r| r.detection_channel == Polarization::HH));
    assert!(merged[4..].iter().all(|r| r.detection_channel == Polarization::HV));
    assert!(merged.iter().enumerate().all(|(k, r)| r.index == k));
}

#[test]
fn test_overlapping_pairs_keep_larger_member() {
    // Pairs alternate which channel saw the larger outline
    let mut hh = Vec::new();
    let mut hv = Vec::new();
    for k in 0..5 {
        let x = k as f64 * 2000.0;
        let (hh_side, hv_side) = if k % 2 == 0 { (300.0, 250.0) } else { (250.0, 300.0) };
        hh.push(square_record(x, 0.0, hh_side, Polarization::HH));
        hv.push(square_record(x + 10.0, 10.0, hv_side, Polarization::HV));
    }
    let merged = ChannelMerger::new(MergeParams::default()).merge(hh, hv);

    assert_eq!(merged.len(), 5);
    assert!(merged.iter().all(|r| (r.cfar_area - 90_000.0).abs() < 1e-6));
    let hh_count = merged.iter().filter(|r| r.detection_channel == Polarization::HH).count();
    assert_eq!(hh_count, 3);
}

#[test]
fn test_one_hh_against_several_hv() {
    let hh = vec![square_record(0.0, 0.0, 100.0, Polarization::HH)];
    let hv = vec![
        square_record(110.0, 0.0, 50.0, Polarization::HV),
        square_record(-200.0, 0.0, 190.0, Polarization::HV),
        square_record(0.0, 115.0, 120.0, Polarization::HV),
        square_record(5000.0, 0.0, 500.0, Polarization::HV),
    ];
    let merged = ChannelMerger::new(MergeParams::default()).merge(hh, hv);

    // Three HV squares lie within 20 m; the 190 m one wins, the distant HV stays untouched
    assert_eq!(merged.len(), 2);
    assert!(merged.iter().all(|r| r.detection_channel == Polarization::HV));
    assert!((merged[0].cfar_area - 36_100.0).abs() < 1e-6);
    assert!((merged[1].cfar_area - 250_000.0).abs() < 1e-6);
}
