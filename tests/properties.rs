use approx::assert_relative_eq;
use ndarray::{Array2, Array4};
use volume_dataset::{
    DataSet, Interpolation, IsocontourKind, NoProgress, Orientation, RawData, Reference,
    ScalingArray, Thresholding, TimeAggregation, TimeFrames, Voxel,
    isocontour::{EDGE, INTERIOR},
    slicer::{self, SliceRequest},
};

/// 3 frames of 4x3x2 with per-(frame, plane) scaling
fn dynamic() -> DataSet {
    let samples = Array4::from_shape_fn((3, 2, 3, 4), |(t, z, y, x)| {
        (t as i16 - 1) * 50 + (z * 12 + y * 4 + x) as i16
    });
    let scaling = Array2::from_shape_fn((3, 2), |(t, z)| 0.5 + t as f64 + 0.25 * z as f64);
    DataSet::import(
        "dynamic",
        RawData::from_array(samples),
        ScalingArray::per_frame_plane(scaling),
        TimeFrames::new(0.0, vec![10.0, 20.0, 40.0]),
        &NoProgress,
    )
    .unwrap()
}

#[test]
fn value_is_raw_sample_times_scaling() {
    let mut ds = dynamic();
    ds.set_scale_factor(1.5).unwrap();
    for t in 0..3isize {
        for z in 0..2isize {
            for (x, y) in [(0isize, 0isize), (3, 2), (1, 1)] {
                let raw = ((t - 1) * 50 + z * 12 + y * 4 + x) as f64;
                let internal = 0.5 + t as f64 + 0.25 * z as f64;
                assert_relative_eq!(
                    ds.get_value(Voxel::new(x, y, z, t)),
                    raw * internal * 1.5,
                    max_relative = 1e-12
                );
            }
        }
    }
}

#[test]
fn scale_factor_round_trip() {
    let mut ds = dynamic();
    ds.set_thresholding(Thresholding::PerFrame);
    ds.set_threshold_max(Reference::Second, 40.0);
    let before = (
        ds.statistics().global_max(),
        ds.statistics().global_min(),
        ds.thresholds().max(Reference::First),
        ds.thresholds().max(Reference::Second),
    );
    ds.set_scale_factor(7.25).unwrap();
    ds.set_scale_factor(1.0).unwrap();
    assert_relative_eq!(ds.statistics().global_max(), before.0, max_relative = 1e-12);
    assert_relative_eq!(ds.statistics().global_min(), before.1, max_relative = 1e-12);
    assert_relative_eq!(ds.thresholds().max(Reference::First), before.2, max_relative = 1e-12);
    assert_relative_eq!(ds.thresholds().max(Reference::Second), before.3, max_relative = 1e-12);
}

#[test]
fn frame_lookup_is_monotone_and_clamped() {
    let ds = dynamic();
    let frames = ds.frames();
    assert_eq!(frames.frame_for_time(-5.0), 0);
    assert_eq!(frames.frame_for_time(70.0), 2);
    assert_eq!(frames.frame_for_time(1e6), 2);
    let mut previous = 0;
    for step in -10..800 {
        let frame = frames.frame_for_time(step as f64 * 0.1);
        assert!(frame >= previous);
        previous = frame;
    }
}

#[test]
fn single_frame_window_returns_frame_extrema() {
    let ds = dynamic();
    let stats = ds.statistics();
    assert_eq!(ds.get_max(11.0, 5.0).unwrap(), stats.frame_max()[1]);
    assert_eq!(ds.get_min(30.0, 40.0).unwrap(), stats.frame_min()[2]);
}

#[test]
fn global_extrema_are_frame_envelope() {
    let ds = dynamic();
    let stats = ds.statistics();
    let max = stats.frame_max().iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = stats.frame_min().iter().copied().fold(f64::INFINITY, f64::min);
    assert_eq!(stats.global_max(), max);
    assert_eq!(stats.global_min(), min);

    let envelope = ds.get_extrema(0.0, 70.0, TimeAggregation::Envelope).unwrap();
    assert_eq!(envelope.max, max);
    assert_eq!(envelope.min, min);
}

#[test]
fn isocontour_of_uniform_block() {
    let samples = Array4::from_shape_fn((1, 1, 12, 12), |(_, _, y, x)| {
        if (2..10).contains(&x) && (2..10).contains(&y) { 5i16 } else { 3 }
    });
    let ds = DataSet::new(
        "block",
        RawData::from_array(samples),
        ScalingArray::scalar(1.0),
        TimeFrames::single(1.0),
    );
    let roi = ds
        .build_isocontour(Voxel::new(6, 3, 0, 0), IsocontourKind::Planar, &NoProgress)
        .unwrap();
    assert!(roi.iso_value() > 3.0 && roi.iso_value() < 5.0);
    assert_eq!(roi.voxel_count(), 64);
    for ((_, y, x), &v) in roi.mask().indexed_iter() {
        let border = x == 0 || y == 0 || x == 7 || y == 7;
        assert_eq!(v, if border { EDGE } else { INTERIOR }, "voxel ({x}, {y})");
    }
}

#[test]
fn grid_aligned_trilinear_matches_lookup() {
    let ds = dynamic();
    let view = slicer::view_volume(&ds.volume(), Orientation::Axial, Some(0.5), 1.0);
    let request = SliceRequest::new(view, 1.0)
        .with_time(12.0, 4.0)
        .with_interpolation(Interpolation::Trilinear);
    let slice = ds.get_slice(&request).unwrap();
    for y in 0..3 {
        for x in 0..4 {
            assert_eq!(
                slice.get_value(Voxel::new(x, y, 0, 0)),
                ds.get_value(Voxel::new(x, y, 0, 1))
            );
        }
    }
}

#[test]
fn zero_grid_slices_to_zero() {
    let ds = DataSet::import(
        "zeros",
        RawData::from_array(Array4::<u8>::zeros((2, 4, 5, 6))),
        ScalingArray::per_frame(vec![3.0, 4.0]),
        TimeFrames::new(0.0, vec![1.0, 1.0]),
        &NoProgress,
    )
    .unwrap();
    for orientation in [Orientation::Axial, Orientation::Coronal, Orientation::Sagittal] {
        for interpolation in [Interpolation::NearestNeighbor, Interpolation::Trilinear] {
            let view = slicer::view_volume(&ds.volume(), orientation, None, 0.7);
            let request = SliceRequest::new(view, 0.6)
                .with_time(0.5, 1.0)
                .with_interpolation(interpolation)
                .with_max_min(true);
            let slice = ds.get_slice(&request).unwrap();
            assert_eq!(slice.statistics().global_max(), 0.0);
            assert_eq!(slice.statistics().global_min(), 0.0);
        }
    }
}

#[test]
fn interpolated_thresholds_with_one_reference_frame() {
    let mut ds = dynamic();
    ds.set_thresholding(Thresholding::InterpolateFrames);
    ds.set_threshold_max(Reference::First, 12.0);
    ds.set_threshold_min(Reference::First, 2.0);
    ds.set_threshold_max(Reference::Second, 99.0);
    ds.set_threshold_ref_frame(Reference::First, 1);
    ds.set_threshold_ref_frame(Reference::Second, 1);
    for (start, duration) in [(0.0, 1.0), (5.0, 30.0), (60.0, 100.0)] {
        let bounds = ds.get_thresholding_max_min(None, start, duration).unwrap();
        assert_eq!((bounds.max, bounds.min), (12.0, 2.0));
    }
}
