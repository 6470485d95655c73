//! Oriented slice resampling.
//!
//! A slice is a single frame, single plane data set cut out of a source data
//! set along an arbitrary [`Volume`]. Each destination pixel centre is mapped
//! into the source grid, interpolated separately in every frame overlapped by
//! the time window, and the per-frame values are then blended by duration.

use std::time::Instant;

use crate::data_set::{self, DataSet};
use crate::enums::{Interpolation, Orientation};
use crate::error::Result;
use crate::interpolator::Sampler;
use crate::raw_data::{RawData, Sample, SampleVisitor};
use crate::scaling::ScalingModel;
use crate::space::{Space, Volume};

use glam::{DMat3, DVec3};
use ndarray::{Array2, Array4, Axis};
use rayon::prelude::*;

/// Guards `ceil` against dimensions that are an exact multiple of the pixel
const DIM_EPSILON: f64 = 1e-9;

/// What to cut and how.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SliceRequest {
    /// Slice plane (x/y) and thickness (z extent)
    pub volume: Volume,
    pub pixel_size: f64,
    pub start: f64,
    pub duration: f64,
    pub interpolation: Interpolation,
    /// Compute max/min of the resulting slice
    pub calc_max_min: bool,
}

impl SliceRequest {
    /// # Panics
    ///
    /// Panics if `pixel_size` is not positive.
    pub fn new(volume: Volume, pixel_size: f64) -> Self {
        assert!(pixel_size > 0.0, "pixel size must be positive");
        Self {
            volume,
            pixel_size,
            start: 0.0,
            duration: 1.0,
            interpolation: Interpolation::default(),
            calc_max_min: false,
        }
    }

    pub fn with_time(mut self, start: f64, duration: f64) -> Self {
        self.start = start;
        self.duration = duration;
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_max_min(mut self, calc_max_min: bool) -> Self {
        self.calc_max_min = calc_max_min;
        self
    }

    /// Destination pixels along x and y
    pub fn dims(&self) -> (usize, usize) {
        let pixels =
            |extent: f64| ((extent / self.pixel_size - DIM_EPSILON).ceil().max(1.0)) as usize;
        (pixels(self.volume.corner.x), pixels(self.volume.corner.y))
    }

    fn thickness(&self) -> f64 {
        if self.volume.corner.z > 0.0 {
            self.volume.corner.z
        } else {
            self.pixel_size
        }
    }
}

/// A slab through `volume` perpendicular to one of the canonical axes.
///
/// `depth` is measured along the viewing axis from the near side of the
/// volume and defaults to its middle.
pub fn view_volume(
    volume: &Volume,
    orientation: Orientation,
    depth: Option<f64>,
    thickness: f64,
) -> Volume {
    let mut space = Space::for_orientation(orientation, DVec3::ZERO);
    let [lo, hi] = volume.corners_in(&space);
    let center = lo.z + depth.unwrap_or((hi.z - lo.z) / 2.0);
    space.set_offset(space.s2b(DVec3::new(lo.x, lo.y, center - thickness / 2.0)));
    Volume::new(space, DVec3::new(hi.x - lo.x, hi.y - lo.y, thickness))
}

struct Resample<'a> {
    scaling: &'a ScalingModel,
    weights: &'a [(usize, f64)],
    /// slice local coordinates to source voxel coordinates, before the
    /// division by the source voxel size
    transform: (DMat3, DVec3),
    inverse_voxel_size: DVec3,
    pixel: DVec3,
    dims: (usize, usize),
    interpolation: Interpolation,
}

impl SampleVisitor for Resample<'_> {
    type Output = Array2<f64>;

    fn visit<S: Sample>(self, samples: &Array4<S>) -> Array2<f64> {
        let (nx, ny) = self.dims;
        let (m, t) = self.transform;
        let samplers: Vec<(Sampler<'_, S>, f64)> = self
            .weights
            .iter()
            .map(|&(frame, weight)| (Sampler::new(samples, self.scaling, frame), weight))
            .collect();
        // step between neighbouring pixels of one row, in source voxels
        let dx = m.x_axis * self.pixel.x * self.inverse_voxel_size;
        let interpolation = self.interpolation;

        let mut output = Array2::<f64>::zeros((ny, nx));
        output
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(j, mut row)| {
                let local = DVec3::new(
                    0.5 * self.pixel.x,
                    (j as f64 + 0.5) * self.pixel.y,
                    0.5 * self.pixel.z,
                );
                let q0 = (m * local + t) * self.inverse_voxel_size;
                for (i, value) in row.iter_mut().enumerate() {
                    let q = q0 + dx * i as f64;
                    *value = samplers
                        .iter()
                        .map(|(sampler, weight)| {
                            let v = match interpolation {
                                Interpolation::NearestNeighbor => sampler.nearest(q),
                                Interpolation::Trilinear => sampler.trilinear(q),
                            };
                            weight * v
                        })
                        .sum();
                }
            });
        output
    }
}

/// Cut one slice out of `data_set`.
pub fn get_slice(data_set: &DataSet, request: &SliceRequest) -> Result<DataSet> {
    let started = Instant::now();
    let dims = request.dims();
    let pixel = DVec3::new(request.pixel_size, request.pixel_size, request.thickness());
    let weights = data_set
        .frames()
        .window_weights(request.start, request.duration);

    let values = data_set.raw_data().visit(Resample {
        scaling: data_set.scaling(),
        weights: &weights,
        transform: request.volume.space.transform_to(data_set.space()),
        inverse_voxel_size: data_set.voxel_size().recip(),
        pixel,
        dims,
        interpolation: request.interpolation,
    });
    let raw_data = RawData::from_array(values.insert_axis(Axis(0)).insert_axis(Axis(0)));

    let slice = DataSet::from_slice(
        data_set,
        raw_data,
        request.volume.space,
        pixel,
        request.start,
        request.duration,
        request.calc_max_min,
    )?;
    log::debug!(
        "{}: {}x{} slice over {} frame(s) took {:?}",
        data_set.name(),
        dims.0,
        dims.1,
        weights.len(),
        started.elapsed()
    );
    Ok(slice)
}

/// Slice every data set into one common plane.
///
/// The plane keeps the orientation, depth and thickness of `view`; its in-plane
/// extent grows to enclose all data sets so that the slices line up pixel for
/// pixel.
pub fn get_slices(
    data_sets: &[&DataSet],
    view: &Volume,
    request: &SliceRequest,
) -> Result<Vec<DataSet>> {
    data_set::check_not_empty(data_sets)?;
    let volumes: Vec<Volume> = data_sets.iter().map(|ds| ds.volume()).collect();
    let [lo, hi] = Volume::enclosing_corners(&volumes, &view.space)
        .unwrap_or([DVec3::ZERO, view.corner]);

    let mut space = view.space;
    space.set_offset(view.space.s2b(DVec3::new(lo.x, lo.y, 0.0)));
    let corner = DVec3::new((hi.x - lo.x).max(0.0), (hi.y - lo.y).max(0.0), view.corner.z);
    let common = SliceRequest {
        volume: Volume::new(space, corner),
        ..*request
    };

    data_sets.iter().map(|ds| get_slice(ds, &common)).collect()
}
