use crate::raw_data::{EMPTY, Sample, VoxelDim};
use crate::scaling::ScalingModel;

use glam::DVec3;
use ndarray::Array4;

/// Reads calibrated values out of one frame of a typed sample grid.
///
/// Positions are continuous voxel coordinates: voxel `i` covers `[i, i + 1)`
/// along each axis, so its centre sits at `i + 0.5`.
pub(crate) struct Sampler<'a, S> {
    samples: &'a Array4<S>,
    scaling: &'a ScalingModel,
    dim: VoxelDim,
    t: usize,
}

impl<'a, S: Sample> Sampler<'a, S> {
    pub(crate) fn new(samples: &'a Array4<S>, scaling: &'a ScalingModel, t: usize) -> Self {
        let (frames, z, y, x) = samples.dim();
        debug_assert!(t < frames);
        Self {
            samples,
            scaling,
            dim: VoxelDim::new(x, y, z, frames),
            t,
        }
    }

    /// Calibrated value of one voxel, [`EMPTY`] off the grid
    #[inline(always)]
    pub(crate) fn calibrated(&self, x: isize, y: isize, z: isize) -> f64 {
        if x < 0
            || y < 0
            || z < 0
            || x as usize >= self.dim.x
            || y as usize >= self.dim.y
            || z as usize >= self.dim.z
        {
            return EMPTY;
        }
        let (x, y, z) = (x as usize, y as usize, z as usize);
        self.samples[[self.t, z, y, x]].to_f64() * self.scaling.factor(self.t, z)
    }

    /// Value of the voxel containing `q`
    #[inline]
    pub(crate) fn nearest(&self, q: DVec3) -> f64 {
        let cell = q.floor();
        self.calibrated(cell.x as isize, cell.y as isize, cell.z as isize)
    }

    /// Trilinear blend of the eight voxel centres around `q`.
    ///
    /// Neighbours off the grid count as zero but keep their weight, so values
    /// fade towards the border instead of being renormalised. A grid with a
    /// single plane is blended in-plane only.
    #[inline]
    pub(crate) fn trilinear(&self, q: DVec3) -> f64 {
        let c = q - DVec3::splat(0.5);
        let base = c.floor();
        let d = c - base;
        let (x0, y0, z0) = (base.x as isize, base.y as isize, base.z as isize);

        if self.dim.z == 1 {
            let z = q.z.floor() as isize;
            if z != 0 {
                return EMPTY;
            }
            return self.bilinear(x0, y0, 0, d.x, d.y);
        }

        let v0 = self.bilinear(x0, y0, z0, d.x, d.y);
        let v1 = self.bilinear(x0, y0, z0 + 1, d.x, d.y);
        v0.mul_add(1.0 - d.z, v1 * d.z)
    }

    #[inline(always)]
    fn bilinear(&self, x0: isize, y0: isize, z: isize, dx: f64, dy: f64) -> f64 {
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let v00 = self.calibrated(x0, y0, z);
        let v01 = self.calibrated(x0 + 1, y0, z);
        let v10 = self.calibrated(x0, y0 + 1, z);
        let v11 = self.calibrated(x0 + 1, y0 + 1, z);

        let v0 = v00.mul_add(one_minus_dx, v01 * dx);
        let v1 = v10.mul_add(one_minus_dx, v11 * dx);

        v0.mul_add(one_minus_dy, v1 * dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw_data::RawData;
    use crate::scaling::ScalingArray;
    use approx::assert_relative_eq;

    fn grid() -> (Array4<u16>, ScalingModel) {
        let samples =
            Array4::from_shape_fn((1, 2, 2, 2), |(_, z, y, x)| (z * 4 + y * 2 + x) as u16);
        let dim = RawData::from_array(samples.clone()).dim();
        (samples, ScalingModel::new(ScalingArray::scalar(2.0), &dim))
    }

    #[test]
    fn voxel_centres_reproduce_lookup() {
        let (samples, scaling) = grid();
        let sampler = Sampler::new(&samples, &scaling, 0);
        for (x, y, z) in [(0, 0, 0), (1, 0, 1), (1, 1, 1)] {
            let q = DVec3::new(x as f64 + 0.5, y as f64 + 0.5, z as f64 + 0.5);
            let expected = sampler.calibrated(x, y, z);
            assert_eq!(sampler.nearest(q), expected);
            assert_relative_eq!(sampler.trilinear(q), expected);
        }
    }

    #[test]
    fn midpoint_averages_the_cell() {
        let (samples, scaling) = grid();
        let sampler = Sampler::new(&samples, &scaling, 0);
        // mean of 0..8 doubled
        assert_relative_eq!(sampler.trilinear(DVec3::splat(1.0)), 7.0);
    }

    #[test]
    fn neighbours_off_the_grid_count_as_zero() {
        let (samples, scaling) = grid();
        let sampler = Sampler::new(&samples, &scaling, 0);
        assert_eq!(sampler.nearest(DVec3::new(-0.1, 0.5, 0.5)), EMPTY);
        // halfway between voxel (1, 1, 1) and the outside
        assert_relative_eq!(sampler.trilinear(DVec3::new(2.0, 1.5, 1.5)), 7.0);
    }

    #[test]
    fn single_plane_grid_blends_in_plane() {
        let samples = Array4::from_shape_fn((1, 1, 2, 2), |(_, _, y, x)| (y * 2 + x) as f32);
        let dim = RawData::from_array(samples.clone()).dim();
        let scaling = ScalingModel::new(ScalingArray::scalar(1.0), &dim);
        let sampler = Sampler::new(&samples, &scaling, 0);
        assert_relative_eq!(sampler.trilinear(DVec3::new(1.0, 1.0, 0.9)), 1.5);
        assert_eq!(sampler.trilinear(DVec3::new(1.0, 1.0, 1.2)), EMPTY);
    }
}
