//! Calibration of raw samples into physical values.
//!
//! The calibrated value of a voxel is
//! `raw_sample * internal_factor(t, z) * external_factor`. The product of the
//! two factors is cached in a "current" scaling array so that hot loops do a
//! single multiply per voxel.

use crate::enums::ScalingRank;
use crate::error::{Error, Result};
use crate::raw_data::VoxelDim;

use ndarray::Array2;

/// Calibration multipliers, stored `[t, z]`. A scalar array is `1 x 1`, a
/// per-frame array is `frames x 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalingArray {
    rank: ScalingRank,
    factors: Array2<f64>,
}

impl ScalingArray {
    pub fn scalar(factor: f64) -> Self {
        Self {
            rank: ScalingRank::Scalar,
            factors: Array2::from_elem((1, 1), factor),
        }
    }

    pub fn per_frame(factors: Vec<f64>) -> Self {
        let frames = factors.len();
        assert!(frames > 0, "per-frame scaling needs at least one factor");
        Self {
            rank: ScalingRank::PerFrame,
            factors: Array2::from_shape_fn((frames, 1), |(t, _)| factors[t]),
        }
    }

    /// Factors indexed `[t, z]`
    pub fn per_frame_plane(factors: Array2<f64>) -> Self {
        let (frames, planes) = factors.dim();
        assert!(
            frames > 0 && planes > 0,
            "per-plane scaling needs a non-empty array"
        );
        Self {
            rank: ScalingRank::PerFramePlane,
            factors,
        }
    }

    pub fn rank(&self) -> ScalingRank {
        self.rank
    }

    pub fn factors(&self) -> &Array2<f64> {
        &self.factors
    }

    #[inline(always)]
    pub fn factor(&self, t: usize, z: usize) -> f64 {
        match self.rank {
            ScalingRank::Scalar => self.factors[[0, 0]],
            ScalingRank::PerFrame => self.factors[[t, 0]],
            ScalingRank::PerFramePlane => self.factors[[t, z]],
        }
    }

    fn scaled(&self, by: f64) -> Self {
        Self {
            rank: self.rank,
            factors: self.factors.mapv(|f| f * by),
        }
    }

    /// # Panics
    ///
    /// Panics if the array does not mirror `dim` at its rank's granularity.
    fn assert_matches(&self, dim: &VoxelDim) {
        let (frames, planes) = self.factors.dim();
        match self.rank {
            ScalingRank::Scalar => assert!(frames == 1 && planes == 1),
            ScalingRank::PerFrame => assert_eq!(
                (frames, planes),
                (dim.t, 1),
                "per-frame scaling must have one factor per frame"
            ),
            ScalingRank::PerFramePlane => assert_eq!(
                (frames, planes),
                (dim.t, dim.z),
                "per-plane scaling must have one factor per (frame, z) pair"
            ),
        }
    }
}

/// Internal calibration plus the runtime adjustable external factor.
#[derive(Clone, Debug)]
pub struct ScalingModel {
    internal: ScalingArray,
    current: ScalingArray,
    external_factor: f64,
}

impl ScalingModel {
    /// Build the model for a grid of `dim` with an external factor of 1.
    ///
    /// # Panics
    ///
    /// Panics if `internal` does not match `dim`.
    pub fn new(internal: ScalingArray, dim: &VoxelDim) -> Self {
        internal.assert_matches(dim);
        Self {
            current: internal.clone(),
            internal,
            external_factor: 1.0,
        }
    }

    pub fn internal(&self) -> &ScalingArray {
        &self.internal
    }

    /// Internal factors premultiplied by the external factor
    pub fn current(&self) -> &ScalingArray {
        &self.current
    }

    pub fn external_factor(&self) -> f64 {
        self.external_factor
    }

    pub fn rank(&self) -> ScalingRank {
        self.internal.rank
    }

    /// Total multiplier applied to raw samples of plane `z` in frame `t`
    #[inline(always)]
    pub fn factor(&self, t: usize, z: usize) -> f64 {
        self.current.factor(t, z)
    }

    /// Swap in a new external factor and rebuild the cached scaling.
    ///
    /// Returns the ratio `new / old` that downstream cached quantities have to
    /// be multiplied by, or `None` when the factor did not change.
    pub(crate) fn set_external_factor(&mut self, factor: f64) -> Result<Option<f64>> {
        if !(factor > 0.0) {
            return Err(Error::InvalidScaleFactor(factor));
        }
        if factor == self.external_factor {
            return Ok(None);
        }
        let ratio = factor / self.external_factor;
        self.external_factor = factor;
        self.current = self.internal.scaled(factor);
        Ok(Some(ratio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn factor_indexing_follows_rank() {
        let scalar = ScalingArray::scalar(2.0);
        assert_eq!(scalar.factor(3, 7), 2.0);

        let per_frame = ScalingArray::per_frame(vec![1.0, 3.0]);
        assert_eq!(per_frame.factor(1, 5), 3.0);

        let per_plane = ScalingArray::per_frame_plane(array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(per_plane.factor(1, 0), 3.0);
        assert_eq!(per_plane.factor(0, 1), 2.0);
    }

    #[test]
    fn external_factor_multiplies_current_scaling() {
        let dim = VoxelDim::new(2, 2, 2, 2);
        let mut model = ScalingModel::new(
            ScalingArray::per_frame_plane(array![[1.0, 2.0], [3.0, 4.0]]),
            &dim,
        );
        let ratio = model.set_external_factor(2.5).unwrap();
        assert_eq!(ratio, Some(2.5));
        assert_relative_eq!(model.factor(1, 1), 10.0);
        assert_relative_eq!(model.internal().factor(1, 1), 4.0);

        let ratio = model.set_external_factor(5.0).unwrap();
        assert_relative_eq!(ratio.unwrap(), 2.0);
        assert_eq!(model.set_external_factor(5.0).unwrap(), None);
    }

    #[test]
    fn non_positive_factor_is_rejected() {
        let mut model = ScalingModel::new(ScalingArray::scalar(1.0), &VoxelDim::new(1, 1, 1, 1));
        assert!(matches!(
            model.set_external_factor(0.0),
            Err(Error::InvalidScaleFactor(_))
        ));
        assert!(model.set_external_factor(-1.0).is_err());
        assert!(model.set_external_factor(f64::NAN).is_err());
        assert_eq!(model.external_factor(), 1.0);
    }

    #[test]
    #[should_panic]
    fn mismatched_rank_fails_fast() {
        let _ = ScalingModel::new(
            ScalingArray::per_frame(vec![1.0, 2.0, 3.0]),
            &VoxelDim::new(4, 4, 4, 2),
        );
    }
}
