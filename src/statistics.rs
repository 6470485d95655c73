//! Per-frame and global value extrema plus the value distribution.
//!
//! The scans here are the O(voxels) passes over a grid. They run in parallel
//! over z-planes, poll a [`Progress`] between planes, and hand back fresh
//! results that the caller commits only once the whole pass has finished.

use crate::enums::TimeAggregation;
use crate::error::{Error, Result};
use crate::progress::Progress;
use crate::raw_data::{RawData, Sample, SampleVisitor};
use crate::scaling::ScalingModel;
use crate::time_frames::TimeFrames;

use ndarray::{Array4, ArrayView2, s};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of bins in a value distribution unless configured otherwise.
pub const DEFAULT_DISTRIBUTION_BINS: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DistributionConfig {
    pub bins: usize,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            bins: DEFAULT_DISTRIBUTION_BINS,
        }
    }
}

/// Histogram of calibrated values over `[min, max]`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Distribution {
    counts: Vec<u64>,
    min: f64,
    max: f64,
}

impl Distribution {
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Lower edge of `bin`
    pub fn bin_start(&self, bin: usize) -> f64 {
        self.min + (self.max - self.min) * bin as f64 / self.counts.len() as f64
    }

    #[inline]
    fn bin_for(value: f64, min: f64, max: f64, bins: usize) -> usize {
        let range = max - min;
        if !(range > 0.0) {
            return 0;
        }
        let bin = ((value - min) / range * bins as f64).floor();
        if bin <= 0.0 {
            0
        } else {
            (bin as usize).min(bins - 1)
        }
    }

    /// `ln(1 + count)` per bin, normalised to a peak of 1, for display
    pub fn log_scaled(&self) -> Vec<f64> {
        let logs: Vec<f64> = self.counts.iter().map(|&c| (c as f64).ln_1p()).collect();
        let peak = logs.iter().copied().fold(0.0, f64::max);
        if peak > 0.0 {
            logs.into_iter().map(|l| l / peak).collect()
        } else {
            logs
        }
    }

    fn rescale(&mut self, ratio: f64) {
        self.min *= ratio;
        self.max *= ratio;
    }
}

/// Cached value statistics of a data set.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Statistics {
    frame_max: Vec<f64>,
    frame_min: Vec<f64>,
    global_max: f64,
    global_min: f64,
    distribution: Option<Distribution>,
}

impl Statistics {
    /// Whether frame max/min have been calculated
    pub fn is_computed(&self) -> bool {
        !self.frame_max.is_empty()
    }

    pub fn frame_max(&self) -> &[f64] {
        &self.frame_max
    }

    pub fn frame_min(&self) -> &[f64] {
        &self.frame_min
    }

    pub fn global_max(&self) -> f64 {
        self.global_max
    }

    pub fn global_min(&self) -> f64 {
        self.global_min
    }

    pub fn distribution(&self) -> Option<&Distribution> {
        self.distribution.as_ref()
    }

    pub(crate) fn set_frame_max_min(&mut self, frame_max: Vec<f64>, frame_min: Vec<f64>) {
        debug_assert_eq!(frame_max.len(), frame_min.len());
        self.frame_max = frame_max;
        self.frame_min = frame_min;
    }

    pub(crate) fn set_distribution(&mut self, distribution: Distribution) {
        self.distribution = Some(distribution);
    }

    /// Envelope over the frame extrema.
    pub fn calc_global_max_min(&mut self) -> Result<()> {
        if !self.is_computed() {
            return Err(Error::StatisticsNotComputed);
        }
        self.global_max = self.frame_max.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        self.global_min = self.frame_min.iter().copied().fold(f64::INFINITY, f64::min);
        log::debug!(
            "global max {:.3} global min {:.3}",
            self.global_max,
            self.global_min
        );
        Ok(())
    }

    /// Keep every cached quantity consistent with a change of the external
    /// scale factor, without rescanning the samples.
    pub(crate) fn rescale(&mut self, ratio: f64) {
        self.global_max *= ratio;
        self.global_min *= ratio;
        for value in self.frame_max.iter_mut().chain(self.frame_min.iter_mut()) {
            *value *= ratio;
        }
        if let Some(distribution) = &mut self.distribution {
            distribution.rescale(ratio);
        }
    }

    /// Maximum over the time window `[start, start + duration]`.
    ///
    /// With [`TimeAggregation::WeightedBlend`] a window spanning several frames
    /// yields the duration weighted blend of the frame maxima, not the true
    /// windowed maximum.
    pub fn get_max(
        &self,
        frames: &TimeFrames,
        start: f64,
        duration: f64,
        aggregation: TimeAggregation,
    ) -> Result<f64> {
        self.windowed(&self.frame_max, frames, start, duration, aggregation, f64::max)
    }

    /// Minimum over the time window, see [`Statistics::get_max`].
    pub fn get_min(
        &self,
        frames: &TimeFrames,
        start: f64,
        duration: f64,
        aggregation: TimeAggregation,
    ) -> Result<f64> {
        self.windowed(&self.frame_min, frames, start, duration, aggregation, f64::min)
    }

    fn windowed(
        &self,
        per_frame: &[f64],
        frames: &TimeFrames,
        start: f64,
        duration: f64,
        aggregation: TimeAggregation,
        pick: fn(f64, f64) -> f64,
    ) -> Result<f64> {
        if !self.is_computed() {
            return Err(Error::StatisticsNotComputed);
        }
        let weights = frames.window_weights(start, duration);
        if let [(frame, _)] = weights.as_slice() {
            return Ok(per_frame[*frame]);
        }
        let value = match aggregation {
            TimeAggregation::WeightedBlend => weights
                .iter()
                .map(|&(frame, weight)| weight * per_frame[frame])
                .sum::<f64>(),
            TimeAggregation::Envelope => weights
                .iter()
                .map(|&(frame, _)| per_frame[frame])
                .reduce(pick)
                .unwrap_or_default(),
        };
        Ok(value)
    }
}

#[inline]
fn plane_extrema<S: Sample>(plane: ArrayView2<'_, S>, factor: f64) -> (f64, f64) {
    let (lo, hi) = plane.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
        let v = v.to_f64();
        (lo.min(v), hi.max(v))
    });
    // a negative factor swaps the ends
    let (a, b) = (lo * factor, hi * factor);
    (a.min(b), a.max(b))
}

struct FrameMaxMin<'a> {
    scaling: &'a ScalingModel,
    progress: &'a dyn Progress,
}

impl SampleVisitor for FrameMaxMin<'_> {
    type Output = Result<(Vec<f64>, Vec<f64>)>;

    fn visit<S: Sample>(self, samples: &Array4<S>) -> Self::Output {
        let (frames, planes, _, _) = samples.dim();
        let mut frame_max = Vec::with_capacity(frames);
        let mut frame_min = Vec::with_capacity(frames);
        let total = (frames * planes) as f32;

        for t in 0..frames {
            let extrema = (0..planes)
                .into_par_iter()
                .map(|z| {
                    let fraction = (t * planes + z) as f32 / total;
                    if !self.progress.update("calculating max/min", fraction) {
                        return None;
                    }
                    let plane = samples.slice(s![t, z, .., ..]);
                    Some(plane_extrema(plane, self.scaling.factor(t, z)))
                })
                .try_reduce(
                    || (f64::INFINITY, f64::NEG_INFINITY),
                    |a, b| Some((a.0.min(b.0), a.1.max(b.1))),
                );
            let (min, max) = extrema.ok_or(Error::Cancelled)?;
            frame_min.push(min);
            frame_max.push(max);
        }
        self.progress.update("calculating max/min", 1.0);
        Ok((frame_max, frame_min))
    }
}

/// Calibrated max and min of every frame.
pub fn scan_frame_max_min(
    raw_data: &RawData,
    scaling: &ScalingModel,
    progress: &dyn Progress,
) -> Result<(Vec<f64>, Vec<f64>)> {
    raw_data.visit(FrameMaxMin { scaling, progress })
}

struct Histogram<'a> {
    scaling: &'a ScalingModel,
    progress: &'a dyn Progress,
    min: f64,
    max: f64,
    bins: usize,
}

impl SampleVisitor for Histogram<'_> {
    type Output = Result<Vec<u64>>;

    fn visit<S: Sample>(self, samples: &Array4<S>) -> Self::Output {
        let (frames, planes, _, _) = samples.dim();
        let total = frames * planes;
        let Histogram {
            scaling,
            progress,
            min,
            max,
            bins,
        } = self;

        (0..total)
            .into_par_iter()
            .map(|index| {
                if !progress.update("calculating distribution", index as f32 / total as f32) {
                    return None;
                }
                let (t, z) = (index / planes, index % planes);
                let factor = scaling.factor(t, z);
                let mut counts = vec![0u64; bins];
                for &v in samples.slice(s![t, z, .., ..]).iter() {
                    counts[Distribution::bin_for(v.to_f64() * factor, min, max, bins)] += 1;
                }
                Some(counts)
            })
            .try_reduce(
                || vec![0u64; bins],
                |mut a, b| {
                    a.iter_mut().zip(b).for_each(|(x, y)| *x += y);
                    Some(a)
                },
            )
            .ok_or(Error::Cancelled)
    }
}

/// Histogram of every calibrated voxel value over `[min, max]`.
pub fn scan_distribution(
    raw_data: &RawData,
    scaling: &ScalingModel,
    min: f64,
    max: f64,
    config: DistributionConfig,
    progress: &dyn Progress,
) -> Result<Distribution> {
    let bins = config.bins.max(1);
    let counts = raw_data.visit(Histogram {
        scaling,
        progress,
        min,
        max,
        bins,
    })?;
    Ok(Distribution { counts, min, max })
}
