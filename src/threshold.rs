//! Display-window bounds under the four thresholding policies.

use crate::enums::{Thresholding, TimeAggregation};
use crate::error::{Error, Result};
use crate::statistics::Statistics;
use crate::time_frames::TimeFrames;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Display bounds for mapping values onto a colour table.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bounds {
    pub max: f64,
    pub min: f64,
}

impl Bounds {
    pub fn new(max: f64, min: f64) -> Self {
        Self { max, min }
    }
}

/// One of the two stored reference thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Reference {
    First,
    Second,
}

impl Reference {
    #[inline]
    fn index(self) -> usize {
        match self {
            Reference::First => 0,
            Reference::Second => 1,
        }
    }
}

/// Stored reference thresholds and the active policy.
///
/// Setters return `true` if anything changed so that the owning data set
/// can emit a thresholding notification.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThresholdSettings {
    policy: Thresholding,
    max: [f64; 2],
    min: [f64; 2],
    ref_frame: [usize; 2],
}

impl ThresholdSettings {
    pub fn policy(&self) -> Thresholding {
        self.policy
    }

    pub fn max(&self, reference: Reference) -> f64 {
        self.max[reference.index()]
    }

    pub fn min(&self, reference: Reference) -> f64 {
        self.min[reference.index()]
    }

    pub fn ref_frame(&self, reference: Reference) -> usize {
        self.ref_frame[reference.index()]
    }

    pub fn set_policy(&mut self, policy: Thresholding) -> bool {
        replace(&mut self.policy, policy)
    }

    pub fn set_max(&mut self, reference: Reference, value: f64) -> bool {
        replace(&mut self.max[reference.index()], value)
    }

    pub fn set_min(&mut self, reference: Reference, value: f64) -> bool {
        replace(&mut self.min[reference.index()], value)
    }

    pub fn set_ref_frame(&mut self, reference: Reference, frame: usize) -> bool {
        replace(&mut self.ref_frame[reference.index()], frame)
    }

    /// Thresholds right after import: both references span
    /// `(global_max, max(global_min, 0))`, anchored on the first and last frame.
    pub fn initial(global_max: f64, global_min: f64, num_frames: usize) -> Self {
        let min = global_min.max(0.0);
        Self {
            policy: Thresholding::Global,
            max: [global_max; 2],
            min: [min; 2],
            ref_frame: [0, num_frames.saturating_sub(1)],
        }
    }

    /// Returns `true` if any value changed.
    pub(crate) fn rescale(&mut self, ratio: f64) -> bool {
        let before = *self;
        for value in self.max.iter_mut().chain(self.min.iter_mut()) {
            *value *= ratio;
        }
        before != *self
    }

    /// Compute `(max, min)` display bounds for a query.
    ///
    /// `stats`/`frames` belong to the thresholded data set. `slice` is only
    /// consulted by [`Thresholding::PerSlice`]; the time window only by
    /// [`Thresholding::PerFrame`] and [`Thresholding::InterpolateFrames`].
    pub fn bounds(
        &self,
        stats: &Statistics,
        frames: &TimeFrames,
        slice: Option<&Statistics>,
        start: f64,
        duration: f64,
    ) -> Result<Bounds> {
        match self.policy {
            Thresholding::Global => Ok(self.reference_bounds(0)),
            Thresholding::PerSlice => {
                let slice = slice.ok_or(Error::MissingSlice)?;
                if !slice.is_computed() {
                    return Err(Error::StatisticsNotComputed);
                }
                self.rescaled_to(stats, slice.global_max(), slice.global_min())
            }
            Thresholding::PerFrame => {
                let blend = TimeAggregation::WeightedBlend;
                let window_max = stats.get_max(frames, start, duration, blend)?;
                let window_min = stats.get_min(frames, start, duration, blend)?;
                self.rescaled_to(stats, window_max, window_min)
            }
            Thresholding::InterpolateFrames => Ok(self.interpolated(frames, start, duration)),
        }
    }

    fn reference_bounds(&self, index: usize) -> Bounds {
        Bounds::new(self.max[index], self.min[index])
    }

    /// First reference thresholds scaled by `(max - min) / global range`
    fn rescaled_to(&self, stats: &Statistics, max: f64, min: f64) -> Result<Bounds> {
        if !stats.is_computed() {
            return Err(Error::StatisticsNotComputed);
        }
        let range = stats.global_max() - stats.global_min();
        if range == 0.0 {
            return Ok(self.reference_bounds(0));
        }
        let scale = (max - min) / range;
        Ok(Bounds::new(self.max[0] * scale, self.min[0] * scale))
    }

    fn interpolated(&self, frames: &TimeFrames, start: f64, duration: f64) -> Bounds {
        let [first, second] = self.ref_frame;
        if first == second {
            return self.reference_bounds(0);
        }
        let (low, high) = (first.min(second), first.max(second));
        let middle = frames
            .frame_for_time(start + duration / 2.0)
            .clamp(low, high) as f64;
        let (first, second) = (first as f64, second as f64);
        let span = second - first;
        let lerp = |values: [f64; 2]| {
            ((second - middle) * values[0] + (middle - first) * values[1]) / span
        };
        Bounds::new(lerp(self.max), lerp(self.min))
    }
}

#[inline]
fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn stats() -> Statistics {
        let mut stats = Statistics::default();
        stats.set_frame_max_min(vec![10.0, 20.0, 40.0], vec![0.0, 0.0, 0.0]);
        stats.calc_global_max_min().unwrap();
        stats
    }

    fn frames() -> TimeFrames {
        TimeFrames::new(0.0, vec![10.0, 10.0, 10.0])
    }

    fn settings(policy: Thresholding) -> ThresholdSettings {
        let mut settings = ThresholdSettings::initial(40.0, -5.0, 3);
        settings.set_policy(policy);
        settings.set_max(Reference::First, 20.0);
        settings.set_min(Reference::First, 4.0);
        settings.set_max(Reference::Second, 40.0);
        settings.set_min(Reference::Second, 8.0);
        settings
    }

    #[test]
    fn initial_thresholds_span_the_data() {
        let settings = ThresholdSettings::initial(40.0, -5.0, 3);
        assert_eq!(settings.max(Reference::Second), 40.0);
        assert_eq!(settings.min(Reference::First), 0.0);
        assert_eq!(settings.ref_frame(Reference::Second), 2);
    }

    #[test]
    fn global_returns_first_reference() {
        let bounds = settings(Thresholding::Global)
            .bounds(&stats(), &frames(), None, 0.0, 1.0)
            .unwrap();
        assert_eq!(bounds, Bounds::new(20.0, 4.0));
    }

    #[test]
    fn per_frame_scales_by_window_range() {
        let bounds = settings(Thresholding::PerFrame)
            .bounds(&stats(), &frames(), None, 11.0, 2.0)
            .unwrap();
        // frame 1 spans 0..20 of a 0..40 global range
        assert_relative_eq!(bounds.max, 10.0);
        assert_relative_eq!(bounds.min, 2.0);
    }

    #[test]
    fn per_slice_uses_slice_extrema() {
        let mut slice = Statistics::default();
        slice.set_frame_max_min(vec![30.0], vec![10.0]);
        slice.calc_global_max_min().unwrap();

        let settings = settings(Thresholding::PerSlice);
        assert!(matches!(
            settings.bounds(&stats(), &frames(), None, 0.0, 1.0),
            Err(Error::MissingSlice)
        ));
        let bounds = settings
            .bounds(&stats(), &frames(), Some(&slice), 0.0, 1.0)
            .unwrap();
        assert_relative_eq!(bounds.max, 10.0);
        assert_relative_eq!(bounds.min, 2.0);
    }

    #[test]
    fn interpolation_between_reference_frames() {
        let settings = settings(Thresholding::InterpolateFrames);
        let middle = settings.bounds(&stats(), &frames(), None, 12.0, 6.0).unwrap();
        assert_relative_eq!(middle.max, 30.0);
        assert_relative_eq!(middle.min, 6.0);

        // before the first reference frame clamps onto it
        let mut late_start = settings;
        late_start.set_ref_frame(Reference::First, 1);
        let clamped = late_start.bounds(&stats(), &frames(), None, 0.0, 1.0).unwrap();
        assert_eq!(clamped, Bounds::new(20.0, 4.0));
    }

    #[test]
    fn interpolation_with_equal_reference_frames_is_first_reference() {
        let mut settings = settings(Thresholding::InterpolateFrames);
        settings.set_ref_frame(Reference::Second, 0);
        for (start, duration) in [(0.0, 1.0), (15.0, 3.0), (0.0, 30.0), (100.0, 5.0)] {
            let bounds = settings
                .bounds(&stats(), &frames(), None, start, duration)
                .unwrap();
            assert_eq!(bounds, Bounds::new(20.0, 4.0));
        }
    }

    #[test]
    fn setters_report_changes() {
        let mut settings = ThresholdSettings::default();
        assert!(!settings.set_policy(Thresholding::Global));
        assert!(settings.set_policy(Thresholding::PerFrame));
        assert!(settings.set_max(Reference::Second, 1.0));
        assert!(!settings.set_max(Reference::Second, 1.0));
    }
}
