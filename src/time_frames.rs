//! Acquisition timing: frame durations and the mapping between time and frame.
//!
//! Frames are half-open intervals `[start, end)`, except the final frame which
//! also owns its end instant. Every time therefore maps to exactly one frame.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Smallest frame duration kept after import, in seconds.
pub const EPSILON: f64 = 1e-5;

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(from = "TimingRecord", into = "TimingRecord")
)]
pub struct TimeFrames {
    scan_start: f64,
    durations: Vec<f64>,
    /// cumulative start time of every frame, recomputed on mutation
    starts: Vec<f64>,
}

/// Persisted form of [`TimeFrames`]; start times are derived on load.
#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct TimingRecord {
    scan_start: f64,
    durations: Vec<f64>,
}

#[cfg(feature = "serde")]
impl From<TimingRecord> for TimeFrames {
    fn from(record: TimingRecord) -> Self {
        Self::new(record.scan_start, record.durations)
    }
}

#[cfg(feature = "serde")]
impl From<TimeFrames> for TimingRecord {
    fn from(frames: TimeFrames) -> Self {
        Self {
            scan_start: frames.scan_start,
            durations: frames.durations,
        }
    }
}

/// Frames overlapped by a time window, with the window clipped to them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameWindow {
    pub start_frame: usize,
    pub end_frame: usize,
    pub used_start: f64,
    pub used_end: f64,
}

impl TimeFrames {
    /// # Panics
    ///
    /// Panics if `durations` is empty.
    pub fn new(scan_start: f64, durations: Vec<f64>) -> Self {
        assert!(!durations.is_empty(), "a data set has at least one frame");
        let mut frames = Self {
            scan_start,
            durations,
            starts: Vec::new(),
        };
        frames.update_starts();
        frames
    }

    /// A single frame starting at zero
    pub fn single(duration: f64) -> Self {
        Self::new(0.0, vec![duration])
    }

    fn update_starts(&mut self) {
        self.starts.clear();
        let mut time = self.scan_start;
        for duration in &self.durations {
            self.starts.push(time);
            time += duration;
        }
    }

    pub fn num_frames(&self) -> usize {
        self.durations.len()
    }

    pub fn scan_start(&self) -> f64 {
        self.scan_start
    }

    pub fn durations(&self) -> &[f64] {
        &self.durations
    }

    #[inline]
    fn clamp(&self, frame: usize) -> usize {
        frame.min(self.durations.len() - 1)
    }

    /// Returns `true` if the start time changed.
    pub fn set_scan_start(&mut self, start: f64) -> bool {
        if self.scan_start == start {
            return false;
        }
        self.scan_start = start;
        self.update_starts();
        true
    }

    /// Returns `true` if the duration changed.
    ///
    /// # Panics
    ///
    /// Panics if `frame` is out of range.
    pub fn set_frame_duration(&mut self, frame: usize, duration: f64) -> bool {
        assert!(frame < self.durations.len(), "frame {frame} out of range");
        if self.durations[frame] == duration {
            return false;
        }
        self.durations[frame] = duration;
        self.update_starts();
        true
    }

    /// Raise every duration shorter than [`EPSILON`] to it.
    pub fn enforce_min_duration(&mut self) {
        let mut changed = false;
        for duration in &mut self.durations {
            if *duration < EPSILON {
                *duration = EPSILON;
                changed = true;
            }
        }
        if changed {
            self.update_starts();
        }
    }

    /// Duration of `frame`, clamped to the last frame
    pub fn frame_duration(&self, frame: usize) -> f64 {
        self.durations[self.clamp(frame)]
    }

    /// Start of `frame`, clamped to the last frame
    pub fn start_time(&self, frame: usize) -> f64 {
        self.starts[self.clamp(frame)]
    }

    /// End of `frame`, clamped to the last frame
    pub fn end_time(&self, frame: usize) -> f64 {
        let frame = self.clamp(frame);
        self.starts[frame] + self.durations[frame]
    }

    pub fn min_frame_duration(&self) -> f64 {
        self.durations.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Frame holding `time`. Times before the scan, and NaN, give frame 0.
    pub fn frame_for_time(&self, time: f64) -> usize {
        if !(time > self.starts[0]) {
            return 0;
        }
        // last frame that starts at or before `time`
        let frame = self.starts.partition_point(|&start| start <= time) - 1;
        if time < self.end_time(frame) {
            frame
        } else {
            // past the end, or inside a zero-length frame at the very end
            self.durations.len() - 1
        }
    }

    /// Frame holding the closing instant of a window: an end that falls
    /// exactly on a frame start belongs to the frame before it.
    fn frame_for_end_time(&self, time: f64) -> usize {
        let frame = self.frame_for_time(time);
        if frame > 0 && time <= self.starts[frame] {
            frame - 1
        } else {
            frame
        }
    }

    /// Frames overlapped by `[start, start + duration]`. A negative or NaN
    /// duration is an instant at `start`.
    pub fn window(&self, start: f64, duration: f64) -> FrameWindow {
        let duration = if duration > 0.0 { duration } else { 0.0 };
        let start_frame = self.frame_for_time(start);
        let end = start + duration;
        let end_frame = if duration > 0.0 {
            self.frame_for_end_time(end).max(start_frame)
        } else {
            start_frame
        };
        FrameWindow {
            start_frame,
            end_frame,
            used_start: start.max(self.start_time(start_frame)),
            used_end: end.min(self.end_time(end_frame)),
        }
    }

    /// Contribution of each frame overlapped by `[start, start + duration]`.
    ///
    /// A window inside one frame yields that frame with weight 1. Otherwise the
    /// boundary frames are weighted by the fraction of the clipped window they
    /// cover and interior frames by `duration / window_length`.
    pub fn window_weights(&self, start: f64, duration: f64) -> Vec<(usize, f64)> {
        let window = self.window(start, duration);
        if window.start_frame == window.end_frame {
            return vec![(window.start_frame, 1.0)];
        }
        let length = window.used_end - window.used_start;
        (window.start_frame..=window.end_frame)
            .map(|frame| {
                let weight = if frame == window.start_frame {
                    (self.end_time(frame) - window.used_start) / length
                } else if frame == window.end_frame {
                    (window.used_end - self.start_time(frame)) / length
                } else {
                    self.durations[frame] / length
                };
                (frame, weight)
            })
            .collect()
    }
}
