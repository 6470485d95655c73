//! The data set: a shared voxel grid plus everything needed to turn it into
//! calibrated, time resolved, displayable values.

use std::fmt;
use std::sync::Arc;

use crate::enums::{ColorTable, IsocontourKind, Modality, Thresholding, TimeAggregation};
use crate::error::{Error, Result};
use crate::events::{DataSetEvent, DataSetId, DataSetObserver, Observers, Subscription};
use crate::isocontour::{self, IsocontourRoi};
use crate::progress::{NoProgress, Progress};
use crate::raw_data::{EMPTY, RawData, Voxel, VoxelDim};
use crate::scaling::{ScalingArray, ScalingModel};
use crate::slicer::{self, SliceRequest};
use crate::space::{Space, Volume};
use crate::statistics::{self, DistributionConfig, Statistics};
use crate::threshold::{Bounds, Reference, ThresholdSettings};
use crate::time_frames::TimeFrames;

use glam::DVec3;

pub struct DataSet {
    id: DataSetId,
    name: String,
    raw_data: Arc<RawData>,
    scaling: ScalingModel,
    frames: TimeFrames,
    statistics: Statistics,
    thresholds: ThresholdSettings,
    space: Space,
    voxel_size: DVec3,
    corner: DVec3,
    modality: Modality,
    color_table: ColorTable,
    scan_date: String,
    slice_parent: Option<DataSetId>,
    observers: Observers,
}

impl fmt::Debug for DataSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSet")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.raw_data.kind())
            .field("dim", &self.dim())
            .field("voxel_size", &self.voxel_size)
            .field("modality", &self.modality)
            .finish_non_exhaustive()
    }
}

impl DataSet {
    /// Wrap an imported grid with unit voxels in the base space.
    ///
    /// Statistics are not computed; see [`DataSet::import`].
    ///
    /// # Panics
    ///
    /// Panics if `frames` or `internal_scaling` do not match the grid.
    pub fn new(
        name: impl Into<String>,
        raw_data: impl Into<Arc<RawData>>,
        internal_scaling: ScalingArray,
        frames: TimeFrames,
    ) -> Self {
        let raw_data = raw_data.into();
        let dim = raw_data.dim();
        assert_eq!(
            frames.num_frames(),
            dim.t,
            "one frame duration is needed per frame"
        );
        let scaling = ScalingModel::new(internal_scaling, &dim);
        let voxel_size = DVec3::ONE;
        Self {
            id: DataSetId::next(),
            name: name.into(),
            raw_data,
            scaling,
            frames,
            statistics: Statistics::default(),
            thresholds: ThresholdSettings::default(),
            space: Space::default(),
            voxel_size,
            corner: corner_for(&dim, voxel_size),
            modality: Modality::default(),
            color_table: ColorTable::default(),
            scan_date: String::from("unknown"),
            slice_parent: None,
            observers: Observers::default(),
        }
    }

    /// Finish an import: clamp short frames, scan max/min and seed the
    /// thresholds from the data.
    pub fn import(
        name: impl Into<String>,
        raw_data: impl Into<Arc<RawData>>,
        internal_scaling: ScalingArray,
        mut frames: TimeFrames,
        progress: &dyn Progress,
    ) -> Result<Self> {
        frames.enforce_min_duration();
        let mut data_set = Self::new(name, raw_data, internal_scaling, frames);
        data_set.calc_max_min(progress)?;
        data_set.thresholds = ThresholdSettings::initial(
            data_set.statistics.global_max(),
            data_set.statistics.global_min(),
            data_set.frames.num_frames(),
        );
        log::info!(
            "imported {} ({}, {:?}) range [{:.3}, {:.3}]",
            data_set.name,
            data_set.raw_data.kind().name(),
            data_set.dim(),
            data_set.statistics.global_min(),
            data_set.statistics.global_max()
        );
        Ok(data_set)
    }

    /// # Panics
    ///
    /// Panics if any component is not positive.
    pub fn with_voxel_size(mut self, voxel_size: DVec3) -> Self {
        self.set_voxel_size(voxel_size);
        self
    }

    pub fn with_space(mut self, space: Space) -> Self {
        self.space = space;
        self
    }

    pub fn with_modality(mut self, modality: Modality) -> Self {
        self.modality = modality;
        self
    }

    fn emit(&self, event: DataSetEvent) {
        self.observers.emit(self.id, event);
    }

    fn emit_changed(&self, event: DataSetEvent) {
        self.emit(event);
        self.emit(DataSetEvent::DataSetChanged);
    }

    pub fn subscribe(&mut self, observer: Arc<dyn DataSetObserver>) -> Subscription {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.observers.unsubscribe(subscription)
    }

    pub fn id(&self) -> DataSetId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.name != name {
            self.name = name;
            self.emit(DataSetEvent::DataSetChanged);
        }
    }

    pub fn raw_data(&self) -> &Arc<RawData> {
        &self.raw_data
    }

    pub fn dim(&self) -> VoxelDim {
        self.raw_data.dim()
    }

    pub fn scaling(&self) -> &ScalingModel {
        &self.scaling
    }

    pub fn frames(&self) -> &TimeFrames {
        &self.frames
    }

    pub fn num_frames(&self) -> usize {
        self.frames.num_frames()
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn thresholds(&self) -> &ThresholdSettings {
        &self.thresholds
    }

    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn set_space(&mut self, space: Space) {
        if self.space != space {
            self.space = space;
            self.emit(DataSetEvent::DataSetChanged);
        }
    }

    pub fn voxel_size(&self) -> DVec3 {
        self.voxel_size
    }

    /// Far corner of the grid in this data set's space
    pub fn corner(&self) -> DVec3 {
        self.corner
    }

    pub fn volume(&self) -> Volume {
        Volume::new(self.space, self.corner)
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn color_table(&self) -> ColorTable {
        self.color_table
    }

    pub fn scan_date(&self) -> &str {
        &self.scan_date
    }

    /// Id of the data set this one was sliced from
    pub fn slice_parent(&self) -> Option<DataSetId> {
        self.slice_parent
    }

    /// Calibrated value of `voxel`, [`EMPTY`] outside of the grid.
    pub fn get_value(&self, voxel: Voxel) -> f64 {
        match self.raw_data.raw_value(voxel) {
            Some(raw) => raw * self.scaling.factor(voxel.t as usize, voxel.z as usize),
            None => EMPTY,
        }
    }

    /// Change the external scale factor.
    ///
    /// Thresholds and statistics are rescaled by `new / old` instead of being
    /// recomputed from the samples.
    pub fn set_scale_factor(&mut self, factor: f64) -> Result<()> {
        let ratio = match self.scaling.set_external_factor(factor) {
            Ok(Some(ratio)) => ratio,
            Ok(None) => return Ok(()),
            Err(e) => {
                log::warn!("{}: {e}", self.name);
                return Err(e);
            }
        };
        if self.thresholds.rescale(ratio) {
            self.emit(DataSetEvent::ThresholdingChanged);
        }
        self.statistics.rescale(ratio);
        self.emit_changed(DataSetEvent::ScaleFactorChanged);
        Ok(())
    }

    pub fn scale_factor(&self) -> f64 {
        self.scaling.external_factor()
    }

    pub fn set_modality(&mut self, modality: Modality) {
        if self.modality != modality {
            self.modality = modality;
            self.emit_changed(DataSetEvent::ModalityChanged);
        }
    }

    pub fn set_scan_start(&mut self, start: f64) {
        if self.frames.set_scan_start(start) {
            self.emit_changed(DataSetEvent::TimeChanged);
        }
    }

    /// # Panics
    ///
    /// Panics if `frame` is out of range.
    pub fn set_frame_duration(&mut self, frame: usize, duration: f64) {
        if self.frames.set_frame_duration(frame, duration) {
            self.emit_changed(DataSetEvent::TimeChanged);
        }
    }

    /// Also moves the far corner.
    ///
    /// # Panics
    ///
    /// Panics if any component is not positive.
    pub fn set_voxel_size(&mut self, voxel_size: DVec3) {
        assert!(
            voxel_size.cmpgt(DVec3::ZERO).all(),
            "voxel size must be positive, got {voxel_size}"
        );
        if self.voxel_size != voxel_size {
            self.voxel_size = voxel_size;
            self.corner = corner_for(&self.dim(), voxel_size);
            self.emit_changed(DataSetEvent::VoxelSizeChanged);
        }
    }

    pub fn set_color_table(&mut self, color_table: ColorTable) {
        if self.color_table != color_table {
            self.color_table = color_table;
            self.emit(DataSetEvent::ColorTableChanged);
        }
    }

    /// Newlines become spaces, surrounding blanks are trimmed and an empty
    /// date is stored as `unknown`.
    pub fn set_scan_date(&mut self, date: &str) {
        let cleaned = date.replace(['\n', '\r'], " ");
        let cleaned = match cleaned.trim() {
            "" => "unknown",
            trimmed => trimmed,
        };
        if self.scan_date != cleaned {
            self.scan_date = cleaned.to_owned();
            self.emit(DataSetEvent::DataSetChanged);
        }
    }

    pub fn set_thresholding(&mut self, policy: Thresholding) {
        if self.thresholds.set_policy(policy) {
            self.emit(DataSetEvent::ThresholdingChanged);
        }
    }

    pub fn set_threshold_max(&mut self, reference: Reference, value: f64) {
        if self.thresholds.set_max(reference, value) {
            self.emit(DataSetEvent::ThresholdingChanged);
        }
    }

    pub fn set_threshold_min(&mut self, reference: Reference, value: f64) {
        if self.thresholds.set_min(reference, value) {
            self.emit(DataSetEvent::ThresholdingChanged);
        }
    }

    pub fn set_threshold_ref_frame(&mut self, reference: Reference, frame: usize) {
        let frame = frame.min(self.num_frames() - 1);
        if self.thresholds.set_ref_frame(reference, frame) {
            self.emit(DataSetEvent::ThresholdingChanged);
        }
    }

    pub(crate) fn inherit_display_settings(&mut self, parent: &DataSet) {
        self.thresholds = parent.thresholds;
        self.color_table = parent.color_table;
        self.modality = parent.modality;
        self.slice_parent = Some(parent.id);
    }

    /// Rescan the per-frame extrema. On failure the previous statistics stay.
    pub fn calc_frame_max_min(&mut self, progress: &dyn Progress) -> Result<()> {
        let start = std::time::Instant::now();
        let (max, min) = statistics::scan_frame_max_min(&self.raw_data, &self.scaling, progress)?;
        self.statistics.set_frame_max_min(max, min);
        log::debug!("{}: frame max/min took {:?}", self.name, start.elapsed());
        Ok(())
    }

    pub fn calc_global_max_min(&mut self) -> Result<()> {
        self.statistics.calc_global_max_min()
    }

    /// Frame extrema followed by the global envelope.
    pub fn calc_max_min(&mut self, progress: &dyn Progress) -> Result<()> {
        let previous = self.statistics.clone();
        self.calc_frame_max_min(progress)?;
        if let Err(e) = self.calc_global_max_min() {
            self.statistics = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Histogram over `[global_min, global_max]`, scanning max/min first when
    /// needed. Nothing is committed if the scan is cancelled.
    pub fn calc_distribution(
        &mut self,
        config: DistributionConfig,
        progress: &dyn Progress,
    ) -> Result<()> {
        if !self.statistics.is_computed() {
            self.calc_max_min(progress)?;
        }
        let distribution = statistics::scan_distribution(
            &self.raw_data,
            &self.scaling,
            self.statistics.global_min(),
            self.statistics.global_max(),
            config,
            progress,
        )?;
        self.statistics.set_distribution(distribution);
        Ok(())
    }

    pub fn get_max(&self, start: f64, duration: f64) -> Result<f64> {
        self.statistics
            .get_max(&self.frames, start, duration, TimeAggregation::WeightedBlend)
    }

    pub fn get_min(&self, start: f64, duration: f64) -> Result<f64> {
        self.statistics
            .get_min(&self.frames, start, duration, TimeAggregation::WeightedBlend)
    }

    /// `(max, min)` over a time window with an explicit aggregation
    pub fn get_extrema(
        &self,
        start: f64,
        duration: f64,
        aggregation: TimeAggregation,
    ) -> Result<Bounds> {
        Ok(Bounds::new(
            self.statistics.get_max(&self.frames, start, duration, aggregation)?,
            self.statistics.get_min(&self.frames, start, duration, aggregation)?,
        ))
    }

    /// Display bounds under the current thresholding policy.
    ///
    /// `slice` is only needed for [`Thresholding::PerSlice`].
    pub fn get_thresholding_max_min(
        &self,
        slice: Option<&DataSet>,
        start: f64,
        duration: f64,
    ) -> Result<Bounds> {
        self.thresholds.bounds(
            &self.statistics,
            &self.frames,
            slice.map(|s| &s.statistics),
            start,
            duration,
        )
    }

    /// Resample an oriented slice out of this data set.
    pub fn get_slice(&self, request: &SliceRequest) -> Result<DataSet> {
        slicer::get_slice(self, request)
    }

    /// Grow an iso-value region from `seed`.
    pub fn build_isocontour(
        &self,
        seed: Voxel,
        kind: IsocontourKind,
        progress: &dyn Progress,
    ) -> Result<IsocontourRoi> {
        isocontour::build_isocontour(self, seed, kind, progress)
    }

    /// Build a single frame data set around slice samples `[1, 1, y, x]`.
    pub(crate) fn from_slice(
        parent: &DataSet,
        raw_data: RawData,
        space: Space,
        voxel_size: DVec3,
        start: f64,
        duration: f64,
        calc_max_min: bool,
    ) -> Result<DataSet> {
        let mut slice = DataSet::new(
            format!("{} slice", parent.name),
            raw_data,
            ScalingArray::scalar(1.0),
            TimeFrames::new(start, vec![duration]),
        )
        .with_space(space)
        .with_voxel_size(voxel_size);
        slice.inherit_display_settings(parent);
        if calc_max_min {
            slice.calc_max_min(&NoProgress)?;
        }
        Ok(slice)
    }
}

fn corner_for(dim: &VoxelDim, voxel_size: DVec3) -> DVec3 {
    DVec3::new(dim.x as f64, dim.y as f64, dim.z as f64) * voxel_size
}

/// Shortest frame over all data sets, `None` for no data sets.
pub fn min_frame_duration(data_sets: &[&DataSet]) -> Option<f64> {
    data_sets
        .iter()
        .map(|ds| ds.frames.min_frame_duration())
        .reduce(f64::min)
}

/// Smallest voxel edge over all data sets.
pub fn min_voxel_size(data_sets: &[&DataSet]) -> Option<f64> {
    data_sets
        .iter()
        .map(|ds| ds.voxel_size.min_element())
        .reduce(f64::min)
}

/// Largest of the per data set smallest voxel edges; the finest pixel size at
/// which every data set is still sampled at least once per voxel.
pub fn max_min_voxel_size(data_sets: &[&DataSet]) -> Option<f64> {
    data_sets
        .iter()
        .map(|ds| ds.voxel_size.min_element())
        .reduce(f64::max)
}

/// The slice that was cut from `parent`.
pub fn find_with_slice_parent<'a>(slices: &'a [DataSet], parent: &DataSet) -> Option<&'a DataSet> {
    slices.iter().find(|s| s.slice_parent == Some(parent.id))
}

pub(crate) fn check_not_empty(data_sets: &[&DataSet]) -> Result<()> {
    if data_sets.is_empty() {
        return Err(Error::EmptyDataSetList);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DataSetEvent;
    use crate::progress::CancelToken;
    use approx::assert_relative_eq;
    use ndarray::Array4;
    use std::sync::Mutex;

    fn data_set() -> DataSet {
        let samples = Array4::from_shape_fn((2, 2, 3, 4), |(t, z, y, x)| {
            (t * 100 + z * 12 + y * 4 + x) as u16
        });
        DataSet::import(
            "ramp",
            RawData::from_array(samples),
            ScalingArray::per_frame(vec![1.0, 0.5]),
            TimeFrames::new(0.0, vec![10.0, 20.0]),
            &NoProgress,
        )
        .unwrap()
    }

    #[test]
    fn cancelled_scans_keep_previous_statistics() {
        let mut ds = data_set();
        ds.calc_distribution(DistributionConfig { bins: 8 }, &NoProgress)
            .unwrap();
        let before = ds.statistics().clone();
        assert!(before.distribution().is_some());

        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(ds.calc_max_min(&token), Err(Error::Cancelled)));
        assert!(matches!(
            ds.calc_frame_max_min(&token),
            Err(Error::Cancelled)
        ));
        assert!(matches!(
            ds.calc_distribution(DistributionConfig { bins: 3 }, &token),
            Err(Error::Cancelled)
        ));
        assert_eq!(ds.statistics(), &before);
    }

    fn recorder(ds: &mut DataSet) -> Arc<Mutex<Vec<DataSetEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        ds.subscribe(Arc::new(move |_: DataSetId, e: DataSetEvent| {
            sink.lock().unwrap().push(e)
        }));
        seen
    }

    #[test]
    fn import_seeds_thresholds() {
        let ds = data_set();
        assert_eq!(ds.statistics().global_max(), 123.0 * 0.5);
        assert_eq!(ds.thresholds().max(Reference::First), 123.0 * 0.5);
        assert_eq!(ds.thresholds().min(Reference::First), 0.0);
        assert_eq!(ds.thresholds().ref_frame(Reference::Second), 1);
    }

    #[test]
    fn value_is_raw_times_scaling() {
        let ds = data_set();
        assert_eq!(ds.get_value(Voxel::new(3, 2, 1, 1)), 123.0 * 0.5);
        assert_eq!(ds.get_value(Voxel::new(4, 0, 0, 0)), EMPTY);
        assert_eq!(ds.get_value(Voxel::new(0, 0, 0, -1)), EMPTY);
    }

    #[test]
    fn scale_factor_round_trip_restores_state() {
        let mut ds = data_set();
        let seen = recorder(&mut ds);
        let (max, min) = (ds.statistics().global_max(), ds.statistics().global_min());

        ds.set_scale_factor(3.0).unwrap();
        assert_relative_eq!(ds.get_value(Voxel::new(1, 0, 0, 0)), 3.0);
        assert_relative_eq!(ds.statistics().global_max(), max * 3.0);

        ds.set_scale_factor(1.0).unwrap();
        assert_relative_eq!(ds.statistics().global_max(), max);
        assert_relative_eq!(ds.statistics().global_min(), min);
        assert_relative_eq!(ds.thresholds().max(Reference::First), max);
        assert!(seen.lock().unwrap().contains(&DataSetEvent::ScaleFactorChanged));
    }

    #[test]
    fn invalid_scale_factor_is_rejected() {
        let mut ds = data_set();
        assert!(matches!(
            ds.set_scale_factor(0.0),
            Err(Error::InvalidScaleFactor(_))
        ));
        assert_eq!(ds.scale_factor(), 1.0);
    }

    #[test]
    fn setters_notify_only_on_change() {
        let mut ds = data_set();
        let seen = recorder(&mut ds);
        ds.set_modality(Modality::Pet);
        ds.set_modality(Modality::Ct);
        ds.set_color_table(ColorTable::WhiteBlackLinear);
        ds.set_thresholding(Thresholding::PerFrame);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                DataSetEvent::ModalityChanged,
                DataSetEvent::DataSetChanged,
                DataSetEvent::ColorTableChanged,
                DataSetEvent::ThresholdingChanged,
            ]
        );
    }

    #[test]
    fn voxel_size_moves_corner() {
        let mut ds = data_set();
        ds.set_voxel_size(DVec3::new(2.0, 1.0, 3.0));
        assert_eq!(ds.corner(), DVec3::new(8.0, 3.0, 6.0));
    }

    #[test]
    fn scan_date_is_normalised() {
        let mut ds = data_set();
        ds.set_scan_date("  2024-01-02\n10:00 ");
        assert_eq!(ds.scan_date(), "2024-01-02 10:00");
        ds.set_scan_date("\n");
        assert_eq!(ds.scan_date(), "unknown");
    }

    #[test]
    fn distribution_covers_the_value_range() {
        let mut ds = data_set();
        ds.calc_distribution(DistributionConfig { bins: 8 }, &NoProgress)
            .unwrap();
        let distribution = ds.statistics().distribution().unwrap();
        assert_eq!(distribution.total(), 48);
        assert_eq!(distribution.max(), ds.statistics().global_max());
    }

    #[test]
    fn voxel_size_helpers() {
        let a = data_set().with_voxel_size(DVec3::new(1.0, 2.0, 3.0));
        let b = data_set().with_voxel_size(DVec3::new(2.0, 2.0, 4.0));
        assert_eq!(min_voxel_size(&[&a, &b]), Some(1.0));
        assert_eq!(max_min_voxel_size(&[&a, &b]), Some(2.0));
        assert_eq!(min_frame_duration(&[&a, &b]), Some(10.0));
        assert_eq!(min_voxel_size(&[]), None);
    }
}
