//! # Volume data set library
//!
//! This crate is the value engine behind a viewer for 4D (x, y, z, time)
//! medical image volumes such as dynamic PET or SPECT studies.
//!
//! A [`DataSet`] wraps an immutable voxel grid in one of eight storage kinds
//! and turns raw samples into calibrated values through a per-volume,
//! per-frame or per-(frame, plane) scaling array plus one external scale
//! factor. On top of that it provides:
//!  - Time frame lookup and duration weighted windows over frames
//!  - Per-frame and global max/min plus a value distribution
//!  - Display thresholds under four policies (global, per frame, per slice
//!    and interpolated between two reference frames)
//!  - Oblique slicing with nearest neighbour or trilinear interpolation,
//!    computed in parallel using rayon
//!  - Isocontour ROIs grown from a seed voxel
//!
//!  Long scans take a [`Progress`] that can cancel them; cancelled scans
//!  leave previously computed statistics untouched. Changes to a data set are
//!  reported to subscribed [`DataSetObserver`]s.
//!
//!  DICOM series can be loaded with the [`VolumeLoader`]. It assumes:
//!   - No multiframe (always the first frame is used)
//!   - Images from the same series (Series Instance UID) and acquisition
//!     (Acquisition Number)
//!
//! # Examples
//!
//! ## Slicing a DICOM series
//!
//! Read all DICOM files from the dicom/ directory, sorted by InstanceNumber,
//! and render the coronal slice through the centre of the volume.
//!
//! ```no_run
//! # use volume_dataset::{VolumeLoader, Orientation, Interpolation, SortBy};
//! # use volume_dataset::{render, slicer::{self, SliceRequest}};
//! let data_set = VolumeLoader::load_from_directory("dicom", SortBy::InstanceNumber)
//!     .expect("should have loaded files from directory");
//! let view = slicer::view_volume(&data_set.volume(), Orientation::Coronal, None, 1.0);
//! let request = SliceRequest::new(view, 1.0).with_interpolation(Interpolation::Trilinear);
//! let slice = data_set.get_slice(&request).expect("should have sliced the volume");
//! let bounds = data_set
//!     .get_thresholding_max_min(Some(&slice), 0.0, 1.0)
//!     .expect("statistics are computed on import");
//! render::slice_to_image(&slice, bounds)
//!     .expect("slice should not be empty")
//!     .save("result.png")
//!     .expect("should have written the image");
//! ```

pub mod data_set;
pub mod enums;
pub mod error;
pub mod events;
mod interpolator;
pub mod isocontour;
pub mod progress;
pub mod raw_data;
pub mod render;
pub mod scaling;
pub mod slicer;
pub mod space;
pub mod statistics;
pub mod threshold;
pub mod time_frames;
pub mod volume_loader;

pub use data_set::DataSet;
pub use enums::{
    ColorTable, Interpolation, IsocontourKind, Modality, Orientation, ScalingRank, SortBy,
    StorageKind, Thresholding, TimeAggregation,
};
pub use error::{Error, Result};
pub use events::{DataSetEvent, DataSetId, DataSetObserver, Subscription};
pub use isocontour::IsocontourRoi;
pub use progress::{CancelToken, NoProgress, Progress};
pub use raw_data::{RawData, Voxel, VoxelDim};
pub use scaling::ScalingArray;
pub use space::{Space, Volume};
pub use threshold::{Bounds, Reference};
pub use time_frames::TimeFrames;
pub use volume_loader::VolumeLoader;
