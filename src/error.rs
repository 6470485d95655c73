//! Error types for data set operations.

use thiserror::Error;

/// Result type alias for data set operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// External scale factors must be strictly positive.
    #[error("invalid external scale factor: {0} (must be > 0)")]
    InvalidScaleFactor(f64),

    /// A long scan was stopped through its progress callback.
    #[error("operation cancelled")]
    Cancelled,

    /// Frame max/min have not been calculated yet.
    #[error("frame max/min statistics have not been calculated")]
    StatisticsNotComputed,

    /// Per-slice thresholding was requested without a slice.
    #[error("per-slice thresholding requires a slice data set")]
    MissingSlice,

    /// The isocontour seed lies outside the voxel grid.
    #[error("seed voxel ({x}, {y}, {z}, {t}) is outside the data set")]
    SeedOutOfBounds { x: isize, y: isize, z: isize, t: isize },

    #[error("no data sets given")]
    EmptyDataSetList,
}
