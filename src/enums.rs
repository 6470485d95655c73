#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Canonical viewing axes. Used to build view volumes for the common
/// medical planes; arbitrary orientations go through [`crate::space::Space`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Interpolation {
    /// Copy the closest source voxel (fast)
    #[default]
    NearestNeighbor,
    /// Weight the surrounding source cell (slow)
    Trilinear,
}

/// Numeric kind of the raw samples stored in a voxel grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StorageKind {
    UByte,
    SByte,
    UShort,
    SShort,
    UInt,
    SInt,
    Float,
    Double,
}

impl StorageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StorageKind::UByte => "unsigned byte",
            StorageKind::SByte => "signed byte",
            StorageKind::UShort => "unsigned short",
            StorageKind::SShort => "signed short",
            StorageKind::UInt => "unsigned int",
            StorageKind::SInt => "signed int",
            StorageKind::Float => "float",
            StorageKind::Double => "double",
        }
    }
}

/// Granularity of the calibration array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ScalingRank {
    /// One factor for the whole grid
    Scalar,
    /// One factor per time frame
    PerFrame,
    /// One factor per (frame, z-plane) pair
    PerFramePlane,
}

/// Rule for deriving display bounds from the stored reference thresholds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Thresholding {
    PerSlice,
    PerFrame,
    InterpolateFrames,
    #[default]
    Global,
}

impl Thresholding {
    pub fn name(&self) -> &'static str {
        match self {
            Thresholding::PerSlice => "per slice",
            Thresholding::PerFrame => "per frame",
            Thresholding::InterpolateFrames => "interpolated between frames",
            Thresholding::Global => "global",
        }
    }
}

/// How values of several overlapped frames are combined for a time window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TimeAggregation {
    /// Each frame contributes proportionally to the part of the window it covers
    #[default]
    WeightedBlend,
    /// True extremum over every overlapped frame
    Envelope,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Modality {
    #[default]
    Pet,
    Spect,
    Ct,
    Mri,
    Other,
}

impl Modality {
    pub fn name(&self) -> &'static str {
        match self {
            Modality::Pet => "PET",
            Modality::Spect => "SPECT",
            Modality::Ct => "CT",
            Modality::Mri => "MRI",
            Modality::Other => "Other",
        }
    }

    /// Map a DICOM modality code (0008,0060) onto the supported set
    pub fn from_dicom_code(code: &str) -> Self {
        match code.trim() {
            "PT" => Modality::Pet,
            "NM" => Modality::Spect,
            "CT" => Modality::Ct,
            "MR" => Modality::Mri,
            _ => Modality::Other,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ColorTable {
    #[default]
    BlackWhiteLinear,
    WhiteBlackLinear,
}

/// Region growing variant of an isocontour ROI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IsocontourKind {
    /// Grows inside the seed's z-plane with 4-connectivity
    Planar,
    /// Grows through the whole frame with 26-connectivity
    Volumetric,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}
