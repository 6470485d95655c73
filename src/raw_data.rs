//! Raw voxel storage.
//!
//! A [`RawData`] grid holds the samples exactly as imported, in one of the
//! [`StorageKind`]s, laid out `[t, z, y, x]`. Every algorithm that has to walk
//! the samples is written once, generically over [`Sample`], and reaches the
//! concrete array through [`RawData::visit`].

use crate::enums::StorageKind;

use ndarray::Array4;

/// Value returned for voxels outside of a grid.
pub const EMPTY: f64 = 0.0;

/// A numeric type that can be stored in a voxel grid.
pub trait Sample: Copy + Send + Sync + 'static {
    const KIND: StorageKind;

    fn to_f64(self) -> f64;

    fn into_raw_data(samples: Array4<Self>) -> RawData;
}

macro_rules! impl_sample {
    ($ty:ty, $kind:ident) => {
        impl Sample for $ty {
            const KIND: StorageKind = StorageKind::$kind;

            #[inline(always)]
            fn to_f64(self) -> f64 {
                self as f64
            }

            fn into_raw_data(samples: Array4<Self>) -> RawData {
                RawData::$kind(samples)
            }
        }
    };
}

impl_sample!(u8, UByte);
impl_sample!(i8, SByte);
impl_sample!(u16, UShort);
impl_sample!(i16, SShort);
impl_sample!(u32, UInt);
impl_sample!(i32, SInt);
impl_sample!(f32, Float);
impl_sample!(f64, Double);

/// Address of one grid cell. Signed so that neighbourhoods can step off the
/// grid and be bounds checked afterwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Voxel {
    pub x: isize,
    pub y: isize,
    pub z: isize,
    pub t: isize,
}

impl Voxel {
    pub const ZERO: Voxel = Voxel::new(0, 0, 0, 0);

    pub const fn new(x: isize, y: isize, z: isize, t: isize) -> Self {
        Self { x, y, z, t }
    }

    /// Same frame, shifted in space
    #[inline]
    pub fn shifted(&self, dx: isize, dy: isize, dz: isize) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz, self.t)
    }
}

/// Extent of a grid along each axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoxelDim {
    pub x: usize,
    pub y: usize,
    pub z: usize,
    pub t: usize,
}

impl VoxelDim {
    pub const fn new(x: usize, y: usize, z: usize, t: usize) -> Self {
        Self { x, y, z, t }
    }

    /// ndarray shape, `(t, z, y, x)`
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        (self.t, self.z, self.y, self.x)
    }

    pub fn voxels_per_frame(&self) -> usize {
        self.x * self.y * self.z
    }

    pub fn total_voxels(&self) -> usize {
        self.voxels_per_frame() * self.t
    }

    #[inline]
    pub fn includes(&self, voxel: Voxel) -> bool {
        voxel.x >= 0
            && voxel.y >= 0
            && voxel.z >= 0
            && voxel.t >= 0
            && (voxel.x as usize) < self.x
            && (voxel.y as usize) < self.y
            && (voxel.z as usize) < self.z
            && (voxel.t as usize) < self.t
    }
}

/// Callback run against the concretely typed sample array of a [`RawData`].
pub trait SampleVisitor {
    type Output;

    fn visit<S: Sample>(self, samples: &Array4<S>) -> Self::Output;
}

/// Imported 4D sample grid. Immutable once built; share it through `Arc`.
#[derive(Clone, Debug)]
pub enum RawData {
    UByte(Array4<u8>),
    SByte(Array4<i8>),
    UShort(Array4<u16>),
    SShort(Array4<i16>),
    UInt(Array4<u32>),
    SInt(Array4<i32>),
    Float(Array4<f32>),
    Double(Array4<f64>),
}

impl RawData {
    /// Wrap a `[t, z, y, x]` array.
    ///
    /// # Panics
    ///
    /// Panics if any axis is empty.
    pub fn from_array<S: Sample>(samples: Array4<S>) -> Self {
        let (t, z, y, x) = samples.dim();
        assert!(
            t > 0 && z > 0 && y > 0 && x > 0,
            "voxel grid must not have an empty axis, got (t, z, y, x) = {:?}",
            (t, z, y, x)
        );
        S::into_raw_data(samples)
    }

    /// A zero filled grid of the given kind.
    pub fn zeros(kind: StorageKind, dim: VoxelDim) -> Self {
        let shape = dim.shape();
        match kind {
            StorageKind::UByte => Self::from_array(Array4::<u8>::zeros(shape)),
            StorageKind::SByte => Self::from_array(Array4::<i8>::zeros(shape)),
            StorageKind::UShort => Self::from_array(Array4::<u16>::zeros(shape)),
            StorageKind::SShort => Self::from_array(Array4::<i16>::zeros(shape)),
            StorageKind::UInt => Self::from_array(Array4::<u32>::zeros(shape)),
            StorageKind::SInt => Self::from_array(Array4::<i32>::zeros(shape)),
            StorageKind::Float => Self::from_array(Array4::<f32>::zeros(shape)),
            StorageKind::Double => Self::from_array(Array4::<f64>::zeros(shape)),
        }
    }

    pub fn kind(&self) -> StorageKind {
        match self {
            RawData::UByte(_) => StorageKind::UByte,
            RawData::SByte(_) => StorageKind::SByte,
            RawData::UShort(_) => StorageKind::UShort,
            RawData::SShort(_) => StorageKind::SShort,
            RawData::UInt(_) => StorageKind::UInt,
            RawData::SInt(_) => StorageKind::SInt,
            RawData::Float(_) => StorageKind::Float,
            RawData::Double(_) => StorageKind::Double,
        }
    }

    pub fn visit<V: SampleVisitor>(&self, visitor: V) -> V::Output {
        match self {
            RawData::UByte(a) => visitor.visit(a),
            RawData::SByte(a) => visitor.visit(a),
            RawData::UShort(a) => visitor.visit(a),
            RawData::SShort(a) => visitor.visit(a),
            RawData::UInt(a) => visitor.visit(a),
            RawData::SInt(a) => visitor.visit(a),
            RawData::Float(a) => visitor.visit(a),
            RawData::Double(a) => visitor.visit(a),
        }
    }

    pub fn dim(&self) -> VoxelDim {
        struct Dim;
        impl SampleVisitor for Dim {
            type Output = VoxelDim;
            fn visit<S: Sample>(self, samples: &Array4<S>) -> VoxelDim {
                let (t, z, y, x) = samples.dim();
                VoxelDim::new(x, y, z, t)
            }
        }
        self.visit(Dim)
    }

    #[inline]
    pub fn includes(&self, voxel: Voxel) -> bool {
        self.dim().includes(voxel)
    }

    /// Uncalibrated sample, `None` outside of the grid
    #[inline]
    pub fn raw_value(&self, voxel: Voxel) -> Option<f64> {
        if !self.includes(voxel) {
            return None;
        }
        let index = [
            voxel.t as usize,
            voxel.z as usize,
            voxel.y as usize,
            voxel.x as usize,
        ];
        let value = match self {
            RawData::UByte(a) => a[index].to_f64(),
            RawData::SByte(a) => a[index].to_f64(),
            RawData::UShort(a) => a[index].to_f64(),
            RawData::SShort(a) => a[index].to_f64(),
            RawData::UInt(a) => a[index].to_f64(),
            RawData::SInt(a) => a[index].to_f64(),
            RawData::Float(a) => a[index].to_f64(),
            RawData::Double(a) => a[index].to_f64(),
        };
        Some(value)
    }
}
