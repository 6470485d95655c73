//! Oriented coordinate frames and the boxes that live in them.
//!
//! Every data set and every slice request owns a [`Space`]: an origin in base
//! (patient) coordinates plus three orthonormal axes. Points are converted
//! between spaces by going through base coordinates.

use crate::enums::Orientation;

use glam::{DMat3, DVec3};

/// Origin plus orthonormal axes, all in base coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Space {
    offset: DVec3,
    /// columns are the unit x, y, z axes of this space
    axes: DMat3,
}

impl Default for Space {
    fn default() -> Self {
        Self {
            offset: DVec3::ZERO,
            axes: DMat3::IDENTITY,
        }
    }
}

impl Space {
    pub fn new(offset: DVec3, axes: DMat3) -> Self {
        Self { offset, axes }
    }

    /// Axes of a canonical viewing plane. The slice plane is spanned by the
    /// x and y axes; z points along the viewing direction.
    pub fn for_orientation(orientation: Orientation, offset: DVec3) -> Self {
        let axes = match orientation {
            Orientation::Axial => DMat3::IDENTITY,
            Orientation::Coronal => DMat3::from_cols(DVec3::X, DVec3::Z, DVec3::NEG_Y),
            Orientation::Sagittal => DMat3::from_cols(DVec3::Y, DVec3::Z, DVec3::X),
        };
        Self { offset, axes }
    }

    /// Plane orthogonal to `normal`, in-plane axes chosen from the base axis
    /// least aligned with it.
    pub fn from_normal(normal: DVec3, offset: DVec3) -> Self {
        let n = normal.try_normalize().unwrap_or(DVec3::Z);
        let abs = n.abs();
        let helper = if abs.x <= abs.y && abs.x <= abs.z {
            DVec3::X
        } else if abs.y <= abs.z {
            DVec3::Y
        } else {
            DVec3::Z
        };
        let u = helper.cross(n).normalize();
        let v = n.cross(u);
        Self {
            offset,
            axes: DMat3::from_cols(u, v, n),
        }
    }

    pub fn offset(&self) -> DVec3 {
        self.offset
    }

    pub fn axes(&self) -> DMat3 {
        self.axes
    }

    pub fn set_offset(&mut self, offset: DVec3) {
        self.offset = offset;
    }

    /// This space's coordinates to base coordinates
    #[inline]
    pub fn s2b(&self, point: DVec3) -> DVec3 {
        self.offset + self.axes * point
    }

    /// Base coordinates to this space's coordinates
    #[inline]
    pub fn b2s(&self, point: DVec3) -> DVec3 {
        self.axes.transpose() * (point - self.offset)
    }

    /// This space's coordinates to `other`'s coordinates
    #[inline]
    pub fn s2s(&self, other: &Space, point: DVec3) -> DVec3 {
        other.b2s(self.s2b(point))
    }

    /// Affine map `p -> m * p + t` from this space into `other`.
    pub fn transform_to(&self, other: &Space) -> (DMat3, DVec3) {
        let inverse = other.axes.transpose();
        (inverse * self.axes, inverse * (self.offset - other.offset))
    }
}

/// An axis aligned box `[0, corner]` inside a [`Space`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Volume {
    pub space: Space,
    pub corner: DVec3,
}

impl Volume {
    pub fn new(space: Space, corner: DVec3) -> Self {
        Self { space, corner }
    }

    fn box_corners(&self) -> impl Iterator<Item = DVec3> + '_ {
        (0..8).map(move |i| {
            DVec3::new(
                if i & 1 == 0 { 0.0 } else { self.corner.x },
                if i & 2 == 0 { 0.0 } else { self.corner.y },
                if i & 4 == 0 { 0.0 } else { self.corner.z },
            )
        })
    }

    /// Bounding box of this volume expressed in `space`, as `[min, max]`.
    pub fn corners_in(&self, space: &Space) -> [DVec3; 2] {
        self.box_corners()
            .map(|p| self.space.s2s(space, p))
            .fold(
                [DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)],
                |[lo, hi], p| [lo.min(p), hi.max(p)],
            )
    }

    /// Bounding box of several volumes in `space`, `None` for no volumes.
    pub fn enclosing_corners<'a>(
        volumes: impl IntoIterator<Item = &'a Volume>,
        space: &Space,
    ) -> Option<[DVec3; 2]> {
        volumes
            .into_iter()
            .map(|volume| volume.corners_in(space))
            .reduce(|[lo, hi], [l, h]| [lo.min(l), hi.max(h)])
    }

    /// Overlap of `other` with this volume, in this volume's space.
    pub fn intersection_corners(&self, other: &Volume) -> Option<[DVec3; 2]> {
        let [lo, hi] = other.corners_in(&self.space);
        let lo = lo.max(DVec3::ZERO);
        let hi = hi.min(self.corner);
        (lo.cmple(hi).all()).then_some([lo, hi])
    }

    /// Centre of the box in base coordinates
    pub fn center(&self) -> DVec3 {
        self.space.s2b(self.corner * 0.5)
    }
}
