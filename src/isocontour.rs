//! Iso-value region growing for ROI masks.
//!
//! An isocontour ROI is grown from a seed voxel over every connected voxel
//! whose calibrated value reaches the seed's value. The result is kept as a
//! cropped mask of [`OUT`], [`EDGE`] and [`INTERIOR`] voxels together with the
//! geometry needed to place it back in world space.

use crate::data_set::DataSet;
use crate::enums::IsocontourKind;
use crate::error::{Error, Result};
use crate::interpolator::Sampler;
use crate::progress::Progress;
use crate::raw_data::{Sample, SampleVisitor, Voxel, VoxelDim};
use crate::scaling::ScalingModel;
use crate::space::{Space, Volume};

use glam::DVec3;
use ndarray::{Array2, Array3, Array4, s};

pub const OUT: u8 = 0;
pub const EDGE: u8 = 1;
pub const INTERIOR: u8 = 2;
/// Visited and below the iso value; only exists while growing
const REJECTED: u8 = 3;
/// Reached and at or above the iso value; only exists while growing
const MARKED: u8 = 4;

/// Keeps the seed itself above the threshold after floating round off.
pub const ISO_EPSILON: f64 = 1e-5;

/// Pops between two progress polls
const POLL_INTERVAL: usize = 1 << 16;

type Offset = (isize, isize, isize);

fn cube((cx, cy, cz): Offset, reach: isize) -> impl Iterator<Item = Offset> {
    (cz - reach..=cz + reach).flat_map(move |z| {
        (cy - reach..=cy + reach)
            .flat_map(move |y| (cx - reach..=cx + reach).map(move |x| (x, y, z)))
    })
}

const PLANAR: [Offset; 4] = [(-1, 0, 0), (1, 0, 0), (0, -1, 0), (0, 1, 0)];

/// Growth and edge neighbourhood. Off-grid neighbours are skipped while
/// growing and count as unmarked when classifying.
fn neighbourhood(kind: IsocontourKind) -> Vec<Offset> {
    match kind {
        IsocontourKind::Planar => PLANAR.to_vec(),
        IsocontourKind::Volumetric => cube((0, 0, 0), 1)
            .filter(|&offset| offset != (0, 0, 0))
            .collect(),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IsocontourRoi {
    kind: IsocontourKind,
    iso_value: f64,
    /// `[z, y, x]`
    mask: Array3<u8>,
    /// Source voxel of mask element `[0, 0, 0]`; `t` is the grown frame
    offset: Voxel,
    space: Space,
    voxel_size: DVec3,
    neighbours: Vec<Offset>,
}

/// The part of an ROI visible on a canvas slice, see
/// [`IsocontourRoi::intersection_slice`].
#[derive(Clone, Debug, PartialEq)]
pub struct CanvasMask {
    /// Canvas pixel of mask element `[0, 0]`, as `(x, y)`
    pub start: (usize, usize),
    /// `[y, x]`, [`EDGE`] where the ROI outline is drawn
    pub mask: Array2<u8>,
}

struct Grow<'a> {
    scaling: &'a ScalingModel,
    progress: &'a dyn Progress,
    seed: Voxel,
    iso_value: f64,
    neighbours: &'a [Offset],
}

impl SampleVisitor for Grow<'_> {
    type Output = Result<Array3<u8>>;

    fn visit<S: Sample>(self, samples: &Array4<S>) -> Self::Output {
        let (_, nz, ny, nx) = samples.dim();
        let sampler = Sampler::new(samples, self.scaling, self.seed.t as usize);
        let mut mask = Array3::<u8>::zeros((nz, ny, nx));
        let total = (nx * ny * nz) as f32;

        let seed = (self.seed.x, self.seed.y, self.seed.z);
        mask[index(seed)] = MARKED;
        if sampler.calibrated(seed.0, seed.1, seed.2) < self.iso_value {
            log::warn!(
                "seed value fell below iso value {:.6} after round off, keeping only the seed",
                self.iso_value
            );
            return Ok(mask);
        }

        let mut stack = vec![seed];
        let mut pops = 0usize;
        while let Some((x, y, z)) = stack.pop() {
            pops += 1;
            if pops % POLL_INTERVAL == 0
                && !self
                    .progress
                    .update("growing isocontour", (pops as f32 / total).min(1.0))
            {
                return Err(Error::Cancelled);
            }
            for &(dx, dy, dz) in self.neighbours {
                let next = (x + dx, y + dy, z + dz);
                if !in_bounds(next, (nx, ny, nz)) || mask[index(next)] != OUT {
                    continue;
                }
                if sampler.calibrated(next.0, next.1, next.2) >= self.iso_value {
                    mask[index(next)] = MARKED;
                    stack.push(next);
                } else {
                    mask[index(next)] = REJECTED;
                }
            }
        }
        mask.mapv_inplace(|v| if v == REJECTED { OUT } else { v });
        self.progress.update("growing isocontour", 1.0);
        Ok(mask)
    }
}

#[inline(always)]
fn index((x, y, z): Offset) -> [usize; 3] {
    [z as usize, y as usize, x as usize]
}

#[inline(always)]
fn in_bounds((x, y, z): Offset, (nx, ny, nz): (usize, usize, usize)) -> bool {
    x >= 0 && y >= 0 && z >= 0 && (x as usize) < nx && (y as usize) < ny && (z as usize) < nz
}

/// Grow an isocontour of `data_set` from `seed`.
pub fn build_isocontour(
    data_set: &DataSet,
    seed: Voxel,
    kind: IsocontourKind,
    progress: &dyn Progress,
) -> Result<IsocontourRoi> {
    let dim = data_set.dim();
    if !dim.includes(seed) {
        let Voxel { x, y, z, t } = seed;
        return Err(Error::SeedOutOfBounds { x, y, z, t });
    }
    let iso_value = data_set.get_value(seed) * (1.0 - ISO_EPSILON);
    let neighbours = neighbourhood(kind);
    let grown = data_set.raw_data().visit(Grow {
        scaling: data_set.scaling(),
        progress,
        seed,
        iso_value,
        neighbours: &neighbours,
    })?;

    let (lo, hi) = marked_bounds(&grown, &dim);
    let mask = grown
        .slice(s![lo.2..=hi.2, lo.1..=hi.1, lo.0..=hi.0])
        .to_owned();

    let voxel_size = data_set.voxel_size();
    let min_point = DVec3::new(lo.0 as f64, lo.1 as f64, lo.2 as f64) * voxel_size;
    let mut space = *data_set.space();
    space.set_offset(data_set.space().s2b(min_point));

    let mut roi = IsocontourRoi {
        kind,
        iso_value,
        mask,
        offset: Voxel::new(lo.0 as isize, lo.1 as isize, lo.2 as isize, seed.t),
        space,
        voxel_size,
        neighbours,
    };
    roi.classify_all();
    log::debug!(
        "isocontour at {iso_value:.4}: {} voxels in a {:?} box",
        roi.voxel_count(),
        roi.mask.dim()
    );
    Ok(roi)
}

/// Inclusive `(x, y, z)` bounds of the marked voxels. The seed is always
/// marked so the box is never empty.
fn marked_bounds(
    mask: &Array3<u8>,
    dim: &VoxelDim,
) -> ((usize, usize, usize), (usize, usize, usize)) {
    let init = ((dim.x, dim.y, dim.z), (0, 0, 0));
    mask.indexed_iter()
        .filter(|&(_, &v)| v == MARKED)
        .fold(init, |(lo, hi), ((z, y, x), _)| {
            (
                (lo.0.min(x), lo.1.min(y), lo.2.min(z)),
                (hi.0.max(x), hi.1.max(y), hi.2.max(z)),
            )
        })
}

impl IsocontourRoi {
    pub fn kind(&self) -> IsocontourKind {
        self.kind
    }

    pub fn iso_value(&self) -> f64 {
        self.iso_value
    }

    /// `[z, y, x]` mask of [`OUT`], [`EDGE`] and [`INTERIOR`]
    pub fn mask(&self) -> &Array3<u8> {
        &self.mask
    }

    /// Source voxel of the mask origin
    pub fn offset(&self) -> Voxel {
        self.offset
    }

    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn voxel_size(&self) -> DVec3 {
        self.voxel_size
    }

    pub fn corner(&self) -> DVec3 {
        let (nz, ny, nx) = self.mask.dim();
        DVec3::new(nx as f64, ny as f64, nz as f64) * self.voxel_size
    }

    pub fn volume(&self) -> Volume {
        Volume::new(self.space, self.corner())
    }

    pub fn voxel_count(&self) -> usize {
        self.mask.iter().filter(|&&v| v != OUT).count()
    }

    /// Mask value at a mask local voxel, [`OUT`] off the mask
    pub fn value(&self, x: isize, y: isize, z: isize) -> u8 {
        let (nz, ny, nx) = self.mask.dim();
        if in_bounds((x, y, z), (nx, ny, nz)) {
            self.mask[index((x, y, z))]
        } else {
            OUT
        }
    }

    /// Mask local voxel holding a base coordinate point
    pub fn voxel_at_point(&self, point: DVec3) -> Option<Voxel> {
        let q = (self.space.b2s(point) / self.voxel_size).floor();
        let (nz, ny, nx) = self.mask.dim();
        let cell = (q.x as isize, q.y as isize, q.z as isize);
        in_bounds(cell, (nx, ny, nz)).then(|| Voxel::new(cell.0, cell.1, cell.2, 0))
    }

    fn classify(&self, x: isize, y: isize, z: isize) -> u8 {
        if self.value(x, y, z) == OUT {
            return OUT;
        }
        let enclosed = self
            .neighbours
            .iter()
            .all(|&(dx, dy, dz)| self.value(x + dx, y + dy, z + dz) != OUT);
        if enclosed { INTERIOR } else { EDGE }
    }

    fn classify_all(&mut self) {
        let classified = Array3::from_shape_fn(self.mask.dim(), |(z, y, x)| {
            self.classify(x as isize, y as isize, z as isize)
        });
        self.mask = classified;
    }

    /// Clear a cube of `radius` voxels around the mask local voxel `center`,
    /// then reclassify the ring just outside it.
    pub fn erase_area(&mut self, center: Voxel, radius: usize) {
        let r = radius as isize;
        let center = (center.x, center.y, center.z);
        let (nz, ny, nx) = self.mask.dim();
        let dims = (nx, ny, nz);

        for voxel in cube(center, r).filter(|&v| in_bounds(v, dims)) {
            self.mask[index(voxel)] = OUT;
        }
        let ring: Vec<(Offset, u8)> = cube(center, r + 1)
            .filter(|&v| in_bounds(v, dims))
            .map(|v| (v, self.classify(v.0, v.1, v.2)))
            .collect();
        for (voxel, value) in ring {
            self.mask[index(voxel)] = value;
        }
    }

    /// Outline of this ROI on a canvas slice of `pixel_size` pixels.
    ///
    /// Returns `None` when the canvas misses the ROI. Planar ROIs also draw
    /// interior voxels cut by the border of the visible area so that a
    /// clipped region still reads as closed.
    pub fn intersection_slice(&self, canvas: &Volume, pixel_size: f64) -> Option<CanvasMask> {
        let [lo, hi] = canvas.intersection_corners(&self.volume())?;
        let to_pixel = |v: f64| (v / pixel_size).floor().max(0.0) as usize;
        let start = (to_pixel(lo.x), to_pixel(lo.y));
        let end = (
            to_pixel(hi.x).max(start.0 + 1),
            to_pixel(hi.y).max(start.1 + 1),
        );
        let (width, height) = (end.0 - start.0, end.1 - start.1);
        let z = 0.5 * (lo.z + hi.z);
        let planar = self.kind == IsocontourKind::Planar;

        let mask = Array2::from_shape_fn((height, width), |(j, i)| {
            let point = DVec3::new(
                (start.0 + i) as f64 * pixel_size + 0.5 * pixel_size,
                (start.1 + j) as f64 * pixel_size + 0.5 * pixel_size,
                z,
            );
            let local = canvas.space.s2s(&self.space, point) / self.voxel_size;
            let cell = local.floor();
            match self.value(cell.x as isize, cell.y as isize, cell.z as isize) {
                EDGE => EDGE,
                INTERIOR if planar && (i == 0 || j == 0 || i + 1 == width || j + 1 == height) => {
                    EDGE
                }
                _ => OUT,
            }
        });
        Some(CanvasMask { start, mask })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CancelToken, NoProgress};
    use crate::raw_data::RawData;
    use crate::scaling::ScalingArray;
    use crate::time_frames::TimeFrames;

    /// 12x12x1 grid of 3 with an 8x8 block of 5 starting at (2, 2)
    fn block(planes: usize) -> DataSet {
        let samples = Array4::from_shape_fn((1, planes, 12, 12), |(_, _, y, x)| {
            if (2..10).contains(&x) && (2..10).contains(&y) { 5u8 } else { 3 }
        });
        DataSet::new(
            "block",
            RawData::from_array(samples),
            ScalingArray::scalar(1.0),
            TimeFrames::single(1.0),
        )
    }

    #[test]
    fn block_is_grown_and_classified() {
        let ds = block(1);
        let roi = ds
            .build_isocontour(Voxel::new(5, 5, 0, 0), IsocontourKind::Planar, &NoProgress)
            .unwrap();
        assert_eq!(roi.mask().dim(), (1, 8, 8));
        assert_eq!(roi.offset(), Voxel::new(2, 2, 0, 0));
        assert_eq!(roi.voxel_count(), 64);
        let interior = roi.mask().iter().filter(|&&v| v == INTERIOR).count();
        assert_eq!(interior, 36);
        assert_eq!(roi.value(0, 3, 0), EDGE);
        assert_eq!(roi.value(7, 7, 0), EDGE);
        assert_eq!(roi.value(1, 1, 0), INTERIOR);
    }

    #[test]
    fn volumetric_grows_through_planes() {
        let ds = block(3);
        let roi = ds
            .build_isocontour(Voxel::new(5, 5, 1, 0), IsocontourKind::Volumetric, &NoProgress)
            .unwrap();
        assert_eq!(roi.mask().dim(), (3, 8, 8));
        assert_eq!(roi.voxel_count(), 192);
        // only the middle plane has neighbours on both sides
        assert_eq!(roi.value(3, 3, 1), INTERIOR);
        assert_eq!(roi.value(3, 3, 0), EDGE);
    }

    #[test]
    fn volumetric_on_one_plane_is_all_edge() {
        let ds = block(1);
        let roi = ds
            .build_isocontour(Voxel::new(5, 5, 0, 0), IsocontourKind::Volumetric, &NoProgress)
            .unwrap();
        assert_eq!(roi.mask().dim(), (1, 8, 8));
        assert_eq!(roi.voxel_count(), 64);
        assert!(roi.mask().iter().all(|&v| v == EDGE));
    }

    #[test]
    fn roi_is_placed_at_its_offset() {
        let ds = block(1).with_voxel_size(DVec3::new(2.0, 2.0, 1.0));
        let roi = ds
            .build_isocontour(Voxel::new(5, 5, 0, 0), IsocontourKind::Planar, &NoProgress)
            .unwrap();
        assert_eq!(roi.space().offset(), DVec3::new(4.0, 4.0, 0.0));
        assert_eq!(roi.corner(), DVec3::new(16.0, 16.0, 1.0));
        assert_eq!(
            roi.voxel_at_point(DVec3::new(5.0, 7.0, 0.5)),
            Some(Voxel::new(0, 1, 0, 0))
        );
        assert_eq!(roi.voxel_at_point(DVec3::new(1.0, 1.0, 0.5)), None);
    }

    #[test]
    fn seed_outside_the_grid_is_rejected() {
        let ds = block(1);
        assert!(matches!(
            ds.build_isocontour(Voxel::new(12, 0, 0, 0), IsocontourKind::Planar, &NoProgress),
            Err(Error::SeedOutOfBounds { x: 12, .. })
        ));
    }

    #[test]
    fn erase_reclassifies_the_ring() {
        let ds = block(1);
        let mut roi = ds
            .build_isocontour(Voxel::new(5, 5, 0, 0), IsocontourKind::Planar, &NoProgress)
            .unwrap();
        roi.erase_area(Voxel::new(4, 4, 0, 0), 1);
        assert_eq!(roi.voxel_count(), 64 - 9);
        assert_eq!(roi.value(4, 4, 0), OUT);
        // was interior, now borders the hole
        assert_eq!(roi.value(4, 2, 0), EDGE);
        assert_eq!(roi.value(1, 1, 0), INTERIOR);
    }

    #[test]
    fn canvas_shows_the_outline() {
        let ds = block(1);
        let roi = ds
            .build_isocontour(Voxel::new(5, 5, 0, 0), IsocontourKind::Planar, &NoProgress)
            .unwrap();
        let canvas = Volume::new(Space::default(), DVec3::new(12.0, 12.0, 1.0));
        let shown = roi.intersection_slice(&canvas, 1.0).unwrap();
        assert_eq!(shown.start, (2, 2));
        assert_eq!(shown.mask.dim(), (8, 8));
        assert_eq!(shown.mask.iter().filter(|&&v| v == EDGE).count(), 28);

        // a canvas clipping the block closes the outline along its border
        let clipped = Volume::new(Space::default(), DVec3::new(6.0, 12.0, 1.0));
        let shown = roi.intersection_slice(&clipped, 1.0).unwrap();
        assert_eq!(shown.mask.dim(), (8, 4));
        assert_eq!(shown.mask[[4, 3]], EDGE);

        let elsewhere = Volume::new(
            Space::new(DVec3::new(0.0, 0.0, 5.0), glam::DMat3::IDENTITY),
            DVec3::new(12.0, 12.0, 1.0),
        );
        assert!(roi.intersection_slice(&elsewhere, 1.0).is_none());
    }

    #[test]
    fn cancellation_leaves_no_roi() {
        let samples = Array4::from_elem((1, 1, 300, 300), 1.0f32);
        let ds = DataSet::new(
            "flat",
            RawData::from_array(samples),
            ScalingArray::scalar(1.0),
            TimeFrames::single(1.0),
        );
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(
            ds.build_isocontour(Voxel::ZERO, IsocontourKind::Planar, &token),
            Err(Error::Cancelled)
        ));
    }
}
