//! Mapping of slices to displayable 8-bit images.

use crate::data_set::DataSet;
use crate::enums::ColorTable;
use crate::raw_data::Voxel;
use crate::threshold::Bounds;

use image::{GrayImage, ImageBuffer};
use rayon::prelude::*;

#[inline]
fn normalize_to_u8(value: f64, bounds: Bounds, color_table: ColorTable) -> u8 {
    let range = bounds.max - bounds.min;
    let level = if range > 0.0 {
        ((value - bounds.min) / range).clamp(0.0, 1.0)
    } else if value >= bounds.max {
        1.0
    } else {
        0.0
    };
    let level = match color_table {
        ColorTable::BlackWhiteLinear => level,
        ColorTable::WhiteBlackLinear => 1.0 - level,
    };
    (level * 255.0).round() as u8
}

/// Render plane `z` of frame 0 of a slice through `bounds` and the slice's
/// colour table. Rows run along `y`, so row 0 is the top of the image.
pub fn slice_to_image(slice: &DataSet, bounds: Bounds) -> Option<GrayImage> {
    let dim = slice.dim();
    let color_table = slice.color_table();
    let pixel_data: Vec<u8> = (0..dim.y)
        .into_par_iter()
        .flat_map_iter(|y| {
            (0..dim.x).map(move |x| {
                let value = slice.get_value(Voxel::new(x as isize, y as isize, 0, 0));
                normalize_to_u8(value, bounds, color_table)
            })
        })
        .collect();
    ImageBuffer::from_raw(dim.x as u32, dim.y as u32, pixel_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw_data::RawData;
    use crate::scaling::ScalingArray;
    use crate::time_frames::TimeFrames;
    use ndarray::Array4;

    fn ramp() -> DataSet {
        let samples = Array4::from_shape_fn((1, 1, 2, 3), |(_, _, y, x)| (y * 3 + x) as f64 * 20.0);
        DataSet::new(
            "ramp",
            RawData::from_array(samples),
            ScalingArray::scalar(1.0),
            TimeFrames::single(1.0),
        )
    }

    #[test]
    fn values_are_clamped_into_bounds() {
        let image = slice_to_image(&ramp(), Bounds::new(80.0, 20.0)).unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(0, 0).0, [0]);
        assert_eq!(image.get_pixel(2, 0).0, [85]);
        assert_eq!(image.get_pixel(2, 1).0, [255]);
    }

    #[test]
    fn inverted_table_flips_levels() {
        let mut slice = ramp();
        slice.set_color_table(ColorTable::WhiteBlackLinear);
        let image = slice_to_image(&slice, Bounds::new(100.0, 0.0)).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [255]);
        assert_eq!(image.get_pixel(2, 1).0, [0]);
    }

    #[test]
    fn flat_bounds_split_at_the_threshold() {
        assert_eq!(normalize_to_u8(5.0, Bounds::new(5.0, 5.0), ColorTable::BlackWhiteLinear), 255);
        assert_eq!(normalize_to_u8(4.0, Bounds::new(5.0, 5.0), ColorTable::BlackWhiteLinear), 0);
    }
}
