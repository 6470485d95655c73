use crate::data_set::DataSet;
use crate::enums::{Modality, SortBy};
use crate::progress::NoProgress;
use crate::raw_data::RawData;
use crate::scaling::ScalingArray;
use crate::time_frames::TimeFrames;

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use glam::DVec3;
use ndarray::{Array2, Array4, s};
use std::{fs, path::Path};
use thiserror::Error;

/// Frame duration used when a series does not record one, in seconds
const DEFAULT_FRAME_DURATION: f64 = 1.0;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("data set error: {0}")]
    DataSet(#[from] crate::error::Error),
}

/// Per-file attributes needed before the pixels are decoded.
struct SliceHeader<'a> {
    object: &'a FileDicomObject<InMemDicomObject>,
    order: Option<f32>,
    slope: f64,
    intercept: f64,
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a single frame data set from DICOM objects
    ///
    /// If every slice has a rescale intercept of zero the stored values are
    /// kept and the per-slice rescale slopes become the data set's scaling.
    /// Otherwise the rescale is applied while decoding.
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found or dimensions are inconsistent
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<DataSet, VolumeLoaderError> {
        let mut headers: Vec<_> = dicom_objects
            .iter()
            .filter_map(|dicom_object| Self::extract_header(dicom_object, &sort_by))
            .collect();

        if headers.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::sort_headers(&mut headers, sort_by);

        let keep_stored_values = headers.iter().all(|header| header.intercept == 0.0);
        let modality_lut = if keep_stored_values {
            ModalityLutOption::None
        } else {
            ModalityLutOption::Default
        };

        let images = headers
            .iter()
            .map(|header| Self::decode_image(header.object, &modality_lut))
            .collect::<Option<Vec<_>>>()
            .ok_or(VolumeLoaderError::NoValidImages)?;

        Self::validate_dimensions(&images)?;

        let samples = Self::build_volume_array(&images);
        let scaling = if keep_stored_values {
            let slopes: Vec<f64> = headers.iter().map(|header| header.slope).collect();
            ScalingArray::per_frame_plane(Array2::from_shape_fn((1, slopes.len()), |(_, z)| {
                slopes[z]
            }))
        } else {
            ScalingArray::scalar(1.0)
        };
        let spacing = Self::get_spacing(dicom_objects).ok_or(VolumeLoaderError::MissingSpacing)?;

        let first = headers[0].object;
        let duration = Self::get_frame_duration(first).unwrap_or(DEFAULT_FRAME_DURATION);
        let mut data_set = DataSet::import(
            Self::get_string(first, tags::SERIES_DESCRIPTION).unwrap_or_else(|| "DICOM".into()),
            RawData::from_array(samples),
            scaling,
            TimeFrames::single(duration),
            &NoProgress,
        )?
        .with_voxel_size(spacing);

        if let Some(code) = Self::get_string(first, tags::MODALITY) {
            data_set.set_modality(Modality::from_dicom_code(&code));
        }
        if let Some(date) = Self::get_string(first, tags::STUDY_DATE) {
            data_set.set_scan_date(&date);
        }
        Ok(data_set)
    }

    /// Load a data set from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<DataSet, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a data set from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<DataSet, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        log::info!("loading {} files from {}", paths.len(), path.as_ref().display());
        Self::load_from_file_paths(&paths, sort_by)
    }

    fn extract_header<'a>(
        dicom_object: &'a FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<SliceHeader<'a>> {
        // objects without pixel data are skipped
        dicom_object.element(tags::PIXEL_DATA).ok()?;
        let order = Self::get_sort_order(dicom_object, sort_by)?;
        Some(SliceHeader {
            object: dicom_object,
            order,
            slope: Self::get_float(dicom_object, tags::RESCALE_SLOPE).unwrap_or(1.0),
            intercept: Self::get_float(dicom_object, tags::RESCALE_INTERCEPT).unwrap_or(0.0),
        })
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<Option<f32>> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let pos = dicom_object
                    .element(tags::IMAGE_POSITION_PATIENT)
                    .ok()?
                    .to_multi_float32()
                    .ok()?;
                Some(pos.get(2).copied())
            }
            SortBy::TablePosition => {
                let pos = dicom_object
                    .element(tags::TABLE_POSITION)
                    .ok()?
                    .to_float32()
                    .ok();
                Some(pos)
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(|n| n as f32);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    fn get_float(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: dicom::core::Tag,
    ) -> Option<f64> {
        dicom_object.element(tag).ok()?.to_float64().ok()
    }

    fn get_string(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: dicom::core::Tag,
    ) -> Option<String> {
        let value = dicom_object.element(tag).ok()?.to_str().ok()?;
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_owned())
    }

    /// Actual frame duration, stored in milliseconds
    fn get_frame_duration(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<f64> {
        Self::get_float(dicom_object, tags::ACTUAL_FRAME_DURATION)
            .filter(|ms| *ms > 0.0)
            .map(|ms| ms / 1000.0)
    }

    fn decode_image(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        modality_lut: &ModalityLutOption,
    ) -> Option<Array2<f32>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let options = ConvertOptions::new()
            .with_modality_lut(modality_lut.clone())
            .with_voi_lut(VoiLutOption::Identity);
        pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
    }

    fn sort_headers(headers: &mut [SliceHeader<'_>], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            headers.sort_by(|a, b| {
                a.order
                    .partial_cmp(&b.order)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        if matches!(sort_by, SortBy::ImagePositionPatient) {
            headers.reverse();
        }
    }

    fn validate_dimensions(images: &[Array2<f32>]) -> Result<(), VolumeLoaderError> {
        let first_dim = images[0].dim();
        if images.iter().any(|img| img.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    /// Stack the images into a single frame `[1, z, y, x]` grid
    fn build_volume_array(images: &[Array2<f32>]) -> Array4<f32> {
        let (height, width) = images[0].dim();
        let depth = images.len();
        let mut volume = Array4::<f32>::zeros((1, depth, height, width));

        for (i, image) in images.iter().enumerate() {
            volume.slice_mut(s![0, i, .., ..]).assign(image);
        }

        volume
    }

    /// Voxel size `(x, y, z)`; pixel spacing is stored as (row, column)
    fn get_spacing(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<DVec3> {
        dicom_objects.iter().find_map(|dicom_object| {
            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float64()
                .ok()?;

            let slice_thickness = Self::get_float(dicom_object, tags::SLICE_THICKNESS)?;

            let spacing = DVec3::new(
                *pixel_spacing.get(1)?,
                *pixel_spacing.first()?,
                slice_thickness,
            );
            spacing.cmpgt(DVec3::ZERO).all().then_some(spacing)
        })
    }
}
