use crate::{
    enums::SortBy,
    error::{Result, SceneError},
    volume::VolumeGeometry,
};

use async_trait::async_trait;
use dicom::{
    object::{DefaultDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use ndarray::{Array2, Array3, s};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Opaque reference to one image of a series, resolved by the provider that issued it.
pub type ImageId = String;

/// Source of image metadata and voxel data for a scene.
#[async_trait]
pub trait VolumeDataProvider: Send + Sync {
    /// Resolves the images of one series, in slice order.
    async fn list_image_references(
        &self,
        study_instance_uid: &str,
        series_instance_uid: &str,
        archive_root: &str,
    ) -> Result<Vec<ImageId>>;

    /// Reads the metadata needed to place the volume without decoding voxels.
    async fn create_volume(&self, volume_id: &str, image_ids: &[ImageId]) -> Result<VolumeGeometry>;

    /// Decodes every image into a (depth, height, width) array.
    async fn load_volume(&self, volume_id: &str, image_ids: &[ImageId]) -> Result<Array3<i16>>;
}

/// Serves series from a directory of `.dcm` files.
///
/// Files are matched on Study and Series Instance UID and decoded in
/// parallel using rayon. Multiframe files only contribute their first frame.
#[derive(Clone, Debug, Default)]
pub struct DicomDirectoryProvider {
    sort_by: SortBy,
}

impl DicomDirectoryProvider {
    pub fn new(sort_by: SortBy) -> Self {
        Self { sort_by }
    }

    fn dicom_files(archive_root: &Path) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(archive_root)
            .map_err(|_| SceneError::ArchiveUnreachable(archive_root.display().to_string()))?;
        Ok(entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect())
    }

    fn text(dicom_object: &DefaultDicomObject, tag: dicom::core::Tag) -> Option<String> {
        let value = dicom_object.element(tag).ok()?.to_str().ok()?;
        Some(value.trim_end_matches(['\0', ' ']).to_string())
    }

    fn get_sort_order(&self, dicom_object: &DefaultDicomObject) -> Option<f32> {
        match self.sort_by {
            SortBy::ImagePositionPatient => Self::image_position(dicom_object).map(|p| p[2] as f32),
            SortBy::InstanceNumber => dicom_object
                .element(tags::INSTANCE_NUMBER)
                .ok()?
                .to_int::<i32>()
                .ok()
                .map(|n| n as f32),
            SortBy::None => Some(0.0),
        }
    }

    fn image_position(dicom_object: &DefaultDicomObject) -> Option<[f64; 3]> {
        let position = dicom_object
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()?
            .to_multi_float64()
            .ok()?;
        match position.as_slice() {
            [x, y, z, ..] => Some([*x, *y, *z]),
            _ => None,
        }
    }

    fn get_spacing(dicom_object: &DefaultDicomObject) -> Option<(f32, f32, f32)> {
        let pixel_spacing = dicom_object
            .element(tags::PIXEL_SPACING)
            .ok()?
            .to_multi_float32()
            .ok()?;
        let slice_thickness = dicom_object
            .element(tags::SLICE_THICKNESS)
            .ok()?
            .to_float32()
            .ok()?;
        match pixel_spacing.as_slice() {
            [row, column, ..] => Some((*column, *row, slice_thickness)),
            _ => None,
        }
    }

    fn get_dimensions(dicom_object: &DefaultDicomObject) -> Option<(usize, usize)> {
        let rows = dicom_object.element(tags::ROWS).ok()?.to_int::<u32>().ok()?;
        let columns = dicom_object.element(tags::COLUMNS).ok()?.to_int::<u32>().ok()?;
        Some((rows as usize, columns as usize))
    }

    fn decode_image(volume_id: &str, path: &str) -> Result<Array2<i16>> {
        let load_error = |reason: String| SceneError::VolumeLoad {
            volume_id: volume_id.to_string(),
            reason: format!("{path}: {reason}"),
        };
        let dicom_object = open_file(path)?;
        let pixel_data = dicom_object
            .decode_pixel_data()
            .map_err(|err| load_error(err.to_string()))?;
        // modality LUT only, so values stay in stored units (HU for CT)
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::Identity);
        pixel_data
            .to_ndarray_with_options::<i16>(&options)
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
            .map_err(|err| load_error(err.to_string()))
    }

    fn build_volume_array(images: &[Array2<i16>]) -> Array3<i16> {
        let (height, width) = images[0].dim();
        let depth = images.len();
        let mut volume = Array3::<i16>::zeros((depth, height, width));

        for (i, image) in images.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(image);
        }

        volume
    }
}

#[async_trait]
impl VolumeDataProvider for DicomDirectoryProvider {
    async fn list_image_references(
        &self,
        study_instance_uid: &str,
        series_instance_uid: &str,
        archive_root: &str,
    ) -> Result<Vec<ImageId>> {
        let paths = Self::dicom_files(Path::new(archive_root))?;
        let mut matching: Vec<(Option<f32>, ImageId)> = paths
            .par_iter()
            .filter_map(|path| {
                let dicom_object = open_file(path).ok()?;
                let study = Self::text(&dicom_object, tags::STUDY_INSTANCE_UID)?;
                let series = Self::text(&dicom_object, tags::SERIES_INSTANCE_UID)?;
                (study == study_instance_uid && series == series_instance_uid).then(|| {
                    (
                        self.get_sort_order(&dicom_object),
                        path.display().to_string(),
                    )
                })
            })
            .collect();

        if matching.is_empty() {
            return Err(SceneError::SeriesNotFound {
                study: study_instance_uid.to_string(),
                series: series_instance_uid.to_string(),
            });
        }
        if self.sort_by != SortBy::None {
            matching.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        }
        info!(
            series = series_instance_uid,
            images = matching.len(),
            archive_root,
            "Series resolved"
        );
        Ok(matching.into_iter().map(|(_, path)| path).collect())
    }

    async fn create_volume(
        &self,
        volume_id: &str,
        image_ids: &[ImageId],
    ) -> Result<VolumeGeometry> {
        let missing = |what: &str| SceneError::VolumeLoad {
            volume_id: volume_id.to_string(),
            reason: format!("missing {what}"),
        };
        let first = image_ids.first().ok_or_else(|| missing("images"))?;
        let dicom_object = open_file(first)?;
        let (height, width) =
            Self::get_dimensions(&dicom_object).ok_or_else(|| missing("image dimensions"))?;
        let spacing =
            Self::get_spacing(&dicom_object).ok_or_else(|| missing("spacing information"))?;

        let mut geometry = VolumeGeometry::new((image_ids.len(), height, width), spacing);
        if let Some(origin) = Self::image_position(&dicom_object) {
            geometry.origin = origin;
        }
        debug!(volume_id, dimensions = ?geometry.dimensions, ?spacing, "Volume metadata read");
        Ok(geometry)
    }

    async fn load_volume(&self, volume_id: &str, image_ids: &[ImageId]) -> Result<Array3<i16>> {
        if image_ids.is_empty() {
            return Err(SceneError::VolumeLoad {
                volume_id: volume_id.to_string(),
                reason: "no images to load".to_string(),
            });
        }
        let images: Vec<Array2<i16>> = image_ids
            .par_iter()
            .map(|path| Self::decode_image(volume_id, path))
            .collect::<Result<_>>()?;

        let first_dim = images[0].dim();
        if images.iter().any(|img| img.dim() != first_dim) {
            return Err(SceneError::VolumeLoad {
                volume_id: volume_id.to_string(),
                reason: "inconsistent image dimensions".to_string(),
            });
        }

        let volume = Self::build_volume_array(&images);
        info!(volume_id, dimensions = ?volume.dim(), "Volume loaded");
        Ok(volume)
    }
}
