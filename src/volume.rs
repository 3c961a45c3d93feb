use std::collections::HashMap;
use std::sync::Arc;

use ndarray::{Array3, ArrayView2, Axis, s};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::enums::LoadState;
use crate::error::{Result, SceneError};

pub type VolumeId = String;

/// Voxel grid placement in patient space. The array shape is
/// (depth, height, width), i.e. (z, y, x).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VolumeGeometry {
    pub dimensions: (usize, usize, usize),
    /// (x, y, z) in millimetres
    pub spacing: (f32, f32, f32),
    pub origin: [f64; 3],
}

/// Array axis a slice is cut along.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliceAxis {
    Depth,
    Height,
    Width,
}

impl SliceAxis {
    /// Picks the array axis closest to the given view plane normal.
    pub fn from_normal(normal: [f64; 3]) -> Self {
        let [x, y, z] = normal.map(f64::abs);
        if z >= x && z >= y {
            SliceAxis::Depth
        } else if y >= x {
            SliceAxis::Height
        } else {
            SliceAxis::Width
        }
    }

    fn ndarray_axis(&self) -> Axis {
        match self {
            SliceAxis::Depth => Axis(0),
            SliceAxis::Height => Axis(1),
            SliceAxis::Width => Axis(2),
        }
    }
}

impl VolumeGeometry {
    pub fn new(dimensions: (usize, usize, usize), spacing: (f32, f32, f32)) -> Self {
        Self {
            dimensions,
            spacing,
            origin: [0.0; 3],
        }
    }

    fn spacing_xyz(&self) -> [f64; 3] {
        let (x, y, z) = self.spacing;
        [x as f64, y as f64, z as f64]
    }

    /// Continuous voxel index (z, y, x) of a world point.
    pub fn world_to_index(&self, world: [f64; 3]) -> [f64; 3] {
        let spacing = self.spacing_xyz();
        let x = (world[0] - self.origin[0]) / spacing[0];
        let y = (world[1] - self.origin[1]) / spacing[1];
        let z = (world[2] - self.origin[2]) / spacing[2];
        [z, y, x]
    }

    pub fn index_to_world(&self, index: [f64; 3]) -> [f64; 3] {
        let spacing = self.spacing_xyz();
        [
            self.origin[0] + index[2] * spacing[0],
            self.origin[1] + index[1] * spacing[1],
            self.origin[2] + index[0] * spacing[2],
        ]
    }

    pub fn center(&self) -> [f64; 3] {
        let (depth, height, width) = self.dimensions;
        self.index_to_world([
            depth.saturating_sub(1) as f64 / 2.0,
            height.saturating_sub(1) as f64 / 2.0,
            width.saturating_sub(1) as f64 / 2.0,
        ])
    }

    /// Physical size along (x, y, z).
    pub fn extent(&self) -> [f64; 3] {
        let spacing = self.spacing_xyz();
        let (depth, height, width) = self.dimensions;
        [
            width as f64 * spacing[0],
            height as f64 * spacing[1],
            depth as f64 * spacing[2],
        ]
    }

    pub fn slice_count(&self, axis: SliceAxis) -> usize {
        match axis {
            SliceAxis::Depth => self.dimensions.0,
            SliceAxis::Height => self.dimensions.1,
            SliceAxis::Width => self.dimensions.2,
        }
    }

    /// Distance between two neighbouring slices along `axis`.
    pub fn slice_spacing(&self, axis: SliceAxis) -> f64 {
        let spacing = self.spacing_xyz();
        match axis {
            SliceAxis::Depth => spacing[2],
            SliceAxis::Height => spacing[1],
            SliceAxis::Width => spacing[0],
        }
    }

    /// Nearest slice index under a world point, `None` outside the grid.
    pub fn slice_index(&self, axis: SliceAxis, world: [f64; 3]) -> Option<usize> {
        let index = self.world_to_index(world);
        let continuous = match axis {
            SliceAxis::Depth => index[0],
            SliceAxis::Height => index[1],
            SliceAxis::Width => index[2],
        };
        let rounded = continuous.round();
        if rounded < 0.0 || rounded >= self.slice_count(axis) as f64 {
            return None;
        }
        Some(rounded as usize)
    }
}

/// Cuts one 2-D slice out of a voxel array, `None` when the index is out of range.
pub fn slice_of<T>(data: &Array3<T>, axis: SliceAxis, index: usize) -> Option<ArrayView2<'_, T>> {
    if index >= data.len_of(axis.ndarray_axis()) {
        return None;
    }
    let view = match axis {
        SliceAxis::Depth => data.slice(s![index, .., ..]),
        SliceAxis::Height => data.slice(s![.., index, ..]),
        SliceAxis::Width => data.slice(s![.., .., index]),
    };
    Some(view)
}

#[derive(Debug)]
pub struct Volume {
    pub id: VolumeId,
    pub state: LoadState,
    pub geometry: Option<VolumeGeometry>,
    pub data: Option<Array3<i16>>,
}

impl Volume {
    pub fn new(id: impl Into<VolumeId>) -> Self {
        Self {
            id: id.into(),
            state: LoadState::Unloaded,
            geometry: None,
            data: None,
        }
    }

    /// Builds an already loaded volume from voxel data.
    pub fn from_data(id: impl Into<VolumeId>, data: Array3<i16>, spacing: (f32, f32, f32)) -> Self {
        let geometry = VolumeGeometry::new(data.dim(), spacing);
        Self {
            id: id.into(),
            state: LoadState::Loaded,
            geometry: Some(geometry),
            data: Some(data),
        }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> Option<(usize, usize, usize)> {
        self.geometry.map(|g| g.dimensions)
    }

    pub fn is_loaded(&self) -> bool {
        self.state == LoadState::Loaded
    }

    pub fn get_slice(&self, axis: SliceAxis, index: usize) -> Option<ArrayView2<'_, i16>> {
        slice_of(self.data.as_ref()?, axis, index)
    }
}

/// Per-voxel segment indices aligned to a base volume's grid.
///
/// Cloning shares the voxel buffer: every viewport the labelmap is
/// attached to reads and paints the same memory.
#[derive(Clone, Debug)]
pub struct Labelmap {
    pub id: VolumeId,
    pub base_volume_id: VolumeId,
    pub geometry: VolumeGeometry,
    voxels: Arc<RwLock<Array3<u8>>>,
}

impl Labelmap {
    pub fn derived_from(id: impl Into<VolumeId>, base: &Volume, geometry: VolumeGeometry) -> Self {
        Self {
            id: id.into(),
            base_volume_id: base.id.clone(),
            geometry,
            voxels: Arc::new(RwLock::new(Array3::zeros(geometry.dimensions))),
        }
    }

    pub fn voxels(&self) -> RwLockReadGuard<'_, Array3<u8>> {
        self.voxels.read()
    }

    pub fn voxels_mut(&self) -> RwLockWriteGuard<'_, Array3<u8>> {
        self.voxels.write()
    }

    pub fn shares_buffer_with(&self, other: &Labelmap) -> bool {
        Arc::ptr_eq(&self.voxels, &other.voxels)
    }

    /// Number of live handles to the voxel buffer.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.voxels)
    }

    /// Number of voxels carrying `segment_index`.
    pub fn count_segment(&self, segment_index: u8) -> usize {
        self.voxels().iter().filter(|&&v| v == segment_index).count()
    }
}

/// Owner of every volume and labelmap the scene knows about.
#[derive(Debug, Default)]
pub struct VolumeCache {
    volumes: HashMap<VolumeId, Volume>,
    labelmaps: HashMap<VolumeId, Labelmap>,
}

impl VolumeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a volume whose geometry is known but whose voxels are still streaming.
    pub fn create_volume(&mut self, id: &str, geometry: VolumeGeometry) -> Result<()> {
        if self.contains(id) {
            return Err(SceneError::DuplicateVolume(id.to_string()));
        }
        let mut volume = Volume::new(id);
        volume.geometry = Some(geometry);
        volume.state = LoadState::Loading;
        self.volumes.insert(id.to_string(), volume);
        debug!(volume_id = id, ?geometry.dimensions, "Volume created");
        Ok(())
    }

    pub fn insert(&mut self, volume: Volume) -> Result<()> {
        if self.contains(&volume.id) {
            return Err(SceneError::DuplicateVolume(volume.id));
        }
        self.volumes.insert(volume.id.clone(), volume);
        Ok(())
    }

    /// Stores streamed voxels and marks the volume loaded.
    pub fn finish_loading(&mut self, id: &str, data: Array3<i16>) -> Result<()> {
        let volume = self
            .volumes
            .get_mut(id)
            .ok_or_else(|| SceneError::VolumeNotFound(id.to_string()))?;
        if let Some(geometry) = volume.geometry
            && geometry.dimensions != data.dim()
        {
            volume.state = LoadState::Error;
            return Err(SceneError::VolumeLoad {
                volume_id: id.to_string(),
                reason: format!(
                    "expected dimensions {:?}, received {:?}",
                    geometry.dimensions,
                    data.dim()
                ),
            });
        }
        volume.data = Some(data);
        volume.state = LoadState::Loaded;
        Ok(())
    }

    pub fn mark_failed(&mut self, id: &str) {
        if let Some(volume) = self.volumes.get_mut(id) {
            volume.state = LoadState::Error;
        }
    }

    pub fn get(&self, id: &str) -> Option<&Volume> {
        self.volumes.get(id)
    }

    pub fn state(&self, id: &str) -> LoadState {
        self.volumes
            .get(id)
            .map(|v| v.state)
            .unwrap_or(LoadState::Unloaded)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.volumes.contains_key(id) || self.labelmaps.contains_key(id)
    }

    pub(crate) fn insert_labelmap(&mut self, labelmap: Labelmap) -> Result<()> {
        if self.contains(&labelmap.id) {
            return Err(SceneError::DuplicateVolume(labelmap.id));
        }
        self.labelmaps.insert(labelmap.id.clone(), labelmap);
        Ok(())
    }

    pub fn labelmap(&self, id: &str) -> Option<&Labelmap> {
        self.labelmaps.get(id)
    }

    pub(crate) fn remove_labelmap(&mut self, id: &str) -> Option<Labelmap> {
        self.labelmaps.remove(id)
    }

    pub fn clear(&mut self) {
        self.volumes.clear();
        self.labelmaps.clear();
    }
}
