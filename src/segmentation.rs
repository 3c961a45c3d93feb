//! Segmentation overlays.
//!
//! The manager only keeps attachment bookkeeping. Every viewport a labelmap
//! representation is attached to renders the same shared voxel buffer, so a
//! brush stroke made in one view shows up in the others after their next
//! redraw without any copying.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Zip, s};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::enums::{LoadState, RepresentationKind};
use crate::error::{Result, SceneError};
use crate::viewport::{ViewportId, ViewportRegistry};
use crate::volume::{Labelmap, SliceAxis, VolumeCache, VolumeId};

pub type SegmentationId = String;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Representation {
    pub kind: RepresentationKind,
    /// Labelmap volume the representation is built from.
    pub volume_id: VolumeId,
}

impl Representation {
    pub fn labelmap(volume_id: &str) -> Self {
        Self {
            kind: RepresentationKind::Labelmap,
            volume_id: volume_id.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Segmentation {
    pub id: SegmentationId,
    pub representations: Vec<Representation>,
}

impl Segmentation {
    pub fn representation(&self, kind: RepresentationKind) -> Option<&Representation> {
        self.representations.iter().find(|r| r.kind == kind)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepresentationState {
    Unregistered,
    Registered,
    /// Visible on this many viewports.
    Attached(usize),
}

#[derive(Clone, Debug, PartialEq)]
struct Attachment {
    viewport_id: ViewportId,
    segmentation_id: SegmentationId,
    kind: RepresentationKind,
}

/// Brush stroke applied to a labelmap.
#[derive(Clone, Copy, Debug)]
pub struct BrushStroke {
    pub center: [f64; 3],
    pub radius_mm: f64,
    /// Restricts the stroke to the slice under `center` along this axis.
    pub planar_axis: Option<SliceAxis>,
    /// Value written inside the stroke, 0 erases.
    pub value: u8,
}

#[derive(Debug, Default)]
pub struct SegmentationManager {
    segmentations: Vec<Segmentation>,
    labelmaps: HashMap<VolumeId, Labelmap>,
    attachments: Vec<Attachment>,
}

impl SegmentationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an empty labelmap on the base volume's grid.
    pub fn create_derived_labelmap(
        &mut self,
        volumes: &mut VolumeCache,
        base_volume_id: &str,
        labelmap_id: &str,
    ) -> Result<Labelmap> {
        let base = volumes
            .get(base_volume_id)
            .ok_or_else(|| SceneError::VolumeNotFound(base_volume_id.to_string()))?;
        let geometry = match (base.state, base.geometry) {
            (LoadState::Loaded, Some(geometry)) => geometry,
            _ => return Err(SceneError::BaseVolumeNotLoaded(base_volume_id.to_string())),
        };
        let labelmap = Labelmap::derived_from(labelmap_id, base, geometry);
        volumes.insert_labelmap(labelmap.clone())?;
        info!(
            labelmap_id,
            base_volume_id,
            dimensions = ?geometry.dimensions,
            "Derived labelmap created"
        );
        Ok(labelmap)
    }

    pub fn register_segmentation(
        &mut self,
        volumes: &VolumeCache,
        segmentation_id: &str,
        representations: Vec<Representation>,
    ) -> Result<()> {
        if self.get(segmentation_id).is_some() {
            return Err(SceneError::DuplicateSegmentation(segmentation_id.to_string()));
        }
        for representation in &representations {
            self.retain_labelmap(volumes, &representation.volume_id)?;
        }
        self.segmentations.push(Segmentation {
            id: segmentation_id.to_string(),
            representations,
        });
        debug!(segmentation_id, "Segmentation registered");
        Ok(())
    }

    /// Adds another representation kind to a registered segmentation.
    /// Re-adding an existing kind is a no-op.
    pub fn add_representation(
        &mut self,
        volumes: &VolumeCache,
        segmentation_id: &str,
        representation: Representation,
    ) -> Result<()> {
        self.retain_labelmap(volumes, &representation.volume_id)?;
        let segmentation = self.get_mut(segmentation_id)?;
        if segmentation.representation(representation.kind).is_none() {
            segmentation.representations.push(representation);
        }
        Ok(())
    }

    fn retain_labelmap(&mut self, volumes: &VolumeCache, volume_id: &str) -> Result<()> {
        if self.labelmaps.contains_key(volume_id) {
            return Ok(());
        }
        let labelmap = volumes
            .labelmap(volume_id)
            .ok_or_else(|| SceneError::VolumeNotFound(volume_id.to_string()))?;
        self.labelmaps.insert(volume_id.to_string(), labelmap.clone());
        Ok(())
    }

    pub fn get(&self, segmentation_id: &str) -> Option<&Segmentation> {
        self.segmentations.iter().find(|s| s.id == segmentation_id)
    }

    fn get_mut(&mut self, segmentation_id: &str) -> Result<&mut Segmentation> {
        self.segmentations
            .iter_mut()
            .find(|s| s.id == segmentation_id)
            .ok_or_else(|| SceneError::SegmentationNotFound(segmentation_id.to_string()))
    }

    /// Shows a representation on a viewport. Attaching twice is a no-op.
    pub fn attach_representation(
        &mut self,
        registry: &mut ViewportRegistry,
        viewport_id: &str,
        segmentation_id: &str,
        kind: RepresentationKind,
    ) -> Result<bool> {
        registry.get_viewport(viewport_id)?;
        let segmentation = self
            .get(segmentation_id)
            .ok_or_else(|| SceneError::SegmentationNotFound(segmentation_id.to_string()))?;
        if segmentation.representation(kind).is_none() {
            return Err(SceneError::RepresentationNotFound {
                segmentation_id: segmentation_id.to_string(),
                kind: kind.to_string(),
            });
        }
        let attachment = Attachment {
            viewport_id: viewport_id.to_string(),
            segmentation_id: segmentation_id.to_string(),
            kind,
        };
        if self.attachments.contains(&attachment) {
            return Ok(false);
        }
        self.attachments.push(attachment);
        registry.request_redraw(viewport_id);
        info!(viewport_id, segmentation_id, %kind, "Representation attached");
        Ok(true)
    }

    /// Hides a representation on a viewport. Detaching something that was
    /// never attached returns `false` and changes nothing.
    pub fn detach_representation(
        &mut self,
        registry: &mut ViewportRegistry,
        viewport_id: &str,
        segmentation_id: &str,
        kind: RepresentationKind,
    ) -> bool {
        let before = self.attachments.len();
        self.attachments.retain(|a| {
            !(a.viewport_id == viewport_id
                && a.segmentation_id == segmentation_id
                && a.kind == kind)
        });
        let removed = self.attachments.len() != before;
        if removed {
            registry.request_redraw(viewport_id);
        }
        removed
    }

    /// Detaches every representation of a segmentation, returning how many
    /// attachments were removed. The segmentation itself stays registered.
    pub fn detach_all(&mut self, registry: &mut ViewportRegistry, segmentation_id: &str) -> usize {
        let (detached, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.attachments)
            .into_iter()
            .partition(|a| a.segmentation_id == segmentation_id);
        self.attachments = kept;
        for attachment in &detached {
            registry.request_redraw(&attachment.viewport_id);
        }
        detached.len()
    }

    /// Unregisters a segmentation and drops the manager's labelmap handles.
    /// Returns the labelmap volume ids that no other segmentation references.
    pub fn destroy_segmentation(
        &mut self,
        registry: &mut ViewportRegistry,
        segmentation_id: &str,
    ) -> Result<Vec<VolumeId>> {
        let index = self
            .segmentations
            .iter()
            .position(|s| s.id == segmentation_id)
            .ok_or_else(|| SceneError::SegmentationNotFound(segmentation_id.to_string()))?;
        self.detach_all(registry, segmentation_id);
        let segmentation = self.segmentations.remove(index);

        let mut released = Vec::new();
        for representation in segmentation.representations {
            let still_used = self.segmentations.iter().any(|s| {
                s.representations
                    .iter()
                    .any(|r| r.volume_id == representation.volume_id)
            });
            if !still_used && self.labelmaps.remove(&representation.volume_id).is_some() {
                released.push(representation.volume_id);
            }
        }
        info!(segmentation_id, "Segmentation destroyed");
        Ok(released)
    }

    pub fn state(&self, segmentation_id: &str, kind: RepresentationKind) -> RepresentationState {
        let registered = self
            .get(segmentation_id)
            .is_some_and(|s| s.representation(kind).is_some());
        if !registered {
            return RepresentationState::Unregistered;
        }
        match self
            .attachments
            .iter()
            .filter(|a| a.segmentation_id == segmentation_id && a.kind == kind)
            .count()
        {
            0 => RepresentationState::Registered,
            n => RepresentationState::Attached(n),
        }
    }

    pub fn is_attached(
        &self,
        viewport_id: &str,
        segmentation_id: &str,
        kind: RepresentationKind,
    ) -> bool {
        self.attachments.iter().any(|a| {
            a.viewport_id == viewport_id && a.segmentation_id == segmentation_id && a.kind == kind
        })
    }

    pub fn viewports_for(&self, segmentation_id: &str) -> Vec<ViewportId> {
        let mut viewports: Vec<ViewportId> = self
            .attachments
            .iter()
            .filter(|a| a.segmentation_id == segmentation_id)
            .map(|a| a.viewport_id.clone())
            .collect();
        viewports.sort();
        viewports.dedup();
        viewports
    }

    pub fn representations_for_viewport(
        &self,
        viewport_id: &str,
    ) -> Vec<(SegmentationId, RepresentationKind)> {
        self.attachments
            .iter()
            .filter(|a| a.viewport_id == viewport_id)
            .map(|a| (a.segmentation_id.clone(), a.kind))
            .collect()
    }

    fn labelmap_of(&self, segmentation_id: &str, kind: RepresentationKind) -> Option<&Labelmap> {
        let representation = self.get(segmentation_id)?.representation(kind)?;
        self.labelmaps.get(&representation.volume_id)
    }

    /// The labelmap a viewport shows for a segmentation, if its labelmap
    /// representation is attached there.
    pub fn labelmap_for_viewport(
        &self,
        viewport_id: &str,
        segmentation_id: &str,
    ) -> Option<&Labelmap> {
        if !self.is_attached(viewport_id, segmentation_id, RepresentationKind::Labelmap) {
            return None;
        }
        self.labelmap_of(segmentation_id, RepresentationKind::Labelmap)
    }

    /// First labelmap attached to a viewport; the one brush tools paint into.
    pub fn active_labelmap(&self, viewport_id: &str) -> Option<(&str, &Labelmap)> {
        self.attachments
            .iter()
            .filter(|a| a.viewport_id == viewport_id && a.kind == RepresentationKind::Labelmap)
            .find_map(|a| {
                self.labelmap_of(&a.segmentation_id, a.kind)
                    .map(|labelmap| (a.segmentation_id.as_str(), labelmap))
            })
    }

    /// Labelmaps behind every representation visible on a viewport.
    pub fn overlays_for_viewport(&self, viewport_id: &str) -> Vec<(RepresentationKind, Labelmap)> {
        self.attachments
            .iter()
            .filter(|a| a.viewport_id == viewport_id)
            .filter_map(|a| {
                self.labelmap_of(&a.segmentation_id, a.kind)
                    .map(|labelmap| (a.kind, labelmap.clone()))
            })
            .collect()
    }

    pub fn remove_viewport(&mut self, viewport_id: &str) {
        self.attachments.retain(|a| a.viewport_id != viewport_id);
    }

    pub fn clear(&mut self) {
        self.segmentations.clear();
        self.labelmaps.clear();
        self.attachments.clear();
    }
}

/// Writes a sphere (or its slice through `center`) into a labelmap.
/// Returns the number of voxels whose value changed.
pub fn paint(labelmap: &Labelmap, stroke: &BrushStroke) -> usize {
    let geometry = labelmap.geometry;
    let (depth, height, width) = geometry.dimensions;
    let [cz, cy, cx] = geometry.world_to_index(stroke.center);
    let (sx, sy, sz) = geometry.spacing;
    let (sx, sy, sz) = (sx as f64, sy as f64, sz as f64);

    let range = |center: f64, spacing: f64, len: usize| -> (usize, usize) {
        let reach = stroke.radius_mm / spacing;
        let low = (center - reach).floor().max(0.0) as usize;
        let high = ((center + reach).ceil() + 1.0).clamp(0.0, len as f64) as usize;
        (low.min(len), high)
    };
    let (mut z0, mut z1) = range(cz, sz, depth);
    let (mut y0, mut y1) = range(cy, sy, height);
    let (mut x0, mut x1) = range(cx, sx, width);

    if let Some(axis) = stroke.planar_axis {
        let (center, len, low, high) = match axis {
            SliceAxis::Depth => (cz, depth, &mut z0, &mut z1),
            SliceAxis::Height => (cy, height, &mut y0, &mut y1),
            SliceAxis::Width => (cx, width, &mut x0, &mut x1),
        };
        let index = center.round();
        if index < 0.0 || index >= len as f64 {
            return 0;
        }
        *low = index as usize;
        *high = index as usize + 1;
    }
    if z0 >= z1 || y0 >= y1 || x0 >= x1 {
        return 0;
    }

    let radius_sq = stroke.radius_mm * stroke.radius_mm;
    let planar = stroke.planar_axis;
    let changed = AtomicUsize::new(0);
    let mut voxels = labelmap.voxels_mut();
    let region = voxels.slice_mut(s![z0..z1, y0..y1, x0..x1]);
    Zip::indexed(region).par_for_each(|(k, j, i), voxel| {
        let dz = if planar == Some(SliceAxis::Depth) {
            0.0
        } else {
            ((z0 + k) as f64 - cz) * sz
        };
        let dy = if planar == Some(SliceAxis::Height) {
            0.0
        } else {
            ((y0 + j) as f64 - cy) * sy
        };
        let dx = if planar == Some(SliceAxis::Width) {
            0.0
        } else {
            ((x0 + i) as f64 - cx) * sx
        };
        if dz * dz + dy * dy + dx * dx <= radius_sq && *voxel != stroke.value {
            *voxel = stroke.value;
            changed.fetch_add(1, Ordering::Relaxed);
        }
    });
    changed.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{Volume, VolumeGeometry};
    use ndarray::Array3;

    fn labelmap() -> Labelmap {
        let base = Volume::from_data("ct", Array3::zeros((9, 9, 9)), (1.0, 1.0, 1.0));
        Labelmap::derived_from("seg", &base, VolumeGeometry::new((9, 9, 9), (1.0, 1.0, 1.0)))
    }

    #[test]
    fn sphere_stroke_paints_a_ball() {
        let labelmap = labelmap();
        let stroke = BrushStroke {
            center: [4.0, 4.0, 4.0],
            radius_mm: 1.0,
            planar_axis: None,
            value: 1,
        };
        // center plus its six face neighbours
        assert_eq!(paint(&labelmap, &stroke), 7);
        assert_eq!(labelmap.count_segment(1), 7);
    }

    #[test]
    fn planar_stroke_stays_on_one_slice() {
        let labelmap = labelmap();
        let stroke = BrushStroke {
            center: [4.0, 4.0, 4.0],
            radius_mm: 1.0,
            planar_axis: Some(SliceAxis::Depth),
            value: 2,
        };
        assert_eq!(paint(&labelmap, &stroke), 5);
        let voxels = labelmap.voxels();
        assert_eq!(voxels[[4, 4, 4]], 2);
        assert_eq!(voxels[[3, 4, 4]], 0);
    }

    #[test]
    fn erasing_only_counts_changed_voxels() {
        let labelmap = labelmap();
        let mut stroke = BrushStroke {
            center: [4.0, 4.0, 4.0],
            radius_mm: 1.0,
            planar_axis: Some(SliceAxis::Depth),
            value: 1,
        };
        paint(&labelmap, &stroke);
        stroke.radius_mm = 0.5;
        stroke.value = 0;
        assert_eq!(paint(&labelmap, &stroke), 1);
        assert_eq!(labelmap.count_segment(1), 4);
    }

    #[test]
    fn stroke_outside_the_grid_changes_nothing() {
        let labelmap = labelmap();
        let stroke = BrushStroke {
            center: [100.0, 100.0, 100.0],
            radius_mm: 2.0,
            planar_axis: None,
            value: 1,
        };
        assert_eq!(paint(&labelmap, &stroke), 0);
    }
}
