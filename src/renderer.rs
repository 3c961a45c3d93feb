//! Rendering backend interface and a CPU reference implementation.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use futures::channel::oneshot;
use image::{Rgb, RgbImage};
use ndarray::{Array2, CowArray, Ix2};
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::enums::{ProjectionKind, RepresentationKind};
use crate::error::{Result, SceneError};
use crate::interpolator::Interpolator;
use crate::viewport::{Viewport, ViewportId, ViewportStatus, VoiRange};
use crate::volume::{Labelmap, SliceAxis, Volume, VolumeGeometry, slice_of};

/// Colors of segment indices 1, 2, 3, ...
const SEGMENT_COLORS: [[u8; 3]; 5] = [
    [221, 84, 84],
    [77, 228, 121],
    [166, 70, 235],
    [189, 180, 116],
    [109, 182, 115],
];

const ERROR_OVERLAY: Rgb<u8> = Rgb([96, 0, 0]);

/// Everything a backend needs to draw one viewport.
pub struct FrameRequest<'a> {
    pub viewport: &'a Viewport,
    pub volume: Option<&'a Volume>,
    pub overlays: Vec<(RepresentationKind, Labelmap)>,
}

#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn initialize(&self) -> Result<()>;

    /// Draws each requested viewport. A failure on one viewport must not
    /// keep the others from drawing.
    fn render(&self, requests: &[FrameRequest<'_>]) -> Vec<(ViewportId, Result<()>)>;

    /// Resolves once the backend has completed a full pass over the scene
    /// and the initial camera and VOI state has settled.
    fn stabilized(&self) -> oneshot::Receiver<()>;
}

#[derive(Default)]
struct Stabilization {
    stable: bool,
    waiters: Vec<oneshot::Sender<()>>,
}

/// CPU renderer producing one RGB frame per viewport.
///
/// Slice viewports show the slice under the camera's focal point, volumetric
/// viewports show a maximum intensity projection. Named colormaps render as
/// grayscale.
#[derive(Default)]
pub struct SoftwareRenderer {
    initialized: Mutex<bool>,
    frames: Mutex<HashMap<ViewportId, RgbImage>>,
    stabilization: Mutex<Stabilization>,
}

impl SoftwareRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last frame drawn for a viewport.
    pub fn frame(&self, viewport_id: &str) -> Option<RgbImage> {
        self.frames.lock().get(viewport_id).cloned()
    }

    pub fn save_frame(&self, viewport_id: &str, path: impl AsRef<Path>) -> Result<()> {
        let frame = self
            .frame(viewport_id)
            .ok_or_else(|| SceneError::ViewportNotFound(viewport_id.to_string()))?;
        frame.save(path.as_ref()).map_err(|err| SceneError::Render {
            viewport_id: viewport_id.to_string(),
            reason: err.to_string(),
        })
    }

    fn render_viewport(request: &FrameRequest<'_>) -> Result<RgbImage> {
        let viewport = request.viewport;
        let (width, height) = (viewport.surface.width, viewport.surface.height);
        let background = Rgb(viewport
            .properties
            .background
            .map(|c| (c.clamp(0.0, 1.0) * 255.0) as u8));

        if let ViewportStatus::Error(_) = viewport.status {
            return Ok(RgbImage::from_pixel(width, height, ERROR_OVERLAY));
        }
        let Some(volume) = request.volume.filter(|v| v.is_loaded()) else {
            return Ok(RgbImage::from_pixel(width, height, background));
        };
        let render_error = |reason: &str| SceneError::Render {
            viewport_id: viewport.id().to_string(),
            reason: reason.to_string(),
        };
        let (Some(geometry), Some(data)) = (volume.geometry, volume.data.as_ref()) else {
            return Err(render_error("volume has no voxel data"));
        };

        let axis = SliceAxis::from_normal(viewport.camera.view_plane_normal);
        let slice_index = match viewport.projection() {
            ProjectionKind::OrthographicSlice => Some(
                geometry
                    .slice_index(axis, viewport.camera.focal_point)
                    .ok_or_else(|| render_error("focal point lies outside the volume"))?,
            ),
            ProjectionKind::Volumetric3d => None,
        };

        let image: Option<CowArray<'_, i16, Ix2>> = if viewport.properties.volume_visible {
            match slice_index {
                Some(index) => slice_of(data, axis, index).map(CowArray::from),
                None => Some(CowArray::from(max_projection(data, axis, i16::MIN))),
            }
        } else {
            None
        };

        let overlays: Vec<Array2<u8>> = request
            .overlays
            .iter()
            .filter(|(kind, _)| *kind != RepresentationKind::Contour)
            .filter_map(|(_, labelmap)| {
                let voxels = labelmap.voxels();
                match slice_index {
                    Some(index) => slice_of(&*voxels, axis, index).map(|v| v.to_owned()),
                    None => Some(max_projection(&*voxels, axis, 0)),
                }
            })
            .collect();

        let mut pixels = vec![0u8; width as usize * height as usize * 3];
        pixels
            .par_chunks_mut(width as usize * 3)
            .enumerate()
            .for_each(|(row, line)| {
                for column in 0..width as usize {
                    let world = viewport.camera.canvas_to_world(
                        (column as f32 + 0.5, row as f32 + 0.5),
                        (width, height),
                    );
                    let (y, x) = plane_coordinates(&geometry, axis, world);
                    let mut color = image
                        .as_ref()
                        .and_then(|plane| Interpolator::bilinear_interpolate(&plane.view(), y, x))
                        .map(|value| {
                            let level = apply_voi(value, &viewport.voi, viewport.invert);
                            Rgb([level; 3])
                        })
                        .unwrap_or(background);
                    for overlay in &overlays {
                        if let Some(label) = Interpolator::nearest(&overlay.view(), y, x)
                            && label > 0
                        {
                            color = blend(color, segment_color(label));
                        }
                    }
                    line[column * 3..column * 3 + 3].copy_from_slice(&color.0);
                }
            });

        RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| render_error("frame buffer size mismatch"))
    }
}

#[async_trait]
impl RenderBackend for SoftwareRenderer {
    async fn initialize(&self) -> Result<()> {
        let mut initialized = self.initialized.lock();
        if !*initialized {
            *initialized = true;
            info!(threads = rayon::current_num_threads(), "Software renderer initialized");
        }
        Ok(())
    }

    fn render(&self, requests: &[FrameRequest<'_>]) -> Vec<(ViewportId, Result<()>)> {
        let rendered: Vec<(ViewportId, Result<RgbImage>)> = requests
            .par_iter()
            .map(|request| (request.viewport.id().to_string(), Self::render_viewport(request)))
            .collect();

        let mut frames = self.frames.lock();
        let results: Vec<(ViewportId, Result<()>)> = rendered
            .into_iter()
            .map(|(viewport_id, frame)| {
                let result = frame.map(|frame| {
                    frames.insert(viewport_id.clone(), frame);
                });
                (viewport_id, result)
            })
            .collect();
        drop(frames);

        let mut stabilization = self.stabilization.lock();
        if !stabilization.stable && !requests.is_empty() {
            stabilization.stable = true;
            debug!(viewports = requests.len(), "First full render pass complete");
            for waiter in stabilization.waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
        results
    }

    fn stabilized(&self) -> oneshot::Receiver<()> {
        let (sender, receiver) = oneshot::channel();
        let mut stabilization = self.stabilization.lock();
        if stabilization.stable {
            let _ = sender.send(());
        } else {
            stabilization.waiters.push(sender);
        }
        receiver
    }
}

/// Fractional (row, column) inside the 2-D plane cut along `axis`.
fn plane_coordinates(geometry: &VolumeGeometry, axis: SliceAxis, world: [f64; 3]) -> (f64, f64) {
    let [z, y, x] = geometry.world_to_index(world);
    match axis {
        SliceAxis::Depth => (y, x),
        SliceAxis::Height => (z, x),
        SliceAxis::Width => (z, y),
    }
}

fn max_projection<T: Copy + Ord>(
    data: &ndarray::Array3<T>,
    axis: SliceAxis,
    floor: T,
) -> Array2<T> {
    let ndarray_axis = match axis {
        SliceAxis::Depth => ndarray::Axis(0),
        SliceAxis::Height => ndarray::Axis(1),
        SliceAxis::Width => ndarray::Axis(2),
    };
    data.map_axis(ndarray_axis, |lane| lane.iter().copied().fold(floor, T::max))
}

#[inline]
fn apply_voi(value: f64, voi: &VoiRange, invert: bool) -> u8 {
    let normalized = ((value - voi.lower()) / voi.width.max(1.0)).clamp(0.0, 1.0);
    let level = if invert { 1.0 - normalized } else { normalized };
    (level * 255.0).round() as u8
}

fn segment_color(label: u8) -> Rgb<u8> {
    Rgb(SEGMENT_COLORS[(label as usize - 1) % SEGMENT_COLORS.len()])
}

fn blend(base: Rgb<u8>, overlay: Rgb<u8>) -> Rgb<u8> {
    Rgb([0, 1, 2].map(|c| ((base.0[c] as u16 + overlay.0[c] as u16) / 2) as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voi_maps_window_bounds_to_black_and_white() {
        let voi = VoiRange::new(40.0, 400.0);
        assert_eq!(apply_voi(-160.0, &voi, false), 0);
        assert_eq!(apply_voi(240.0, &voi, false), 255);
        assert_eq!(apply_voi(1000.0, &voi, false), 255);
        assert_eq!(apply_voi(240.0, &voi, true), 0);
    }

    #[test]
    fn segment_colors_wrap_around() {
        assert_eq!(segment_color(1), segment_color(6));
    }
}
