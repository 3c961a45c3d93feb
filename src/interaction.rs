//! Applies resolved tool actions to scene state.
//!
//! Every camera and VOI write goes through the [`ViewportRegistry`] with
//! [`ChangeOrigin::Input`], so synchronizers see tool edits exactly like any
//! other state change.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::annotation::{AnnotationStore, LengthMeasurement};
use crate::error::Result;
use crate::segmentation::{BrushStroke, SegmentationManager, paint};
use crate::tool_group::InputSignal;
use crate::tools::ToolConfig;
use crate::viewport::{ChangeOrigin, ViewportRegistry, VoiRange, cross, dot, normalize};
use crate::volume::{SliceAxis, VolumeCache, VolumeGeometry};

/// Zoom factor applied per wheel step.
const WHEEL_ZOOM_STEP: f64 = 1.1;
/// Zoom factor applied per dragged pixel.
const DRAG_ZOOM_STEP: f64 = 1.01;
/// Vertical drag distance that scrolls one slice.
const PIXELS_PER_SLICE: f32 = 8.0;

/// Pointer motion in canvas pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Gesture {
    Drag { from: (f32, f32), to: (f32, f32) },
    /// Positive steps scroll towards the user.
    Wheel { steps: i32 },
    Tap { at: (f32, f32) },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    pub signal: InputSignal,
    pub gesture: Gesture,
}

impl InputEvent {
    pub fn new(signal: InputSignal, gesture: Gesture) -> Self {
        Self { signal, gesture }
    }
}

/// State a tool action may touch.
pub struct InteractionContext<'a> {
    pub viewports: &'a mut ViewportRegistry,
    pub volumes: &'a VolumeCache,
    pub segmentations: &'a SegmentationManager,
    pub annotations: &'a mut AnnotationStore,
}

impl InteractionContext<'_> {
    fn geometry_of(&self, viewport_id: &str) -> Result<Option<VolumeGeometry>> {
        let viewport = self.viewports.get_viewport(viewport_id)?;
        Ok(viewport
            .volumes
            .first()
            .and_then(|id| self.volumes.get(id))
            .and_then(|volume| volume.geometry))
    }

    /// Runs the action of tool `tool`, configured by `config`, on a viewport.
    pub fn apply_tool(
        &mut self,
        viewport_id: &str,
        tool: &str,
        config: &ToolConfig,
        gesture: &Gesture,
    ) -> Result<()> {
        match (config, gesture) {
            (ToolConfig::Pan, Gesture::Drag { from, to }) => self.pan(viewport_id, *from, *to),
            (ToolConfig::Zoom { min_scale, max_scale }, _) => {
                let factor = match gesture {
                    Gesture::Drag { from, to } => DRAG_ZOOM_STEP.powf((from.1 - to.1) as f64),
                    Gesture::Wheel { steps } => WHEEL_ZOOM_STEP.powi(-steps),
                    Gesture::Tap { .. } => return Ok(()),
                };
                self.zoom(viewport_id, factor, *min_scale, *max_scale)
            }
            (ToolConfig::WindowLevel { sensitivity }, Gesture::Drag { from, to }) => {
                let viewport = self.viewports.get_viewport(viewport_id)?;
                let dx = (to.0 - from.0) as f64 * sensitivity;
                let dy = (to.1 - from.1) as f64 * sensitivity;
                let voi =
                    VoiRange::new(viewport.voi.center + dy, (viewport.voi.width + dx).max(1.0));
                self.viewports.set_voi(viewport_id, voi, ChangeOrigin::Input)?;
                Ok(())
            }
            (ToolConfig::StackScroll { invert }, _) => {
                let steps = match gesture {
                    Gesture::Wheel { steps } => *steps,
                    Gesture::Drag { from, to } => {
                        ((to.1 - from.1) / PIXELS_PER_SLICE).round() as i32
                    }
                    Gesture::Tap { .. } => return Ok(()),
                };
                let steps = if *invert { -steps } else { steps };
                self.scroll(viewport_id, steps)
            }
            (ToolConfig::Length, Gesture::Drag { from, to }) => {
                let viewport = self.viewports.get_viewport(viewport_id)?;
                let size = (viewport.surface.width, viewport.surface.height);
                let start = viewport.camera.canvas_to_world(*from, size);
                let end = viewport.camera.canvas_to_world(*to, size);
                self.annotations
                    .add(LengthMeasurement::new(viewport_id, tool, start, end));
                Ok(())
            }
            (ToolConfig::TrackballRotate { degrees_per_pixel }, Gesture::Drag { from, to }) => {
                let dx = (to.0 - from.0) as f64 * degrees_per_pixel;
                let dy = (to.1 - from.1) as f64 * degrees_per_pixel;
                self.rotate(viewport_id, dx.to_radians(), dy.to_radians())
            }
            (ToolConfig::Brush { .. }, Gesture::Drag { to: at, .. } | Gesture::Tap { at }) => {
                self.brush(viewport_id, tool, config, *at)
            }
            _ => {
                debug!(viewport_id, tool, ?gesture, "Gesture has no effect for tool");
                Ok(())
            }
        }
    }

    fn pan(&mut self, viewport_id: &str, from: (f32, f32), to: (f32, f32)) -> Result<()> {
        let viewport = self.viewports.get_viewport(viewport_id)?;
        let size = (viewport.surface.width, viewport.surface.height);
        let start = viewport.camera.canvas_to_world(from, size);
        let end = viewport.camera.canvas_to_world(to, size);
        let mut camera = viewport.camera;
        for axis in 0..3 {
            camera.focal_point[axis] += start[axis] - end[axis];
        }
        self.viewports
            .set_camera(viewport_id, camera, ChangeOrigin::Input)?;
        Ok(())
    }

    fn zoom(
        &mut self,
        viewport_id: &str,
        factor: f64,
        min_scale: f64,
        max_scale: f64,
    ) -> Result<()> {
        let viewport = self.viewports.get_viewport(viewport_id)?;
        let zoom = (viewport.zoom() * factor).clamp(min_scale, max_scale);
        let mut camera = viewport.camera;
        camera.parallel_scale = viewport.initial_parallel_scale / zoom;
        self.viewports
            .set_camera(viewport_id, camera, ChangeOrigin::Input)?;
        Ok(())
    }

    /// Moves the focal point `steps` slices along the view plane normal,
    /// snapping to slice centers and stopping at the first and last slice.
    fn scroll(&mut self, viewport_id: &str, steps: i32) -> Result<()> {
        let Some(geometry) = self.geometry_of(viewport_id)? else {
            debug!(viewport_id, "Nothing to scroll through");
            return Ok(());
        };
        let mut camera = self.viewports.get_viewport(viewport_id)?.camera;
        let axis = SliceAxis::from_normal(camera.view_plane_normal);
        let distance = steps as f64 * geometry.slice_spacing(axis);
        let mut focal_point = camera.focal_point;
        for (component, normal) in focal_point.iter_mut().zip(camera.view_plane_normal) {
            *component += normal * distance;
        }

        let mut index = geometry.world_to_index(focal_point);
        let slot = match axis {
            SliceAxis::Depth => 0,
            SliceAxis::Height => 1,
            SliceAxis::Width => 2,
        };
        let last = geometry.slice_count(axis).saturating_sub(1) as f64;
        index[slot] = index[slot].round().clamp(0.0, last);
        camera.focal_point = geometry.index_to_world(index);

        self.viewports
            .set_camera(viewport_id, camera, ChangeOrigin::Input)?;
        Ok(())
    }

    /// Turns the camera around its focal point: horizontal motion spins
    /// about the view-up vector, vertical motion about the view-right vector.
    fn rotate(&mut self, viewport_id: &str, horizontal: f64, vertical: f64) -> Result<()> {
        let mut camera = self.viewports.get_viewport(viewport_id)?.camera;
        let right = camera.view_right();
        let up = camera.view_up;
        let normal = rodrigues(
            rodrigues(camera.view_plane_normal, up, horizontal),
            right,
            vertical,
        );
        let view_up = rodrigues(up, right, vertical);
        camera.view_plane_normal = normalize(normal);
        camera.view_up = normalize(view_up);
        self.viewports
            .set_camera(viewport_id, camera, ChangeOrigin::Input)?;
        Ok(())
    }

    fn brush(
        &mut self,
        viewport_id: &str,
        tool: &str,
        config: &ToolConfig,
        at: (f32, f32),
    ) -> Result<()> {
        let ToolConfig::Brush {
            strategy,
            radius_mm,
            segment_index,
        } = config
        else {
            return Ok(());
        };
        let Some((segmentation_id, labelmap)) = self.segmentations.active_labelmap(viewport_id)
        else {
            debug!(viewport_id, tool, "No labelmap attached to paint into");
            return Ok(());
        };
        let viewport = self.viewports.get_viewport(viewport_id)?;
        let stroke = BrushStroke {
            center: viewport
                .camera
                .canvas_to_world(at, (viewport.surface.width, viewport.surface.height)),
            radius_mm: *radius_mm,
            planar_axis: strategy
                .is_planar()
                .then(|| SliceAxis::from_normal(viewport.camera.view_plane_normal)),
            value: if strategy.erases() { 0 } else { *segment_index },
        };

        let changed = paint(labelmap, &stroke);
        debug!(viewport_id, tool, segmentation_id, changed, ?strategy, "Brush stroke applied");
        if changed > 0 {
            for target in self.segmentations.viewports_for(segmentation_id) {
                self.viewports.request_redraw(&target);
            }
        }
        Ok(())
    }
}

/// Rotates `v` by `angle` radians about the unit vector `axis`.
fn rodrigues(v: [f64; 3], axis: [f64; 3], angle: f64) -> [f64; 3] {
    if angle == 0.0 {
        return v;
    }
    let axis = normalize(axis);
    let (sin, cos) = angle.sin_cos();
    let k_cross_v = cross(axis, v);
    let k_dot_v = dot(axis, v);
    [0, 1, 2].map(|i| v[i] * cos + k_cross_v[i] * sin + axis[i] * k_dot_v * (1.0 - cos))
}
