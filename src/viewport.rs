use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::enums::{Orientation, ProjectionKind};
use crate::error::{Result, SceneError};
use crate::volume::{VolumeGeometry, VolumeId};

pub type ViewportId = String;

/// Camera pose in patient space, all lengths in millimetres.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub focal_point: [f64; 3],
    pub view_plane_normal: [f64; 3],
    pub view_up: [f64; 3],
    /// Half of the visible height.
    pub parallel_scale: f64,
}

impl Camera {
    pub fn for_orientation(orientation: Orientation) -> Self {
        Self {
            focal_point: [0.0; 3],
            view_plane_normal: orientation.view_plane_normal(),
            view_up: orientation.view_up(),
            parallel_scale: 1.0,
        }
    }

    /// Centers the camera on a volume and fits its largest extent.
    pub fn fit_to(&mut self, geometry: &VolumeGeometry) {
        let extent = geometry.extent();
        self.focal_point = geometry.center();
        self.parallel_scale = extent.iter().cloned().fold(0.0, f64::max) / 2.0;
    }

    pub fn view_right(&self) -> [f64; 3] {
        normalize(cross(self.view_up, self.view_plane_normal))
    }

    /// Maps a canvas pixel to the world point on the focal plane.
    pub fn canvas_to_world(&self, canvas: (f32, f32), size: (u32, u32)) -> [f64; 3] {
        let (width, height) = (size.0 as f64, size.1 as f64);
        let mm_per_pixel = 2.0 * self.parallel_scale / height.max(1.0);
        let dx = (canvas.0 as f64 - width / 2.0) * mm_per_pixel;
        let dy = (height / 2.0 - canvas.1 as f64) * mm_per_pixel;
        let right = self.view_right();
        let mut world = self.focal_point;
        for axis in 0..3 {
            world[axis] += dx * right[axis] + dy * self.view_up[axis];
        }
        world
    }
}

pub(crate) fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub(crate) fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn normalize(v: [f64; 3]) -> [f64; 3] {
    let length = dot(v, v).sqrt();
    if length == 0.0 {
        return v;
    }
    v.map(|c| c / length)
}

/// Window/level intensity mapping.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoiRange {
    pub center: f64,
    pub width: f64,
}

impl VoiRange {
    pub fn new(center: f64, width: f64) -> Self {
        Self { center, width }
    }

    pub fn from_range(lower: f64, upper: f64) -> Self {
        Self {
            center: (lower + upper) / 2.0,
            width: upper - lower,
        }
    }

    pub fn lower(&self) -> f64 {
        self.center - self.width / 2.0
    }

    pub fn upper(&self) -> f64 {
        self.center + self.width / 2.0
    }
}

impl Default for VoiRange {
    /// Soft-tissue CT window.
    fn default() -> Self {
        Self::new(40.0, 400.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Colormap {
    #[default]
    Grayscale,
    Named(String),
}

/// Handle to the host UI element a viewport draws into.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfaceHandle {
    pub element: String,
    pub width: u32,
    pub height: u32,
}

impl SurfaceHandle {
    pub fn new(element: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            element: element.into(),
            width,
            height,
        }
    }

    fn validate(&self, viewport_id: &str) -> Result<()> {
        let reason = if self.element.trim().is_empty() {
            "empty element handle"
        } else if self.width == 0 || self.height == 0 {
            "zero-sized surface"
        } else {
            return Ok(());
        };
        Err(SceneError::InvalidSurface {
            viewport_id: viewport_id.to_string(),
            reason: reason.to_string(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewportSpec {
    pub id: ViewportId,
    pub projection: ProjectionKind,
    pub orientation: Orientation,
    pub surface: SurfaceHandle,
    pub volume: Option<VolumeId>,
    #[serde(default)]
    pub background: Option<[f32; 3]>,
    /// Named transfer-function preset for volumetric rendering.
    #[serde(default)]
    pub preset: Option<String>,
}

impl ViewportSpec {
    pub fn slice(id: &str, orientation: Orientation, element: &str) -> Self {
        Self {
            id: id.to_string(),
            projection: ProjectionKind::OrthographicSlice,
            orientation,
            surface: SurfaceHandle::new(element, 512, 512),
            volume: None,
            background: None,
            preset: None,
        }
    }

    pub fn volume_3d(id: &str, element: &str) -> Self {
        Self {
            id: id.to_string(),
            projection: ProjectionKind::Volumetric3d,
            orientation: Orientation::Coronal,
            surface: SurfaceHandle::new(element, 512, 512),
            volume: None,
            background: None,
            preset: None,
        }
    }

    pub fn with_volume(mut self, volume_id: &str) -> Self {
        self.volume = Some(volume_id.to_string());
        self
    }

    pub fn with_background(mut self, background: [f32; 3]) -> Self {
        self.background = Some(background);
        self
    }

    pub fn with_preset(mut self, preset: &str) -> Self {
        self.preset = Some(preset.to_string());
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ViewportStatus {
    Loading,
    Ready,
    /// The viewport shows an error overlay instead of image data.
    Error(String),
}

/// Rendering properties that are not synchronized.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewportProperties {
    pub preset: Option<String>,
    pub volume_visible: bool,
    pub background: [f32; 3],
}

impl Default for ViewportProperties {
    fn default() -> Self {
        Self {
            preset: None,
            volume_visible: true,
            background: [0.0; 3],
        }
    }
}

#[derive(Clone, Debug)]
pub struct Viewport {
    id: ViewportId,
    projection: ProjectionKind,
    pub orientation: Orientation,
    pub surface: SurfaceHandle,
    pub camera: Camera,
    pub voi: VoiRange,
    pub colormap: Colormap,
    pub invert: bool,
    pub volumes: Vec<VolumeId>,
    pub status: ViewportStatus,
    pub properties: ViewportProperties,
    /// Parallel scale the camera had when the volume was first fitted.
    pub(crate) initial_parallel_scale: f64,
}

impl Viewport {
    fn from_spec(spec: &ViewportSpec, voi: VoiRange) -> Self {
        let mut properties = ViewportProperties::default();
        if let Some(background) = spec.background {
            properties.background = background;
        }
        properties.preset = spec.preset.clone();
        Self {
            id: spec.id.clone(),
            projection: spec.projection,
            orientation: spec.orientation,
            surface: spec.surface.clone(),
            camera: Camera::for_orientation(spec.orientation),
            voi,
            colormap: Colormap::default(),
            invert: false,
            volumes: spec.volume.iter().cloned().collect(),
            status: ViewportStatus::Loading,
            properties,
            initial_parallel_scale: 1.0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn projection(&self) -> ProjectionKind {
        self.projection
    }

    pub fn zoom(&self) -> f64 {
        self.initial_parallel_scale / self.camera.parallel_scale
    }
}

/// Who caused a viewport change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A resolved tool action.
    Input,
    /// Programmatic change by the host or the setup sequence.
    Api,
    /// Relayed by the named synchronizer.
    Synchronizer(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ViewportChange {
    Camera(Camera),
    Voi(VoiRange),
    Colormap(Colormap),
    Invert(bool),
}

impl fmt::Display for ViewportChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewportChange::Camera(_) => write!(f, "camera"),
            ViewportChange::Voi(_) => write!(f, "voi"),
            ViewportChange::Colormap(_) => write!(f, "colormap"),
            ViewportChange::Invert(_) => write!(f, "invert"),
        }
    }
}

/// Notification queued whenever a viewport's synchronizable state changes.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewportEvent {
    pub viewport_id: ViewportId,
    pub change: ViewportChange,
    pub origin: ChangeOrigin,
}

/// Owner of every live viewport.
#[derive(Debug, Default)]
pub struct ViewportRegistry {
    viewports: Vec<Viewport>,
    events: VecDeque<ViewportEvent>,
    redraw: BTreeSet<ViewportId>,
    default_voi: VoiRange,
}

impl ViewportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_voi(voi: VoiRange) -> Self {
        Self {
            default_voi: voi,
            ..Self::default()
        }
    }

    /// Defines a batch of viewports in order. Nothing is added if any spec is rejected.
    pub fn define_viewports(&mut self, specs: &[ViewportSpec]) -> Result<()> {
        let mut seen = BTreeSet::new();
        for spec in specs {
            if !seen.insert(spec.id.as_str()) || self.contains(&spec.id) {
                return Err(SceneError::DuplicateViewportId(spec.id.clone()));
            }
            spec.surface.validate(&spec.id)?;
        }
        for spec in specs {
            self.viewports
                .push(Viewport::from_spec(spec, self.default_voi));
            self.redraw.insert(spec.id.clone());
            info!(
                viewport_id = %spec.id,
                projection = %spec.projection,
                orientation = %spec.orientation,
                "Viewport defined"
            );
        }
        Ok(())
    }

    pub fn get_viewport(&self, id: &str) -> Result<&Viewport> {
        self.viewports
            .iter()
            .find(|v| v.id == id)
            .ok_or_else(|| SceneError::ViewportNotFound(id.to_string()))
    }

    fn viewport_mut(&mut self, id: &str) -> Result<&mut Viewport> {
        self.viewports
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| SceneError::ViewportNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.viewports.iter().any(|v| v.id == id)
    }

    pub fn ids(&self) -> Vec<ViewportId> {
        self.viewports.iter().map(|v| v.id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Viewport> {
        self.viewports.iter()
    }

    pub fn len(&self) -> usize {
        self.viewports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewports.is_empty()
    }

    pub fn surface(&self, id: &str) -> Result<&SurfaceHandle> {
        Ok(&self.get_viewport(id)?.surface)
    }

    pub fn remove_viewport(&mut self, id: &str) -> Result<Viewport> {
        let index = self
            .viewports
            .iter()
            .position(|v| v.id == id)
            .ok_or_else(|| SceneError::ViewportNotFound(id.to_string()))?;
        self.redraw.remove(id);
        debug!(viewport_id = id, "Viewport removed");
        Ok(self.viewports.remove(index))
    }

    /// Assigns volumes and fits the camera to the first one's geometry.
    pub fn set_volumes(
        &mut self,
        id: &str,
        volumes: Vec<VolumeId>,
        geometry: Option<&VolumeGeometry>,
    ) -> Result<()> {
        let viewport = self.viewport_mut(id)?;
        viewport.volumes = volumes;
        if let Some(geometry) = geometry {
            viewport.camera.fit_to(geometry);
            viewport.initial_parallel_scale = viewport.camera.parallel_scale;
        }
        self.redraw.insert(id.to_string());
        Ok(())
    }

    pub fn set_status(&mut self, id: &str, status: ViewportStatus) -> Result<()> {
        let viewport = self.viewport_mut(id)?;
        if viewport.status != status {
            viewport.status = status;
            self.redraw.insert(id.to_string());
        }
        Ok(())
    }

    pub fn set_properties(&mut self, id: &str, properties: ViewportProperties) -> Result<()> {
        let viewport = self.viewport_mut(id)?;
        if viewport.properties != properties {
            viewport.properties = properties;
            self.redraw.insert(id.to_string());
        }
        Ok(())
    }

    pub fn set_camera(&mut self, id: &str, camera: Camera, origin: ChangeOrigin) -> Result<bool> {
        self.apply(id, ViewportChange::Camera(camera), origin)
    }

    pub fn set_voi(&mut self, id: &str, voi: VoiRange, origin: ChangeOrigin) -> Result<bool> {
        self.apply(id, ViewportChange::Voi(voi), origin)
    }

    pub fn set_colormap(
        &mut self,
        id: &str,
        colormap: Colormap,
        origin: ChangeOrigin,
    ) -> Result<bool> {
        self.apply(id, ViewportChange::Colormap(colormap), origin)
    }

    pub fn set_invert(&mut self, id: &str, invert: bool, origin: ChangeOrigin) -> Result<bool> {
        self.apply(id, ViewportChange::Invert(invert), origin)
    }

    /// Applies an absolute state change. Returns `false` and queues nothing
    /// when the viewport already holds that value.
    pub fn apply(
        &mut self,
        id: &str,
        change: ViewportChange,
        origin: ChangeOrigin,
    ) -> Result<bool> {
        let viewport = self.viewport_mut(id)?;
        let changed = match &change {
            ViewportChange::Camera(camera) => replace_if_changed(&mut viewport.camera, camera),
            ViewportChange::Voi(voi) => replace_if_changed(&mut viewport.voi, voi),
            ViewportChange::Colormap(colormap) => {
                replace_if_changed(&mut viewport.colormap, colormap)
            }
            ViewportChange::Invert(invert) => replace_if_changed(&mut viewport.invert, invert),
        };
        if changed {
            self.redraw.insert(id.to_string());
            self.events.push_back(ViewportEvent {
                viewport_id: id.to_string(),
                change,
                origin,
            });
        }
        Ok(changed)
    }

    pub fn request_redraw(&mut self, id: &str) {
        if self.contains(id) {
            self.redraw.insert(id.to_string());
        }
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn pop_event(&mut self) -> Option<ViewportEvent> {
        self.events.pop_front()
    }

    pub fn take_events(&mut self) -> Vec<ViewportEvent> {
        self.events.drain(..).collect()
    }

    pub fn take_redraw_requests(&mut self) -> Vec<ViewportId> {
        std::mem::take(&mut self.redraw).into_iter().collect()
    }

    pub fn clear(&mut self) {
        self.viewports.clear();
        self.events.clear();
        self.redraw.clear();
    }
}

fn replace_if_changed<T: Clone + PartialEq>(slot: &mut T, value: &T) -> bool {
    if slot == value {
        return false;
    }
    *slot = value.clone();
    true
}
