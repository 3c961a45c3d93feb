use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
    /// Free camera, the view plane is whatever the camera says it is.
    Oblique,
}

impl Orientation {
    /// Unit normal of the view plane in patient space (x, y, z).
    pub fn view_plane_normal(&self) -> [f64; 3] {
        match self {
            Orientation::Axial => [0.0, 0.0, -1.0],
            Orientation::Coronal => [0.0, 1.0, 0.0],
            Orientation::Sagittal => [1.0, 0.0, 0.0],
            Orientation::Oblique => [0.0, 0.0, -1.0],
        }
    }

    pub fn view_up(&self) -> [f64; 3] {
        match self {
            Orientation::Axial => [0.0, -1.0, 0.0],
            Orientation::Coronal | Orientation::Sagittal => [0.0, 0.0, 1.0],
            Orientation::Oblique => [0.0, -1.0, 0.0],
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Axial => write!(f, "axial"),
            Orientation::Coronal => write!(f, "coronal"),
            Orientation::Sagittal => write!(f, "sagittal"),
            Orientation::Oblique => write!(f, "oblique"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectionKind {
    OrthographicSlice,
    Volumetric3d,
}

impl fmt::Display for ProjectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionKind::OrthographicSlice => write!(f, "orthographic-slice"),
            ProjectionKind::Volumetric3d => write!(f, "volumetric-3d"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationMode {
    Active,
    Passive,
    #[default]
    Disabled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepresentationKind {
    Labelmap,
    Surface,
    Contour,
}

impl fmt::Display for RepresentationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepresentationKind::Labelmap => write!(f, "labelmap"),
            RepresentationKind::Surface => write!(f, "surface"),
            RepresentationKind::Contour => write!(f, "contour"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Primary,
    Secondary,
    Auxiliary,
    Wheel,
}

/// Keyboard modifier combination held while the pointer signal fires.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifierKey {
    #[default]
    None,
    Shift,
    Ctrl,
    Alt,
    ShiftCtrl,
    ShiftAlt,
    CtrlAlt,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Error,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    InstanceNumber,
    None,
}
