use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::enums::ProjectionKind;
use crate::scene::{SceneState, SetupStep};
use crate::tools::ToolKind;

/// Coarse classification used to decide whether an error aborts setup,
/// is surfaced to the caller, or is only logged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    ResourceUnavailable,
    StateInconsistency,
    Lifecycle,
    Render,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::ResourceUnavailable => "resource unavailable",
            ErrorCategory::StateInconsistency => "state inconsistency",
            ErrorCategory::Lifecycle => "lifecycle",
            ErrorCategory::Render => "render",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("Viewport id `{0}` is defined more than once")]
    DuplicateViewportId(String),

    #[error("Host surface of viewport `{viewport_id}` is unusable: {reason}")]
    InvalidSurface { viewport_id: String, reason: String },

    #[error("Viewport `{0}` not found")]
    ViewportNotFound(String),

    #[error("Tool `{0}` was never registered")]
    UnknownTool(String),

    #[error("Tool `{tool}` cannot service {projection} viewport `{viewport_id}`")]
    IncompatibleViewport {
        tool: String,
        viewport_id: String,
        projection: ProjectionKind,
    },

    #[error(
        "Signal {signal} in tool group `{group}` is already claimed by active tool `{claimed_by}`"
    )]
    BindingConflict {
        group: String,
        signal: String,
        claimed_by: String,
    },

    #[error("Tool `{0}` already registered")]
    DuplicateTool(String),

    #[error("Tool `{tool}` expects {expected} configuration, found {found}")]
    ToolKindMismatch {
        tool: String,
        expected: ToolKind,
        found: ToolKind,
    },

    #[error("Tool group `{0}` already exists")]
    DuplicateToolGroup(String),

    #[error("Tool group `{0}` not found")]
    ToolGroupNotFound(String),

    #[error("Synchronizer `{0}` already exists")]
    DuplicateSynchronizer(String),

    #[error("Segmentation `{0}` already registered")]
    DuplicateSegmentation(String),

    #[error("Segmentation `{0}` not found")]
    SegmentationNotFound(String),

    #[error("Segmentation `{segmentation_id}` has no {kind} representation")]
    RepresentationNotFound { segmentation_id: String, kind: String },

    #[error("Volume `{0}` already exists")]
    DuplicateVolume(String),

    #[error("Volume `{0}` not found")]
    VolumeNotFound(String),

    #[error("Archive `{0}` is unreachable")]
    ArchiveUnreachable(String),

    #[error("Series `{series}` of study `{study}` not found")]
    SeriesNotFound { study: String, series: String },

    #[error("Base volume `{0}` has not finished loading")]
    BaseVolumeNotLoaded(String),

    #[error("Loading volume `{volume_id}` failed: {reason}")]
    VolumeLoad { volume_id: String, reason: String },

    #[error("Scene did not stabilize within {0:?}")]
    StabilizationTimedOut(Duration),

    #[error("Scene is {actual}, expected {expected}")]
    InvalidLifecycle {
        expected: SceneState,
        actual: SceneState,
    },

    #[error("Rendering viewport `{viewport_id}` failed: {reason}")]
    Render { viewport_id: String, reason: String },

    #[error("Setup step `{step}` failed: {source}")]
    Setup {
        step: SetupStep,
        #[source]
        source: Box<SceneError>,
    },

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

impl SceneError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SceneError::DuplicateViewportId(_)
            | SceneError::InvalidSurface { .. }
            | SceneError::UnknownTool(_)
            | SceneError::IncompatibleViewport { .. }
            | SceneError::BindingConflict { .. }
            | SceneError::DuplicateTool(_)
            | SceneError::ToolKindMismatch { .. }
            | SceneError::DuplicateToolGroup(_)
            | SceneError::DuplicateSynchronizer(_)
            | SceneError::DuplicateSegmentation(_)
            | SceneError::DuplicateVolume(_) => ErrorCategory::Configuration,
            SceneError::ViewportNotFound(_)
            | SceneError::ToolGroupNotFound(_)
            | SceneError::SegmentationNotFound(_)
            | SceneError::RepresentationNotFound { .. }
            | SceneError::VolumeNotFound(_)
            | SceneError::ArchiveUnreachable(_)
            | SceneError::SeriesNotFound { .. }
            | SceneError::BaseVolumeNotLoaded(_)
            | SceneError::VolumeLoad { .. }
            | SceneError::StabilizationTimedOut(_)
            | SceneError::Dicom(_) => ErrorCategory::ResourceUnavailable,
            SceneError::InvalidLifecycle { .. } => ErrorCategory::Lifecycle,
            SceneError::Render { .. } => ErrorCategory::Render,
            SceneError::Setup { source, .. } => source.category(),
        }
    }

    pub(crate) fn at_step(self, step: SetupStep) -> Self {
        SceneError::Setup {
            step,
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, SceneError>;
