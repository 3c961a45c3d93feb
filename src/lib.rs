//! # DICOM-viewports library
//!
//! This crate orchestrates a set of synchronized viewports over volumes
//! loaded from DICOM series. It sits on top of the dicom-rs ecosystem and
//! covers the part between "voxels are available" and "a fully interactive
//! scene":
//!
//!  - a viewport registry owning camera, window/level and overlay state
//!    of every orthographic-slice and volumetric-3D view
//!  - synchronizers relaying camera and window/level changes across views
//!  - tool groups mapping pointer, wheel and touch input to tools, where
//!    the most recent binding of a signal wins
//!  - segmentation labelmaps shared between views, painted by brush tools
//!  - a scene object running the ordered setup and teardown of all of it
//!
//! Volumes are streamed through a [`VolumeDataProvider`]; the bundled
//! [`DicomDirectoryProvider`] reads a directory of ".dcm" files and decodes
//! them in parallel using rayon. Frames are drawn by a [`RenderBackend`];
//! [`SoftwareRenderer`] is a CPU implementation producing RGB images.
//!
//! # Examples
//!
//! ## Building the reference scene from a directory
//!
//! Loads the series from the dicom/ directory, sets up sagittal, axial,
//! coronal and 3-D viewports with a shared window/level and saves the
//! axial frame.
//!
//! ```no_run
//! # use dicom_viewports::{Scene, SceneConfig, SoftwareRenderer, DicomDirectoryProvider};
//! # use dicom_viewports::enums::SortBy;
//! # use std::sync::Arc;
//! # async fn run() -> dicom_viewports::Result<()> {
//! let renderer = Arc::new(SoftwareRenderer::new());
//! let provider = Arc::new(DicomDirectoryProvider::new(SortBy::InstanceNumber));
//! let mut scene = Scene::new(provider, renderer.clone());
//! scene.setup(&SceneConfig::default()).await?;
//! renderer.save_frame("CT_AXIAL", "axial.png")?;
//! # Ok(())
//! # }
//! ```

pub mod annotation;
pub mod config;
pub mod enums;
pub mod error;
pub mod interaction;
mod interpolator;
pub mod renderer;
pub mod scene;
pub mod segmentation;
pub mod synchronizer;
pub mod tool_group;
pub mod tools;
pub mod viewport;
pub mod volume;
pub mod volume_loader;

pub use config::SceneConfig;
pub use error::{ErrorCategory, Result, SceneError};
pub use renderer::{RenderBackend, SoftwareRenderer};
pub use scene::{Scene, SceneState};
pub use volume_loader::{DicomDirectoryProvider, VolumeDataProvider};
