#![allow(dead_code)]

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use dicom_viewports::renderer::{FrameRequest, RenderBackend};
use dicom_viewports::viewport::ViewportId;
use dicom_viewports::volume::VolumeGeometry;
use dicom_viewports::volume_loader::{ImageId, VolumeDataProvider};
use dicom_viewports::{Result, SceneConfig, SceneError};
use futures::channel::oneshot;
use ndarray::Array3;
use parking_lot::Mutex;

/// (depth, height, width) of the synthetic series.
pub const DIMENSIONS: (usize, usize, usize) = (9, 16, 16);

/// Synthetic CT: every voxel holds `10 * slice_index`.
pub fn synthetic_volume() -> Array3<i16> {
    Array3::from_shape_fn(DIMENSIONS, |(z, _, _)| (z * 10) as i16)
}

/// Serves one in-memory series, optionally only for one study/series pair
/// and optionally failing while streaming voxels.
pub struct InMemoryProvider {
    data: Array3<i16>,
    spacing: (f32, f32, f32),
    series: Option<(String, String)>,
    fail_load: bool,
    stall_load: bool,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::with_data(synthetic_volume())
    }

    pub fn with_data(data: Array3<i16>) -> Self {
        Self {
            data,
            spacing: (1.0, 1.0, 1.0),
            series: None,
            fail_load: false,
            stall_load: false,
        }
    }

    pub fn only_series(mut self, study: &str, series: &str) -> Self {
        self.series = Some((study.to_string(), series.to_string()));
        self
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Voxel streaming never finishes.
    pub fn stalled_load(mut self) -> Self {
        self.stall_load = true;
        self
    }
}

#[async_trait]
impl VolumeDataProvider for InMemoryProvider {
    async fn list_image_references(
        &self,
        study_instance_uid: &str,
        series_instance_uid: &str,
        _archive_root: &str,
    ) -> Result<Vec<ImageId>> {
        if let Some((study, series)) = &self.series
            && (study != study_instance_uid || series != series_instance_uid)
        {
            return Err(SceneError::SeriesNotFound {
                study: study_instance_uid.to_string(),
                series: series_instance_uid.to_string(),
            });
        }
        Ok((0..self.data.dim().0).map(|i| format!("mem://{i}")).collect())
    }

    async fn create_volume(
        &self,
        _volume_id: &str,
        _image_ids: &[ImageId],
    ) -> Result<VolumeGeometry> {
        Ok(VolumeGeometry::new(self.data.dim(), self.spacing))
    }

    async fn load_volume(&self, volume_id: &str, _image_ids: &[ImageId]) -> Result<Array3<i16>> {
        if self.stall_load {
            futures::future::pending::<()>().await;
        }
        if self.fail_load {
            return Err(SceneError::VolumeLoad {
                volume_id: volume_id.to_string(),
                reason: "stream interrupted".to_string(),
            });
        }
        Ok(self.data.clone())
    }
}

/// Render backend that only records which viewports each pass covered.
#[derive(Default)]
pub struct RecordingRenderer {
    passes: Mutex<Vec<Vec<ViewportId>>>,
    failing: Mutex<HashSet<ViewportId>>,
    hold_stabilization: bool,
    stable: Mutex<bool>,
    waiters: Mutex<Vec<oneshot::Sender<()>>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never reports the scene as stabilized.
    pub fn holding_stabilization() -> Self {
        Self {
            hold_stabilization: true,
            ..Self::default()
        }
    }

    pub fn fail_viewport(&self, viewport_id: &str) {
        self.failing.lock().insert(viewport_id.to_string());
    }

    pub fn passes(&self) -> Vec<Vec<ViewportId>> {
        self.passes.lock().clone()
    }

    pub fn last_pass(&self) -> Vec<ViewportId> {
        self.passes.lock().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl RenderBackend for RecordingRenderer {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    fn render(&self, requests: &[FrameRequest<'_>]) -> Vec<(ViewportId, Result<()>)> {
        let failing = self.failing.lock();
        let results: Vec<(ViewportId, Result<()>)> = requests
            .iter()
            .map(|request| {
                let viewport_id = request.viewport.id().to_string();
                let result = if failing.contains(&viewport_id) {
                    Err(SceneError::Render {
                        viewport_id: viewport_id.clone(),
                        reason: "surface lost".to_string(),
                    })
                } else {
                    Ok(())
                };
                (viewport_id, result)
            })
            .collect();
        self.passes
            .lock()
            .push(results.iter().map(|(id, _)| id.clone()).collect());

        if !self.hold_stabilization {
            *self.stable.lock() = true;
            for waiter in self.waiters.lock().drain(..) {
                let _ = waiter.send(());
            }
        }
        results
    }

    fn stabilized(&self) -> oneshot::Receiver<()> {
        let (sender, receiver) = oneshot::channel();
        if *self.stable.lock() {
            let _ = sender.send(());
        } else {
            self.waiters.lock().push(sender);
        }
        receiver
    }
}

/// Default reference scene pointed at the in-memory series.
pub fn scene_config() -> SceneConfig {
    SceneConfig {
        archive_root: "memory".to_string(),
        stabilization_timeout: Duration::from_secs(1),
        ..SceneConfig::default()
    }
}
