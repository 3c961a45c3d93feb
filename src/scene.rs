//! Scene lifecycle and the ordered setup sequence.
//!
//! A [`Scene`] owns every registry of the engine. [`Scene::setup`] walks a
//! fixed sequence of [`SetupStep`]s; the first failing step aborts setup and
//! is named in the returned [`SceneError::Setup`]. Synchronizers are only
//! wired once the render backend reports that the initial camera and VOI
//! state has settled, so transient startup values are never relayed.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};
use web_time::Instant;

use crate::annotation::AnnotationStore;
use crate::config::{SceneConfig, SegmentationConfig, SynchronizerConfig, ToolGroupConfig};
use crate::enums::RepresentationKind;
use crate::error::{Result, SceneError};
use crate::interaction::{InputEvent, InteractionContext};
use crate::renderer::{FrameRequest, RenderBackend};
use crate::segmentation::{Representation, SegmentationManager};
use crate::synchronizer::SynchronizerManager;
use crate::tool_group::ToolGroupManager;
use crate::tools::ToolRegistry;
use crate::viewport::{ViewportId, ViewportRegistry, ViewportStatus};
use crate::volume::{VolumeCache, VolumeGeometry};
use crate::volume_loader::VolumeDataProvider;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SceneState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    TornDown,
}

impl fmt::Display for SceneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneState::Uninitialized => write!(f, "uninitialized"),
            SceneState::Initializing => write!(f, "initializing"),
            SceneState::Ready => write!(f, "ready"),
            SceneState::TornDown => write!(f, "torn down"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupStep {
    InitializeRenderer,
    ResolveImageIds,
    LoadVolume,
    DefineViewports,
    AttachSegmentation,
    BindToolGroups,
    WireSynchronizers,
    FirstRender,
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetupStep::InitializeRenderer => "initialize renderer",
            SetupStep::ResolveImageIds => "resolve image ids",
            SetupStep::LoadVolume => "load volume",
            SetupStep::DefineViewports => "define viewports",
            SetupStep::AttachSegmentation => "attach segmentation",
            SetupStep::BindToolGroups => "bind tool groups",
            SetupStep::WireSynchronizers => "wire synchronizers",
            SetupStep::FirstRender => "first render",
        };
        f.write_str(name)
    }
}

pub struct Scene {
    state: SceneState,
    provider: Arc<dyn VolumeDataProvider>,
    renderer: Arc<dyn RenderBackend>,
    viewports: ViewportRegistry,
    volumes: VolumeCache,
    segmentations: SegmentationManager,
    tools: ToolRegistry,
    tool_groups: ToolGroupManager,
    synchronizers: SynchronizerManager,
    annotations: AnnotationStore,
}

impl Scene {
    pub fn new(provider: Arc<dyn VolumeDataProvider>, renderer: Arc<dyn RenderBackend>) -> Self {
        Self {
            state: SceneState::Uninitialized,
            provider,
            renderer,
            viewports: ViewportRegistry::new(),
            volumes: VolumeCache::new(),
            segmentations: SegmentationManager::new(),
            tools: ToolRegistry::with_builtin_tools(),
            tool_groups: ToolGroupManager::new(),
            synchronizers: SynchronizerManager::new(),
            annotations: AnnotationStore::new(),
        }
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn viewports(&self) -> &ViewportRegistry {
        &self.viewports
    }

    /// Direct access for host-driven changes; follow up with [`Scene::pump_events`].
    pub fn viewports_mut(&mut self) -> &mut ViewportRegistry {
        &mut self.viewports
    }

    pub fn volumes(&self) -> &VolumeCache {
        &self.volumes
    }

    pub fn segmentations(&self) -> &SegmentationManager {
        &self.segmentations
    }

    pub fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.tools
    }

    pub fn tool_groups(&self) -> &ToolGroupManager {
        &self.tool_groups
    }

    pub fn tool_groups_mut(&mut self) -> &mut ToolGroupManager {
        &mut self.tool_groups
    }

    pub fn synchronizers(&self) -> &SynchronizerManager {
        &self.synchronizers
    }

    pub fn synchronizers_mut(&mut self) -> &mut SynchronizerManager {
        &mut self.synchronizers
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    fn expect_state(&self, expected: SceneState) -> Result<()> {
        if self.state != expected {
            return Err(SceneError::InvalidLifecycle {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    /// Builds the scene described by `config`.
    ///
    /// On failure everything created so far is dropped again and the scene
    /// returns to [`SceneState::Uninitialized`], so setup may be retried.
    pub async fn setup(&mut self, config: &SceneConfig) -> Result<()> {
        self.expect_state(SceneState::Uninitialized)?;
        self.state = SceneState::Initializing;
        let started = Instant::now();

        match self.run_setup(config).await {
            Ok(()) => {
                self.state = SceneState::Ready;
                info!(
                    viewports = self.viewports.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Scene ready"
                );
                Ok(())
            }
            Err(err) => {
                warn!(%err, category = %err.category(), "Scene setup aborted");
                self.clear();
                self.state = SceneState::Uninitialized;
                Err(err)
            }
        }
    }

    async fn run_setup(&mut self, config: &SceneConfig) -> Result<()> {
        let step = Instant::now();
        self.renderer
            .initialize()
            .await
            .map_err(|err| err.at_step(SetupStep::InitializeRenderer))?;
        log_step(SetupStep::InitializeRenderer, step);

        let step = Instant::now();
        let image_ids = self
            .provider
            .list_image_references(
                &config.study_instance_uid,
                &config.series_instance_uid,
                &config.archive_root,
            )
            .await
            .map_err(|err| err.at_step(SetupStep::ResolveImageIds))?;
        log_step(SetupStep::ResolveImageIds, step);

        let step = Instant::now();
        let geometry = self
            .provider
            .create_volume(&config.volume_id, &image_ids)
            .await
            .and_then(|geometry| {
                self.volumes.create_volume(&config.volume_id, geometry)?;
                Ok(geometry)
            })
            .map_err(|err| err.at_step(SetupStep::LoadVolume))?;
        log_step(SetupStep::LoadVolume, step);

        let step = Instant::now();
        self.viewports = ViewportRegistry::with_default_voi(config.initial_voi);
        // voxels stream while viewports and tool groups are set up; only the
        // labelmap derivation and the settling render wait for them
        let provider = Arc::clone(&self.provider);
        let mut streaming = Some(provider.load_volume(&config.volume_id, &image_ids));
        self.define_viewports(config, &geometry)
            .map_err(|err| err.at_step(SetupStep::DefineViewports))?;
        log_step(SetupStep::DefineViewports, step);

        if let Some(segmentation) = &config.segmentation {
            let step = Instant::now();
            if let Some(load) = streaming.take() {
                self.finish_loading(config, load.await);
            }
            self.attach_segmentation(config, segmentation)
                .map_err(|err| err.at_step(SetupStep::AttachSegmentation))?;
            log_step(SetupStep::AttachSegmentation, step);
        }

        let step = Instant::now();
        for group in &config.tool_groups {
            self.bind_tool_group(group)
                .map_err(|err| err.at_step(SetupStep::BindToolGroups))?;
        }
        log_step(SetupStep::BindToolGroups, step);

        if let Some(load) = streaming.take() {
            self.finish_loading(config, load.await);
        }

        let step = Instant::now();
        self.wire_synchronizers(config)
            .await
            .map_err(|err| err.at_step(SetupStep::WireSynchronizers))?;
        log_step(SetupStep::WireSynchronizers, step);

        let step = Instant::now();
        let ids = self.viewports.ids();
        self.viewports.take_redraw_requests();
        self.render_viewports(&ids);
        log_step(SetupStep::FirstRender, step);
        Ok(())
    }

    fn define_viewports(&mut self, config: &SceneConfig, geometry: &VolumeGeometry) -> Result<()> {
        self.viewports.define_viewports(&config.viewports)?;
        for spec in &config.viewports {
            let volume_id = spec.volume.clone().unwrap_or_else(|| config.volume_id.clone());
            let geometry = (volume_id == config.volume_id).then_some(geometry);
            self.viewports
                .set_volumes(&spec.id, vec![volume_id], geometry)?;
        }
        Ok(())
    }

    /// Stores streamed voxels. A failed load leaves the viewports showing an
    /// error overlay; steps that need the voxels fail on their own.
    fn finish_loading(&mut self, config: &SceneConfig, loaded: Result<ndarray::Array3<i16>>) {
        let volume_id = &config.volume_id;
        let status = match loaded.and_then(|data| self.volumes.finish_loading(volume_id, data)) {
            Ok(()) => ViewportStatus::Ready,
            Err(err) => {
                warn!(volume_id = %volume_id, %err, "Volume load failed");
                self.volumes.mark_failed(volume_id);
                ViewportStatus::Error(err.to_string())
            }
        };
        let showing: Vec<ViewportId> = self
            .viewports
            .iter()
            .filter(|v| v.volumes.contains(volume_id))
            .map(|v| v.id().to_string())
            .collect();
        for viewport_id in showing {
            // ids come straight from the registry
            let _ = self.viewports.set_status(&viewport_id, status.clone());
        }
    }

    fn attach_segmentation(
        &mut self,
        config: &SceneConfig,
        segmentation: &SegmentationConfig,
    ) -> Result<()> {
        let labelmap = self.segmentations.create_derived_labelmap(
            &mut self.volumes,
            &config.volume_id,
            &segmentation.labelmap_volume_id,
        )?;
        self.segmentations.register_segmentation(
            &self.volumes,
            &segmentation.id,
            vec![Representation::labelmap(&labelmap.id)],
        )?;
        for viewport_id in &segmentation.viewports {
            self.segmentations.attach_representation(
                &mut self.viewports,
                viewport_id,
                &segmentation.id,
                RepresentationKind::Labelmap,
            )?;
        }
        Ok(())
    }

    fn bind_tool_group(&mut self, config: &ToolGroupConfig) -> Result<()> {
        let group = self
            .tool_groups
            .create_tool_group(&config.id, config.policy)?;
        for binding in &config.tools {
            match &binding.base {
                Some(base) => group.add_tool_instance(
                    &mut self.tools,
                    &binding.tool,
                    base,
                    binding.config.clone(),
                )?,
                None => group.add_tool(&self.tools, &binding.tool, binding.config.clone())?,
            }
            group.bind(&self.tools, &binding.tool, &binding.bindings, binding.mode)?;
        }
        for viewport_id in &config.viewports {
            let projection = self.viewports.get_viewport(viewport_id)?.projection();
            self.tool_groups
                .add_viewport(&config.id, viewport_id, projection)?;
        }
        Ok(())
    }

    async fn wire_synchronizers(&mut self, config: &SceneConfig) -> Result<()> {
        let stabilized = self.renderer.stabilized();
        let ids = self.viewports.ids();
        self.render_viewports(&ids);

        match tokio::time::timeout(config.stabilization_timeout, stabilized).await {
            Ok(Ok(())) => debug!("Renderer reported a stable scene"),
            Ok(Err(_)) | Err(_) => {
                return Err(SceneError::StabilizationTimedOut(config.stabilization_timeout));
            }
        }

        let discarded = self.viewports.take_events().len();
        if discarded > 0 {
            debug!(discarded, "Dropped viewport events queued before synchronizers were wired");
        }
        for synchronizer in &config.synchronizers {
            self.create_synchronizer(synchronizer)?;
        }
        Ok(())
    }

    pub fn create_synchronizer(&mut self, config: &SynchronizerConfig) -> Result<()> {
        for member in &config.members {
            self.viewports.get_viewport(member)?;
        }
        let synchronizer = self
            .synchronizers
            .create_synchronizer(&config.name, config.policy)?;
        for member in &config.members {
            synchronizer.add(member);
        }
        info!(
            synchronizer = %config.name,
            members = config.members.len(),
            "Synchronizer wired"
        );
        Ok(())
    }

    /// Resolves an input event on a viewport and runs the claiming tool.
    ///
    /// Returns the name of the tool that handled the event, or `None` when no
    /// active tool claims the signal. Resulting state changes are relayed by
    /// the synchronizers before this returns.
    pub fn dispatch(&mut self, viewport_id: &str, event: &InputEvent) -> Result<Option<String>> {
        self.expect_state(SceneState::Ready)?;
        self.viewports.get_viewport(viewport_id)?;
        let Some(group) = self.tool_groups.group_for_viewport(viewport_id) else {
            debug!(viewport_id, "Viewport has no tool group");
            return Ok(None);
        };
        let Some(tool) = group.resolve(&event.signal) else {
            debug!(viewport_id, signal = %event.signal, "No active tool claims signal");
            return Ok(None);
        };
        let tool = tool.to_string();
        let Some(config) = group.tool_config(&tool).cloned() else {
            return Ok(None);
        };

        let mut context = InteractionContext {
            viewports: &mut self.viewports,
            volumes: &self.volumes,
            segmentations: &self.segmentations,
            annotations: &mut self.annotations,
        };
        context.apply_tool(viewport_id, &tool, &config, &event.gesture)?;
        self.pump_events();
        Ok(Some(tool))
    }

    /// Relays queued viewport changes through every synchronizer until none remain.
    pub fn pump_events(&mut self) -> usize {
        self.synchronizers.pump(&mut self.viewports)
    }

    /// Redraws every viewport marked dirty since the last pass and returns
    /// how many rendered successfully. Failures are logged per viewport.
    pub fn render_pending(&mut self) -> usize {
        let ids = self.viewports.take_redraw_requests();
        self.render_viewports(&ids)
    }

    fn render_viewports(&self, ids: &[ViewportId]) -> usize {
        let requests: Vec<FrameRequest<'_>> = ids
            .iter()
            .filter_map(|id| self.viewports.get_viewport(id).ok())
            .map(|viewport| FrameRequest {
                viewport,
                volume: viewport.volumes.first().and_then(|id| self.volumes.get(id)),
                overlays: self.segmentations.overlays_for_viewport(viewport.id()),
            })
            .collect();
        if requests.is_empty() {
            return 0;
        }

        let mut rendered = 0;
        for (viewport_id, result) in self.renderer.render(&requests) {
            match result {
                Ok(()) => rendered += 1,
                Err(err) => warn!(
                    viewport_id = %viewport_id,
                    %err,
                    category = %err.category(),
                    "Viewport redraw failed"
                ),
            }
        }
        rendered
    }

    /// Shows a segmentation as a surface on a viewport, built from its
    /// labelmap. The viewport's own volume is hidden so the surface is visible.
    pub fn convert_to_surface(&mut self, viewport_id: &str, segmentation_id: &str) -> Result<bool> {
        let labelmap_volume = self
            .segmentations
            .get(segmentation_id)
            .ok_or_else(|| SceneError::SegmentationNotFound(segmentation_id.to_string()))?
            .representation(RepresentationKind::Labelmap)
            .map(|r| r.volume_id.clone())
            .ok_or_else(|| SceneError::RepresentationNotFound {
                segmentation_id: segmentation_id.to_string(),
                kind: RepresentationKind::Labelmap.to_string(),
            })?;
        self.segmentations.add_representation(
            &self.volumes,
            segmentation_id,
            Representation {
                kind: RepresentationKind::Surface,
                volume_id: labelmap_volume,
            },
        )?;
        let attached = self.segmentations.attach_representation(
            &mut self.viewports,
            viewport_id,
            segmentation_id,
            RepresentationKind::Surface,
        )?;
        let mut properties = self.viewports.get_viewport(viewport_id)?.properties.clone();
        properties.volume_visible = false;
        self.viewports.set_properties(viewport_id, properties)?;
        Ok(attached)
    }

    /// Detaches a segmentation everywhere and releases its labelmaps.
    pub fn destroy_segmentation(&mut self, segmentation_id: &str) -> Result<()> {
        let released = self
            .segmentations
            .destroy_segmentation(&mut self.viewports, segmentation_id)?;
        for volume_id in released {
            self.volumes.remove_labelmap(&volume_id);
            debug!(volume_id = %volume_id, "Labelmap released");
        }
        Ok(())
    }

    /// Destroys a viewport. Synchronizers drop it on their next propagation.
    pub fn remove_viewport(&mut self, viewport_id: &str) -> Result<()> {
        self.viewports.remove_viewport(viewport_id)?;
        self.tool_groups.remove_viewport(viewport_id);
        self.segmentations.remove_viewport(viewport_id);
        self.annotations.remove_viewport(viewport_id);
        Ok(())
    }

    /// Destroys synchronizers, tool groups, segmentations and viewports.
    /// Tearing down twice is a no-op.
    pub fn teardown(&mut self) -> Result<()> {
        match self.state {
            SceneState::TornDown => return Ok(()),
            SceneState::Ready => {}
            actual => {
                return Err(SceneError::InvalidLifecycle {
                    expected: SceneState::Ready,
                    actual,
                });
            }
        }
        self.clear();
        self.state = SceneState::TornDown;
        info!("Scene torn down");
        Ok(())
    }

    fn clear(&mut self) {
        self.synchronizers.clear();
        self.tool_groups.clear();
        self.segmentations.clear();
        self.annotations.clear();
        self.viewports.clear();
        self.volumes.clear();
    }
}

fn log_step(step: SetupStep, started: Instant) {
    info!(
        step = %step,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Setup step complete"
    );
}
