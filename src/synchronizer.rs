//! Relays viewport state changes across a set of member viewports.
//!
//! A synchronizer listens to the events the [`ViewportRegistry`] queues and
//! writes the same *absolute* value into every other member. Writes it makes
//! carry [`ChangeOrigin::Synchronizer`] with its own name, so it never relays
//! its own output, and the registry only queues events for real changes, so
//! relaying always settles.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ErrorCategory, Result, SceneError};
use crate::viewport::{
    Camera, ChangeOrigin, ViewportChange, ViewportEvent, ViewportId, ViewportRegistry,
};

/// Which state axes a synchronizer relays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPolicy {
    pub camera: bool,
    pub voi: bool,
    pub colormap: bool,
    pub invert: bool,
}

impl SyncPolicy {
    pub fn camera_position() -> Self {
        Self {
            camera: true,
            ..Self::default()
        }
    }

    pub fn voi(sync_invert: bool, sync_colormap: bool) -> Self {
        Self {
            voi: true,
            invert: sync_invert,
            colormap: sync_colormap,
            ..Self::default()
        }
    }

    pub fn tracks(&self, change: &ViewportChange) -> bool {
        match change {
            ViewportChange::Camera(_) => self.camera,
            ViewportChange::Voi(_) => self.voi,
            ViewportChange::Colormap(_) => self.colormap,
            ViewportChange::Invert(_) => self.invert,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Synchronizer {
    name: String,
    policy: SyncPolicy,
    members: Vec<ViewportId>,
}

impl Synchronizer {
    pub fn new(name: impl Into<String>, policy: SyncPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            members: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    pub fn members(&self) -> &[ViewportId] {
        &self.members
    }

    pub fn has_member(&self, viewport_id: &str) -> bool {
        self.members.iter().any(|m| m == viewport_id)
    }

    /// Adds a member. Adding an existing member is a no-op.
    pub fn add(&mut self, viewport_id: &str) -> bool {
        if self.has_member(viewport_id) {
            return false;
        }
        self.members.push(viewport_id.to_string());
        true
    }

    /// Removes a member. Removing a non-member is a no-op.
    pub fn remove(&mut self, viewport_id: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != viewport_id);
        self.members.len() != before
    }

    fn relays(&self, event: &ViewportEvent) -> bool {
        if !self.policy.tracks(&event.change) || !self.has_member(&event.viewport_id) {
            return false;
        }
        !matches!(&event.origin, ChangeOrigin::Synchronizer(name) if *name == self.name)
    }

    /// Applies `event` to every other member, returning how many targets changed.
    ///
    /// Members whose viewport no longer exists are dropped.
    pub fn propagate(&mut self, event: &ViewportEvent, registry: &mut ViewportRegistry) -> usize {
        if !self.relays(event) {
            return 0;
        }

        let stale: Vec<ViewportId> = self
            .members
            .iter()
            .filter(|m| !registry.contains(m))
            .cloned()
            .collect();
        for viewport_id in &stale {
            debug!(
                synchronizer = %self.name,
                viewport_id = %viewport_id,
                category = %ErrorCategory::StateInconsistency,
                "Pruning destroyed viewport from synchronizer"
            );
            self.remove(viewport_id);
        }

        let Ok(source) = registry.get_viewport(&event.viewport_id) else {
            return 0;
        };
        let source_orientation = source.orientation;
        let source_projection = source.projection();

        let origin = ChangeOrigin::Synchronizer(self.name.clone());
        let mut applied = 0;
        for target_id in self.members.iter().filter(|m| **m != event.viewport_id) {
            let change = match &event.change {
                ViewportChange::Camera(camera) => {
                    let Ok(target) = registry.get_viewport(target_id) else {
                        continue;
                    };
                    let same_view = target.orientation == source_orientation
                        && target.projection() == source_projection;
                    ViewportChange::Camera(equivalent_camera(camera, &target.camera, same_view))
                }
                other => other.clone(),
            };
            match registry.apply(target_id, change, origin.clone()) {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(err) => debug!(synchronizer = %self.name, %err, "Skipping target"),
            }
        }
        if applied > 0 {
            debug!(
                synchronizer = %self.name,
                source = %event.viewport_id,
                change = %event.change,
                applied,
                "Propagated viewport change"
            );
        }
        applied
    }
}

/// Camera state a target should take on so it shows the same thing as the source.
///
/// Viewports looking along the same axis copy the whole pose; others follow
/// the focal point and zoom but keep their own view plane.
fn equivalent_camera(source: &Camera, target: &Camera, same_view: bool) -> Camera {
    if same_view {
        return *source;
    }
    Camera {
        focal_point: source.focal_point,
        parallel_scale: source.parallel_scale,
        ..*target
    }
}

/// Owner of every named synchronizer in a scene.
#[derive(Debug, Default)]
pub struct SynchronizerManager {
    synchronizers: Vec<Synchronizer>,
}

impl SynchronizerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_synchronizer(
        &mut self,
        name: &str,
        policy: SyncPolicy,
    ) -> Result<&mut Synchronizer> {
        if self.get(name).is_some() {
            return Err(SceneError::DuplicateSynchronizer(name.to_string()));
        }
        self.synchronizers.push(Synchronizer::new(name, policy));
        debug!(synchronizer = name, ?policy, "Synchronizer created");
        let last = self.synchronizers.len() - 1;
        Ok(&mut self.synchronizers[last])
    }

    pub fn get(&self, name: &str) -> Option<&Synchronizer> {
        self.synchronizers.iter().find(|s| s.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Synchronizer> {
        self.synchronizers.iter_mut().find(|s| s.name == name)
    }

    pub fn destroy(&mut self, name: &str) -> bool {
        let before = self.synchronizers.len();
        self.synchronizers.retain(|s| s.name != name);
        self.synchronizers.len() != before
    }

    pub fn len(&self) -> usize {
        self.synchronizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.synchronizers.is_empty()
    }

    /// Drains the registry's event queue through every synchronizer until no
    /// new events appear. Returns the number of target changes applied.
    pub fn pump(&mut self, registry: &mut ViewportRegistry) -> usize {
        let mut applied = 0;
        while let Some(event) = registry.pop_event() {
            for synchronizer in &mut self.synchronizers {
                applied += synchronizer.propagate(&event, registry);
            }
        }
        applied
    }

    pub fn clear(&mut self) {
        self.synchronizers.clear();
    }
}
