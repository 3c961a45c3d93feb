//! Input binding table.
//!
//! A [`ToolGroup`] keeps its bindings as an ordered list of
//! `(signal, tool)` pairs. Resolution scans that list from the end and
//! returns the first entry whose signal matches exactly and whose tool is
//! active, so the most recent binding of a signal wins. Default scenes rely
//! on this ordering to override earlier bindings, e.g. rebinding the wheel
//! from stack scroll to zoom.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::enums::{ActivationMode, ModifierKey, MouseButton, ProjectionKind};
use crate::error::{Result, SceneError};
use crate::tools::{ToolConfig, ToolRegistry};
use crate::viewport::ViewportId;

pub type ToolGroupId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trigger {
    Mouse(MouseButton),
    /// Number of simultaneous touch points.
    Touch(u8),
}

/// Exact physical input a binding claims.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputSignal {
    pub trigger: Trigger,
    #[serde(default)]
    pub modifier: ModifierKey,
}

impl InputSignal {
    pub fn mouse(button: MouseButton) -> Self {
        Self {
            trigger: Trigger::Mouse(button),
            modifier: ModifierKey::None,
        }
    }

    pub fn touch(points: u8) -> Self {
        Self {
            trigger: Trigger::Touch(points),
            modifier: ModifierKey::None,
        }
    }

    pub fn with_modifier(mut self, modifier: ModifierKey) -> Self {
        self.modifier = modifier;
        self
    }
}

impl fmt::Display for InputSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.trigger {
            Trigger::Mouse(button) => write!(f, "{button:?}")?,
            Trigger::Touch(points) => write!(f, "Touch({points})")?,
        }
        if self.modifier != ModifierKey::None {
            write!(f, "+{:?}", self.modifier)?;
        }
        Ok(())
    }
}

/// What happens when an active tool is bound to a signal another active
/// tool in the same group already claims.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// The newer binding shadows the older one at resolution time.
    #[default]
    LastWins,
    /// The bind call fails with [`SceneError::BindingConflict`].
    Reject,
}

#[derive(Clone, Debug)]
struct GroupTool {
    name: String,
    config: ToolConfig,
    mode: ActivationMode,
}

#[derive(Clone, Debug, PartialEq)]
struct BindingEntry {
    signal: InputSignal,
    tool: String,
}

#[derive(Clone, Debug)]
pub struct ToolGroup {
    id: ToolGroupId,
    policy: ConflictPolicy,
    tools: Vec<GroupTool>,
    bindings: Vec<BindingEntry>,
    viewports: Vec<(ViewportId, ProjectionKind)>,
}

impl ToolGroup {
    pub fn new(id: impl Into<ToolGroupId>, policy: ConflictPolicy) -> Self {
        Self {
            id: id.into(),
            policy,
            tools: Vec::new(),
            bindings: Vec::new(),
            viewports: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    fn tool(&self, name: &str) -> Option<&GroupTool> {
        self.tools.iter().find(|t| t.name == name)
    }

    fn tool_mut(&mut self, name: &str) -> Result<&mut GroupTool> {
        self.tools
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| SceneError::UnknownTool(name.to_string()))
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tool(name).is_some()
    }

    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name.as_str())
    }

    pub fn tool_config(&self, name: &str) -> Option<&ToolConfig> {
        self.tool(name).map(|t| &t.config)
    }

    pub fn mode(&self, name: &str) -> Option<ActivationMode> {
        self.tool(name).map(|t| t.mode)
    }

    /// Adds a registered tool to the group in disabled mode. `config`
    /// overrides the registered configuration for this group only.
    /// Adding a tool the group already has is a no-op.
    pub fn add_tool(
        &mut self,
        registry: &ToolRegistry,
        name: &str,
        config: Option<ToolConfig>,
    ) -> Result<()> {
        let descriptor = registry.get(name)?;
        if self.has_tool(name) {
            return Ok(());
        }
        let config = match config {
            Some(config) if config.kind() != descriptor.kind() => {
                return Err(SceneError::ToolKindMismatch {
                    tool: name.to_string(),
                    expected: descriptor.kind(),
                    found: config.kind(),
                });
            }
            Some(config) => config,
            None => descriptor.config.clone(),
        };
        self.tools.push(GroupTool {
            name: name.to_string(),
            config,
            mode: ActivationMode::Disabled,
        });
        Ok(())
    }

    /// Registers a named instance of `base` and adds it to the group.
    pub fn add_tool_instance(
        &mut self,
        registry: &mut ToolRegistry,
        name: &str,
        base: &str,
        config: Option<ToolConfig>,
    ) -> Result<()> {
        if !registry.contains(name) {
            registry.add_tool_instance(name, base, config)?;
        }
        self.add_tool(registry, name, None)
    }

    fn check_viewports(&self, tool: &str, config: &ToolConfig) -> Result<()> {
        let kind = config.kind();
        match self
            .viewports
            .iter()
            .find(|(_, projection)| !kind.supports(*projection))
        {
            Some((viewport_id, projection)) => Err(SceneError::IncompatibleViewport {
                tool: tool.to_string(),
                viewport_id: viewport_id.clone(),
                projection: *projection,
            }),
            None => Ok(()),
        }
    }

    /// Appends `bindings` for `name` and sets its activation mode.
    ///
    /// Fails with [`SceneError::UnknownTool`] when the tool was never
    /// registered. A tool not yet in the group is added with its registered
    /// configuration.
    pub fn bind(
        &mut self,
        registry: &ToolRegistry,
        name: &str,
        bindings: &[InputSignal],
        mode: ActivationMode,
    ) -> Result<()> {
        self.add_tool(registry, name, None)?;
        if mode != ActivationMode::Disabled {
            let config = self.tool_mut(name)?.config.clone();
            self.check_viewports(name, &config)?;
        }
        if mode == ActivationMode::Active && self.policy == ConflictPolicy::Reject {
            // signals the tool already holds count once it becomes active
            let mut claimed = self.bindings_of(name);
            claimed.extend_from_slice(bindings);
            for signal in &claimed {
                if let Some(claimed_by) = self.resolve(signal)
                    && claimed_by != name
                {
                    return Err(SceneError::BindingConflict {
                        group: self.id.clone(),
                        signal: signal.to_string(),
                        claimed_by: claimed_by.to_string(),
                    });
                }
            }
        }

        for signal in bindings {
            let entry = BindingEntry {
                signal: *signal,
                tool: name.to_string(),
            };
            self.bindings.retain(|b| *b != entry);
            self.bindings.push(entry);
        }
        self.tool_mut(name)?.mode = mode;
        debug!(
            group = %self.id,
            tool = name,
            ?mode,
            bindings = bindings.len(),
            "Tool bound"
        );
        Ok(())
    }

    /// Makes a tool claim input. With `None` the tool keeps the bindings it already has.
    pub fn set_active(
        &mut self,
        registry: &ToolRegistry,
        name: &str,
        bindings: Option<&[InputSignal]>,
    ) -> Result<()> {
        self.bind(registry, name, bindings.unwrap_or_default(), ActivationMode::Active)
    }

    /// Keeps the tool configured but stops it from claiming input.
    pub fn set_passive(&mut self, name: &str) -> Result<()> {
        let config = self.tool_mut(name)?.config.clone();
        self.check_viewports(name, &config)?;
        self.tool_mut(name)?.mode = ActivationMode::Passive;
        Ok(())
    }

    pub fn set_disabled(&mut self, name: &str) -> Result<()> {
        self.tool_mut(name)?.mode = ActivationMode::Disabled;
        Ok(())
    }

    /// Removes the binding of `signal` to `name`. Earlier bindings of the
    /// same signal to other tools become visible to resolution again.
    pub fn remove_binding(&mut self, name: &str, signal: &InputSignal) -> bool {
        let before = self.bindings.len();
        self.bindings
            .retain(|b| !(b.tool == name && b.signal == *signal));
        self.bindings.len() != before
    }

    pub fn clear_bindings(&mut self, name: &str) {
        self.bindings.retain(|b| b.tool != name);
    }

    pub fn bindings_of(&self, name: &str) -> Vec<InputSignal> {
        self.bindings
            .iter()
            .filter(|b| b.tool == name)
            .map(|b| b.signal)
            .collect()
    }

    /// The active tool that claims `signal`, if any. Later bindings take
    /// precedence over earlier ones.
    pub fn resolve(&self, signal: &InputSignal) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .filter(|b| b.signal == *signal)
            .find(|b| self.mode(&b.tool) == Some(ActivationMode::Active))
            .map(|b| b.tool.as_str())
    }

    /// Attaches a viewport. Fails if any enabled tool cannot service its projection.
    pub fn add_viewport(&mut self, viewport_id: &str, projection: ProjectionKind) -> Result<()> {
        if self.has_viewport(viewport_id) {
            return Ok(());
        }
        if let Some(tool) = self
            .tools
            .iter()
            .filter(|t| t.mode != ActivationMode::Disabled)
            .find(|t| !t.config.kind().supports(projection))
        {
            return Err(SceneError::IncompatibleViewport {
                tool: tool.name.clone(),
                viewport_id: viewport_id.to_string(),
                projection,
            });
        }
        self.viewports.push((viewport_id.to_string(), projection));
        info!(group = %self.id, viewport_id, "Viewport attached to tool group");
        Ok(())
    }

    pub fn remove_viewport(&mut self, viewport_id: &str) -> bool {
        let before = self.viewports.len();
        self.viewports.retain(|(id, _)| id != viewport_id);
        self.viewports.len() != before
    }

    pub fn has_viewport(&self, viewport_id: &str) -> bool {
        self.viewports.iter().any(|(id, _)| id == viewport_id)
    }

    pub fn viewport_ids(&self) -> impl Iterator<Item = &str> {
        self.viewports.iter().map(|(id, _)| id.as_str())
    }
}

/// Owner of every tool group in a scene. A viewport belongs to at most one group.
#[derive(Debug, Default)]
pub struct ToolGroupManager {
    groups: Vec<ToolGroup>,
}

impl ToolGroupManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_tool_group(
        &mut self,
        id: &str,
        policy: ConflictPolicy,
    ) -> Result<&mut ToolGroup> {
        if self.get(id).is_some() {
            return Err(SceneError::DuplicateToolGroup(id.to_string()));
        }
        self.groups.push(ToolGroup::new(id, policy));
        let last = self.groups.len() - 1;
        Ok(&mut self.groups[last])
    }

    pub fn get(&self, id: &str) -> Option<&ToolGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut ToolGroup> {
        self.groups
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| SceneError::ToolGroupNotFound(id.to_string()))
    }

    /// Attaches a viewport to `group_id`, detaching it from any other group first.
    pub fn add_viewport(
        &mut self,
        group_id: &str,
        viewport_id: &str,
        projection: ProjectionKind,
    ) -> Result<()> {
        self.get_mut(group_id)?.add_viewport(viewport_id, projection)?;
        for group in self.groups.iter_mut().filter(|g| g.id != group_id) {
            if group.remove_viewport(viewport_id) {
                debug!(group = %group.id, viewport_id, "Viewport moved to another tool group");
            }
        }
        Ok(())
    }

    pub fn group_for_viewport(&self, viewport_id: &str) -> Option<&ToolGroup> {
        self.groups.iter().find(|g| g.has_viewport(viewport_id))
    }

    pub fn remove_viewport(&mut self, viewport_id: &str) {
        for group in &mut self.groups {
            group.remove_viewport(viewport_id);
        }
    }

    pub fn destroy(&mut self, id: &str) -> bool {
        let before = self.groups.len();
        self.groups.retain(|g| g.id != id);
        self.groups.len() != before
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }
}
