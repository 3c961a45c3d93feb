use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::enums::ProjectionKind;
use crate::error::{Result, SceneError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrushStrategy {
    FillInsideSphere,
    EraseInsideSphere,
    FillInsideCircle,
    EraseInsideCircle,
}

impl BrushStrategy {
    pub fn erases(&self) -> bool {
        matches!(
            self,
            BrushStrategy::EraseInsideSphere | BrushStrategy::EraseInsideCircle
        )
    }

    /// Circle strategies stay on the slice under the pointer.
    pub fn is_planar(&self) -> bool {
        matches!(
            self,
            BrushStrategy::FillInsideCircle | BrushStrategy::EraseInsideCircle
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    Pan,
    Zoom,
    WindowLevel,
    StackScroll,
    Length,
    TrackballRotate,
    Brush,
}

impl ToolKind {
    pub const ALL: [ToolKind; 7] = [
        ToolKind::Pan,
        ToolKind::Zoom,
        ToolKind::WindowLevel,
        ToolKind::StackScroll,
        ToolKind::Length,
        ToolKind::TrackballRotate,
        ToolKind::Brush,
    ];

    /// Name the tool is registered under by default.
    pub fn tool_name(&self) -> &'static str {
        match self {
            ToolKind::Pan => "Pan",
            ToolKind::Zoom => "Zoom",
            ToolKind::WindowLevel => "WindowLevel",
            ToolKind::StackScroll => "StackScroll",
            ToolKind::Length => "Length",
            ToolKind::TrackballRotate => "TrackballRotate",
            ToolKind::Brush => "Brush",
        }
    }

    pub fn default_config(&self) -> ToolConfig {
        match self {
            ToolKind::Pan => ToolConfig::Pan,
            ToolKind::Zoom => ToolConfig::Zoom {
                min_scale: 0.1,
                max_scale: 20.0,
            },
            ToolKind::WindowLevel => ToolConfig::WindowLevel { sensitivity: 4.0 },
            ToolKind::StackScroll => ToolConfig::StackScroll { invert: false },
            ToolKind::Length => ToolConfig::Length,
            ToolKind::TrackballRotate => ToolConfig::TrackballRotate {
                degrees_per_pixel: 0.5,
            },
            ToolKind::Brush => ToolConfig::Brush {
                strategy: BrushStrategy::FillInsideCircle,
                radius_mm: 5.0,
                segment_index: 1,
            },
        }
    }

    pub fn supports(&self, projection: ProjectionKind) -> bool {
        match self {
            ToolKind::TrackballRotate => projection == ProjectionKind::Volumetric3d,
            ToolKind::Brush => projection == ProjectionKind::OrthographicSlice,
            _ => true,
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tool_name())
    }
}

/// Per-tool configuration, one variant per tool kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ToolConfig {
    Pan,
    Zoom {
        min_scale: f64,
        max_scale: f64,
    },
    WindowLevel {
        /// Intensity units per dragged pixel.
        sensitivity: f64,
    },
    StackScroll {
        invert: bool,
    },
    Length,
    TrackballRotate {
        degrees_per_pixel: f64,
    },
    Brush {
        strategy: BrushStrategy,
        radius_mm: f64,
        segment_index: u8,
    },
}

impl ToolConfig {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolConfig::Pan => ToolKind::Pan,
            ToolConfig::Zoom { .. } => ToolKind::Zoom,
            ToolConfig::WindowLevel { .. } => ToolKind::WindowLevel,
            ToolConfig::StackScroll { .. } => ToolKind::StackScroll,
            ToolConfig::Length => ToolKind::Length,
            ToolConfig::TrackballRotate { .. } => ToolKind::TrackballRotate,
            ToolConfig::Brush { .. } => ToolKind::Brush,
        }
    }
}

/// A registered tool: a built-in kind under its default name, or a named
/// instance of one with its own configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub base: Option<String>,
    pub config: ToolConfig,
}

impl ToolDescriptor {
    pub fn kind(&self) -> ToolKind {
        self.config.kind()
    }
}

/// Scene-wide catalogue of tools that tool groups may reference by name.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in tool kind under its default name.
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        for kind in ToolKind::ALL {
            registry.add_tool(kind.tool_name(), kind.default_config());
        }
        registry
    }

    /// Registers a tool. Registering a name twice keeps the first registration.
    pub fn add_tool(&mut self, name: &str, config: ToolConfig) -> bool {
        if self.tools.contains_key(name) {
            debug!(tool = name, "Tool already registered");
            return false;
        }
        self.tools.insert(
            name.to_string(),
            ToolDescriptor {
                name: name.to_string(),
                base: None,
                config,
            },
        );
        true
    }

    /// Registers `name` as an instance of `base` with its own configuration.
    pub fn add_tool_instance(
        &mut self,
        name: &str,
        base: &str,
        config: Option<ToolConfig>,
    ) -> Result<&ToolDescriptor> {
        let base_descriptor = self
            .tools
            .get(base)
            .ok_or_else(|| SceneError::UnknownTool(base.to_string()))?;
        let config = match config {
            Some(config) if config.kind() != base_descriptor.kind() => {
                return Err(SceneError::ToolKindMismatch {
                    tool: name.to_string(),
                    expected: base_descriptor.kind(),
                    found: config.kind(),
                });
            }
            Some(config) => config,
            None => base_descriptor.config.clone(),
        };
        if self.tools.contains_key(name) {
            return Err(SceneError::DuplicateTool(name.to_string()));
        }
        self.tools.insert(
            name.to_string(),
            ToolDescriptor {
                name: name.to_string(),
                base: Some(base.to_string()),
                config,
            },
        );
        debug!(tool = name, base, "Tool instance registered");
        Ok(&self.tools[name])
    }

    pub fn get(&self, name: &str) -> Result<&ToolDescriptor> {
        self.tools
            .get(name)
            .ok_or_else(|| SceneError::UnknownTool(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
