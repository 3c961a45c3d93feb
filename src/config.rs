use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enums::{ActivationMode, ModifierKey, MouseButton, Orientation};
use crate::segmentation::SegmentationId;
use crate::synchronizer::SyncPolicy;
use crate::tool_group::{ConflictPolicy, InputSignal, ToolGroupId};
use crate::tools::{BrushStrategy, ToolConfig, ToolKind};
use crate::viewport::{ViewportId, ViewportSpec, VoiRange};
use crate::volume::VolumeId;

pub const SAGITTAL_VIEWPORT: &str = "CT_SAGITTAL";
pub const AXIAL_VIEWPORT: &str = "CT_AXIAL";
pub const CORONAL_VIEWPORT: &str = "CT_CORONAL";
pub const VOLUME_3D_VIEWPORT: &str = "CT_3D";

pub const MPR_TOOL_GROUP: &str = "mpr";
pub const VOLUME_3D_TOOL_GROUP: &str = "volume-3d";

const SLICER_3D_BACKGROUND: [f32; 3] = [0.2, 0.2, 0.4];

/// Everything [`Scene::setup`](crate::scene::Scene::setup) needs to build a scene.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    /// Location the volume data provider resolves the series from.
    pub archive_root: String,
    pub volume_id: VolumeId,
    pub viewports: Vec<ViewportSpec>,
    #[serde(default)]
    pub tool_groups: Vec<ToolGroupConfig>,
    #[serde(default)]
    pub synchronizers: Vec<SynchronizerConfig>,
    pub segmentation: Option<SegmentationConfig>,
    /// Upper bound on the wait for the renderer's stabilization signal.
    pub stabilization_timeout: Duration,
    /// VOI every viewport starts with.
    #[serde(default)]
    pub initial_voi: VoiRange,
}

/// One tool's entry in a group: which tool, how it is configured, what it
/// is bound to, and whether it claims input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolBinding {
    pub tool: String,
    /// Registers `tool` as a named instance of this tool first.
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub config: Option<ToolConfig>,
    #[serde(default)]
    pub bindings: Vec<InputSignal>,
    pub mode: ActivationMode,
}

impl ToolBinding {
    pub fn active(kind: ToolKind, bindings: Vec<InputSignal>) -> Self {
        Self {
            tool: kind.tool_name().to_string(),
            base: None,
            config: None,
            bindings,
            mode: ActivationMode::Active,
        }
    }

    pub fn instance(name: &str, base: ToolKind, config: ToolConfig, mode: ActivationMode) -> Self {
        Self {
            tool: name.to_string(),
            base: Some(base.tool_name().to_string()),
            config: Some(config),
            bindings: Vec::new(),
            mode,
        }
    }

    pub fn with_config(mut self, config: ToolConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_bindings(mut self, bindings: Vec<InputSignal>) -> Self {
        self.bindings = bindings;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolGroupConfig {
    pub id: ToolGroupId,
    #[serde(default)]
    pub policy: ConflictPolicy,
    /// Applied in order, so later entries win on shared signals.
    pub tools: Vec<ToolBinding>,
    pub viewports: Vec<ViewportId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SynchronizerConfig {
    pub name: String,
    pub policy: SyncPolicy,
    pub members: Vec<ViewportId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    pub id: SegmentationId,
    /// Id of the labelmap volume derived from the base volume.
    pub labelmap_volume_id: VolumeId,
    /// Viewports the labelmap representation is attached to.
    pub viewports: Vec<ViewportId>,
}

impl Default for SceneConfig {
    /// Orthogonal MPR views plus a 3-D view of one CT series, with a shared
    /// window/level and a labelmap painted from the slice views.
    fn default() -> Self {
        let mpr_viewports = vec![
            SAGITTAL_VIEWPORT.to_string(),
            AXIAL_VIEWPORT.to_string(),
            CORONAL_VIEWPORT.to_string(),
        ];
        let all_viewports: Vec<ViewportId> = mpr_viewports
            .iter()
            .cloned()
            .chain([VOLUME_3D_VIEWPORT.to_string()])
            .collect();
        Self {
            study_instance_uid: "1.3.6.1.4.1.14519.5.2.1.7009.2403.334240657131972136850343327463"
                .to_string(),
            series_instance_uid: "1.3.6.1.4.1.14519.5.2.1.7009.2403.226151125820845824875394858561"
                .to_string(),
            archive_root: "dicom".to_string(),
            volume_id: "streamingImageVolume".to_string(),
            viewports: vec![
                ViewportSpec::slice(SAGITTAL_VIEWPORT, Orientation::Sagittal, "sagittal"),
                ViewportSpec::slice(AXIAL_VIEWPORT, Orientation::Axial, "axial"),
                ViewportSpec::slice(CORONAL_VIEWPORT, Orientation::Coronal, "coronal"),
                ViewportSpec::volume_3d(VOLUME_3D_VIEWPORT, "volume-3d")
                    .with_background(SLICER_3D_BACKGROUND)
                    .with_preset("CT-Bone"),
            ],
            tool_groups: vec![
                ToolGroupConfig {
                    id: MPR_TOOL_GROUP.to_string(),
                    policy: ConflictPolicy::LastWins,
                    tools: mpr_bindings(),
                    viewports: mpr_viewports.clone(),
                },
                ToolGroupConfig {
                    id: VOLUME_3D_TOOL_GROUP.to_string(),
                    policy: ConflictPolicy::LastWins,
                    tools: manipulation_bindings(true, false),
                    viewports: vec![VOLUME_3D_VIEWPORT.to_string()],
                },
            ],
            synchronizers: vec![SynchronizerConfig {
                name: "ctWLSync".to_string(),
                policy: SyncPolicy::voi(true, true),
                members: all_viewports,
            }],
            segmentation: Some(SegmentationConfig {
                id: "MY_SEGMENTATION_ID".to_string(),
                labelmap_volume_id: "MY_SEGMENTATION_ID".to_string(),
                viewports: mpr_viewports,
            }),
            stabilization_timeout: Duration::from_secs(5),
            initial_voi: VoiRange::from_range(-180.0, 220.0),
        }
    }
}

impl SceneConfig {
    /// Axial and sagittal views for labelmap editing with sphere brushes,
    /// and a 3-D view that shows the segmentation as a surface once converted.
    pub fn segmentation_editing() -> Self {
        let slice_viewports = vec![AXIAL_VIEWPORT.to_string(), SAGITTAL_VIEWPORT.to_string()];
        let mut editing_tools = manipulation_bindings(false, false);
        editing_tools.extend(sphere_brush_bindings());
        Self {
            study_instance_uid: "1.3.12.2.1107.5.2.32.35162.30000015050317233592200000046"
                .to_string(),
            series_instance_uid: "1.3.12.2.1107.5.2.32.35162.1999123112191238897317963.0.0.0"
                .to_string(),
            viewports: vec![
                ViewportSpec::slice(AXIAL_VIEWPORT, Orientation::Axial, "axial"),
                ViewportSpec::slice(SAGITTAL_VIEWPORT, Orientation::Sagittal, "sagittal"),
                ViewportSpec::volume_3d(VOLUME_3D_VIEWPORT, "volume-3d").with_preset("CT-Bone"),
            ],
            tool_groups: vec![
                ToolGroupConfig {
                    id: MPR_TOOL_GROUP.to_string(),
                    policy: ConflictPolicy::LastWins,
                    tools: editing_tools,
                    viewports: slice_viewports.clone(),
                },
                ToolGroupConfig {
                    id: VOLUME_3D_TOOL_GROUP.to_string(),
                    policy: ConflictPolicy::LastWins,
                    tools: manipulation_bindings(true, false),
                    viewports: vec![VOLUME_3D_VIEWPORT.to_string()],
                },
            ],
            synchronizers: Vec::new(),
            segmentation: Some(SegmentationConfig {
                id: "MY_SEGMENTATION_ID".to_string(),
                labelmap_volume_id: "MY_SEGMENTATION_ID".to_string(),
                viewports: slice_viewports,
            }),
            ..Self::default()
        }
    }
}

/// Navigation and measurement bindings shared by the reference scenes.
///
/// | tool            | signals                                         |
/// |-----------------|-------------------------------------------------|
/// | Pan             | auxiliary, touch(1)+ctrl                        |
/// | Zoom            | secondary (+ primary+shift when enabled)        |
/// | StackScroll     | primary+alt, touch(1)+alt, wheel                |
/// | Length          | primary+shift+ctrl, touch(1)+shift+ctrl         |
/// | TrackballRotate | primary, 3-D groups only                        |
pub fn manipulation_bindings(is_3d: bool, enable_shift_click_zoom: bool) -> Vec<ToolBinding> {
    let mut zoom_bindings = vec![InputSignal::mouse(MouseButton::Secondary)];
    if enable_shift_click_zoom {
        zoom_bindings
            .push(InputSignal::mouse(MouseButton::Primary).with_modifier(ModifierKey::Shift));
    }

    let mut tools = vec![
        ToolBinding::active(
            ToolKind::Pan,
            vec![
                InputSignal::mouse(MouseButton::Auxiliary),
                InputSignal::touch(1).with_modifier(ModifierKey::Ctrl),
            ],
        ),
        ToolBinding::active(ToolKind::Zoom, zoom_bindings).with_config(ToolConfig::Zoom {
            min_scale: 0.001,
            max_scale: 4000.0,
        }),
        ToolBinding::active(
            ToolKind::StackScroll,
            vec![
                InputSignal::mouse(MouseButton::Primary).with_modifier(ModifierKey::Alt),
                InputSignal::touch(1).with_modifier(ModifierKey::Alt),
                InputSignal::mouse(MouseButton::Wheel),
            ],
        ),
        ToolBinding::active(
            ToolKind::Length,
            vec![
                InputSignal::mouse(MouseButton::Primary).with_modifier(ModifierKey::ShiftCtrl),
                InputSignal::touch(1).with_modifier(ModifierKey::ShiftCtrl),
            ],
        ),
    ];
    if is_3d {
        tools.push(ToolBinding::active(
            ToolKind::TrackballRotate,
            vec![InputSignal::mouse(MouseButton::Primary)],
        ));
    }
    tools
}

/// Slice-view group of the default scene: brush on primary, window/level
/// on secondary, stack scroll on the wheel. Zoom is configured but inert.
pub fn mpr_bindings() -> Vec<ToolBinding> {
    vec![
        ToolBinding {
            mode: ActivationMode::Disabled,
            ..ToolBinding::active(ToolKind::Zoom, Vec::new())
        },
        ToolBinding::active(ToolKind::Brush, vec![InputSignal::mouse(MouseButton::Primary)]),
        ToolBinding::active(
            ToolKind::WindowLevel,
            vec![InputSignal::mouse(MouseButton::Secondary)],
        ),
        ToolBinding::active(ToolKind::StackScroll, vec![InputSignal::mouse(MouseButton::Wheel)]),
    ]
}

/// `SphereBrush` painting on primary and a passive `EraserBrush`.
pub fn sphere_brush_bindings() -> Vec<ToolBinding> {
    let brush = |strategy| ToolConfig::Brush {
        strategy,
        radius_mm: 5.0,
        segment_index: 1,
    };
    vec![
        ToolBinding::instance(
            "SphereBrush",
            ToolKind::Brush,
            brush(BrushStrategy::FillInsideSphere),
            ActivationMode::Active,
        )
        .with_bindings(vec![InputSignal::mouse(MouseButton::Primary)]),
        ToolBinding::instance(
            "EraserBrush",
            ToolKind::Brush,
            brush(BrushStrategy::EraseInsideSphere),
            ActivationMode::Passive,
        ),
    ]
}
