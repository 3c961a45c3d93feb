use std::time::Duration;

use dicom_viewports::config::{
    AXIAL_VIEWPORT, MPR_TOOL_GROUP, VOLUME_3D_VIEWPORT, manipulation_bindings, mpr_bindings,
    sphere_brush_bindings,
};
use dicom_viewports::enums::{ActivationMode, ModifierKey, MouseButton, ProjectionKind};
use dicom_viewports::tool_group::{ConflictPolicy, InputSignal, Trigger};
use dicom_viewports::tools::{BrushStrategy, ToolConfig};
use dicom_viewports::viewport::VoiRange;
use dicom_viewports::SceneConfig;

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

#[test]
fn test_default_config_survives_json() {
    let config = SceneConfig::default();
    let json = serde_json::to_string_pretty(&config).unwrap();
    let parsed: SceneConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_editing_config_survives_json() {
    let config = SceneConfig::segmentation_editing();
    let json = serde_json::to_string(&config).unwrap();
    let parsed: SceneConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_minimal_json_uses_defaults() {
    let json = r#"{
        "study_instance_uid": "1.2.3",
        "series_instance_uid": "4.5.6",
        "archive_root": "/data/ct",
        "volume_id": "ct",
        "viewports": [{
            "id": "axial",
            "projection": "OrthographicSlice",
            "orientation": "Axial",
            "surface": { "element": "axial", "width": 256, "height": 256 }
        }],
        "stabilization_timeout": { "secs": 2, "nanos": 0 }
    }"#;
    let config: SceneConfig = serde_json::from_str(json).unwrap();

    assert!(config.tool_groups.is_empty());
    assert!(config.synchronizers.is_empty());
    assert!(config.segmentation.is_none());
    assert_eq!(config.initial_voi, VoiRange::default());
    assert_eq!(config.stabilization_timeout, Duration::from_secs(2));

    let viewport = &config.viewports[0];
    assert_eq!(viewport.projection, ProjectionKind::OrthographicSlice);
    assert_eq!(viewport.volume, None);
    assert_eq!(viewport.background, None);
    assert_eq!(viewport.preset, None);
}

#[test]
fn test_tool_group_json_defaults() {
    let json = r#"{
        "id": "mpr",
        "tools": [
            { "tool": "StackScroll", "mode": "Active",
              "bindings": [{ "trigger": { "Mouse": "Wheel" } }] },
            { "tool": "Zoom", "mode": "Passive",
              "config": { "kind": "Zoom", "min_scale": 0.5, "max_scale": 8.0 } }
        ],
        "viewports": ["axial"]
    }"#;
    let group: dicom_viewports::config::ToolGroupConfig = serde_json::from_str(json).unwrap();

    assert_eq!(group.policy, ConflictPolicy::LastWins);
    assert_eq!(group.tools[0].bindings, vec![InputSignal::mouse(MouseButton::Wheel)]);
    assert_eq!(group.tools[0].base, None);
    assert_eq!(
        group.tools[1].config,
        Some(ToolConfig::Zoom {
            min_scale: 0.5,
            max_scale: 8.0
        })
    );
    assert!(group.tools[1].bindings.is_empty());
}

// ---------------------------------------------------------------------------
// Reference scenes
// ---------------------------------------------------------------------------

#[test]
fn test_default_scene_layout() {
    let config = SceneConfig::default();
    assert_eq!(config.viewports.len(), 4);
    assert_eq!(config.initial_voi, VoiRange::new(20.0, 400.0));
    assert_eq!(config.stabilization_timeout, Duration::from_secs(5));

    let volume_3d = config
        .viewports
        .iter()
        .find(|v| v.id == VOLUME_3D_VIEWPORT)
        .unwrap();
    assert_eq!(volume_3d.projection, ProjectionKind::Volumetric3d);
    assert_eq!(volume_3d.preset.as_deref(), Some("CT-Bone"));

    let sync = &config.synchronizers[0];
    assert_eq!(sync.name, "ctWLSync");
    assert!(sync.policy.voi && sync.policy.invert && sync.policy.colormap);
    assert!(!sync.policy.camera);
    assert_eq!(sync.members.len(), 4);

    let segmentation = config.segmentation.as_ref().unwrap();
    assert_eq!(segmentation.viewports.len(), 3);
    assert!(!segmentation.viewports.iter().any(|v| v == VOLUME_3D_VIEWPORT));
}

#[test]
fn test_editing_scene_layout() {
    let config = SceneConfig::segmentation_editing();
    assert_eq!(config.viewports.len(), 3);
    assert!(config.synchronizers.is_empty());

    let mpr = config
        .tool_groups
        .iter()
        .find(|g| g.id == MPR_TOOL_GROUP)
        .unwrap();
    assert!(mpr.viewports.iter().any(|v| v == AXIAL_VIEWPORT));
    assert!(mpr.tools.iter().any(|t| t.tool == "SphereBrush"));
    assert!(!mpr.tools.iter().any(|t| t.tool == "TrackballRotate"));
}

// ---------------------------------------------------------------------------
// Binding tables
// ---------------------------------------------------------------------------

#[test]
fn test_manipulation_bindings_table() {
    let tools = manipulation_bindings(false, false);
    let names: Vec<&str> = tools.iter().map(|t| t.tool.as_str()).collect();
    assert_eq!(names, ["Pan", "Zoom", "StackScroll", "Length"]);
    assert!(tools.iter().all(|t| t.mode == ActivationMode::Active));

    let zoom = &tools[1];
    assert_eq!(zoom.bindings, vec![InputSignal::mouse(MouseButton::Secondary)]);
    assert_eq!(
        zoom.config,
        Some(ToolConfig::Zoom {
            min_scale: 0.001,
            max_scale: 4000.0
        })
    );

    let scroll = &tools[2];
    assert_eq!(scroll.bindings.len(), 3);
    assert_eq!(scroll.bindings[1].trigger, Trigger::Touch(1));
    assert_eq!(scroll.bindings[1].modifier, ModifierKey::Alt);
}

#[test]
fn test_manipulation_bindings_options() {
    let tools = manipulation_bindings(true, true);
    assert_eq!(tools.last().unwrap().tool, "TrackballRotate");

    let zoom = tools.iter().find(|t| t.tool == "Zoom").unwrap();
    assert!(zoom
        .bindings
        .contains(&InputSignal::mouse(MouseButton::Primary).with_modifier(ModifierKey::Shift)));
}

#[test]
fn test_mpr_bindings_keep_zoom_disabled() {
    let tools = mpr_bindings();
    let zoom = tools.iter().find(|t| t.tool == "Zoom").unwrap();
    assert_eq!(zoom.mode, ActivationMode::Disabled);
    assert!(zoom.bindings.is_empty());
}

#[test]
fn test_sphere_brush_instances() {
    let tools = sphere_brush_bindings();
    assert_eq!(tools.len(), 2);
    for tool in &tools {
        assert_eq!(tool.base.as_deref(), Some("Brush"));
    }
    assert_eq!(tools[0].tool, "SphereBrush");
    assert_eq!(tools[0].mode, ActivationMode::Active);
    assert_eq!(tools[1].tool, "EraserBrush");
    assert_eq!(tools[1].mode, ActivationMode::Passive);
    assert!(matches!(
        tools[1].config,
        Some(ToolConfig::Brush {
            strategy: BrushStrategy::EraseInsideSphere,
            ..
        })
    ));
}
