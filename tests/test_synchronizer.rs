use dicom_viewports::enums::Orientation;
use dicom_viewports::synchronizer::{SyncPolicy, Synchronizer, SynchronizerManager};
use dicom_viewports::viewport::{
    ChangeOrigin, Colormap, ViewportChange, ViewportEvent, ViewportRegistry, ViewportSpec, VoiRange,
};
use dicom_viewports::volume::VolumeGeometry;
use dicom_viewports::SceneError;

fn registry() -> ViewportRegistry {
    let mut registry = ViewportRegistry::new();
    registry
        .define_viewports(&[
            ViewportSpec::slice("axial", Orientation::Axial, "a"),
            ViewportSpec::slice("axial-2", Orientation::Axial, "b"),
            ViewportSpec::slice("sagittal", Orientation::Sagittal, "c"),
            ViewportSpec::slice("coronal", Orientation::Coronal, "d"),
        ])
        .unwrap();
    let geometry = VolumeGeometry::new((9, 16, 16), (1.0, 1.0, 1.0));
    for id in registry.ids() {
        registry
            .set_volumes(&id, vec!["ct".to_string()], Some(&geometry))
            .unwrap();
    }
    registry
}

fn voi_sync(manager: &mut SynchronizerManager, name: &str, members: &[&str]) {
    let synchronizer = manager
        .create_synchronizer(name, SyncPolicy::voi(true, true))
        .unwrap();
    for member in members {
        synchronizer.add(member);
    }
}

// ---------------------------------------------------------------------------
// Window/level convergence
// ---------------------------------------------------------------------------

#[test]
fn test_voi_converges_to_absolute_value() {
    let mut registry = registry();
    let mut manager = SynchronizerManager::new();
    voi_sync(&mut manager, "wl", &["axial", "sagittal", "coronal"]);

    registry
        .set_voi("sagittal", VoiRange::new(-500.0, 1500.0), ChangeOrigin::Api)
        .unwrap();
    registry.take_events();
    registry
        .set_voi("axial", VoiRange::new(300.0, 1200.0), ChangeOrigin::Input)
        .unwrap();
    manager.pump(&mut registry);

    for id in ["axial", "sagittal", "coronal"] {
        assert_eq!(registry.get_viewport(id).unwrap().voi, VoiRange::new(300.0, 1200.0));
    }
    assert_eq!(registry.pending_events(), 0);
}

#[test]
fn test_non_member_viewport_is_not_touched() {
    let mut registry = registry();
    let mut manager = SynchronizerManager::new();
    voi_sync(&mut manager, "wl", &["axial", "sagittal"]);
    let before = registry.get_viewport("coronal").unwrap().voi;

    registry
        .set_voi("axial", VoiRange::new(10.0, 20.0), ChangeOrigin::Input)
        .unwrap();
    manager.pump(&mut registry);

    assert_eq!(registry.get_viewport("coronal").unwrap().voi, before);
}

#[test]
fn test_change_on_non_member_is_not_relayed() {
    let mut registry = registry();
    let mut manager = SynchronizerManager::new();
    voi_sync(&mut manager, "wl", &["axial", "sagittal"]);

    registry
        .set_voi("coronal", VoiRange::new(10.0, 20.0), ChangeOrigin::Input)
        .unwrap();
    assert_eq!(manager.pump(&mut registry), 0);
    assert_ne!(registry.get_viewport("axial").unwrap().voi, VoiRange::new(10.0, 20.0));
}

#[test]
fn test_invert_and_colormap_follow_policy() {
    let mut registry = registry();
    let mut manager = SynchronizerManager::new();
    manager
        .create_synchronizer("wl-only", SyncPolicy::voi(false, false))
        .unwrap();
    let synchronizer = manager.get_mut("wl-only").unwrap();
    synchronizer.add("axial");
    synchronizer.add("sagittal");

    registry.set_invert("axial", true, ChangeOrigin::Input).unwrap();
    registry
        .set_colormap("axial", Colormap::Named("hot".to_string()), ChangeOrigin::Input)
        .unwrap();
    manager.pump(&mut registry);

    let sagittal = registry.get_viewport("sagittal").unwrap();
    assert!(!sagittal.invert);
    assert_eq!(sagittal.colormap, Colormap::Grayscale);
}

// ---------------------------------------------------------------------------
// Idempotence and termination
// ---------------------------------------------------------------------------

#[test]
fn test_propagating_same_event_twice_is_idempotent() {
    let mut registry = registry();
    let mut synchronizer = Synchronizer::new("wl", SyncPolicy::voi(false, false));
    for id in ["axial", "sagittal", "coronal"] {
        synchronizer.add(id);
    }
    let event = ViewportEvent {
        viewport_id: "axial".to_string(),
        change: ViewportChange::Voi(VoiRange::new(50.0, 350.0)),
        origin: ChangeOrigin::Input,
    };

    assert_eq!(synchronizer.propagate(&event, &mut registry), 2);
    let after_once: Vec<VoiRange> = registry.iter().map(|v| v.voi).collect();
    assert_eq!(synchronizer.propagate(&event, &mut registry), 0);
    let after_twice: Vec<VoiRange> = registry.iter().map(|v| v.voi).collect();
    assert_eq!(after_once, after_twice);
}

#[test]
fn test_own_writes_are_not_relayed() {
    let mut registry = registry();
    let mut synchronizer = Synchronizer::new("wl", SyncPolicy::voi(false, false));
    synchronizer.add("axial");
    synchronizer.add("sagittal");
    let event = ViewportEvent {
        viewport_id: "axial".to_string(),
        change: ViewportChange::Voi(VoiRange::new(1.0, 2.0)),
        origin: ChangeOrigin::Synchronizer("wl".to_string()),
    };
    assert_eq!(synchronizer.propagate(&event, &mut registry), 0);
}

#[test]
fn test_overlapping_synchronizers_settle() {
    let mut registry = registry();
    let mut manager = SynchronizerManager::new();
    voi_sync(&mut manager, "first", &["axial", "sagittal"]);
    voi_sync(&mut manager, "second", &["sagittal", "coronal", "axial"]);

    registry
        .set_voi("axial", VoiRange::new(77.0, 123.0), ChangeOrigin::Input)
        .unwrap();
    manager.pump(&mut registry);

    assert_eq!(registry.pending_events(), 0);
    for id in ["axial", "sagittal", "coronal"] {
        assert_eq!(registry.get_viewport(id).unwrap().voi, VoiRange::new(77.0, 123.0));
    }
    assert_ne!(
        registry.get_viewport("axial-2").unwrap().voi,
        VoiRange::new(77.0, 123.0)
    );
}

// ---------------------------------------------------------------------------
// Camera
// ---------------------------------------------------------------------------

#[test]
fn test_camera_copies_pose_within_orientation_and_position_across() {
    let mut registry = registry();
    let mut manager = SynchronizerManager::new();
    let synchronizer = manager
        .create_synchronizer("camera", SyncPolicy::camera_position())
        .unwrap();
    for id in ["axial", "axial-2", "sagittal"] {
        synchronizer.add(id);
    }

    let mut camera = registry.get_viewport("axial").unwrap().camera;
    camera.focal_point = [3.0, 4.0, 5.0];
    camera.parallel_scale = 2.5;
    registry.set_camera("axial", camera, ChangeOrigin::Input).unwrap();
    manager.pump(&mut registry);

    assert_eq!(registry.get_viewport("axial-2").unwrap().camera, camera);
    let sagittal = registry.get_viewport("sagittal").unwrap().camera;
    assert_eq!(sagittal.focal_point, [3.0, 4.0, 5.0]);
    assert_eq!(sagittal.parallel_scale, 2.5);
    assert_eq!(sagittal.view_plane_normal, Orientation::Sagittal.view_plane_normal());
}

#[test]
fn test_voi_synchronizer_ignores_camera_changes() {
    let mut registry = registry();
    let mut manager = SynchronizerManager::new();
    voi_sync(&mut manager, "wl", &["axial", "axial-2"]);
    let before = registry.get_viewport("axial-2").unwrap().camera;

    let mut camera = registry.get_viewport("axial").unwrap().camera;
    camera.parallel_scale *= 2.0;
    registry.set_camera("axial", camera, ChangeOrigin::Input).unwrap();
    manager.pump(&mut registry);

    assert_eq!(registry.get_viewport("axial-2").unwrap().camera, before);
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

#[test]
fn test_membership_changes_are_idempotent() {
    let mut synchronizer = Synchronizer::new("wl", SyncPolicy::voi(false, false));
    assert!(synchronizer.add("axial"));
    assert!(!synchronizer.add("axial"));
    assert_eq!(synchronizer.members().len(), 1);
    assert!(synchronizer.remove("axial"));
    assert!(!synchronizer.remove("axial"));
    assert!(synchronizer.members().is_empty());
}

#[test]
fn test_destroyed_member_is_pruned_silently() {
    let mut registry = registry();
    let mut manager = SynchronizerManager::new();
    voi_sync(&mut manager, "wl", &["axial", "sagittal", "coronal"]);
    registry.remove_viewport("coronal").unwrap();

    registry
        .set_voi("axial", VoiRange::new(5.0, 15.0), ChangeOrigin::Input)
        .unwrap();
    manager.pump(&mut registry);

    let synchronizer = manager.get("wl").unwrap();
    assert_eq!(synchronizer.members(), ["axial", "sagittal"]);
    assert_eq!(registry.get_viewport("sagittal").unwrap().voi, VoiRange::new(5.0, 15.0));
}

#[test]
fn test_duplicate_synchronizer_name_is_rejected() {
    let mut manager = SynchronizerManager::new();
    manager
        .create_synchronizer("wl", SyncPolicy::voi(false, false))
        .unwrap();
    let result = manager.create_synchronizer("wl", SyncPolicy::camera_position());
    assert!(matches!(result, Err(SceneError::DuplicateSynchronizer(name)) if name == "wl"));
    assert!(manager.destroy("wl"));
    assert!(manager.is_empty());
}
