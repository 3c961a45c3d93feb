use dicom_viewports::enums::{Orientation, RepresentationKind};
use dicom_viewports::renderer::{FrameRequest, RenderBackend, SoftwareRenderer};
use dicom_viewports::viewport::{
    ChangeOrigin, SurfaceHandle, ViewportRegistry, ViewportSpec, ViewportStatus, VoiRange,
};
use dicom_viewports::volume::{Labelmap, Volume};
use dicom_viewports::SceneError;
use image::Rgb;
use ndarray::Array3;

const SIZE: u32 = 32;

fn volume() -> Volume {
    Volume::from_data("ct", Array3::from_elem((4, 8, 8), 100i16), (1.0, 1.0, 1.0))
}

fn registry(volume: &Volume, ids: &[&str]) -> ViewportRegistry {
    let mut registry = ViewportRegistry::new();
    let specs: Vec<ViewportSpec> = ids
        .iter()
        .map(|id| ViewportSpec {
            surface: SurfaceHandle::new(*id, SIZE, SIZE),
            ..ViewportSpec::slice(id, Orientation::Axial, id)
        })
        .collect();
    registry.define_viewports(&specs).unwrap();
    for id in ids {
        registry
            .set_volumes(id, vec![volume.id.clone()], volume.geometry.as_ref())
            .unwrap();
        registry
            .set_voi(id, VoiRange::new(100.0, 200.0), ChangeOrigin::Api)
            .unwrap();
    }
    registry
}

fn centre_pixel(renderer: &SoftwareRenderer, id: &str) -> Rgb<u8> {
    *renderer.frame(id).unwrap().get_pixel(SIZE / 2, SIZE / 2)
}

// ---------------------------------------------------------------------------
// Pixels
// ---------------------------------------------------------------------------

#[test]
fn test_slice_is_mapped_through_voi() {
    let volume = volume();
    let registry = registry(&volume, &["axial"]);
    let renderer = SoftwareRenderer::new();

    let results = renderer.render(&[FrameRequest {
        viewport: registry.get_viewport("axial").unwrap(),
        volume: Some(&volume),
        overlays: Vec::new(),
    }]);
    assert!(results[0].1.is_ok());

    let frame = renderer.frame("axial").unwrap();
    assert_eq!(frame.dimensions(), (SIZE, SIZE));
    // 100 sits halfway up a window spanning 0..200
    assert_eq!(centre_pixel(&renderer, "axial"), Rgb([128, 128, 128]));
}

#[test]
fn test_labelmap_overlay_is_blended() {
    let volume = volume();
    let registry = registry(&volume, &["axial"]);
    let labelmap = Labelmap::derived_from("seg", &volume, volume.geometry.unwrap());
    labelmap.voxels_mut().fill(1);
    let renderer = SoftwareRenderer::new();

    renderer.render(&[FrameRequest {
        viewport: registry.get_viewport("axial").unwrap(),
        volume: Some(&volume),
        overlays: vec![(RepresentationKind::Labelmap, labelmap)],
    }]);
    assert_eq!(centre_pixel(&renderer, "axial"), Rgb([174, 106, 106]));
}

#[test]
fn test_error_status_draws_overlay() {
    let volume = volume();
    let mut registry = registry(&volume, &["axial"]);
    registry
        .set_status("axial", ViewportStatus::Error("load failed".to_string()))
        .unwrap();
    let renderer = SoftwareRenderer::new();

    renderer.render(&[FrameRequest {
        viewport: registry.get_viewport("axial").unwrap(),
        volume: Some(&volume),
        overlays: Vec::new(),
    }]);
    let frame = renderer.frame("axial").unwrap();
    assert!(frame.pixels().all(|p| *p == Rgb([96, 0, 0])));
}

#[test]
fn test_hidden_volume_shows_background() {
    let volume = volume();
    let mut registry = registry(&volume, &["axial"]);
    let mut properties = registry.get_viewport("axial").unwrap().properties.clone();
    properties.volume_visible = false;
    properties.background = [0.2, 0.2, 0.4];
    registry.set_properties("axial", properties).unwrap();
    let renderer = SoftwareRenderer::new();

    renderer.render(&[FrameRequest {
        viewport: registry.get_viewport("axial").unwrap(),
        volume: Some(&volume),
        overlays: Vec::new(),
    }]);
    assert_eq!(centre_pixel(&renderer, "axial"), Rgb([51, 51, 102]));
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[test]
fn test_failing_viewport_does_not_block_others() {
    let volume = volume();
    let mut registry = registry(&volume, &["lost", "fine"]);
    let mut camera = registry.get_viewport("lost").unwrap().camera;
    camera.focal_point[2] = 100.0;
    registry.set_camera("lost", camera, ChangeOrigin::Api).unwrap();
    let renderer = SoftwareRenderer::new();

    let results = renderer.render(&[
        FrameRequest {
            viewport: registry.get_viewport("lost").unwrap(),
            volume: Some(&volume),
            overlays: Vec::new(),
        },
        FrameRequest {
            viewport: registry.get_viewport("fine").unwrap(),
            volume: Some(&volume),
            overlays: Vec::new(),
        },
    ]);

    assert_eq!(results.len(), 2);
    assert!(matches!(
        &results[0],
        (id, Err(SceneError::Render { .. })) if id == "lost"
    ));
    assert!(matches!(&results[1], (id, Ok(())) if id == "fine"));
    assert!(renderer.frame("lost").is_none());
    assert!(renderer.frame("fine").is_some());
}

// ---------------------------------------------------------------------------
// Stabilization
// ---------------------------------------------------------------------------

#[test]
fn test_stabilization_fires_after_first_pass() {
    let volume = volume();
    let registry = registry(&volume, &["axial"]);
    let renderer = SoftwareRenderer::new();

    let mut early = renderer.stabilized();
    assert_eq!(early.try_recv().unwrap(), None);

    renderer.render(&[FrameRequest {
        viewport: registry.get_viewport("axial").unwrap(),
        volume: Some(&volume),
        overlays: Vec::new(),
    }]);
    assert_eq!(early.try_recv().unwrap(), Some(()));

    let mut late = renderer.stabilized();
    assert_eq!(late.try_recv().unwrap(), Some(()));
}

#[test]
fn test_empty_pass_does_not_stabilize() {
    let renderer = SoftwareRenderer::new();
    let mut receiver = renderer.stabilized();
    assert!(renderer.render(&[]).is_empty());
    assert_eq!(receiver.try_recv().unwrap(), None);
}
