use glam::Vec3;
use lumen_core::{Camera, LightingConfig, Transform, TransformStore, Viewport};
use lumen_lights::{LightInitInfo, LightParameter, LightingContext};
use lumen_renderer::{
    CullOutcome, FrameInfo, FrameLightingOutcome, HeadlessDevice, LightingRenderer, RenderDevice,
    RenderError, TextureDesc, TextureId, ViewId,
};

const MAIN: ViewId = ViewId(0);
const SCENE: u64 = 42;

fn config() -> LightingConfig {
    LightingConfig {
        frames_in_flight: 2,
        initial_cullable_capacity: 4,
        ..LightingConfig::default()
    }
}

fn depth(device: &mut HeadlessDevice) -> TextureId {
    device
        .create_texture(&TextureDesc {
            label: "depth".into(),
            width: 800,
            height: 600,
        })
        .unwrap()
}

fn frame(frame_index: usize, depth: TextureId) -> FrameInfo {
    FrameInfo {
        view: MAIN,
        light_set: SCENE,
        frame_index,
        camera: Camera::default(),
        camera_transform: Transform::from_xyz(0.0, 2.0, 10.0),
        viewport: Viewport::new(800, 600),
        depth,
    }
}

#[test]
fn renders_lights_and_exposes_shading_bindings() {
    let mut device = HeadlessDevice::new();
    let depth = depth(&mut device);
    let mut renderer = LightingRenderer::new(&mut device, config()).unwrap();
    renderer.create_view(&mut device, MAIN).unwrap();

    let mut transforms = TransformStore::new();
    let mut context = LightingContext::from_config(renderer.config());
    let lamp = transforms.spawn(Transform::from_xyz(1.0, 1.0, 0.0));
    let sun = transforms.spawn(Transform::default());
    let handle = context.add_light(SCENE, &LightInitInfo::point(lamp, 4.0), &transforms);
    context.add_light(SCENE, &LightInitInfo::directional(sun), &transforms);
    context.add_light(
        SCENE,
        &LightInitInfo::ambient()
            .with_color(Vec3::splat(0.1))
            .with_intensity(0.5),
        &transforms,
    );

    let outcome = renderer
        .render_lights(&mut device, &context, &transforms, &frame(0, depth))
        .unwrap();
    let FrameLightingOutcome::Rendered { sync, cull } = outcome else {
        panic!("expected a rendered frame, got {outcome:?}");
    };
    assert!(sync.full_rewrite);
    assert_eq!(sync.slots_written, 1);
    assert_eq!(sync.non_cullable_written, 1);
    assert_eq!(cull, CullOutcome::Culled);
    device.submit().unwrap();

    let bindings = renderer.shading_bindings(MAIN, 0).unwrap();
    assert_eq!(bindings.non_cullable_count, 1);
    assert_eq!(bindings.light_grid.tile_counts, [50, 38]);
    let ambient = bindings.ambient.unwrap();
    assert_eq!(ambient.intensity, 0.5);

    // A moved lamp only dirties its own slot.
    transforms.end_frame();
    transforms.set_transform(lamp, Transform::from_xyz(3.0, 1.0, 0.0));
    context.set_parameter(handle, LightParameter::Intensity(2.0));
    let outcome = renderer
        .render_lights(&mut device, &context, &transforms, &frame(0, depth))
        .unwrap();
    assert!(matches!(
        outcome,
        FrameLightingOutcome::Rendered { sync, .. } if !sync.full_rewrite && sync.slots_written == 1
    ));

    let set = context.light_set(SCENE).unwrap();
    let set = set.lock();
    assert_eq!(set.cullable_lights()[0].position, [3.0, 1.0, 0.0]);
    assert!(set.is_dirty_for_frame(1));
    assert!(!set.is_dirty_for_frame(0));
}

#[test]
fn allocation_failure_skips_the_frame_and_recovers() {
    let mut device = HeadlessDevice::new();
    let depth = depth(&mut device);
    let mut renderer = LightingRenderer::new(&mut device, config()).unwrap();
    renderer.create_view(&mut device, MAIN).unwrap();

    let mut transforms = TransformStore::new();
    let mut context = LightingContext::from_config(renderer.config());
    let e = transforms.spawn(Transform::default());
    context.add_light(SCENE, &LightInitInfo::point(e, 1.0), &transforms);
    renderer
        .render_lights(&mut device, &context, &transforms, &frame(0, depth))
        .unwrap();

    // No room to grow the light buffers.
    device.set_memory_budget(Some(device.allocated_bytes()));
    for i in 0..10 {
        let e = transforms.spawn(Transform::from_xyz(i as f32, 0.0, 0.0));
        context.add_light(SCENE, &LightInitInfo::point(e, 1.0), &transforms);
    }
    let outcome = renderer
        .render_lights(&mut device, &context, &transforms, &frame(0, depth))
        .unwrap();
    assert_eq!(outcome, FrameLightingOutcome::Skipped);
    assert_eq!(renderer.light_buffers().bound_set(0), None);

    device.set_memory_budget(None);
    let outcome = renderer
        .render_lights(&mut device, &context, &transforms, &frame(0, depth))
        .unwrap();
    let FrameLightingOutcome::Rendered { sync, cull } = outcome else {
        panic!("expected the retry to render, got {outcome:?}");
    };
    assert!(sync.resized);
    assert!(sync.full_rewrite);
    assert_eq!(sync.slots_written, 11);
    assert_eq!(cull, CullOutcome::Culled);
}

#[test]
fn grid_growth_failure_is_also_skipped() {
    let mut device = HeadlessDevice::new();
    let depth = depth(&mut device);
    let mut renderer = LightingRenderer::new(&mut device, config()).unwrap();
    renderer.create_view(&mut device, MAIN).unwrap();
    let transforms = TransformStore::new();
    let mut context = LightingContext::from_config(renderer.config());
    context.create_light_set(SCENE);

    device.set_memory_budget(Some(device.allocated_bytes()));
    let outcome = renderer
        .render_lights(&mut device, &context, &transforms, &frame(1, depth))
        .unwrap();
    assert_eq!(outcome, FrameLightingOutcome::Skipped);
    assert_eq!(renderer.culling(MAIN).unwrap().grid_recomputes(1), 0);

    device.set_memory_budget(None);
    let outcome = renderer
        .render_lights(&mut device, &context, &transforms, &frame(1, depth))
        .unwrap();
    assert!(matches!(
        outcome,
        FrameLightingOutcome::Rendered {
            cull: CullOutcome::Cleared,
            ..
        }
    ));
}

#[test]
fn missing_light_set_is_an_error() {
    let mut device = HeadlessDevice::new();
    let depth = depth(&mut device);
    let mut renderer = LightingRenderer::new(&mut device, config()).unwrap();
    renderer.create_view(&mut device, MAIN).unwrap();
    let context = LightingContext::new(2);

    let err = renderer
        .render_lights(&mut device, &context, &TransformStore::new(), &frame(0, depth))
        .unwrap_err();
    assert!(matches!(err, RenderError::MissingLightSet(SCENE)));
}

#[test]
#[should_panic(expected = "unknown view")]
fn rendering_an_unknown_view_panics() {
    let mut device = HeadlessDevice::new();
    let depth = depth(&mut device);
    let mut renderer = LightingRenderer::new(&mut device, config()).unwrap();
    let mut context = LightingContext::new(2);
    context.create_light_set(SCENE);

    let _ = renderer.render_lights(&mut device, &context, &TransformStore::new(), &frame(0, depth));
}

#[test]
fn releasing_frees_every_buffer() {
    let mut device = HeadlessDevice::new();
    let mut renderer = LightingRenderer::new(&mut device, config()).unwrap();
    renderer.create_view(&mut device, MAIN).unwrap();
    renderer.create_view(&mut device, ViewId(1)).unwrap();
    renderer.remove_view(&mut device, ViewId(1));
    assert!(renderer.shading_bindings(ViewId(1), 0).is_none());

    renderer.release(&mut device);
    assert_eq!(device.live_buffer_count(), 0);
    assert_eq!(device.allocated_bytes(), 0);
}

#[test]
#[should_panic(expected = "invalid config value for `tile_size`")]
fn zero_tile_size_is_rejected_up_front() {
    let mut device = HeadlessDevice::new();
    let _ = LightingRenderer::new(
        &mut device,
        LightingConfig {
            tile_size: 0,
            ..config()
        },
    );
}
