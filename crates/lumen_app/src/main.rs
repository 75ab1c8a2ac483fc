use std::path::PathBuf;

use clap::Parser;
use glam::{Quat, Vec3};
use lumen_core::{Camera, EntityId, FrameClock, LightingConfig, Transform, TransformStore, Viewport};
use lumen_lights::{LightHandle, LightInitInfo, LightParameter, LightSetKey, LightingContext};
use lumen_renderer::{
    FrameInfo, FrameLightingOutcome, GpuError, HeadlessDevice, LightingRenderer, RenderDevice,
    TextureDesc, TextureId, ViewId, WgpuDevice,
};

const SCENE: LightSetKey = 1;
const MAIN_VIEW: ViewId = ViewId(0);

/// Drives the light culling pipeline over a synthetic scene.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON lighting config. Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 120)]
    frames: u64,

    /// Point and spot lights orbiting the camera target.
    #[arg(long, default_value_t = 256)]
    lights: u32,

    /// Record into a CPU-only device instead of requesting a GPU.
    #[arg(long)]
    headless: bool,
}

struct OrbitingLight {
    entity: EntityId,
    handle: LightHandle,
    radius: f32,
    speed: f32,
    height: f32,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(err) = run(&args) {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => LightingConfig::load(path)?,
        None => LightingConfig::default(),
    };

    let mut device: Box<dyn RenderDevice> = if args.headless {
        Box::new(HeadlessDevice::new())
    } else {
        match WgpuDevice::request() {
            Ok(device) => Box::new(device),
            Err(err) => {
                log::warn!("no GPU available ({err}), falling back to the headless device");
                Box::new(HeadlessDevice::new())
            }
        }
    };
    let device = device.as_mut();

    let mut transforms = TransformStore::new();
    let mut context = LightingContext::from_config(&config);
    let mut renderer = LightingRenderer::new(device, config.clone())?;
    renderer.create_view(device, MAIN_VIEW)?;

    let sun = transforms.spawn(Transform::from_xyz(0.0, 10.0, 0.0).looking_at(Vec3::ZERO, Vec3::Z));
    context.add_light(SCENE, &LightInitInfo::directional(sun), &transforms);
    context.add_light(
        SCENE,
        &LightInitInfo::ambient().with_color(Vec3::new(0.2, 0.2, 0.25)),
        &transforms,
    );
    let lights = spawn_lights(&mut context, &mut transforms, args.lights);
    log::info!(
        "scene ready: {} enabled cullable lights, {} directional",
        context.enabled_light_count(SCENE),
        context.non_cullable_light_count(SCENE)
    );

    let camera = Camera::default();
    let camera_transform = Transform::from_xyz(0.0, 4.0, 18.0).looking_at(Vec3::ZERO, Vec3::Y);
    let mut viewport = Viewport::new(1280, 720);
    let mut depth = create_depth(device, viewport)?;
    let mut clock = FrameClock::new(config.frames_in_flight);

    for _ in 0..args.frames {
        let frame_number = clock.frame_number();
        let time = frame_number as f32 / 60.0;

        // Halfway through, the window grows and the grid must be rebuilt.
        if frame_number == args.frames / 2 {
            viewport = Viewport::new(1920, 1080);
            device.destroy_texture(depth);
            depth = create_depth(device, viewport)?;
            log::info!("resized to {}x{}", viewport.width, viewport.height);
        }
        animate(&mut transforms, &context, &lights, frame_number, time);

        device.clear_depth(depth, 1.0)?;
        let outcome = renderer.render_lights(
            device,
            &context,
            &transforms,
            &FrameInfo {
                view: MAIN_VIEW,
                light_set: SCENE,
                frame_index: clock.frame_index(),
                camera: camera.clone(),
                camera_transform,
                viewport,
                depth,
            },
        )?;
        match outcome {
            FrameLightingOutcome::Skipped => log::warn!("frame {frame_number}: lighting skipped"),
            FrameLightingOutcome::Rendered { sync, cull } => log::debug!(
                "frame {frame_number}: {} slots written{}, {cull:?}",
                sync.slots_written,
                if sync.full_rewrite { " (full)" } else { "" }
            ),
        }

        device.submit()?;
        transforms.end_frame();
        clock.advance();
    }

    log::info!("rendered {} frames", clock.frame_number());
    renderer.release(device);
    device.destroy_texture(depth);
    Ok(())
}

fn spawn_lights(
    context: &mut LightingContext,
    transforms: &mut TransformStore,
    count: u32,
) -> Vec<OrbitingLight> {
    (0..count)
        .map(|i| {
            let t = i as f32 / count.max(1) as f32;
            let radius = 2.0 + 10.0 * t;
            let height = 0.5 + (i % 4) as f32;
            let entity = transforms.spawn(Transform::from_xyz(radius, height, 0.0));
            let color = Vec3::new(t, 1.0 - t, 0.5 + 0.5 * (t * 6.0).sin());

            let info = if i % 3 == 0 {
                LightInitInfo::spot(entity, 6.0, 0.4, 0.7)
            } else {
                LightInitInfo::point(entity, 3.0)
            };
            let handle = context.add_light(SCENE, &info.with_color(color), transforms);

            OrbitingLight {
                entity,
                handle,
                radius,
                speed: 0.2 + 0.8 * t,
                height,
            }
        })
        .collect()
}

fn animate(
    transforms: &mut TransformStore,
    context: &LightingContext,
    lights: &[OrbitingLight],
    frame_number: u64,
    time: f32,
) {
    for (i, light) in lights.iter().enumerate() {
        // Only every other light moves, so most frames sync a partial set.
        if i % 2 == 0 {
            let angle = light.speed * time;
            let position = Quat::from_rotation_y(angle) * Vec3::new(light.radius, 0.0, 0.0);
            transforms.set_transform(
                light.entity,
                Transform::from_xyz(position.x, light.height, position.z)
                    .looking_at(Vec3::ZERO, Vec3::Y),
            );
        }
    }

    // Blink a handful of lights to exercise enable and disable.
    if frame_number % 30 == 0 {
        let enabled = (frame_number / 30) % 2 == 0;
        for light in lights.iter().step_by(7) {
            context.set_parameter(light.handle, LightParameter::Enabled(enabled));
        }
    }
}

fn create_depth(device: &mut dyn RenderDevice, viewport: Viewport) -> Result<TextureId, GpuError> {
    device.create_texture(&TextureDesc {
        label: "depth".into(),
        width: viewport.width,
        height: viewport.height,
    })
}
