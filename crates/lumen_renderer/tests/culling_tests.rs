use lumen_core::{LightingConfig, Transform, TransformStore, Viewport};
use lumen_lights::{LightId, LightInitInfo, LightSet};
use lumen_renderer::{
    BindingResource, BufferDesc, BufferId, BufferUsage, ComputeKernel, CullFrame, CullOutcome,
    DeviceCommand, GpuLightBuffers, HeadlessDevice, LightCulling, RenderDevice, ResourceState,
    TextureDesc, TextureId,
};

struct Fixture {
    device: HeadlessDevice,
    buffers: GpuLightBuffers,
    culling: LightCulling,
    constants: BufferId,
    depth: TextureId,
    store: TransformStore,
    set: LightSet,
}

impl Fixture {
    fn new(frames: usize) -> Self {
        let config = LightingConfig {
            frames_in_flight: frames,
            ..LightingConfig::default()
        };
        let mut device = HeadlessDevice::new();
        let buffers = GpuLightBuffers::new(&mut device, &config).unwrap();
        let culling = LightCulling::new(&mut device, &config).unwrap();
        let constants = device
            .create_buffer(&BufferDesc {
                label: "frame constants".into(),
                size: 304,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            })
            .unwrap();
        let depth = device
            .create_texture(&TextureDesc {
                label: "depth".into(),
                width: 1920,
                height: 1080,
            })
            .unwrap();
        device.take_commands();

        Self {
            device,
            buffers,
            culling,
            constants,
            depth,
            store: TransformStore::new(),
            set: LightSet::new(frames),
        }
    }

    fn add_light(&mut self) -> LightId {
        let e = self.store.spawn(Transform::from_xyz(0.0, 0.0, -5.0));
        self.set.add(&LightInitInfo::point(e, 2.0), &self.store)
    }

    fn cull(&mut self, frame_index: usize, viewport: Viewport, fov: f32) -> CullOutcome {
        self.buffers
            .update(&mut self.device, &mut self.set, 1, frame_index)
            .unwrap();
        let lights = self.buffers.bindings(frame_index);
        self.culling
            .cull(
                &mut self.device,
                &CullFrame {
                    frame_index,
                    viewport,
                    fov,
                    frame_constants: self.constants,
                    lights: &lights,
                    depth: self.depth,
                },
            )
            .unwrap()
    }
}

fn dispatches(commands: &[DeviceCommand], kernel: ComputeKernel) -> Vec<[u32; 3]> {
    commands
        .iter()
        .filter_map(|command| match command {
            DeviceCommand::Dispatch(dispatch) if dispatch.kernel == kernel => Some(dispatch.groups),
            _ => None,
        })
        .collect()
}

const FOV: f32 = 0.8;

#[test]
fn viewport_resize_rebuilds_grid_exactly_once() {
    let mut fx = Fixture::new(1);
    fx.add_light();

    fx.cull(0, Viewport::new(800, 600), FOV);
    assert_eq!(fx.culling.grid_recomputes(0), 1);
    assert_eq!(fx.culling.tile_counts(0), [50, 38]);
    let small = fx.culling.frustum_buffer_size(0);
    assert!(small >= 50 * 38 * 64);

    fx.cull(0, Viewport::new(800, 600), FOV);
    assert_eq!(fx.culling.grid_recomputes(0), 1);

    fx.device.take_commands();
    fx.cull(0, Viewport::new(1920, 1080), FOV);
    fx.cull(0, Viewport::new(1920, 1080), FOV);
    assert_eq!(fx.culling.grid_recomputes(0), 2);
    assert_eq!(fx.culling.tile_counts(0), [120, 68]);
    assert!(fx.culling.frustum_buffer_size(0) >= 120 * 68 * 64);
    assert!(fx.culling.frustum_buffer_size(0) > small);

    let commands = fx.device.take_commands();
    assert_eq!(dispatches(&commands, ComputeKernel::GridFrustums), vec![[8, 5, 1]]);
    assert_eq!(
        dispatches(&commands, ComputeKernel::CullLights),
        vec![[120, 68, 1], [120, 68, 1]]
    );
}

#[test]
fn shrinking_the_viewport_keeps_the_bigger_buffers() {
    let mut fx = Fixture::new(1);
    fx.add_light();
    fx.cull(0, Viewport::new(1920, 1080), FOV);
    let frustums = fx.culling.frustum_buffer_size(0);
    let grid = fx.culling.light_grid(0).buffer;

    fx.cull(0, Viewport::new(640, 480), FOV);
    assert_eq!(fx.culling.grid_recomputes(0), 2);
    assert_eq!(fx.culling.tile_counts(0), [40, 30]);
    assert_eq!(fx.culling.frustum_buffer_size(0), frustums);
    assert_eq!(fx.culling.light_grid(0).buffer, grid);
}

#[test]
fn fov_changes_beyond_epsilon_rebuild_the_grid() {
    let mut fx = Fixture::new(1);
    fx.add_light();
    let viewport = Viewport::new(800, 600);

    fx.cull(0, viewport, FOV);
    fx.cull(0, viewport, FOV + 1e-6);
    assert_eq!(fx.culling.grid_recomputes(0), 1);
    fx.cull(0, viewport, FOV + 0.1);
    assert_eq!(fx.culling.grid_recomputes(0), 2);
}

#[test]
fn every_frame_slot_keeps_its_own_grid() {
    let mut fx = Fixture::new(2);
    fx.add_light();

    fx.cull(0, Viewport::new(800, 600), FOV);
    fx.cull(1, Viewport::new(800, 600), FOV);
    fx.cull(0, Viewport::new(800, 600), FOV);
    assert_eq!(fx.culling.grid_recomputes(0), 1);
    assert_eq!(fx.culling.grid_recomputes(1), 1);
    assert_ne!(fx.culling.frustum_buffer(0), fx.culling.frustum_buffer(1));
}

#[test]
fn zero_lights_clear_once_then_skip() {
    let mut fx = Fixture::new(1);
    let viewport = Viewport::new(800, 600);

    assert_eq!(fx.cull(0, viewport, FOV), CullOutcome::Cleared);
    let commands = fx.device.take_commands();
    let grid = fx.culling.light_grid(0).buffer;
    assert!(commands.iter().any(
        |command| matches!(command, DeviceCommand::ClearBuffer { id, .. } if *id == grid)
    ));
    assert!(dispatches(&commands, ComputeKernel::CullLights).is_empty());

    assert_eq!(fx.cull(0, viewport, FOV), CullOutcome::Skipped);
    assert_eq!(fx.cull(0, viewport, FOV), CullOutcome::Skipped);

    let light = fx.add_light();
    assert_eq!(fx.cull(0, viewport, FOV), CullOutcome::Culled);

    // The grid still lists the removed light until one more clear.
    fx.set.remove(light);
    assert_eq!(fx.cull(0, viewport, FOV), CullOutcome::Cleared);
    assert_eq!(fx.cull(0, viewport, FOV), CullOutcome::Skipped);
}

#[test]
fn regrown_grid_is_cleared_even_without_lights() {
    let mut fx = Fixture::new(1);
    assert_eq!(fx.cull(0, Viewport::new(800, 600), FOV), CullOutcome::Cleared);
    let small = fx.culling.light_grid(0).buffer;
    assert_eq!(fx.cull(0, Viewport::new(800, 600), FOV), CullOutcome::Skipped);
    fx.device.take_commands();

    // The larger viewport reallocates the grid, and the new buffer starts uncleared.
    assert_eq!(fx.cull(0, Viewport::new(1920, 1080), FOV), CullOutcome::Cleared);
    let grid = fx.culling.light_grid(0).buffer;
    assert_ne!(grid, small);

    let commands = fx.device.take_commands();
    assert!(commands.iter().any(
        |command| matches!(command, DeviceCommand::ClearBuffer { id, .. } if *id == grid)
    ));
    let last = commands
        .iter()
        .rev()
        .find_map(|command| match command {
            DeviceCommand::Transition(barrier) if barrier.buffer == grid => Some(*barrier),
            _ => None,
        })
        .unwrap();
    assert_eq!(last.after, ResourceState::PixelShaderResource);

    assert_eq!(fx.cull(0, Viewport::new(1920, 1080), FOV), CullOutcome::Skipped);
}

#[test]
fn empty_viewport_is_skipped() {
    let mut fx = Fixture::new(1);
    fx.add_light();
    assert_eq!(fx.cull(0, Viewport::new(0, 600), FOV), CullOutcome::Skipped);
    assert_eq!(fx.culling.grid_recomputes(0), 0);
}

#[test]
fn barriers_bracket_every_write() {
    let mut fx = Fixture::new(1);
    fx.add_light();
    fx.cull(0, Viewport::new(800, 600), FOV);

    let frustums = fx.culling.frustum_buffer(0);
    let grid = fx.culling.light_grid(0).buffer;
    let commands = fx.device.take_commands();

    // Only the culling work, in recording order.
    let relevant: Vec<&DeviceCommand> = commands
        .iter()
        .filter(|command| match command {
            DeviceCommand::Transition(_) | DeviceCommand::Dispatch(_) => true,
            DeviceCommand::ClearBuffer { id, .. } => *id == grid,
            _ => false,
        })
        .collect();

    let transition = |buffer, before, after| {
        DeviceCommand::Transition(lumen_renderer::Barrier {
            buffer,
            before,
            after,
        })
    };
    use ResourceState::*;
    assert_eq!(relevant.len(), 7);
    assert_eq!(*relevant[0], transition(frustums, Common, UnorderedAccess));
    assert!(matches!(relevant[1], DeviceCommand::Dispatch(d) if d.kernel == ComputeKernel::GridFrustums));
    assert_eq!(*relevant[2], transition(frustums, UnorderedAccess, NonPixelShaderResource));
    assert_eq!(*relevant[3], transition(grid, Common, UnorderedAccess));
    assert!(matches!(relevant[4], DeviceCommand::ClearBuffer { .. }));
    assert!(matches!(relevant[5], DeviceCommand::Dispatch(d) if d.kernel == ComputeKernel::CullLights));
    assert_eq!(*relevant[6], transition(grid, UnorderedAccess, PixelShaderResource));

    // Next frame: the frustums are already readable, only the grid cycles.
    fx.cull(0, Viewport::new(800, 600), FOV);
    let commands = fx.device.take_commands();
    let barriers: Vec<_> = commands
        .iter()
        .filter_map(|command| match command {
            DeviceCommand::Transition(barrier) => Some(*barrier),
            _ => None,
        })
        .collect();
    assert_eq!(barriers.len(), 2);
    assert_eq!(barriers[0].before, PixelShaderResource);
    assert_eq!(barriers[0].after, UnorderedAccess);
    assert_eq!(barriers[1].after, PixelShaderResource);
}

#[test]
fn index_list_is_bound_at_an_aligned_offset() {
    let mut fx = Fixture::new(1);
    fx.add_light();
    fx.cull(0, Viewport::new(1920, 1080), FOV);

    let grid = fx.culling.light_grid(0);
    assert_eq!(grid.grid_size, 120 * 68 * 8);
    assert_eq!(grid.index_list_offset % 256, 0);
    assert!(grid.index_list_offset >= grid.grid_size);
    assert_eq!(grid.index_list_size, 4 + 120 * 68 * 256 * 4);
    assert!(
        fx.device.buffer_size(grid.buffer).unwrap()
            >= grid.index_list_offset + grid.index_list_size
    );

    let commands = fx.device.take_commands();
    let cull = commands
        .iter()
        .find_map(|command| match command {
            DeviceCommand::Dispatch(d) if d.kernel == ComputeKernel::CullLights => Some(d),
            _ => None,
        })
        .unwrap();
    let index_binding = cull.bindings.iter().find(|b| b.slot == 6).unwrap();
    assert_eq!(
        index_binding.resource,
        BindingResource::Buffer {
            id: grid.buffer,
            offset: grid.index_list_offset,
            size: Some(grid.index_list_size),
        }
    );
}
