use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use lumen_core::{LightingConfig, Viewport};

use crate::{
    device::{
        Binding, BufferId, BufferUsage, ComputeKernel, Dispatch, GpuError, RenderDevice,
        ResourceState, TextureId, align_up,
    },
    frustum::TileFrustum,
    gpu_buffer::GpuBuffer,
    light_buffers::LightBufferBindings,
};

/// Threads per axis of both culling kernels.
pub const WORKGROUP_SIZE: u32 = 16;

/// The light index list starts on this boundary inside the light-grid
/// buffer so it can be bound at its own offset.
const INDEX_LIST_ALIGNMENT: u64 = 256;
/// Bytes per light-grid cell: `(offset, count)`.
const GRID_CELL_SIZE: u64 = 8;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct CullingConstants {
    pub tile_counts: [u32; 2],
    pub tile_size: u32,
    pub light_count: u32,
    pub max_lights_per_tile: u32,
    pub _padding: [u32; 3],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CullOutcome {
    /// No lights now or last frame; nothing was recorded.
    Skipped,
    /// No lights, but the light grid still held last frame's results.
    Cleared,
    Culled,
}

/// Tiles needed to cover `viewport` with `tile_size`-pixel tiles.
pub fn tile_counts(viewport: Viewport, tile_size: u32) -> [u32; 2] {
    [
        viewport.width.div_ceil(tile_size),
        viewport.height.div_ceil(tile_size),
    ]
}

/// Everything [`LightCulling::cull`] reads for one frame.
#[derive(Clone, Copy, Debug)]
pub struct CullFrame<'a> {
    pub frame_index: usize,
    pub viewport: Viewport,
    pub fov: f32,
    pub frame_constants: BufferId,
    pub lights: &'a LightBufferBindings,
    pub depth: TextureId,
}

/// Where the shading pass finds the culling results of one frame slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LightGridBindings {
    pub buffer: BufferId,
    pub tile_counts: [u32; 2],
    pub grid_size: u64,
    pub index_list_offset: u64,
    pub index_list_size: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct GridKey {
    width: u32,
    height: u32,
    fov: f32,
}

#[derive(Clone, Copy, Debug)]
struct CullingSettings {
    tile_size: u32,
    max_lights_per_tile: u32,
    fov_epsilon: f32,
}

#[derive(Debug)]
struct CullingSlot {
    cached: Option<GridKey>,
    tile_counts: [u32; 2],
    frustums: GpuBuffer,
    /// Light grid followed by the index list (append counter, then indices).
    light_grid: GpuBuffer,
    index_list_offset: u64,
    constants: GpuBuffer,
    has_lights: bool,
    grid_recomputes: u32,
}

impl CullingSlot {
    fn new(device: &mut dyn RenderDevice, frame_index: usize) -> Result<Self, GpuError> {
        let storage = BufferUsage::STORAGE | BufferUsage::COPY_DST;
        Ok(Self {
            cached: None,
            tile_counts: [0, 0],
            frustums: GpuBuffer::new(
                device,
                format!("tile frustums [frame {frame_index}]"),
                storage,
                TileFrustum::SIZE,
            )?,
            light_grid: GpuBuffer::new(
                device,
                format!("light grid [frame {frame_index}]"),
                storage,
                INDEX_LIST_ALIGNMENT + 4,
            )?,
            index_list_offset: INDEX_LIST_ALIGNMENT,
            constants: GpuBuffer::new(
                device,
                format!("culling constants [frame {frame_index}]"),
                BufferUsage::UNIFORM | BufferUsage::COPY_DST,
                size_of::<CullingConstants>() as u64,
            )?,
            // Seeded so the very first frame clears the grid even without lights.
            has_lights: true,
            grid_recomputes: 0,
        })
    }

    fn needs_recompute(&self, key: GridKey, fov_epsilon: f32) -> bool {
        match self.cached {
            None => true,
            Some(cached) => {
                cached.width != key.width
                    || cached.height != key.height
                    || (cached.fov - key.fov).abs() > fov_epsilon
            }
        }
    }

    fn tile_total(&self) -> u64 {
        u64::from(self.tile_counts[0]) * u64::from(self.tile_counts[1])
    }

    fn grid_size(&self) -> u64 {
        self.tile_total() * GRID_CELL_SIZE
    }

    fn index_list_size(&self, max_lights_per_tile: u32) -> u64 {
        4 + self.tile_total() * u64::from(max_lights_per_tile) * 4
    }

    /// Resizes the grid buffers for new tile counts and rebuilds the tile
    /// frustums. The cache key is only stored once everything succeeded.
    fn recompute_grid(
        &mut self,
        device: &mut dyn RenderDevice,
        settings: CullingSettings,
        frame: &CullFrame,
        key: GridKey,
    ) -> Result<(), GpuError> {
        let tiles = tile_counts(frame.viewport, settings.tile_size);
        let tile_total = u64::from(tiles[0]) * u64::from(tiles[1]);

        let frustum_bytes = tile_total * TileFrustum::SIZE;
        self.frustums
            .ensure_capacity(device, frustum_bytes, frustum_bytes)?;

        let index_list_offset = align_up(tile_total * GRID_CELL_SIZE, INDEX_LIST_ALIGNMENT);
        let grid_bytes =
            index_list_offset + 4 + tile_total * u64::from(settings.max_lights_per_tile) * 4;
        if self
            .light_grid
            .ensure_capacity(device, grid_bytes, grid_bytes)?
        {
            // A fresh grid is uncleared and not shader-readable yet.
            self.has_lights = true;
        }

        self.tile_counts = tiles;
        self.index_list_offset = index_list_offset;

        if let Some(barrier) = self.frustums.transition_to(ResourceState::UnorderedAccess) {
            device.transition(&[barrier]);
        }
        device.dispatch(&Dispatch {
            kernel: ComputeKernel::GridFrustums,
            bindings: vec![
                Binding::buffer(0, frame.frame_constants),
                Binding::buffer(1, self.constants.id()),
                Binding::buffer(2, self.frustums.id()),
            ],
            groups: [
                tiles[0].div_ceil(WORKGROUP_SIZE),
                tiles[1].div_ceil(WORKGROUP_SIZE),
                1,
            ],
        })?;
        if let Some(barrier) = self
            .frustums
            .transition_to(ResourceState::NonPixelShaderResource)
        {
            device.transition(&[barrier]);
        }

        self.cached = Some(key);
        self.grid_recomputes += 1;
        log::debug!(
            "rebuilt {}x{} tile frustums for {}x{} (fov {:.4})",
            tiles[0],
            tiles[1],
            key.width,
            key.height,
            key.fov
        );
        Ok(())
    }

    fn bindings(&self, max_lights_per_tile: u32) -> LightGridBindings {
        LightGridBindings {
            buffer: self.light_grid.id(),
            tile_counts: self.tile_counts,
            grid_size: self.grid_size(),
            index_list_offset: self.index_list_offset,
            index_list_size: self.index_list_size(max_lights_per_tile),
        }
    }

    fn release(self, device: &mut dyn RenderDevice) {
        self.frustums.release(device);
        self.light_grid.release(device);
        self.constants.release(device);
    }
}

/// Tile-based light culling for one view.
///
/// Each frame slot keeps its own frustum grid, cached on viewport size and
/// field of view, and its own light grid the shading pass reads.
#[derive(Debug)]
pub struct LightCulling {
    settings: CullingSettings,
    slots: Vec<CullingSlot>,
}

impl LightCulling {
    pub fn new(device: &mut dyn RenderDevice, config: &LightingConfig) -> Result<Self, GpuError> {
        let slots = (0..config.frames_in_flight)
            .map(|frame_index| CullingSlot::new(device, frame_index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            settings: CullingSettings {
                tile_size: config.tile_size,
                max_lights_per_tile: config.max_lights_per_tile,
                fov_epsilon: config.fov_epsilon,
            },
            slots,
        })
    }

    /// Records this frame's culling work.
    ///
    /// Rebuilds the frustum grid if the viewport or field of view changed,
    /// then clears the light grid and runs the culling kernel. Frames without
    /// lights clear the grid once and are skipped afterwards.
    pub fn cull(
        &mut self,
        device: &mut dyn RenderDevice,
        frame: &CullFrame,
    ) -> Result<CullOutcome, GpuError> {
        let settings = self.settings;
        let slot = &mut self.slots[frame.frame_index];

        if frame.viewport.is_empty() {
            log::trace!("empty viewport, skipping light culling");
            return Ok(CullOutcome::Skipped);
        }

        let key = GridKey {
            width: frame.viewport.width,
            height: frame.viewport.height,
            fov: frame.fov,
        };
        let tiles = tile_counts(frame.viewport, settings.tile_size);
        let light_count = frame.lights.cullable_count;

        let constants = CullingConstants {
            tile_counts: tiles,
            tile_size: settings.tile_size,
            light_count,
            max_lights_per_tile: settings.max_lights_per_tile,
            _padding: [0; 3],
        };
        device.write_buffer(slot.constants.id(), 0, bytemuck::bytes_of(&constants))?;

        if slot.needs_recompute(key, settings.fov_epsilon) {
            slot.recompute_grid(device, settings, frame, key)?;
        }

        if light_count == 0 && !slot.has_lights {
            return Ok(CullOutcome::Skipped);
        }

        if let Some(barrier) = slot.light_grid.transition_to(ResourceState::UnorderedAccess) {
            device.transition(&[barrier]);
        }
        device.clear_buffer(slot.light_grid.id(), 0, None)?;

        let outcome = if light_count == 0 {
            slot.has_lights = false;
            CullOutcome::Cleared
        } else {
            slot.has_lights = true;
            let index_list_size = slot.index_list_size(settings.max_lights_per_tile);
            device.dispatch(&Dispatch {
                kernel: ComputeKernel::CullLights,
                bindings: vec![
                    Binding::buffer(0, frame.frame_constants),
                    Binding::buffer(1, slot.constants.id()),
                    Binding::buffer(2, slot.frustums.id()),
                    Binding::buffer(3, frame.lights.culling_infos),
                    Binding::buffer(4, frame.lights.bounding_spheres),
                    Binding::buffer_range(5, slot.light_grid.id(), 0, slot.grid_size()),
                    Binding::buffer_range(
                        6,
                        slot.light_grid.id(),
                        slot.index_list_offset,
                        index_list_size,
                    ),
                    Binding::texture(7, frame.depth),
                ],
                groups: [tiles[0], tiles[1], 1],
            })?;
            CullOutcome::Culled
        };

        if let Some(barrier) = slot
            .light_grid
            .transition_to(ResourceState::PixelShaderResource)
        {
            device.transition(&[barrier]);
        }
        Ok(outcome)
    }

    pub fn tile_size(&self) -> u32 {
        self.settings.tile_size
    }

    /// Tile counts of the grid last built for `frame_index`.
    pub fn tile_counts(&self, frame_index: usize) -> [u32; 2] {
        self.slots[frame_index].tile_counts
    }

    /// How many times the frustum grid of `frame_index` has been rebuilt.
    pub fn grid_recomputes(&self, frame_index: usize) -> u32 {
        self.slots[frame_index].grid_recomputes
    }

    pub fn frustum_buffer_size(&self, frame_index: usize) -> u64 {
        self.slots[frame_index].frustums.size()
    }

    pub fn frustum_buffer(&self, frame_index: usize) -> BufferId {
        self.slots[frame_index].frustums.id()
    }

    pub fn light_grid(&self, frame_index: usize) -> LightGridBindings {
        self.slots[frame_index].bindings(self.settings.max_lights_per_tile)
    }

    pub fn release(self, device: &mut dyn RenderDevice) {
        for slot in self.slots {
            slot.release(device);
        }
    }
}
