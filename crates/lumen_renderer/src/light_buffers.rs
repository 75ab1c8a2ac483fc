use std::mem::size_of;

use lumen_core::LightingConfig;
use lumen_lights::{
    AmbientLightParams, CullableLightParams, DirectionalLightParams, LightCullingInfo, LightSet,
    LightSetKey, Sphere,
};

use crate::{
    device::{BufferId, BufferUsage, GpuError, RenderDevice},
    gpu_buffer::GpuBuffer,
};

const INITIAL_DIRECTIONAL_CAPACITY: u64 = 4;

/// What one [`GpuLightBuffers::update`] call did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// At least one buffer was reallocated.
    pub resized: bool,
    /// Every enabled cullable slot was rewritten.
    pub full_rewrite: bool,
    pub slots_written: u32,
    pub non_cullable_written: u32,
}

/// Buffers of one frame slot, lent to culling and shading for that frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightBufferBindings {
    pub non_cullable: BufferId,
    pub cullable: BufferId,
    pub culling_infos: BufferId,
    pub bounding_spheres: BufferId,
    pub non_cullable_count: u32,
    pub cullable_count: u32,
    pub ambient: Option<AmbientLightParams>,
}

#[derive(Debug)]
struct FrameLightBuffers {
    /// Light set whose data these buffers currently mirror.
    bound_set: Option<LightSetKey>,
    cullable_capacity: u64,
    non_cullable: GpuBuffer,
    cullable: GpuBuffer,
    culling_infos: GpuBuffer,
    bounding_spheres: GpuBuffer,
    non_cullable_count: u32,
    cullable_count: u32,
    ambient: Option<AmbientLightParams>,
}

impl FrameLightBuffers {
    fn new(
        device: &mut dyn RenderDevice,
        frame_index: usize,
        cullable_capacity: u64,
    ) -> Result<Self, GpuError> {
        let usage = BufferUsage::STORAGE | BufferUsage::COPY_DST;
        let label = |name: &str| format!("{name} [frame {frame_index}]");
        Ok(Self {
            bound_set: None,
            cullable_capacity,
            non_cullable: GpuBuffer::new(
                device,
                label("directional lights"),
                usage,
                INITIAL_DIRECTIONAL_CAPACITY * size_of::<DirectionalLightParams>() as u64,
            )?,
            cullable: GpuBuffer::new(
                device,
                label("cullable lights"),
                usage,
                cullable_capacity * size_of::<CullableLightParams>() as u64,
            )?,
            culling_infos: GpuBuffer::new(
                device,
                label("light culling infos"),
                usage,
                cullable_capacity * size_of::<LightCullingInfo>() as u64,
            )?,
            bounding_spheres: GpuBuffer::new(
                device,
                label("light bounding spheres"),
                usage,
                cullable_capacity * size_of::<Sphere>() as u64,
            )?,
            non_cullable_count: 0,
            cullable_count: 0,
            ambient: None,
        })
    }

    fn bindings(&self) -> LightBufferBindings {
        LightBufferBindings {
            non_cullable: self.non_cullable.id(),
            cullable: self.cullable.id(),
            culling_infos: self.culling_infos.id(),
            bounding_spheres: self.bounding_spheres.id(),
            non_cullable_count: self.non_cullable_count,
            cullable_count: self.cullable_count,
            ambient: self.ambient,
        }
    }

    /// Grows the three cullable buffers together so they share one capacity.
    fn ensure_cullable_capacity(
        &mut self,
        device: &mut dyn RenderDevice,
        lights: u64,
        growth_factor: f32,
    ) -> Result<bool, GpuError> {
        if lights <= self.cullable_capacity {
            return Ok(false);
        }
        let capacity = ((lights as f64 * growth_factor as f64).ceil() as u64).max(lights);

        let mut resized = false;
        resized |= grow::<CullableLightParams>(device, &mut self.cullable, lights, capacity)?;
        resized |= grow::<LightCullingInfo>(device, &mut self.culling_infos, lights, capacity)?;
        resized |= grow::<Sphere>(device, &mut self.bounding_spheres, lights, capacity)?;
        self.cullable_capacity = capacity;
        Ok(resized)
    }

    fn release(self, device: &mut dyn RenderDevice) {
        self.non_cullable.release(device);
        self.cullable.release(device);
        self.culling_infos.release(device);
        self.bounding_spheres.release(device);
    }
}

fn grow<T>(
    device: &mut dyn RenderDevice,
    buffer: &mut GpuBuffer,
    lights: u64,
    capacity: u64,
) -> Result<bool, GpuError> {
    let stride = size_of::<T>() as u64;
    buffer.ensure_capacity(device, lights * stride, capacity * stride)
}

/// Per-frame-in-flight GPU mirrors of the packed light arrays.
///
/// Each frame slot is synced independently: a full rewrite when its buffers
/// were reallocated or it last mirrored a different light set, otherwise
/// only the slots whose dirty bit for that frame is set.
#[derive(Debug)]
pub struct GpuLightBuffers {
    frames: Vec<FrameLightBuffers>,
    growth_factor: f32,
    dirty_scratch: Vec<u32>,
    directional_scratch: Vec<DirectionalLightParams>,
}

impl GpuLightBuffers {
    pub fn new(device: &mut dyn RenderDevice, config: &LightingConfig) -> Result<Self, GpuError> {
        let capacity = u64::from(config.initial_cullable_capacity.max(1));
        let frames = (0..config.frames_in_flight)
            .map(|frame_index| FrameLightBuffers::new(device, frame_index, capacity))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            frames,
            growth_factor: config.growth_factor,
            dirty_scratch: Vec::new(),
            directional_scratch: Vec::new(),
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Brings frame slot `frame_index` up to date with `light_set`.
    ///
    /// The caller guarantees the GPU has finished reading this slot. If an
    /// allocation fails the slot forgets which set it mirrors, so the retry
    /// on a later frame rewrites everything.
    pub fn update(
        &mut self,
        device: &mut dyn RenderDevice,
        light_set: &mut LightSet,
        key: LightSetKey,
        frame_index: usize,
    ) -> Result<SyncReport, GpuError> {
        let result = self.sync_frame(device, light_set, key, frame_index);
        if result.is_err() {
            self.frames[frame_index].bound_set = None;
        }
        result
    }

    fn sync_frame(
        &mut self,
        device: &mut dyn RenderDevice,
        light_set: &mut LightSet,
        key: LightSetKey,
        frame_index: usize,
    ) -> Result<SyncReport, GpuError> {
        let frame = &mut self.frames[frame_index];
        let mut report = SyncReport::default();

        let count = light_set.enabled_light_count();
        report.resized =
            frame.ensure_cullable_capacity(device, u64::from(count), self.growth_factor)?;

        if report.resized || frame.bound_set != Some(key) {
            if frame.bound_set != Some(key) {
                log::debug!("frame {frame_index} now mirrors light set {key}");
            }
            if count > 0 {
                device.write_buffer(
                    frame.cullable.id(),
                    0,
                    bytemuck::cast_slice(light_set.cullable_lights()),
                )?;
                device.write_buffer(
                    frame.culling_infos.id(),
                    0,
                    bytemuck::cast_slice(light_set.culling_infos()),
                )?;
                device.write_buffer(
                    frame.bounding_spheres.id(),
                    0,
                    bytemuck::cast_slice(light_set.bounding_spheres()),
                )?;
            }
            // Every slot stays dirty for this frame; the next partial sync of
            // this slot copies them once more.
            light_set.mark_all_dirty_for_frame(frame_index);
            report.full_rewrite = true;
            report.slots_written = count;
        } else if light_set.is_dirty_for_frame(frame_index) {
            light_set.take_dirty_slots(frame_index, &mut self.dirty_scratch);
            for &slot in &self.dirty_scratch {
                let index = slot as usize;
                write_slot(device, &frame.cullable, index, &light_set.cullable_lights()[index])?;
                write_slot(device, &frame.culling_infos, index, &light_set.culling_infos()[index])?;
                write_slot(
                    device,
                    &frame.bounding_spheres,
                    index,
                    &light_set.bounding_spheres()[index],
                )?;
                log::trace!("frame {frame_index}: wrote light slot {index}");
            }
            report.slots_written = self.dirty_scratch.len() as u32;
        }

        // Directional lights are few; they are rewritten whole every frame.
        light_set.non_cullable_lights(&mut self.directional_scratch);
        let directional = self.directional_scratch.len() as u64;
        if directional > 0 {
            let stride = size_of::<DirectionalLightParams>() as u64;
            report.resized |= frame.non_cullable.ensure_capacity(
                device,
                directional * stride,
                directional.next_power_of_two() * stride,
            )?;
            device.write_buffer(
                frame.non_cullable.id(),
                0,
                bytemuck::cast_slice(&self.directional_scratch),
            )?;
        }

        frame.bound_set = Some(key);
        frame.cullable_count = count;
        frame.non_cullable_count = directional as u32;
        frame.ambient = light_set.ambient_light();
        report.non_cullable_written = directional as u32;
        Ok(report)
    }

    /// Buffers of one frame slot. Re-query every frame: a resize replaces them.
    pub fn bindings(&self, frame_index: usize) -> LightBufferBindings {
        self.frames[frame_index].bindings()
    }

    /// Light set frame slot `frame_index` last mirrored.
    pub fn bound_set(&self, frame_index: usize) -> Option<LightSetKey> {
        self.frames[frame_index].bound_set
    }

    /// Cullable capacity of one frame slot, in lights.
    pub fn cullable_capacity(&self, frame_index: usize) -> u64 {
        self.frames[frame_index].cullable_capacity
    }

    pub fn cullable_buffer_size(&self, frame_index: usize) -> u64 {
        self.frames[frame_index].cullable.size()
    }

    pub fn release(self, device: &mut dyn RenderDevice) {
        for frame in self.frames {
            frame.release(device);
        }
    }
}

fn write_slot<T: bytemuck::Pod>(
    device: &mut dyn RenderDevice,
    buffer: &GpuBuffer,
    index: usize,
    value: &T,
) -> Result<(), GpuError> {
    let offset = (index * size_of::<T>()) as u64;
    device.write_buffer(buffer.id(), offset, bytemuck::bytes_of(value))
}
