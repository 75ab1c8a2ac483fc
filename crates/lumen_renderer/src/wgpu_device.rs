use std::collections::HashMap;

use crate::device::{
    Barrier, BindingResource, BufferDesc, BufferId, BufferUsage, ComputeKernel, Dispatch,
    GpuError, RenderDevice, TextureDesc, TextureId,
};

const GRID_FRUSTUMS_WGSL: &str = include_str!("shaders/grid_frustums.wgsl");
const CULL_LIGHTS_WGSL: &str = include_str!("shaders/cull_lights.wgsl");

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

struct Kernel {
    label: &'static str,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

struct DepthTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// [`RenderDevice`] backed by wgpu.
///
/// Buffer writes go through the queue, clears and dispatches are recorded
/// into one command encoder that [`RenderDevice::submit`] hands to the queue.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    textures: HashMap<TextureId, DepthTexture>,
    next_id: u32,
    encoder: Option<wgpu::CommandEncoder>,
    grid_frustums: Kernel,
    cull_lights: Kernel,
}

impl WgpuDevice {
    /// Creates an instance, picks an adapter and opens a device on it.
    pub fn request() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        // Adapter and device requests are async; block on them with pollster.
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|err| GpuError::Unavailable(err.to_string()))?;

        let info = adapter.get_info();
        log::info!("using adapter {} ({:?})", info.name, info.backend);

        let (device, queue) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default()))
                .map_err(|err| GpuError::Unavailable(err.to_string()))?;

        Ok(Self::new(device, queue))
    }

    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let grid_frustums = create_kernel(
            &device,
            "grid frustums",
            GRID_FRUSTUMS_WGSL,
            &[
                uniform_entry(0),
                uniform_entry(1),
                storage_entry(2, false),
            ],
        );
        let cull_lights = create_kernel(
            &device,
            "cull lights",
            CULL_LIGHTS_WGSL,
            &[
                uniform_entry(0),
                uniform_entry(1),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, true),
                storage_entry(5, false),
                storage_entry(6, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 7,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        );
        log::info!("light culling kernels compiled");

        Self {
            device,
            queue,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            next_id: 0,
            encoder: None,
            grid_frustums,
            cull_lights,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Raw buffer, for passes outside this crate that bind the light data.
    pub fn buffer(&self, id: BufferId) -> Option<&wgpu::Buffer> {
        self.buffers.get(&id)
    }

    pub fn texture_view(&self, id: TextureId) -> Option<&wgpu::TextureView> {
        self.textures.get(&id).map(|texture| &texture.view)
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// The encoder of the current submission, opened on first use.
fn encoder<'a>(
    encoder: &'a mut Option<wgpu::CommandEncoder>,
    device: &wgpu::Device,
) -> &'a mut wgpu::CommandEncoder {
    encoder.get_or_insert_with(|| {
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Light Culling Encoder"),
        })
    })
}

impl RenderDevice for WgpuDevice {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, GpuError> {
        let limits = self.device.limits();
        let too_big = desc.size > limits.max_buffer_size
            || (desc.usage.contains(BufferUsage::STORAGE)
                && desc.size > u64::from(limits.max_storage_buffer_binding_size));
        if too_big {
            return Err(GpuError::OutOfMemory {
                label: desc.label.clone(),
                size: desc.size,
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&desc.label),
            size: desc.size,
            usage: to_wgpu_usage(desc.usage),
            mapped_at_creation: false,
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            log::warn!("allocating `{}` failed: {error}", desc.label);
            return Err(GpuError::OutOfMemory {
                label: desc.label.clone(),
                size: desc.size,
            });
        }

        let id = BufferId(self.next_id());
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        // Dropping is enough; wgpu keeps the buffer alive for recorded commands.
        self.buffers.remove(&id);
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        if pollster::block_on(self.device.pop_error_scope()).is_some() {
            return Err(GpuError::OutOfMemory {
                label: desc.label.clone(),
                size: u64::from(desc.width) * u64::from(desc.height) * 4,
            });
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TextureId(self.next_id());
        self.textures.insert(
            id,
            DepthTexture {
                _texture: texture,
                view,
            },
        );
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
    }

    fn clear_depth(&mut self, id: TextureId, depth: f32) -> Result<(), GpuError> {
        let view = self
            .textures
            .get(&id)
            .map(|texture| &texture.view)
            .ok_or(GpuError::UnknownTexture(id))?;
        let encoder = encoder(&mut self.encoder, &self.device);
        // An empty pass whose only effect is the depth load op.
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Depth Clear Pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(depth),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        Ok(())
    }

    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        let buffer = self.buffers.get(&id).ok_or(GpuError::UnknownBuffer(id))?;
        self.queue.write_buffer(buffer, offset, data);
        Ok(())
    }

    fn clear_buffer(
        &mut self,
        id: BufferId,
        offset: u64,
        size: Option<u64>,
    ) -> Result<(), GpuError> {
        let buffer = self.buffers.get(&id).ok_or(GpuError::UnknownBuffer(id))?;
        encoder(&mut self.encoder, &self.device).clear_buffer(buffer, offset, size);
        Ok(())
    }

    fn transition(&mut self, barriers: &[Barrier]) {
        // wgpu tracks usage itself; the states only matter for bookkeeping.
        for barrier in barriers {
            log::trace!(
                "{:?}: {:?} -> {:?}",
                barrier.buffer,
                barrier.before,
                barrier.after
            );
        }
    }

    fn dispatch(&mut self, dispatch: &Dispatch) -> Result<(), GpuError> {
        let kernel = match dispatch.kernel {
            ComputeKernel::GridFrustums => &self.grid_frustums,
            ComputeKernel::CullLights => &self.cull_lights,
        };

        let mut entries = Vec::with_capacity(dispatch.bindings.len());
        for binding in &dispatch.bindings {
            let resource = match binding.resource {
                BindingResource::Buffer { id, offset, size } => {
                    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: self.buffers.get(&id).ok_or(GpuError::UnknownBuffer(id))?,
                        offset,
                        size: size.and_then(wgpu::BufferSize::new),
                    })
                }
                BindingResource::Texture(id) => wgpu::BindingResource::TextureView(
                    self.textures
                        .get(&id)
                        .map(|texture| &texture.view)
                        .ok_or(GpuError::UnknownTexture(id))?,
                ),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding.slot,
                resource,
            });
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.label),
            layout: &kernel.layout,
            entries: &entries,
        });

        let encoder = encoder(&mut self.encoder, &self.device);
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(kernel.label),
            timestamp_writes: None,
        });
        pass.set_pipeline(&kernel.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        let [x, y, z] = dispatch.groups;
        pass.dispatch_workgroups(x, y, z);
        Ok(())
    }

    fn submit(&mut self) -> Result<(), GpuError> {
        match self.encoder.take() {
            Some(encoder) => {
                self.queue.submit(Some(encoder.finish()));
            }
            // Still flushes pending queue writes.
            None => {
                self.queue.submit(std::iter::empty());
            }
        }
        Ok(())
    }
}

fn to_wgpu_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut out = wgpu::BufferUsages::empty();
    if usage.contains(BufferUsage::STORAGE) {
        out |= wgpu::BufferUsages::STORAGE;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        out |= wgpu::BufferUsages::UNIFORM;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        out |= wgpu::BufferUsages::COPY_DST;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        out |= wgpu::BufferUsages::COPY_SRC;
    }
    out
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn create_kernel(
    device: &wgpu::Device,
    label: &'static str,
    source: &str,
    entries: &[wgpu::BindGroupLayoutEntry],
) -> Kernel {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries,
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    });
    Kernel {
        label,
        layout,
        pipeline,
    }
}
