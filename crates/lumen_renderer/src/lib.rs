//! GPU side of the light system: per-frame light buffers, tile frustum
//! grids and the light culling dispatch, recorded against a [`RenderDevice`].

pub mod culling;
pub mod device;
pub mod frame_constants;
pub mod frustum;
pub mod gpu_buffer;
pub mod headless;
pub mod light_buffers;
pub mod lighting;
pub mod wgpu_device;

pub use culling::{CullFrame, CullOutcome, LightCulling, LightGridBindings, tile_counts};
pub use device::{
    Barrier, Binding, BindingResource, BufferDesc, BufferId, BufferUsage, ComputeKernel, Dispatch,
    GpuError, RenderDevice, ResourceState, TextureDesc, TextureId,
};
pub use frame_constants::FrameConstants;
pub use headless::{DeviceCommand, HeadlessDevice};
pub use light_buffers::{GpuLightBuffers, LightBufferBindings, SyncReport};
pub use lighting::{
    FrameInfo, FrameLightingOutcome, LightingRenderer, RenderError, ShadingBindings, ViewId,
};
pub use wgpu_device::WgpuDevice;
