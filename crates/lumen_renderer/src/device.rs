use bitflags::bitflags;
use thiserror::Error;

/// Handle to a buffer owned by a [`RenderDevice`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) u32);

/// Handle to a texture owned by a [`RenderDevice`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u32);

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const STORAGE = 1 << 0;
        const UNIFORM = 1 << 1;
        const COPY_DST = 1 << 2;
        const COPY_SRC = 1 << 3;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub usage: BufferUsage,
}

/// A depth texture the culling kernel reads tile depth bounds from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
}

/// Coarse resource states used for barrier bookkeeping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResourceState {
    #[default]
    Common,
    UnorderedAccess,
    /// Readable from compute shaders.
    NonPixelShaderResource,
    /// Readable from the shading pass.
    PixelShaderResource,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Barrier {
    pub buffer: BufferId,
    pub before: ResourceState,
    pub after: ResourceState,
}

/// The compute programs the device knows how to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComputeKernel {
    /// Builds one view-space frustum per screen tile.
    GridFrustums,
    /// Tests every light against every tile and fills the light grid.
    CullLights,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingResource {
    Buffer {
        id: BufferId,
        offset: u64,
        /// `None` binds to the end of the buffer.
        size: Option<u64>,
    },
    Texture(TextureId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    pub slot: u32,
    pub resource: BindingResource,
}

impl Binding {
    pub fn buffer(slot: u32, id: BufferId) -> Self {
        Self {
            slot,
            resource: BindingResource::Buffer {
                id,
                offset: 0,
                size: None,
            },
        }
    }

    pub fn buffer_range(slot: u32, id: BufferId, offset: u64, size: u64) -> Self {
        Self {
            slot,
            resource: BindingResource::Buffer {
                id,
                offset,
                size: Some(size),
            },
        }
    }

    pub fn texture(slot: u32, id: TextureId) -> Self {
        Self {
            slot,
            resource: BindingResource::Texture(id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dispatch {
    pub kernel: ComputeKernel,
    pub bindings: Vec<Binding>,
    pub groups: [u32; 3],
}

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("out of GPU memory allocating {size} bytes for `{label}`")]
    OutOfMemory { label: String, size: u64 },
    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferId),
    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),
    #[error("graphics device unavailable: {0}")]
    Unavailable(String),
}

impl GpuError {
    /// Allocation failures are transient and retried on a later frame.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, GpuError::OutOfMemory { .. })
    }
}

/// The rendering-device collaborator the lighting code records its work on.
///
/// Writes and dispatches are recorded in call order and executed when
/// [`RenderDevice::submit`] is called.
pub trait RenderDevice {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, GpuError>;
    fn destroy_buffer(&mut self, id: BufferId);

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, GpuError>;
    fn destroy_texture(&mut self, id: TextureId);
    /// Resets every texel of a depth texture, standing in for a depth pre-pass.
    fn clear_depth(&mut self, id: TextureId, depth: f32) -> Result<(), GpuError>;

    /// `offset` and `data.len()` must be multiples of 4.
    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError>;
    /// Zeroes `size` bytes from `offset`, or up to the end when `size` is `None`.
    fn clear_buffer(&mut self, id: BufferId, offset: u64, size: Option<u64>)
    -> Result<(), GpuError>;

    fn transition(&mut self, barriers: &[Barrier]);
    fn dispatch(&mut self, dispatch: &Dispatch) -> Result<(), GpuError>;
    fn submit(&mut self) -> Result<(), GpuError>;
}

/// Size `size` rounded up to the next multiple of `alignment` (a power of two).
pub fn align_up(size: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (size + alignment - 1) & !(alignment - 1)
}
