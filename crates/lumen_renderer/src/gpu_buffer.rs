use crate::device::{
    Barrier, BufferDesc, BufferId, BufferUsage, GpuError, RenderDevice, ResourceState, align_up,
};

/// A device buffer that only ever grows, plus the state it was last
/// transitioned to.
#[derive(Debug)]
pub struct GpuBuffer {
    label: String,
    usage: BufferUsage,
    id: BufferId,
    size: u64,
    state: ResourceState,
}

impl GpuBuffer {
    pub fn new(
        device: &mut dyn RenderDevice,
        label: impl Into<String>,
        usage: BufferUsage,
        size: u64,
    ) -> Result<Self, GpuError> {
        let label = label.into();
        let size = align_up(size.max(4), 4);
        let id = device.create_buffer(&BufferDesc {
            label: label.clone(),
            size,
            usage,
        })?;
        Ok(Self {
            label,
            usage,
            id,
            size,
            state: ResourceState::Common,
        })
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Reallocates to `reserve` bytes when the buffer is smaller than
    /// `required`. Returns `true` when a new buffer replaced the old one, whose
    /// contents are gone.
    ///
    /// On failure the old buffer is kept.
    pub fn ensure_capacity(
        &mut self,
        device: &mut dyn RenderDevice,
        required: u64,
        reserve: u64,
    ) -> Result<bool, GpuError> {
        if required <= self.size {
            return Ok(false);
        }

        let size = align_up(reserve.max(required), 4);
        let id = device.create_buffer(&BufferDesc {
            label: self.label.clone(),
            size,
            usage: self.usage,
        })?;
        log::debug!("grew `{}` from {} to {size} bytes", self.label, self.size);

        device.destroy_buffer(self.id);
        self.id = id;
        self.size = size;
        self.state = ResourceState::Common;
        Ok(true)
    }

    /// Barrier moving the buffer into `state`, or `None` if it is already there.
    pub fn transition_to(&mut self, state: ResourceState) -> Option<Barrier> {
        if self.state == state {
            return None;
        }
        let barrier = Barrier {
            buffer: self.id,
            before: self.state,
            after: state,
        };
        self.state = state;
        Some(barrier)
    }

    pub fn release(self, device: &mut dyn RenderDevice) {
        device.destroy_buffer(self.id);
    }
}
