use std::collections::HashMap;

use crate::device::{
    Barrier, BindingResource, BufferDesc, BufferId, BufferUsage, Dispatch, GpuError,
    RenderDevice, TextureDesc, TextureId,
};

/// Everything a [`HeadlessDevice`] was asked to do, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceCommand {
    CreateBuffer {
        id: BufferId,
        label: String,
        size: u64,
    },
    DestroyBuffer(BufferId),
    CreateTexture(TextureId),
    DestroyTexture(TextureId),
    ClearDepth(TextureId),
    WriteBuffer {
        id: BufferId,
        offset: u64,
        len: u64,
    },
    ClearBuffer {
        id: BufferId,
        offset: u64,
        size: u64,
    },
    Transition(Barrier),
    Dispatch(Dispatch),
    Submit,
}

#[derive(Debug)]
struct HeadlessBuffer {
    label: String,
    usage: BufferUsage,
    data: Vec<u8>,
}

/// CPU-memory device. Buffers are plain byte vectors, kernels are recorded
/// but not executed.
///
/// An optional memory budget makes allocations fail the way a device under
/// memory pressure would.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    buffers: HashMap<BufferId, HeadlessBuffer>,
    textures: HashMap<TextureId, TextureDesc>,
    next_id: u32,
    allocated: u64,
    memory_budget: Option<u64>,
    commands: Vec<DeviceCommand>,
    submissions: u64,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory_budget(bytes: u64) -> Self {
        Self {
            memory_budget: Some(bytes),
            ..Self::default()
        }
    }

    pub fn set_memory_budget(&mut self, bytes: Option<u64>) {
        self.memory_budget = bytes;
    }

    /// Bytes held by live buffers.
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn read_buffer(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(&id).map(|buffer| buffer.data.as_slice())
    }

    pub fn buffer_size(&self, id: BufferId) -> Option<u64> {
        self.buffers.get(&id).map(|buffer| buffer.data.len() as u64)
    }

    pub fn buffer_label(&self, id: BufferId) -> Option<&str> {
        self.buffers.get(&id).map(|buffer| buffer.label.as_str())
    }

    pub fn take_commands(&mut self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn buffer_mut(&mut self, id: BufferId) -> Result<&mut HeadlessBuffer, GpuError> {
        self.buffers.get_mut(&id).ok_or(GpuError::UnknownBuffer(id))
    }
}

impl RenderDevice for HeadlessDevice {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, GpuError> {
        let over_budget = self
            .memory_budget
            .is_some_and(|budget| self.allocated + desc.size > budget);
        if over_budget {
            log::debug!(
                "headless allocation of {} bytes for `{}` exceeds the budget",
                desc.size,
                desc.label
            );
            return Err(GpuError::OutOfMemory {
                label: desc.label.clone(),
                size: desc.size,
            });
        }

        let id = BufferId(self.next_id());
        self.buffers.insert(
            id,
            HeadlessBuffer {
                label: desc.label.clone(),
                usage: desc.usage,
                data: vec![0; desc.size as usize],
            },
        );
        self.allocated += desc.size;
        self.commands.push(DeviceCommand::CreateBuffer {
            id,
            label: desc.label.clone(),
            size: desc.size,
        });
        Ok(id)
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if let Some(buffer) = self.buffers.remove(&id) {
            self.allocated -= buffer.data.len() as u64;
            self.commands.push(DeviceCommand::DestroyBuffer(id));
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, GpuError> {
        let id = TextureId(self.next_id());
        self.textures.insert(id, desc.clone());
        self.commands.push(DeviceCommand::CreateTexture(id));
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if self.textures.remove(&id).is_some() {
            self.commands.push(DeviceCommand::DestroyTexture(id));
        }
    }

    fn clear_depth(&mut self, id: TextureId, _depth: f32) -> Result<(), GpuError> {
        if !self.textures.contains_key(&id) {
            return Err(GpuError::UnknownTexture(id));
        }
        self.commands.push(DeviceCommand::ClearDepth(id));
        Ok(())
    }

    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), GpuError> {
        assert!(
            offset % 4 == 0 && data.len() % 4 == 0,
            "buffer writes must be 4-byte aligned"
        );
        let buffer = self.buffer_mut(id)?;
        assert!(
            buffer.usage.contains(BufferUsage::COPY_DST),
            "`{}` is not a copy destination",
            buffer.label
        );
        let start = offset as usize;
        let end = start + data.len();
        assert!(
            end <= buffer.data.len(),
            "write of {} bytes at {offset} overflows `{}` ({} bytes)",
            data.len(),
            buffer.label,
            buffer.data.len()
        );
        buffer.data[start..end].copy_from_slice(data);
        self.commands.push(DeviceCommand::WriteBuffer {
            id,
            offset,
            len: data.len() as u64,
        });
        Ok(())
    }

    fn clear_buffer(
        &mut self,
        id: BufferId,
        offset: u64,
        size: Option<u64>,
    ) -> Result<(), GpuError> {
        let buffer = self.buffer_mut(id)?;
        assert!(
            buffer.usage.contains(BufferUsage::COPY_DST),
            "`{}` is not a copy destination",
            buffer.label
        );
        let len = buffer.data.len() as u64;
        let size = size.unwrap_or(len.saturating_sub(offset));
        assert!(offset + size <= len, "clear overflows `{}`", buffer.label);
        buffer.data[offset as usize..(offset + size) as usize].fill(0);
        self.commands
            .push(DeviceCommand::ClearBuffer { id, offset, size });
        Ok(())
    }

    fn transition(&mut self, barriers: &[Barrier]) {
        self.commands
            .extend(barriers.iter().copied().map(DeviceCommand::Transition));
    }

    fn dispatch(&mut self, dispatch: &Dispatch) -> Result<(), GpuError> {
        for binding in &dispatch.bindings {
            match binding.resource {
                BindingResource::Buffer { id, .. } if !self.buffers.contains_key(&id) => {
                    return Err(GpuError::UnknownBuffer(id));
                }
                BindingResource::Texture(id) if !self.textures.contains_key(&id) => {
                    return Err(GpuError::UnknownTexture(id));
                }
                _ => {}
            }
        }
        self.commands.push(DeviceCommand::Dispatch(dispatch.clone()));
        Ok(())
    }

    fn submit(&mut self) -> Result<(), GpuError> {
        self.submissions += 1;
        self.commands.push(DeviceCommand::Submit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(label: &str, size: u64) -> BufferDesc {
        BufferDesc {
            label: label.into(),
            size,
            usage: BufferUsage::STORAGE | BufferUsage::COPY_DST,
        }
    }

    #[test]
    fn writes_and_clears_touch_only_their_range() {
        let mut device = HeadlessDevice::new();
        let id = device.create_buffer(&desc("scratch", 16)).unwrap();

        device.write_buffer(id, 4, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(
            device.read_buffer(id).unwrap(),
            &[0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 0]
        );

        device.clear_buffer(id, 8, None).unwrap();
        assert_eq!(&device.read_buffer(id).unwrap()[4..12], &[1, 2, 3, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn memory_budget_rejects_oversized_allocations() {
        let mut device = HeadlessDevice::with_memory_budget(100);
        let a = device.create_buffer(&desc("a", 64)).unwrap();
        let err = device.create_buffer(&desc("b", 64)).unwrap_err();
        assert!(matches!(err, GpuError::OutOfMemory { size: 64, .. }));

        device.destroy_buffer(a);
        assert_eq!(device.allocated_bytes(), 0);
        assert!(device.create_buffer(&desc("b", 64)).is_ok());
    }

    #[test]
    fn submit_counts_and_records() {
        let mut device = HeadlessDevice::new();
        let id = device.create_buffer(&desc("frame data", 8)).unwrap();
        assert_eq!(device.buffer_label(id), Some("frame data"));

        device.submit().unwrap();
        device.submit().unwrap();
        assert_eq!(device.submissions(), 2);
        assert_eq!(device.take_commands().last(), Some(&DeviceCommand::Submit));
        assert!(device.take_commands().is_empty());
    }

    #[test]
    fn unknown_buffers_are_errors() {
        let mut device = HeadlessDevice::new();
        let id = device.create_buffer(&desc("gone", 4)).unwrap();
        device.destroy_buffer(id);
        assert!(matches!(
            device.write_buffer(id, 0, &[0; 4]),
            Err(GpuError::UnknownBuffer(_))
        ));
    }

    #[test]
    #[should_panic(expected = "overflows")]
    fn writing_past_the_end_panics() {
        let mut device = HeadlessDevice::new();
        let id = device.create_buffer(&desc("small", 4)).unwrap();
        let _ = device.write_buffer(id, 0, &[0; 8]);
    }
}
