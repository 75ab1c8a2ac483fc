use std::collections::HashMap;

use lumen_core::{Camera, LightingConfig, Transform, TransformSource, Viewport};
use lumen_lights::{AmbientLightParams, LightSetKey, LightingContext};
use thiserror::Error;

use crate::{
    culling::{CullFrame, CullOutcome, LightCulling, LightGridBindings},
    device::{BufferId, BufferUsage, GpuError, RenderDevice, TextureId},
    frame_constants::FrameConstants,
    gpu_buffer::GpuBuffer,
    light_buffers::{GpuLightBuffers, LightBufferBindings, SyncReport},
};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("light set {0} does not exist")]
    MissingLightSet(LightSetKey),
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// A camera the lights are culled for. Each view has its own tile grids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub u32);

/// Inputs of one view for one frame.
#[derive(Clone, Debug)]
pub struct FrameInfo {
    pub view: ViewId,
    pub light_set: LightSetKey,
    pub frame_index: usize,
    pub camera: Camera,
    pub camera_transform: Transform,
    pub viewport: Viewport,
    /// Depth written by the depth pre-pass, read for per-tile depth bounds.
    pub depth: TextureId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameLightingOutcome {
    /// A GPU allocation failed; the frame renders without culled lights and
    /// the next frame retries.
    Skipped,
    Rendered { sync: SyncReport, cull: CullOutcome },
}

/// Everything the shading pass reads for one view and frame slot.
/// Valid for that frame's submission only.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadingBindings {
    pub frame_constants: BufferId,
    pub non_cullable_lights: BufferId,
    pub non_cullable_count: u32,
    pub cullable_lights: BufferId,
    pub light_grid: LightGridBindings,
    pub ambient: Option<AmbientLightParams>,
}

#[derive(Debug)]
struct ViewState {
    culling: LightCulling,
    frame_constants: Vec<GpuBuffer>,
}

/// Runs the per-frame lighting work: transform refresh, buffer sync,
/// frame constants upload and tile culling.
///
/// All views rendered into the same frame slot within one submission must
/// use the same light set, since they share that slot's light buffers.
#[derive(Debug)]
pub struct LightingRenderer {
    config: LightingConfig,
    buffers: GpuLightBuffers,
    views: HashMap<ViewId, ViewState>,
}

impl LightingRenderer {
    pub fn new(device: &mut dyn RenderDevice, config: LightingConfig) -> Result<Self, GpuError> {
        if let Err(err) = config.validate() {
            panic!("{err}");
        }
        let buffers = GpuLightBuffers::new(device, &config)?;
        log::info!(
            "lighting renderer ready: {} frames in flight, {}px tiles",
            config.frames_in_flight,
            config.tile_size
        );
        Ok(Self {
            config,
            buffers,
            views: HashMap::new(),
        })
    }

    pub fn config(&self) -> &LightingConfig {
        &self.config
    }

    pub fn create_view(
        &mut self,
        device: &mut dyn RenderDevice,
        view: ViewId,
    ) -> Result<(), GpuError> {
        assert!(!self.views.contains_key(&view), "view {view:?} already exists");

        let culling = LightCulling::new(device, &self.config)?;
        let frame_constants = (0..self.config.frames_in_flight)
            .map(|frame_index| {
                GpuBuffer::new(
                    device,
                    format!("frame constants {} [frame {frame_index}]", view.0),
                    BufferUsage::UNIFORM | BufferUsage::COPY_DST,
                    std::mem::size_of::<FrameConstants>() as u64,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.views.insert(
            view,
            ViewState {
                culling,
                frame_constants,
            },
        );
        log::debug!("created view {view:?}");
        Ok(())
    }

    /// Releases a view's buffers. The GPU must be done with them.
    pub fn remove_view(&mut self, device: &mut dyn RenderDevice, view: ViewId) {
        let Some(state) = self.views.remove(&view) else {
            panic!("unknown view {view:?}");
        };
        state.culling.release(device);
        for buffer in state.frame_constants {
            buffer.release(device);
        }
        log::debug!("removed view {view:?}");
    }

    pub fn render_lights(
        &mut self,
        device: &mut dyn RenderDevice,
        context: &LightingContext,
        transforms: &dyn TransformSource,
        frame: &FrameInfo,
    ) -> Result<FrameLightingOutcome, RenderError> {
        assert!(
            frame.frame_index < self.config.frames_in_flight,
            "frame index {} out of range",
            frame.frame_index
        );
        let Some(state) = self.views.get_mut(&frame.view) else {
            panic!("unknown view {:?}", frame.view);
        };
        let light_set = context
            .light_set(frame.light_set)
            .ok_or(RenderError::MissingLightSet(frame.light_set))?;

        // The lock only covers CPU-side copies into the upload queue.
        let sync = {
            let mut light_set = light_set.lock();
            light_set.update_transforms(transforms);
            self.buffers
                .update(device, &mut light_set, frame.light_set, frame.frame_index)
        };
        let sync = match sync {
            Ok(sync) => sync,
            Err(err) if err.is_out_of_memory() => {
                log::warn!("skipping light culling this frame: {err}");
                return Ok(FrameLightingOutcome::Skipped);
            }
            Err(err) => return Err(err.into()),
        };

        let constants_buffer = &state.frame_constants[frame.frame_index];
        let constants = FrameConstants::new(&frame.camera_transform, &frame.camera, frame.viewport);
        device.write_buffer(constants_buffer.id(), 0, bytemuck::bytes_of(&constants))?;

        let lights = self.buffers.bindings(frame.frame_index);
        let cull = state.culling.cull(
            device,
            &CullFrame {
                frame_index: frame.frame_index,
                viewport: frame.viewport,
                fov: frame.camera.fov,
                frame_constants: constants_buffer.id(),
                lights: &lights,
                depth: frame.depth,
            },
        );
        let cull = match cull {
            Ok(cull) => cull,
            Err(err) if err.is_out_of_memory() => {
                log::warn!("skipping light culling this frame: {err}");
                return Ok(FrameLightingOutcome::Skipped);
            }
            Err(err) => return Err(err.into()),
        };

        log::trace!(
            "view {:?} frame {}: {} lights, {:?}",
            frame.view,
            frame.frame_index,
            lights.cullable_count,
            cull
        );
        Ok(FrameLightingOutcome::Rendered { sync, cull })
    }

    /// Buffers the shading pass binds for `view` in `frame_index`.
    pub fn shading_bindings(&self, view: ViewId, frame_index: usize) -> Option<ShadingBindings> {
        let state = self.views.get(&view)?;
        let lights: LightBufferBindings = self.buffers.bindings(frame_index);
        Some(ShadingBindings {
            frame_constants: state.frame_constants[frame_index].id(),
            non_cullable_lights: lights.non_cullable,
            non_cullable_count: lights.non_cullable_count,
            cullable_lights: lights.cullable,
            light_grid: state.culling.light_grid(frame_index),
            ambient: lights.ambient,
        })
    }

    pub fn light_buffers(&self) -> &GpuLightBuffers {
        &self.buffers
    }

    pub fn culling(&self, view: ViewId) -> Option<&LightCulling> {
        self.views.get(&view).map(|state| &state.culling)
    }

    pub fn release(self, device: &mut dyn RenderDevice) {
        for (_, state) in self.views {
            state.culling.release(device);
            for buffer in state.frame_constants {
                buffer.release(device);
            }
        }
        self.buffers.release(device);
    }
}
