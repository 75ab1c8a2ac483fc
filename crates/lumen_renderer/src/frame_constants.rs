use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use lumen_core::{Camera, Transform, Viewport};

// Per-frame camera data shared by the culling kernels and the shading pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct FrameConstants {
    pub view: Mat4,
    pub projection: Mat4,
    pub inv_projection: Mat4,
    pub view_projection: Mat4,
    pub camera_position: Vec4,  // .w = 1
    pub camera_direction: Vec4, // .w = vertical fov
    pub viewport: Vec4,         // width, height, 1/width, 1/height
}

impl FrameConstants {
    pub fn new(camera_transform: &Transform, camera: &Camera, viewport: Viewport) -> Self {
        let view = camera_transform.compute_matrix().inverse();
        let projection = camera.projection(viewport.aspect());
        let (width, height) = (viewport.width.max(1) as f32, viewport.height.max(1) as f32);

        Self {
            view,
            projection,
            inv_projection: projection.inverse(),
            view_projection: projection * view,
            camera_position: camera_transform.translation.extend(1.0),
            camera_direction: camera_transform.forward().extend(camera.fov),
            viewport: Vec4::new(width, height, 1.0 / width, 1.0 / height),
        }
    }
}
