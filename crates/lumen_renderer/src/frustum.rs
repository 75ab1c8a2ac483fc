use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// A plane through `distance * normal`; points with
/// `normal.dot(p) - distance >= 0` are on the inside.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Plane {
    pub normal: [f32; 3],
    pub distance: f32,
}

impl Plane {
    /// Plane through the eye (view-space origin) and two points on the far plane.
    fn through_eye(a: Vec3, b: Vec3) -> Self {
        let normal = a.cross(b).normalize_or_zero();
        Self {
            normal: normal.to_array(),
            distance: 0.0,
        }
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        Vec3::from_array(self.normal).dot(point) - self.distance
    }
}

/// Side planes of one screen tile in view space, in the order left, right,
/// top, bottom. Matches the layout written by `grid_frustums.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TileFrustum {
    pub planes: [Plane; 4],
}

impl TileFrustum {
    pub const SIZE: u64 = std::mem::size_of::<TileFrustum>() as u64;

    /// Frustum of tile `(x, y)` for a viewport of `size` pixels.
    pub fn for_tile(inv_projection: Mat4, size: Vec2, tile_size: u32, x: u32, y: u32) -> Self {
        let tile = tile_size as f32;
        let (x0, y0) = (x as f32 * tile, y as f32 * tile);
        let (x1, y1) = (x0 + tile, y0 + tile);

        let top_left = screen_to_view(inv_projection, size, Vec2::new(x0, y0));
        let top_right = screen_to_view(inv_projection, size, Vec2::new(x1, y0));
        let bottom_left = screen_to_view(inv_projection, size, Vec2::new(x0, y1));
        let bottom_right = screen_to_view(inv_projection, size, Vec2::new(x1, y1));

        Self {
            planes: [
                Plane::through_eye(bottom_left, top_left),
                Plane::through_eye(top_right, bottom_right),
                Plane::through_eye(top_left, top_right),
                Plane::through_eye(bottom_right, bottom_left),
            ],
        }
    }

    /// Side-plane test for a view-space sphere. Depth is tested separately.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(center) >= -radius)
    }
}

/// Does a view-space sphere overlap the depth slab `[far_z, near_z]`?
/// View space looks down -Z, so `near_z > far_z`.
pub fn sphere_in_depth_range(center: Vec3, radius: f32, near_z: f32, far_z: f32) -> bool {
    !(center.z - radius > near_z || center.z + radius < far_z)
}

/// Unprojects a pixel position onto the far plane.
fn screen_to_view(inv_projection: Mat4, size: Vec2, pixel: Vec2) -> Vec3 {
    let uv = pixel / size;
    let ndc = Vec4::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 1.0, 1.0);
    let view = inv_projection * ndc;
    view.truncate() / view.w
}
