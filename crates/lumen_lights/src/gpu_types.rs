// Packed layouts shared with the WGSL kernels and the shading pass.
// Keep field order in sync with shaders/*.wgsl in lumen_renderer.

use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DirectionalLightParams {
    pub direction: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 3],
    pub _padding: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CullableLightParams {
    pub position: [f32; 3],
    pub intensity: f32,
    pub direction: [f32; 3],
    pub range: f32,
    pub color: [f32; 3],
    /// Cosine of half the umbra angle. -1 for point lights.
    pub cos_umbra: f32,
    pub attenuation: [f32; 3],
    /// Cosine of half the penumbra angle. -1 for point lights.
    pub cos_penumbra: f32,
}

/// What the culling kernel reads per light.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightCullingInfo {
    pub position: [f32; 3],
    pub range: f32,
    pub direction: [f32; 3],
    /// -1 marks a point light.
    pub cos_penumbra: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Sphere {
    pub center: [f32; 3],
    pub radius: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct AmbientLightParams {
    pub color: [f32; 3],
    pub intensity: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_are_16_byte_multiples() {
        assert_eq!(std::mem::size_of::<DirectionalLightParams>(), 32);
        assert_eq!(std::mem::size_of::<CullableLightParams>(), 64);
        assert_eq!(std::mem::size_of::<LightCullingInfo>(), 32);
        assert_eq!(std::mem::size_of::<Sphere>(), 16);
        assert_eq!(std::mem::size_of::<AmbientLightParams>(), 16);
    }
}
