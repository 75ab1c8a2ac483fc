//! Bounding volumes and parameter clamping for cullable lights.
//!
//! Nothing here may hand a NaN to the GPU buffers: degenerate vectors fall
//! back to a fixed direction and angles are clamped before use.

use std::f32::consts::{FRAC_1_SQRT_2, PI};

use glam::Vec3;

use crate::gpu_types::Sphere;

/// Below this half-angle cosine (about 45 degrees) the simple sphere centred
/// half-way down the axis gets loose and the off-axis formula is used.
pub const WIDE_CONE_COS: f32 = FRAC_1_SQRT_2;

/// Unit direction, or -Z when `v` is zero-length or not finite.
pub fn safe_direction(v: Vec3) -> Vec3 {
    v.try_normalize().unwrap_or(-Vec3::Z)
}

/// Clamps a full cone angle to `[0, PI]`. NaN becomes 0.
pub fn clamp_angle(angle: f32) -> f32 {
    if angle.is_nan() {
        return 0.0;
    }
    angle.clamp(0.0, PI)
}

pub fn clamp_intensity(intensity: f32) -> f32 {
    if intensity.is_nan() {
        return 0.0;
    }
    intensity.max(0.0)
}

pub fn clamp_range(range: f32) -> f32 {
    if range.is_nan() {
        return 0.0;
    }
    range.max(0.0)
}

pub fn clamp_color(color: Vec3) -> Vec3 {
    let color = Vec3::select(color.is_nan_mask(), Vec3::ZERO, color);
    color.clamp(Vec3::ZERO, Vec3::ONE)
}

pub fn clamp_attenuation(attenuation: Vec3) -> Vec3 {
    let attenuation = Vec3::select(attenuation.is_nan_mask(), Vec3::ZERO, attenuation);
    attenuation.max(Vec3::ZERO)
}

/// Cosine of half of a full cone angle.
pub fn half_angle_cos(angle: f32) -> f32 {
    (clamp_angle(angle) * 0.5).cos()
}

/// Inverse of [`half_angle_cos`].
pub fn angle_from_half_cos(cos: f32) -> f32 {
    2.0 * cos.clamp(-1.0, 1.0).acos()
}

pub fn point_bounding_sphere(position: Vec3, range: f32) -> Sphere {
    Sphere {
        center: position.to_array(),
        radius: range,
    }
}

/// Sphere enclosing a cone with its tip at `tip`, pointing along `direction`.
pub fn cone_bounding_sphere(tip: Vec3, direction: Vec3, range: f32, cos_penumbra: f32) -> Sphere {
    let direction = safe_direction(direction);
    let cone_cos = if cos_penumbra.is_nan() {
        0.0
    } else {
        cos_penumbra.clamp(0.0, 1.0)
    };

    if cone_cos >= WIDE_CONE_COS {
        let radius = range / (2.0 * cone_cos);
        Sphere {
            center: (tip + radius * direction).to_array(),
            radius,
        }
    } else {
        let cone_sin = (1.0 - cone_cos * cone_cos).max(0.0).sqrt();
        Sphere {
            center: (tip + cone_cos * range * direction).to_array(),
            radius: cone_sin * range,
        }
    }
}
