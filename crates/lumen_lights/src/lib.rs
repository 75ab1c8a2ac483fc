//! Dynamic light management.
//!
//! Lights are grouped in [`LightSet`]s owned by a [`LightingContext`]. Each
//! set keeps its point and spot lights in packed arrays so the enabled ones
//! can be uploaded without holes, and tracks per-frame dirty bits so the GPU
//! mirrors only copy what changed.

pub mod arena;
pub mod bounds;
pub mod context;
pub mod gpu_types;
pub mod light_set;
pub mod types;

pub use arena::LightId;
pub use context::{LightingContext, SharedLightSet};
pub use gpu_types::{
    AmbientLightParams, CullableLightParams, DirectionalLightParams, LightCullingInfo, Sphere,
};
pub use light_set::LightSet;
pub use types::{LightHandle, LightInitInfo, LightKind, LightParameter, LightSetKey, ParameterKind};
