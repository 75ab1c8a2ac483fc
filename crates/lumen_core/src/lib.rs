pub use glam;

pub mod camera;
pub mod config;
pub mod frame;
pub mod transform;

pub use camera::{Camera, Viewport};
pub use config::{ConfigError, LightingConfig};
pub use frame::FrameClock;
pub use transform::{EntityId, Transform, TransformSource, TransformStore};

/// Upper bound on frames in flight. Dirty masks are stored in a `u8`,
/// one bit per frame.
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

/// Upper bound on lights a single tile can list. The culling kernel keeps a
/// scratch list of this size in workgroup memory.
pub const MAX_LIGHTS_PER_TILE: u32 = 256;
