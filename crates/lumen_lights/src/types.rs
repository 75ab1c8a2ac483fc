use glam::Vec3;
use lumen_core::EntityId;

use crate::arena::LightId;

/// Key of an independent group of lights (one per scene or view).
pub type LightSetKey = u64;

/// External light handle: owner id plus the light set it lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LightHandle {
    pub id: LightId,
    pub set: LightSetKey,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
    Ambient,
}

impl LightKind {
    /// Point and spot lights are tested per tile by the culling kernel.
    pub fn is_cullable(self) -> bool {
        matches!(self, LightKind::Point | LightKind::Spot)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LightInitInfo {
    pub entity: EntityId,
    pub kind: LightKind,
    pub enabled: bool,
    pub intensity: f32,
    pub color: Vec3,
    /// Constant, linear and quadratic terms.
    pub attenuation: Vec3,
    pub range: f32,
    /// Full inner cone angle in radians.
    pub umbra: f32,
    /// Full outer cone angle in radians.
    pub penumbra: f32,
}

impl LightInitInfo {
    fn base(entity: EntityId, kind: LightKind) -> Self {
        Self {
            entity,
            kind,
            enabled: true,
            intensity: 1.0,
            color: Vec3::ONE,
            attenuation: Vec3::new(1.0, 0.0, 0.0),
            range: 1.0,
            umbra: 0.0,
            penumbra: 0.0,
        }
    }

    pub fn directional(entity: EntityId) -> Self {
        Self::base(entity, LightKind::Directional)
    }

    pub fn point(entity: EntityId, range: f32) -> Self {
        Self {
            range,
            ..Self::base(entity, LightKind::Point)
        }
    }

    pub fn spot(entity: EntityId, range: f32, umbra: f32, penumbra: f32) -> Self {
        Self {
            range,
            umbra,
            penumbra,
            ..Self::base(entity, LightKind::Spot)
        }
    }

    pub fn ambient() -> Self {
        Self::base(EntityId::INVALID, LightKind::Ambient)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    pub fn with_attenuation(mut self, attenuation: Vec3) -> Self {
        self.attenuation = attenuation;
        self
    }
}

/// Which parameter to read back from a light.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Enabled,
    Intensity,
    Color,
    Attenuation,
    Range,
    Umbra,
    Penumbra,
    Kind,
    Entity,
}

impl ParameterKind {
    pub fn is_read_only(self) -> bool {
        matches!(self, ParameterKind::Kind | ParameterKind::Entity)
    }

    pub fn is_supported_by(self, kind: LightKind) -> bool {
        match self {
            ParameterKind::Enabled
            | ParameterKind::Intensity
            | ParameterKind::Color
            | ParameterKind::Kind
            | ParameterKind::Entity => true,
            ParameterKind::Attenuation | ParameterKind::Range => kind.is_cullable(),
            ParameterKind::Umbra | ParameterKind::Penumbra => kind == LightKind::Spot,
        }
    }
}

/// A light parameter together with its value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightParameter {
    Enabled(bool),
    Intensity(f32),
    Color(Vec3),
    Attenuation(Vec3),
    Range(f32),
    Umbra(f32),
    Penumbra(f32),
    Kind(LightKind),
    Entity(EntityId),
}

impl LightParameter {
    pub fn kind(&self) -> ParameterKind {
        match self {
            LightParameter::Enabled(_) => ParameterKind::Enabled,
            LightParameter::Intensity(_) => ParameterKind::Intensity,
            LightParameter::Color(_) => ParameterKind::Color,
            LightParameter::Attenuation(_) => ParameterKind::Attenuation,
            LightParameter::Range(_) => ParameterKind::Range,
            LightParameter::Umbra(_) => ParameterKind::Umbra,
            LightParameter::Penumbra(_) => ParameterKind::Penumbra,
            LightParameter::Kind(_) => ParameterKind::Kind,
            LightParameter::Entity(_) => ParameterKind::Entity,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            LightParameter::Intensity(v)
            | LightParameter::Range(v)
            | LightParameter::Umbra(v)
            | LightParameter::Penumbra(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match *self {
            LightParameter::Color(v) | LightParameter::Attenuation(v) => Some(v),
            _ => None,
        }
    }
}
