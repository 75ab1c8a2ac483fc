use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};

/// Weak reference to a transform-owning entity. Lights only ever look it up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

impl EntityId {
    pub const INVALID: EntityId = EntityId(u32::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::INVALID
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_xyz(x: f32, y: f32, z: f32) -> Self {
        Self {
            translation: Vec3::new(x, y, z),
            ..Default::default()
        }
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Default::default()
        }
    }

    /// Rotates so that `forward()` points at `target`.
    pub fn looking_at(mut self, target: Vec3, up: Vec3) -> Self {
        // look_at_rh builds a view matrix (world -> local), the object needs the inverse.
        let mat = Mat4::look_at_rh(self.translation, target, up);
        self.rotation = Quat::from_mat4(&mat.inverse());
        self
    }

    /// Local-to-world matrix.
    pub fn compute_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Local -Z in world space.
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }
}

/// What the light system needs from the entity/transform world.
pub trait TransformSource {
    /// World-space position of the entity.
    fn position(&self, entity: EntityId) -> Vec3;

    /// World-space forward direction of the entity (unit length).
    fn orientation(&self, entity: EntityId) -> Vec3;

    /// Batched "did this transform change since last frame" query.
    /// `changed` has the same length as `entities`.
    fn changed_transforms(&self, entities: &[EntityId], changed: &mut [bool]);
}

#[derive(Debug, Clone, Copy)]
struct TransformSlot {
    transform: Transform,
    changed: bool,
}

/// Simple in-memory transform world.
///
/// Every write flags the entity as changed until [`TransformStore::end_frame`]
/// is called, which is what the light system's batched query relies on.
#[derive(Debug, Default)]
pub struct TransformStore {
    slots: HashMap<EntityId, TransformSlot>,
    next_id: u32,
}

impl TransformStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, transform: Transform) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.slots.insert(
            id,
            TransformSlot {
                transform,
                changed: true,
            },
        );
        id
    }

    pub fn despawn(&mut self, entity: EntityId) -> Option<Transform> {
        self.slots.remove(&entity).map(|slot| slot.transform)
    }

    pub fn transform(&self, entity: EntityId) -> Option<&Transform> {
        self.slots.get(&entity).map(|slot| &slot.transform)
    }

    pub fn set_transform(&mut self, entity: EntityId, transform: Transform) {
        if let Some(slot) = self.slots.get_mut(&entity) {
            slot.transform = transform;
            slot.changed = true;
        } else {
            log::warn!("set_transform on unknown entity {:?}", entity);
        }
    }

    /// Clears the per-entity change flags. Call once per frame after
    /// every consumer has observed the changes.
    pub fn end_frame(&mut self) {
        for slot in self.slots.values_mut() {
            slot.changed = false;
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl TransformSource for TransformStore {
    fn position(&self, entity: EntityId) -> Vec3 {
        self.slots
            .get(&entity)
            .map(|slot| slot.transform.translation)
            .unwrap_or(Vec3::ZERO)
    }

    fn orientation(&self, entity: EntityId) -> Vec3 {
        self.slots
            .get(&entity)
            .map(|slot| slot.transform.forward().normalize_or(-Vec3::Z))
            .unwrap_or(-Vec3::Z)
    }

    fn changed_transforms(&self, entities: &[EntityId], changed: &mut [bool]) {
        debug_assert_eq!(entities.len(), changed.len());
        for (entity, flag) in entities.iter().zip(changed.iter_mut()) {
            *flag = self.slots.get(entity).is_some_and(|slot| slot.changed);
        }
    }
}
