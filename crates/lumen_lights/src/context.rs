use std::{collections::HashMap, sync::Arc};

use lumen_core::{LightingConfig, TransformSource};
use parking_lot::Mutex;

use crate::{
    light_set::LightSet,
    types::{LightHandle, LightInitInfo, LightParameter, LightSetKey, ParameterKind},
};

/// A light set shared between gameplay threads and the render thread.
/// Every mutation goes through the lock, which is never held across GPU work.
pub type SharedLightSet = Arc<Mutex<LightSet>>;

/// Owns every light set of the renderer, keyed by [`LightSetKey`].
///
/// Passed explicitly to whoever needs it; dropping it tears all sets down.
#[derive(Debug)]
pub struct LightingContext {
    frames_in_flight: usize,
    sets: HashMap<LightSetKey, SharedLightSet>,
}

impl LightingContext {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            frames_in_flight,
            sets: HashMap::new(),
        }
    }

    pub fn from_config(config: &LightingConfig) -> Self {
        Self::new(config.frames_in_flight)
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    pub fn create_light_set(&mut self, key: LightSetKey) -> SharedLightSet {
        assert!(
            !self.sets.contains_key(&key),
            "light set {key} already exists"
        );
        log::debug!("creating light set {key}");
        let set = Arc::new(Mutex::new(LightSet::new(self.frames_in_flight)));
        self.sets.insert(key, set.clone());
        set
    }

    /// Destroys a light set. Every light in it must have been removed and
    /// no in-flight GPU work may still reference its buffers.
    pub fn remove_light_set(&mut self, key: LightSetKey) {
        let set = self.expect_set(key);
        let remaining = set.lock().light_count();
        assert!(
            remaining == 0,
            "light set {key} removed while it still owns {remaining} lights"
        );
        self.sets.remove(&key);
        log::debug!("removed light set {key}");
    }

    pub fn light_set(&self, key: LightSetKey) -> Option<SharedLightSet> {
        self.sets.get(&key).cloned()
    }

    pub fn contains(&self, key: LightSetKey) -> bool {
        self.sets.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = LightSetKey> + '_ {
        self.sets.keys().copied()
    }

    /// Adds a light, creating the light set on first use of `key`.
    pub fn add_light(
        &mut self,
        key: LightSetKey,
        info: &LightInitInfo,
        transforms: &dyn TransformSource,
    ) -> LightHandle {
        let set = match self.sets.get(&key).cloned() {
            Some(set) => set,
            None => self.create_light_set(key),
        };
        let id = set.lock().add(info, transforms);
        LightHandle { id, set: key }
    }

    pub fn remove_light(&self, handle: LightHandle) {
        self.expect_set(handle.set).lock().remove(handle.id);
    }

    pub fn set_parameter(&self, handle: LightHandle, parameter: LightParameter) {
        self.expect_set(handle.set)
            .lock()
            .set_parameter(handle.id, parameter);
    }

    pub fn get_parameter(&self, handle: LightHandle, kind: ParameterKind) -> LightParameter {
        self.expect_set(handle.set).lock().get_parameter(handle.id, kind)
    }

    pub fn enabled_light_count(&self, key: LightSetKey) -> u32 {
        self.expect_set(key).lock().enabled_light_count()
    }

    pub fn non_cullable_light_count(&self, key: LightSetKey) -> u32 {
        self.expect_set(key).lock().non_cullable_light_count()
    }

    pub fn update_transforms(&self, key: LightSetKey, transforms: &dyn TransformSource) {
        self.expect_set(key).lock().update_transforms(transforms);
    }

    fn expect_set(&self, key: LightSetKey) -> &SharedLightSet {
        match self.sets.get(&key) {
            Some(set) => set,
            None => panic!("unknown light set {key}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use lumen_core::{Transform, TransformStore};

    use super::*;
    use crate::types::LightKind;

    #[test]
    fn add_light_creates_set_on_first_use() {
        let mut transforms = TransformStore::new();
        let e = transforms.spawn(Transform::from_xyz(1.0, 0.0, 0.0));
        let mut ctx = LightingContext::new(2);

        let h = ctx.add_light(7, &LightInitInfo::point(e, 3.0), &transforms);
        assert!(ctx.contains(7));
        assert_eq!(h.set, 7);
        assert_eq!(ctx.enabled_light_count(7), 1);
        assert_eq!(ctx.non_cullable_light_count(7), 0);
        assert_eq!(
            ctx.get_parameter(h, ParameterKind::Kind),
            LightParameter::Kind(LightKind::Point)
        );

        ctx.set_parameter(h, LightParameter::Color(Vec3::new(2.0, 0.5, -1.0)));
        assert_eq!(
            ctx.get_parameter(h, ParameterKind::Color),
            LightParameter::Color(Vec3::new(1.0, 0.5, 0.0))
        );

        ctx.remove_light(h);
        ctx.remove_light_set(7);
        assert!(!ctx.contains(7));
    }

    #[test]
    fn light_sets_are_independent() {
        let transforms = TransformStore::new();
        let mut ctx = LightingContext::new(3);
        ctx.add_light(1, &LightInitInfo::directional(lumen_core::EntityId(0)), &transforms);
        ctx.add_light(2, &LightInitInfo::ambient(), &transforms);

        assert_eq!(ctx.non_cullable_light_count(1), 1);
        assert_eq!(ctx.non_cullable_light_count(2), 0);
        let mut keys: Vec<_> = ctx.keys().collect();
        keys.sort();
        assert_eq!(keys, vec![1, 2]);
    }

    #[test]
    #[should_panic(expected = "still owns")]
    fn removing_populated_set_panics() {
        let transforms = TransformStore::new();
        let mut ctx = LightingContext::new(3);
        ctx.add_light(1, &LightInitInfo::ambient(), &transforms);
        ctx.remove_light_set(1);
    }

    #[test]
    fn shared_set_can_be_mutated_from_another_thread() {
        let mut transforms = TransformStore::new();
        let e = transforms.spawn(Transform::default());
        let mut ctx = LightingContext::new(2);
        let h = ctx.add_light(5, &LightInitInfo::point(e, 1.0), &transforms);

        let set = ctx.light_set(5).unwrap();
        std::thread::spawn(move || {
            set.lock().enable(h.id, false);
        })
        .join()
        .unwrap();

        assert_eq!(ctx.enabled_light_count(5), 0);
    }
}
