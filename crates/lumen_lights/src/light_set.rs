use glam::Vec3;
use lumen_core::{EntityId, MAX_FRAMES_IN_FLIGHT, TransformSource};

use crate::{
    arena::{Arena, LightId},
    bounds::{
        angle_from_half_cos, clamp_attenuation, clamp_color, clamp_intensity, clamp_range,
        cone_bounding_sphere, half_angle_cos, point_bounding_sphere, safe_direction,
    },
    gpu_types::{
        AmbientLightParams, CullableLightParams, DirectionalLightParams, LightCullingInfo, Sphere,
    },
    types::{LightInitInfo, LightKind, LightParameter, ParameterKind},
};

/// Data index used by owners that have no packed array (ambient).
const NO_DATA_INDEX: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct LightOwner {
    entity: EntityId,
    /// Slot in the packed array of this light's kind.
    data_index: u32,
    kind: LightKind,
    enabled: bool,
}

#[derive(Debug, Clone, Copy)]
struct AmbientLight {
    id: LightId,
    params: AmbientLightParams,
}

/// One independent group of lights.
///
/// Point and spot lights live in parallel packed arrays where
/// `[0, enabled_light_count)` holds exactly the enabled lights. Enabling and
/// disabling keep that prefix contiguous by swapping slots, never by
/// shifting. Every slot carries one dirty bit per frame in flight so each
/// frame's GPU mirror only copies what changed since it was last written.
#[derive(Debug)]
pub struct LightSet {
    all_frames_mask: u8,
    owners: Arena<LightOwner>,

    // Directional lights: small, not packed, tombstoned with `None`.
    non_cullable_lights: Vec<DirectionalLightParams>,
    non_cullable_owners: Vec<Option<LightId>>,

    // Point and spot lights: parallel arrays sharing one index space.
    cullable_lights: Vec<CullableLightParams>,
    culling_infos: Vec<LightCullingInfo>,
    bounding_spheres: Vec<Sphere>,
    cullable_entity_ids: Vec<EntityId>,
    cullable_owners: Vec<Option<LightId>>,
    dirty_bits: Vec<u8>,
    // Set on enable: the entity may have moved while its light was disabled.
    stale_transforms: Vec<bool>,

    enabled_light_count: u32,
    something_is_dirty: u8,

    ambient: Option<AmbientLight>,

    changed_scratch: Vec<bool>,
}

impl LightSet {
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(
            (1..=MAX_FRAMES_IN_FLIGHT).contains(&frames_in_flight),
            "frames_in_flight must be in 1..={MAX_FRAMES_IN_FLIGHT}"
        );
        Self {
            all_frames_mask: ((1u16 << frames_in_flight) - 1) as u8,
            owners: Arena::new(),
            non_cullable_lights: Vec::new(),
            non_cullable_owners: Vec::new(),
            cullable_lights: Vec::new(),
            culling_infos: Vec::new(),
            bounding_spheres: Vec::new(),
            cullable_entity_ids: Vec::new(),
            cullable_owners: Vec::new(),
            dirty_bits: Vec::new(),
            stale_transforms: Vec::new(),
            enabled_light_count: 0,
            something_is_dirty: 0,
            ambient: None,
            changed_scratch: Vec::new(),
        }
    }

    // --- Add / Remove ---

    pub fn add(&mut self, info: &LightInitInfo, transforms: &dyn TransformSource) -> LightId {
        let owner = LightOwner {
            entity: info.entity,
            data_index: NO_DATA_INDEX,
            kind: info.kind,
            enabled: false,
        };

        match info.kind {
            LightKind::Directional => {
                let id = self.owners.insert(owner);
                let params = DirectionalLightParams {
                    direction: safe_direction(transforms.orientation(info.entity)).to_array(),
                    intensity: clamp_intensity(info.intensity),
                    color: clamp_color(info.color).to_array(),
                    _padding: 0.0,
                };

                let index = match self.non_cullable_owners.iter().position(Option::is_none) {
                    Some(index) => {
                        self.non_cullable_owners[index] = Some(id);
                        self.non_cullable_lights[index] = params;
                        index
                    }
                    None => {
                        self.non_cullable_owners.push(Some(id));
                        self.non_cullable_lights.push(params);
                        self.non_cullable_owners.len() - 1
                    }
                };

                let owner = self.owner_mut(id);
                owner.data_index = index as u32;
                owner.enabled = info.enabled;
                log::debug!("added directional light {id:?} at slot {index}");
                id
            }
            LightKind::Ambient => {
                assert!(
                    self.ambient.is_none(),
                    "a light set can only hold one ambient light"
                );
                let id = self.owners.insert(LightOwner {
                    enabled: info.enabled,
                    ..owner
                });
                self.ambient = Some(AmbientLight {
                    id,
                    params: AmbientLightParams {
                        color: clamp_color(info.color).to_array(),
                        intensity: clamp_intensity(info.intensity),
                    },
                });
                log::debug!("added ambient light {id:?}");
                id
            }
            LightKind::Point | LightKind::Spot => {
                let id = self.owners.insert(owner);
                let (params, culling_info, sphere) = Self::initial_cullable_data(info);

                // Free slots can only exist past the enabled prefix.
                let start = self.enabled_light_count as usize;
                let free_slot = self.cullable_owners[start..]
                    .iter()
                    .position(Option::is_none)
                    .map(|offset| start + offset);

                let index = match free_slot {
                    Some(index) => {
                        self.cullable_lights[index] = params;
                        self.culling_infos[index] = culling_info;
                        self.bounding_spheres[index] = sphere;
                        self.cullable_entity_ids[index] = info.entity;
                        self.cullable_owners[index] = Some(id);
                        index
                    }
                    None => {
                        self.cullable_lights.push(params);
                        self.culling_infos.push(culling_info);
                        self.bounding_spheres.push(sphere);
                        self.cullable_entity_ids.push(info.entity);
                        self.cullable_owners.push(Some(id));
                        self.dirty_bits.push(0);
                        self.stale_transforms.push(false);
                        self.cullable_lights.len() - 1
                    }
                };

                self.owner_mut(id).data_index = index as u32;
                self.enable(id, info.enabled);

                let index = self.owner(id).data_index as usize;
                self.update_cullable_transform(index, transforms);
                log::debug!("added {:?} light {id:?} at slot {index}", info.kind);
                id
            }
        }
    }

    pub fn remove(&mut self, id: LightId) {
        let owner = *self.owner(id);

        match owner.kind {
            LightKind::Directional => {
                self.non_cullable_owners[owner.data_index as usize] = None;
            }
            LightKind::Ambient => {
                self.ambient = None;
            }
            LightKind::Point | LightKind::Spot => {
                // Moves the light out of the enabled prefix first.
                self.enable(id, false);
                let index = self.owner(id).data_index as usize;
                debug_assert!(index >= self.enabled_light_count as usize);
                self.cullable_owners[index] = None;
                self.cullable_entity_ids[index] = EntityId::INVALID;
                self.stale_transforms[index] = false;
            }
        }

        self.owners.remove(id);
        log::debug!("removed {:?} light {id:?}", owner.kind);
    }

    // --- Enable / Disable ---

    pub fn enable(&mut self, id: LightId, is_enabled: bool) {
        let owner = self.owner_mut(id);
        if !owner.kind.is_cullable() {
            owner.enabled = is_enabled;
            return;
        }
        if owner.enabled == is_enabled {
            return;
        }
        owner.enabled = is_enabled;

        let index = owner.data_index as usize;
        let count = self.enabled_light_count as usize;

        if is_enabled {
            debug_assert!(index >= count);
            if index > count {
                self.swap_cullable_slots(index, count);
            } else {
                // Same slot, but it may hold data a frame buffer never saw.
                self.mark_dirty(index);
            }
            self.stale_transforms[count] = true;
            self.enabled_light_count += 1;
        } else {
            debug_assert!(index < count);
            let last = count - 1;
            if index < last {
                self.swap_cullable_slots(index, last);
            }
            self.enabled_light_count -= 1;
        }
    }

    fn swap_cullable_slots(&mut self, a: usize, b: usize) {
        debug_assert_ne!(a, b);

        self.cullable_lights.swap(a, b);
        self.culling_infos.swap(a, b);
        self.bounding_spheres.swap(a, b);
        self.cullable_entity_ids.swap(a, b);
        self.cullable_owners.swap(a, b);
        self.stale_transforms.swap(a, b);

        for index in [a, b] {
            if let Some(id) = self.cullable_owners[index] {
                self.owner_mut(id).data_index = index as u32;
            }
        }

        // The identity behind both slots changed, so every frame must recopy them.
        self.mark_dirty(a);
        self.mark_dirty(b);
    }

    // --- Parameters ---

    pub fn set_parameter(&mut self, id: LightId, parameter: LightParameter) {
        let owner = *self.owner(id);
        let kind = parameter.kind();
        assert!(
            !kind.is_read_only(),
            "light parameter {kind:?} is read-only"
        );
        assert!(
            kind.is_supported_by(owner.kind),
            "{:?} lights have no {kind:?} parameter",
            owner.kind
        );

        let index = owner.data_index as usize;
        match parameter {
            LightParameter::Enabled(enabled) => self.enable(id, enabled),
            LightParameter::Intensity(intensity) => {
                let intensity = clamp_intensity(intensity);
                match owner.kind {
                    LightKind::Directional => self.non_cullable_lights[index].intensity = intensity,
                    LightKind::Ambient => self.ambient_mut().params.intensity = intensity,
                    LightKind::Point | LightKind::Spot => {
                        self.cullable_lights[index].intensity = intensity;
                        self.mark_dirty(index);
                    }
                }
            }
            LightParameter::Color(color) => {
                let color = clamp_color(color).to_array();
                match owner.kind {
                    LightKind::Directional => self.non_cullable_lights[index].color = color,
                    LightKind::Ambient => self.ambient_mut().params.color = color,
                    LightKind::Point | LightKind::Spot => {
                        self.cullable_lights[index].color = color;
                        self.mark_dirty(index);
                    }
                }
            }
            LightParameter::Attenuation(attenuation) => {
                self.cullable_lights[index].attenuation = clamp_attenuation(attenuation).to_array();
                self.mark_dirty(index);
            }
            LightParameter::Range(range) => {
                self.cullable_lights[index].range = clamp_range(range);
                self.refresh_culling_data(index);
                self.mark_dirty(index);
            }
            LightParameter::Umbra(umbra) => {
                let light = &mut self.cullable_lights[index];
                light.cos_umbra = half_angle_cos(umbra);
                // Penumbra is pushed out so it never ends up inside the umbra.
                light.cos_penumbra = light.cos_penumbra.min(light.cos_umbra);
                self.refresh_culling_data(index);
                self.mark_dirty(index);
            }
            LightParameter::Penumbra(penumbra) => {
                let light = &mut self.cullable_lights[index];
                light.cos_penumbra = half_angle_cos(penumbra).min(light.cos_umbra);
                self.refresh_culling_data(index);
                self.mark_dirty(index);
            }
            LightParameter::Kind(_) | LightParameter::Entity(_) => unreachable!(),
        }
    }

    pub fn get_parameter(&self, id: LightId, kind: ParameterKind) -> LightParameter {
        let owner = self.owner(id);
        assert!(
            kind.is_supported_by(owner.kind),
            "{:?} lights have no {kind:?} parameter",
            owner.kind
        );

        let index = owner.data_index as usize;
        match kind {
            ParameterKind::Enabled => LightParameter::Enabled(owner.enabled),
            ParameterKind::Kind => LightParameter::Kind(owner.kind),
            ParameterKind::Entity => LightParameter::Entity(owner.entity),
            ParameterKind::Intensity => LightParameter::Intensity(match owner.kind {
                LightKind::Directional => self.non_cullable_lights[index].intensity,
                LightKind::Ambient => self.ambient_ref().params.intensity,
                LightKind::Point | LightKind::Spot => self.cullable_lights[index].intensity,
            }),
            ParameterKind::Color => LightParameter::Color(Vec3::from_array(match owner.kind {
                LightKind::Directional => self.non_cullable_lights[index].color,
                LightKind::Ambient => self.ambient_ref().params.color,
                LightKind::Point | LightKind::Spot => self.cullable_lights[index].color,
            })),
            ParameterKind::Attenuation => LightParameter::Attenuation(Vec3::from_array(
                self.cullable_lights[index].attenuation,
            )),
            ParameterKind::Range => LightParameter::Range(self.cullable_lights[index].range),
            ParameterKind::Umbra => {
                LightParameter::Umbra(angle_from_half_cos(self.cullable_lights[index].cos_umbra))
            }
            ParameterKind::Penumbra => LightParameter::Penumbra(angle_from_half_cos(
                self.cullable_lights[index].cos_penumbra,
            )),
        }
    }

    // --- Transforms ---

    /// Pulls positions and directions from the transform world.
    ///
    /// Directional lights only refresh while enabled. Cullable lights ask the
    /// transform world once, in a batch, which enabled entities moved, and
    /// only those slots are recomputed and marked dirty. Lights enabled since
    /// the last update are refreshed whether or not their entity moved.
    pub fn update_transforms(&mut self, transforms: &dyn TransformSource) {
        for (slot, light) in self
            .non_cullable_owners
            .iter()
            .zip(self.non_cullable_lights.iter_mut())
        {
            let Some(owner) = slot.and_then(|id| self.owners.get(id)) else {
                continue;
            };
            if owner.enabled {
                light.direction = safe_direction(transforms.orientation(owner.entity)).to_array();
            }
        }

        let count = self.enabled_light_count as usize;
        if count == 0 {
            return;
        }

        self.changed_scratch.clear();
        self.changed_scratch.resize(count, false);
        transforms
            .changed_transforms(&self.cullable_entity_ids[..count], &mut self.changed_scratch);

        for index in 0..count {
            if self.changed_scratch[index] || self.stale_transforms[index] {
                self.update_cullable_transform(index, transforms);
            }
        }
    }

    fn update_cullable_transform(&mut self, index: usize, transforms: &dyn TransformSource) {
        let entity = self.cullable_entity_ids[index];
        let light = &mut self.cullable_lights[index];
        light.position = transforms.position(entity).to_array();
        light.direction = safe_direction(transforms.orientation(entity)).to_array();

        self.stale_transforms[index] = false;
        self.refresh_culling_data(index);
        self.mark_dirty(index);
    }

    /// Rebuilds the culling-info mirror and bounding sphere of one slot from
    /// its light parameters.
    fn refresh_culling_data(&mut self, index: usize) {
        let light = self.cullable_lights[index];
        let position = Vec3::from_array(light.position);
        let direction = Vec3::from_array(light.direction);

        let (cos_penumbra, sphere) = if self.slot_kind(index) == Some(LightKind::Spot) {
            (
                light.cos_penumbra,
                cone_bounding_sphere(position, direction, light.range, light.cos_penumbra),
            )
        } else {
            (-1.0, point_bounding_sphere(position, light.range))
        };

        self.culling_infos[index] = LightCullingInfo {
            position: light.position,
            range: light.range,
            direction: light.direction,
            cos_penumbra,
        };
        self.bounding_spheres[index] = sphere;
    }

    fn initial_cullable_data(
        info: &LightInitInfo,
    ) -> (CullableLightParams, LightCullingInfo, Sphere) {
        let (cos_umbra, cos_penumbra) = match info.kind {
            LightKind::Spot => {
                let cos_umbra = half_angle_cos(info.umbra);
                (cos_umbra, half_angle_cos(info.penumbra).min(cos_umbra))
            }
            _ => (-1.0, -1.0),
        };

        let params = CullableLightParams {
            position: [0.0; 3],
            intensity: clamp_intensity(info.intensity),
            direction: (-Vec3::Z).to_array(),
            range: clamp_range(info.range),
            color: clamp_color(info.color).to_array(),
            cos_umbra,
            attenuation: clamp_attenuation(info.attenuation).to_array(),
            cos_penumbra,
        };
        // Position and bounds are filled in by the first transform update.
        (params, LightCullingInfo::default(), Sphere::default())
    }

    // --- Dirty tracking ---

    fn mark_dirty(&mut self, index: usize) {
        self.dirty_bits[index] = self.all_frames_mask;
        self.something_is_dirty = self.all_frames_mask;
    }

    /// True when any cullable slot still has to be copied for `frame_index`.
    pub fn is_dirty_for_frame(&self, frame_index: usize) -> bool {
        self.something_is_dirty & Self::frame_bit(frame_index) != 0
    }

    /// Dirty mask of one cullable slot, one bit per frame in flight.
    pub fn dirty_bits(&self, index: usize) -> u8 {
        self.dirty_bits[index]
    }

    pub fn all_frames_mask(&self) -> u8 {
        self.all_frames_mask
    }

    /// Collects the enabled slots dirty for `frame_index` into `out` and
    /// clears that frame's bit on every slot.
    pub fn take_dirty_slots(&mut self, frame_index: usize, out: &mut Vec<u32>) {
        out.clear();
        let bit = Self::frame_bit(frame_index);
        if self.something_is_dirty & bit == 0 {
            return;
        }

        let count = self.enabled_light_count as usize;
        for (index, bits) in self.dirty_bits.iter_mut().enumerate() {
            if *bits & bit != 0 {
                if index < count {
                    out.push(index as u32);
                }
                *bits &= !bit;
            }
        }
        self.something_is_dirty &= !bit;
    }

    /// Flags every cullable slot dirty for one frame, e.g. after that
    /// frame's buffers were reallocated.
    pub fn mark_all_dirty_for_frame(&mut self, frame_index: usize) {
        let bit = Self::frame_bit(frame_index);
        for bits in &mut self.dirty_bits {
            *bits |= bit;
        }
        if !self.dirty_bits.is_empty() {
            self.something_is_dirty |= bit;
        }
    }

    /// Marks one frame's copy as fully up to date.
    pub fn clear_frame_dirty(&mut self, frame_index: usize) {
        let bit = Self::frame_bit(frame_index);
        for bits in &mut self.dirty_bits {
            *bits &= !bit;
        }
        self.something_is_dirty &= !bit;
    }

    fn frame_bit(frame_index: usize) -> u8 {
        debug_assert!(frame_index < MAX_FRAMES_IN_FLIGHT);
        1 << frame_index
    }

    // --- Packed views ---

    /// Enabled cullable lights, densely packed.
    pub fn cullable_lights(&self) -> &[CullableLightParams] {
        &self.cullable_lights[..self.enabled_light_count as usize]
    }

    pub fn culling_infos(&self) -> &[LightCullingInfo] {
        &self.culling_infos[..self.enabled_light_count as usize]
    }

    pub fn bounding_spheres(&self) -> &[Sphere] {
        &self.bounding_spheres[..self.enabled_light_count as usize]
    }

    /// Appends every enabled directional light to `out`.
    pub fn non_cullable_lights(&self, out: &mut Vec<DirectionalLightParams>) {
        out.clear();
        for (slot, light) in self
            .non_cullable_owners
            .iter()
            .zip(self.non_cullable_lights.iter())
        {
            let enabled = slot
                .and_then(|id| self.owners.get(id))
                .is_some_and(|owner| owner.enabled);
            if enabled {
                out.push(*light);
            }
        }
    }

    /// Ambient parameters, if the set has an enabled ambient light.
    pub fn ambient_light(&self) -> Option<AmbientLightParams> {
        let ambient = self.ambient.as_ref()?;
        let enabled = self.owners.get(ambient.id).is_some_and(|owner| owner.enabled);
        enabled.then_some(ambient.params)
    }

    // --- Counts & lookups ---

    pub fn enabled_light_count(&self) -> u32 {
        self.enabled_light_count
    }

    /// Length of the packed cullable arrays, including disabled and free slots.
    pub fn cullable_light_count(&self) -> u32 {
        self.cullable_lights.len() as u32
    }

    /// Number of enabled directional lights.
    pub fn non_cullable_light_count(&self) -> u32 {
        self.non_cullable_owners
            .iter()
            .flatten()
            .filter(|id| self.owners.get(**id).is_some_and(|owner| owner.enabled))
            .count() as u32
    }

    /// Number of live lights of every kind.
    pub fn light_count(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn contains(&self, id: LightId) -> bool {
        self.owners.contains(id)
    }

    pub fn kind(&self, id: LightId) -> LightKind {
        self.owner(id).kind
    }

    pub fn is_enabled(&self, id: LightId) -> bool {
        self.owner(id).enabled
    }

    /// Current slot of a light in its kind's packed array. `None` for ambient.
    pub fn data_index(&self, id: LightId) -> Option<u32> {
        let index = self.owner(id).data_index;
        (index != NO_DATA_INDEX).then_some(index)
    }

    /// Owner of a cullable slot, `None` when the slot is free.
    pub fn cullable_owner_at(&self, index: usize) -> Option<LightId> {
        self.cullable_owners.get(index).copied().flatten()
    }

    /// Verifies the packing and index-consistency invariants.
    pub fn check_invariants(&self) -> Result<(), String> {
        let len = self.cullable_lights.len();
        let parallel = [
            self.culling_infos.len(),
            self.bounding_spheres.len(),
            self.cullable_entity_ids.len(),
            self.cullable_owners.len(),
            self.dirty_bits.len(),
            self.stale_transforms.len(),
        ];
        if parallel.iter().any(|&l| l != len) {
            return Err(format!("parallel arrays out of sync: {len} vs {parallel:?}"));
        }

        let count = self.enabled_light_count as usize;
        if count > len {
            return Err(format!("enabled count {count} exceeds array length {len}"));
        }

        for (index, slot) in self.cullable_owners.iter().enumerate() {
            match (slot, index < count) {
                (None, true) => return Err(format!("free slot {index} inside enabled prefix")),
                (None, false) => {}
                (Some(id), in_prefix) => {
                    let owner = self
                        .owners
                        .get(*id)
                        .ok_or_else(|| format!("slot {index} points at a dead owner {id:?}"))?;
                    if owner.enabled != in_prefix {
                        return Err(format!(
                            "slot {index}: enabled={} but prefix={in_prefix}",
                            owner.enabled
                        ));
                    }
                    if owner.data_index as usize != index {
                        return Err(format!(
                            "owner {id:?} says slot {} but lives in {index}",
                            owner.data_index
                        ));
                    }
                }
            }
        }

        for (id, owner) in self.owners.iter() {
            let index = owner.data_index as usize;
            let back_ref = match owner.kind {
                LightKind::Point | LightKind::Spot => self.cullable_owners.get(index),
                LightKind::Directional => self.non_cullable_owners.get(index),
                LightKind::Ambient => continue,
            };
            if back_ref != Some(&Some(id)) {
                return Err(format!("owner {id:?} is not referenced by its slot {index}"));
            }
        }

        Ok(())
    }

    // --- helpers ---

    fn owner(&self, id: LightId) -> &LightOwner {
        match self.owners.get(id) {
            Some(owner) => owner,
            None => panic!("invalid or removed light id {id:?}"),
        }
    }

    fn owner_mut(&mut self, id: LightId) -> &mut LightOwner {
        match self.owners.get_mut(id) {
            Some(owner) => owner,
            None => panic!("invalid or removed light id {id:?}"),
        }
    }

    fn slot_kind(&self, index: usize) -> Option<LightKind> {
        let id = self.cullable_owners.get(index).copied().flatten()?;
        self.owners.get(id).map(|owner| owner.kind)
    }

    fn ambient_ref(&self) -> &AmbientLight {
        match self.ambient.as_ref() {
            Some(ambient) => ambient,
            None => panic!("light set has no ambient light"),
        }
    }

    fn ambient_mut(&mut self) -> &mut AmbientLight {
        match self.ambient.as_mut() {
            Some(ambient) => ambient,
            None => panic!("light set has no ambient light"),
        }
    }
}
