use lumen_core::{Transform, TransformStore};
use lumen_lights::{LightId, LightInitInfo, LightParameter, LightSet};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    AddPoint { enabled: bool },
    AddSpot { enabled: bool },
    AddDirectional,
    Remove(usize),
    Enable(usize, bool),
    Intensity(usize, f32),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<bool>().prop_map(|enabled| Op::AddPoint { enabled }),
        2 => any::<bool>().prop_map(|enabled| Op::AddSpot { enabled }),
        1 => Just(Op::AddDirectional),
        2 => any::<usize>().prop_map(Op::Remove),
        4 => (any::<usize>(), any::<bool>()).prop_map(|(i, e)| Op::Enable(i, e)),
        1 => (any::<usize>(), -5.0f32..5.0).prop_map(|(i, v)| Op::Intensity(i, v)),
    ]
}

fn apply(set: &mut LightSet, store: &mut TransformStore, live: &mut Vec<LightId>, op: &Op) {
    match *op {
        Op::AddPoint { enabled } => {
            let e = store.spawn(Transform::from_xyz(live.len() as f32, 0.0, 0.0));
            live.push(set.add(&LightInitInfo::point(e, 2.0).with_enabled(enabled), store));
        }
        Op::AddSpot { enabled } => {
            let e = store.spawn(Transform::default());
            let info = LightInitInfo::spot(e, 3.0, 0.3, 0.6).with_enabled(enabled);
            live.push(set.add(&info, store));
        }
        Op::AddDirectional => {
            let e = store.spawn(Transform::default());
            live.push(set.add(&LightInitInfo::directional(e), store));
        }
        Op::Remove(i) if !live.is_empty() => {
            let id = live.swap_remove(i % live.len());
            set.remove(id);
        }
        Op::Enable(i, enabled) if !live.is_empty() => {
            set.enable(live[i % live.len()], enabled);
        }
        Op::Intensity(i, v) if !live.is_empty() => {
            set.set_parameter(live[i % live.len()], LightParameter::Intensity(v));
        }
        _ => {}
    }
}

proptest! {
    // Packing + index consistency hold after every operation
    #[test]
    fn packing_invariant_holds(ops in prop::collection::vec(arb_op(), 1..80)) {
        let mut store = TransformStore::new();
        let mut set = LightSet::new(3);
        let mut live = Vec::new();

        for op in &ops {
            apply(&mut set, &mut store, &mut live, op);
            if let Err(msg) = set.check_invariants() {
                prop_assert!(false, "after {:?}: {}", op, msg);
            }
        }

        let enabled_cullable = live
            .iter()
            .filter(|id| set.kind(**id).is_cullable() && set.is_enabled(**id))
            .count() as u32;
        prop_assert_eq!(set.enabled_light_count(), enabled_cullable);

        for index in 0..set.enabled_light_count() as usize {
            let owner = set.cullable_owner_at(index);
            prop_assert!(owner.is_some());
            prop_assert_eq!(set.data_index(owner.unwrap()), Some(index as u32));
        }
    }

    // Enabling twice is the same as enabling once
    #[test]
    fn double_enable_is_noop(ops in prop::collection::vec(arb_op(), 1..40), pick in any::<usize>()) {
        let mut store = TransformStore::new();
        let mut set = LightSet::new(2);
        let mut live = Vec::new();
        for op in &ops {
            apply(&mut set, &mut store, &mut live, op);
        }
        prop_assume!(!live.is_empty());
        let id = live[pick % live.len()];

        set.enable(id, true);
        let count = set.enabled_light_count();
        let lights = set.cullable_lights().to_vec();
        set.enable(id, true);
        prop_assert_eq!(set.enabled_light_count(), count);
        prop_assert_eq!(set.cullable_lights(), lights.as_slice());
    }
}
