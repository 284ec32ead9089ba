//! Property-based tests (proptest) over values, the pickle codec, and the
//! type lattice.
//!
//! Collections carry interned member-type handles, and handle identity is
//! per-manager, so every strategy and assertion here shares one
//! thread-local manager — the same discipline the engine's per-context
//! ownership model imposes.

use proptest::prelude::*;

use provql::{pickle, unpickle, Datatype, TypeManager, Value};

thread_local! {
    static TM: TypeManager = TypeManager::new();
}

/// Generator for picklable values, bounded in depth and width.
fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Nil),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::Int),
        // finite, non-NaN floats only; NaN has no wire form
        prop::num::f64::NORMAL.prop_map(Value::Float),
        Just(Value::Float(0.0)),
        "[a-z0-9 ]{0,12}".prop_map(Value::string),
        (any::<i16>(), any::<u32>(), any::<u32>())
            .prop_map(|(d, o, s)| Value::struct_(d as i32, o as u64, s as u64)),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(|vs| {
                if vs.len() == 1 {
                    // an arity-1 tuple cannot exist; widen it
                    Value::Tuple(vec![vs.into_iter().next().unwrap(), Value::Nil])
                } else {
                    Value::Tuple(vs)
                }
            }),
            prop::collection::vec(inner.clone(), 0..4).prop_map(|vs| {
                TM.with(|tm| {
                    let mut elem = tm.bottom();
                    for v in &vs {
                        elem = tm.generalize(&elem, &v.datatype(tm));
                    }
                    Value::Set { elem, members: vs }
                })
            }),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(l, e, r)| Value::pathelement(l, e, r)),
        ]
    })
}

proptest! {
    #[test]
    fn clone_is_identical_and_independent(v in arb_value()) {
        let c = v.clone();
        prop_assert!(v.identical(&c));
        prop_assert!(v.eq_value(&c));
    }

    #[test]
    fn pickle_roundtrips_identically(v in arb_value()) {
        let blob = pickle(&v).unwrap();
        let back = TM.with(|tm| unpickle(tm, &blob)).unwrap();
        prop_assert!(back.identical(&v), "{} != {}", back, v);
    }

    #[test]
    fn eq_is_reflexive(v in arb_value()) {
        prop_assert!(v.eq_value(&v));
    }

    #[test]
    fn eq_is_symmetric(a in arb_value(), b in arb_value()) {
        prop_assert_eq!(a.eq_value(&b), b.eq_value(&a));
    }

    #[test]
    fn identical_implies_eq(a in arb_value(), b in arb_value()) {
        if a.identical(&b) {
            prop_assert!(a.eq_value(&b));
        }
    }

    #[test]
    fn compare_is_antisymmetric_and_reflexive(a in arb_value(), b in arb_value()) {
        use std::cmp::Ordering;
        match a.compare(&b) {
            Ordering::Less => prop_assert_eq!(b.compare(&a), Ordering::Greater),
            Ordering::Greater => prop_assert_eq!(b.compare(&a), Ordering::Less),
            Ordering::Equal => prop_assert_eq!(b.compare(&a), Ordering::Equal),
        }
        prop_assert_eq!(a.compare(&a), Ordering::Equal);
    }

    #[test]
    fn truncated_pickles_never_roundtrip(v in arb_value()) {
        let blob = pickle(&v).unwrap();
        if blob.len() > 6 {
            // a strict prefix of the body must be rejected
            let cut = blob.len() - 1;
            prop_assert!(TM.with(|tm| unpickle(tm, &blob[..cut])).is_err());
        }
    }
}

// ----------------------------------------------------------------------------
// lattice properties

fn sample_types(tm: &TypeManager) -> Vec<Datatype> {
    vec![
        tm.bottom(),
        tm.unit(),
        tm.boolean(),
        tm.int(),
        tm.double(),
        tm.string(),
        tm.struct_(),
        tm.pathelement(),
        tm.distinguisher(),
        tm.dbedge(),
        tm.number(),
        tm.atom(),
        tm.dbobj(),
        tm.top(),
        tm.set(tm.int()),
        tm.set(tm.atom()),
        tm.sequence(tm.string()),
        tm.tuple_specific(&[tm.int(), tm.string()]),
        tm.tuple_specific(&[tm.number(), tm.struct_()]),
        tm.lambda(tm.int(), tm.boolean()),
    ]
}

#[test]
fn lattice_identities_hold_everywhere() {
    let tm = TypeManager::new();
    for t in sample_types(&tm) {
        assert_eq!(tm.generalize(&t, &tm.bottom()), t);
        assert_eq!(tm.generalize(&t, &tm.top()), tm.top());
        assert_eq!(tm.specialize(&t, &tm.bottom()), Some(tm.bottom()));
        assert_eq!(tm.specialize(&t, &tm.top()), Some(t.clone()));
    }
}

#[test]
fn lattice_ops_commute_and_are_idempotent() {
    let tm = TypeManager::new();
    let types = sample_types(&tm);
    for a in &types {
        assert_eq!(tm.generalize(a, a), *a);
        assert_eq!(tm.specialize(a, a), Some(a.clone()));
        for b in &types {
            assert_eq!(tm.generalize(a, b), tm.generalize(b, a));
            assert_eq!(tm.specialize(a, b), tm.specialize(b, a));
            // the join is an upper bound: specializing it against either
            // argument gives that argument back
            let j = tm.generalize(a, b);
            assert_eq!(tm.specialize(&j, a), Some(a.clone()));
            assert_eq!(tm.specialize(&j, b), Some(b.clone()));
        }
    }
}
