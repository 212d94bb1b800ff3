// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Incremental joins agree with joins recomputed from scratch.

use proptest::prelude::*;
use zf_circuit::{Circuit, OperatorKind};
use zf_expr::{Closure, Param, ScalarExpr};
use zf_repr::{Datum, Diff, RelationType, Row, ScalarType, ZSet};
use zf_simulator::{Deltas, Simulator};

fn typ() -> RelationType {
    RelationType::new(vec![
        ScalarType::Int32.nullable(true),
        ScalarType::Int32.nullable(false),
    ])
}

/// `l JOIN r ON l.0 = r.0`, producing `(l.1, r.1)`.
fn join_circuit() -> Circuit {
    let typ = typ();
    let mut circuit = Circuit::new();
    let mut inputs = vec![];
    for name in ["l", "r"] {
        inputs.push(
            circuit
                .add(OperatorKind::Source {
                    name: name.into(),
                    typ: typ.clone(),
                })
                .unwrap(),
        );
    }
    let t = ScalarExpr::var("t", typ.record_type());
    let key = Closure::over_tuple("t", &typ, ScalarExpr::tuple(vec![t.field(0).unwrap()]));
    let (k, l, r) = (
        Param::new("k", key.output_type().clone()),
        Param::new("l", typ.record_type()),
        Param::new("r", typ.record_type()),
    );
    let output = Closure::new(
        vec![k, l.clone(), r.clone()],
        ScalarExpr::tuple(vec![l.var().field(1).unwrap(), r.var().field(1).unwrap()]),
    );
    let join = circuit
        .add(OperatorKind::Join {
            left: inputs[0],
            right: inputs[1],
            left_key: key.clone(),
            right_key: key,
            output,
            gc: None,
        })
        .unwrap();
    circuit
        .add(OperatorKind::Sink {
            input: join,
            name: "j".into(),
        })
        .unwrap();
    circuit
}

/// The join of two complete collections, by nested loops.
fn join(left: &ZSet, right: &ZSet) -> ZSet {
    let mut out = ZSet::new();
    for (l, ldiff) in left.iter() {
        for (r, rdiff) in right.iter() {
            if !l[0].is_null() && l[0] == r[0] {
                out.update(Row::new(vec![l[1].clone(), r[1].clone()]), ldiff * rdiff);
            }
        }
    }
    out
}

fn zset() -> impl Strategy<Value = ZSet> {
    let row = (prop::option::of(0..4i32), 0..3i32).prop_map(|(key, value)| {
        Row::new(vec![key.map_or(Datum::Null, Datum::Int32), Datum::Int32(value)])
    });
    prop::collection::vec((row, -2..3 as Diff), 0..8).prop_map(|updates| updates.into_iter().collect())
}

fn deltas(l: &ZSet, r: &ZSet) -> Deltas {
    [("l".to_string(), l.clone()), ("r".to_string(), r.clone())].into()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[zf_ore::test]
    fn incremental_join_matches_recomputation(
        a in zset(),
        b in zset(),
        da in zset(),
        db in zset(),
    ) {
        let mut sim = Simulator::new(join_circuit()).unwrap();
        let first = sim.step(deltas(&a, &b)).unwrap();
        prop_assert_eq!(&first["j"], &join(&a, &b));

        let second = sim.step(deltas(&da, &db)).unwrap();
        let expected = join(&a.plus(&da), &b.plus(&db)).minus(&join(&a, &b));
        prop_assert_eq!(&second["j"], &expected);

        // No change in, no change out.
        let third = sim.step(Deltas::new()).unwrap();
        prop_assert!(third["j"].is_empty());
    }
}
