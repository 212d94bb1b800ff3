// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Merges operators that compute the same collection.

use std::collections::BTreeMap;

use zf_circuit::equivalence::shallow_equivalent;
use zf_circuit::{Circuit, OperatorId, OperatorKind};
use zf_expr::EquivalenceContext;

use crate::TransformError;

/// Merges operators that compute the same collection.
///
/// Two operators are merged if they consume the same operators and are
/// equivalent otherwise. The consumers of the later one are redirected to
/// the earlier one. Declared inputs and outputs are never merged, and
/// neither are operators that call non-deterministic or side-effecting
/// functions.
#[derive(Debug)]
pub struct Cse;

impl crate::Transform for Cse {
    #[tracing::instrument(
        target = "optimizer",
        level = "trace",
        skip_all,
        fields(path.segment = "cse")
    )]
    fn transform(&self, circuit: &mut Circuit) -> Result<(), TransformError> {
        let mut merged = 0;
        crate::try_visit_circuits(circuit, &mut |circuit, roots| {
            merged += self.action(circuit, roots)?;
            Ok(())
        })?;
        tracing::debug!(target: "optimizer", merged, "merged common subexpressions");
        crate::trace_circuit(circuit);
        Ok(())
    }
}

impl Cse {
    /// Merges the duplicate operators of `circuit`, except those in
    /// `roots`. Returns the number of merged operators.
    pub fn action(&self, circuit: &mut Circuit, roots: &[OperatorId]) -> Result<usize, TransformError> {
        let mut cx = EquivalenceContext::new();
        // Candidates by kind and dependencies.
        let mut seen: BTreeMap<(&'static str, Vec<OperatorId>), Vec<OperatorId>> = BTreeMap::new();
        let mut merged = 0;
        for id in circuit.ids() {
            let Some(op) = circuit.get(id) else {
                continue;
            };
            let mergeable = !matches!(
                op.kind,
                OperatorKind::Source { .. }
                    | OperatorKind::Sink { .. }
                    | OperatorKind::IterationVariable { .. }
            ) && op.kind.is_pure()
                && !op.kind.has_side_effects();
            if !mergeable {
                continue;
            }
            let key = (op.kind.name(), op.kind.dependencies());
            let mut duplicate_of = None;
            for other in seen.get(&key).into_iter().flatten() {
                let Some(other_op) = circuit.get(*other) else {
                    continue;
                };
                if shallow_equivalent(&mut cx, other_op, op)? {
                    duplicate_of = Some(*other);
                    break;
                }
            }
            match duplicate_of {
                Some(other) if !roots.contains(&id) => {
                    tracing::trace!(target: "optimizer", %id, %other, "merging");
                    circuit.redirect(id, other)?;
                    circuit.remove(id)?;
                    merged += 1;
                }
                _ => seen.entry(key).or_default().push(id),
            }
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use zf_expr::{BuiltinFunc, Closure, ScalarExpr};
    use zf_repr::ScalarType;

    use crate::test_util::*;
    use crate::Transform;

    use super::*;

    #[zf_ore::test]
    fn identical_filters_are_merged() {
        let mut circuit = Circuit::new();
        let typ = typ();
        let t = source(&mut circuit, "t");
        let first = circuit
            .add(OperatorKind::Filter {
                input: t,
                predicate: greater_than(&typ, 1),
            })
            .unwrap();
        let second = circuit
            .add(OperatorKind::Filter {
                input: t,
                predicate: greater_than(&typ, 1).deep_copy().unwrap(),
            })
            .unwrap();
        let map = circuit
            .add(OperatorKind::Map {
                input: second,
                func: swap(&typ),
            })
            .unwrap();
        let v1 = sink(&mut circuit, first, "v1");
        let v2 = sink(&mut circuit, map, "v2");
        Cse.transform(&mut circuit).unwrap();
        assert!(!circuit.contains(second));
        assert_eq!(circuit.get(map).unwrap().kind.inputs(), vec![first]);
        assert_eq!(circuit.get(v1).unwrap().kind.inputs(), vec![first]);
        assert_eq!(circuit.get(v2).unwrap().kind.inputs(), vec![map]);
        circuit.validate().unwrap();
    }

    #[zf_ore::test]
    fn merges_cascade_to_consumers() {
        let mut circuit = Circuit::new();
        let typ = typ();
        let t = source(&mut circuit, "t");
        let mut ends = vec![];
        for _ in 0..2 {
            let filter = circuit
                .add(OperatorKind::Filter {
                    input: t,
                    predicate: greater_than(&typ, 1),
                })
                .unwrap();
            ends.push(
                circuit
                    .add(OperatorKind::Map {
                        input: filter,
                        func: swap(&typ),
                    })
                    .unwrap(),
            );
        }
        sink(&mut circuit, ends[0], "v1");
        sink(&mut circuit, ends[1], "v2");
        Cse.transform(&mut circuit).unwrap();
        assert_eq!(kinds(&circuit), vec!["Source", "Filter", "Map", "Sink", "Sink"]);
    }

    #[zf_ore::test]
    fn different_predicates_and_sinks_are_kept() {
        let mut circuit = Circuit::new();
        let typ = typ();
        let t = source(&mut circuit, "t");
        for bound in [1, 2] {
            circuit
                .add(OperatorKind::Filter {
                    input: t,
                    predicate: greater_than(&typ, bound),
                })
                .unwrap();
        }
        sink(&mut circuit, t, "v1");
        sink(&mut circuit, t, "v2");
        let before = circuit.clone();
        Cse.transform(&mut circuit).unwrap();
        assert_eq!(circuit, before);
    }

    #[zf_ore::test]
    fn non_deterministic_operators_are_kept() {
        let mut circuit = Circuit::new();
        let typ = typ();
        let t = source(&mut circuit, "t");
        let random = || {
            let r = ScalarExpr::apply(BuiltinFunc::Random, vec![]).unwrap();
            let half = ScalarExpr::literal_ok(0.5f64.into(), ScalarType::Float64).unwrap();
            Closure::over_tuple("t", &typ, r.call_binary(&half, zf_expr::BinaryFunc::Lt).unwrap())
        };
        for _ in 0..2 {
            circuit
                .add(OperatorKind::Filter {
                    input: t,
                    predicate: random(),
                })
                .unwrap();
        }
        let before = circuit.clone();
        Cse.transform(&mut circuit).unwrap();
        assert_eq!(circuit, before);
    }
}
