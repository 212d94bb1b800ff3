// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! A reference interpreter for incremental dataflow circuits.
//!
//! The [`Simulator`] executes a [`Circuit`] one step at a time. Each step
//! consumes a delta for some of the declared inputs and produces a delta
//! for every declared output. Stateful operators keep exactly the state
//! needed to turn input deltas into output deltas; fixpoints are evaluated
//! naively, from an empty iteration variable, and fail once they exceed
//! their iteration bound.
//!
//! The simulator favors evaluation that is obviously correct over speed.
//! It is used to check the lowering and the optimizer against each other.

#![warn(missing_debug_implementations)]

use std::collections::BTreeMap;

use zf_circuit::{Circuit, CircuitError, OperatorId, OperatorKind};
use zf_expr::EvalError;
use zf_repr::{Datum, ZSet};

mod state;

use crate::state::State;

/// Deltas of named collections: the inputs or the outputs of a step.
pub type Deltas = BTreeMap<String, ZSet>;

/// An error raised while executing a circuit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulatorError {
    #[error("unknown input {0}")]
    UnknownInput(String),
    #[error("input {input} received {row}, which is not of type {typ}")]
    InvalidInput {
        input: String,
        row: String,
        typ: String,
    },
    #[error("evaluation failed in operator {operator}: {source}")]
    Eval {
        operator: OperatorId,
        source: EvalError,
    },
    #[error("fixpoint {operator} did not converge within {limit} iterations")]
    IterationLimit { operator: OperatorId, limit: usize },
    #[error("internal simulator error: {0}")]
    Internal(String),
    #[error(transparent)]
    Circuit(#[from] CircuitError),
}

/// Executes a circuit step by step.
#[derive(Debug)]
pub struct Simulator {
    circuit: Circuit,
    state: BTreeMap<OperatorId, State>,
    steps: u64,
}

impl Simulator {
    /// Prepares the execution of `circuit`, which must be valid.
    pub fn new(circuit: Circuit) -> Result<Simulator, SimulatorError> {
        circuit.validate()?;
        Ok(Simulator {
            circuit,
            state: BTreeMap::new(),
            steps: 0,
        })
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    /// The number of steps executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Executes one step. Inputs without a delta receive the empty delta,
    /// and every output is reported, even if its delta is empty.
    pub fn step(&mut self, inputs: Deltas) -> Result<Deltas, SimulatorError> {
        for (name, delta) in &inputs {
            let id = self
                .circuit
                .source(name)
                .ok_or_else(|| SimulatorError::UnknownInput(name.clone()))?;
            let typ = self.circuit.typ(id)?;
            for (row, _) in delta.iter() {
                let conforms = row.len() == typ.arity()
                    && row
                        .iter()
                        .zip(&typ.column_types)
                        .all(|(datum, column)| datum.is_instance_of(column));
                if !conforms {
                    return Err(SimulatorError::InvalidInput {
                        input: name.clone(),
                        row: row.to_string(),
                        typ: typ.to_string(),
                    });
                }
            }
        }

        let bindings = Bindings {
            sources: &inputs,
            imports: &[],
            variable: None,
        };
        let mut deltas = evaluate(&self.circuit, &mut self.state, &bindings)?;
        let mut outputs = Deltas::new();
        for (id, name) in self.circuit.sinks() {
            outputs.insert(name.to_string(), deltas.remove(&id).unwrap_or_default());
        }
        tracing::debug!(
            step = self.steps,
            inputs = inputs.values().map(ZSet::len).sum::<usize>(),
            outputs = outputs.values().map(ZSet::len).sum::<usize>(),
            state = self.state_size(),
            "executed step"
        );
        self.steps += 1;
        Ok(outputs)
    }

    /// The number of rows held in the state of all operators.
    pub fn state_size(&self) -> usize {
        self.state.values().map(State::size).sum()
    }

    /// The number of rows held in the state of operator `id`.
    pub fn operator_state_size(&self, id: OperatorId) -> usize {
        self.state.get(&id).map_or(0, State::size)
    }

    /// The current value of watermark operator `id`, if it has seen a row.
    pub fn watermark(&self, id: OperatorId) -> Option<&Datum> {
        self.state.get(&id).and_then(State::watermark)
    }
}

/// What the leaves of a circuit read in a step.
struct Bindings<'a> {
    sources: &'a Deltas,
    /// For fixpoint bodies, the full contents of the imports.
    imports: &'a [ZSet],
    /// For fixpoint bodies, the value of the iteration variable.
    variable: Option<&'a ZSet>,
}

/// Computes the delta of every operator of `circuit`, updating `states`.
fn evaluate(
    circuit: &Circuit,
    states: &mut BTreeMap<OperatorId, State>,
    bindings: &Bindings,
) -> Result<BTreeMap<OperatorId, ZSet>, SimulatorError> {
    let mut deltas: BTreeMap<OperatorId, ZSet> = BTreeMap::new();
    for (id, op) in circuit.iter() {
        let input = |input: &OperatorId| {
            deltas.get(input).ok_or_else(|| {
                SimulatorError::Internal(format!("{} reads {} before it ran", id, input))
            })
        };
        let eval_error = |source| SimulatorError::Eval {
            operator: id,
            source,
        };
        let delta = match &op.kind {
            OperatorKind::Source { name, .. } => {
                bindings.sources.get(name).cloned().unwrap_or_default()
            }
            OperatorKind::Constant { rows, .. } => match states.get(&id) {
                Some(_) => ZSet::new(),
                None => {
                    states.insert(id, State::Emitted);
                    rows.clone()
                }
            },
            OperatorKind::Map { input: i, func } => {
                let mut out = ZSet::new();
                for (row, diff) in input(i)?.iter() {
                    out.update(func.map_row(row).map_err(eval_error)?, diff);
                }
                out
            }
            OperatorKind::Filter { input: i, predicate } => {
                let mut out = ZSet::new();
                for (row, diff) in input(i)?.iter() {
                    if predicate.call_row(row).map_err(eval_error)? == Datum::True {
                        out.update(row.clone(), diff);
                    }
                }
                out
            }
            OperatorKind::FilterMap {
                input: i,
                predicate,
                func,
            } => {
                let mut out = ZSet::new();
                for (row, diff) in input(i)?.iter() {
                    if predicate.call_row(row).map_err(eval_error)? == Datum::True {
                        out.update(func.map_row(row).map_err(eval_error)?, diff);
                    }
                }
                out
            }
            OperatorKind::Negate { input: i } => -input(i)?.clone(),
            OperatorKind::Union { inputs } => {
                let mut out = ZSet::new();
                for i in inputs {
                    out += input(i)?;
                }
                out
            }
            OperatorKind::Sink { input: i, .. } => input(i)?.clone(),
            OperatorKind::Import { index, .. } => bindings
                .imports
                .get(*index)
                .cloned()
                .ok_or_else(|| SimulatorError::Internal(format!("{} reads a missing import", id)))?,
            OperatorKind::IterationVariable { .. } => bindings
                .variable
                .cloned()
                .ok_or_else(|| SimulatorError::Internal(format!("{} outside of a fixpoint", id)))?,
            OperatorKind::Join {
                left,
                right,
                left_key,
                right_key,
                output,
                gc,
            } => {
                let (left, right) = (input(left)?, input(right)?);
                let watermarks = gc.map(|gc| {
                    (
                        state::watermark_of(states, gc.left),
                        state::watermark_of(states, gc.right),
                        gc.column,
                    )
                });
                let join = states
                    .entry(id)
                    .or_insert_with(|| State::Join(Default::default()))
                    .as_join(id)?;
                let out = join
                    .step(left, right, left_key, right_key, output)
                    .map_err(eval_error)?;
                if let Some((left, right, column)) = watermarks {
                    join.collect(left.as_ref(), right.as_ref(), column, id);
                }
                out
            }
            OperatorKind::Aggregate {
                input: i,
                key,
                aggregates,
                gc,
            } => {
                let delta = input(i)?;
                let watermark = gc.map(|gc| (state::watermark_of(states, gc.watermark), gc.column));
                let aggregate = states
                    .entry(id)
                    .or_insert_with(|| State::Aggregate(Default::default()))
                    .as_aggregate(id)?;
                let out = aggregate.step(delta, key, aggregates).map_err(eval_error)?;
                if let Some((Some(watermark), column)) = watermark {
                    aggregate.collect(&watermark, column, id);
                }
                out
            }
            OperatorKind::Distinct { input: i, gc } => {
                let delta = input(i)?;
                let watermark = gc.map(|gc| (state::watermark_of(states, gc.watermark), gc.column));
                let distinct = states
                    .entry(id)
                    .or_insert_with(|| State::Distinct(Default::default()))
                    .as_distinct(id)?;
                let out = distinct.step(delta);
                if let Some((Some(watermark), column)) = watermark {
                    distinct.collect(&watermark, column, id);
                }
                out
            }
            OperatorKind::Watermark {
                input: i,
                column,
                lateness,
            } => {
                let delta = input(i)?;
                states
                    .entry(id)
                    .or_insert_with(|| State::Watermark(Default::default()))
                    .as_watermark(id)?
                    .step(delta, *column, lateness, id)
            }
            OperatorKind::Fixpoint(fixpoint) => {
                let imports = fixpoint
                    .imports
                    .iter()
                    .map(|i| input(i).cloned())
                    .collect::<Result<Vec<_>, _>>()?;
                states
                    .entry(id)
                    .or_insert_with(|| State::Fixpoint(Default::default()))
                    .as_fixpoint(id)?
                    .step(fixpoint, imports, id)?
            }
        };
        if !delta.is_empty() {
            tracing::trace!(%id, operator = op.kind.name(), rows = delta.len(), "delta");
        }
        deltas.insert(id, delta);
    }
    Ok(deltas)
}

#[cfg(test)]
mod tests {
    use zf_circuit::{FixpointOperator, JoinGc, StateGc};
    use zf_expr::{AggregateExpr, AggregateFunc, BinaryFunc, Closure, Param, ScalarExpr};
    use zf_repr::{Diff, RelationType, Row, ScalarType};

    use super::*;

    fn pair_type() -> RelationType {
        RelationType::new(vec![
            ScalarType::Int64.nullable(false),
            ScalarType::Int64.nullable(false),
        ])
    }

    fn pair(a: i64, b: i64) -> Row {
        Row::new(vec![Datum::Int64(a), Datum::Int64(b)])
    }

    fn source(circuit: &mut Circuit, name: &str, typ: &RelationType) -> OperatorId {
        circuit
            .add(OperatorKind::Source {
                name: name.into(),
                typ: typ.clone(),
            })
            .unwrap()
    }

    fn sink(circuit: &mut Circuit, input: OperatorId, name: &str) {
        circuit
            .add(OperatorKind::Sink {
                input,
                name: name.into(),
            })
            .unwrap();
    }

    /// `|t| (t.index)`
    fn column(typ: &RelationType, index: usize) -> Closure {
        let t = ScalarExpr::var("t", typ.record_type());
        Closure::over_tuple("t", typ, ScalarExpr::tuple(vec![t.field(index).unwrap()]))
    }

    fn inputs(name: &str, rows: Vec<(Row, Diff)>) -> Deltas {
        [(name.to_string(), rows.into_iter().collect())].into()
    }

    #[zf_ore::test]
    fn distinct_emits_membership_changes() {
        let typ = pair_type();
        let mut circuit = Circuit::new();
        let t = source(&mut circuit, "t", &typ);
        let distinct = circuit.add(OperatorKind::Distinct { input: t, gc: None }).unwrap();
        sink(&mut circuit, distinct, "v");
        let mut sim = Simulator::new(circuit).unwrap();

        let out = sim.step(inputs("t", vec![(pair(1, 1), 2)])).unwrap();
        assert_eq!(out["v"], ZSet::singleton(pair(1, 1), 1));
        let out = sim.step(inputs("t", vec![(pair(1, 1), -1)])).unwrap();
        assert!(out["v"].is_empty());
        let out = sim.step(inputs("t", vec![(pair(1, 1), -1)])).unwrap();
        assert_eq!(out["v"], ZSet::singleton(pair(1, 1), -1));
    }

    #[zf_ore::test]
    fn negation_is_never_clamped() {
        let typ = pair_type();
        let mut circuit = Circuit::new();
        let t = source(&mut circuit, "t", &typ);
        let negated = circuit.add(OperatorKind::Negate { input: t }).unwrap();
        let union = circuit
            .add(OperatorKind::Union {
                inputs: vec![t, negated],
            })
            .unwrap();
        sink(&mut circuit, negated, "negated");
        sink(&mut circuit, union, "cancelled");
        let mut sim = Simulator::new(circuit).unwrap();
        let out = sim.step(inputs("t", vec![(pair(1, 2), -3)])).unwrap();
        assert_eq!(out["negated"], ZSet::singleton(pair(1, 2), 3));
        assert!(out["cancelled"].is_empty());
    }

    #[zf_ore::test]
    fn aggregates_retract_and_insert_group_results() {
        let typ = pair_type();
        let mut circuit = Circuit::new();
        let t = source(&mut circuit, "t", &typ);
        let t_var = ScalarExpr::var("t", typ.record_type());
        let value = Closure::over_tuple("t", &typ, t_var.field(1).unwrap());
        let aggregate = circuit
            .add(OperatorKind::Aggregate {
                input: t,
                key: column(&typ, 0),
                aggregates: vec![
                    AggregateExpr::new(AggregateFunc::Count, value.clone(), false).unwrap(),
                    AggregateExpr::new(AggregateFunc::Sum, value, false).unwrap(),
                ],
                gc: None,
            })
            .unwrap();
        sink(&mut circuit, aggregate, "v");
        let mut sim = Simulator::new(circuit).unwrap();
        let result = |k, count, sum| Row::new(vec![Datum::Int64(k), Datum::Int64(count), Datum::Int64(sum)]);

        let out = sim.step(inputs("t", vec![(pair(1, 10), 1), (pair(1, 20), 1)])).unwrap();
        assert_eq!(out["v"], ZSet::singleton(result(1, 2, 30), 1));

        let out = sim.step(inputs("t", vec![(pair(1, 5), 1), (pair(2, 7), 1)])).unwrap();
        let expected: ZSet = vec![
            (result(1, 2, 30), -1),
            (result(1, 3, 35), 1),
            (result(2, 1, 7), 1),
        ]
        .into_iter()
        .collect();
        assert_eq!(out["v"], expected);

        // A group that becomes empty is only retracted.
        let out = sim
            .step(inputs(
                "t",
                vec![(pair(1, 5), -1), (pair(1, 10), -1), (pair(1, 20), -1)],
            ))
            .unwrap();
        assert_eq!(out["v"], ZSet::singleton(result(1, 3, 35), -1));

        // Changes that leave the result alone produce nothing.
        let out = sim.step(inputs("t", vec![(pair(2, 7), 1), (pair(2, 7), -1)])).unwrap();
        assert!(out["v"].is_empty());
    }

    /// The transitive closure of `edges`, with the given iteration bound.
    fn reachability(max_iterations: usize) -> Circuit {
        let typ = pair_type();
        let mut circuit = Circuit::new();
        let edges = source(&mut circuit, "edges", &typ);
        let mut body = Circuit::new();
        let import = body
            .add(OperatorKind::Import {
                index: 0,
                typ: typ.clone(),
            })
            .unwrap();
        let variable = body
            .add(OperatorKind::IterationVariable { typ: typ.clone() })
            .unwrap();
        let key = column(&typ, 0);
        let (k, l, r) = (
            Param::new("k", key.output_type().clone()),
            Param::new("l", typ.record_type()),
            Param::new("r", typ.record_type()),
        );
        let output = Closure::new(
            vec![k, l.clone(), r.clone()],
            ScalarExpr::tuple(vec![l.var().field(0).unwrap(), r.var().field(1).unwrap()]),
        );
        let step = body
            .add(OperatorKind::Join {
                left: variable,
                right: import,
                left_key: column(&typ, 1),
                right_key: key,
                output,
                gc: None,
            })
            .unwrap();
        let union = body
            .add(OperatorKind::Union {
                inputs: vec![import, step],
            })
            .unwrap();
        let result = body.add(OperatorKind::Distinct { input: union, gc: None }).unwrap();
        let fixpoint = circuit
            .add(OperatorKind::Fixpoint(Box::new(FixpointOperator {
                imports: vec![edges],
                body,
                variable,
                result,
                max_iterations,
            })))
            .unwrap();
        sink(&mut circuit, fixpoint, "reach");
        circuit
    }

    #[zf_ore::test]
    fn fixpoints_iterate_to_convergence() {
        let mut sim = Simulator::new(reachability(10)).unwrap();
        let chain = vec![(pair(1, 2), 1), (pair(2, 3), 1), (pair(3, 4), 1)];
        let out = sim.step(inputs("edges", chain)).unwrap();
        let expected = ZSet::from_rows(vec![
            pair(1, 2),
            pair(1, 3),
            pair(1, 4),
            pair(2, 3),
            pair(2, 4),
            pair(3, 4),
        ]);
        assert_eq!(out["reach"], expected);

        // Removing an edge retracts the paths through it.
        let out = sim.step(inputs("edges", vec![(pair(2, 3), -1)])).unwrap();
        let expected: ZSet = vec![(pair(1, 3), -1), (pair(1, 4), -1), (pair(2, 3), -1), (pair(2, 4), -1)]
            .into_iter()
            .collect();
        assert_eq!(out["reach"], expected);

        let out = sim.step(Deltas::new()).unwrap();
        assert!(out["reach"].is_empty());
    }

    #[zf_ore::test]
    fn fixpoints_enforce_their_bound() {
        let mut sim = Simulator::new(reachability(2)).unwrap();
        let chain = vec![(pair(1, 2), 1), (pair(2, 3), 1), (pair(3, 4), 1)];
        assert!(matches!(
            sim.step(inputs("edges", chain)),
            Err(SimulatorError::IterationLimit { limit: 2, .. })
        ));
    }

    #[zf_ore::test]
    fn watermarks_drop_late_rows_and_purge_state() {
        let typ = pair_type();
        let mut circuit = Circuit::new();
        let t = source(&mut circuit, "t", &typ);
        let watermark = circuit
            .add(OperatorKind::Watermark {
                input: t,
                column: 0,
                lateness: Datum::Int64(5),
            })
            .unwrap();
        let t_var = ScalarExpr::var("t", typ.record_type());
        let count = AggregateExpr::new(
            AggregateFunc::Count,
            Closure::over_tuple("t", &typ, t_var.field(1).unwrap()),
            false,
        )
        .unwrap();
        let aggregate = circuit
            .add(OperatorKind::Aggregate {
                input: watermark,
                key: column(&typ, 0),
                aggregates: vec![count],
                gc: Some(StateGc {
                    watermark,
                    column: 0,
                }),
            })
            .unwrap();
        sink(&mut circuit, aggregate, "v");
        let mut sim = Simulator::new(circuit).unwrap();
        let result = |k, count| Row::new(vec![Datum::Int64(k), Datum::Int64(count)]);

        let out = sim.step(inputs("t", vec![(pair(10, 1), 1), (pair(12, 1), 1)])).unwrap();
        assert_eq!(out["v"], ZSet::from_rows(vec![result(10, 1), result(12, 1)]));
        assert_eq!(sim.watermark(watermark), Some(&Datum::Int64(7)));
        assert_eq!(sim.operator_state_size(aggregate), 2);

        // 3 is behind the watermark; 20 moves it to 15, which expires both
        // groups after their last update.
        let out = sim
            .step(inputs("t", vec![(pair(3, 1), 1), (pair(12, 2), 1), (pair(20, 1), 1)]))
            .unwrap();
        let expected: ZSet = vec![(result(12, 1), -1), (result(12, 2), 1), (result(20, 1), 1)]
            .into_iter()
            .collect();
        assert_eq!(out["v"], expected);
        assert_eq!(sim.watermark(watermark), Some(&Datum::Int64(15)));
        assert_eq!(sim.operator_state_size(aggregate), 1);

        let out = sim.step(inputs("t", vec![(pair(12, 3), 1)])).unwrap();
        assert!(out["v"].is_empty());
    }

    #[zf_ore::test]
    fn joins_keep_entries_the_other_side_can_still_match() {
        let typ = pair_type();
        let mut circuit = Circuit::new();
        let mut watermarked = |name| {
            let input = source(&mut circuit, name, &typ);
            circuit
                .add(OperatorKind::Watermark {
                    input,
                    column: 0,
                    lateness: Datum::Int64(0),
                })
                .unwrap()
        };
        let (left, right) = (watermarked("l"), watermarked("r"));
        let key = column(&typ, 0);
        let (k, l, r) = (
            Param::new("k", key.output_type().clone()),
            Param::new("l", typ.record_type()),
            Param::new("r", typ.record_type()),
        );
        let output = Closure::new(
            vec![k, l.clone(), r.clone()],
            ScalarExpr::tuple(vec![l.var().field(0).unwrap(), r.var().field(1).unwrap()]),
        );
        let join = circuit
            .add(OperatorKind::Join {
                left,
                right,
                left_key: key.clone(),
                right_key: key,
                output,
                gc: Some(JoinGc {
                    left,
                    right,
                    column: 0,
                }),
            })
            .unwrap();
        sink(&mut circuit, join, "v");
        let mut sim = Simulator::new(circuit).unwrap();

        // The left watermark passes 50, but the right side may still send 50.
        let out = sim.step(inputs("l", vec![(pair(50, 1), 1), (pair(100, 1), 1)])).unwrap();
        assert!(out["v"].is_empty());
        assert_eq!(sim.operator_state_size(join), 2);

        let out = sim.step(inputs("r", vec![(pair(50, 7), 1)])).unwrap();
        assert_eq!(out["v"], ZSet::singleton(pair(50, 7), 1));
        // The right entry for 50 can no longer match a left row.
        assert_eq!(sim.operator_state_size(join), 2);

        let out = sim.step(inputs("r", vec![(pair(100, 8), 1)])).unwrap();
        assert_eq!(out["v"], ZSet::singleton(pair(100, 8), 1));
        assert_eq!(sim.operator_state_size(join), 2);
    }

    #[zf_ore::test]
    fn inputs_are_checked() {
        let typ = pair_type();
        let mut circuit = Circuit::new();
        let t = source(&mut circuit, "t", &typ);
        sink(&mut circuit, t, "v");
        let mut sim = Simulator::new(circuit).unwrap();
        assert_eq!(
            sim.step(inputs("u", vec![])),
            Err(SimulatorError::UnknownInput("u".into()))
        );
        let wrong = Row::new(vec![Datum::Int64(1), Datum::Null]);
        assert!(matches!(
            sim.step(inputs("t", vec![(wrong, 1)])),
            Err(SimulatorError::InvalidInput { .. })
        ));
        assert_eq!(sim.steps(), 0);
    }

    #[zf_ore::test]
    fn evaluation_errors_name_the_operator() {
        let typ = pair_type();
        let mut circuit = Circuit::new();
        let t = source(&mut circuit, "t", &typ);
        let t_var = ScalarExpr::var("t", typ.record_type());
        let product = t_var
            .field(0)
            .unwrap()
            .call_binary(&t_var.field(1).unwrap(), BinaryFunc::Mul)
            .unwrap();
        let map = circuit
            .add(OperatorKind::Map {
                input: t,
                func: Closure::over_tuple("t", &typ, ScalarExpr::tuple(vec![product])),
            })
            .unwrap();
        sink(&mut circuit, map, "v");
        let mut sim = Simulator::new(circuit).unwrap();
        assert_eq!(
            sim.step(inputs("t", vec![(pair(i64::MAX, 2), 1)])),
            Err(SimulatorError::Eval {
                operator: map,
                source: EvalError::NumericOverflow
            })
        );
    }
}
