// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Circuit operators.

use std::fmt;

use serde::{Deserialize, Serialize};
use zf_expr::{AggregateExpr, Closure};
use zf_repr::{ColumnType, Datum, RelationType, ScalarType, ZSet};

use crate::{Circuit, CircuitError};

/// Identifies an operator within its circuit.
///
/// Operators are numbered in the order they are added, so the inputs of an
/// operator always have smaller ids than the operator itself.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct OperatorId(u64);

impl From<u64> for OperatorId {
    fn from(id: u64) -> OperatorId {
        OperatorId(id)
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A node of a circuit, together with the type of the tuples it produces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Operator {
    pub kind: OperatorKind,
    pub typ: RelationType,
}

/// Discards the state of a stateful operator that can no longer change.
///
/// State whose key has a value of `column` below the current value of
/// `watermark` is purged. For joins and aggregates `column` indexes the key;
/// for distinct it indexes the tuple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateGc {
    /// A [`OperatorKind::Watermark`] operator of the same circuit.
    pub watermark: OperatorId,
    pub column: usize,
}

/// State collection of a join, on field `column` of the key.
///
/// An entry of one side can only match future tuples of the other side, so
/// it is purged once the other side's watermark has passed its key: left
/// entries follow `right`, right entries follow `left`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinGc {
    /// The [`OperatorKind::Watermark`] tracking the key of the left input.
    pub left: OperatorId,
    /// The [`OperatorKind::Watermark`] tracking the key of the right input.
    pub right: OperatorId,
    pub column: usize,
}

/// A bounded recursive sub-circuit.
///
/// The body is evaluated repeatedly. In the first iteration, the iteration
/// variable holds the empty set; in every later one, it holds the output of
/// `result` in the previous iteration. The operator's output is the value of
/// `result` once an iteration no longer changes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FixpointOperator {
    /// Operators of the enclosing circuit, read by the body through
    /// [`OperatorKind::Import`] operators.
    pub imports: Vec<OperatorId>,
    pub body: Circuit,
    /// The [`OperatorKind::IterationVariable`] of `body`.
    pub variable: OperatorId,
    /// The operator of `body` computing the next value of the variable.
    pub result: OperatorId,
    /// Iterating more often than this is an error.
    pub max_iterations: usize,
}

/// The kinds of operators.
///
/// Unless noted otherwise, closures of an operator take a single parameter,
/// the input tuple as a record, and produce a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum OperatorKind {
    /// A declared input of the circuit.
    Source { name: String, typ: RelationType },
    /// A fixed collection, emitted once.
    Constant { rows: ZSet, typ: RelationType },
    /// Transforms each tuple. Multiplicities are unchanged.
    Map { input: OperatorId, func: Closure },
    /// Retains the tuples for which `predicate` is true.
    Filter {
        input: OperatorId,
        predicate: Closure,
    },
    /// A filter followed by a map.
    FilterMap {
        input: OperatorId,
        predicate: Closure,
        func: Closure,
    },
    /// An equijoin. Pairs of tuples with equal keys are combined by
    /// `output`, a closure of three parameters: the key, the left tuple and
    /// the right tuple. Keys containing NULL never match.
    Join {
        left: OperatorId,
        right: OperatorId,
        left_key: Closure,
        right_key: Closure,
        output: Closure,
        gc: Option<JoinGc>,
    },
    /// Groups tuples by `key` and produces, per group, the key fields
    /// followed by the value of each aggregate.
    Aggregate {
        input: OperatorId,
        key: Closure,
        aggregates: Vec<AggregateExpr>,
        gc: Option<StateGc>,
    },
    /// Reduces the multiplicity of every present tuple to one.
    Distinct {
        input: OperatorId,
        gc: Option<StateGc>,
    },
    /// Adds the multiplicities of its inputs.
    Union { inputs: Vec<OperatorId> },
    /// Negates all multiplicities.
    Negate { input: OperatorId },
    /// Passes its input through, tracking the largest value of `column`
    /// seen so far, minus `lateness`.
    Watermark {
        input: OperatorId,
        column: usize,
        lateness: Datum,
    },
    Fixpoint(Box<FixpointOperator>),
    /// Inside a fixpoint body, the `index`-th import of the fixpoint.
    Import { index: usize, typ: RelationType },
    /// Inside a fixpoint body, the value of the recursive relation in the
    /// previous iteration.
    IterationVariable { typ: RelationType },
    /// A declared output of the circuit.
    Sink { input: OperatorId, name: String },
}

impl OperatorKind {
    /// A short name for the kind of operator.
    pub fn name(&self) -> &'static str {
        match self {
            OperatorKind::Source { .. } => "Source",
            OperatorKind::Constant { .. } => "Constant",
            OperatorKind::Map { .. } => "Map",
            OperatorKind::Filter { .. } => "Filter",
            OperatorKind::FilterMap { .. } => "FilterMap",
            OperatorKind::Join { .. } => "Join",
            OperatorKind::Aggregate { .. } => "Aggregate",
            OperatorKind::Distinct { .. } => "Distinct",
            OperatorKind::Union { .. } => "Union",
            OperatorKind::Negate { .. } => "Negate",
            OperatorKind::Watermark { .. } => "Watermark",
            OperatorKind::Fixpoint(_) => "Fixpoint",
            OperatorKind::Import { .. } => "Import",
            OperatorKind::IterationVariable { .. } => "IterationVariable",
            OperatorKind::Sink { .. } => "Sink",
        }
    }

    /// The operators whose output this operator consumes, in order.
    pub fn inputs(&self) -> Vec<OperatorId> {
        match self {
            OperatorKind::Source { .. }
            | OperatorKind::Constant { .. }
            | OperatorKind::Import { .. }
            | OperatorKind::IterationVariable { .. } => vec![],
            OperatorKind::Map { input, .. }
            | OperatorKind::Filter { input, .. }
            | OperatorKind::FilterMap { input, .. }
            | OperatorKind::Aggregate { input, .. }
            | OperatorKind::Distinct { input, .. }
            | OperatorKind::Negate { input }
            | OperatorKind::Watermark { input, .. }
            | OperatorKind::Sink { input, .. } => vec![*input],
            OperatorKind::Join { left, right, .. } => vec![*left, *right],
            OperatorKind::Union { inputs } => inputs.clone(),
            OperatorKind::Fixpoint(fixpoint) => fixpoint.imports.clone(),
        }
    }

    /// The state collection policy of an aggregate or a distinct.
    pub fn gc(&self) -> Option<&StateGc> {
        match self {
            OperatorKind::Aggregate { gc, .. } | OperatorKind::Distinct { gc, .. } => gc.as_ref(),
            _ => None,
        }
    }

    /// The watermarks driving the operator's state collection.
    pub fn watermarks(&self) -> Vec<OperatorId> {
        match self {
            OperatorKind::Join { gc: Some(gc), .. } => vec![gc.left, gc.right],
            _ => self.gc().map(|gc| gc.watermark).into_iter().collect(),
        }
    }

    /// The operators this operator refers to: its inputs and the watermark
    /// of its state collection policy.
    pub fn dependencies(&self) -> Vec<OperatorId> {
        let mut deps = self.inputs();
        deps.extend(self.watermarks());
        deps
    }

    /// Returns a copy of the operator in which every reference to another
    /// operator is replaced by the result of `f`.
    pub fn map_ids<F>(&self, mut f: F) -> OperatorKind
    where
        F: FnMut(OperatorId) -> OperatorId,
    {
        let mut kind = self.clone();
        let gc_of = |gc: &mut Option<StateGc>, f: &mut F| {
            if let Some(gc) = gc {
                gc.watermark = f(gc.watermark);
            }
        };
        match &mut kind {
            OperatorKind::Source { .. }
            | OperatorKind::Constant { .. }
            | OperatorKind::Import { .. }
            | OperatorKind::IterationVariable { .. } => {}
            OperatorKind::Map { input, .. }
            | OperatorKind::Filter { input, .. }
            | OperatorKind::FilterMap { input, .. }
            | OperatorKind::Negate { input }
            | OperatorKind::Watermark { input, .. }
            | OperatorKind::Sink { input, .. } => *input = f(*input),
            OperatorKind::Aggregate { input, gc, .. } | OperatorKind::Distinct { input, gc } => {
                *input = f(*input);
                gc_of(gc, &mut f);
            }
            OperatorKind::Join {
                left, right, gc, ..
            } => {
                *left = f(*left);
                *right = f(*right);
                if let Some(gc) = gc {
                    gc.left = f(gc.left);
                    gc.right = f(gc.right);
                }
            }
            OperatorKind::Union { inputs } => {
                for input in inputs {
                    *input = f(*input);
                }
            }
            OperatorKind::Fixpoint(fixpoint) => {
                for import in &mut fixpoint.imports {
                    *import = f(*import);
                }
            }
        }
        kind
    }

    /// The closures evaluated by the operator. The closures of a fixpoint
    /// body are not included.
    pub fn closures(&self) -> Vec<&Closure> {
        match self {
            OperatorKind::Map { func, .. } => vec![func],
            OperatorKind::Filter { predicate, .. } => vec![predicate],
            OperatorKind::FilterMap {
                predicate, func, ..
            } => vec![predicate, func],
            OperatorKind::Join {
                left_key,
                right_key,
                output,
                ..
            } => vec![left_key, right_key, output],
            OperatorKind::Aggregate {
                key, aggregates, ..
            } => std::iter::once(key)
                .chain(aggregates.iter().map(|agg| &agg.expr))
                .collect(),
            _ => vec![],
        }
    }

    /// Returns a copy of the operator with every closure replaced by the
    /// result of `f`, in the order of [`OperatorKind::closures`].
    pub fn try_map_closures<F, E>(&self, mut f: F) -> Result<OperatorKind, E>
    where
        F: FnMut(&Closure) -> Result<Closure, E>,
    {
        let mut kind = self.clone();
        match &mut kind {
            OperatorKind::Map { func, .. } => *func = f(func)?,
            OperatorKind::Filter { predicate, .. } => *predicate = f(predicate)?,
            OperatorKind::FilterMap {
                predicate, func, ..
            } => {
                *predicate = f(predicate)?;
                *func = f(func)?;
            }
            OperatorKind::Join {
                left_key,
                right_key,
                output,
                ..
            } => {
                *left_key = f(left_key)?;
                *right_key = f(right_key)?;
                *output = f(output)?;
            }
            OperatorKind::Aggregate {
                key, aggregates, ..
            } => {
                *key = f(key)?;
                for agg in aggregates {
                    agg.expr = f(&agg.expr)?;
                }
            }
            _ => {}
        }
        Ok(kind)
    }

    /// Whether the operator keeps state across steps.
    pub fn is_stateful(&self) -> bool {
        matches!(
            self,
            OperatorKind::Join { .. }
                | OperatorKind::Aggregate { .. }
                | OperatorKind::Distinct { .. }
                | OperatorKind::Watermark { .. }
                | OperatorKind::Fixpoint(_)
        )
    }

    /// Whether the operator's closures are deterministic and free of side
    /// effects, including those of a fixpoint body.
    pub fn is_pure(&self) -> bool {
        match self {
            OperatorKind::Fixpoint(fixpoint) => fixpoint.body.iter().all(|(_, op)| op.kind.is_pure()),
            kind => kind.closures().iter().all(|closure| closure.is_pure()),
        }
    }

    /// Whether evaluating the operator is observable beyond its output.
    pub fn has_side_effects(&self) -> bool {
        match self {
            OperatorKind::Fixpoint(fixpoint) => fixpoint
                .body
                .iter()
                .any(|(_, op)| op.kind.has_side_effects()),
            kind => kind.closures().iter().any(|closure| closure.has_side_effects()),
        }
    }

    /// Computes the type of the operator's output, given the circuit that
    /// contains its inputs.
    pub(crate) fn derive_type(&self, circuit: &Circuit) -> Result<RelationType, CircuitError> {
        let input = |id: &OperatorId| circuit.typ(*id);
        let type_error = |source| CircuitError::Type {
            operator: self.name(),
            source,
        };
        match self {
            OperatorKind::Source { typ, .. }
            | OperatorKind::Constant { typ, .. }
            | OperatorKind::Import { typ, .. }
            | OperatorKind::IterationVariable { typ } => Ok(typ.clone()),
            OperatorKind::Map { input: id, func } => {
                check_params(self, func, &[input(id)?.record_type()])?;
                record_output(self, func)
            }
            OperatorKind::Filter {
                input: id,
                predicate,
            } => {
                let typ = input(id)?;
                check_params(self, predicate, &[typ.record_type()])?;
                check_predicate(self, predicate)?;
                Ok(typ.clone())
            }
            OperatorKind::FilterMap {
                input: id,
                predicate,
                func,
            } => {
                let param = input(id)?.record_type();
                check_params(self, predicate, &[param.clone()])?;
                check_predicate(self, predicate)?;
                check_params(self, func, &[param])?;
                record_output(self, func)
            }
            OperatorKind::Join {
                left,
                right,
                left_key,
                right_key,
                output,
                gc,
            } => {
                check_params(self, left_key, &[input(left)?.record_type()])?;
                check_params(self, right_key, &[input(right)?.record_type()])?;
                let l = key_fields(self, left_key)?;
                let r = key_fields(self, right_key)?;
                if l.len() != r.len() || l.iter().zip(&r).any(|(l, r)| !l.same_base(r)) {
                    return Err(type_error(zf_repr::TypeError::mismatch(
                        left_key.output_type(),
                        right_key.output_type(),
                    )));
                }
                check_params(
                    self,
                    output,
                    &[
                        left_key.output_type().clone(),
                        input(left)?.record_type(),
                        input(right)?.record_type(),
                    ],
                )?;
                if let Some(gc) = gc {
                    for watermark in [gc.left, gc.right] {
                        check_gc(
                            self,
                            circuit,
                            Some(&StateGc {
                                watermark,
                                column: gc.column,
                            }),
                            l.len(),
                        )?;
                    }
                }
                record_output(self, output)
            }
            OperatorKind::Aggregate {
                input: id,
                key,
                aggregates,
                gc,
            } => {
                let param = input(id)?.record_type();
                check_params(self, key, &[param.clone()])?;
                let mut columns = key_fields(self, key)?;
                check_gc(self, circuit, gc.as_ref(), columns.len())?;
                for agg in aggregates {
                    check_params(self, &agg.expr, &[param.clone()])?;
                    columns.push(
                        agg.func
                            .output_type(agg.expr.output_type())
                            .map_err(type_error)?,
                    );
                }
                Ok(RelationType::new(columns))
            }
            OperatorKind::Distinct { input: id, gc } => {
                let typ = input(id)?;
                check_gc(self, circuit, gc.as_ref(), typ.arity())?;
                Ok(typ.clone())
            }
            OperatorKind::Negate { input: id } | OperatorKind::Sink { input: id, .. } => {
                Ok(input(id)?.clone())
            }
            OperatorKind::Watermark {
                input: id,
                column,
                lateness,
            } => {
                let typ = input(id)?;
                let column_type = typ.column_types.get(*column).ok_or_else(|| {
                    CircuitError::invalid(self, format!("no column {} in {}", column, typ))
                })?;
                let lateness_ok = match (&column_type.scalar_type, lateness.scalar_type()) {
                    (ScalarType::Timestamp, Some(ScalarType::Interval)) => true,
                    (c, Some(l)) => c.is_numeric() && *c == l,
                    (_, None) => false,
                };
                if !lateness_ok {
                    return Err(CircuitError::invalid(
                        self,
                        format!("lateness {} does not apply to {}", lateness, column_type),
                    ));
                }
                Ok(typ.clone())
            }
            OperatorKind::Union { inputs } => {
                let (first, rest) = inputs
                    .split_first()
                    .ok_or_else(|| CircuitError::invalid(self, "union of no inputs"))?;
                let mut typ = input(first)?.clone();
                for id in rest {
                    typ = typ.union(input(id)?).map_err(type_error)?;
                }
                Ok(typ)
            }
            OperatorKind::Fixpoint(fixpoint) => {
                for (index, import) in fixpoint.imports.iter().enumerate() {
                    let expected = input(import)?;
                    let uses = fixpoint.body.iter().filter_map(|(_, op)| match &op.kind {
                        OperatorKind::Import { index: i, typ } if *i == index => Some(typ),
                        _ => None,
                    });
                    for typ in uses {
                        if typ != expected {
                            return Err(type_error(zf_repr::TypeError::mismatch(typ, expected)));
                        }
                    }
                }
                let variable = fixpoint.body.typ(fixpoint.variable)?;
                let result = fixpoint.body.typ(fixpoint.result)?;
                if variable != result {
                    return Err(type_error(zf_repr::TypeError::mismatch(variable, result)));
                }
                Ok(result.clone())
            }
        }
    }
}

fn check_params(
    op: &OperatorKind,
    closure: &Closure,
    expected: &[ColumnType],
) -> Result<(), CircuitError> {
    let actual = closure.params.iter().map(|p| &p.typ);
    if closure.params.len() != expected.len() || actual.zip(expected).any(|(a, e)| a != e) {
        return Err(CircuitError::invalid(
            op,
            format!(
                "closure {} does not accept ({})",
                closure,
                itertools::join(expected, ", ")
            ),
        ));
    }
    Ok(())
}

fn check_predicate(op: &OperatorKind, predicate: &Closure) -> Result<(), CircuitError> {
    if predicate.output_type().scalar_type != ScalarType::Bool {
        return Err(CircuitError::Type {
            operator: op.name(),
            source: zf_repr::TypeError::mismatch(predicate.output_type(), &ScalarType::Bool),
        });
    }
    Ok(())
}

fn key_fields(op: &OperatorKind, key: &Closure) -> Result<Vec<ColumnType>, CircuitError> {
    Ok(record_output(op, key)?.column_types)
}

fn record_output(op: &OperatorKind, func: &Closure) -> Result<RelationType, CircuitError> {
    func.output_relation_type()
        .map_err(|source| CircuitError::Type {
            operator: op.name(),
            source,
        })
}

fn check_gc(
    op: &OperatorKind,
    circuit: &Circuit,
    gc: Option<&StateGc>,
    arity: usize,
) -> Result<(), CircuitError> {
    let Some(gc) = gc else {
        return Ok(());
    };
    if gc.column >= arity {
        return Err(CircuitError::invalid(
            op,
            format!("state collection on missing column {}", gc.column),
        ));
    }
    match circuit.get(gc.watermark).map(|w| &w.kind) {
        Some(OperatorKind::Watermark { .. }) => Ok(()),
        _ => Err(CircuitError::invalid(
            op,
            format!("{} is not a watermark", gc.watermark),
        )),
    }
}
