// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Replaces constant subexpressions with their values, and operators on
//! constant collections with constant collections.

use zf_circuit::{Circuit, OperatorId, OperatorKind};
use zf_expr::{BinaryFunc, Closure, ExprKind, ScalarExpr};
use zf_repr::{Datum, ZSet};

use crate::TransformError;

/// Replaces constant subexpressions with their values, and operators on
/// constant collections with constant collections.
#[derive(Debug)]
pub struct FoldConstants;

impl crate::Transform for FoldConstants {
    #[tracing::instrument(
        target = "optimizer",
        level = "trace",
        skip_all,
        fields(path.segment = "fold_constants")
    )]
    fn transform(&self, circuit: &mut Circuit) -> Result<(), TransformError> {
        let mut folded = 0;
        crate::try_visit_circuits(circuit, &mut |circuit, _| {
            for id in circuit.ids() {
                if self.action(circuit, id)? {
                    folded += 1;
                }
            }
            Ok(())
        })?;
        tracing::debug!(target: "optimizer", folded, "folded constants");
        crate::trace_circuit(circuit);
        Ok(())
    }
}

impl FoldConstants {
    /// Folds the closures of operator `id`, then the operator itself.
    /// Returns whether anything changed.
    pub fn action(&self, circuit: &mut Circuit, id: OperatorId) -> Result<bool, TransformError> {
        let Some(op) = circuit.get(id) else {
            return Ok(false);
        };
        let kind = op.kind.try_map_closures(fold_closure)?;
        let mut changed = false;
        if kind != op.kind {
            circuit.replace(id, kind)?;
            changed = true;
        }
        Ok(self.fold_operator(circuit, id)? || changed)
    }

    fn fold_operator(&self, circuit: &mut Circuit, id: OperatorId) -> Result<bool, TransformError> {
        let Some(op) = circuit.get(id) else {
            return Ok(false);
        };
        let typ = op.typ.clone();
        let constant = |id: &OperatorId| match circuit.get(*id).map(|op| &op.kind) {
            Some(OperatorKind::Constant { rows, .. }) => Some(rows),
            _ => None,
        };
        let empty = OperatorKind::Constant {
            rows: ZSet::new(),
            typ: typ.clone(),
        };
        let mut bypass = None;
        let replacement = match &op.kind {
            OperatorKind::Filter { predicate, .. } | OperatorKind::FilterMap { predicate, .. }
                if predicate.is_literal_false_or_null() =>
            {
                Some(empty)
            }
            OperatorKind::Filter { input, predicate } if predicate.is_literal_true() => {
                bypass = Some(*input);
                None
            }
            OperatorKind::FilterMap {
                input,
                predicate,
                func,
            } if predicate.is_literal_true() => Some(OperatorKind::Map {
                input: *input,
                func: func.clone(),
            }),
            OperatorKind::Map { input, func } if func.is_pure() => constant(input)
                .and_then(|rows| evaluate(rows, None, Some(func)))
                .map(|rows| OperatorKind::Constant { rows, typ }),
            OperatorKind::Filter { input, predicate } if predicate.is_pure() => constant(input)
                .and_then(|rows| evaluate(rows, Some(predicate), None))
                .map(|rows| OperatorKind::Constant { rows, typ }),
            OperatorKind::FilterMap {
                input,
                predicate,
                func,
            } if predicate.is_pure() && func.is_pure() => constant(input)
                .and_then(|rows| evaluate(rows, Some(predicate), Some(func)))
                .map(|rows| OperatorKind::Constant { rows, typ }),
            OperatorKind::Negate { input } => constant(input).map(|rows| OperatorKind::Constant {
                rows: -rows.clone(),
                typ,
            }),
            OperatorKind::Distinct { input, gc: None } => {
                constant(input).map(|rows| OperatorKind::Constant {
                    rows: rows.distinct(),
                    typ,
                })
            }
            OperatorKind::Union { inputs } => {
                let mut sum = ZSet::new();
                let mut all_constant = true;
                for input in inputs {
                    match constant(input) {
                        Some(rows) => sum += rows,
                        None => {
                            all_constant = false;
                            break;
                        }
                    }
                }
                all_constant.then(|| OperatorKind::Constant { rows: sum, typ })
            }
            _ => None,
        };
        if let Some(input) = bypass {
            return Ok(circuit.redirect(id, input)? > 0);
        }
        match replacement {
            Some(kind) => {
                tracing::trace!(target: "optimizer", %id, "folded operator into a constant");
                circuit.replace(id, kind)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Applies a filter and a map to a constant collection. Returns `None` if
/// evaluation fails, leaving the error to be raised at runtime.
fn evaluate(rows: &ZSet, predicate: Option<&Closure>, func: Option<&Closure>) -> Option<ZSet> {
    let mut result = ZSet::new();
    for (row, diff) in rows.iter() {
        if let Some(predicate) = predicate {
            if predicate.call_row(row).ok()? != Datum::True {
                continue;
            }
        }
        let row = match func {
            Some(func) => func.map_row(row).ok()?,
            None => row.clone(),
        };
        result.update(row, diff);
    }
    Some(result)
}

/// Folds the body of `closure` bottom-up.
pub fn fold_closure(closure: &Closure) -> Result<Closure, TransformError> {
    let body = closure.body.rewrite_post(&mut fold)?;
    Ok(Closure::new(closure.params.clone(), body))
}

fn fold(e: ScalarExpr) -> Result<ScalarExpr, TransformError> {
    if e.is_literal() {
        return Ok(e);
    }
    if e.is_closed() && e.is_pure() {
        return Ok(match e.eval(&[]) {
            Ok(datum) => ScalarExpr::literal(datum, e.typ().clone()).unwrap_or(e),
            Err(_) => e,
        });
    }
    let replacement = match e.kind() {
        ExprKind::Binary {
            func: func @ (BinaryFunc::And | BinaryFunc::Or),
            left,
            right,
        } => {
            // The value that decides the connective on its own.
            let absorbing = if *func == BinaryFunc::And {
                Datum::False
            } else {
                Datum::True
            };
            let decides = |e: &ScalarExpr| e.as_literal() == Some(&absorbing);
            let neutral = |e: &ScalarExpr| e.as_literal().is_some_and(|d| !d.is_null() && *d != absorbing);
            if (decides(left) && right.is_pure()) || (decides(right) && left.is_pure()) {
                ScalarExpr::literal(absorbing.clone(), e.typ().clone()).ok()
            } else if neutral(left) {
                Some(right.clone())
            } else if neutral(right) {
                Some(left.clone())
            } else {
                None
            }
        }
        ExprKind::If { cond, then, els } => {
            if cond.is_literal_true() {
                Some(then.clone())
            } else if cond.is_literal_false() || cond.is_literal_null() {
                Some(els.clone())
            } else {
                None
            }
        }
        _ => None,
    };
    Ok(match replacement {
        Some(replacement) if replacement.typ() == e.typ() => replacement,
        _ => e,
    })
}
