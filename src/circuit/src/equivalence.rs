// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Structural equivalence of operators and circuits.
//!
//! Operators are equivalent if they are of the same kind, produce the same
//! type, carry equivalent closures and consume equivalent inputs. Whole
//! circuits are equivalent if their declared inputs agree by name, their
//! declared outputs agree by name and order, and the operators computing
//! each output are equivalent. Operators that do not reach an output are
//! ignored.

use std::collections::{BTreeMap, BTreeSet};

use zf_expr::{EquivalenceContext, RECURSION_LIMIT};
use zf_ore::stack::{CheckedRecursion, RecursionGuard};

use crate::{Circuit, CircuitError, Operator, OperatorId, OperatorKind, StateGc};

/// Compares everything but the operators that `left` and `right` refer to.
///
/// If this returns true, the two operators have the same number of
/// [dependencies](OperatorKind::dependencies), and they are equivalent if
/// their dependencies are pairwise equivalent.
pub fn shallow_equivalent(
    cx: &mut EquivalenceContext,
    left: &Operator,
    right: &Operator,
) -> Result<bool, CircuitError> {
    use OperatorKind::*;
    if left.typ != right.typ {
        return Ok(false);
    }
    let gc = |l: &Option<StateGc>, r: &Option<StateGc>| match (l, r) {
        (None, None) => true,
        (Some(l), Some(r)) => l.column == r.column,
        _ => false,
    };
    let equivalent = match (&left.kind, &right.kind) {
        (Source { name: ln, typ: lt }, Source { name: rn, typ: rt }) => ln == rn && lt == rt,
        (Constant { rows: l, .. }, Constant { rows: r, .. }) => l == r,
        (Map { func: l, .. }, Map { func: r, .. }) => cx.equivalent_closures(l, r)?,
        (Filter { predicate: l, .. }, Filter { predicate: r, .. }) => {
            cx.equivalent_closures(l, r)?
        }
        (
            FilterMap {
                predicate: lp,
                func: lf,
                ..
            },
            FilterMap {
                predicate: rp,
                func: rf,
                ..
            },
        ) => cx.equivalent_closures(lp, rp)? && cx.equivalent_closures(lf, rf)?,
        (
            Join {
                left_key: llk,
                right_key: lrk,
                output: lo,
                gc: lgc,
                ..
            },
            Join {
                left_key: rlk,
                right_key: rrk,
                output: ro,
                gc: rgc,
                ..
            },
        ) => {
            lgc.map(|gc| gc.column) == rgc.map(|gc| gc.column)
                && cx.equivalent_closures(llk, rlk)?
                && cx.equivalent_closures(lrk, rrk)?
                && cx.equivalent_closures(lo, ro)?
        }
        (
            Aggregate {
                key: lk,
                aggregates: la,
                gc: lgc,
                ..
            },
            Aggregate {
                key: rk,
                aggregates: ra,
                gc: rgc,
                ..
            },
        ) => {
            if !gc(lgc, rgc) || la.len() != ra.len() || !cx.equivalent_closures(lk, rk)? {
                false
            } else {
                let mut all = true;
                for (l, r) in la.iter().zip(ra) {
                    if !cx.equivalent_aggregates(l, r)? {
                        all = false;
                        break;
                    }
                }
                all
            }
        }
        (Distinct { gc: l, .. }, Distinct { gc: r, .. }) => gc(l, r),
        (Union { inputs: l }, Union { inputs: r }) => l.len() == r.len(),
        (Negate { .. }, Negate { .. }) => true,
        (
            Watermark {
                column: lc,
                lateness: ll,
                ..
            },
            Watermark {
                column: rc,
                lateness: rl,
                ..
            },
        ) => lc == rc && ll == rl,
        (Fixpoint(l), Fixpoint(r)) => {
            l.max_iterations == r.max_iterations
                && l.imports.len() == r.imports.len()
                && {
                    let mut body = CircuitEquivalence::new(&l.body, &r.body);
                    body.operators(l.variable, r.variable)? && body.operators(l.result, r.result)?
                }
        }
        (Import { index: l, .. }, Import { index: r, .. }) => l == r,
        (IterationVariable { .. }, IterationVariable { .. }) => true,
        (Sink { name: l, .. }, Sink { name: r, .. }) => l == r,
        _ => false,
    };
    Ok(equivalent)
}

/// Compares the operators of two circuits, maintaining a bijection between
/// the operators found to correspond.
#[derive(Debug)]
pub struct CircuitEquivalence<'a> {
    left: &'a Circuit,
    right: &'a Circuit,
    forward: BTreeMap<OperatorId, OperatorId>,
    backward: BTreeMap<OperatorId, OperatorId>,
    cx: EquivalenceContext,
    recursion_guard: RecursionGuard,
}

impl<'a> CheckedRecursion for CircuitEquivalence<'a> {
    fn recursion_guard(&self) -> &RecursionGuard {
        &self.recursion_guard
    }
}

impl<'a> CircuitEquivalence<'a> {
    pub fn new(left: &'a Circuit, right: &'a Circuit) -> CircuitEquivalence<'a> {
        CircuitEquivalence {
            left,
            right,
            forward: BTreeMap::new(),
            backward: BTreeMap::new(),
            cx: EquivalenceContext::new(),
            recursion_guard: RecursionGuard::with_limit(RECURSION_LIMIT),
        }
    }

    /// Whether operator `l` of the left circuit is equivalent to operator
    /// `r` of the right circuit, consistently with the correspondences
    /// established so far.
    pub fn operators(&mut self, l: OperatorId, r: OperatorId) -> Result<bool, CircuitError> {
        if let Some(mapped) = self.forward.get(&l) {
            return Ok(*mapped == r);
        }
        if self.backward.contains_key(&r) {
            return Ok(false);
        }
        let left = self.left.get(l).ok_or(CircuitError::UnknownOperator(l))?;
        let right = self.right.get(r).ok_or(CircuitError::UnknownOperator(r))?;
        if !shallow_equivalent(&mut self.cx, left, right)? {
            return Ok(false);
        }
        let (ldeps, rdeps) = (left.kind.dependencies(), right.kind.dependencies());
        if ldeps.len() != rdeps.len() {
            return Ok(false);
        }
        for (ld, rd) in ldeps.into_iter().zip(rdeps) {
            if !self.checked_recur_mut(|eq| eq.operators(ld, rd))? {
                return Ok(false);
            }
        }
        self.forward.insert(l, r);
        self.backward.insert(r, l);
        Ok(true)
    }

    /// The correspondences established so far, from left to right.
    pub fn correspondences(&self) -> &BTreeMap<OperatorId, OperatorId> {
        &self.forward
    }

    /// Whether the two circuits are equivalent.
    pub fn circuits(&mut self) -> Result<bool, CircuitError> {
        let names = |c: &'a Circuit| c.sources().into_iter().map(|(_, n)| n).collect::<BTreeSet<_>>();
        if names(self.left) != names(self.right) {
            return Ok(false);
        }
        let (lsinks, rsinks) = (self.left.sinks(), self.right.sinks());
        if lsinks.len() != rsinks.len() {
            return Ok(false);
        }
        for ((l, ln), (r, rn)) in lsinks.into_iter().zip(rsinks) {
            if ln != rn || !self.operators(l, r)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Whether two circuits are equivalent.
pub fn circuits_equivalent(left: &Circuit, right: &Circuit) -> Result<bool, CircuitError> {
    CircuitEquivalence::new(left, right).circuits()
}
