// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Structural equivalence of expressions.
//!
//! Two expressions are equivalent if they have the same shape, the same
//! types, and equivalent children, regardless of which nodes they are built
//! from. Closure parameters are compared up to renaming: `|a| a.0` and
//! `|b| b.0` are equivalent, `|a| a.0` and `|a| b.0` are not.

use zf_ore::stack::{CheckedRecursion, RecursionGuard, RecursionLimitError};

use crate::{AggregateExpr, Closure, ExprKind, Param, ScalarExpr, RECURSION_LIMIT};

/// Tracks which names on the left correspond to which names on the right
/// while comparing two expressions.
///
/// A context can be reused across comparisons; every comparison leaves the
/// bindings as it found them.
#[derive(Debug)]
pub struct EquivalenceContext {
    /// Corresponding parameter names of the enclosing closures, innermost
    /// last.
    bindings: Vec<(String, String)>,
    recursion_guard: RecursionGuard,
}

impl Default for EquivalenceContext {
    fn default() -> Self {
        EquivalenceContext {
            bindings: vec![],
            recursion_guard: RecursionGuard::with_limit(RECURSION_LIMIT),
        }
    }
}

impl CheckedRecursion for EquivalenceContext {
    fn recursion_guard(&self) -> &RecursionGuard {
        &self.recursion_guard
    }
}

impl EquivalenceContext {
    pub fn new() -> EquivalenceContext {
        EquivalenceContext::default()
    }

    /// Whether `left` and `right` are equivalent.
    pub fn equivalent(
        &mut self,
        left: &ScalarExpr,
        right: &ScalarExpr,
    ) -> Result<bool, RecursionLimitError> {
        if left.ptr_eq(right) && self.bindings.iter().all(|(l, r)| l == r) {
            return Ok(true);
        }
        if left.typ() != right.typ() {
            return Ok(false);
        }
        self.checked_recur_mut(|cx| {
            use ExprKind::*;
            match (left.kind(), right.kind()) {
                (Literal(l), Literal(r)) => Ok(l == r),
                (Var(l), Var(r)) => Ok(cx.vars_equivalent(l, r)),
                (Field { expr: l, index: li }, Field { expr: r, index: ri }) => {
                    Ok(li == ri && cx.equivalent(l, r)?)
                }
                (Tuple(l), Tuple(r)) => cx.all_equivalent(l, r),
                (Unary { func: lf, expr: l }, Unary { func: rf, expr: r }) => {
                    Ok(lf == rf && cx.equivalent(l, r)?)
                }
                (
                    Binary {
                        func: lf,
                        left: ll,
                        right: lr,
                    },
                    Binary {
                        func: rf,
                        left: rl,
                        right: rr,
                    },
                ) => Ok(lf == rf && cx.equivalent(ll, rl)? && cx.equivalent(lr, rr)?),
                (
                    If {
                        cond: lc,
                        then: lt,
                        els: le,
                    },
                    If {
                        cond: rc,
                        then: rt,
                        els: re,
                    },
                ) => Ok(cx.equivalent(lc, rc)? && cx.equivalent(lt, rt)? && cx.equivalent(le, re)?),
                (Cast { expr: l, to: lt }, Cast { expr: r, to: rt }) => {
                    Ok(lt == rt && cx.equivalent(l, r)?)
                }
                (Apply { func: lf, args: la }, Apply { func: rf, args: ra }) => {
                    Ok(lf.func() == rf.func() && cx.all_equivalent(la, ra)?)
                }
                _ => Ok(false),
            }
        })
    }

    fn all_equivalent(
        &mut self,
        left: &[ScalarExpr],
        right: &[ScalarExpr],
    ) -> Result<bool, RecursionLimitError> {
        if left.len() != right.len() {
            return Ok(false);
        }
        for (l, r) in left.iter().zip(right) {
            if !self.equivalent(l, r)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Bound variables correspond if they are bound by the same enclosing
    /// closure; free variables correspond if they have the same name.
    fn vars_equivalent(&self, left: &str, right: &str) -> bool {
        let l = self.bindings.iter().rposition(|(l, _)| l == left);
        let r = self.bindings.iter().rposition(|(_, r)| r == right);
        match (l, r) {
            (None, None) => left == right,
            (l, r) => l == r,
        }
    }

    /// Whether two closures are equivalent, up to renaming of their
    /// parameters.
    pub fn equivalent_closures(
        &mut self,
        left: &Closure,
        right: &Closure,
    ) -> Result<bool, RecursionLimitError> {
        if !same_param_types(&left.params, &right.params) {
            return Ok(false);
        }
        let depth = self.bindings.len();
        self.bindings.extend(
            left.params
                .iter()
                .zip(&right.params)
                .map(|(l, r)| (l.name.clone(), r.name.clone())),
        );
        let result = self.equivalent(&left.body, &right.body);
        self.bindings.truncate(depth);
        result
    }

    /// Whether two aggregates compute the same function of equivalent
    /// values.
    pub fn equivalent_aggregates(
        &mut self,
        left: &AggregateExpr,
        right: &AggregateExpr,
    ) -> Result<bool, RecursionLimitError> {
        Ok(left.func == right.func
            && left.distinct == right.distinct
            && self.equivalent_closures(&left.expr, &right.expr)?)
    }
}

fn same_param_types(left: &[Param], right: &[Param]) -> bool {
    left.len() == right.len() && left.iter().zip(right).all(|(l, r)| l.typ == r.typ)
}

#[cfg(test)]
mod tests {
    use zf_repr::{Datum, RelationType, ScalarType};

    use crate::{AggregateFunc, BinaryFunc, BuiltinFunc};

    use super::*;

    fn typ() -> RelationType {
        RelationType::new(vec![
            ScalarType::Int32.nullable(false),
            ScalarType::String.nullable(true),
        ])
    }

    fn first_plus_one(name: &str) -> Closure {
        let param = Param::new(name, typ().record_type());
        let one = ScalarExpr::literal_ok(Datum::Int32(1), ScalarType::Int32).unwrap();
        let body = param
            .var()
            .field(0)
            .unwrap()
            .call_binary(&one, BinaryFunc::Add)
            .unwrap();
        Closure::new(vec![param], body)
    }

    #[zf_ore::test]
    fn alpha_renaming() {
        let mut cx = EquivalenceContext::new();
        let a = first_plus_one("a");
        let b = first_plus_one("b");
        assert!(cx.equivalent_closures(&a, &b).unwrap());
        assert_ne!(a, b);
        // Free in the body, bound by the closure on the other side.
        let free = Closure::new(vec![Param::new("a", typ().record_type())], b.body.clone());
        assert!(!cx.equivalent_closures(&a, &free).unwrap());
        // Free variables match by name.
        assert!(cx.equivalent(&b.body, &b.body.deep_copy().unwrap()).unwrap());
        assert!(!cx.equivalent(&a.body, &b.body).unwrap());
    }

    #[zf_ore::test]
    fn shadowing() {
        let t = typ().record_type();
        let inner = |outer: &str, inner: &str| {
            let x = Param::new(outer, t.clone());
            let y = Param::new(inner, t.clone());
            (x, y)
        };
        let mut cx = EquivalenceContext::new();
        // |a| |a| a  ~  |b| |c| c, but not  |b| |c| b.
        let (a1, a2) = inner("a", "a");
        let (b, c) = inner("b", "c");
        let body_l = a2.var();
        cx.bindings.push((a1.name.clone(), b.name.clone()));
        let l = Closure::new(vec![a2], body_l);
        assert!(cx
            .equivalent_closures(&l, &Closure::new(vec![c.clone()], c.var()))
            .unwrap());
        assert!(!cx
            .equivalent_closures(&l, &Closure::new(vec![c], b.var()))
            .unwrap());
        cx.bindings.pop();
        assert!(cx.bindings.is_empty());
    }

    #[zf_ore::test]
    fn function_paths_compare_by_name() {
        let x = ScalarExpr::var("x", ScalarType::String.nullable(false));
        let upper = ScalarExpr::apply(BuiltinFunc::Upper, vec![x.clone()]).unwrap();
        let upper2 = ScalarExpr::apply(BuiltinFunc::Upper, vec![x.clone()]).unwrap();
        let lower = ScalarExpr::apply(BuiltinFunc::Lower, vec![x]).unwrap();
        let mut cx = EquivalenceContext::new();
        assert!(cx.equivalent(&upper, &upper2).unwrap());
        assert!(!upper.same_fields(&upper2));
        assert!(!cx.equivalent(&upper, &lower).unwrap());
    }

    #[zf_ore::test]
    fn types_matter() {
        let mut cx = EquivalenceContext::new();
        let l = ScalarExpr::literal_null(ScalarType::Int32);
        let r = ScalarExpr::literal_null(ScalarType::Int64);
        assert!(!cx.equivalent(&l, &r).unwrap());
        let l = ScalarExpr::var("x", ScalarType::Int32.nullable(true));
        let r = ScalarExpr::var("x", ScalarType::Int32.nullable(false));
        assert!(!cx.equivalent(&l, &r).unwrap());
    }

    #[zf_ore::test]
    fn aggregates() {
        let mut cx = EquivalenceContext::new();
        let sum_a = AggregateExpr::new(AggregateFunc::Sum, first_plus_one("a"), false).unwrap();
        let sum_b = AggregateExpr::new(AggregateFunc::Sum, first_plus_one("b"), false).unwrap();
        let sum_distinct = AggregateExpr::new(AggregateFunc::Sum, first_plus_one("b"), true).unwrap();
        assert!(cx.equivalent_aggregates(&sum_a, &sum_b).unwrap());
        assert!(!cx.equivalent_aggregates(&sum_a, &sum_distinct).unwrap());
    }
}
