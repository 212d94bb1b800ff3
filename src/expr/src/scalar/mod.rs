// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Scalar expressions.
//!
//! A [`ScalarExpr`] is an immutable, reference-counted tree node carrying
//! the [`ColumnType`] of its result. The type is computed once, by the
//! checked constructors in this module, and never re-derived: an expression
//! is never changed in place, rewrites build new nodes instead.
//!
//! Cloning a `ScalarExpr` shares the node. Two handles to the same node are
//! *identical* ([`ScalarExpr::ptr_eq`]); two separately built trees with the
//! same content are *equal* (`==`) but not identical. Use
//! [`ScalarExpr::deep_copy`] to obtain an equal tree that shares no node
//! with the original.

use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use zf_ore::stack::{CheckedRecursion, RecursionGuard, RecursionLimitError};
use zf_repr::{ColumnType, Datum, ScalarType, TypeError};

use crate::visit::{Visit, VisitChildren};
use crate::RECURSION_LIMIT;

pub mod eval;
pub mod func;

use func::{BinaryFunc, BuiltinFunc, FuncPath, UnaryFunc};

/// A typed scalar expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScalarExpr(Arc<ExprNode>);

/// The content of a [`ScalarExpr`] node.
#[derive(Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExprNode {
    kind: ExprKind,
    typ: ColumnType,
}

/// The variants of scalar expressions.
///
/// The documented child order is the order in which visitors descend into
/// the children of each variant. Every node visits its type before any of
/// the children listed here.
#[derive(Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExprKind {
    /// A constant value. No children.
    Literal(Datum),
    /// A reference to a closure parameter, by name. No children.
    Var(String),
    /// The `index`-th field of a record. Children: `expr`.
    Field { expr: ScalarExpr, index: usize },
    /// A record constructor. Children: the fields, in order.
    Tuple(Vec<ScalarExpr>),
    /// A unary operation. Children: `expr`.
    Unary { func: UnaryFunc, expr: ScalarExpr },
    /// A binary operation. Children: `left`, then `right`.
    Binary {
        func: BinaryFunc,
        left: ScalarExpr,
        right: ScalarExpr,
    },
    /// A conditional. `els` is evaluated when `cond` is false or null.
    /// Children: `cond`, `then`, `els`.
    If {
        cond: ScalarExpr,
        then: ScalarExpr,
        els: ScalarExpr,
    },
    /// A type conversion. Children: `expr`.
    Cast { expr: ScalarExpr, to: ScalarType },
    /// A call of a built-in function. Children: the function path, then the
    /// arguments from left to right.
    Apply { func: FuncPath, args: Vec<ScalarExpr> },
}

impl ScalarExpr {
    fn new(kind: ExprKind, typ: ColumnType) -> ScalarExpr {
        ScalarExpr(Arc::new(ExprNode { kind, typ }))
    }

    /// The variant and children of this node.
    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    /// The type of the value this expression computes.
    pub fn typ(&self) -> &ColumnType {
        &self.0.typ
    }

    /// Whether `self` and `other` are the same node.
    pub fn ptr_eq(&self, other: &ScalarExpr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// An identifier of the node, unique among live nodes.
    pub fn id(&self) -> usize {
        // The address of the allocation.
        Arc::as_ptr(&self.0) as usize
    }

    /// A literal of the given column type.
    pub fn literal(datum: Datum, typ: ColumnType) -> Result<ScalarExpr, TypeError> {
        if !datum.is_instance_of(&typ) {
            return Err(TypeError::InvalidLiteral {
                datum: datum.to_string(),
                typ: typ.to_string(),
            });
        }
        Ok(ScalarExpr::new(ExprKind::Literal(datum), typ))
    }

    /// A literal of the given scalar type, nullable only if the datum is
    /// null.
    pub fn literal_ok(datum: Datum, scalar_type: ScalarType) -> Result<ScalarExpr, TypeError> {
        let nullable = datum.is_null();
        ScalarExpr::literal(datum, scalar_type.nullable(nullable))
    }

    /// A null literal of the given scalar type.
    pub fn literal_null(scalar_type: ScalarType) -> ScalarExpr {
        ScalarExpr::new(ExprKind::Literal(Datum::Null), scalar_type.nullable(true))
    }

    /// The literal `true`.
    pub fn literal_true() -> ScalarExpr {
        ScalarExpr::new(
            ExprKind::Literal(Datum::True),
            ScalarType::Bool.nullable(false),
        )
    }

    /// The literal `false`.
    pub fn literal_false() -> ScalarExpr {
        ScalarExpr::new(
            ExprKind::Literal(Datum::False),
            ScalarType::Bool.nullable(false),
        )
    }

    /// A reference to the closure parameter `name` of type `typ`.
    pub fn var(name: impl Into<String>, typ: ColumnType) -> ScalarExpr {
        ScalarExpr::new(ExprKind::Var(name.into()), typ)
    }

    /// The `index`-th field of this record-typed expression.
    ///
    /// The field is nullable if it is declared nullable or if the record
    /// itself is.
    pub fn field(&self, index: usize) -> Result<ScalarExpr, TypeError> {
        let typ = self
            .typ()
            .scalar_type
            .record_fields()
            .and_then(|fields| fields.get(index))
            .ok_or_else(|| TypeError::NoSuchField {
                index,
                typ: self.typ().to_string(),
            })?;
        let typ = typ.clone().nullable(typ.nullable || self.typ().nullable);
        Ok(ScalarExpr::new(
            ExprKind::Field {
                expr: self.clone(),
                index,
            },
            typ,
        ))
    }

    /// A non-nullable record with the given fields.
    pub fn tuple(fields: Vec<ScalarExpr>) -> ScalarExpr {
        let typ = ScalarType::Record {
            fields: fields.iter().map(|f| f.typ().clone()).collect(),
        }
        .nullable(false);
        ScalarExpr::new(ExprKind::Tuple(fields), typ)
    }

    /// Applies a unary function to this expression.
    pub fn call_unary(&self, func: UnaryFunc) -> Result<ScalarExpr, TypeError> {
        let typ = func.output_type(self.typ())?;
        Ok(ScalarExpr::new(
            ExprKind::Unary {
                func,
                expr: self.clone(),
            },
            typ,
        ))
    }

    /// Applies a binary function to this expression and `other`.
    pub fn call_binary(&self, other: &ScalarExpr, func: BinaryFunc) -> Result<ScalarExpr, TypeError> {
        let typ = func.output_type(self.typ(), other.typ())?;
        Ok(ScalarExpr::new(
            ExprKind::Binary {
                func,
                left: self.clone(),
                right: other.clone(),
            },
            typ,
        ))
    }

    /// `self AND other`.
    pub fn and(&self, other: &ScalarExpr) -> Result<ScalarExpr, TypeError> {
        self.call_binary(other, BinaryFunc::And)
    }

    /// `self OR other`.
    pub fn or(&self, other: &ScalarExpr) -> Result<ScalarExpr, TypeError> {
        self.call_binary(other, BinaryFunc::Or)
    }

    /// `NOT self`.
    pub fn not(&self) -> Result<ScalarExpr, TypeError> {
        self.call_unary(UnaryFunc::Not)
    }

    /// `self IS NULL`.
    pub fn is_null(&self) -> ScalarExpr {
        let typ = ScalarType::Bool.nullable(false);
        ScalarExpr::new(
            ExprKind::Unary {
                func: UnaryFunc::IsNull,
                expr: self.clone(),
            },
            typ,
        )
    }

    /// `self IS NOT NULL`.
    pub fn is_not_null(&self) -> ScalarExpr {
        let typ = ScalarType::Bool.nullable(false);
        ScalarExpr::new(
            ExprKind::Unary {
                func: UnaryFunc::IsNotNull,
                expr: self.clone(),
            },
            typ,
        )
    }

    /// A conditional expression. The branches must share a base type; the
    /// result is nullable if either branch is.
    pub fn if_then_else(
        cond: ScalarExpr,
        then: ScalarExpr,
        els: ScalarExpr,
    ) -> Result<ScalarExpr, TypeError> {
        if cond.typ().scalar_type != ScalarType::Bool {
            return Err(TypeError::invalid_operand(&"IF", cond.typ()));
        }
        let typ = then.typ().union(els.typ())?;
        Ok(ScalarExpr::new(ExprKind::If { cond, then, els }, typ))
    }

    /// Casts this expression to `to`.
    pub fn cast(&self, to: ScalarType) -> Result<ScalarExpr, TypeError> {
        let typ = func::cast_type(self.typ(), &to)?;
        Ok(ScalarExpr::new(
            ExprKind::Cast {
                expr: self.clone(),
                to,
            },
            typ,
        ))
    }

    /// A call of the built-in function `func`.
    pub fn apply(func: BuiltinFunc, args: Vec<ScalarExpr>) -> Result<ScalarExpr, TypeError> {
        ScalarExpr::apply_path(FuncPath::new(func), args)
    }

    /// A call of the function named by `func`, which may be shared with
    /// other applications.
    pub fn apply_path(func: FuncPath, args: Vec<ScalarExpr>) -> Result<ScalarExpr, TypeError> {
        let arg_types = args.iter().map(|arg| arg.typ().clone()).collect::<Vec<_>>();
        let typ = func.func().output_type(&arg_types)?;
        Ok(ScalarExpr::new(ExprKind::Apply { func, args }, typ))
    }

    /// Builds an application with the same function and result type as this
    /// one, but with `args` as its arguments.
    ///
    /// The new arguments must match the old ones in number and base type.
    /// Returns an error if `self` is not an application.
    pub fn replace_arguments(&self, args: Vec<ScalarExpr>) -> Result<ScalarExpr, TypeError> {
        let ExprKind::Apply {
            func,
            args: old_args,
        } = self.kind()
        else {
            return Err(TypeError::invalid_operand(&"replace_arguments", &self));
        };
        if args.len() != old_args.len() {
            return Err(TypeError::WrongArgumentCount {
                func: func.to_string(),
                expected: old_args.len().to_string(),
                got: args.len(),
            });
        }
        for (old, new) in old_args.iter().zip(&args) {
            if !old.typ().same_base(new.typ()) {
                return Err(TypeError::mismatch(old.typ(), new.typ()));
            }
        }
        Ok(ScalarExpr::new(
            ExprKind::Apply {
                func: func.clone(),
                args,
            },
            self.typ().clone(),
        ))
    }

    /// Returns the datum if this is a literal.
    pub fn as_literal(&self) -> Option<&Datum> {
        match self.kind() {
            ExprKind::Literal(datum) => Some(datum),
            _ => None,
        }
    }

    /// Whether this is a literal.
    pub fn is_literal(&self) -> bool {
        self.as_literal().is_some()
    }

    /// Whether this is the literal `true`.
    pub fn is_literal_true(&self) -> bool {
        self.as_literal() == Some(&Datum::True)
    }

    /// Whether this is the literal `false`.
    pub fn is_literal_false(&self) -> bool {
        self.as_literal() == Some(&Datum::False)
    }

    /// Whether this is the literal `null`.
    pub fn is_literal_null(&self) -> bool {
        self.as_literal() == Some(&Datum::Null)
    }

    /// Returns the parameter name if this is a variable reference.
    pub fn as_var(&self) -> Option<&str> {
        match self.kind() {
            ExprKind::Var(name) => Some(name),
            _ => None,
        }
    }

    /// Compares the immediate structure of two nodes: same variant, same
    /// operator or function node, same child nodes and same type.
    ///
    /// Children are compared by identity, not recursively, so two
    /// separately built copies of a tree are not `same_fields` unless they
    /// share their children.
    pub fn same_fields(&self, other: &ScalarExpr) -> bool {
        use ExprKind::*;
        if self.typ() != other.typ() {
            return false;
        }
        let same_all = |l: &[ScalarExpr], r: &[ScalarExpr]| {
            l.len() == r.len() && l.iter().zip(r).all(|(l, r)| l.ptr_eq(r))
        };
        match (self.kind(), other.kind()) {
            (Literal(l), Literal(r)) => l == r,
            (Var(l), Var(r)) => l == r,
            (Field { expr: l, index: li }, Field { expr: r, index: ri }) => {
                li == ri && l.ptr_eq(r)
            }
            (Tuple(l), Tuple(r)) => same_all(l, r),
            (Unary { func: lf, expr: l }, Unary { func: rf, expr: r }) => lf == rf && l.ptr_eq(r),
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
            ) => lf == rf && ll.ptr_eq(rl) && lr.ptr_eq(rr),
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
            ) => lc.ptr_eq(rc) && lt.ptr_eq(rt) && le.ptr_eq(re),
            (Cast { expr: l, to: lt }, Cast { expr: r, to: rt }) => lt == rt && l.ptr_eq(r),
            (Apply { func: lf, args: la }, Apply { func: rf, args: ra }) => {
                lf.ptr_eq(rf) && same_all(la, ra)
            }
            _ => false,
        }
    }

    /// Returns an equal tree in which every node, including function paths,
    /// is freshly allocated.
    pub fn deep_copy(&self) -> Result<ScalarExpr, RecursionLimitError> {
        Rewriter::new().deep_copy(self)
    }

    /// Rebuilds this node with each child replaced by the result of `f`.
    ///
    /// If `f` returns every child unchanged (by identity), `self` is
    /// returned as is, so that unchanged subtrees stay shared.
    pub fn try_map_children<F, E>(&self, mut f: F) -> Result<ScalarExpr, E>
    where
        F: FnMut(&ScalarExpr) -> Result<ScalarExpr, E>,
    {
        use ExprKind::*;
        let mut changed = false;
        let mut map = |child: &ScalarExpr| -> Result<ScalarExpr, E> {
            let new = f(child)?;
            changed |= !new.ptr_eq(child);
            Ok(new)
        };
        let kind = match self.kind() {
            Literal(_) | Var(_) => return Ok(self.clone()),
            Field { expr, index } => Field {
                expr: map(expr)?,
                index: *index,
            },
            Tuple(fields) => Tuple(fields.iter().map(&mut map).collect::<Result<_, _>>()?),
            Unary { func, expr } => Unary {
                func: *func,
                expr: map(expr)?,
            },
            Binary { func, left, right } => Binary {
                func: *func,
                left: map(left)?,
                right: map(right)?,
            },
            If { cond, then, els } => If {
                cond: map(cond)?,
                then: map(then)?,
                els: map(els)?,
            },
            Cast { expr, to } => Cast {
                expr: map(expr)?,
                to: to.clone(),
            },
            Apply { func, args } => Apply {
                func: func.clone(),
                args: args.iter().map(&mut map).collect::<Result<_, _>>()?,
            },
        };
        if changed {
            Ok(ScalarExpr::new(kind, self.typ().clone()))
        } else {
            Ok(self.clone())
        }
    }

    /// Rewrites the tree bottom-up.
    ///
    /// `f` is called on every node after its children have been rewritten,
    /// and its result replaces the node. Nodes along unchanged paths are
    /// shared with the original tree.
    pub fn rewrite_post<F, E>(&self, f: &mut F) -> Result<ScalarExpr, E>
    where
        F: FnMut(ScalarExpr) -> Result<ScalarExpr, E>,
        E: From<RecursionLimitError>,
    {
        Rewriter::new().rewrite_post(self, f)
    }

    /// Replaces every reference to the parameter `name` with a fresh copy of
    /// `replacement`.
    pub fn substitute(
        &self,
        name: &str,
        replacement: &ScalarExpr,
    ) -> Result<ScalarExpr, RecursionLimitError> {
        self.rewrite_post(&mut |e: ScalarExpr| match e.as_var() {
            Some(var) if var == name => replacement.deep_copy(),
            _ => Ok(e),
        })
    }

    /// Whether any function application in the tree satisfies `pred`.
    pub fn calls(&self, pred: &impl Fn(BuiltinFunc) -> bool) -> Result<bool, RecursionLimitError> {
        let mut found = false;
        self.visit_pre(&mut |e: &ScalarExpr| {
            if let ExprKind::Apply { func, .. } = e.kind() {
                found = found || pred(func.func());
            }
        })?;
        Ok(found)
    }

    /// Whether evaluating the expression twice on the same input always
    /// yields the same result and has no effect besides the result.
    ///
    /// Trees too deep to inspect are not pure.
    pub fn is_pure(&self) -> bool {
        !self
            .calls(&|func| !func.is_deterministic() || func.has_side_effects())
            .unwrap_or(true)
    }

    /// Whether the expression calls a side-effecting function.
    ///
    /// Trees too deep to inspect are assumed to.
    pub fn has_side_effects(&self) -> bool {
        self.calls(&|func| func.has_side_effects()).unwrap_or(true)
    }
}

impl VisitChildren<Self> for ScalarExpr {
    fn visit_children<F>(&self, mut f: F)
    where
        F: FnMut(&Self),
    {
        use ExprKind::*;
        match self.kind() {
            Literal(_) | Var(_) => (),
            Field { expr, .. } | Unary { expr, .. } | Cast { expr, .. } => f(expr),
            Tuple(exprs) | Apply { args: exprs, .. } => {
                for expr in exprs {
                    f(expr);
                }
            }
            Binary { left, right, .. } => {
                f(left);
                f(right);
            }
            If { cond, then, els } => {
                f(cond);
                f(then);
                f(els);
            }
        }
    }

    fn try_visit_children<F, E>(&self, mut f: F) -> Result<(), E>
    where
        F: FnMut(&Self) -> Result<(), E>,
        E: From<RecursionLimitError>,
    {
        use ExprKind::*;
        match self.kind() {
            Literal(_) | Var(_) => (),
            Field { expr, .. } | Unary { expr, .. } | Cast { expr, .. } => f(expr)?,
            Tuple(exprs) | Apply { args: exprs, .. } => {
                for expr in exprs {
                    f(expr)?;
                }
            }
            Binary { left, right, .. } => {
                f(left)?;
                f(right)?;
            }
            If { cond, then, els } => {
                f(cond)?;
                f(then)?;
                f(els)?;
            }
        }
        Ok(())
    }
}

struct Rewriter {
    recursion_guard: RecursionGuard,
}

impl CheckedRecursion for Rewriter {
    fn recursion_guard(&self) -> &RecursionGuard {
        &self.recursion_guard
    }
}

impl Rewriter {
    fn new() -> Self {
        Rewriter {
            recursion_guard: RecursionGuard::with_limit(RECURSION_LIMIT),
        }
    }

    fn rewrite_post<F, E>(&self, expr: &ScalarExpr, f: &mut F) -> Result<ScalarExpr, E>
    where
        F: FnMut(ScalarExpr) -> Result<ScalarExpr, E>,
        E: From<RecursionLimitError>,
    {
        self.checked_recur(|this| {
            let rebuilt = expr.try_map_children(|child| this.rewrite_post(child, f))?;
            f(rebuilt)
        })
    }

    fn deep_copy(&self, e: &ScalarExpr) -> Result<ScalarExpr, RecursionLimitError> {
        use ExprKind::*;
        self.checked_recur(|this| {
            let copy = |child: &ScalarExpr| this.deep_copy(child);
            let kind = match e.kind() {
                Literal(datum) => Literal(datum.clone()),
                Var(name) => Var(name.clone()),
                Field { expr, index } => Field {
                    expr: copy(expr)?,
                    index: *index,
                },
                Tuple(fields) => Tuple(fields.iter().map(copy).collect::<Result<_, _>>()?),
                Unary { func, expr } => Unary {
                    func: *func,
                    expr: copy(expr)?,
                },
                Binary { func, left, right } => Binary {
                    func: *func,
                    left: copy(left)?,
                    right: copy(right)?,
                },
                If { cond, then, els } => If {
                    cond: copy(cond)?,
                    then: copy(then)?,
                    els: copy(els)?,
                },
                Cast { expr, to } => Cast {
                    expr: copy(expr)?,
                    to: to.clone(),
                },
                Apply { func, args } => Apply {
                    func: func.deep_copy(),
                    args: args.iter().map(copy).collect::<Result<_, _>>()?,
                },
            };
            Ok(ScalarExpr::new(kind, e.typ().clone()))
        })
    }
}

impl fmt::Display for ScalarExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ExprKind::*;
        match self.kind() {
            Literal(datum) => write!(f, "{}", datum),
            Var(name) => f.write_str(name),
            Field { expr, index } => write!(f, "{}.{}", expr, index),
            Tuple(fields) => write!(f, "({})", fields.iter().join(", ")),
            Unary { func, expr } => match func {
                UnaryFunc::Not => write!(f, "NOT {}", expr),
                UnaryFunc::Neg => write!(f, "-{}", expr),
                UnaryFunc::IsNull | UnaryFunc::IsNotNull => write!(f, "({} {})", expr, func),
            },
            Binary { func, left, right } => write!(f, "({} {} {})", left, func, right),
            If { cond, then, els } => write!(f, "if {} then {} else {}", cond, then, els),
            Cast { expr, to } => write!(f, "{}::{}", expr, to),
            Apply { func, args } => write!(f, "{}({})", func, args.iter().join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn row_type() -> ColumnType {
        ScalarType::Record {
            fields: vec![
                ScalarType::Int32.nullable(false),
                ScalarType::String.nullable(true),
            ],
        }
        .nullable(false)
    }

    fn node_ids(expr: &ScalarExpr) -> BTreeSet<usize> {
        let mut ids = BTreeSet::new();
        expr.visit_pre(&mut |e: &ScalarExpr| {
            ids.insert(e.id());
        })
        .unwrap();
        ids
    }

    #[zf_ore::test]
    fn constructors_compute_types() {
        let t = ScalarExpr::var("t", row_type());
        let name = t.field(1).unwrap();
        assert_eq!(name.typ(), &ScalarType::String.nullable(true));
        let upper = ScalarExpr::apply(BuiltinFunc::Upper, vec![name.clone()]).unwrap();
        assert_eq!(upper.typ(), &ScalarType::String.nullable(true));
        let is_null = name.is_null();
        assert_eq!(is_null.typ(), &ScalarType::Bool.nullable(false));

        assert!(matches!(t.field(2), Err(TypeError::NoSuchField { index: 2, .. })));
        let id = t.field(0).unwrap();
        assert!(matches!(
            id.call_binary(&name, BinaryFunc::Add),
            Err(TypeError::InvalidOperand { .. })
        ));
        assert!(ScalarExpr::literal(Datum::Null, ScalarType::Int32.nullable(false)).is_err());
    }

    #[zf_ore::test]
    fn nullable_records_make_fields_nullable() {
        let t = ScalarExpr::var("t", row_type().nullable(true));
        assert_eq!(
            t.field(0).unwrap().typ(),
            &ScalarType::Int32.nullable(true)
        );
    }

    #[zf_ore::test]
    fn same_fields_compares_identity_of_children() {
        let t = ScalarExpr::var("t", row_type());
        let f = t.field(0).unwrap();
        let a = f.call_binary(&f, BinaryFunc::Add).unwrap();
        let b = f.call_binary(&f, BinaryFunc::Add).unwrap();
        assert!(a.same_fields(&b));
        assert!(!a.ptr_eq(&b));

        let g = t.field(0).unwrap();
        let c = f.call_binary(&g, BinaryFunc::Add).unwrap();
        assert!(!a.same_fields(&c));
        assert_eq!(a, c);

        let d = f.call_binary(&f, BinaryFunc::Mul).unwrap();
        assert!(!a.same_fields(&d));
    }

    #[zf_ore::test]
    fn same_fields_compares_function_paths() {
        let s = ScalarExpr::var("t", row_type()).field(1).unwrap();
        let path = FuncPath::new(BuiltinFunc::Upper);
        let a = ScalarExpr::apply_path(path.clone(), vec![s.clone()]).unwrap();
        let b = ScalarExpr::apply_path(path, vec![s.clone()]).unwrap();
        let c = ScalarExpr::apply(BuiltinFunc::Upper, vec![s]).unwrap();
        assert!(a.same_fields(&b));
        assert!(!a.same_fields(&c));
    }

    #[zf_ore::test]
    fn deep_copy_shares_no_nodes() {
        let t = ScalarExpr::var("t", row_type());
        let f = t.field(0).unwrap();
        let sum = f.call_binary(&f, BinaryFunc::Add).unwrap();
        let expr = ScalarExpr::tuple(vec![sum.clone(), sum, t.field(1).unwrap()]);

        let copy = expr.deep_copy().unwrap();
        assert_eq!(copy, expr);
        assert!(node_ids(&copy).is_disjoint(&node_ids(&expr)));
    }

    #[zf_ore::test]
    fn replace_arguments_keeps_function_and_type() {
        let t = ScalarExpr::var("t", row_type());
        let call = ScalarExpr::apply(BuiltinFunc::Coalesce, vec![t.field(1).unwrap()]).unwrap();
        let fallback = ScalarExpr::literal_ok(Datum::from("none"), ScalarType::String).unwrap();
        let replaced = call.replace_arguments(vec![fallback.clone()]).unwrap();
        let (ExprKind::Apply { func: old, .. }, ExprKind::Apply { func: new, args }) =
            (call.kind(), replaced.kind())
        else {
            panic!("expected applications");
        };
        assert!(old.ptr_eq(new));
        assert!(args[0].ptr_eq(&fallback));
        assert_eq!(replaced.typ(), call.typ());

        assert!(call.replace_arguments(vec![t.field(0).unwrap()]).is_err());
        assert!(call.replace_arguments(vec![]).is_err());
        assert!(t.replace_arguments(vec![]).is_err());
    }

    #[zf_ore::test]
    fn rewrite_shares_unchanged_subtrees() {
        let t = ScalarExpr::var("t", row_type());
        let left = t.field(0).unwrap().is_null();
        let right = ScalarExpr::apply(BuiltinFunc::CharLength, vec![t.field(1).unwrap()]).unwrap();
        let expr = ScalarExpr::tuple(vec![left.clone(), right.clone()]);

        let rewritten = expr
            .rewrite_post(&mut |e: ScalarExpr| -> Result<_, RecursionLimitError> {
                if let ExprKind::Apply { .. } = e.kind() {
                    Ok(ScalarExpr::literal_ok(Datum::Int32(0), ScalarType::Int32).unwrap())
                } else {
                    Ok(e)
                }
            })
            .unwrap();
        let ExprKind::Tuple(fields) = rewritten.kind() else {
            panic!("expected a tuple");
        };
        assert!(fields[0].ptr_eq(&left));
        assert!(!fields[1].ptr_eq(&right));
        assert_eq!(rewritten.to_string(), "((t.0 IS NULL), 0)");
    }

    #[zf_ore::test]
    fn substitute_copies_the_replacement() {
        let t = ScalarExpr::var("t", row_type());
        let body = t.field(0).unwrap().call_binary(&t.field(0).unwrap(), BinaryFunc::Add).unwrap();
        let replacement = ScalarExpr::var("u", row_type());
        let substituted = body.substitute("t", &replacement).unwrap();
        assert_eq!(substituted.to_string(), "(u.0 + u.0)");
        let ExprKind::Binary { left, right, .. } = substituted.kind() else {
            panic!("expected a binary expression");
        };
        let (ExprKind::Field { expr: l, .. }, ExprKind::Field { expr: r, .. }) =
            (left.kind(), right.kind())
        else {
            panic!("expected field accesses");
        };
        assert!(!l.ptr_eq(r));
    }

    #[zf_ore::test]
    fn purity() {
        let now = ScalarExpr::apply(BuiltinFunc::Now, vec![]).unwrap();
        assert!(!now.is_pure());
        assert!(!now.has_side_effects());
        let logged = ScalarExpr::apply(BuiltinFunc::Log, vec![ScalarExpr::literal_true()]).unwrap();
        let expr = ScalarExpr::tuple(vec![logged]);
        assert!(expr.has_side_effects());
        assert!(ScalarExpr::literal_true().is_pure());
    }

    #[zf_ore::test]
    fn deep_trees_hit_the_recursion_limit() {
        let negations = |depth| {
            let mut expr = ScalarExpr::literal_true();
            for _ in 0..depth {
                expr = expr.not().unwrap();
            }
            expr
        };
        let deep = negations(RECURSION_LIMIT + 10);
        assert!(deep.deep_copy().is_err());
        assert!(deep.calls(&|_| true).is_err());
        assert!(!deep.is_pure());
        assert!(deep.has_side_effects());

        let shallow = negations(RECURSION_LIMIT / 2);
        assert_eq!(shallow.deep_copy().unwrap(), shallow);
        assert!(shallow.is_pure());
    }
}
