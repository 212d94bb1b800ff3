// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Hook-based traversal of expressions, closures and their types.
//!
//! An [`InnerVisitor`] observes every node of an expression tree through a
//! `preorder` hook, which decides whether to descend into the node's
//! children, and a `postorder` hook, which runs after all children were
//! visited. The walk keeps a [`VisitContext`] holding the ancestors of the
//! current node, so that hooks can ask where they are without threading
//! that state themselves.
//!
//! Children are visited in a fixed order. An expression first visits its
//! type, then the children documented on its [`ExprKind`] variant. A record
//! type visits its field types. A closure visits the type of each parameter,
//! then its body.

use zf_ore::stack::{CheckedRecursion, RecursionGuard, RecursionLimitError};
use zf_repr::ColumnType;

use crate::{Closure, ExprKind, FuncPath, ScalarExpr, RECURSION_LIMIT};

/// What a walk does after a node's `preorder` hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisitDecision {
    /// Visit the node's children, then call its `postorder` hook.
    Continue,
    /// Skip the node's children and its `postorder` hook.
    Stop,
}

/// A node of an expression tree, as seen by an [`InnerVisitor`].
#[derive(Clone, Copy, Debug)]
pub enum InnerNode<'a> {
    Expr(&'a ScalarExpr),
    Type(&'a ColumnType),
    Closure(&'a Closure),
    Path(&'a FuncPath),
}

impl<'a> InnerNode<'a> {
    /// The direct children of the node, in visiting order.
    pub fn children(&self) -> Vec<InnerNode<'a>> {
        match *self {
            InnerNode::Expr(expr) => {
                let mut children = vec![InnerNode::Type(expr.typ())];
                match expr.kind() {
                    ExprKind::Literal(_) | ExprKind::Var(_) => {}
                    ExprKind::Field { expr, .. }
                    | ExprKind::Unary { expr, .. }
                    | ExprKind::Cast { expr, .. } => children.push(InnerNode::Expr(expr)),
                    ExprKind::Tuple(fields) => children.extend(fields.iter().map(InnerNode::Expr)),
                    ExprKind::Binary { left, right, .. } => {
                        children.extend([InnerNode::Expr(left), InnerNode::Expr(right)])
                    }
                    ExprKind::If { cond, then, els } => children.extend([
                        InnerNode::Expr(cond),
                        InnerNode::Expr(then),
                        InnerNode::Expr(els),
                    ]),
                    ExprKind::Apply { func, args } => {
                        children.push(InnerNode::Path(func));
                        children.extend(args.iter().map(InnerNode::Expr));
                    }
                }
                children
            }
            InnerNode::Type(typ) => typ
                .scalar_type
                .record_fields()
                .unwrap_or_default()
                .iter()
                .map(InnerNode::Type)
                .collect(),
            InnerNode::Closure(closure) => closure
                .params
                .iter()
                .map(|param| InnerNode::Type(&param.typ))
                .chain(std::iter::once(InnerNode::Expr(&closure.body)))
                .collect(),
            InnerNode::Path(_) => vec![],
        }
    }

    /// Whether `self` and `other` are the same node, not merely equal ones.
    pub fn is(&self, other: &InnerNode) -> bool {
        match (self, other) {
            (InnerNode::Expr(l), InnerNode::Expr(r)) => l.ptr_eq(r),
            (InnerNode::Type(l), InnerNode::Type(r)) => std::ptr::eq(*l, *r),
            (InnerNode::Closure(l), InnerNode::Closure(r)) => std::ptr::eq(*l, *r),
            (InnerNode::Path(l), InnerNode::Path(r)) => l.ptr_eq(r),
            _ => false,
        }
    }

    pub fn as_expr(&self) -> Option<&'a ScalarExpr> {
        match self {
            InnerNode::Expr(expr) => Some(expr),
            _ => None,
        }
    }
}

/// The ancestors of the node being visited, innermost last.
#[derive(Debug, Default)]
pub struct VisitContext<'a> {
    stack: Vec<InnerNode<'a>>,
}

impl<'a> VisitContext<'a> {
    fn push(&mut self, node: InnerNode<'a>) {
        self.stack.push(node);
    }

    fn pop(&mut self) {
        self.stack.pop();
    }

    /// The parent of the node being visited, if it is not the root.
    pub fn parent(&self) -> Option<InnerNode<'a>> {
        self.stack.last().copied()
    }

    /// The ancestors of the node being visited, from the root down.
    pub fn ancestors(&self) -> &[InnerNode<'a>] {
        &self.stack
    }

    /// Whether the node being visited is a descendant of `node`.
    pub fn is_inside(&self, node: &InnerNode) -> bool {
        self.stack.iter().any(|ancestor| ancestor.is(node))
    }

    /// Whether some ancestor satisfies `pred`.
    pub fn any_ancestor(&self, pred: impl Fn(&InnerNode<'a>) -> bool) -> bool {
        self.stack.iter().any(pred)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// Hooks invoked by [`walk`].
pub trait InnerVisitor<'a> {
    /// Called before any child of `node` is visited.
    fn preorder(&mut self, _node: InnerNode<'a>, _ctx: &VisitContext<'a>) -> VisitDecision {
        VisitDecision::Continue
    }

    /// Called after all children of `node` were visited.
    fn postorder(&mut self, _node: InnerNode<'a>, _ctx: &VisitContext<'a>) {}
}

/// Walks the tree rooted at `root`, invoking the hooks of `visitor`.
pub fn walk<'a, V>(root: InnerNode<'a>, visitor: &mut V) -> Result<(), RecursionLimitError>
where
    V: InnerVisitor<'a>,
{
    Walker {
        visitor,
        ctx: VisitContext::default(),
        recursion_guard: RecursionGuard::with_limit(RECURSION_LIMIT),
    }
    .visit(root)
}

struct Walker<'a, 'v, V> {
    visitor: &'v mut V,
    ctx: VisitContext<'a>,
    recursion_guard: RecursionGuard,
}

impl<'a, 'v, V> CheckedRecursion for Walker<'a, 'v, V> {
    fn recursion_guard(&self) -> &RecursionGuard {
        &self.recursion_guard
    }
}

impl<'a, 'v, V: InnerVisitor<'a>> Walker<'a, 'v, V> {
    fn visit(&mut self, node: InnerNode<'a>) -> Result<(), RecursionLimitError> {
        self.checked_recur_mut(|walker| {
            if walker.visitor.preorder(node, &walker.ctx) == VisitDecision::Stop {
                return Ok(());
            }
            walker.ctx.push(node);
            for child in node.children() {
                walker.visit(child)?;
            }
            walker.ctx.pop();
            walker.visitor.postorder(node, &walker.ctx);
            Ok(())
        })
    }
}
