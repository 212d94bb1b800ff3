// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Hook-based traversal of circuits.
//!
//! [`walk`] visits the operators of a circuit in topological order. A
//! fixpoint operator's body is walked between the fixpoint's `preorder` and
//! `postorder` hooks, and the [`CircuitContext`] records the fixpoints
//! enclosing the operator being visited.

use zf_expr::RECURSION_LIMIT;
use zf_ore::stack::{CheckedRecursion, RecursionGuard, RecursionLimitError};

pub use zf_expr::VisitDecision;

use crate::{Circuit, Operator, OperatorId, OperatorKind};

/// The fixpoint operators enclosing the operator being visited, outermost
/// first.
#[derive(Debug, Default)]
pub struct CircuitContext {
    fixpoints: Vec<OperatorId>,
}

impl CircuitContext {
    /// The innermost enclosing fixpoint, if any.
    pub fn enclosing(&self) -> Option<OperatorId> {
        self.fixpoints.last().copied()
    }

    pub fn fixpoints(&self) -> &[OperatorId] {
        &self.fixpoints
    }

    /// Whether the operator being visited is part of a fixpoint body.
    pub fn in_fixpoint(&self) -> bool {
        !self.fixpoints.is_empty()
    }
}

/// Hooks invoked by [`walk`].
pub trait CircuitVisitor<'a> {
    /// Called before the body of a fixpoint is walked. Returning
    /// [`VisitDecision::Stop`] skips the body and the `postorder` hook.
    fn preorder(
        &mut self,
        _id: OperatorId,
        _op: &'a Operator,
        _ctx: &CircuitContext,
    ) -> VisitDecision {
        VisitDecision::Continue
    }

    fn postorder(&mut self, _id: OperatorId, _op: &'a Operator, _ctx: &CircuitContext) {}
}

/// Walks `circuit`, invoking the hooks of `visitor`.
pub fn walk<'a, V>(circuit: &'a Circuit, visitor: &mut V) -> Result<(), RecursionLimitError>
where
    V: CircuitVisitor<'a>,
{
    Walker {
        visitor,
        ctx: CircuitContext::default(),
        recursion_guard: RecursionGuard::with_limit(RECURSION_LIMIT),
    }
    .walk(circuit)
}

struct Walker<'v, V> {
    visitor: &'v mut V,
    ctx: CircuitContext,
    recursion_guard: RecursionGuard,
}

impl<'v, V> CheckedRecursion for Walker<'v, V> {
    fn recursion_guard(&self) -> &RecursionGuard {
        &self.recursion_guard
    }
}

impl<'a, 'v, V: CircuitVisitor<'a>> Walker<'v, V> {
    fn walk(&mut self, circuit: &'a Circuit) -> Result<(), RecursionLimitError> {
        self.checked_recur_mut(|walker| {
            for (id, op) in circuit.iter() {
                if walker.visitor.preorder(id, op, &walker.ctx) == VisitDecision::Stop {
                    continue;
                }
                if let OperatorKind::Fixpoint(fixpoint) = &op.kind {
                    walker.ctx.fixpoints.push(id);
                    walker.walk(&fixpoint.body)?;
                    walker.ctx.fixpoints.pop();
                }
                walker.visitor.postorder(id, op, &walker.ctx);
            }
            Ok(())
        })
    }
}
