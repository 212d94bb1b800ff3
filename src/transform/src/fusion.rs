// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Fuses chains of per-tuple operators into a single operator.
//!
//! A `Map`, `Filter` or `FilterMap` whose only consumer is another such
//! operator is folded into its consumer, and pairs of `Negate` operators
//! cancel out. The consumers of the rewritten operator are compared with
//! the equivalence engine before and after each rewrite.

use zf_circuit::equivalence::shallow_equivalent;
use zf_circuit::{Circuit, Operator, OperatorId, OperatorKind};
use zf_expr::{Closure, EquivalenceContext, ScalarExpr};

use crate::TransformError;

/// Fuses chains of per-tuple operators into a single operator.
#[derive(Debug)]
pub struct Fusion;

impl crate::Transform for Fusion {
    #[tracing::instrument(
        target = "optimizer",
        level = "trace",
        skip_all,
        fields(path.segment = "fusion")
    )]
    fn transform(&self, circuit: &mut Circuit) -> Result<(), TransformError> {
        let mut fused = 0;
        crate::try_visit_circuits(circuit, &mut |circuit, roots| {
            for id in circuit.ids() {
                if self.action(circuit, id, roots)? {
                    fused += 1;
                }
            }
            Ok(())
        })?;
        tracing::debug!(target: "optimizer", fused, "fused operators");
        crate::trace_circuit(circuit);
        Ok(())
    }
}

/// An operator in the shape of a filter followed by a map.
struct Stage {
    input: OperatorId,
    predicate: Option<Closure>,
    func: Option<Closure>,
}

impl Stage {
    fn of(kind: &OperatorKind) -> Option<Stage> {
        match kind {
            OperatorKind::Map { input, func } => Some(Stage {
                input: *input,
                predicate: None,
                func: Some(func.clone()),
            }),
            OperatorKind::Filter { input, predicate } => Some(Stage {
                input: *input,
                predicate: Some(predicate.clone()),
                func: None,
            }),
            OperatorKind::FilterMap {
                input,
                predicate,
                func,
            } => Some(Stage {
                input: *input,
                predicate: Some(predicate.clone()),
                func: Some(func.clone()),
            }),
            _ => None,
        }
    }

    fn into_kind(self) -> Option<OperatorKind> {
        let input = self.input;
        match (self.predicate, self.func) {
            (Some(predicate), Some(func)) => Some(OperatorKind::FilterMap {
                input,
                predicate,
                func,
            }),
            (Some(predicate), None) => Some(OperatorKind::Filter { input, predicate }),
            (None, Some(func)) => Some(OperatorKind::Map { input, func }),
            (None, None) => None,
        }
    }
}

impl Fusion {
    /// Fuses the input of operator `id` into it, if that is possible.
    /// Returns whether the circuit changed.
    ///
    /// `roots` are operators referenced from outside the circuit, which
    /// must be preserved.
    pub fn action(
        &self,
        circuit: &mut Circuit,
        id: OperatorId,
        roots: &[OperatorId],
    ) -> Result<bool, TransformError> {
        let Some(op) = circuit.get(id) else {
            return Ok(false);
        };
        if let OperatorKind::Negate { input } = op.kind {
            return self.cancel_negations(circuit, id, input, roots);
        }
        let Some(input) = Stage::of(&op.kind).map(|stage| stage.input) else {
            return Ok(false);
        };
        if roots.contains(&input) || circuit.consumers(input) != [id] {
            return Ok(false);
        }
        match fuse(circuit, input, id) {
            Ok(()) => Ok(true),
            Err(TransformError::Unsound { operator, reason }) => {
                tracing::trace!(target: "optimizer", %operator, %reason, "not fusing");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Makes the consumers of `Negate(Negate(x))` consume `x`.
    fn cancel_negations(
        &self,
        circuit: &mut Circuit,
        id: OperatorId,
        input: OperatorId,
        roots: &[OperatorId],
    ) -> Result<bool, TransformError> {
        if roots.contains(&id) {
            return Ok(false);
        }
        let inner = match circuit.get(input).map(|op| &op.kind) {
            Some(OperatorKind::Negate { input }) => *input,
            _ => return Ok(false),
        };
        if circuit.typ(inner)? != circuit.typ(id)? {
            return Ok(false);
        }
        Ok(circuit.redirect(id, inner)? > 0)
    }
}

/// Fuses operator `upstream` into its consumer `downstream`, and removes
/// `upstream`.
///
/// Both operators must be a `Map`, `Filter` or `FilterMap`, and
/// `downstream` must be the only consumer of `upstream`. Fails with
/// [`TransformError::Unsound`] if either operator has side effects, or if
/// the fused operator would evaluate the closures of `upstream` a different
/// number of times and they are not pure.
pub fn fuse(
    circuit: &mut Circuit,
    upstream: OperatorId,
    downstream: OperatorId,
) -> Result<(), TransformError> {
    let (up, down) = match (circuit.get(upstream), circuit.get(downstream)) {
        (Some(up), Some(down)) => (up, down),
        _ => {
            return Err(TransformError::Internal(format!(
                "cannot fuse unknown operators {} and {}",
                upstream, downstream
            )))
        }
    };
    let (Some(u), Some(d)) = (Stage::of(&up.kind), Stage::of(&down.kind)) else {
        return Err(TransformError::unsound(
            downstream,
            format!("cannot fuse {} into {}", up.kind.name(), down.kind.name()),
        ));
    };
    if d.input != upstream || circuit.consumers(upstream) != [downstream] {
        return Err(TransformError::unsound(
            upstream,
            "fusing would lose a consumer",
        ));
    }
    for (id, op) in [(upstream, up), (downstream, down)] {
        if op.kind.has_side_effects() {
            return Err(TransformError::unsound(id, "operator has side effects"));
        }
    }
    if u.func.as_ref().is_some_and(|func| !func.is_pure()) {
        return Err(TransformError::unsound(
            upstream,
            "fusing would re-evaluate a non-deterministic function",
        ));
    }

    // The downstream closures, applied to the output of the upstream map.
    let compose = |closure: Closure| match &u.func {
        Some(func) => closure.compose(func),
        None => Ok(closure),
    };
    let predicate = match (u.predicate, d.predicate) {
        (p, None) => p,
        (None, Some(q)) => Some(compose(q)?),
        (Some(p), Some(q)) => Some(conjoin(&p, &compose(q)?)?),
    };
    let func = match (d.func, &u.func) {
        (Some(g), _) => Some(compose(g)?),
        (None, f) => f.clone(),
    };
    let fused = Stage {
        input: u.input,
        predicate,
        func,
    }
    .into_kind()
    .ok_or_else(|| TransformError::Internal("fused operator is empty".into()))?;

    let consumers = snapshot(circuit, downstream);
    circuit.replace(downstream, fused)?;
    circuit.remove(upstream)?;
    check_consumers(circuit, downstream, consumers)?;
    tracing::trace!(target: "optimizer", %upstream, %downstream, "fused");
    Ok(())
}

/// `|t| if p(t) then q(t) else false`, so that `q` is only evaluated on the
/// tuples `p` accepts.
fn conjoin(p: &Closure, q: &Closure) -> Result<Closure, TransformError> {
    let ([mine], [theirs]) = (p.params.as_slice(), q.params.as_slice()) else {
        return Err(TransformError::Internal(format!(
            "cannot conjoin {} and {}",
            p, q
        )));
    };
    let q = if mine.name == theirs.name {
        q.body.clone()
    } else {
        q.body.substitute(&theirs.name, &mine.var())?
    };
    let body = ScalarExpr::if_then_else(p.body.clone(), q, ScalarExpr::literal_false())
        .map_err(|e| TransformError::Internal(e.to_string()))?;
    Ok(Closure::new(p.params.clone(), body))
}

fn snapshot(circuit: &Circuit, id: OperatorId) -> Vec<(OperatorId, Operator)> {
    circuit
        .consumers(id)
        .into_iter()
        .filter_map(|consumer| circuit.get(consumer).map(|op| (consumer, op.clone())))
        .collect()
}

/// Confirms that the rewrite of `id` kept its consumers and left them
/// unchanged.
fn check_consumers(
    circuit: &Circuit,
    id: OperatorId,
    before: Vec<(OperatorId, Operator)>,
) -> Result<(), TransformError> {
    let after = snapshot(circuit, id);
    if after.len() != before.len() {
        return Err(TransformError::Internal(format!(
            "operator {} lost {} consumers",
            id,
            before.len().saturating_sub(after.len())
        )));
    }
    let mut cx = EquivalenceContext::new();
    for ((old_id, old), (new_id, new)) in before.iter().zip(&after) {
        if old_id != new_id
            || old.kind.dependencies() != new.kind.dependencies()
            || !shallow_equivalent(&mut cx, old, new)?
        {
            return Err(TransformError::Internal(format!(
                "consumer {} of {} changed while fusing",
                old_id, id
            )));
        }
    }
    Ok(())
}
