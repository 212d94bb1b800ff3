// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Removes operators whose output cannot reach a declared output.

use std::collections::BTreeSet;

use zf_circuit::{Circuit, FixpointOperator, OperatorId, OperatorKind};

use crate::TransformError;

/// Removes operators whose output cannot reach a declared output.
///
/// Declared inputs are kept even when unused, so that the interface of the
/// circuit does not change. An operator stays alive if a live operator
/// consumes it or collects its state with it. Fixpoint imports that the
/// body no longer reads are dropped.
#[derive(Debug)]
pub struct DeadCodeElimination;

impl crate::Transform for DeadCodeElimination {
    #[tracing::instrument(
        target = "optimizer",
        level = "trace",
        skip_all,
        fields(path.segment = "dead_code_elimination")
    )]
    fn transform(&self, circuit: &mut Circuit) -> Result<(), TransformError> {
        let mut removed = 0;
        crate::try_visit_circuits(circuit, &mut |circuit, roots| {
            prune_imports(circuit)?;
            removed += self.action(circuit, roots)?;
            Ok(())
        })?;
        tracing::debug!(target: "optimizer", removed, "removed dead operators");
        crate::trace_circuit(circuit);
        Ok(())
    }
}

impl DeadCodeElimination {
    /// Removes the dead operators of `circuit`, treating `roots` as live.
    /// Returns the number of removed operators.
    pub fn action(&self, circuit: &mut Circuit, roots: &[OperatorId]) -> Result<usize, TransformError> {
        let mut todo: Vec<OperatorId> = roots.to_vec();
        for (id, op) in circuit.iter() {
            if matches!(
                op.kind,
                OperatorKind::Source { .. } | OperatorKind::Sink { .. }
            ) {
                todo.push(id);
            }
        }
        let mut live = BTreeSet::new();
        while let Some(id) = todo.pop() {
            if !live.insert(id) {
                continue;
            }
            let op = circuit.get(id).ok_or_else(|| {
                TransformError::Internal(format!("dangling reference to {}", id))
            })?;
            todo.extend(op.kind.dependencies());
        }

        let dead = circuit
            .ids()
            .into_iter()
            .filter(|id| !live.contains(id))
            .collect::<Vec<_>>();
        // Consumers before their inputs.
        for id in dead.iter().rev() {
            tracing::trace!(target: "optimizer", %id, "removing dead operator");
            circuit.remove(*id)?;
        }

        for (id, op) in circuit.iter() {
            for dep in op.kind.dependencies() {
                if !circuit.contains(dep) {
                    return Err(TransformError::Internal(format!(
                        "operator {} refers to removed operator {}",
                        id, dep
                    )));
                }
            }
        }
        Ok(dead.len())
    }
}

/// Drops the imports of the fixpoints of `circuit` that their bodies do not
/// read, renumbering the remaining ones.
fn prune_imports(circuit: &mut Circuit) -> Result<(), TransformError> {
    for id in circuit.ids() {
        let fixpoint = match circuit.get(id).map(|op| &op.kind) {
            Some(OperatorKind::Fixpoint(fixpoint)) => fixpoint,
            _ => continue,
        };
        let used = fixpoint
            .body
            .iter()
            .filter_map(|(_, op)| match &op.kind {
                OperatorKind::Import { index, .. } => Some(*index),
                _ => None,
            })
            .collect::<BTreeSet<_>>();
        if used.len() == fixpoint.imports.len() {
            continue;
        }
        let mut pruned = FixpointOperator {
            imports: used
                .iter()
                .filter_map(|index| fixpoint.imports.get(*index).copied())
                .collect(),
            ..(**fixpoint).clone()
        };
        for body_id in pruned.body.ids() {
            let kind = match pruned.body.get(body_id).map(|op| &op.kind) {
                Some(OperatorKind::Import { index, typ }) => OperatorKind::Import {
                    index: used.range(..*index).count(),
                    typ: typ.clone(),
                },
                _ => continue,
            };
            pruned.body.replace(body_id, kind)?;
        }
        tracing::trace!(
            target: "optimizer",
            %id,
            imports = pruned.imports.len(),
            "pruned fixpoint imports"
        );
        circuit.replace(id, OperatorKind::Fixpoint(Box::new(pruned)))?;
    }
    Ok(())
}
