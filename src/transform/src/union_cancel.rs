// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Detects an input being unioned with its negation and cancels them out.

use zf_circuit::{Circuit, OperatorId, OperatorKind};
use zf_repr::ZSet;

use crate::TransformError;

/// Detects an input being unioned with its negation and cancels them out.
///
/// A union left with a single input is bypassed, and a union left with
/// none becomes an empty constant. Branches are only dropped if the type of
/// the union stays the same.
#[derive(Debug)]
pub struct UnionBranchCancellation;

impl crate::Transform for UnionBranchCancellation {
    #[tracing::instrument(
        target = "optimizer",
        level = "trace",
        skip_all,
        fields(path.segment = "union_branch_cancellation")
    )]
    fn transform(&self, circuit: &mut Circuit) -> Result<(), TransformError> {
        let mut changed = 0;
        crate::try_visit_circuits(circuit, &mut |circuit, _| {
            for id in circuit.ids() {
                if self.action(circuit, id)? {
                    changed += 1;
                }
            }
            Ok(())
        })?;
        tracing::debug!(target: "optimizer", changed, "cancelled union branches");
        crate::trace_circuit(circuit);
        Ok(())
    }
}

impl UnionBranchCancellation {
    /// Cancels the branches of union `id`. Returns whether the circuit
    /// changed.
    pub fn action(&self, circuit: &mut Circuit, id: OperatorId) -> Result<bool, TransformError> {
        let (inputs, typ) = match circuit.get(id) {
            Some(op) => match &op.kind {
                OperatorKind::Union { inputs } => (inputs.clone(), op.typ.clone()),
                _ => return Ok(false),
            },
            None => return Ok(false),
        };
        let negated = |branch: OperatorId| match circuit.get(branch).map(|op| &op.kind) {
            Some(OperatorKind::Negate { input }) => Some(*input),
            _ => None,
        };

        let mut remaining: Vec<Option<OperatorId>> = inputs.iter().copied().map(Some).collect();
        for i in 0..remaining.len() {
            let Some(branch) = remaining[i] else {
                continue;
            };
            let inverse = (0..remaining.len()).find(|j| {
                *j != i
                    && remaining[*j].is_some_and(|other| {
                        negated(other) == Some(branch) || negated(branch) == Some(other)
                    })
            });
            if let Some(j) = inverse {
                remaining[i] = None;
                remaining[j] = None;
            }
        }
        let remaining = remaining.into_iter().flatten().collect::<Vec<_>>();
        if remaining.len() == inputs.len() {
            return self.bypass(circuit, id, &remaining, &typ);
        }

        let mut remaining_typ = None;
        for branch in &remaining {
            let branch_typ = circuit.typ(*branch)?;
            remaining_typ = Some(match remaining_typ {
                None => branch_typ.clone(),
                Some(t) => match branch_typ.union(&t) {
                    Ok(t) => t,
                    Err(_) => return Ok(false),
                },
            });
        }
        let kind = match remaining_typ {
            None => OperatorKind::Constant {
                rows: ZSet::new(),
                typ,
            },
            Some(remaining_typ) if remaining_typ == typ => OperatorKind::Union { inputs: remaining },
            Some(_) => return Ok(false),
        };
        tracing::trace!(target: "optimizer", %id, "cancelled union branches");
        circuit.replace(id, kind)?;
        Ok(true)
    }

    /// Makes the consumers of a union of a single input consume the input.
    fn bypass(
        &self,
        circuit: &mut Circuit,
        id: OperatorId,
        inputs: &[OperatorId],
        typ: &zf_repr::RelationType,
    ) -> Result<bool, TransformError> {
        match inputs {
            [input] if circuit.typ(*input)? == typ => Ok(circuit.redirect(id, *input)? > 0),
            _ => Ok(false),
        }
    }
}
