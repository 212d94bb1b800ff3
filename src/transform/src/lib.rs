// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Transformations of incremental dataflow circuits.
//!
//! This crate contains the passes that rewrite a [`Circuit`] produced by
//! the lowering into a smaller circuit computing the same outputs. The core
//! trait is [`Transform`], and many implementors of this trait can be boxed
//! and iterated over. [`Fixpoint`] repeats a list of transforms until the
//! circuit no longer changes, and the [`Optimizer`] runs the default
//! pipeline followed by a final validation of the circuit.
//!
//! Passes never change the type of an operator, and they apply to the
//! bodies of fixpoint operators as well as to the top-level circuit.

#![deny(missing_debug_implementations)]

use std::fmt;

use serde::{Deserialize, Serialize};
use zf_circuit::{Circuit, CircuitError, OperatorId, OperatorKind};
use zf_expr::{ExprError, RECURSION_LIMIT};
use zf_ore::stack::{CheckedRecursion, RecursionGuard, RecursionLimitError};

pub mod cse;
pub mod dead_code;
pub mod fusion;
pub mod reduction;
pub mod union_cancel;

/// Types capable of transforming circuits.
pub trait Transform: fmt::Debug {
    /// Transforms a circuit into a functionally equivalent circuit.
    fn transform(&self, circuit: &mut Circuit) -> Result<(), TransformError>;

    /// A string describing the transform.
    ///
    /// This is useful mainly when iterating through many `Box<Transform>`
    /// and one wants to judge progress before some defect occurs.
    fn debug(&self) -> String {
        format!("{:?}", self)
    }
}

/// Errors that can occur during a transformation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    /// A broken invariant, detected by a pass.
    #[error("internal transform error: {0}")]
    Internal(String),
    /// A requested rewrite would change what the circuit computes.
    #[error("unsound rewrite of {operator}: {reason}")]
    Unsound { operator: OperatorId, reason: String },
    #[error(transparent)]
    Circuit(#[from] CircuitError),
    #[error(transparent)]
    RecursionLimit(#[from] RecursionLimitError),
}

impl TransformError {
    pub(crate) fn unsound(operator: OperatorId, reason: impl Into<String>) -> TransformError {
        TransformError::Unsound {
            operator,
            reason: reason.into(),
        }
    }

    /// The operator the error refers to, if known.
    pub fn operator(&self) -> Option<OperatorId> {
        match self {
            TransformError::Unsound { operator, .. } => Some(*operator),
            TransformError::Circuit(e) => e.operator(),
            TransformError::Internal(_) | TransformError::RecursionLimit(_) => None,
        }
    }
}

impl From<ExprError> for TransformError {
    fn from(e: ExprError) -> TransformError {
        match e {
            ExprError::RecursionLimit(e) => TransformError::RecursionLimit(e),
            // Rewrites of well-typed closures produce well-typed closures.
            e => TransformError::Internal(e.to_string()),
        }
    }
}

/// A sequence of transformations iterated some number of times.
#[derive(Debug)]
pub struct Fixpoint {
    pub transforms: Vec<Box<dyn Transform + Send>>,
    pub limit: usize,
}

impl Transform for Fixpoint {
    #[tracing::instrument(
        target = "optimizer",
        level = "trace",
        skip_all,
        fields(path.segment = "fixpoint")
    )]
    fn transform(&self, circuit: &mut Circuit) -> Result<(), TransformError> {
        for iteration in 0..self.limit {
            let original = circuit.clone();
            for transform in self.transforms.iter() {
                transform.transform(circuit)?;
            }
            if *circuit == original {
                tracing::debug!(target: "optimizer", iteration, "fixpoint reached");
                return Ok(());
            }
        }
        let original = circuit.clone();
        for transform in self.transforms.iter() {
            transform.transform(circuit)?;
        }
        Err(TransformError::Internal(format!(
            "fixpoint looped too many times {:#?}\n{}\n{}",
            self, original, circuit
        )))
    }
}

/// Enables or disables the passes of the [`Optimizer`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassConfig {
    pub fold_constants: bool,
    pub fusion: bool,
    pub cse: bool,
    pub union_cancel: bool,
    pub dead_code: bool,
}

impl Default for PassConfig {
    fn default() -> PassConfig {
        PassConfig {
            fold_constants: true,
            fusion: true,
            cse: true,
            union_cancel: true,
            dead_code: true,
        }
    }
}

impl PassConfig {
    /// A configuration with every pass disabled.
    pub fn none() -> PassConfig {
        PassConfig {
            fold_constants: false,
            fusion: false,
            cse: false,
            union_cancel: false,
            dead_code: false,
        }
    }

    /// Enables or disables the pass called `name`.
    pub fn set(&mut self, name: &str, enabled: bool) -> Result<(), String> {
        let flag = match name {
            "fold_constants" => &mut self.fold_constants,
            "fusion" => &mut self.fusion,
            "cse" => &mut self.cse,
            "union_cancel" => &mut self.union_cancel,
            "dead_code" => &mut self.dead_code,
            _ => return Err(format!("unknown pass: {}", name)),
        };
        *flag = enabled;
        Ok(())
    }
}

/// The default limit on the iterations of the optimizer's [`Fixpoint`].
pub const DEFAULT_FIXPOINT_LIMIT: usize = 100;

/// An optimizer for circuits.
#[derive(Debug)]
pub struct Optimizer {
    /// The list of transforms to apply to a circuit.
    pub transforms: Vec<Box<dyn Transform + Send>>,
}

impl Optimizer {
    /// The default pipeline, restricted to the passes enabled in `passes`.
    pub fn new(passes: &PassConfig, fixpoint_limit: usize) -> Optimizer {
        let mut transforms: Vec<Box<dyn Transform + Send>> = vec![];
        if passes.fold_constants {
            transforms.push(Box::new(reduction::FoldConstants));
        }
        if passes.fusion {
            transforms.push(Box::new(fusion::Fusion));
        }
        if passes.cse {
            transforms.push(Box::new(cse::Cse));
        }
        if passes.union_cancel {
            transforms.push(Box::new(union_cancel::UnionBranchCancellation));
        }
        if passes.dead_code {
            transforms.push(Box::new(dead_code::DeadCodeElimination));
        }
        Optimizer {
            transforms: vec![Box::new(Fixpoint {
                transforms,
                limit: fixpoint_limit,
            })],
        }
    }

    /// Optimizes the supplied circuit and checks the invariants of the
    /// result.
    pub fn optimize(&self, circuit: &mut Circuit) -> Result<(), TransformError> {
        for transform in self.transforms.iter() {
            tracing::trace!(target: "optimizer", transform = %transform.debug(), "running");
            transform.transform(circuit)?;
        }
        circuit.validate()?;
        Ok(())
    }
}

impl Default for Optimizer {
    fn default() -> Optimizer {
        Optimizer::new(&PassConfig::default(), DEFAULT_FIXPOINT_LIMIT)
    }
}

/// Logs the circuit after a pass.
pub(crate) fn trace_circuit(circuit: &Circuit) {
    tracing::trace!(target: "optimizer", "{}", circuit);
}

/// Applies `action` to `circuit` and to the bodies of all of its fixpoint
/// operators, bodies first.
///
/// Besides the circuit, `action` receives the operators that are referenced
/// from outside of it: for a fixpoint body, its iteration variable and its
/// result; for the top-level circuit, none.
pub(crate) fn try_visit_circuits<F>(circuit: &mut Circuit, action: &mut F) -> Result<(), TransformError>
where
    F: FnMut(&mut Circuit, &[OperatorId]) -> Result<(), TransformError>,
{
    Bodies {
        recursion_guard: RecursionGuard::with_limit(RECURSION_LIMIT),
    }
    .visit(circuit, &[], action)
}

struct Bodies {
    recursion_guard: RecursionGuard,
}

impl CheckedRecursion for Bodies {
    fn recursion_guard(&self) -> &RecursionGuard {
        &self.recursion_guard
    }
}

impl Bodies {
    fn visit<F>(
        &self,
        circuit: &mut Circuit,
        roots: &[OperatorId],
        action: &mut F,
    ) -> Result<(), TransformError>
    where
        F: FnMut(&mut Circuit, &[OperatorId]) -> Result<(), TransformError>,
    {
        self.checked_recur(|bodies| {
            for id in circuit.ids() {
                let mut fixpoint = match circuit.get(id).map(|op| &op.kind) {
                    Some(OperatorKind::Fixpoint(fixpoint)) => fixpoint.clone(),
                    _ => continue,
                };
                let mut body = fixpoint.body.clone();
                bodies.visit(&mut body, &[fixpoint.variable, fixpoint.result], action)?;
                if body != fixpoint.body {
                    fixpoint.body = body;
                    circuit.replace(id, OperatorKind::Fixpoint(fixpoint))?;
                }
            }
            action(circuit, roots)
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;

    #[derive(Debug)]
    struct Flip;

    impl Transform for Flip {
        fn transform(&self, circuit: &mut Circuit) -> Result<(), TransformError> {
            // Alternates between two filters, so it never converges.
            for id in circuit.ids() {
                let kind = match circuit.get(id).map(|op| &op.kind) {
                    Some(OperatorKind::Filter { input, predicate }) => {
                        let bound = if predicate.to_string().ends_with("1)") { 2 } else { 1 };
                        OperatorKind::Filter {
                            input: *input,
                            predicate: greater_than(&typ(), bound),
                        }
                    }
                    _ => continue,
                };
                circuit.replace(id, kind)?;
            }
            Ok(())
        }
    }

    #[zf_ore::test]
    fn fixpoint_limit_is_an_error() {
        let mut circuit = Circuit::new();
        let t = source(&mut circuit, "t");
        let filter = circuit
            .add(OperatorKind::Filter {
                input: t,
                predicate: greater_than(&typ(), 1),
            })
            .unwrap();
        sink(&mut circuit, filter, "v");
        let fixpoint = Fixpoint {
            transforms: vec![Box::new(Flip)],
            limit: 5,
        };
        assert!(matches!(
            fixpoint.transform(&mut circuit),
            Err(TransformError::Internal(msg)) if msg.starts_with("fixpoint looped too many times")
        ));
    }

    #[zf_ore::test]
    fn empty_pipeline_leaves_the_circuit_alone() {
        let mut circuit = Circuit::new();
        let t = source(&mut circuit, "t");
        sink(&mut circuit, t, "v");
        let original = circuit.clone();
        Optimizer::new(&PassConfig::none(), DEFAULT_FIXPOINT_LIMIT)
            .optimize(&mut circuit)
            .unwrap();
        assert_eq!(circuit, original);
    }

    #[zf_ore::test]
    fn passes_are_toggled_by_name() {
        let mut passes = PassConfig::default();
        passes.set("fusion", false).unwrap();
        assert!(!passes.fusion);
        assert_eq!(
            passes.set("magic", true),
            Err("unknown pass: magic".to_string())
        );
        let passes: PassConfig = serde_json::from_str(r#"{"cse": false}"#).unwrap();
        assert!(!passes.cse && passes.fusion);
    }
}
