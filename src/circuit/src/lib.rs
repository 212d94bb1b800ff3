// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Incremental dataflow circuits.
//!
//! A [`Circuit`] is a DAG of [`Operator`]s connected by streams of Z-set
//! updates. Each operator consumes the changes of its inputs and produces
//! the corresponding changes of its output; stateful operators (joins,
//! aggregates, distinct) maintain whatever they need to do so. Recursive
//! relations are computed by [`FixpointOperator`]s, which own a nested
//! circuit and a bound on the number of iterations.
//!
//! Besides the model, the crate provides the hook-based [`visit`] walker
//! over circuits, the [`equivalence`] of operators and whole circuits, and
//! a human-readable rendering in [`explain`].

#![warn(missing_debug_implementations)]

use zf_ore::stack::RecursionLimitError;
use zf_repr::TypeError;

mod circuit;
mod operator;

pub mod equivalence;
pub mod explain;
pub mod visit;

pub use circuit::Circuit;
pub use operator::{FixpointOperator, JoinGc, Operator, OperatorId, OperatorKind, StateGc};

/// An error raised while building or checking a circuit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CircuitError {
    #[error("unknown operator {0}")]
    UnknownOperator(OperatorId),
    #[error("ill-typed {operator}: {source}")]
    Type {
        operator: &'static str,
        source: TypeError,
    },
    #[error("invalid {operator}: {reason}")]
    Invalid {
        operator: &'static str,
        reason: String,
    },
    /// A broken invariant of an existing operator.
    #[error("operator {id}: {reason}")]
    Malformed { id: OperatorId, reason: String },
    #[error(transparent)]
    RecursionLimit(#[from] RecursionLimitError),
}

impl CircuitError {
    pub(crate) fn invalid(op: &OperatorKind, reason: impl Into<String>) -> CircuitError {
        CircuitError::Invalid {
            operator: op.name(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(id: OperatorId, reason: impl Into<String>) -> CircuitError {
        CircuitError::Malformed {
            id,
            reason: reason.into(),
        }
    }

    /// The operator the error refers to, if known.
    pub fn operator(&self) -> Option<OperatorId> {
        match self {
            CircuitError::UnknownOperator(id) | CircuitError::Malformed { id, .. } => Some(*id),
            _ => None,
        }
    }
}
