// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Lowering of logical query plans to incremental circuits.
//!
//! The input is a [`Program`](plan::Program): tables, views defined by
//! resolved and typed logical plans, and lateness declarations. The
//! [translator](translate) produces a single [`Circuit`](zf_circuit::Circuit)
//! computing the changes to every view from the changes to the tables.
//! Recursive views must pass the structural [check](recursion) that
//! guarantees their fixpoint is reached.

#![warn(missing_debug_implementations)]

use std::fmt;

use serde::{Deserialize, Serialize};
use zf_circuit::CircuitError;
use zf_ore::stack::RecursionLimitError;
use zf_repr::TypeError;

pub mod plan;
pub mod recursion;
mod scalar;
pub mod translate;

pub use translate::translate;

/// Options controlling the lowering of recursive views.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecursionConfig {
    /// The number of iterations after which a fixpoint is abandoned.
    pub max_iterations: usize,
    /// Accept recursive steps that compute new values from the recursive
    /// relation, whose fixpoint may not be reached.
    pub allow_computed_recursion: bool,
}

impl Default for RecursionConfig {
    fn default() -> Self {
        RecursionConfig {
            max_iterations: 1024,
            allow_computed_recursion: false,
        }
    }
}

/// The position of a node in a program: the view whose plan contains it,
/// and the indexes of the children leading to it from the plan's root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanLocation {
    pub view: String,
    pub path: Vec<usize>,
}

impl PlanLocation {
    pub fn new(view: impl Into<String>) -> PlanLocation {
        PlanLocation {
            view: view.into(),
            path: vec![],
        }
    }
}

impl fmt::Display for PlanLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.view)?;
        for index in &self.path {
            write!(f, "/{}", index)?;
        }
        Ok(())
    }
}

/// An error raised while lowering a program.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LowerError {
    #[error("{location}: {source}")]
    Type {
        location: PlanLocation,
        source: TypeError,
    },
    #[error("view {view} declares {declared} columns but computes {actual}")]
    Arity {
        view: String,
        declared: usize,
        actual: usize,
    },
    #[error("{location}: {construct} is not supported")]
    Unsupported {
        location: PlanLocation,
        construct: String,
    },
    #[error("{location}: recursive view cannot be shown to terminate: {reason}")]
    IllFoundedRecursion {
        location: PlanLocation,
        reason: String,
    },
    #[error("{location}: unknown relation {name}")]
    UnknownRelation { location: PlanLocation, name: String },
    #[error("unknown column {column} in relation {relation}")]
    UnknownColumn { relation: String, column: String },
    #[error("relation {0} is defined more than once")]
    DuplicateRelation(String),
    /// An operator could not be built although its operands are well-typed.
    #[error("{location}: {source}")]
    Circuit {
        location: PlanLocation,
        source: CircuitError,
    },
    #[error(transparent)]
    RecursionLimit(#[from] RecursionLimitError),
}

impl LowerError {
    /// The location the error refers to, if any.
    pub fn location(&self) -> Option<&PlanLocation> {
        match self {
            LowerError::Type { location, .. }
            | LowerError::Unsupported { location, .. }
            | LowerError::IllFoundedRecursion { location, .. }
            | LowerError::UnknownRelation { location, .. }
            | LowerError::Circuit { location, .. } => Some(location),
            _ => None,
        }
    }

    /// Attributes an error raised while adding an operator to `location`.
    /// Type errors of the operator are reported as such.
    pub(crate) fn from_circuit(location: PlanLocation, error: CircuitError) -> LowerError {
        match error {
            CircuitError::Type { source, .. } => LowerError::Type { location, source },
            CircuitError::RecursionLimit(e) => LowerError::RecursionLimit(e),
            source => LowerError::Circuit { location, source },
        }
    }
}
