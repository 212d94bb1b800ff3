// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Compiles logical query plans into optimized incremental circuits.
//!
//! [`compile`] lowers a [`Program`] to a [`Circuit`] and, unless disabled,
//! runs the optimizer over it. Errors of all phases are reported as a
//! [`CompileError`], which locates the offending plan node or operator.

#![warn(missing_debug_implementations)]

use std::fmt;

use serde::{Deserialize, Serialize};
use zf_circuit::{Circuit, CircuitError, OperatorId};
use zf_lower::plan::Program;
use zf_lower::{LowerError, PlanLocation, RecursionConfig};
use zf_ore::stack::RecursionLimitError;
use zf_transform::{Optimizer, PassConfig, TransformError, DEFAULT_FIXPOINT_LIMIT};

pub use zf_lower::plan;

/// Options controlling compilation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Whether to run the optimizer over the lowered circuit.
    pub optimize: bool,
    /// The optimizer passes to run.
    pub passes: PassConfig,
    /// The number of rounds after which the optimizer gives up looking for
    /// a circuit that no pass changes.
    pub optimizer_fixpoint_limit: usize,
    pub recursion: RecursionConfig,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            optimize: true,
            passes: PassConfig::default(),
            optimizer_fixpoint_limit: DEFAULT_FIXPOINT_LIMIT,
            recursion: RecursionConfig::default(),
        }
    }
}

/// Where in the input or in the circuit an error was detected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Location {
    /// A node of a view's plan.
    Plan(PlanLocation),
    /// An operator of the lowered circuit.
    Operator(OperatorId),
    /// The program as a whole.
    Program,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Location::Plan(location) => write!(f, "{}", location),
            Location::Operator(id) => write!(f, "operator {}", id),
            Location::Program => f.write_str("program"),
        }
    }
}

/// An error that aborts the compilation of a program.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// Operands or operators disagree on types.
    #[error("{location}: type mismatch: {message}")]
    TypeMismatch {
        location: PlanLocation,
        message: String,
    },
    /// A construct without an incremental lowering.
    #[error("{location}: unsupported construct: {construct}")]
    UnsupportedConstruct {
        location: PlanLocation,
        construct: String,
    },
    /// A recursive view whose fixpoint cannot be shown to be reached.
    #[error("{location}: ill-founded recursion: {reason}")]
    IllFoundedRecursion {
        location: PlanLocation,
        reason: String,
    },
    /// A broken invariant, either of the input program or of the compiler.
    #[error("{location}: internal invariant violated: {message}")]
    InternalInvariantViolation { location: Location, message: String },
    #[error(transparent)]
    RecursionLimit(#[from] RecursionLimitError),
}

impl CompileError {
    fn internal(location: Location, message: impl fmt::Display) -> CompileError {
        CompileError::InternalInvariantViolation {
            location,
            message: message.to_string(),
        }
    }

    fn from_circuit(error: CircuitError) -> CompileError {
        match error {
            CircuitError::RecursionLimit(e) => CompileError::RecursionLimit(e),
            e => {
                let location = e.operator().map_or(Location::Program, Location::Operator);
                CompileError::internal(location, e)
            }
        }
    }
}

impl From<LowerError> for CompileError {
    fn from(error: LowerError) -> CompileError {
        match error {
            LowerError::Type { location, source } => CompileError::TypeMismatch {
                location,
                message: source.to_string(),
            },
            LowerError::Arity {
                view,
                declared,
                actual,
            } => CompileError::TypeMismatch {
                location: PlanLocation::new(view),
                message: format!("{} columns declared but {} computed", declared, actual),
            },
            LowerError::Unsupported {
                location,
                construct,
            } => CompileError::UnsupportedConstruct {
                location,
                construct,
            },
            LowerError::IllFoundedRecursion { location, reason } => {
                CompileError::IllFoundedRecursion { location, reason }
            }
            LowerError::RecursionLimit(e) => CompileError::RecursionLimit(e),
            LowerError::Circuit { location, source } => {
                CompileError::internal(Location::Plan(location), source)
            }
            e @ LowerError::UnknownRelation { .. } => {
                let location = e.location().cloned().map_or(Location::Program, Location::Plan);
                CompileError::internal(location, e)
            }
            e @ (LowerError::UnknownColumn { .. } | LowerError::DuplicateRelation(_)) => {
                CompileError::internal(Location::Program, e)
            }
        }
    }
}

impl From<TransformError> for CompileError {
    fn from(error: TransformError) -> CompileError {
        match error {
            TransformError::RecursionLimit(e) => CompileError::RecursionLimit(e),
            TransformError::Circuit(e) => CompileError::from_circuit(e),
            e => {
                let location = e.operator().map_or(Location::Program, Location::Operator);
                CompileError::internal(location, e)
            }
        }
    }
}

/// Compiles `program` into a circuit maintaining all of its views.
///
/// The circuit has one source per table, named after the table, and one
/// sink per view, named after the view.
pub fn compile(program: &Program, config: &CompilerConfig) -> Result<Circuit, CompileError> {
    let mut circuit = zf_lower::translate(program, &config.recursion)?;
    tracing::debug!(operators = circuit.len(), "lowered program");
    if config.optimize {
        let optimizer = Optimizer::new(&config.passes, config.optimizer_fixpoint_limit);
        optimizer.optimize(&mut circuit)?;
        tracing::debug!(operators = circuit.len(), "optimized circuit");
    }
    Ok(circuit)
}
