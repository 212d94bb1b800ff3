// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Core expression language.
//!
//! This crate defines the typed scalar expressions that live inside circuit
//! operators: [`ScalarExpr`] trees, the [`Closure`]s that bind them to the
//! tuples of a stream, and the [`AggregateExpr`]s that summarize groups. It
//! also provides the machinery shared by every pass that inspects those
//! trees: the [`visit`] framework, the hook-based [`inner`] walker, and the
//! alpha-aware [`EquivalenceContext`].

#![warn(missing_debug_implementations)]

use zf_ore::stack::RecursionLimitError;
use zf_repr::TypeError;

mod aggregate;
mod closure;
mod equivalence;
mod scalar;

pub mod inner;
pub mod visit;

pub use aggregate::{AggregateExpr, AggregateFunc};
pub use closure::{Closure, Param};
pub use equivalence::EquivalenceContext;
pub use inner::{InnerNode, InnerVisitor, VisitContext, VisitDecision};
pub use scalar::eval::Env;
pub use scalar::func::{self, BinaryFunc, BuiltinFunc, FuncPath, UnaryFunc};
pub use scalar::{ExprKind, ScalarExpr};

/// The maximum depth of recursive traversals over expressions.
pub const RECURSION_LIMIT: usize = 2048;

/// An error raised while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("numeric field overflow")]
    NumericOverflow,
    #[error("unbound variable: {0}")]
    UnboundVariable(String),
    #[error("invalid cast of {datum} to {to}")]
    InvalidCast { datum: String, to: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl EvalError {
    pub(crate) fn invalid_operand(op: &impl std::fmt::Display, datum: &zf_repr::Datum) -> EvalError {
        EvalError::Internal(format!("{} cannot be applied to {}", op, datum))
    }
}

/// An error raised while building or rewriting expressions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error(transparent)]
    RecursionLimit(#[from] RecursionLimitError),
    /// A closure of an unexpected number of parameters.
    #[error("unsupported closure arity: {0}")]
    Arity(usize),
}
