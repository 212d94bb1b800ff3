// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Fundamental data representation.
//!
//! This module contains the types for representing data in zflow that all
//! layers of the compiler can understand. Higher layers, like the expression
//! and circuit crates, build on top of these types to describe the shape of
//! the tuples flowing through a circuit.
//!
//! # Data model
//!
//! Data is described by [`ScalarType`]s, which are combined with a
//! nullability flag into [`ColumnType`]s, which are in turn combined into
//! [`RelationType`]s. Values are [`Datum`]s, tuples of values are [`Row`]s,
//! and a [`ZSet`] maps rows to signed multiplicities.

#![warn(missing_docs, missing_debug_implementations)]

use std::fmt;

mod relation;
mod row;
mod scalar;
mod zset;

pub use relation::{ColumnType, RelationType};
pub use row::Row;
pub use scalar::{Datum, ScalarType};
pub use zset::{Diff, ZSet};

/// An error raised when values or operations disagree on types.
///
/// Type errors are raised while the IR is constructed, never while a circuit
/// runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    /// Two types were expected to have the same base type.
    #[error("type mismatch: {left} vs {right}")]
    Mismatch {
        /// The first type, rendered.
        left: String,
        /// The second type, rendered.
        right: String,
    },
    /// An operator was applied to an operand of the wrong type.
    #[error("{op} cannot be applied to {typ}")]
    InvalidOperand {
        /// The operator or function.
        op: String,
        /// The offending operand type.
        typ: String,
    },
    /// A function was applied to the wrong number of arguments.
    #[error("{func} takes {expected} arguments but {got} were supplied")]
    WrongArgumentCount {
        /// The function.
        func: String,
        /// A description of the accepted argument counts.
        expected: String,
        /// The number of arguments supplied.
        got: usize,
    },
    /// A function name did not resolve to a known function.
    #[error("unknown function {0}")]
    UnknownFunction(String),
    /// A field access was out of range.
    #[error("field {index} does not exist in {typ}")]
    NoSuchField {
        /// The requested field.
        index: usize,
        /// The record type.
        typ: String,
    },
    /// A literal value does not inhabit its declared type.
    #[error("value {datum} is not of type {typ}")]
    InvalidLiteral {
        /// The literal value, rendered.
        datum: String,
        /// The declared type, rendered.
        typ: String,
    },
    /// There is no cast between two types.
    #[error("cannot cast {from} to {to}")]
    InvalidCast {
        /// The source type.
        from: String,
        /// The target type.
        to: String,
    },
}

impl TypeError {
    /// Constructs a [`TypeError::Mismatch`] from two displayable types.
    pub fn mismatch(left: &impl fmt::Display, right: &impl fmt::Display) -> TypeError {
        TypeError::Mismatch {
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    /// Constructs a [`TypeError::InvalidOperand`].
    pub fn invalid_operand(op: &impl fmt::Display, typ: &impl fmt::Display) -> TypeError {
        TypeError::InvalidOperand {
            op: op.to_string(),
            typ: typ.to_string(),
        }
    }
}
