// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Closures: the per-tuple functions of circuit operators.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use zf_ore::stack::RecursionLimitError;
use zf_repr::{ColumnType, Datum, RelationType, Row, ScalarType, TypeError};

use crate::{EvalError, ExprError, ScalarExpr};

/// A named, typed closure parameter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub typ: ColumnType,
}

impl Param {
    pub fn new(name: impl Into<String>, typ: ColumnType) -> Param {
        Param {
            name: name.into(),
            typ,
        }
    }

    /// A variable referring to this parameter.
    pub fn var(&self) -> ScalarExpr {
        ScalarExpr::var(self.name.clone(), self.typ.clone())
    }
}

/// A function `|p1: T1, ..., pn: Tn| body`.
///
/// The body refers to the parameters through [`ScalarExpr::var`] nodes.
/// Closures compare equal (`==`) only if their parameter names agree; use
/// an [`EquivalenceContext`](crate::EquivalenceContext) to compare them up
/// to renaming of the parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Closure {
    pub params: Vec<Param>,
    pub body: ScalarExpr,
}

impl Closure {
    pub fn new(params: Vec<Param>, body: ScalarExpr) -> Closure {
        Closure { params, body }
    }

    /// A closure of a single parameter that receives a whole tuple of a
    /// relation of type `typ`.
    pub fn over_tuple(name: &str, typ: &RelationType, body: ScalarExpr) -> Closure {
        Closure::new(vec![Param::new(name, typ.record_type())], body)
    }

    /// The identity function on tuples of type `typ`.
    pub fn identity(typ: &RelationType) -> Closure {
        let param = Param::new("t", typ.record_type());
        let body = param.var();
        Closure::new(vec![param], body)
    }

    /// The type of the values the closure computes.
    pub fn output_type(&self) -> &ColumnType {
        self.body.typ()
    }

    /// The relation type of the tuples the closure computes, if it computes
    /// records.
    pub fn output_relation_type(&self) -> Result<RelationType, TypeError> {
        RelationType::from_record_type(self.output_type()).ok_or_else(|| {
            TypeError::invalid_operand(&"a tuple-producing closure", self.output_type())
        })
    }

    /// Calls the closure.
    pub fn call(&self, args: &[Datum]) -> Result<Datum, EvalError> {
        if args.len() != self.params.len() {
            return Err(EvalError::Internal(format!(
                "closure of {} parameters called with {} arguments",
                self.params.len(),
                args.len()
            )));
        }
        let env = self
            .params
            .iter()
            .zip(args)
            .map(|(param, arg)| (param.name.as_str(), arg))
            .collect::<Vec<_>>();
        self.body.eval(&env)
    }

    /// Calls a single-parameter closure on a tuple.
    pub fn call_row(&self, row: &Row) -> Result<Datum, EvalError> {
        self.call(&[Datum::Record(row.datums().to_vec())])
    }

    /// Calls a single-parameter closure that produces tuples.
    pub fn map_row(&self, row: &Row) -> Result<Row, EvalError> {
        match self.call_row(row)? {
            Datum::Record(fields) => Ok(Row::new(fields)),
            datum => Err(EvalError::Internal(format!(
                "closure {} produced {} instead of a tuple",
                self, datum
            ))),
        }
    }

    /// Whether the closure body is the literal `true`.
    pub fn is_literal_true(&self) -> bool {
        self.body.is_literal_true()
    }

    /// Whether the closure body is the literal `false` or `null`.
    pub fn is_literal_false_or_null(&self) -> bool {
        self.body.is_literal_false() || self.body.is_literal_null()
    }

    /// See [`ScalarExpr::is_pure`].
    pub fn is_pure(&self) -> bool {
        self.body.is_pure()
    }

    /// See [`ScalarExpr::has_side_effects`].
    pub fn has_side_effects(&self) -> bool {
        self.body.has_side_effects()
    }

    /// Compares parameters by value and the bodies by identity.
    pub fn same_fields(&self, other: &Closure) -> bool {
        self.params == other.params && self.body.ptr_eq(&other.body)
    }

    /// Returns an equal closure whose body shares no node with `self`.
    pub fn deep_copy(&self) -> Result<Closure, RecursionLimitError> {
        Ok(Closure::new(self.params.clone(), self.body.deep_copy()?))
    }

    /// Composes two single-parameter closures: `self.compose(inner)` is
    /// `|x| self(inner(x))`, with the parameter of `inner`.
    ///
    /// Each use of the parameter of `self` receives its own copy of the body
    /// of `inner`.
    pub fn compose(&self, inner: &Closure) -> Result<Closure, ExprError> {
        let [param] = self.params.as_slice() else {
            return Err(ExprError::Arity(self.params.len()));
        };
        if !param.typ.same_base(inner.output_type()) {
            return Err(TypeError::mismatch(&param.typ, inner.output_type()).into());
        }
        let body = self.body.substitute(&param.name, &inner.body)?;
        Ok(Closure::new(inner.params.clone(), body))
    }

    /// The conjunction of two single-parameter predicates over the same
    /// type, with the parameter of `self`.
    pub fn and(&self, other: &Closure) -> Result<Closure, ExprError> {
        let ([mine], [theirs]) = (self.params.as_slice(), other.params.as_slice()) else {
            return Err(ExprError::Arity(self.params.len().max(other.params.len())));
        };
        let renamed = other.body.substitute(&theirs.name, &mine.var())?;
        let body = self.body.and(&renamed)?;
        Ok(Closure::new(self.params.clone(), body))
    }

    /// A predicate that is always `true`, over tuples of type `typ`.
    pub fn always_true(typ: &RelationType) -> Closure {
        Closure::over_tuple("t", typ, ScalarExpr::literal_true())
    }

    /// The type of a record with the closure parameters as fields. Used to
    /// describe the input of multi-parameter closures.
    pub fn params_type(&self) -> ColumnType {
        ScalarType::Record {
            fields: self.params.iter().map(|p| p.typ.clone()).collect(),
        }
        .nullable(false)
    }
}

impl fmt::Display for Closure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "|{}| {}",
            self.params.iter().map(|p| &p.name).join(", "),
            self.body
        )
    }
}
