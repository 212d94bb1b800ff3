// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Evaluation of scalar expressions on datums.

use zf_ore::stack::maybe_grow;
use zf_repr::Datum;

use crate::scalar::func::{self, BinaryFunc};
use crate::scalar::{ExprKind, ScalarExpr};
use crate::visit::VisitChildren;
use crate::EvalError;

/// The values bound to closure parameters during evaluation.
///
/// Lookups search from the end, so later bindings shadow earlier ones.
pub type Env<'a> = [(&'a str, &'a Datum)];

impl ScalarExpr {
    /// Evaluates the expression with the parameters bound in `env`.
    ///
    /// `AND`, `OR` and `IF` only evaluate the operands they need, so an
    /// error in an operand that does not influence the result is not
    /// raised.
    pub fn eval(&self, env: &Env) -> Result<Datum, EvalError> {
        maybe_grow(|| match self.kind() {
            ExprKind::Literal(datum) => Ok(datum.clone()),
            ExprKind::Var(name) => env
                .iter()
                .rev()
                .find(|(bound, _)| *bound == name.as_str())
                .map(|(_, datum)| (*datum).clone())
                .ok_or_else(|| EvalError::UnboundVariable(name.clone())),
            ExprKind::Field { expr, index } => match expr.eval(env)? {
                Datum::Null => Ok(Datum::Null),
                Datum::Record(mut fields) if *index < fields.len() => {
                    Ok(fields.swap_remove(*index))
                }
                d => Err(EvalError::invalid_operand(&format!("field {}", index), &d)),
            },
            ExprKind::Tuple(fields) => Ok(Datum::Record(
                fields
                    .iter()
                    .map(|f| f.eval(env))
                    .collect::<Result<_, _>>()?,
            )),
            ExprKind::Unary { func, expr } => func.eval(expr.eval(env)?),
            ExprKind::Binary { func, left, right } => {
                let left = left.eval(env)?;
                match (func, &left) {
                    (BinaryFunc::And, Datum::False) => Ok(Datum::False),
                    (BinaryFunc::Or, Datum::True) => Ok(Datum::True),
                    _ => func.eval(left, right.eval(env)?),
                }
            }
            ExprKind::If { cond, then, els } => match cond.eval(env)? {
                Datum::True => then.eval(env),
                _ => els.eval(env),
            },
            ExprKind::Cast { expr, to } => func::cast_datum(expr.eval(env)?, to),
            ExprKind::Apply { func, args } => {
                let args = args
                    .iter()
                    .map(|arg| arg.eval(env))
                    .collect::<Result<_, _>>()?;
                func.func().eval(args)
            }
        })
    }

    /// Whether the expression can be evaluated without any parameter
    /// bindings.
    pub fn is_closed(&self) -> bool {
        maybe_grow(|| {
            if self.as_var().is_some() {
                return false;
            }
            let mut closed = true;
            self.visit_children(|child| closed = closed && child.is_closed());
            closed
        })
    }
}

#[cfg(test)]
mod tests {
    use zf_repr::{ColumnType, ScalarType};

    use crate::scalar::func::BuiltinFunc;

    use super::*;

    fn row_type() -> ColumnType {
        ScalarType::Record {
            fields: vec![
                ScalarType::Int32.nullable(false),
                ScalarType::Float64.nullable(true),
            ],
        }
        .nullable(false)
    }

    #[zf_ore::test]
    fn evaluates_against_bindings() {
        let t = ScalarExpr::var("t", row_type());
        let expr = t
            .field(0)
            .unwrap()
            .call_binary(
                &ScalarExpr::literal_ok(Datum::Int32(1), ScalarType::Int32).unwrap(),
                BinaryFunc::Add,
            )
            .unwrap();
        let row = Datum::Record(vec![Datum::Int32(41), Datum::Null]);
        assert_eq!(expr.eval(&[("t", &row)]), Ok(Datum::Int32(42)));
        assert_eq!(
            expr.eval(&[]),
            Err(EvalError::UnboundVariable("t".into()))
        );
        assert!(!expr.is_closed());
    }

    #[zf_ore::test]
    fn later_bindings_shadow_earlier_ones() {
        let x = ScalarExpr::var("x", ScalarType::Int32.nullable(false));
        let one = Datum::Int32(1);
        let two = Datum::Int32(2);
        assert_eq!(x.eval(&[("x", &one), ("x", &two)]), Ok(two.clone()));
    }

    #[zf_ore::test]
    fn null_propagates() {
        let t = ScalarExpr::var("t", row_type());
        let expr = t
            .field(1)
            .unwrap()
            .call_binary(
                &ScalarExpr::literal_ok(Datum::from(1.0f64), ScalarType::Float64).unwrap(),
                BinaryFunc::Mul,
            )
            .unwrap();
        let row = Datum::Record(vec![Datum::Int32(1), Datum::Null]);
        assert_eq!(expr.eval(&[("t", &row)]), Ok(Datum::Null));
    }

    #[zf_ore::test]
    fn and_short_circuits() {
        let overflow = ScalarExpr::literal_ok(Datum::Int16(i16::MAX), ScalarType::Int16)
            .unwrap()
            .call_binary(
                &ScalarExpr::literal_ok(Datum::Int16(1), ScalarType::Int16).unwrap(),
                BinaryFunc::Add,
            )
            .unwrap();
        let zero = ScalarExpr::literal_ok(Datum::Int16(0), ScalarType::Int16).unwrap();
        let erroring = overflow.call_binary(&zero, BinaryFunc::Gt).unwrap();
        assert_eq!(erroring.eval(&[]), Err(EvalError::NumericOverflow));

        let guarded = ScalarExpr::literal_false().and(&erroring).unwrap();
        assert_eq!(guarded.eval(&[]), Ok(Datum::False));
        assert!(guarded.is_closed());
    }

    #[zf_ore::test]
    fn if_treats_null_as_false() {
        let cond = ScalarExpr::literal_null(ScalarType::Bool);
        let expr = ScalarExpr::if_then_else(
            cond,
            ScalarExpr::literal_ok(Datum::from("yes"), ScalarType::String).unwrap(),
            ScalarExpr::literal_ok(Datum::from("no"), ScalarType::String).unwrap(),
        )
        .unwrap();
        assert_eq!(expr.eval(&[]), Ok(Datum::from("no")));
    }

    #[zf_ore::test]
    fn applications() {
        let expr = ScalarExpr::apply(
            BuiltinFunc::Upper,
            vec![ScalarExpr::literal_ok(Datum::from("hi"), ScalarType::String).unwrap()],
        )
        .unwrap();
        assert_eq!(expr.eval(&[]), Ok(Datum::from("HI")));
    }
}
