// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Aggregate functions.

use std::collections::BTreeMap;
use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use zf_ore::stack::RecursionLimitError;
use zf_repr::{ColumnType, Datum, Diff, ScalarType, TypeError};

use crate::{Closure, EvalError};

/// A function that summarizes the values of a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunc {
    /// The number of non-null values.
    Count,
    Sum,
    Min,
    Max,
}

impl AggregateFunc {
    /// Computes the type of the aggregate over values of type `input`.
    ///
    /// `COUNT` is never null; the other aggregates are null for a group
    /// without non-null values.
    pub fn output_type(&self, input: &ColumnType) -> Result<ColumnType, TypeError> {
        let scalar_type = match (self, &input.scalar_type) {
            (AggregateFunc::Count, _) => return Ok(ScalarType::Int64.nullable(false)),
            (AggregateFunc::Sum, s) if s.is_integer() => ScalarType::Int64,
            (AggregateFunc::Sum, s) if s.is_float() => s.clone(),
            (AggregateFunc::Min | AggregateFunc::Max, ScalarType::Record { .. }) => {
                return Err(TypeError::invalid_operand(self, input))
            }
            (AggregateFunc::Min | AggregateFunc::Max, s) => s.clone(),
            _ => return Err(TypeError::invalid_operand(self, input)),
        };
        Ok(scalar_type.nullable(true))
    }

    /// Evaluates the aggregate over a multiset of values, given as values
    /// with their multiplicities.
    ///
    /// Null values are ignored. With `distinct`, each value with a positive
    /// total multiplicity counts once.
    pub fn eval<'a, I>(&self, values: I, distinct: bool) -> Result<Datum, EvalError>
    where
        I: IntoIterator<Item = (&'a Datum, Diff)>,
    {
        let mut totals: BTreeMap<&Datum, Diff> = BTreeMap::new();
        for (datum, diff) in values {
            if !datum.is_null() {
                *totals.entry(datum).or_default() += diff;
            }
        }
        totals.retain(|_, diff| *diff > 0);
        if distinct {
            for diff in totals.values_mut() {
                *diff = 1;
            }
        }
        match self {
            AggregateFunc::Count => Ok(Datum::Int64(totals.values().sum())),
            AggregateFunc::Min => Ok(totals.keys().next().map_or(Datum::Null, |d| (*d).clone())),
            AggregateFunc::Max => Ok(totals.keys().last().map_or(Datum::Null, |d| (*d).clone())),
            AggregateFunc::Sum => sum(totals),
        }
    }
}

#[allow(clippy::as_conversions)]
fn sum(totals: BTreeMap<&Datum, Diff>) -> Result<Datum, EvalError> {
    let Some(first) = totals.keys().next() else {
        return Ok(Datum::Null);
    };
    match first {
        Datum::Float32(_) | Datum::Float64(_) => {
            let mut sum = 0.0f64;
            for (datum, diff) in &totals {
                let value = match datum {
                    Datum::Float32(f) => f64::from(f.0),
                    Datum::Float64(f) => f.0,
                    d => return Err(EvalError::invalid_operand(&AggregateFunc::Sum, d)),
                };
                sum += value * (*diff as f64);
            }
            Ok(match first {
                Datum::Float32(_) => Datum::Float32(OrderedFloat(sum as f32)),
                _ => Datum::Float64(OrderedFloat(sum)),
            })
        }
        _ => {
            let mut sum = 0i64;
            for (datum, diff) in &totals {
                let value = match datum {
                    Datum::Int16(i) => i64::from(*i),
                    Datum::Int32(i) => i64::from(*i),
                    Datum::Int64(i) => *i,
                    d => return Err(EvalError::invalid_operand(&AggregateFunc::Sum, d)),
                };
                sum = value
                    .checked_mul(*diff)
                    .and_then(|v| sum.checked_add(v))
                    .ok_or(EvalError::NumericOverflow)?;
            }
            Ok(Datum::Int64(sum))
        }
    }
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            AggregateFunc::Count => "count",
            AggregateFunc::Sum => "sum",
            AggregateFunc::Min => "min",
            AggregateFunc::Max => "max",
        })
    }
}

/// An aggregate function applied to a value computed from each tuple of a
/// group.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateExpr {
    pub func: AggregateFunc,
    /// Computes the aggregated value from an input tuple.
    pub expr: Closure,
    /// Whether duplicate values are aggregated only once.
    pub distinct: bool,
}

impl AggregateExpr {
    /// Builds an aggregate, checking that `func` applies to the values
    /// computed by `expr`.
    pub fn new(func: AggregateFunc, expr: Closure, distinct: bool) -> Result<AggregateExpr, TypeError> {
        func.output_type(expr.output_type())?;
        Ok(AggregateExpr {
            func,
            expr,
            distinct,
        })
    }

    /// The type of the aggregate's result.
    pub fn typ(&self) -> ColumnType {
        // Checked on construction.
        self.func
            .output_type(self.expr.output_type())
            .unwrap_or_else(|_| ScalarType::Int64.nullable(true))
    }

    pub fn deep_copy(&self) -> Result<AggregateExpr, RecursionLimitError> {
        Ok(AggregateExpr {
            func: self.func,
            expr: self.expr.deep_copy()?,
            distinct: self.distinct,
        })
    }
}

impl fmt::Display for AggregateExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let distinct = if self.distinct { "distinct " } else { "" };
        write!(f, "{}({}{})", self.func, distinct, self.expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[zf_ore::test]
    fn aggregates_ignore_nulls() {
        let values = vec![
            (Datum::Int32(3), 2),
            (Datum::Null, 5),
            (Datum::Int32(1), 1),
        ];
        let eval = |func: AggregateFunc, distinct| {
            func.eval(values.iter().map(|(d, diff)| (d, *diff)), distinct)
                .unwrap()
        };
        assert_eq!(eval(AggregateFunc::Count, false), Datum::Int64(3));
        assert_eq!(eval(AggregateFunc::Count, true), Datum::Int64(2));
        assert_eq!(eval(AggregateFunc::Sum, false), Datum::Int64(7));
        assert_eq!(eval(AggregateFunc::Sum, true), Datum::Int64(4));
        assert_eq!(eval(AggregateFunc::Min, false), Datum::Int32(1));
        assert_eq!(eval(AggregateFunc::Max, false), Datum::Int32(3));
    }

    #[zf_ore::test]
    fn empty_groups() {
        let nulls = vec![(Datum::Null, 1)];
        let eval = |func: AggregateFunc| func.eval(nulls.iter().map(|(d, diff)| (d, *diff)), false);
        assert_eq!(eval(AggregateFunc::Count), Ok(Datum::Int64(0)));
        assert_eq!(eval(AggregateFunc::Sum), Ok(Datum::Null));
        assert_eq!(eval(AggregateFunc::Max), Ok(Datum::Null));
    }

    #[zf_ore::test]
    fn retracted_values_do_not_count() {
        let values = vec![(Datum::from(1.5f64), 1), (Datum::from(9.0f64), 0)];
        assert_eq!(
            AggregateFunc::Max.eval(values.iter().map(|(d, diff)| (d, *diff)), false),
            Ok(Datum::from(1.5f64))
        );
        assert_eq!(
            AggregateFunc::Sum.eval(values.iter().map(|(d, diff)| (d, *diff)), false),
            Ok(Datum::from(1.5f64))
        );
    }

    #[zf_ore::test]
    fn output_types() {
        let int = ScalarType::Int32.nullable(false);
        assert_eq!(
            AggregateFunc::Count.output_type(&int),
            Ok(ScalarType::Int64.nullable(false))
        );
        assert_eq!(
            AggregateFunc::Sum.output_type(&int),
            Ok(ScalarType::Int64.nullable(true))
        );
        assert!(AggregateFunc::Sum
            .output_type(&ScalarType::String.nullable(false))
            .is_err());
    }
}
