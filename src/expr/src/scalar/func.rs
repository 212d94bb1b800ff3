// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Scalar functions: operators, built-in functions and casts.
//!
//! Every function knows how to compute the type of its result from the types
//! of its arguments, which is how expression constructors enforce type
//! correctness, and how to evaluate itself on datums. Evaluation follows SQL
//! semantics: NULL inputs produce NULL outputs unless documented otherwise,
//! and division by zero produces NULL.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use zf_repr::{ColumnType, Datum, ScalarType, TypeError};

use crate::EvalError;

/// A function of one argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryFunc {
    /// Three-valued boolean negation.
    Not,
    /// Arithmetic negation.
    Neg,
    /// `IS NULL`.
    IsNull,
    /// `IS NOT NULL`.
    IsNotNull,
}

impl UnaryFunc {
    /// Computes the type of the result of applying the function to an
    /// argument of type `input`.
    pub fn output_type(&self, input: &ColumnType) -> Result<ColumnType, TypeError> {
        match self {
            UnaryFunc::Not if input.scalar_type == ScalarType::Bool => Ok(input.clone()),
            UnaryFunc::Neg
                if input.scalar_type.is_numeric()
                    || input.scalar_type == ScalarType::Interval =>
            {
                Ok(input.clone())
            }
            UnaryFunc::IsNull | UnaryFunc::IsNotNull => Ok(ScalarType::Bool.nullable(false)),
            _ => Err(TypeError::invalid_operand(self, input)),
        }
    }

    /// Evaluates the function.
    pub fn eval(&self, datum: Datum) -> Result<Datum, EvalError> {
        match (self, datum) {
            (UnaryFunc::IsNull, d) => Ok(Datum::from(d.is_null())),
            (UnaryFunc::IsNotNull, d) => Ok(Datum::from(!d.is_null())),
            (_, Datum::Null) => Ok(Datum::Null),
            (UnaryFunc::Not, Datum::True) => Ok(Datum::False),
            (UnaryFunc::Not, Datum::False) => Ok(Datum::True),
            (UnaryFunc::Neg, Datum::Int16(i)) => i.checked_neg().map(Datum::from).ok_or(EvalError::NumericOverflow),
            (UnaryFunc::Neg, Datum::Int32(i)) => i.checked_neg().map(Datum::from).ok_or(EvalError::NumericOverflow),
            (UnaryFunc::Neg, Datum::Int64(i)) => i.checked_neg().map(Datum::from).ok_or(EvalError::NumericOverflow),
            (UnaryFunc::Neg, Datum::Float32(f)) => Ok(Datum::Float32(-f)),
            (UnaryFunc::Neg, Datum::Float64(f)) => Ok(Datum::Float64(-f)),
            (UnaryFunc::Neg, Datum::Interval(i)) => i
                .checked_neg()
                .map(Datum::Interval)
                .ok_or(EvalError::NumericOverflow),
            (func, d) => Err(EvalError::invalid_operand(func, &d)),
        }
    }
}

impl fmt::Display for UnaryFunc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnaryFunc::Not => f.write_str("NOT"),
            UnaryFunc::Neg => f.write_str("-"),
            UnaryFunc::IsNull => f.write_str("IS NULL"),
            UnaryFunc::IsNotNull => f.write_str("IS NOT NULL"),
        }
    }
}

/// A function of two arguments, written infix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryFunc {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

impl BinaryFunc {
    /// Whether the function is one of the six comparison operators.
    pub fn is_comparison(&self) -> bool {
        use BinaryFunc::*;
        matches!(self, Eq | NotEq | Lt | Lte | Gt | Gte)
    }

    /// Computes the type of the result of applying the function to
    /// arguments of types `left` and `right`.
    pub fn output_type(
        &self,
        left: &ColumnType,
        right: &ColumnType,
    ) -> Result<ColumnType, TypeError> {
        use BinaryFunc::*;
        use ScalarType::*;
        let nullable = left.nullable || right.nullable;
        let scalar_type = match self {
            And | Or => match (&left.scalar_type, &right.scalar_type) {
                (Bool, Bool) => Bool,
                (Bool, _) => return Err(TypeError::invalid_operand(self, right)),
                _ => return Err(TypeError::invalid_operand(self, left)),
            },
            Eq | NotEq | Lt | Lte | Gt | Gte => {
                if !left.same_base(right) {
                    return Err(TypeError::mismatch(left, right));
                }
                Bool
            }
            Add | Sub => match (&left.scalar_type, &right.scalar_type) {
                (l, r) if l.is_numeric() && l == r => l.clone(),
                (Interval, Interval) => Interval,
                (Timestamp, Interval) => Timestamp,
                (l, r) if l.is_numeric() && r.is_numeric() => {
                    return Err(TypeError::mismatch(left, right))
                }
                _ => return Err(TypeError::invalid_operand(self, left)),
            },
            Mul | Div | Mod => match (&left.scalar_type, &right.scalar_type) {
                (l, r) if l.is_numeric() && l == r => l.clone(),
                (l, r) if l.is_numeric() && r.is_numeric() => {
                    return Err(TypeError::mismatch(left, right))
                }
                _ => return Err(TypeError::invalid_operand(self, left)),
            },
            Concat => match (&left.scalar_type, &right.scalar_type) {
                (String, String) => String,
                (String, _) => return Err(TypeError::invalid_operand(self, right)),
                _ => return Err(TypeError::invalid_operand(self, left)),
            },
        };
        // Division by zero produces NULL.
        let nullable = nullable || matches!(self, Div | Mod);
        Ok(scalar_type.nullable(nullable))
    }

    /// Evaluates the function on two already evaluated arguments.
    ///
    /// `AND` and `OR` implement three-valued logic: `false AND NULL` is
    /// `false` and `true OR NULL` is `true`.
    pub fn eval(&self, left: Datum, right: Datum) -> Result<Datum, EvalError> {
        use BinaryFunc::*;
        match self {
            And => Ok(match (left, right) {
                (Datum::False, _) | (_, Datum::False) => Datum::False,
                (Datum::Null, _) | (_, Datum::Null) => Datum::Null,
                _ => Datum::True,
            }),
            Or => Ok(match (left, right) {
                (Datum::True, _) | (_, Datum::True) => Datum::True,
                (Datum::Null, _) | (_, Datum::Null) => Datum::Null,
                _ => Datum::False,
            }),
            _ if left.is_null() || right.is_null() => Ok(Datum::Null),
            Eq => Ok(Datum::from(left == right)),
            NotEq => Ok(Datum::from(left != right)),
            Lt => Ok(Datum::from(left.cmp(&right) == Ordering::Less)),
            Lte => Ok(Datum::from(left.cmp(&right) != Ordering::Greater)),
            Gt => Ok(Datum::from(left.cmp(&right) == Ordering::Greater)),
            Gte => Ok(Datum::from(left.cmp(&right) != Ordering::Less)),
            Add => add(left, right),
            Sub => sub(left, right),
            Mul => mul(left, right),
            Div => div(left, right),
            Mod => rem(left, right),
            Concat => match (left, right) {
                (Datum::String(mut l), Datum::String(r)) => {
                    l.push_str(&r);
                    Ok(Datum::String(l))
                }
                (l, _) => Err(EvalError::invalid_operand(self, &l)),
            },
        }
    }
}

/// Applies a checked integer operation to two datums of the same integer
/// type, or a float operation to two datums of the same float type.
macro_rules! arith {
    ($op:literal, $left:expr, $right:expr, $checked:ident, $float:expr) => {
        match ($left, $right) {
            (Datum::Int16(a), Datum::Int16(b)) => {
                a.$checked(b).map(Datum::from).ok_or(EvalError::NumericOverflow)
            }
            (Datum::Int32(a), Datum::Int32(b)) => {
                a.$checked(b).map(Datum::from).ok_or(EvalError::NumericOverflow)
            }
            (Datum::Int64(a), Datum::Int64(b)) => {
                a.$checked(b).map(Datum::from).ok_or(EvalError::NumericOverflow)
            }
            (Datum::Float32(a), Datum::Float32(b)) => Ok(Datum::Float32(OrderedFloat($float(a.0, b.0)))),
            (Datum::Float64(a), Datum::Float64(b)) => Ok(Datum::Float64(OrderedFloat($float(a.0, b.0)))),
            (l, r) => Err(EvalError::Internal(format!("{} applied to {} and {}", $op, l, r))),
        }
    };
}

fn add(left: Datum, right: Datum) -> Result<Datum, EvalError> {
    match (left, right) {
        (Datum::Interval(a), Datum::Interval(b)) => a
            .checked_add(b)
            .map(Datum::Interval)
            .ok_or(EvalError::NumericOverflow),
        (Datum::Timestamp(t), Datum::Interval(micros)) => t
            .checked_add_signed(Duration::microseconds(micros))
            .map(Datum::Timestamp)
            .ok_or(EvalError::NumericOverflow),
        (l, r) => arith!("+", l, r, checked_add, |a, b| a + b),
    }
}

fn sub(left: Datum, right: Datum) -> Result<Datum, EvalError> {
    match (left, right) {
        (Datum::Interval(a), Datum::Interval(b)) => a
            .checked_sub(b)
            .map(Datum::Interval)
            .ok_or(EvalError::NumericOverflow),
        (Datum::Timestamp(t), Datum::Interval(micros)) => t
            .checked_sub_signed(Duration::microseconds(micros))
            .map(Datum::Timestamp)
            .ok_or(EvalError::NumericOverflow),
        (l, r) => arith!("-", l, r, checked_sub, |a, b| a - b),
    }
}

fn mul(left: Datum, right: Datum) -> Result<Datum, EvalError> {
    arith!("*", left, right, checked_mul, |a, b| a * b)
}

fn is_zero(datum: &Datum) -> bool {
    match datum {
        Datum::Int16(i) => *i == 0,
        Datum::Int32(i) => *i == 0,
        Datum::Int64(i) => *i == 0,
        Datum::Float32(f) => f.0 == 0.0,
        Datum::Float64(f) => f.0 == 0.0,
        _ => false,
    }
}

fn div(left: Datum, right: Datum) -> Result<Datum, EvalError> {
    if is_zero(&right) {
        return Ok(Datum::Null);
    }
    arith!("/", left, right, checked_div, |a, b| a / b)
}

fn rem(left: Datum, right: Datum) -> Result<Datum, EvalError> {
    if is_zero(&right) {
        return Ok(Datum::Null);
    }
    arith!("%", left, right, checked_rem, |a, b| a % b)
}

impl fmt::Display for BinaryFunc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use BinaryFunc::*;
        f.write_str(match self {
            And => "AND",
            Or => "OR",
            Eq => "=",
            NotEq => "<>",
            Lt => "<",
            Lte => "<=",
            Gt => ">",
            Gte => ">=",
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "%",
            Concat => "||",
        })
    }
}

/// A built-in function, called by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinFunc {
    Abs,
    Upper,
    Lower,
    CharLength,
    Concat,
    Round,
    Coalesce,
    Greatest,
    Least,
    /// The current wall-clock time. Not deterministic.
    Now,
    /// A uniformly distributed value in `[0, 1)`. Not deterministic.
    Random,
    /// Writes its argument to the log and returns it. Has side effects.
    Log,
}

impl BuiltinFunc {
    /// All built-in functions.
    pub const ALL: [BuiltinFunc; 12] = [
        BuiltinFunc::Abs,
        BuiltinFunc::Upper,
        BuiltinFunc::Lower,
        BuiltinFunc::CharLength,
        BuiltinFunc::Concat,
        BuiltinFunc::Round,
        BuiltinFunc::Coalesce,
        BuiltinFunc::Greatest,
        BuiltinFunc::Least,
        BuiltinFunc::Now,
        BuiltinFunc::Random,
        BuiltinFunc::Log,
    ];

    /// The name by which the function is called.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinFunc::Abs => "abs",
            BuiltinFunc::Upper => "upper",
            BuiltinFunc::Lower => "lower",
            BuiltinFunc::CharLength => "char_length",
            BuiltinFunc::Concat => "concat",
            BuiltinFunc::Round => "round",
            BuiltinFunc::Coalesce => "coalesce",
            BuiltinFunc::Greatest => "greatest",
            BuiltinFunc::Least => "least",
            BuiltinFunc::Now => "now",
            BuiltinFunc::Random => "random",
            BuiltinFunc::Log => "log",
        }
    }

    /// Resolves a function name, case insensitively.
    pub fn from_name(name: &str) -> Result<BuiltinFunc, TypeError> {
        BuiltinFunc::ALL
            .into_iter()
            .find(|func| func.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| TypeError::UnknownFunction(name.to_owned()))
    }

    /// Whether two calls with equal arguments always produce equal results.
    pub fn is_deterministic(&self) -> bool {
        !matches!(self, BuiltinFunc::Now | BuiltinFunc::Random)
    }

    /// Whether a call is observable beyond its result.
    pub fn has_side_effects(&self) -> bool {
        matches!(self, BuiltinFunc::Log)
    }

    fn arity_error(&self, expected: &str, got: usize) -> TypeError {
        TypeError::WrongArgumentCount {
            func: self.name().to_owned(),
            expected: expected.to_owned(),
            got,
        }
    }

    /// Computes the type of the result of calling the function with
    /// arguments of the given types.
    pub fn output_type(&self, args: &[ColumnType]) -> Result<ColumnType, TypeError> {
        use BuiltinFunc::*;
        match self {
            Abs | Upper | Lower | CharLength | Round | Log => {
                let [arg] = args else {
                    return Err(self.arity_error("1", args.len()));
                };
                let ok = match self {
                    Abs | Round => arg.scalar_type.is_numeric(),
                    Upper | Lower | CharLength => arg.scalar_type == ScalarType::String,
                    _ => true,
                };
                if !ok {
                    return Err(TypeError::invalid_operand(self, arg));
                }
                match self {
                    CharLength => Ok(ScalarType::Int32.nullable(arg.nullable)),
                    _ => Ok(arg.clone()),
                }
            }
            Concat => {
                if args.is_empty() {
                    return Err(self.arity_error("at least 1", 0));
                }
                Ok(ScalarType::String.nullable(false))
            }
            Coalesce | Greatest | Least => {
                let (first, rest) = args
                    .split_first()
                    .ok_or_else(|| self.arity_error("at least 1", 0))?;
                let mut typ = first.clone();
                for arg in rest {
                    typ = typ.union(arg)?;
                }
                // The result is NULL only if every argument is.
                Ok(typ.nullable(args.iter().all(|arg| arg.nullable)))
            }
            Now | Random => {
                if !args.is_empty() {
                    return Err(self.arity_error("0", args.len()));
                }
                match self {
                    Now => Ok(ScalarType::Timestamp.nullable(false)),
                    _ => Ok(ScalarType::Float64.nullable(false)),
                }
            }
        }
    }

    /// Evaluates the function on already evaluated arguments.
    pub fn eval(&self, args: Vec<Datum>) -> Result<Datum, EvalError> {
        use BuiltinFunc::*;
        match self {
            Coalesce => Ok(args
                .into_iter()
                .find(|d| !d.is_null())
                .unwrap_or(Datum::Null)),
            Greatest => Ok(args
                .into_iter()
                .filter(|d| !d.is_null())
                .max()
                .unwrap_or(Datum::Null)),
            Least => Ok(args
                .into_iter()
                .filter(|d| !d.is_null())
                .min()
                .unwrap_or(Datum::Null)),
            Concat => Ok(Datum::String(
                args.into_iter()
                    .filter(|d| !d.is_null())
                    .map(|d| match d {
                        Datum::String(s) => s,
                        d => d.to_string(),
                    })
                    .join(""),
            )),
            Now => Ok(Datum::Timestamp(Utc::now().naive_utc())),
            Random => Ok(Datum::from(rand::random::<f64>())),
            Log => {
                let arg = args.into_iter().next().unwrap_or(Datum::Null);
                tracing::info!(target: "zflow::log", value = %arg, "log");
                Ok(arg)
            }
            Abs | Upper | Lower | CharLength | Round => {
                let arg = args.into_iter().next().unwrap_or(Datum::Null);
                match (self, arg) {
                    (_, Datum::Null) => Ok(Datum::Null),
                    (Abs, Datum::Int16(i)) => i.checked_abs().map(Datum::from).ok_or(EvalError::NumericOverflow),
                    (Abs, Datum::Int32(i)) => i.checked_abs().map(Datum::from).ok_or(EvalError::NumericOverflow),
                    (Abs, Datum::Int64(i)) => i.checked_abs().map(Datum::from).ok_or(EvalError::NumericOverflow),
                    (Abs, Datum::Float32(f)) => Ok(Datum::from(f.0.abs())),
                    (Abs, Datum::Float64(f)) => Ok(Datum::from(f.0.abs())),
                    (Round, Datum::Float32(f)) => Ok(Datum::from(f.0.round())),
                    (Round, Datum::Float64(f)) => Ok(Datum::from(f.0.round())),
                    (Round, d @ (Datum::Int16(_) | Datum::Int32(_) | Datum::Int64(_))) => Ok(d),
                    (Upper, Datum::String(s)) => Ok(Datum::String(s.to_uppercase())),
                    (Lower, Datum::String(s)) => Ok(Datum::String(s.to_lowercase())),
                    (CharLength, Datum::String(s)) => i32::try_from(s.chars().count())
                        .map(Datum::from)
                        .map_err(|_| EvalError::NumericOverflow),
                    (func, d) => Err(EvalError::invalid_operand(func, &d)),
                }
            }
        }
    }
}

impl fmt::Display for BuiltinFunc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The callee of a function application.
///
/// Paths have an identity of their own: two applications of the same
/// built-in function are [`same_fields`](crate::ScalarExpr::same_fields) only
/// if they share the path node, while they are equivalent whenever they name
/// the same function.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncPath(Arc<BuiltinFunc>);

impl FuncPath {
    /// Allocates a new path naming `func`.
    pub fn new(func: BuiltinFunc) -> FuncPath {
        FuncPath(Arc::new(func))
    }

    /// The function named by the path.
    pub fn func(&self) -> BuiltinFunc {
        *self.0
    }

    /// Whether two paths are the same node.
    pub fn ptr_eq(&self, other: &FuncPath) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Returns a path naming the same function that shares no node with
    /// `self`.
    pub fn deep_copy(&self) -> FuncPath {
        FuncPath::new(self.func())
    }
}

impl fmt::Display for FuncPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Computes the type of casting a value of type `from` to `to`.
///
/// Supported casts: between numeric types, from any non-record type to
/// string, from string to any non-record type, and between date and
/// timestamp. Casting a type to itself is always allowed.
pub fn cast_type(from: &ColumnType, to: &ScalarType) -> Result<ColumnType, TypeError> {
    use ScalarType::*;
    let ok = match (&from.scalar_type, to) {
        (f, t) if f == t => true,
        (f, t) if f.is_numeric() && t.is_numeric() => true,
        (Record { .. }, _) | (_, Record { .. }) => false,
        (_, String) | (String, _) => true,
        (Date, Timestamp) | (Timestamp, Date) => true,
        _ => false,
    };
    if ok {
        Ok(to.clone().nullable(from.nullable))
    } else {
        Err(TypeError::InvalidCast {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Casts a datum to `to`. The cast must have been admitted by [`cast_type`].
pub fn cast_datum(datum: Datum, to: &ScalarType) -> Result<Datum, EvalError> {
    use ScalarType as T;
    let invalid = |d: &Datum| EvalError::InvalidCast {
        datum: d.to_string(),
        to: to.to_string(),
    };
    match (datum, to) {
        (Datum::Null, _) => Ok(Datum::Null),
        (d, to) if d.scalar_type().as_ref() == Some(to) => Ok(d),
        (Datum::String(s), T::String) => Ok(Datum::String(s)),
        (d, T::String) => Ok(Datum::String(d.to_string())),
        (Datum::String(s), to) => parse_datum(&s, to).ok_or_else(|| invalid(&Datum::String(s))),
        (Datum::Date(d), T::Timestamp) => Ok(Datum::Timestamp(d.and_time(Default::default()))),
        (Datum::Timestamp(t), T::Date) => Ok(Datum::Date(t.date())),
        (d, to) => match (as_i64(&d), as_f64(&d)) {
            (Some(i), _) => int_to(i, to).ok_or(EvalError::NumericOverflow),
            (None, Some(f)) => float_to(f, to).ok_or(EvalError::NumericOverflow),
            (None, None) => Err(invalid(&d)),
        },
    }
}

fn as_i64(datum: &Datum) -> Option<i64> {
    match datum {
        Datum::Int16(i) => Some(i64::from(*i)),
        Datum::Int32(i) => Some(i64::from(*i)),
        Datum::Int64(i) => Some(*i),
        _ => None,
    }
}

fn as_f64(datum: &Datum) -> Option<f64> {
    match datum {
        Datum::Float32(f) => Some(f64::from(f.0)),
        Datum::Float64(f) => Some(f.0),
        _ => None,
    }
}

#[allow(clippy::as_conversions)]
fn int_to(i: i64, to: &ScalarType) -> Option<Datum> {
    match to {
        ScalarType::Int16 => i16::try_from(i).ok().map(Datum::from),
        ScalarType::Int32 => i32::try_from(i).ok().map(Datum::from),
        ScalarType::Int64 => Some(Datum::from(i)),
        ScalarType::Float32 => Some(Datum::from(i as f32)),
        ScalarType::Float64 => Some(Datum::from(i as f64)),
        _ => None,
    }
}

#[allow(clippy::as_conversions)]
fn float_to(f: f64, to: &ScalarType) -> Option<Datum> {
    let int = |min: f64, max: f64| {
        let rounded = f.round();
        (rounded >= min && rounded <= max).then_some(rounded as i64)
    };
    match to {
        ScalarType::Int16 => int(f64::from(i16::MIN), f64::from(i16::MAX)).and_then(|i| int_to(i, to)),
        ScalarType::Int32 => int(f64::from(i32::MIN), f64::from(i32::MAX)).and_then(|i| int_to(i, to)),
        ScalarType::Int64 => int(-9.223372036854776e18, 9.223372036854775e18).map(Datum::from),
        ScalarType::Float32 => Some(Datum::from(f as f32)),
        ScalarType::Float64 => Some(Datum::from(f)),
        _ => None,
    }
}

fn parse_datum(s: &str, to: &ScalarType) -> Option<Datum> {
    let s = s.trim();
    match to {
        ScalarType::Bool => match s.to_ascii_lowercase().as_str() {
            "true" | "t" => Some(Datum::True),
            "false" | "f" => Some(Datum::False),
            _ => None,
        },
        ScalarType::Int16 => s.parse::<i16>().ok().map(Datum::from),
        ScalarType::Int32 => s.parse::<i32>().ok().map(Datum::from),
        ScalarType::Int64 => s.parse::<i64>().ok().map(Datum::from),
        ScalarType::Float32 => s.parse::<f32>().ok().map(Datum::from),
        ScalarType::Float64 => s.parse::<f64>().ok().map(Datum::from),
        ScalarType::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(Datum::from),
        ScalarType::Timestamp => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(Datum::from),
        ScalarType::Interval => s.parse::<i64>().ok().map(Datum::Interval),
        ScalarType::String | ScalarType::Record { .. } => None,
    }
}
