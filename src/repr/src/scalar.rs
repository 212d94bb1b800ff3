// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::relation::ColumnType;

/// The base type of a [`Datum`].
///
/// There is a direct correspondence between `Datum` variants and
/// `ScalarType` variants, with the exception of [`Datum::Null`], which
/// inhabits every nullable [`ColumnType`], and the two boolean datums.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    /// The type of [`Datum::True`] and [`Datum::False`].
    Bool,
    /// The type of [`Datum::Int16`].
    Int16,
    /// The type of [`Datum::Int32`].
    Int32,
    /// The type of [`Datum::Int64`].
    Int64,
    /// The type of [`Datum::Float32`].
    Float32,
    /// The type of [`Datum::Float64`].
    Float64,
    /// The type of [`Datum::String`].
    String,
    /// The type of [`Datum::Date`].
    Date,
    /// The type of [`Datum::Timestamp`].
    Timestamp,
    /// The type of [`Datum::Interval`].
    Interval,
    /// The type of [`Datum::Record`]: a fixed-arity tuple of typed fields.
    Record {
        /// The types of the fields, in order.
        fields: Vec<ColumnType>,
    },
}

impl ScalarType {
    /// Returns a [`ColumnType`] with this scalar type and the specified
    /// nullability.
    pub fn nullable(self, nullable: bool) -> ColumnType {
        ColumnType::new(self).nullable(nullable)
    }

    /// Whether arithmetic is defined on values of this type.
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Whether this is one of the integer types.
    pub fn is_integer(&self) -> bool {
        matches!(self, ScalarType::Int16 | ScalarType::Int32 | ScalarType::Int64)
    }

    /// Whether this is one of the floating point types.
    pub fn is_float(&self) -> bool {
        matches!(self, ScalarType::Float32 | ScalarType::Float64)
    }

    /// Returns the fields of a record type, or `None` for other types.
    pub fn record_fields(&self) -> Option<&[ColumnType]> {
        match self {
            ScalarType::Record { fields } => Some(fields),
            _ => None,
        }
    }

    /// Compares two scalar types, ignoring the nullability of any nested
    /// record fields.
    pub fn same_base(&self, other: &ScalarType) -> bool {
        match (self, other) {
            (ScalarType::Record { fields: l }, ScalarType::Record { fields: r }) => {
                l.len() == r.len() && l.iter().zip(r).all(|(l, r)| l.same_base(r))
            }
            (l, r) => l == r,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ScalarType::*;
        match self {
            Bool => f.write_str("bool"),
            Int16 => f.write_str("int16"),
            Int32 => f.write_str("int32"),
            Int64 => f.write_str("int64"),
            Float32 => f.write_str("float32"),
            Float64 => f.write_str("float64"),
            String => f.write_str("string"),
            Date => f.write_str("date"),
            Timestamp => f.write_str("timestamp"),
            Interval => f.write_str("interval"),
            Record { fields } => write!(f, "({})", fields.iter().join(", ")),
        }
    }
}

/// A single value.
///
/// Datums are owned and totally ordered, so that they can be used as keys
/// of the maps that back [`ZSet`](crate::ZSet)s and operator state. Floats
/// are wrapped in [`OrderedFloat`] to obtain that total order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Datum {
    /// An unknown value.
    Null,
    /// The `false` boolean value.
    False,
    /// The `true` boolean value.
    True,
    /// A 16-bit signed integer.
    Int16(i16),
    /// A 32-bit signed integer.
    Int32(i32),
    /// A 64-bit signed integer.
    Int64(i64),
    /// A 32-bit floating point number.
    Float32(OrderedFloat<f32>),
    /// A 64-bit floating point number.
    Float64(OrderedFloat<f64>),
    /// A sequence of Unicode codepoints encoded as UTF-8.
    String(String),
    /// A date without a time zone.
    Date(NaiveDate),
    /// A date and time without a time zone.
    Timestamp(NaiveDateTime),
    /// A span of time, in microseconds.
    Interval(i64),
    /// A fixed-arity tuple of datums.
    Record(Vec<Datum>),
}

impl Datum {
    /// Reports whether this datum is null (i.e., is [`Datum::Null`]).
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Returns the boolean value of the datum, or `None` if it is not a
    /// boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::True => Some(true),
            Datum::False => Some(false),
            _ => None,
        }
    }

    /// Returns the fields of a record datum, or `None` if it is not a record.
    pub fn as_record(&self) -> Option<&[Datum]> {
        match self {
            Datum::Record(fields) => Some(fields),
            _ => None,
        }
    }

    /// Returns the base type of this datum, or `None` for [`Datum::Null`]
    /// and for records, whose field nullability cannot be recovered from a
    /// single value.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            Datum::Null | Datum::Record(_) => None,
            Datum::False | Datum::True => Some(ScalarType::Bool),
            Datum::Int16(_) => Some(ScalarType::Int16),
            Datum::Int32(_) => Some(ScalarType::Int32),
            Datum::Int64(_) => Some(ScalarType::Int64),
            Datum::Float32(_) => Some(ScalarType::Float32),
            Datum::Float64(_) => Some(ScalarType::Float64),
            Datum::String(_) => Some(ScalarType::String),
            Datum::Date(_) => Some(ScalarType::Date),
            Datum::Timestamp(_) => Some(ScalarType::Timestamp),
            Datum::Interval(_) => Some(ScalarType::Interval),
        }
    }

    /// Reports whether this datum is an instance of the specified column
    /// type.
    pub fn is_instance_of(&self, column_type: &ColumnType) -> bool {
        match (self, &column_type.scalar_type) {
            (Datum::Null, _) => column_type.nullable,
            (Datum::Record(datums), ScalarType::Record { fields }) => {
                datums.len() == fields.len()
                    && datums.iter().zip(fields).all(|(d, t)| d.is_instance_of(t))
            }
            (datum, scalar_type) => datum.scalar_type().as_ref() == Some(scalar_type),
        }
    }
}

impl From<bool> for Datum {
    fn from(b: bool) -> Datum {
        if b {
            Datum::True
        } else {
            Datum::False
        }
    }
}

impl From<i16> for Datum {
    fn from(i: i16) -> Datum {
        Datum::Int16(i)
    }
}

impl From<i32> for Datum {
    fn from(i: i32) -> Datum {
        Datum::Int32(i)
    }
}

impl From<i64> for Datum {
    fn from(i: i64) -> Datum {
        Datum::Int64(i)
    }
}

impl From<f32> for Datum {
    fn from(f: f32) -> Datum {
        Datum::Float32(OrderedFloat(f))
    }
}

impl From<f64> for Datum {
    fn from(f: f64) -> Datum {
        Datum::Float64(OrderedFloat(f))
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Datum {
        Datum::String(s.to_owned())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Datum {
        Datum::String(s)
    }
}

impl From<NaiveDate> for Datum {
    fn from(d: NaiveDate) -> Datum {
        Datum::Date(d)
    }
}

impl From<NaiveDateTime> for Datum {
    fn from(dt: NaiveDateTime) -> Datum {
        Datum::Timestamp(dt)
    }
}

impl<T> From<Option<T>> for Datum
where
    Datum: From<T>,
{
    fn from(o: Option<T>) -> Datum {
        match o {
            Some(d) => d.into(),
            None => Datum::Null,
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("null"),
            Datum::True => f.write_str("true"),
            Datum::False => f.write_str("false"),
            Datum::Int16(i) => write!(f, "{}", i),
            Datum::Int32(i) => write!(f, "{}", i),
            Datum::Int64(i) => write!(f, "{}", i),
            Datum::Float32(n) => write!(f, "{:?}", n.0),
            Datum::Float64(n) => write!(f, "{:?}", n.0),
            Datum::String(s) => write!(f, "{:?}", s),
            Datum::Date(d) => write!(f, "{}", d),
            Datum::Timestamp(t) => write!(f, "{}", t),
            Datum::Interval(micros) => write!(f, "{}us", micros),
            Datum::Record(datums) => write!(f, "({})", datums.iter().join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[zf_ore::test]
    fn null_inhabits_only_nullable_types() {
        assert!(Datum::Null.is_instance_of(&ScalarType::Int32.nullable(true)));
        assert!(!Datum::Null.is_instance_of(&ScalarType::Int32.nullable(false)));
        assert!(Datum::Int32(1).is_instance_of(&ScalarType::Int32.nullable(false)));
        assert!(!Datum::Int64(1).is_instance_of(&ScalarType::Int32.nullable(true)));
    }

    #[zf_ore::test]
    fn records_check_their_fields() {
        let typ = ScalarType::Record {
            fields: vec![
                ScalarType::Bool.nullable(false),
                ScalarType::String.nullable(true),
            ],
        }
        .nullable(false);
        assert!(Datum::Record(vec![Datum::True, Datum::Null]).is_instance_of(&typ));
        assert!(!Datum::Record(vec![Datum::Null, Datum::Null]).is_instance_of(&typ));
        assert!(!Datum::Record(vec![Datum::True]).is_instance_of(&typ));
    }

    #[zf_ore::test]
    fn display() {
        let record = Datum::Record(vec![
            Datum::from(12.0f64),
            Datum::from("Hi"),
            Datum::Null,
            Datum::from(true),
        ]);
        assert_eq!(record.to_string(), r#"(12.0, "Hi", null, true)"#);
        let typ = ScalarType::Record {
            fields: vec![
                ScalarType::Int32.nullable(false),
                ScalarType::Float64.nullable(true),
            ],
        };
        assert_eq!(typ.to_string(), "(int32, float64?)");
    }

    #[zf_ore::test]
    fn same_base_ignores_field_nullability() {
        let l = ScalarType::Record {
            fields: vec![ScalarType::Int32.nullable(false)],
        };
        let r = ScalarType::Record {
            fields: vec![ScalarType::Int32.nullable(true)],
        };
        assert!(l.same_base(&r));
        assert_ne!(l, r);
        assert!(!ScalarType::Int32.same_base(&ScalarType::Int64));
    }
}
