// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{ScalarType, TypeError};

/// The type of a [`Datum`](crate::Datum).
///
/// [`ColumnType`] bundles information about the scalar type of a datum (e.g.,
/// Int32 or String) with its nullability.
///
/// To construct a column type, either initialize the struct directly, or
/// use the [`ScalarType::nullable`] method.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ColumnType {
    /// The underlying scalar type (e.g., Int32 or String) of this column.
    pub scalar_type: ScalarType,
    /// Whether this datum can be null.
    #[serde(default)]
    pub nullable: bool,
}

impl ColumnType {
    /// Constructs a new non-nullable `ColumnType` with the specified
    /// [`ScalarType`] as its underlying type. If desired, the `nullable`
    /// property can be set with the method of the same name.
    pub fn new(scalar_type: ScalarType) -> Self {
        ColumnType {
            scalar_type,
            nullable: false,
        }
    }

    /// Consumes this `ColumnType` and returns a new `ColumnType` with its
    /// nullability set to the specified boolean.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Joins the nullability of two column types with the same base type.
    ///
    /// The result is nullable if either input is; record fields are joined
    /// field by field. Column types with different base types do not
    /// unify and produce a [`TypeError::Mismatch`].
    pub fn union(&self, other: &Self) -> Result<Self, TypeError> {
        let scalar_type = match (&self.scalar_type, &other.scalar_type) {
            (ScalarType::Record { fields: l }, ScalarType::Record { fields: r })
                if l.len() == r.len() =>
            {
                let fields = l
                    .iter()
                    .zip(r)
                    .map(|(l, r)| l.union(r))
                    .collect::<Result<_, _>>()
                    .map_err(|_| TypeError::mismatch(self, other))?;
                ScalarType::Record { fields }
            }
            (s1, s2) if s1 == s2 => s1.clone(),
            _ => return Err(TypeError::mismatch(self, other)),
        };
        Ok(ColumnType {
            scalar_type,
            nullable: self.nullable || other.nullable,
        })
    }

    /// Reports whether the two column types share a base type, ignoring
    /// nullability at every level.
    pub fn same_base(&self, other: &Self) -> bool {
        self.scalar_type.same_base(&other.scalar_type)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.scalar_type)?;
        if self.nullable {
            f.write_str("?")?;
        }
        Ok(())
    }
}

/// The type of a relation: the column types of the tuples in a stream.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct RelationType {
    /// The type for each column, in order.
    pub column_types: Vec<ColumnType>,
}

impl RelationType {
    /// Creates a relation type representing the relation with no columns.
    pub fn empty() -> Self {
        RelationType::new(vec![])
    }

    /// Creates a new instance from specified column types.
    pub fn new(column_types: Vec<ColumnType>) -> Self {
        RelationType { column_types }
    }

    /// The number of columns in the relation.
    pub fn arity(&self) -> usize {
        self.column_types.len()
    }

    /// The non-nullable record type of a single tuple of this relation.
    pub fn record_type(&self) -> ColumnType {
        ScalarType::Record {
            fields: self.column_types.clone(),
        }
        .nullable(false)
    }

    /// Recovers a relation type from a record type, or `None` if the column
    /// type is not a record.
    pub fn from_record_type(typ: &ColumnType) -> Option<RelationType> {
        typ.scalar_type
            .record_fields()
            .map(|fields| RelationType::new(fields.to_vec()))
    }

    /// Joins two relation types column by column.
    ///
    /// See [`ColumnType::union`].
    pub fn union(&self, other: &Self) -> Result<Self, TypeError> {
        if self.arity() != other.arity() {
            return Err(TypeError::mismatch(self, other));
        }
        let column_types = self
            .column_types
            .iter()
            .zip(&other.column_types)
            .map(|(l, r)| l.union(r))
            .collect::<Result<_, _>>()?;
        Ok(RelationType { column_types })
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({})", self.column_types.iter().join(", "))
    }
}
