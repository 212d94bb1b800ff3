// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;
use std::ops::Deref;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::Datum;

/// A tuple of datums: one element of a relation.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Row(Vec<Datum>);

impl Row {
    /// Constructs a row from its datums.
    pub fn new(datums: Vec<Datum>) -> Row {
        Row(datums)
    }

    /// Constructs a row from an iterator of datums.
    pub fn pack<I, D>(iter: I) -> Row
    where
        I: IntoIterator<Item = D>,
        D: Into<Datum>,
    {
        Row(iter.into_iter().map(Into::into).collect())
    }

    /// Returns the datums of the row.
    pub fn datums(&self) -> &[Datum] {
        &self.0
    }

    /// Consumes the row, returning its datums.
    pub fn into_datums(self) -> Vec<Datum> {
        self.0
    }

    /// Converts the row into a record datum.
    pub fn into_record(self) -> Datum {
        Datum::Record(self.0)
    }
}

impl Deref for Row {
    type Target = [Datum];

    fn deref(&self) -> &[Datum] {
        &self.0
    }
}

impl From<Vec<Datum>> for Row {
    fn from(datums: Vec<Datum>) -> Row {
        Row(datums)
    }
}

impl FromIterator<Datum> for Row {
    fn from_iter<I: IntoIterator<Item = Datum>>(iter: I) -> Row {
        Row(iter.into_iter().collect())
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({})", self.0.iter().join(", "))
    }
}
