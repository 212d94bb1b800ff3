// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::btree_map::{self, Entry};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{AddAssign, Neg};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::Row;

/// System-wide update type.
pub type Diff = i64;

/// A multiset of rows with signed multiplicities.
///
/// A positive multiplicity denotes that many copies of the row, a negative
/// multiplicity a pending retraction. Multiplicities are never clamped: an
/// insertion and a deletion of the same row cancel algebraically. Rows with
/// multiplicity zero are never stored, so two Z-sets are equal exactly when
/// they describe the same multiset.
///
/// Z-sets serialize as a list of `(row, diff)` pairs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "Vec<(Row, Diff)>", from = "Vec<(Row, Diff)>")]
pub struct ZSet {
    updates: BTreeMap<Row, Diff>,
}

impl ZSet {
    /// The empty Z-set.
    pub fn new() -> ZSet {
        ZSet::default()
    }

    /// A Z-set containing a single row with the given multiplicity.
    pub fn singleton(row: Row, diff: Diff) -> ZSet {
        let mut zset = ZSet::new();
        zset.update(row, diff);
        zset
    }

    /// A Z-set containing each of the given rows once.
    pub fn from_rows<I: IntoIterator<Item = Row>>(rows: I) -> ZSet {
        rows.into_iter().map(|row| (row, 1)).collect()
    }

    /// Adds `diff` to the multiplicity of `row`.
    pub fn update(&mut self, row: Row, diff: Diff) {
        if diff == 0 {
            return;
        }
        match self.updates.entry(row) {
            Entry::Vacant(e) => {
                e.insert(diff);
            }
            Entry::Occupied(mut e) => {
                *e.get_mut() += diff;
                if *e.get() == 0 {
                    e.remove();
                }
            }
        }
    }

    /// The multiplicity of `row`, zero if the row is absent.
    pub fn weight(&self, row: &Row) -> Diff {
        self.updates.get(row).copied().unwrap_or(0)
    }

    /// Whether the Z-set contains no rows.
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// The number of distinct rows with a non-zero multiplicity.
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Iterates over the rows and their multiplicities, in row order.
    pub fn iter(&self) -> impl Iterator<Item = (&Row, Diff)> {
        self.updates.iter().map(|(row, diff)| (row, *diff))
    }

    /// The sum of two Z-sets.
    pub fn plus(&self, other: &ZSet) -> ZSet {
        let mut sum = self.clone();
        sum += other;
        sum
    }

    /// The difference of two Z-sets.
    pub fn minus(&self, other: &ZSet) -> ZSet {
        let mut difference = self.clone();
        for (row, diff) in other.iter() {
            difference.update(row.clone(), -diff);
        }
        difference
    }

    /// Scales every multiplicity by `factor`.
    pub fn scale(&self, factor: Diff) -> ZSet {
        self.iter()
            .map(|(row, diff)| (row.clone(), diff * factor))
            .collect()
    }

    /// The set of rows with a positive multiplicity, each with
    /// multiplicity one.
    pub fn distinct(&self) -> ZSet {
        self.iter()
            .filter(|(_, diff)| *diff > 0)
            .map(|(row, _)| (row.clone(), 1))
            .collect()
    }

    /// Whether every multiplicity is positive, i.e., the Z-set describes an
    /// ordinary multiset.
    pub fn is_positive(&self) -> bool {
        self.updates.values().all(|diff| *diff > 0)
    }

    /// Removes all rows for which `f` returns `false`.
    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&Row) -> bool,
    {
        self.updates.retain(|row, _| f(row))
    }
}

impl AddAssign<&ZSet> for ZSet {
    fn add_assign(&mut self, other: &ZSet) {
        for (row, diff) in other.iter() {
            self.update(row.clone(), diff);
        }
    }
}

impl Neg for ZSet {
    type Output = ZSet;

    fn neg(mut self) -> ZSet {
        for diff in self.updates.values_mut() {
            *diff = -*diff;
        }
        self
    }
}

impl FromIterator<(Row, Diff)> for ZSet {
    fn from_iter<I: IntoIterator<Item = (Row, Diff)>>(iter: I) -> ZSet {
        let mut zset = ZSet::new();
        zset.extend(iter);
        zset
    }
}

impl From<Vec<(Row, Diff)>> for ZSet {
    fn from(updates: Vec<(Row, Diff)>) -> ZSet {
        updates.into_iter().collect()
    }
}

impl From<ZSet> for Vec<(Row, Diff)> {
    fn from(zset: ZSet) -> Vec<(Row, Diff)> {
        zset.into_iter().collect()
    }
}

impl Extend<(Row, Diff)> for ZSet {
    fn extend<I: IntoIterator<Item = (Row, Diff)>>(&mut self, iter: I) {
        for (row, diff) in iter {
            self.update(row, diff);
        }
    }
}

impl IntoIterator for ZSet {
    type Item = (Row, Diff);
    type IntoIter = btree_map::IntoIter<Row, Diff>;

    fn into_iter(self) -> Self::IntoIter {
        self.updates.into_iter()
    }
}

impl fmt::Display for ZSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.iter()
                .format_with(", ", |(row, diff), f| f(&format_args!("{}: {:+}", row, diff)))
        )
    }
}
