// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The state of stateful operators, and how each of them turns input
//! deltas into output deltas.

use std::collections::BTreeMap;

use zf_circuit::{FixpointOperator, OperatorId};
use zf_expr::{AggregateExpr, BinaryFunc, Closure, EvalError};
use zf_ore::stack::maybe_grow;
use zf_repr::{Datum, Diff, Row, ZSet};

use crate::{evaluate, Bindings, Deltas, SimulatorError};

#[derive(Debug)]
pub(crate) enum State {
    /// A constant that has already produced its rows.
    Emitted,
    Join(JoinState),
    Aggregate(AggregateState),
    Distinct(DistinctState),
    Watermark(WatermarkState),
    Fixpoint(FixpointState),
}

macro_rules! state_accessor {
    ($name:ident, $variant:ident, $typ:ty) => {
        pub(crate) fn $name(&mut self, id: OperatorId) -> Result<&mut $typ, SimulatorError> {
            match self {
                State::$variant(state) => Ok(state),
                _ => Err(SimulatorError::Internal(format!(
                    "operator {} has the state of another kind of operator",
                    id
                ))),
            }
        }
    };
}

impl State {
    state_accessor!(as_join, Join, JoinState);
    state_accessor!(as_aggregate, Aggregate, AggregateState);
    state_accessor!(as_distinct, Distinct, DistinctState);
    state_accessor!(as_watermark, Watermark, WatermarkState);
    state_accessor!(as_fixpoint, Fixpoint, FixpointState);

    /// The number of rows held.
    pub(crate) fn size(&self) -> usize {
        match self {
            State::Emitted | State::Watermark(_) => 0,
            State::Join(join) => index_size(&join.left) + index_size(&join.right),
            State::Aggregate(aggregate) => index_size(&aggregate.groups),
            State::Distinct(distinct) => distinct.integral.len(),
            State::Fixpoint(fixpoint) => {
                fixpoint.imports.iter().map(ZSet::len).sum::<usize>() + fixpoint.output.len()
            }
        }
    }

    pub(crate) fn watermark(&self) -> Option<&Datum> {
        match self {
            State::Watermark(watermark) => watermark.value.as_ref(),
            _ => None,
        }
    }
}

/// The current value of the watermark operator `id`.
pub(crate) fn watermark_of(states: &BTreeMap<OperatorId, State>, id: OperatorId) -> Option<Datum> {
    states.get(&id).and_then(State::watermark).cloned()
}

/// Rows by key.
type Index = BTreeMap<Row, ZSet>;

fn index_size(index: &Index) -> usize {
    index.values().map(ZSet::len).sum()
}

fn index_update(index: &mut Index, key: Row, row: Row, diff: Diff) {
    let rows = index.entry(key.clone()).or_default();
    rows.update(row, diff);
    if rows.is_empty() {
        index.remove(&key);
    }
}

/// Whether a row with `value` in the collected column is below the
/// watermark.
fn expired(value: Option<&Datum>, watermark: &Datum) -> bool {
    value.is_some_and(|value| !value.is_null() && value < watermark)
}

/// Drops the entries of `index` whose key has expired.
fn collect_index(index: &mut Index, watermark: &Datum, column: usize) -> usize {
    let before = index.len();
    index.retain(|key, _| !expired(key.get(column), watermark));
    before - index.len()
}

fn record(row: &Row) -> Datum {
    Datum::Record(row.datums().to_vec())
}

/// The two indexes of an equijoin. Rows whose key contains NULL are never
/// indexed, as they cannot match.
#[derive(Debug, Default)]
pub(crate) struct JoinState {
    left: Index,
    right: Index,
}

impl JoinState {
    /// `ΔL ⋈ (R + ΔR) + L ⋈ ΔR`, where `L` and `R` are the inputs seen in
    /// previous steps.
    pub(crate) fn step(
        &mut self,
        left: &ZSet,
        right: &ZSet,
        left_key: &Closure,
        right_key: &Closure,
        output: &Closure,
    ) -> Result<ZSet, EvalError> {
        let keyed = |delta: &ZSet, key: &Closure| -> Result<Vec<(Row, Row, Diff)>, EvalError> {
            let mut keyed = vec![];
            for (row, diff) in delta.iter() {
                let key = key.map_row(row)?;
                if !key.iter().any(Datum::is_null) {
                    keyed.push((key, row.clone(), diff));
                }
            }
            Ok(keyed)
        };
        let left = keyed(left, left_key)?;
        let right = keyed(right, right_key)?;

        let mut out = ZSet::new();
        let mut emit = |key: &Row, l: &Row, r: &Row, diff: Diff| -> Result<(), EvalError> {
            let datum = output.call(&[record(key), record(l), record(r)])?;
            match datum {
                Datum::Record(fields) => {
                    out.update(Row::new(fields), diff);
                    Ok(())
                }
                datum => Err(EvalError::Internal(format!(
                    "join output {} is not a tuple",
                    datum
                ))),
            }
        };
        for (key, row, diff) in &right {
            index_update(&mut self.right, key.clone(), row.clone(), *diff);
        }
        for (key, l, ldiff) in &left {
            if let Some(rows) = self.right.get(key) {
                for (r, rdiff) in rows.iter() {
                    emit(key, l, r, ldiff * rdiff)?;
                }
            }
        }
        for (key, r, rdiff) in &right {
            if let Some(rows) = self.left.get(key) {
                for (l, ldiff) in rows.iter() {
                    emit(key, l, r, ldiff * rdiff)?;
                }
            }
        }
        for (key, row, diff) in left {
            index_update(&mut self.left, key, row, diff);
        }
        Ok(out)
    }

    /// Purges the left entries whose key the right watermark has passed,
    /// and the right entries whose key the left watermark has passed.
    pub(crate) fn collect(
        &mut self,
        left_watermark: Option<&Datum>,
        right_watermark: Option<&Datum>,
        column: usize,
        id: OperatorId,
    ) {
        let mut purged = 0;
        if let Some(watermark) = right_watermark {
            purged += collect_index(&mut self.left, watermark, column);
        }
        if let Some(watermark) = left_watermark {
            purged += collect_index(&mut self.right, watermark, column);
        }
        if purged > 0 {
            tracing::trace!(%id, ?left_watermark, ?right_watermark, purged, "purged join keys");
        }
    }
}

/// The rows of each group.
#[derive(Debug, Default)]
pub(crate) struct AggregateState {
    groups: Index,
}

impl AggregateState {
    /// For every group the delta touches, retracts the previous result row
    /// of the group and inserts the new one. Groups without rows have no
    /// result row.
    pub(crate) fn step(
        &mut self,
        delta: &ZSet,
        key: &Closure,
        aggregates: &[AggregateExpr],
    ) -> Result<ZSet, EvalError> {
        let mut changes = Index::new();
        for (row, diff) in delta.iter() {
            index_update(&mut changes, key.map_row(row)?, row.clone(), diff);
        }
        let mut out = ZSet::new();
        for (key, change) in changes {
            let old = self.result(&key, aggregates)?;
            let group = self.groups.entry(key.clone()).or_default();
            *group += &change;
            if group.is_empty() {
                self.groups.remove(&key);
            }
            let new = self.result(&key, aggregates)?;
            if old != new {
                if let Some(old) = old {
                    out.update(old, -1);
                }
                if let Some(new) = new {
                    out.update(new, 1);
                }
            }
        }
        Ok(out)
    }

    fn result(&self, key: &Row, aggregates: &[AggregateExpr]) -> Result<Option<Row>, EvalError> {
        let Some(group) = self.groups.get(key) else {
            return Ok(None);
        };
        if !group.iter().any(|(_, diff)| diff > 0) {
            return Ok(None);
        }
        let mut datums = key.datums().to_vec();
        for aggregate in aggregates {
            let values = group
                .iter()
                .map(|(row, diff)| Ok((aggregate.expr.call_row(row)?, diff)))
                .collect::<Result<Vec<_>, EvalError>>()?;
            datums.push(
                aggregate
                    .func
                    .eval(values.iter().map(|(datum, diff)| (datum, *diff)), aggregate.distinct)?,
            );
        }
        Ok(Some(Row::new(datums)))
    }

    pub(crate) fn collect(&mut self, watermark: &Datum, column: usize, id: OperatorId) {
        let purged = collect_index(&mut self.groups, watermark, column);
        if purged > 0 {
            tracing::trace!(%id, %watermark, purged, "purged aggregate groups");
        }
    }
}

/// The sum of all input deltas.
#[derive(Debug, Default)]
pub(crate) struct DistinctState {
    integral: ZSet,
}

impl DistinctState {
    /// Emits a row when its multiplicity becomes positive, and retracts it
    /// when its multiplicity stops being positive.
    pub(crate) fn step(&mut self, delta: &ZSet) -> ZSet {
        let mut out = ZSet::new();
        for (row, diff) in delta.iter() {
            let before = self.integral.weight(row) > 0;
            self.integral.update(row.clone(), diff);
            let after = self.integral.weight(row) > 0;
            match (before, after) {
                (false, true) => out.update(row.clone(), 1),
                (true, false) => out.update(row.clone(), -1),
                _ => {}
            }
        }
        out
    }

    pub(crate) fn collect(&mut self, watermark: &Datum, column: usize, id: OperatorId) {
        let before = self.integral.len();
        self.integral
            .retain(|row| !expired(row.get(column), watermark));
        let purged = before - self.integral.len();
        if purged > 0 {
            tracing::trace!(%id, %watermark, purged, "purged distinct rows");
        }
    }
}

/// The largest value seen in the watermarked column.
#[derive(Debug, Default)]
pub(crate) struct WatermarkState {
    max: Option<Datum>,
    /// `max` minus the lateness.
    value: Option<Datum>,
}

impl WatermarkState {
    /// Passes the delta through, except for rows below the current
    /// watermark, which are dropped. Then advances the watermark past the
    /// inserted rows.
    pub(crate) fn step(
        &mut self,
        delta: &ZSet,
        column: usize,
        lateness: &Datum,
        id: OperatorId,
    ) -> ZSet {
        let mut out = ZSet::new();
        let mut late = 0;
        for (row, diff) in delta.iter() {
            let value = row.get(column);
            if let Some(watermark) = &self.value {
                if expired(value, watermark) {
                    late += 1;
                    continue;
                }
            }
            if diff > 0 {
                if let Some(value) = value.filter(|value| !value.is_null()) {
                    if self.max.as_ref().map_or(true, |max| value > max) {
                        self.max = Some(value.clone());
                    }
                }
            }
            out.update(row.clone(), diff);
        }
        if late > 0 {
            tracing::debug!(%id, late, watermark = ?self.value, "dropped late rows");
        }
        if let Some(max) = &self.max {
            // A watermark that underflows holds nothing back.
            self.value = BinaryFunc::Sub.eval(max.clone(), lateness.clone()).ok();
        }
        out
    }
}

/// The full contents of the imports and the output of a fixpoint.
#[derive(Debug, Default)]
pub(crate) struct FixpointState {
    imports: Vec<ZSet>,
    output: ZSet,
    evaluated: bool,
}

impl FixpointState {
    /// Recomputes the fixpoint if an import changed, and emits the change
    /// of its value.
    pub(crate) fn step(
        &mut self,
        fixpoint: &FixpointOperator,
        deltas: Vec<ZSet>,
        id: OperatorId,
    ) -> Result<ZSet, SimulatorError> {
        self.imports.resize_with(deltas.len(), ZSet::new);
        let mut changed = !self.evaluated;
        for (import, delta) in self.imports.iter_mut().zip(&deltas) {
            changed |= !delta.is_empty();
            *import += delta;
        }
        if !changed {
            return Ok(ZSet::new());
        }
        let value = maybe_grow(|| self.iterate(fixpoint, id))?;
        let delta = value.minus(&self.output);
        self.output = value;
        self.evaluated = true;
        Ok(delta)
    }

    /// Evaluates the body from an empty iteration variable until the
    /// variable no longer changes.
    fn iterate(&self, fixpoint: &FixpointOperator, id: OperatorId) -> Result<ZSet, SimulatorError> {
        let sources = Deltas::new();
        let mut variable = ZSet::new();
        for iteration in 0..fixpoint.max_iterations {
            let bindings = Bindings {
                sources: &sources,
                imports: &self.imports,
                variable: Some(&variable),
            };
            let mut deltas = evaluate(&fixpoint.body, &mut BTreeMap::new(), &bindings)?;
            let next = deltas.remove(&fixpoint.result).unwrap_or_default();
            if next == variable {
                tracing::trace!(%id, iterations = iteration + 1, rows = next.len(), "fixpoint converged");
                return Ok(next);
            }
            variable = next;
        }
        Err(SimulatorError::IterationLimit {
            operator: id,
            limit: fixpoint.max_iterations,
        })
    }
}
