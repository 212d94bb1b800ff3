// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Circuits of operators.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use zf_ore::id_gen::Gen;
use zf_repr::RelationType;

use crate::{CircuitError, Operator, OperatorId, OperatorKind};

/// A directed acyclic graph of operators.
///
/// # Invariants
///
///  (1) Every operator referenced by an operator of the circuit is contained
///  in the circuit and has a smaller id than the referencing operator, so
///  iterating by id visits inputs before their consumers.
///  (2) The type recorded for each operator is the type derived from its
///  kind and the types of its inputs.
///
/// All methods that change the circuit uphold these invariants; recursion
/// is expressed by nesting circuits inside [`OperatorKind::Fixpoint`]
/// operators, never by cycles.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Circuit {
    operators: BTreeMap<OperatorId, Operator>,
    #[serde(skip)]
    id_gen: Gen<OperatorId>,
}

impl PartialEq for Circuit {
    fn eq(&self, other: &Circuit) -> bool {
        self.operators == other.operators
    }
}

impl Eq for Circuit {}

impl Circuit {
    pub fn new() -> Circuit {
        Circuit::default()
    }

    /// Adds an operator and returns its id.
    ///
    /// Fails if the operator refers to unknown operators or is ill-typed.
    pub fn add(&mut self, kind: OperatorKind) -> Result<OperatorId, CircuitError> {
        let typ = kind.derive_type(self)?;
        for dep in kind.dependencies() {
            self.typ(dep)?;
        }
        let id = self.id_gen.allocate_id();
        tracing::trace!(%id, operator = kind.name(), %typ, "adding operator");
        self.operators.insert(id, Operator { kind, typ });
        Ok(id)
    }

    pub fn get(&self, id: OperatorId) -> Option<&Operator> {
        self.operators.get(&id)
    }

    /// The type of the tuples produced by operator `id`.
    pub fn typ(&self, id: OperatorId) -> Result<&RelationType, CircuitError> {
        self.operators
            .get(&id)
            .map(|op| &op.typ)
            .ok_or(CircuitError::UnknownOperator(id))
    }

    pub fn contains(&self, id: OperatorId) -> bool {
        self.operators.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// The operators in topological order.
    pub fn iter(&self) -> impl Iterator<Item = (OperatorId, &Operator)> {
        self.operators.iter().map(|(id, op)| (*id, op))
    }

    /// The ids of all operators, in topological order.
    pub fn ids(&self) -> Vec<OperatorId> {
        self.operators.keys().copied().collect()
    }

    /// The declared inputs, with their names.
    pub fn sources(&self) -> Vec<(OperatorId, &str)> {
        self.iter()
            .filter_map(|(id, op)| match &op.kind {
                OperatorKind::Source { name, .. } => Some((id, name.as_str())),
                _ => None,
            })
            .collect()
    }

    /// The declared outputs, with their names.
    pub fn sinks(&self) -> Vec<(OperatorId, &str)> {
        self.iter()
            .filter_map(|(id, op)| match &op.kind {
                OperatorKind::Sink { name, .. } => Some((id, name.as_str())),
                _ => None,
            })
            .collect()
    }

    /// The source declared as `name`.
    pub fn source(&self, name: &str) -> Option<OperatorId> {
        self.sources()
            .into_iter()
            .find_map(|(id, n)| (n == name).then_some(id))
    }

    /// The sink declared as `name`.
    pub fn sink(&self, name: &str) -> Option<OperatorId> {
        self.sinks()
            .into_iter()
            .find_map(|(id, n)| (n == name).then_some(id))
    }

    /// The operators that refer to operator `id`.
    pub fn consumers(&self, id: OperatorId) -> Vec<OperatorId> {
        self.iter()
            .filter(|(_, op)| op.kind.dependencies().contains(&id))
            .map(|(consumer, _)| consumer)
            .collect()
    }

    /// Replaces the kind of operator `id`. The new kind must produce the
    /// same type and refer only to operators preceding `id`.
    pub fn replace(&mut self, id: OperatorId, kind: OperatorKind) -> Result<(), CircuitError> {
        let old = self.typ(id)?;
        let typ = kind.derive_type(self)?;
        if &typ != old {
            return Err(CircuitError::malformed(
                id,
                format!("replacement changes type from {} to {}", old, typ),
            ));
        }
        self.check_dependencies(id, &kind)?;
        tracing::trace!(%id, operator = kind.name(), "replacing operator");
        self.operators.insert(id, Operator { kind, typ });
        Ok(())
    }

    /// Makes every consumer of operator `from` consume operator `to`
    /// instead. Returns the number of redirected consumers.
    ///
    /// `from` and `to` must produce the same type, and `to` must precede
    /// every consumer of `from`.
    pub fn redirect(&mut self, from: OperatorId, to: OperatorId) -> Result<usize, CircuitError> {
        if self.typ(from)? != self.typ(to)? {
            return Err(CircuitError::malformed(
                from,
                format!("cannot redirect to {} of a different type", to),
            ));
        }
        let consumers = self.consumers(from);
        for consumer in &consumers {
            if to >= *consumer {
                return Err(CircuitError::malformed(
                    *consumer,
                    format!("cannot consume {} from a later operator", to),
                ));
            }
        }
        for consumer in &consumers {
            if let Some(op) = self.operators.get_mut(consumer) {
                op.kind = op.kind.map_ids(|dep| if dep == from { to } else { dep });
            }
        }
        Ok(consumers.len())
    }

    /// Removes operator `id`, which must not have consumers.
    pub fn remove(&mut self, id: OperatorId) -> Result<Operator, CircuitError> {
        if let Some(consumer) = self.consumers(id).into_iter().next() {
            return Err(CircuitError::malformed(
                id,
                format!("cannot remove operator consumed by {}", consumer),
            ));
        }
        self.operators
            .remove(&id)
            .ok_or(CircuitError::UnknownOperator(id))
    }

    fn check_dependencies(&self, id: OperatorId, kind: &OperatorKind) -> Result<(), CircuitError> {
        for dep in kind.dependencies() {
            if !self.contains(dep) {
                return Err(CircuitError::malformed(id, format!("dangling reference to {}", dep)));
            }
            if dep >= id {
                return Err(CircuitError::malformed(id, format!("refers to later operator {}", dep)));
            }
        }
        Ok(())
    }

    /// Checks the invariants of the circuit.
    pub fn validate(&self) -> Result<(), CircuitError> {
        self.validate_inner(None)
    }

    /// `imports` is the number of imports of the enclosing fixpoint, if the
    /// circuit is a fixpoint body.
    fn validate_inner(&self, imports: Option<usize>) -> Result<(), CircuitError> {
        let mut sources = BTreeSet::new();
        let mut sinks = BTreeSet::new();
        for (id, op) in self.iter() {
            self.check_dependencies(id, &op.kind)?;
            let typ = op.kind.derive_type(self)?;
            if typ != op.typ {
                return Err(CircuitError::malformed(
                    id,
                    format!("recorded type {} differs from derived type {}", op.typ, typ),
                ));
            }
            match (&op.kind, imports) {
                (OperatorKind::Source { name, .. }, None) => {
                    if !sources.insert(name) {
                        return Err(CircuitError::malformed(id, format!("duplicate source {}", name)));
                    }
                }
                (OperatorKind::Sink { name, .. }, None) => {
                    if !sinks.insert(name) {
                        return Err(CircuitError::malformed(id, format!("duplicate sink {}", name)));
                    }
                }
                (OperatorKind::Import { index, .. }, Some(imports)) => {
                    if *index >= imports {
                        return Err(CircuitError::malformed(id, format!("no import {}", index)));
                    }
                }
                (OperatorKind::IterationVariable { .. }, Some(_)) => {}
                (
                    OperatorKind::Source { .. }
                    | OperatorKind::Sink { .. }
                    | OperatorKind::Import { .. }
                    | OperatorKind::IterationVariable { .. },
                    _,
                ) => {
                    return Err(CircuitError::malformed(
                        id,
                        format!("{} not allowed here", op.kind.name()),
                    ))
                }
                (OperatorKind::Fixpoint(fixpoint), _) => {
                    fixpoint.body.validate_inner(Some(fixpoint.imports.len()))?;
                    match fixpoint.body.get(fixpoint.variable).map(|op| &op.kind) {
                        Some(OperatorKind::IterationVariable { .. }) => {}
                        _ => {
                            return Err(CircuitError::malformed(
                                id,
                                format!("{} is not an iteration variable", fixpoint.variable),
                            ))
                        }
                    }
                    let variables = fixpoint
                        .body
                        .iter()
                        .filter(|(_, op)| matches!(op.kind, OperatorKind::IterationVariable { .. }))
                        .count();
                    if variables != 1 {
                        return Err(CircuitError::malformed(
                            id,
                            format!("body has {} iteration variables", variables),
                        ));
                    }
                    if fixpoint.max_iterations == 0 {
                        return Err(CircuitError::malformed(id, "iteration bound of zero"));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}
