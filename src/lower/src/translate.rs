// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Translation of programs to circuits.
//!
//! Plans are lowered bottom-up, one view at a time, into a single circuit.
//! Every table becomes one `Source` and every view one `Sink`; a view read
//! by later views is consumed through the operator that computes it, so
//! each view is computed once no matter how many readers it has.
//!
//! Lowering rules:
//!
//!   * filters and projections become `Filter` and `Map` operators;
//!   * inner joins become `Join` operators keyed by the columns the `ON`
//!     predicate equates, preceded by filters discarding NULL keys and
//!     followed by a filter for the rest of the predicate;
//!   * aggregates and `DISTINCT` become the corresponding stateful
//!     operators, `UNION` becomes `Union` followed by `Distinct`;
//!   * recursive views become `Fixpoint` operators whose body computes the
//!     `UNION` of the base case and the recursive steps;
//!   * lateness declarations insert a `Watermark` after the relation they
//!     name. Stateful operators whose key carries the watermarked column
//!     unchanged receive a policy purging the state the watermark has
//!     passed.
//!
//! An expression is never attached to two operators: if a lowered
//! expression already belongs to an operator, the second operator receives
//! a deep copy.

use std::collections::{BTreeMap, BTreeSet};

use zf_circuit::{Circuit, FixpointOperator, JoinGc, OperatorId, OperatorKind, StateGc};
use zf_expr::visit::Visit;
use zf_expr::{AggregateExpr, AggregateFunc, BinaryFunc, Closure, ExprKind, Param, ScalarExpr};
use zf_ore::stack::{CheckedRecursion, RecursionGuard};
use zf_repr::{Datum, RelationType, Row, TypeError, ZSet};

use crate::plan::{JoinKind, PlanExpr, PlanScalar, Program, Table, View};
use crate::{recursion, LowerError, PlanLocation, RecursionConfig};

/// Lowers all views of `program` into one circuit.
pub fn translate(program: &Program, config: &RecursionConfig) -> Result<Circuit, LowerError> {
    let mut translator = Translator {
        config,
        program,
        circuit: Circuit::new(),
        relations: BTreeMap::new(),
        attached: BTreeSet::new(),
    };
    for lateness in &program.lateness {
        let declared = program.tables.iter().any(|t| t.name == lateness.relation)
            || program.views.iter().any(|v| v.name == lateness.relation);
        if !declared {
            return Err(LowerError::UnknownRelation {
                location: PlanLocation::new(&lateness.relation),
                name: lateness.relation.clone(),
            });
        }
    }
    for table in &program.tables {
        translator.declare_table(table)?;
    }
    for view in &program.views {
        translator.declare_view(view)?;
    }
    Ok(translator.circuit)
}

/// A table or view that later views can read.
#[derive(Debug)]
struct Relation {
    id: OperatorId,
    columns: Vec<String>,
}

#[derive(Debug)]
struct Translator<'a> {
    config: &'a RecursionConfig,
    program: &'a Program,
    circuit: Circuit,
    relations: BTreeMap<String, Relation>,
    /// The expression nodes attached to operators so far.
    attached: BTreeSet<usize>,
}

impl Translator<'_> {
    fn declare_table(&mut self, table: &Table) -> Result<(), LowerError> {
        if self.relations.contains_key(&table.name) {
            return Err(LowerError::DuplicateRelation(table.name.clone()));
        }
        let id = self
            .circuit
            .add(OperatorKind::Source {
                name: table.name.clone(),
                typ: table.typ(),
            })
            .map_err(|e| LowerError::from_circuit(PlanLocation::new(&table.name), e))?;
        let columns = table.columns.iter().map(|c| c.name.clone()).collect();
        self.register(&table.name, id, columns)
    }

    fn declare_view(&mut self, view: &View) -> Result<(), LowerError> {
        if self.relations.contains_key(&view.name) {
            return Err(LowerError::DuplicateRelation(view.name.clone()));
        }
        let id = if view.recursive && view.plan.references(&view.name) {
            self.lower_recursive(view)?
        } else {
            let mut lowering = Lowering::new(
                &mut self.circuit,
                &self.relations,
                &mut self.attached,
                &view.name,
                None,
            );
            lowering.lower(&view.plan)?
        };
        let location = || PlanLocation::new(&view.name);
        let arity = self
            .circuit
            .typ(id)
            .map_err(|e| LowerError::from_circuit(location(), e))?
            .arity();
        if arity != view.columns.len() {
            return Err(LowerError::Arity {
                view: view.name.clone(),
                declared: view.columns.len(),
                actual: arity,
            });
        }
        self.circuit
            .add(OperatorKind::Sink {
                input: id,
                name: view.name.clone(),
            })
            .map_err(|e| LowerError::from_circuit(location(), e))?;
        tracing::debug!(view = %view.name, operator = %id, recursive = view.recursive, "lowered view");
        self.register(&view.name, id, view.columns.clone())
    }

    /// Makes a relation available to later views, inserting the watermarks
    /// declared on it.
    fn register(
        &mut self,
        name: &str,
        mut id: OperatorId,
        columns: Vec<String>,
    ) -> Result<(), LowerError> {
        for lateness in self.program.lateness.iter().filter(|l| l.relation == name) {
            let column = columns
                .iter()
                .position(|c| *c == lateness.column)
                .ok_or_else(|| LowerError::UnknownColumn {
                    relation: name.to_string(),
                    column: lateness.column.clone(),
                })?;
            id = self
                .circuit
                .add(OperatorKind::Watermark {
                    input: id,
                    column,
                    lateness: lateness.value.clone(),
                })
                .map_err(|e| LowerError::from_circuit(PlanLocation::new(name), e))?;
            tracing::debug!(
                relation = name,
                column = %lateness.column,
                lateness = %lateness.value,
                "inserted watermark"
            );
        }
        self.relations
            .insert(name.to_string(), Relation { id, columns });
        Ok(())
    }

    /// Lowers a recursive view into a fixpoint operator.
    ///
    /// The body computes `DISTINCT(base ∪ steps(variable))`. The type of the
    /// iteration variable is taken from the base case; if the steps widen
    /// it (by introducing nullable columns), the body is lowered once more
    /// with the widened type.
    fn lower_recursive(&mut self, view: &View) -> Result<OperatorId, LowerError> {
        recursion::check(view, self.config)?;
        let location = || PlanLocation::new(&view.name);
        let PlanExpr::Union { inputs, .. } = &view.plan else {
            return Err(LowerError::IllFoundedRecursion {
                location: location(),
                reason: "the plan must be a UNION".into(),
            });
        };
        let mut widened: Option<RelationType> = None;
        loop {
            let mut body = Circuit::new();
            let mut lowering = Lowering::new(
                &mut body,
                &self.relations,
                &mut self.attached,
                &view.name,
                Some(Body::new(&self.circuit)),
            );
            let mut branches = vec![None; inputs.len()];
            let is_base = |branch: &PlanExpr| !branch.references(&view.name);
            for (index, branch) in inputs.iter().enumerate() {
                if is_base(branch) {
                    branches[index] = Some(lowering.child(index, branch)?);
                }
            }
            let mut base_type: Option<RelationType> = None;
            for id in branches.iter().flatten() {
                let typ = lowering.typ(*id)?;
                base_type = Some(match base_type {
                    None => typ,
                    Some(base) => base.union(&typ).map_err(|e| lowering.type_error(e))?,
                });
            }
            let typ = widened
                .clone()
                .or(base_type)
                .ok_or_else(|| LowerError::IllFoundedRecursion {
                    location: location(),
                    reason: "no branch is a base case".into(),
                })?;
            let variable = lowering.add(OperatorKind::IterationVariable { typ: typ.clone() })?;
            lowering.set_variable(variable);
            for (index, branch) in inputs.iter().enumerate() {
                if !is_base(branch) {
                    branches[index] = Some(lowering.child(index, branch)?);
                }
            }
            let union = lowering.add(OperatorKind::Union {
                inputs: branches.into_iter().flatten().collect(),
            })?;
            let result = lowering.add(OperatorKind::Distinct {
                input: union,
                gc: None,
            })?;
            let result_type = lowering.typ(result)?;
            let imports = lowering.into_imports();
            if result_type == typ {
                let fixpoint = FixpointOperator {
                    imports,
                    body,
                    variable,
                    result,
                    max_iterations: self.config.max_iterations,
                };
                return self
                    .circuit
                    .add(OperatorKind::Fixpoint(Box::new(fixpoint)))
                    .map_err(|e| LowerError::from_circuit(location(), e));
            }
            if widened.is_some() {
                return Err(LowerError::Type {
                    location: location(),
                    source: TypeError::mismatch(&typ, &result_type),
                });
            }
            widened = Some(result_type);
        }
    }
}

/// The fixpoint body being built while lowering a recursive view.
#[derive(Debug)]
struct Body<'a> {
    /// The circuit containing the fixpoint.
    outer: &'a Circuit,
    variable: Option<OperatorId>,
    /// The operators of `outer` read by the body, by import index.
    imports: Vec<OperatorId>,
    /// The `Import` operator reading each operator of `outer`.
    imported: BTreeMap<OperatorId, OperatorId>,
}

impl<'a> Body<'a> {
    fn new(outer: &'a Circuit) -> Body<'a> {
        Body {
            outer,
            variable: None,
            imports: vec![],
            imported: BTreeMap::new(),
        }
    }
}

/// Lowers the plan of one view into a circuit.
#[derive(Debug)]
struct Lowering<'a> {
    circuit: &'a mut Circuit,
    relations: &'a BTreeMap<String, Relation>,
    attached: &'a mut BTreeSet<usize>,
    location: PlanLocation,
    body: Option<Body<'a>>,
    recursion_guard: RecursionGuard,
}

impl CheckedRecursion for Lowering<'_> {
    fn recursion_guard(&self) -> &RecursionGuard {
        &self.recursion_guard
    }
}

impl<'a> Lowering<'a> {
    fn new(
        circuit: &'a mut Circuit,
        relations: &'a BTreeMap<String, Relation>,
        attached: &'a mut BTreeSet<usize>,
        view: &str,
        body: Option<Body<'a>>,
    ) -> Lowering<'a> {
        Lowering {
            circuit,
            relations,
            attached,
            location: PlanLocation::new(view),
            body,
            recursion_guard: RecursionGuard::with_limit(zf_expr::RECURSION_LIMIT),
        }
    }

    fn set_variable(&mut self, variable: OperatorId) {
        if let Some(body) = &mut self.body {
            body.variable = Some(variable);
        }
    }

    fn into_imports(self) -> Vec<OperatorId> {
        self.body.map(|body| body.imports).unwrap_or_default()
    }

    fn type_error(&self, source: TypeError) -> LowerError {
        LowerError::Type {
            location: self.location.clone(),
            source,
        }
    }

    fn unsupported(&self, construct: &str) -> LowerError {
        LowerError::Unsupported {
            location: self.location.clone(),
            construct: construct.to_string(),
        }
    }

    fn add(&mut self, kind: OperatorKind) -> Result<OperatorId, LowerError> {
        let name = kind.name();
        let id = self
            .circuit
            .add(kind)
            .map_err(|e| LowerError::from_circuit(self.location.clone(), e))?;
        tracing::trace!(location = %self.location, operator = %id, kind = name, "emitted operator");
        Ok(id)
    }

    fn typ(&self, id: OperatorId) -> Result<RelationType, LowerError> {
        self.circuit
            .typ(id)
            .cloned()
            .map_err(|e| LowerError::from_circuit(self.location.clone(), e))
    }

    /// Records that `closure` is attached to an operator, deep copying it if
    /// any of its nodes already is.
    fn attach(&mut self, closure: Closure) -> Result<Closure, LowerError> {
        let mut nodes = vec![];
        closure.body.visit_pre(&mut |e: &ScalarExpr| nodes.push(e.id()))?;
        let closure = if nodes.iter().any(|node| self.attached.contains(node)) {
            let copy = closure.deep_copy()?;
            nodes.clear();
            copy.body.visit_pre(&mut |e: &ScalarExpr| nodes.push(e.id()))?;
            copy
        } else {
            closure
        };
        self.attached.extend(nodes);
        Ok(closure)
    }

    /// A closure over the tuples of `input`, with a body computed from the
    /// tuple variable.
    fn closure<F>(&self, input: OperatorId, name: &str, body: F) -> Result<Closure, LowerError>
    where
        F: FnOnce(&ScalarExpr) -> Result<ScalarExpr, TypeError>,
    {
        let param = Param::new(name, self.typ(input)?.record_type());
        let body = body(&param.var()).map_err(|e| self.type_error(e))?;
        Ok(Closure::new(vec![param], body))
    }

    /// Lowers the `index`-th child of the current node.
    fn child(&mut self, index: usize, plan: &PlanExpr) -> Result<OperatorId, LowerError> {
        self.location.path.push(index);
        let result = self.checked_recur_mut(|lowering| lowering.lower(plan));
        self.location.path.pop();
        result
    }

    fn lower(&mut self, plan: &PlanExpr) -> Result<OperatorId, LowerError> {
        match plan {
            PlanExpr::Get { name } => {
                let id = match self.relations.get(name) {
                    Some(relation) => relation.id,
                    None => {
                        return Err(LowerError::UnknownRelation {
                            location: self.location.clone(),
                            name: name.clone(),
                        })
                    }
                };
                self.import(id)
            }
            PlanExpr::RecursiveRef { name } => match &self.body {
                Some(Body {
                    variable: Some(variable),
                    ..
                }) if *name == self.location.view => Ok(*variable),
                _ => Err(LowerError::IllFoundedRecursion {
                    location: self.location.clone(),
                    reason: format!("{} is not a recursive view in scope", name),
                }),
            },
            PlanExpr::Values { rows, typ } => {
                for row in rows {
                    let fits = row.len() == typ.arity()
                        && row
                            .iter()
                            .zip(&typ.column_types)
                            .all(|(datum, t)| datum.is_instance_of(t));
                    if !fits {
                        return Err(self.type_error(TypeError::InvalidLiteral {
                            datum: Row::new(row.clone()).to_string(),
                            typ: typ.to_string(),
                        }));
                    }
                }
                let rows = ZSet::from_rows(rows.iter().map(|row| Row::new(row.clone())));
                self.add(OperatorKind::Constant {
                    rows,
                    typ: typ.clone(),
                })
            }
            PlanExpr::Filter { input, predicate } => {
                let input = self.child(0, input)?;
                let predicate = self.closure(input, "t", |t| predicate.lower(t))?;
                let predicate = self.attach(predicate)?;
                self.add(OperatorKind::Filter { input, predicate })
            }
            PlanExpr::Project { input, outputs } => {
                let input = self.child(0, input)?;
                let func = self.closure(input, "t", |t| {
                    let fields = outputs
                        .iter()
                        .map(|output| output.lower(t))
                        .collect::<Result<_, _>>()?;
                    Ok(ScalarExpr::tuple(fields))
                })?;
                let func = self.attach(func)?;
                self.add(OperatorKind::Map { input, func })
            }
            PlanExpr::Join {
                left,
                right,
                kind,
                on,
            } => {
                let construct = match kind {
                    JoinKind::Inner => None,
                    JoinKind::LeftOuter => Some("LEFT JOIN"),
                    JoinKind::RightOuter => Some("RIGHT JOIN"),
                    JoinKind::FullOuter => Some("FULL JOIN"),
                };
                if let Some(construct) = construct {
                    return Err(self.unsupported(construct));
                }
                let left = self.child(0, left)?;
                let right = self.child(1, right)?;
                self.lower_join(left, right, on)
            }
            PlanExpr::Aggregate {
                input,
                group_key,
                aggregates,
            } => {
                let input = self.child(0, input)?;
                let param = Param::new("t", self.typ(input)?.record_type());
                let t = param.var();
                let fields = group_key
                    .iter()
                    .map(|column| t.field(*column))
                    .collect::<Result<_, _>>()
                    .map_err(|e| self.type_error(e))?;
                let key = Closure::new(vec![param.clone()], ScalarExpr::tuple(fields));
                let key = self.attach(key)?;
                let mut lowered = vec![];
                for aggregate in aggregates {
                    let body = match (&aggregate.expr, aggregate.func) {
                        (Some(expr), _) => expr.lower(&t).map_err(|e| self.type_error(e))?,
                        (None, AggregateFunc::Count) => ScalarExpr::literal_true(),
                        (None, func) => return Err(self.unsupported(&format!("{}(*)", func))),
                    };
                    let expr = self.attach(Closure::new(vec![param.clone()], body))?;
                    let aggregate = AggregateExpr::new(aggregate.func, expr, aggregate.distinct)
                        .map_err(|e| self.type_error(e))?;
                    lowered.push(aggregate);
                }
                let gc = self.key_gc(input, &key);
                self.add(OperatorKind::Aggregate {
                    input,
                    key,
                    aggregates: lowered,
                    gc,
                })
            }
            PlanExpr::Distinct { input } => {
                let input = self.child(0, input)?;
                self.distinct(input)
            }
            PlanExpr::Union { inputs, all } => {
                let mut ids = vec![];
                for (index, input) in inputs.iter().enumerate() {
                    ids.push(self.child(index, input)?);
                }
                let union = self.add(OperatorKind::Union { inputs: ids })?;
                if *all {
                    Ok(union)
                } else {
                    self.distinct(union)
                }
            }
            PlanExpr::Except { .. } => Err(self.unsupported("EXCEPT")),
            PlanExpr::TopK { .. } => Err(self.unsupported("TopK")),
        }
    }

    /// Reads an operator of the circuit containing the fixpoint, if lowering
    /// a fixpoint body.
    fn import(&mut self, id: OperatorId) -> Result<OperatorId, LowerError> {
        let (index, typ) = match &self.body {
            None => return Ok(id),
            Some(body) => {
                if let Some(imported) = body.imported.get(&id) {
                    return Ok(*imported);
                }
                let typ = body
                    .outer
                    .typ(id)
                    .map_err(|e| LowerError::from_circuit(self.location.clone(), e))?;
                (body.imports.len(), typ.clone())
            }
        };
        let imported = self.add(OperatorKind::Import { index, typ })?;
        if let Some(body) = &mut self.body {
            body.imports.push(id);
            body.imported.insert(id, imported);
        }
        Ok(imported)
    }

    fn distinct(&mut self, input: OperatorId) -> Result<OperatorId, LowerError> {
        let arity = self.typ(input)?.arity();
        let gc = (0..arity).find_map(|column| {
            self.watermark_of(input, column)
                .map(|watermark| StateGc { watermark, column })
        });
        self.add(OperatorKind::Distinct { input, gc })
    }

    fn lower_join(
        &mut self,
        left: OperatorId,
        right: OperatorId,
        on: &PlanScalar,
    ) -> Result<OperatorId, LowerError> {
        let (left_type, right_type) = (self.typ(left)?, self.typ(right)?);
        let left_arity = left_type.arity();
        let mut keys = vec![];
        let mut residual = vec![];
        for conjunct in on.conjuncts() {
            match equated_columns(conjunct, &left_type, &right_type) {
                Some(key) => keys.push(key),
                None if matches!(conjunct, PlanScalar::Literal { value: Datum::True, .. }) => {}
                None => residual.push(conjunct),
            }
        }

        let l = Param::new("l", left_type.record_type());
        let r = Param::new("r", right_type.record_type());
        let field = |param: &Param, column: usize| param.var().field(column);
        let left_fields = keys
            .iter()
            .map(|(column, _)| field(&l, *column))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.type_error(e))?;
        let right_fields = keys
            .iter()
            .map(|(_, column)| field(&r, *column))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.type_error(e))?;

        // SQL equality never matches NULL, so tuples with NULL keys are
        // dropped before they reach the join's state.
        let left = self.not_null(left, &l, &left_fields)?;
        let right = self.not_null(right, &r, &right_fields)?;

        let left_key = self.attach(Closure::new(vec![l.clone()], ScalarExpr::tuple(left_fields)))?;
        let right_key =
            self.attach(Closure::new(vec![r.clone()], ScalarExpr::tuple(right_fields)))?;
        let k = Param::new("k", left_key.output_type().clone());
        let outputs = (0..left_arity)
            .map(|column| field(&l, column))
            .chain((0..right_type.arity()).map(|column| field(&r, column)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.type_error(e))?;
        let output = self.attach(Closure::new(vec![k, l, r], ScalarExpr::tuple(outputs)))?;
        let gc = self.join_gc(left, right, &left_key, &right_key);
        let join = self.add(OperatorKind::Join {
            left,
            right,
            left_key,
            right_key,
            output,
            gc,
        })?;

        let Some((first, rest)) = residual.split_first() else {
            return Ok(join);
        };
        let predicate = self.closure(join, "t", |t| {
            let mut predicate = first.lower(t)?;
            for conjunct in rest {
                predicate = predicate.and(&conjunct.lower(t)?)?;
            }
            Ok(predicate)
        })?;
        let predicate = self.attach(predicate)?;
        self.add(OperatorKind::Filter {
            input: join,
            predicate,
        })
    }

    /// Filters out the tuples of `input` for which one of the nullable
    /// `fields` of `param` is NULL.
    fn not_null(
        &mut self,
        input: OperatorId,
        param: &Param,
        fields: &[ScalarExpr],
    ) -> Result<OperatorId, LowerError> {
        let mut predicate: Option<ScalarExpr> = None;
        for field in fields.iter().filter(|f| f.typ().nullable) {
            let test = field.is_not_null();
            predicate = Some(match predicate {
                None => test,
                Some(p) => p.and(&test).map_err(|e| self.type_error(e))?,
            });
        }
        let Some(predicate) = predicate else {
            return Ok(input);
        };
        let predicate = self.attach(Closure::new(vec![param.clone()], predicate))?;
        self.add(OperatorKind::Filter { input, predicate })
    }

    /// The watermark operator tracking column `column` of `id`, if the
    /// column is passed unchanged from a watermarked relation.
    ///
    /// State GC only applies to the outermost circuit.
    fn watermark_of(&self, mut id: OperatorId, mut column: usize) -> Option<OperatorId> {
        if self.body.is_some() {
            return None;
        }
        loop {
            let op = self.circuit.get(id)?;
            match &op.kind {
                OperatorKind::Watermark {
                    input, column: c, ..
                } => {
                    if *c == column {
                        return Some(id);
                    }
                    id = *input;
                }
                OperatorKind::Filter { input, .. } | OperatorKind::Distinct { input, .. } => {
                    id = *input;
                }
                OperatorKind::Map { input, func } | OperatorKind::FilterMap { input, func, .. } => {
                    let (_, c) = passthrough(func, column)?;
                    (id, column) = (*input, c);
                }
                OperatorKind::Aggregate { input, key, .. } => {
                    let (_, c) = passthrough(key, column)?;
                    (id, column) = (*input, c);
                }
                // A late row on one side of a join still matches rows of the
                // other side that arrived in time, so joins emit rows below
                // either input's watermark.
                _ => return None,
            }
        }
    }

    /// A GC policy on the first key field carrying a watermarked column.
    fn key_gc(&self, input: OperatorId, key: &Closure) -> Option<StateGc> {
        let arity = key_arity(key);
        (0..arity).find_map(|field| {
            let (_, column) = passthrough(key, field)?;
            let watermark = self.watermark_of(input, column)?;
            Some(StateGc {
                watermark,
                column: field,
            })
        })
    }

    /// A GC policy on the first key field carrying watermarked columns on
    /// both sides of a join.
    ///
    /// Each side's entries are purged by the other side's watermark, since
    /// only the other side's future rows can still match them.
    fn join_gc(
        &self,
        left: OperatorId,
        right: OperatorId,
        left_key: &Closure,
        right_key: &Closure,
    ) -> Option<JoinGc> {
        (0..key_arity(left_key)).find_map(|field| {
            Some(JoinGc {
                left: self.watermark_of(left, passthrough(left_key, field)?.1)?,
                right: self.watermark_of(right, passthrough(right_key, field)?.1)?,
                column: field,
            })
        })
    }
}

/// The columns a conjunct of a join predicate equates, as a pair of a left
/// and a right column, if it equates a column of each side with the same
/// base type.
fn equated_columns(
    conjunct: &PlanScalar,
    left: &RelationType,
    right: &RelationType,
) -> Option<(usize, usize)> {
    let PlanScalar::Binary {
        func: BinaryFunc::Eq,
        left: a,
        right: b,
    } = conjunct
    else {
        return None;
    };
    let (PlanScalar::Column(a), PlanScalar::Column(b)) = (&**a, &**b) else {
        return None;
    };
    let arity = left.arity();
    let (l, r) = match (*a < arity, *b < arity) {
        (true, false) => (*a, *b - arity),
        (false, true) => (*b, *a - arity),
        _ => return None,
    };
    let (lt, rt) = (left.column_types.get(l)?, right.column_types.get(r)?);
    lt.same_base(rt).then_some((l, r))
}

/// If field `field` of the tuple `closure` computes is a field of one of
/// its parameters, the index of that parameter and of its field.
fn passthrough(closure: &Closure, field: usize) -> Option<(usize, usize)> {
    let ExprKind::Tuple(fields) = closure.body.kind() else {
        return None;
    };
    let ExprKind::Field { expr, index } = fields.get(field)?.kind() else {
        return None;
    };
    let name = expr.as_var()?;
    let param = closure.params.iter().rposition(|p| p.name == name)?;
    Some((param, *index))
}

fn key_arity(key: &Closure) -> usize {
    key.output_type()
        .scalar_type
        .record_fields()
        .map_or(0, |fields| fields.len())
}
