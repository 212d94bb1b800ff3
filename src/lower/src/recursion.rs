// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The structural check that recursive views reach a fixpoint.
//!
//! A recursive view is accepted if
//!
//!   * its plan is a `UNION` (without `ALL`) with at least one branch that
//!     does not refer to the view, the base case;
//!   * every reference to the view sits below monotone operators only
//!     (filters, projections, inner joins, distinct and unions), so that
//!     each iteration can only add rows;
//!   * the branches that refer to the view only project columns and
//!     literals, so that every row it can ever contain is built from values
//!     of its inputs. This last condition is waived by
//!     [`RecursionConfig::allow_computed_recursion`].
//!
//! Under these conditions the view grows monotonically within a finite
//! domain and the iteration stops. Views referring to other recursive views
//! (mutual recursion) are rejected.

use zf_ore::stack::{CheckedRecursion, RecursionGuard};

use crate::plan::{JoinKind, PlanExpr, View};
use crate::{LowerError, PlanLocation, RecursionConfig};

/// Checks that `view`, a view marked recursive, reaches its fixpoint.
pub fn check(view: &View, config: &RecursionConfig) -> Result<(), LowerError> {
    let location = PlanLocation::new(&view.name);
    let error = |location: PlanLocation, reason: &str| LowerError::IllFoundedRecursion {
        location,
        reason: reason.to_string(),
    };
    let branches = match &view.plan {
        PlanExpr::Union { inputs, all: false } => inputs,
        PlanExpr::Union { all: true, .. } => {
            return Err(error(location, "UNION ALL does not reach a fixpoint"))
        }
        _ => return Err(error(location, "the plan must be a UNION of a base case and recursive steps")),
    };
    if branches.iter().all(|b| b.references(&view.name)) {
        return Err(error(location, "no branch is a base case"));
    }
    let mut checker = Checker {
        name: &view.name,
        location,
        allow_computed: config.allow_computed_recursion,
        recursion_guard: RecursionGuard::with_limit(zf_expr::RECURSION_LIMIT),
    };
    for (index, branch) in branches.iter().enumerate() {
        checker.location.path.push(index);
        checker.check(branch)?;
        checker.location.path.pop();
    }
    Ok(())
}

#[derive(Debug)]
struct Checker<'a> {
    name: &'a str,
    location: PlanLocation,
    allow_computed: bool,
    recursion_guard: RecursionGuard,
}

impl CheckedRecursion for Checker<'_> {
    fn recursion_guard(&self) -> &RecursionGuard {
        &self.recursion_guard
    }
}

impl Checker<'_> {
    fn fail(&self, reason: impl Into<String>) -> LowerError {
        LowerError::IllFoundedRecursion {
            location: self.location.clone(),
            reason: reason.into(),
        }
    }

    fn check(&mut self, plan: &PlanExpr) -> Result<(), LowerError> {
        if let PlanExpr::RecursiveRef { name } = plan {
            if name != self.name {
                return Err(self.fail(format!(
                    "reference to {} within {}: mutual recursion is not supported",
                    name, self.name
                )));
            }
        }
        if plan.references(self.name) {
            self.check_monotone(plan)?;
        }
        for (index, child) in plan.children().into_iter().enumerate() {
            self.location.path.push(index);
            let result = self.checked_recur_mut(|checker| checker.check(child));
            self.location.path.pop();
            result?;
        }
        Ok(())
    }

    /// Checks a node above a reference to the view.
    fn check_monotone(&self, plan: &PlanExpr) -> Result<(), LowerError> {
        match plan {
            PlanExpr::Aggregate { .. } => return Err(self.fail("recursion through an aggregate")),
            PlanExpr::Except { .. } => return Err(self.fail("recursion through EXCEPT")),
            PlanExpr::TopK { .. } => return Err(self.fail("recursion through TopK")),
            PlanExpr::Join { kind, .. } if *kind != JoinKind::Inner => {
                return Err(self.fail("recursion through an outer join"))
            }
            PlanExpr::Project { outputs, .. } if !self.allow_computed => {
                if !outputs.iter().all(|o| o.is_column_or_literal()) {
                    return Err(self.fail(
                        "a recursive step computes new values; \
                         set allow_computed_recursion to accept it",
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use zf_expr::{AggregateFunc, BinaryFunc};
    use zf_repr::Datum;

    use super::*;
    use crate::plan::{PlanAggregate, PlanScalar};

    fn paths() -> PlanExpr {
        PlanExpr::RecursiveRef {
            name: "paths".into(),
        }
    }

    /// `paths(a, c) :- edges(a, c) ; paths(a, b), edges(b, c)`
    fn step() -> PlanExpr {
        paths()
            .join(
                PlanExpr::get("edges"),
                PlanScalar::Column(1).equals(PlanScalar::Column(2)),
            )
            .columns(&[0, 3])
    }

    fn view(branches: Vec<PlanExpr>) -> View {
        View {
            name: "paths".into(),
            columns: vec!["a".into(), "c".into()],
            plan: PlanExpr::Union {
                inputs: branches,
                all: false,
            },
            recursive: true,
        }
    }

    fn reason(view: &View, config: &RecursionConfig) -> Option<(Vec<usize>, String)> {
        match check(view, config) {
            Ok(()) => None,
            Err(LowerError::IllFoundedRecursion { location, reason }) => {
                Some((location.path, reason))
            }
            Err(e) => panic!("unexpected error {e}"),
        }
    }

    #[zf_ore::test]
    fn transitive_closure_is_accepted() {
        let view = view(vec![PlanExpr::get("edges"), step()]);
        assert_eq!(reason(&view, &RecursionConfig::default()), None);
    }

    #[zf_ore::test]
    fn base_case_is_required() {
        let view = view(vec![step()]);
        let (path, reason) = reason(&view, &RecursionConfig::default()).unwrap();
        assert!(path.is_empty());
        assert_eq!(reason, "no branch is a base case");
    }

    #[zf_ore::test]
    fn non_monotone_steps_are_rejected() {
        let counted = PlanExpr::Aggregate {
            input: Box::new(paths()),
            group_key: vec![0],
            aggregates: vec![PlanAggregate {
                func: AggregateFunc::Count,
                expr: None,
                distinct: false,
            }],
        };
        let view = view(vec![PlanExpr::get("edges"), counted]);
        let (path, reason) = reason(&view, &RecursionConfig::default()).unwrap();
        assert_eq!(path, vec![1]);
        assert_eq!(reason, "recursion through an aggregate");
    }

    #[zf_ore::test]
    fn computed_steps_need_opting_in() {
        let computed = paths().project(vec![
            PlanScalar::Column(0),
            PlanScalar::Column(1).binary(BinaryFunc::Add, PlanScalar::literal(Datum::Int32(1))),
        ]);
        let view = view(vec![PlanExpr::get("edges"), computed]);
        assert!(reason(&view, &RecursionConfig::default()).is_some());
        let config = RecursionConfig {
            allow_computed_recursion: true,
            ..Default::default()
        };
        assert_eq!(reason(&view, &config), None);
    }

    #[zf_ore::test]
    fn mutual_recursion_is_rejected() {
        let other = PlanExpr::RecursiveRef {
            name: "other".into(),
        };
        let view = view(vec![PlanExpr::get("edges"), step(), other]);
        let (path, reason) = reason(&view, &RecursionConfig::default()).unwrap();
        assert_eq!(path, vec![2]);
        assert!(reason.contains("mutual recursion"));
    }
}
