// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Lowering of plan scalars to typed expressions.

use zf_expr::{BuiltinFunc, ScalarExpr};
use zf_ore::stack::maybe_grow;
use zf_repr::TypeError;

use crate::plan::PlanScalar;

impl PlanScalar {
    /// Builds the expression computing this scalar, reading column `i` as
    /// field `i` of the record-typed `tuple`.
    pub fn lower(&self, tuple: &ScalarExpr) -> Result<ScalarExpr, TypeError> {
        maybe_grow(|| match self {
            PlanScalar::Column(index) => tuple.field(*index),
            PlanScalar::Literal { value, typ } => ScalarExpr::literal(value.clone(), typ.clone()),
            PlanScalar::Unary { func, expr } => expr.lower(tuple)?.call_unary(*func),
            PlanScalar::Binary { func, left, right } => {
                let left = left.lower(tuple)?;
                left.call_binary(&right.lower(tuple)?, *func)
            }
            PlanScalar::Call { func, args } => {
                let func = BuiltinFunc::from_name(func)?;
                let args = args
                    .iter()
                    .map(|arg| arg.lower(tuple))
                    .collect::<Result<_, _>>()?;
                ScalarExpr::apply(func, args)
            }
            PlanScalar::If { cond, then, els } => {
                ScalarExpr::if_then_else(cond.lower(tuple)?, then.lower(tuple)?, els.lower(tuple)?)
            }
            PlanScalar::Cast { expr, to } => expr.lower(tuple)?.cast(to.clone()),
        })
    }
}
