// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Logical plans, as supplied by a relational frontend.
//!
//! Plans arrive resolved and typed: relations are named, columns are
//! referenced by position, and literals carry their types. Programs are
//! exchanged as JSON.

use serde::{Deserialize, Serialize};
use zf_expr::{AggregateFunc, BinaryFunc, UnaryFunc};
use zf_ore::stack::maybe_grow;
use zf_repr::{ColumnType, Datum, RelationType, ScalarType};

/// A compilation unit: the tables it reads and the views it maintains.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub tables: Vec<Table>,
    /// Views, in dependency order: a view may only read tables and views
    /// declared before it.
    #[serde(default)]
    pub views: Vec<View>,
    #[serde(default)]
    pub lateness: Vec<Lateness>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn typ(&self) -> RelationType {
        RelationType::new(self.columns.iter().map(|c| c.typ.clone()).collect())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub typ: ColumnType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub name: String,
    pub columns: Vec<String>,
    pub plan: PlanExpr,
    /// Whether `plan` may refer to the view itself through
    /// [`PlanExpr::RecursiveRef`].
    #[serde(default)]
    pub recursive: bool,
}

/// Declares that rows of `relation` arrive at most `value` behind the
/// largest value of `column` seen so far.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lateness {
    pub relation: String,
    pub column: String,
    pub value: Datum,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

/// A relational plan node.
///
/// Column references in scalars index the columns of the node's input; for
/// joins, the columns of the left input followed by those of the right.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanExpr {
    /// A table, or a view declared earlier.
    Get { name: String },
    /// The recursive view being defined, as computed so far.
    RecursiveRef { name: String },
    /// A literal collection. Repeated rows are repeated.
    Values {
        rows: Vec<Vec<Datum>>,
        typ: RelationType,
    },
    Filter {
        input: Box<PlanExpr>,
        predicate: PlanScalar,
    },
    /// Computes one output column per scalar.
    Project {
        input: Box<PlanExpr>,
        outputs: Vec<PlanScalar>,
    },
    Join {
        left: Box<PlanExpr>,
        right: Box<PlanExpr>,
        kind: JoinKind,
        on: PlanScalar,
    },
    /// Produces the `group_key` columns followed by one column per
    /// aggregate.
    Aggregate {
        input: Box<PlanExpr>,
        group_key: Vec<usize>,
        aggregates: Vec<PlanAggregate>,
    },
    Distinct { input: Box<PlanExpr> },
    /// `UNION ALL` if `all`, `UNION` otherwise.
    Union { inputs: Vec<PlanExpr>, all: bool },
    Except {
        left: Box<PlanExpr>,
        right: Box<PlanExpr>,
        all: bool,
    },
    TopK {
        input: Box<PlanExpr>,
        order_by: Vec<usize>,
        limit: usize,
    },
}

impl PlanExpr {
    /// The inputs of the node, in order.
    pub fn children(&self) -> Vec<&PlanExpr> {
        use PlanExpr::*;
        match self {
            Get { .. } | RecursiveRef { .. } | Values { .. } => vec![],
            Filter { input, .. }
            | Project { input, .. }
            | Aggregate { input, .. }
            | Distinct { input }
            | TopK { input, .. } => vec![input],
            Join { left, right, .. } | Except { left, right, .. } => vec![left, right],
            Union { inputs, .. } => inputs.iter().collect(),
        }
    }

    /// Whether the plan refers to the recursive view `name`.
    pub fn references(&self, name: &str) -> bool {
        maybe_grow(|| match self {
            PlanExpr::RecursiveRef { name: n } => n == name,
            _ => self.children().into_iter().any(|c| c.references(name)),
        })
    }

    /// Shorthand for a [`PlanExpr::Get`].
    pub fn get(name: impl Into<String>) -> PlanExpr {
        PlanExpr::Get { name: name.into() }
    }

    pub fn filter(self, predicate: PlanScalar) -> PlanExpr {
        PlanExpr::Filter {
            input: Box::new(self),
            predicate,
        }
    }

    pub fn project(self, outputs: Vec<PlanScalar>) -> PlanExpr {
        PlanExpr::Project {
            input: Box::new(self),
            outputs,
        }
    }

    /// Projects the given columns.
    pub fn columns(self, columns: &[usize]) -> PlanExpr {
        self.project(columns.iter().map(|c| PlanScalar::Column(*c)).collect())
    }

    pub fn join(self, right: PlanExpr, on: PlanScalar) -> PlanExpr {
        PlanExpr::Join {
            left: Box::new(self),
            right: Box::new(right),
            kind: JoinKind::Inner,
            on,
        }
    }

    pub fn distinct(self) -> PlanExpr {
        PlanExpr::Distinct {
            input: Box::new(self),
        }
    }
}

/// An aggregate over the rows of a group. `COUNT(*)` has no `expr`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanAggregate {
    pub func: AggregateFunc,
    #[serde(default)]
    pub expr: Option<PlanScalar>,
    #[serde(default)]
    pub distinct: bool,
}

/// A scalar expression over the columns of a plan node's input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanScalar {
    Column(usize),
    Literal {
        value: Datum,
        typ: ColumnType,
    },
    Unary {
        func: UnaryFunc,
        expr: Box<PlanScalar>,
    },
    Binary {
        func: BinaryFunc,
        left: Box<PlanScalar>,
        right: Box<PlanScalar>,
    },
    /// A call of a built-in function, by name.
    Call {
        func: String,
        args: Vec<PlanScalar>,
    },
    If {
        cond: Box<PlanScalar>,
        then: Box<PlanScalar>,
        els: Box<PlanScalar>,
    },
    Cast {
        expr: Box<PlanScalar>,
        to: ScalarType,
    },
}

impl PlanScalar {
    /// A non-null literal of the type of `value`.
    ///
    /// `value` must not be null.
    pub fn literal(value: Datum) -> PlanScalar {
        let scalar_type = value.scalar_type().unwrap_or(ScalarType::Bool);
        PlanScalar::Literal {
            value,
            typ: scalar_type.nullable(false),
        }
    }

    pub fn binary(self, func: BinaryFunc, other: PlanScalar) -> PlanScalar {
        PlanScalar::Binary {
            func,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn equals(self, other: PlanScalar) -> PlanScalar {
        self.binary(BinaryFunc::Eq, other)
    }

    pub fn and(self, other: PlanScalar) -> PlanScalar {
        self.binary(BinaryFunc::And, other)
    }

    /// The operands of the topmost chain of `AND`s.
    pub fn conjuncts(&self) -> Vec<&PlanScalar> {
        match self {
            PlanScalar::Binary {
                func: BinaryFunc::And,
                left,
                right,
            } => {
                let mut conjuncts = left.conjuncts();
                conjuncts.extend(right.conjuncts());
                conjuncts
            }
            _ => vec![self],
        }
    }

    /// Whether the scalar is a column reference or a literal.
    pub fn is_column_or_literal(&self) -> bool {
        matches!(self, PlanScalar::Column(_) | PlanScalar::Literal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[zf_ore::test]
    fn deserializes_programs() {
        let json = r#"{
            "tables": [{
                "name": "t",
                "columns": [
                    {"name": "a", "typ": {"scalar_type": "int32"}},
                    {"name": "b", "typ": {"scalar_type": "string", "nullable": true}}
                ]
            }],
            "views": [{
                "name": "v",
                "columns": ["a"],
                "plan": {"project": {
                    "input": {"filter": {
                        "input": {"get": {"name": "t"}},
                        "predicate": {"binary": {
                            "func": "gt",
                            "left": {"column": 0},
                            "right": {"literal": {"value": {"Int32": 1}, "typ": {"scalar_type": "int32"}}}
                        }}
                    }},
                    "outputs": [{"column": 0}]
                }}
            }]
        }"#;
        let program: Program = serde_json::from_str(json).unwrap();
        assert_eq!(
            program.tables[0].typ(),
            RelationType::new(vec![
                ScalarType::Int32.nullable(false),
                ScalarType::String.nullable(true)
            ])
        );
        let expected = PlanExpr::get("t")
            .filter(PlanScalar::Column(0).binary(BinaryFunc::Gt, PlanScalar::literal(Datum::Int32(1))))
            .columns(&[0]);
        assert_eq!(program.views[0].plan, expected);
        assert!(!program.views[0].recursive);
        assert!(program.lateness.is_empty());
    }

    #[zf_ore::test]
    fn conjuncts_flatten_nested_ands() {
        let a = PlanScalar::Column(0);
        let b = PlanScalar::Column(1);
        let c = PlanScalar::Column(2);
        let pred = a.clone().and(b.clone().and(c.clone()));
        assert_eq!(pred.conjuncts(), vec![&a, &b, &c]);
        assert_eq!(a.conjuncts(), vec![&a]);
    }

    #[zf_ore::test]
    fn references_find_recursive_refs() {
        let plan = PlanExpr::Union {
            inputs: vec![
                PlanExpr::get("edges"),
                PlanExpr::RecursiveRef { name: "paths".into() }.columns(&[0, 1]),
            ],
            all: false,
        };
        assert!(plan.references("paths"));
        assert!(!plan.references("edges"));
        assert!(!plan.children()[0].references("paths"));
    }
}
