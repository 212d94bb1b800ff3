// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Text rendering of circuits.
//!
//! Each operator is rendered on its own line as `%id = Kind args :: type`.
//! The body of a fixpoint follows the fixpoint's line, indented by two
//! spaces.

use std::fmt;

use itertools::Itertools;

use crate::{Circuit, OperatorKind, StateGc};

/// Renders a circuit as text.
#[derive(Debug)]
pub struct Explain<'a> {
    circuit: &'a Circuit,
    types: bool,
}

impl<'a> Explain<'a> {
    pub fn new(circuit: &'a Circuit) -> Explain<'a> {
        Explain {
            circuit,
            types: true,
        }
    }

    /// Whether to append the output type to each line.
    pub fn with_types(mut self, types: bool) -> Self {
        self.types = types;
        self
    }

    fn fmt_circuit(&self, f: &mut fmt::Formatter, circuit: &Circuit, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        for (id, op) in circuit.iter() {
            write!(f, "{}{} = {}", indent, id, op.kind.name())?;
            fmt_args(f, &op.kind)?;
            if self.types {
                write!(f, " :: {}", op.typ)?;
            }
            writeln!(f)?;
            if let OperatorKind::Fixpoint(fixpoint) = &op.kind {
                self.fmt_circuit(f, &fixpoint.body, depth + 1)?;
            }
        }
        Ok(())
    }
}

fn fmt_gc(f: &mut fmt::Formatter, gc: &Option<StateGc>) -> fmt::Result {
    match gc {
        Some(gc) => write!(f, " gc=({}, #{})", gc.watermark, gc.column),
        None => Ok(()),
    }
}

fn fmt_args(f: &mut fmt::Formatter, kind: &OperatorKind) -> fmt::Result {
    use OperatorKind::*;
    match kind {
        Source { name, .. } => write!(f, " {}", name),
        Constant { rows, .. } => write!(f, " {}", rows),
        Map { input, func } => write!(f, " {} {}", input, func),
        Filter { input, predicate } => write!(f, " {} {}", input, predicate),
        FilterMap {
            input,
            predicate,
            func,
        } => write!(f, " {} {} {}", input, predicate, func),
        Join {
            left,
            right,
            left_key,
            right_key,
            output,
            gc,
        } => {
            write!(
                f,
                " {} {} on {} = {} {}",
                left, right, left_key, right_key, output
            )?;
            match gc {
                Some(gc) => write!(f, " gc=({}, {}, #{})", gc.left, gc.right, gc.column),
                None => Ok(()),
            }
        }
        Aggregate {
            input,
            key,
            aggregates,
            gc,
        } => {
            write!(f, " {} by {} [{}]", input, key, aggregates.iter().join(", "))?;
            fmt_gc(f, gc)
        }
        Distinct { input, gc } => {
            write!(f, " {}", input)?;
            fmt_gc(f, gc)
        }
        Union { inputs } => write!(f, " {}", inputs.iter().join(" ")),
        Negate { input } => write!(f, " {}", input),
        Watermark {
            input,
            column,
            lateness,
        } => write!(f, " {} #{} - {}", input, column, lateness),
        Fixpoint(fixpoint) => write!(
            f,
            " [{}] variable={} result={} max_iterations={}",
            fixpoint.imports.iter().join(", "),
            fixpoint.variable,
            fixpoint.result,
            fixpoint.max_iterations
        ),
        Import { index, .. } => write!(f, " {}", index),
        IterationVariable { .. } => Ok(()),
        Sink { input, name } => write!(f, " {} {}", input, name),
    }
}

impl fmt::Display for Explain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.fmt_circuit(f, self.circuit, 0)
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", Explain::new(self))
    }
}

#[cfg(test)]
mod tests {
    use zf_expr::{BinaryFunc, Closure, ScalarExpr};
    use zf_repr::{Datum, RelationType, ScalarType};

    use super::*;
    use crate::FixpointOperator;

    #[zf_ore::test]
    fn renders_operators() {
        let typ = RelationType::new(vec![
            ScalarType::Int32.nullable(false),
            ScalarType::Int32.nullable(true),
        ]);
        let mut circuit = Circuit::new();
        let source = circuit
            .add(OperatorKind::Source {
                name: "t".into(),
                typ: typ.clone(),
            })
            .unwrap();
        let t = ScalarExpr::var("t", typ.record_type());
        let one = ScalarExpr::literal_ok(Datum::Int32(1), ScalarType::Int32).unwrap();
        let predicate = t
            .field(0)
            .unwrap()
            .call_binary(&one, BinaryFunc::Gt)
            .unwrap();
        let filter = circuit
            .add(OperatorKind::Filter {
                input: source,
                predicate: Closure::over_tuple("t", &typ, predicate),
            })
            .unwrap();

        let mut body = Circuit::new();
        let import = body
            .add(OperatorKind::Import {
                index: 0,
                typ: typ.clone(),
            })
            .unwrap();
        let variable = body
            .add(OperatorKind::IterationVariable { typ: typ.clone() })
            .unwrap();
        let union = body
            .add(OperatorKind::Union {
                inputs: vec![import, variable],
            })
            .unwrap();
        let result = body
            .add(OperatorKind::Distinct {
                input: union,
                gc: None,
            })
            .unwrap();
        let fixpoint = circuit
            .add(OperatorKind::Fixpoint(Box::new(FixpointOperator {
                imports: vec![filter],
                body,
                variable,
                result,
                max_iterations: 10,
            })))
            .unwrap();
        circuit
            .add(OperatorKind::Sink {
                input: fixpoint,
                name: "v".into(),
            })
            .unwrap();

        let expected = "\
%0 = Source t
%1 = Filter %0 |t| (t.0 > 1)
%2 = Fixpoint [%1] variable=%1 result=%3 max_iterations=10
  %0 = Import 0
  %1 = IterationVariable
  %2 = Union %0 %1
  %3 = Distinct %2
%3 = Sink %2 v
";
        assert_eq!(Explain::new(&circuit).with_types(false).to_string(), expected);
        let typed = circuit.to_string();
        assert!(typed.starts_with("%0 = Source t :: (int32, int32?)\n"));
    }
}
