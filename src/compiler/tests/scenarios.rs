// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Programs compiled end to end and executed by the simulator.

use zf_circuit::{Circuit, OperatorKind};
use zf_compiler::plan::{Column, Lateness, PlanAggregate, PlanExpr, PlanScalar, Program, Table, View};
use zf_compiler::{compile, CompileError, CompilerConfig};
use zf_expr::{AggregateFunc, BinaryFunc};
use zf_repr::{ColumnType, Datum, Row, ScalarType, ZSet};
use zf_simulator::{Deltas, Simulator, SimulatorError};

fn column(name: &str, typ: ColumnType) -> Column {
    Column {
        name: name.into(),
        typ,
    }
}

/// `T(COL1 INT NOT NULL, COL2 DOUBLE NOT NULL, COL3 BOOL NOT NULL,
/// COL4 VARCHAR NOT NULL, COL5 INT, COL6 DOUBLE)`
fn t() -> Table {
    Table {
        name: "t".into(),
        columns: vec![
            column("col1", ScalarType::Int32.nullable(false)),
            column("col2", ScalarType::Float64.nullable(false)),
            column("col3", ScalarType::Bool.nullable(false)),
            column("col4", ScalarType::String.nullable(false)),
            column("col5", ScalarType::Int32.nullable(true)),
            column("col6", ScalarType::Float64.nullable(true)),
        ],
    }
}

fn t_row(col1: i32, col2: f64, col3: bool, col4: &str) -> Row {
    Row::new(vec![
        Datum::from(col1),
        Datum::from(col2),
        Datum::from(col3),
        Datum::from(col4),
        Datum::Null,
        Datum::Null,
    ])
}

fn view(name: &str, columns: &[&str], plan: PlanExpr) -> View {
    View {
        name: name.into(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        plan,
        recursive: false,
    }
}

fn program(tables: Vec<Table>, views: Vec<View>) -> Program {
    Program {
        tables,
        views,
        lateness: vec![],
    }
}

fn input(table: &str, delta: Vec<(Row, i64)>) -> Deltas {
    Deltas::from([(table.to_string(), ZSet::from(delta))])
}

fn zset<D: Into<Datum>>(rows: Vec<(Vec<D>, i64)>) -> ZSet {
    rows.into_iter().map(|(row, diff)| (Row::pack(row), diff)).collect()
}

fn kinds(circuit: &Circuit) -> Vec<&'static str> {
    circuit.iter().map(|(_, op)| op.kind.name()).collect()
}

/// `COL1 > bound`
fn col1_above(bound: i32) -> PlanScalar {
    PlanScalar::Column(0).binary(BinaryFunc::Gt, PlanScalar::literal(Datum::from(bound)))
}

#[zf_ore::test]
fn views_share_the_table_scan() {
    let program = program(
        vec![t()],
        vec![
            view("v1", &["col3"], PlanExpr::get("t").columns(&[2])),
            view("v2", &["col2"], PlanExpr::get("t").columns(&[1])),
        ],
    );
    let circuit = compile(&program, &CompilerConfig::default()).unwrap();
    assert_eq!(kinds(&circuit), vec!["Source", "Map", "Sink", "Map", "Sink"]);
    let source = circuit.source("t").unwrap();
    for (sink, _) in circuit.sinks() {
        let map = circuit.get(sink).unwrap().kind.inputs()[0];
        assert_eq!(circuit.get(map).unwrap().kind.inputs(), vec![source]);
    }

    let mut simulator = Simulator::new(circuit).unwrap();
    let outputs = simulator
        .step(input(
            "t",
            vec![
                (t_row(1, 12.0, true, "a"), 1),
                (t_row(2, 1.0, false, "b"), -1),
            ],
        ))
        .unwrap();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs["v1"], zset(vec![(vec![true], 1), (vec![false], -1)]));
    assert_eq!(outputs["v2"], zset(vec![(vec![12.0], 1), (vec![1.0], -1)]));
}

#[zf_ore::test]
fn views_of_views_see_the_same_changes() {
    let program = program(
        vec![t()],
        vec![
            view("v1", &["col3"], PlanExpr::get("t").columns(&[2])),
            view("v2", &["col3"], PlanExpr::get("v1").columns(&[0])),
        ],
    );
    let circuit = compile(&program, &CompilerConfig::default()).unwrap();
    let mut simulator = Simulator::new(circuit).unwrap();
    let steps = vec![
        vec![(t_row(1, 1.0, true, "a"), 1), (t_row(2, 2.0, true, "b"), 2)],
        vec![(t_row(1, 1.0, true, "a"), -1), (t_row(3, 3.0, false, "c"), 1)],
        vec![],
    ];
    for delta in steps {
        let outputs = simulator.step(input("t", delta)).unwrap();
        assert_eq!(outputs["v1"], outputs["v2"]);
    }
}

#[zf_ore::test]
fn views_can_be_read_more_than_once() {
    // v2 = SELECT DISTINCT t.col1 FROM v1 JOIN t ON v1.col3 = t.col3
    let joined = PlanExpr::get("v1").join(
        PlanExpr::get("t"),
        PlanScalar::Column(0).equals(PlanScalar::Column(3)),
    );
    let program = program(
        vec![t()],
        vec![
            view("v1", &["col3"], PlanExpr::get("t").columns(&[2])),
            view("v2", &["col1"], joined.columns(&[1]).distinct()),
        ],
    );
    let circuit = compile(&program, &CompilerConfig::default()).unwrap();
    let mut simulator = Simulator::new(circuit).unwrap();
    let outputs = simulator
        .step(input(
            "t",
            vec![(t_row(1, 12.0, true, "a"), 1), (t_row(1, 1.0, true, "b"), 1)],
        ))
        .unwrap();
    assert_eq!(outputs["v2"], zset(vec![(vec![1], 1)]));
}

#[zf_ore::test]
fn aggregates_replace_their_results() {
    // SELECT col3, COUNT(*) FROM t GROUP BY col3
    let plan = PlanExpr::Aggregate {
        input: Box::new(PlanExpr::get("t")),
        group_key: vec![2],
        aggregates: vec![PlanAggregate {
            func: AggregateFunc::Count,
            expr: None,
            distinct: false,
        }],
    };
    let program = program(vec![t()], vec![view("v", &["col3", "n"], plan)]);
    let circuit = compile(&program, &CompilerConfig::default()).unwrap();
    let mut simulator = Simulator::new(circuit).unwrap();
    let group = |n: i64| Row::new(vec![Datum::True, Datum::Int64(n)]);
    let (a, b, c) = (t_row(1, 1.0, true, "a"), t_row(2, 2.0, true, "b"), t_row(3, 3.0, true, "c"));

    let outputs = simulator
        .step(input("t", vec![(a.clone(), 1), (b.clone(), 1)]))
        .unwrap();
    assert_eq!(outputs["v"], ZSet::singleton(group(2), 1));

    let outputs = simulator.step(input("t", vec![(c.clone(), 1)])).unwrap();
    assert_eq!(outputs["v"], ZSet::from(vec![(group(2), -1), (group(3), 1)]));

    let outputs = simulator
        .step(input("t", vec![(a, -1), (b, -1), (c, -1)]))
        .unwrap();
    assert_eq!(outputs["v"], ZSet::singleton(group(3), -1));
}

fn edges() -> Table {
    Table {
        name: "edges".into(),
        columns: vec![
            column("src", ScalarType::Int32.nullable(false)),
            column("dst", ScalarType::Int32.nullable(false)),
        ],
    }
}

/// `paths = edges UNION SELECT paths.src, edges.dst FROM paths JOIN edges
/// ON paths.dst = edges.src`
fn paths() -> View {
    let step = PlanExpr::RecursiveRef {
        name: "paths".into(),
    }
    .join(
        PlanExpr::get("edges"),
        PlanScalar::Column(1).equals(PlanScalar::Column(2)),
    )
    .columns(&[0, 3]);
    let mut paths = view(
        "paths",
        &["src", "dst"],
        PlanExpr::Union {
            inputs: vec![PlanExpr::get("edges"), step],
            all: false,
        },
    );
    paths.recursive = true;
    paths
}

/// The edges of the path `0 -> 1 -> ... -> n`.
fn chain(n: i32) -> Deltas {
    input(
        "edges",
        (0..n).map(|i| (Row::pack([i, i + 1]), 1)).collect(),
    )
}

#[zf_ore::test]
fn recursive_views_converge() {
    let program = program(vec![edges()], vec![paths()]);
    let circuit = compile(&program, &CompilerConfig::default()).unwrap();
    let mut simulator = Simulator::new(circuit).unwrap();

    let outputs = simulator.step(chain(4)).unwrap();
    let expected: ZSet = (0..4)
        .flat_map(|src| (src + 1..=4).map(move |dst| (Row::pack([src, dst]), 1)))
        .collect();
    assert_eq!(outputs["paths"], expected);
    assert_eq!(outputs["paths"].len(), 10);

    // Closing the cycle adds every missing pair.
    let outputs = simulator
        .step(input("edges", vec![(Row::pack([4, 0]), 1)]))
        .unwrap();
    assert_eq!(outputs["paths"].len(), 25 - 10);
    assert!(outputs["paths"].is_positive());

    let outputs = simulator.step(Deltas::new()).unwrap();
    assert!(outputs["paths"].is_empty());
}

#[zf_ore::test]
fn recursion_is_bounded() {
    let program = program(vec![edges()], vec![paths()]);
    let mut config = CompilerConfig::default();
    config.recursion.max_iterations = 2;
    let circuit = compile(&program, &config).unwrap();
    let mut simulator = Simulator::new(circuit).unwrap();
    let err = simulator.step(chain(6)).unwrap_err();
    assert!(
        matches!(err, SimulatorError::IterationLimit { limit: 2, .. }),
        "{:?}",
        err
    );
}

#[zf_ore::test]
fn ill_founded_recursion_is_rejected() {
    // paths = SELECT src, dst FROM paths
    let mut paths = view(
        "paths",
        &["src", "dst"],
        PlanExpr::RecursiveRef {
            name: "paths".into(),
        }
        .columns(&[0, 1]),
    );
    paths.recursive = true;
    let err = compile(&program(vec![edges()], vec![paths]), &CompilerConfig::default())
        .unwrap_err();
    assert!(matches!(err, CompileError::IllFoundedRecursion { .. }), "{:?}", err);
}

#[zf_ore::test]
fn unsupported_constructs_are_reported() {
    let except = PlanExpr::Except {
        left: Box::new(PlanExpr::get("t")),
        right: Box::new(PlanExpr::get("t")),
        all: true,
    };
    let err = compile(
        &program(vec![t()], vec![view("v", &["a", "b", "c", "d", "e", "f"], except)]),
        &CompilerConfig::default(),
    )
    .unwrap_err();
    let CompileError::UnsupportedConstruct {
        location,
        construct,
    } = err
    else {
        panic!("expected an unsupported construct");
    };
    assert_eq!(location.view, "v");
    assert_eq!(construct, "EXCEPT");
}

#[zf_ore::test]
fn lateness_bounds_state_without_changing_results() {
    // SELECT col1, COUNT(*) FROM t GROUP BY col1
    let plan = PlanExpr::Aggregate {
        input: Box::new(PlanExpr::get("t")),
        group_key: vec![0],
        aggregates: vec![PlanAggregate {
            func: AggregateFunc::Count,
            expr: None,
            distinct: false,
        }],
    };
    let plain = program(vec![t()], vec![view("v", &["col1", "n"], plan)]);
    let mut late = plain.clone();
    late.lateness.push(Lateness {
        relation: "t".into(),
        column: "col1".into(),
        value: Datum::Int32(10),
    });

    let config = CompilerConfig::default();
    let mut plain = Simulator::new(compile(&plain, &config).unwrap()).unwrap();
    let mut late = Simulator::new(compile(&late, &config).unwrap()).unwrap();
    for step in 0..10 {
        let delta = input(
            "t",
            vec![
                (t_row(step * 5, 1.0, true, "a"), 1),
                (t_row(step * 5 + 1, 1.0, false, "b"), 1),
            ],
        );
        let expected = plain.step(delta.clone()).unwrap();
        assert_eq!(late.step(delta).unwrap(), expected);
    }
    // Groups with col1 below 46 - 10 are purged.
    assert_eq!(plain.state_size(), 20);
    assert!(late.state_size() < 10, "{}", late.state_size());
}

/// A table `name(K INT NOT NULL)`.
fn keyed(name: &str) -> Table {
    Table {
        name: name.into(),
        columns: vec![column("k", ScalarType::Int32.nullable(false))],
    }
}

/// `l JOIN r ON l.k = r.k`
fn keyed_join() -> PlanExpr {
    PlanExpr::get("l").join(
        PlanExpr::get("r"),
        PlanScalar::Column(0).equals(PlanScalar::Column(1)),
    )
}

/// `program` with a lateness of zero on column `k` of each of `relations`.
fn with_lateness(program: &Program, relations: &[&str]) -> Program {
    let mut late = program.clone();
    for relation in relations {
        late.lateness.push(Lateness {
            relation: relation.to_string(),
            column: "k".into(),
            value: Datum::Int32(0),
        });
    }
    late
}

fn keys(l: Vec<i32>, r: Vec<i32>) -> Deltas {
    let rows = |keys: Vec<i32>| zset(keys.into_iter().map(|k| (vec![k], 1)).collect());
    Deltas::from([("l".to_string(), rows(l)), ("r".to_string(), rows(r))])
}

#[zf_ore::test]
fn joins_match_rows_behind_the_other_watermark() {
    let plain = program(vec![keyed("l"), keyed("r")], vec![view("v", &["lk", "rk"], keyed_join())]);
    let late = with_lateness(&plain, &["l", "r"]);

    let config = CompilerConfig::default();
    let mut plain = Simulator::new(compile(&plain, &config).unwrap()).unwrap();
    let mut late = Simulator::new(compile(&late, &config).unwrap()).unwrap();
    let steps = [
        keys(vec![50, 100], vec![]),
        keys(vec![], vec![50]),
        keys(vec![], vec![100]),
    ];
    let mut outputs = vec![];
    for delta in steps {
        let expected = plain.step(delta.clone()).unwrap();
        let output = late.step(delta).unwrap();
        assert_eq!(output, expected);
        outputs.push(output);
    }
    // The left watermark passed 50 before the right side sent it.
    assert_eq!(outputs[1]["v"], zset(vec![(vec![50, 50], 1)]));
    assert_eq!(outputs[2]["v"], zset(vec![(vec![100, 100], 1)]));
    // 50 is behind both watermarks, so only 100 is kept on each side.
    assert_eq!(plain.state_size(), 4);
    assert_eq!(late.state_size(), 2);
}

#[zf_ore::test]
fn aggregates_of_joins_keep_groups_behind_the_watermark() {
    // SELECT l.k, COUNT(*) FROM l JOIN r ON l.k = r.k GROUP BY l.k
    let plan = PlanExpr::Aggregate {
        input: Box::new(keyed_join()),
        group_key: vec![0],
        aggregates: vec![PlanAggregate {
            func: AggregateFunc::Count,
            expr: None,
            distinct: false,
        }],
    };
    let plain = program(vec![keyed("l"), keyed("r")], vec![view("v", &["k", "n"], plan)]);
    let late = with_lateness(&plain, &["l"]);

    let config = CompilerConfig::default();
    let mut plain = Simulator::new(compile(&plain, &config).unwrap()).unwrap();
    let mut late = Simulator::new(compile(&late, &config).unwrap()).unwrap();
    let steps = [
        keys(vec![50, 100], vec![50]),
        keys(vec![], vec![50]),
        keys(vec![], vec![100, 100]),
    ];
    let mut outputs = vec![];
    for delta in steps {
        let expected = plain.step(delta.clone()).unwrap();
        let output = late.step(delta).unwrap();
        assert_eq!(output, expected);
        outputs.push(output);
    }
    let result = |k: i32, n: i64| Row::new(vec![Datum::from(k), Datum::from(n)]);
    assert_eq!(
        outputs[1]["v"],
        ZSet::from(vec![(result(50, 1), -1), (result(50, 2), 1)])
    );
}

#[zf_ore::test]
fn identical_filters_of_different_views_are_shared() {
    let program = program(
        vec![t()],
        vec![
            view("v1", &["col3"], PlanExpr::get("t").filter(col1_above(1)).columns(&[2])),
            view("v2", &["col2"], PlanExpr::get("t").filter(col1_above(1)).columns(&[1])),
        ],
    );
    let mut config = CompilerConfig::default();
    config.passes.fusion = false;
    let circuit = compile(&program, &config).unwrap();
    assert_eq!(
        kinds(&circuit),
        vec!["Source", "Filter", "Map", "Sink", "Map", "Sink"]
    );

    // Identical views collapse into a single operator once fused.
    let program = crate::program(
        vec![t()],
        vec![
            view("v1", &["col3"], PlanExpr::get("t").filter(col1_above(1)).columns(&[2])),
            view("v2", &["col3"], PlanExpr::get("t").filter(col1_above(1)).columns(&[2])),
        ],
    );
    let circuit = compile(&program, &CompilerConfig::default()).unwrap();
    assert_eq!(kinds(&circuit), vec!["Source", "FilterMap", "Sink", "Sink"]);

    let mut simulator = Simulator::new(circuit).unwrap();
    let outputs = simulator
        .step(input(
            "t",
            vec![(t_row(1, 1.0, true, "a"), 1), (t_row(2, 1.0, false, "b"), 1)],
        ))
        .unwrap();
    assert_eq!(outputs["v1"], zset(vec![(vec![false], 1)]));
    assert_eq!(outputs["v1"], outputs["v2"]);
}

#[zf_ore::test]
fn only_operators_reaching_views_survive() {
    // The always-false branch folds away, together with the filter below it.
    let never = PlanScalar::literal(Datum::False);
    let plan = PlanExpr::Union {
        inputs: vec![
            PlanExpr::get("t").filter(never).columns(&[0]),
            PlanExpr::get("t").columns(&[0]),
        ],
        all: true,
    };
    let program = program(vec![t()], vec![view("v", &["col1"], plan)]);
    let unoptimized = compile(
        &program,
        &CompilerConfig {
            optimize: false,
            ..Default::default()
        },
    )
    .unwrap();
    let circuit = compile(&program, &CompilerConfig::default()).unwrap();
    assert!(circuit.len() < unoptimized.len());
    assert!(!kinds(&circuit).contains(&"Filter"));
    for (id, op) in circuit.iter() {
        if matches!(op.kind, OperatorKind::Source { .. } | OperatorKind::Sink { .. }) {
            continue;
        }
        assert!(!circuit.consumers(id).is_empty(), "{} is dead", id);
    }

    let delta = input("t", vec![(t_row(7, 1.0, true, "a"), 1)]);
    let mut simulator = Simulator::new(circuit).unwrap();
    assert_eq!(
        simulator.step(delta).unwrap()["v"],
        zset(vec![(vec![7], 1)])
    );
}
