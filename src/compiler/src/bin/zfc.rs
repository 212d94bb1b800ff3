// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Compiles a program into an incremental circuit and prints it.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};
use zf_compiler::plan::Program;
use zf_compiler::CompilerConfig;
use zf_ore::cli::{self, KeyValueArg};
use zf_ore::tracing::{StderrLogConfig, TracingConfig};
use zf_simulator::{Deltas, Simulator};

/// Compiles a program, given as JSON, into an incremental circuit.
#[derive(clap::Parser)]
struct Args {
    /// The program to compile.
    #[clap(value_name = "PROGRAM")]
    program: PathBuf,
    /// Print the circuit as JSON instead of explaining it.
    #[clap(long)]
    json: bool,
    /// Skip the optimizer.
    #[clap(long, env = "ZFC_NO_OPTIMIZE")]
    no_optimize: bool,
    /// Enable or disable an optimizer pass, as PASS=BOOL.
    #[clap(long = "pass", env = "ZFC_PASSES", value_name = "PASS=BOOL", value_delimiter = ',')]
    passes: Vec<KeyValueArg<String, bool>>,
    /// The number of rounds after which the optimizer gives up.
    #[clap(long, env = "ZFC_OPTIMIZER_FIXPOINT_LIMIT", value_name = "N")]
    optimizer_fixpoint_limit: Option<usize>,
    /// The number of iterations after which a recursive view is abandoned.
    #[clap(long, env = "ZFC_MAX_ITERATIONS", value_name = "N")]
    max_iterations: Option<usize>,
    /// Accept recursive views that compute new values in their recursive
    /// step.
    #[clap(long, env = "ZFC_ALLOW_COMPUTED_RECURSION")]
    allow_computed_recursion: bool,
    /// Execute the circuit on the steps in FILE, a JSON array of objects
    /// mapping table names to deltas, and print the deltas of every view.
    #[clap(long, value_name = "FILE")]
    simulate: Option<PathBuf>,
    /// Which events to log, in `tracing_subscriber::EnvFilter` syntax.
    #[clap(long, env = "ZFC_LOG_FILTER", value_name = "FILTER", default_value = "info")]
    log_filter: String,
}

fn main() {
    let args: Args = cli::parse_args();
    if let Err(err) = run(args) {
        eprintln!("zfc: fatal: {:#}", err);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), anyhow::Error> {
    zf_ore::tracing::configure(TracingConfig {
        stderr_log: StderrLogConfig {
            filter: args.log_filter.clone(),
            ..Default::default()
        },
    })?;

    let mut config = CompilerConfig {
        optimize: !args.no_optimize,
        ..Default::default()
    };
    for pass in &args.passes {
        if let Err(e) = config.passes.set(&pass.key, pass.value) {
            bail!("--pass {}: {}", pass.key, e);
        }
    }
    if let Some(limit) = args.optimizer_fixpoint_limit {
        config.optimizer_fixpoint_limit = limit;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.recursion.max_iterations = max_iterations;
    }
    config.recursion.allow_computed_recursion = args.allow_computed_recursion;

    let text = fs::read_to_string(&args.program)
        .with_context(|| format!("reading {}", args.program.display()))?;
    let program: Program = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", args.program.display()))?;
    let circuit = zf_compiler::compile(&program, &config)?;

    let mut stdout = io::stdout().lock();
    if args.json {
        serde_json::to_writer_pretty(&mut stdout, &circuit)?;
        writeln!(stdout)?;
    } else {
        write!(stdout, "{}", circuit)?;
    }

    if let Some(path) = args.simulate {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let steps: Vec<Deltas> =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        let mut simulator = Simulator::new(circuit)?;
        for (i, inputs) in steps.into_iter().enumerate() {
            let outputs = simulator
                .step(inputs)
                .with_context(|| format!("executing step {}", i))?;
            if args.json {
                serde_json::to_writer(&mut stdout, &outputs)?;
                writeln!(stdout)?;
            } else {
                writeln!(stdout, "step {}:", i)?;
                for (view, delta) in &outputs {
                    writeln!(stdout, "  {}: {}", view, delta)?;
                }
            }
        }
    }
    Ok(())
}
