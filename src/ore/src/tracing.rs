// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository, or online at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tracing utilities.
//!
//! The key export is the **[`configure`]** function, which configures the
//! `tracing` crate with sensible defaults and should be called during
//! initialization of every zflow binary.

use std::io::{self, IsTerminal};

use anyhow::Context;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Application tracing configuration.
///
/// See the [`configure`] function for details.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Configuration of the stderr log.
    pub stderr_log: StderrLogConfig,
}

/// Configures the stderr log.
#[derive(Debug, Clone)]
pub struct StderrLogConfig {
    /// A filter directive, in [`EnvFilter`] syntax, which determines which
    /// events are emitted to the log.
    pub filter: String,
    /// Whether to include the event's target in each log line.
    pub with_target: bool,
}

impl Default for StderrLogConfig {
    fn default() -> StderrLogConfig {
        StderrLogConfig {
            filter: "info".into(),
            with_target: true,
        }
    }
}

/// Configures the `tracing` crate.
///
/// Events are written to stderr, filtered by the directive in
/// `config.stderr_log.filter`. Fails if the filter directive does not parse
/// or if a global subscriber has already been installed.
pub fn configure(config: TracingConfig) -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_new(&config.stderr_log.filter)
        .with_context(|| format!("parsing log filter {:?}", config.stderr_log.filter))?;
    let stderr_log_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(config.stderr_log.with_target)
        .with_filter(filter);
    tracing_subscriber::registry()
        .with(stderr_log_layer)
        .try_init()
        .context("installing global tracing subscriber")?;
    Ok(())
}
