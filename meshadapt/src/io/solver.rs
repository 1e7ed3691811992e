//! Solver invocation adapter.
//!
//! The [`Solver`] trait decouples the adaptation loop from the actual CFD
//! backend. [`solve`] wraps any backend with the checks the loop relies on: a
//! log banner per invocation, a successful exit and a restart file on disk.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::config::AdaptationConfig;
use crate::core::solver_request::SolverRequest;
use crate::core::types::{SolverMode, TabularFormat};
use crate::error::AdaptError;
use crate::io::process::{LogSink, run_logged};

/// What a backend reports after one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
}

impl SolverOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            exit_code: Some(0),
        }
    }

    pub fn failed(exit_code: Option<i32>) -> Self {
        Self {
            success: false,
            exit_code,
        }
    }
}

/// Abstraction over CFD solver backends.
pub trait Solver {
    /// Run one solve in `workdir`, sending output to `sink`.
    fn invoke(
        &self,
        request: &SolverRequest,
        workdir: &Path,
        sink: &mut LogSink,
    ) -> Result<SolverOutcome>;
}

/// Invoke `solver` and return the restart file it wrote.
///
/// `suffix` is the objective suffix appended to adjoint restart names.
#[instrument(skip_all, fields(mode = %request.mode, iterations = request.iterations))]
pub fn solve<S: Solver + ?Sized>(
    solver: &S,
    request: &SolverRequest,
    suffix: &str,
    workdir: &Path,
    sink: &mut LogSink,
) -> Result<PathBuf> {
    sink.banner(&format!(
        "{} solver, {} iterations, mesh {}",
        request.mode, request.iterations, request.mesh_filename
    ))?;
    let outcome = solver
        .invoke(request, workdir, sink)
        .with_context(|| format!("invoke {} solver", request.mode))?;
    sink.flush()?;

    if !outcome.success {
        warn!(exit_code = ?outcome.exit_code, "solver failed");
        let status = outcome
            .exit_code
            .map_or_else(|| "a signal".to_string(), |code| format!("status {code}"));
        return Err(AdaptError::SolverFailure(format!(
            "{} solver exited with {status} (see {})",
            request.mode,
            sink.err_path().display()
        ))
        .into());
    }

    let restart = workdir.join(request.expected_restart(suffix));
    if !restart.is_file() {
        warn!(restart = %restart.display(), "solver did not write its restart file");
        return Err(AdaptError::SolverFailure(format!(
            "{} solver finished but did not write {}",
            request.mode,
            restart.display()
        ))
        .into());
    }
    debug!(restart = %restart.display(), "solver finished");
    Ok(restart)
}

/// Solver that writes an SU2 configuration file and spawns the solver on it.
#[derive(Debug, Clone)]
pub struct Su2Solver {
    command: Vec<String>,
    base_options: BTreeMap<String, String>,
    objective: String,
    tabular_format: TabularFormat,
}

impl Su2Solver {
    pub fn from_config(config: &AdaptationConfig) -> Result<Self, AdaptError> {
        if config.solver.command.is_empty() {
            return Err(AdaptError::Config("solver.command is empty".to_string()));
        }
        Ok(Self {
            command: config.solver.command.clone(),
            base_options: config.solver.options.clone(),
            objective: config.case.objective_function.clone(),
            tabular_format: config.case.tabular_format,
        })
    }
}

impl Solver for Su2Solver {
    fn invoke(
        &self,
        request: &SolverRequest,
        workdir: &Path,
        sink: &mut LogSink,
    ) -> Result<SolverOutcome> {
        let config_path = workdir.join(config_file_name(request.mode));
        let rendered = render_config(
            &self.base_options,
            &self.objective,
            self.tabular_format,
            request,
        );
        fs::write(&config_path, rendered)
            .with_context(|| format!("write solver config {}", config_path.display()))?;

        info!(mode = %request.mode, workdir = %workdir.display(), "running CFD");
        let (program, leading) = self
            .command
            .split_first()
            .context("solver command is empty")?;
        let mut cmd = Command::new(program);
        cmd.args(leading).arg(&config_path).current_dir(workdir);
        let status = run_logged(cmd, sink)?;
        if status.success() {
            Ok(SolverOutcome::succeeded())
        } else {
            Ok(SolverOutcome::failed(status.code()))
        }
    }
}

fn config_file_name(mode: SolverMode) -> &'static str {
    match mode {
        SolverMode::Direct => "solver_direct.cfg",
        SolverMode::DiscreteAdjoint => "solver_adjoint.cfg",
    }
}

/// Base options first, then the per-request values that replace them.
fn render_config(
    base: &BTreeMap<String, String>,
    objective: &str,
    tabular_format: TabularFormat,
    request: &SolverRequest,
) -> String {
    let mut managed = request.overrides();
    managed.push(("OBJECTIVE_FUNCTION", objective.to_string()));
    managed.push(("TABULAR_FORMAT", tabular_format.as_str().to_string()));

    let mut out = String::new();
    for (key, value) in base {
        let key = key.trim().to_ascii_uppercase();
        if managed.iter().any(|(managed_key, _)| *managed_key == key) {
            continue;
        }
        let _ = writeln!(out, "{key}= {value}");
    }
    for (key, value) in &managed {
        let _ = writeln!(out, "{key}= {value}");
    }
    out
}
