//! Bootstrap: establish the initial mesh, flow solution and (goal mode)
//! adjoint solution in `ini/` before the adaptive loop starts.
//!
//! Three branches:
//! - cold start: full direct solve (then full adjoint in goal mode);
//! - warm start with the adjoint on disk: one-iteration replays that only
//!   regenerate history (and the metric);
//! - warm start without it: one-iteration direct replay, then a full adjoint.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::core::bundle::MeshSize;
use crate::core::config::AdaptationConfig;
use crate::core::remesh::BackgroundOptions;
use crate::core::schedule::Schedule;
use crate::core::solver_request::{MetricTarget, SolverRequest};
use crate::core::state::StageState;
use crate::core::suffix::{StandardSuffixes, add_suffix, resolve_suffix};
use crate::core::types::SensorKind;
use crate::error::AdaptError;
use crate::io::config::LoadedConfig;
use crate::io::history::{HistoryRecord, HistoryTable};
use crate::io::interchange;
use crate::io::process::LogSink;
use crate::io::solver::{Solver, solve};
use crate::io::stage::{INI_STAGE, StageDirs, link_external};
use crate::io::su2;
use crate::step::record_stage_history;

/// Flow restart written by bootstrap solves.
pub const INI_FLOW: &str = "restart_flow.csv";
/// Adjoint restart written by bootstrap solves (before the objective suffix).
pub const INI_ADJ: &str = "restart_adj.csv";
/// Background mesh converted to the interchange format.
pub const BACKGROUND_ITP: &str = "amg_back.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapBranch {
    ColdStart,
    WarmReplay,
    WarmFreshAdjoint,
}

impl fmt::Display for BootstrapBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapBranch::ColdStart => "cold start",
            BootstrapBranch::WarmReplay => "warm start, replaying provided solutions",
            BootstrapBranch::WarmFreshAdjoint => "warm start, computing a fresh adjoint",
        };
        f.write_str(name)
    }
}

/// Result of a successful bootstrap.
#[derive(Debug, Clone, PartialEq)]
pub struct Bootstrap {
    pub state: StageState,
    pub branch: BootstrapBranch,
    pub dimension: usize,
    /// Background mesh and flags handed to the remesher.
    pub background: BackgroundOptions,
}

/// Checks that need no filesystem access; returns the adjoint suffix.
///
/// Runs before the adaptation root is touched so a bad configuration never
/// destroys a previous run.
pub fn preflight(config: &AdaptationConfig, sensor: SensorKind) -> Result<String, AdaptError> {
    if config.restart_sol() {
        let missing = config.missing_warm_start(sensor.is_goal());
        if !missing.is_empty() {
            return Err(AdaptError::Config(format!(
                "restart_sol is set but the initial solution is missing: {}",
                missing.join(", ")
            )));
        }
    }
    if sensor.is_goal() {
        resolve_suffix(
            &StandardSuffixes,
            &config.case.objective_function,
            config.case.adjoint_suffix.as_deref(),
        )
    } else {
        Ok(String::new())
    }
}

/// Populate `ini/` and return the starting loop state.
pub fn bootstrap<S: Solver + ?Sized>(
    loaded: &LoadedConfig,
    schedule: &Schedule,
    suffix: &str,
    dirs: &StageDirs,
    solver: &S,
    history: &mut HistoryTable,
) -> Result<Bootstrap> {
    let config = &loaded.config;
    let goal = schedule.sensor.is_goal();
    let ini = dirs.enter_sub_stage(INI_STAGE)?;

    let mesh_name = required(config.case.mesh_filename.as_deref(), "case.mesh_filename")?;
    let mesh = link_external(&ini, &loaded.case_path(mesh_name), file_name(mesh_name)?)?;
    let initial = su2::read_mesh(&mesh).context("read initial mesh")?;
    info!(size = %MeshSize(&initial), dimension = initial.dimension, "initial mesh");

    let background = prepare_background(loaded, &ini, mesh_name, &mesh)?;
    let background = BackgroundOptions::new(&background, &config.adaptation);

    let complexity = schedule.first_complexity().unwrap_or_default();
    let metric = MetricTarget {
        hmin: config.adaptation.hmin,
        hmax: config.adaptation.hmax,
        complexity,
    };
    let mesh_file = file_name(mesh_name)?;
    let base_iter = config.solver.iter;
    let cfl = config.solver.cfl_number;
    let mut sink = LogSink::solver(&ini)?;

    let (branch, flow, adjoint) = if !config.restart_sol() {
        info!("running initial CFD solution");
        let direct = SolverRequest::direct(mesh_file, INI_FLOW, base_iter).with_cfl(cfl);
        let flow = solve(solver, &direct, suffix, &ini, &mut sink)?;
        let adjoint = if goal {
            let request =
                SolverRequest::adjoint(mesh_file, INI_FLOW, INI_ADJ, base_iter, metric).with_cfl(cfl);
            Some(solve(solver, &request, suffix, &ini, &mut sink)?)
        } else {
            None
        };
        (BootstrapBranch::ColdStart, flow, adjoint)
    } else {
        let solution = required(config.case.solution_filename.as_deref(), "case.solution_filename")?;
        link_external(&ini, &loaded.case_path(solution), file_name(solution)?)?;
        info!("initial CFD solution is provided");

        // One iteration regenerates the history files for the provided state.
        let direct = SolverRequest::direct(mesh_file, INI_FLOW, 1)
            .restarted_from(file_name(solution)?)
            .with_cfl(cfl);
        let flow = solve(solver, &direct, suffix, &ini, &mut sink)?;

        if goal {
            let solution_adj = required(
                config.case.solution_adj_filename.as_deref(),
                "case.solution_adj_filename",
            )?;
            let provided = add_suffix(solution_adj, suffix);
            let provided_path = loaded.case_path(&provided);
            let (branch, request) = if provided_path.is_file() {
                link_external(&ini, &provided_path, file_name(&provided)?)?;
                info!("initial adjoint CFD solution is provided");
                let request = SolverRequest::adjoint(mesh_file, INI_FLOW, INI_ADJ, 1, metric)
                    .adjoint_restarted_from(file_name(solution_adj)?);
                (BootstrapBranch::WarmReplay, request)
            } else {
                info!(missing = %provided_path.display(), "computing initial adjoint solution");
                let request =
                    SolverRequest::adjoint(mesh_file, INI_FLOW, INI_ADJ, base_iter, metric);
                (BootstrapBranch::WarmFreshAdjoint, request)
            };
            let adjoint = solve(solver, &request.with_cfl(cfl), suffix, &ini, &mut sink)?;
            (branch, flow, Some(adjoint))
        } else {
            (BootstrapBranch::WarmReplay, flow, None)
        }
    };
    drop(sink);
    info!(branch = %branch, "bootstrap finished");

    ensure_artifacts(&mesh, &flow, adjoint.as_deref())?;

    let record = HistoryRecord::adaptation(
        0,
        complexity,
        initial.num_vertices(),
        initial.num_elements(),
    );
    record_stage_history(history, &ini, goal, record).context("record initial history")?;

    Ok(Bootstrap {
        state: StageState::bootstrapped(ini, mesh, flow, adjoint),
        branch,
        dimension: initial.dimension,
        background,
    })
}

/// Link the background mesh into `ini/`, converting SU2 meshes once.
fn prepare_background(
    loaded: &LoadedConfig,
    ini: &Path,
    mesh_name: &str,
    mesh: &Path,
) -> Result<PathBuf> {
    let back_name = loaded
        .config
        .adaptation
        .back_mesh
        .as_deref()
        .unwrap_or(mesh_name);
    let linked = if back_name == mesh_name {
        mesh.to_path_buf()
    } else {
        link_external(ini, &loaded.case_path(back_name), file_name(back_name)?)?
    };
    if linked.extension().is_some_and(|ext| ext == "su2") {
        info!("generating background surface mesh");
        let back = su2::read_mesh(&linked).context("read background mesh")?;
        let converted = ini.join(BACKGROUND_ITP);
        interchange::write_bundle(&converted, &back)?;
        Ok(converted)
    } else {
        Ok(linked)
    }
}

fn ensure_artifacts(mesh: &Path, flow: &Path, adjoint: Option<&Path>) -> Result<(), AdaptError> {
    let missing: Vec<String> = [Some(mesh), Some(flow), adjoint]
        .into_iter()
        .flatten()
        .filter(|path| !path.is_file())
        .map(|path| path.display().to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AdaptError::MissingArtifact(missing))
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, AdaptError> {
    value.ok_or_else(|| AdaptError::missing_options(&[name]))
}

fn file_name(name: &str) -> Result<&str, AdaptError> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AdaptError::Config(format!("'{name}' does not name a file")))
}
