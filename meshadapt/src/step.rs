//! One sub-iteration of the adaptation cycle.
//!
//! A sub-iteration reads the current stage, remeshes, stages the result in a
//! new `ite{n}` directory and re-solves on it:
//! Sensing → Remeshing → Staging → Resolving → HistoryRecording.
//! Errors are tagged with the stage and phase that failed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::bundle::{Field, MeshSize, MeshSolutionBundle};
use crate::core::config::AdaptationConfig;
use crate::core::remesh::{BackgroundOptions, RemeshRequest, accept_output};
use crate::core::schedule::SizeLevel;
use crate::core::sensor::{attach_driver, split_adjoint, strip_drivers};
use crate::core::solver_request::{MetricTarget, SolverRequest};
use crate::core::state::{Phase, StageState};
use crate::core::suffix::add_suffix;
use crate::core::types::SensorKind;
use crate::io::history::{
    ADJOINT_HISTORY, DIRECT_HISTORY, HistoryRecord, HistoryTable, read_last_row,
    solver_history_path,
};
use crate::io::interchange;
use crate::io::process::LogSink;
use crate::io::remesher::Remesher;
use crate::io::solver::{Solver, solve};
use crate::io::stage::{StageDirs, rename_local};
use crate::io::su2;

/// File names inside an `ite{n}` stage.
pub const STAGE_MESH: &str = "adap.su2";
pub const STAGE_FLOW: &str = "flo.csv";
pub const STAGE_FLOW_INI: &str = "flo_ini.csv";
pub const STAGE_FLOW_ITP: &str = "flo_itp.json";
pub const STAGE_ADJ: &str = "adj.csv";
pub const STAGE_ADJ_INI: &str = "adj_ini.csv";
pub const STAGE_ADJ_ITP: &str = "adj_itp.json";

/// Inputs that stay fixed for the whole loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings<'a> {
    pub config: &'a AdaptationConfig,
    pub sensor: SensorKind,
    /// Objective suffix of adjoint restart names (empty for feature sensors).
    pub suffix: &'a str,
    /// Background mesh and flags passed to every remesher call.
    pub background: &'a BackgroundOptions,
}

impl LoopSettings<'_> {
    fn goal(&self) -> bool {
        self.sensor.is_goal()
    }
}

/// Run one sub-iteration at `level`, returning the advanced state.
pub fn run_sub_iteration<S: Solver + ?Sized, R: Remesher + ?Sized>(
    settings: &LoopSettings<'_>,
    level: &SizeLevel,
    dirs: &StageDirs,
    state: StageState,
    solver: &S,
    remesher: &R,
    history: &mut HistoryTable,
) -> Result<StageState> {
    let stage_name = state.next_stage_name();
    let context = |phase: Phase| format!("{stage_name}: {phase} failed");

    let bundle = sense(settings, &state).with_context(|| context(Phase::Sensing))?;
    let mut adapted = remesh(settings, level, bundle, remesher, state.stage_dir())
        .with_context(|| context(Phase::Remeshing))?;

    let stage_dir = dirs
        .enter_sub_stage(&stage_name)
        .with_context(|| context(Phase::Staging))?;
    let adjoint = if settings.goal() {
        Some(split_adjoint(&mut adapted).with_context(|| context(Phase::Staging))?)
    } else {
        None
    };
    stage(settings, &stage_dir, &adapted, adjoint.as_ref())
        .with_context(|| context(Phase::Staging))?;

    let (flow, adjoint) = resolve(settings, level, &stage_dir, solver)
        .with_context(|| context(Phase::Resolving))?;

    let record = HistoryRecord::adaptation(
        state.global_iter + 1,
        level.complexity,
        adapted.num_vertices(),
        adapted.num_elements(),
    );
    record_stage_history(history, &stage_dir, settings.goal(), record)
        .with_context(|| context(Phase::HistoryRecording))?;

    let mesh = stage_dir.join(STAGE_MESH);
    Ok(state.advance(stage_dir, mesh, flow, adjoint))
}

/// Append `record` plus the last solver history rows found in `stage_dir`.
pub fn record_stage_history(
    history: &mut HistoryTable,
    stage_dir: &Path,
    goal: bool,
    mut record: HistoryRecord,
) -> Result<()> {
    let format = history.format();
    if let Some(row) = read_last_row(&solver_history_path(stage_dir, DIRECT_HISTORY, format))? {
        record.extend_solver(&row);
    }
    if goal
        && let Some(row) =
            read_last_row(&solver_history_path(stage_dir, ADJOINT_HISTORY, format))?
    {
        record.extend_solver(&row);
    }
    history.append(&record)
}

fn sense(settings: &LoopSettings<'_>, state: &StageState) -> Result<MeshSolutionBundle> {
    let mut bundle = su2::read_bundle(&state.mesh, &state.flow)?;
    let adjoint = match (&state.adjoint, settings.goal()) {
        (Some(path), true) => Some(su2::read_solution(path)?),
        _ => None,
    };
    attach_driver(&mut bundle, settings.sensor, adjoint)?;
    debug!(size = %MeshSize(&bundle), sensor = %settings.sensor, "built adaptation driver");
    Ok(bundle)
}

fn remesh<R: Remesher + ?Sized>(
    settings: &LoopSettings<'_>,
    level: &SizeLevel,
    bundle: MeshSolutionBundle,
    remesher: &R,
    workdir: &Path,
) -> Result<MeshSolutionBundle> {
    let inherited = bundle.metadata();
    let request = RemeshRequest::new(
        &settings.config.adaptation,
        settings.background,
        level.complexity,
    );
    let adapted = remesher.remesh(bundle, &request, workdir)?;
    let mut adapted = accept_output(adapted, inherited)?;
    strip_drivers(&mut adapted);
    info!(size = %MeshSize(&adapted), "remeshed");
    Ok(adapted)
}

fn stage(
    settings: &LoopSettings<'_>,
    stage_dir: &Path,
    adapted: &MeshSolutionBundle,
    adjoint: Option<&Field>,
) -> Result<()> {
    su2::write_bundle(
        &stage_dir.join(STAGE_MESH),
        &stage_dir.join(STAGE_FLOW),
        adapted,
    )?;
    interchange::write_bundle(&stage_dir.join(STAGE_FLOW_ITP), adapted)?;
    rename_local(stage_dir, STAGE_FLOW, STAGE_FLOW_INI)?;

    if let Some(adjoint) = adjoint {
        su2::write_solution(
            &stage_dir.join(STAGE_ADJ),
            adapted.dimension,
            &adapted.coordinates,
            adjoint,
        )?;
        interchange::write_field(
            &stage_dir.join(STAGE_ADJ_ITP),
            adapted.num_vertices(),
            adjoint,
        )?;
        // The solver appends the objective suffix when reading SOLUTION_ADJ_FILENAME.
        rename_local(
            stage_dir,
            STAGE_ADJ,
            &add_suffix(STAGE_ADJ_INI, settings.suffix),
        )?;
    }
    Ok(())
}

fn resolve<S: Solver + ?Sized>(
    settings: &LoopSettings<'_>,
    level: &SizeLevel,
    stage_dir: &Path,
    solver: &S,
) -> Result<(PathBuf, Option<PathBuf>)> {
    let mut sink = LogSink::solver(stage_dir)?;

    info!(iterations = level.flow_iter, cfl = level.cfl, "running CFD");
    let direct = SolverRequest::direct(STAGE_MESH, STAGE_FLOW, level.flow_iter)
        .restarted_from(STAGE_FLOW_INI)
        .with_cfl(level.cfl);
    let flow = solve(solver, &direct, settings.suffix, stage_dir, &mut sink)?;

    let adjoint = if settings.goal() {
        let adaptation = &settings.config.adaptation;
        let metric = MetricTarget {
            hmin: adaptation.hmin,
            hmax: adaptation.hmax,
            complexity: level.complexity,
        };
        info!(iterations = level.adj_iter, "running adjoint CFD");
        let request = SolverRequest::adjoint(
            STAGE_MESH,
            STAGE_FLOW,
            STAGE_ADJ,
            level.adj_iter,
            metric,
        )
        .adjoint_restarted_from(STAGE_ADJ_INI)
        .with_cfl(level.cfl);
        Some(solve(solver, &request, settings.suffix, stage_dir, &mut sink)?)
    } else {
        None
    };
    Ok((flow, adjoint))
}
