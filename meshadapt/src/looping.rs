//! The full adaptive loop: plan → fresh root → bootstrap → size levels →
//! final promotion.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::bootstrap::{BootstrapBranch, bootstrap, preflight};
use crate::core::schedule::{Schedule, plan_schedule};
use crate::error::AdaptError;
use crate::io::config::LoadedConfig;
use crate::io::history::HistoryTable;
use crate::io::interchange;
use crate::io::remesher::Remesher;
use crate::io::solver::Solver;
use crate::io::stage::{StageDirs, promote};
use crate::io::su2;
use crate::step::{LoopSettings, run_sub_iteration};

/// Interchange export of the final state, left in the last stage.
pub const FINAL_EXPORT: &str = "flo.json";

/// Summary of a completed adaptation run.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptationOutcome {
    pub schedule: Schedule,
    pub bootstrap: BootstrapBranch,
    /// Number of `ite{n}` stages created.
    pub stages: u32,
    /// Stage whose artifacts were promoted.
    pub final_stage: PathBuf,
    pub mesh_out: PathBuf,
    pub restart_out: PathBuf,
    pub history: PathBuf,
}

/// Run the whole adaptation described by `loaded`.
///
/// Any error aborts the loop; stage directories created so far are left in
/// place for inspection.
pub fn run_adaptation<S: Solver + ?Sized, R: Remesher + ?Sized>(
    loaded: &LoadedConfig,
    solver: &S,
    remesher: &R,
) -> Result<AdaptationOutcome> {
    let config = &loaded.config;
    let schedule = plan_schedule(config)?;
    let suffix = preflight(config, schedule.sensor)?;
    let mesh_out_name = config
        .case
        .mesh_out_filename
        .as_deref()
        .ok_or_else(|| AdaptError::missing_options(&["case.mesh_out_filename"]))?;
    info!(
        sensor = %schedule.sensor,
        levels = schedule.levels.len(),
        sub_iterations = schedule.total_sub_iterations(),
        "planned adaptation schedule"
    );

    let grace = Duration::from_secs(config.case.grace_delay_secs);
    let dirs = StageDirs::enter_fresh_root(&loaded.adap_root(), grace)?;
    let mut history = HistoryTable::new(dirs.root(), config.case.tabular_format);

    let boot = bootstrap(loaded, &schedule, &suffix, &dirs, solver, &mut history)
        .context("bootstrap")?;
    let settings = LoopSettings {
        config,
        sensor: schedule.sensor,
        suffix: &suffix,
        background: &boot.background,
    };

    let mut state = boot.state;
    for level in &schedule.levels {
        info!(
            level = level.index + 1,
            of = schedule.levels.len(),
            complexity = level.complexity,
            "size level"
        );
        for k in 0..level.sub_iterations {
            info!(
                iteration = k + 1,
                of = level.sub_iterations,
                stage = %state.next_stage_name(),
                "sub-iteration"
            );
            state = run_sub_iteration(
                &settings,
                level,
                &dirs,
                state,
                solver,
                remesher,
                &mut history,
            )?;
        }
    }

    // Finalized: export and promote the last stage's artifacts.
    let final_bundle = su2::read_bundle(&state.mesh, &state.flow).context("read final state")?;
    interchange::write_bundle(&state.stage_dir().join(FINAL_EXPORT), &final_bundle)?;
    debug!(stage = %state.stage_dir().display(), "exported final state");

    let restart_out = loaded.case_path(&config.case.restart_filename);
    let mesh_out = loaded.case_path(mesh_out_name);
    promote(&state.flow, &restart_out)?;
    promote(&state.mesh, &mesh_out)?;
    info!(
        mesh = %mesh_out.display(),
        solution = %restart_out.display(),
        "adaptation finished"
    );

    Ok(AdaptationOutcome {
        bootstrap: boot.branch,
        stages: state.global_iter,
        final_stage: state.stage_dir,
        mesh_out,
        restart_out,
        history: history.path().to_path_buf(),
        schedule,
    })
}
