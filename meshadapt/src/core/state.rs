//! Loop state threaded through the adaptation cycle.

use std::fmt;
use std::path::{Path, PathBuf};

/// Phases of one sub-iteration, used to name the failing phase in errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Sensing,
    Remeshing,
    Staging,
    Resolving,
    HistoryRecording,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Sensing => "sensing",
            Phase::Remeshing => "remeshing",
            Phase::Staging => "staging",
            Phase::Resolving => "resolving",
            Phase::HistoryRecording => "history recording",
        };
        f.write_str(name)
    }
}

/// Current mesh/solution artifacts and the stage that holds them.
///
/// Fields are replaced as a whole when a sub-iteration completes; the state is
/// never partially updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageState {
    /// Directory of the stage owning the current artifacts.
    pub stage_dir: PathBuf,
    pub mesh: PathBuf,
    pub flow: PathBuf,
    /// Adjoint restart (goal-oriented mode only).
    pub adjoint: Option<PathBuf>,
    /// Index of the next stage directory (`ite{global_iter}`).
    pub global_iter: u32,
}

impl StageState {
    /// State right after bootstrap, pointing into `ini/`.
    pub fn bootstrapped(
        stage_dir: impl Into<PathBuf>,
        mesh: PathBuf,
        flow: PathBuf,
        adjoint: Option<PathBuf>,
    ) -> Self {
        Self {
            stage_dir: stage_dir.into(),
            mesh,
            flow,
            adjoint,
            global_iter: 0,
        }
    }

    /// Name of the next stage directory.
    pub fn next_stage_name(&self) -> String {
        stage_name(self.global_iter)
    }

    /// Replace the artifacts with those of a completed stage and bump the counter.
    pub fn advance(
        self,
        stage_dir: PathBuf,
        mesh: PathBuf,
        flow: PathBuf,
        adjoint: Option<PathBuf>,
    ) -> Self {
        Self {
            stage_dir,
            mesh,
            flow,
            adjoint,
            global_iter: self.global_iter + 1,
        }
    }

    pub fn stage_dir(&self) -> &Path {
        &self.stage_dir
    }
}

/// Stage directory name for `global_iter`.
pub fn stage_name(global_iter: u32) -> String {
    format!("ite{global_iter}")
}
