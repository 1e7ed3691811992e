//! Failure taxonomy for the adaptive loop.
//!
//! Every variant is fatal. Orchestration code raises them inside
//! `anyhow::Error`; the CLI recovers them with `downcast_ref` to pick an exit
//! code.

use thiserror::Error;

use crate::exit_codes;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdaptError {
    /// Missing or contradictory options, reported before any external call.
    #[error("configuration error: {0}")]
    Config(String),
    /// Expected mesh/solution files are absent.
    #[error("missing artifact(s):\n- {}", .0.join("\n- "))]
    MissingArtifact(Vec<String>),
    /// The remesher failed or produced a degenerate mesh.
    #[error("remesh failed: {0}")]
    Remesh(String),
    /// The solver failed or did not produce its declared restart.
    #[error("solver failure: {0}")]
    SolverFailure(String),
    /// Mesh and fields do not agree (sizes, dimension, field names).
    #[error("bundle consistency error: {0}")]
    BundleConsistency(String),
}

impl AdaptError {
    /// Build a configuration error naming every missing option.
    pub fn missing_options<S: AsRef<str>>(options: &[S]) -> Self {
        let names: Vec<&str> = options.iter().map(AsRef::as_ref).collect();
        AdaptError::Config(format!("missing options: {}", names.join(", ")))
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            AdaptError::Config(_) => exit_codes::CONFIG,
            AdaptError::MissingArtifact(_) => exit_codes::MISSING_ARTIFACT,
            AdaptError::Remesh(_) => exit_codes::REMESH,
            AdaptError::SolverFailure(_) => exit_codes::SOLVER,
            AdaptError::BundleConsistency(_) => exit_codes::FAILED,
        }
    }
}

/// Map any error to a process exit code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<AdaptError>()
        .map(AdaptError::exit_code)
        .unwrap_or(exit_codes::FAILED)
}
