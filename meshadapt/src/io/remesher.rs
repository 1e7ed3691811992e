//! Remesher invocation.
//!
//! The remesher consumes and produces interchange bundles. Its console output
//! goes to `amg.out` / `amg.err` in the working directory.

use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::bundle::MeshSolutionBundle;
use crate::core::config::AdaptationConfig;
use crate::core::remesh::RemeshRequest;
use crate::error::AdaptError;
use crate::io::interchange;
use crate::io::process::{LogSink, run_logged};

pub const REMESHER_STDOUT: &str = "amg.out";
pub const REMESHER_STDERR: &str = "amg.err";
const INPUT_NAME: &str = "amg_in.json";
const OUTPUT_NAME: &str = "amg_out.json";

/// Abstraction over remeshing backends.
pub trait Remesher {
    /// Produce an adapted bundle from `bundle` (which carries its sensor or metric).
    fn remesh(
        &self,
        bundle: MeshSolutionBundle,
        request: &RemeshRequest,
        workdir: &Path,
    ) -> Result<MeshSolutionBundle>;
}

/// Remesher driven through an external command and JSON files.
#[derive(Debug, Clone)]
pub struct AmgRemesher {
    command: Vec<String>,
}

impl AmgRemesher {
    pub fn new(command: Vec<String>) -> Result<Self, AdaptError> {
        if command.is_empty() {
            return Err(AdaptError::Config("remesher.command is empty".to_string()));
        }
        Ok(Self { command })
    }

    pub fn from_config(config: &AdaptationConfig) -> Result<Self, AdaptError> {
        Self::new(config.remesher.command.clone())
    }
}

impl Remesher for AmgRemesher {
    #[instrument(skip_all, fields(complexity = request.complexity))]
    fn remesh(
        &self,
        bundle: MeshSolutionBundle,
        request: &RemeshRequest,
        workdir: &Path,
    ) -> Result<MeshSolutionBundle> {
        let input = workdir.join(INPUT_NAME);
        let output = workdir.join(OUTPUT_NAME);
        interchange::write_bundle(&input, &bundle)?;
        drop(bundle);
        if output.exists() {
            fs::remove_file(&output)
                .with_context(|| format!("remove stale {}", output.display()))?;
        }

        let mut sink = LogSink::open(workdir, REMESHER_STDOUT, REMESHER_STDERR)?;
        sink.banner(&format!("remesh to complexity {}", request.complexity))?;
        let (program, leading) = self
            .command
            .split_first()
            .context("remesher command is empty")?;
        let mut cmd = Command::new(program);
        cmd.args(leading)
            .args(request.args(&input, &output))
            .current_dir(workdir);
        info!(workdir = %workdir.display(), "running remesher");
        let status = run_logged(cmd, &mut sink)?;

        if !status.success() {
            warn!(exit_code = ?status.code(), "remesher failed");
            return Err(AdaptError::Remesh(format!(
                "remesher exited with status {:?} (see {})",
                status.code(),
                sink.err_path().display()
            ))
            .into());
        }
        if !output.is_file() {
            return Err(AdaptError::Remesh(format!(
                "remesher did not write {}",
                output.display()
            ))
            .into());
        }
        interchange::read_bundle(&output)
            .map_err(|err| AdaptError::Remesh(format!("unreadable remesher output: {err:#}")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bundle::{Element, ElementKind, Field};
    use crate::core::config::AdaptationOptions;
    use crate::core::remesh::BackgroundOptions;

    fn bundle() -> MeshSolutionBundle {
        let mut bundle = MeshSolutionBundle::mesh_only(
            2,
            vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            vec![Element::new(ElementKind::Triangle, vec![0, 1, 2])],
            Vec::new(),
        );
        bundle.solution = Field::new(vec!["Mach".into()], vec![0.1, 0.2, 0.3]);
        bundle
    }

    fn request() -> RemeshRequest {
        let options = AdaptationOptions::default();
        let background = BackgroundOptions::new(Path::new("back.json"), &options);
        RemeshRequest::new(&options, &background, 500)
    }

    fn shell(script: &str) -> AmgRemesher {
        // Appended arguments become $1.. after the "amg" placeholder for $0.
        AmgRemesher::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            "amg".to_string(),
        ])
        .expect("remesher")
    }

    #[cfg(unix)]
    #[test]
    fn copies_through_external_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let remesher = shell("cp \"$2\" \"$4\"");
        let adapted = remesher
            .remesh(bundle(), &request(), temp.path())
            .expect("remesh");
        assert_eq!(adapted, bundle());
        assert!(temp.path().join(REMESHER_STDOUT).is_file());
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_a_remesh_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let remesher = shell("echo 'metric not positive' >&2; exit 1");
        let err = remesher
            .remesh(bundle(), &request(), temp.path())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AdaptError>(),
            Some(AdaptError::Remesh(_))
        ));
        let log = fs::read_to_string(temp.path().join(REMESHER_STDERR)).expect("log");
        assert!(log.contains("metric not positive"));
    }

    #[cfg(unix)]
    #[test]
    fn missing_output_is_a_remesh_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = shell("true")
            .remesh(bundle(), &request(), temp.path())
            .unwrap_err();
        assert!(err.to_string().contains("did not write"));
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(matches!(
            AmgRemesher::new(Vec::new()),
            Err(AdaptError::Config(_))
        ));
    }
}
