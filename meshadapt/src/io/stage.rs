//! Stage directory management for the adaptation root.
//!
//! Layout: `<root>/ini/` for bootstrap, then `<root>/ite0/`, `<root>/ite1/`, …
//! one per completed sub-iteration. All paths are absolute so an interrupted
//! run leaves an inspectable tree and nothing depends on the process working
//! directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::error::AdaptError;

/// Name of the bootstrap stage.
pub const INI_STAGE: &str = "ini";

/// Handle on an adaptation root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDirs {
    root: PathBuf,
}

impl StageDirs {
    /// Wipe `path` (after `grace`, if non-zero) and recreate it empty.
    pub fn enter_fresh_root(path: &Path, grace: Duration) -> Result<Self> {
        if path.exists() || path.is_symlink() {
            if !grace.is_zero() {
                warn!(
                    root = %path.display(),
                    grace_secs = grace.as_secs(),
                    "adaptation root exists; removing previous run after grace delay"
                );
                thread::sleep(grace);
            }
            remove_path(path)?;
            info!(root = %path.display(), "removed previous adaptation root");
        }
        fs::create_dir_all(path)
            .with_context(|| format!("create adaptation root {}", path.display()))?;
        let root = fs::canonicalize(path)
            .with_context(|| format!("resolve adaptation root {}", path.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stage_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Create a new stage directory. Existing names are never reused.
    pub fn enter_sub_stage(&self, name: &str) -> Result<PathBuf> {
        let dir = self.stage_path(name);
        match fs::create_dir(&dir) {
            Ok(()) => {
                debug!(stage = %dir.display(), "entered stage");
                Ok(dir)
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(anyhow!(
                "stage directory {} already exists (stage names are never reused)",
                dir.display()
            )),
            Err(err) => Err(err).with_context(|| format!("create stage {}", dir.display())),
        }
    }
}

/// Reference `source` from `stage_dir/dest_name` without copying it.
///
/// Uses a symbolic link where the platform supports it. If the destination
/// already exists (e.g. the background mesh is the initial mesh) it is kept.
pub fn link_external(stage_dir: &Path, source: &Path, dest_name: &str) -> Result<PathBuf> {
    if !source.is_file() {
        return Err(AdaptError::MissingArtifact(vec![source.display().to_string()]).into());
    }
    let dest = stage_dir.join(dest_name);
    if dest.exists() || dest.is_symlink() {
        debug!(dest = %dest.display(), "link target already present");
        return Ok(dest);
    }
    let source = fs::canonicalize(source)
        .with_context(|| format!("resolve {}", source.display()))?;
    make_link(&source, &dest)
        .with_context(|| format!("link {} -> {}", dest.display(), source.display()))?;
    debug!(source = %source.display(), dest = %dest.display(), "linked external artifact");
    Ok(dest)
}

/// Rename a file inside a stage directory.
pub fn rename_local(stage_dir: &Path, from: &str, to: &str) -> Result<PathBuf> {
    let src = stage_dir.join(from);
    let dst = stage_dir.join(to);
    fs::rename(&src, &dst)
        .with_context(|| format!("rename {} -> {}", src.display(), dst.display()))?;
    Ok(dst)
}

/// Move a finished artifact out of the stage tree to a caller-visible path.
pub fn promote(local: &Path, external: &Path) -> Result<()> {
    if !local.exists() {
        return Err(AdaptError::MissingArtifact(vec![local.display().to_string()]).into());
    }
    if let Some(parent) = external.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let is_link = fs::symlink_metadata(local)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false);
    // Linked inputs are materialized; cross-device moves fall back to copy + remove.
    if is_link || fs::rename(local, external).is_err() {
        fs::copy(local, external)
            .with_context(|| format!("copy {} -> {}", local.display(), external.display()))?;
        fs::remove_file(local).with_context(|| format!("remove {}", local.display()))?;
    }
    info!(from = %local.display(), to = %external.display(), "promoted artifact");
    Ok(())
}

fn remove_path(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path).with_context(|| format!("stat {}", path.display()))?;
    if meta.is_dir() {
        fs::remove_dir_all(path).with_context(|| format!("remove directory {}", path.display()))
    } else {
        fs::remove_file(path).with_context(|| format!("remove file {}", path.display()))
    }
}

#[cfg(unix)]
fn make_link(source: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, dest)
}

#[cfg(not(unix))]
fn make_link(source: &Path, dest: &Path) -> std::io::Result<()> {
    fs::copy(source, dest).map(|_| ())
}
