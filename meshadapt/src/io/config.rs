//! Adaptation configuration stored as TOML next to the case files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::config::AdaptationConfig;
use crate::error::AdaptError;

/// A parsed configuration and the directory its relative paths refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub config: AdaptationConfig,
    /// Directory containing the config file; inputs are read from and final
    /// results promoted to this directory.
    pub case_dir: PathBuf,
}

impl LoadedConfig {
    pub fn new(config: AdaptationConfig, case_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            case_dir: case_dir.into(),
        }
    }

    /// Resolve `name` against the case directory.
    pub fn case_path(&self, name: &str) -> PathBuf {
        self.case_dir.join(name)
    }

    /// Root of the stage directory tree.
    pub fn adap_root(&self) -> PathBuf {
        self.case_path(&self.config.case.adap_dir)
    }
}

/// Load config from a TOML file.
///
/// Unlike optional runtime settings, the adaptation config must exist: a
/// missing or unparsable file is a configuration error.
pub fn load_config(path: &Path) -> Result<LoadedConfig> {
    debug!(path = %path.display(), "loading adaptation config");
    if !path.is_file() {
        return Err(AdaptError::Config(format!("config file {} not found", path.display())).into());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let config: AdaptationConfig = toml::from_str(&contents)
        .map_err(|err| AdaptError::Config(format!("parse {}: {err}", path.display())))?;
    let case_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let case_dir = fs::canonicalize(&case_dir)
        .with_context(|| format!("resolve case directory {}", case_dir.display()))?;
    Ok(LoadedConfig::new(config, case_dir))
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AdaptationConfig) -> Result<()> {
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_a_config_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_config(&temp.path().join("missing.toml")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AdaptError>(),
            Some(AdaptError::Config(_))
        ));
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("adap.toml");
        fs::write(&path, "[case]\ntabular_format = \"XML\"\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AdaptError>(),
            Some(AdaptError::Config(_))
        ));
    }

    #[test]
    fn write_then_load_round_trips_and_resolves_case_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("adap.toml");
        let mut cfg = AdaptationConfig::default();
        cfg.case.mesh_filename = Some("mesh.su2".to_string());
        cfg.adaptation.complexity = Some(vec![1000.0, 2000.0]);
        cfg.solver
            .options
            .insert("MACH_NUMBER".to_string(), "0.8".to_string());

        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded.config, cfg);

        let case_dir = fs::canonicalize(temp.path()).expect("canonicalize");
        assert_eq!(loaded.case_dir, case_dir);
        assert_eq!(loaded.case_path("mesh.su2"), case_dir.join("mesh.su2"));
        assert_eq!(loaded.adap_root(), case_dir.join("adap"));
    }
}
