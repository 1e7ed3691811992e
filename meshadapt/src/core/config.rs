//! Adaptation configuration record.
//!
//! The record is parsed once (see `io::config`) and never mutated afterwards.
//! Required options are `Option`s here so that every missing key can be
//! reported in a single error instead of failing on the first one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::TabularFormat;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdaptationConfig {
    pub case: CaseConfig,
    pub solver: SolverConfig,
    pub adaptation: AdaptationOptions,
    pub remesher: RemesherConfig,
}

/// Case files and restart policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaseConfig {
    /// Initial mesh, relative to the case directory.
    pub mesh_filename: Option<String>,
    /// Name of the promoted final mesh.
    pub mesh_out_filename: Option<String>,
    /// Name of the promoted final flow solution.
    pub restart_filename: String,
    /// Reuse a provided flow solution instead of solving from scratch.
    pub restart_sol: Option<bool>,
    /// Provided flow solution (warm start).
    pub solution_filename: Option<String>,
    /// Provided adjoint solution, without objective suffix (warm start, goal mode).
    pub solution_adj_filename: Option<String>,
    pub objective_function: String,
    /// Overrides the objective-to-suffix lookup.
    pub adjoint_suffix: Option<String>,
    pub tabular_format: TabularFormat,
    /// Adaptation root, relative to the case directory.
    pub adap_dir: String,
    /// Wait this long before wiping an existing adaptation root.
    pub grace_delay_secs: u64,
}

impl Default for CaseConfig {
    fn default() -> Self {
        Self {
            mesh_filename: None,
            mesh_out_filename: None,
            restart_filename: "restart_flow.csv".to_string(),
            restart_sol: None,
            solution_filename: None,
            solution_adj_filename: None,
            objective_function: "DRAG".to_string(),
            adjoint_suffix: None,
            tabular_format: TabularFormat::Csv,
            adap_dir: "adap".to_string(),
            grace_delay_secs: 0,
        }
    }
}

/// External solver invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverConfig {
    /// Program and leading arguments; the generated config path is appended.
    pub command: Vec<String>,
    /// Base iteration budget (bootstrap solves, default per-level budgets).
    pub iter: u32,
    /// Base CFL number (default per-level CFL).
    pub cfl_number: f64,
    /// Passthrough solver options written verbatim into every request.
    pub options: BTreeMap<String, String>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            command: vec!["SU2_CFD".to_string()],
            iter: 1000,
            cfl_number: 1.25,
            options: BTreeMap::new(),
        }
    }
}

/// Adaptation schedule and remesher sizing options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdaptationOptions {
    /// Target complexity per size level.
    pub complexity: Option<Vec<f64>>,
    /// Sub-iterations per size level, index-aligned with `complexity`.
    pub sub_iterations: Option<Vec<u32>>,
    pub sensor: Option<String>,
    pub flow_iter: Option<Vec<u32>>,
    pub adj_iter: Option<Vec<u32>>,
    pub cfl: Option<Vec<f64>>,
    pub hmin: f64,
    pub hmax: f64,
    pub hgrad: Option<f64>,
    /// Lp norm used to build the metric.
    pub norm: f64,
    /// Background surface mesh, relative to the case directory.
    pub back_mesh: Option<String>,
    pub invert_back: bool,
    /// Restrict adaptation to axis-aligned directions.
    pub ortho: bool,
    pub ridge_detection: bool,
    /// Reserved; parsed but not applied to solver budgets.
    pub residual_reduction: Option<Vec<f64>>,
}

impl Default for AdaptationOptions {
    fn default() -> Self {
        Self {
            complexity: None,
            sub_iterations: None,
            sensor: None,
            flow_iter: None,
            adj_iter: None,
            cfl: None,
            hmin: 1e-8,
            hmax: 1e8,
            hgrad: None,
            norm: 2.0,
            back_mesh: None,
            invert_back: false,
            ortho: false,
            ridge_detection: false,
            residual_reduction: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RemesherConfig {
    /// Program and leading arguments for the remesher.
    pub command: Vec<String>,
}

impl Default for RemesherConfig {
    fn default() -> Self {
        Self {
            command: vec!["amg".to_string()],
        }
    }
}

impl AdaptationConfig {
    /// Names of required options that are absent, in declaration order.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.adaptation.complexity.is_none() {
            missing.push("adaptation.complexity");
        }
        if self.adaptation.sub_iterations.is_none() {
            missing.push("adaptation.sub_iterations");
        }
        if self.adaptation.sensor.is_none() {
            missing.push("adaptation.sensor");
        }
        if self.case.mesh_filename.is_none() {
            missing.push("case.mesh_filename");
        }
        if self.case.restart_sol.is_none() {
            missing.push("case.restart_sol");
        }
        if self.case.mesh_out_filename.is_none() {
            missing.push("case.mesh_out_filename");
        }
        missing
    }

    /// Names of warm-start inputs that are absent.
    pub fn missing_warm_start(&self, goal: bool) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.case.solution_filename.is_none() {
            missing.push("case.solution_filename");
        }
        if goal && self.case.solution_adj_filename.is_none() {
            missing.push("case.solution_adj_filename");
        }
        missing
    }

    pub fn restart_sol(&self) -> bool {
        self.case.restart_sol.unwrap_or(false)
    }
}
