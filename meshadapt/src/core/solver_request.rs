//! Immutable solver requests.
//!
//! A request is built fresh for every invocation from the stable configuration
//! plus a mode, so nothing carries over from one call to the next.

use crate::core::suffix::add_suffix;
use crate::core::types::SolverMode;

const DIRECT_VOLUME_OUTPUT: &str = "(COORDINATES, SOLUTION, PRIMITIVE)";
const ADJOINT_VOLUME_OUTPUT: &str = "(COORDINATES, SOLUTION, PRIMITIVE, METRIC)";
const DIRECT_HISTORY_OUTPUT: &str = "(ITER, RMS_RES, AERO_COEFF, FLOW_COEFF)";
const ADJOINT_HISTORY_OUTPUT: &str = "(ITER, RMS_RES, SENSITIVITY)";

/// Metric computation settings for adjoint runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricTarget {
    pub hmin: f64,
    pub hmax: f64,
    pub complexity: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverRequest {
    pub mode: SolverMode,
    pub mesh_filename: String,
    /// History file stem (`history` or `history_adj`).
    pub conv_filename: String,
    /// Start from `solution_filename` instead of freestream.
    pub restart_sol: bool,
    /// Flow input: initial guess (direct) or primal state (adjoint).
    pub solution_filename: Option<String>,
    /// Adjoint initial guess, without objective suffix.
    pub solution_adj_filename: Option<String>,
    pub restart_filename: String,
    /// Adjoint output, without objective suffix.
    pub restart_adj_filename: Option<String>,
    pub iterations: u32,
    pub cfl: Option<f64>,
    pub metric: Option<MetricTarget>,
}

impl SolverRequest {
    /// Direct solve from freestream writing `restart`.
    pub fn direct(mesh: &str, restart: &str, iterations: u32) -> Self {
        Self {
            mode: SolverMode::Direct,
            mesh_filename: mesh.to_string(),
            conv_filename: "history".to_string(),
            restart_sol: false,
            solution_filename: None,
            solution_adj_filename: None,
            restart_filename: restart.to_string(),
            restart_adj_filename: None,
            iterations,
            cfl: None,
            metric: None,
        }
    }

    /// Discrete adjoint solve on the primal state `flow`, computing the metric.
    pub fn adjoint(
        mesh: &str,
        flow: &str,
        restart_adj: &str,
        iterations: u32,
        metric: MetricTarget,
    ) -> Self {
        Self {
            mode: SolverMode::DiscreteAdjoint,
            mesh_filename: mesh.to_string(),
            conv_filename: "history_adj".to_string(),
            restart_sol: false,
            solution_filename: Some(flow.to_string()),
            solution_adj_filename: None,
            restart_filename: flow.to_string(),
            restart_adj_filename: Some(restart_adj.to_string()),
            iterations,
            cfl: None,
            metric: Some(metric),
        }
    }

    /// Direct solve restarted from `solution`.
    pub fn restarted_from(mut self, solution: &str) -> Self {
        self.restart_sol = true;
        self.solution_filename = Some(solution.to_string());
        self
    }

    /// Adjoint solve restarted from `solution_adj` (unsuffixed name).
    pub fn adjoint_restarted_from(mut self, solution_adj: &str) -> Self {
        self.restart_sol = true;
        self.solution_adj_filename = Some(solution_adj.to_string());
        self
    }

    pub fn with_cfl(mut self, cfl: f64) -> Self {
        self.cfl = Some(cfl);
        self
    }

    /// Restart file the solver is expected to write.
    pub fn expected_restart(&self, suffix: &str) -> String {
        match (self.mode, &self.restart_adj_filename) {
            (SolverMode::DiscreteAdjoint, Some(adj)) => add_suffix(adj, suffix),
            _ => self.restart_filename.clone(),
        }
    }

    /// Options this request sets, in a stable order.
    pub fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![
            ("MATH_PROBLEM", self.mode.as_str().to_string()),
            ("MESH_FILENAME", self.mesh_filename.clone()),
            ("CONV_FILENAME", self.conv_filename.clone()),
            ("RESTART_SOL", yes_no(self.restart_sol)),
            ("RESTART_FILENAME", self.restart_filename.clone()),
            ("ITER", self.iterations.to_string()),
            ("WRT_BINARY_RESTART", yes_no(false)),
            ("READ_BINARY_RESTART", yes_no(false)),
        ];
        if let Some(solution) = &self.solution_filename {
            out.push(("SOLUTION_FILENAME", solution.clone()));
        }
        if let Some(solution_adj) = &self.solution_adj_filename {
            out.push(("SOLUTION_ADJ_FILENAME", solution_adj.clone()));
        }
        if let Some(restart_adj) = &self.restart_adj_filename {
            out.push(("RESTART_ADJ_FILENAME", restart_adj.clone()));
        }
        if let Some(cfl) = self.cfl {
            out.push(("CFL_NUMBER", cfl.to_string()));
        }
        match self.mode {
            SolverMode::Direct => {
                out.push(("VOLUME_OUTPUT", DIRECT_VOLUME_OUTPUT.to_string()));
                out.push(("HISTORY_OUTPUT", DIRECT_HISTORY_OUTPUT.to_string()));
            }
            SolverMode::DiscreteAdjoint => {
                out.push(("VOLUME_OUTPUT", ADJOINT_VOLUME_OUTPUT.to_string()));
                out.push(("HISTORY_OUTPUT", ADJOINT_HISTORY_OUTPUT.to_string()));
            }
        }
        out.push(("COMPUTE_METRIC", yes_no(self.metric.is_some())));
        if let Some(metric) = self.metric {
            out.push(("ADAP_HMIN", metric.hmin.to_string()));
            out.push(("ADAP_HMAX", metric.hmax.to_string()));
            out.push(("ADAP_COMPLEXITY", metric.complexity.to_string()));
        }
        out
    }
}

fn yes_no(flag: bool) -> String {
    let value = if flag { "YES" } else { "NO" };
    value.to_string()
}
