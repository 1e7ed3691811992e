//! Shared enums for adaptation configuration and solver requests.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Field that drives the remesher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    /// Mach number of the flow solution.
    Mach,
    /// Static pressure of the flow solution.
    Pres,
    /// Mach number and pressure, stacked.
    MachPres,
    /// Goal-oriented metric computed by the discrete adjoint run.
    Goal,
}

impl SensorKind {
    pub const ALL: [SensorKind; 4] = [
        SensorKind::Mach,
        SensorKind::Pres,
        SensorKind::MachPres,
        SensorKind::Goal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SensorKind::Mach => "MACH",
            SensorKind::Pres => "PRES",
            SensorKind::MachPres => "MACH_PRES",
            SensorKind::Goal => "GOAL",
        }
    }

    pub fn is_goal(self) -> bool {
        self == SensorKind::Goal
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        SensorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = SensorKind::ALL.iter().map(|k| k.as_str()).collect();
                format!(
                    "unknown adaptation sensor '{}' (expected one of {})",
                    s.trim(),
                    names.join(", ")
                )
            })
    }
}

/// Operating mode of the external solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolverMode {
    Direct,
    DiscreteAdjoint,
}

impl SolverMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SolverMode::Direct => "DIRECT",
            SolverMode::DiscreteAdjoint => "DISCRETE_ADJOINT",
        }
    }
}

impl fmt::Display for SolverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layout of tabular history files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TabularFormat {
    #[default]
    Csv,
    Tecplot,
}

impl TabularFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            TabularFormat::Csv => "CSV",
            TabularFormat::Tecplot => "TECPLOT",
        }
    }

    /// Extension the solver uses for history files in this format.
    pub fn extension(self) -> &'static str {
        match self {
            TabularFormat::Csv => "csv",
            TabularFormat::Tecplot => "dat",
        }
    }
}
