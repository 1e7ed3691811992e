//! Schedule planning: turns the parsed configuration into index-aligned size
//! levels before anything touches the filesystem.

use crate::core::config::AdaptationConfig;
use crate::core::types::SensorKind;
use crate::error::AdaptError;

/// One size level of the adaptive loop.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeLevel {
    /// Position in the schedule (0-based).
    pub index: usize,
    /// Target complexity handed to the remesher and the metric computation.
    pub complexity: u64,
    /// Remesh/resolve rounds at this complexity.
    pub sub_iterations: u32,
    /// Direct solver iteration budget for this level.
    pub flow_iter: u32,
    /// Adjoint solver iteration budget for this level.
    pub adj_iter: u32,
    pub cfl: f64,
}

/// Validated adaptation schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub sensor: SensorKind,
    pub levels: Vec<SizeLevel>,
}

impl Schedule {
    /// Total sub-iterations across all levels (one stage directory each).
    pub fn total_sub_iterations(&self) -> u32 {
        self.levels.iter().map(|level| level.sub_iterations).sum()
    }

    /// Complexity of the first level, used when bootstrapping the metric.
    pub fn first_complexity(&self) -> Option<u64> {
        self.levels.first().map(|level| level.complexity)
    }
}

/// Derive the schedule from `config`.
///
/// Per-level `flow_iter`, `adj_iter` and `cfl` lists are optional; when absent
/// the solver's base `iter`/`cfl_number` is used for every level. When present
/// they must have one entry per level.
pub fn plan_schedule(config: &AdaptationConfig) -> Result<Schedule, AdaptError> {
    let missing = config.missing_required();
    if !missing.is_empty() {
        return Err(AdaptError::missing_options(&missing));
    }

    let adaptation = &config.adaptation;
    let sensor_name = adaptation.sensor.as_deref().unwrap_or_default();
    let sensor: SensorKind = sensor_name.parse().map_err(AdaptError::Config)?;

    let complexities = adaptation.complexity.as_deref().unwrap_or_default();
    let sub_iterations = adaptation.sub_iterations.as_deref().unwrap_or_default();
    if complexities.len() != sub_iterations.len() {
        return Err(AdaptError::Config(format!(
            "inconsistent number of mesh sizes and sub-iterations: {} mesh sizes and {} sub-iterations provided",
            complexities.len(),
            sub_iterations.len()
        )));
    }
    if complexities.is_empty() {
        return Err(AdaptError::Config(
            "adaptation.complexity must list at least one mesh size".to_string(),
        ));
    }

    let levels = complexities.len();
    let flow_iter = per_level(
        "adaptation.flow_iter",
        adaptation.flow_iter.as_deref(),
        config.solver.iter,
        levels,
    )?;
    let adj_iter = per_level(
        "adaptation.adj_iter",
        adaptation.adj_iter.as_deref(),
        config.solver.iter,
        levels,
    )?;
    let cfl = per_level(
        "adaptation.cfl",
        adaptation.cfl.as_deref(),
        config.solver.cfl_number,
        levels,
    )?;

    check_bounds(config)?;

    let mut planned = Vec::with_capacity(levels);
    for (index, (&size, &subs)) in complexities.iter().zip(sub_iterations).enumerate() {
        if !size.is_finite() || size < 1.0 {
            return Err(AdaptError::Config(format!(
                "adaptation.complexity[{index}] must be >= 1 (got {size})"
            )));
        }
        if cfl[index] <= 0.0 {
            return Err(AdaptError::Config(format!(
                "adaptation.cfl[{index}] must be > 0 (got {})",
                cfl[index]
            )));
        }
        planned.push(SizeLevel {
            index,
            complexity: size as u64,
            sub_iterations: subs,
            flow_iter: flow_iter[index],
            adj_iter: adj_iter[index],
            cfl: cfl[index],
        });
    }

    Ok(Schedule {
        sensor,
        levels: planned,
    })
}

fn per_level<T: Copy>(
    name: &str,
    values: Option<&[T]>,
    fallback: T,
    levels: usize,
) -> Result<Vec<T>, AdaptError> {
    match values {
        None => Ok(vec![fallback; levels]),
        Some(values) if values.len() == levels => Ok(values.to_vec()),
        Some(values) => Err(AdaptError::Config(format!(
            "{name} has {} entries but {levels} size levels are scheduled",
            values.len()
        ))),
    }
}

fn check_bounds(config: &AdaptationConfig) -> Result<(), AdaptError> {
    let adaptation = &config.adaptation;
    if adaptation.hmin.is_nan() || adaptation.hmin <= 0.0 {
        return Err(AdaptError::Config(format!(
            "adaptation.hmin must be > 0 (got {})",
            adaptation.hmin
        )));
    }
    if adaptation.hmax <= adaptation.hmin {
        return Err(AdaptError::Config(format!(
            "adaptation.hmax ({}) must exceed adaptation.hmin ({})",
            adaptation.hmax, adaptation.hmin
        )));
    }
    if let Some(hgrad) = adaptation.hgrad
        && hgrad < 1.0
    {
        return Err(AdaptError::Config(format!(
            "adaptation.hgrad must be >= 1 (got {hgrad})"
        )));
    }
    if adaptation.norm <= 0.0 {
        return Err(AdaptError::Config(format!(
            "adaptation.norm must be > 0 (got {})",
            adaptation.norm
        )));
    }
    Ok(())
}
