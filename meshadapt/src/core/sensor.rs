//! Sensor and metric construction.
//!
//! Feature sensors are copied out of the flow solution. The goal-oriented
//! metric comes from the adjoint restart (the adjoint run is asked to compute
//! it); the rest of the adjoint state is merged into the bundle so the
//! remesher interpolates it alongside the flow.

use crate::core::bundle::{ADJOINT_KEY, Field, METRIC_KEY, MeshSolutionBundle, SENSOR_KEY};
use crate::core::types::SensorKind;
use crate::error::AdaptError;

const METRIC_2D: [&str; 3] = ["Metric_xx", "Metric_xy", "Metric_yy"];
const METRIC_3D: [&str; 6] = [
    "Metric_xx",
    "Metric_xy",
    "Metric_xz",
    "Metric_yy",
    "Metric_yz",
    "Metric_zz",
];

/// Solution columns a feature sensor reads.
pub fn feature_columns(kind: SensorKind) -> &'static [&'static str] {
    match kind {
        SensorKind::Mach => &["Mach"],
        SensorKind::Pres => &["Pressure"],
        SensorKind::MachPres => &["Mach", "Pressure"],
        SensorKind::Goal => &[],
    }
}

/// Metric tensor components for `dimension`, upper triangle row by row.
pub fn metric_columns(dimension: usize) -> &'static [&'static str] {
    if dimension == 3 { &METRIC_3D } else { &METRIC_2D }
}

/// Attach the field driving adaptation.
///
/// `adjoint` must be `Some` exactly when `kind` is [`SensorKind::Goal`].
pub fn attach_driver(
    bundle: &mut MeshSolutionBundle,
    kind: SensorKind,
    adjoint: Option<Field>,
) -> Result<(), AdaptError> {
    match (kind, adjoint) {
        (SensorKind::Goal, Some(adjoint)) => attach_goal_metric(bundle, adjoint),
        (SensorKind::Goal, None) => Err(AdaptError::BundleConsistency(
            "goal-oriented sensing requires an adjoint solution".to_string(),
        )),
        (kind, None) => attach_feature_sensor(bundle, kind),
        (kind, Some(_)) => Err(AdaptError::BundleConsistency(format!(
            "{kind} sensor does not use an adjoint solution"
        ))),
    }
}

/// Copy the sensor columns for `kind` from the flow solution.
pub fn attach_feature_sensor(
    bundle: &mut MeshSolutionBundle,
    kind: SensorKind,
) -> Result<(), AdaptError> {
    let sensor = bundle.solution.select(feature_columns(kind))?;
    bundle.insert_field(SENSOR_KEY, sensor)
}

/// Move the metric out of `adjoint` and merge the remaining adjoint state.
pub fn attach_goal_metric(
    bundle: &mut MeshSolutionBundle,
    adjoint: Field,
) -> Result<(), AdaptError> {
    let (metric, state) = adjoint.partition(metric_columns(bundle.dimension))?;
    bundle.insert_field(METRIC_KEY, metric)?;
    bundle.insert_field(ADJOINT_KEY, state)
}

/// Remove sensor/metric fields from a remeshed bundle; they are not staged.
pub fn strip_drivers(bundle: &mut MeshSolutionBundle) {
    bundle.take_field(SENSOR_KEY);
    bundle.take_field(METRIC_KEY);
}

/// Split the interpolated adjoint state off a remeshed bundle.
pub fn split_adjoint(bundle: &mut MeshSolutionBundle) -> Result<Field, AdaptError> {
    bundle.take_field(ADJOINT_KEY).ok_or_else(|| {
        AdaptError::BundleConsistency("remeshed bundle carries no adjoint state".to_string())
    })
}
