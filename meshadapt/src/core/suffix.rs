//! Objective-dependent suffixes of adjoint restart files.

use crate::error::AdaptError;

/// Maps an objective function name to the suffix the solver appends to
/// adjoint file names.
pub trait SuffixLookup {
    fn suffix(&self, objective: &str) -> Option<String>;
}

/// The solver's standard objective table.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardSuffixes;

const STANDARD: &[(&str, &str)] = &[
    ("DRAG", "cd"),
    ("LIFT", "cl"),
    ("SIDEFORCE", "csf"),
    ("MOMENT_X", "cmx"),
    ("MOMENT_Y", "cmy"),
    ("MOMENT_Z", "cmz"),
    ("EFFICIENCY", "eff"),
    ("FORCE_X", "cfx"),
    ("FORCE_Y", "cfy"),
    ("FORCE_Z", "cfz"),
    ("THRUST", "ct"),
    ("TORQUE", "cq"),
    ("FIGURE_OF_MERIT", "merit"),
    ("BUFFET", "buffet"),
    ("EQUIVALENT_AREA", "ea"),
    ("NEARFIELD_PRESSURE", "nfp"),
    ("INVERSE_DESIGN_PRESSURE", "invpress"),
    ("INVERSE_DESIGN_HEATFLUX", "invheat"),
    ("TOTAL_HEATFLUX", "totheat"),
    ("MAXIMUM_HEATFLUX", "maxheat"),
    ("SURFACE_TOTAL_PRESSURE", "pt"),
    ("SURFACE_STATIC_PRESSURE", "pe"),
    ("SURFACE_MASSFLOW", "mfr"),
    ("SURFACE_MACH", "mach"),
    ("CUSTOM_OBJFUNC", "custom"),
    ("COMBO", "combo"),
];

impl SuffixLookup for StandardSuffixes {
    fn suffix(&self, objective: &str) -> Option<String> {
        let wanted = objective.trim().to_ascii_uppercase();
        STANDARD
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, suffix)| (*suffix).to_string())
    }
}

/// Resolve the adjoint suffix, preferring an explicit override.
pub fn resolve_suffix<L: SuffixLookup>(
    lookup: &L,
    objective: &str,
    override_suffix: Option<&str>,
) -> Result<String, AdaptError> {
    if let Some(suffix) = override_suffix {
        return Ok(suffix.to_string());
    }
    lookup.suffix(objective).ok_or_else(|| {
        AdaptError::Config(format!(
            "no adjoint suffix known for objective '{objective}' (set case.adjoint_suffix)"
        ))
    })
}

/// Insert `_suffix` before the extension: `restart_adj.csv` -> `restart_adj_cd.csv`.
pub fn add_suffix(filename: &str, suffix: &str) -> String {
    match filename.rfind('.') {
        Some(dot) if dot > 0 => format!("{}_{}{}", &filename[..dot], suffix, &filename[dot..]),
        _ => format!("{filename}_{suffix}"),
    }
}
