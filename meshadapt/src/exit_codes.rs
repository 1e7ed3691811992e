//! Stable exit codes for the `meshadapt` CLI.

/// Adaptation finished and results were promoted.
pub const OK: i32 = 0;
/// Configuration was missing options or contradictory.
pub const CONFIG: i32 = 1;
/// An expected mesh or solution file was absent.
pub const MISSING_ARTIFACT: i32 = 2;
/// The remesher failed or returned a degenerate mesh.
pub const REMESH: i32 = 3;
/// The solver failed or did not write its restart.
pub const SOLVER: i32 = 4;
/// Any other failure (I/O, bundle consistency).
pub const FAILED: i32 = 5;
