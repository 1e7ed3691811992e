//! Anisotropic mesh-adaptation loop driver.
//!
//! This crate alternates an external flow/adjoint solver with an external
//! remesher, refining a mesh toward a scheduled target complexity while the
//! numerical state is carried across stages. The architecture keeps a strict
//! separation:
//!
//! - **[`core`]**: Pure logic (schedule planning, bundles, sensors, solver
//!   requests). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (stage directories, codecs,
//!   process execution, history tables). External tools sit behind the
//!   [`io::solver::Solver`] and [`io::remesher::Remesher`] traits.
//!
//! Orchestration modules ([`bootstrap`], [`step`], [`looping`]) coordinate
//! core logic with I/O to implement the adaptive loop.

pub mod bootstrap;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
