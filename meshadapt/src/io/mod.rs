//! I/O helpers for the adaptation driver.

pub mod config;
pub mod history;
pub mod interchange;
pub mod process;
pub mod remesher;
pub mod solver;
pub mod stage;
pub mod su2;
