//! Deterministic, pure logic shared by the adaptation driver.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod bundle;
pub mod config;
pub mod remesh;
pub mod schedule;
pub mod sensor;
pub mod solver_request;
pub mod state;
pub mod suffix;
pub mod types;
