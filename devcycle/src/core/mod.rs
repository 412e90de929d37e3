//! Deterministic, pure logic for the dev cycle.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod feedback;
pub mod types;
