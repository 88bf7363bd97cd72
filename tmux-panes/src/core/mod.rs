//! Deterministic, pure logic shared by the pane controller.
//!
//! Core modules must be free of I/O side effects. They operate on observed
//! window snapshots and session mappings and return deterministic outputs
//! suitable for tests.

pub mod capacity;
pub mod decision;
pub mod events;
pub mod orphans;
pub mod suppression;
pub mod types;
