//! Crate-internal test tree: shared doubles plus end-to-end agent runs.

pub mod sqlite_integration;
pub mod support;
