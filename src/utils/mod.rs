//! Shared utilities.
//!
//! Currently only the in-process test doubles live here; they are compiled
//! into the library (not `cfg(test)`) because the demos drive the pipeline
//! with the same scripted services the tests use.

pub mod testing;
