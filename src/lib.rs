//! Distributed explicit finite-difference solver for 1-D advection.
//!
//! The grid is split into contiguous blocks, one per rank. Each step the
//! ranks cooperate on the spatial derivative, either by exchanging ghost
//! cells point-to-point or by multiplying row blocks of a banded derivative
//! matrix against a broadcast field, and the coordinator applies the
//! forward Euler update and records the step.

pub mod analysis;
pub mod config;
pub mod error;
pub mod output;
pub mod solver;
pub mod sparse;
pub mod stats;
