//! Analysis engine: runs the advection simulation and holds its results.

pub mod advection;

use crate::config::DerivativeStrategy;

/// Append-only record of the global field, one snapshot per completed step.
///
/// Lives on the coordinator only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpaceTimeHistory {
    grid_points: usize,
    snapshots: Vec<Vec<f64>>,
}

impl SpaceTimeHistory {
    pub fn new(grid_points: usize) -> Self {
        Self {
            grid_points,
            snapshots: Vec::new(),
        }
    }

    pub fn with_capacity(grid_points: usize, steps: usize) -> Self {
        Self {
            grid_points,
            snapshots: Vec::with_capacity(steps),
        }
    }

    /// Record one step. Panics if the snapshot has the wrong length.
    pub fn push(&mut self, field: &[f64]) {
        assert_eq!(
            field.len(),
            self.grid_points,
            "snapshot length does not match the grid"
        );
        self.snapshots.push(field.to_vec());
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn grid_points(&self) -> usize {
        self.grid_points
    }

    /// Snapshots in step order: `rows()[k]` is the field after step k + 1.
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.snapshots
    }

    pub fn last(&self) -> Option<&[f64]> {
        self.snapshots.last().map(Vec::as_slice)
    }

    /// Snapshots with the spatial axis reversed.
    ///
    /// Presentation only: the ghost-cell plots are drawn right-to-left.
    pub fn spatially_reversed(&self) -> Vec<Vec<f64>> {
        self.snapshots
            .iter()
            .map(|row| row.iter().rev().copied().collect())
            .collect()
    }
}

/// Everything the visualization side needs from one run.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub strategy: DerivativeStrategy,
    pub num_ranks: usize,
    /// Grid coordinates x_i.
    pub grid: Vec<f64>,
    pub grid_spacing: f64,
    pub time_step: f64,
    /// Field at t = 0.
    pub initial_field: Vec<f64>,
    pub history: SpaceTimeHistory,
    /// Slowest rank's wall time for the stepping loop.
    pub elapsed_seconds: f64,
}

impl SimulationResult {
    /// Simulation time of each history row.
    pub fn times(&self) -> Vec<f64> {
        (1..=self.history.len())
            .map(|k| k as f64 * self.time_step)
            .collect()
    }

    /// Field after the last step, or the initial field if no step ran.
    pub fn final_field(&self) -> &[f64] {
        self.history.last().unwrap_or(self.initial_field.as_slice())
    }

    pub fn step_count(&self) -> usize {
        self.history.len()
    }
}
