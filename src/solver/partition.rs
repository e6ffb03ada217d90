//! Contiguous block partitioning of the 1-D grid across ranks.
//!
//! Rank r owns global indices `[r * n_local, (r + 1) * n_local)`. The grid
//! must divide evenly; there is no remainder balancing.

use crate::error::{AdvectrixError, Result};
use std::ops::Range;

/// Even block partition of `grid_points` indices over `num_ranks` ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPartition {
    grid_points: usize,
    num_ranks: usize,
    local_points: usize,
}

impl BlockPartition {
    pub fn new(grid_points: usize, num_ranks: usize) -> Result<Self> {
        if num_ranks == 0 {
            return Err(AdvectrixError::Partition(
                "cannot partition over zero ranks".into(),
            ));
        }
        if grid_points % num_ranks != 0 {
            return Err(AdvectrixError::Partition(format!(
                "{grid_points} grid points do not divide evenly over {num_ranks} ranks"
            )));
        }
        Ok(Self {
            grid_points,
            num_ranks,
            local_points: grid_points / num_ranks,
        })
    }

    pub fn grid_points(&self) -> usize {
        self.grid_points
    }

    pub fn num_ranks(&self) -> usize {
        self.num_ranks
    }

    /// Points owned by every rank.
    pub fn local_point_count(&self) -> usize {
        self.local_points
    }

    /// Global index range owned by `rank`.
    pub fn local_range(&self, rank: usize) -> Range<usize> {
        let start = rank * self.local_points;
        start..start + self.local_points
    }

    /// All owned ranges, in rank order.
    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.num_ranks).map(move |r| self.local_range(r))
    }

    /// Map a global index to `(rank, local index)`.
    pub fn owner_of(&self, global: usize) -> Option<(usize, usize)> {
        if global >= self.grid_points {
            return None;
        }
        Some((global / self.local_points, global % self.local_points))
    }

    pub fn global_index(&self, rank: usize, local: usize) -> usize {
        rank * self.local_points + local
    }

    pub fn has_left_neighbor(&self, rank: usize) -> bool {
        rank > 0
    }

    pub fn has_right_neighbor(&self, rank: usize) -> bool {
        rank + 1 < self.num_ranks
    }
}
