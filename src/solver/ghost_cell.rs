//! Ghost-cell derivative: scatter, halo exchange, local stencil, gather.
//!
//! Each rank keeps its partition in a buffer padded with one ghost slot per
//! side. After the halo exchange the forward difference over every interior
//! slot needs no remote data.
//!
//! # Halo exchange ordering
//!
//! Sends are blocking, so the exchange runs in two passes ordered by rank
//! parity. Rightward pass: even ranks send their last interior value right,
//! then receive from the left; odd ranks receive first, then send. The
//! leftward pass mirrors it with the first interior value. In every pass each
//! communicating pair has exactly one side receiving first, so no two ranks
//! wait on each other's send.

use super::comm::{CommunicationBackend, HaloTag};
use super::partition::BlockPartition;
use super::Role;
use crate::error::{AdvectrixError, Result};
use crate::stats::Stats;
use std::time::Instant;

/// Local partition padded with a left and right ghost slot.
///
/// Layout: `[left ghost, interior..., right ghost]`. A ghost with no
/// neighbor behind it stays 0.
#[derive(Debug, Clone)]
pub struct LocalSubdomain {
    buffer: Vec<f64>,
}

impl LocalSubdomain {
    pub fn new(local_points: usize) -> Self {
        Self {
            buffer: vec![0.0; local_points + 2],
        }
    }

    pub fn local_points(&self) -> usize {
        self.buffer.len() - 2
    }

    /// The full padded buffer, ghosts included.
    pub fn as_slice(&self) -> &[f64] {
        &self.buffer
    }

    pub fn interior(&self) -> &[f64] {
        let n = self.local_points();
        &self.buffer[1..=n]
    }

    pub fn interior_mut(&mut self) -> &mut [f64] {
        let n = self.local_points();
        &mut self.buffer[1..=n]
    }

    pub fn left_ghost(&self) -> f64 {
        self.buffer[0]
    }

    pub fn right_ghost(&self) -> f64 {
        self.buffer[self.buffer.len() - 1]
    }

    fn first_interior(&self) -> f64 {
        self.buffer[1]
    }

    fn last_interior(&self) -> f64 {
        self.buffer[self.buffer.len() - 2]
    }

    fn set_left_ghost(&mut self, value: f64) {
        self.buffer[0] = value;
    }

    fn set_right_ghost(&mut self, value: f64) {
        let last = self.buffer.len() - 1;
        self.buffer[last] = value;
    }
}

/// Forward difference over the interior of a ghost-padded buffer.
///
/// `out[i] = (buffer[i + 2] - buffer[i + 1]) / h`, i.e. slot j of the buffer
/// looks one slot to its right.
pub fn forward_difference(buffer: &[f64], h: f64, out: &mut [f64]) {
    assert_eq!(buffer.len(), out.len() + 2, "stencil buffer must carry two ghosts");
    for (d, pair) in out.iter_mut().zip(buffer[1..].windows(2)) {
        *d = (pair[1] - pair[0]) / h;
    }
}

/// Per-rank state of the ghost-cell strategy.
pub struct GhostCellStencil {
    rank: usize,
    role: Role,
    partition: BlockPartition,
    grid_spacing: f64,
    subdomain: LocalSubdomain,
    local_derivative: Vec<f64>,
}

impl GhostCellStencil {
    pub fn new(partition: BlockPartition, rank: usize, role: Role, grid_spacing: f64) -> Self {
        let n_local = partition.local_point_count();
        Self {
            rank,
            role,
            partition,
            grid_spacing,
            subdomain: LocalSubdomain::new(n_local),
            local_derivative: vec![0.0; n_local],
        }
    }

    pub fn subdomain(&self) -> &LocalSubdomain {
        &self.subdomain
    }

    pub fn subdomain_mut(&mut self) -> &mut LocalSubdomain {
        &mut self.subdomain
    }

    /// Compute the derivative of the coordinator's `field` into the
    /// coordinator's `derivative`. Both are ignored on worker ranks.
    pub fn apply(
        &mut self,
        comm: &dyn CommunicationBackend,
        field: &[f64],
        derivative: &mut [f64],
        mut stats: Option<&mut Stats>,
    ) -> Result<()> {
        let _span = tracing::debug_span!("ghost_cell_derivative", rank = self.rank).entered();
        if self.role.is_coordinator() {
            let n = self.partition.grid_points();
            if field.len() != n || derivative.len() != n {
                return Err(AdvectrixError::Communication(format!(
                    "coordinator buffers must hold {n} values, got field={} derivative={}",
                    field.len(),
                    derivative.len()
                )));
            }
        }

        let t = Instant::now();
        comm.scatter(field, self.subdomain.interior_mut())?;
        if let Some(ref mut s) = stats {
            s.distribute += t.elapsed();
        }

        let t = Instant::now();
        let messages = self.exchange_halo(comm)?;
        if let Some(ref mut s) = stats {
            s.halo_exchange += t.elapsed();
            s.halo_messages += messages;
        }

        let t = Instant::now();
        forward_difference(
            self.subdomain.as_slice(),
            self.grid_spacing,
            &mut self.local_derivative,
        );
        if let Some(ref mut s) = stats {
            s.local_derivative += t.elapsed();
        }

        let t = Instant::now();
        comm.gather(&self.local_derivative, derivative)?;
        if let Some(ref mut s) = stats {
            s.gather += t.elapsed();
        }
        Ok(())
    }

    /// Refresh both ghost slots from the neighbors. Returns the number of
    /// messages this rank sent.
    pub fn exchange_halo(&mut self, comm: &dyn CommunicationBackend) -> Result<u64> {
        let rank = self.rank;
        let has_left = self.partition.has_left_neighbor(rank);
        let has_right = self.partition.has_right_neighbor(rank);
        let sends_first = rank % 2 == 0;
        let mut sent = 0;
        let mut incoming = [0.0];

        // Rightward: our last interior value becomes the right neighbor's left ghost.
        let outgoing = [self.subdomain.last_interior()];
        if sends_first {
            if has_right {
                comm.send(&outgoing, rank + 1, HaloTag::LeftBoundary)?;
                sent += 1;
            }
            if has_left {
                comm.receive(&mut incoming, rank - 1, HaloTag::LeftBoundary)?;
                self.subdomain.set_left_ghost(incoming[0]);
            }
        } else {
            if has_left {
                comm.receive(&mut incoming, rank - 1, HaloTag::LeftBoundary)?;
                self.subdomain.set_left_ghost(incoming[0]);
            }
            if has_right {
                comm.send(&outgoing, rank + 1, HaloTag::LeftBoundary)?;
                sent += 1;
            }
        }

        // Leftward: our first interior value becomes the left neighbor's right ghost.
        let outgoing = [self.subdomain.first_interior()];
        if sends_first {
            if has_left {
                comm.send(&outgoing, rank - 1, HaloTag::RightBoundary)?;
                sent += 1;
            }
            if has_right {
                comm.receive(&mut incoming, rank + 1, HaloTag::RightBoundary)?;
                self.subdomain.set_right_ghost(incoming[0]);
            }
        } else {
            if has_right {
                comm.receive(&mut incoming, rank + 1, HaloTag::RightBoundary)?;
                self.subdomain.set_right_ghost(incoming[0]);
            }
            if has_left {
                comm.send(&outgoing, rank - 1, HaloTag::RightBoundary)?;
                sent += 1;
            }
        }

        Ok(sent)
    }
}
