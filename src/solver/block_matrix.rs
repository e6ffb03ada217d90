//! Block-matrix derivative: broadcast, row-block product, gather.
//!
//! The derivative operator is a banded N x N matrix built once. Every rank
//! keeps only the contiguous row block matching its partition and multiplies
//! it against the broadcast field. The first and last rows stay zero, so the
//! two edge points never change.

use super::comm::CommunicationBackend;
use super::partition::BlockPartition;
use super::Role;
use crate::error::{AdvectrixError, Result};
use crate::sparse::CsrMatrix;
use crate::stats::Stats;
use std::time::Instant;

/// Finite-difference stencil of the derivative matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stencil {
    /// Row i: -1 at i, +1 at i+1, over h.
    Upwind,
    /// Row i: -1 at i-1, +1 at i+1, over 2h.
    Centered,
}

/// Build the full N x N derivative matrix for `stencil` with spacing `h`.
pub fn derivative_matrix(stencil: Stencil, n: usize, h: f64) -> CsrMatrix {
    let mut triplets = Vec::with_capacity(2 * n);
    for i in 1..n.saturating_sub(1) {
        match stencil {
            Stencil::Upwind => {
                triplets.push((i, i, -1.0 / h));
                triplets.push((i, i + 1, 1.0 / h));
            }
            Stencil::Centered => {
                let scale = 1.0 / (2.0 * h);
                triplets.push((i, i - 1, -scale));
                triplets.push((i, i + 1, scale));
            }
        }
    }
    CsrMatrix::from_triplets(n, n, &triplets)
}

/// Per-rank state of the block-matrix strategy.
pub struct BlockMatrixOperator {
    rank: usize,
    role: Role,
    stencil: Stencil,
    block: CsrMatrix,
    broadcast_field: Vec<f64>,
    local_derivative: Vec<f64>,
}

impl BlockMatrixOperator {
    pub fn new(
        stencil: Stencil,
        partition: BlockPartition,
        rank: usize,
        role: Role,
        grid_spacing: f64,
    ) -> Self {
        let n = partition.grid_points();
        let full = derivative_matrix(stencil, n, grid_spacing);
        let block = full.row_block(partition.local_range(rank));
        tracing::debug!(rank, rows = block.nrows, nnz = block.nnz(), "derivative row block");
        Self {
            rank,
            role,
            stencil,
            local_derivative: vec![0.0; block.nrows],
            block,
            broadcast_field: vec![0.0; n],
        }
    }

    pub fn stencil(&self) -> Stencil {
        self.stencil
    }

    /// This rank's rows of the derivative matrix.
    pub fn block(&self) -> &CsrMatrix {
        &self.block
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
        let _span = tracing::debug_span!("block_matrix_derivative", rank = self.rank).entered();
        if self.role.is_coordinator() {
            let n = self.broadcast_field.len();
            if field.len() != n || derivative.len() != n {
                return Err(AdvectrixError::Communication(format!(
                    "coordinator buffers must hold {n} values, got field={} derivative={}",
                    field.len(),
                    derivative.len()
                )));
            }
            self.broadcast_field.copy_from_slice(field);
        }

        let t = Instant::now();
        comm.broadcast(&mut self.broadcast_field)?;
        if let Some(ref mut s) = stats {
            s.distribute += t.elapsed();
        }

        let t = Instant::now();
        self.block
            .spmv_into(&self.broadcast_field, &mut self.local_derivative);
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
}
