//! Distributed spatial-derivative operators and the fabric they run on.

pub mod block_matrix;
pub mod comm;
#[cfg(feature = "distributed")]
pub mod comm_mpi;
pub mod comm_thread;
pub mod ghost_cell;
pub mod partition;

use crate::config::DerivativeStrategy;
use crate::error::Result;
use crate::stats::Stats;
use block_matrix::{derivative_matrix, BlockMatrixOperator, Stencil};
use comm::{CommunicationBackend, COORDINATOR};
use ghost_cell::{forward_difference, GhostCellStencil};
use partition::BlockPartition;

/// Whether this rank holds the authoritative global field.
///
/// Resolved once from the fabric when the engine is built and passed down,
/// so the stepping code never compares ranks itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Coordinator,
    Worker,
}

impl Role {
    pub fn of(comm: &dyn CommunicationBackend) -> Self {
        if comm.rank() == COORDINATOR {
            Role::Coordinator
        } else {
            Role::Worker
        }
    }

    pub fn is_coordinator(self) -> bool {
        self == Role::Coordinator
    }
}

/// The configured derivative strategy, bound to one rank's partition.
pub enum DerivativeOperator {
    GhostCell(GhostCellStencil),
    BlockMatrix(BlockMatrixOperator),
}

impl DerivativeOperator {
    pub fn build(
        strategy: DerivativeStrategy,
        partition: BlockPartition,
        rank: usize,
        role: Role,
        grid_spacing: f64,
    ) -> Self {
        match strategy {
            DerivativeStrategy::GhostCell => DerivativeOperator::GhostCell(GhostCellStencil::new(
                partition,
                rank,
                role,
                grid_spacing,
            )),
            DerivativeStrategy::UpwindMatrix => DerivativeOperator::BlockMatrix(
                BlockMatrixOperator::new(Stencil::Upwind, partition, rank, role, grid_spacing),
            ),
            DerivativeStrategy::CenteredMatrix => DerivativeOperator::BlockMatrix(
                BlockMatrixOperator::new(Stencil::Centered, partition, rank, role, grid_spacing),
            ),
        }
    }

    /// Derivative of the coordinator's `field` into the coordinator's
    /// `derivative`. Every rank must call this in the same step.
    pub fn apply(
        &mut self,
        comm: &dyn CommunicationBackend,
        field: &[f64],
        derivative: &mut [f64],
        stats: Option<&mut Stats>,
    ) -> Result<()> {
        match self {
            DerivativeOperator::GhostCell(op) => op.apply(comm, field, derivative, stats),
            DerivativeOperator::BlockMatrix(op) => op.apply(comm, field, derivative, stats),
        }
    }
}

/// One-process reference derivative for `strategy`.
///
/// This is what every distributed run must reproduce.
pub fn serial_derivative(strategy: DerivativeStrategy, field: &[f64], h: f64) -> Vec<f64> {
    let n = field.len();
    match strategy {
        DerivativeStrategy::GhostCell => {
            let mut buffer = Vec::with_capacity(n + 2);
            buffer.push(0.0);
            buffer.extend_from_slice(field);
            buffer.push(0.0);
            let mut out = vec![0.0; n];
            forward_difference(&buffer, h, &mut out);
            out
        }
        DerivativeStrategy::UpwindMatrix => derivative_matrix(Stencil::Upwind, n, h).spmv(field),
        DerivativeStrategy::CenteredMatrix => {
            derivative_matrix(Stencil::Centered, n, h).spmv(field)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::comm::SingleProcessComm;
    use approx::assert_abs_diff_eq;

    const STRATEGIES: [DerivativeStrategy; 3] = [
        DerivativeStrategy::GhostCell,
        DerivativeStrategy::UpwindMatrix,
        DerivativeStrategy::CenteredMatrix,
    ];

    #[test]
    fn single_rank_matches_serial_derivative() {
        let h = 0.2;
        let field: Vec<f64> = (0..10).map(|i| (i as f64 * h).powi(2)).collect();
        let comm = SingleProcessComm::new();
        let partition = BlockPartition::new(field.len(), 1).unwrap();

        for strategy in STRATEGIES {
            let mut op = DerivativeOperator::build(strategy, partition, 0, Role::Coordinator, h);
            let mut derivative = vec![0.0; field.len()];
            op.apply(&comm, &field, &mut derivative, None).unwrap();
            let expected = serial_derivative(strategy, &field, h);
            for (got, want) in derivative.iter().zip(&expected) {
                assert_abs_diff_eq!(*got, *want, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn forward_and_upwind_agree_away_from_edges() {
        let h = 0.5;
        let field: Vec<f64> = (0..12).map(|i| (i as f64).sin()).collect();
        let ghost = serial_derivative(DerivativeStrategy::GhostCell, &field, h);
        let upwind = serial_derivative(DerivativeStrategy::UpwindMatrix, &field, h);
        for i in 1..field.len() - 1 {
            assert_abs_diff_eq!(ghost[i], upwind[i], epsilon = 1e-12);
        }
        assert_eq!(upwind[0], 0.0);
        assert_eq!(upwind[11], 0.0);
    }

    #[test]
    fn role_resolves_from_rank() {
        assert_eq!(Role::of(&SingleProcessComm::new()), Role::Coordinator);
        assert!(!Role::Worker.is_coordinator());
    }
}
