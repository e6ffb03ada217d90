//! Liveness of the halo exchange and the collectives.
//!
//! Every channel in the in-process fabric is a rendezvous, so a send blocks
//! until the peer receives. A rank ordering that would deadlock on a
//! blocking transport stalls here as well and trips the deadline.

use advectrix::analysis::advection;
use advectrix::config::{DerivativeStrategy, ProblemConfig};
use advectrix::error::AdvectrixError;
use advectrix::solver::comm::{CommunicationBackend, HaloTag};
use advectrix::solver::comm_thread::run_on_threads;
use advectrix::solver::ghost_cell::GhostCellStencil;
use advectrix::solver::partition::BlockPartition;
use advectrix::solver::Role;
use std::time::{Duration, Instant};

const DEADLINE: Option<Duration> = Some(Duration::from_secs(5));

/// Generous per-step bound; a stalled step waits for the full deadline.
const MAX_STEP: Duration = Duration::from_millis(500);

fn short_run(strategy: DerivativeStrategy) -> ProblemConfig {
    ProblemConfig {
        grid_point_count: 240,
        sim_duration: 0.05,
        strategy,
        ..ProblemConfig::default()
    }
}

#[test]
fn test_ghost_cell_completes_for_each_rank_count() {
    let config = short_run(DerivativeStrategy::GhostCell);
    let steps = config.step_count();
    assert!(steps > 0);

    for workers in [2, 3, 4, 8] {
        let t = Instant::now();
        let result = advection::run_threaded(&config, workers, DEADLINE)
            .unwrap_or_else(|e| panic!("{workers} ranks failed: {e}"));
        let elapsed = t.elapsed();
        assert_eq!(result.step_count(), steps);
        assert!(
            elapsed < MAX_STEP * steps as u32,
            "{workers} ranks took {elapsed:?} for {steps} steps"
        );
    }
}

#[test]
fn test_matrix_strategies_complete_for_each_rank_count() {
    for strategy in [DerivativeStrategy::UpwindMatrix, DerivativeStrategy::CenteredMatrix] {
        let config = short_run(strategy);
        for workers in [2, 3, 4, 8] {
            let result = advection::run_threaded(&config, workers, DEADLINE)
                .unwrap_or_else(|e| panic!("{strategy} on {workers} ranks failed: {e}"));
            assert_eq!(result.step_count(), config.step_count());
        }
    }
}

#[test]
fn test_one_point_per_rank_exchange() {
    // Each rank's single interior point is both its first and last.
    let partition = BlockPartition::new(8, 8).unwrap();
    let per_rank = run_on_threads(8, DEADLINE, |comm| {
        let mut stencil = GhostCellStencil::new(partition, comm.rank(), Role::of(&comm), 1.0);
        stencil.subdomain_mut().interior_mut()[0] = comm.rank() as f64 + 1.0;
        stencil.exchange_halo(&comm)?;
        let sub = stencil.subdomain();
        Ok((sub.left_ghost(), sub.right_ghost()))
    })
    .unwrap();

    for (rank, (left, right)) in per_rank.into_iter().enumerate() {
        let expected_left = if rank == 0 { 0.0 } else { rank as f64 };
        let expected_right = if rank == 7 { 0.0 } else { rank as f64 + 2.0 };
        assert_eq!(left, expected_left, "rank {rank} left ghost");
        assert_eq!(right, expected_right, "rank {rank} right ghost");
    }
}

#[test]
fn test_send_first_on_both_sides_stalls() {
    // Both ranks send before receiving: with blocking sends neither returns.
    let err = run_on_threads(2, Some(Duration::from_millis(200)), |comm| {
        let peer = 1 - comm.rank();
        comm.send(&[comm.rank() as f64], peer, HaloTag::RightBoundary)?;
        let mut buf = [0.0];
        comm.receive(&mut buf, peer, HaloTag::RightBoundary)?;
        Ok(())
    })
    .unwrap_err();
    assert!(matches!(err, AdvectrixError::Communication(_)));
}
