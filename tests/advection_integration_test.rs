//! End-to-end tests for the distributed advection solver.

use advectrix::analysis::advection::{self, explicit_update};
use advectrix::config::{DerivativeStrategy, ProblemConfig};
use advectrix::solver::comm::CommunicationBackend;
use advectrix::solver::comm_thread::run_on_threads;
use advectrix::solver::partition::BlockPartition;
use advectrix::solver::{serial_derivative, DerivativeOperator, Role};
use approx::assert_abs_diff_eq;
use std::time::Duration;

const DEADLINE: Option<Duration> = Some(Duration::from_secs(10));

const STRATEGIES: [DerivativeStrategy; 3] = [
    DerivativeStrategy::GhostCell,
    DerivativeStrategy::UpwindMatrix,
    DerivativeStrategy::CenteredMatrix,
];

/// Evaluate one distributed derivative of `field` on `workers` ranks.
fn distributed_derivative(
    strategy: DerivativeStrategy,
    field: &[f64],
    h: f64,
    workers: usize,
) -> Vec<f64> {
    let partition = BlockPartition::new(field.len(), workers).expect("partition failed");
    let per_rank = run_on_threads(workers, DEADLINE, |comm| {
        let role = Role::of(&comm);
        let mut op = DerivativeOperator::build(strategy, partition, comm.rank(), role, h);
        let (input, mut out) = if role.is_coordinator() {
            (field.to_vec(), vec![0.0; field.len()])
        } else {
            (Vec::new(), Vec::new())
        };
        op.apply(&comm, &input, &mut out, None)?;
        Ok(out)
    })
    .expect("distributed derivative failed");
    per_rank.into_iter().next().expect("no coordinator")
}

// ── Configuration ─────────────────────────────────────────────────

#[test]
fn test_reference_time_step_and_step_count() {
    let config = ProblemConfig {
        grid_point_count: 200,
        domain_length: 300.0,
        velocity: 330.0,
        cfl_number: 0.5,
        sim_duration: 1.0,
        ..ProblemConfig::default()
    };
    let dt = 0.5 * (300.0 / 199.0) / 330.0;
    assert_abs_diff_eq!(config.time_step(), dt, epsilon = 1e-15);
    assert_eq!(config.step_count(), (1.0 / dt).floor() as usize);
    assert_eq!(config.step_count(), 437);
}

// ── Derivative equivalence ────────────────────────────────────────

#[test]
fn test_distributed_derivative_matches_serial() {
    let n = 40;
    let h = 0.75;
    let field: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64 * h;
            (0.4 * x).sin() + 0.1 * x
        })
        .collect();

    for strategy in STRATEGIES {
        let expected = serial_derivative(strategy, &field, h);
        for workers in [1, 2, 4, 5, 8] {
            let got = distributed_derivative(strategy, &field, h, workers);
            assert_eq!(got.len(), n);
            for (i, (g, e)) in got.iter().zip(&expected).enumerate() {
                assert!(
                    (g - e).abs() < 1e-12,
                    "{strategy} with {workers} ranks differs at {i}: {g} vs {e}"
                );
            }
        }
    }
}

#[test]
fn test_ghost_cell_and_upwind_matrix_agree_every_step() {
    let config = ProblemConfig::default();
    let n = config.grid_point_count;
    let h = config.grid_spacing();
    let coeff = config.velocity * config.time_step();
    let partition = BlockPartition::new(n, 4).unwrap();

    let per_rank = run_on_threads(4, DEADLINE, |comm| {
        let role = Role::of(&comm);
        let rank = comm.rank();
        let mut ghost = DerivativeOperator::build(DerivativeStrategy::GhostCell, partition, rank, role, h);
        let mut upwind =
            DerivativeOperator::build(DerivativeStrategy::UpwindMatrix, partition, rank, role, h);

        let mut field = if role.is_coordinator() { config.initial_field() } else { Vec::new() };
        let mut d_ghost = vec![0.0; field.len()];
        let mut d_upwind = vec![0.0; field.len()];
        let mut worst = 0.0f64;

        for _ in 0..config.step_count() {
            ghost.apply(&comm, &field, &mut d_ghost, None)?;
            upwind.apply(&comm, &field, &mut d_upwind, None)?;
            if role.is_coordinator() {
                // The matrix leaves its first and last rows empty.
                for i in 1..n - 1 {
                    worst = worst.max((d_ghost[i] - d_upwind[i]).abs());
                }
                explicit_update(&mut field, &d_ghost, coeff);
            }
        }
        Ok(worst)
    })
    .unwrap();

    assert!(per_rank[0] < 1e-12, "max per-step difference {}", per_rank[0]);
}

// ── Full runs ─────────────────────────────────────────────────────

#[test]
fn test_rank_count_does_not_change_result() {
    let config = ProblemConfig {
        grid_point_count: 120,
        sim_duration: 0.05,
        gaussian_center: 200.0,
        ..ProblemConfig::default()
    };
    for strategy in STRATEGIES {
        let config = ProblemConfig { strategy, ..config.clone() };
        let reference = advection::run_threaded(&config, 1, DEADLINE).unwrap();
        for workers in [2, 3, 6] {
            let result = advection::run_threaded(&config, workers, DEADLINE).unwrap();
            assert_eq!(result.num_ranks, workers);
            assert_eq!(result.step_count(), reference.step_count());
            for (row, ref_row) in result.history.rows().iter().zip(reference.history.rows()) {
                for (u, r) in row.iter().zip(ref_row) {
                    assert_abs_diff_eq!(*u, *r, epsilon = 1e-12);
                }
            }
        }
    }
}

#[test]
fn test_gaussian_pulse_translates_at_velocity() {
    // Pulse starts well inside the domain and travels left by v * t.
    let config = ProblemConfig {
        grid_point_count: 400,
        domain_length: 300.0,
        velocity: 330.0,
        cfl_number: 0.5,
        sim_duration: 100.0 / 330.0,
        gaussian_sigma: 10.0,
        gaussian_center: 250.0,
        strategy: DerivativeStrategy::GhostCell,
        allow_unstable: false,
    };
    let result = advection::run_threaded(&config, 4, DEADLINE).unwrap();
    assert_eq!(result.step_count(), config.step_count());

    let h = result.grid_spacing;
    let mass = |u: &[f64]| u.iter().sum::<f64>() * h;
    let centroid = |u: &[f64]| {
        let weighted: f64 = u.iter().zip(&result.grid).map(|(v, x)| v * x).sum();
        weighted / u.iter().sum::<f64>()
    };

    let u0 = &result.initial_field;
    let u1 = result.final_field();
    let t_final = result.step_count() as f64 * result.time_step;

    // Upwind transport conserves mass and moves the first moment exactly.
    assert_abs_diff_eq!(mass(u1), mass(u0), epsilon = 1e-6 * mass(u0));
    assert_abs_diff_eq!(centroid(u1), 250.0 - config.velocity * t_final, epsilon = 1e-3);

    // First-order upwind smears the pulse with diffusivity v h (1 - C) / 2.
    let diffusivity = config.velocity * h * (1.0 - config.cfl_number) / 2.0;
    let sigma2 = config.gaussian_sigma * config.gaussian_sigma;
    let expected_peak = (sigma2 / (sigma2 + 4.0 * diffusivity * t_final)).sqrt();
    let peak = u1.iter().cloned().fold(f64::MIN, f64::max);
    assert!(
        (peak - expected_peak).abs() < 0.03,
        "peak {peak}, expected about {expected_peak}"
    );

    // Same run through the matrix path ends in the same place.
    let matrix = advection::run_threaded(
        &ProblemConfig {
            strategy: DerivativeStrategy::UpwindMatrix,
            ..config.clone()
        },
        4,
        DEADLINE,
    )
    .unwrap();
    for (a, b) in matrix.final_field().iter().zip(u1) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-8);
    }
}

#[test]
fn test_reference_scenario_runs_to_completion() {
    let config = ProblemConfig::default();
    let result = advection::run_threaded(&config, 4, DEADLINE).unwrap();
    assert_eq!(result.step_count(), 437);
    assert_eq!(result.history.grid_points(), 200);
    assert!(result.elapsed_seconds >= 0.0);
    assert!(result.final_field().iter().all(|u| u.is_finite()));
    // Stable scheme: no new extrema.
    assert!(result.final_field().iter().all(|&u| (-1e-12..=1.0 + 1e-12).contains(&u)));
}

#[test]
fn test_unstable_cfl_fails_on_every_rank() {
    let config = ProblemConfig {
        cfl_number: 1.2,
        ..ProblemConfig::default()
    };
    let err = advection::run_threaded(&config, 4, DEADLINE).unwrap_err();
    assert!(matches!(
        err,
        advectrix::error::AdvectrixError::NumericalInstability(_)
    ));
}
