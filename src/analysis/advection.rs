//! Time-stepping engine for the distributed advection run.
//!
//! Solves du/dt = v * du/dx with forward Euler in time. Every rank runs the
//! same loop; only the coordinator holds the global field and history. Each
//! step is one derivative evaluation (communication plus local work)
//! followed by the explicit update on the coordinator, and step n + 1 never
//! starts before step n's update is done.

use super::{SimulationResult, SpaceTimeHistory};
use crate::config::ProblemConfig;
use crate::error::{AdvectrixError, Result};
use crate::solver::comm::{CommunicationBackend, COORDINATOR};
use crate::solver::comm_thread::run_on_threads;
use crate::solver::partition::BlockPartition;
use crate::solver::{DerivativeOperator, Role};
use crate::stats::Stats;
use std::time::{Duration, Instant};

/// Lifecycle of one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Stepping,
    Finalizing,
    Done,
}

/// One rank's view of the simulation.
pub struct AdvectionEngine<'a> {
    config: &'a ProblemConfig,
    comm: &'a dyn CommunicationBackend,
    role: Role,
    partition: BlockPartition,
    operator: DerivativeOperator,
    phase: Phase,
}

impl<'a> AdvectionEngine<'a> {
    /// Validate the configuration and bind the derivative operator to this
    /// rank. Fails before any message is exchanged.
    pub fn new(config: &'a ProblemConfig, comm: &'a dyn CommunicationBackend) -> Result<Self> {
        config.validate()?;
        let partition = BlockPartition::new(config.grid_point_count, comm.num_ranks())?;
        let role = Role::of(comm);
        let operator = DerivativeOperator::build(
            config.strategy,
            partition,
            comm.rank(),
            role,
            config.grid_spacing(),
        );
        Ok(Self {
            config,
            comm,
            role,
            partition,
            operator,
            phase: Phase::Initializing,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn partition(&self) -> &BlockPartition {
        &self.partition
    }

    /// Run every step. The coordinator returns the assembled result, workers
    /// return `None`. Any error aborts the run with no partial result.
    pub fn run(&mut self, mut stats: Option<&mut Stats>) -> Result<Option<SimulationResult>> {
        if self.phase != Phase::Initializing {
            return Err(AdvectrixError::Configuration(format!(
                "engine already ran (phase {:?})",
                self.phase
            )));
        }
        let rank = self.comm.rank();
        let _span = tracing::info_span!(
            "advection_run",
            strategy = %self.config.strategy,
            rank,
            ranks = self.comm.num_ranks()
        )
        .entered();

        let n = self.config.grid_point_count;
        let steps = self.config.step_count();
        let time_step = self.config.time_step();
        let coeff = self.config.velocity * time_step;

        let t = Instant::now();
        let initial_field = match self.role {
            Role::Coordinator => self.config.initial_field(),
            Role::Worker => Vec::new(),
        };
        let mut field = initial_field.clone();
        let mut derivative = vec![0.0; field.len()];
        let mut history = match self.role {
            Role::Coordinator => Some(SpaceTimeHistory::with_capacity(n, steps)),
            Role::Worker => None,
        };
        self.comm.barrier()?;
        let start = self.comm.wall_time();
        if let Some(ref mut s) = stats {
            s.add_phase("Initialize", t.elapsed());
        }

        self.phase = Phase::Stepping;
        tracing::info!(steps, time_step, local_points = self.partition.local_point_count(), "stepping");
        let t = Instant::now();
        for step in 0..steps {
            let _step = tracing::trace_span!("step", step).entered();
            self.operator
                .apply(self.comm, &field, &mut derivative, stats.as_deref_mut())?;

            if let Some(history) = history.as_mut() {
                let t_update = Instant::now();
                explicit_update(&mut field, &derivative, coeff);
                history.push(&field);
                if let Some(ref mut s) = stats {
                    s.update += t_update.elapsed();
                }
            }
            if let Some(ref mut s) = stats {
                s.steps += 1;
            }
        }
        if let Some(ref mut s) = stats {
            s.add_phase("Stepping", t.elapsed());
        }

        self.phase = Phase::Finalizing;
        self.comm.barrier()?;
        let local_elapsed = self.comm.wall_time() - start;
        let elapsed_seconds = self.comm.all_reduce_max(local_elapsed)?;
        self.phase = Phase::Done;
        tracing::info!(elapsed_seconds, "run complete");

        Ok(history.map(|history| SimulationResult {
            strategy: self.config.strategy,
            num_ranks: self.comm.num_ranks(),
            grid: self.config.grid(),
            grid_spacing: self.config.grid_spacing(),
            time_step,
            initial_field,
            history,
            elapsed_seconds,
        }))
    }
}

/// Forward Euler: u <- u + coeff * du/dx, with coeff = v * dt.
pub fn explicit_update(field: &mut [f64], derivative: &[f64], coeff: f64) {
    for (u, d) in field.iter_mut().zip(derivative) {
        *u += coeff * d;
    }
}

/// Run the simulation on this rank.
pub fn run(
    config: &ProblemConfig,
    comm: &dyn CommunicationBackend,
    stats: Option<&mut Stats>,
) -> Result<Option<SimulationResult>> {
    AdvectionEngine::new(config, comm)?.run(stats)
}

/// Run the simulation on `workers` in-process ranks and return the
/// coordinator's result.
pub fn run_threaded(
    config: &ProblemConfig,
    workers: usize,
    deadline: Option<Duration>,
) -> Result<SimulationResult> {
    let results = run_on_threads(workers, deadline, |comm| run(config, &comm, None))?;
    results
        .into_iter()
        .nth(COORDINATOR)
        .flatten()
        .ok_or_else(|| AdvectrixError::Communication("coordinator returned no result".into()))
}
