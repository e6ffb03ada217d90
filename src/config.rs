//! Problem configuration for the 1-D advection run.
//!
//! Pure data, validated once before any worker starts stepping. Derived
//! quantities (grid spacing, time step, step count) are computed on demand
//! so the struct stays immutable after construction.

use crate::error::{AdvectrixError, Result};

/// How the spatial derivative is distributed across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivativeStrategy {
    /// Scatter, point-to-point halo exchange, forward-difference stencil, gather.
    GhostCell,
    /// Broadcast, upwind row-block matrix product, gather.
    UpwindMatrix,
    /// Broadcast, centered row-block matrix product, gather.
    CenteredMatrix,
}

impl DerivativeStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            DerivativeStrategy::GhostCell => "ghost-cell",
            DerivativeStrategy::UpwindMatrix => "upwind-matrix",
            DerivativeStrategy::CenteredMatrix => "centered-matrix",
        }
    }

    /// Stencils that only look to the right are upwind for leftward transport.
    fn is_forward_biased(&self) -> bool {
        matches!(
            self,
            DerivativeStrategy::GhostCell | DerivativeStrategy::UpwindMatrix
        )
    }
}

impl std::fmt::Display for DerivativeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Input parameters of one simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemConfig {
    pub grid_point_count: usize,
    pub domain_length: f64,
    pub velocity: f64,
    pub cfl_number: f64,
    pub sim_duration: f64,
    pub gaussian_sigma: f64,
    pub gaussian_center: f64,
    pub strategy: DerivativeStrategy,
    /// Proceed with a warning instead of failing when `cfl_number > 1`.
    pub allow_unstable: bool,
}

impl Default for ProblemConfig {
    fn default() -> Self {
        Self {
            grid_point_count: 200,
            domain_length: 300.0,
            velocity: 330.0,
            cfl_number: 0.5,
            sim_duration: 1.0,
            gaussian_sigma: 10.0,
            gaussian_center: 300.0,
            strategy: DerivativeStrategy::GhostCell,
            allow_unstable: false,
        }
    }
}

impl ProblemConfig {
    /// Check every parameter. Called once at startup on every rank.
    pub fn validate(&self) -> Result<()> {
        if self.grid_point_count < 2 {
            return Err(AdvectrixError::Configuration(format!(
                "grid_point_count must be at least 2, got {}",
                self.grid_point_count
            )));
        }
        require_positive("domain_length", self.domain_length)?;
        require_positive("cfl_number", self.cfl_number)?;
        require_positive("sim_duration", self.sim_duration)?;
        require_positive("gaussian_sigma", self.gaussian_sigma)?;
        if !self.velocity.is_finite() || self.velocity == 0.0 {
            return Err(AdvectrixError::Configuration(format!(
                "velocity must be finite and non-zero, got {}",
                self.velocity
            )));
        }
        if !self.gaussian_center.is_finite() {
            return Err(AdvectrixError::Configuration(format!(
                "gaussian_center must be finite, got {}",
                self.gaussian_center
            )));
        }

        if self.cfl_number > 1.0 {
            if !self.allow_unstable {
                return Err(AdvectrixError::NumericalInstability(format!(
                    "CFL number {} exceeds 1; the explicit update will diverge",
                    self.cfl_number
                )));
            }
            tracing::warn!(
                cfl = self.cfl_number,
                "CFL number exceeds 1, expect a diverging field"
            );
        }
        if self.velocity < 0.0 && self.strategy.is_forward_biased() {
            tracing::warn!(
                velocity = self.velocity,
                strategy = %self.strategy,
                "negative velocity with a forward-difference stencil is downwind"
            );
        }
        if self.step_count() == 0 {
            tracing::warn!(
                sim_duration = self.sim_duration,
                time_step = self.time_step(),
                "simulation duration is shorter than one time step"
            );
        }
        Ok(())
    }

    /// h = L / (N - 1)
    pub fn grid_spacing(&self) -> f64 {
        self.domain_length / (self.grid_point_count - 1) as f64
    }

    /// dt = C * h / |v|
    pub fn time_step(&self) -> f64 {
        self.cfl_number * self.grid_spacing() / self.velocity.abs()
    }

    pub fn step_count(&self) -> usize {
        (self.sim_duration / self.time_step()).floor() as usize
    }

    /// Grid coordinates x_i = i * h.
    pub fn grid(&self) -> Vec<f64> {
        let h = self.grid_spacing();
        (0..self.grid_point_count).map(|i| i as f64 * h).collect()
    }

    /// Gaussian pulse exp(-(x - x0)^2 / sigma^2) sampled on the grid.
    pub fn initial_field(&self) -> Vec<f64> {
        let sigma2 = self.gaussian_sigma * self.gaussian_sigma;
        self.grid()
            .into_iter()
            .map(|x| {
                let d = x - self.gaussian_center;
                (-d * d / sigma2).exp()
            })
            .collect()
    }
}

fn require_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AdvectrixError::Configuration(format!(
            "{name} must be finite and positive, got {value}"
        )))
    }
}
