//! Performance statistics collection for `--stats` output.

use std::time::{Duration, Instant};

/// Collects per-phase timings of the stepping loop on one rank.
///
/// Created when `--stats` is passed, threaded as `Option<&mut Stats>`.
/// Zero cost when `None`: no timing calls, no counter increments.
pub struct Stats {
    total_start: Instant,
    phases: Vec<(&'static str, Duration)>,
    // Per-step accumulators
    pub distribute: Duration,
    pub halo_exchange: Duration,
    pub local_derivative: Duration,
    pub gather: Duration,
    pub update: Duration,
    // Counters
    pub steps: u64,
    pub halo_messages: u64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            total_start: Instant::now(),
            phases: Vec::new(),
            distribute: Duration::ZERO,
            halo_exchange: Duration::ZERO,
            local_derivative: Duration::ZERO,
            gather: Duration::ZERO,
            update: Duration::ZERO,
            steps: 0,
            halo_messages: 0,
        }
    }

    /// Record a completed phase with its duration.
    pub fn add_phase(&mut self, name: &'static str, duration: Duration) {
        self.phases.push((name, duration));
    }

    /// Time spent in communication calls.
    pub fn communication(&self) -> Duration {
        self.distribute + self.halo_exchange + self.gather
    }

    /// Print the stats table to stderr.
    pub fn display(&self, rank: usize) {
        let total = self.total_start.elapsed();
        eprintln!();
        eprintln!("=== Advectrix Performance Stats (rank {rank}) ===");

        for (name, dur) in &self.phases {
            eprintln!("  {:<24} {:>8.3}s", name, dur.as_secs_f64());
        }

        if self.steps > 0 {
            eprintln!("  Steps:                  {}", self.steps);
            eprintln!("    Distribute:           {:>8.3}s", self.distribute.as_secs_f64());
            if self.halo_messages > 0 {
                eprintln!("    Halo exchange:        {:>8.3}s", self.halo_exchange.as_secs_f64());
                eprintln!("      Messages:           {}", self.halo_messages);
            }
            eprintln!("    Local derivative:     {:>8.3}s", self.local_derivative.as_secs_f64());
            eprintln!("    Gather:               {:>8.3}s", self.gather.as_secs_f64());
            eprintln!("    Update:               {:>8.3}s", self.update.as_secs_f64());
            let per_step = total.as_secs_f64() / self.steps as f64;
            eprintln!("    Per step:             {:>8.3}ms", per_step * 1e3);
        }

        eprintln!("  ─────────────────────────────────");
        eprintln!("  Communication:          {:>8.3}s", self.communication().as_secs_f64());
        eprintln!("  Total:                  {:>8.3}s", total.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn communication_sums_message_phases() {
        let mut stats = Stats::new();
        stats.distribute = Duration::from_millis(3);
        stats.halo_exchange = Duration::from_millis(2);
        stats.gather = Duration::from_millis(5);
        stats.local_derivative = Duration::from_millis(100);
        assert_eq!(stats.communication(), Duration::from_millis(10));
    }
}
