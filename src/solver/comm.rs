//! Communication backend abstraction for the distributed advection solver.
//!
//! Provides the rank-addressed fabric every worker talks through
//! (scatter/gather/broadcast/barrier, tagged point-to-point messages, a wall
//! clock and a max-reduction) and a single-process implementation.

use crate::error::{AdvectrixError, Result};
use std::time::Instant;

/// Rank that owns the authoritative global field and history.
pub const COORDINATOR: usize = 0;

/// Logical channel of a halo message.
///
/// The tag names the ghost slot the value lands in on the receiver, so a
/// value travelling rightwards fills the receiver's left ghost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HaloTag {
    LeftBoundary,
    RightBoundary,
}

impl HaloTag {
    /// Numeric tag for message-passing libraries.
    pub fn id(self) -> i32 {
        match self {
            HaloTag::LeftBoundary => 10,
            HaloTag::RightBoundary => 11,
        }
    }
}

/// Abstraction over inter-process communication for the distributed solver.
///
/// Implementations: `SingleProcessComm` (one rank), `ThreadComm` (in-process
/// ranks over rendezvous channels), `MpiComm` (via mpi crate).
///
/// Collectives must be called by every rank in the same logical step. Buffers
/// that are only meaningful on the coordinator (`global` in scatter/gather)
/// may be empty on other ranks.
pub trait CommunicationBackend: Send + Sync {
    /// This process's rank.
    fn rank(&self) -> usize;

    /// Total number of ranks.
    fn num_ranks(&self) -> usize;

    /// Host this rank runs on.
    fn processor_name(&self) -> String;

    /// Split `global` (coordinator only) into equal chunks in rank order and
    /// deliver chunk r into rank r's `local`.
    fn scatter(&self, global: &[f64], local: &mut [f64]) -> Result<()>;

    /// Inverse of scatter: the coordinator receives every rank's `local`, in
    /// rank order, into `global`.
    fn gather(&self, local: &[f64], global: &mut [f64]) -> Result<()>;

    /// Replicate the coordinator's `buffer` into every rank's `buffer`.
    fn broadcast(&self, buffer: &mut [f64]) -> Result<()>;

    /// Blocking send of `data` to `dest` on channel `tag`.
    fn send(&self, data: &[f64], dest: usize, tag: HaloTag) -> Result<()>;

    /// Blocking receive from `source` on channel `tag` into `buffer`.
    fn receive(&self, buffer: &mut [f64], source: usize, tag: HaloTag) -> Result<()>;

    /// Synchronization barrier.
    fn barrier(&self) -> Result<()>;

    /// Monotonic clock in seconds, comparable within one run.
    fn wall_time(&self) -> f64;

    /// Max of a local scalar across all ranks, returned on every rank.
    fn all_reduce_max(&self, local: f64) -> Result<f64>;

    fn is_coordinator(&self) -> bool {
        self.rank() == COORDINATOR
    }
}

/// Check the chunk layout of a scatter or gather on the coordinator.
pub(crate) fn check_chunked(op: &str, global: usize, local: usize, ranks: usize) -> Result<()> {
    if global != local * ranks {
        return Err(AdvectrixError::Communication(format!(
            "{op}: global buffer of {global} values cannot hold {ranks} chunks of {local}"
        )));
    }
    Ok(())
}

pub(crate) fn check_len(op: &str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(AdvectrixError::Communication(format!(
            "{op}: expected {expected} values, got {got}"
        )));
    }
    Ok(())
}

pub(crate) fn local_host_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// Communication backend for a single rank.
///
/// Collectives degenerate to copies. There are no peers, so point-to-point
/// messages are an error.
pub struct SingleProcessComm {
    start: Instant,
}

impl SingleProcessComm {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SingleProcessComm {
    fn default() -> Self {
        Self::new()
    }
}

impl CommunicationBackend for SingleProcessComm {
    fn rank(&self) -> usize {
        0
    }

    fn num_ranks(&self) -> usize {
        1
    }

    fn processor_name(&self) -> String {
        local_host_name()
    }

    fn scatter(&self, global: &[f64], local: &mut [f64]) -> Result<()> {
        check_chunked("scatter", global.len(), local.len(), 1)?;
        local.copy_from_slice(global);
        Ok(())
    }

    fn gather(&self, local: &[f64], global: &mut [f64]) -> Result<()> {
        check_chunked("gather", global.len(), local.len(), 1)?;
        global.copy_from_slice(local);
        Ok(())
    }

    fn broadcast(&self, _buffer: &mut [f64]) -> Result<()> {
        Ok(())
    }

    fn send(&self, _data: &[f64], dest: usize, tag: HaloTag) -> Result<()> {
        Err(AdvectrixError::Communication(format!(
            "send {tag:?} to rank {dest}: single-process run has no peers"
        )))
    }

    fn receive(&self, _buffer: &mut [f64], source: usize, tag: HaloTag) -> Result<()> {
        Err(AdvectrixError::Communication(format!(
            "receive {tag:?} from rank {source}: single-process run has no peers"
        )))
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }

    fn wall_time(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn all_reduce_max(&self, local: f64) -> Result<f64> {
        Ok(local)
    }
}
