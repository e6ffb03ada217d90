//! MPI communication backend for the distributed solver.
//!
//! Requires the `distributed` feature flag and an MPI installation.
//! Implements `CommunicationBackend` using `mpi::traits::*` for
//! inter-process communication.
//!
//! # Usage
//!
//! The caller must initialize MPI before constructing `MpiComm` and keep the
//! universe alive for the whole run:
//!
//! ```ignore
//! let universe = mpi::initialize().expect("MPI init failed");
//! let comm = MpiComm::new();
//! ```
//!
//! Size checks only run where the information exists (the coordinator knows
//! the global length, receivers know their buffer). A mismatch seen on one
//! rank leaves the others blocked in the collective; the launcher tears the
//! job down when the failing rank exits.

use super::comm::{check_chunked, CommunicationBackend, HaloTag, COORDINATOR};
use crate::error::{AdvectrixError, Result};
use mpi::collective::SystemOperation;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

/// MPI-based communication backend.
///
/// Wraps the MPI world communicator. Requires `mpi::initialize()` to have
/// been called before construction.
pub struct MpiComm;

impl MpiComm {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MpiComm {
    fn default() -> Self {
        Self::new()
    }
}

impl CommunicationBackend for MpiComm {
    fn rank(&self) -> usize {
        let world = SimpleCommunicator::world();
        world.rank() as usize
    }

    fn num_ranks(&self) -> usize {
        let world = SimpleCommunicator::world();
        world.size() as usize
    }

    fn processor_name(&self) -> String {
        mpi::environment::processor_name().unwrap_or_else(|_| "unknown".to_string())
    }

    fn scatter(&self, global: &[f64], local: &mut [f64]) -> Result<()> {
        let world = SimpleCommunicator::world();
        let root = world.process_at_rank(COORDINATOR as i32);
        if world.rank() == COORDINATOR as i32 {
            check_chunked("scatter", global.len(), local.len(), world.size() as usize)?;
            root.scatter_into_root(global, local);
        } else {
            root.scatter_into(local);
        }
        Ok(())
    }

    fn gather(&self, local: &[f64], global: &mut [f64]) -> Result<()> {
        let world = SimpleCommunicator::world();
        let root = world.process_at_rank(COORDINATOR as i32);
        if world.rank() == COORDINATOR as i32 {
            check_chunked("gather", global.len(), local.len(), world.size() as usize)?;
            root.gather_into_root(local, global);
        } else {
            root.gather_into(local);
        }
        Ok(())
    }

    fn broadcast(&self, buffer: &mut [f64]) -> Result<()> {
        let world = SimpleCommunicator::world();
        let root = world.process_at_rank(COORDINATOR as i32);
        root.broadcast_into(buffer);
        Ok(())
    }

    fn send(&self, data: &[f64], dest: usize, tag: HaloTag) -> Result<()> {
        let world = SimpleCommunicator::world();
        if dest >= world.size() as usize || dest == world.rank() as usize {
            return Err(AdvectrixError::Communication(format!(
                "rank {} cannot send {tag:?} to rank {dest}",
                world.rank()
            )));
        }
        world
            .process_at_rank(dest as i32)
            .send_with_tag(data, tag.id());
        Ok(())
    }

    fn receive(&self, buffer: &mut [f64], source: usize, tag: HaloTag) -> Result<()> {
        let world = SimpleCommunicator::world();
        if source >= world.size() as usize || source == world.rank() as usize {
            return Err(AdvectrixError::Communication(format!(
                "rank {} cannot receive {tag:?} from rank {source}",
                world.rank()
            )));
        }
        let status = world
            .process_at_rank(source as i32)
            .receive_into_with_tag(buffer, tag.id());
        let count = status.count(f64::equivalent_datatype()) as usize;
        if count != buffer.len() {
            return Err(AdvectrixError::Communication(format!(
                "receive {tag:?} from rank {source}: expected {} values, got {count}",
                buffer.len()
            )));
        }
        Ok(())
    }

    fn barrier(&self) -> Result<()> {
        let world = SimpleCommunicator::world();
        world.barrier();
        Ok(())
    }

    fn wall_time(&self) -> f64 {
        mpi::time()
    }

    fn all_reduce_max(&self, local: f64) -> Result<f64> {
        let world = SimpleCommunicator::world();
        let mut global = 0.0f64;
        world.all_reduce_into(&local, &mut global, SystemOperation::max());
        Ok(global)
    }
}
