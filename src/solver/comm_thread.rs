//! In-process communication backend: one OS thread per rank.
//!
//! Every ordered pair of ranks is connected by a zero-capacity
//! `crossbeam_channel`, so a send blocks until the peer takes the message.
//! This is strictly blocking message passing: an exchange where both sides
//! send first stalls exactly as it would over a synchronous transport.
//! Collectives are built from point-to-point messages routed through the
//! coordinator.
//!
//! With a deadline configured, a send or receive that stalls longer than the
//! deadline fails with a communication error instead of hanging, which is how
//! the tests bound per-step progress.

use super::comm::{
    check_chunked, check_len, local_host_name, CommunicationBackend, HaloTag, COORDINATOR,
};
use crate::error::{AdvectrixError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Halo(HaloTag),
    Scatter,
    Gather,
    Broadcast,
    Barrier,
    Reduce,
}

struct Envelope {
    kind: Kind,
    payload: Vec<f64>,
}

/// One rank's endpoint of an in-process fabric.
pub struct ThreadComm {
    rank: usize,
    num_ranks: usize,
    /// `outbox[dest]`, `None` for self.
    outbox: Vec<Option<Sender<Envelope>>>,
    /// `inbox[source]`, `None` for self.
    inbox: Vec<Option<Receiver<Envelope>>>,
    start: Instant,
    deadline: Option<Duration>,
}

impl ThreadComm {
    /// Build a fully connected fabric of `num_ranks` endpoints, index = rank.
    pub fn create(num_ranks: usize) -> Vec<ThreadComm> {
        Self::create_with_deadline(num_ranks, None)
    }

    /// Like `create`, with every blocking operation bounded by `deadline`.
    pub fn create_with_deadline(num_ranks: usize, deadline: Option<Duration>) -> Vec<ThreadComm> {
        let start = Instant::now();
        let mut outboxes: Vec<Vec<Option<Sender<Envelope>>>> =
            (0..num_ranks).map(|_| (0..num_ranks).map(|_| None).collect()).collect();
        let mut inboxes: Vec<Vec<Option<Receiver<Envelope>>>> =
            (0..num_ranks).map(|_| (0..num_ranks).map(|_| None).collect()).collect();

        for src in 0..num_ranks {
            for dst in 0..num_ranks {
                if src != dst {
                    let (tx, rx) = bounded(0);
                    outboxes[src][dst] = Some(tx);
                    inboxes[dst][src] = Some(rx);
                }
            }
        }

        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outbox, inbox))| ThreadComm {
                rank,
                num_ranks,
                outbox,
                inbox,
                start,
                deadline,
            })
            .collect()
    }

    fn post(&self, dest: usize, kind: Kind, payload: Vec<f64>) -> Result<()> {
        let tx = self
            .outbox
            .get(dest)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                AdvectrixError::Communication(format!(
                    "rank {} has no channel to rank {dest}",
                    self.rank
                ))
            })?;
        let envelope = Envelope { kind, payload };
        match self.deadline {
            None => tx.send(envelope).map_err(|_| self.disconnected(dest, kind)),
            Some(limit) => tx.send_timeout(envelope, limit).map_err(|e| match e {
                SendTimeoutError::Timeout(_) => AdvectrixError::Communication(format!(
                    "rank {} timed out after {limit:?} sending {kind:?} to rank {dest}",
                    self.rank
                )),
                SendTimeoutError::Disconnected(_) => self.disconnected(dest, kind),
            }),
        }
    }

    fn take(&self, source: usize, kind: Kind) -> Result<Vec<f64>> {
        let rx = self
            .inbox
            .get(source)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                AdvectrixError::Communication(format!(
                    "rank {} has no channel from rank {source}",
                    self.rank
                ))
            })?;
        let envelope = match self.deadline {
            None => rx.recv().map_err(|_| self.disconnected(source, kind))?,
            Some(limit) => rx.recv_timeout(limit).map_err(|e| match e {
                RecvTimeoutError::Timeout => AdvectrixError::Communication(format!(
                    "rank {} timed out after {limit:?} waiting for {kind:?} from rank {source}",
                    self.rank
                )),
                RecvTimeoutError::Disconnected => self.disconnected(source, kind),
            })?,
        };
        if envelope.kind != kind {
            return Err(AdvectrixError::Communication(format!(
                "rank {} expected {kind:?} from rank {source}, got {:?}",
                self.rank, envelope.kind
            )));
        }
        Ok(envelope.payload)
    }

    fn disconnected(&self, peer: usize, kind: Kind) -> AdvectrixError {
        AdvectrixError::Communication(format!(
            "rank {} lost rank {peer} during {kind:?}",
            self.rank
        ))
    }

    fn peers(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_ranks).filter(move |&r| r != self.rank)
    }
}

impl CommunicationBackend for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn num_ranks(&self) -> usize {
        self.num_ranks
    }

    fn processor_name(&self) -> String {
        local_host_name()
    }

    fn scatter(&self, global: &[f64], local: &mut [f64]) -> Result<()> {
        let n = local.len();
        if self.rank == COORDINATOR {
            check_chunked("scatter", global.len(), n, self.num_ranks)?;
            for r in self.peers() {
                self.post(r, Kind::Scatter, global[r * n..(r + 1) * n].to_vec())?;
            }
            local.copy_from_slice(&global[COORDINATOR * n..(COORDINATOR + 1) * n]);
        } else {
            let chunk = self.take(COORDINATOR, Kind::Scatter)?;
            check_len("scatter", n, chunk.len())?;
            local.copy_from_slice(&chunk);
        }
        Ok(())
    }

    fn gather(&self, local: &[f64], global: &mut [f64]) -> Result<()> {
        let n = local.len();
        if self.rank == COORDINATOR {
            check_chunked("gather", global.len(), n, self.num_ranks)?;
            global[COORDINATOR * n..(COORDINATOR + 1) * n].copy_from_slice(local);
            for r in self.peers() {
                let chunk = self.take(r, Kind::Gather)?;
                check_len("gather", n, chunk.len())?;
                global[r * n..(r + 1) * n].copy_from_slice(&chunk);
            }
        } else {
            self.post(COORDINATOR, Kind::Gather, local.to_vec())?;
        }
        Ok(())
    }

    fn broadcast(&self, buffer: &mut [f64]) -> Result<()> {
        if self.rank == COORDINATOR {
            for r in self.peers() {
                self.post(r, Kind::Broadcast, buffer.to_vec())?;
            }
        } else {
            let data = self.take(COORDINATOR, Kind::Broadcast)?;
            check_len("broadcast", buffer.len(), data.len())?;
            buffer.copy_from_slice(&data);
        }
        Ok(())
    }

    fn send(&self, data: &[f64], dest: usize, tag: HaloTag) -> Result<()> {
        self.post(dest, Kind::Halo(tag), data.to_vec())
    }

    fn receive(&self, buffer: &mut [f64], source: usize, tag: HaloTag) -> Result<()> {
        let data = self.take(source, Kind::Halo(tag))?;
        check_len("receive", buffer.len(), data.len())?;
        buffer.copy_from_slice(&data);
        Ok(())
    }

    fn barrier(&self) -> Result<()> {
        if self.rank == COORDINATOR {
            for r in self.peers() {
                self.take(r, Kind::Barrier)?;
            }
            for r in self.peers() {
                self.post(r, Kind::Barrier, Vec::new())?;
            }
        } else {
            self.post(COORDINATOR, Kind::Barrier, Vec::new())?;
            self.take(COORDINATOR, Kind::Barrier)?;
        }
        Ok(())
    }

    fn wall_time(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn all_reduce_max(&self, local: f64) -> Result<f64> {
        if self.rank == COORDINATOR {
            let mut max = local;
            for r in self.peers() {
                let value = self.take(r, Kind::Reduce)?;
                check_len("all_reduce_max", 1, value.len())?;
                max = max.max(value[0]);
            }
            for r in self.peers() {
                self.post(r, Kind::Reduce, vec![max])?;
            }
            Ok(max)
        } else {
            self.post(COORDINATOR, Kind::Reduce, vec![local])?;
            let value = self.take(COORDINATOR, Kind::Reduce)?;
            check_len("all_reduce_max", 1, value.len())?;
            Ok(value[0])
        }
    }
}

/// Run `worker` on `num_ranks` threads, one `ThreadComm` each.
///
/// Returns the per-rank results in rank order. If any rank fails, the run
/// fails: a non-communication error (the likely root cause) is preferred over
/// the disconnect errors it triggers on the other ranks.
pub fn run_on_threads<T, F>(num_ranks: usize, deadline: Option<Duration>, worker: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(ThreadComm) -> Result<T> + Sync,
{
    if num_ranks == 0 {
        return Err(AdvectrixError::Communication(
            "cannot launch zero ranks".into(),
        ));
    }

    let comms = ThreadComm::create_with_deadline(num_ranks, deadline);
    let outcomes: Vec<Result<T>> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(num_ranks);
        for comm in comms {
            let rank = comm.rank();
            let worker = &worker;
            let spawned = thread::Builder::new()
                .name(format!("rank-{rank}"))
                .spawn_scoped(scope, move || worker(comm));
            handles.push((rank, spawned));
        }
        handles
            .into_iter()
            .map(|(rank, spawned)| match spawned {
                Ok(handle) => handle.join().unwrap_or_else(|_| {
                    Err(AdvectrixError::Communication(format!("rank {rank} panicked")))
                }),
                Err(e) => Err(AdvectrixError::Io(e)),
            })
            .collect()
    });

    let mut results = Vec::with_capacity(num_ranks);
    let mut first_comm_err = None;
    for outcome in outcomes {
        match outcome {
            Ok(value) => results.push(value),
            Err(e) if e.is_communication() => {
                first_comm_err.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }
    match first_comm_err {
        Some(e) => Err(e),
        None => Ok(results),
    }
}
