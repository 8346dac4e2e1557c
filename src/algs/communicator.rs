//! Thin façade over in-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are contiguous byte slices. Every transfer returns a handle that
//! must be passed to [`Wait::wait`] before the data it carries may be used;
//! nothing is delivered implicitly. Ordering is guaranteed only per
//! `(sender, receiver, tag)` triple.
//!
//! Collectives (`broadcast`, `gather`, reductions, `barrier`) are provided
//! methods layered on the point-to-point primitives using reserved tags, so
//! a backend only has to supply `isend`/`irecv`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;

use crate::algs::wire::{decode_f64s, decode_u64s, encode_f64s, encode_u64s, expect_exact_len};
use crate::solver_error::SolverError;

/// Tags reserved for collectives. Exchange tags must stay below `0xFF00`.
pub mod tags {
    pub const BCAST_LEN: u16 = 0xFF01;
    pub const BCAST: u16 = 0xFF02;
    pub const GATHER_LEN: u16 = 0xFF03;
    pub const GATHER: u16 = 0xFF04;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Block until the transfer completes; receives yield their payload.
    fn wait(self) -> Result<Option<Vec<u8>>, SolverError>;
}

impl Wait for () {
    fn wait(self) -> Result<Option<Vec<u8>>, SolverError> {
        Ok(None)
    }
}

/// Non-blocking communication interface.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn is_no_comm(&self) -> bool {
        false
    }

    /// Post a send of `buf` to `peer`. The buffer is copied; it may be reused
    /// immediately.
    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;

    /// Post a receive of exactly `len` bytes from `peer`.
    fn irecv(&self, peer: usize, tag: u16, len: usize) -> Self::RecvHandle;

    /// Blocking receive of exactly `len` bytes.
    fn recv_bytes(&self, peer: usize, tag: u16, len: usize) -> Result<Vec<u8>, SolverError> {
        let data = self
            .irecv(peer, tag, len)
            .wait()?
            .ok_or_else(|| SolverError::comm(peer, tag, "receive completed without data"))?;
        expect_exact_len(data.len(), len).map_err(|e| SolverError::comm(peer, tag, e))?;
        Ok(data)
    }

    /// Broadcast `payload` (required on `root`, ignored elsewhere).
    fn broadcast(&self, root: usize, payload: Option<Vec<u8>>) -> Result<Vec<u8>, SolverError> {
        if self.rank() == root {
            let data = payload
                .ok_or_else(|| SolverError::comm(root, tags::BCAST, "root has nothing to broadcast"))?;
            let len = encode_u64s(&[data.len() as u64]);
            let mut pending = Vec::new();
            for peer in (0..self.size()).filter(|&r| r != root) {
                pending.push(self.isend(peer, tags::BCAST_LEN, &len));
                pending.push(self.isend(peer, tags::BCAST, &data));
            }
            for h in pending {
                h.wait()?;
            }
            Ok(data)
        } else {
            let len = self.recv_bytes(root, tags::BCAST_LEN, 8)?;
            let len = decode_u64s(&len).map_err(|e| SolverError::comm(root, tags::BCAST_LEN, e))?[0];
            self.recv_bytes(root, tags::BCAST, len as usize)
        }
    }

    /// Gather one payload per rank on `root`, in rank order.
    fn gather(&self, root: usize, payload: &[u8]) -> Result<Option<Vec<Vec<u8>>>, SolverError> {
        if self.rank() == root {
            let mut out = Vec::with_capacity(self.size());
            for peer in 0..self.size() {
                if peer == root {
                    out.push(payload.to_vec());
                    continue;
                }
                let len = self.recv_bytes(peer, tags::GATHER_LEN, 8)?;
                let len = decode_u64s(&len).map_err(|e| SolverError::comm(peer, tags::GATHER_LEN, e))?[0];
                out.push(self.recv_bytes(peer, tags::GATHER, len as usize)?);
            }
            Ok(Some(out))
        } else {
            let a = self.isend(root, tags::GATHER_LEN, &encode_u64s(&[payload.len() as u64]));
            let b = self.isend(root, tags::GATHER, payload);
            a.wait()?;
            b.wait()?;
            Ok(None)
        }
    }

    /// Element-wise sum of `vals` over all ranks, result on `root` only.
    ///
    /// Contributions are added in rank order so the result is reproducible.
    fn reduce_sum_f64(&self, root: usize, vals: &[f64]) -> Result<Option<Vec<f64>>, SolverError> {
        let Some(parts) = self.gather(root, &encode_f64s(vals))? else {
            return Ok(None);
        };
        let mut acc = vec![0.0; vals.len()];
        for (peer, part) in parts.iter().enumerate() {
            let part = decode_f64s(part).map_err(|e| SolverError::comm(peer, tags::GATHER, e))?;
            if part.len() != acc.len() {
                return Err(SolverError::comm(
                    peer,
                    tags::GATHER,
                    format!("reduction of {} values, peer sent {}", acc.len(), part.len()),
                ));
            }
            for (a, p) in acc.iter_mut().zip(part) {
                *a += p;
            }
        }
        Ok(Some(acc))
    }

    /// Element-wise sum of `vals` over all ranks, result everywhere.
    fn allreduce_sum_f64(&self, vals: &[f64]) -> Result<Vec<f64>, SolverError> {
        let reduced = self.reduce_sum_f64(0, vals)?;
        let bytes = self.broadcast(0, reduced.map(|r| encode_f64s(&r)))?;
        decode_f64s(&bytes).map_err(|e| SolverError::comm(0, tags::BCAST, e))
    }

    /// Sum of one integer over all ranks, result everywhere.
    fn allreduce_sum_u64(&self, val: u64) -> Result<u64, SolverError> {
        let parts = self.gather(0, &encode_u64s(&[val]))?;
        let total = match parts {
            Some(parts) => {
                let mut total = 0u64;
                for (peer, p) in parts.iter().enumerate() {
                    let v = decode_u64s(p).map_err(|e| SolverError::comm(peer, tags::GATHER, e))?;
                    total += v.first().copied().unwrap_or(0);
                }
                Some(encode_u64s(&[total]))
            }
            None => None,
        };
        let bytes = self.broadcast(0, total)?;
        let v = decode_u64s(&bytes).map_err(|e| SolverError::comm(0, tags::BCAST, e))?;
        Ok(v.first().copied().unwrap_or(0))
    }

    fn barrier(&self) -> Result<(), SolverError> {
        let token = self.gather(0, &[])?.map(|_| Vec::new());
        self.broadcast(0, token).map(|_| ())
    }
}

/// Object-safe subset of the collectives, for components stored behind
/// trait objects (controllers, plugins) that cannot be generic over the
/// transport.
pub trait Reductions {
    fn world_rank(&self) -> usize;
    fn world_size(&self) -> usize;
    /// Element-wise sum over all ranks, result everywhere.
    fn sum_all(&self, vals: &[f64]) -> Result<Vec<f64>, SolverError>;
    /// Element-wise sum over all ranks, result on `root` only.
    fn sum_to_root(&self, root: usize, vals: &[f64]) -> Result<Option<Vec<f64>>, SolverError>;
}

impl<C: Communicator> Reductions for C {
    fn world_rank(&self) -> usize {
        self.rank()
    }
    fn world_size(&self) -> usize {
        self.size()
    }
    fn sum_all(&self, vals: &[f64]) -> Result<Vec<f64>, SolverError> {
        self.allreduce_sum_f64(vals)
    }
    fn sum_to_root(&self, root: usize, vals: &[f64]) -> Result<Option<Vec<f64>>, SolverError> {
        self.reduce_sum_f64(root, vals)
    }
}

/// Single-rank communicator for serial runs and unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn is_no_comm(&self) -> bool {
        true
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _len: usize) {}
}

// --- ThreadComm: in-process ranks, one per thread ---
type Key = (usize, usize, u16); // (src, dst, tag)
type Mailbox = DashMap<Key, VecDeque<Bytes>>;

/// Default time a receive waits before it is declared failed.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(60);

/// One rank of an in-process universe.
///
/// All ranks created by one [`ThreadComm::universe`] call share a mailbox;
/// separate universes never see each other's messages.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
    timeout: Duration,
}

impl fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl ThreadComm {
    /// Create `size` connected ranks.
    pub fn universe(size: usize) -> Vec<ThreadComm> {
        let mailbox = Arc::new(Mailbox::new());
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
                timeout: DEFAULT_RECV_TIMEOUT,
            })
            .collect()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Send handle; sends complete on posting, so this only carries errors.
pub struct ThreadSend(Option<SolverError>);

impl Wait for ThreadSend {
    fn wait(self) -> Result<Option<Vec<u8>>, SolverError> {
        match self.0 {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

pub struct ThreadRecv {
    mailbox: Arc<Mailbox>,
    key: Key,
    len: usize,
    timeout: Duration,
}

impl ThreadRecv {
    fn try_take(&self) -> Option<Bytes> {
        let mut queue = self.mailbox.get_mut(&self.key)?;
        queue.pop_front()
    }
}

impl Wait for ThreadRecv {
    fn wait(self) -> Result<Option<Vec<u8>>, SolverError> {
        let (src, _, tag) = self.key;
        let deadline = Instant::now() + self.timeout;
        let mut spins = 0u32;
        loop {
            if let Some(bytes) = self.try_take() {
                expect_exact_len(bytes.len(), self.len)
                    .map_err(|e| SolverError::comm(src, tag, e))?;
                return Ok(Some(bytes.to_vec()));
            }
            if Instant::now() >= deadline {
                return Err(SolverError::comm(
                    src,
                    tag,
                    format!("no message after {:?}", self.timeout),
                ));
            }
            spins += 1;
            if spins < 64 {
                std::thread::yield_now();
            } else {
                std::thread::sleep(Duration::from_micros(50));
            }
        }
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ThreadSend;
    type RecvHandle = ThreadRecv;

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> ThreadSend {
        if peer >= self.size {
            return ThreadSend(Some(SolverError::comm(
                peer,
                tag,
                format!("no such rank in a universe of {}", self.size),
            )));
        }
        self.mailbox
            .entry((self.rank, peer, tag))
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
        ThreadSend(None)
    }

    fn irecv(&self, peer: usize, tag: u16, len: usize) -> ThreadRecv {
        ThreadRecv {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
            len,
            timeout: self.timeout,
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::request::StaticScope;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    pub struct MpiComm {
        _universe: mpi::environment::Universe,
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, SolverError> {
            let universe = mpi::initialize()
                .ok_or_else(|| SolverError::comm(0, 0, "MPI was already initialised"))?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                _universe: universe,
                world,
                rank,
                size,
            })
        }
    }

    /// Outstanding request; the transfer buffer is owned until `wait`.
    pub struct MpiHandle(Box<dyn FnOnce() -> Option<Vec<u8>>>);

    impl Wait for MpiHandle {
        fn wait(self) -> Result<Option<Vec<u8>>, SolverError> {
            Ok((self.0)())
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiHandle;
        type RecvHandle = MpiHandle;

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiHandle {
            let ptr: *mut [u8] = Box::into_raw(buf.to_vec().into_boxed_slice());
            // SAFETY: `ptr` is released only after the request has completed.
            let data: &'static [u8] = unsafe { &*ptr };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, data, tag as i32);
            MpiHandle(Box::new(move || {
                req.wait();
                drop(unsafe { Box::from_raw(ptr) });
                None
            }))
        }

        fn irecv(&self, peer: usize, tag: u16, len: usize) -> MpiHandle {
            let ptr: *mut [u8] = Box::into_raw(vec![0u8; len].into_boxed_slice());
            // SAFETY: as above; the buffer is read back only after completion.
            let data: &'static mut [u8] = unsafe { &mut *ptr };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, data, tag as i32);
            MpiHandle(Box::new(move || {
                req.wait();
                let buf = unsafe { Box::from_raw(ptr) };
                Some(buf.into_vec())
            }))
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
