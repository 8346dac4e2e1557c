//! Rank allocation: the single place where every worker agrees on topology.
//!
//! The root validates the mesh connectivity and the worker count, gathers
//! per-rank information, computes the rank -> partition map with the
//! configured [`RankAllocator`] and broadcasts connectivity, map and a fresh
//! [`RunId`]. Every rank ends up holding an identical [`RankAllocation`].
//!
//! The validation outcome is itself broadcast before anything else, so a
//! misconfigured run fails with the same error on every rank instead of
//! leaving non-root ranks blocked in a collective.

pub mod allocator;
pub mod connectivity;
pub mod run_id;

pub use allocator::{LinearRankAllocator, RandomRankAllocator, RankAllocator};
pub use connectivity::{MeshConnectivity, PartitionConnectivity};
pub use run_id::RunId;

use serde::{Deserialize, Serialize};

use crate::algs::communicator::{Communicator, tags};
use crate::algs::wire::{self, kind};
use crate::data::inifile::Inifile;
use crate::debug_invariants::DebugInvariants;
use crate::solver_error::SolverError;

/// Rank that performs validation and mapping.
pub const ROOT: usize = 0;

/// Identical topology view held by every worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankAllocation {
    /// Partition adjacency.
    pub prankconn: PartitionConnectivity,
    /// Rank -> physical partition.
    pub mprankmap: Vec<usize>,
    /// Physical partition -> rank.
    pub pmrankmap: Vec<usize>,
    /// Physical partition owned by this rank.
    pub prank: usize,
    pub runid: RunId,
}

/// Build the allocation using the strategy named in `[backend]
/// rank-allocator` (default `linear`).
///
/// `mesh` is only read on the root; other ranks may pass an empty
/// connectivity.
pub fn get_rank_allocation<C: Communicator>(
    mesh: &MeshConnectivity,
    cfg: &Inifile,
    comm: &C,
) -> Result<RankAllocation, SolverError> {
    let name = cfg.get_or("backend", "rank-allocator", "linear");
    let strategy = allocator::rank_allocator_by_name(name, cfg)?;
    RankAllocation::new(strategy.as_ref(), mesh, comm)
}

impl RankAllocation {
    pub fn new<C: Communicator>(
        strategy: &dyn RankAllocator,
        mesh: &MeshConnectivity,
        comm: &C,
    ) -> Result<Self, SolverError> {
        let rank = comm.rank();
        let is_root = rank == ROOT;

        // Determine and check the physical connectivity of the mesh
        let prankconn = if is_root {
            let checked = mesh.validate().and_then(|conn| {
                if conn.nparts() != comm.size() {
                    Err(SolverError::PartitionCountMismatch {
                        partitions: conn.nparts(),
                        workers: comm.size(),
                    })
                } else {
                    Ok(conn)
                }
            });
            share_status(comm, Some(checked.as_ref().map(|_| ())))?;
            Some(checked?)
        } else {
            share_status(comm, None)?;
            None
        };

        let conn_rec = prankconn
            .as_ref()
            .map(|c| wire::encode_record(kind::CONNECTIVITY, &wire::encode_adjacency(c.as_adjacency())));
        let conn_rec = comm.broadcast(ROOT, conn_rec)?;
        let prankconn = match prankconn {
            Some(c) => c,
            None => {
                let words = wire::decode_record(kind::CONNECTIVITY, &conn_rec)
                    .map_err(|e| SolverError::comm(ROOT, tags::BCAST, e))?;
                let adj = wire::decode_adjacency(&words)
                    .map_err(|e| SolverError::comm(ROOT, tags::BCAST, e))?;
                PartitionConnectivity::from_wire(adj)?
            }
        };

        // Strategy dependent information about each rank
        let rinfo = comm.gather(ROOT, &strategy.rank_info())?;

        let mprankmap = match rinfo {
            Some(rinfo) => {
                let map = strategy
                    .mprankmap(&prankconn, &rinfo)
                    .and_then(|m| check_bijection(m, prankconn.nparts()));
                share_status(comm, Some(map.as_ref().map(|_| ())))?;
                Some(map?)
            }
            None => {
                share_status(comm, None)?;
                None
            }
        };

        let map_rec = mprankmap.as_ref().map(|m| {
            let words: Vec<u64> = m.iter().map(|&p| p as u64).collect();
            wire::encode_record(kind::RANK_MAP, &words)
        });
        let map_rec = comm.broadcast(ROOT, map_rec)?;
        let mprankmap = match mprankmap {
            Some(m) => m,
            None => {
                let words = wire::decode_record(kind::RANK_MAP, &map_rec)
                    .map_err(|e| SolverError::comm(ROOT, tags::BCAST, e))?;
                let m = words.into_iter().map(|p| p as usize).collect();
                check_bijection(m, prankconn.nparts())?
            }
        };

        let mut pmrankmap = vec![0; mprankmap.len()];
        for (r, &p) in mprankmap.iter().enumerate() {
            pmrankmap[p] = r;
        }
        let prank = mprankmap[rank];

        let id_rec = is_root.then(|| wire::encode_record(kind::RUN_ID, &RunId::new_v4().to_words()));
        let id_rec = comm.broadcast(ROOT, id_rec)?;
        let words = wire::decode_record(kind::RUN_ID, &id_rec)
            .map_err(|e| SolverError::comm(ROOT, tags::BCAST, e))?;
        let &[hi, lo] = words.as_slice() else {
            return Err(SolverError::comm(ROOT, tags::BCAST, "run id record must hold two words"));
        };
        let runid = RunId::from_words(hi, lo);

        if is_root {
            log::info!(
                "rank allocation: {} partitions, run id {runid}",
                prankconn.nparts()
            );
        }
        log::debug!("rank {rank} owns physical partition {prank}");

        let alloc = RankAllocation {
            prankconn,
            mprankmap,
            pmrankmap,
            prank,
            runid,
        };
        alloc.debug_assert_invariants();
        Ok(alloc)
    }

    /// Rank that owns physical partition `p`.
    pub fn rank_of(&self, p: usize) -> Option<usize> {
        self.pmrankmap.get(p).copied()
    }

    /// Ranks owning the partitions adjacent to ours, in partition order.
    pub fn neighbour_ranks(&self) -> Vec<usize> {
        self.prankconn
            .neighbours(self.prank)
            .iter()
            .map(|&p| self.pmrankmap[p])
            .collect()
    }
}

impl DebugInvariants for RankAllocation {
    fn validate_invariants(&self) -> Result<(), SolverError> {
        let n = self.prankconn.nparts();
        check_bijection(self.mprankmap.clone(), n)?;
        for (r, &p) in self.mprankmap.iter().enumerate() {
            if self.pmrankmap.get(p) != Some(&r) {
                return Err(SolverError::InvalidRankMap {
                    nparts: n,
                    mapping: self.pmrankmap.clone(),
                });
            }
        }
        Ok(())
    }
}

fn check_bijection(map: Vec<usize>, nparts: usize) -> Result<Vec<usize>, SolverError> {
    let mut seen = vec![false; nparts];
    let ok = map.len() == nparts
        && map
            .iter()
            .all(|&p| p < nparts && !std::mem::replace(&mut seen[p], true));
    if ok {
        Ok(map)
    } else {
        Err(SolverError::InvalidRankMap {
            nparts,
            mapping: map,
        })
    }
}

// Status codes carried in STATUS records.
const STATUS_OK: u64 = 0;
const STATUS_COUNT: u64 = 1;
const STATUS_ASYMMETRIC: u64 = 2;
const STATUS_NUMBERING: u64 = 3;
const STATUS_RANK_MAP: u64 = 4;
const STATUS_OTHER: u64 = 5;

fn encode_status(status: Result<(), &SolverError>) -> Vec<u64> {
    let with_list = |code: u64, n: usize, list: &[usize]| {
        let mut w = vec![code, n as u64];
        w.extend(list.iter().map(|&v| v as u64));
        w
    };
    match status {
        Ok(()) => vec![STATUS_OK],
        Err(SolverError::PartitionCountMismatch {
            partitions,
            workers,
        }) => vec![STATUS_COUNT, *partitions as u64, *workers as u64],
        Err(SolverError::AsymmetricConnectivity { lhs, rhs }) => {
            vec![STATUS_ASYMMETRIC, *lhs as u64, *rhs as u64]
        }
        Err(SolverError::InvalidPartitionNumbering { expected, found }) => {
            with_list(STATUS_NUMBERING, *expected, found)
        }
        Err(SolverError::InvalidRankMap { nparts, mapping }) => {
            with_list(STATUS_RANK_MAP, *nparts, mapping)
        }
        Err(_) => vec![STATUS_OTHER],
    }
}

fn decode_status(words: &[u64]) -> Result<(), SolverError> {
    let at = |i: usize| words.get(i).copied().unwrap_or(0) as usize;
    let tail = || -> Vec<usize> { words.iter().skip(2).map(|&v| v as usize).collect() };
    match words.first().copied() {
        Some(STATUS_OK) => Ok(()),
        Some(STATUS_COUNT) => Err(SolverError::PartitionCountMismatch {
            partitions: at(1),
            workers: at(2),
        }),
        Some(STATUS_ASYMMETRIC) => Err(SolverError::AsymmetricConnectivity {
            lhs: at(1),
            rhs: at(2),
        }),
        Some(STATUS_NUMBERING) => Err(SolverError::InvalidPartitionNumbering {
            expected: at(1),
            found: tail(),
        }),
        Some(STATUS_RANK_MAP) => Err(SolverError::InvalidRankMap {
            nparts: at(1),
            mapping: tail(),
        }),
        _ => Err(SolverError::comm(ROOT, tags::BCAST, "rank allocation failed on the root")),
    }
}

/// Broadcast the root's validation outcome; every rank returns it.
fn share_status<C: Communicator>(
    comm: &C,
    status: Option<Result<(), &SolverError>>,
) -> Result<(), SolverError> {
    let rec = status.map(|s| wire::encode_record(kind::STATUS, &encode_status(s)));
    let rec = comm.broadcast(ROOT, rec)?;
    let words = wire::decode_record(kind::STATUS, &rec)
        .map_err(|e| SolverError::comm(ROOT, tags::BCAST, e))?;
    if comm.rank() == ROOT {
        // the root reports its own, fully detailed error
        return Ok(());
    }
    decode_status(&words)
}
