//! Rank allocation strategies.
//!
//! A strategy supplies two hooks: the per-rank information gathered on the
//! root, and the rank -> partition map the root computes from the
//! connectivity and that information. Strategies are looked up by name.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

use crate::data::inifile::Inifile;
use crate::partitioning::connectivity::PartitionConnectivity;
use crate::solver_error::SolverError;

/// Rank to physical partition mapping strategy.
pub trait RankAllocator {
    /// Registry name of this strategy.
    fn name(&self) -> &'static str;

    /// Opaque information about the calling rank, gathered on the root.
    fn rank_info(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Map from rank to physical partition (`mprankmap`), computed on the
    /// root. `rinfo` holds one [`rank_info`](Self::rank_info) per rank.
    fn mprankmap(
        &self,
        prankconn: &PartitionConnectivity,
        rinfo: &[Vec<u8>],
    ) -> Result<Vec<usize>, SolverError>;
}

/// Rank `i` owns partition `i`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinearRankAllocator;

impl RankAllocator for LinearRankAllocator {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn mprankmap(
        &self,
        _prankconn: &PartitionConnectivity,
        rinfo: &[Vec<u8>],
    ) -> Result<Vec<usize>, SolverError> {
        Ok((0..rinfo.len()).collect())
    }
}

/// Seeded random shuffle of partitions over ranks.
#[derive(Clone, Copy, Debug)]
pub struct RandomRankAllocator {
    seed: u64,
}

impl RandomRankAllocator {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl RankAllocator for RandomRankAllocator {
    fn name(&self) -> &'static str {
        "random"
    }

    fn mprankmap(
        &self,
        _prankconn: &PartitionConnectivity,
        rinfo: &[Vec<u8>],
    ) -> Result<Vec<usize>, SolverError> {
        let mut map: Vec<usize> = (0..rinfo.len()).collect();
        map.shuffle(&mut SmallRng::seed_from_u64(self.seed));
        Ok(map)
    }
}

type Ctor = fn(&Inifile) -> Result<Box<dyn RankAllocator>, SolverError>;

fn linear(_cfg: &Inifile) -> Result<Box<dyn RankAllocator>, SolverError> {
    Ok(Box::new(LinearRankAllocator))
}

fn random(cfg: &Inifile) -> Result<Box<dyn RankAllocator>, SolverError> {
    let seed = cfg.getuint_or("backend", "rank-allocator-seed", 0)?;
    Ok(Box::new(RandomRankAllocator::new(seed)))
}

static REGISTRY: Lazy<BTreeMap<&'static str, Ctor>> = Lazy::new(|| {
    let mut m: BTreeMap<&'static str, Ctor> = BTreeMap::new();
    m.insert("linear", linear);
    m.insert("random", random);
    m
});

/// Names of all registered strategies.
pub fn rank_allocator_names() -> impl Iterator<Item = &'static str> {
    REGISTRY.keys().copied()
}

/// Construct the strategy registered under `name`.
pub fn rank_allocator_by_name(
    name: &str,
    cfg: &Inifile,
) -> Result<Box<dyn RankAllocator>, SolverError> {
    let ctor = REGISTRY
        .get(name)
        .ok_or_else(|| SolverError::UnknownStrategy {
            what: "rank allocator",
            name: name.to_owned(),
        })?;
    ctor(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioning::connectivity::MeshConnectivity;

    fn ring(n: usize) -> PartitionConnectivity {
        let adj = (0..n).map(|p| vec![(p + n - 1) % n, (p + 1) % n]).collect();
        MeshConnectivity::from_adjacency(adj).validate().unwrap()
    }

    #[test]
    fn linear_is_identity() {
        let map = LinearRankAllocator
            .mprankmap(&ring(4), &vec![Vec::new(); 4])
            .unwrap();
        assert_eq!(map, vec![0, 1, 2, 3]);
    }

    #[test]
    fn random_is_seeded_permutation() {
        let a = RandomRankAllocator::new(7)
            .mprankmap(&ring(6), &vec![Vec::new(); 6])
            .unwrap();
        let b = RandomRankAllocator::new(7)
            .mprankmap(&ring(6), &vec![Vec::new(); 6])
            .unwrap();
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn registry_lookup() {
        let cfg = Inifile::new();
        assert_eq!(rank_allocator_by_name("linear", &cfg).unwrap().name(), "linear");
        let err = rank_allocator_by_name("hostname", &cfg).err().unwrap();
        assert!(err.to_string().contains("hostname"));
        assert!(rank_allocator_names().any(|n| n == "random"));
    }

    #[test]
    fn random_seed_accepts_large_and_rejects_negative() {
        let mut cfg = Inifile::new();
        cfg.set("backend", "rank-allocator-seed", u64::MAX);
        let alloc = rank_allocator_by_name("random", &cfg).unwrap();
        let map = alloc.mprankmap(&ring(3), &vec![Vec::new(); 3]).unwrap();
        let expected = RandomRankAllocator::new(u64::MAX)
            .mprankmap(&ring(3), &vec![Vec::new(); 3])
            .unwrap();
        assert_eq!(map, expected);

        cfg.set("backend", "rank-allocator-seed", -5);
        let err = rank_allocator_by_name("random", &cfg).err().unwrap();
        assert!(matches!(err, SolverError::InvalidOption { .. }), "{err}");
    }
}
