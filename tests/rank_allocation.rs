mod util;

use flux_stepper::algs::Communicator;
use flux_stepper::data::Inifile;
use flux_stepper::partitioning::{MeshConnectivity, get_rank_allocation};
use flux_stepper::solver_error::{ErrorKind, SolverError};
use proptest::prelude::*;
use util::run_ranks;

fn ring(n: usize) -> MeshConnectivity {
    if n == 1 {
        return MeshConnectivity::default();
    }
    let adj = (0..n)
        .map(|p| {
            let mut v = vec![(p + n - 1) % n, (p + 1) % n];
            v.sort_unstable();
            v.dedup();
            v
        })
        .collect();
    MeshConnectivity::from_adjacency(adj)
}

fn random_cfg(seed: u64) -> Inifile {
    let mut cfg = Inifile::new();
    cfg.set("backend", "rank-allocator", "random");
    cfg.set("backend", "rank-allocator-seed", seed);
    cfg
}

#[test]
fn every_rank_holds_the_same_allocation() {
    for n in 2..=4 {
        let allocs = run_ranks(n, move |comm| {
            // only the root needs to see the mesh
            let mesh = if comm.rank() == 0 { ring(n) } else { MeshConnectivity::default() };
            get_rank_allocation(&mesh, &Inifile::new(), &comm).unwrap()
        });
        let runid = allocs[0].runid;
        for (r, a) in allocs.iter().enumerate() {
            assert_eq!(a.runid, runid);
            assert_eq!(a.prank, r);
            assert_eq!(a.mprankmap, allocs[0].mprankmap);
            assert_eq!(a.prankconn, allocs[0].prankconn);
        }
    }
}

#[test]
fn two_partitions_linear() {
    let allocs = run_ranks(2, |comm| {
        get_rank_allocation(&MeshConnectivity::from_relation_names(["con_p0p1", "con_p1p0"]), &Inifile::new(), &comm)
            .unwrap()
    });
    assert_eq!(allocs[0].mprankmap, vec![0, 1]);
    assert_eq!(allocs[1].neighbour_ranks(), vec![0]);
}

#[test]
fn four_partitions_on_three_workers() {
    let errs = run_ranks(3, |comm| get_rank_allocation(&ring(4), &Inifile::new(), &comm).unwrap_err());
    for e in errs {
        assert_eq!(e.kind(), ErrorKind::Configuration);
        let msg = e.to_string();
        assert!(msg.contains('4') && msg.contains('3'), "{msg}");
    }
}

#[test]
fn asymmetric_connectivity_fails_everywhere() {
    let mesh = MeshConnectivity::from_adjacency(vec![vec![1], vec![]]);
    let errs = run_ranks(2, move |comm| get_rank_allocation(&mesh, &Inifile::new(), &comm).unwrap_err());
    for e in errs {
        assert_eq!(e.kind(), ErrorKind::Integrity);
        assert_eq!(e, SolverError::AsymmetricConnectivity { lhs: 0, rhs: 1 });
    }
}

#[test]
fn unknown_allocator_is_rejected() {
    let mut cfg = Inifile::new();
    cfg.set("backend", "rank-allocator", "metis");
    let err = get_rank_allocation(&MeshConnectivity::default(), &cfg, &flux_stepper::algs::NoComm).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn random_allocation_is_a_bijection(n in 1usize..=4, seed in any::<u64>()) {
        let allocs = run_ranks(n, move |comm| {
            get_rank_allocation(&ring(n), &random_cfg(seed), &comm).unwrap()
        });
        for (r, a) in allocs.iter().enumerate() {
            prop_assert_eq!(&a.mprankmap, &allocs[0].mprankmap);
            prop_assert_eq!(a.pmrankmap[a.mprankmap[r]], r);
            prop_assert_eq!(a.prank, a.mprankmap[r]);
        }
        let mut sorted = allocs[0].mprankmap.clone();
        sorted.sort_unstable();
        prop_assert_eq!(sorted, (0..n).collect::<Vec<_>>());
    }
}
