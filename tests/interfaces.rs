mod util;
use mesh_gamg::agglomeration::Agglomeration;
use mesh_gamg::algs::communicator::{CommTag, Communicator, LocalComm};
use mesh_gamg::gamg_error::GamgError;
use mesh_gamg::topology::interfaces::{
    GamgInterface, InterfaceKind, ProcessorCyclicInterface,
};
use mesh_gamg::topology::primitive_mesh::LduPrimitiveMesh;
use util::*;

/// 2x4 half of a 4x4 grid cut between columns 1 and 2.
fn half_grid(rank: usize) -> LduPrimitiveMesh {
    let cut = if rank == 0 { vec![1, 3, 5, 7] } else { vec![0, 2, 4, 6] };
    LduPrimitiveMesh::new(grid(2, 4), vec![proc_iface(0, rank, 1 - rank, cut)]).unwrap()
}

#[test]
fn processor_faces_agree_across_ranks() {
    let out = run_ranks(2, |comm: LocalComm| {
        let mut agg = Agglomeration::new(half_grid(comm.rank()));
        let restrict = if comm.rank() == 0 {
            vec![0, 0, 0, 0, 1, 1, 1, 1]
        } else {
            vec![0, 0, 0, 0, 0, 0, 1, 1]
        };
        agg.agglomerate_level(&comm, CommTag::new(0x200), restrict, 2)
            .unwrap();
        let iface = agg.interface_level(1).unwrap()[0].clone();
        let patch = agg.patch_face_restrict_addressing(0).unwrap().to_vec();
        (iface, patch)
    });
    let (a, pa) = &out[0];
    let (b, pb) = &out[1];
    assert_eq!(a.face_restrict_addressing(), &[0, 0, 1, 2]);
    assert_eq!(b.face_restrict_addressing(), a.face_restrict_addressing());
    assert_eq!(a.face_cells(), &[0, 1, 1]);
    assert_eq!(b.face_cells(), &[0, 0, 1]);
    assert_eq!(pa, pb);
}

#[test]
fn processor_cyclic_uses_its_own_channel() {
    // each rank holds one cell with a plain processor face and a
    // processor-cyclic face to the other rank
    let out = run_ranks(2, |comm: LocalComm| {
        let me = comm.rank();
        let nb = 1 - me;
        let mesh = LduPrimitiveMesh::new(
            chain(2),
            vec![
                proc_iface(0, me, nb, vec![0]),
                GamgInterface::new(
                    1,
                    InterfaceKind::ProcessorCyclic(ProcessorCyclicInterface::new(me, nb, 4, 0)),
                    vec![1],
                ),
            ],
        )
        .unwrap();
        let mut agg = Agglomeration::new(mesh);
        let restrict = if me == 0 { vec![0, 1] } else { vec![1, 0] };
        agg.agglomerate_level(&comm, CommTag::new(0x300), restrict, 2)
            .unwrap();
        agg.interface_level(1)
            .unwrap()
            .iter()
            .map(|i| i.face_cells().to_vec())
            .collect::<Vec<_>>()
    });
    assert_eq!(out[0], vec![vec![0], vec![1]]);
    assert_eq!(out[1], vec![vec![1], vec![0]]);
}

#[test]
fn mismatched_interface_sizes_are_fatal() {
    let out = run_ranks(2, |comm: LocalComm| {
        let cells = if comm.rank() == 0 { vec![0, 1] } else { vec![0] };
        let mesh =
            LduPrimitiveMesh::new(chain(2), vec![proc_iface(0, comm.rank(), 1 - comm.rank(), cells)])
                .unwrap();
        let mut agg = Agglomeration::new(mesh);
        let res = agg.agglomerate_level(&comm, CommTag::new(0x400), vec![0, 0], 1);
        (res, agg.n_levels())
    });
    assert!(matches!(out[0].0, Err(GamgError::InterfaceSizeMismatch { .. })));
    assert!(matches!(out[1].0, Err(GamgError::InterfaceSizeMismatch { .. })));
    assert_eq!(out[0].1, 1);
}

#[test]
fn bad_map_on_one_rank_stops_both() {
    let out = run_ranks(2, |comm: LocalComm| {
        let mut agg = Agglomeration::new(split_chain(comm.rank(), 2, 4));
        let (restrict, n_coarse) = if comm.rank() == 0 {
            (vec![0, 0, 2, 2], 3)
        } else {
            (vec![0, 0, 1, 1], 2)
        };
        let failed = agg.agglomerate_level(&comm, CommTag::new(0x400), restrict, n_coarse);
        let levels_after_failure = agg.n_levels();
        let retried = agg.agglomerate_level(&comm, CommTag::new(0x440), vec![0, 0, 1, 1], 2);
        (failed, levels_after_failure, retried)
    });
    assert!(matches!(
        out[0].0,
        Err(GamgError::EmptyCoarseCell { level: 0, coarse: 1, n_coarse: 3 })
    ));
    assert_eq!(out[1].0, Err(GamgError::PeerFailed { n_failed: 1 }));
    for (_, levels, retried) in &out {
        assert_eq!(*levels, 1);
        assert_eq!(*retried, Ok(1));
    }
}
