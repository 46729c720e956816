mod util;
use mesh_gamg::agglomeration::Agglomeration;
use mesh_gamg::algs::communicator::{CommTag, Communicator, LocalComm, TagAllocator};
use mesh_gamg::gamg_error::GamgError;
use mesh_gamg::proc_agglomeration::{
    ProcAgglomerationSet, calculate_region_master, cluster_and_merge,
    proc_agglomerate_restrict_addressing,
};
use util::*;

/// Three levels of a chain split over `comm`: 4 -> 2 -> 1 cells per rank.
fn local_hierarchy(comm: &LocalComm) -> Agglomeration {
    let mut agg = Agglomeration::new(split_chain(comm.rank(), comm.size(), 4));
    agg.agglomerate_level(comm, CommTag::new(0x100), vec![0, 0, 1, 1], 2)
        .unwrap();
    agg.agglomerate_level(comm, CommTag::new(0x140), vec![0, 0], 1)
        .unwrap();
    agg
}

#[test]
fn restrictions_are_offset_by_member() {
    let out = run_ranks(3, |comm: LocalComm| {
        let restrict = vec![comm.rank(); comm.rank() + 1];
        let n_coarse = comm.rank() + 1;
        proc_agglomerate_restrict_addressing(&comm, CommTag::new(0x80), &restrict, n_coarse).unwrap()
    });
    assert_eq!(out[0], Some((vec![0, 2, 2, 5, 5, 5], 6)));
    assert!(out[1].is_none() && out[2].is_none());
}

#[test]
fn two_ranks_merge_onto_master() {
    let out = run_ranks(2, |comm: LocalComm| {
        let mut agg = local_hierarchy(&comm);
        let mut tags = TagAllocator::default();
        let state = cluster_and_merge(&mut agg, 1, &[0, 0], &comm, &mut tags).unwrap();

        let local: Vec<f64> = match comm.rank() {
            0 => vec![1.0, 2.0],
            _ => vec![3.0, 4.0],
        };
        let gathered = state.gather_field(&local).unwrap();
        let merged = [10.0, 20.0, 30.0, 40.0];
        let scattered = state.scatter_field(Some(&merged[..])).unwrap();

        let mut set = ProcAgglomerationSet::new();
        set.insert(state);
        (
            agg.n_levels(),
            agg.has_mesh_level(2),
            agg.n_cells(1).unwrap(),
            agg.mesh_level(2).map(|m| (m.n_cells(), m.n_faces())).ok(),
            set.has_proc_mesh(1),
            set.cell_offsets(1).unwrap().to_vec(),
            set.get(1).unwrap().my_boundary_map().to_vec(),
            gathered,
            scattered,
        )
    });

    let master = &out[0];
    assert_eq!(master.0, 3);
    assert!(master.1);
    assert_eq!(master.2, 4);
    assert_eq!(master.3, Some((2, 1)));
    assert!(master.4);
    assert_eq!(master.5, vec![0, 2, 4]);
    assert_eq!(master.6, vec![None]);
    assert_eq!(master.7, Some(vec![1.0, 2.0, 3.0, 4.0]));
    assert_eq!(master.8, vec![10.0, 20.0]);

    let member = &out[1];
    assert!(!member.1);
    assert_eq!(member.2, 2);
    assert_eq!(member.3, None);
    assert!(!member.4);
    assert!(member.5.is_empty());
    assert_eq!(member.6, vec![None]);
    assert_eq!(member.7, None);
    assert_eq!(member.8, vec![30.0, 40.0]);
}

#[test]
fn separate_clusters_keep_a_processor_interface() {
    // ranks {0, 1} and {2, 3} form two clusters of a four-rank chain
    let out = run_ranks(4, |comm: LocalComm| {
        let mut agg = local_hierarchy(&comm);
        let mut tags = TagAllocator::default();
        let state = cluster_and_merge(&mut agg, 1, &[0, 0, 1, 1], &comm, &mut tags).unwrap();
        let coarse = agg.mesh_level(1).unwrap().clone();
        (
            state.is_master(),
            state.reduced_comm().map(|c| (c.rank(), c.size())),
            state.my_boundary_map().to_vec(),
            coarse,
        )
    });

    let (is_master, reduced, _, mesh) = &out[0];
    assert!(is_master);
    assert_eq!(*reduced, Some((0, 2)));
    assert_eq!(mesh.n_cells(), 4);
    assert_eq!(mesh.interfaces().len(), 1);
    assert_eq!(mesh.interfaces()[0].face_cells(), &[3]);

    let (is_master, reduced, boundary, _) = &out[2];
    assert!(is_master);
    assert_eq!(*reduced, Some((1, 2)));
    assert_eq!(boundary, &vec![Some(0), None]);
    assert_eq!(out[2].3.interfaces()[0].face_cells(), &[0]);

    // rank 1 touched rank 0 (internal) and rank 2 (cluster boundary)
    assert_eq!(out[1].2, vec![None, Some(0)]);
    assert!(!out[1].0);
    assert_eq!(out[1].1, None);
}

#[test]
fn merge_level_must_be_coarse() {
    let out = run_ranks(2, |comm: LocalComm| {
        let mut agg = local_hierarchy(&comm);
        let mut tags = TagAllocator::default();
        cluster_and_merge(&mut agg, 0, &[0, 0], &comm, &mut tags).err()
    });
    assert!(matches!(out[0], Some(GamgError::LevelOutOfRange { level: 0, .. })));
}

#[test]
fn bad_request_on_one_rank_stops_the_merge() {
    let out = run_ranks(2, |comm: LocalComm| {
        let mut agg = local_hierarchy(&comm);
        let mut tags = TagAllocator::default();
        let level = if comm.rank() == 1 { 5 } else { 1 };
        let res = cluster_and_merge(&mut agg, level, &[0, 0], &comm, &mut tags).err();
        (res, agg.n_levels(), agg.n_cells(1).unwrap())
    });
    assert_eq!(out[0].0, Some(GamgError::PeerFailed { n_failed: 1 }));
    assert!(matches!(out[1].0, Some(GamgError::LevelOutOfRange { level: 5, .. })));
    for (_, n_levels, n_cells) in &out {
        assert_eq!(*n_levels, 3);
        assert_eq!(*n_cells, 2);
    }
}

#[test]
fn region_masters_follow_the_map() {
    let r = calculate_region_master(3, &[2, 0, 0, 2, 1]).unwrap();
    assert_eq!(r.master_procs, vec![1, 4, 0]);
    assert_eq!(r.agglom_proc_ids, vec![0, 3]);
}
