mod util;
use mesh_gamg::agglomeration::{Agglomeration, FaceRestrict};
use mesh_gamg::algs::communicator::{CommTag, NoComm};
use mesh_gamg::gamg_error::GamgError;
use mesh_gamg::topology::interfaces::{CyclicInterface, GamgInterface, InterfaceKind};
use mesh_gamg::topology::primitive_mesh::LduPrimitiveMesh;
use util::*;

/// 4x4 grid, periodic in x: the left column is patch 0, the right column
/// patch 1.
fn periodic_grid() -> LduPrimitiveMesh {
    let left = vec![0, 4, 8, 12];
    let right = vec![3, 7, 11, 15];
    LduPrimitiveMesh::new(
        grid(4, 4),
        vec![
            GamgInterface::new(0, InterfaceKind::Cyclic(CyclicInterface::new(0, 1, true)), left),
            GamgInterface::new(1, InterfaceKind::Cyclic(CyclicInterface::new(1, 0, false)), right),
        ],
    )
    .unwrap()
}

fn two_step() -> Agglomeration {
    let mut agg = Agglomeration::new(periodic_grid());
    // horizontal pairs: 4x4 -> 2x4
    let (r1, n1) = block_restrict(4, 4, 2, 1);
    agg.agglomerate_level(&NoComm, CommTag::new(0), r1, n1).unwrap();
    // vertical pairs: 2x4 -> 2x2
    let (r2, n2) = block_restrict(2, 4, 1, 2);
    agg.agglomerate_level(&NoComm, CommTag::new(0), r2, n2).unwrap();
    agg
}

#[test]
fn folded_levels_match_direct_agglomeration() {
    let mut folded = two_step();
    assert_eq!(folded.n_levels(), 3);
    folded.combine_levels(1).unwrap();
    assert_eq!(folded.n_levels(), 2);

    let mut direct = Agglomeration::new(periodic_grid());
    let (r, n) = block_restrict(4, 4, 2, 2);
    direct.agglomerate_level(&NoComm, CommTag::new(0), r, n).unwrap();

    assert_eq!(folded.level_transition(0), direct.level_transition(0));
    assert_eq!(folded.mesh_level(1), direct.mesh_level(1));
    assert_eq!(
        folded.patch_face_restrict_addressing(0).unwrap(),
        &[vec![0, 0, 1, 1], vec![0, 0, 1, 1]]
    );
    let iface = &folded.interface_level(1).unwrap()[0];
    assert_eq!(iface.face_cells(), &[0, 2]);
    assert_eq!(iface.face_restrict_addressing(), &[0, 0, 1, 1]);
}

#[test]
fn faces_vanishing_on_the_second_step_become_interior() {
    let mut agg = two_step();
    agg.combine_levels(1).unwrap();
    // fine face (0, 4) survives step one and closes inside coarse cell 0
    let faces = agg.mesh_level(0).unwrap().addressing();
    let f = (0..faces.n_faces())
        .find(|&f| faces.lower()[f] == 0 && faces.upper()[f] == 4)
        .unwrap();
    assert_eq!(
        agg.face_restrict_addressing(0).unwrap()[f],
        FaceRestrict::Interior(0)
    );
    assert!(!agg.face_flip_map(0).unwrap()[f]);
}

#[test]
fn fine_level_cannot_be_folded() {
    let mut agg = two_step();
    assert!(matches!(
        agg.combine_levels(0),
        Err(GamgError::LevelOutOfRange { level: 0, .. })
    ));
    assert!(matches!(
        agg.combine_levels(2),
        Err(GamgError::LevelOutOfRange { level: 2, .. })
    ));
    assert_eq!(agg.n_levels(), 3);
}

#[test]
fn first_step_flips_survive_folding() {
    // reversed numbering flips every surviving face of the first step
    let mut folded = Agglomeration::new(LduPrimitiveMesh::serial(chain(6)));
    folded
        .agglomerate_level(&NoComm, CommTag::new(0), vec![2, 2, 1, 1, 0, 0], 3)
        .unwrap();
    assert_eq!(
        folded.face_flip_map(0).unwrap(),
        &[false, true, false, true, false]
    );
    folded
        .agglomerate_level(&NoComm, CommTag::new(0), vec![0, 1, 1], 2)
        .unwrap();
    assert_eq!(folded.face_flip_map(1).unwrap(), &[false, false]);
    folded.combine_levels(1).unwrap();

    let mut direct = Agglomeration::new(LduPrimitiveMesh::serial(chain(6)));
    direct
        .agglomerate_level(&NoComm, CommTag::new(0), vec![1, 1, 1, 1, 0, 0], 2)
        .unwrap();

    assert_eq!(
        folded.face_restrict_addressing(0).unwrap(),
        &[
            FaceRestrict::Interior(1),
            FaceRestrict::Interior(1),
            FaceRestrict::Interior(1),
            FaceRestrict::Coarse(0),
            FaceRestrict::Interior(0),
        ]
    );
    assert_eq!(
        folded.face_flip_map(0).unwrap(),
        &[false, false, false, true, false]
    );
    assert_eq!(folded.level_transition(0), direct.level_transition(0));
    assert_eq!(folded.mesh_level(1), direct.mesh_level(1));
}
