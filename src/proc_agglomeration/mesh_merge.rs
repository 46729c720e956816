//! Combination of a cluster's level meshes into one mesh on the master.
//!
//! Cells are concatenated in cluster order. Internal faces keep their cells
//! shifted by the contributing mesh's cell offset. Processor faces between
//! two members of the cluster become internal faces. The remaining processor
//! faces are grouped per neighbouring cluster and channel, and cyclic faces
//! per patch, into the interfaces of the merged mesh.

use crate::gamg_error::GamgError;
use crate::topology::compact_list_list::CompactListList;
use crate::topology::interfaces::{CoupledInterface, GamgInterface, InterfaceKind, Peer};
use crate::topology::ldu_addressing::LduAddressing;
use crate::topology::primitive_mesh::LduPrimitiveMesh;
use hashbrown::HashMap;
use std::collections::BTreeMap;

/// Merged mesh and the maps from every contribution into it.
///
/// All per-contribution tables are indexed by position in the cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedMesh {
    pub mesh: LduPrimitiveMesh,
    /// First merged cell of every contribution; one extra trailing entry.
    pub cell_offsets: Vec<usize>,
    /// Contribution face -> merged face.
    pub face_map: CompactListList<usize>,
    /// Contribution interface -> merged interface, `None` when internalised.
    pub boundary_map: Vec<Vec<Option<usize>>>,
    /// Contribution interface face -> merged interface face, or merged
    /// internal face when the interface was internalised.
    pub boundary_face_map: Vec<Vec<Vec<usize>>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum GroupKey {
    Cyclic { patch_id: usize },
    Processor { cluster: usize, channel: u16 },
}

struct Contribution {
    member: usize,
    interface: usize,
    sort_key: (usize, usize),
}

/// Merge `meshes`, contributed by the ranks `agglom_proc_ids` (same order),
/// into the mesh of cluster `my_cluster`.
pub fn merge_meshes(
    my_cluster: usize,
    proc_agglom_map: &[usize],
    agglom_proc_ids: &[usize],
    meshes: &[LduPrimitiveMesh],
) -> Result<MergedMesh, GamgError> {
    if meshes.len() != agglom_proc_ids.len() {
        return Err(GamgError::CommSizeMismatch {
            rank: agglom_proc_ids.first().copied().unwrap_or(0),
            expected: agglom_proc_ids.len(),
            found: meshes.len(),
        });
    }
    let member_of: HashMap<usize, usize> = agglom_proc_ids
        .iter()
        .enumerate()
        .map(|(i, &rank)| (rank, i))
        .collect();
    let cluster_of = |rank: usize| {
        proc_agglom_map.get(rank).copied().ok_or_else(|| {
            GamgError::InvalidProcAgglomMap(format!("no cluster for rank {rank}"))
        })
    };

    let mut cell_offsets = Vec::with_capacity(meshes.len() + 1);
    cell_offsets.push(0);
    for m in meshes {
        cell_offsets.push(cell_offsets[cell_offsets.len() - 1] + m.n_cells());
    }
    let n_cells = cell_offsets[meshes.len()];

    // faces before sorting; indices recorded per origin
    let mut faces: Vec<(usize, usize)> = Vec::new();
    let mut face_origin: Vec<Vec<usize>> = Vec::with_capacity(meshes.len());
    for (i, m) in meshes.iter().enumerate() {
        let off = cell_offsets[i];
        let mut origin = Vec::with_capacity(m.n_faces());
        for (&l, &u) in m.addressing().lower().iter().zip(m.addressing().upper()) {
            origin.push(faces.len());
            faces.push((l + off, u + off));
        }
        face_origin.push(origin);
    }

    let mut internalised: Vec<Vec<Option<Vec<usize>>>> = meshes
        .iter()
        .map(|m| vec![None; m.interfaces().len()])
        .collect();
    let mut groups: BTreeMap<GroupKey, (InterfaceKind, Vec<Contribution>)> = BTreeMap::new();

    for (i, m) in meshes.iter().enumerate() {
        let my_rank = agglom_proc_ids[i];
        for (p, iface) in m.interfaces().iter().enumerate() {
            let peer = iface.kind().peer();
            let in_cluster = match peer {
                Peer::Rank { rank, .. } => cluster_of(rank)? == my_cluster,
                Peer::Patch { .. } => false,
            };
            match peer {
                Peer::Rank { rank, channel } if in_cluster => {
                    let j = *member_of.get(&rank).ok_or_else(|| {
                        GamgError::InterfaceLayout(format!(
                            "rank {rank} is in cluster {my_cluster} but did not contribute"
                        ))
                    })?;
                    if j < i {
                        continue;
                    }
                    let back = Peer::Rank {
                        rank: my_rank,
                        channel,
                    };
                    let q = meshes[j]
                        .interfaces()
                        .iter()
                        .position(|x| x.kind().is_processor() && x.kind().peer() == back)
                        .ok_or_else(|| {
                            GamgError::InterfaceLayout(format!(
                                "rank {rank} has no interface back to rank {my_rank} on channel {channel}"
                            ))
                        })?;
                    let other = &meshes[j].interfaces()[q];
                    if other.size() != iface.size() {
                        return Err(GamgError::InterfaceSizeMismatch {
                            interface: p,
                            expected: iface.size(),
                            found: other.size(),
                        });
                    }
                    let (oi, oj) = (cell_offsets[i], cell_offsets[j]);
                    let mut idx = Vec::with_capacity(iface.size());
                    for (&a, &b) in iface.face_cells().iter().zip(other.face_cells()) {
                        idx.push(faces.len());
                        faces.push((a + oi, b + oj));
                    }
                    internalised[j][q] = Some(idx.clone());
                    internalised[i][p] = Some(idx);
                }
                Peer::Rank { rank, channel } => {
                    let cluster = cluster_of(rank)?;
                    let sort_key = if my_cluster < cluster {
                        (my_rank, rank)
                    } else {
                        (rank, my_rank)
                    };
                    groups
                        .entry(GroupKey::Processor { cluster, channel })
                        .or_insert_with(|| (iface.kind().with_ranks(my_cluster, cluster), Vec::new()))
                        .1
                        .push(Contribution {
                            member: i,
                            interface: p,
                            sort_key,
                        });
                }
                Peer::Patch { .. } => {
                    let InterfaceKind::Cyclic(c) = iface.kind() else {
                        continue;
                    };
                    groups
                        .entry(GroupKey::Cyclic {
                            patch_id: c.patch_id,
                        })
                        .or_insert_with(|| (*iface.kind(), Vec::new()))
                        .1
                        .push(Contribution {
                            member: i,
                            interface: p,
                            sort_key: (i, 0),
                        });
                }
            }
        }
    }

    let (addressing, position) = LduAddressing::from_unordered(n_cells, &faces)?;

    let face_map = CompactListList::from_rows(
        face_origin
            .iter()
            .map(|origin| origin.iter().map(|&f| position[f]).collect::<Vec<_>>()),
    );

    let mut boundary_map: Vec<Vec<Option<usize>>> = meshes
        .iter()
        .map(|m| vec![None; m.interfaces().len()])
        .collect();
    let mut boundary_face_map: Vec<Vec<Vec<usize>>> = internalised
        .iter()
        .map(|per_mesh| {
            per_mesh
                .iter()
                .map(|idx| {
                    idx.as_ref()
                        .map(|idx| idx.iter().map(|&f| position[f]).collect())
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect();

    let mut interfaces = Vec::with_capacity(groups.len());
    for (index, (_, (kind, mut contributions))) in groups.into_iter().enumerate() {
        contributions.sort_by_key(|c| c.sort_key);
        let mut face_cells = Vec::new();
        for c in &contributions {
            let iface = &meshes[c.member].interfaces()[c.interface];
            let off = cell_offsets[c.member];
            boundary_map[c.member][c.interface] = Some(index);
            boundary_face_map[c.member][c.interface] =
                (face_cells.len()..face_cells.len() + iface.size()).collect();
            face_cells.extend(iface.face_cells().iter().map(|&cell| cell + off));
        }
        interfaces.push(GamgInterface::from_parts(index, kind, face_cells, Vec::new()));
    }

    Ok(MergedMesh {
        mesh: LduPrimitiveMesh::new(addressing, interfaces)?,
        cell_offsets,
        face_map,
        boundary_map,
        boundary_face_map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::interfaces::ProcessorInterface;

    fn proc_iface(index: usize, my: usize, nb: usize, cells: Vec<usize>) -> GamgInterface {
        GamgInterface::new(
            index,
            InterfaceKind::Processor(ProcessorInterface::new(my, nb)),
            cells,
        )
    }

    #[test]
    fn neighbouring_ranks_merge_into_one_chain() {
        // rank 0: cells 0-1, rank 1: cells 0-1; rank0 cell 1 touches rank1 cell 0
        let a = LduPrimitiveMesh::new(
            LduAddressing::new(2, vec![0], vec![1]).unwrap(),
            vec![proc_iface(0, 0, 1, vec![1])],
        )
        .unwrap();
        let b = LduPrimitiveMesh::new(
            LduAddressing::new(2, vec![0], vec![1]).unwrap(),
            vec![proc_iface(0, 1, 0, vec![0])],
        )
        .unwrap();
        let merged = merge_meshes(0, &[0, 0], &[0, 1], &[a, b]).unwrap();
        assert_eq!(merged.cell_offsets, vec![0, 2, 4]);
        assert_eq!(merged.mesh.addressing().lower(), &[0, 1, 2]);
        assert_eq!(merged.mesh.addressing().upper(), &[1, 2, 3]);
        assert!(merged.mesh.interfaces().is_empty());
        assert_eq!(merged.face_map.to_rows(), vec![vec![0], vec![2]]);
        assert_eq!(merged.boundary_map, vec![vec![None], vec![None]]);
        assert_eq!(merged.boundary_face_map, vec![vec![vec![1]], vec![vec![1]]]);
    }

    #[test]
    fn external_faces_keep_cross_cluster_order() {
        // cluster 0 = ranks {0, 1}, cluster 1 = rank 2; both members touch rank 2
        let a = LduPrimitiveMesh::new(
            LduAddressing::new(1, vec![], vec![]).unwrap(),
            vec![proc_iface(0, 0, 2, vec![0, 0])],
        )
        .unwrap();
        let b = LduPrimitiveMesh::new(
            LduAddressing::new(2, vec![0], vec![1]).unwrap(),
            vec![proc_iface(0, 1, 2, vec![1])],
        )
        .unwrap();
        let merged = merge_meshes(0, &[0, 0, 1], &[0, 1], &[a, b]).unwrap();
        let iface = &merged.mesh.interfaces()[0];
        assert_eq!(iface.face_cells(), &[0, 0, 2]);
        assert_eq!(
            iface.kind(),
            &InterfaceKind::Processor(ProcessorInterface::new(0, 1))
        );
        assert_eq!(merged.boundary_map, vec![vec![Some(0)], vec![Some(0)]]);
        assert_eq!(merged.boundary_face_map, vec![vec![vec![0, 1]], vec![vec![2]]]);
    }

    #[test]
    fn unmatched_internal_interface_is_fatal() {
        let a = LduPrimitiveMesh::new(
            LduAddressing::new(1, vec![], vec![]).unwrap(),
            vec![proc_iface(0, 0, 1, vec![0])],
        )
        .unwrap();
        let b = LduPrimitiveMesh::serial(LduAddressing::new(1, vec![], vec![]).unwrap());
        assert!(matches!(
            merge_meshes(0, &[0, 0], &[0, 1], &[a, b]),
            Err(GamgError::InterfaceLayout(_))
        ));
    }
}
