//! Cluster formation, mesh gather and restriction combination.

use super::mesh_merge::{MergedMesh, merge_meshes};
use super::{ProcAgglomeration, RegionMasters, calculate_region_master};
use crate::agglomeration::Agglomeration;
use crate::algs::collectives::{agree, gather_indices, gather_serde, scatter_serde};
use crate::algs::communicator::{CommTag, Communicator, TagAllocator};
use crate::gamg_error::GamgError;
use crate::topology::compact_list_list::CompactListList;
use crate::topology::primitive_mesh::LduPrimitiveMesh;
use itertools::Itertools;
use log::{debug, info};

/// Combine one level transition over a cluster.
///
/// Every member sends its `(n_fine, n_coarse)` pair and its restriction map;
/// the master (rank 0 of `cluster_comm`) concatenates the maps, shifting each
/// member's coarse indices by the coarse cells of the members before it.
/// Returns the combined map and coarse count on the master, `None` elsewhere.
pub fn proc_agglomerate_restrict_addressing<C: Communicator>(
    cluster_comm: &C,
    tag: CommTag,
    restrict: &[usize],
    n_coarse: usize,
) -> Result<Option<(Vec<usize>, usize)>, GamgError> {
    let sizes = gather_indices(cluster_comm, tag, &[restrict.len(), n_coarse])?;
    let maps = gather_indices(cluster_comm, tag.offset(2), restrict)?;
    let (Some(sizes), Some(maps)) = (sizes, maps) else {
        return Ok(None);
    };

    let mut combined = Vec::with_capacity(sizes.iter().map(|s| s.first().copied().unwrap_or(0)).sum());
    let mut coarse_offset = 0;
    for (member, (size, map)) in sizes.iter().zip(&maps).enumerate() {
        let &[n_fine, n_coarse] = size.as_slice() else {
            return Err(GamgError::CommSizeMismatch {
                rank: member,
                expected: 2,
                found: size.len(),
            });
        };
        if map.len() != n_fine {
            return Err(GamgError::CommSizeMismatch {
                rank: member,
                expected: n_fine,
                found: map.len(),
            });
        }
        combined.extend(map.iter().map(|&c| c + coarse_offset));
        coarse_offset += n_coarse;
    }
    Ok(Some((combined, coarse_offset)))
}

/// Validate the request and elect the cluster masters.
fn prepare_merge<C: Communicator>(
    agglom: &Agglomeration,
    level: usize,
    proc_agglom_map: &[usize],
    comm: &C,
) -> Result<RegionMasters, GamgError> {
    if level == 0 || level >= agglom.n_levels() {
        return Err(GamgError::LevelOutOfRange {
            level,
            n_levels: agglom.n_levels(),
        });
    }
    if proc_agglom_map.len() != comm.size() {
        return Err(GamgError::InvalidProcAgglomMap(format!(
            "map covers {} ranks, communicator has {}",
            proc_agglom_map.len(),
            comm.size()
        )));
    }
    agglom.mesh_level(level)?;
    for l in level..agglom.n_transitions() {
        agglom.level_transition(l)?;
    }
    calculate_region_master(comm.rank(), proc_agglom_map)
}

/// Rebuild the levels above `level` on a master from the merged mesh and the
/// combined restrictions. Returns the merged cell count.
fn rebuild_on_master<C: Communicator>(
    agglom: &mut Agglomeration,
    level: usize,
    mesh: LduPrimitiveMesh,
    combined: Vec<Option<(Vec<usize>, usize)>>,
    reduced: &C,
    rebuild_tags: &[CommTag],
) -> Result<usize, GamgError> {
    let n_merged = mesh.n_cells();
    agglom.truncate(level);
    agglom.replace_mesh(level, mesh);
    for (c, &tag) in combined.into_iter().zip(rebuild_tags) {
        let (restrict, n_coarse) = c.ok_or_else(|| GamgError::CommError {
            neighbor: reduced.rank(),
            reason: "combined restriction missing on master".into(),
        })?;
        agglom.agglomerate_level(reduced, tag, restrict, n_coarse)?;
    }
    Ok(n_merged)
}

/// Merge the hierarchy of every cluster at mesh level `level` onto the
/// cluster master.
///
/// Collective over `comm`; every rank must pass the same map, level and tag
/// allocator state. On return the master holds the merged mesh at `level`
/// and the coarser levels rebuilt from the combined restrictions, on the
/// reduced communicator. Other members keep levels up to `level` and clear
/// the rest. A failure on any rank, including a failed merge on one master,
/// makes every rank return an error.
pub fn cluster_and_merge<C: Communicator>(
    agglom: &mut Agglomeration,
    level: usize,
    proc_agglom_map: &[usize],
    comm: &C,
    tags: &mut TagAllocator,
) -> Result<ProcAgglomeration<C>, GamgError> {
    // every rank draws the same tags, whatever its role
    let agree_tag = tags.next_tag();
    let mesh_tag = tags.next_tag();
    let boundary_tag = tags.next_tag();
    let n_rebuild = agglom.n_transitions().saturating_sub(level);
    let restrict_tags: Vec<CommTag> = (0..n_rebuild).map(|_| tags.next_tag()).collect();
    let rebuild_tags: Vec<CommTag> = (0..n_rebuild).map(|_| tags.next_tag()).collect();
    let field_tag = tags.next_tag();

    let prepared = prepare_merge(agglom, level, proc_agglom_map, comm);
    let region = agree(comm, agree_tag, prepared)?;
    let my_cluster = proc_agglom_map[comm.rank()];

    let cluster_comm = comm
        .split(&region.agglom_proc_ids)
        .ok_or_else(|| GamgError::CommError {
            neighbor: region.agglom_proc_ids[0],
            reason: format!("rank {} left out of its own cluster", comm.rank()),
        })?;
    let reduced_comm = comm.split(&region.master_procs);

    let local_mesh = agglom.mesh_level(level)?;
    let local_n_cells = local_mesh.n_cells();
    let merged: Result<Option<MergedMesh>, GamgError> =
        gather_serde(&cluster_comm, mesh_tag, local_mesh).and_then(|gathered| {
            gathered
                .map(|meshes| {
                    merge_meshes(my_cluster, proc_agglom_map, &region.agglom_proc_ids, &meshes)
                })
                .transpose()
        });
    let merged = agree(comm, agree_tag.offset(4), merged)?;

    let my_boundary_map: Result<Vec<Option<usize>>, GamgError> = scatter_serde(
        &cluster_comm,
        boundary_tag,
        merged.as_ref().map(|m| m.boundary_map.as_slice()),
    );
    let mut combined = Vec::with_capacity(n_rebuild);
    for (k, &tag) in restrict_tags.iter().enumerate() {
        combined.push(agglom.level_transition(level + k).and_then(|t| {
            proc_agglomerate_restrict_addressing(
                &cluster_comm,
                tag,
                t.restrict_addressing(),
                t.n_coarse_cells(),
            )
        }));
    }
    let exchanged = my_boundary_map
        .and_then(|b| Ok((b, combined.into_iter().collect::<Result<Vec<_>, _>>()?)));
    let (my_boundary_map, combined) = agree(comm, agree_tag.offset(8), exchanged)?;

    let state = match merged {
        Some(merged) => {
            let rebuilt = match reduced_comm.as_ref() {
                Some(reduced) => {
                    rebuild_on_master(agglom, level, merged.mesh, combined, reduced, &rebuild_tags)
                }
                None => Err(GamgError::CommError {
                    neighbor: comm.rank(),
                    reason: "cluster master missing from the reduced communicator".into(),
                }),
            };
            let n_merged = agree(comm, agree_tag.offset(12), rebuilt)?;
            info!(
                "processor agglomeration at level {level}: cluster {my_cluster} merged ranks [{}] \
                 into {n_merged} cells, {n_rebuild} levels rebuilt",
                region.agglom_proc_ids.iter().join(", ")
            );
            ProcAgglomeration {
                level,
                proc_agglom_map: proc_agglom_map.to_vec(),
                master_procs: region.master_procs,
                agglom_proc_ids: region.agglom_proc_ids,
                cluster_comm,
                reduced_comm,
                cell_offsets: merged.cell_offsets,
                face_map: merged.face_map,
                boundary_map: merged.boundary_map,
                boundary_face_map: merged.boundary_face_map,
                my_boundary_map,
                local_n_cells,
                field_tag,
            }
        }
        None => {
            agglom.clear_above(level);
            agree(comm, agree_tag.offset(12), Ok(()))?;
            debug!(
                "processor agglomeration at level {level}: rank {} handed its coarse levels to rank {}",
                comm.rank(),
                region.agglom_proc_ids[0]
            );
            ProcAgglomeration {
                level,
                proc_agglom_map: proc_agglom_map.to_vec(),
                master_procs: region.master_procs,
                agglom_proc_ids: region.agglom_proc_ids,
                cluster_comm,
                reduced_comm,
                cell_offsets: Vec::new(),
                face_map: CompactListList::new(),
                boundary_map: Vec::new(),
                boundary_face_map: Vec::new(),
                my_boundary_map,
                local_n_cells,
                field_tag,
            }
        }
    };
    Ok(state)
}
