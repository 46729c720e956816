//! Processor agglomeration: merging the coarse levels of several ranks onto
//! one master rank per cluster.
//!
//! Clusters are given by a rank -> cluster map that every rank holds. The
//! master of a cluster is its smallest rank. Masters go on with the merged
//! mesh on a reduced communicator (one rank per cluster, ranked by cluster
//! id); the other ranks keep their finer levels and clear the rest.
//!
//! The per-level state lives in [`ProcAgglomeration`], owned by a
//! [`ProcAgglomerationSet`]. Dropping a state releases its sub-communicators.

pub mod cluster;
pub mod field_transfer;
pub mod mesh_merge;

pub use cluster::{cluster_and_merge, proc_agglomerate_restrict_addressing};

use crate::algs::communicator::{CommTag, Communicator};
use crate::gamg_error::GamgError;
use crate::topology::compact_list_list::CompactListList;
use log::debug;

/// Cluster masters and the caller's own cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionMasters {
    /// Master rank of every cluster, indexed by cluster id.
    pub master_procs: Vec<usize>,
    /// Ranks of the caller's cluster, ascending; the master comes first.
    pub agglom_proc_ids: Vec<usize>,
}

/// Elect the smallest rank of every cluster as its master.
///
/// `proc_agglom_map[rank]` is the cluster of `rank`; cluster ids must cover
/// `0..n_clusters` without gaps.
pub fn calculate_region_master(
    my_rank: usize,
    proc_agglom_map: &[usize],
) -> Result<RegionMasters, GamgError> {
    let Some(&my_cluster) = proc_agglom_map.get(my_rank) else {
        return Err(GamgError::InvalidProcAgglomMap(format!(
            "rank {my_rank} missing from a map over {} ranks",
            proc_agglom_map.len()
        )));
    };
    let n_clusters = proc_agglom_map.iter().max().map_or(0, |&m| m + 1);
    let mut master_procs: Vec<Option<usize>> = vec![None; n_clusters];
    for (rank, &cluster) in proc_agglom_map.iter().enumerate() {
        master_procs[cluster].get_or_insert(rank);
    }
    let master_procs = master_procs
        .into_iter()
        .enumerate()
        .map(|(cluster, m)| {
            m.ok_or_else(|| {
                GamgError::InvalidProcAgglomMap(format!("cluster {cluster} has no ranks"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let agglom_proc_ids = proc_agglom_map
        .iter()
        .enumerate()
        .filter(|&(_, &c)| c == my_cluster)
        .map(|(rank, _)| rank)
        .collect();
    Ok(RegionMasters {
        master_procs,
        agglom_proc_ids,
    })
}

/// Processor agglomeration state of one level on one rank.
///
/// The combined addressing (`cell_offsets`, `face_map`, `boundary_map`,
/// `boundary_face_map`) is filled on the master only and indexed by position
/// in `agglom_proc_ids`. `my_boundary_map` is the caller's own row of
/// `boundary_map`, scattered back to every member.
#[derive(Debug)]
pub struct ProcAgglomeration<C: Communicator> {
    pub(crate) level: usize,
    pub(crate) proc_agglom_map: Vec<usize>,
    pub(crate) master_procs: Vec<usize>,
    pub(crate) agglom_proc_ids: Vec<usize>,
    pub(crate) cluster_comm: C,
    pub(crate) reduced_comm: Option<C>,
    pub(crate) cell_offsets: Vec<usize>,
    pub(crate) face_map: CompactListList<usize>,
    pub(crate) boundary_map: Vec<Vec<Option<usize>>>,
    pub(crate) boundary_face_map: Vec<Vec<Vec<usize>>>,
    pub(crate) my_boundary_map: Vec<Option<usize>>,
    pub(crate) local_n_cells: usize,
    pub(crate) field_tag: CommTag,
}

impl<C: Communicator> ProcAgglomeration<C> {
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn proc_agglom_map(&self) -> &[usize] {
        &self.proc_agglom_map
    }

    pub fn master_procs(&self) -> &[usize] {
        &self.master_procs
    }

    pub fn agglom_proc_ids(&self) -> &[usize] {
        &self.agglom_proc_ids
    }

    pub fn is_master(&self) -> bool {
        self.cluster_comm.rank() == 0
    }

    /// Communicator over the caller's cluster; the master is rank 0.
    pub fn cluster_comm(&self) -> &C {
        &self.cluster_comm
    }

    /// Communicator over the masters, on masters only.
    pub fn reduced_comm(&self) -> Option<&C> {
        self.reduced_comm.as_ref()
    }

    pub fn cell_offsets(&self) -> &[usize] {
        &self.cell_offsets
    }

    pub fn face_map(&self) -> &CompactListList<usize> {
        &self.face_map
    }

    pub fn boundary_map(&self) -> &[Vec<Option<usize>>] {
        &self.boundary_map
    }

    pub fn boundary_face_map(&self) -> &[Vec<Vec<usize>>] {
        &self.boundary_face_map
    }

    /// Merged interface of each of the caller's interfaces; `None` where the
    /// interface became internal.
    pub fn my_boundary_map(&self) -> &[Option<usize>] {
        &self.my_boundary_map
    }

    /// Cells the caller contributed to the merged level.
    pub fn local_n_cells(&self) -> usize {
        self.local_n_cells
    }
}

/// Processor agglomeration states indexed by mesh level.
#[derive(Debug)]
pub struct ProcAgglomerationSet<C: Communicator> {
    levels: Vec<Option<ProcAgglomeration<C>>>,
}

impl<C: Communicator> Default for ProcAgglomerationSet<C> {
    fn default() -> Self {
        Self { levels: Vec::new() }
    }
}

impl<C: Communicator> ProcAgglomerationSet<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, state: ProcAgglomeration<C>) {
        let level = state.level;
        if self.levels.len() <= level {
            self.levels.resize_with(level + 1, || None);
        }
        self.levels[level] = Some(state);
    }

    pub fn get(&self, level: usize) -> Option<&ProcAgglomeration<C>> {
        self.levels.get(level).and_then(Option::as_ref)
    }

    /// Drop the state of `level`, releasing its communicators.
    pub fn discard(&mut self, level: usize) -> Option<ProcAgglomeration<C>> {
        let state = self.levels.get_mut(level).and_then(Option::take);
        if state.is_some() {
            debug!("released processor agglomeration communicators of level {level}");
        }
        state
    }

    /// Drop every state.
    pub fn clear(&mut self) {
        for level in 0..self.levels.len() {
            self.discard(level);
        }
        self.levels.clear();
    }

    /// Levels that carry a state on this rank.
    pub fn levels(&self) -> impl Iterator<Item = usize> + '_ {
        self.levels
            .iter()
            .enumerate()
            .filter_map(|(l, s)| s.as_ref().map(|_| l))
    }

    /// Whether this rank holds a merged mesh at `level`.
    pub fn has_proc_mesh(&self, level: usize) -> bool {
        self.get(level).is_some_and(|s| s.reduced_comm.is_some())
    }

    pub fn proc_communicator(&self, level: usize) -> Option<&C> {
        self.get(level).and_then(ProcAgglomeration::reduced_comm)
    }

    pub fn cell_offsets(&self, level: usize) -> Option<&[usize]> {
        self.get(level).map(ProcAgglomeration::cell_offsets)
    }

    pub fn face_map(&self, level: usize) -> Option<&CompactListList<usize>> {
        self.get(level).map(ProcAgglomeration::face_map)
    }

    pub fn boundary_map(&self, level: usize) -> Option<&[Vec<Option<usize>>]> {
        self.get(level).map(ProcAgglomeration::boundary_map)
    }

    pub fn boundary_face_map(&self, level: usize) -> Option<&[Vec<Vec<usize>>]> {
        self.get(level).map(ProcAgglomeration::boundary_face_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smallest_rank_is_master() {
        let map = [2, 0, 0, 2, 1];
        let r3 = calculate_region_master(3, &map).unwrap();
        assert_eq!(r3.master_procs, vec![1, 4, 0]);
        assert_eq!(r3.agglom_proc_ids, vec![0, 3]);
        let r2 = calculate_region_master(2, &map).unwrap();
        assert_eq!(r2.agglom_proc_ids, vec![1, 2]);
        assert_eq!(calculate_region_master(4, &map).unwrap().agglom_proc_ids, vec![4]);
    }

    #[test]
    fn gaps_in_cluster_ids_are_rejected() {
        assert!(matches!(
            calculate_region_master(0, &[0, 2]),
            Err(GamgError::InvalidProcAgglomMap(_))
        ));
        assert!(calculate_region_master(3, &[0, 0]).is_err());
    }
}
