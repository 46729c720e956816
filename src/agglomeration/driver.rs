//! Hierarchy driver: level loop, stopping rule, level folding and processor
//! agglomeration policy.
//!
//! The choice of which fine cells merge is delegated to a
//! [`RestrictionStrategy`]. The driver validates and optionally repairs what
//! it proposes, decides globally whether the new level is worth building and
//! folds levels that coarsened too little.

use super::Agglomeration;
use super::check_restriction::check_restriction;
use super::config::{AgglomerationConfig, ProcAgglomerationPolicy};
use crate::algs::collectives::{agree, all_reduce_sum};
use crate::algs::communicator::{CommTag, Communicator, TagAllocator};
use crate::gamg_error::GamgError;
use crate::proc_agglomeration::{ProcAgglomerationSet, cluster_and_merge};
use crate::topology::primitive_mesh::LduPrimitiveMesh;
use bytemuck::Pod;
use log::{debug, info, warn};
use num_traits::Zero;
use std::collections::VecDeque;
use std::ops::AddAssign;

/// Proposes the restriction map of the next level.
pub trait RestrictionStrategy {
    /// Restriction map of `mesh` (mesh level `level`) and its coarse cell
    /// count. `face_weights` holds one weight per internal face.
    fn restriction(
        &mut self,
        level: usize,
        mesh: &LduPrimitiveMesh,
        face_weights: &[f64],
    ) -> Result<(Vec<usize>, usize), GamgError>;
}

/// Replays restriction maps computed elsewhere, one per call.
///
/// Once exhausted it proposes the identity map, which stops the driver.
#[derive(Clone, Debug, Default)]
pub struct PrescribedRestriction {
    maps: VecDeque<(Vec<usize>, usize)>,
}

impl PrescribedRestriction {
    pub fn new(maps: impl IntoIterator<Item = (Vec<usize>, usize)>) -> Self {
        Self {
            maps: maps.into_iter().collect(),
        }
    }
}

impl RestrictionStrategy for PrescribedRestriction {
    fn restriction(
        &mut self,
        _level: usize,
        mesh: &LduPrimitiveMesh,
        _face_weights: &[f64],
    ) -> Result<(Vec<usize>, usize), GamgError> {
        Ok(self
            .maps
            .pop_front()
            .unwrap_or_else(|| ((0..mesh.n_cells()).collect(), mesh.n_cells())))
    }
}

/// Global fine and coarse cell totals.
fn reduce_counts<C: Communicator>(
    comm: &C,
    tag: CommTag,
    n_fine: usize,
    n_coarse: usize,
) -> Result<(u64, u64), GamgError> {
    let fine = all_reduce_sum(comm, tag, n_fine as u64)?;
    let coarse = all_reduce_sum(comm, tag.offset(4), n_coarse as u64)?;
    Ok((fine, coarse))
}

fn worth_building(n_ranks: usize, n_cells_in_coarsest_level: usize, fine: u64, coarse: u64) -> bool {
    coarse >= (n_ranks * n_cells_in_coarsest_level) as u64 && coarse < fine
}

/// Whether a level of `n_coarse` cells from `n_fine` should be built.
///
/// Collective: stops once the global coarse count is below
/// `size * n_cells_in_coarsest_level` or the level would not shrink.
pub fn continue_agglomerating<C: Communicator>(
    comm: &C,
    tag: CommTag,
    n_fine: usize,
    n_coarse: usize,
    n_cells_in_coarsest_level: usize,
) -> Result<bool, GamgError> {
    let (fine, coarse) = reduce_counts(comm, tag, n_fine, n_coarse)?;
    Ok(worth_building(comm.size(), n_cells_in_coarsest_level, fine, coarse))
}

/// A complete agglomeration hierarchy with its processor agglomeration state.
pub struct GamgHierarchy<C: Communicator> {
    agglomeration: Agglomeration,
    proc_agglomeration: ProcAgglomerationSet<C>,
    comm: C,
    tags: TagAllocator,
    config: AgglomerationConfig,
}

impl<C: Communicator> GamgHierarchy<C> {
    /// Build every level from `fine`.
    ///
    /// Collective over `comm`.
    pub fn build<S: RestrictionStrategy>(
        fine: LduPrimitiveMesh,
        face_weights: Vec<f64>,
        comm: C,
        config: AgglomerationConfig,
        strategy: &mut S,
    ) -> Result<Self, GamgError> {
        let mut hierarchy = Self {
            agglomeration: Agglomeration::new(fine),
            proc_agglomeration: ProcAgglomerationSet::new(),
            comm,
            tags: TagAllocator::default(),
            config,
        };
        hierarchy.agglomerate(face_weights, strategy)?;
        Ok(hierarchy)
    }

    /// Throw away every coarse level and build them again, e.g. after the
    /// fine mesh moved.
    pub fn rebuild<S: RestrictionStrategy>(
        &mut self,
        face_weights: Vec<f64>,
        strategy: &mut S,
    ) -> Result<(), GamgError> {
        self.invalidate();
        self.agglomerate(face_weights, strategy)
    }

    /// Drop every coarse level and release processor agglomeration
    /// communicators. The fine mesh is kept.
    pub fn invalidate(&mut self) {
        self.proc_agglomeration.clear();
        self.agglomeration.truncate(0);
    }

    fn agglomerate<S: RestrictionStrategy>(
        &mut self,
        face_weights: Vec<f64>,
        strategy: &mut S,
    ) -> Result<(), GamgError> {
        let n_fine_faces = self.agglomeration.n_faces(0)?;
        let weights_ok = if face_weights.len() == n_fine_faces {
            Ok(())
        } else {
            Err(GamgError::FieldSizeMismatch {
                level: 0,
                expected: n_fine_faces,
                found: face_weights.len(),
            })
        };
        agree(&self.comm, self.tags.next_tag(), weights_ok)?;
        let cfg = &self.config;
        let mut weights = face_weights;
        let mut n_pair_levels = 0usize;

        while self.agglomeration.n_levels() < cfg.max_levels {
            let level = self.agglomeration.n_levels() - 1;
            let mesh = self.agglomeration.mesh_level(level)?;
            let n_fine = mesh.n_cells();
            let proposed = strategy
                .restriction(level, mesh, &weights)
                .and_then(|(restrict, n_coarse)| {
                    if !cfg.check_restriction {
                        return Ok((restrict, n_coarse));
                    }
                    match check_restriction(level, mesh.addressing(), &restrict, n_coarse)? {
                        Some(split) => {
                            warn!(
                                "level {level}: {} coarse cells were disconnected, split into {}",
                                n_coarse, split.n_coarse
                            );
                            Ok((split.restrict, split.n_coarse))
                        }
                        None => Ok((restrict, n_coarse)),
                    }
                });

            // every rank stops if any proposal failed
            let tag = self.tags.next_tag();
            let (restrict, n_coarse) = agree(&self.comm, tag, proposed)?;
            let (total_fine, total_coarse) =
                reduce_counts(&self.comm, tag.offset(4), n_fine, n_coarse)?;
            if !worth_building(
                self.comm.size(),
                cfg.n_cells_in_coarsest_level,
                total_fine,
                total_coarse,
            ) {
                debug!("level {level}: stopping at {total_fine} cells ({total_coarse} proposed)");
                break;
            }

            let coarse_level =
                self.agglomeration
                    .agglomerate_level(&self.comm, self.tags.next_tag(), restrict, n_coarse)?;
            let mut coarse_weights = vec![0.0; self.agglomeration.n_faces(coarse_level)?];
            self.agglomeration
                .restrict_face_field(&mut coarse_weights, &weights, level)?;
            weights = coarse_weights;

            let merge = cfg.merge_levels > 1 && n_pair_levels % cfg.merge_levels != 0;
            let slow = total_coarse as f64 > cfg.min_coarsening_ratio * total_fine as f64;
            if level > 0 && (merge || slow) {
                if slow {
                    warn!(
                        "level {level}: {total_fine} -> {total_coarse} cells is above ratio {}, folding",
                        cfg.min_coarsening_ratio
                    );
                }
                self.agglomeration.combine_levels(level)?;
            }
            n_pair_levels += 1;
        }

        self.apply_proc_agglomeration()?;

        for s in self.agglomeration.stats() {
            info!(
                "level {}: {} cells, {} faces, {} interfaces{}",
                s.level,
                s.n_cells,
                s.n_faces,
                s.n_interfaces,
                s.coarsening_ratio
                    .map(|r| format!(", ratio {r:.3}"))
                    .unwrap_or_default()
            );
        }
        Ok(())
    }

    fn apply_proc_agglomeration(&mut self) -> Result<(), GamgError> {
        let n_levels = self.agglomeration.n_levels();
        let (level, map) = match &self.config.proc_agglomeration {
            ProcAgglomerationPolicy::None => return Ok(()),
            ProcAgglomerationPolicy::MasterCoarsest => {
                if self.comm.size() == 1 || n_levels < 2 {
                    return Ok(());
                }
                (n_levels - 1, vec![0; self.comm.size()])
            }
            ProcAgglomerationPolicy::Manual {
                level,
                proc_agglom_map,
            } => (*level, proc_agglom_map.clone()),
        };
        let state = cluster_and_merge(
            &mut self.agglomeration,
            level,
            &map,
            &self.comm,
            &mut self.tags,
        )?;
        self.proc_agglomeration.insert(state);
        Ok(())
    }

    pub fn agglomeration(&self) -> &Agglomeration {
        &self.agglomeration
    }

    pub fn proc_agglomeration(&self) -> &ProcAgglomerationSet<C> {
        &self.proc_agglomeration
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn config(&self) -> &AgglomerationConfig {
        &self.config
    }

    /// Restrict a cell field of `fine_level` onto the next level.
    ///
    /// When the next level was merged across ranks, the master receives the
    /// field over the merged cells and the other members get `None`.
    pub fn restrict_field<T>(&self, fine: &[T], fine_level: usize) -> Result<Option<Vec<T>>, GamgError>
    where
        T: Pod + Zero + AddAssign,
    {
        let t = self.agglomeration.level_transition(fine_level)?;
        let mut coarse = vec![T::zero(); t.n_coarse_cells()];
        self.agglomeration
            .restrict_field(&mut coarse, fine, fine_level)?;
        match self.proc_agglomeration.get(fine_level + 1) {
            Some(state) => state.gather_field(&coarse),
            None => Ok(Some(coarse)),
        }
    }

    /// Inject a cell field of `coarse_level` into the level above.
    ///
    /// When `coarse_level` was merged across ranks, `coarse` is the merged
    /// field on the master (ignored elsewhere) and is scattered first.
    pub fn prolong_field<T>(&self, coarse: Option<&[T]>, coarse_level: usize) -> Result<Vec<T>, GamgError>
    where
        T: Pod + Send + Sync,
    {
        let fine_level = coarse_level.checked_sub(1).ok_or(GamgError::LevelOutOfRange {
            level: coarse_level,
            n_levels: self.agglomeration.n_levels(),
        })?;
        let t = self.agglomeration.level_transition(fine_level)?;
        let local = match self.proc_agglomeration.get(coarse_level) {
            Some(state) => state.scatter_field(coarse)?,
            None => coarse
                .ok_or(GamgError::LevelCleared {
                    level: coarse_level,
                })?
                .to_vec(),
        };
        let mut fine = vec![T::zeroed(); t.restrict_addressing().len()];
        self.agglomeration
            .prolong_field(&mut fine, &local, coarse_level)?;
        Ok(fine)
    }
}
