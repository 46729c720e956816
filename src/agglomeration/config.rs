//! Settings of the hierarchy driver.

use serde::{Deserialize, Serialize};

/// When and how coarse levels are merged across ranks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcAgglomerationPolicy {
    /// Every rank keeps its own coarse levels.
    #[default]
    None,
    /// Merge every rank onto rank 0 at the coarsest level.
    MasterCoarsest,
    /// Merge at `level` with an explicit rank -> cluster map.
    Manual {
        level: usize,
        proc_agglom_map: Vec<usize>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgglomerationConfig {
    /// Stop once the global coarse count drops below
    /// `n_ranks * n_cells_in_coarsest_level`.
    pub n_cells_in_coarsest_level: usize,
    /// Upper bound on mesh levels, the fine mesh included.
    pub max_levels: usize,
    /// Fold this many consecutive pair levels into one.
    pub merge_levels: usize,
    /// A new level with `n_coarse / n_fine` above this is folded into the
    /// previous one.
    pub min_coarsening_ratio: f64,
    /// Split coarse cells that are not face-connected.
    pub check_restriction: bool,
    pub proc_agglomeration: ProcAgglomerationPolicy,
}

impl Default for AgglomerationConfig {
    fn default() -> Self {
        Self {
            n_cells_in_coarsest_level: 10,
            max_levels: 50,
            merge_levels: 1,
            min_coarsening_ratio: 0.9,
            check_restriction: true,
            proc_agglomeration: ProcAgglomerationPolicy::None,
        }
    }
}
