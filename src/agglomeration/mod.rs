//! Multigrid level storage and the operations that grow and fold it.
//!
//! Level `0` is the fine mesh. Transition `i` maps level `i` onto level
//! `i + 1` and carries the cell restriction, the face restriction with flip
//! flags and the per-interface patch-face restriction. Levels are appended
//! by [`Agglomeration::agglomerate_level`], folded by
//! [`Agglomeration::combine_levels`] and, after processor agglomeration,
//! cleared on ranks whose coarse problem moved to a cluster master.

pub mod check_restriction;
pub mod compactor;
pub mod config;
pub mod driver;
mod face_table;
pub mod field_ops;
pub mod level_builder;

use crate::debug_invariants::DebugInvariants;
use crate::gamg_error::GamgError;
use crate::topology::compact_list_list::{CompactListList, invert_map};
use crate::topology::interfaces::GamgInterface;
use crate::topology::primitive_mesh::LduPrimitiveMesh;
use serde::{Deserialize, Serialize};

/// Where a fine face goes on the next level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaceRestrict {
    /// Both sides fall into this coarse cell; the face vanishes.
    Interior(usize),
    /// The face becomes part of this coarse face.
    Coarse(usize),
}

impl FaceRestrict {
    /// Single-integer form: `k >= 0` for coarse face `k`, `-(c + 1)` for a
    /// face interior to coarse cell `c`.
    pub fn encode(self) -> i64 {
        match self {
            Self::Coarse(k) => k as i64,
            Self::Interior(c) => -(c as i64) - 1,
        }
    }

    pub fn decode(v: i64) -> Self {
        if v >= 0 {
            Self::Coarse(v as usize)
        } else {
            Self::Interior((-(v + 1)) as usize)
        }
    }

    pub fn coarse_face(self) -> Option<usize> {
        match self {
            Self::Coarse(k) => Some(k),
            Self::Interior(_) => None,
        }
    }
}

/// Addressing of one level transition `i -> i + 1`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTransition {
    pub(crate) restrict_addressing: Vec<usize>,
    pub(crate) n_coarse_cells: usize,
    pub(crate) face_restrict_addressing: Vec<FaceRestrict>,
    pub(crate) n_coarse_faces: usize,
    pub(crate) face_flip_map: Vec<bool>,
    pub(crate) patch_face_restrict_addressing: Vec<Vec<usize>>,
}

impl LevelTransition {
    /// Fine cell -> coarse cell.
    pub fn restrict_addressing(&self) -> &[usize] {
        &self.restrict_addressing
    }

    pub fn n_coarse_cells(&self) -> usize {
        self.n_coarse_cells
    }

    pub fn face_restrict_addressing(&self) -> &[FaceRestrict] {
        &self.face_restrict_addressing
    }

    pub fn n_coarse_faces(&self) -> usize {
        self.n_coarse_faces
    }

    /// `true` where the fine face points against its coarse face.
    pub fn face_flip_map(&self) -> &[bool] {
        &self.face_flip_map
    }

    /// Per fine interface: fine patch face -> coarse patch face.
    pub fn patch_face_restrict_addressing(&self) -> &[Vec<usize>] {
        &self.patch_face_restrict_addressing
    }
}

impl DebugInvariants for LevelTransition {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "LevelTransition");
    }

    fn validate_invariants(&self) -> Result<(), GamgError> {
        if self.face_flip_map.len() != self.face_restrict_addressing.len() {
            return Err(GamgError::InvalidAddressing(format!(
                "{} face flips for {} fine faces",
                self.face_flip_map.len(),
                self.face_restrict_addressing.len()
            )));
        }
        for (f, fr) in self.face_restrict_addressing.iter().enumerate() {
            let bad = match *fr {
                FaceRestrict::Coarse(k) => k >= self.n_coarse_faces,
                FaceRestrict::Interior(c) => c >= self.n_coarse_cells || self.face_flip_map[f],
            };
            if bad {
                return Err(GamgError::InvalidAddressing(format!(
                    "fine face {f} restricts to {fr:?} ({} coarse cells, {} coarse faces)",
                    self.n_coarse_cells, self.n_coarse_faces
                )));
            }
        }
        Ok(())
    }
}

/// Size summary of one level.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LevelStats {
    pub level: usize,
    pub n_cells: usize,
    pub n_faces: usize,
    pub n_interfaces: usize,
    /// Cells of this level over cells of the level above.
    pub coarsening_ratio: Option<f64>,
}

/// The agglomeration hierarchy of one rank.
#[derive(Clone, Debug)]
pub struct Agglomeration {
    meshes: Vec<Option<LduPrimitiveMesh>>,
    transitions: Vec<Option<LevelTransition>>,
}

impl Agglomeration {
    pub fn new(fine: LduPrimitiveMesh) -> Self {
        Self {
            meshes: vec![Some(fine)],
            transitions: Vec::new(),
        }
    }

    /// Number of mesh levels, the fine mesh included. Cleared levels count.
    pub fn n_levels(&self) -> usize {
        self.meshes.len()
    }

    /// Number of level transitions (`n_levels() - 1`).
    pub fn n_transitions(&self) -> usize {
        self.transitions.len()
    }

    pub fn has_mesh_level(&self, level: usize) -> bool {
        matches!(self.meshes.get(level), Some(Some(_)))
    }

    pub fn mesh_level(&self, level: usize) -> Result<&LduPrimitiveMesh, GamgError> {
        match self.meshes.get(level) {
            Some(Some(mesh)) => Ok(mesh),
            Some(None) => Err(GamgError::LevelCleared { level }),
            None => Err(GamgError::LevelOutOfRange {
                level,
                n_levels: self.meshes.len(),
            }),
        }
    }

    pub fn interface_level(&self, level: usize) -> Result<&[GamgInterface], GamgError> {
        Ok(self.mesh_level(level)?.interfaces())
    }

    /// Cells of mesh level `level`.
    pub fn n_cells(&self, level: usize) -> Result<usize, GamgError> {
        Ok(self.mesh_level(level)?.n_cells())
    }

    /// Internal faces of mesh level `level`.
    pub fn n_faces(&self, level: usize) -> Result<usize, GamgError> {
        Ok(self.mesh_level(level)?.n_faces())
    }

    /// Transition `level -> level + 1`.
    pub fn level_transition(&self, level: usize) -> Result<&LevelTransition, GamgError> {
        match self.transitions.get(level) {
            Some(Some(t)) => Ok(t),
            Some(None) => Err(GamgError::LevelCleared { level }),
            None => Err(GamgError::LevelOutOfRange {
                level,
                n_levels: self.meshes.len(),
            }),
        }
    }

    pub fn restrict_addressing(&self, level: usize) -> Result<&[usize], GamgError> {
        Ok(self.level_transition(level)?.restrict_addressing())
    }

    pub fn face_restrict_addressing(&self, level: usize) -> Result<&[FaceRestrict], GamgError> {
        Ok(self.level_transition(level)?.face_restrict_addressing())
    }

    pub fn face_flip_map(&self, level: usize) -> Result<&[bool], GamgError> {
        Ok(self.level_transition(level)?.face_flip_map())
    }

    pub fn patch_face_restrict_addressing(&self, level: usize) -> Result<&[Vec<usize>], GamgError> {
        Ok(self.level_transition(level)?.patch_face_restrict_addressing())
    }

    /// Fine cells of level `level` grouped by the coarse cell they merge into.
    pub fn agglomerated_cells(&self, level: usize) -> Result<CompactListList<usize>, GamgError> {
        let t = self.level_transition(level)?;
        Ok(invert_map(&t.restrict_addressing, t.n_coarse_cells))
    }

    /// Sizes of every level still held on this rank.
    pub fn stats(&self) -> Vec<LevelStats> {
        let mut out = Vec::with_capacity(self.meshes.len());
        let mut prev: Option<usize> = None;
        for (level, mesh) in self.meshes.iter().enumerate() {
            let Some(mesh) = mesh else {
                prev = None;
                continue;
            };
            out.push(LevelStats {
                level,
                n_cells: mesh.n_cells(),
                n_faces: mesh.n_faces(),
                n_interfaces: mesh.interfaces().len(),
                coarsening_ratio: prev
                    .filter(|&p| p > 0)
                    .map(|p| mesh.n_cells() as f64 / p as f64),
            });
            prev = Some(mesh.n_cells());
        }
        out
    }

    pub(crate) fn push_level(&mut self, mesh: LduPrimitiveMesh, transition: LevelTransition) {
        self.meshes.push(Some(mesh));
        self.transitions.push(Some(transition));
    }

    /// Drop every level above `level` and every transition from `level` on.
    pub(crate) fn truncate(&mut self, level: usize) {
        self.meshes.truncate(level + 1);
        self.transitions.truncate(level);
    }

    pub(crate) fn replace_mesh(&mut self, level: usize, mesh: LduPrimitiveMesh) {
        self.meshes[level] = Some(mesh);
    }

    /// Clear mesh levels above `level` and transitions from `level` on,
    /// keeping the slots so level numbering stays aligned across ranks.
    pub(crate) fn clear_above(&mut self, level: usize) {
        for mesh in self.meshes.iter_mut().skip(level + 1) {
            *mesh = None;
        }
        for t in self.transitions.iter_mut().skip(level) {
            *t = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_restrict_encoding_keeps_bias() {
        assert_eq!(FaceRestrict::Interior(0).encode(), -1);
        assert_eq!(FaceRestrict::Interior(1).encode(), -2);
        assert_eq!(FaceRestrict::Coarse(0).encode(), 0);
        assert_eq!(FaceRestrict::decode(-1), FaceRestrict::Interior(0));
        assert_eq!(FaceRestrict::decode(3), FaceRestrict::Coarse(3));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn most_negative_code_decodes() {
        assert_eq!(
            FaceRestrict::decode(i64::MIN),
            FaceRestrict::Interior(i64::MAX as usize)
        );
        assert_eq!(FaceRestrict::decode(i64::MIN).encode(), i64::MIN);
    }

    #[test]
    fn fine_only_hierarchy_has_no_transitions() {
        use crate::topology::ldu_addressing::LduAddressing;
        let mesh = LduPrimitiveMesh::serial(LduAddressing::new(2, vec![0], vec![1]).unwrap());
        let agg = Agglomeration::new(mesh);
        assert_eq!(agg.n_levels(), 1);
        assert_eq!(agg.n_cells(0).unwrap(), 2);
        assert!(matches!(
            agg.restrict_addressing(0),
            Err(GamgError::LevelOutOfRange { level: 0, n_levels: 1 })
        ));
    }
}
