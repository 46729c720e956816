//! Folding of one level transition into the previous one.

use super::{Agglomeration, FaceRestrict, LevelTransition};
use crate::gamg_error::GamgError;
use crate::topology::interfaces::GamgInterface;
use log::debug;

/// Compose transition `first` (`i-1 -> i`) with `second` (`i -> i+1`).
pub fn compose_transitions(
    first: &LevelTransition,
    second: &LevelTransition,
) -> Result<LevelTransition, GamgError> {
    if second.restrict_addressing.len() != first.n_coarse_cells {
        return Err(GamgError::RestrictSizeMismatch {
            level: 0,
            expected: first.n_coarse_cells,
            found: second.restrict_addressing.len(),
        });
    }
    if second.patch_face_restrict_addressing.len() != first.patch_face_restrict_addressing.len() {
        return Err(GamgError::InterfaceLayout(format!(
            "cannot fold {} interfaces into {}",
            second.patch_face_restrict_addressing.len(),
            first.patch_face_restrict_addressing.len()
        )));
    }

    let restrict_addressing = first
        .restrict_addressing
        .iter()
        .map(|&c| second.restrict_addressing[c])
        .collect();

    let mut face_restrict_addressing = Vec::with_capacity(first.face_restrict_addressing.len());
    let mut face_flip_map = Vec::with_capacity(first.face_restrict_addressing.len());
    for (&fr, &flip) in first.face_restrict_addressing.iter().zip(&first.face_flip_map) {
        let (composed, composed_flip) = match fr {
            FaceRestrict::Coarse(k) => match second.face_restrict_addressing[k] {
                FaceRestrict::Coarse(kk) => (FaceRestrict::Coarse(kk), flip ^ second.face_flip_map[k]),
                interior => (interior, false),
            },
            FaceRestrict::Interior(c) => (FaceRestrict::Interior(second.restrict_addressing[c]), false),
        };
        face_restrict_addressing.push(composed);
        face_flip_map.push(composed_flip);
    }

    let mut patch_face_restrict_addressing = Vec::with_capacity(first.patch_face_restrict_addressing.len());
    for (p, (a, b)) in first
        .patch_face_restrict_addressing
        .iter()
        .zip(&second.patch_face_restrict_addressing)
        .enumerate()
    {
        let mut row = Vec::with_capacity(a.len());
        for &f in a {
            let composed = b.get(f).copied().ok_or(GamgError::InterfaceSizeMismatch {
                interface: p,
                expected: f + 1,
                found: b.len(),
            })?;
            row.push(composed);
        }
        patch_face_restrict_addressing.push(row);
    }

    Ok(LevelTransition {
        restrict_addressing,
        n_coarse_cells: second.n_coarse_cells,
        face_restrict_addressing,
        n_coarse_faces: second.n_coarse_faces,
        face_flip_map,
        patch_face_restrict_addressing,
    })
}

impl Agglomeration {
    /// Fold transition `cur_level` into transition `cur_level - 1`.
    ///
    /// Mesh level `cur_level` is discarded; level `cur_level + 1` takes its
    /// place and its interfaces are combined with the discarded ones, so that
    /// their face restriction refers to level `cur_level - 1`.
    pub fn combine_levels(&mut self, cur_level: usize) -> Result<(), GamgError> {
        if cur_level == 0 || cur_level >= self.transitions.len() {
            return Err(GamgError::LevelOutOfRange {
                level: cur_level,
                n_levels: self.meshes.len(),
            });
        }
        let prev_level = cur_level - 1;
        let composed = compose_transitions(
            self.level_transition(prev_level)?,
            self.level_transition(cur_level)?,
        )
        .map_err(|e| match e {
            GamgError::RestrictSizeMismatch {
                expected, found, ..
            } => GamgError::RestrictSizeMismatch {
                level: cur_level,
                expected,
                found,
            },
            other => other,
        })?;

        let middle = self.mesh_level(cur_level)?;
        let coarse = self.mesh_level(cur_level + 1)?;
        let mut interfaces: Vec<GamgInterface> = middle.interfaces().to_vec();
        if interfaces.len() != coarse.interfaces().len() {
            return Err(GamgError::InterfaceLayout(format!(
                "level {cur_level} has {} interfaces, level {} has {}",
                interfaces.len(),
                cur_level + 1,
                coarse.interfaces().len()
            )));
        }
        for (mid, coarser) in interfaces.iter_mut().zip(coarse.interfaces()) {
            mid.combine(coarser)?;
        }

        debug!(
            "folding level {cur_level} ({} cells) into level {prev_level}: {} -> {} cells",
            middle.n_cells(),
            composed.restrict_addressing.len(),
            composed.n_coarse_cells
        );

        if let Some(Some(mesh)) = self.meshes.get_mut(cur_level + 1) {
            mesh.interfaces_mut().clone_from_slice(&interfaces);
        }
        self.meshes.remove(cur_level);
        self.transitions.remove(cur_level);
        self.transitions[prev_level] = Some(composed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{CommTag, NoComm};
    use crate::topology::ldu_addressing::LduAddressing;
    use crate::topology::primitive_mesh::LduPrimitiveMesh;

    fn chain(n: usize) -> LduPrimitiveMesh {
        LduPrimitiveMesh::serial(LduAddressing::new(n, (0..n - 1).collect(), (1..n).collect()).unwrap())
    }

    #[test]
    fn eight_to_two_matches_direct() {
        let mut stepped = Agglomeration::new(chain(8));
        stepped
            .agglomerate_level(&NoComm, CommTag::new(0), vec![0, 0, 1, 1, 2, 2, 3, 3], 4)
            .unwrap();
        stepped
            .agglomerate_level(&NoComm, CommTag::new(0), vec![0, 0, 1, 1], 2)
            .unwrap();
        stepped.combine_levels(1).unwrap();

        let mut direct = Agglomeration::new(chain(8));
        direct
            .agglomerate_level(&NoComm, CommTag::new(0), vec![0, 0, 0, 0, 1, 1, 1, 1], 2)
            .unwrap();

        assert_eq!(stepped.n_levels(), 2);
        assert_eq!(stepped.level_transition(0), direct.level_transition(0));
        assert_eq!(stepped.mesh_level(1), direct.mesh_level(1));
    }

    #[test]
    fn folding_needs_two_transitions() {
        let mut agg = Agglomeration::new(chain(4));
        agg.agglomerate_level(&NoComm, CommTag::new(0), vec![0, 0, 1, 1], 2)
            .unwrap();
        assert!(matches!(
            agg.combine_levels(1),
            Err(GamgError::LevelOutOfRange { level: 1, .. })
        ));
        assert!(agg.combine_levels(0).is_err());
    }
}
