//! Lower/upper face addressing of one multigrid level.
//!
//! A level is `n_cells` cells joined by internal faces. Face `f` joins
//! `lower[f]` (owner) to `upper[f]` (neighbour). Stored faces are always in
//! upper-triangular order: `lower[f] < upper[f]` and faces sorted by
//! `(lower, upper)` without repeats.

use crate::debug_invariants::DebugInvariants;
use crate::gamg_error::GamgError;
use crate::topology::compact_list_list::CompactListList;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LduAddressing {
    n_cells: usize,
    lower: Vec<usize>,
    upper: Vec<usize>,
}

impl LduAddressing {
    /// Wrap owner/neighbour arrays that are already upper-triangular.
    pub fn new(n_cells: usize, lower: Vec<usize>, upper: Vec<usize>) -> Result<Self, GamgError> {
        let out = Self {
            n_cells,
            lower,
            upper,
        };
        out.validate_invariants()?;
        Ok(out)
    }

    /// Build from faces in arbitrary order and orientation.
    ///
    /// Each face is swapped so that its lower cell is the smaller one, then
    /// faces are sorted and repeated pairs collapse into one face. Returns the
    /// addressing and, for every input face, the face it ended up in.
    /// Self-faces are rejected.
    pub fn from_unordered(
        n_cells: usize,
        faces: &[(usize, usize)],
    ) -> Result<(Self, Vec<usize>), GamgError> {
        let mut lower = Vec::with_capacity(faces.len());
        let mut upper = Vec::with_capacity(faces.len());
        for (f, &(a, b)) in faces.iter().enumerate() {
            if a == b {
                return Err(GamgError::NotUpperTriangular {
                    face: f,
                    lower: a,
                    upper: b,
                });
            }
            lower.push(a.min(b));
            upper.push(a.max(b));
        }
        let mut position = vec![0; faces.len()];
        let mut sorted_lower = Vec::with_capacity(faces.len());
        let mut sorted_upper = Vec::with_capacity(faces.len());
        for old in upper_tri_order(&lower, &upper) {
            let pair = (lower[old], upper[old]);
            if sorted_lower.last().copied().zip(sorted_upper.last().copied()) != Some(pair) {
                sorted_lower.push(pair.0);
                sorted_upper.push(pair.1);
            }
            position[old] = sorted_lower.len() - 1;
        }
        let out = Self::new(n_cells, sorted_lower, sorted_upper)?;
        Ok((out, position))
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    pub fn n_faces(&self) -> usize {
        self.lower.len()
    }

    /// Owner cell of every face.
    pub fn lower(&self) -> &[usize] {
        &self.lower
    }

    /// Neighbour cell of every face.
    pub fn upper(&self) -> &[usize] {
        &self.upper
    }

    /// First face owned by each cell; `owner_start[n_cells] == n_faces`.
    pub fn owner_start(&self) -> Vec<usize> {
        let mut start = vec![0usize; self.n_cells + 1];
        for &l in &self.lower {
            start[l + 1] += 1;
        }
        for c in 0..self.n_cells {
            start[c + 1] += start[c];
        }
        start
    }

    /// Faces ordered by neighbour cell (stable in face index).
    pub fn losort(&self) -> Vec<usize> {
        let start = self.losort_start();
        let mut fill = start.clone();
        let mut order = vec![0usize; self.n_faces()];
        for (f, &u) in self.upper.iter().enumerate() {
            order[fill[u]] = f;
            fill[u] += 1;
        }
        order
    }

    /// Offsets into [`losort`](Self::losort) per neighbour cell.
    pub fn losort_start(&self) -> Vec<usize> {
        let mut start = vec![0usize; self.n_cells + 1];
        for &u in &self.upper {
            start[u + 1] += 1;
        }
        for c in 0..self.n_cells {
            start[c + 1] += start[c];
        }
        start
    }

    /// Face-neighbours of every cell, each row ascending.
    pub fn cell_cells(&self) -> CompactListList<usize> {
        let mut rows = vec![Vec::new(); self.n_cells];
        for (&l, &u) in self.lower.iter().zip(&self.upper) {
            rows[l].push(u);
            rows[u].push(l);
        }
        for row in &mut rows {
            row.sort_unstable();
        }
        CompactListList::from_rows(rows)
    }
}

/// Permutation putting faces into upper-triangular order: position `i` of
/// the result holds the old index of the face that goes to slot `i`.
///
/// Faces must already have `lower[f] < upper[f]`; ties keep input order.
pub fn upper_tri_order(lower: &[usize], upper: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..lower.len()).collect();
    order.sort_by_key(|&f| (lower[f], upper[f]));
    order
}

impl DebugInvariants for LduAddressing {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "LduAddressing");
    }

    fn validate_invariants(&self) -> Result<(), GamgError> {
        if self.lower.len() != self.upper.len() {
            return Err(GamgError::InvalidAddressing(format!(
                "{} owners but {} neighbours",
                self.lower.len(),
                self.upper.len()
            )));
        }
        let mut prev: Option<(usize, usize)> = None;
        for (f, (&l, &u)) in self.lower.iter().zip(&self.upper).enumerate() {
            for cell in [l, u] {
                if cell >= self.n_cells {
                    return Err(GamgError::CellOutOfRange {
                        face: f,
                        cell,
                        n_cells: self.n_cells,
                    });
                }
            }
            let ordered = l < u && prev.is_none_or(|p| p < (l, u));
            if !ordered {
                return Err(GamgError::NotUpperTriangular {
                    face: f,
                    lower: l,
                    upper: u,
                });
            }
            prev = Some((l, u));
        }
        Ok(())
    }
}
