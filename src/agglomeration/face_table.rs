//! Per-coarse-cell neighbour table used while collapsing fine faces.
//!
//! One flat buffer of `max_nbrs` slots per coarse cell plus a fill count per
//! cell. When any row overflows, the row width doubles and every row's valid
//! prefix is copied into the wider layout.

use log::debug;

const INITIAL_MAX_NBRS: usize = 10;

#[derive(Debug)]
pub(crate) struct FaceTable {
    max_nbrs: usize,
    counts: Vec<usize>,
    nbrs: Vec<usize>,
    faces: Vec<usize>,
    n_faces: usize,
}

impl FaceTable {
    pub(crate) fn new(n_cells: usize) -> Self {
        Self {
            max_nbrs: INITIAL_MAX_NBRS,
            counts: vec![0; n_cells],
            nbrs: vec![0; INITIAL_MAX_NBRS * n_cells],
            faces: vec![0; INITIAL_MAX_NBRS * n_cells],
            n_faces: 0,
        }
    }

    /// Coarse face joining `own < nei`, allocating a new id on first sight.
    pub(crate) fn find_or_insert(&mut self, own: usize, nei: usize) -> usize {
        let start = own * self.max_nbrs;
        let count = self.counts[own];
        if let Some(slot) = self.nbrs[start..start + count].iter().position(|&n| n == nei) {
            return self.faces[start + slot];
        }
        if count == self.max_nbrs {
            self.grow();
        }
        let start = own * self.max_nbrs;
        let id = self.n_faces;
        self.nbrs[start + count] = nei;
        self.faces[start + count] = id;
        self.counts[own] += 1;
        self.n_faces += 1;
        id
    }

    fn grow(&mut self) {
        let old = self.max_nbrs;
        let new = old * 2;
        let n_cells = self.counts.len();
        let mut nbrs = vec![0; new * n_cells];
        let mut faces = vec![0; new * n_cells];
        for (c, &count) in self.counts.iter().enumerate() {
            nbrs[c * new..c * new + count].copy_from_slice(&self.nbrs[c * old..c * old + count]);
            faces[c * new..c * new + count].copy_from_slice(&self.faces[c * old..c * old + count]);
        }
        debug!("coarse face table: {old} -> {new} neighbours per cell");
        self.max_nbrs = new;
        self.nbrs = nbrs;
        self.faces = faces;
    }

    /// Number of distinct coarse faces discovered so far.
    pub(crate) fn n_faces(&self) -> usize {
        self.n_faces
    }

    /// Neighbours of `own` and their discovery ids, in insertion order.
    pub(crate) fn row(&self, own: usize) -> (&[usize], &[usize]) {
        let start = own * self.max_nbrs;
        let end = start + self.counts[own];
        (&self.nbrs[start..end], &self.faces[start..end])
    }

    pub(crate) fn n_cells(&self) -> usize {
        self.counts.len()
    }
}
