//! Row-major variable-length lists in CSR layout.
//
// * `offsets[i] .. offsets[i+1]` = row *i* inside `values`
// * `offsets.len() == n_rows + 1`, `offsets[0] == 0`
//
// Used for cell-cell adjacency, fine-cells-per-coarse-cell and the per-rank
// maps produced by processor agglomeration, where a `Vec<Vec<_>>` would cost
// one allocation per row.

use crate::debug_invariants::DebugInvariants;
use crate::gamg_error::GamgError;
use serde::{Deserialize, Serialize};
use std::ops::Index;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactListList<T> {
    offsets: Vec<usize>,
    values: Vec<T>,
}

impl<T> Default for CompactListList<T> {
    fn default() -> Self {
        Self {
            offsets: vec![0],
            values: Vec::new(),
        }
    }
}

impl<T> CompactListList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw CSR arrays, validating the offsets.
    pub fn from_parts(offsets: Vec<usize>, values: Vec<T>) -> Result<Self, GamgError> {
        let out = Self { offsets, values };
        out.validate_invariants()?;
        Ok(out)
    }

    pub fn from_rows<I, R>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = T>,
    {
        let mut out = Self::default();
        for row in rows {
            out.push_row(row);
        }
        out
    }

    pub fn push_row<R: IntoIterator<Item = T>>(&mut self, row: R) {
        self.values.extend(row);
        self.offsets.push(self.values.len());
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries over all rows.
    pub fn total_len(&self) -> usize {
        self.values.len()
    }

    pub fn row(&self, i: usize) -> &[T] {
        &self.values[self.offsets[i]..self.offsets[i + 1]]
    }

    pub fn row_len(&self, i: usize) -> usize {
        self.offsets[i + 1] - self.offsets[i]
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        self.offsets.windows(2).map(|w| &self.values[w[0]..w[1]])
    }

    pub fn to_rows(&self) -> Vec<Vec<T>>
    where
        T: Clone,
    {
        self.iter_rows().map(<[T]>::to_vec).collect()
    }
}

impl<T> Index<usize> for CompactListList<T> {
    type Output = [T];
    fn index(&self, i: usize) -> &[T] {
        self.row(i)
    }
}

impl<T> DebugInvariants for CompactListList<T> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "CompactListList");
    }

    fn validate_invariants(&self) -> Result<(), GamgError> {
        match self.offsets.first() {
            Some(0) => {}
            _ => {
                return Err(GamgError::InvalidAddressing(
                    "compact list offsets must start at 0".into(),
                ));
            }
        }
        if self.offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(GamgError::InvalidAddressing(
                "compact list offsets must be non-decreasing".into(),
            ));
        }
        let last = self.offsets[self.offsets.len() - 1];
        if last != self.values.len() {
            return Err(GamgError::InvalidAddressing(format!(
                "compact list ends at {last} but holds {} values",
                self.values.len()
            )));
        }
        Ok(())
    }
}

/// Invert a many-to-one map: row `c` lists every `i` with `map[i] == c`, in
/// increasing `i`.
///
/// Every value of `map` must be `< n`.
pub fn invert_map(map: &[usize], n: usize) -> CompactListList<usize> {
    let mut offsets = vec![0usize; n + 1];
    for &c in map {
        offsets[c + 1] += 1;
    }
    for c in 0..n {
        offsets[c + 1] += offsets[c];
    }
    let mut fill = offsets.clone();
    let mut values = vec![0usize; map.len()];
    for (i, &c) in map.iter().enumerate() {
        values[fill[c]] = i;
        fill[c] += 1;
    }
    CompactListList { offsets, values }
}
