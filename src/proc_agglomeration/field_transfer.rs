//! Moving cell fields of a merged level between members and master.

use super::ProcAgglomeration;
use crate::algs::collectives::{gather_pod, scatter_bytes};
use crate::algs::communicator::Communicator;
use crate::algs::wire::cast_slice;
use crate::gamg_error::GamgError;
use bytemuck::Pod;

impl<C: Communicator> ProcAgglomeration<C> {
    /// Gather every member's field over its own cells of the merged level.
    ///
    /// The master receives the field over the merged cells, in
    /// `cell_offsets` order; other members get `None`.
    pub fn gather_field<T: Pod>(&self, local: &[T]) -> Result<Option<Vec<T>>, GamgError> {
        if local.len() != self.local_n_cells {
            return Err(GamgError::FieldSizeMismatch {
                level: self.level,
                expected: self.local_n_cells,
                found: local.len(),
            });
        }
        let Some(parts) = gather_pod(&self.cluster_comm, self.field_tag, local)? else {
            return Ok(None);
        };
        let mut out = Vec::with_capacity(self.cell_offsets.last().copied().unwrap_or(0));
        for (member, part) in parts.into_iter().enumerate() {
            let expected = self.cell_offsets[member + 1] - self.cell_offsets[member];
            if part.len() != expected {
                return Err(GamgError::CommSizeMismatch {
                    rank: member,
                    expected,
                    found: part.len(),
                });
            }
            out.extend(part);
        }
        Ok(Some(out))
    }

    /// Scatter a field over the merged cells back to the members.
    ///
    /// `merged` is read on the master only; every member receives the slice
    /// over its own cells.
    pub fn scatter_field<T: Pod>(&self, merged: Option<&[T]>) -> Result<Vec<T>, GamgError> {
        let parts: Option<Vec<Vec<u8>>> = match merged {
            Some(values) if self.is_master() => {
                let total = self.cell_offsets.last().copied().unwrap_or(0);
                if values.len() != total {
                    return Err(GamgError::FieldSizeMismatch {
                        level: self.level,
                        expected: total,
                        found: values.len(),
                    });
                }
                Some(
                    self.cell_offsets
                        .windows(2)
                        .map(|w| cast_slice(&values[w[0]..w[1]]).to_vec())
                        .collect(),
                )
            }
            _ => None,
        };
        let bytes = scatter_bytes(&self.cluster_comm, self.field_tag.offset(2), parts.as_deref())?;
        if bytes.len() != self.local_n_cells * size_of::<T>() {
            return Err(GamgError::CommSizeMismatch {
                rank: 0,
                expected: self.local_n_cells,
                found: bytes.len() / size_of::<T>().max(1),
            });
        }
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }
}
