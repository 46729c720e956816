//! Connectivity check of coarse cells.
//!
//! A restriction map may put fine cells that are not face-connected into one
//! coarse cell. Each such coarse cell is split into its connected regions:
//! the region reached first in fine-cell order keeps the coarse id and every
//! other region gets a fresh id after the existing ones.

use super::level_builder::validate_restriction;
use crate::gamg_error::GamgError;
use crate::topology::ldu_addressing::LduAddressing;

/// Renumbered map produced when some coarse cell was disconnected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitRestriction {
    pub restrict: Vec<usize>,
    pub n_coarse: usize,
}

/// Returns `None` when every coarse cell is connected. `level` is the mesh
/// level of `addressing` and only feeds diagnostics.
pub fn check_restriction(
    level: usize,
    addressing: &LduAddressing,
    restrict: &[usize],
    n_coarse: usize,
) -> Result<Option<SplitRestriction>, GamgError> {
    validate_restriction(level, restrict, addressing.n_cells(), n_coarse)?;

    // propagate the smallest fine id through faces interior to a coarse cell
    let mut master: Vec<usize> = (0..addressing.n_cells()).collect();
    loop {
        let mut changed = false;
        for (&own, &nei) in addressing.lower().iter().zip(addressing.upper()) {
            if restrict[own] != restrict[nei] {
                continue;
            }
            let m = master[own].min(master[nei]);
            if master[own] != m || master[nei] != m {
                master[own] = m;
                master[nei] = m;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut regions: Vec<Vec<usize>> = vec![Vec::new(); n_coarse];
    for (cell, &c) in restrict.iter().enumerate() {
        if !regions[c].contains(&master[cell]) {
            regions[c].push(master[cell]);
        }
    }
    let n_regions: usize = regions.iter().map(Vec::len).sum();
    if n_regions == n_coarse {
        return Ok(None);
    }

    let mut next = n_coarse;
    let new_ids: Vec<Vec<usize>> = regions
        .iter()
        .enumerate()
        .map(|(c, masters)| {
            let mut ids = Vec::with_capacity(masters.len());
            ids.push(c);
            for _ in 1..masters.len() {
                ids.push(next);
                next += 1;
            }
            ids
        })
        .collect();

    let restrict = restrict
        .iter()
        .enumerate()
        .map(|(cell, &c)| {
            let region = regions[c]
                .iter()
                .position(|&m| m == master[cell])
                .unwrap_or(0);
            new_ids[c][region]
        })
        .collect();
    Ok(Some(SplitRestriction {
        restrict,
        n_coarse: next,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: usize) -> LduAddressing {
        LduAddressing::new(n, (0..n - 1).collect(), (1..n).collect()).unwrap()
    }

    #[test]
    fn connected_map_passes() {
        assert_eq!(check_restriction(0, &chain(4), &[0, 0, 1, 1], 2).unwrap(), None);
    }

    #[test]
    fn disconnected_cell_is_split() {
        // coarse 0 = {0, 3} is not connected through cells 1, 2
        let split = check_restriction(0, &chain(5), &[0, 1, 1, 0, 2], 3)
            .unwrap()
            .unwrap();
        assert_eq!(split.n_coarse, 4);
        assert_eq!(split.restrict, vec![0, 1, 1, 3, 2]);
    }

    #[test]
    fn bad_map_reports_its_level() {
        assert_eq!(
            check_restriction(3, &chain(3), &[0, 2, 0], 2),
            Err(GamgError::RestrictOutOfRange {
                level: 3,
                cell: 1,
                value: 2,
                n_coarse: 2
            })
        );
    }
}
