//! Restriction (sum) and prolongation (injection) of level fields.

use super::{Agglomeration, FaceRestrict};
use crate::gamg_error::GamgError;
use num_traits::Zero;
use std::ops::AddAssign;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// `coarse[c] = sum of fine[i] over restrict[i] == c`.
pub fn restrict_field<T>(coarse: &mut [T], fine: &[T], restrict: &[usize])
where
    T: Zero + Copy + AddAssign,
{
    debug_assert_eq!(fine.len(), restrict.len());
    coarse.iter_mut().for_each(|c| *c = T::zero());
    for (&v, &c) in fine.iter().zip(restrict) {
        coarse[c] += v;
    }
}

/// Sum fine face values onto coarse faces; faces interior to a coarse cell
/// contribute nothing.
pub fn restrict_face_field<T>(coarse: &mut [T], fine: &[T], face_restrict: &[FaceRestrict])
where
    T: Zero + Copy + AddAssign,
{
    debug_assert_eq!(fine.len(), face_restrict.len());
    coarse.iter_mut().for_each(|c| *c = T::zero());
    for (&v, fr) in fine.iter().zip(face_restrict) {
        if let FaceRestrict::Coarse(k) = *fr {
            coarse[k] += v;
        }
    }
}

/// `fine[i] = coarse[restrict[i]]`.
pub fn prolong_field<T>(fine: &mut [T], coarse: &[T], restrict: &[usize])
where
    T: Copy + Send + Sync,
{
    debug_assert_eq!(fine.len(), restrict.len());
    #[cfg(feature = "rayon")]
    fine.par_iter_mut()
        .zip(restrict.par_iter())
        .for_each(|(f, &c)| *f = coarse[c]);
    #[cfg(not(feature = "rayon"))]
    for (f, &c) in fine.iter_mut().zip(restrict) {
        *f = coarse[c];
    }
}

fn check_len(level: usize, expected: usize, found: usize) -> Result<(), GamgError> {
    if expected == found {
        Ok(())
    } else {
        Err(GamgError::FieldSizeMismatch {
            level,
            expected,
            found,
        })
    }
}

impl Agglomeration {
    /// Restrict a cell field of level `fine_level` onto level `fine_level + 1`.
    pub fn restrict_field<T>(&self, coarse: &mut [T], fine: &[T], fine_level: usize) -> Result<(), GamgError>
    where
        T: Zero + Copy + AddAssign,
    {
        let t = self.level_transition(fine_level)?;
        check_len(fine_level, t.restrict_addressing.len(), fine.len())?;
        check_len(fine_level + 1, t.n_coarse_cells, coarse.len())?;
        restrict_field(coarse, fine, &t.restrict_addressing);
        Ok(())
    }

    /// Restrict a face field of level `fine_level` onto level `fine_level + 1`.
    pub fn restrict_face_field<T>(
        &self,
        coarse: &mut [T],
        fine: &[T],
        fine_level: usize,
    ) -> Result<(), GamgError>
    where
        T: Zero + Copy + AddAssign,
    {
        let t = self.level_transition(fine_level)?;
        check_len(fine_level, t.face_restrict_addressing.len(), fine.len())?;
        check_len(fine_level + 1, t.n_coarse_faces, coarse.len())?;
        restrict_face_field(coarse, fine, &t.face_restrict_addressing);
        Ok(())
    }

    /// Inject a cell field of level `coarse_level` into level `coarse_level - 1`.
    pub fn prolong_field<T>(&self, fine: &mut [T], coarse: &[T], coarse_level: usize) -> Result<(), GamgError>
    where
        T: Copy + Send + Sync,
    {
        let fine_level = coarse_level.checked_sub(1).ok_or(GamgError::LevelOutOfRange {
            level: coarse_level,
            n_levels: self.n_levels(),
        })?;
        let t = self.level_transition(fine_level)?;
        check_len(fine_level, t.restrict_addressing.len(), fine.len())?;
        check_len(coarse_level, t.n_coarse_cells, coarse.len())?;
        prolong_field(fine, coarse, &t.restrict_addressing);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restriction_sums_and_prolongation_copies() {
        let restrict = [0, 0, 1, 1, 1];
        let fine = [1.0, 2.0, 3.0, 4.0, 5.0];
        let mut coarse = [9.0; 2];
        restrict_field(&mut coarse, &fine, &restrict);
        assert_eq!(coarse, [3.0, 12.0]);

        let mut back = [0.0; 5];
        prolong_field(&mut back, &coarse, &restrict);
        assert_eq!(back, [3.0, 3.0, 12.0, 12.0, 12.0]);
    }

    #[test]
    fn interior_faces_drop_out() {
        let fr = [
            FaceRestrict::Interior(0),
            FaceRestrict::Coarse(0),
            FaceRestrict::Coarse(0),
            FaceRestrict::Interior(1),
        ];
        let mut coarse = [0i64; 1];
        restrict_face_field(&mut coarse, &[5, 2, 3, 7], &fr);
        assert_eq!(coarse, [5]);
    }
}
