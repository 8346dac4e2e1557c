use crate::data::elements::{ElementMap, FaceRef};
use crate::data::view::{ConstMatrix, View};
use crate::interfaces::base::{ConstKind, const_mat, get_opt_view_perm, scal_view};
use crate::solver_error::SolverError;

/// Faces shared by two elements of the same partition.
///
/// Both sides are read straight from local storage. The permutation is the
/// one that is optimal for the left-hand side; the right-hand side follows
/// it so that point `i` of both views lies on the same physical point. The
/// preference for the left side is arbitrary but fixed, which keeps the
/// iteration order reproducible between runs.
#[derive(Clone, Debug)]
pub struct InteriorInters {
    perm: Vec<usize>,
    pub scal_lhs: View,
    pub scal_rhs: View,
    pub mag_pnorm_lhs: ConstMatrix,
    pub mag_pnorm_rhs: ConstMatrix,
    pub norm_pnorm_lhs: ConstMatrix,
}

impl InteriorInters {
    pub fn new(elemap: &ElementMap, lhs: &[FaceRef], rhs: &[FaceRef]) -> Result<Self, SolverError> {
        if lhs.len() != rhs.len() {
            return Err(SolverError::InterfaceMismatch {
                lhs: lhs.len(),
                rhs: rhs.len(),
            });
        }
        let perm = get_opt_view_perm(lhs, elemap)?;

        let scal_lhs = scal_view(elemap, lhs, &perm)?;
        let scal_rhs = scal_view(elemap, rhs, &perm)?;
        if scal_lhs.len() != scal_rhs.len() {
            return Err(SolverError::InterfaceMismatch {
                lhs: scal_lhs.len(),
                rhs: scal_rhs.len(),
            });
        }

        Ok(Self {
            mag_pnorm_lhs: const_mat(elemap, lhs, &perm, ConstKind::MagPnorm)?,
            mag_pnorm_rhs: const_mat(elemap, rhs, &perm, ConstKind::MagPnorm)?,
            norm_pnorm_lhs: const_mat(elemap, lhs, &perm, ConstKind::NormPnorm)?,
            perm,
            scal_lhs,
            scal_rhs,
        })
    }

    /// Face order used by the views.
    pub fn perm(&self) -> &[usize] {
        &self.perm
    }

    /// Number of flux points on the interface.
    pub fn nfpts(&self) -> usize {
        self.scal_lhs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::elements::ElementType;

    #[test]
    fn both_sides_follow_the_lhs_permutation() {
        let mut m = ElementMap::new();
        let mut q = ElementType::new("quad", 2, 1, 4, 3, vec![vec![0], vec![1]]).unwrap();
        q.scal_fpts_mut().fill_with(|row, _, ele| (10 * ele + row) as f64);
        m.insert(q);

        // face pairs: (e2 f0 | e0 f1), (e1 f0 | e2 f1)
        let lhs = vec![FaceRef::new("quad", 2, 0), FaceRef::new("quad", 1, 0)];
        let rhs = vec![FaceRef::new("quad", 0, 1), FaceRef::new("quad", 2, 1)];
        let it = InteriorInters::new(&m, &lhs, &rhs).unwrap();
        assert_eq!(it.perm(), &[1, 0]);
        assert_eq!(it.scal_lhs.gather(&m), vec![10.0, 20.0]);
        assert_eq!(it.scal_rhs.gather(&m), vec![21.0, 1.0]);
    }

    #[test]
    fn mismatched_sides_are_rejected() {
        let mut m = ElementMap::new();
        m.insert(ElementType::new("quad", 2, 1, 4, 2, vec![vec![0], vec![1, 2]]).unwrap());
        let err = InteriorInters::new(
            &m,
            &[FaceRef::new("quad", 0, 0)],
            &[FaceRef::new("quad", 1, 1)],
        )
        .unwrap_err();
        assert_eq!(err, SolverError::InterfaceMismatch { lhs: 1, rhs: 2 });
    }
}
