//! Shared construction steps for every interface kind.

use crate::data::elements::{ElementMap, FaceRef};
use crate::data::view::{ConstMatrix, View};
use crate::solver_error::SolverError;

/// Per-point constant data that can be laid out along an interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstKind {
    /// Face measure, one row.
    MagPnorm,
    /// Unit outward normal, `ndims` rows.
    NormPnorm,
    /// Physical location, `ndims` rows.
    Ploc,
}

/// Face order giving the most local access pattern over element storage.
///
/// Faces are sorted by the `(matrix id, row, column)` of their first flux
/// point. The sort is stable, so faces with equal keys keep their input
/// order.
pub fn get_opt_view_perm(side: &[FaceRef], elemap: &ElementMap) -> Result<Vec<usize>, SolverError> {
    let keys = side
        .iter()
        .map(|f| {
            let mat = elemap.matrix_id(&f.etype)?;
            let rows = elemap.by_id(mat).scal_fpts_for_inter(f.eidx, f.fidx)?;
            Ok((mat, rows[0], f.eidx))
        })
        .collect::<Result<Vec<_>, SolverError>>()?;
    let mut perm: Vec<usize> = (0..side.len()).collect();
    perm.sort_by_key(|&i| keys[i]);
    Ok(perm)
}

/// Identity permutation over `side`.
pub fn identity_perm(side: &[FaceRef]) -> Vec<usize> {
    (0..side.len()).collect()
}

pub(crate) fn scal_view(elemap: &ElementMap, side: &[FaceRef], perm: &[usize]) -> Result<View, SolverError> {
    View::new(elemap, side, perm)
}

/// Constant matrix of `kind` over the points of `side`, in `perm` order.
pub(crate) fn const_mat(
    elemap: &ElementMap,
    side: &[FaceRef],
    perm: &[usize],
    kind: ConstKind,
) -> Result<ConstMatrix, SolverError> {
    let mut cols = Vec::new();
    let mut nrows = None;
    for &fi in perm {
        let f = &side[fi];
        let ele = elemap.get(&f.etype)?;
        let face_cols = match kind {
            ConstKind::MagPnorm => ele
                .mag_pnorms_for_inter(f.eidx, f.fidx)?
                .into_iter()
                .map(|m| vec![m])
                .collect(),
            ConstKind::NormPnorm => ele.norm_pnorms_for_inter(f.eidx, f.fidx)?,
            ConstKind::Ploc => ele.ploc_for_inter(f.eidx, f.fidx)?,
        };
        let rows = match kind {
            ConstKind::MagPnorm => 1,
            _ => ele.ndims(),
        };
        match nrows {
            Some(n) if n != rows => {
                return Err(SolverError::ShapeMismatch {
                    context: "dimensions per element type",
                    expected: n,
                    found: rows,
                });
            }
            _ => nrows = Some(rows),
        }
        cols.extend(face_cols);
    }
    ConstMatrix::from_columns(nrows.unwrap_or(0), &cols)
}
