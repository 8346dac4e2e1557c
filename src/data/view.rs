//! Indirect views over flux-point storage and the matrices that travel with
//! them.
//!
//! A [`View`] addresses one scalar per flux point and variable through a
//! `(matrix id, row, column)` triple into the element map's flux-point
//! arrays; it never copies field data at construction. [`XchgMatrix`] is
//! the staging buffer for the remote side of a distributed interface, and
//! [`ConstMatrix`] holds per-point constants (normals, face measure,
//! location) in view order.

use crate::data::elements::{ElementMap, FaceRef};
use crate::debug_invariants::DebugInvariants;
use crate::solver_error::SolverError;

/// Location of one interface flux point in element storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewEntry {
    /// Element type position in the [`ElementMap`].
    pub mat: usize,
    /// Flux point row.
    pub row: usize,
    /// Element index.
    pub col: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct View {
    nvars: usize,
    entries: Vec<ViewEntry>,
}

impl View {
    /// Build a view over the flux points of `side`, visiting faces in the
    /// order given by `perm`.
    pub fn new(elemap: &ElementMap, side: &[FaceRef], perm: &[usize]) -> Result<Self, SolverError> {
        if perm.len() != side.len() {
            return Err(SolverError::ShapeMismatch {
                context: "interface permutation",
                expected: side.len(),
                found: perm.len(),
            });
        }
        let mut nvars = None;
        let mut entries = Vec::new();
        for &fi in perm {
            let face = side.get(fi).ok_or(SolverError::ShapeMismatch {
                context: "interface permutation index",
                expected: side.len(),
                found: fi,
            })?;
            let mat = elemap.matrix_id(&face.etype)?;
            let ele = elemap.by_id(mat);
            match nvars {
                None => nvars = Some(ele.nvars()),
                Some(n) if n != ele.nvars() => {
                    return Err(SolverError::ShapeMismatch {
                        context: "variables per element type",
                        expected: n,
                        found: ele.nvars(),
                    });
                }
                Some(_) => {}
            }
            for &row in ele.scal_fpts_for_inter(face.eidx, face.fidx)? {
                entries.push(ViewEntry {
                    mat,
                    row,
                    col: face.eidx,
                });
            }
        }
        Ok(Self {
            nvars: nvars.unwrap_or(0),
            entries,
        })
    }

    /// Number of flux points.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn nvars(&self) -> usize {
        self.nvars
    }

    pub fn entries(&self) -> &[ViewEntry] {
        &self.entries
    }

    /// # Panics
    ///
    /// Panics if `i >= self.len()` or `var` is outside the element storage.
    pub fn get(&self, elemap: &ElementMap, var: usize, i: usize) -> f64 {
        let e = self.entries[i];
        elemap.by_id(e.mat).scal_fpts().get(e.row, var, e.col)
    }

    /// Copy the viewed values out, laid out `[nvars][len]`.
    pub fn gather(&self, elemap: &ElementMap) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.nvars * self.len());
        for var in 0..self.nvars {
            out.extend(self.entries.iter().map(|e| {
                elemap.by_id(e.mat).scal_fpts().get(e.row, var, e.col)
            }));
        }
        out
    }

    /// Write `vals` (laid out `[nvars][len]`) through the view.
    pub fn scatter(&self, elemap: &mut ElementMap, vals: &[f64]) -> Result<(), SolverError> {
        let n = self.len();
        if vals.len() != self.nvars * n {
            return Err(SolverError::ShapeMismatch {
                context: "view scatter",
                expected: self.nvars * n,
                found: vals.len(),
            });
        }
        for var in 0..self.nvars {
            for (i, e) in self.entries.iter().enumerate() {
                elemap
                    .by_id_mut(e.mat)
                    .scal_fpts_mut()
                    .set(e.row, var, e.col, vals[var * n + i]);
            }
        }
        Ok(())
    }
}

/// Staging buffer `[nvars][n]` for values received from a peer.
///
/// While a receive into it is outstanding the contents are unreadable.
#[derive(Clone, Debug)]
pub struct XchgMatrix {
    nvars: usize,
    n: usize,
    data: Vec<f64>,
    pending: Option<usize>,
}

impl XchgMatrix {
    pub fn new(nvars: usize, n: usize) -> Self {
        Self {
            nvars,
            n,
            data: vec![0.0; nvars * n],
            pending: None,
        }
    }

    pub fn nvars(&self) -> usize {
        self.nvars
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Size of the buffer on the wire.
    pub fn nbytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f64>()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn mark_pending(&mut self, peer: usize) {
        self.pending = Some(peer);
    }

    /// Replace the contents with freshly received values and clear the
    /// pending flag.
    pub(crate) fn complete(&mut self, vals: Vec<f64>) -> Result<(), SolverError> {
        if vals.len() != self.data.len() {
            return Err(SolverError::ShapeMismatch {
                context: "exchange buffer",
                expected: self.data.len(),
                found: vals.len(),
            });
        }
        self.data = vals;
        self.pending = None;
        Ok(())
    }

    pub fn data(&self) -> Result<&[f64], SolverError> {
        match self.pending {
            Some(peer) => Err(SolverError::PendingReceive { peer }),
            None => Ok(&self.data),
        }
    }

    pub fn get(&self, var: usize, i: usize) -> Result<f64, SolverError> {
        let data = self.data()?;
        if var >= self.nvars || i >= self.n {
            return Err(SolverError::PointOutOfRange {
                context: "exchange buffer",
                var,
                point: i,
                nvars: self.nvars,
                npts: self.n,
            });
        }
        Ok(data[var * self.n + i])
    }
}

impl DebugInvariants for XchgMatrix {
    fn validate_invariants(&self) -> Result<(), SolverError> {
        if self.data.len() != self.nvars * self.n {
            return Err(SolverError::ShapeMismatch {
                context: "exchange buffer",
                expected: self.nvars * self.n,
                found: self.data.len(),
            });
        }
        Ok(())
    }
}

/// Dense `[nrows][ncols]` matrix of per-point constants, one column per
/// interface flux point.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstMatrix {
    nrows: usize,
    ncols: usize,
    data: Vec<f64>,
}

impl ConstMatrix {
    /// Build from per-point columns, each holding `nrows` values.
    pub fn from_columns(nrows: usize, cols: &[Vec<f64>]) -> Result<Self, SolverError> {
        let ncols = cols.len();
        let mut data = vec![0.0; nrows * ncols];
        for (c, col) in cols.iter().enumerate() {
            if col.len() != nrows {
                return Err(SolverError::ShapeMismatch {
                    context: "constant matrix column",
                    expected: nrows,
                    found: col.len(),
                });
            }
            for (r, &v) in col.iter().enumerate() {
                data[r * ncols + c] = v;
            }
        }
        Ok(Self { nrows, ncols, data })
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// # Panics
    ///
    /// Panics if `r >= self.nrows()` or `c >= self.ncols()`.
    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.ncols + c]
    }

    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.ncols..(r + 1) * self.ncols]
    }

    pub fn column(&self, c: usize) -> Vec<f64> {
        (0..self.nrows).map(|r| self.get(r, c)).collect()
    }
}

impl DebugInvariants for ConstMatrix {
    fn validate_invariants(&self) -> Result<(), SolverError> {
        if self.data.len() != self.nrows * self.ncols {
            return Err(SolverError::ShapeMismatch {
                context: "constant matrix",
                expected: self.nrows * self.ncols,
                found: self.data.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::elements::ElementType;
    use crate::solver_error::ErrorKind;

    fn elemap() -> ElementMap {
        let mut m = ElementMap::new();
        let mut q = ElementType::new("quad", 2, 2, 1, 2, vec![vec![0], vec![1, 2]]).unwrap();
        q.scal_fpts_mut().fill_with(|row, var, ele| (100 * var + 10 * ele + row) as f64);
        m.insert(q);
        m
    }

    #[test]
    fn view_follows_permutation() {
        let m = elemap();
        let side = vec![FaceRef::new("quad", 1, 1), FaceRef::new("quad", 0, 0)];
        let v = View::new(&m, &side, &[1, 0]).unwrap();
        assert_eq!(v.len(), 3);
        assert_eq!(v.gather(&m), vec![0.0, 11.0, 12.0, 100.0, 111.0, 112.0]);
    }

    #[test]
    fn scatter_writes_back() {
        let mut m = elemap();
        let side = vec![FaceRef::new("quad", 0, 1)];
        let v = View::new(&m, &side, &[0]).unwrap();
        v.scatter(&mut m, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(m.get("quad").unwrap().scal_fpts().get(2, 1, 0), 4.0);
        assert!(v.scatter(&mut m, &[1.0]).is_err());
    }

    #[test]
    fn pending_exchange_buffer_is_unreadable() {
        let mut x = XchgMatrix::new(1, 2);
        x.mark_pending(3);
        assert_eq!(x.data().unwrap_err(), SolverError::PendingReceive { peer: 3 });
        x.complete(vec![1.0, 2.0]).unwrap();
        assert_eq!(x.get(0, 1).unwrap(), 2.0);
        assert_eq!(x.get(0, 2).unwrap_err().kind(), ErrorKind::Integrity);
        assert!(matches!(x.get(1, 0), Err(SolverError::PointOutOfRange { var: 1, .. })));
    }

    #[test]
    fn const_matrix_columns() {
        let c = ConstMatrix::from_columns(2, &[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(c.row(1), &[2.0, 4.0]);
        assert_eq!(c.column(1), vec![3.0, 4.0]);
    }
}
