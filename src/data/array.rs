//! Dense per-element-type arrays.

use serde::{Deserialize, Serialize};

use crate::solver_error::SolverError;

/// Dense array shaped `[nrows, nvars, neles]`, stored row-major so that the
/// element index is the fastest varying one. One instance holds a single
/// element type's data at its solution or flux points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EleArray {
    nrows: usize,
    nvars: usize,
    neles: usize,
    data: Vec<f64>,
}

impl EleArray {
    pub fn zeros(nrows: usize, nvars: usize, neles: usize) -> Self {
        Self {
            nrows,
            nvars,
            neles,
            data: vec![0.0; nrows * nvars * neles],
        }
    }

    /// Wrap existing data.
    ///
    /// # Errors
    /// `ShapeMismatch` if `data.len() != nrows * nvars * neles`.
    pub fn from_vec(nrows: usize, nvars: usize, neles: usize, data: Vec<f64>) -> Result<Self, SolverError> {
        let expected = nrows * nvars * neles;
        if data.len() != expected {
            return Err(SolverError::ShapeMismatch {
                context: "element array",
                expected,
                found: data.len(),
            });
        }
        Ok(Self {
            nrows,
            nvars,
            neles,
            data,
        })
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.nrows, self.nvars, self.neles)
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn nvars(&self) -> usize {
        self.nvars
    }

    pub fn neles(&self) -> usize {
        self.neles
    }

    #[inline]
    pub fn offset(&self, row: usize, var: usize, ele: usize) -> usize {
        (row * self.nvars + var) * self.neles + ele
    }

    #[inline]
    pub fn get(&self, row: usize, var: usize, ele: usize) -> f64 {
        self.data[self.offset(row, var, ele)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, var: usize, ele: usize, v: f64) {
        let i = self.offset(row, var, ele);
        self.data[i] = v;
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Fill from `f(row, var, ele)`.
    pub fn fill_with(&mut self, mut f: impl FnMut(usize, usize, usize) -> f64) {
        for row in 0..self.nrows {
            for var in 0..self.nvars {
                for ele in 0..self.neles {
                    let i = self.offset(row, var, ele);
                    self.data[i] = f(row, var, ele);
                }
            }
        }
    }
}
