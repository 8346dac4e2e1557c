//! Element types as seen by the interface layer.
//!
//! Element physics lives outside this crate. What the interface layer needs
//! from an element type is where each face's flux points sit in the
//! flux-point storage, and the per-point geometry (physical normal and
//! location). [`ElementMap`] orders element types; an element type's
//! position in the map is the matrix id used when ordering interface
//! points for memory locality.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::array::EleArray;
use crate::solver_error::SolverError;

/// One face of one element: `(element type, element index, local face)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceRef {
    pub etype: String,
    pub eidx: usize,
    pub fidx: usize,
}

impl FaceRef {
    pub fn new(etype: impl Into<String>, eidx: usize, fidx: usize) -> Self {
        Self {
            etype: etype.into(),
            eidx,
            fidx,
        }
    }
}

/// Ordered faces on one side of a set of shared faces.
pub type InterfaceSide = Vec<FaceRef>;

/// Flux-point layout, geometry and storage of one element type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElementType {
    name: String,
    ndims: usize,
    nvars: usize,
    nupts: usize,
    neles: usize,
    /// Flux point rows of each local face.
    face_fpts: Vec<Vec<usize>>,
    /// Physical (unnormalised) outward normals, `[nfpts, ndims, neles]`.
    pnorm_fpts: EleArray,
    /// Physical locations, `[nfpts, ndims, neles]`.
    ploc_fpts: EleArray,
    /// Scalar solution at the flux points, `[nfpts, nvars, neles]`.
    scal_fpts: EleArray,
}

impl ElementType {
    /// New element type with zeroed geometry and storage.
    ///
    /// # Errors
    /// `ShapeMismatch` if a face has no flux points.
    pub fn new(
        name: impl Into<String>,
        ndims: usize,
        nvars: usize,
        nupts: usize,
        neles: usize,
        face_fpts: Vec<Vec<usize>>,
    ) -> Result<Self, SolverError> {
        if face_fpts.iter().any(Vec::is_empty) {
            return Err(SolverError::ShapeMismatch {
                context: "flux points per face",
                expected: 1,
                found: 0,
            });
        }
        let nfpts = face_fpts.iter().flatten().map(|&r| r + 1).max().unwrap_or(0);
        Ok(Self {
            name: name.into(),
            ndims,
            nvars,
            nupts,
            neles,
            face_fpts,
            pnorm_fpts: EleArray::zeros(nfpts, ndims, neles),
            ploc_fpts: EleArray::zeros(nfpts, ndims, neles),
            scal_fpts: EleArray::zeros(nfpts, nvars, neles),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn ndims(&self) -> usize {
        self.ndims
    }
    pub fn nvars(&self) -> usize {
        self.nvars
    }
    pub fn nupts(&self) -> usize {
        self.nupts
    }
    pub fn neles(&self) -> usize {
        self.neles
    }
    pub fn nfpts(&self) -> usize {
        self.scal_fpts.nrows()
    }
    pub fn nfaces(&self) -> usize {
        self.face_fpts.len()
    }

    /// Degrees of freedom held at the solution points.
    pub fn ndofs(&self) -> usize {
        self.nupts * self.nvars * self.neles
    }

    pub fn scal_fpts(&self) -> &EleArray {
        &self.scal_fpts
    }

    pub fn scal_fpts_mut(&mut self) -> &mut EleArray {
        &mut self.scal_fpts
    }

    /// Set the physical normal and location of flux point `fpt` of element
    /// `eidx`.
    pub fn set_fpt_geometry(
        &mut self,
        eidx: usize,
        fpt: usize,
        pnorm: &[f64],
        ploc: &[f64],
    ) -> Result<(), SolverError> {
        for (what, v) in [("normal", pnorm), ("location", ploc)] {
            if v.len() != self.ndims {
                return Err(SolverError::ShapeMismatch {
                    context: if what == "normal" {
                        "flux point normal"
                    } else {
                        "flux point location"
                    },
                    expected: self.ndims,
                    found: v.len(),
                });
            }
        }
        if eidx >= self.neles || fpt >= self.nfpts() {
            return Err(SolverError::ShapeMismatch {
                context: "flux point index",
                expected: self.nfpts(),
                found: fpt,
            });
        }
        for d in 0..self.ndims {
            self.pnorm_fpts.set(fpt, d, eidx, pnorm[d]);
            self.ploc_fpts.set(fpt, d, eidx, ploc[d]);
        }
        Ok(())
    }

    fn face(&self, eidx: usize, fidx: usize) -> Result<&[usize], SolverError> {
        match self.face_fpts.get(fidx) {
            Some(rows) if eidx < self.neles => Ok(rows),
            _ => Err(SolverError::FaceOutOfRange {
                etype: self.name.clone(),
                eidx,
                fidx,
            }),
        }
    }

    /// Flux point rows of a face; the storage column is the element index.
    pub fn scal_fpts_for_inter(&self, eidx: usize, fidx: usize) -> Result<&[usize], SolverError> {
        self.face(eidx, fidx)
    }

    /// Face measure at each flux point: the magnitude of the physical normal.
    pub fn mag_pnorms_for_inter(&self, eidx: usize, fidx: usize) -> Result<Vec<f64>, SolverError> {
        Ok(self
            .face(eidx, fidx)?
            .iter()
            .map(|&r| self.mag_pnorm(r, eidx))
            .collect())
    }

    /// Unit outward normal at each flux point, `ndims` values per point.
    pub fn norm_pnorms_for_inter(&self, eidx: usize, fidx: usize) -> Result<Vec<Vec<f64>>, SolverError> {
        Ok(self
            .face(eidx, fidx)?
            .iter()
            .map(|&r| {
                let mag = self.mag_pnorm(r, eidx);
                (0..self.ndims)
                    .map(|d| {
                        let v = self.pnorm_fpts.get(r, d, eidx);
                        if mag > 0.0 { v / mag } else { 0.0 }
                    })
                    .collect()
            })
            .collect())
    }

    /// Physical location of each flux point, `ndims` values per point.
    pub fn ploc_for_inter(&self, eidx: usize, fidx: usize) -> Result<Vec<Vec<f64>>, SolverError> {
        Ok(self
            .face(eidx, fidx)?
            .iter()
            .map(|&r| (0..self.ndims).map(|d| self.ploc_fpts.get(r, d, eidx)).collect())
            .collect())
    }

    fn mag_pnorm(&self, row: usize, eidx: usize) -> f64 {
        (0..self.ndims)
            .map(|d| self.pnorm_fpts.get(row, d, eidx).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

/// Element types of one partition, in a fixed order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ElementMap {
    types: Vec<ElementType>,
    index: BTreeMap<String, usize>,
}

impl ElementMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element type; replaces an existing type of the same name in
    /// place, keeping its matrix id.
    pub fn insert(&mut self, ele: ElementType) {
        match self.index.get(ele.name()) {
            Some(&i) => self.types[i] = ele,
            None => {
                self.index.insert(ele.name().to_owned(), self.types.len());
                self.types.push(ele);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Position of `name` in the map.
    pub fn matrix_id(&self, name: &str) -> Result<usize, SolverError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| SolverError::UnknownElementType(name.to_owned()))
    }

    pub fn get(&self, name: &str) -> Result<&ElementType, SolverError> {
        Ok(&self.types[self.matrix_id(name)?])
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut ElementType, SolverError> {
        let i = self.matrix_id(name)?;
        Ok(&mut self.types[i])
    }

    pub fn by_id(&self, id: usize) -> &ElementType {
        &self.types[id]
    }

    pub(crate) fn by_id_mut(&mut self, id: usize) -> &mut ElementType {
        &mut self.types[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ElementType> {
        self.types.iter()
    }

    /// Solution point DOFs per element type, in map order.
    pub fn ele_ndofs(&self) -> Vec<usize> {
        self.types.iter().map(ElementType::ndofs).collect()
    }
}
