use crate::backend::KernelName;
use crate::data::array::EleArray;
use crate::data::register_bank::RegisterBank;
use crate::solver_error::SolverError;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// One kernel per element type over register roles `0..nargs`.
///
/// Roles are resolved against the bank's role table each time the set
/// runs, so [`RegisterBank::prepare_reg_banks`] between runs retargets the
/// kernels without rebuilding them.
#[derive(Clone, Debug)]
pub struct KernelSet {
    name: KernelName,
    nargs: usize,
    netypes: usize,
}

impl KernelSet {
    /// Resolve `name` and check `nargs` against it.
    pub fn new(name: &str, nargs: usize, netypes: usize) -> Result<Self, SolverError> {
        let name: KernelName = name.parse()?;
        name.check_arity(nargs)?;
        Ok(Self {
            name,
            nargs,
            netypes,
        })
    }

    pub fn name(&self) -> KernelName {
        self.name
    }

    pub fn nargs(&self) -> usize {
        self.nargs
    }

    /// Number of per-element-type kernels in the set.
    pub fn len(&self) -> usize {
        self.netypes
    }

    pub fn is_empty(&self) -> bool {
        self.netypes == 0
    }

    /// Run every element type's kernel with scalar `coeffs`.
    ///
    /// Returns the reduced value for reduction kernels and `0.0` otherwise.
    pub fn run(&self, bank: &mut RegisterBank, coeffs: &[f64]) -> Result<f64, SolverError> {
        let expected = self.name.ncoeffs(self.nargs);
        if coeffs.len() != expected {
            return Err(SolverError::ShapeMismatch {
                context: "kernel coefficients",
                expected,
                found: coeffs.len(),
            });
        }
        if bank.netypes() != self.netypes {
            return Err(SolverError::ShapeMismatch {
                context: "kernel element types",
                expected: self.netypes,
                found: bank.netypes(),
            });
        }
        let ins: Vec<usize> = (1..self.nargs).collect();
        match self.name {
            KernelName::Axnpby => {
                let (out, ins) = bank.kernel_args(0, &ins)?;
                check_shapes(out, &ins)?;
                axnpby(out, &ins, coeffs);
                Ok(0.0)
            }
            KernelName::Copy => {
                let (out, ins) = bank.kernel_args(0, &ins)?;
                check_shapes(out, &ins)?;
                for (o, i) in out.iter_mut().zip(ins[0]) {
                    o.as_mut_slice().copy_from_slice(i.as_slice());
                }
                Ok(0.0)
            }
            KernelName::Errest => {
                let (err, u0, u1) = (bank.role(0)?, bank.role(1)?, bank.role(2)?);
                Ok(errest(err, u0, u1, coeffs[0], coeffs[1]))
            }
        }
    }
}

fn check_shapes(out: &[EleArray], ins: &[&[EleArray]]) -> Result<(), SolverError> {
    for arg in ins {
        for (o, i) in out.iter().zip(arg.iter()) {
            if o.shape() != i.shape() {
                return Err(SolverError::ShapeMismatch {
                    context: "kernel argument",
                    expected: o.as_slice().len(),
                    found: i.as_slice().len(),
                });
            }
        }
    }
    Ok(())
}

fn axnpby(out: &mut [EleArray], ins: &[&[EleArray]], coeffs: &[f64]) {
    let body = |(e, o): (usize, &mut EleArray)| {
        let x = o.as_mut_slice();
        // a zero leading coefficient must not propagate NaNs from x0
        match coeffs[0] {
            a if a == 0.0 => x.fill(0.0),
            a if a == 1.0 => {}
            a => x.iter_mut().for_each(|v| *v *= a),
        }
        for (arg, &a) in ins.iter().zip(&coeffs[1..]) {
            if a == 0.0 {
                continue;
            }
            for (v, &y) in x.iter_mut().zip(arg[e].as_slice()) {
                *v += a * y;
            }
        }
    };

    #[cfg(feature = "rayon")]
    out.par_iter_mut().enumerate().for_each(body);
    #[cfg(not(feature = "rayon"))]
    out.iter_mut().enumerate().for_each(body);
}

fn errest(err: &[EleArray], u0: &[EleArray], u1: &[EleArray], atol: f64, rtol: f64) -> f64 {
    let per_type = |((e, a), b): ((&EleArray, &EleArray), &EleArray)| -> f64 {
        e.as_slice()
            .iter()
            .zip(a.as_slice())
            .zip(b.as_slice())
            .map(|((&d, &p), &q)| {
                let s = d / (atol + rtol * p.abs().max(q.abs()));
                s * s
            })
            .sum::<f64>()
    };
    // per-type partial sums are added in element type order
    let parts: Vec<f64> = err.iter().zip(u0).zip(u1).map(per_type).collect();
    parts.iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> RegisterBank {
        let mut b = RegisterBank::new(3, &[(1, 1, 2), (2, 1, 1)]);
        for s in 0..3 {
            for arr in b.slot_mut(s).unwrap() {
                arr.as_mut_slice().fill(s as f64 + 1.0);
            }
        }
        b
    }

    #[test]
    fn axnpby_over_bound_roles() {
        let mut b = bank();
        let k = KernelSet::new("axnpby", 3, 2).unwrap();
        b.prepare_reg_banks(&[2, 0, 1]).unwrap();
        // slot2 = 0.5*3 + 2*1 + 1*2
        k.run(&mut b, &[0.5, 2.0, 1.0]).unwrap();
        for arr in b.slot(2).unwrap() {
            assert!(arr.as_slice().iter().all(|&v| v == 5.5));
        }
        assert!(b.slot(0).unwrap()[1].as_slice().iter().all(|&v| v == 1.0));
        assert!(k.run(&mut b, &[1.0]).is_err());
    }

    #[test]
    fn zero_leading_coefficient_ignores_nan() {
        let mut b = bank();
        b.slot_mut(0).unwrap()[0].as_mut_slice().fill(f64::NAN);
        let k = KernelSet::new("axnpby", 2, 2).unwrap();
        k.run(&mut b, &[0.0, 1.0]).unwrap();
        assert!(b.slot(0).unwrap()[0].as_slice().iter().all(|&v| v == 2.0));
    }

    #[test]
    fn copy_and_errest() {
        let mut b = bank();
        KernelSet::new("copy", 2, 2).unwrap().run(&mut b, &[]).unwrap();
        assert!(b.slot(0).unwrap()[1].as_slice().iter().all(|&v| v == 2.0));

        // err = 2 everywhere, max(|u0|, |u1|) = 3, atol = 1, rtol = 1/3 -> 1 per DOF
        let e = KernelSet::new("errest", 3, 2)
            .unwrap()
            .run(&mut b, &[1.0, 1.0 / 3.0])
            .unwrap();
        assert!((e - 4.0).abs() < 1e-12);
    }

    #[test]
    fn construction_rejects_bad_requests() {
        assert!(matches!(
            KernelSet::new("saxpy", 2, 1),
            Err(SolverError::UnknownKernel(_))
        ));
        assert!(matches!(
            KernelSet::new("copy", 1, 1),
            Err(SolverError::KernelArity { found: 1, .. })
        ));
    }
}
