//! Register kernels.
//!
//! A kernel is a named unit of work over register roles. Names form a
//! closed set ([`KernelName`]); asking for an unknown name or the wrong
//! number of arguments fails when the kernel is built, not when it runs.
//! One [`KernelSet`] covers every element type of the partition.

mod kernels;

pub use kernels::KernelSet;

use std::fmt;
use std::str::FromStr;

use crate::solver_error::SolverError;

/// Kernels that operate on register roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KernelName {
    /// `x0 = a0*x0 + a1*x1 + ... + an*xn`.
    Axnpby,
    /// `x0 = x1`.
    Copy,
    /// Sum over all DOFs of `(e / (atol + rtol*max(|u0|, |u1|)))^2` with
    /// roles `(e, u0, u1)`.
    Errest,
}

impl KernelName {
    pub fn as_str(self) -> &'static str {
        match self {
            KernelName::Axnpby => "axnpby",
            KernelName::Copy => "copy",
            KernelName::Errest => "errest",
        }
    }

    /// Reject argument counts the kernel cannot take.
    pub fn check_arity(self, nargs: usize) -> Result<(), SolverError> {
        let (ok, expected) = match self {
            KernelName::Axnpby => (nargs >= 2, "at least 2"),
            KernelName::Copy => (nargs == 2, "2"),
            KernelName::Errest => (nargs == 3, "3"),
        };
        if ok {
            Ok(())
        } else {
            Err(SolverError::KernelArity {
                kernel: self.as_str(),
                expected: expected.to_owned(),
                found: nargs,
            })
        }
    }

    /// Number of scalar coefficients a run takes.
    pub fn ncoeffs(self, nargs: usize) -> usize {
        match self {
            KernelName::Axnpby => nargs,
            KernelName::Copy => 0,
            KernelName::Errest => 2,
        }
    }
}

impl FromStr for KernelName {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "axnpby" => Ok(KernelName::Axnpby),
            "copy" => Ok(KernelName::Copy),
            "errest" => Ok(KernelName::Errest),
            _ => Err(SolverError::UnknownKernel(s.to_owned())),
        }
    }
}

impl fmt::Display for KernelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_arity() {
        assert_eq!("axnpby".parse::<KernelName>().unwrap(), KernelName::Axnpby);
        assert_eq!(
            "axpy".parse::<KernelName>().unwrap_err(),
            SolverError::UnknownKernel("axpy".into())
        );
        assert!(KernelName::Axnpby.check_arity(5).is_ok());
        let err = KernelName::Copy.check_arity(3).unwrap_err();
        assert!(err.to_string().contains("copy"));
        assert!(KernelName::Errest.check_arity(2).is_err());
    }
}
