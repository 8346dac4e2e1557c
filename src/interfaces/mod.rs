//! Interface exchange.
//!
//! Three kinds of interfaces carry flux-point data between elements:
//!
//! - [`InteriorInters`]: both sides on this partition, read in place.
//! - [`DistributedInters`]: the other side lives on another rank and is
//!   moved with a pack / send / recv / unpack sequence.
//! - [`BcInters`]: the other side is a prescribed boundary state.
//!
//! Exchange stages are named by [`InterKernel`] and sequenced through a
//! [`Queue`]. [`InterfaceSet::run`] executes a queue stage-major, so every
//! send and receive of a step is posted before any of them is waited on.

pub mod base;
pub mod boundary;
pub mod interior;
pub mod mpi;

pub use base::{ConstKind, get_opt_view_perm};
pub use boundary::{BcExprs, BcInters};
pub use interior::InteriorInters;
pub use mpi::DistributedInters;

use std::fmt;
use std::str::FromStr;

use crate::algs::communicator::Communicator;
use crate::data::elements::{ElementMap, FaceRef};
use crate::solver_error::SolverError;

/// Exchange stages of a distributed interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InterKernel {
    ScalFptsPack,
    ScalFptsSend,
    ScalFptsRecv,
    ScalFptsUnpack,
}

impl InterKernel {
    pub const ALL: [InterKernel; 4] = [
        InterKernel::ScalFptsPack,
        InterKernel::ScalFptsSend,
        InterKernel::ScalFptsRecv,
        InterKernel::ScalFptsUnpack,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InterKernel::ScalFptsPack => "scal_fpts_pack",
            InterKernel::ScalFptsSend => "scal_fpts_send",
            InterKernel::ScalFptsRecv => "scal_fpts_recv",
            InterKernel::ScalFptsUnpack => "scal_fpts_unpack",
        }
    }
}

impl FromStr for InterKernel {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InterKernel::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| SolverError::UnknownKernel(s.to_owned()))
    }
}

impl fmt::Display for InterKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered list of exchange stages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Queue {
    kernels: Vec<InterKernel>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full pack, send, recv, unpack sequence.
    pub fn exchange() -> Self {
        Self {
            kernels: InterKernel::ALL.to_vec(),
        }
    }

    pub fn push(&mut self, k: InterKernel) -> &mut Self {
        self.kernels.push(k);
        self
    }

    pub fn kernels(&self) -> &[InterKernel] {
        &self.kernels
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}

/// All interfaces of one partition.
pub struct InterfaceSet<C: Communicator> {
    pub interior: Vec<InteriorInters>,
    pub mpi: Vec<DistributedInters<C>>,
    pub bcs: Vec<BcInters>,
}

impl<C: Communicator> Default for InterfaceSet<C> {
    fn default() -> Self {
        Self {
            interior: Vec::new(),
            mpi: Vec::new(),
            bcs: Vec::new(),
        }
    }
}

impl<C: Communicator> InterfaceSet<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_interior(&mut self, elemap: &ElementMap, lhs: &[FaceRef], rhs: &[FaceRef]) -> Result<(), SolverError> {
        self.interior.push(InteriorInters::new(elemap, lhs, rhs)?);
        Ok(())
    }

    pub fn add_mpi(&mut self, elemap: &ElementMap, lhs: &[FaceRef], rhsrank: usize) -> Result<(), SolverError> {
        self.mpi.push(DistributedInters::new(elemap, lhs, rhsrank)?);
        Ok(())
    }

    pub fn add_bc(&mut self, elemap: &ElementMap, lhs: &[FaceRef], cfgsect: &str) -> Result<(), SolverError> {
        self.bcs.push(BcInters::new(elemap, lhs, cfgsect)?);
        Ok(())
    }

    /// Run `queue` over every distributed interface, one stage at a time.
    pub fn run(&mut self, queue: &Queue, elemap: &ElementMap, comm: &C) -> Result<(), SolverError> {
        for &k in queue.kernels() {
            for inter in &mut self.mpi {
                inter.run_kernel(k, elemap, comm)?;
            }
        }
        Ok(())
    }
}
