#![cfg_attr(docsrs, feature(doc_cfg))]
//! # flux-stepper
//!
//! flux-stepper is the distributed time-stepping core of a high-order flux
//! reconstruction solver. It covers the part of a run that sits between the
//! mesh and the physics: deciding which rank owns which partition, moving
//! the solution through time with explicit Runge-Kutta schemes, and
//! exchanging flux-point data across partition boundaries.
//!
//! ## Features
//! - Rank allocation with deterministic run ids, validated once on the root
//!   and broadcast to every worker ([`partitioning`])
//! - Explicit steppers and step size controllers selected by name, working
//!   on a bank of solution registers that is never copied, only rebound
//!   ([`integrators`], [`data::RegisterBank`])
//! - Interior, distributed and boundary interfaces with a cache friendly
//!   face ordering and non-blocking exchange ([`interfaces`])
//! - Boundary expressions parsed once into typed trees ([`expr`])
//! - Pluggable communication backends: serial, in-process threads, and MPI
//!   behind the `mpi-support` feature ([`algs::communicator`])
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! flux-stepper = "0.1"
//! # Optional features:
//! # features = ["mpi-support", "rayon"]
//! ```
//!
//! The embedding driver implements [`integrators::System`] for its physics,
//! builds an [`integrators::Integrator`] from an [`data::Inifile`] and calls
//! [`integrators::Integrator::run`]. Logging goes through the `log` facade;
//! install any logger to see it.

pub mod algs;
pub mod backend;
pub mod data;
pub mod debug_invariants;
pub mod expr;
pub mod integrators;
pub mod interfaces;
pub mod partitioning;
pub mod plugins;
pub mod solver_error;

pub use debug_invariants::DebugInvariants;
pub use solver_error::{ErrorKind, SolverError};

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{Communicator, NoComm, Reductions, ThreadComm, Wait};
    pub use crate::backend::{KernelName, KernelSet};
    pub use crate::data::{
        EleArray, ElementMap, ElementType, FaceRef, Inifile, RegisterBank, View, XchgMatrix,
    };
    pub use crate::expr::Expr;
    pub use crate::integrators::{
        Controller, Integrator, StepDriver, StepOutcome, Stepper, System,
    };
    pub use crate::interfaces::{
        BcInters, DistributedInters, InterKernel, InterfaceSet, InteriorInters, Queue,
    };
    pub use crate::partitioning::{
        MeshConnectivity, RankAllocation, RankAllocator, RunId, get_rank_allocation,
    };
    pub use crate::plugins::{IntegratorView, Plugin, ResidualPlugin};
    pub use crate::solver_error::{ErrorKind, SolverError};
}
