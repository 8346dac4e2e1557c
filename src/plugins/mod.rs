//! Observers of a running integration.
//!
//! A plugin is called once before the first step and after every accepted
//! step. It sees the integrator only through [`IntegratorView`], so it can
//! read the solution but not alter the run.

pub mod residual;

pub use residual::ResidualPlugin;

use crate::algs::communicator::Reductions;
use crate::data::array::EleArray;
use crate::solver_error::SolverError;

/// Read-only snapshot of the integrator handed to plugins.
#[derive(Clone, Copy)]
pub struct IntegratorView<'a> {
    pub tcurr: f64,
    /// Step size the controller will try next.
    pub dt: f64,
    /// Size of the last accepted step, zero before the first one.
    pub last_dt: f64,
    pub nacptsteps: usize,
    /// Current solution, one array per element type.
    pub soln: &'a [EleArray],
    pub comm: &'a dyn Reductions,
}

pub trait Plugin {
    fn name(&self) -> &'static str;
    fn call(&mut self, intg: &IntegratorView<'_>) -> Result<(), SolverError>;
}
