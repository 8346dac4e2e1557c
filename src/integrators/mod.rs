//! Time integration driver.
//!
//! [`Integrator`] owns the register bank and the spatial system, and moves
//! the solution from `tstart` through the checkpoint list `tlist`. How one
//! step is taken is the [`Stepper`]'s business; how steps are sized on the
//! way to a checkpoint is the [`Controller`]'s. Both are looked up by name
//! from `[solver-time-integrator] scheme` and `controller`.
//!
//! Slot bookkeeping: the slot holding the current solution is tracked as
//! `idxcurr`. Accepting a step moves `idxcurr` to the stepper's output
//! slot; rejecting one leaves it where it was, which restores the previous
//! solution without copying anything.

pub mod controllers;
pub mod steppers;

pub use controllers::{Controller, NoneController, PiController};
pub use steppers::{EulerStepper, Rk12Stepper, StepOutcome, Stepper, TvdRk3Stepper};

use itertools::Itertools;

use crate::algs::communicator::{Communicator, Reductions};
use crate::backend::KernelSet;
use crate::data::array::EleArray;
use crate::data::inifile::Inifile;
use crate::data::register_bank::RegisterBank;
use crate::debug_invariants::DebugInvariants;
use crate::plugins::{IntegratorView, Plugin};
use crate::solver_error::SolverError;

/// Configuration and stats section of the integrator.
pub const SECT: &str = "solver-time-integrator";

/// Spatial discretisation driven by the integrator.
pub trait System {
    /// Element type names, in storage order.
    fn ele_types(&self) -> Vec<String>;

    /// `(nupts, nvars, neles)` of each element type.
    fn ele_shapes(&self) -> Vec<(usize, usize, usize)>;

    /// Solution DOFs of each element type.
    fn ele_ndofs(&self) -> Vec<usize> {
        self.ele_shapes()
            .iter()
            .map(|&(nupts, nvars, neles)| nupts * nvars * neles)
            .collect()
    }

    /// Names of the conserved variables.
    fn convars(&self) -> Vec<String>;

    /// Fill the initial solution.
    fn initial_soln(&self, soln: &mut [EleArray]) -> Result<(), SolverError>;

    /// Evaluate the right-hand side of slot `uin` at time `t` into slot
    /// `fout`.
    fn rhs(&mut self, t: f64, bank: &mut RegisterBank, uin: usize, fout: usize) -> Result<(), SolverError>;
}

/// Register bank and system as seen by a stepper.
pub struct Registers {
    bank: RegisterBank,
    system: Box<dyn System>,
    idxcurr: usize,
}

impl Registers {
    /// Slot holding the current solution.
    pub fn idxcurr(&self) -> usize {
        self.idxcurr
    }

    /// All slots, the current solution first and the rest ascending.
    pub fn regidx(&self) -> Vec<usize> {
        let mut r = vec![self.idxcurr];
        r.extend((0..self.bank.nregs()).filter(|&s| s != self.idxcurr));
        r
    }

    pub fn bank(&self) -> &RegisterBank {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut RegisterBank {
        &mut self.bank
    }

    pub fn system(&self) -> &dyn System {
        self.system.as_ref()
    }

    pub fn rhs(&mut self, t: f64, uin: usize, fout: usize) -> Result<(), SolverError> {
        self.system.rhs(t, &mut self.bank, uin, fout)
    }

    pub fn prepare_reg_banks(&mut self, slots: &[usize]) -> Result<(), SolverError> {
        self.bank.prepare_reg_banks(slots)
    }

    pub fn soln(&self) -> &[EleArray] {
        self.bank.slot(self.idxcurr).unwrap_or_default()
    }
}

/// Time and counters of a run, plus the storage they describe.
pub struct IntegratorState {
    tstart: f64,
    tend: f64,
    tcurr: f64,
    tlist: Vec<f64>,
    dt: f64,
    last_dt: f64,
    nacptsteps: usize,
    nrjctsteps: usize,
    nsteps: usize,
    nfevals: usize,
    gndofs: u64,
    regs: Registers,
    errest: KernelSet,
    comm: Box<dyn Reductions>,
}

impl IntegratorState {
    fn view(&self) -> IntegratorView<'_> {
        IntegratorView {
            tcurr: self.tcurr,
            dt: self.dt,
            last_dt: self.last_dt,
            nacptsteps: self.nacptsteps,
            soln: self.regs.soln(),
            comm: self.comm.as_ref(),
        }
    }
}

/// What a [`Controller`] may do while advancing: take steps, judge them,
/// and accept or reject them.
pub struct StepDriver<'a> {
    state: &'a mut IntegratorState,
    stepper: &'a dyn Stepper,
    plugins: &'a mut Vec<Box<dyn Plugin>>,
}

impl StepDriver<'_> {
    pub fn tcurr(&self) -> f64 {
        self.state.tcurr
    }

    /// Step size to try next.
    pub fn dt(&self) -> f64 {
        self.state.dt
    }

    pub fn set_dt(&mut self, dt: f64) {
        self.state.dt = dt;
    }

    pub fn stepper_order(&self) -> u32 {
        self.stepper.order()
    }

    /// Take one step of size `dt` from `t` without committing it.
    pub fn step(&mut self, t: f64, dt: f64) -> Result<StepOutcome, SolverError> {
        let out = self.stepper.step(&mut self.state.regs, t, dt)?;
        self.state.nsteps += 1;
        self.state.nfevals += self.stepper.nfevals();
        self.state.regs.bank.debug_assert_invariants();
        Ok(out)
    }

    /// Global RMS of the scaled error estimate of `out`.
    pub fn errest(&mut self, out: &StepOutcome, atol: f64, rtol: f64) -> Result<f64, SolverError> {
        let err = out.err.ok_or_else(|| SolverError::IncompatibleStepper {
            stepper: self.stepper.name().to_owned(),
            controller: "error estimating".to_owned(),
        })?;
        let st = &mut *self.state;
        st.regs.prepare_reg_banks(&[err, out.prev, out.soln])?;
        let local = st.errest.run(&mut st.regs.bank, &[atol, rtol])?;
        let global = st.comm.sum_all(&[local])?;
        let total = global.first().copied().unwrap_or(0.0);
        Ok((total / st.gndofs.max(1) as f64).sqrt())
    }

    /// Commit `out`: time moves to `tnext` and the output slot becomes the
    /// solution. Observers are notified afterwards.
    pub fn accept_step(&mut self, dt: f64, tnext: f64, out: &StepOutcome) -> Result<(), SolverError> {
        let st = &mut *self.state;
        st.tcurr = tnext;
        st.last_dt = dt;
        st.regs.idxcurr = out.soln;
        st.nacptsteps += 1;
        log::debug!(
            "accepted step {} with dt = {dt:e}, t = {}",
            st.nacptsteps,
            st.tcurr
        );

        let view = self.state.view();
        for p in self.plugins.iter_mut() {
            p.call(&view)?;
        }
        Ok(())
    }

    /// Discard the last step; the solution slot is left untouched.
    pub fn reject_step(&mut self, dt: f64, err: f64) {
        self.state.nrjctsteps += 1;
        log::debug!(
            "rejected step with dt = {dt:e} at t = {} (error {err:.3})",
            self.state.tcurr
        );
    }
}

pub struct Integrator {
    state: IntegratorState,
    stepper: Box<dyn Stepper>,
    controller: Box<dyn Controller>,
    plugins: Vec<Box<dyn Plugin>>,
}

impl Integrator {
    /// Build an integrator with the scheme and controller named in the
    /// configuration (`euler` and `none` by default).
    ///
    /// `stats` is the persisted state of a previous run; when given, time
    /// and step size resume from it.
    pub fn new<C: Communicator + 'static>(
        cfg: &Inifile,
        system: Box<dyn System>,
        comm: C,
        stats: Option<&Inifile>,
    ) -> Result<Self, SolverError> {
        let netypes = system.ele_shapes().len();
        let stepper = steppers::stepper_by_name(cfg.get_or(SECT, "scheme", "euler"), cfg, netypes)?;
        let controller = controllers::controller_by_name(cfg.get_or(SECT, "controller", "none"), cfg)?;
        Self::with_strategies(cfg, system, comm, stats, stepper, controller)
    }

    /// Build an integrator around an explicit stepper and controller.
    pub fn with_strategies<C: Communicator + 'static>(
        cfg: &Inifile,
        system: Box<dyn System>,
        comm: C,
        stats: Option<&Inifile>,
        stepper: Box<dyn Stepper>,
        controller: Box<dyn Controller>,
    ) -> Result<Self, SolverError> {
        // Sanity checks
        if controller.needs_errest() && !stepper.has_errest() {
            return Err(SolverError::IncompatibleStepper {
                stepper: stepper.name().to_owned(),
                controller: controller.name().to_owned(),
            });
        }

        let tstart = cfg.getfloat_or(SECT, "tstart", 0.0)?;
        let tend = cfg.getfloat(SECT, "tend")?;
        let dt = cfg.getfloat(SECT, "dt")?;

        // Current time; defaults to tstart unless resuming a simulation
        let (tcurr, dt) = match stats {
            Some(s) => (s.getfloat(SECT, "tcurr")?, s.getfloat_or(SECT, "dt", dt)?),
            None => (tstart, dt),
        };
        if !(dt > 0.0) {
            return Err(SolverError::InvalidOption {
                section: SECT.to_owned(),
                key: "dt".to_owned(),
                value: dt.to_string(),
                reason: "must be positive".to_owned(),
            });
        }

        let shapes = system.ele_shapes();
        let mut bank = RegisterBank::new(stepper.nregs(), &shapes);
        system.initial_soln(bank.slot_mut(0)?)?;
        let errest = KernelSet::new("errest", 3, shapes.len())?;

        // Sum to get the global number of DOFs over all partitions
        let ndofs: usize = system.ele_ndofs().iter().sum();
        let gndofs = comm.allreduce_sum_u64(ndofs as u64)?;

        if comm.rank() == 0 {
            log::info!(
                "integrator: scheme {}, controller {}, {} global DOFs, t = {tcurr} -> {tend}",
                stepper.name(),
                controller.name(),
                gndofs
            );
        }
        let mut intg = Self {
            state: IntegratorState {
                tstart,
                tend,
                tcurr,
                tlist: Vec::new(),
                dt,
                last_dt: 0.0,
                nacptsteps: 0,
                nrjctsteps: 0,
                nsteps: 0,
                nfevals: 0,
                gndofs,
                regs: Registers {
                    bank,
                    system,
                    idxcurr: 0,
                },
                errest,
                comm: Box::new(comm),
            },
            stepper,
            controller,
            plugins: Vec::new(),
        };
        intg.set_tlist(vec![tcurr, tend])?;
        Ok(intg)
    }

    pub fn tstart(&self) -> f64 {
        self.state.tstart
    }
    pub fn tend(&self) -> f64 {
        self.state.tend
    }
    pub fn tcurr(&self) -> f64 {
        self.state.tcurr
    }
    pub fn dt(&self) -> f64 {
        self.state.dt
    }
    /// Size of the last accepted step.
    pub fn last_dt(&self) -> f64 {
        self.state.last_dt
    }
    pub fn tlist(&self) -> &[f64] {
        &self.state.tlist
    }
    pub fn nacptsteps(&self) -> usize {
        self.state.nacptsteps
    }
    pub fn nrjctsteps(&self) -> usize {
        self.state.nrjctsteps
    }
    /// Stepper invocations, accepted or not.
    pub fn nsteps(&self) -> usize {
        self.state.nsteps
    }
    pub fn nfevals(&self) -> usize {
        self.state.nfevals
    }
    pub fn gndofs(&self) -> u64 {
        self.state.gndofs
    }
    pub fn idxcurr(&self) -> usize {
        self.state.regs.idxcurr
    }
    pub fn soln(&self) -> &[EleArray] {
        self.state.regs.soln()
    }
    pub fn bank(&self) -> &RegisterBank {
        &self.state.regs.bank
    }
    pub fn system(&self) -> &dyn System {
        self.state.regs.system()
    }
    pub fn comm(&self) -> &dyn Reductions {
        self.state.comm.as_ref()
    }
    pub fn stepper(&self) -> &dyn Stepper {
        self.stepper.as_ref()
    }
    pub fn controller(&self) -> &dyn Controller {
        self.controller.as_ref()
    }
    pub fn stepper_has_errest(&self) -> bool {
        self.stepper.has_errest()
    }
    pub fn controller_needs_errest(&self) -> bool {
        self.controller.needs_errest()
    }

    /// Replace the checkpoint list. Times before `tcurr` are dropped.
    pub fn set_tlist(&mut self, times: Vec<f64>) -> Result<(), SolverError> {
        if let Some((prev, next)) = times.iter().tuple_windows().find(|(a, b)| b < a) {
            return Err(SolverError::UnorderedTimes {
                prev: *prev,
                next: *next,
            });
        }
        let tcurr = self.state.tcurr;
        self.state.tlist = times.into_iter().filter(|&t| t >= tcurr).collect();
        Ok(())
    }

    pub fn add_plugin(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// One kernel per element type over register roles `0..nargs`.
    pub fn kernel(&self, name: &str, nargs: usize) -> Result<KernelSet, SolverError> {
        KernelSet::new(name, nargs, self.state.regs.bank.netypes())
    }

    /// Bind register roles to slots; see [`RegisterBank::prepare_reg_banks`].
    pub fn prepare_reg_banks(&mut self, slots: &[usize]) -> Result<(), SolverError> {
        self.state.regs.prepare_reg_banks(slots)
    }

    /// Take one step from `t` and commit it unconditionally.
    pub fn step(&mut self, t: f64, dt: f64) -> Result<StepOutcome, SolverError> {
        let mut drv = self.driver();
        let out = drv.step(t, dt)?;
        drv.accept_step(dt, t + dt, &out)?;
        Ok(out)
    }

    /// Advance to `t` under the controller.
    pub fn advance_to(&mut self, t: f64) -> Result<(), SolverError> {
        let mut drv = StepDriver {
            state: &mut self.state,
            stepper: self.stepper.as_ref(),
            plugins: &mut self.plugins,
        };
        self.controller.advance_to(&mut drv, t)
    }

    fn driver(&mut self) -> StepDriver<'_> {
        StepDriver {
            state: &mut self.state,
            stepper: self.stepper.as_ref(),
            plugins: &mut self.plugins,
        }
    }

    /// Notify observers once, then advance through every checkpoint.
    pub fn run(&mut self) -> Result<(), SolverError> {
        let view = self.state.view();
        for p in self.plugins.iter_mut() {
            p.call(&view)?;
        }

        let tlist = self.state.tlist.clone();
        for t in tlist {
            self.advance_to(t)?;
            if self.state.comm.world_rank() == 0 {
                log::info!(
                    "reached t = {t} after {} steps ({} rejected)",
                    self.state.nacptsteps,
                    self.state.nrjctsteps
                );
            }
        }
        Ok(())
    }

    /// Record the state needed to resume this run.
    pub fn collect_stats(&self, stats: &mut Inifile) {
        let st = &self.state;
        stats.set(SECT, "tcurr", st.tcurr);
        stats.set(SECT, "dt", st.dt);
        stats.set(SECT, "nacptsteps", st.nacptsteps);
        stats.set(SECT, "nrjctsteps", st.nrjctsteps);
        stats.set(SECT, "nfevals", st.nfevals);
    }
}
