//! Explicit steppers.
//!
//! A stepper advances the solution held in the current slot by one step
//! and reports which slot now holds the new solution. It never copies a
//! register; slots are rebound to kernel roles with
//! [`Registers::prepare_reg_banks`].

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::backend::KernelSet;
use crate::data::inifile::Inifile;
use crate::integrators::Registers;
use crate::solver_error::SolverError;

/// Slots produced by one step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepOutcome {
    /// Slot holding the new solution.
    pub soln: usize,
    /// Slot still holding the solution the step started from.
    pub prev: usize,
    /// Slot holding the embedded error estimate, if the scheme has one.
    pub err: Option<usize>,
}

pub trait Stepper {
    fn name(&self) -> &'static str;
    fn order(&self) -> u32;
    /// Registers the scheme needs, including the solution.
    fn nregs(&self) -> usize;
    /// Right-hand-side evaluations per step.
    fn nfevals(&self) -> usize;
    fn has_errest(&self) -> bool {
        false
    }
    fn step(&self, regs: &mut Registers, t: f64, dt: f64) -> Result<StepOutcome, SolverError>;
}

/// Forward Euler.
pub struct EulerStepper {
    add: KernelSet,
}

impl EulerStepper {
    pub fn new(netypes: usize) -> Result<Self, SolverError> {
        Ok(Self {
            add: KernelSet::new("axnpby", 2, netypes)?,
        })
    }
}

impl Stepper for EulerStepper {
    fn name(&self) -> &'static str {
        "euler"
    }
    fn order(&self) -> u32 {
        1
    }
    fn nregs(&self) -> usize {
        2
    }
    fn nfevals(&self) -> usize {
        1
    }

    fn step(&self, regs: &mut Registers, t: f64, dt: f64) -> Result<StepOutcome, SolverError> {
        let r = regs.regidx();
        let (r0, r1) = (r[0], r[1]);

        regs.rhs(t, r0, r1)?;
        regs.prepare_reg_banks(&[r1, r0])?;
        self.add.run(regs.bank_mut(), &[dt, 1.0])?;

        Ok(StepOutcome {
            soln: r1,
            prev: r0,
            err: None,
        })
    }
}

/// Three-stage strong-stability-preserving Runge-Kutta scheme of Shu and
/// Osher.
pub struct TvdRk3Stepper {
    add: KernelSet,
}

impl TvdRk3Stepper {
    pub fn new(netypes: usize) -> Result<Self, SolverError> {
        Ok(Self {
            add: KernelSet::new("axnpby", 3, netypes)?,
        })
    }
}

impl Stepper for TvdRk3Stepper {
    fn name(&self) -> &'static str {
        "tvd-rk3"
    }
    fn order(&self) -> u32 {
        3
    }
    fn nregs(&self) -> usize {
        3
    }
    fn nfevals(&self) -> usize {
        3
    }

    fn step(&self, regs: &mut Registers, t: f64, dt: f64) -> Result<StepOutcome, SolverError> {
        let r = regs.regidx();
        let (r0, r1, r2) = (r[0], r[1], r[2]);

        // r1 = r0 + dt*f(r0)
        regs.rhs(t, r0, r2)?;
        regs.prepare_reg_banks(&[r1, r0, r2])?;
        self.add.run(regs.bank_mut(), &[0.0, 1.0, dt])?;

        // r1 = 3/4*r0 + 1/4*r1 + 1/4*dt*f(r1)
        regs.rhs(t + dt, r1, r2)?;
        self.add.run(regs.bank_mut(), &[0.25, 0.75, 0.25 * dt])?;

        // r1 = 1/3*r0 + 2/3*r1 + 2/3*dt*f(r1)
        regs.rhs(t + 0.5 * dt, r1, r2)?;
        self.add
            .run(regs.bank_mut(), &[2.0 / 3.0, 1.0 / 3.0, 2.0 / 3.0 * dt])?;

        Ok(StepOutcome {
            soln: r1,
            prev: r0,
            err: None,
        })
    }
}

/// Heun-Euler embedded pair; advances with the second-order solution and
/// estimates the error against the first-order one.
pub struct Rk12Stepper {
    add2: KernelSet,
    add3: KernelSet,
}

impl Rk12Stepper {
    pub fn new(netypes: usize) -> Result<Self, SolverError> {
        Ok(Self {
            add2: KernelSet::new("axnpby", 2, netypes)?,
            add3: KernelSet::new("axnpby", 3, netypes)?,
        })
    }
}

impl Stepper for Rk12Stepper {
    fn name(&self) -> &'static str {
        "rk12"
    }
    fn order(&self) -> u32 {
        2
    }
    fn nregs(&self) -> usize {
        4
    }
    fn nfevals(&self) -> usize {
        2
    }
    fn has_errest(&self) -> bool {
        true
    }

    fn step(&self, regs: &mut Registers, t: f64, dt: f64) -> Result<StepOutcome, SolverError> {
        let r = regs.regidx();
        let (r0, r1, r2, r3) = (r[0], r[1], r[2], r[3]);

        // k1 in r1, Euler predictor in r2
        regs.rhs(t, r0, r1)?;
        regs.prepare_reg_banks(&[r2, r0, r1])?;
        self.add3.run(regs.bank_mut(), &[0.0, 1.0, dt])?;

        // k2 in r3, then r3 = dt/2*(k2 - k1) is the error estimate
        regs.rhs(t + dt, r2, r3)?;
        regs.prepare_reg_banks(&[r3, r1])?;
        self.add2.run(regs.bank_mut(), &[0.5 * dt, -0.5 * dt])?;

        // second-order solution
        regs.prepare_reg_banks(&[r2, r3])?;
        self.add2.run(regs.bank_mut(), &[1.0, 1.0])?;

        Ok(StepOutcome {
            soln: r2,
            prev: r0,
            err: Some(r3),
        })
    }
}

type Ctor = fn(&Inifile, usize) -> Result<Box<dyn Stepper>, SolverError>;

fn euler(_cfg: &Inifile, netypes: usize) -> Result<Box<dyn Stepper>, SolverError> {
    Ok(Box::new(EulerStepper::new(netypes)?))
}

fn tvd_rk3(_cfg: &Inifile, netypes: usize) -> Result<Box<dyn Stepper>, SolverError> {
    Ok(Box::new(TvdRk3Stepper::new(netypes)?))
}

fn rk12(_cfg: &Inifile, netypes: usize) -> Result<Box<dyn Stepper>, SolverError> {
    Ok(Box::new(Rk12Stepper::new(netypes)?))
}

static REGISTRY: Lazy<BTreeMap<&'static str, Ctor>> = Lazy::new(|| {
    let mut m: BTreeMap<&'static str, Ctor> = BTreeMap::new();
    m.insert("euler", euler);
    m.insert("tvd-rk3", tvd_rk3);
    m.insert("rk12", rk12);
    m
});

pub fn stepper_names() -> impl Iterator<Item = &'static str> {
    REGISTRY.keys().copied()
}

/// Construct the stepper registered under `name` for `netypes` element
/// types.
pub fn stepper_by_name(name: &str, cfg: &Inifile, netypes: usize) -> Result<Box<dyn Stepper>, SolverError> {
    let ctor = REGISTRY.get(name).ok_or_else(|| SolverError::UnknownStrategy {
        what: "time integration scheme",
        name: name.to_owned(),
    })?;
    ctor(cfg, netypes)
}
