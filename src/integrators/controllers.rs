//! Step size controllers.
//!
//! A controller decides the size of each step on the way to a target time
//! and whether to keep its result. The last step towards a target always
//! lands exactly on it.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::data::inifile::Inifile;
use crate::integrators::{SECT, StepDriver};
use crate::solver_error::SolverError;

pub trait Controller {
    fn name(&self) -> &'static str;

    /// Whether the controller consumes the stepper's error estimate.
    fn needs_errest(&self) -> bool {
        false
    }

    /// Step from the current time to `t`.
    fn advance_to(&mut self, drv: &mut StepDriver<'_>, t: f64) -> Result<(), SolverError>;
}

fn check_target(drv: &StepDriver<'_>, t: f64) -> Result<(), SolverError> {
    if t < drv.tcurr() {
        Err(SolverError::UnorderedTimes {
            prev: drv.tcurr(),
            next: t,
        })
    } else {
        Ok(())
    }
}

/// Fixed step size; only the final step towards a target is shortened.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoneController;

impl Controller for NoneController {
    fn name(&self) -> &'static str {
        "none"
    }

    fn advance_to(&mut self, drv: &mut StepDriver<'_>, t: f64) -> Result<(), SolverError> {
        check_target(drv, t)?;
        while drv.tcurr() < t {
            let tcurr = drv.tcurr();
            let rem = t - tcurr;
            let last = drv.dt() >= rem;
            let dt = if last { rem } else { drv.dt() };

            let out = drv.step(tcurr, dt)?;
            drv.accept_step(dt, if last { t } else { tcurr + dt }, &out)?;
        }
        Ok(())
    }
}

/// Proportional-integral error controller.
#[derive(Clone, Debug)]
pub struct PiController {
    atol: f64,
    rtol: f64,
    safety: f64,
    minfac: f64,
    maxfac: f64,
    dtmin: f64,
    errprev: f64,
}

impl PiController {
    pub fn new(cfg: &Inifile) -> Result<Self, SolverError> {
        let ctrl = Self {
            atol: cfg.getfloat(SECT, "atol")?,
            rtol: cfg.getfloat(SECT, "rtol")?,
            safety: cfg.getfloat_or(SECT, "safety-fact", 0.8)?,
            minfac: cfg.getfloat_or(SECT, "min-fact", 0.3)?,
            maxfac: cfg.getfloat_or(SECT, "max-fact", 2.5)?,
            dtmin: cfg.getfloat_or(SECT, "dt-min", 1e-12)?,
            errprev: 1.0,
        };
        if ctrl.atol <= 0.0 && ctrl.rtol <= 0.0 {
            return Err(SolverError::InvalidOption {
                section: SECT.to_owned(),
                key: "atol".to_owned(),
                value: ctrl.atol.to_string(),
                reason: "atol and rtol cannot both be zero".to_owned(),
            });
        }
        if !(ctrl.minfac < 1.0 && 1.0 < ctrl.maxfac) {
            return Err(SolverError::InvalidOption {
                section: SECT.to_owned(),
                key: "min-fact".to_owned(),
                value: ctrl.minfac.to_string(),
                reason: "need min-fact < 1 < max-fact".to_owned(),
            });
        }
        Ok(ctrl)
    }
}

impl Controller for PiController {
    fn name(&self) -> &'static str {
        "pi"
    }

    fn needs_errest(&self) -> bool {
        true
    }

    fn advance_to(&mut self, drv: &mut StepDriver<'_>, t: f64) -> Result<(), SolverError> {
        check_target(drv, t)?;

        let order = f64::from(drv.stepper_order());
        let (alpha, beta) = (0.7 / order, 0.4 / order);

        while drv.tcurr() < t {
            let tcurr = drv.tcurr();
            let rem = t - tcurr;
            // dt-min never pushes the final sub-step past t
            let dt_try = drv.dt().max(self.dtmin);
            let last = rem <= dt_try;
            let dt = if last { rem } else { dt_try };

            let out = drv.step(tcurr, dt)?;
            let err = drv.errest(&out, self.atol, self.rtol)?;

            // a vanishing error estimate would make the factor infinite
            let fac = err.max(1e-10).powf(-alpha) * self.errprev.powf(beta);
            let fac = (self.safety * fac).max(self.minfac).min(self.maxfac);
            drv.set_dt(fac * dt);

            if err < 1.0 {
                self.errprev = err.max(1e-10);
                drv.accept_step(dt, if last { t } else { tcurr + dt }, &out)?;
            } else {
                if dt <= self.dtmin {
                    return Err(SolverError::MinimumStepRejected { dt, tcurr });
                }
                drv.reject_step(dt, err);
            }
        }
        Ok(())
    }
}

type Ctor = fn(&Inifile) -> Result<Box<dyn Controller>, SolverError>;

fn none(_cfg: &Inifile) -> Result<Box<dyn Controller>, SolverError> {
    Ok(Box::new(NoneController))
}

fn pi(cfg: &Inifile) -> Result<Box<dyn Controller>, SolverError> {
    Ok(Box::new(PiController::new(cfg)?))
}

static REGISTRY: Lazy<BTreeMap<&'static str, Ctor>> = Lazy::new(|| {
    let mut m: BTreeMap<&'static str, Ctor> = BTreeMap::new();
    m.insert("none", none);
    m.insert("pi", pi);
    m
});

pub fn controller_names() -> impl Iterator<Item = &'static str> {
    REGISTRY.keys().copied()
}

pub fn controller_by_name(name: &str, cfg: &Inifile) -> Result<Box<dyn Controller>, SolverError> {
    let ctor = REGISTRY.get(name).ok_or_else(|| SolverError::UnknownStrategy {
        what: "step size controller",
        name: name.to_owned(),
    })?;
    ctor(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pi_reads_options() {
        let mut cfg = Inifile::new();
        assert!(matches!(
            controller_by_name("pi", &cfg),
            Err(SolverError::MissingOption { .. })
        ));
        cfg.set(SECT, "atol", 1e-6);
        cfg.set(SECT, "rtol", 1e-6);
        let c = controller_by_name("pi", &cfg).unwrap();
        assert!(c.needs_errest());
        assert!(!controller_by_name("none", &cfg).unwrap().needs_errest());
        cfg.set(SECT, "max-fact", 0.9);
        assert!(controller_by_name("pi", &cfg).is_err());
        assert!(controller_by_name("pid", &cfg).is_err());
        assert_eq!(controller_names().collect::<Vec<_>>(), vec!["none", "pi"]);
    }
}
