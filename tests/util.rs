#![allow(dead_code)]
use std::sync::{Arc, Mutex};

use flux_stepper::{
    algs::communicator::ThreadComm,
    data::{EleArray, Inifile, RegisterBank},
    integrators::{SECT, System},
    plugins::{IntegratorView, Plugin},
    solver_error::SolverError,
};

/// Run `f` once per rank of an in-process universe of `n` ranks and
/// collect the results in rank order.
pub fn run_ranks<F, R>(n: usize, f: F) -> Vec<R>
where
    F: Fn(ThreadComm) -> R + Send + Sync + 'static,
    R: Send + 'static,
{
    let f = Arc::new(f);
    let handles: Vec<_> = ThreadComm::universe(n)
        .into_iter()
        .map(|comm| {
            let f = Arc::clone(&f);
            std::thread::spawn(move || f(comm))
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("rank thread panicked"))
        .collect()
}

/// `du/dt = rate * u` on every DOF, starting from `u = 1 + dof index`.
pub struct LinearSystem {
    pub shapes: Vec<(usize, usize, usize)>,
    pub rate: f64,
}

impl LinearSystem {
    pub fn new(rate: f64) -> Self {
        Self {
            shapes: vec![(2, 2, 3), (1, 2, 2)],
            rate,
        }
    }
}

impl System for LinearSystem {
    fn ele_types(&self) -> Vec<String> {
        vec!["quad".into(), "tri".into()]
    }

    fn ele_shapes(&self) -> Vec<(usize, usize, usize)> {
        self.shapes.clone()
    }

    fn convars(&self) -> Vec<String> {
        vec!["rho".into(), "E".into()]
    }

    fn initial_soln(&self, soln: &mut [EleArray]) -> Result<(), SolverError> {
        for a in soln {
            for (i, v) in a.as_mut_slice().iter_mut().enumerate() {
                *v = 1.0 + i as f64;
            }
        }
        Ok(())
    }

    fn rhs(&mut self, _t: f64, bank: &mut RegisterBank, uin: usize, fout: usize) -> Result<(), SolverError> {
        let (u, f) = bank.split_slots(uin, fout)?;
        for (ua, fa) in u.iter().zip(f.iter_mut()) {
            for (x, y) in ua.as_slice().iter().zip(fa.as_mut_slice()) {
                *y = self.rate * x;
            }
        }
        Ok(())
    }
}

pub fn config(tend: f64, dt: f64) -> Inifile {
    let mut cfg = Inifile::new();
    cfg.set(SECT, "tend", tend);
    cfg.set(SECT, "dt", dt);
    cfg
}

/// One record per plugin call.
#[derive(Clone, Debug, PartialEq)]
pub struct Seen {
    pub tcurr: f64,
    pub last_dt: f64,
    pub nacptsteps: usize,
    pub first: f64,
}

/// Plugin that logs every call into a shared list.
pub struct Recorder(pub Arc<Mutex<Vec<Seen>>>);

impl Plugin for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn call(&mut self, intg: &IntegratorView<'_>) -> Result<(), SolverError> {
        let first = intg.soln.first().map(|a| a.as_slice()[0]).unwrap_or(0.0);
        self.0.lock().unwrap().push(Seen {
            tcurr: intg.tcurr,
            last_dt: intg.last_dt,
            nacptsteps: intg.nacptsteps,
            first,
        });
        Ok(())
    }
}
