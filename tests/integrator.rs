mod util;

use std::sync::{Arc, Mutex};

use flux_stepper::algs::NoComm;
use flux_stepper::data::Inifile;
use flux_stepper::integrators::{Integrator, SECT};
use flux_stepper::solver_error::{ErrorKind, SolverError};
use util::{LinearSystem, Recorder, config, run_ranks};

fn integrator(cfg: &Inifile, rate: f64) -> Integrator {
    Integrator::new(cfg, Box::new(LinearSystem::new(rate)), NoComm, None).unwrap()
}

#[test]
fn run_lands_exactly_on_tend() {
    let cfg = config(1.0, 0.3);
    let mut intg = integrator(&cfg, 0.0);
    let seen = Arc::new(Mutex::new(Vec::new()));
    intg.add_plugin(Box::new(Recorder(Arc::clone(&seen))));
    assert_eq!(intg.tlist(), &[0.0, 1.0]);

    intg.run().unwrap();

    assert_eq!(intg.tcurr(), 1.0);
    assert_eq!(intg.nacptsteps(), 4);
    assert_eq!(intg.nsteps(), 4);
    let seen = seen.lock().unwrap();
    // one call before the run, then one per accepted step
    assert_eq!(seen.len(), 5);
    assert_eq!(seen[0].nacptsteps, 0);
    let total: f64 = seen.iter().skip(1).map(|s| s.last_dt).sum();
    assert_eq!(total, 1.0);
    assert_eq!(seen.last().unwrap().tcurr, 1.0);
    // the controller keeps its own step size
    assert_eq!(intg.dt(), 0.3);
}

#[test]
fn euler_matches_the_closed_form() {
    // u' = -u with dt = 1/4 gives u_n = u_0 (3/4)^n exactly
    let cfg = config(1.0, 0.25);
    let mut intg = integrator(&cfg, -1.0);
    intg.run().unwrap();
    let factor = 0.75f64.powi(4);
    for a in intg.soln() {
        for (i, &v) in a.as_slice().iter().enumerate() {
            assert_eq!(v, (1.0 + i as f64) * factor);
        }
    }
    assert_eq!(intg.nfevals(), 4);
}

#[test]
fn solution_slot_moves_without_copies() {
    let cfg = config(1.0, 0.5);
    let mut intg = integrator(&cfg, 0.0);
    let before: Vec<_> = intg.soln().to_vec();
    assert_eq!(intg.idxcurr(), 0);

    intg.step(0.0, 0.5).unwrap();
    assert_eq!(intg.idxcurr(), 1);
    assert_eq!(intg.soln(), before.as_slice());

    // rebinding roles never touches stored values
    let snapshot: Vec<_> = (0..intg.bank().nregs())
        .map(|s| intg.bank().slot(s).unwrap().to_vec())
        .collect();
    intg.prepare_reg_banks(&[1, 0]).unwrap();
    intg.prepare_reg_banks(&[0]).unwrap();
    assert!(intg.prepare_reg_banks(&[1, 1]).is_err());
    for (s, data) in snapshot.iter().enumerate() {
        assert_eq!(intg.bank().slot(s).unwrap(), data.as_slice());
    }
    assert_eq!(intg.soln(), before.as_slice());
}

#[test]
fn tvd_rk3_is_third_order_accurate() {
    let exact = (-1.0f64).exp();
    let err = |dt: f64| {
        let mut cfg = config(1.0, dt);
        cfg.set(SECT, "scheme", "tvd-rk3");
        let mut intg = integrator(&cfg, -1.0);
        intg.run().unwrap();
        (intg.soln()[0].as_slice()[0] - exact).abs()
    };
    let ratio = err(0.1) / err(0.05);
    assert!(ratio > 7.0 && ratio < 9.0, "ratio {ratio}");
}

#[test]
fn pi_controller_adapts_and_hits_targets() {
    let mut cfg = config(2.0, 0.01);
    cfg.set(SECT, "scheme", "rk12");
    cfg.set(SECT, "controller", "pi");
    cfg.set(SECT, "atol", 1e-6);
    cfg.set(SECT, "rtol", 1e-6);
    let mut intg = integrator(&cfg, -1.0);
    intg.set_tlist(vec![0.0, 0.5, 2.0]).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    intg.add_plugin(Box::new(Recorder(Arc::clone(&seen))));

    intg.run().unwrap();

    assert_eq!(intg.tcurr(), 2.0);
    assert!(seen.lock().unwrap().iter().any(|s| s.tcurr == 0.5));
    assert!(intg.dt() != 0.01);
    assert_eq!(intg.nsteps(), intg.nacptsteps() + intg.nrjctsteps());
    let exact = (-2.0f64).exp();
    assert!((intg.soln()[0].as_slice()[0] - exact).abs() < 1e-3);
}

#[test]
fn pi_checkpoint_closer_than_dt_min_is_not_overshot() {
    let mut cfg = config(1.0, 0.01);
    cfg.set(SECT, "scheme", "rk12");
    cfg.set(SECT, "controller", "pi");
    cfg.set(SECT, "dt-min", 1e-12);
    let mut intg = integrator(&cfg, -1.0);
    intg.set_tlist(vec![0.0, 1e-13]).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    intg.add_plugin(Box::new(Recorder(Arc::clone(&seen))));

    intg.run().unwrap();

    assert_eq!(intg.tcurr(), 1e-13);
    assert_eq!(intg.nacptsteps(), 1);
    let total: f64 = seen.lock().unwrap().iter().skip(1).map(|s| s.last_dt).sum();
    assert_eq!(total, 1e-13);
}

#[test]
fn pi_rejects_oversized_steps() {
    let mut cfg = config(1.0, 0.9);
    cfg.set(SECT, "scheme", "rk12");
    cfg.set(SECT, "controller", "pi");
    cfg.set(SECT, "atol", 1e-8);
    cfg.set(SECT, "rtol", 1e-8);
    let mut intg = integrator(&cfg, -5.0);
    intg.run().unwrap();
    assert!(intg.nrjctsteps() > 0);
    assert_eq!(intg.tcurr(), 1.0);
}

#[test]
fn euler_cannot_drive_an_adaptive_controller() {
    let mut cfg = config(1.0, 0.1);
    cfg.set(SECT, "controller", "pi");
    cfg.set(SECT, "atol", 1e-6);
    cfg.set(SECT, "rtol", 1e-6);
    let err = Integrator::new(&cfg, Box::new(LinearSystem::new(-1.0)), NoComm, None)
        .err()
        .unwrap();
    assert!(matches!(err, SolverError::IncompatibleStepper { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn configuration_errors() {
    let mut cfg = Inifile::new();
    cfg.set(SECT, "dt", 0.1);
    let err = Integrator::new(&cfg, Box::new(LinearSystem::new(0.0)), NoComm, None)
        .err()
        .unwrap();
    assert!(matches!(err, SolverError::MissingOption { .. }));

    let mut cfg = config(1.0, 0.1);
    cfg.set(SECT, "scheme", "rk45");
    let err = Integrator::new(&cfg, Box::new(LinearSystem::new(0.0)), NoComm, None)
        .err()
        .unwrap();
    assert!(err.to_string().contains("rk45"));

    let mut intg = integrator(&config(1.0, 0.1), 0.0);
    assert!(matches!(
        intg.set_tlist(vec![0.0, 0.5, 0.2]),
        Err(SolverError::UnorderedTimes { .. })
    ));
    intg.advance_to(0.5).unwrap();
    assert!(matches!(intg.advance_to(0.2), Err(SolverError::UnorderedTimes { .. })));
}

#[test]
fn stats_resume_a_run() {
    let cfg = config(1.0, 0.25);
    let mut first = integrator(&cfg, -1.0);
    first.advance_to(0.5).unwrap();
    let mut stats = Inifile::new();
    first.collect_stats(&mut stats);
    let text = stats.to_string();

    let stats: Inifile = text.parse().unwrap();
    let resumed = Integrator::new(&cfg, Box::new(LinearSystem::new(-1.0)), NoComm, Some(&stats)).unwrap();
    assert_eq!(resumed.tcurr(), 0.5);
    assert_eq!(resumed.dt(), 0.25);
    assert_eq!(resumed.tlist(), &[0.5, 1.0]);
    assert_eq!(stats.getint(SECT, "nacptsteps").unwrap(), 2);
}

#[test]
fn global_dofs_sum_over_ranks() {
    let gndofs = run_ranks(3, |comm| {
        let cfg = config(1.0, 0.1);
        Integrator::new(&cfg, Box::new(LinearSystem::new(0.0)), comm, None)
            .unwrap()
            .gndofs()
    });
    // (2*2*3 + 1*2*2) DOFs per rank
    assert_eq!(gndofs, vec![48, 48, 48]);
}
