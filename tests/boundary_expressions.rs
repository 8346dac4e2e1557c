use flux_stepper::algs::communicator::NoComm;
use flux_stepper::data::{ElementMap, ElementType, FaceRef, Inifile};
use flux_stepper::interfaces::InterfaceSet;
use flux_stepper::solver_error::{ErrorKind, SolverError};

fn setup() -> (ElementMap, Vec<FaceRef>) {
    let mut hex = ElementType::new("hex", 3, 5, 8, 2, vec![vec![0, 1, 2, 3]]).unwrap();
    for (r, x) in [0.0, 0.5, 1.0, 1.5].into_iter().enumerate() {
        hex.set_fpt_geometry(0, r, &[0.0, 0.0, -1.0], &[x, 2.0, 0.0]).unwrap();
    }
    let mut m = ElementMap::new();
    m.insert(hex);
    (m, vec![FaceRef::new("hex", 0, 0)])
}

#[test]
fn inflow_profile_over_the_face() {
    let (m, lhs) = setup();
    let mut cfg = Inifile::new();
    cfg.set("constants", "umax", 4.0);
    cfg.set("soln-bcs-inlet", "u", "umax*x*(2 - x)");
    cfg.set("soln-bcs-inlet", "v", "y*exp(-t)");
    cfg.set("soln-bcs-inlet", "p", "1/umax");

    let mut inters = InterfaceSet::<NoComm>::new();
    inters.add_bc(&m, &lhs, "soln-bcs-inlet").unwrap();
    let bc = &inters.bcs[0];
    assert_eq!(bc.nfpts(), 4);
    assert_eq!(bc.eval_opts(&cfg, &["p"], None).unwrap(), vec![0.25]);

    let mut ex = bc.exp_opts(&cfg, &m, &["u", "v"], None).unwrap();
    let ploc = ex.ploc().unwrap();
    assert_eq!((ploc.nrows(), ploc.ncols()), (3, 4));
    let vals = ex.values(0.0);
    assert_eq!(vals[0], vec![0.0, 3.0, 4.0, 3.0]);
    assert_eq!(vals[1], vec![2.0; 4]);
    assert_eq!(ex.values(0.0)[0], vals[0]);
}

#[test]
fn malformed_expressions_fail_at_construction() {
    let (m, lhs) = setup();
    let mut inters = InterfaceSet::<NoComm>::new();
    inters.add_bc(&m, &lhs, "soln-bcs-wall").unwrap();
    let bc = &inters.bcs[0];

    for src in ["2*(x + 1", "sqrt()", "q + 1", "x ^^ 2", "min(x)"] {
        let mut cfg = Inifile::new();
        cfg.set("soln-bcs-wall", "T", src);
        let err = bc.exp_opts(&cfg, &m, &["T"], None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Expression, "{src}");
        assert!(matches!(err, SolverError::Expression { ref option, .. } if option == "T"));
    }

    let err = bc.exp_opts(&Inifile::new(), &m, &["T"], None).unwrap_err();
    assert!(matches!(err, SolverError::MissingOption { .. }));
    let ex = bc.exp_opts(&Inifile::new(), &m, &["T"], Some("300")).unwrap();
    assert_eq!(ex.expr("T").and_then(|e| e.as_constant()), Some(300.0));
}
