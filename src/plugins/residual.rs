//! Residual history written as CSV.
//!
//! Every `nsteps` accepted steps one row `t,<var>...` is appended, holding
//! for each conserved variable the L2 norm of the change over the last
//! step divided by that step's length. The solution is snapshotted on the
//! step before each output, so a row costs one copy of the solution.

use std::fs::{File, OpenOptions};
use std::io::Write;

use itertools::Itertools;

use crate::data::array::EleArray;
use crate::data::inifile::Inifile;
use crate::integrators::Integrator;
use crate::partitioning::ROOT;
use crate::plugins::{IntegratorView, Plugin};
use crate::solver_error::SolverError;

pub const SECT: &str = "soln-plugin-residual";

pub struct ResidualPlugin {
    nsteps: usize,
    path: String,
    outf: Option<File>,
    prev: Option<(f64, Vec<EleArray>)>,
}

fn io_err(path: &str, e: std::io::Error) -> SolverError {
    SolverError::Io {
        path: path.to_owned(),
        reason: e.to_string(),
    }
}

impl ResidualPlugin {
    pub fn new(cfg: &Inifile, intg: &Integrator) -> Result<Self, SolverError> {
        let nsteps = cfg.getint(SECT, "nsteps")?;
        if nsteps < 1 {
            return Err(SolverError::InvalidOption {
                section: SECT.to_owned(),
                key: "nsteps".to_owned(),
                value: nsteps.to_string(),
                reason: "must be at least 1".to_owned(),
            });
        }

        let mut path = cfg.get(SECT, "file")?.to_owned();
        if !path.ends_with(".csv") {
            path.push_str(".csv");
        }

        // Only the root writes
        let outf = if intg.comm().world_rank() == ROOT {
            let mut f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| io_err(&path, e))?;
            let empty = f.metadata().map_err(|e| io_err(&path, e))?.len() == 0;
            if empty && cfg.getbool_or(SECT, "header", true)? {
                let header = std::iter::once("t".to_owned())
                    .chain(intg.system().convars())
                    .join(",");
                writeln!(f, "{header}").map_err(|e| io_err(&path, e))?;
            }
            Some(f)
        } else {
            None
        };

        Ok(Self {
            nsteps: nsteps as usize,
            path,
            outf,
            prev: None,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn write_row(&mut self, intg: &IntegratorView<'_>, tprev: f64, prev: &[EleArray]) -> Result<(), SolverError> {
        let nvars = intg.soln.iter().map(EleArray::nvars).max().unwrap_or(0);
        let mut resid = vec![0.0; nvars];
        for (p, c) in prev.iter().zip(intg.soln) {
            let (nrows, nv, neles) = c.shape();
            for r in 0..nrows {
                for v in 0..nv {
                    for e in 0..neles {
                        let d = p.get(r, v, e) - c.get(r, v, e);
                        resid[v] += d * d;
                    }
                }
            }
        }

        let Some(total) = intg.comm.sum_to_root(ROOT, &resid)? else {
            return Ok(());
        };
        let Some(f) = self.outf.as_mut() else {
            return Ok(());
        };

        let dt = intg.tcurr - tprev;
        let row = std::iter::once(intg.tcurr)
            .chain(total.iter().map(|r| r.sqrt() / dt))
            .join(",");
        writeln!(f, "{row}").map_err(|e| io_err(&self.path, e))?;
        f.flush().map_err(|e| io_err(&self.path, e))
    }
}

impl Plugin for ResidualPlugin {
    fn name(&self) -> &'static str {
        "residual"
    }

    fn call(&mut self, intg: &IntegratorView<'_>) -> Result<(), SolverError> {
        // An output is due this step
        if intg.nacptsteps % self.nsteps == 0 {
            if let Some((tprev, prev)) = self.prev.take() {
                self.write_row(intg, tprev, &prev)?;
            }
        }
        // An output is due next step
        if (intg.nacptsteps + 1) % self.nsteps == 0 {
            self.prev = Some((intg.tcurr, intg.soln.to_vec()));
        }
        Ok(())
    }
}
