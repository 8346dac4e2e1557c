//! Faces on a physical boundary.
//!
//! Only the interior side exists; the exterior state is prescribed by
//! options in the boundary's configuration section. Options are parsed into
//! expression trees when the interface is built, so a malformed or unknown
//! name is reported before the first step.

use crate::data::elements::{ElementMap, FaceRef};
use crate::data::inifile::Inifile;
use crate::data::view::{ConstMatrix, View};
use crate::expr::Expr;
use crate::interfaces::base::{ConstKind, const_mat, get_opt_view_perm, scal_view};
use crate::solver_error::SolverError;

#[derive(Clone, Debug)]
pub struct BcInters {
    cfgsect: String,
    lhs: Vec<FaceRef>,
    perm: Vec<usize>,
    pub scal_lhs: View,
    pub mag_pnorm_lhs: ConstMatrix,
    pub norm_pnorm_lhs: ConstMatrix,
}

impl BcInters {
    pub fn new(elemap: &ElementMap, lhs: &[FaceRef], cfgsect: &str) -> Result<Self, SolverError> {
        let perm = get_opt_view_perm(lhs, elemap)?;
        Ok(Self {
            cfgsect: cfgsect.to_owned(),
            lhs: lhs.to_vec(),
            scal_lhs: scal_view(elemap, lhs, &perm)?,
            mag_pnorm_lhs: const_mat(elemap, lhs, &perm, ConstKind::MagPnorm)?,
            norm_pnorm_lhs: const_mat(elemap, lhs, &perm, ConstKind::NormPnorm)?,
            perm,
        })
    }

    pub fn cfgsect(&self) -> &str {
        &self.cfgsect
    }

    pub fn perm(&self) -> &[usize] {
        &self.perm
    }

    pub fn nfpts(&self) -> usize {
        self.scal_lhs.len()
    }

    /// Evaluate options that must be plain numbers (after constant
    /// substitution). Missing options take `default` when given.
    pub fn eval_opts(
        &self,
        cfg: &Inifile,
        opts: &[&str],
        default: Option<&str>,
    ) -> Result<Vec<f64>, SolverError> {
        let constants = cfg.items_as_f64("constants")?;
        opts.iter()
            .map(|&k| {
                let src = cfg.getexpr(&self.cfgsect, k, default)?;
                let ex = Expr::parse(k, &src, &constants)?;
                ex.as_constant().ok_or_else(|| SolverError::Expression {
                    option: k.to_owned(),
                    reason: "must not depend on position or time".to_owned(),
                })
            })
            .collect()
    }

    /// Parse options that may depend on position and time.
    ///
    /// The physical location of each flux point is attached only if some
    /// expression references `x`, `y` or `z`.
    pub fn exp_opts(
        &self,
        cfg: &Inifile,
        elemap: &ElementMap,
        opts: &[&str],
        default: Option<&str>,
    ) -> Result<BcExprs, SolverError> {
        let constants = cfg.items_as_f64("constants")?;
        let exprs = opts
            .iter()
            .map(|&k| {
                let src = cfg.getexpr(&self.cfgsect, k, default)?;
                Ok((k.to_owned(), Expr::parse(k, &src, &constants)?))
            })
            .collect::<Result<Vec<_>, SolverError>>()?;

        let ploc = if exprs.iter().any(|(_, e)| e.depends_on_position()) {
            Some(const_mat(elemap, &self.lhs, &self.perm, ConstKind::Ploc)?)
        } else {
            None
        };
        log::debug!(
            "[{}] {} boundary expressions, location-dependent: {}",
            self.cfgsect,
            exprs.len(),
            ploc.is_some()
        );
        Ok(BcExprs::new(exprs, ploc, self.nfpts()))
    }
}

/// Parsed boundary expressions bound to one interface's points.
///
/// Values of time-independent expressions are computed on first use and
/// cached; time-dependent ones are re-evaluated from the tree on every call.
#[derive(Clone, Debug)]
pub struct BcExprs {
    exprs: Vec<(String, Expr)>,
    ploc: Option<ConstMatrix>,
    npts: usize,
    cache: Vec<Option<Vec<f64>>>,
}

impl BcExprs {
    fn new(exprs: Vec<(String, Expr)>, ploc: Option<ConstMatrix>, npts: usize) -> Self {
        let cache = vec![None; exprs.len()];
        Self {
            exprs,
            ploc,
            npts,
            cache,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.exprs.iter().map(|(k, _)| k.as_str())
    }

    pub fn expr(&self, name: &str) -> Option<&Expr> {
        self.exprs.iter().find(|(k, _)| k == name).map(|(_, e)| e)
    }

    /// Physical location of each point, if any expression needs it.
    pub fn ploc(&self) -> Option<&ConstMatrix> {
        self.ploc.as_ref()
    }

    /// Values of every expression at every point, `[nexprs][npts]`.
    pub fn values(&mut self, t: f64) -> Vec<Vec<f64>> {
        let mut out = Vec::with_capacity(self.exprs.len());
        for (i, (_, ex)) in self.exprs.iter().enumerate() {
            if let Some(v) = &self.cache[i] {
                out.push(v.clone());
                continue;
            }
            let vals = eval_at_points(ex, self.ploc.as_ref(), self.npts, t);
            if !ex.depends_on_time() {
                self.cache[i] = Some(vals.clone());
            }
            out.push(vals);
        }
        out
    }
}

fn eval_at_points(ex: &Expr, ploc: Option<&ConstMatrix>, npts: usize, t: f64) -> Vec<f64> {
    match ploc {
        Some(p) if ex.depends_on_position() => (0..p.ncols())
            .map(|c| {
                let mut vars = [0.0, 0.0, 0.0, t];
                for (d, v) in vars.iter_mut().take(p.nrows().min(3)).enumerate() {
                    *v = p.get(d, c);
                }
                ex.eval(&vars)
            })
            .collect(),
        _ => vec![ex.eval(&[0.0, 0.0, 0.0, t]); npts],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::elements::ElementType;
    use crate::solver_error::ErrorKind;

    fn setup() -> (ElementMap, Vec<FaceRef>, Inifile) {
        let mut m = ElementMap::new();
        let mut q = ElementType::new("quad", 2, 1, 4, 2, vec![vec![0, 1]]).unwrap();
        q.set_fpt_geometry(1, 0, &[0.0, -1.0], &[1.0, 0.0]).unwrap();
        q.set_fpt_geometry(1, 1, &[0.0, -1.0], &[2.0, 0.0]).unwrap();
        m.insert(q);
        let mut cfg = Inifile::new();
        cfg.set("constants", "u0", 3.0);
        cfg.set("soln-bcs-wall", "p", "2*u0");
        cfg.set("soln-bcs-wall", "rho", "u0 + x");
        cfg.set("soln-bcs-wall", "v", "sin(t)");
        cfg.set("soln-bcs-wall", "bad", "u0 + w");
        (m, vec![FaceRef::new("quad", 1, 0)], cfg)
    }

    #[test]
    fn eval_opts_resolves_numbers() {
        let (m, lhs, cfg) = setup();
        let bc = BcInters::new(&m, &lhs, "soln-bcs-wall").unwrap();
        assert_eq!(bc.eval_opts(&cfg, &["p"], None).unwrap(), vec![6.0]);
        assert_eq!(bc.eval_opts(&cfg, &["q"], Some("0.5")).unwrap(), vec![0.5]);
        let err = bc.eval_opts(&cfg, &["rho"], None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Expression);
    }

    #[test]
    fn exp_opts_attach_location_only_when_needed() {
        let (m, lhs, cfg) = setup();
        let bc = BcInters::new(&m, &lhs, "soln-bcs-wall").unwrap();
        assert!(bc.exp_opts(&cfg, &m, &["p", "v"], None).unwrap().ploc().is_none());

        let mut ex = bc.exp_opts(&cfg, &m, &["rho", "v"], None).unwrap();
        assert!(ex.ploc().is_some());
        let vals = ex.values(0.0);
        assert_eq!(vals[0], vec![4.0, 5.0]);
        assert_eq!(vals[1], vec![0.0, 0.0]);
        let later = ex.values(std::f64::consts::FRAC_PI_2);
        assert_eq!(later[0], vec![4.0, 5.0]);
        assert_eq!(later[1], vec![1.0, 1.0]);
    }

    #[test]
    fn malformed_expressions_name_the_option() {
        let (m, lhs, cfg) = setup();
        let bc = BcInters::new(&m, &lhs, "soln-bcs-wall").unwrap();
        let err = bc.exp_opts(&cfg, &m, &["bad"], None).unwrap_err();
        assert!(matches!(err, SolverError::Expression { ref option, .. } if option == "bad"));
    }
}
