//! Scalar expressions used for boundary and initial conditions.
//!
//! An option value such as `rho = 1 + 0.1*sin(2*pi*x/L)` is parsed once
//! into an [`Expr`] tree. Names are resolved at that point: constants from
//! the `[constants]` section and `pi`/`e` become numbers, `x y z t` become
//! variables, and everything else (including calls with the wrong number
//! of arguments) is rejected with `SolverError::Expression` naming the
//! option.

mod parser;

use std::collections::BTreeMap;
use std::fmt;

use crate::data::inifile::Inifile;
use crate::solver_error::SolverError;

/// Free variables of an expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Var {
    X,
    Y,
    Z,
    T,
}

impl Var {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "x" => Some(Var::X),
            "y" => Some(Var::Y),
            "z" => Some(Var::Z),
            "t" => Some(Var::T),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Built-in functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Func {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Log,
    Sqrt,
    Abs,
    Pow,
    Min,
    Max,
    Floor,
    Ceil,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        use Func::*;
        Some(match name {
            "sin" => Sin,
            "cos" => Cos,
            "tan" => Tan,
            "asin" => Asin,
            "acos" => Acos,
            "atan" => Atan,
            "atan2" => Atan2,
            "sinh" => Sinh,
            "cosh" => Cosh,
            "tanh" => Tanh,
            "exp" => Exp,
            "log" => Log,
            "sqrt" => Sqrt,
            "abs" | "fabs" => Abs,
            "pow" => Pow,
            "min" => Min,
            "max" => Max,
            "floor" => Floor,
            "ceil" => Ceil,
            _ => return None,
        })
    }

    pub fn arity(self) -> usize {
        match self {
            Func::Atan2 | Func::Pow | Func::Min | Func::Max => 2,
            _ => 1,
        }
    }

    fn apply(self, a: &[f64]) -> f64 {
        use Func::*;
        match self {
            Sin => a[0].sin(),
            Cos => a[0].cos(),
            Tan => a[0].tan(),
            Asin => a[0].asin(),
            Acos => a[0].acos(),
            Atan => a[0].atan(),
            Atan2 => a[0].atan2(a[1]),
            Sinh => a[0].sinh(),
            Cosh => a[0].cosh(),
            Tanh => a[0].tanh(),
            Exp => a[0].exp(),
            Log => a[0].ln(),
            Sqrt => a[0].sqrt(),
            Abs => a[0].abs(),
            Pow => a[0].powf(a[1]),
            Min => a[0].min(a[1]),
            Max => a[0].max(a[1]),
            Floor => a[0].floor(),
            Ceil => a[0].ceil(),
        }
    }
}

/// Resolved expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(Var),
    Neg(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

impl Expr {
    /// Parse and resolve `src`; `option` names the configuration option in
    /// error messages.
    pub fn parse(
        option: &str,
        src: &str,
        constants: &BTreeMap<String, f64>,
    ) -> Result<Self, SolverError> {
        let err = |reason: String| SolverError::Expression {
            option: option.to_owned(),
            reason,
        };
        let ast = parser::parse(src).map_err(err)?;
        resolve(ast, constants).map_err(err)
    }

    /// Parse option `key` of `sect`, with constants from `[constants]`.
    pub fn from_config(cfg: &Inifile, sect: &str, key: &str) -> Result<Self, SolverError> {
        let constants = cfg.items_as_f64("constants")?;
        let src = cfg.getexpr(sect, key, None)?;
        Self::parse(key, &src, &constants)
    }

    /// Evaluate with `vars = [x, y, z, t]`.
    pub fn eval(&self, vars: &[f64; 4]) -> f64 {
        match self {
            Expr::Num(v) => *v,
            Expr::Var(v) => vars[v.index()],
            Expr::Neg(e) => -e.eval(vars),
            Expr::Bin(op, a, b) => {
                let (a, b) = (a.eval(vars), b.eval(vars));
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
            Expr::Call(f, args) => {
                let vals: Vec<f64> = args.iter().map(|a| a.eval(vars)).collect();
                f.apply(&vals)
            }
        }
    }

    fn any_var(&self, pred: &impl Fn(Var) -> bool) -> bool {
        match self {
            Expr::Num(_) => false,
            Expr::Var(v) => pred(*v),
            Expr::Neg(e) => e.any_var(pred),
            Expr::Bin(_, a, b) => a.any_var(pred) || b.any_var(pred),
            Expr::Call(_, args) => args.iter().any(|a| a.any_var(pred)),
        }
    }

    /// True if the value varies with `x`, `y` or `z`.
    pub fn depends_on_position(&self) -> bool {
        self.any_var(&|v| v != Var::T)
    }

    pub fn depends_on_time(&self) -> bool {
        self.any_var(&|v| v == Var::T)
    }

    /// Constant value, if the expression has no free variables.
    pub fn as_constant(&self) -> Option<f64> {
        (!self.depends_on_position() && !self.depends_on_time()).then(|| self.eval(&[0.0; 4]))
    }
}

fn resolve(ast: parser::Ast, constants: &BTreeMap<String, f64>) -> Result<Expr, String> {
    use parser::Ast;
    Ok(match ast {
        Ast::Num(v) => Expr::Num(v),
        Ast::Name(name) => {
            if let Some(v) = Var::from_name(&name) {
                Expr::Var(v)
            } else if let Some(&c) = constants.get(&name) {
                Expr::Num(c)
            } else if name == "pi" {
                Expr::Num(std::f64::consts::PI)
            } else if name == "e" {
                Expr::Num(std::f64::consts::E)
            } else {
                return Err(format!("unknown name `{name}`"));
            }
        }
        Ast::Call(name, args) => {
            let f = Func::from_name(&name).ok_or_else(|| format!("unknown function `{name}`"))?;
            if args.len() != f.arity() {
                return Err(format!(
                    "`{name}` takes {} argument(s), got {}",
                    f.arity(),
                    args.len()
                ));
            }
            let args = args
                .into_iter()
                .map(|a| resolve(a, constants))
                .collect::<Result<_, _>>()?;
            Expr::Call(f, args)
        }
        Ast::Neg(e) => Expr::Neg(Box::new(resolve(*e, constants)?)),
        Ast::Bin(op, a, b) => {
            let op = match op {
                '+' => BinOp::Add,
                '-' => BinOp::Sub,
                '*' => BinOp::Mul,
                '/' => BinOp::Div,
                _ => BinOp::Pow,
            };
            Expr::Bin(
                op,
                Box::new(resolve(*a, constants)?),
                Box::new(resolve(*b, constants)?),
            )
        }
    })
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(v) => write!(f, "{v}"),
            Expr::Var(v) => write!(f, "{}", format!("{v:?}").to_lowercase()),
            Expr::Neg(e) => write!(f, "(-{e})"),
            Expr::Bin(op, a, b) => {
                let s = match op {
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                    BinOp::Div => "/",
                    BinOp::Pow => "**",
                };
                write!(f, "({a} {s} {b})")
            }
            Expr::Call(func, args) => {
                write!(f, "{}(", format!("{func:?}").to_lowercase())?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<Expr, SolverError> {
        let mut c = BTreeMap::new();
        c.insert("gamma".to_owned(), 1.4);
        Expr::parse("u", src, &c)
    }

    #[test]
    fn evaluates_with_constants_and_functions() {
        let e = parse("gamma*2 + max(x, y)**2 - fabs(-1)").unwrap();
        assert!((e.eval(&[1.0, 3.0, 0.0, 0.0]) - (2.8 + 9.0 - 1.0)).abs() < 1e-12);
        assert!(e.depends_on_position());
        assert!(!e.depends_on_time());
        let pi = parse("cos(pi)").unwrap();
        assert_eq!(pi.as_constant(), Some(-1.0));
    }

    #[test]
    fn time_dependence() {
        let e = parse("sin(t)").unwrap();
        assert!(e.depends_on_time());
        assert!(!e.depends_on_position());
        assert_eq!(e.as_constant(), None);
    }

    #[test]
    fn unknown_names_are_expression_errors() {
        let err = parse("1 + rho").unwrap_err();
        assert_eq!(err.kind(), crate::solver_error::ErrorKind::Expression);
        assert!(err.to_string().contains("`u`"));
        assert!(err.to_string().contains("rho"));
        assert!(parse("frob(x)").is_err());
        assert!(parse("atan2(x)").unwrap_err().to_string().contains("2 argument"));
        assert!(parse("1 +* 2").is_err());
    }

    #[test]
    fn reads_constants_from_config() {
        let mut cfg = Inifile::new();
        cfg.set("constants", "L", 2.0);
        cfg.set("soln-bcs-inlet", "rho", "x / L");
        let e = Expr::from_config(&cfg, "soln-bcs-inlet", "rho").unwrap();
        assert_eq!(e.eval(&[3.0, 0.0, 0.0, 0.0]), 1.5);
    }
}
