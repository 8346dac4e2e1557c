//! Inifile: sectioned string key-value store.
//!
//! Used both for configuration (`[solver-time-integrator] tend = 1.0`) and
//! for the persisted run state written by `collect_stats`. Values are kept
//! as strings and converted on access so a round trip through the text
//! form is lossless.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::solver_error::SolverError;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inifile {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl Inifile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_section(&self, sect: &str) -> bool {
        self.sections.contains_key(sect)
    }

    pub fn has_option(&self, sect: &str, key: &str) -> bool {
        self.raw(sect, key).is_some()
    }

    fn raw(&self, sect: &str, key: &str) -> Option<&str> {
        self.sections.get(sect)?.get(key).map(String::as_str)
    }

    /// Set `key` in `sect`, creating the section if needed.
    pub fn set(&mut self, sect: &str, key: &str, value: impl fmt::Display) {
        self.sections
            .entry(sect.to_owned())
            .or_default()
            .insert(key.to_owned(), value.to_string());
    }

    /// Required string option.
    pub fn get(&self, sect: &str, key: &str) -> Result<&str, SolverError> {
        self.raw(sect, key).ok_or_else(|| SolverError::MissingOption {
            section: sect.to_owned(),
            key: key.to_owned(),
        })
    }

    pub fn get_or<'a>(&'a self, sect: &str, key: &str, default: &'a str) -> &'a str {
        self.raw(sect, key).unwrap_or(default)
    }

    fn parse<T: FromStr>(&self, sect: &str, key: &str, what: &str) -> Result<Option<T>, SolverError> {
        match self.raw(sect, key) {
            None => Ok(None),
            Some(v) => v.trim().parse().map(Some).map_err(|_| SolverError::InvalidOption {
                section: sect.to_owned(),
                key: key.to_owned(),
                value: v.to_owned(),
                reason: format!("expected {what}"),
            }),
        }
    }

    pub fn getfloat(&self, sect: &str, key: &str) -> Result<f64, SolverError> {
        self.parse(sect, key, "a float")?
            .ok_or_else(|| SolverError::MissingOption {
                section: sect.to_owned(),
                key: key.to_owned(),
            })
    }

    pub fn getfloat_or(&self, sect: &str, key: &str, default: f64) -> Result<f64, SolverError> {
        Ok(self.parse(sect, key, "a float")?.unwrap_or(default))
    }

    pub fn getint(&self, sect: &str, key: &str) -> Result<i64, SolverError> {
        self.parse(sect, key, "an integer")?
            .ok_or_else(|| SolverError::MissingOption {
                section: sect.to_owned(),
                key: key.to_owned(),
            })
    }

    pub fn getint_or(&self, sect: &str, key: &str, default: i64) -> Result<i64, SolverError> {
        Ok(self.parse(sect, key, "an integer")?.unwrap_or(default))
    }

    /// Unsigned integer option. Negative values are rejected.
    pub fn getuint_or(&self, sect: &str, key: &str, default: u64) -> Result<u64, SolverError> {
        Ok(self
            .parse(sect, key, "a non-negative integer")?
            .unwrap_or(default))
    }

    pub fn getbool_or(&self, sect: &str, key: &str, default: bool) -> Result<bool, SolverError> {
        match self.raw(sect, key).map(|v| v.trim().to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(SolverError::InvalidOption {
                    section: sect.to_owned(),
                    key: key.to_owned(),
                    value: v,
                    reason: "expected a boolean".into(),
                }),
            },
        }
    }

    /// Expression text for `key`, falling back to `default` when given.
    pub fn getexpr(&self, sect: &str, key: &str, default: Option<&str>) -> Result<String, SolverError> {
        match (self.raw(sect, key), default) {
            (Some(v), _) => Ok(v.trim().to_owned()),
            (None, Some(d)) => Ok(d.to_owned()),
            (None, None) => Err(SolverError::MissingOption {
                section: sect.to_owned(),
                key: key.to_owned(),
            }),
        }
    }

    /// All options in `sect`, in key order. Empty if the section is absent.
    pub fn items(&self, sect: &str) -> impl Iterator<Item = (&str, &str)> {
        self.sections
            .get(sect)
            .into_iter()
            .flat_map(|s| s.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// All options in `sect` parsed as floats.
    pub fn items_as_f64(&self, sect: &str) -> Result<BTreeMap<String, f64>, SolverError> {
        self.items(sect)
            .map(|(k, _)| Ok((k.to_owned(), self.getfloat(sect, k)?)))
            .collect()
    }
}

impl fmt::Display for Inifile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, opts)) in self.sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "[{name}]")?;
            for (k, v) in opts {
                writeln!(f, "{k} = {v}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for Inifile {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ini = Inifile::new();
        let mut current: Option<String> = None;
        for (lineno, line) in s.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = name.trim().to_owned();
                ini.sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }
            let bad = |reason: &str| SolverError::InvalidOption {
                section: current.clone().unwrap_or_default(),
                key: format!("line {}", lineno + 1),
                value: line.to_owned(),
                reason: reason.to_owned(),
            };
            let Some(sect) = current.as_deref() else {
                return Err(bad("option outside of any section"));
            };
            let Some((k, v)) = line.split_once('=') else {
                return Err(bad("expected `key = value`"));
            };
            ini.set(sect, k.trim(), v.trim());
        }
        Ok(ini)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_getters() {
        let mut ini = Inifile::new();
        ini.set("solver-time-integrator", "tend", 1.5);
        ini.set("solver-time-integrator", "nsteps", 10);
        ini.set("plugin", "header", "no");
        assert_eq!(ini.getfloat("solver-time-integrator", "tend").unwrap(), 1.5);
        assert_eq!(ini.getfloat_or("solver-time-integrator", "tstart", 0.0).unwrap(), 0.0);
        assert_eq!(ini.getint("solver-time-integrator", "nsteps").unwrap(), 10);
        assert!(!ini.getbool_or("plugin", "header", true).unwrap());
    }

    #[test]
    fn unsigned_getter_takes_full_u64_range() {
        let mut ini = Inifile::new();
        ini.set("backend", "rank-allocator-seed", u64::MAX);
        assert_eq!(ini.getuint_or("backend", "rank-allocator-seed", 0).unwrap(), u64::MAX);
        assert_eq!(ini.getuint_or("backend", "absent", 3).unwrap(), 3);
        ini.set("backend", "rank-allocator-seed", -1);
        let e = ini.getuint_or("backend", "rank-allocator-seed", 0).unwrap_err();
        assert!(matches!(e, SolverError::InvalidOption { .. }), "{e}");
    }

    #[test]
    fn missing_and_invalid_options_name_the_key() {
        let mut ini = Inifile::new();
        ini.set("solver-time-integrator", "tend", "soon");
        let e = ini.getfloat("solver-time-integrator", "tend").unwrap_err();
        assert!(e.to_string().contains("tend"), "{e}");
        let e = ini.getfloat("solver-time-integrator", "tstart").unwrap_err();
        assert!(matches!(e, SolverError::MissingOption { .. }));
    }

    #[test]
    fn text_round_trip_is_exact() {
        let mut ini = Inifile::new();
        let t = 0.1 + 0.2;
        ini.set("solver-time-integrator", "tcurr", t);
        ini.set("constants", "gamma", 1.4);
        let back: Inifile = ini.to_string().parse().unwrap();
        assert_eq!(back, ini);
        assert_eq!(back.getfloat("solver-time-integrator", "tcurr").unwrap(), t);
    }

    #[test]
    fn parse_rejects_orphan_options() {
        assert!("tend = 1".parse::<Inifile>().is_err());
        let ini: Inifile = "# run\n[a]\nx = 1\n; c\n[b]\ny=2".parse().unwrap();
        assert_eq!(ini.items("b").collect::<Vec<_>>(), vec![("y", "2")]);
    }

    #[test]
    fn loads_from_json() {
        let ini: Inifile =
            serde_json::from_str(r#"{"constants": {"u": "2.0", "v": "-1"}}"#).unwrap();
        let c = ini.items_as_f64("constants").unwrap();
        assert_eq!(c["u"], 2.0);
        assert_eq!(c["v"], -1.0);
    }
}
