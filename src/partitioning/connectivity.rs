//! Physical partition connectivity of a decomposed mesh.
//!
//! The raw form, [`MeshConnectivity`], is whatever the mesh supplies: one
//! neighbour list per partition or a set of `con_p{p}p{q}` relation names.
//! Validation turns it into a [`PartitionConnectivity`], whose adjacency is
//! symmetric and whose partitions are numbered exactly `0..nparts`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::solver_error::SolverError;

/// Unvalidated partition adjacency as read from a mesh.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeshConnectivity {
    adjacency: BTreeMap<usize, Vec<usize>>,
}

impl MeshConnectivity {
    /// One neighbour list per partition, partition `i` at index `i`.
    pub fn from_adjacency(adj: Vec<Vec<usize>>) -> Self {
        Self {
            adjacency: adj.into_iter().enumerate().collect(),
        }
    }

    /// Parse relation names of the form `con_p{lhs}p{rhs}`. Names that do not
    /// have this form (other mesh arrays) are skipped.
    pub fn from_relation_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut adjacency: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for name in names {
            if let Some((lhs, rhs)) = parse_relation(name.as_ref()) {
                adjacency.entry(lhs).or_default().push(rhs);
            }
        }
        Self { adjacency }
    }

    /// Number of partitions the mesh describes. A mesh without any
    /// relations is a single partition.
    pub fn nparts(&self) -> usize {
        self.adjacency.len().max(1)
    }

    /// Check symmetry and numbering.
    ///
    /// # Errors
    /// - `AsymmetricConnectivity` naming the first one-directional pair.
    /// - `InvalidPartitionNumbering` if partitions are not `0..nparts`.
    pub fn validate(&self) -> Result<PartitionConnectivity, SolverError> {
        if self.adjacency.is_empty() {
            return Ok(PartitionConnectivity {
                neighbours: vec![Vec::new()],
            });
        }

        let n = self.adjacency.len();
        let keys: Vec<usize> = self.adjacency.keys().copied().collect();
        if keys.iter().copied().ne(0..n) {
            return Err(SolverError::InvalidPartitionNumbering {
                expected: n,
                found: keys,
            });
        }

        let mut neighbours: Vec<Vec<usize>> = self.adjacency.values().cloned().collect();
        for nbrs in &mut neighbours {
            nbrs.sort_unstable();
            nbrs.dedup();
        }

        for (p, nbrs) in neighbours.iter().enumerate() {
            for &q in nbrs {
                let mirrored = neighbours
                    .get(q)
                    .is_some_and(|back| back.binary_search(&p).is_ok());
                if !mirrored {
                    return Err(SolverError::AsymmetricConnectivity { lhs: p, rhs: q });
                }
            }
        }

        Ok(PartitionConnectivity { neighbours })
    }
}

fn parse_relation(name: &str) -> Option<(usize, usize)> {
    let rest = name.strip_prefix("con_p")?;
    let (lhs, rhs) = rest.split_once('p')?;
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(lhs) || !digits(rhs) {
        return None;
    }
    Some((lhs.parse().ok()?, rhs.parse().ok()?))
}

/// Validated, symmetric partition adjacency (`prankconn`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConnectivity {
    neighbours: Vec<Vec<usize>>,
}

impl PartitionConnectivity {
    pub fn nparts(&self) -> usize {
        self.neighbours.len()
    }

    /// Sorted neighbours of partition `p`.
    pub fn neighbours(&self, p: usize) -> &[usize] {
        self.neighbours.get(p).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn as_adjacency(&self) -> &[Vec<usize>] {
        &self.neighbours
    }

    /// Rebuild from adjacency received over the wire, re-checking it.
    pub(crate) fn from_wire(adj: Vec<Vec<usize>>) -> Result<Self, SolverError> {
        MeshConnectivity::from_adjacency(adj).validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_names_are_parsed() {
        let mesh = MeshConnectivity::from_relation_names([
            "con_p0p1", "con_p1p0", "spt_hex_p0", "con_p1p2", "con_p2p1",
        ]);
        let conn = mesh.validate().unwrap();
        assert_eq!(conn.nparts(), 3);
        assert_eq!(conn.neighbours(1), &[0, 2]);
        assert_eq!(conn.neighbours(2), &[1]);
    }

    #[test]
    fn missing_mirror_is_an_integrity_error() {
        let mesh = MeshConnectivity::from_relation_names(["con_p0p1", "con_p1p0", "con_p1p2"]);
        assert_eq!(
            mesh.validate(),
            Err(SolverError::AsymmetricConnectivity { lhs: 1, rhs: 2 })
        );

        let mesh = MeshConnectivity::from_adjacency(vec![vec![1], vec![]]);
        assert_eq!(
            mesh.validate(),
            Err(SolverError::AsymmetricConnectivity { lhs: 0, rhs: 1 })
        );
    }

    #[test]
    fn out_of_range_neighbour_is_asymmetric() {
        let mesh = MeshConnectivity::from_adjacency(vec![vec![5]]);
        assert_eq!(
            mesh.validate(),
            Err(SolverError::AsymmetricConnectivity { lhs: 0, rhs: 5 })
        );
    }

    #[test]
    fn empty_mesh_is_one_partition() {
        let conn = MeshConnectivity::default().validate().unwrap();
        assert_eq!(conn.nparts(), 1);
        assert!(conn.neighbours(0).is_empty());
    }

    #[test]
    fn malformed_names_are_ignored() {
        assert_eq!(parse_relation("con_p1p"), None);
        assert_eq!(parse_relation("con_pxp1"), None);
        assert_eq!(parse_relation("con_p12p3"), Some((12, 3)));
    }
}
