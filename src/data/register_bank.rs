//! RegisterBank: persistent per-element-type register storage.
//!
//! The bank owns `nregs` slots; each slot holds one [`EleArray`] per element
//! type. Kernels never address slots directly. They address *roles*
//! (`0..nregs`), and a role table maps each role to a slot. Moving a
//! register from one role to another is therefore a table update, never a
//! copy of field data.
//!
//! # Invariants
//!
//! - The role table is a permutation of `0..nregs`.
//! - Every slot holds arrays of identical shapes, one per element type.
//!
//! These invariants are checked after mutations in debug builds and when the
//! `check-invariants` feature is enabled.

use crate::data::array::EleArray;
use crate::debug_invariants::DebugInvariants;
use crate::solver_error::SolverError;

#[derive(Clone, Debug)]
pub struct RegisterBank {
    slots: Vec<Vec<EleArray>>,
    roles: Vec<usize>,
}

impl RegisterBank {
    /// Allocate `nregs` zeroed slots for element types of the given
    /// `(nupts, nvars, neles)` shapes. Roles start as the identity map.
    pub fn new(nregs: usize, shapes: &[(usize, usize, usize)]) -> Self {
        let slots = (0..nregs)
            .map(|_| {
                shapes
                    .iter()
                    .map(|&(nupts, nvars, neles)| EleArray::zeros(nupts, nvars, neles))
                    .collect()
            })
            .collect();
        let bank = Self {
            slots,
            roles: (0..nregs).collect(),
        };
        bank.debug_assert_invariants();
        bank
    }

    pub fn nregs(&self) -> usize {
        self.slots.len()
    }

    /// Number of element types held by each slot.
    pub fn netypes(&self) -> usize {
        self.slots.first().map_or(0, Vec::len)
    }

    /// Current role -> slot table.
    pub fn roles(&self) -> &[usize] {
        &self.roles
    }

    pub fn slot_of(&self, role: usize) -> Result<usize, SolverError> {
        self.roles
            .get(role)
            .copied()
            .ok_or(SolverError::RegisterOutOfRange {
                index: role,
                len: self.roles.len(),
            })
    }

    fn check_slot(&self, slot: usize) -> Result<(), SolverError> {
        if slot < self.slots.len() {
            Ok(())
        } else {
            Err(SolverError::RegisterOutOfRange {
                index: slot,
                len: self.slots.len(),
            })
        }
    }

    pub fn slot(&self, slot: usize) -> Result<&[EleArray], SolverError> {
        self.check_slot(slot)?;
        Ok(&self.slots[slot])
    }

    pub fn slot_mut(&mut self, slot: usize) -> Result<&mut [EleArray], SolverError> {
        self.check_slot(slot)?;
        Ok(&mut self.slots[slot])
    }

    pub fn role(&self, role: usize) -> Result<&[EleArray], SolverError> {
        let slot = self.slot_of(role)?;
        Ok(&self.slots[slot])
    }

    pub fn role_mut(&mut self, role: usize) -> Result<&mut [EleArray], SolverError> {
        let slot = self.slot_of(role)?;
        Ok(&mut self.slots[slot])
    }

    /// Bind roles `0..slots.len()` to the given slots, in order.
    ///
    /// Roles past `slots.len()` receive the remaining slots in ascending
    /// order, so the table stays a permutation. Cost is O(nregs); no field
    /// data moves.
    ///
    /// # Errors
    /// `RegisterOutOfRange` for a slot `>= nregs`, `AliasedRegisters` if two
    /// roles name the same slot. The table is left unchanged on error.
    pub fn prepare_reg_banks(&mut self, slots: &[usize]) -> Result<(), SolverError> {
        let n = self.slots.len();
        if slots.len() > n {
            return Err(SolverError::RegisterOutOfRange {
                index: slots.len(),
                len: n,
            });
        }
        let mut owner: Vec<Option<usize>> = vec![None; n];
        for (role, &slot) in slots.iter().enumerate() {
            self.check_slot(slot)?;
            if let Some(first) = owner[slot].replace(role) {
                return Err(SolverError::AliasedRegisters {
                    first,
                    second: role,
                    slot,
                });
            }
        }

        let mut table = slots.to_vec();
        table.extend((0..n).filter(|&s| owner[s].is_none()));
        self.roles = table;
        self.debug_assert_invariants();
        Ok(())
    }

    /// Exchange the slots bound to two roles.
    pub fn swap_roles(&mut self, a: usize, b: usize) -> Result<(), SolverError> {
        self.slot_of(a)?;
        self.slot_of(b)?;
        self.roles.swap(a, b);
        Ok(())
    }

    /// Read one slot while writing another, as a right-hand-side evaluation
    /// does.
    pub fn split_slots(
        &mut self,
        read: usize,
        write: usize,
    ) -> Result<(&[EleArray], &mut [EleArray]), SolverError> {
        self.check_slot(read)?;
        self.check_slot(write)?;
        if read == write {
            return Err(SolverError::AliasedRegisters {
                first: read,
                second: write,
                slot: read,
            });
        }
        if read < write {
            let (lo, hi) = self.slots.split_at_mut(write);
            Ok((&lo[read], &mut hi[0]))
        } else {
            let (lo, hi) = self.slots.split_at_mut(read);
            Ok((&hi[0], &mut lo[write]))
        }
    }

    /// Mutable access to the slot behind `out` and shared access to the
    /// slots behind `ins`. `ins` may repeat roles but must not contain `out`.
    pub fn kernel_args(
        &mut self,
        out: usize,
        ins: &[usize],
    ) -> Result<(&mut [EleArray], Vec<&[EleArray]>), SolverError> {
        let out_slot = self.slot_of(out)?;
        let in_slots = ins
            .iter()
            .map(|&r| self.slot_of(r))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(pos) = ins.iter().position(|&r| r == out) {
            return Err(SolverError::AliasedRegisters {
                first: out,
                second: ins[pos],
                slot: out_slot,
            });
        }

        let mut out_ref = None;
        let mut in_refs: Vec<Option<&[EleArray]>> = vec![None; ins.len()];
        for (s, data) in self.slots.iter_mut().enumerate() {
            if s == out_slot {
                out_ref = Some(data.as_mut_slice());
            } else {
                let data: &Vec<EleArray> = data;
                for (k, _) in in_slots.iter().enumerate().filter(|&(_, &is)| is == s) {
                    in_refs[k] = Some(data.as_slice());
                }
            }
        }
        let missing = SolverError::RegisterOutOfRange {
            index: out,
            len: self.roles.len(),
        };
        let ins = in_refs.into_iter().collect::<Option<Vec<_>>>();
        match (out_ref, ins) {
            (Some(o), Some(i)) => Ok((o, i)),
            _ => Err(missing),
        }
    }
}

impl DebugInvariants for RegisterBank {
    fn validate_invariants(&self) -> Result<(), SolverError> {
        let n = self.slots.len();
        let mut seen = vec![false; n];
        for (role, &slot) in self.roles.iter().enumerate() {
            if slot >= n {
                return Err(SolverError::RegisterOutOfRange { index: slot, len: n });
            }
            if seen[slot] {
                let first = self.roles.iter().position(|&s| s == slot).unwrap_or(role);
                return Err(SolverError::AliasedRegisters {
                    first,
                    second: role,
                    slot,
                });
            }
            seen[slot] = true;
        }
        if let Some(first) = self.slots.first() {
            for slot in &self.slots[1..] {
                for (a, b) in first.iter().zip(slot) {
                    if a.shape() != b.shape() {
                        return Err(SolverError::ShapeMismatch {
                            context: "register slot",
                            expected: a.as_slice().len(),
                            found: b.as_slice().len(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> RegisterBank {
        let mut b = RegisterBank::new(3, &[(2, 1, 2)]);
        for s in 0..3 {
            b.slot_mut(s).unwrap()[0].as_mut_slice().fill(s as f64);
        }
        b
    }

    #[test]
    fn prepare_rebinds_roles_only() {
        let mut b = bank();
        b.prepare_reg_banks(&[2, 0]).unwrap();
        assert_eq!(b.roles(), &[2, 0, 1]);
        assert_eq!(b.role(0).unwrap()[0].as_slice()[0], 2.0);
        for s in 0..3 {
            assert!(b.slot(s).unwrap()[0].as_slice().iter().all(|&v| v == s as f64));
        }
    }

    #[test]
    fn aliasing_is_rejected_and_table_kept() {
        let mut b = bank();
        b.prepare_reg_banks(&[1, 2]).unwrap();
        let err = b.prepare_reg_banks(&[0, 0]).unwrap_err();
        assert_eq!(
            err,
            SolverError::AliasedRegisters {
                first: 0,
                second: 1,
                slot: 0
            }
        );
        assert_eq!(b.roles(), &[1, 2, 0]);
        assert!(b.prepare_reg_banks(&[5]).is_err());
    }

    #[test]
    fn split_access() {
        let mut b = bank();
        let (r, w) = b.split_slots(2, 0).unwrap();
        w[0].as_mut_slice().copy_from_slice(r[0].as_slice());
        assert_eq!(b.slot(0).unwrap()[0].as_slice()[0], 2.0);
        assert!(b.split_slots(1, 1).is_err());

        let (out, ins) = b.kernel_args(0, &[1, 2, 1]).unwrap();
        assert_eq!(out[0].as_slice()[0], 2.0);
        assert_eq!(ins.len(), 3);
        assert_eq!(ins[2][0].as_slice()[0], 1.0);
        assert!(b.kernel_args(1, &[1]).is_err());
    }
}
