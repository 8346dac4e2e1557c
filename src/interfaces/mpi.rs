//! Faces shared with an element on another partition.

use std::fmt;

use crate::algs::communicator::{Communicator, Wait};
use crate::algs::wire::{decode_f64s, encode_f64s};
use crate::data::elements::{ElementMap, FaceRef};
use crate::data::view::{ConstMatrix, View, XchgMatrix};
use crate::interfaces::base::{ConstKind, const_mat, identity_perm, scal_view};
use crate::interfaces::InterKernel;
use crate::solver_error::SolverError;

/// Local side of a distributed interface plus the staging buffer for the
/// remote side.
///
/// Moving data across is four separate stages, each an [`InterKernel`]:
/// pack the local view into a send buffer, post the send, post the
/// receive, and unpack the received bytes into [`XchgMatrix`] once the
/// receive completes. Both ranks describe the shared faces in the same
/// order and no permutation is applied, so point `i` of the local view and
/// point `i` of the exchange buffer lie on the same physical point.
pub struct DistributedInters<C: Communicator> {
    rhsrank: usize,
    perm: Vec<usize>,
    pub scal_lhs: View,
    pub scal_rhs: XchgMatrix,
    pub mag_pnorm_lhs: ConstMatrix,
    pub norm_pnorm_lhs: ConstMatrix,
    sendbuf: Vec<u8>,
    send: Option<C::SendHandle>,
    recv: Option<C::RecvHandle>,
}

impl<C: Communicator> fmt::Debug for DistributedInters<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedInters")
            .field("rhsrank", &self.rhsrank)
            .field("nfpts", &self.scal_lhs.len())
            .field("send_pending", &self.send.is_some())
            .field("recv_pending", &self.recv.is_some())
            .finish()
    }
}

impl<C: Communicator> DistributedInters<C> {
    /// Message tag used by every distributed interface exchange.
    pub const MPI_TAG: u16 = 2314;

    pub fn new(elemap: &ElementMap, lhs: &[FaceRef], rhsrank: usize) -> Result<Self, SolverError> {
        let perm = identity_perm(lhs);
        let scal_lhs = scal_view(elemap, lhs, &perm)?;
        let scal_rhs = XchgMatrix::new(scal_lhs.nvars(), scal_lhs.len());
        Ok(Self {
            rhsrank,
            mag_pnorm_lhs: const_mat(elemap, lhs, &perm, ConstKind::MagPnorm)?,
            norm_pnorm_lhs: const_mat(elemap, lhs, &perm, ConstKind::NormPnorm)?,
            perm,
            scal_lhs,
            scal_rhs,
            sendbuf: Vec::new(),
            send: None,
            recv: None,
        })
    }

    pub fn rhsrank(&self) -> usize {
        self.rhsrank
    }

    pub fn perm(&self) -> &[usize] {
        &self.perm
    }

    pub fn nfpts(&self) -> usize {
        self.scal_lhs.len()
    }

    /// Run one exchange stage.
    pub fn run_kernel(&mut self, kernel: InterKernel, elemap: &ElementMap, comm: &C) -> Result<(), SolverError> {
        match kernel {
            InterKernel::ScalFptsPack => {
                self.pack(elemap);
                Ok(())
            }
            InterKernel::ScalFptsSend => self.send(comm),
            InterKernel::ScalFptsRecv => self.recv(comm),
            InterKernel::ScalFptsUnpack => self.unpack(),
        }
    }

    /// Copy the local view into the send buffer.
    pub fn pack(&mut self, elemap: &ElementMap) {
        self.sendbuf = encode_f64s(&self.scal_lhs.gather(elemap));
    }

    /// Post the send of the packed buffer. A previous send still in flight
    /// is completed first.
    pub fn send(&mut self, comm: &C) -> Result<(), SolverError> {
        if let Some(prev) = self.send.take() {
            prev.wait()?;
        }
        self.send = Some(comm.isend(self.rhsrank, Self::MPI_TAG, &self.sendbuf));
        Ok(())
    }

    /// Post the receive into the exchange buffer. The buffer stays
    /// unreadable until [`unpack`](Self::unpack). Posting while an earlier
    /// receive is still outstanding is an error.
    pub fn recv(&mut self, comm: &C) -> Result<(), SolverError> {
        if self.recv.is_some() {
            return Err(SolverError::comm(
                self.rhsrank,
                Self::MPI_TAG,
                "receive posted before the previous one was unpacked",
            ));
        }
        self.recv = Some(comm.irecv(self.rhsrank, Self::MPI_TAG, self.scal_rhs.nbytes()));
        self.scal_rhs.mark_pending(self.rhsrank);
        Ok(())
    }

    /// Wait for the posted receive and decode it into the exchange buffer.
    pub fn unpack(&mut self) -> Result<(), SolverError> {
        let handle = self.recv.take().ok_or_else(|| {
            SolverError::comm(self.rhsrank, Self::MPI_TAG, "unpack without a posted receive")
        })?;
        let bytes = handle.wait()?.ok_or_else(|| {
            SolverError::comm(self.rhsrank, Self::MPI_TAG, "receive completed without data")
        })?;
        let vals = decode_f64s(&bytes).map_err(|e| SolverError::comm(self.rhsrank, Self::MPI_TAG, e))?;
        if vals.len() != self.scal_rhs.nvars() * self.scal_rhs.len() {
            return Err(SolverError::comm(
                self.rhsrank,
                Self::MPI_TAG,
                format!(
                    "expected {} values, received {}",
                    self.scal_rhs.nvars() * self.scal_rhs.len(),
                    vals.len()
                ),
            ));
        }
        self.scal_rhs.complete(vals)?;
        if let Some(send) = self.send.take() {
            send.wait()?;
        }
        log::trace!("unpacked {} points from rank {}", self.nfpts(), self.rhsrank);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::ThreadComm;
    use crate::data::elements::ElementType;
    use crate::solver_error::ErrorKind;

    fn elemap(offset: f64) -> ElementMap {
        let mut m = ElementMap::new();
        let mut q = ElementType::new("quad", 2, 1, 4, 2, vec![vec![0, 1], vec![2, 3]]).unwrap();
        q.scal_fpts_mut().fill_with(|row, _, ele| offset + (10 * ele + row) as f64);
        m.insert(q);
        m
    }

    #[test]
    fn exchange_between_two_ranks() {
        let comms = ThreadComm::universe(2);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                std::thread::spawn(move || {
                    let me = comm.rank();
                    let m = elemap(100.0 * me as f64);
                    let side = vec![FaceRef::new("quad", 1, 1)];
                    let mut it = DistributedInters::<ThreadComm>::new(&m, &side, 1 - me).unwrap();
                    it.pack(&m);
                    it.send(&comm).unwrap();
                    it.recv(&comm).unwrap();
                    assert!(it.scal_rhs.data().is_err());
                    it.unpack().unwrap();
                    it.scal_rhs.data().unwrap().to_vec()
                })
            })
            .collect();
        let got: Vec<Vec<f64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(got[0], vec![112.0, 113.0]);
        assert_eq!(got[1], vec![12.0, 13.0]);
    }

    #[test]
    fn unpack_without_receive_fails() {
        let m = elemap(0.0);
        let mut it = DistributedInters::<ThreadComm>::new(&m, &[FaceRef::new("quad", 0, 0)], 1).unwrap();
        assert_eq!(it.unpack().unwrap_err().kind(), ErrorKind::Communication);
    }

    #[test]
    fn second_receive_before_unpack_fails() {
        let comm = ThreadComm::universe(2).remove(0);
        let m = elemap(0.0);
        let mut it = DistributedInters::<ThreadComm>::new(&m, &[FaceRef::new("quad", 0, 0)], 1).unwrap();
        it.recv(&comm).unwrap();
        let err = it.recv(&comm).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Communication);
        assert!(format!("{it:?}").contains("recv_pending: true"));
    }
}
