//! Communication algorithms: backends and the wire format they carry.

pub mod communicator;
pub mod wire;

pub use communicator::{Communicator, NoComm, Reductions, ThreadComm, Wait};
#[cfg(feature = "mpi-support")]
pub use communicator::MpiComm;
