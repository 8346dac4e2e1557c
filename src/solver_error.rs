//! SolverError: unified error type for flux-stepper public APIs.
//!
//! Every fallible operation in the crate returns `Result<_, SolverError>`.
//! Errors are raised where they are detected and are never swallowed; the
//! driver embedding this crate is responsible for tearing the whole
//! distributed run down when any rank reports one.
//!
//! Each variant belongs to one of four classes, see [`ErrorKind`].

use thiserror::Error;

/// Broad class of a [`SolverError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Static setup problem; the run never starts.
    Configuration,
    /// Structural invariant violated by input data.
    Integrity,
    /// Malformed boundary or initial-condition expression.
    Expression,
    /// A transfer never completed or completed with a transport error.
    Communication,
}

/// Unified error type for flux-stepper operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    /// The mesh was partitioned for a different number of workers.
    #[error("Mesh has {partitions} partitions but running with {workers} ranks")]
    PartitionCountMismatch { partitions: usize, workers: usize },
    /// The controller needs an error estimate the stepper cannot provide.
    #[error("Incompatible stepper/controller combination: `{controller}` needs an error estimate which `{stepper}` does not provide")]
    IncompatibleStepper {
        stepper: String,
        controller: String,
    },
    /// A required option is absent.
    #[error("Missing option `{key}` in section [{section}]")]
    MissingOption { section: String, key: String },
    /// An option is present but cannot be interpreted.
    #[error("Invalid value `{value}` for option `{key}` in section [{section}]: {reason}")]
    InvalidOption {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
    /// No strategy registered under this name.
    #[error("Unknown {what} `{name}`")]
    UnknownStrategy { what: &'static str, name: String },
    /// Kernel name not in the closed kernel set.
    #[error("Unknown kernel `{0}`")]
    UnknownKernel(String),
    /// Kernel requested with the wrong number of register arguments.
    #[error("Kernel `{kernel}` takes {expected} register arguments, got {found}")]
    KernelArity {
        kernel: &'static str,
        expected: String,
        found: usize,
    },
    /// The checkpoint time list is not ordered.
    #[error("Checkpoint times must be non-decreasing: {prev} is followed by {next}")]
    UnorderedTimes { prev: f64, next: f64 },
    /// The adaptive controller rejected a step already at its minimum size.
    #[error("Minimum sized time step rejected: dt = {dt} at t = {tcurr}")]
    MinimumStepRejected { dt: f64, tcurr: f64 },
    /// An output file could not be opened or written.
    #[error("I/O error on `{path}`: {reason}")]
    Io { path: String, reason: String },

    /// Partition `lhs` lists `rhs` as a neighbour but not the reverse.
    #[error("MPI interface ({lhs}, {rhs}) is not symmetric")]
    AsymmetricConnectivity { lhs: usize, rhs: usize },
    /// Partition numbers are not exactly `0..nparts`.
    #[error("Mesh has invalid partition numbers: expected 0..{expected}, found {found:?}")]
    InvalidPartitionNumbering { expected: usize, found: Vec<usize> },
    /// A rank map is not a bijection over `0..nparts`.
    #[error("Rank map is not a bijection over 0..{nparts}: {mapping:?}")]
    InvalidRankMap { nparts: usize, mapping: Vec<usize> },
    /// Two logical register roles were assigned the same slot.
    #[error("Register roles {first} and {second} both map to slot {slot}")]
    AliasedRegisters {
        first: usize,
        second: usize,
        slot: usize,
    },
    /// A register role or slot index is out of range.
    #[error("Register index {index} out of range (have {len})")]
    RegisterOutOfRange { index: usize, len: usize },
    /// Unknown element type name.
    #[error("Unknown element type `{0}`")]
    UnknownElementType(String),
    /// Element or face index outside the element type's extent.
    #[error("Face ({etype}, element {eidx}, face {fidx}) is out of range")]
    FaceOutOfRange {
        etype: String,
        eidx: usize,
        fidx: usize,
    },
    /// Array shapes disagree.
    #[error("Shape mismatch in {context}: expected {expected}, found {found}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },
    /// Point or variable index outside an interface buffer.
    #[error("Index ({var}, {point}) out of range in {context} of shape [{nvars}, {npts}]")]
    PointOutOfRange {
        context: &'static str,
        var: usize,
        point: usize,
        nvars: usize,
        npts: usize,
    },
    /// Two sides of an interface have different sizes.
    #[error("Interface sides differ in size: lhs has {lhs} points, rhs has {rhs}")]
    InterfaceMismatch { lhs: usize, rhs: usize },

    /// Expression could not be parsed or references unknown names.
    #[error("Invalid expression for option `{option}`: {reason}")]
    Expression { option: String, reason: String },

    /// A transfer failed or did not complete.
    #[error("Communication with rank {peer} (tag {tag}) failed: {reason}")]
    Communication { peer: usize, tag: u16, reason: String },
    /// The staging buffer was read while its receive was still outstanding.
    #[error("Exchange buffer read before its receive from rank {peer} completed")]
    PendingReceive { peer: usize },
}

impl SolverError {
    /// Class of this error.
    pub fn kind(&self) -> ErrorKind {
        use SolverError::*;
        match self {
            PartitionCountMismatch { .. }
            | IncompatibleStepper { .. }
            | MissingOption { .. }
            | InvalidOption { .. }
            | UnknownStrategy { .. }
            | UnknownKernel(_)
            | KernelArity { .. }
            | UnorderedTimes { .. }
            | MinimumStepRejected { .. }
            | Io { .. } => ErrorKind::Configuration,
            AsymmetricConnectivity { .. }
            | InvalidPartitionNumbering { .. }
            | InvalidRankMap { .. }
            | AliasedRegisters { .. }
            | RegisterOutOfRange { .. }
            | UnknownElementType(_)
            | FaceOutOfRange { .. }
            | ShapeMismatch { .. }
            | PointOutOfRange { .. }
            | InterfaceMismatch { .. } => ErrorKind::Integrity,
            Expression { .. } => ErrorKind::Expression,
            Communication { .. } | PendingReceive { .. } => ErrorKind::Communication,
        }
    }

    pub(crate) fn comm(peer: usize, tag: u16, reason: impl Into<String>) -> Self {
        SolverError::Communication {
            peer,
            tag,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_mismatch_names_both_numbers() {
        let e = SolverError::PartitionCountMismatch {
            partitions: 4,
            workers: 3,
        };
        let msg = e.to_string();
        assert!(msg.contains('4') && msg.contains('3'), "{msg}");
        assert_eq!(e.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn asymmetric_pair_is_integrity() {
        let e = SolverError::AsymmetricConnectivity { lhs: 0, rhs: 2 };
        assert_eq!(e.kind(), ErrorKind::Integrity);
        assert!(e.to_string().contains("(0, 2)"));
    }

    #[test]
    fn expression_error_names_option() {
        let e = SolverError::Expression {
            option: "rho".into(),
            reason: "unexpected end of input".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Expression);
        assert!(e.to_string().contains("`rho`"));
    }
}
