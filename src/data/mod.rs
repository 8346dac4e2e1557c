//! Data module: element storage, registers, views and configuration

pub mod array;
pub mod elements;
pub mod inifile;
pub mod register_bank;
pub mod view;

pub use crate::debug_invariants::DebugInvariants;

pub use array::EleArray;
pub use elements::{ElementMap, ElementType, FaceRef, InterfaceSide};
pub use inifile::Inifile;
pub use register_bank::RegisterBank;
pub use view::{ConstMatrix, View, ViewEntry, XchgMatrix};
