use std::fmt;

use serde::{Deserialize, Serialize};

/// Globally unique identifier of one simulation run, rendered as an
/// RFC 4122 version 4 UUID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(u128);

impl RunId {
    /// Draw a fresh random identifier.
    pub fn new_v4() -> Self {
        let raw: u128 = rand::random();
        // version 4, variant 10xx
        let raw = (raw & !(0xFu128 << 76)) | (0x4u128 << 76);
        let raw = (raw & !(0b11u128 << 62)) | (0b10u128 << 62);
        RunId(raw)
    }

    pub fn from_u128(raw: u128) -> Self {
        RunId(raw)
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }

    pub(crate) fn to_words(self) -> [u64; 2] {
        [(self.0 >> 64) as u64, self.0 as u64]
    }

    pub(crate) fn from_words(hi: u64, lo: u64) -> Self {
        RunId(((hi as u128) << 64) | lo as u128)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xFFFF_FFFF_FFFF
        )
    }
}
