//! Fixed, versioned, little-endian wire types for collectives and exchanges.
//!
//! Everything that crosses a [`Communicator`](crate::algs::communicator::Communicator)
//! is a flat byte buffer. Integers and floats are stored little-endian;
//! floats travel as their IEEE-754 bit patterns so values round-trip exactly.

use bytemuck::{Pod, Zeroable};
use static_assertions::assert_eq_size;

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Record kinds carried in [`WireHdr::kind`].
pub mod kind {
    /// Validation outcome broadcast by the root.
    pub const STATUS: u16 = 1;
    /// Partition connectivity.
    pub const CONNECTIVITY: u16 = 2;
    /// Rank to partition mapping.
    pub const RANK_MAP: u16 = 3;
    /// Run identifier.
    pub const RUN_ID: u16 = 4;
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq)]
pub struct WireHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub reserved_le: u32,
}

assert_eq_size!(WireHdr, u64);

impl WireHdr {
    pub fn new(kind: u16) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

/// Encode a slice of `u64` as little-endian bytes.
pub fn encode_u64s(vals: &[u64]) -> Vec<u8> {
    let le: Vec<u64> = vals.iter().map(|v| v.to_le()).collect();
    bytemuck::cast_slice(&le).to_vec()
}

/// Decode little-endian `u64`s. The input need not be aligned.
pub fn decode_u64s(bytes: &[u8]) -> Result<Vec<u64>, String> {
    if bytes.len() % 8 != 0 {
        return Err(format!("{} bytes is not a whole number of u64s", bytes.len()));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|c| u64::from_le(bytemuck::pod_read_unaligned::<u64>(c)))
        .collect())
}

/// Encode `f64`s by bit pattern.
pub fn encode_f64s(vals: &[f64]) -> Vec<u8> {
    let bits: Vec<u64> = vals.iter().map(|v| v.to_bits()).collect();
    encode_u64s(&bits)
}

pub fn decode_f64s(bytes: &[u8]) -> Result<Vec<f64>, String> {
    Ok(decode_u64s(bytes)?.into_iter().map(f64::from_bits).collect())
}

/// Frame a record: header followed by `u64` payload words.
pub fn encode_record(kind: u16, words: &[u64]) -> Vec<u8> {
    let hdr = WireHdr::new(kind);
    let mut out = bytemuck::bytes_of(&hdr).to_vec();
    out.extend_from_slice(&encode_u64s(words));
    out
}

/// Inverse of [`encode_record`]; checks version and kind.
pub fn decode_record(kind: u16, bytes: &[u8]) -> Result<Vec<u64>, String> {
    let n = std::mem::size_of::<WireHdr>();
    if bytes.len() < n {
        return Err(format!("record of {} bytes is shorter than its header", bytes.len()));
    }
    let hdr: WireHdr = bytemuck::pod_read_unaligned(&bytes[..n]);
    if hdr.version() != WIRE_VERSION {
        return Err(format!(
            "wire version {} does not match {}",
            hdr.version(),
            WIRE_VERSION
        ));
    }
    if hdr.kind() != kind {
        return Err(format!("expected record kind {kind}, got {}", hdr.kind()));
    }
    decode_u64s(&bytes[n..])
}

/// Flatten neighbour lists as `[n, len_0, nbrs_0..., len_1, nbrs_1...]`.
pub fn encode_adjacency(adj: &[Vec<usize>]) -> Vec<u64> {
    let mut words = Vec::with_capacity(1 + adj.len() + adj.iter().map(Vec::len).sum::<usize>());
    words.push(adj.len() as u64);
    for nbrs in adj {
        words.push(nbrs.len() as u64);
        words.extend(nbrs.iter().map(|&q| q as u64));
    }
    words
}

pub fn decode_adjacency(words: &[u64]) -> Result<Vec<Vec<usize>>, String> {
    let mut it = words.iter().copied();
    let n = it.next().ok_or("empty adjacency record")? as usize;
    let mut adj = Vec::with_capacity(n);
    for p in 0..n {
        let len = it
            .next()
            .ok_or_else(|| format!("adjacency record truncated at partition {p}"))?
            as usize;
        let nbrs: Vec<usize> = it.by_ref().take(len).map(|q| q as usize).collect();
        if nbrs.len() != len {
            return Err(format!("adjacency record truncated at partition {p}"));
        }
        adj.push(nbrs);
    }
    if it.next().is_some() {
        return Err("trailing words after adjacency record".into());
    }
    Ok(adj)
}
