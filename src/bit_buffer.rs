//! BitBuffer Abstraction
//!
//! Fixed-length bit string wrapping `bitvec`. Field values, MSB patterns and
//! residues are all bit strings whose length is not a multiple of 8; this
//! buffer is the single place where their byte form is converted to and from
//! bits.
//!
//! Byte forms are **right-aligned**: a 4-bit value `1010` is stored as the
//! byte `0x0A`, with the padding on the left.

use bitvec::prelude::*;

/// A bit string of known length, MSB first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitBuffer {
    bits: BitVec<u8, Msb0>,
}

impl BitBuffer {
    /// Create a BitBuffer of exactly `bit_length` bits from right-aligned bytes.
    ///
    /// Excess leading bits are dropped; missing leading bits are zero.
    pub fn from_right_aligned(bytes: &[u8], bit_length: usize) -> Self {
        let slice = BitSlice::<u8, Msb0>::from_slice(bytes);
        let mut bits = BitVec::with_capacity(bit_length);
        if bit_length > slice.len() {
            bits.resize(bit_length - slice.len(), false);
            bits.extend_from_bitslice(slice);
        } else {
            bits.extend_from_bitslice(&slice[slice.len() - bit_length..]);
        }
        Self { bits }
    }

    /// Create a BitBuffer of `bit_length` bits holding the low bits of `value`.
    pub fn from_u64(value: u64, bit_length: usize) -> Self {
        Self::from_right_aligned(&value.to_be_bytes(), bit_length)
    }

    /// The first `n` bits as right-aligned bytes, or `None` if the buffer is
    /// shorter.
    pub fn leading_bytes(&self, n: usize) -> Option<Vec<u8>> {
        self.bits.get(..n).map(right_aligned)
    }

    /// Whether the first `n` bits of both buffers exist and are equal.
    pub fn leading_bits_eq(&self, other: &BitBuffer, n: usize) -> bool {
        match (self.bits.get(..n), other.bits.get(..n)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Total number of bits in the buffer.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Right-aligned byte form of the whole buffer.
    pub fn to_right_aligned(&self) -> Vec<u8> {
        right_aligned(&self.bits)
    }

    pub fn as_bitslice(&self) -> &BitSlice<u8, Msb0> {
        &self.bits
    }
}

fn right_aligned(bits: &BitSlice<u8, Msb0>) -> Vec<u8> {
    let pad = (8 - bits.len() % 8) % 8;
    let mut padded: BitVec<u8, Msb0> = BitVec::with_capacity(bits.len() + pad);
    padded.resize(pad, false);
    padded.extend_from_bitslice(bits);
    padded.into_vec()
}
