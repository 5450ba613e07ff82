//! Counter arithmetic for block-level random access.
//!
//! The IV is the first counter block, read as a big-endian 128-bit
//! integer. Block `n` of a blob is encrypted under `iv + n`, reduced
//! modulo 2^128. An IV within `n` of `u128::MAX` therefore wraps to small
//! counter values; this matches how the keystream itself advances.

use crate::keys::{Iv, BLOCK_SIZE};

/// Counter block for block `block_index` of a blob starting at `iv`.
pub fn adjusted_iv(iv: &Iv, block_index: u64) -> Iv {
    let counter = u128::from_be_bytes(*iv.as_bytes());
    Iv::from_bytes(counter.wrapping_add(u128::from(block_index)).to_be_bytes())
}

/// Index of the block containing byte `offset`.
pub fn block_index(offset: u64) -> u64 {
    offset / BLOCK_SIZE as u64
}
