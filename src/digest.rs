use sha1::{
    digest::{generic_array::GenericArray, BlockInput},
    Sha1,
};
use std::{fmt, slice};

/// The size of a SHA1 block, in bytes. The prefix is always exactly one block long.
pub const BLOCK_LEN: usize = 64;

/// The size of the bit-length field at the end of the final padded block, in bytes.
const LENGTH_FIELD_LEN: usize = 8;

/// The 20-byte SHA1 "state vector", as five big-endian words.
pub type DigestState = [u32; 5];

pub const SHA1_INITIAL_STATE: DigestState =
    [0x67452301, 0xefcdab89, 0x98badcfe, 0x10325476, 0xc3d2e1f0];

/// A SHA1 block compression function: absorbs one 64-byte block into a running state.
///
/// This is the only part of SHA1 that the search loop doesn't implement itself. It's a trait so
/// that the engine can be checked against a recording implementation in tests, or swapped for an
/// accelerated one.
pub trait BlockCompressor: Clone + Send + 'static {
    fn compress(&self, state: &mut DigestState, block: &[u8; BLOCK_LEN]);
}

/// The compression function from the `sha-1` crate.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Sha1Compressor;

impl BlockCompressor for Sha1Compressor {
    #[inline(always)]
    fn compress(&self, state: &mut DigestState, block: &[u8; BLOCK_LEN]) {
        let block = GenericArray::<u8, <Sha1 as BlockInput>::BlockSize>::from_slice(block);
        sha1::compress(state, slice::from_ref(block));
    }
}

/// A finished SHA1 hash, split into big-endian four-byte words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sha1Hash(pub DigestState);

impl Sha1Hash {
    /// The number of consecutive zero hex digits at the start of the hash.
    ///
    /// Zero words are counted without going through `leading_zeros`, since many bit-count
    /// primitives are undefined at zero.
    #[inline(always)]
    pub fn leading_zero_nibbles(&self) -> u32 {
        let mut nibbles = 0;
        for &word in &self.0 {
            if word == 0 {
                nibbles += 8;
            } else {
                return nibbles + word.leading_zeros() / 4;
            }
        }
        nibbles
    }
}

impl fmt::Display for Sha1Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for word in &self.0 {
            write!(f, "{:08x}", word)?;
        }
        Ok(())
    }
}

/// Computes the state vector after processing the prefix, starting from the SHA1 initial state.
///
/// The prefix is exactly one block, so there's no interaction with finalization padding and the
/// result can be reused unmodified for every suffix.
pub fn hash_prefix<C: BlockCompressor>(compressor: &C, prefix: &[u8; BLOCK_LEN]) -> DigestState {
    let mut state = SHA1_INITIAL_STATE;
    compressor.compress(&mut state, prefix);
    state
}

/// Finishes a hash that was started with `hash_prefix`, by processing `suffix` and the SHA1
/// finalization padding on top of a copy of `prefix_state`.
///
/// `message_len` is the length in bytes of the whole message (prefix and suffix), which is what
/// gets encoded into the padding.
///
/// Finalization padding is the byte 0x80, then null bytes up to an offset of 56 (mod 64), then
/// the bit-length of the message as a big-endian 64-bit integer. If the marker byte leaves fewer
/// than 8 bytes free in the last suffix block, the length goes in an extra block of its own.
#[inline(always)]
pub fn finalize<C: BlockCompressor>(
    compressor: &C,
    prefix_state: &DigestState,
    suffix: &[u8],
    message_len: usize,
) -> Sha1Hash {
    debug_assert_eq!(message_len % BLOCK_LEN, suffix.len() % BLOCK_LEN);

    let mut state = *prefix_state;
    let mut block = [0u8; BLOCK_LEN];

    let mut suffix_blocks = suffix.chunks_exact(BLOCK_LEN);
    for suffix_block in &mut suffix_blocks {
        block.copy_from_slice(suffix_block);
        compressor.compress(&mut state, &block);
    }

    let tail = suffix_blocks.remainder();
    block = [0; BLOCK_LEN];
    block[..tail.len()].copy_from_slice(tail);
    block[tail.len()] = 0x80;

    if BLOCK_LEN - (tail.len() + 1) < LENGTH_FIELD_LEN {
        compressor.compress(&mut state, &block);
        block = [0; BLOCK_LEN];
    }

    let bit_length = message_len as u64 * 8;
    block[BLOCK_LEN - LENGTH_FIELD_LEN..].copy_from_slice(&bit_length.to_be_bytes());
    compressor.compress(&mut state, &block);

    Sha1Hash(state)
}
