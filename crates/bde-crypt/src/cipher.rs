//! Block cipher wrapper
//!
//! Sectors and subkey slots are each encrypted under their own key, one
//! 16-byte block at a time with no chaining between blocks. Misuse (a buffer
//! that is not a whole number of blocks, a key scheduled for the other
//! direction) is a programming error and panics.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128Dec, Aes128Enc};

use crate::{BLOCK_SIZE, SKEYLEN};

/// Direction a key schedule is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// A 128-bit block cipher backend, chosen once per volume.
pub trait SectorCipher {
    /// Expanded key schedule for one direction
    type Key;

    /// Build a key schedule from 128 bits of key material.
    fn make_key(&self, material: &[u8; SKEYLEN], direction: Direction) -> Self::Key;

    /// Encrypt `input` into `output` block by block.
    fn encrypt(&self, key: &Self::Key, input: &[u8], output: &mut [u8]);

    /// Decrypt `input` into `output` block by block.
    fn decrypt(&self, key: &Self::Key, input: &[u8], output: &mut [u8]);

    /// Decrypt `buf` in place block by block.
    fn decrypt_in_place(&self, key: &Self::Key, buf: &mut [u8]);
}

/// AES-128 key schedule; zeroized on drop by the `aes` crate.
pub enum AesKey {
    Encrypt(Aes128Enc),
    Decrypt(Aes128Dec),
}

impl std::fmt::Debug for AesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let direction = match self {
            AesKey::Encrypt(_) => Direction::Encrypt,
            AesKey::Decrypt(_) => Direction::Decrypt,
        };
        f.debug_struct("AesKey")
            .field("direction", &direction)
            .field("schedule", &"[REDACTED]")
            .finish()
    }
}

/// AES-128 applied independently to every block of a buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aes128Ecb;

impl Aes128Ecb {
    pub fn new() -> Self {
        Self
    }
}

fn check_lengths(input: usize, output: usize) {
    assert!(
        input > 0 && input % BLOCK_SIZE == 0,
        "cipher length {input} is not a positive multiple of {BLOCK_SIZE}"
    );
    assert_eq!(input, output, "cipher input and output lengths differ");
}

impl SectorCipher for Aes128Ecb {
    type Key = AesKey;

    fn make_key(&self, material: &[u8; SKEYLEN], direction: Direction) -> AesKey {
        let material = GenericArray::from_slice(material);
        match direction {
            Direction::Encrypt => AesKey::Encrypt(Aes128Enc::new(material)),
            Direction::Decrypt => AesKey::Decrypt(Aes128Dec::new(material)),
        }
    }

    fn encrypt(&self, key: &AesKey, input: &[u8], output: &mut [u8]) {
        check_lengths(input.len(), output.len());
        let AesKey::Encrypt(aes) = key else {
            panic!("encrypt called with a decrypt key schedule");
        };
        for (i, o) in input
            .chunks_exact(BLOCK_SIZE)
            .zip(output.chunks_exact_mut(BLOCK_SIZE))
        {
            aes.encrypt_block_b2b(GenericArray::from_slice(i), GenericArray::from_mut_slice(o));
        }
    }

    fn decrypt(&self, key: &AesKey, input: &[u8], output: &mut [u8]) {
        check_lengths(input.len(), output.len());
        let AesKey::Decrypt(aes) = key else {
            panic!("decrypt called with an encrypt key schedule");
        };
        for (i, o) in input
            .chunks_exact(BLOCK_SIZE)
            .zip(output.chunks_exact_mut(BLOCK_SIZE))
        {
            aes.decrypt_block_b2b(GenericArray::from_slice(i), GenericArray::from_mut_slice(o));
        }
    }

    fn decrypt_in_place(&self, key: &AesKey, buf: &mut [u8]) {
        check_lengths(buf.len(), buf.len());
        let AesKey::Decrypt(aes) = key else {
            panic!("decrypt called with an encrypt key schedule");
        };
        for block in buf.chunks_exact_mut(BLOCK_SIZE) {
            aes.decrypt_block(GenericArray::from_mut_slice(block));
        }
    }
}
