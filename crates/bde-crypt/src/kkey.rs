//! kkey derivation: the key that wraps a sector's stored subkey
//!
//! Sector numbers carry almost no entropy and neighbours are highly
//! correlated, so the kkey is not a simple hash of the sector number. Two
//! indices, seeded from the sector number, walk the master key pool; every
//! picked byte steers the next step of the walk and is fed to MD5. The sector
//! number is mixed in once at the midpoint and once at the end.
//!
//! Every step below, including the parity branch, is part of the on-disk
//! format: changing any of it makes existing volumes unreadable.

use md5::digest::generic_array::GenericArray;
use md5::{Digest, Md5};
use zeroize::Zeroizing;

use crate::cipher::{Direction, SectorCipher};
use crate::key::KeyParams;
use crate::{KKEYBITS, MKEYLEN, SKEYLEN};

const KKEYLEN: usize = KKEYBITS / 8;
const MD5_BLOCK_LEN: usize = 64;

/// Compute the 128-bit kkey material for the sector at logical byte `offset`.
pub fn kkey_material(kp: &KeyParams, offset: u64) -> Zeroizing<[u8; KKEYLEN]> {
    let key = kp.master().as_bytes();
    let w = offset / kp.sectorsize();
    let wbytes = Zeroizing::new(w.to_le_bytes());

    let mut v = (w % 211) as usize;
    let mut u = (w % 19) as usize;

    let mut ctx = Md5::new();
    for t in 0..SKEYLEN {
        u %= MKEYLEN;
        v %= MKEYLEN;
        let c = key[u] ^ key[v];
        ctx.update([c]);
        v += c as usize + t;
        u += key[c as usize] as usize;
        if w & 1 == 1 {
            v += 13;
        } else {
            u += 131;
        }
        if t == SKEYLEN / 2 {
            ctx.update(&wbytes[..]);
        }
    }
    ctx.update(&wbytes[..]);

    let mut material = Zeroizing::new([0u8; KKEYLEN]);
    finish_digest(&mut ctx, &mut material);
    material
}

/// Finalize `ctx` into `out` and scrub the picks still held in its block buffer.
///
/// `finalize_into_reset` only rewinds the buffer position. Feeding one byte
/// short of a block overwrites the stale bytes without compressing them.
fn finish_digest(ctx: &mut Md5, out: &mut [u8; KKEYLEN]) {
    ctx.finalize_into_reset(GenericArray::from_mut_slice(&mut out[..]));
    ctx.update([0u8; MD5_BLOCK_LEN - 1]);
    Digest::reset(ctx);
}

/// Build the kkey schedule for the sector at logical byte `offset`.
pub fn derive_kkey<C: SectorCipher>(
    cipher: &C,
    kp: &KeyParams,
    direction: Direction,
    offset: u64,
) -> C::Key {
    let material = kkey_material(kp, offset);
    cipher.make_key(&material, direction)
}
